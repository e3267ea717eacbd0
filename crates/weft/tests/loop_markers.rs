//! Iteration scenarios: marker-keyed row identity, per-row local state
//! surviving reorders, the empty-iteration `Else` fallback, and duplicate
//! marker rejection.

use weft::Page;

const DOC: &str = r#"
<WeftInit init="{ { users: [{ id: 1, name: 'A' }, { id: 2, name: 'B' }] } }"></WeftInit>
<WeftRoot>
  <Loop each="$u of {@Global.users} marked by {$u.id}">
    <div def="@Local as local">
      <span>{$u.name}</span>
      <input id="note-{$u.id}" bind="@Local.note">
    </div>
  </Loop>
  <button id="reorder"
          onclick="@{ @Global.users = [{ id: 2, name: 'B' }, { id: 1, name: 'A' }] }">swap</button>
</WeftRoot>
"#;

#[test]
fn local_state_follows_the_marker_through_reorder() {
    let page = Page::open(DOC).unwrap();
    page.input("#note-2", "hello").unwrap();
    let before = page.find("#note-2").unwrap();
    assert_eq!(before.prop_text("value").as_deref(), Some("hello"));

    page.click("#reorder").unwrap();

    let after = page.find("#note-2").unwrap();
    assert_eq!(after.prop_text("value").as_deref(), Some("hello"));
    let other = page.find("#note-1").unwrap();
    assert_eq!(other.prop_text("value").as_deref(), Some(""));
    // Same logical row, same SID.
    assert_eq!(before.sid, after.sid);
}

#[test]
fn roles_bind_per_row() {
    let doc = r#"
<WeftInit init="{ { items: ['a', 'b', 'c'] } }"></WeftInit>
<WeftRoot>
  <ul>
  <Loop each="$item, $i as index, $last as isLast of {@Global.items} marked by index">
    <li>{$i}:{$item}{$last ? '!' : ','}</li>
  </Loop>
  </ul>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("0:a,"));
    assert!(page.text().contains("2:c!"));
}

#[test]
fn object_iteration_by_field() {
    let doc = r#"
<WeftInit init="{ { scores: { math: 3, art: 5 } } }"></WeftInit>
<WeftRoot>
  <Loop each="$score, $name as field of {@Global.scores} marked by field">
    <span>{$name}={$score};</span>
  </Loop>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("math=3;"));
    assert!(page.text().contains("art=5;"));
}

#[test]
fn empty_iteration_falls_through_to_else() {
    let doc = r#"
<WeftInit init="{ { rows: [] } }"></WeftInit>
<WeftRoot>
  <Loop each="$r of {@Global.rows} marked by index">
    <span>{$r}</span>
  </Loop>
  <Else><span id="empty">nothing here</span></Else>
  <button id="fill" onclick="@{ @Global.rows = ['x'] }">fill</button>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("nothing here"));

    page.click("#fill").unwrap();
    assert!(!page.text().contains("nothing here"));
    assert!(page.text().contains("x"));
}

#[test]
fn duplicate_markers_fail_the_root() {
    let doc = r#"
<WeftInit init="{ { rows: [1, 1] } }"></WeftInit>
<WeftRoot>
  <Loop each="$r of {@Global.rows} marked by {$r}">
    <span>{$r}</span>
  </Loop>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.html().contains("w-error"), "html: {}", page.html());
}

#[test]
fn sibling_sids_are_independent_of_row_count() {
    let doc = r#"
<WeftInit init="{ { rows: [1, 2] } }"></WeftInit>
<WeftRoot>
  <p id="before">before</p>
  <Loop each="$r of {@Global.rows} marked by {$r}">
    <span>{$r}</span>
  </Loop>
  <p id="after">after</p>
  <button id="grow" onclick="@{ @Global.rows = [1, 2, 3, 4] }">grow</button>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    let before = page.find("#after").unwrap().sid;
    page.click("#grow").unwrap();
    assert_eq!(page.find("#after").unwrap().sid, before);
    assert_eq!(page.find("#before").unwrap().sid, page.find("#before").unwrap().sid);
}
