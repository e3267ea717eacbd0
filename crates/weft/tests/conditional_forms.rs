//! Conditional chains: branch selection, SID stability across branch flips,
//! and per-branch forms keeping independent local state.

use weft::Page;

const DOC: &str = r#"
<WeftInit init="{ { mode: 'a' } }"></WeftInit>
<WeftRoot>
  <p id="head">head</p>
  <When test="{@Global.mode == 'a'}">
    <form id="fa"><input name="x" id="xa"></form>
  </When>
  <Else test="{@Global.mode == 'b'}">
    <form id="fb"><input name="x" id="xb"></form>
  </Else>
  <Else>
    <span id="other">neither</span>
  </Else>
  <p id="tail">tail</p>
  <button id="to-a" onclick="@{ @Global.mode = 'a' }">a</button>
  <button id="to-b" onclick="@{ @Global.mode = 'b' }">b</button>
  <button id="to-c" onclick="@{ @Global.mode = 'c' }">c</button>
</WeftRoot>
"#;

#[test]
fn first_truthy_branch_wins() {
    let page = Page::open(DOC).unwrap();
    assert!(page.find("#fa").is_some());
    assert!(page.find("#fb").is_none());
    assert!(page.find("#other").is_none());

    page.click("#to-b").unwrap();
    assert!(page.find("#fa").is_none());
    assert!(page.find("#fb").is_some());

    page.click("#to-c").unwrap();
    assert!(page.find("#other").is_some());
}

#[test]
fn branch_forms_keep_independent_values() {
    let page = Page::open(DOC).unwrap();
    page.input("#xa", "alpha").unwrap();

    page.click("#to-b").unwrap();
    page.input("#xb", "beta").unwrap();

    page.click("#to-a").unwrap();
    assert_eq!(
        page.find("#xa").unwrap().prop_text("value").as_deref(),
        Some("alpha")
    );

    page.click("#to-b").unwrap();
    assert_eq!(
        page.find("#xb").unwrap().prop_text("value").as_deref(),
        Some("beta")
    );
}

#[test]
fn neighbors_keep_their_sids_when_the_branch_flips() {
    let page = Page::open(DOC).unwrap();
    let head = page.find("#head").unwrap().sid;
    let tail = page.find("#tail").unwrap().sid;

    page.click("#to-b").unwrap();
    assert_eq!(page.find("#head").unwrap().sid, head);
    assert_eq!(page.find("#tail").unwrap().sid, tail);

    page.click("#to-c").unwrap();
    assert_eq!(page.find("#tail").unwrap().sid, tail);
}

#[test]
fn else_without_when_is_rejected() {
    let doc = "<WeftRoot><Else><p>lost</p></Else></WeftRoot>";
    let page = Page::open(doc).unwrap();
    assert!(page.html().contains("w-error"));
}
