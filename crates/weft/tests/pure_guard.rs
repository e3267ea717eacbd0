//! Pure-mode guarantees: mutation attempts inside `{…}` are rejected and
//! surfaced as a bracketed marker without losing the rest of the UI.

use weft::{Handle, Page};

#[test]
fn pure_mutation_renders_a_marker_and_leaves_state_untouched() {
    let doc = r#"
<WeftRoot>
  <p id="bad">{ (@Global.x = 1) }</p>
  <p id="good">still here</p>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    let text = page.text();
    assert!(text.contains("[Error:"), "text: {text}");
    assert!(text.contains("still here"));
    assert_eq!(
        page.runtime().store.read(&Handle::root("global").child("x")),
        weft::Value::Null
    );
}

#[test]
fn effect_mode_write_is_observed_by_the_next_read() {
    let doc = r#"
<WeftRoot>
  <button id="set" onclick="@{ @Global.x = 41; @Global.x = @Global.x + 1 }">set</button>
  <span id="echo">{@Global.x}</span>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    page.click("#set").unwrap();
    // Both writes from one handler batch into a single rerender.
    assert!(page.text().contains("42"));
    assert_eq!(
        page.runtime().store.read(&Handle::root("global").child("x")),
        weft::Value::Number(42.0)
    );
}

#[test]
fn null_safe_chaining_reads_as_empty() {
    let doc = r#"
<WeftRoot>
  <span id="echo">[{@Global.missing.deeply.nested}]</span>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("[]"), "text: {}", page.text());
}
