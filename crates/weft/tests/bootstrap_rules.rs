//! Bootstrap structure: global-init placement rules, template preservation,
//! and root-level reserved attributes.

use weft::{Page, WeftError};

#[test]
fn global_init_merges_into_the_global_namespace() {
    let doc = r#"
<WeftInit init="{ { app: { name: 'demo' }, count: 1 } }"></WeftInit>
<WeftRoot>
  <span>{@Global.app.name}/{@Global.count}</span>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("demo/1"));
}

#[test]
fn two_global_inits_violate_structure() {
    let doc = r#"
<WeftInit init="{ { a: 1 } }"></WeftInit>
<WeftInit init="{ { b: 2 } }"></WeftInit>
<WeftRoot></WeftRoot>
"#;
    let error = Page::open(doc).unwrap_err();
    assert!(matches!(error, WeftError::StructuralViolation(_)));
}

#[test]
fn global_init_after_a_root_violates_structure() {
    let doc = r#"
<WeftRoot></WeftRoot>
<WeftInit init="{ { a: 1 } }"></WeftInit>
"#;
    let error = Page::open(doc).unwrap_err();
    assert!(matches!(error, WeftError::StructuralViolation(_)));
}

#[test]
fn non_object_global_init_is_rejected() {
    let doc = r#"
<WeftInit init="{ 42 }"></WeftInit>
<WeftRoot></WeftRoot>
"#;
    let error = Page::open(doc).unwrap_err();
    assert!(matches!(error, WeftError::InitShape(_)));
}

#[test]
fn root_reserved_attributes_apply_in_order() {
    let doc = r#"
<WeftRoot def="$shown := {'yes'}, @State as local" init="{ { seeded: 'ok' } }">
  <span>{$shown}/{@State.seeded}</span>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("yes/ok"), "text: {}", page.text());
}

#[test]
fn falsy_root_test_renders_nothing() {
    let doc = r#"
<WeftRoot test="{false}"><span>hidden</span></WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert_eq!(page.text().trim(), "");
}

#[test]
fn multiple_roots_share_the_store() {
    let doc = r#"
<WeftRoot>
  <button id="inc" onclick="@{ @Global.n = 1 }">inc</button>
</WeftRoot>
<WeftRoot>
  <span>[{@Global.n}]</span>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    page.click("#inc").unwrap();
    assert!(page.text().contains("[1]"));
}
