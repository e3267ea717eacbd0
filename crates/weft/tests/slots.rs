//! Slot projection: caller children fill the default slot, named slots
//! route by tag, and template-side fallbacks render when nothing is given.

use weft::Page;

#[test]
fn default_slot_receives_caller_children() {
    let doc = r#"
<WeftRoot>
  <Card:Template params="$title">
    <h2>{$title}</h2>
    <Card:Slot></Card:Slot>
  </Card:Template>
  <Card title="Hi"><p>Body</p></Card>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    let html = page.html();
    assert!(html.contains("<h2>Hi</h2>"), "html: {html}");
    assert!(html.contains("<p>Body</p>"));
}

#[test]
fn fallback_renders_when_no_content_is_provided() {
    let doc = r#"
<WeftRoot>
  <Card:Template params="$title">
    <h2>{$title}</h2>
    <Card:Slot>Default</Card:Slot>
  </Card:Template>
  <Card title="Empty"></Card>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("Default"));
}

#[test]
fn named_slots_route_by_tag_and_render_in_caller_scope() {
    let doc = r#"
<WeftInit init="{ { who: 'world' } }"></WeftInit>
<WeftRoot>
  <Panel:Template>
    <header><Title:Slot>untitled</Title:Slot></header>
    <main><Panel:Slot></Panel:Slot></main>
  </Panel:Template>
  <Panel>
    <Title><b>hello {@Global.who}</b></Title>
    <p>content</p>
  </Panel>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    let html = page.html();
    assert!(html.contains("<b>hello world</b>"), "html: {html}");
    assert!(html.contains("<p>content</p>"));
    assert!(!page.text().contains("untitled"));
}

#[test]
fn handle_parameters_share_state_with_the_caller() {
    let doc = r#"
<WeftInit init="{ { profile: { name: 'Ada' } } }"></WeftInit>
<WeftRoot>
  <Editor:Template params="@target">
    <button id="rename" onclick="@{ @target.name = 'Grace' }">rename</button>
  </Editor:Template>
  <Editor target="@Global.profile"></Editor>
  <span id="echo">{@Global.profile.name}</span>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("Ada"));
    page.click("#rename").unwrap();
    assert!(page.text().contains("Grace"));
}

#[test]
fn unknown_component_reports_template_not_found() {
    let doc = "<WeftRoot><Ghost></Ghost></WeftRoot>";
    let page = Page::open(doc).unwrap();
    let html = page.html();
    assert!(html.contains("w-error"), "html: {html}");
    assert!(html.contains("Ghost"));
}
