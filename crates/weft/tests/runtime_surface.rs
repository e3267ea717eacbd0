//! Debug surface, compile-strategy plumbing, imports, and
//! clear-on-unmount semantics.

use std::cell::Cell;
use std::rc::Rc;
use weft::expr::{CompileStrategy, CompiledFn, DefaultStrategy};
use weft::{Page, Result, Value};

#[test]
fn cache_counters_and_reset() {
    let doc = r#"
<WeftRoot>
  <span>{1 + 1}</span>
  <span>{1 + 1}</span>
  <span>{2 + 2}</span>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    let exprs = &page.runtime().exprs;
    let after_first = exprs.compile_count();
    assert!(after_first >= 2);
    assert!(exprs.size() >= 2);

    // A rerender hits the caches: no new compiles.
    page.runtime().store.set_namespace(
        "global",
        Value::object([("tick", Value::Number(1.0))]),
    );
    page.flush();
    assert_eq!(exprs.compile_count(), after_first);

    exprs.reset();
    assert_eq!(exprs.size(), 0);
    assert_eq!(exprs.compile_count(), 0);
}

struct CountingStrategy {
    calls: Rc<Cell<u64>>,
    inner: DefaultStrategy,
}

impl CompileStrategy for CountingStrategy {
    fn compile(&self, params: &[String], body: &str) -> Result<CompiledFn> {
        self.calls.set(self.calls.get() + 1);
        self.inner.compile(params, body)
    }
}

#[test]
fn installed_strategy_owns_compilation() {
    let calls = Rc::new(Cell::new(0));
    let doc = "<WeftRoot><span>{40 + 2}</span></WeftRoot>";
    let page = Page::open_configured(doc, "", |runtime| {
        runtime.exprs.set_strategy(Rc::new(CountingStrategy {
            calls: calls.clone(),
            inner: DefaultStrategy,
        }));
    })
    .unwrap();
    assert!(page.text().contains("42"));
    assert!(calls.get() >= 1);
}

#[test]
fn imports_resolve_case_sensitively_through_externals() {
    let doc = r#"
<WeftRoot>
  <p import="shout, greeting" id="ok">{shout(greeting)}</p>
  <p import="shout" id="bad">{shout(greeting)}</p>
</WeftRoot>
"#;
    let page = Page::open_configured(doc, "", |runtime| {
        runtime
            .externals
            .register_value("greeting", Value::text("hi"));
        runtime.externals.register_fn("shout", |args| {
            Ok(Value::text(args[0].to_text().to_ascii_uppercase()))
        });
    })
    .unwrap();
    let text = page.text();
    // The importing element sees both names; the second did not import
    // `greeting`, so its interpolation degrades to an error marker.
    assert!(text.contains("HI"), "text: {text}");
    assert!(text.contains("[Error:"));
}

#[test]
fn clear_on_unmount_drops_local_state() {
    let doc = r#"
<WeftInit init="{ { show: true } }"></WeftInit>
<WeftRoot>
  <When test="{@Global.show}">
    <form clear-on-unmount>
      <input name="x" id="x">
    </form>
  </When>
  <button id="hide" onclick="@{ @Global.show = false }">hide</button>
  <button id="show" onclick="@{ @Global.show = true }">show</button>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    page.input("#x", "typed").unwrap();
    page.click("#hide").unwrap();
    page.click("#show").unwrap();
    assert_eq!(
        page.find("#x").unwrap().prop_text("value").as_deref(),
        Some("")
    );
}

#[test]
fn without_clear_on_unmount_state_persists() {
    let doc = r#"
<WeftInit init="{ { show: true } }"></WeftInit>
<WeftRoot>
  <When test="{@Global.show}">
    <form><input name="x" id="x"></form>
  </When>
  <button id="hide" onclick="@{ @Global.show = false }">hide</button>
  <button id="show" onclick="@{ @Global.show = true }">show</button>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    page.input("#x", "typed").unwrap();
    page.click("#hide").unwrap();
    page.click("#show").unwrap();
    assert_eq!(
        page.find("#x").unwrap().prop_text("value").as_deref(),
        Some("typed")
    );
}

#[test]
fn explicit_markers_key_structural_identity() {
    let doc = r#"
<WeftRoot>
  <p marker="alpha" id="a">x</p>
  <p marker="{'be' + 'ta'}" id="b">y</p>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    let a = page.find("#a").unwrap().sid;
    let b = page.find("#b").unwrap().sid;
    assert_ne!(a, b);
    // Deterministic across rerenders.
    page.runtime()
        .store
        .set_namespace("global", Value::object([("tick", Value::Number(1.0))]));
    page.flush();
    assert_eq!(page.find("#a").unwrap().sid, a);
}

#[test]
fn case_insensitive_author_identifiers() {
    let doc = r#"
<WeftRoot>
  <p def="$Greeting := {'hello'}">{$greeting} {$GREETING}</p>
  <p def="@State as local">
    <button id="set" onclick="@{ @state.n = 7 }">set</button>
    <span>[{@STATE.n}]</span>
  </p>
</WeftRoot>
"#;
    let page = Page::open(doc).unwrap();
    assert!(page.text().contains("hello hello"));
    page.click("#set").unwrap();
    assert!(page.text().contains("[7]"));
}
