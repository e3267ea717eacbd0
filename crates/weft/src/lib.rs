//! Weft: a declarative markup layer embedded in ordinary HTML.
//!
//! Authors extend HTML with structural tags (`When`/`Else`, `Loop`,
//! component templates, slots, `Url`) and two expression forms — pure `{…}`
//! and effect `@{…}` — over a reactive state tree of named namespaces. The
//! runtime walks each declarative root, computes stable structural
//! identifiers, and keeps the rendered output consistent with state as
//! events fire.

pub mod bootstrap;
pub mod error;
pub mod expr;
pub mod handle;
pub mod harness;
pub mod render;
pub mod scope;
pub mod sid;
pub mod state;
pub mod template;
pub mod url;
pub mod value;
pub mod vdom;

pub use error::{Result, WeftError};
pub use expr::{CompileStrategy, Externals};
pub use handle::{Cursor, Handle, Mode};
pub use harness::Page;
pub use render::Runtime;
pub use scope::Scope;
pub use value::Value;
