//! Error taxonomy for the runtime.
//!
//! Every failure is surfaced as a `WeftError`. Pure-mode text interpolation
//! captures errors locally (rendered as a bracketed marker); everything else
//! propagates to the enclosing component boundary, where the mount replaces
//! the subtree with an error-indicator node.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeftError {
    /// A pure-mode handle write was attempted.
    #[error("cannot mutate state from a pure expression: {location}")]
    PureMutation { location: String },

    /// Case-insensitive collision in value or handle bindings.
    #[error("name collision: '{incoming}' conflicts with existing binding '{existing}'")]
    NameCollision { existing: String, incoming: String },

    /// Malformed `def`, `each`, or reserved-attribute syntax.
    #[error("syntax error in {attribute}: {message}")]
    SyntaxShape { attribute: String, message: String },

    /// `init` evaluated to a non-object, appeared twice for one component,
    /// or was declared on a bound form.
    #[error("invalid init: {0}")]
    InitShape(String),

    /// Two rows of one iteration expansion produced equal markers.
    #[error("duplicate iteration marker '{0}'")]
    DuplicateMarker(String),

    /// A use-site refers to a component that was never defined.
    #[error("component template '{0}' not found")]
    TemplateNotFound(String),

    /// Multiple global-init tags, or a global-init after a declarative root.
    #[error("structural violation: {0}")]
    StructuralViolation(String),

    /// The expression text did not parse under the host expression language.
    #[error("failed to compile expression '{text}': {message}")]
    ExprParse { text: String, message: String },

    /// An expression failed during evaluation.
    #[error("expression error: {0}")]
    ExprEval(String),

    /// The host HTML document did not parse.
    #[error("template error: {0}")]
    Template(String),
}

pub type Result<T> = std::result::Result<T, WeftError>;

impl WeftError {
    pub fn eval(message: impl Into<String>) -> Self {
        Self::ExprEval(message.into())
    }

    pub fn syntax(attribute: &str, message: impl Into<String>) -> Self {
        Self::SyntaxShape {
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }
}
