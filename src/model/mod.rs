//! Input model: parsed store/mapping definitions and the object-model collaborator.

pub mod ast;
pub mod object;
pub mod span;
pub mod types;

pub use object::{
    Association, Class, Enumeration, FunctionSignature, ModelRegistry, ObjectModel,
    ObjectModelDef, Property, PropertyType, QualifiedProperty, Temporal,
};
pub use span::{SourceSpan, Spanned};
pub use types::{DataType, Multiplicity, PrimitiveType};

use regex::Regex;
use std::sync::LazyLock;

static NON_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^A-Za-z0-9_]+").expect("identifier pattern is valid")
});

/// Default id of a mapping element: the element path with every
/// non-identifier run replaced by `_` (`model::Person` -> `model_Person`).
pub fn default_id(path: &str) -> String {
    NON_IDENTIFIER.replace_all(path, "_").into_owned()
}
