//! # relmap
//!
//! Resolution and validation of object-to-relational mapping graphs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Parsed definitions (model::ast, JSON)           │
//! │      databases, mapping units, object model              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [store]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     StoreModel                           │
//! │   tables, views, joins, filters, milestoning             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [semantic]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ResolvedMapping                         │
//! │   includes + substitution, class / association /         │
//! │   enumeration mappings, roots, join paths                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compile]
//! ┌─────────────────────────────────────────────────────────┐
//! │             CompiledGraph snapshot                       │
//! │   incremental: unchanged units are reused                │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod compile;
pub mod config;
pub mod diagnostics;
pub mod fingerprint;
pub mod model;
pub mod semantic;
pub mod store;

pub use compile::{CompileError, CompiledGraph, Workspace, WorkspaceDef};
pub use diagnostics::{Diagnostic, ErrorKind};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{CompileError, CompiledGraph, UnitDiagnostic, Workspace, WorkspaceDef};
    pub use crate::config::{ResolutionSettings, Settings};
    pub use crate::diagnostics::{Diagnostic, ErrorKind};
    pub use crate::model::ast::{DatabaseDef, MappingDef};
    pub use crate::model::{ModelRegistry, ObjectModel, SourceSpan, Spanned};
    pub use crate::semantic::{ClassMapping, EffectiveClassMapping, ResolvedMapping};
    pub use crate::store::{StoreModel, TableAlias};
}
