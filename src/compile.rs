//! Compilation-unit manager: sources in, resolved mapping graph out.
//!
//! A [`Workspace`] holds the current database and mapping sources. Every
//! [`Workspace::compile`] is one transaction:
//!
//! ```text
//! databases ──fingerprint──▶ StoreModel (rebuilt only when changed)
//!                                  │
//! mappings ──IncludeGraph──▶ compile order (included units first)
//!                                  │
//!              per unit: reuse ◀── fingerprint ──▶ resolve_mapping
//!                                  │
//!                           CompiledGraph snapshot
//! ```
//!
//! A unit whose source and dependencies are unchanged keeps its previous
//! `Arc<ResolvedMapping>`, so untouched units stay pointer-identical across
//! edits. A failing unit keeps its last good state and blocks the units
//! that include it.
//!
//! # Example
//!
//! ```ignore
//! use relmap::compile::Workspace;
//!
//! let mut workspace = Workspace::new(model, settings.resolution);
//! workspace.upsert_database(database);
//! workspace.upsert_mapping(mapping);
//! let graph = workspace.compile()?;
//! let person = graph.root_class_mapping("model::PersonMapping", "model::Person");
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::ResolutionSettings;
use crate::diagnostics::Diagnostic;
use crate::fingerprint::{combine, fingerprint};
use crate::model::ast::{DatabaseDef, MappingDef};
use crate::model::object::{ModelRegistry, ObjectModel, ObjectModelDef};
use crate::semantic::{
    resolve_mapping, AssociationMapping, EffectiveClassMapping, EffectiveSetImplementation, IncludeGraph,
    MappingError, ResolutionContext, ResolvedMapping,
};
use crate::store::StoreModel;

// ============================================================================
// Error Types
// ============================================================================

/// A diagnostic attributed to the mapping unit it was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitDiagnostic {
    pub unit: String,
    pub diagnostic: Diagnostic,
}

/// Errors that can occur during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The store model is invalid; nothing was committed.
    #[error("Store error: {0}")]
    Store(Diagnostic),

    /// Some units failed; the snapshot was committed with their last good
    /// state.
    #[error("{} mapping unit(s) failed to compile", .0.len())]
    Mappings(Vec<UnitDiagnostic>),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

impl CompileError {
    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        match self {
            CompileError::Store(diagnostic) => vec![diagnostic],
            CompileError::Mappings(failures) => failures.iter().map(|f| &f.diagnostic).collect(),
            CompileError::Fingerprint(_) => Vec::new(),
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// Serialized workspace
// ============================================================================

/// A whole workspace as one JSON document: object model, databases and
/// mapping units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceDef {
    #[serde(default)]
    pub model: ObjectModelDef,
    #[serde(default)]
    pub databases: Vec<DatabaseDef>,
    #[serde(default)]
    pub mappings: Vec<MappingDef>,
}

// ============================================================================
// Compiled graph
// ============================================================================

/// Immutable result of one compilation transaction.
#[derive(Debug, Default)]
pub struct CompiledGraph {
    store: Arc<StoreModel>,
    store_fingerprint: Option<String>,
    mappings: HashMap<String, Arc<ResolvedMapping>>,
    /// Unit -> fingerprint of its source, the store and its includes.
    fingerprints: HashMap<String, String>,
}

impl CompiledGraph {
    /// The store model of the transaction that produced this graph. A unit
    /// retained from an earlier transaction carries its own in
    /// [`ResolvedMapping::store`].
    pub fn store(&self) -> &StoreModel {
        &self.store
    }

    pub fn mapping(&self, name: &str) -> Option<&Arc<ResolvedMapping>> {
        self.mappings.get(name)
    }

    /// Names of the units with a resolved state, sorted.
    pub fn mapping_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.mappings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// A class mapping by id as seen from `mapping`, includes and store
    /// substitution applied.
    pub fn class_mapping(&self, mapping: &str, id: &str) -> Option<EffectiveClassMapping<'_>> {
        self.mapping(mapping)?.class_mapping(id)
    }

    /// Any relational mapping by id as seen from `mapping`, including the
    /// generated `_Main` and `_Aggregate_<i>` mappings.
    pub fn set_implementation(&self, mapping: &str, id: &str) -> Option<EffectiveSetImplementation<'_>> {
        self.mapping(mapping)?.set_implementation(id)
    }

    pub fn root_class_mapping(&self, mapping: &str, class: &str) -> Option<EffectiveClassMapping<'_>> {
        self.mapping(mapping)?.root_class_mapping(class)
    }

    pub fn association_mapping(&self, mapping: &str, id: &str) -> Option<AssociationMapping> {
        self.mapping(mapping)?.association_mapping(id)
    }
}

// ============================================================================
// Workspace
// ============================================================================

#[derive(Debug)]
pub struct Workspace {
    model: Arc<dyn ObjectModel>,
    settings: ResolutionSettings,
    databases: BTreeMap<String, DatabaseDef>,
    mappings: BTreeMap<String, MappingDef>,
    snapshot: Arc<CompiledGraph>,
}

impl Workspace {
    pub fn new(model: Arc<dyn ObjectModel>, settings: ResolutionSettings) -> Self {
        Self {
            model,
            settings,
            databases: BTreeMap::new(),
            mappings: BTreeMap::new(),
            snapshot: Arc::new(CompiledGraph::default()),
        }
    }

    /// Load a serialized workspace. Nothing is compiled yet.
    pub fn from_def(def: WorkspaceDef, settings: ResolutionSettings) -> Self {
        let mut workspace = Self::new(Arc::new(ModelRegistry::from(def.model)), settings);
        for database in def.databases {
            workspace.upsert_database(database);
        }
        for mapping in def.mappings {
            workspace.upsert_mapping(mapping);
        }
        workspace
    }

    pub fn upsert_database(&mut self, def: DatabaseDef) {
        self.databases.insert(def.name.value.clone(), def);
    }

    pub fn remove_database(&mut self, name: &str) -> Option<DatabaseDef> {
        self.databases.remove(name)
    }

    pub fn upsert_mapping(&mut self, def: MappingDef) {
        self.mappings.insert(def.name.value.clone(), def);
    }

    pub fn remove_mapping(&mut self, name: &str) -> Option<MappingDef> {
        self.mappings.remove(name)
    }

    /// The last committed graph.
    pub fn snapshot(&self) -> Arc<CompiledGraph> {
        Arc::clone(&self.snapshot)
    }

    /// Compile the current sources and commit the result.
    ///
    /// A store failure rejects the whole transaction. Mapping failures are
    /// reported after the snapshot is committed; each failing unit keeps its
    /// last good state, together with the store model it was resolved
    /// against.
    #[instrument(name = "compile_workspace", skip_all, fields(databases = self.databases.len(), mappings = self.mappings.len()))]
    pub fn compile(&mut self) -> CompileResult<Arc<CompiledGraph>> {
        let previous = Arc::clone(&self.snapshot);

        let databases: Vec<&DatabaseDef> = self.databases.values().collect();
        let store_fingerprint = fingerprint(&databases)?;
        let store_changed = previous.store_fingerprint.as_deref() != Some(store_fingerprint.as_str());
        let store = if store_changed {
            let defs: Vec<DatabaseDef> = self.databases.values().cloned().collect();
            match StoreModel::build(&defs, &self.settings) {
                Ok(store) => Arc::new(store),
                Err(diagnostic) => {
                    warn!(%diagnostic, "store model rejected");
                    return Err(CompileError::Store(diagnostic));
                }
            }
        } else {
            Arc::clone(&previous.store)
        };

        let graph = IncludeGraph::build(self.mappings.values());
        let mut compiled: HashMap<String, Arc<ResolvedMapping>> = HashMap::new();
        let mut fingerprints: HashMap<String, String> = HashMap::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut failures = Vec::new();
        let mut reused = 0usize;

        for name in graph.compile_order() {
            let Some(def) = self.mappings.get(&name) else {
                continue;
            };

            let outcome = match graph.validate(def) {
                Err(diagnostic) => Err(diagnostic),
                Ok(()) => match def.includes.iter().find(|i| failed.contains(i.mapping.as_str())) {
                    Some(blocker) => {
                        warn!(unit = %name, included = %blocker.mapping.value, "unit blocked by failed include");
                        Err(MappingError::BlockedByInclude {
                            mapping: name.clone(),
                            included: blocker.mapping.value.clone(),
                        }
                        .at(&blocker.span))
                    }
                    None => {
                        let source = fingerprint(def)?;
                        let includes = def
                            .includes
                            .iter()
                            .filter_map(|i| fingerprints.get(i.mapping.as_str()).map(String::as_str));
                        let unit_fingerprint =
                            combine([store_fingerprint.as_str(), source.as_str()].into_iter().chain(includes));

                        let unchanged = !store_changed
                            && previous.fingerprints.get(&name) == Some(&unit_fingerprint);
                        match previous.mappings.get(&name).filter(|_| unchanged) {
                            Some(mapping) => {
                                reused += 1;
                                Ok((Arc::clone(mapping), unit_fingerprint))
                            }
                            None => {
                                let ctx = ResolutionContext {
                                    model: self.model.as_ref(),
                                    store: &store,
                                    settings: &self.settings,
                                    compiled: &compiled,
                                };
                                resolve_mapping(&ctx, def).map(|m| (Arc::new(m), unit_fingerprint))
                            }
                        }
                    }
                },
            };

            match outcome {
                Ok((mapping, unit_fingerprint)) => {
                    compiled.insert(name.clone(), mapping);
                    fingerprints.insert(name, unit_fingerprint);
                }
                Err(diagnostic) => {
                    warn!(unit = %name, %diagnostic, "unit failed to compile");
                    // The retained unit still holds the store it was resolved
                    // against, so it stays valid across a store rebuild.
                    if let Some(mapping) = previous.mappings.get(&name) {
                        compiled.insert(name.clone(), Arc::clone(mapping));
                        if let Some(fp) = previous.fingerprints.get(&name) {
                            fingerprints.insert(name.clone(), fp.clone());
                        }
                    }
                    failed.insert(name.clone());
                    failures.push(UnitDiagnostic { unit: name, diagnostic });
                }
            }
        }

        info!(
            units = compiled.len(),
            reused,
            failed = failures.len(),
            store_rebuilt = store_changed,
            "compiled workspace"
        );
        let snapshot = Arc::new(CompiledGraph {
            store,
            store_fingerprint: Some(store_fingerprint),
            mappings: compiled,
            fingerprints,
        });
        self.snapshot = Arc::clone(&snapshot);

        if failures.is_empty() {
            Ok(snapshot)
        } else {
            Err(CompileError::Mappings(failures))
        }
    }
}
