//! Semantic layer - mapping units resolved against a store model.
//!
//! Resolving a unit runs in four phases:
//!
//! 1. **Includes** - validate store substitutions and flatten the include
//!    closure (see [`include_graph`])
//! 2. **Enumerations** - enumeration mappings, used as transformers
//! 3. **Class mappings** - set implementations, roots and `extends`
//!    (see [`class_mapping`] and [`aggregation`])
//! 4. **Associations** - bindings between two class mappings
//!    (see [`association`])
//!
//! Every phase reads included units through shared `Arc`s and only ever
//! builds the state of the unit being resolved.

pub mod aggregation;
pub mod association;
pub mod class_mapping;
pub mod enumeration;
pub mod error;
pub mod include_graph;
pub mod join_path;
pub mod resolved;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::ResolutionSettings;
use crate::model::ast::MappingDef;
use crate::model::object::ObjectModel;
use crate::store::{NoUsages, ReferenceUsages, StoreModel, UsageSink};

pub use association::AssociationResolver;
pub use class_mapping::ClassMappingResolver;
pub use error::{MappingError, SemanticResult};
pub use include_graph::{IncludeGraph, SubstitutionMap};
pub use join_path::JoinPathResolver;
pub use resolved::{
    AggregateSetImplementation, AggregateSpecification, AggregationAwareSetImplementation,
    AssociationMapping, ClassMapping, EffectiveClassMapping, EffectiveSetImplementation,
    EmbeddedMapping, EnumerationMapping, PropertyMapping, PropertyValue, ResolvedInclude, ResolvedMapping,
    SetImplementation,
};

/// Everything a mapping unit is resolved against. All of it is read-only.
#[derive(Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub model: &'a dyn ObjectModel,
    /// Shared with every unit resolved against it.
    pub store: &'a Arc<StoreModel>,
    pub settings: &'a ResolutionSettings,
    /// Units resolved earlier in the same transaction, by name.
    pub compiled: &'a HashMap<String, Arc<ResolvedMapping>>,
}

/// Resolve one mapping unit. Every unit it includes must already be in
/// `ctx.compiled`; include-graph structure (cycles, unknown or duplicate
/// includes) is checked by [`IncludeGraph::validate`] beforehand.
#[instrument(name = "resolve_mapping", skip_all, fields(mapping = %def.name.value))]
pub fn resolve_mapping(ctx: &ResolutionContext<'_>, def: &MappingDef) -> SemanticResult<ResolvedMapping> {
    let name = def.name.as_str();

    // Phase 1: includes
    let mut includes = Vec::with_capacity(def.includes.len());
    for include in &def.includes {
        let included = ctx.compiled.get(include.mapping.as_str()).ok_or_else(|| {
            MappingError::UnknownMapping {
                mapping: include.mapping.value.clone(),
                includer: name.to_string(),
            }
            .at(&include.mapping.span)
        })?;
        let substitution = include_graph::validate_substitutions(ctx.store, ctx.model, include)?;
        include_graph::check_substituted_stores(name, include, &substitution, included, ctx.store)?;
        includes.push(ResolvedInclude {
            mapping: Arc::clone(included),
            substitution,
        });
    }
    let flattened = include_graph::flatten(name, &def.span, &includes)?;
    check_ids(def, &flattened)?;

    let mut unit = ResolvedMapping {
        name: name.to_string(),
        class_mappings: Vec::new(),
        association_mappings: Vec::new(),
        enumeration_mappings: Vec::new(),
        includes,
        flattened,
        roots: BTreeMap::new(),
        usages: ReferenceUsages::new(),
        store: Arc::clone(ctx.store),
        span: def.span.clone(),
    };

    // Phase 2: enumerations
    unit.enumeration_mappings = def
        .enumeration_mappings
        .iter()
        .map(|e| enumeration::resolve_enumeration_mapping(ctx.model, e))
        .collect::<SemanticResult<_>>()?;

    let mut recorded = ReferenceUsages::new();
    let mut discarded = NoUsages;
    let usages: &mut dyn UsageSink = if ctx.settings.record_usages {
        &mut recorded
    } else {
        &mut discarded
    };

    // Phase 3: class mappings
    let (class_mappings, roots) = ClassMappingResolver::new(ctx, &unit).resolve(&def.class_mappings, &mut *usages)?;

    // Phase 4: associations
    let association_mappings = {
        let resolver = AssociationResolver::new(ctx, &unit, &class_mappings, &roots);
        def.association_mappings
            .iter()
            .map(|a| resolver.resolve(a, &mut *usages))
            .collect::<SemanticResult<Vec<_>>>()?
    };

    unit.class_mappings = class_mappings;
    unit.association_mappings = association_mappings;
    unit.roots = roots;
    unit.usages = recorded;
    debug!(
        class_mappings = unit.class_mappings.len(),
        association_mappings = unit.association_mappings.len(),
        includes = unit.flattened.len(),
        "resolved mapping"
    );
    Ok(unit)
}

/// Ids are unique within a unit, then across the unit and everything it
/// includes.
fn check_ids(def: &MappingDef, flattened: &[ResolvedInclude]) -> SemanticResult<()> {
    let mut local = Vec::new();
    let mut seen = HashSet::new();
    let name = def.name.as_str();

    let mut declare = |id: String, span: &crate::model::span::SourceSpan| {
        if !seen.insert(id.clone()) {
            return Err(MappingError::DuplicateMappingId {
                id,
                mapping: name.to_string(),
            }
            .at(span));
        }
        local.push(id);
        Ok(())
    };

    for class_mapping in &def.class_mappings {
        let id = class_mapping::class_mapping_id(class_mapping);
        let span = class_mapping.id.as_ref().map_or(&class_mapping.span, |i| &i.span);
        for generated in class_mapping::generated_ids(&id, class_mapping) {
            declare(generated, span)?;
        }
        declare(id, span)?;
    }
    for association in &def.association_mappings {
        let span = association.id.as_ref().map_or(&association.span, |i| &i.span);
        declare(association::association_mapping_id(association), span)?;
    }
    for enumeration in &def.enumeration_mappings {
        let span = enumeration.id.as_ref().map_or(&enumeration.span, |i| &i.span);
        declare(enumeration::enumeration_mapping_id(enumeration), span)?;
    }

    let local: Vec<&str> = local.iter().map(String::as_str).collect();
    include_graph::check_duplicate_ids(name, &def.span, &local, flattened)
}
