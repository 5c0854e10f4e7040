//! Aggregation-Aware Compiler.
//!
//! An aggregation-aware class mapping is split into a main mapping
//! (`<id>_Main`) and one aggregate mapping per declared view
//! (`<id>_Aggregate_<index>`, 0-based in declaration order). Every part is an
//! ordinary relational mapping; the aggregate specifications are resolved
//! against the properties of the mapped class.

use tracing::debug;

use crate::model::ast::{AggregateSpecificationDef, AggregationAwareDef, PropertyPathDef};
use crate::model::object::PropertyType;
use crate::store::UsageSink;

use super::class_mapping::{ClassMappingResolver, Header};
use super::error::{MappingError, SemanticResult};
use super::resolved::{
    AggregateSetImplementation, AggregateSpecification, AggregateValue,
    AggregationAwareSetImplementation, PropertyPath,
};
use super::ResolutionContext;

pub fn main_id(id: &str) -> String {
    format!("{}_Main", id)
}

pub fn aggregate_id(id: &str, index: usize) -> String {
    format!("{}_Aggregate_{}", id, index)
}

pub(super) fn resolve(
    resolver: &ClassMappingResolver<'_>,
    header: &Header<'_>,
    def: &AggregationAwareDef,
    usages: &mut dyn UsageSink,
) -> SemanticResult<AggregationAwareSetImplementation> {
    let main_header = Header {
        id: main_id(&header.id),
        class: header.class,
        root: false,
        declared_root: false,
        extends: header.extends,
        span: header.span,
    };
    let main = resolver.set_implementation(&main_header, &def.main_mapping, &mut *usages)?;

    let mut aggregates = Vec::with_capacity(def.views.len());
    for (index, view) in def.views.iter().enumerate() {
        let specification = specification(resolver.context(), header.class, &view.model_operation)?;
        let aggregate_header = Header {
            id: aggregate_id(&header.id, index),
            class: header.class,
            root: false,
            declared_root: false,
            extends: None,
            span: &view.span,
        };
        let set_implementation =
            resolver.set_implementation(&aggregate_header, &view.aggregate_mapping, &mut *usages)?;
        aggregates.push(AggregateSetImplementation {
            index,
            specification,
            set_implementation,
        });
    }
    debug!(id = %header.id, aggregates = aggregates.len(), "resolved aggregation-aware mapping");

    Ok(AggregationAwareSetImplementation {
        id: header.id.clone(),
        class: header.class.to_string(),
        root: header.root,
        declared_root: header.declared_root,
        main,
        aggregates,
        span: header.span.clone(),
    })
}

/// Resolve a view's model operation against the mapped class.
pub fn specification(
    ctx: &ResolutionContext<'_>,
    class: &str,
    def: &AggregateSpecificationDef,
) -> SemanticResult<AggregateSpecification> {
    let group_by_functions = def
        .group_by_functions
        .iter()
        .map(|path| property_path(ctx, class, path))
        .collect::<SemanticResult<Vec<_>>>()?;

    let mut aggregate_values = Vec::with_capacity(def.aggregate_values.len());
    for value in &def.aggregate_values {
        let map_fn = property_path(ctx, class, &value.map_fn)?;
        let name = value.aggregate_fn.as_str();
        if ctx.model.find_function(name, &map_fn.return_type).is_none() {
            return Err(MappingError::AggregateFunctionNotFound {
                name: name.to_string(),
                argument: map_fn.return_type.to_string(),
            }
            .at(&value.aggregate_fn.span));
        }
        aggregate_values.push(AggregateValue {
            map_fn,
            aggregate_fn: name.to_string(),
        });
    }

    Ok(AggregateSpecification {
        can_aggregate: def.can_aggregate,
        group_by_functions,
        aggregate_values,
    })
}

/// Walk `$this.a.b` from `class`, one property per step.
fn property_path(ctx: &ResolutionContext<'_>, class: &str, def: &PropertyPathDef) -> SemanticResult<PropertyPath> {
    let mut return_type = PropertyType::Class(class.to_string());
    for step in &def.properties {
        // Primitive and enumeration values have no properties to step into.
        let property = return_type
            .class_path()
            .and_then(|current| ctx.model.find_property(current, step.as_str()))
            .ok_or_else(|| {
                MappingError::AggregateUnknownProperty {
                    property: step.value.clone(),
                    class: return_type.to_string(),
                }
                .at(&step.span)
            })?;
        return_type = property.property_type.clone();
    }
    Ok(PropertyPath {
        properties: def.properties.iter().map(|p| p.value.clone()).collect(),
        return_type,
    })
}
