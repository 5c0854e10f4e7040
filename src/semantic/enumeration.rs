//! Enumeration mappings: source values -> enum values.

use std::collections::HashSet;
use std::mem::discriminant;

use tracing::debug;

use crate::model::ast::{EnumerationMappingDef, EnumSourceValue};
use crate::model::default_id;
use crate::model::object::ObjectModel;

use super::error::{MappingError, SemanticResult};
use super::resolved::EnumerationMapping;

pub fn enumeration_mapping_id(def: &EnumerationMappingDef) -> String {
    def.id
        .as_ref()
        .map(|id| id.value.clone())
        .unwrap_or_else(|| default_id(def.enumeration.as_str()))
}

pub fn resolve_enumeration_mapping(
    model: &dyn ObjectModel,
    def: &EnumerationMappingDef,
) -> SemanticResult<EnumerationMapping> {
    let path = def.enumeration.as_str();
    let enumeration = model.enumeration(path).ok_or_else(|| {
        MappingError::UnknownType {
            path: path.to_string(),
        }
        .at(&def.enumeration.span)
    })?;
    let id = enumeration_mapping_id(def);

    let mut seen = HashSet::new();
    let mut source_kind = None;
    let mut values = Vec::with_capacity(def.values.len());
    for mapping in &def.values {
        let value = mapping.value.as_str();
        if !enumeration.values.iter().any(|v| v == value) {
            return Err(MappingError::UnknownEnumValue {
                value: value.to_string(),
                enumeration: path.to_string(),
            }
            .at(&mapping.value.span));
        }
        if !seen.insert(value) {
            return Err(MappingError::DuplicateEnumValue {
                value: value.to_string(),
                id: id.clone(),
            }
            .at(&mapping.value.span));
        }
        for source in &mapping.sources {
            let kind = discriminant(source);
            if *source_kind.get_or_insert(kind) != kind {
                return Err(MappingError::MixedEnumSourceTypes { id: id.clone() }.at(&mapping.value.span));
            }
        }
        values.push((value.to_string(), mapping.sources.clone()));
    }

    debug!(id = %id, values = values.len(), "resolved enumeration mapping");
    Ok(EnumerationMapping {
        id,
        enumeration: path.to_string(),
        values,
        span: def.span.clone(),
    })
}

/// Human-readable form of a source value, as written in the mapping.
pub fn describe_source(source: &EnumSourceValue) -> String {
    match source {
        EnumSourceValue::String(s) => format!("'{}'", s),
        EnumSourceValue::Integer(i) => i.to_string(),
    }
}
