//! Association Mapping Resolver.
//!
//! Each property binding of an association mapping joins two class mappings
//! named by `[sourceId, targetId]`, defaulting to the root mappings of the
//! association's end classes. The binding is resolved on the source
//! mapping's main table and must end on the target mapping's main table.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, instrument};

use crate::model::ast::{AssociationMappingDef, PropertyMappingBody, PropertyMappingDef};
use crate::model::default_id;
use crate::model::object::{Association, Property};
use crate::model::span::Spanned;
use crate::store::operation::{Operation, OperationResolver};
use crate::store::{TableAlias, UsageSink};

use super::error::{MappingError, SemanticResult};
use super::join_path::check_end;
use super::resolved::{AssociationMapping, ClassMapping, PropertyMapping, PropertyValue, ResolvedMapping};
use super::ResolutionContext;

pub fn association_mapping_id(def: &AssociationMappingDef) -> String {
    def.id
        .as_ref()
        .map(|id| id.value.clone())
        .unwrap_or_else(|| default_id(def.association.as_str()))
}

/// A class mapping an association end refers to.
struct EndMapping {
    class: String,
    main_table: TableAlias,
    maps_property: bool,
}

pub struct AssociationResolver<'c> {
    ctx: &'c ResolutionContext<'c>,
    unit: &'c ResolvedMapping,
    local: &'c [ClassMapping],
    roots: &'c BTreeMap<String, String>,
}

impl<'c> AssociationResolver<'c> {
    pub fn new(
        ctx: &'c ResolutionContext<'c>,
        unit: &'c ResolvedMapping,
        local: &'c [ClassMapping],
        roots: &'c BTreeMap<String, String>,
    ) -> Self {
        Self {
            ctx,
            unit,
            local,
            roots,
        }
    }

    #[instrument(name = "resolve_association_mapping", skip_all, fields(association = %def.association.value))]
    pub fn resolve(&self, def: &AssociationMappingDef, usages: &mut dyn UsageSink) -> SemanticResult<AssociationMapping> {
        let path = def.association.as_str();
        let association = self.ctx.model.association(path).ok_or_else(|| {
            MappingError::UnknownType {
                path: path.to_string(),
            }
            .at(&def.association.span)
        })?;
        let id = association_mapping_id(def);

        let mut seen = HashSet::new();
        let mut property_mappings = Vec::with_capacity(def.property_mappings.len());
        for mapping in &def.property_mappings {
            let name = mapping.property.as_str();
            if !seen.insert(name) {
                return Err(MappingError::DuplicateAssociationProperty {
                    property: name.to_string(),
                    association: id.clone(),
                }
                .at(&mapping.property.span));
            }
            property_mappings.push(self.property_mapping(association, &id, mapping, &mut *usages)?);
        }

        debug!(id = %id, properties = property_mappings.len(), "resolved association mapping");
        Ok(AssociationMapping {
            id,
            association: path.to_string(),
            property_mappings,
            span: def.span.clone(),
        })
    }

    fn property_mapping(
        &self,
        association: &Association,
        id: &str,
        def: &PropertyMappingDef,
        usages: &mut dyn UsageSink,
    ) -> SemanticResult<PropertyMapping> {
        let name = def.property.as_str();
        if association.qualified_property(name).is_some() {
            return Err(MappingError::QualifiedPropertyMapped {
                property: name.to_string(),
                association: id.to_string(),
            }
            .at(&def.property.span));
        }
        let property = association.property(name).ok_or_else(|| {
            MappingError::UnknownProperty {
                property: name.to_string(),
                element: association.path.clone(),
            }
            .at(&def.property.span)
        })?;
        let owner = association.owner_of(name).unwrap_or_default();
        let property_class = property.property_type.class_path().unwrap_or_default();

        let source_id = self.end_id(def.source_id.as_ref(), owner);
        let source = self.end_mapping(&source_id, name).ok_or_else(|| {
            MappingError::UnknownAssociationSource {
                id: source_id.clone(),
                property: name.to_string(),
                association: id.to_string(),
            }
            .at(span_of(def.source_id.as_ref(), def))
        })?;
        let target_id = self.end_id(def.target_id.as_ref(), property_class);
        let target = self.end_mapping(&target_id, name).ok_or_else(|| {
            MappingError::UnknownAssociationTarget {
                id: target_id.clone(),
                property: name.to_string(),
                association: id.to_string(),
            }
            .at(span_of(def.target_id.as_ref(), def))
        })?;

        self.check_ends(
            id,
            def,
            property,
            owner,
            (source_id.as_str(), &source),
            (target_id.as_str(), &target),
        )?;

        let PropertyMappingBody::Relational {
            operation,
            enumeration_mapping: None,
        } = &def.body
        else {
            return Err(not_a_join(name, id, def));
        };
        let store = self.ctx.store;
        let mut ops = OperationResolver::new(
            store,
            source.main_table.database,
            &self.ctx.settings.default_schema,
            usages,
        );
        let operation = ops.resolve(operation, Some(&source.main_table))?;
        let Operation::Join(chain) = &operation else {
            return Err(not_a_join(name, id, def));
        };
        if chain.has_target() {
            return Err(not_a_join(name, id, def));
        }
        check_end(store, &chain.steps, &target.main_table, &def.span)?;

        Ok(PropertyMapping {
            property: name.to_string(),
            source_id,
            target_id: Some(target_id),
            local: None,
            value: PropertyValue::Relational {
                operation,
                transformer: None,
            },
            span: def.span.clone(),
        })
    }

    fn check_ends(
        &self,
        id: &str,
        def: &PropertyMappingDef,
        property: &Property,
        owner: &str,
        (source_id, source): (&str, &EndMapping),
        (target_id, target): (&str, &EndMapping),
    ) -> SemanticResult<()> {
        let model = self.ctx.model;
        let name = def.property.as_str();
        if !model.is_ancestor_or_self(owner, &source.class) {
            return Err(MappingError::AssociationSourceMismatch {
                association: id.to_string(),
                id: source_id.to_string(),
                class: source.class.clone(),
                property: name.to_string(),
            }
            .at(span_of(def.source_id.as_ref(), def)));
        }

        let expected = property.property_type.class_path().unwrap_or_default();
        if !model.is_ancestor_or_self(expected, &target.class) && !model.is_ancestor_or_self(&target.class, expected) {
            return Err(MappingError::AssociationTargetMismatch {
                association: id.to_string(),
                id: target_id.to_string(),
                class: target.class.clone(),
                property: name.to_string(),
                property_type: expected.to_string(),
            }
            .at(span_of(def.target_id.as_ref(), def)));
        }

        if source.maps_property {
            return Err(MappingError::PropertyMappedTwice {
                property: name.to_string(),
                association: id.to_string(),
                id: source_id.to_string(),
            }
            .at(&def.property.span));
        }
        Ok(())
    }

    /// Explicit end id, or the id of the class's root mapping.
    fn end_id(&self, explicit: Option<&Spanned<String>>, class: &str) -> String {
        match explicit {
            Some(id) => id.value.clone(),
            None => self
                .roots
                .get(class)
                .cloned()
                .unwrap_or_else(|| default_id(class)),
        }
    }

    /// Look an end up among local mappings first, then included ones.
    fn end_mapping(&self, id: &str, property: &str) -> Option<EndMapping> {
        if let Some(set) = self.local.iter().find_map(|m| m.find_implementation(id)) {
            return Some(EndMapping {
                class: set.class.clone(),
                main_table: set.main_table.clone(),
                maps_property: set.property_mapping(property).is_some(),
            });
        }
        let included = self.unit.set_implementation(id)?;
        Some(EndMapping {
            class: included.class().to_string(),
            main_table: included.main_table(),
            maps_property: included.maps_property(property),
        })
    }
}

fn span_of<'d>(id: Option<&'d Spanned<String>>, def: &'d PropertyMappingDef) -> &'d crate::model::span::SourceSpan {
    id.map(|i| &i.span).unwrap_or(&def.property.span)
}

fn not_a_join(property: &str, association: &str, def: &PropertyMappingDef) -> crate::diagnostics::Diagnostic {
    MappingError::AssociationPropertyNotJoin {
        property: property.to_string(),
        association: association.to_string(),
    }
    .at(&def.property.span)
}
