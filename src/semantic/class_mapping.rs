//! Class Mapping Resolver.
//!
//! Turns the class mappings of one unit into [`SetImplementation`]s:
//!
//! 1. **Identify** - check every mapped class exists and assign ids
//! 2. **Roots** - exactly one root per class across the unit and its includes
//! 3. **Order** - local `extends` chains are resolved super-first
//! 4. **Resolve** - main table, clauses and property mappings per mapping
//! 5. **Join ends** - object-property joins must end on the target's main table
//!
//! Included mappings are only ever read through their effective
//! (substituted) view; nothing here mutates another unit's state.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, instrument, trace};

use crate::model::ast::{
    ClassMappingBody, ClassMappingDef, OperationDef, PropertyMappingBody, PropertyMappingDef,
    RelationalMappingDef,
};
use crate::model::default_id;
use crate::model::object::{Property, PropertyType, Temporal};
use crate::model::span::{SourceSpan, Spanned};
use crate::store::operation::{ColumnRef, Operation, OperationResolver};
use crate::store::{DatabaseId, TableAlias, UsageSink};

use super::aggregation::{self, aggregate_id, main_id};
use super::error::{MappingError, SemanticResult};
use super::join_path::check_end;
use super::resolved::{
    ClassMapping, EmbeddedMapping, Otherwise, PropertyMapping, PropertyValue, ResolvedMapping,
    SetImplementation,
};
use super::ResolutionContext;

pub const BUSINESS_DATE_MILESTONING: &str = "meta::pure::milestoning::BusinessDateMilestoning";
pub const PROCESSING_DATE_MILESTONING: &str = "meta::pure::milestoning::ProcessingDateMilestoning";
pub const BITEMPORAL_MILESTONING: &str = "meta::pure::milestoning::BiTemporalMilestoning";

/// Name of the generated milestoning property.
pub const MILESTONING_PROPERTY: &str = "milestoning";

pub fn class_mapping_id(def: &ClassMappingDef) -> String {
    def.id
        .as_ref()
        .map(|id| id.value.clone())
        .unwrap_or_else(|| default_id(def.class.as_str()))
}

/// Ids generated for the main and aggregate mappings of an
/// aggregation-aware class mapping.
pub fn generated_ids(id: &str, def: &ClassMappingDef) -> Vec<String> {
    match &def.body {
        ClassMappingBody::Relational(_) => Vec::new(),
        ClassMappingBody::AggregationAware(body) => std::iter::once(main_id(id))
            .chain((0..body.views.len()).map(|index| aggregate_id(id, index)))
            .collect(),
    }
}

/// What a relational body is resolved as.
pub(super) struct Header<'d> {
    pub id: String,
    pub class: &'d str,
    pub root: bool,
    pub declared_root: bool,
    pub extends: Option<&'d Spanned<String>>,
    pub span: &'d SourceSpan,
}

/// Resolves the class mappings of one unit.
pub struct ClassMappingResolver<'c> {
    ctx: &'c ResolutionContext<'c>,
    /// The unit being resolved; only its includes and enumeration mappings
    /// are populated at this point.
    unit: &'c ResolvedMapping,
    /// Local id -> class path, generated ids included.
    ids: HashMap<String, String>,
    /// Class path -> id of its root mapping, across the unit and its includes.
    roots: BTreeMap<String, String>,
    /// Local mappings resolved so far, by id.
    resolved: HashMap<String, SetImplementation>,
}

impl<'c> ClassMappingResolver<'c> {
    pub fn new(ctx: &'c ResolutionContext<'c>, unit: &'c ResolvedMapping) -> Self {
        Self {
            ctx,
            unit,
            ids: HashMap::new(),
            roots: BTreeMap::new(),
            resolved: HashMap::new(),
        }
    }

    pub(super) fn context(&self) -> &'c ResolutionContext<'c> {
        self.ctx
    }

    /// Resolve every class mapping of the unit, in declaration order.
    /// Returns the mappings and the class -> root id table.
    #[instrument(name = "resolve_class_mappings", skip_all, fields(mapping = %self.unit.name))]
    pub fn resolve(
        mut self,
        defs: &[ClassMappingDef],
        usages: &mut dyn UsageSink,
    ) -> SemanticResult<(Vec<ClassMapping>, BTreeMap<String, String>)> {
        let def_ids = self.identify(defs)?;
        let root_flags = self.count_roots(defs, &def_ids)?;
        let order = extends_order(defs, &def_ids)?;

        let mut results: Vec<Option<ClassMapping>> = vec![None; defs.len()];
        for index in order {
            let def = &defs[index];
            let header = Header {
                id: def_ids[index].clone(),
                class: def.class.as_str(),
                root: root_flags[index],
                declared_root: def.root,
                extends: def.extends.as_ref(),
                span: &def.span,
            };
            let mapping = match &def.body {
                ClassMappingBody::Relational(body) => {
                    ClassMapping::Relational(self.set_implementation(&header, body, &mut *usages)?)
                }
                ClassMappingBody::AggregationAware(body) => {
                    ClassMapping::AggregationAware(aggregation::resolve(&self, &header, body, &mut *usages)?)
                }
            };
            debug!(id = %header.id, class = %header.class, root = header.root, "resolved class mapping");

            self.resolved
                .insert(header.id.clone(), mapping.set_implementation().clone());
            for sub in mapping.sub_implementations() {
                self.resolved.insert(sub.id.clone(), sub.clone());
            }
            results[index] = Some(mapping);
        }
        let mappings: Vec<ClassMapping> = results.into_iter().flatten().collect();

        for mapping in &mappings {
            self.check_join_ends(&mapping.set_implementation().property_mappings)?;
            for sub in mapping.sub_implementations() {
                self.check_join_ends(&sub.property_mappings)?;
            }
        }
        Ok((mappings, self.roots))
    }

    // ------------------------------------------------------------------------
    // Identification, roots and ordering
    // ------------------------------------------------------------------------

    fn identify(&mut self, defs: &[ClassMappingDef]) -> SemanticResult<Vec<String>> {
        let mut def_ids = Vec::with_capacity(defs.len());
        for def in defs {
            let class = def.class.as_str();
            if self.ctx.model.class(class).is_none() {
                return Err(MappingError::UnknownType {
                    path: class.to_string(),
                }
                .at(&def.class.span));
            }
            let id = class_mapping_id(def);
            for generated in generated_ids(&id, def) {
                self.ids.insert(generated, class.to_string());
            }
            self.ids.insert(id.clone(), class.to_string());
            def_ids.push(id);
        }
        Ok(def_ids)
    }

    /// Decide which local mapping is the root of its class. A class mapped
    /// once is implicitly rooted; otherwise exactly one mapping across the
    /// unit and its includes must be marked.
    fn count_roots(&mut self, defs: &[ClassMappingDef], def_ids: &[String]) -> SemanticResult<Vec<bool>> {
        // class -> (local def indexes, included (id, declared root))
        let mut classes: BTreeMap<String, (Vec<usize>, Vec<(String, bool)>)> = BTreeMap::new();
        for (index, def) in defs.iter().enumerate() {
            classes.entry(def.class.value.clone()).or_default().0.push(index);
        }
        for included in self.unit.effective_class_mappings() {
            classes
                .entry(included.class().to_string())
                .or_default()
                .1
                .push((included.id().to_string(), included.declared_root()));
        }

        let mut flags = vec![false; defs.len()];
        for (class, (local, included)) in classes {
            let mappings = local.len() + included.len();
            let root = if mappings == 1 {
                match local.first() {
                    Some(&index) => Some(index),
                    None => {
                        self.roots.insert(class, included[0].0.clone());
                        continue;
                    }
                }
            } else {
                let roots = local.iter().filter(|&&i| defs[i].root).count()
                    + included.iter().filter(|(_, root)| *root).count();
                if roots != 1 {
                    let span = local.first().map(|&i| &defs[i].span).unwrap_or(&self.unit.span);
                    return Err(MappingError::RootCount {
                        class,
                        mappings,
                        roots,
                    }
                    .at(span));
                }
                local.iter().copied().find(|&i| defs[i].root)
            };

            match root {
                Some(index) => {
                    flags[index] = true;
                    self.roots.insert(class, def_ids[index].clone());
                }
                None => {
                    if let Some((id, _)) = included.into_iter().find(|(_, root)| *root) {
                        self.roots.insert(class, id);
                    }
                }
            }
        }
        Ok(flags)
    }

    // ------------------------------------------------------------------------
    // Set implementations
    // ------------------------------------------------------------------------

    /// Resolve one relational mapping body.
    pub(super) fn set_implementation(
        &self,
        header: &Header<'_>,
        body: &RelationalMappingDef,
        usages: &mut dyn UsageSink,
    ) -> SemanticResult<SetImplementation> {
        let store = self.ctx.store;
        let inherited = match header.extends {
            Some(extends) => Some(self.super_mapping(header, extends, body)?),
            None => None,
        };

        let database = match (&inherited, &body.main_table) {
            (Some((main, _)), _) => main.database,
            (None, Some(table)) => self.database_named(&table.database)?,
            (None, None) => match first_marker(&body.property_mappings) {
                Some(marker) => self.database_named(marker)?,
                None if body.property_mappings.is_empty() => {
                    return Err(MappingError::MainTableNotFound {
                        class: header.class.to_string(),
                    }
                    .at(header.span))
                }
                None => {
                    return Err(MappingError::MissingDatabase {
                        class: header.class.to_string(),
                    }
                    .at(header.span))
                }
            },
        };

        let mut ops = OperationResolver::new(store, database, &self.ctx.settings.default_schema, usages);
        let (main_table, super_class) = match (inherited, &body.main_table) {
            (Some((main, super_class)), _) => (main, Some(super_class)),
            (None, Some(table)) => (ops.table_ref(table)?, None),
            (None, None) => (self.infer_main_table(&ops, header, body)?, None),
        };
        trace!(id = %header.id, main_table = %store.describe_alias(&main_table), "main table");

        let filter = body
            .filter
            .as_ref()
            .map(|f| ops.filter(f, Some(&main_table)))
            .transpose()?;
        let group_by = resolve_all(&mut ops, &body.group_by, &main_table)?;
        let primary_key = resolve_all(&mut ops, &body.primary_key, &main_table)?;

        let mut property_mappings =
            self.property_mappings(&mut ops, &header.id, header.class, &main_table, &body.property_mappings)?;

        if let Some(super_class) = super_class {
            if super_class != header.class {
                self.check_new_properties(header, &property_mappings)?;
            }
        }
        if let Some(generated) = self.milestoning_mapping(header, &main_table, &property_mappings) {
            property_mappings.push(generated);
        }

        Ok(SetImplementation {
            id: header.id.clone(),
            class: header.class.to_string(),
            root: header.root,
            declared_root: header.declared_root,
            super_id: header.extends.map(|e| e.value.clone()),
            main_table,
            distinct: body.distinct,
            filter,
            group_by,
            primary_key,
            property_mappings,
            span: header.span.clone(),
        })
    }

    /// Validate an `extends` reference and return the inherited main table,
    /// re-targeted through the include path's substitution, together with
    /// the super mapping's class.
    fn super_mapping(
        &self,
        header: &Header<'_>,
        extends: &Spanned<String>,
        body: &RelationalMappingDef,
    ) -> SemanticResult<(TableAlias, String)> {
        let super_id = extends.as_str();
        if super_id == header.id {
            return Err(MappingError::SelfExtension {
                id: super_id.to_string(),
            }
            .at(&extends.span));
        }
        if let Some(table) = &body.main_table {
            return Err(MappingError::ExplicitMainTableOnExtends {
                id: header.id.clone(),
            }
            .at(&table.table.span));
        }

        let (main, super_class) = match self.resolved.get(super_id) {
            Some(local) => (local.main_table.clone(), local.class.clone()),
            None => match self.unit.class_mapping(super_id) {
                Some(included) => (included.main_table(), included.class().to_string()),
                None => {
                    return Err(MappingError::UnknownSuperMapping {
                        id: super_id.to_string(),
                        mapping: self.unit.name.clone(),
                    }
                    .at(&extends.span))
                }
            },
        };

        if !self.ctx.model.is_ancestor_or_self(&super_class, header.class) {
            return Err(MappingError::InvalidSuperClass {
                id: header.id.clone(),
                class: header.class.to_string(),
                super_id: super_id.to_string(),
                super_class,
            }
            .at(&extends.span));
        }

        let mut markers = Vec::new();
        collect_markers(&body.property_mappings, &mut markers);
        for marker in markers {
            if self.database_named(marker)? != main.database {
                return Err(MappingError::InconsistentDatabases {
                    class: header.class.to_string(),
                }
                .at(&marker.span));
            }
        }
        Ok((main, super_class))
    }

    /// The single table every property expression is rooted at.
    fn infer_main_table(
        &self,
        ops: &OperationResolver<'_>,
        header: &Header<'_>,
        body: &RelationalMappingDef,
    ) -> SemanticResult<TableAlias> {
        let mut operations = Vec::new();
        collect_operations(&body.property_mappings, &mut operations);

        let mut tables: Vec<TableAlias> = Vec::new();
        for operation in operations {
            for root in ops.infer_roots(operation)? {
                if !tables.iter().any(|t| t.table == root.table) {
                    tables.push(root);
                }
            }
        }

        match tables.len() {
            0 => Err(MappingError::MainTableNotFound {
                class: header.class.to_string(),
            }
            .at(header.span)),
            1 => Ok(tables.remove(0)),
            _ => {
                let store = self.ctx.store;
                let found = tables
                    .iter()
                    .map(|t| store.describe_alias(t))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(MappingError::MainTableAmbiguous {
                    class: header.class.to_string(),
                    tables: found,
                }
                .at(header.span))
            }
        }
    }

    fn database_named(&self, name: &Spanned<String>) -> SemanticResult<DatabaseId> {
        self.ctx.store.database_id(name.as_str()).ok_or_else(|| {
            MappingError::UnknownDatabase {
                name: name.value.clone(),
            }
            .at(&name.span)
        })
    }

    /// A class extending a mapping of one of its superclasses must map the
    /// primitive properties it declares itself.
    fn check_new_properties(&self, header: &Header<'_>, mappings: &[PropertyMapping]) -> SemanticResult<()> {
        let Some(class) = self.ctx.model.class(header.class) else {
            return Ok(());
        };
        for property in &class.properties {
            if property.property_type.is_data_type() && !mappings.iter().any(|m| m.property == property.name) {
                return Err(MappingError::UnmappedNewProperty {
                    property: property.name.clone(),
                    class: header.class.to_string(),
                    id: header.id.clone(),
                }
                .at(header.span));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Property mappings
    // ------------------------------------------------------------------------

    fn property_mappings(
        &self,
        ops: &mut OperationResolver<'_>,
        owner_id: &str,
        class: &str,
        main: &TableAlias,
        defs: &[PropertyMappingDef],
    ) -> SemanticResult<Vec<PropertyMapping>> {
        let mut seen = HashSet::new();
        let mut mappings = Vec::with_capacity(defs.len());
        for def in defs {
            let name = def.property.as_str();
            if !seen.insert(name) {
                return Err(MappingError::DuplicatePropertyMapping {
                    property: name.to_string(),
                    class: class.to_string(),
                }
                .at(&def.property.span));
            }
            if let Some(source) = &def.source_id {
                if source.as_str() != owner_id {
                    return Err(MappingError::InvalidSourceId {
                        source_id: source.value.clone(),
                        property: name.to_string(),
                        mapping: owner_id.to_string(),
                    }
                    .at(&source.span));
                }
            }
            mappings.push(self.property_mapping(ops, owner_id, class, main, def)?);
        }
        Ok(mappings)
    }

    fn property_mapping(
        &self,
        ops: &mut OperationResolver<'_>,
        owner_id: &str,
        class: &str,
        main: &TableAlias,
        def: &PropertyMappingDef,
    ) -> SemanticResult<PropertyMapping> {
        let name = def.property.as_str();
        let mapping = |value: PropertyValue, target_id: Option<String>| PropertyMapping {
            property: name.to_string(),
            source_id: owner_id.to_string(),
            target_id,
            local: def.local.clone(),
            value,
            span: def.span.clone(),
        };

        // `+name: Type[m]` properties are not checked against the class.
        if def.local.is_some() {
            return match &def.body {
                PropertyMappingBody::Relational {
                    operation,
                    enumeration_mapping: None,
                } => {
                    let operation = ops.resolve(operation, Some(main))?;
                    if operation.is_bare_join() {
                        return Err(MappingError::DataPropertyMappedToJoin {
                            property: name.to_string(),
                            class: class.to_string(),
                        }
                        .at(&def.property.span));
                    }
                    Ok(mapping(
                        PropertyValue::Relational {
                            operation,
                            transformer: None,
                        },
                        None,
                    ))
                }
                PropertyMappingBody::Relational {
                    enumeration_mapping: Some(transformer),
                    ..
                } => Err(MappingError::TransformerOnNonEnumeration {
                    property: name.to_string(),
                }
                .at(&transformer.span)),
                _ => Err(MappingError::NestedMappingOnDataProperty {
                    property: name.to_string(),
                    class: class.to_string(),
                }
                .at(&def.property.span)),
            };
        }

        let property = self.ctx.model.find_property(class, name).ok_or_else(|| {
            MappingError::UnknownProperty {
                property: name.to_string(),
                element: class.to_string(),
            }
            .at(&def.property.span)
        })?;

        match &def.body {
            PropertyMappingBody::Relational {
                operation,
                enumeration_mapping,
            } => {
                let operation = ops.resolve(operation, Some(main))?;
                if property.property_type.is_data_type() {
                    if operation.is_bare_join() {
                        return Err(MappingError::DataPropertyMappedToJoin {
                            property: name.to_string(),
                            class: class.to_string(),
                        }
                        .at(&def.property.span));
                    }
                    let transformer = enumeration_mapping
                        .as_ref()
                        .map(|t| self.transformer(property, t))
                        .transpose()?;
                    return Ok(mapping(PropertyValue::Relational { operation, transformer }, None));
                }

                if let Some(transformer) = enumeration_mapping {
                    return Err(MappingError::TransformerOnNonEnumeration {
                        property: name.to_string(),
                    }
                    .at(&transformer.span));
                }
                if !operation.is_bare_join() {
                    return Err(MappingError::ObjectPropertyMappedToColumn {
                        property: name.to_string(),
                        class: class.to_string(),
                    }
                    .at(&def.property.span));
                }
                let target_id = match &def.target_id {
                    Some(target) => {
                        self.check_target(target, property, owner_id)?;
                        Some(target.value.clone())
                    }
                    None => property
                        .property_type
                        .class_path()
                        .and_then(|c| self.roots.get(c))
                        .cloned(),
                };
                Ok(mapping(
                    PropertyValue::Relational {
                        operation,
                        transformer: None,
                    },
                    target_id,
                ))
            }
            PropertyMappingBody::Embedded(embedded) => {
                let Some(target_class) = property.property_type.class_path() else {
                    return Err(MappingError::NestedMappingOnDataProperty {
                        property: name.to_string(),
                        class: class.to_string(),
                    }
                    .at(&def.property.span));
                };
                let id = format!("{}_{}", owner_id, name);
                let primary_key = resolve_all(ops, &embedded.primary_key, main)?;
                let property_mappings =
                    self.property_mappings(ops, &id, target_class, main, &embedded.property_mappings)?;
                let otherwise = match &embedded.otherwise {
                    Some(otherwise) => {
                        self.check_target(&otherwise.target_id, property, owner_id)?;
                        Some(Otherwise {
                            target_id: otherwise.target_id.value.clone(),
                            join: ops.join_path(&otherwise.join, Some(main))?,
                        })
                    }
                    None => None,
                };
                Ok(mapping(
                    PropertyValue::Embedded(EmbeddedMapping {
                        id: id.clone(),
                        class: target_class.to_string(),
                        primary_key,
                        property_mappings,
                        otherwise,
                    }),
                    Some(id),
                ))
            }
            PropertyMappingBody::Inline(target) => {
                if property.property_type.is_data_type() {
                    return Err(MappingError::NestedMappingOnDataProperty {
                        property: name.to_string(),
                        class: class.to_string(),
                    }
                    .at(&def.property.span));
                }
                self.check_target(target, property, owner_id)?;
                Ok(mapping(
                    PropertyValue::Inline {
                        target_id: target.value.clone(),
                    },
                    Some(target.value.clone()),
                ))
            }
        }
    }

    /// A target id must name a class mapping of the property's class or one
    /// of its subclasses.
    fn check_target(&self, target: &Spanned<String>, property: &Property, owner_id: &str) -> SemanticResult<()> {
        let Some(target_class) = self.class_of(target.as_str()) else {
            return Err(MappingError::UnknownTargetMapping {
                id: target.value.clone(),
                property: property.name.clone(),
                mapping: owner_id.to_string(),
            }
            .at(&target.span));
        };
        let expected = property.property_type.class_path().unwrap_or_default();
        if !self.ctx.model.is_ancestor_or_self(expected, &target_class) {
            return Err(MappingError::IncompatibleTargetMapping {
                id: target.value.clone(),
                target_class,
                property: property.name.clone(),
                property_type: expected.to_string(),
            }
            .at(&target.span));
        }
        Ok(())
    }

    fn transformer(&self, property: &Property, transformer: &Spanned<String>) -> SemanticResult<String> {
        let PropertyType::Enumeration(expected) = &property.property_type else {
            return Err(MappingError::TransformerOnNonEnumeration {
                property: property.name.clone(),
            }
            .at(&transformer.span));
        };
        let mapping = self.unit.enumeration_mapping(transformer.as_str()).ok_or_else(|| {
            MappingError::UnknownEnumerationMapping {
                id: transformer.value.clone(),
            }
            .at(&transformer.span)
        })?;
        if mapping.enumeration != *expected {
            return Err(MappingError::EnumerationMappingMismatch {
                id: transformer.value.clone(),
                enumeration: mapping.enumeration.clone(),
                property: property.name.clone(),
                property_type: expected.clone(),
            }
            .at(&transformer.span));
        }
        Ok(transformer.value.clone())
    }

    /// Class mapped by a local or included mapping id.
    fn class_of(&self, id: &str) -> Option<String> {
        if let Some(class) = self.ids.get(id) {
            return Some(class.clone());
        }
        self.unit.set_implementation(id).map(|s| s.class().to_string())
    }

    /// Main table of a local or included mapping, substituted.
    fn main_table_of(&self, id: &str) -> Option<TableAlias> {
        if let Some(local) = self.resolved.get(id) {
            return Some(local.main_table.clone());
        }
        self.unit.set_implementation(id).map(|s| s.main_table())
    }

    fn check_join_ends(&self, mappings: &[PropertyMapping]) -> SemanticResult<()> {
        for mapping in mappings {
            match &mapping.value {
                PropertyValue::Relational {
                    operation: Operation::Join(chain),
                    ..
                } if !chain.has_target() => {
                    if let Some(target) = mapping.target_id.as_deref().and_then(|id| self.main_table_of(id)) {
                        check_end(self.ctx.store, &chain.steps, &target, &mapping.span)?;
                    }
                }
                PropertyValue::Embedded(embedded) => {
                    self.check_join_ends(&embedded.property_mappings)?;
                    if let Some(otherwise) = &embedded.otherwise {
                        if let Some(target) = self.main_table_of(&otherwise.target_id) {
                            check_end(self.ctx.store, &otherwise.join.steps, &target, &mapping.span)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Milestoning
    // ------------------------------------------------------------------------

    /// Embedded `milestoning` mapping generated for a temporal class mapped
    /// onto a milestoned table.
    fn milestoning_mapping(
        &self,
        header: &Header<'_>,
        main: &TableAlias,
        mappings: &[PropertyMapping],
    ) -> Option<PropertyMapping> {
        if !self.ctx.settings.auto_milestoning || mappings.iter().any(|m| m.property == MILESTONING_PROPERTY) {
            return None;
        }
        let temporal = self.ctx.model.class(header.class)?.temporal?;
        let milestoning = self.ctx.store.table(main.table).milestoning.as_ref()?;

        let id = format!("{}_{}", header.id, MILESTONING_PROPERTY);
        let column = |property: &str, column: &str| PropertyMapping {
            property: property.to_string(),
            source_id: id.clone(),
            target_id: None,
            local: None,
            value: PropertyValue::Relational {
                operation: Operation::Column(ColumnRef {
                    alias: main.clone(),
                    column: column.to_string(),
                }),
                transformer: None,
            },
            span: header.span.clone(),
        };

        let mut properties = Vec::new();
        let class = match temporal {
            Temporal::Business => {
                if let Some(business) = milestoning.business() {
                    properties.push(column("from", &business.from_column));
                    properties.push(column("thru", &business.thru_column));
                } else {
                    let snapshot = milestoning.snapshot()?;
                    properties.push(column("snapshotDate", &snapshot.snapshot_date_column));
                }
                BUSINESS_DATE_MILESTONING
            }
            Temporal::Processing => {
                let processing = milestoning.processing()?;
                properties.push(column("in", &processing.in_column));
                properties.push(column("out", &processing.out_column));
                PROCESSING_DATE_MILESTONING
            }
            Temporal::Bitemporal => {
                let processing = milestoning.processing()?;
                let business = milestoning.business()?;
                properties.push(column("from", &business.from_column));
                properties.push(column("thru", &business.thru_column));
                properties.push(column("in", &processing.in_column));
                properties.push(column("out", &processing.out_column));
                BITEMPORAL_MILESTONING
            }
        };
        trace!(id = %header.id, class, "generated milestoning mapping");

        Some(PropertyMapping {
            property: MILESTONING_PROPERTY.to_string(),
            source_id: header.id.clone(),
            target_id: Some(id.clone()),
            local: None,
            value: PropertyValue::Embedded(EmbeddedMapping {
                id,
                class: class.to_string(),
                primary_key: Vec::new(),
                property_mappings: properties,
                otherwise: None,
            }),
            span: header.span.clone(),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn resolve_all(
    ops: &mut OperationResolver<'_>,
    defs: &[OperationDef],
    main: &TableAlias,
) -> SemanticResult<Vec<Operation>> {
    defs.iter().map(|def| ops.resolve(def, Some(main))).collect()
}

/// Local mapping indexes ordered so that a mapping comes after the local
/// mapping it extends.
fn extends_order(defs: &[ClassMappingDef], def_ids: &[String]) -> SemanticResult<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Visit {
        New,
        Active,
        Done,
    }

    let index: HashMap<&str, usize> = def_ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
    let mut state = vec![Visit::New; defs.len()];
    let mut order = Vec::with_capacity(defs.len());

    for start in 0..defs.len() {
        let mut path: Vec<usize> = Vec::new();
        let mut current = Some(start);
        while let Some(i) = current {
            match state[i] {
                Visit::Done => break,
                Visit::Active => {
                    let from = path.iter().position(|&p| p == i).unwrap_or(0);
                    let mut cycle: Vec<String> = path[from..].iter().map(|&p| def_ids[p].clone()).collect();
                    cycle.push(def_ids[i].clone());
                    return Err(MappingError::ExtendsCycle { cycle }.at(&defs[i].span));
                }
                Visit::New => {
                    if let Some(extends) = &defs[i].extends {
                        if extends.as_str() == def_ids[i] {
                            return Err(MappingError::SelfExtension {
                                id: def_ids[i].clone(),
                            }
                            .at(&extends.span));
                        }
                    }
                    state[i] = Visit::Active;
                    path.push(i);
                    current = defs[i]
                        .extends
                        .as_ref()
                        .and_then(|e| index.get(e.as_str()).copied());
                }
            }
        }
        for i in path.into_iter().rev() {
            state[i] = Visit::Done;
            order.push(i);
        }
    }
    Ok(order)
}

/// Relational expressions of property mappings, embedded ones included.
fn collect_operations<'d>(defs: &'d [PropertyMappingDef], out: &mut Vec<&'d OperationDef>) {
    for def in defs {
        match &def.body {
            PropertyMappingBody::Relational { operation, .. } => out.push(operation),
            PropertyMappingBody::Embedded(embedded) => collect_operations(&embedded.property_mappings, out),
            PropertyMappingBody::Inline(_) => {}
        }
    }
}

/// Explicit `[db]` markers, in order of appearance.
fn collect_markers<'d>(defs: &'d [PropertyMappingDef], out: &mut Vec<&'d Spanned<String>>) {
    for def in defs {
        match &def.body {
            PropertyMappingBody::Relational { operation, .. } => operation_markers(operation, out),
            PropertyMappingBody::Embedded(embedded) => {
                embedded.primary_key.iter().for_each(|o| operation_markers(o, out));
                collect_markers(&embedded.property_mappings, out);
                if let Some(otherwise) = &embedded.otherwise {
                    out.extend(otherwise.join.joins.iter().filter_map(|j| j.database.as_ref()));
                }
            }
            PropertyMappingBody::Inline(_) => {}
        }
    }
}

fn operation_markers<'d>(def: &'d OperationDef, out: &mut Vec<&'d Spanned<String>>) {
    match def {
        OperationDef::Column(column) => out.extend(column.database.as_ref()),
        OperationDef::JoinPath(path) => {
            out.extend(path.joins.iter().filter_map(|j| j.database.as_ref()));
            if let Some(target) = &path.target {
                operation_markers(target, out);
            }
        }
        OperationDef::Function { args, .. } => args.iter().for_each(|a| operation_markers(a, out)),
        OperationDef::TargetColumn(_) | OperationDef::Literal(_) => {}
    }
}

fn first_marker(defs: &[PropertyMappingDef]) -> Option<&Spanned<String>> {
    let mut markers = Vec::new();
    collect_markers(defs, &mut markers);
    markers.into_iter().next()
}
