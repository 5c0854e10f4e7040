//! Resolved mapping graph: the output of mapping resolution.
//!
//! A [`ResolvedMapping`] owns only the elements declared by its unit. Included
//! units are shared by `Arc` together with the store substitution that applies
//! to them; [`EffectiveClassMapping`] presents an included element with that
//! substitution applied, so included state is never copied or mutated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::model::ast::{EnumSourceValue, LocalPropertyDef};
use crate::model::span::SourceSpan;
use crate::store::operation::{FilterPointer, JoinChain, Operation};
use crate::store::{DatabaseId, StoreModel, TableAlias};

use super::include_graph::SubstitutionMap;

// ============================================================================
// Property mappings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyMapping {
    pub property: String,
    pub source_id: String,
    pub target_id: Option<String>,
    /// Set for `+name: Type[m]` properties local to the mapping.
    pub local: Option<LocalPropertyDef>,
    pub value: PropertyValue,
    pub span: SourceSpan,
}

/// What a property is mapped to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    /// A column, join chain, literal or function expression.
    Relational {
        operation: Operation,
        transformer: Option<String>,
    },
    Embedded(EmbeddedMapping),
    Inline { target_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedMapping {
    pub id: String,
    pub class: String,
    pub primary_key: Vec<Operation>,
    pub property_mappings: Vec<PropertyMapping>,
    pub otherwise: Option<Otherwise>,
}

/// `Otherwise([targetId]: @join)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Otherwise {
    pub target_id: String,
    pub join: JoinChain,
}

impl PropertyMapping {
    pub fn operation(&self) -> Option<&Operation> {
        match &self.value {
            PropertyValue::Relational { operation, .. } => Some(operation),
            _ => None,
        }
    }

    pub fn map_databases(&self, f: &impl Fn(DatabaseId) -> DatabaseId) -> PropertyMapping {
        let value = match &self.value {
            PropertyValue::Relational {
                operation,
                transformer,
            } => PropertyValue::Relational {
                operation: operation.map_databases(f),
                transformer: transformer.clone(),
            },
            PropertyValue::Embedded(embedded) => PropertyValue::Embedded(EmbeddedMapping {
                id: embedded.id.clone(),
                class: embedded.class.clone(),
                primary_key: embedded.primary_key.iter().map(|o| o.map_databases(f)).collect(),
                property_mappings: embedded
                    .property_mappings
                    .iter()
                    .map(|p| p.map_databases(f))
                    .collect(),
                otherwise: embedded.otherwise.as_ref().map(|o| Otherwise {
                    target_id: o.target_id.clone(),
                    join: o.join.map_databases(f),
                }),
            }),
            PropertyValue::Inline { target_id } => PropertyValue::Inline {
                target_id: target_id.clone(),
            },
        };
        PropertyMapping {
            value,
            ..self.clone()
        }
    }

    fn collect_databases(&self, out: &mut BTreeSet<DatabaseId>) {
        match &self.value {
            PropertyValue::Relational { operation, .. } => operation_databases(operation, out),
            PropertyValue::Embedded(embedded) => {
                embedded.primary_key.iter().for_each(|o| operation_databases(o, out));
                embedded.property_mappings.iter().for_each(|p| p.collect_databases(out));
                if let Some(otherwise) = &embedded.otherwise {
                    chain_databases(&otherwise.join, out);
                }
            }
            PropertyValue::Inline { .. } => {}
        }
    }
}

fn operation_databases(operation: &Operation, out: &mut BTreeSet<DatabaseId>) {
    match operation {
        Operation::Column(c) => {
            out.insert(c.alias.database);
        }
        Operation::Join(chain) => chain_databases(chain, out),
        Operation::Literal(_) => {}
        Operation::Function { args, .. } => args.iter().for_each(|a| operation_databases(a, out)),
    }
}

fn chain_databases(chain: &JoinChain, out: &mut BTreeSet<DatabaseId>) {
    out.insert(chain.source.database);
    out.extend(chain.steps.iter().map(|s| s.database));
    if let Some(target) = &chain.target {
        operation_databases(target, out);
    }
}

// ============================================================================
// Class mappings
// ============================================================================

/// A relational class mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetImplementation {
    pub id: String,
    pub class: String,
    /// Root within the owning unit, after implicit-root promotion.
    pub root: bool,
    /// Whether the mapping was marked with `*`.
    pub declared_root: bool,
    pub super_id: Option<String>,
    pub main_table: TableAlias,
    pub distinct: bool,
    pub filter: Option<FilterPointer>,
    pub group_by: Vec<Operation>,
    pub primary_key: Vec<Operation>,
    pub property_mappings: Vec<PropertyMapping>,
    pub span: SourceSpan,
}

impl SetImplementation {
    pub fn property_mapping(&self, property: &str) -> Option<&PropertyMapping> {
        self.property_mappings.iter().find(|p| p.property == property)
    }

    fn collect_databases(&self, out: &mut BTreeSet<DatabaseId>) {
        out.insert(self.main_table.database);
        if let Some(filter) = &self.filter {
            out.insert(filter.database);
            out.extend(filter.joins.iter().map(|s| s.database));
        }
        self.group_by.iter().for_each(|o| operation_databases(o, out));
        self.primary_key.iter().for_each(|o| operation_databases(o, out));
        self.property_mappings.iter().for_each(|p| p.collect_databases(out));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSpecification {
    pub can_aggregate: bool,
    pub group_by_functions: Vec<PropertyPath>,
    pub aggregate_values: Vec<AggregateValue>,
}

/// A resolved `$this.a.b` path and the type it evaluates to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyPath {
    pub properties: Vec<String>,
    pub return_type: crate::model::object::PropertyType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateValue {
    pub map_fn: PropertyPath,
    pub aggregate_fn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSetImplementation {
    pub index: usize,
    pub specification: AggregateSpecification,
    pub set_implementation: SetImplementation,
}

/// A class mapping split into a main mapping and pre-aggregated views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationAwareSetImplementation {
    pub id: String,
    pub class: String,
    pub root: bool,
    pub declared_root: bool,
    pub main: SetImplementation,
    pub aggregates: Vec<AggregateSetImplementation>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassMapping {
    Relational(SetImplementation),
    AggregationAware(AggregationAwareSetImplementation),
}

impl ClassMapping {
    pub fn id(&self) -> &str {
        match self {
            ClassMapping::Relational(s) => &s.id,
            ClassMapping::AggregationAware(a) => &a.id,
        }
    }

    pub fn class(&self) -> &str {
        match self {
            ClassMapping::Relational(s) => &s.class,
            ClassMapping::AggregationAware(a) => &a.class,
        }
    }

    pub fn root(&self) -> bool {
        match self {
            ClassMapping::Relational(s) => s.root,
            ClassMapping::AggregationAware(a) => a.root,
        }
    }

    pub fn declared_root(&self) -> bool {
        match self {
            ClassMapping::Relational(s) => s.declared_root,
            ClassMapping::AggregationAware(a) => a.declared_root,
        }
    }

    /// The relational mapping queries run against: the mapping itself or the
    /// main mapping of an aggregation-aware one.
    pub fn set_implementation(&self) -> &SetImplementation {
        match self {
            ClassMapping::Relational(s) => s,
            ClassMapping::AggregationAware(a) => &a.main,
        }
    }

    pub fn span(&self) -> &SourceSpan {
        match self {
            ClassMapping::Relational(s) => &s.span,
            ClassMapping::AggregationAware(a) => &a.span,
        }
    }

    /// The generated main and aggregate mappings.
    pub fn sub_implementations(&self) -> Vec<&SetImplementation> {
        match self {
            ClassMapping::Relational(_) => Vec::new(),
            ClassMapping::AggregationAware(a) => std::iter::once(&a.main)
                .chain(a.aggregates.iter().map(|g| &g.set_implementation))
                .collect(),
        }
    }

    /// Every relational mapping this class mapping is made of.
    pub fn implementations(&self) -> Vec<&SetImplementation> {
        match self {
            ClassMapping::Relational(s) => vec![s],
            ClassMapping::AggregationAware(_) => self.sub_implementations(),
        }
    }

    /// The relational mapping answering to `id`: the class mapping itself or
    /// one of its generated mappings.
    pub fn find_implementation(&self, id: &str) -> Option<&SetImplementation> {
        if self.id() == id {
            return Some(self.set_implementation());
        }
        self.sub_implementations().into_iter().find(|s| s.id == id)
    }
}

// ============================================================================
// Association and enumeration mappings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociationMapping {
    pub id: String,
    pub association: String,
    pub property_mappings: Vec<PropertyMapping>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumerationMapping {
    pub id: String,
    pub enumeration: String,
    pub values: Vec<(String, Vec<EnumSourceValue>)>,
    pub span: SourceSpan,
}

impl EnumerationMapping {
    /// Enum value a source value maps to.
    pub fn value_of(&self, source: &EnumSourceValue) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, sources)| sources.contains(source))
            .map(|(value, _)| value.as_str())
    }
}

// ============================================================================
// Mapping units
// ============================================================================

/// An included unit together with the substitution applied to it.
#[derive(Debug, Clone)]
pub struct ResolvedInclude {
    pub mapping: Arc<ResolvedMapping>,
    pub substitution: SubstitutionMap,
}

/// The resolved state of one mapping unit.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMapping {
    pub name: String,
    pub class_mappings: Vec<ClassMapping>,
    pub association_mappings: Vec<AssociationMapping>,
    pub enumeration_mappings: Vec<EnumerationMapping>,
    /// Direct includes, in declaration order.
    #[serde(skip)]
    pub includes: Vec<ResolvedInclude>,
    /// Every transitively included unit once, with its composed substitution.
    #[serde(skip)]
    pub flattened: Vec<ResolvedInclude>,
    /// Class path -> id of its root class mapping.
    pub roots: BTreeMap<String, String>,
    pub usages: crate::store::ReferenceUsages,
    /// The store model the unit was resolved against. Every `DatabaseId`
    /// and `TableId` in the unit indexes into it.
    #[serde(skip)]
    pub store: Arc<StoreModel>,
    pub span: SourceSpan,
}

/// A class mapping as seen from a unit: local, or included with the
/// include path's store substitution applied.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveClassMapping<'g> {
    mapping: &'g ClassMapping,
    substitution: Option<&'g SubstitutionMap>,
    unit: &'g str,
}

impl<'g> EffectiveClassMapping<'g> {
    pub fn id(&self) -> &'g str {
        self.mapping.id()
    }

    pub fn class(&self) -> &'g str {
        self.mapping.class()
    }

    pub fn root(&self) -> bool {
        self.mapping.root()
    }

    pub fn declared_root(&self) -> bool {
        self.mapping.declared_root()
    }

    pub fn super_id(&self) -> Option<&'g str> {
        self.mapping.set_implementation().super_id.as_deref()
    }

    /// Name of the unit declaring the mapping.
    pub fn unit(&self) -> &'g str {
        self.unit
    }

    pub fn is_local(&self) -> bool {
        self.substitution.is_none()
    }

    /// The mapping exactly as resolved by its own unit.
    pub fn declared(&self) -> &'g ClassMapping {
        self.mapping
    }

    pub fn substitute(&self, database: DatabaseId) -> DatabaseId {
        self.substitution.map_or(database, |s| s.apply(database))
    }

    pub fn main_table(&self) -> TableAlias {
        let main = &self.mapping.set_implementation().main_table;
        main.with_database(self.substitute(main.database))
    }

    pub fn property_mappings(&self) -> Vec<PropertyMapping> {
        let mappings = &self.mapping.set_implementation().property_mappings;
        match self.substitution {
            None => mappings.clone(),
            Some(s) => mappings.iter().map(|p| p.map_databases(&|db| s.apply(db))).collect(),
        }
    }

    pub fn maps_property(&self, property: &str) -> bool {
        self.mapping
            .set_implementation()
            .property_mapping(property)
            .is_some()
    }

    pub fn referenced_databases(&self) -> BTreeSet<DatabaseId> {
        let mut raw = BTreeSet::new();
        for set in self.mapping.implementations() {
            set.collect_databases(&mut raw);
        }
        raw.into_iter().map(|db| self.substitute(db)).collect()
    }

    /// The main and aggregate mappings of an aggregation-aware mapping, with
    /// the same substitution applied.
    pub fn sub_implementations(&self) -> Vec<EffectiveSetImplementation<'g>> {
        self.mapping
            .sub_implementations()
            .into_iter()
            .map(|set| EffectiveSetImplementation {
                set,
                substitution: self.substitution,
                unit: self.unit,
            })
            .collect()
    }
}

/// One relational mapping as seen from a unit. Covers the generated
/// `_Main` and `_Aggregate_<i>` mappings as well as plain class mappings.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveSetImplementation<'g> {
    set: &'g SetImplementation,
    substitution: Option<&'g SubstitutionMap>,
    unit: &'g str,
}

impl<'g> EffectiveSetImplementation<'g> {
    pub fn id(&self) -> &'g str {
        &self.set.id
    }

    pub fn class(&self) -> &'g str {
        &self.set.class
    }

    pub fn unit(&self) -> &'g str {
        self.unit
    }

    pub fn is_local(&self) -> bool {
        self.substitution.is_none()
    }

    /// The mapping exactly as resolved by its own unit.
    pub fn declared(&self) -> &'g SetImplementation {
        self.set
    }

    fn substitute(&self, database: DatabaseId) -> DatabaseId {
        self.substitution.map_or(database, |s| s.apply(database))
    }

    pub fn main_table(&self) -> TableAlias {
        let main = &self.set.main_table;
        main.with_database(self.substitute(main.database))
    }

    pub fn property_mappings(&self) -> Vec<PropertyMapping> {
        match self.substitution {
            None => self.set.property_mappings.clone(),
            Some(s) => self
                .set
                .property_mappings
                .iter()
                .map(|p| p.map_databases(&|db| s.apply(db)))
                .collect(),
        }
    }

    pub fn maps_property(&self, property: &str) -> bool {
        self.set.property_mapping(property).is_some()
    }

    pub fn referenced_databases(&self) -> BTreeSet<DatabaseId> {
        let mut raw = BTreeSet::new();
        self.set.collect_databases(&mut raw);
        raw.into_iter().map(|db| self.substitute(db)).collect()
    }
}

impl ResolvedMapping {
    /// Local class mappings followed by those of every included unit.
    pub fn effective_class_mappings(&self) -> impl Iterator<Item = EffectiveClassMapping<'_>> {
        let local = self.class_mappings.iter().map(|m| EffectiveClassMapping {
            mapping: m,
            substitution: None,
            unit: &self.name,
        });
        let included = self.flattened.iter().flat_map(|include| {
            include
                .mapping
                .class_mappings
                .iter()
                .map(move |m| EffectiveClassMapping {
                    mapping: m,
                    substitution: Some(&include.substitution),
                    unit: &include.mapping.name,
                })
        });
        local.chain(included)
    }

    pub fn class_mapping(&self, id: &str) -> Option<EffectiveClassMapping<'_>> {
        self.effective_class_mappings().find(|m| m.id() == id)
    }

    pub fn root_class_mapping(&self, class: &str) -> Option<EffectiveClassMapping<'_>> {
        let id = self.roots.get(class)?;
        self.class_mapping(id)
    }

    /// Any relational mapping by id, including the generated main and
    /// aggregate mappings of aggregation-aware class mappings, substituted
    /// like the class mapping it belongs to.
    pub fn set_implementation(&self, id: &str) -> Option<EffectiveSetImplementation<'_>> {
        self.effective_class_mappings().find_map(|m| {
            m.mapping.find_implementation(id).map(|set| EffectiveSetImplementation {
                set,
                substitution: m.substitution,
                unit: m.unit,
            })
        })
    }

    /// Association mappings of this unit and its includes, substituted.
    pub fn effective_association_mappings(&self) -> Vec<AssociationMapping> {
        let mut result = self.association_mappings.clone();
        for include in &self.flattened {
            let s = &include.substitution;
            result.extend(include.mapping.association_mappings.iter().map(|a| AssociationMapping {
                property_mappings: a
                    .property_mappings
                    .iter()
                    .map(|p| p.map_databases(&|db| s.apply(db)))
                    .collect(),
                ..a.clone()
            }));
        }
        result
    }

    pub fn association_mapping(&self, id: &str) -> Option<AssociationMapping> {
        self.effective_association_mappings()
            .into_iter()
            .find(|a| a.id == id)
    }

    pub fn enumeration_mapping(&self, id: &str) -> Option<&EnumerationMapping> {
        std::iter::once(self)
            .chain(self.flattened.iter().map(|i| i.mapping.as_ref()))
            .flat_map(|unit| unit.enumeration_mappings.iter())
            .find(|e| e.id == id)
    }

    /// Databases referenced by the unit's effective class and association
    /// mappings.
    pub fn referenced_databases(&self) -> BTreeSet<DatabaseId> {
        let mut databases: BTreeSet<DatabaseId> = self
            .effective_class_mappings()
            .flat_map(|m| m.referenced_databases())
            .collect();
        for association in self.effective_association_mappings() {
            association
                .property_mappings
                .iter()
                .for_each(|p| p.collect_databases(&mut databases));
        }
        databases
    }
}
