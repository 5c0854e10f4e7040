//! Parsed input for the resolver: store definitions and mapping units.
//!
//! These structures are produced by the grammar front-end (or deserialized
//! from JSON by the CLI). Nothing here is validated; all cross-references are
//! plain names resolved by the `store` and `semantic` modules.

use serde::{Deserialize, Serialize};

use super::span::{SourceSpan, Spanned};
use super::types::{DataType, Multiplicity, PrimitiveType};

// ============================================================================
// Store definitions
// ============================================================================

/// A relational database (`Database db ( ... )`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDef {
    pub name: Spanned<String>,
    #[serde(default)]
    pub includes: Vec<Spanned<String>>,
    #[serde(default)]
    pub schemas: Vec<SchemaDef>,
    #[serde(default)]
    pub joins: Vec<JoinDef>,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDef {
    pub name: Spanned<String>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub views: Vec<ViewDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: Spanned<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub milestoning: Vec<MilestoningClause>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: Spanned<String>,
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_true() -> bool {
    true
}

/// One raw milestoning clause, e.g. `business(BUS_FROM = from_z, BUS_THRU = thru_z)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoningClause {
    pub keyword: Spanned<String>,
    #[serde(default)]
    pub arguments: Vec<MilestoningArgument>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoningArgument {
    pub key: Spanned<String>,
    pub value: Spanned<String>,
}

/// `Join name(left = right and ...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinDef {
    pub name: Spanned<String>,
    pub condition: OperationDef,
    #[serde(default)]
    pub span: SourceSpan,
}

/// `Filter name(expression)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDef {
    pub name: Spanned<String>,
    pub condition: OperationDef,
    #[serde(default)]
    pub span: SourceSpan,
}

/// `View name( ~distinct ~filter f ~groupBy(...) col: expr, ... )`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDef {
    pub name: Spanned<String>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub filter: Option<FilterRefDef>,
    #[serde(default)]
    pub group_by: Vec<OperationDef>,
    #[serde(default)]
    pub columns: Vec<ViewColumnDef>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewColumnDef {
    pub name: Spanned<String>,
    pub operation: OperationDef,
    #[serde(default)]
    pub primary_key: bool,
}

// ============================================================================
// Relational operations
// ============================================================================

/// A relational expression as written in a join, filter, view or mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationDef {
    /// `[db] schema.table.column`
    Column(ColumnRefDef),
    /// `{target}.column` inside a self-join.
    TargetColumn(Spanned<String>),
    /// `[db] @J1 > (INNER) [db] @J2 | table.column`
    JoinPath(JoinPathDef),
    Literal(LiteralDef),
    /// Function application, including boolean and comparison operators.
    Function {
        name: Spanned<String>,
        #[serde(default)]
        args: Vec<OperationDef>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRefDef {
    #[serde(default)]
    pub database: Option<Spanned<String>>,
    #[serde(default)]
    pub schema: Option<Spanned<String>>,
    pub table: Spanned<String>,
    pub column: Spanned<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPathDef {
    pub joins: Vec<JoinRefDef>,
    /// Terminal expression evaluated on the last table of the chain.
    #[serde(default)]
    pub target: Option<Box<OperationDef>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRefDef {
    #[serde(default)]
    pub database: Option<Spanned<String>>,
    pub name: Spanned<String>,
    #[serde(default)]
    pub join_type: Option<JoinType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralDef {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

/// `[db] schema.table`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRefDef {
    pub database: Spanned<String>,
    #[serde(default)]
    pub schema: Option<Spanned<String>>,
    pub table: Spanned<String>,
}

/// `[db] @J1 > @J2 | [db] FilterName`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRefDef {
    #[serde(default)]
    pub database: Option<Spanned<String>>,
    #[serde(default)]
    pub joins: Vec<JoinRefDef>,
    pub name: Spanned<String>,
}

// ============================================================================
// Mapping units
// ============================================================================

/// `Mapping name ( include ...; class mappings ...; )`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDef {
    pub name: Spanned<String>,
    #[serde(default)]
    pub includes: Vec<IncludeDef>,
    #[serde(default)]
    pub class_mappings: Vec<ClassMappingDef>,
    #[serde(default)]
    pub association_mappings: Vec<AssociationMappingDef>,
    #[serde(default)]
    pub enumeration_mappings: Vec<EnumerationMappingDef>,
    #[serde(default)]
    pub span: SourceSpan,
}

/// `include other::Mapping[db1 -> db2, ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeDef {
    pub mapping: Spanned<String>,
    #[serde(default)]
    pub substitutions: Vec<StoreSubstitutionDef>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSubstitutionDef {
    pub original: Spanned<String>,
    pub substitute: Spanned<String>,
}

/// `*model::Person[id] extends [superId]: Relational { ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMappingDef {
    pub class: Spanned<String>,
    #[serde(default)]
    pub id: Option<Spanned<String>>,
    #[serde(default)]
    pub root: bool,
    #[serde(default)]
    pub extends: Option<Spanned<String>>,
    pub body: ClassMappingBody,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassMappingBody {
    Relational(RelationalMappingDef),
    AggregationAware(AggregationAwareDef),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationalMappingDef {
    #[serde(default)]
    pub main_table: Option<TableRefDef>,
    #[serde(default)]
    pub filter: Option<FilterRefDef>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub group_by: Vec<OperationDef>,
    #[serde(default)]
    pub primary_key: Vec<OperationDef>,
    #[serde(default)]
    pub property_mappings: Vec<PropertyMappingDef>,
}

/// `name[sourceId, targetId]: <body>` or `+name: Type[m]: <body>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyMappingDef {
    pub property: Spanned<String>,
    #[serde(default)]
    pub source_id: Option<Spanned<String>>,
    #[serde(default)]
    pub target_id: Option<Spanned<String>>,
    #[serde(default)]
    pub local: Option<LocalPropertyDef>,
    pub body: PropertyMappingBody,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPropertyDef {
    pub property_type: PrimitiveType,
    #[serde(default)]
    pub multiplicity: Multiplicity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyMappingBody {
    /// A relational expression, optionally transformed by an enumeration mapping.
    Relational {
        operation: OperationDef,
        #[serde(default)]
        enumeration_mapping: Option<Spanned<String>>,
    },
    Embedded(EmbeddedMappingDef),
    /// `Inline[targetId]`
    Inline(Spanned<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedMappingDef {
    #[serde(default)]
    pub primary_key: Vec<OperationDef>,
    #[serde(default)]
    pub property_mappings: Vec<PropertyMappingDef>,
    /// `Otherwise([targetId]: @join)`
    #[serde(default)]
    pub otherwise: Option<OtherwiseDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherwiseDef {
    pub target_id: Spanned<String>,
    pub join: JoinPathDef,
}

/// `AggregationAware { Views: [ (~modelOperation: ..., ~aggregateMapping: ...) ], ~mainMapping: ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationAwareDef {
    pub main_mapping: RelationalMappingDef,
    #[serde(default)]
    pub views: Vec<AggregateViewDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateViewDef {
    pub model_operation: AggregateSpecificationDef,
    pub aggregate_mapping: RelationalMappingDef,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpecificationDef {
    #[serde(default)]
    pub can_aggregate: bool,
    /// Property paths, e.g. `$this.product.name` as `["product", "name"]`.
    #[serde(default)]
    pub group_by_functions: Vec<PropertyPathDef>,
    #[serde(default)]
    pub aggregate_values: Vec<AggregateValueDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPathDef {
    pub properties: Vec<Spanned<String>>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateValueDef {
    pub map_fn: PropertyPathDef,
    pub aggregate_fn: Spanned<String>,
}

/// `Firm_Person: Relational { AssociationMapping ( ... ) }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationMappingDef {
    pub association: Spanned<String>,
    #[serde(default)]
    pub id: Option<Spanned<String>>,
    #[serde(default)]
    pub property_mappings: Vec<PropertyMappingDef>,
    #[serde(default)]
    pub span: SourceSpan,
}

/// `model::Gender: EnumerationMapping GenderMapping { MALE: ['M', 'm'] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationMappingDef {
    pub enumeration: Spanned<String>,
    #[serde(default)]
    pub id: Option<Spanned<String>>,
    #[serde(default)]
    pub values: Vec<EnumValueMappingDef>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValueMappingDef {
    pub value: Spanned<String>,
    pub sources: Vec<EnumSourceValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumSourceValue {
    String(String),
    Integer(i64),
}
