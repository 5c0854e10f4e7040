//! Diagnostic templates for store and mapping resolution.
//!
//! Every failure the resolvers can report is one variant here; its `Display`
//! output is the message surfaced verbatim to callers. [`MappingError::at`]
//! pairs a failure with the span it applies to.

use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::model::span::SourceSpan;

/// Result type for resolution operations.
pub type SemanticResult<T> = Result<T, Diagnostic>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    // ------------------------------------------------------------------------
    // Store model
    // ------------------------------------------------------------------------
    #[error("The database '{name}' can't be found")]
    UnknownDatabase { name: String },

    #[error("The database '{included}' included by '{database}' can't be found")]
    UnknownIncludedDatabase { database: String, included: String },

    #[error("The schema '{schema}' can't be found in the database '{database}'")]
    UnknownSchema { schema: String, database: String },

    #[error("The table '{table}' can't be found in the schema '{schema}' in the database '{database}'")]
    UnknownTable {
        table: String,
        schema: String,
        database: String,
    },

    #[error("The column '{column}' can't be found in the table '{table}'")]
    UnknownColumn { column: String, table: String },

    #[error("The join '{join}' has not been found in the database '{database}'")]
    UnknownJoin { join: String, database: String },

    #[error("The filter '{filter}' has not been found in the database '{database}'")]
    UnknownFilter { filter: String, database: String },

    #[error("Duplicate {kind} '{name}' in {container}")]
    Duplicate {
        kind: &'static str,
        name: String,
        container: String,
    },

    #[error("A self join can only contain 1 table, found {count}")]
    SelfJoinTableCount { count: usize },

    #[error("The join '{join}' must reference exactly 2 tables, found {count}")]
    JoinTableCount { join: String, count: usize },

    #[error("The {{target}} placeholder can only be used inside a self join")]
    MisplacedTargetColumn,

    // ------------------------------------------------------------------------
    // Milestoning
    // ------------------------------------------------------------------------
    #[error("Unknown milestoning type '{keyword}', expected one of: business, processing")]
    UnknownMilestoningKeyword { keyword: String },

    #[error("Unknown {keyword} milestoning argument '{argument}'")]
    UnknownMilestoningArgument { keyword: String, argument: String },

    #[error("Milestoning error: {keyword} milestoning requires {argument}")]
    MissingMilestoningArgument { keyword: String, argument: String },

    #[error("Milestoning error: {message}")]
    ConflictingMilestoning { message: String },

    #[error("Invalid value '{value}' for milestoning argument {argument}")]
    InvalidMilestoningValue { argument: String, value: String },

    #[error("Milestoning error: the BUS_SNAPSHOT_DATE column '{column}' of table '{table}' must be of type DATE, found {found}")]
    SnapshotColumnType {
        table: String,
        column: String,
        found: String,
    },

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------
    #[error("Unable to determine the main table for view '{view}'")]
    ViewWithoutMainTable { view: String },

    #[error("View '{view}' must be rooted at exactly one main table, found: {tables}")]
    ViewMultipleMainTables { view: String, tables: String },

    #[error("The table '{table}' used by view '{view}' belongs to database '{owner}', which is neither '{database}' nor included by it")]
    ViewTableNotVisible {
        view: String,
        table: String,
        owner: String,
        database: String,
    },

    #[error("The groupBy column '{column}' of view '{view}' does not belong to the main table '{table}'")]
    ViewGroupByColumn {
        column: String,
        view: String,
        table: String,
    },

    #[error("The column '{column}' of view '{view}' must end with a column expression")]
    ViewColumnWithoutTarget { column: String, view: String },

    // ------------------------------------------------------------------------
    // Join paths
    // ------------------------------------------------------------------------
    #[error("Mapping error: the join {join} does not contain the source table {table}")]
    JoinMissingSourceTable { join: String, table: String },

    #[error("Mapping error: the join {join} does not connect from the table {from} to the table {to}; instead it connects to {actual}")]
    JoinNotConnected {
        join: String,
        from: String,
        to: String,
        actual: String,
    },

    #[error("Unable to determine the source table of the join chain starting with '{join}'")]
    JoinPathWithoutSource { join: String },

    // ------------------------------------------------------------------------
    // Mapping includes and store substitution
    // ------------------------------------------------------------------------
    #[error("The mapping '{mapping}' included by '{includer}' can't be found")]
    UnknownMapping { mapping: String, includer: String },

    #[error("Circular include in mapping {mapping}: {}", .cycle.join(" -> "))]
    CircularInclude { mapping: String, cycle: Vec<String> },

    #[error("Mapping '{mapping}' includes mapping '{included}' more than once")]
    DuplicateInclude { mapping: String, included: String },

    #[error("Duplicate mapping found with id: '{id}' in mapping {mapping}")]
    DuplicateMappingId { id: String, mapping: String },

    #[error("Store substitution error: '{name}' is not a store")]
    NotAStore { name: String },

    #[error("Store substitution error: the store '{name}' can't be found")]
    UnknownStore { name: String },

    #[error("Store substitution error: '{substitute}' does not include '{original}'")]
    SubstituteDoesNotInclude { original: String, substitute: String },

    #[error("Store substitution error: multiple substitutions for {original}")]
    MultipleSubstitutions { original: String },

    #[error("Store substitution error: {store} appears both as an original and a substitute")]
    OriginalAndSubstitute { store: String },

    #[error("Store Substitution Error in mapping [{outer}] as [{original}] does not exist in included mapping [{inner}]")]
    SubstitutionNotInIncluded {
        outer: String,
        original: String,
        inner: String,
    },

    #[error("Mapping '{included}' is reachable from '{mapping}' through include paths with different store substitutions")]
    AmbiguousIncludePaths { included: String, mapping: String },

    #[error("Mapping '{mapping}' cannot be compiled because its included mapping '{included}' has errors")]
    BlockedByInclude { mapping: String, included: String },

    // ------------------------------------------------------------------------
    // Class mappings
    // ------------------------------------------------------------------------
    #[error("Can't find the type '{path}'")]
    UnknownType { path: String },

    #[error("The class '{class}' is mapped by {mappings} set implementations and has {roots} roots. There should be exactly one root set implementation for the class, which is marked with a '*' in the mapping definition.")]
    RootCount {
        class: String,
        mappings: usize,
        roots: usize,
    },

    #[error("The property '{property}' is unknown in the Element '{element}'")]
    UnknownProperty { property: String, element: String },

    #[error("Duplicate mappings found for the property '{property}' in the mapping for class {class}, the property should have one mapping.")]
    DuplicatePropertyMapping { property: String, class: String },

    #[error("The property '{property}' of class '{class}' is a primitive property and must be mapped to a column or an expression, not to a join")]
    DataPropertyMappedToJoin { property: String, class: String },

    #[error("The property '{property}' of class '{class}' is not a primitive property and must be mapped through a join")]
    ObjectPropertyMappedToColumn { property: String, class: String },

    #[error("The property '{property}' of class '{class}' is a primitive property and can't use an embedded or inline mapping")]
    NestedMappingOnDataProperty { property: String, class: String },

    #[error("Unable to find target class mapping (id:{id}) for property '{property}' in class mapping '{mapping}'")]
    UnknownTargetMapping {
        id: String,
        property: String,
        mapping: String,
    },

    #[error("The class mapping '{id}' maps '{target_class}', which is not compatible with the type '{property_type}' of property '{property}'")]
    IncompatibleTargetMapping {
        id: String,
        target_class: String,
        property: String,
        property_type: String,
    },

    #[error("The source id '{source_id}' of property '{property}' must be the id of its class mapping '{mapping}'")]
    InvalidSourceId {
        source_id: String,
        property: String,
        mapping: String,
    },

    #[error("Can't find the main table for class '{class}'. Please specify a main table using the ~mainTable directive.")]
    MainTableNotFound { class: String },

    #[error("Can't find the main table for class '{class}'. Found tables {tables}. Please specify a main table using the ~mainTable directive.")]
    MainTableAmbiguous { class: String, tables: String },

    #[error("Can't find the main table for class '{class}'. Inconsistent database definitions for the mapping.")]
    InconsistentDatabases { class: String },

    #[error("Cannot specify main table explicitly for extended mapping [{id}]")]
    ExplicitMainTableOnExtends { id: String },

    #[error("Can't find the extended class mapping '{id}' in mapping '{mapping}'")]
    UnknownSuperMapping { id: String, mapping: String },

    #[error("Extend mapping id cannot reference self '{id}'")]
    SelfExtension { id: String },

    #[error("Class mapping '{id}' for class '{class}' cannot extend '{super_id}', which maps '{super_class}', not a superclass of '{class}'")]
    InvalidSuperClass {
        id: String,
        class: String,
        super_id: String,
        super_class: String,
    },

    #[error("Cycle detected in class mapping extends: {}", .cycle.join(" -> "))]
    ExtendsCycle { cycle: Vec<String> },

    #[error("The property '{property}' is declared by class '{class}' but is not mapped by the extending mapping '{id}'")]
    UnmappedNewProperty {
        property: String,
        class: String,
        id: String,
    },

    #[error("Unable to determine the database for the mapping of class '{class}'")]
    MissingDatabase { class: String },

    // ------------------------------------------------------------------------
    // Enumeration mappings
    // ------------------------------------------------------------------------
    #[error("Can't find enumeration mapping '{id}'")]
    UnknownEnumerationMapping { id: String },

    #[error("The enumeration mapping '{id}' maps '{enumeration}', but the property '{property}' has type '{property_type}'")]
    EnumerationMappingMismatch {
        id: String,
        enumeration: String,
        property: String,
        property_type: String,
    },

    #[error("The property '{property}' is not an enumeration and can't use an enumeration mapping")]
    TransformerOnNonEnumeration { property: String },

    #[error("The enum value '{value}' can't be found in the enumeration {enumeration}")]
    UnknownEnumValue { value: String, enumeration: String },

    #[error("The enum value '{value}' is mapped more than once in enumeration mapping '{id}'")]
    DuplicateEnumValue { value: String, id: String },

    #[error("Only one type of source value is allowed in enumeration mapping '{id}'")]
    MixedEnumSourceTypes { id: String },

    // ------------------------------------------------------------------------
    // Association mappings
    // ------------------------------------------------------------------------
    #[error("The qualified property '{property}' of association '{association}' can't be the target of a mapping")]
    QualifiedPropertyMapped { property: String, association: String },

    #[error("Unable to find source class mapping (id:{id}) for property '{property}' in Association mapping '{association}'. Make sure that you have specified a valid Class mapping id as the source id and target id, using the syntax 'property[sourceId, targetId]: ...'.")]
    UnknownAssociationSource {
        id: String,
        property: String,
        association: String,
    },

    #[error("Unable to find target class mapping (id:{id}) for property '{property}' in Association mapping '{association}'. Make sure that you have specified a valid Class mapping id as the source id and target id, using the syntax 'property[sourceId, targetId]: ...'.")]
    UnknownAssociationTarget {
        id: String,
        property: String,
        association: String,
    },

    #[error("Association mapping '{association}': the source class mapping '{id}' maps '{class}', which does not declare the property '{property}'")]
    AssociationSourceMismatch {
        association: String,
        id: String,
        class: String,
        property: String,
    },

    #[error("Association mapping '{association}': the target class mapping '{id}' maps '{class}', which is not compatible with the type '{property_type}' of property '{property}'")]
    AssociationTargetMismatch {
        association: String,
        id: String,
        class: String,
        property: String,
        property_type: String,
    },

    #[error("The property '{property}' is mapped twice: in the association mapping '{association}' and in the class mapping '{id}'")]
    PropertyMappedTwice {
        property: String,
        association: String,
        id: String,
    },

    #[error("The property '{property}' is mapped more than once in the association mapping '{association}'")]
    DuplicateAssociationProperty { property: String, association: String },

    #[error("The property '{property}' in association mapping '{association}' must be mapped through a join")]
    AssociationPropertyNotJoin { property: String, association: String },

    // ------------------------------------------------------------------------
    // Aggregation-aware mappings
    // ------------------------------------------------------------------------
    #[error("Can't find the property '{property}' in the class {class}")]
    AggregateUnknownProperty { property: String, class: String },

    #[error("The system can't find a match for the function: {name}(_:{argument}[*])")]
    AggregateFunctionNotFound { name: String, argument: String },
}

impl MappingError {
    /// Structural failures of the milestoning grammar are parse errors;
    /// everything else is a compilation error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MappingError::UnknownMilestoningKeyword { .. }
            | MappingError::UnknownMilestoningArgument { .. }
            | MappingError::MissingMilestoningArgument { .. }
            | MappingError::ConflictingMilestoning { .. }
            | MappingError::InvalidMilestoningValue { .. } => ErrorKind::Parse,
            _ => ErrorKind::Compilation,
        }
    }

    /// Attach a source span, producing the structured diagnostic.
    pub fn at(self, span: &SourceSpan) -> Diagnostic {
        match self.kind() {
            ErrorKind::Parse => Diagnostic::parse(span, self),
            ErrorKind::Compilation => Diagnostic::compilation(span, self),
        }
    }
}
