//! Shared fixtures: a firm/person object model, its store and builders for
//! definitions that would normally come out of the grammar front-end.

#![allow(dead_code)]

use std::sync::Arc;

use relmap::compile::{CompileError, CompiledGraph, Workspace};
use relmap::config::ResolutionSettings;
use relmap::model::ast::{
    ClassMappingBody, ClassMappingDef, ColumnDef, ColumnRefDef, DatabaseDef, IncludeDef, JoinDef,
    JoinPathDef, JoinRefDef, LiteralDef, LocalPropertyDef, MappingDef, MilestoningArgument,
    MilestoningClause, OperationDef, PropertyMappingBody, PropertyMappingDef, RelationalMappingDef,
    SchemaDef, StoreSubstitutionDef, TableDef, TableRefDef,
};
use relmap::model::{
    Association, Class, DataType, Enumeration, ModelRegistry, Multiplicity, PrimitiveType,
    Property, PropertyType, SourceSpan, Spanned,
};
use relmap::semantic::ResolvedMapping;

// ============================================================================
// Object model
// ============================================================================

pub fn model() -> ModelRegistry {
    ModelRegistry::new()
        .with_enumeration(Enumeration::new("model::Gender", ["MALE", "FEMALE"]))
        .with_class(
            Class::new("model::Person")
                .with_property(Property::primitive("name", PrimitiveType::String))
                .with_property(Property::enumeration("gender", "model::Gender"))
                .with_property(Property::class("manager", "model::Person").with_multiplicity(Multiplicity::ZERO_ONE)),
        )
        .with_class(
            Class::new("model::Firm")
                .with_property(Property::primitive("legalName", PrimitiveType::String))
                .with_property(Property::class("address", "model::Address")),
        )
        .with_class(Class::new("model::Address").with_property(Property::primitive("street", PrimitiveType::String)))
        .with_class(Class::new("model::Vehicle").with_property(Property::primitive("id", PrimitiveType::Integer)))
        .with_class(
            Class::new("model::Car")
                .extends("model::Vehicle")
                .with_property(Property::primitive("wheels", PrimitiveType::Integer)),
        )
        .with_association(Association::new(
            "model::Firm_Person",
            Property::class("employees", "model::Person").with_multiplicity(Multiplicity::MANY),
            Property::class("firm", "model::Firm"),
        )
        .with_qualified_property("employeeByName", PropertyType::Class("model::Person".into())))
}

// ============================================================================
// Store definitions
// ============================================================================

pub fn at(line: u32) -> SourceSpan {
    SourceSpan::line("test.pure", line)
}

pub fn column(name: &str, data_type: DataType) -> ColumnDef {
    ColumnDef {
        name: name.into(),
        data_type,
        nullable: true,
        primary_key: false,
    }
}

pub fn pk(name: &str) -> ColumnDef {
    ColumnDef {
        name: name.into(),
        data_type: DataType::Integer,
        nullable: false,
        primary_key: true,
    }
}

pub fn table(name: &str, columns: Vec<ColumnDef>) -> TableDef {
    TableDef {
        name: name.into(),
        columns,
        milestoning: Vec::new(),
        span: SourceSpan::default(),
    }
}

pub fn milestoning(keyword: &str, args: &[(&str, &str)]) -> MilestoningClause {
    MilestoningClause {
        keyword: keyword.into(),
        arguments: args
            .iter()
            .map(|(k, v)| MilestoningArgument {
                key: (*k).into(),
                value: (*v).into(),
            })
            .collect(),
        span: SourceSpan::default(),
    }
}

pub fn database(name: &str, includes: &[&str], tables: Vec<TableDef>, joins: Vec<JoinDef>) -> DatabaseDef {
    DatabaseDef {
        name: name.into(),
        includes: includes.iter().map(|i| (*i).into()).collect(),
        schemas: vec![SchemaDef {
            name: "default".into(),
            tables,
            views: Vec::new(),
        }],
        joins,
        filters: Vec::new(),
        span: SourceSpan::default(),
    }
}

pub fn join(name: &str, condition: OperationDef) -> JoinDef {
    JoinDef {
        name: name.into(),
        condition,
        span: SourceSpan::default(),
    }
}

/// `PersonTable`, `FirmTable`, `AddressTable` and `VehicleTable` with the
/// joins between them.
pub fn firm_tables() -> (Vec<TableDef>, Vec<JoinDef>) {
    let tables = vec![
        table(
            "PersonTable",
            vec![
                pk("ID"),
                column("NAME", DataType::Varchar(200)),
                column("GENDER", DataType::Char(1)),
                column("FIRM_ID", DataType::Integer),
                column("MANAGER_ID", DataType::Integer),
            ],
        ),
        table(
            "FirmTable",
            vec![
                pk("ID"),
                column("LEGAL_NAME", DataType::Varchar(200)),
                column("ADDRESS_ID", DataType::Integer),
            ],
        ),
        table("AddressTable", vec![pk("ID"), column("STREET", DataType::Varchar(200))]),
        table("VehicleTable", vec![pk("ID"), column("WHEELS", DataType::Integer)]),
    ];
    let joins = vec![
        join("Firm_Person", eq(col("FirmTable", "ID"), col("PersonTable", "FIRM_ID"))),
        join("Firm_Address", eq(col("FirmTable", "ADDRESS_ID"), col("AddressTable", "ID"))),
        join("Person_Manager", eq(col("PersonTable", "MANAGER_ID"), target_col("ID"))),
    ];
    (tables, joins)
}

/// The firm store as the single database `name`.
pub fn firm_db(name: &str) -> DatabaseDef {
    let (tables, joins) = firm_tables();
    database(name, &[], tables, joins)
}

// ============================================================================
// Operations
// ============================================================================

pub fn col(table: &str, column: &str) -> OperationDef {
    OperationDef::Column(ColumnRefDef {
        database: None,
        schema: None,
        table: table.into(),
        column: column.into(),
    })
}

pub fn db_col(db: &str, table: &str, column: &str) -> OperationDef {
    OperationDef::Column(ColumnRefDef {
        database: Some(db.into()),
        schema: None,
        table: table.into(),
        column: column.into(),
    })
}

pub fn target_col(column: &str) -> OperationDef {
    OperationDef::TargetColumn(column.into())
}

pub fn eq(left: OperationDef, right: OperationDef) -> OperationDef {
    OperationDef::Function {
        name: "equal".into(),
        args: vec![left, right],
    }
}

pub fn literal(value: &str) -> OperationDef {
    OperationDef::Literal(LiteralDef::String(value.to_string()))
}

/// `[db] @J1 > [db] @J2 | target`
pub fn joins(db: Option<&str>, names: &[&str], target: Option<OperationDef>) -> OperationDef {
    OperationDef::JoinPath(JoinPathDef {
        joins: names
            .iter()
            .map(|n| JoinRefDef {
                database: db.map(Into::into),
                name: (*n).into(),
                join_type: None,
            })
            .collect(),
        target: target.map(Box::new),
    })
}

// ============================================================================
// Mappings
// ============================================================================

pub fn prop(name: &str, operation: OperationDef) -> PropertyMappingDef {
    PropertyMappingDef {
        property: name.into(),
        source_id: None,
        target_id: None,
        local: None,
        body: PropertyMappingBody::Relational {
            operation,
            enumeration_mapping: None,
        },
        span: SourceSpan::default(),
    }
}

/// `+name: Type[1]: operation`
pub fn local_prop(name: &str, property_type: PrimitiveType, operation: OperationDef) -> PropertyMappingDef {
    PropertyMappingDef {
        local: Some(LocalPropertyDef {
            property_type,
            multiplicity: Multiplicity::ONE,
        }),
        ..prop(name, operation)
    }
}

pub fn enum_prop(name: &str, transformer: &str, operation: OperationDef) -> PropertyMappingDef {
    PropertyMappingDef {
        body: PropertyMappingBody::Relational {
            operation,
            enumeration_mapping: Some(transformer.into()),
        },
        ..prop(name, OperationDef::Literal(LiteralDef::Null))
    }
}

pub fn with_target(mut def: PropertyMappingDef, target: &str) -> PropertyMappingDef {
    def.target_id = Some(target.into());
    def
}

pub fn relational(properties: Vec<PropertyMappingDef>) -> RelationalMappingDef {
    RelationalMappingDef {
        property_mappings: properties,
        ..RelationalMappingDef::default()
    }
}

pub fn main_table(db: &str, table: &str) -> TableRefDef {
    TableRefDef {
        database: db.into(),
        schema: None,
        table: table.into(),
    }
}

pub fn relational_on(db: &str, table: &str, properties: Vec<PropertyMappingDef>) -> RelationalMappingDef {
    RelationalMappingDef {
        main_table: Some(main_table(db, table)),
        ..relational(properties)
    }
}

pub fn class_mapping(class: &str, id: Option<&str>, body: RelationalMappingDef) -> ClassMappingDef {
    ClassMappingDef {
        class: class.into(),
        id: id.map(Into::into),
        root: false,
        extends: None,
        body: ClassMappingBody::Relational(body),
        span: SourceSpan::default(),
    }
}

pub fn rooted(mut def: ClassMappingDef) -> ClassMappingDef {
    def.root = true;
    def
}

pub fn extending(mut def: ClassMappingDef, super_id: &str) -> ClassMappingDef {
    def.extends = Some(super_id.into());
    def
}

pub fn include(mapping: &str, substitutions: &[(&str, &str)]) -> IncludeDef {
    IncludeDef {
        mapping: mapping.into(),
        substitutions: substitutions
            .iter()
            .map(|(original, substitute)| StoreSubstitutionDef {
                original: (*original).into(),
                substitute: (*substitute).into(),
            })
            .collect(),
        span: SourceSpan::default(),
    }
}

pub fn mapping(name: &str, includes: Vec<IncludeDef>, class_mappings: Vec<ClassMappingDef>) -> MappingDef {
    MappingDef {
        name: Spanned::new(name.to_string(), SourceSpan::default()),
        includes,
        class_mappings,
        association_mappings: Vec::new(),
        enumeration_mappings: Vec::new(),
        span: SourceSpan::default(),
    }
}

/// `*model::Person: Relational { name: [db]PersonTable.NAME }`
pub fn person_mapping(db: &str) -> ClassMappingDef {
    class_mapping("model::Person", None, relational(vec![prop("name", db_col(db, "PersonTable", "NAME"))]))
}

// ============================================================================
// Compilation
// ============================================================================

pub fn workspace(databases: Vec<DatabaseDef>, mappings: Vec<MappingDef>) -> Workspace {
    workspace_with(ResolutionSettings::default(), databases, mappings)
}

pub fn workspace_with(settings: ResolutionSettings, databases: Vec<DatabaseDef>, mappings: Vec<MappingDef>) -> Workspace {
    let mut workspace = Workspace::new(Arc::new(model()), settings);
    for database in databases {
        workspace.upsert_database(database);
    }
    for mapping in mappings {
        workspace.upsert_mapping(mapping);
    }
    workspace
}

pub fn compile(databases: Vec<DatabaseDef>, mappings: Vec<MappingDef>) -> Result<Arc<CompiledGraph>, CompileError> {
    workspace(databases, mappings).compile()
}

/// Compile and return the named unit, panicking with the diagnostics on
/// failure.
pub fn resolve(databases: Vec<DatabaseDef>, mappings: Vec<MappingDef>, unit: &str) -> Arc<ResolvedMapping> {
    match compile(databases, mappings) {
        Ok(graph) => Arc::clone(graph.mapping(unit).expect("unit is resolved")),
        Err(e) => panic!("compilation failed: {:?}", e.diagnostics()),
    }
}

/// Message of the diagnostic reported for `unit`.
pub fn error_of(databases: Vec<DatabaseDef>, mappings: Vec<MappingDef>, unit: &str) -> String {
    match compile(databases, mappings) {
        Ok(_) => panic!("expected '{}' to fail", unit),
        Err(CompileError::Mappings(failures)) => failures
            .into_iter()
            .find(|f| f.unit == unit)
            .map(|f| f.diagnostic.message)
            .unwrap_or_else(|| panic!("no diagnostic for '{}'", unit)),
        Err(e) => e
            .diagnostics()
            .first()
            .map(|d| d.message.clone())
            .unwrap_or_else(|| e.to_string()),
    }
}
