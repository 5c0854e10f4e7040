#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::*;
use insta::assert_snapshot;
use relmap::config::ResolutionSettings;
use relmap::model::ast::{
    AggregateSpecificationDef, AggregateValueDef, AggregateViewDef, AggregationAwareDef,
    ClassMappingBody, ClassMappingDef, DatabaseDef, MappingDef, PropertyPathDef, RelationalMappingDef,
    TableDef,
};
use relmap::model::{Class, DataType, PrimitiveType, Property, PropertyType, SourceSpan};
use relmap::semantic::ClassMapping;
use relmap::{CompileError, CompiledGraph, Workspace};

fn sales_table() -> TableDef {
    table(
        "SalesTable",
        vec![
            pk("ID"),
            column("PRODUCT", DataType::Varchar(100)),
            column("AMOUNT", DataType::Double),
        ],
    )
}

fn sales_by_product() -> TableDef {
    table(
        "SalesByProduct",
        vec![column("PRODUCT", DataType::Varchar(100)), column("AMOUNT", DataType::Double)],
    )
}

fn sales_db() -> DatabaseDef {
    database("db", &[], vec![sales_table(), sales_by_product()], Vec::new())
}

fn sales_columns(db: &str, table: &str) -> RelationalMappingDef {
    relational(vec![
        prop("product", db_col(db, table, "PRODUCT")),
        prop("amount", db_col(db, table, "AMOUNT")),
    ])
}

fn path(properties: &[&str]) -> PropertyPathDef {
    PropertyPathDef {
        properties: properties.iter().map(|p| (*p).into()).collect(),
        span: SourceSpan::default(),
    }
}

/// `sum($this.amount)` grouped by `$this.product`.
fn by_product(group_by: &str, aggregate_fn: &str) -> AggregateViewDef {
    AggregateViewDef {
        model_operation: AggregateSpecificationDef {
            can_aggregate: true,
            group_by_functions: vec![path(&[group_by])],
            aggregate_values: vec![AggregateValueDef {
                map_fn: path(&["amount"]),
                aggregate_fn: aggregate_fn.into(),
            }],
        },
        aggregate_mapping: sales_columns("db", "SalesByProduct"),
        span: SourceSpan::default(),
    }
}

fn sales_mapping(views: Vec<AggregateViewDef>) -> ClassMappingDef {
    let mut def = class_mapping("model::Sales", None, relational(Vec::new()));
    def.body = ClassMappingBody::AggregationAware(AggregationAwareDef {
        main_mapping: sales_columns("db", "SalesTable"),
        views,
    });
    def
}

fn compile_units(databases: Vec<DatabaseDef>, mappings: Vec<MappingDef>) -> Result<Arc<CompiledGraph>, CompileError> {
    let model = model().with_class(
        Class::new("model::Sales")
            .with_property(Property::primitive("product", PrimitiveType::String))
            .with_property(Property::primitive("amount", PrimitiveType::Float)),
    );
    let mut workspace = Workspace::new(Arc::new(model), ResolutionSettings::default());
    for database in databases {
        workspace.upsert_database(database);
    }
    for mapping in mappings {
        workspace.upsert_mapping(mapping);
    }
    workspace.compile()
}

fn compile_sales(class_mappings: Vec<ClassMappingDef>) -> Result<Arc<CompiledGraph>, CompileError> {
    compile_units(vec![sales_db()], vec![mapping("M", Vec::new(), class_mappings)])
}

fn sales_error(class_mappings: Vec<ClassMappingDef>) -> String {
    let err = compile_sales(class_mappings).unwrap_err();
    err.diagnostics()[0].message.clone()
}

#[test]
fn test_generated_main_and_aggregate_mappings() {
    let graph = compile_sales(vec![sales_mapping(vec![by_product("product", "sum")])]).unwrap();
    let unit = graph.mapping("M").unwrap();
    let store = graph.store();

    let ClassMapping::AggregationAware(sales) = &unit.class_mappings[0] else {
        panic!("expected an aggregation-aware mapping");
    };
    assert_eq!(sales.id, "model_Sales");
    assert!(sales.root);
    assert_eq!(sales.main.id, "model_Sales_Main");
    assert_eq!(store.describe_alias(&sales.main.main_table), "[db]SalesTable");

    let aggregate = &sales.aggregates[0];
    assert_eq!(aggregate.index, 0);
    assert_eq!(aggregate.set_implementation.id, "model_Sales_Aggregate_0");
    assert_eq!(store.describe_alias(&aggregate.set_implementation.main_table), "[db]SalesByProduct");

    let value = &aggregate.specification.aggregate_values[0];
    assert_eq!(value.aggregate_fn, "sum");
    assert_eq!(value.map_fn.return_type, PropertyType::Primitive(PrimitiveType::Float));
    assert_eq!(aggregate.specification.group_by_functions[0].properties, vec!["product"]);

    assert!(unit.set_implementation("model_Sales_Aggregate_0").is_some());
    assert_eq!(unit.roots["model::Sales"], "model_Sales");
}

#[test]
fn test_views_are_numbered_in_declaration_order() {
    let graph = compile_sales(vec![sales_mapping(vec![
        by_product("product", "sum"),
        by_product("product", "max"),
    ])])
    .unwrap();
    let unit = graph.mapping("M").unwrap();
    assert!(unit.set_implementation("model_Sales_Aggregate_1").is_some());
    assert!(unit.set_implementation("model_Sales_Aggregate_2").is_none());
}

#[test]
fn test_aggregate_function_not_found() {
    let mut view = by_product("product", "sum");
    view.model_operation.aggregate_values[0].map_fn = path(&["product"]);
    assert_snapshot!(
        sales_error(vec![sales_mapping(vec![view])]),
        @"The system can't find a match for the function: sum(_:String[*])"
    );
}

#[test]
fn test_unknown_group_by_property() {
    assert_snapshot!(
        sales_error(vec![sales_mapping(vec![by_product("region", "sum")])]),
        @"Can't find the property 'region' in the class model::Sales"
    );
}

#[test]
fn test_group_by_cannot_step_past_a_primitive() {
    let mut view = by_product("product", "sum");
    view.model_operation.group_by_functions = vec![path(&["product", "amount"])];
    assert_snapshot!(
        sales_error(vec![sales_mapping(vec![view])]),
        @"Can't find the property 'amount' in the class String"
    );
}

#[test]
fn test_unknown_aggregate_value_property() {
    let mut view = by_product("product", "sum");
    view.model_operation.aggregate_values[0].map_fn = path(&["price"]);
    assert_snapshot!(
        sales_error(vec![sales_mapping(vec![view])]),
        @"Can't find the property 'price' in the class model::Sales"
    );
}

#[test]
fn test_included_aggregate_views_follow_store_substitution() {
    let mut view = by_product("product", "sum");
    view.aggregate_mapping = sales_columns("aggDb", "SalesByProduct");
    let databases = vec![
        database("db", &[], vec![sales_table()], Vec::new()),
        database("aggDb", &[], vec![sales_by_product()], Vec::new()),
        database("aggDb2", &["aggDb"], Vec::new(), Vec::new()),
    ];
    let mappings = vec![
        mapping("M", Vec::new(), vec![sales_mapping(vec![view])]),
        mapping("N", vec![include("M", &[("aggDb", "aggDb2")])], Vec::new()),
    ];
    let graph = compile_units(databases, mappings).unwrap();
    let store = graph.store();

    let declared = graph.set_implementation("M", "model_Sales_Aggregate_0").unwrap();
    assert_eq!(store.describe_alias(&declared.main_table()), "[aggDb]SalesByProduct");

    let included = graph.set_implementation("N", "model_Sales_Aggregate_0").unwrap();
    assert!(!included.is_local());
    assert_eq!(included.class(), "model::Sales");
    assert_eq!(store.describe_alias(&included.main_table()), "[aggDb2]SalesByProduct");

    // The main mapping does not touch the substituted store.
    let main = graph.set_implementation("N", "model_Sales_Main").unwrap();
    assert_eq!(store.describe_alias(&main.main_table()), "[db]SalesTable");

    let sales = graph.class_mapping("N", "model_Sales").unwrap();
    let views: Vec<String> = sales
        .sub_implementations()
        .iter()
        .map(|set| store.describe_alias(&set.main_table()))
        .collect();
    assert_eq!(views, vec!["[db]SalesTable", "[aggDb2]SalesByProduct"]);
}

#[test]
fn test_generated_id_collision() {
    let clash = class_mapping(
        "model::Person",
        Some("model_Sales_Main"),
        relational(vec![prop("name", db_col("db", "SalesTable", "PRODUCT"))]),
    );
    assert_snapshot!(
        sales_error(vec![sales_mapping(vec![by_product("product", "sum")]), clash]),
        @"Duplicate mapping found with id: 'model_Sales_Main' in mapping M"
    );
}

#[test]
fn test_relational_mapping_has_no_generated_ids() {
    let unit = resolve(vec![firm_db("db")], vec![mapping("M", Vec::new(), vec![person_mapping("db")])], "M");
    assert!(unit.set_implementation("model_Person").is_some());
    assert!(unit.set_implementation("model_Person_Main").is_none());
}
