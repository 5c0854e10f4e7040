#[path = "../common/mod.rs"]
mod common;

use common::*;
use insta::assert_snapshot;
use relmap::model::ast::MappingDef;
use relmap::model::PrimitiveType;
use relmap::semantic::ResolvedMapping;
use relmap::store::operation::Operation;
use relmap::store::Symbol;

fn person_unit(properties: Vec<relmap::model::ast::PropertyMappingDef>) -> MappingDef {
    mapping("M", Vec::new(), vec![class_mapping("model::Person", None, relational(properties))])
}

fn person_on_table(properties: Vec<relmap::model::ast::PropertyMappingDef>) -> MappingDef {
    mapping(
        "M",
        Vec::new(),
        vec![class_mapping("model::Person", None, relational_on("db", "PersonTable", properties))],
    )
}

fn operation_of(unit: &ResolvedMapping, id: &str, property: &str) -> Operation {
    let mapping = unit.class_mapping(id).unwrap();
    let properties = mapping.property_mappings();
    let found = properties.iter().find(|p| p.property == property).unwrap();
    found.operation().unwrap().clone()
}

fn name() -> relmap::model::ast::PropertyMappingDef {
    prop("name", db_col("db", "PersonTable", "NAME"))
}

// ============================================================================
// Chains with a terminal
// ============================================================================

#[test]
fn test_chain_to_terminal_column() {
    let firm_name = local_prop(
        "firmName",
        PrimitiveType::String,
        joins(Some("db"), &["Firm_Person"], Some(col("FirmTable", "LEGAL_NAME"))),
    );
    let unit = resolve(vec![firm_db("db")], vec![person_unit(vec![name(), firm_name])], "M");

    let operation = operation_of(&unit, "model_Person", "firmName");
    let chain = operation.as_join().unwrap();
    assert_eq!(chain.source.name, "PersonTable");
    assert_eq!(chain.steps.len(), 1);
    assert_eq!(chain.steps[0].alias, "FirmTable");

    let Some(Operation::Column(terminal)) = chain.target.as_deref() else {
        panic!("expected a terminal column");
    };
    assert_eq!(terminal.alias.name, "FirmTable");
    assert_eq!(terminal.column, "LEGAL_NAME");

    let join = Symbol::Join {
        database: "db".into(),
        join: "Firm_Person".into(),
    };
    assert_eq!(unit.usages.usages_of(&join).len(), 1);
}

#[test]
fn test_only_marked_joins_record_database_usage() {
    let firm_name = |db: Option<&str>| {
        local_prop(
            "firmName",
            PrimitiveType::String,
            joins(db, &["Firm_Person"], Some(col("FirmTable", "LEGAL_NAME"))),
        )
    };
    let marked = resolve(vec![firm_db("db")], vec![person_on_table(vec![name(), firm_name(Some("db"))])], "M");
    let unmarked = resolve(vec![firm_db("db")], vec![person_on_table(vec![name(), firm_name(None)])], "M");

    // An unmarked join resolves in the addressed database all the same.
    assert_eq!(
        operation_of(&marked, "model_Person", "firmName"),
        operation_of(&unmarked, "model_Person", "firmName")
    );

    let database = Symbol::Database("db".into());
    assert_eq!(
        marked.usages.usages_of(&database).len(),
        unmarked.usages.usages_of(&database).len() + 1
    );
    let join = Symbol::Join {
        database: "db".into(),
        join: "Firm_Person".into(),
    };
    assert_eq!(marked.usages.usages_of(&join).len(), 1);
    assert_eq!(unmarked.usages.usages_of(&join).len(), 1);
}

#[test]
fn test_terminal_on_wrong_table() {
    let street = local_prop(
        "street",
        PrimitiveType::String,
        joins(Some("db"), &["Firm_Person"], Some(col("AddressTable", "STREET"))),
    );
    let err = error_of(vec![firm_db("db")], vec![person_on_table(vec![name(), street])], "M");
    assert_snapshot!(
        err,
        @"Mapping error: the join Firm_Person does not connect from the table [db]PersonTable to the table [db]AddressTable; instead it connects to [db]FirmTable"
    );
}

#[test]
fn test_two_step_chain() {
    let street = local_prop(
        "street",
        PrimitiveType::String,
        joins(Some("db"), &["Firm_Person", "Firm_Address"], Some(col("AddressTable", "STREET"))),
    );
    let graph = compile(vec![firm_db("db")], vec![person_unit(vec![name(), street])]).unwrap();
    let unit = graph.mapping("M").unwrap();

    let operation = operation_of(unit, "model_Person", "street");
    let chain = operation.as_join().unwrap();
    let aliases: Vec<&str> = chain.steps.iter().map(|s| s.alias.as_str()).collect();
    assert_eq!(aliases, vec!["FirmTable", "AddressTable"]);

    let store = graph.store();
    let db = store.database_id("db").unwrap();
    assert_eq!(chain.end(), store.find_table(db, "default", "AddressTable").unwrap());
}

#[test]
fn test_unknown_join() {
    let firm_name = local_prop(
        "firmName",
        PrimitiveType::String,
        joins(Some("db"), &["Nope"], Some(col("FirmTable", "LEGAL_NAME"))),
    );
    let err = error_of(vec![firm_db("db")], vec![person_on_table(vec![name(), firm_name])], "M");
    assert_snapshot!(err, @"The join 'Nope' has not been found in the database 'db'");
}

#[test]
fn test_main_table_inferred_from_chain() {
    let firm_name = local_prop(
        "firmName",
        PrimitiveType::String,
        joins(Some("db"), &["Firm_Person"], Some(col("FirmTable", "LEGAL_NAME"))),
    );
    let graph = compile(vec![firm_db("db")], vec![person_unit(vec![firm_name])]).unwrap();
    let person = graph.class_mapping("M", "model_Person").unwrap();
    assert_eq!(graph.store().describe_alias(&person.main_table()), "[db]PersonTable");
}

// ============================================================================
// Self joins
// ============================================================================

#[test]
fn test_self_join_object_property() {
    let manager = prop("manager", joins(Some("db"), &["Person_Manager"], None));
    let unit = resolve(vec![firm_db("db")], vec![person_unit(vec![name(), manager])], "M");

    let person = unit.class_mapping("model_Person").unwrap();
    let properties = person.property_mappings();
    let manager = properties.iter().find(|p| p.property == "manager").unwrap();
    assert_eq!(manager.target_id.as_deref(), Some("model_Person"));

    let chain = manager.operation().unwrap().as_join().unwrap();
    assert_eq!(chain.steps[0].alias, "t_PersonTable");
    assert_eq!(chain.steps[0].from, chain.steps[0].to);
}

#[test]
fn test_self_join_terminal_uses_far_alias() {
    let manager_name = local_prop(
        "managerName",
        PrimitiveType::String,
        joins(Some("db"), &["Person_Manager"], Some(col("PersonTable", "NAME"))),
    );
    let unit = resolve(vec![firm_db("db")], vec![person_unit(vec![name(), manager_name])], "M");

    let operation = operation_of(&unit, "model_Person", "managerName");
    let chain = operation.as_join().unwrap();
    assert_eq!(chain.source.name, "PersonTable");
    let Some(Operation::Column(terminal)) = chain.target.as_deref() else {
        panic!("expected a terminal column");
    };
    assert_eq!(terminal.alias.name, "t_PersonTable");
}

// ============================================================================
// Object properties ending on the target mapping's main table
// ============================================================================

fn address_mapping() -> relmap::model::ast::ClassMappingDef {
    class_mapping(
        "model::Address",
        None,
        relational(vec![prop("street", db_col("db", "AddressTable", "STREET"))]),
    )
}

#[test]
fn test_object_property_must_reach_target_table() {
    let firm = class_mapping(
        "model::Firm",
        None,
        relational(vec![
            prop("legalName", db_col("db", "FirmTable", "LEGAL_NAME")),
            prop("address", joins(Some("db"), &["Firm_Person"], None)),
        ]),
    );
    let err = error_of(vec![firm_db("db")], vec![mapping("M", Vec::new(), vec![firm, address_mapping()])], "M");
    assert_snapshot!(
        err,
        @"Mapping error: the join Firm_Person does not connect from the table [db]FirmTable to the table [db]AddressTable; instead it connects to [db]PersonTable"
    );
}

#[test]
fn test_object_property_reaching_target_table() {
    let firm = class_mapping(
        "model::Firm",
        None,
        relational(vec![
            prop("legalName", db_col("db", "FirmTable", "LEGAL_NAME")),
            prop("address", joins(Some("db"), &["Firm_Address"], None)),
        ]),
    );
    let unit = resolve(vec![firm_db("db")], vec![mapping("M", Vec::new(), vec![firm, address_mapping()])], "M");
    let firm = unit.class_mapping("model_Firm").unwrap();
    let properties = firm.property_mappings();
    let address = properties.iter().find(|p| p.property == "address").unwrap();
    assert_eq!(address.target_id.as_deref(), Some("model_Address"));
}

#[test]
fn test_join_without_source_table() {
    let firm = class_mapping(
        "model::Firm",
        None,
        relational(vec![
            prop("legalName", db_col("db", "FirmTable", "LEGAL_NAME")),
            prop("address", joins(Some("db"), &["Person_Manager"], None)),
        ]),
    );
    let err = error_of(vec![firm_db("db")], vec![mapping("M", Vec::new(), vec![firm, address_mapping()])], "M");
    assert_snapshot!(err, @"Mapping error: the join Person_Manager does not contain the source table [db]FirmTable");
}
