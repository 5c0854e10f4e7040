#[path = "../common/mod.rs"]
mod common;

use common::*;
use insta::assert_snapshot;
use relmap::config::ResolutionSettings;
use relmap::model::ast::{
    ClassMappingDef, DatabaseDef, EmbeddedMappingDef, EnumSourceValue, EnumValueMappingDef,
    EnumerationMappingDef, FilterDef, FilterRefDef, JoinPathDef, JoinRefDef, MappingDef, OtherwiseDef,
    PropertyMappingBody, PropertyMappingDef,
};
use relmap::model::{PrimitiveType, SourceSpan};
use relmap::semantic::PropertyValue;
use relmap::store::Symbol;

fn unit(class_mappings: Vec<ClassMappingDef>) -> MappingDef {
    mapping("M", Vec::new(), class_mappings)
}

fn person(id: &str) -> ClassMappingDef {
    class_mapping(
        "model::Person",
        Some(id),
        relational(vec![prop("name", db_col("db", "PersonTable", "NAME"))]),
    )
}

fn name() -> PropertyMappingDef {
    prop("name", db_col("db", "PersonTable", "NAME"))
}

// ============================================================================
// Roots
// ============================================================================

#[test]
fn test_single_mapping_is_implicit_root() {
    let unit = resolve(vec![firm_db("db")], vec![unit(vec![person_mapping("db")])], "M");
    assert_eq!(unit.roots.get("model::Person").map(String::as_str), Some("model_Person"));

    let person = unit.root_class_mapping("model::Person").unwrap();
    assert!(person.root());
    assert!(!person.declared_root());
}

#[test]
fn test_root_count() {
    let none = error_of(vec![firm_db("db")], vec![unit(vec![person("p1"), person("p2")])], "M");
    assert_snapshot!(
        none,
        @"The class 'model::Person' is mapped by 2 set implementations and has 0 roots. There should be exactly one root set implementation for the class, which is marked with a '*' in the mapping definition."
    );

    let both = error_of(
        vec![firm_db("db")],
        vec![unit(vec![rooted(person("p1")), rooted(person("p2"))])],
        "M",
    );
    assert_snapshot!(
        both,
        @"The class 'model::Person' is mapped by 2 set implementations and has 2 roots. There should be exactly one root set implementation for the class, which is marked with a '*' in the mapping definition."
    );
}

#[test]
fn test_marked_root_among_several() {
    let unit = resolve(vec![firm_db("db")], vec![unit(vec![person("p1"), rooted(person("p2"))])], "M");
    assert_eq!(unit.roots["model::Person"], "p2");
    assert!(!unit.class_mapping("p1").unwrap().root());
    assert!(unit.class_mapping("p2").unwrap().root());
}

#[test]
fn test_roots_count_included_mappings() {
    let included = mapping("B", Vec::new(), vec![person_mapping("db")]);

    let unmarked = mapping("A", vec![include("B", &[])], vec![person("p")]);
    let err = error_of(vec![firm_db("db")], vec![unmarked, included.clone()], "A");
    assert_snapshot!(
        err,
        @"The class 'model::Person' is mapped by 2 set implementations and has 0 roots. There should be exactly one root set implementation for the class, which is marked with a '*' in the mapping definition."
    );

    let marked = mapping("A", vec![include("B", &[])], vec![rooted(person("p"))]);
    let unit = resolve(vec![firm_db("db")], vec![marked, included], "A");
    assert_eq!(unit.roots["model::Person"], "p");
}

// ============================================================================
// Classes, properties and main tables
// ============================================================================

#[test]
fn test_unknown_class() {
    let err = error_of(
        vec![firm_db("db")],
        vec![unit(vec![class_mapping("model::Nope", None, relational(vec![name()]))])],
        "M",
    );
    assert_snapshot!(err, @"Can't find the type 'model::Nope'");
}

#[test]
fn test_unknown_property() {
    let mapping = class_mapping(
        "model::Person",
        None,
        relational(vec![name(), prop("nope", db_col("db", "PersonTable", "ID"))]),
    );
    let err = error_of(vec![firm_db("db")], vec![unit(vec![mapping])], "M");
    assert_snapshot!(err, @"The property 'nope' is unknown in the Element 'model::Person'");
}

#[test]
fn test_duplicate_property_mapping() {
    let mapping = class_mapping("model::Person", None, relational(vec![name(), name()]));
    let err = error_of(vec![firm_db("db")], vec![unit(vec![mapping])], "M");
    assert_snapshot!(
        err,
        @"Duplicate mappings found for the property 'name' in the mapping for class model::Person, the property should have one mapping."
    );
}

#[test]
fn test_main_table_not_found() {
    let mapping = class_mapping("model::Person", None, relational(Vec::new()));
    let err = error_of(vec![firm_db("db")], vec![unit(vec![mapping])], "M");
    assert_snapshot!(
        err,
        @"Can't find the main table for class 'model::Person'. Please specify a main table using the ~mainTable directive."
    );
}

#[test]
fn test_main_table_ambiguous() {
    let mapping = class_mapping(
        "model::Person",
        None,
        relational(vec![
            name(),
            local_prop("firmName", PrimitiveType::String, db_col("db", "FirmTable", "LEGAL_NAME")),
        ]),
    );
    let err = error_of(vec![firm_db("db")], vec![unit(vec![mapping])], "M");
    assert_snapshot!(
        err,
        @"Can't find the main table for class 'model::Person'. Found tables [db]PersonTable, [db]FirmTable. Please specify a main table using the ~mainTable directive."
    );
}

#[test]
fn test_property_kind_must_match_operation() {
    let data_to_join = class_mapping(
        "model::Person",
        None,
        relational_on("db", "PersonTable", vec![prop("name", joins(Some("db"), &["Firm_Person"], None))]),
    );
    assert_snapshot!(
        error_of(vec![firm_db("db")], vec![unit(vec![data_to_join])], "M"),
        @"The property 'name' of class 'model::Person' is a primitive property and must be mapped to a column or an expression, not to a join"
    );

    let object_to_column = class_mapping(
        "model::Firm",
        None,
        relational(vec![prop("address", db_col("db", "FirmTable", "ADDRESS_ID"))]),
    );
    assert_snapshot!(
        error_of(vec![firm_db("db")], vec![unit(vec![object_to_column])], "M"),
        @"The property 'address' of class 'model::Firm' is not a primitive property and must be mapped through a join"
    );
}

#[test]
fn test_unknown_target_mapping() {
    let manager = with_target(prop("manager", joins(Some("db"), &["Person_Manager"], None)), "nope");
    let mapping = class_mapping("model::Person", None, relational(vec![name(), manager]));
    let err = error_of(vec![firm_db("db")], vec![unit(vec![mapping])], "M");
    assert_snapshot!(
        err,
        @"Unable to find target class mapping (id:nope) for property 'manager' in class mapping 'model_Person'"
    );
}

#[test]
fn test_usages_are_recorded_per_occurrence() {
    let unit = resolve(vec![firm_db("db")], vec![unit(vec![person_mapping("db")])], "M");
    assert_eq!(unit.usages.usages_of(&Symbol::Database("db".into())).len(), 1);

    let column = Symbol::Column {
        database: "db".into(),
        schema: "default".into(),
        table: "PersonTable".into(),
        column: "NAME".into(),
    };
    assert_eq!(unit.usages.usages_of(&column).len(), 1);
}

#[test]
fn test_usages_can_be_disabled() {
    let settings = ResolutionSettings {
        record_usages: false,
        ..ResolutionSettings::default()
    };
    let graph = workspace_with(settings, vec![firm_db("db")], vec![unit(vec![person_mapping("db")])])
        .compile()
        .unwrap();
    assert!(graph.mapping("M").unwrap().usages.is_empty());
}

// ============================================================================
// Enumeration transformers
// ============================================================================

fn gender_mapping() -> EnumerationMappingDef {
    let value = |value: &str, source: &str| EnumValueMappingDef {
        value: value.into(),
        sources: vec![EnumSourceValue::String(source.to_string())],
    };
    EnumerationMappingDef {
        enumeration: "model::Gender".into(),
        id: Some("GenderMapping".into()),
        values: vec![value("MALE", "M"), value("FEMALE", "F")],
        span: SourceSpan::default(),
    }
}

fn with_gender(transformer: &str) -> MappingDef {
    let person = class_mapping(
        "model::Person",
        None,
        relational(vec![name(), enum_prop("gender", transformer, db_col("db", "PersonTable", "GENDER"))]),
    );
    let mut def = unit(vec![person]);
    def.enumeration_mappings.push(gender_mapping());
    def
}

#[test]
fn test_enumeration_transformer() {
    let unit = resolve(vec![firm_db("db")], vec![with_gender("GenderMapping")], "M");
    let person = unit.class_mapping("model_Person").unwrap();
    let properties = person.property_mappings();
    let gender = properties.iter().find(|p| p.property == "gender").unwrap();
    let PropertyValue::Relational { transformer, .. } = &gender.value else {
        panic!("expected a relational property mapping");
    };
    assert_eq!(transformer.as_deref(), Some("GenderMapping"));

    let enumeration = unit.enumeration_mapping("GenderMapping").unwrap();
    assert_eq!(enumeration.value_of(&EnumSourceValue::String("F".into())), Some("FEMALE"));
}

#[test]
fn test_unknown_enumeration_transformer() {
    let err = error_of(vec![firm_db("db")], vec![with_gender("Nope")], "M");
    assert_snapshot!(err, @"Can't find enumeration mapping 'Nope'");
}

// ============================================================================
// Embedded mappings
// ============================================================================

#[test]
fn test_embedded_mapping_id() {
    let address = PropertyMappingDef {
        body: PropertyMappingBody::Embedded(EmbeddedMappingDef {
            primary_key: Vec::new(),
            property_mappings: vec![prop("street", db_col("db", "FirmTable", "LEGAL_NAME"))],
            otherwise: None,
        }),
        ..prop("address", db_col("db", "FirmTable", "ID"))
    };
    let firm = class_mapping(
        "model::Firm",
        None,
        relational(vec![prop("legalName", db_col("db", "FirmTable", "LEGAL_NAME")), address]),
    );
    let unit = resolve(vec![firm_db("db")], vec![unit(vec![firm])], "M");

    let firm = unit.class_mapping("model_Firm").unwrap();
    let properties = firm.property_mappings();
    let address = properties.iter().find(|p| p.property == "address").unwrap();
    assert_eq!(address.target_id.as_deref(), Some("model_Firm_address"));
    let PropertyValue::Embedded(embedded) = &address.value else {
        panic!("expected an embedded mapping");
    };
    assert_eq!(embedded.id, "model_Firm_address");
    assert_eq!(embedded.class, "model::Address");
    assert_eq!(embedded.property_mappings[0].source_id, "model_Firm_address");
}

// ============================================================================
// Class mapping clauses
// ============================================================================

fn filtered_db() -> DatabaseDef {
    let mut db = firm_db("db");
    db.filters.push(FilterDef {
        name: "ActivePerson".into(),
        condition: eq(col("PersonTable", "GENDER"), literal("F")),
        span: SourceSpan::default(),
    });
    db.filters.push(FilterDef {
        name: "NamedFirm".into(),
        condition: eq(col("FirmTable", "LEGAL_NAME"), literal("Acme")),
        span: SourceSpan::default(),
    });
    db
}

fn filter_ref(name: &str, through: &[&str]) -> FilterRefDef {
    FilterRefDef {
        database: Some("db".into()),
        joins: through
            .iter()
            .map(|j| JoinRefDef {
                database: Some("db".into()),
                name: (*j).into(),
                join_type: None,
            })
            .collect(),
        name: name.into(),
    }
}

#[test]
fn test_filter_distinct_and_primary_key() {
    let mut body = relational(vec![name()]);
    body.filter = Some(filter_ref("ActivePerson", &[]));
    body.distinct = true;
    body.primary_key = vec![db_col("db", "PersonTable", "ID")];
    let unit = resolve(
        vec![filtered_db()],
        vec![unit(vec![class_mapping("model::Person", None, body)])],
        "M",
    );

    let person = unit.set_implementation("model_Person").unwrap().declared();
    assert!(person.distinct);
    assert_eq!(person.filter.as_ref().map(|f| f.name.as_str()), Some("ActivePerson"));
    assert!(person.filter.as_ref().unwrap().joins.is_empty());
    assert_eq!(person.primary_key.len(), 1);
}

#[test]
fn test_filter_through_join() {
    let mut body = relational(vec![name()]);
    body.filter = Some(filter_ref("NamedFirm", &["Firm_Person"]));
    let unit = resolve(
        vec![filtered_db()],
        vec![unit(vec![class_mapping("model::Person", None, body)])],
        "M",
    );

    let filter = unit.set_implementation("model_Person").unwrap().declared().filter.clone().unwrap();
    assert_eq!(filter.name, "NamedFirm");
    assert_eq!(filter.joins.len(), 1);
    assert_eq!(filter.joins[0].alias, "FirmTable");
}

#[test]
fn test_unknown_filter() {
    let mut body = relational(vec![name()]);
    body.filter = Some(filter_ref("Nope", &[]));
    let err = error_of(vec![filtered_db()], vec![unit(vec![class_mapping("model::Person", None, body)])], "M");
    assert_snapshot!(err, @"The filter 'Nope' has not been found in the database 'db'");
}

// ============================================================================
// Inline and otherwise mappings
// ============================================================================

fn address(id: &str) -> ClassMappingDef {
    class_mapping(
        "model::Address",
        Some(id),
        relational(vec![prop("street", db_col("db", "AddressTable", "STREET"))]),
    )
}

fn firm_with(address: PropertyMappingDef) -> ClassMappingDef {
    class_mapping(
        "model::Firm",
        None,
        relational(vec![prop("legalName", db_col("db", "FirmTable", "LEGAL_NAME")), address]),
    )
}

fn inline(target: &str) -> PropertyMappingDef {
    PropertyMappingDef {
        body: PropertyMappingBody::Inline(target.into()),
        ..prop("address", db_col("db", "FirmTable", "ID"))
    }
}

fn embedded_otherwise(target: &str, join: &str) -> PropertyMappingDef {
    PropertyMappingDef {
        body: PropertyMappingBody::Embedded(EmbeddedMappingDef {
            primary_key: Vec::new(),
            property_mappings: vec![prop("street", db_col("db", "FirmTable", "LEGAL_NAME"))],
            otherwise: Some(OtherwiseDef {
                target_id: target.into(),
                join: JoinPathDef {
                    joins: vec![JoinRefDef {
                        database: Some("db".into()),
                        name: join.into(),
                        join_type: None,
                    }],
                    target: None,
                },
            }),
        }),
        ..prop("address", db_col("db", "FirmTable", "ID"))
    }
}

#[test]
fn test_inline_mapping() {
    let unit = resolve(
        vec![firm_db("db")],
        vec![unit(vec![firm_with(inline("addr")), address("addr")])],
        "M",
    );
    let firm = unit.class_mapping("model_Firm").unwrap();
    let properties = firm.property_mappings();
    let address = properties.iter().find(|p| p.property == "address").unwrap();
    assert_eq!(address.target_id.as_deref(), Some("addr"));
    assert!(matches!(&address.value, PropertyValue::Inline { target_id } if target_id == "addr"));
}

#[test]
fn test_inline_mapping_of_wrong_class() {
    let err = error_of(
        vec![firm_db("db")],
        vec![unit(vec![firm_with(inline("person")), person("person")])],
        "M",
    );
    assert_snapshot!(
        err,
        @"The class mapping 'person' maps 'model::Person', which is not compatible with the type 'model::Address' of property 'address'"
    );
}

#[test]
fn test_embedded_otherwise() {
    let unit = resolve(
        vec![firm_db("db")],
        vec![unit(vec![firm_with(embedded_otherwise("addr", "Firm_Address")), address("addr")])],
        "M",
    );
    let firm = unit.class_mapping("model_Firm").unwrap();
    let properties = firm.property_mappings();
    let address = properties.iter().find(|p| p.property == "address").unwrap();
    let PropertyValue::Embedded(embedded) = &address.value else {
        panic!("expected an embedded mapping");
    };
    let otherwise = embedded.otherwise.as_ref().unwrap();
    assert_eq!(otherwise.target_id, "addr");
    assert_eq!(otherwise.join.steps.len(), 1);
}

#[test]
fn test_embedded_otherwise_must_reach_target_table() {
    let err = error_of(
        vec![firm_db("db")],
        vec![unit(vec![firm_with(embedded_otherwise("addr", "Firm_Person")), address("addr")])],
        "M",
    );
    assert_snapshot!(
        err,
        @"Mapping error: the join Firm_Person does not connect from the table [db]FirmTable to the table [db]AddressTable; instead it connects to [db]PersonTable"
    );
}

// ============================================================================
// Extends
// ============================================================================

fn vehicle() -> ClassMappingDef {
    class_mapping(
        "model::Vehicle",
        Some("vehicle"),
        relational_on("db", "VehicleTable", vec![prop("id", db_col("db", "VehicleTable", "ID"))]),
    )
}

fn car(properties: Vec<PropertyMappingDef>) -> ClassMappingDef {
    extending(class_mapping("model::Car", Some("car"), relational(properties)), "vehicle")
}

fn wheels(db: &str) -> PropertyMappingDef {
    prop("wheels", db_col(db, "VehicleTable", "WHEELS"))
}

fn with_other_db() -> Vec<DatabaseDef> {
    vec![firm_db("db"), database("other", &["db"], Vec::new(), Vec::new())]
}

#[test]
fn test_extends_inherits_main_table() {
    let graph = compile(vec![firm_db("db")], vec![unit(vec![car(vec![wheels("db")]), vehicle()])]).unwrap();
    let car = graph.class_mapping("M", "car").unwrap();
    assert_eq!(car.super_id(), Some("vehicle"));
    assert_eq!(graph.store().describe_alias(&car.main_table()), "[db]VehicleTable");
}

#[test]
fn test_extends_requires_new_properties() {
    let err = error_of(vec![firm_db("db")], vec![unit(vec![vehicle(), car(Vec::new())])], "M");
    assert_snapshot!(
        err,
        @"The property 'wheels' is declared by class 'model::Car' but is not mapped by the extending mapping 'car'"
    );
}

#[test]
fn test_extends_with_inconsistent_database() {
    let err = error_of(with_other_db(), vec![unit(vec![vehicle(), car(vec![wheels("other")])])], "M");
    assert_snapshot!(
        err,
        @"Can't find the main table for class 'model::Car'. Inconsistent database definitions for the mapping."
    );
}

#[test]
fn test_extends_with_explicit_main_table() {
    let car = extending(
        class_mapping("model::Car", Some("car"), relational_on("db", "VehicleTable", vec![wheels("db")])),
        "vehicle",
    );
    let err = error_of(vec![firm_db("db")], vec![unit(vec![vehicle(), car])], "M");
    assert_snapshot!(err, @"Cannot specify main table explicitly for extended mapping [car]");
}

#[test]
fn test_extends_unknown_super() {
    let car = extending(class_mapping("model::Car", Some("car"), relational(vec![wheels("db")])), "nope");
    let err = error_of(vec![firm_db("db")], vec![unit(vec![car])], "M");
    assert_snapshot!(err, @"Can't find the extended class mapping 'nope' in mapping 'M'");
}

#[test]
fn test_extends_self() {
    let car = extending(class_mapping("model::Car", Some("car"), relational(vec![wheels("db")])), "car");
    let err = error_of(vec![firm_db("db")], vec![unit(vec![car])], "M");
    assert_snapshot!(err, @"Extend mapping id cannot reference self 'car'");
}

#[test]
fn test_extends_cycle() {
    let a = extending(class_mapping("model::Vehicle", Some("a"), relational(Vec::new())), "b");
    let b = extending(class_mapping("model::Car", Some("b"), relational(Vec::new())), "a");
    let err = error_of(vec![firm_db("db")], vec![unit(vec![a, b])], "M");
    assert_snapshot!(err, @"Cycle detected in class mapping extends: a -> b -> a");
}

#[test]
fn test_extends_non_superclass() {
    let firm = extending(
        class_mapping(
            "model::Firm",
            Some("firm"),
            relational(vec![prop("legalName", db_col("db", "FirmTable", "LEGAL_NAME"))]),
        ),
        "vehicle",
    );
    let err = error_of(vec![firm_db("db")], vec![unit(vec![vehicle(), firm])], "M");
    assert_snapshot!(
        err,
        @"Class mapping 'firm' for class 'model::Firm' cannot extend 'vehicle', which maps 'model::Vehicle', not a superclass of 'model::Firm'"
    );
}

#[test]
fn test_extends_included_mapping_through_substitution() {
    let databases = vec![firm_db("base"), database("sub", &["base"], Vec::new(), Vec::new())];
    let vehicles = mapping(
        "B",
        Vec::new(),
        vec![class_mapping(
            "model::Vehicle",
            Some("vehicle"),
            relational_on("base", "VehicleTable", vec![prop("id", db_col("base", "VehicleTable", "ID"))]),
        )],
    );
    let cars = mapping("A", vec![include("B", &[("base", "sub")])], vec![car(vec![wheels("sub")])]);

    let graph = compile(databases, vec![cars, vehicles]).unwrap();
    let car = graph.class_mapping("A", "car").unwrap();
    assert_eq!(graph.store().describe_alias(&car.main_table()), "[sub]VehicleTable");
}
