//! Object-model collaborator.
//!
//! The class/property/association type system is compiled elsewhere. The
//! resolvers only query it through [`ObjectModel`]; [`ModelRegistry`] is the
//! in-memory implementation used by the CLI and the tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{Multiplicity, PrimitiveType};

/// Read-only view of the typed object model.
pub trait ObjectModel: fmt::Debug + Send + Sync {
    fn class(&self, path: &str) -> Option<&Class>;

    fn association(&self, path: &str) -> Option<&Association>;

    fn enumeration(&self, path: &str) -> Option<&Enumeration>;

    /// Is `ancestor` the same class as `class` or one of its (transitive) superclasses?
    fn is_ancestor_or_self(&self, ancestor: &str, class: &str) -> bool;

    /// Find a property visible on `class`: declared, inherited, or contributed
    /// by an association.
    fn find_property(&self, class: &str, name: &str) -> Option<&Property>;

    /// Find an aggregate function accepting a collection of `argument`.
    fn find_function(&self, name: &str, argument: &PropertyType) -> Option<&FunctionSignature>;

    /// Whether any element (class, association, enumeration) is declared under `path`.
    fn has_element(&self, path: &str) -> bool {
        self.class(path).is_some()
            || self.association(path).is_some()
            || self.enumeration(path).is_some()
    }
}

/// Type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Primitive(PrimitiveType),
    Class(String),
    Enumeration(String),
}

impl PropertyType {
    /// Primitive and enumeration typed properties map to columns, not joins.
    pub fn is_data_type(&self) -> bool {
        !matches!(self, PropertyType::Class(_))
    }

    pub fn class_path(&self) -> Option<&str> {
        match self {
            PropertyType::Class(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Primitive(p) => write!(f, "{}", p),
            PropertyType::Class(path) | PropertyType::Enumeration(path) => write!(f, "{}", path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub property_type: PropertyType,
    #[serde(default)]
    pub multiplicity: Multiplicity,
    /// Class declaring the property. Filled in by the registry.
    #[serde(default)]
    pub owner: String,
}

impl Property {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            multiplicity: Multiplicity::ONE,
            owner: String::new(),
        }
    }

    pub fn primitive(name: impl Into<String>, primitive: PrimitiveType) -> Self {
        Self::new(name, PropertyType::Primitive(primitive))
    }

    pub fn class(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Class(class.into()))
    }

    pub fn enumeration(name: impl Into<String>, enumeration: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Enumeration(enumeration.into()))
    }

    pub fn with_multiplicity(mut self, multiplicity: Multiplicity) -> Self {
        self.multiplicity = multiplicity;
        self
    }
}

/// A parameterized property (`employeeByName(name: String[1])`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedProperty {
    pub name: String,
    pub return_type: PropertyType,
    #[serde(default)]
    pub owner: String,
}

/// Temporal stereotype on a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temporal {
    Business,
    Processing,
    Bitemporal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub path: String,
    #[serde(default)]
    pub generalizations: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub qualified_properties: Vec<QualifiedProperty>,
    #[serde(default)]
    pub temporal: Option<Temporal>,
}

impl Class {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            generalizations: Vec::new(),
            properties: Vec::new(),
            qualified_properties: Vec::new(),
            temporal: None,
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.generalizations.push(superclass.into());
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_qualified_property(mut self, name: impl Into<String>, return_type: PropertyType) -> Self {
        self.qualified_properties.push(QualifiedProperty {
            name: name.into(),
            return_type,
            owner: String::new(),
        });
        self
    }

    pub fn temporal(mut self, temporal: Temporal) -> Self {
        self.temporal = Some(temporal);
        self
    }

    /// Properties declared directly on this class, excluding inherited ones.
    pub fn own_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// A two-ended association. `properties[i]` is navigable from the class at
/// the type of `properties[1 - i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub path: String,
    pub properties: [Property; 2],
    #[serde(default)]
    pub qualified_properties: Vec<QualifiedProperty>,
}

impl Association {
    pub fn new(path: impl Into<String>, first: Property, second: Property) -> Self {
        Self {
            path: path.into(),
            properties: [first, second],
            qualified_properties: Vec::new(),
        }
    }

    pub fn with_qualified_property(mut self, name: impl Into<String>, return_type: PropertyType) -> Self {
        self.qualified_properties.push(QualifiedProperty {
            name: name.into(),
            return_type,
            owner: String::new(),
        });
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn qualified_property(&self, name: &str) -> Option<&QualifiedProperty> {
        self.qualified_properties.iter().find(|p| p.name == name)
    }

    /// The class from which `property` is navigated.
    pub fn owner_of(&self, property: &str) -> Option<&str> {
        let index = self.properties.iter().position(|p| p.name == property)?;
        self.properties[1 - index].property_type.class_path()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumeration {
    pub path: String,
    pub values: Vec<String>,
}

impl Enumeration {
    pub fn new<I, S>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// An aggregate function taking a collection of `parameter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub parameter: PrimitiveType,
    pub return_type: PrimitiveType,
}

impl FunctionSignature {
    fn new(name: &str, parameter: PrimitiveType, return_type: PrimitiveType) -> Self {
        Self {
            name: name.to_string(),
            parameter,
            return_type,
        }
    }
}

/// Serialized form of an object model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectModelDef {
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub associations: Vec<Association>,
    #[serde(default)]
    pub enumerations: Vec<Enumeration>,
    #[serde(default)]
    pub functions: Vec<FunctionSignature>,
}

/// In-memory object model.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "ObjectModelDef")]
pub struct ModelRegistry {
    classes: HashMap<String, Class>,
    associations: HashMap<String, Association>,
    enumerations: HashMap<String, Enumeration>,
    functions: Vec<FunctionSignature>,
    /// Class path -> (association path, property index) for association-contributed properties
    association_properties: HashMap<String, Vec<(String, usize)>>,
}

impl ModelRegistry {
    /// Create a registry pre-populated with the standard aggregate functions.
    pub fn new() -> Self {
        use PrimitiveType::*;
        let functions = vec![
            FunctionSignature::new("sum", Number, Number),
            FunctionSignature::new("sum", Integer, Integer),
            FunctionSignature::new("sum", Float, Float),
            FunctionSignature::new("sum", Decimal, Decimal),
            FunctionSignature::new("average", Number, Float),
            FunctionSignature::new("avg", Number, Float),
            FunctionSignature::new("count", Any, Integer),
            FunctionSignature::new("distinctCount", Any, Integer),
            FunctionSignature::new("min", Number, Number),
            FunctionSignature::new("min", Date, Date),
            FunctionSignature::new("min", String, String),
            FunctionSignature::new("max", Number, Number),
            FunctionSignature::new("max", Date, Date),
            FunctionSignature::new("max", String, String),
        ];
        Self {
            classes: HashMap::new(),
            associations: HashMap::new(),
            enumerations: HashMap::new(),
            functions,
            association_properties: HashMap::new(),
        }
    }

    pub fn with_class(mut self, mut class: Class) -> Self {
        for property in &mut class.properties {
            property.owner = class.path.clone();
        }
        for qualified in &mut class.qualified_properties {
            qualified.owner = class.path.clone();
        }
        self.classes.insert(class.path.clone(), class);
        self
    }

    pub fn with_association(mut self, mut association: Association) -> Self {
        for index in 0..2 {
            let owner = association.properties[1 - index]
                .property_type
                .class_path()
                .map(str::to_string)
                .unwrap_or_default();
            association.properties[index].owner = owner.clone();
            self.association_properties
                .entry(owner)
                .or_default()
                .push((association.path.clone(), index));
        }
        self.associations.insert(association.path.clone(), association);
        self
    }

    pub fn with_enumeration(mut self, enumeration: Enumeration) -> Self {
        self.enumerations.insert(enumeration.path.clone(), enumeration);
        self
    }

    pub fn with_function(mut self, function: FunctionSignature) -> Self {
        self.functions.push(function);
        self
    }

    /// All superclasses of `class`, nearest first, each visited once.
    fn lineage(&self, class: &str) -> Vec<&Class> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([class]);
        while let Some(path) = queue.pop_front() {
            if !seen.insert(path) {
                continue;
            }
            if let Some(found) = self.classes.get(path) {
                result.push(found);
                queue.extend(found.generalizations.iter().map(String::as_str));
            }
        }
        result
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectModelDef> for ModelRegistry {
    fn from(def: ObjectModelDef) -> Self {
        let mut registry = ModelRegistry::new();
        for class in def.classes {
            registry = registry.with_class(class);
        }
        for association in def.associations {
            registry = registry.with_association(association);
        }
        for enumeration in def.enumerations {
            registry = registry.with_enumeration(enumeration);
        }
        for function in def.functions {
            registry = registry.with_function(function);
        }
        registry
    }
}

impl ObjectModel for ModelRegistry {
    fn class(&self, path: &str) -> Option<&Class> {
        self.classes.get(path)
    }

    fn association(&self, path: &str) -> Option<&Association> {
        self.associations.get(path)
    }

    fn enumeration(&self, path: &str) -> Option<&Enumeration> {
        self.enumerations.get(path)
    }

    fn is_ancestor_or_self(&self, ancestor: &str, class: &str) -> bool {
        ancestor == class || self.lineage(class).iter().any(|c| c.path == ancestor)
    }

    fn find_property(&self, class: &str, name: &str) -> Option<&Property> {
        for candidate in self.lineage(class) {
            if let Some(property) = candidate.own_property(name) {
                return Some(property);
            }
            let contributed = self
                .association_properties
                .get(&candidate.path)
                .into_iter()
                .flatten();
            for (association, index) in contributed {
                let property = &self.associations[association].properties[*index];
                if property.name == name {
                    return Some(property);
                }
            }
        }
        None
    }


    fn find_function(&self, name: &str, argument: &PropertyType) -> Option<&FunctionSignature> {
        self.functions.iter().find(|f| {
            f.name == name
                && match argument {
                    PropertyType::Primitive(p) => f.parameter.accepts(*p),
                    _ => f.parameter == PrimitiveType::Any,
                }
        })
    }
}
