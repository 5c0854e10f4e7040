//! Primitive types shared by the store model and the object model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Relational column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Integer,
    BigInt,
    SmallInt,
    TinyInt,
    Float,
    Double,
    Decimal(u8, u8),
    Numeric(u8, u8),
    Varchar(u32),
    Char(u32),
    Bit,
    Date,
    Timestamp,
    Other(String),
}

impl DataType {
    pub fn is_date(&self) -> bool {
        matches!(self, DataType::Date)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::BigInt => write!(f, "BIGINT"),
            DataType::SmallInt => write!(f, "SMALLINT"),
            DataType::TinyInt => write!(f, "TINYINT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Decimal(p, s) => write!(f, "DECIMAL({}, {})", p, s),
            DataType::Numeric(p, s) => write!(f, "NUMERIC({}, {})", p, s),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::Bit => write!(f, "BIT"),
            DataType::Date => write!(f, "DATE"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Object-model primitive type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    String,
    Boolean,
    Integer,
    Float,
    Decimal,
    Number,
    Date,
    StrictDate,
    DateTime,
    Any,
}

impl PrimitiveType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            PrimitiveType::Integer
                | PrimitiveType::Float
                | PrimitiveType::Decimal
                | PrimitiveType::Number
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            PrimitiveType::Date | PrimitiveType::StrictDate | PrimitiveType::DateTime
        )
    }

    /// Whether a value of `other` can be passed where `self` is expected.
    pub fn accepts(self, other: PrimitiveType) -> bool {
        if self == other || self == PrimitiveType::Any {
            return true;
        }
        match self {
            PrimitiveType::Number => other.is_numeric(),
            PrimitiveType::Date => other.is_temporal(),
            _ => false,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::String => "String",
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Integer => "Integer",
            PrimitiveType::Float => "Float",
            PrimitiveType::Decimal => "Decimal",
            PrimitiveType::Number => "Number",
            PrimitiveType::Date => "Date",
            PrimitiveType::StrictDate => "StrictDate",
            PrimitiveType::DateTime => "DateTime",
            PrimitiveType::Any => "Any",
        };
        write!(f, "{}", name)
    }
}

/// Property multiplicity (`[1]`, `[0..1]`, `[*]`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Multiplicity {
    pub lower: u32,
    pub upper: Option<u32>,
}

impl Multiplicity {
    pub const ONE: Multiplicity = Multiplicity {
        lower: 1,
        upper: Some(1),
    };
    pub const ZERO_ONE: Multiplicity = Multiplicity {
        lower: 0,
        upper: Some(1),
    };
    pub const MANY: Multiplicity = Multiplicity {
        lower: 0,
        upper: None,
    };

    pub fn is_to_many(&self) -> bool {
        self.upper.map(|u| u > 1).unwrap_or(true)
    }
}

impl Default for Multiplicity {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(u) if u == self.lower => write!(f, "[{}]", u),
            Some(u) => write!(f, "[{}..{}]", self.lower, u),
            None if self.lower == 0 => write!(f, "[*]"),
            None => write!(f, "[{}..*]", self.lower),
        }
    }
}
