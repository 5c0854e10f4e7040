//! Reference-usage records for "find references" / "navigate to".

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::model::span::SourceSpan;

/// A store element that can be referenced from source text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Database(String),
    Table {
        database: String,
        schema: String,
        table: String,
    },
    Column {
        database: String,
        schema: String,
        table: String,
        column: String,
    },
    Join {
        database: String,
        join: String,
    },
    Filter {
        database: String,
        filter: String,
    },
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Database(name) => write!(f, "{}", name),
            Symbol::Table {
                database,
                schema,
                table,
            } => write!(f, "{}.{}.{}", database, schema, table),
            Symbol::Column {
                database,
                schema,
                table,
                column,
            } => write!(f, "{}.{}.{}.{}", database, schema, table, column),
            Symbol::Join { database, join } => write!(f, "{}@{}", database, join),
            Symbol::Filter { database, filter } => write!(f, "{}!{}", database, filter),
        }
    }
}

/// Sink receiving one record per textual occurrence of a resolved store name.
pub trait UsageSink {
    fn record(&mut self, symbol: Symbol, location: &SourceSpan);
}

/// Collected usages, grouped by symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceUsages {
    entries: BTreeMap<Symbol, Vec<SourceSpan>>,
}

impl ReferenceUsages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn usages_of(&self, symbol: &Symbol) -> &[SourceSpan] {
        self.entries.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &[SourceSpan])> {
        self.entries.iter().map(|(s, l)| (s, l.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl UsageSink for ReferenceUsages {
    fn record(&mut self, symbol: Symbol, location: &SourceSpan) {
        self.entries.entry(symbol).or_default().push(location.clone());
    }
}

/// Sink that drops everything, used when usage recording is disabled.
#[derive(Debug, Default)]
pub struct NoUsages;

impl UsageSink for NoUsages {
    fn record(&mut self, _symbol: Symbol, _location: &SourceSpan) {}
}
