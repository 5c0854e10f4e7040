//! Store Model - in-memory representation of relational databases.
//!
//! Databases, tables, joins and filters live in flat arenas addressed by small
//! integer handles, so include edges (which may form cycles) and join chains
//! never create ownership cycles and identity comparison is O(1).
//!
//! The module is organized into submodules:
//! - `builder`: construction and validation from the parsed AST
//! - `milestoning`: milestoning clause parsing
//! - `operation`: resolved relational operations and the expression resolver
//! - `view`: view main-table inference
//! - `usage`: reference-usage records

mod builder;
pub mod milestoning;
pub mod operation;
pub mod usage;
pub mod view;

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::model::span::SourceSpan;
use crate::model::types::DataType;

pub use milestoning::{
    BusinessMilestoning, BusinessSnapshotMilestoning, Milestoning, ProcessingMilestoning,
};
pub use operation::{ColumnRef, FilterPointer, JoinChain, JoinStep, Literal, Operation, OperationResolver};
pub use usage::{NoUsages, ReferenceUsages, Symbol, UsageSink};
pub use view::{View, ViewColumn};

/// Handle of a database in a [`StoreModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DatabaseId(pub(crate) usize);

/// Handle of a table or view in a [`StoreModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JoinId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FilterId(pub(crate) usize);

/// A table as addressed from a mapping: the physical table plus the database
/// it is reached through. Store substitution changes `database`, never `table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableAlias {
    pub name: String,
    pub table: TableId,
    pub database: DatabaseId,
}

impl TableAlias {
    pub fn with_database(&self, database: DatabaseId) -> Self {
        Self {
            name: self.name.clone(),
            table: self.table,
            database,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Database {
    pub name: String,
    pub includes: Vec<DatabaseId>,
    pub schemas: Vec<Schema>,
    joins: HashMap<String, JoinId>,
    filters: HashMap<String, FilterId>,
    pub span: SourceSpan,
}

impl Database {
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    tables: Vec<TableId>,
    by_name: HashMap<String, TableId>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<TableId> {
        self.by_name.get(name).copied()
    }

    /// Tables and views in declaration order.
    pub fn tables(&self) -> &[TableId] {
        &self.tables
    }
}

#[derive(Debug, Clone)]
pub enum TableKind {
    Physical,
    View(View),
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub schema: String,
    /// Database declaring the table.
    pub database: DatabaseId,
    pub columns: Vec<Column>,
    pub milestoning: Option<Milestoning>,
    pub kind: TableKind,
    pub span: SourceSpan,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn view(&self) -> Option<&View> {
        match &self.kind {
            TableKind::View(view) => Some(view),
            TableKind::Physical => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Owning table.
    pub table: TableId,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub name: String,
    pub database: DatabaseId,
    pub condition: Operation,
    /// Distinct tables referenced by the condition, in order of appearance.
    pub tables: Vec<TableId>,
    pub self_join: bool,
    pub span: SourceSpan,
}

impl Join {
    pub fn contains(&self, table: TableId) -> bool {
        self.tables.contains(&table)
    }

    /// The table reached when traversing this join from `table`.
    pub fn other_side(&self, table: TableId) -> Option<TableId> {
        if self.self_join {
            return self.contains(table).then_some(table);
        }
        match self.tables.as_slice() {
            [a, b] if *a == table => Some(*b),
            [a, b] if *b == table => Some(*a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub name: String,
    pub database: DatabaseId,
    pub condition: Operation,
    pub tables: Vec<TableId>,
    pub span: SourceSpan,
}

/// The validated store model of a compilation unit.
#[derive(Debug, Clone, Default)]
pub struct StoreModel {
    databases: Vec<Database>,
    tables: Vec<Table>,
    joins: Vec<Join>,
    filters: Vec<Filter>,
    by_name: HashMap<String, DatabaseId>,
    usages: ReferenceUsages,
}

impl StoreModel {
    pub fn database_id(&self, name: &str) -> Option<DatabaseId> {
        self.by_name.get(name).copied()
    }

    pub fn database(&self, id: DatabaseId) -> &Database {
        &self.databases[id.0]
    }

    pub fn databases(&self) -> impl Iterator<Item = (DatabaseId, &Database)> {
        self.databases.iter().enumerate().map(|(i, d)| (DatabaseId(i), d))
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    pub fn join(&self, id: JoinId) -> &Join {
        &self.joins[id.0]
    }

    pub fn filter(&self, id: FilterId) -> &Filter {
        &self.filters[id.0]
    }

    pub fn usages(&self) -> &ReferenceUsages {
        &self.usages
    }

    /// `database` followed by every database it transitively includes,
    /// breadth-first, each once.
    pub fn visible_databases(&self, database: DatabaseId) -> Vec<DatabaseId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([database]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            queue.extend(self.database(current).includes.iter().copied());
        }
        order
    }

    /// Does `database` include `other` through one or more include edges?
    pub fn includes_transitively(&self, database: DatabaseId, other: DatabaseId) -> bool {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<DatabaseId> =
            self.database(database).includes.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            if current == other {
                return true;
            }
            if seen.insert(current) {
                queue.extend(self.database(current).includes.iter().copied());
            }
        }
        false
    }

    pub fn find_table(&self, database: DatabaseId, schema: &str, name: &str) -> Option<TableId> {
        self.visible_databases(database)
            .into_iter()
            .find_map(|db| self.database(db).schema(schema).and_then(|s| s.table(name)))
    }

    pub fn find_join(&self, database: DatabaseId, name: &str) -> Option<JoinId> {
        self.visible_databases(database)
            .into_iter()
            .find_map(|db| self.database(db).joins.get(name).copied())
    }

    pub fn find_filter(&self, database: DatabaseId, name: &str) -> Option<FilterId> {
        self.visible_databases(database)
            .into_iter()
            .find_map(|db| self.database(db).filters.get(name).copied())
    }

    /// Does any database visible from `database` declare `schema`?
    pub fn has_schema(&self, database: DatabaseId, schema: &str) -> bool {
        self.visible_databases(database)
            .into_iter()
            .any(|db| self.database(db).schema(schema).is_some())
    }

    /// Human-readable `[db]schema.table` form used in diagnostics. The
    /// `default` schema is elided.
    pub fn describe(&self, table: TableId, database: DatabaseId) -> String {
        let table = self.table(table);
        let db = &self.database(database).name;
        if table.schema == "default" {
            format!("[{}]{}", db, table.name)
        } else {
            format!("[{}]{}.{}", db, table.schema, table.name)
        }
    }

    pub fn describe_alias(&self, alias: &TableAlias) -> String {
        self.describe(alias.table, alias.database)
    }

    pub fn table_symbol(&self, table: TableId) -> Symbol {
        let t = self.table(table);
        Symbol::Table {
            database: self.database(t.database).name.clone(),
            schema: t.schema.clone(),
            table: t.name.clone(),
        }
    }

    pub fn column_symbol(&self, table: TableId, column: &str) -> Symbol {
        let t = self.table(table);
        Symbol::Column {
            database: self.database(t.database).name.clone(),
            schema: t.schema.clone(),
            table: t.name.clone(),
            column: column.to_string(),
        }
    }
}
