//! Resolved relational operations and the expression resolver.
//!
//! [`Operation`] is the closed set of relational operation kinds a property,
//! view column, join or filter can resolve to. [`OperationResolver`] turns the
//! name-based [`OperationDef`] tree into it against a [`StoreModel`], recording
//! a reference usage for every name it resolves.

use serde::Serialize;

use crate::model::ast::{ColumnRefDef, FilterRefDef, JoinPathDef, JoinRefDef, JoinType, LiteralDef, OperationDef, TableRefDef};
use crate::model::span::Spanned;
use crate::semantic::error::{MappingError, SemanticResult};
use crate::semantic::join_path::JoinPathResolver;

use super::usage::{Symbol, UsageSink};
use super::{DatabaseId, FilterId, JoinId, StoreModel, TableAlias, TableId};

// ============================================================================
// Resolved operations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Column(ColumnRef),
    Join(JoinChain),
    Literal(Literal),
    Function { name: String, args: Vec<Operation> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub alias: TableAlias,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl From<&LiteralDef> for Literal {
    fn from(def: &LiteralDef) -> Self {
        match def {
            LiteralDef::String(s) => Literal::String(s.clone()),
            LiteralDef::Integer(i) => Literal::Integer(*i),
            LiteralDef::Float(f) => Literal::Float(*f),
            LiteralDef::Boolean(b) => Literal::Boolean(*b),
            LiteralDef::Null => Literal::Null,
        }
    }
}

/// One traversed join of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinStep {
    pub join: JoinId,
    pub name: String,
    /// Database the join was addressed through.
    pub database: DatabaseId,
    pub join_type: Option<JoinType>,
    pub from: TableId,
    pub to: TableId,
    /// Alias of the table reached; `t_<table>` for self joins.
    pub alias: String,
}

/// `@J1 > @J2 | terminal`, threaded from `source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinChain {
    pub source: TableAlias,
    pub steps: Vec<JoinStep>,
    pub target: Option<Box<Operation>>,
}

impl JoinChain {
    /// Table the chain ends on.
    pub fn end(&self) -> TableId {
        self.steps.last().map(|s| s.to).unwrap_or(self.source.table)
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn map_databases(&self, f: &impl Fn(DatabaseId) -> DatabaseId) -> JoinChain {
        self.map_aliases(&|alias| alias.with_database(f(alias.database)), f)
    }

    fn map_aliases(
        &self,
        alias: &impl Fn(&TableAlias) -> TableAlias,
        database: &impl Fn(DatabaseId) -> DatabaseId,
    ) -> JoinChain {
        JoinChain {
            source: alias(&self.source),
            steps: self.steps.iter().map(|s| s.map_database(database)).collect(),
            target: self
                .target
                .as_ref()
                .map(|t| Box::new(t.map_aliases(alias, database))),
        }
    }
}

/// `~filter [db] @J1 > @J2 | [db] FilterName`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterPointer {
    pub filter: FilterId,
    pub name: String,
    pub database: DatabaseId,
    pub joins: Vec<JoinStep>,
}

impl FilterPointer {
    pub fn map_databases(&self, f: &impl Fn(DatabaseId) -> DatabaseId) -> Self {
        Self {
            filter: self.filter,
            name: self.name.clone(),
            database: f(self.database),
            joins: self.joins.iter().map(|s| s.map_database(f)).collect(),
        }
    }
}

impl JoinStep {
    fn map_database(&self, f: &impl Fn(DatabaseId) -> DatabaseId) -> Self {
        Self {
            database: f(self.database),
            ..self.clone()
        }
    }
}

impl Operation {
    pub fn as_join(&self) -> Option<&JoinChain> {
        match self {
            Operation::Join(chain) => Some(chain),
            _ => None,
        }
    }

    /// A join chain without a terminal expression: an object-valued path.
    pub fn is_bare_join(&self) -> bool {
        matches!(self, Operation::Join(chain) if !chain.has_target())
    }

    /// Aliases the expression is rooted at: a column's table, or a join
    /// chain's source table.
    pub fn root_aliases(&self) -> Vec<&TableAlias> {
        let mut roots = Vec::new();
        self.collect_roots(&mut roots);
        roots
    }

    fn collect_roots<'a>(&'a self, roots: &mut Vec<&'a TableAlias>) {
        match self {
            Operation::Column(c) => {
                if !roots.contains(&&c.alias) {
                    roots.push(&c.alias);
                }
            }
            Operation::Join(chain) => {
                if !roots.contains(&&chain.source) {
                    roots.push(&chain.source);
                }
            }
            Operation::Literal(_) => {}
            Operation::Function { args, .. } => args.iter().for_each(|a| a.collect_roots(roots)),
        }
    }

    /// Columns referenced directly, not through a join chain.
    pub fn direct_columns(&self) -> Vec<&ColumnRef> {
        match self {
            Operation::Column(c) => vec![c],
            Operation::Function { args, .. } => args.iter().flat_map(Operation::direct_columns).collect(),
            Operation::Join(_) | Operation::Literal(_) => Vec::new(),
        }
    }

    /// Rewrite every database reference, leaving tables and aliases intact.
    pub fn map_databases(&self, f: &impl Fn(DatabaseId) -> DatabaseId) -> Operation {
        self.map_aliases(&|alias| alias.with_database(f(alias.database)), f)
    }

    /// Rename the aliases of `table` (used for the far side of self joins).
    pub(crate) fn rename_alias(&self, table: TableId, name: &str) -> Operation {
        self.map_aliases(
            &|alias| {
                if alias.table == table {
                    TableAlias {
                        name: name.to_string(),
                        ..alias.clone()
                    }
                } else {
                    alias.clone()
                }
            },
            &|db| db,
        )
    }

    fn map_aliases(
        &self,
        alias: &impl Fn(&TableAlias) -> TableAlias,
        database: &impl Fn(DatabaseId) -> DatabaseId,
    ) -> Operation {
        match self {
            Operation::Column(c) => Operation::Column(ColumnRef {
                alias: alias(&c.alias),
                column: c.column.clone(),
            }),
            Operation::Join(chain) => Operation::Join(chain.map_aliases(alias, database)),
            Operation::Literal(l) => Operation::Literal(l.clone()),
            Operation::Function { name, args } => Operation::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.map_aliases(alias, database)).collect(),
            },
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves name-based operations against a store model.
///
/// Unqualified names are looked up in the resolver's default database and
/// every database it includes.
pub struct OperationResolver<'a> {
    store: &'a StoreModel,
    database: DatabaseId,
    default_schema: &'a str,
    usages: &'a mut dyn UsageSink,
    /// Far side of the self join whose condition is being resolved.
    self_join_target: Option<TableAlias>,
}

impl<'a> OperationResolver<'a> {
    pub fn new(
        store: &'a StoreModel,
        database: DatabaseId,
        default_schema: &'a str,
        usages: &'a mut dyn UsageSink,
    ) -> Self {
        Self {
            store,
            database,
            default_schema,
            usages,
            self_join_target: None,
        }
    }

    pub(crate) fn with_self_join_target(mut self, target: TableAlias) -> Self {
        self.self_join_target = Some(target);
        self
    }

    pub fn store(&self) -> &'a StoreModel {
        self.store
    }

    pub fn database(&self) -> DatabaseId {
        self.database
    }

    pub(crate) fn record(&mut self, symbol: Symbol, span: &crate::model::span::SourceSpan) {
        self.usages.record(symbol, span);
    }

    // ------------------------------------------------------------------------
    // Name lookups. `lookup_*` never record usages; the public resolving
    // methods do.
    // ------------------------------------------------------------------------

    pub fn lookup_database(&self, name: &Spanned<String>) -> SemanticResult<DatabaseId> {
        self.store.database_id(name.as_str()).ok_or_else(|| {
            MappingError::UnknownDatabase {
                name: name.value.clone(),
            }
            .at(&name.span)
        })
    }

    /// The database addressed by an optional `[db]` marker.
    pub(crate) fn lookup_addressed(&self, marker: Option<&Spanned<String>>) -> SemanticResult<DatabaseId> {
        match marker {
            Some(name) => self.lookup_database(name),
            None => Ok(self.database),
        }
    }

    pub(crate) fn lookup_table(
        &self,
        database: Option<&Spanned<String>>,
        schema: Option<&Spanned<String>>,
        table: &Spanned<String>,
    ) -> SemanticResult<TableAlias> {
        let db = self.lookup_addressed(database)?;
        let schema_name = schema.map(Spanned::as_str).unwrap_or(self.default_schema);
        let db_name = &self.store.database(db).name;
        if !self.store.has_schema(db, schema_name) {
            let span = schema.map(|s| &s.span).unwrap_or(&table.span);
            return Err(MappingError::UnknownSchema {
                schema: schema_name.to_string(),
                database: db_name.clone(),
            }
            .at(span));
        }
        let id = self
            .store
            .find_table(db, schema_name, table.as_str())
            .ok_or_else(|| {
                MappingError::UnknownTable {
                    table: table.value.clone(),
                    schema: schema_name.to_string(),
                    database: db_name.clone(),
                }
                .at(&table.span)
            })?;
        Ok(TableAlias {
            name: table.value.clone(),
            table: id,
            database: db,
        })
    }

    pub(crate) fn lookup_join(&self, join: &JoinRefDef) -> SemanticResult<(JoinId, DatabaseId)> {
        let db = self.lookup_addressed(join.database.as_ref())?;
        let id = self.store.find_join(db, join.name.as_str()).ok_or_else(|| {
            MappingError::UnknownJoin {
                join: join.name.value.clone(),
                database: self.store.database(db).name.clone(),
            }
            .at(&join.name.span)
        })?;
        Ok((id, db))
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    /// Resolve an optional `[db]` marker, recording its usage.
    pub fn addressed(&mut self, marker: Option<&Spanned<String>>) -> SemanticResult<DatabaseId> {
        let db = self.lookup_addressed(marker)?;
        if let Some(name) = marker {
            self.record(Symbol::Database(name.value.clone()), &name.span);
        }
        Ok(db)
    }

    pub fn table(
        &mut self,
        database: Option<&Spanned<String>>,
        schema: Option<&Spanned<String>>,
        table: &Spanned<String>,
    ) -> SemanticResult<TableAlias> {
        let alias = self.lookup_table(database, schema, table)?;
        self.addressed(database)?;
        let symbol = self.store.table_symbol(alias.table);
        self.record(symbol, &table.span);
        Ok(alias)
    }

    pub fn table_ref(&mut self, def: &TableRefDef) -> SemanticResult<TableAlias> {
        self.table(Some(&def.database), def.schema.as_ref(), &def.table)
    }

    pub fn column(&mut self, def: &ColumnRefDef) -> SemanticResult<ColumnRef> {
        let alias = self.table(def.database.as_ref(), def.schema.as_ref(), &def.table)?;
        self.column_of(alias, &def.column)
    }

    fn column_of(&mut self, alias: TableAlias, column: &Spanned<String>) -> SemanticResult<ColumnRef> {
        let table = self.store.table(alias.table);
        if table.column(column.as_str()).is_none() {
            return Err(MappingError::UnknownColumn {
                column: column.value.clone(),
                table: table.name.clone(),
            }
            .at(&column.span));
        }
        let symbol = self.store.column_symbol(alias.table, column.as_str());
        self.record(symbol, &column.span);
        Ok(ColumnRef {
            alias,
            column: column.value.clone(),
        })
    }

    /// Resolve an expression. Join chains start at `source`, or at the table
    /// inferred from their terminal column when no source is known.
    pub fn resolve(&mut self, def: &OperationDef, source: Option<&TableAlias>) -> SemanticResult<Operation> {
        match def {
            OperationDef::Column(c) => Ok(Operation::Column(self.column(c)?)),
            OperationDef::TargetColumn(column) => match self.self_join_target.clone() {
                Some(target) => Ok(Operation::Column(self.column_of(target, column)?)),
                None => Err(MappingError::MisplacedTargetColumn.at(&column.span)),
            },
            OperationDef::JoinPath(path) => Ok(Operation::Join(self.join_path(path, source)?)),
            OperationDef::Literal(l) => Ok(Operation::Literal(l.into())),
            OperationDef::Function { name, args } => Ok(Operation::Function {
                name: name.value.clone(),
                args: args
                    .iter()
                    .map(|a| self.resolve(a, source))
                    .collect::<SemanticResult<_>>()?,
            }),
        }
    }

    pub fn join_path(&mut self, def: &JoinPathDef, source: Option<&TableAlias>) -> SemanticResult<JoinChain> {
        JoinPathResolver::new(self).resolve(def, source)
    }

    pub fn filter(&mut self, def: &FilterRefDef, source: Option<&TableAlias>) -> SemanticResult<FilterPointer> {
        let joins = if def.joins.is_empty() {
            Vec::new()
        } else {
            let source = match source {
                Some(source) => source.clone(),
                None => {
                    return Err(MappingError::JoinPathWithoutSource {
                        join: def.joins[0].name.value.clone(),
                    }
                    .at(&def.joins[0].name.span))
                }
            };
            JoinPathResolver::new(self).steps(&def.joins, &source)?
        };
        let db = self.addressed(def.database.as_ref())?;
        let filter = self.store.find_filter(db, def.name.as_str()).ok_or_else(|| {
            MappingError::UnknownFilter {
                filter: def.name.value.clone(),
                database: self.store.database(db).name.clone(),
            }
            .at(&def.name.span)
        })?;
        let owner = self.store.filter(filter).database;
        self.record(
            Symbol::Filter {
                database: self.store.database(owner).name.clone(),
                filter: def.name.value.clone(),
            },
            &def.name.span,
        );
        Ok(FilterPointer {
            filter,
            name: def.name.value.clone(),
            database: db,
            joins,
        })
    }

    /// Tables an expression is rooted at, inferred without resolving the
    /// whole expression and without recording usages.
    pub fn infer_roots(&self, def: &OperationDef) -> SemanticResult<Vec<TableAlias>> {
        let mut roots = Vec::new();
        self.collect_roots(def, &mut roots)?;
        Ok(roots)
    }

    fn collect_roots(&self, def: &OperationDef, roots: &mut Vec<TableAlias>) -> SemanticResult<()> {
        match def {
            OperationDef::Column(c) => {
                let alias = self.lookup_table(c.database.as_ref(), c.schema.as_ref(), &c.table)?;
                if !roots.contains(&alias) {
                    roots.push(alias);
                }
            }
            OperationDef::JoinPath(path) => {
                if let Some(source) = JoinPathResolver::infer_source(self, path)? {
                    if !roots.contains(&source) {
                        roots.push(source);
                    }
                }
            }
            OperationDef::Function { args, .. } => {
                for arg in args {
                    self.collect_roots(arg, roots)?;
                }
            }
            OperationDef::TargetColumn(_) | OperationDef::Literal(_) => {}
        }
        Ok(())
    }

    /// Distinct tables referenced by plain columns, in order of appearance.
    pub(crate) fn referenced_tables(&self, def: &OperationDef) -> SemanticResult<Vec<TableId>> {
        let mut tables = Vec::new();
        self.collect_tables(def, &mut tables)?;
        Ok(tables)
    }

    fn collect_tables(&self, def: &OperationDef, tables: &mut Vec<TableId>) -> SemanticResult<()> {
        match def {
            OperationDef::Column(c) => {
                let alias = self.lookup_table(c.database.as_ref(), c.schema.as_ref(), &c.table)?;
                if !tables.contains(&alias.table) {
                    tables.push(alias.table);
                }
            }
            OperationDef::Function { args, .. } => {
                for arg in args {
                    self.collect_tables(arg, tables)?;
                }
            }
            OperationDef::TargetColumn(_) | OperationDef::JoinPath(_) | OperationDef::Literal(_) => {}
        }
        Ok(())
    }
}

/// Does the expression use the `{target}` self-join placeholder?
pub(crate) fn uses_target(def: &OperationDef) -> bool {
    match def {
        OperationDef::TargetColumn(_) => true,
        OperationDef::Function { args, .. } => args.iter().any(uses_target),
        _ => false,
    }
}
