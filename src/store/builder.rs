//! Store model construction.
//!
//! Building proceeds in phases so that every phase only looks up names
//! registered by an earlier one:
//! 1. databases
//! 2. database includes
//! 3. schemas, tables (with columns and milestoning) and view names
//! 4. joins and filters
//! 5. views, in declaration order

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use crate::config::ResolutionSettings;
use crate::diagnostics::Diagnostic;
use crate::model::ast::{DatabaseDef, FilterDef, JoinDef, TableDef, ViewDef};
use crate::model::span::Spanned;
use crate::semantic::error::{MappingError, SemanticResult};

use super::operation::{uses_target, OperationResolver};
use super::usage::{ReferenceUsages, Symbol, UsageSink};
use super::{
    milestoning, view, Column, Database, DatabaseId, Filter, FilterId, Join, JoinId, Schema,
    StoreModel, Table, TableAlias, TableId, TableKind,
};

impl StoreModel {
    /// Build and validate the store model of a set of database definitions.
    #[instrument(name = "build_store", skip_all, fields(databases = defs.len()))]
    pub fn build(defs: &[DatabaseDef], settings: &ResolutionSettings) -> SemanticResult<StoreModel> {
        let mut builder = StoreBuilder {
            model: StoreModel::default(),
            usages: ReferenceUsages::new(),
            default_schema: &settings.default_schema,
            pending_views: Vec::new(),
        };

        let ids = builder.register_databases(defs)?;
        for (id, def) in ids.iter().zip(defs) {
            builder.resolve_includes(*id, def)?;
        }
        for (id, def) in ids.iter().zip(defs) {
            builder.register_schemas(*id, def)?;
        }
        for (id, def) in ids.iter().zip(defs) {
            builder.register_joins(*id, &def.name.value, &def.joins)?;
            builder.register_filters(*id, &def.name.value, &def.filters)?;
        }
        builder.build_views()?;

        let mut model = builder.model;
        if settings.record_usages {
            model.usages = builder.usages;
        }
        debug!(
            tables = model.tables.len(),
            joins = model.joins.len(),
            filters = model.filters.len(),
            "store model built"
        );
        Ok(model)
    }
}

struct StoreBuilder<'d> {
    model: StoreModel,
    usages: ReferenceUsages,
    default_schema: &'d str,
    pending_views: Vec<(TableId, DatabaseId, &'d ViewDef)>,
}

fn duplicate(kind: &'static str, name: &Spanned<String>, container: impl Into<String>) -> Diagnostic {
    MappingError::Duplicate {
        kind,
        name: name.value.clone(),
        container: container.into(),
    }
    .at(&name.span)
}

impl<'d> StoreBuilder<'d> {
    fn register_databases(&mut self, defs: &[DatabaseDef]) -> SemanticResult<Vec<DatabaseId>> {
        let mut ids = Vec::with_capacity(defs.len());
        for def in defs {
            if self.model.by_name.contains_key(def.name.as_str()) {
                return Err(duplicate("database", &def.name, "the store model"));
            }
            let id = DatabaseId(self.model.databases.len());
            self.model.databases.push(Database {
                name: def.name.value.clone(),
                includes: Vec::new(),
                schemas: Vec::new(),
                joins: HashMap::new(),
                filters: HashMap::new(),
                span: def.span.clone(),
            });
            self.model.by_name.insert(def.name.value.clone(), id);
            ids.push(id);
        }
        Ok(ids)
    }

    fn resolve_includes(&mut self, id: DatabaseId, def: &DatabaseDef) -> SemanticResult<()> {
        let mut includes = Vec::with_capacity(def.includes.len());
        for include in &def.includes {
            let included = self.model.database_id(include.as_str()).ok_or_else(|| {
                MappingError::UnknownIncludedDatabase {
                    database: def.name.value.clone(),
                    included: include.value.clone(),
                }
                .at(&include.span)
            })?;
            self.usages
                .record(Symbol::Database(include.value.clone()), &include.span);
            if !includes.contains(&included) {
                includes.push(included);
            }
        }
        self.model.databases[id.0].includes = includes;
        Ok(())
    }

    fn register_schemas(&mut self, id: DatabaseId, def: &'d DatabaseDef) -> SemanticResult<()> {
        for schema_def in &def.schemas {
            if self.model.databases[id.0].schema(schema_def.name.as_str()).is_some() {
                return Err(duplicate("schema", &schema_def.name, def.name.value.clone()));
            }
            let container = format!("{}.{}", def.name.value, schema_def.name.value);
            let mut schema = Schema {
                name: schema_def.name.value.clone(),
                tables: Vec::new(),
                by_name: HashMap::new(),
            };

            for table_def in &schema_def.tables {
                if schema.by_name.contains_key(table_def.name.as_str()) {
                    return Err(duplicate("table", &table_def.name, container.clone()));
                }
                let table = self.table(id, &schema.name, table_def)?;
                schema.tables.push(table);
                schema.by_name.insert(table_def.name.value.clone(), table);
            }

            // Views are registered now so that joins and later views can name
            // them; their definition is resolved in the last phase.
            for view_def in &schema_def.views {
                if schema.by_name.contains_key(view_def.name.as_str()) {
                    return Err(duplicate("view", &view_def.name, container.clone()));
                }
                let table = TableId(self.model.tables.len());
                self.model.tables.push(Table {
                    name: view_def.name.value.clone(),
                    schema: schema.name.clone(),
                    database: id,
                    columns: Vec::new(),
                    milestoning: None,
                    kind: TableKind::Physical,
                    span: view_def.span.clone(),
                });
                schema.tables.push(table);
                schema.by_name.insert(view_def.name.value.clone(), table);
                self.pending_views.push((table, id, view_def));
            }

            self.model.databases[id.0].schemas.push(schema);
        }
        Ok(())
    }

    fn table(&mut self, database: DatabaseId, schema: &str, def: &TableDef) -> SemanticResult<TableId> {
        let id = TableId(self.model.tables.len());
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(def.columns.len());
        for column in &def.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(duplicate("column", &column.name, def.name.value.clone()));
            }
            columns.push(Column {
                name: column.name.value.clone(),
                data_type: column.data_type.clone(),
                nullable: column.nullable && !column.primary_key,
                primary_key: column.primary_key,
                table: id,
            });
        }
        let milestoning = milestoning::parse(&def.name.value, &def.milestoning, &columns)?;

        self.model.tables.push(Table {
            name: def.name.value.clone(),
            schema: schema.to_string(),
            database,
            columns,
            milestoning,
            kind: TableKind::Physical,
            span: def.span.clone(),
        });
        Ok(id)
    }

    fn register_joins(&mut self, database: DatabaseId, db_name: &str, defs: &[JoinDef]) -> SemanticResult<()> {
        for def in defs {
            if self.model.databases[database.0].joins.contains_key(def.name.as_str()) {
                return Err(duplicate("join", &def.name, db_name));
            }
            let join = self.join(database, def)?;
            let id = JoinId(self.model.joins.len());
            self.model.joins.push(join);
            self.model.databases[database.0]
                .joins
                .insert(def.name.value.clone(), id);
        }
        Ok(())
    }

    fn join(&mut self, database: DatabaseId, def: &JoinDef) -> SemanticResult<Join> {
        let ops = OperationResolver::new(&self.model, database, self.default_schema, &mut self.usages);
        let tables = ops.referenced_tables(&def.condition)?;
        let self_join = uses_target(&def.condition);

        let mut ops = if self_join {
            let [table] = tables.as_slice() else {
                return Err(MappingError::SelfJoinTableCount { count: tables.len() }.at(&def.span));
            };
            let target = TableAlias {
                name: format!("t_{}", self.model.table(*table).name),
                table: *table,
                database,
            };
            ops.with_self_join_target(target)
        } else {
            if tables.len() != 2 {
                return Err(MappingError::JoinTableCount {
                    join: def.name.value.clone(),
                    count: tables.len(),
                }
                .at(&def.span));
            }
            ops
        };

        let condition = ops.resolve(&def.condition, None)?;
        Ok(Join {
            name: def.name.value.clone(),
            database,
            condition,
            tables,
            self_join,
            span: def.span.clone(),
        })
    }

    fn register_filters(&mut self, database: DatabaseId, db_name: &str, defs: &[FilterDef]) -> SemanticResult<()> {
        for def in defs {
            if self.model.databases[database.0].filters.contains_key(def.name.as_str()) {
                return Err(duplicate("filter", &def.name, db_name));
            }
            let mut ops = OperationResolver::new(&self.model, database, self.default_schema, &mut self.usages);
            let tables = ops.referenced_tables(&def.condition)?;
            let condition = ops.resolve(&def.condition, None)?;
            let id = FilterId(self.model.filters.len());
            self.model.filters.push(Filter {
                name: def.name.value.clone(),
                database,
                condition,
                tables,
                span: def.span.clone(),
            });
            self.model.databases[database.0]
                .filters
                .insert(def.name.value.clone(), id);
        }
        Ok(())
    }

    fn build_views(&mut self) -> SemanticResult<()> {
        for (table, database, def) in std::mem::take(&mut self.pending_views) {
            let view = {
                let mut ops =
                    OperationResolver::new(&self.model, database, self.default_schema, &mut self.usages);
                view::build(&mut ops, def)?
            };
            let columns = view
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data_type: c.data_type(&self.model),
                    nullable: !c.primary_key,
                    primary_key: c.primary_key,
                    table,
                })
                .collect();
            let entry = &mut self.model.tables[table.0];
            entry.columns = columns;
            entry.kind = TableKind::View(view);
        }
        Ok(())
    }
}
