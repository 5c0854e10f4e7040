//! Views: named projections rooted at exactly one main table.

use serde::Serialize;

use crate::model::ast::ViewDef;
use crate::model::types::DataType;
use crate::semantic::error::{MappingError, SemanticResult};

use super::operation::{FilterPointer, Literal, Operation, OperationResolver};
use super::{StoreModel, TableAlias};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub main_table: TableAlias,
    pub distinct: bool,
    pub filter: Option<FilterPointer>,
    pub group_by: Vec<Operation>,
    pub columns: Vec<ViewColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewColumn {
    pub name: String,
    pub operation: Operation,
    pub primary_key: bool,
}

impl ViewColumn {
    /// Column type as seen by mappings over the view.
    pub fn data_type(&self, store: &StoreModel) -> DataType {
        operation_type(store, &self.operation)
    }
}

fn operation_type(store: &StoreModel, operation: &Operation) -> DataType {
    match operation {
        Operation::Column(c) => store
            .table(c.alias.table)
            .column(&c.column)
            .map(|column| column.data_type.clone())
            .unwrap_or_else(|| DataType::Other(c.column.clone())),
        Operation::Join(chain) => match &chain.target {
            Some(target) => operation_type(store, target),
            None => DataType::Other("JOIN".to_string()),
        },
        Operation::Literal(Literal::Integer(_)) => DataType::BigInt,
        Operation::Literal(Literal::Float(_)) => DataType::Double,
        Operation::Literal(Literal::Boolean(_)) => DataType::Bit,
        Operation::Literal(_) => DataType::Varchar(256),
        Operation::Function { name, .. } => DataType::Other(name.clone()),
    }
}

/// Resolve a view: infer its main table from the column expressions, then
/// resolve every column, the filter and the group-by from it.
pub(super) fn build(ops: &mut OperationResolver<'_>, def: &ViewDef) -> SemanticResult<View> {
    let store = ops.store();
    let database = ops.database();
    let view = def.name.as_str();

    let mut roots: Vec<TableAlias> = Vec::new();
    for column in &def.columns {
        for root in ops.infer_roots(&column.operation)? {
            let owner = store.table(root.table).database;
            if owner != database && !store.includes_transitively(database, owner) {
                return Err(MappingError::ViewTableNotVisible {
                    view: view.to_string(),
                    table: store.table(root.table).name.clone(),
                    owner: store.database(owner).name.clone(),
                    database: store.database(database).name.clone(),
                }
                .at(&column.name.span));
            }
            if !roots.iter().any(|r| r.table == root.table) {
                roots.push(root);
            }
        }
    }

    let main_table = match roots.len() {
        0 => {
            return Err(MappingError::ViewWithoutMainTable {
                view: view.to_string(),
            }
            .at(&def.span))
        }
        1 => roots.remove(0),
        _ => {
            let tables = roots
                .iter()
                .map(|r| store.describe_alias(r))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(MappingError::ViewMultipleMainTables {
                view: view.to_string(),
                tables,
            }
            .at(&def.span));
        }
    };

    let mut columns = Vec::with_capacity(def.columns.len());
    for column in &def.columns {
        let operation = ops.resolve(&column.operation, Some(&main_table))?;
        if operation.is_bare_join() {
            return Err(MappingError::ViewColumnWithoutTarget {
                column: column.name.value.clone(),
                view: view.to_string(),
            }
            .at(&column.name.span));
        }
        columns.push(ViewColumn {
            name: column.name.value.clone(),
            operation,
            primary_key: column.primary_key,
        });
    }

    let filter = def
        .filter
        .as_ref()
        .map(|f| ops.filter(f, Some(&main_table)))
        .transpose()?;

    let mut group_by = Vec::with_capacity(def.group_by.len());
    for expression in &def.group_by {
        let operation = ops.resolve(expression, Some(&main_table))?;
        if let Some(column) = operation
            .direct_columns()
            .into_iter()
            .find(|c| c.alias.table != main_table.table)
        {
            return Err(MappingError::ViewGroupByColumn {
                column: column.column.clone(),
                view: view.to_string(),
                table: store.table(main_table.table).name.clone(),
            }
            .at(&def.span));
        }
        group_by.push(operation);
    }

    Ok(View {
        main_table,
        distinct: def.distinct,
        filter,
        group_by,
        columns,
    })
}
