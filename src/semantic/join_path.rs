//! Join Path Resolver - threads `@J1 > @J2 > ... | terminal` chains.
//!
//! A cursor starts on the source table of the enclosing expression. Every
//! join must contain the cursor on one side; the cursor then moves to the
//! other side. Self joins keep the cursor on the same table and name the far
//! side `t_<table>`.

use tracing::trace;

use crate::model::ast::{JoinPathDef, JoinRefDef};
use crate::model::span::SourceSpan;
use crate::store::operation::{JoinChain, JoinStep, OperationResolver};
use crate::store::{StoreModel, Symbol, TableAlias};

use super::error::{MappingError, SemanticResult};

pub struct JoinPathResolver<'r, 'a> {
    ops: &'r mut OperationResolver<'a>,
}

impl<'r, 'a> JoinPathResolver<'r, 'a> {
    pub fn new(ops: &'r mut OperationResolver<'a>) -> Self {
        Self { ops }
    }

    /// Resolve a chain from `source`, or from the table inferred by walking
    /// back from the terminal column when `source` is unknown.
    pub fn resolve(mut self, def: &JoinPathDef, source: Option<&TableAlias>) -> SemanticResult<JoinChain> {
        let source = match source {
            Some(source) => source.clone(),
            None => Self::infer_source(self.ops, def)?.ok_or_else(|| without_source(def))?,
        };
        let steps = self.steps(&def.joins, &source)?;

        let target = match &def.target {
            None => None,
            Some(target) => {
                let end = match steps.last() {
                    Some(step) => TableAlias {
                        name: step.alias.clone(),
                        table: step.to,
                        database: step.database,
                    },
                    None => source.clone(),
                };
                let operation = self.ops.resolve(target, Some(&end))?;

                // The terminal names the table the chain claims to end on.
                let claimed = operation
                    .root_aliases()
                    .into_iter()
                    .find(|alias| alias.table != end.table)
                    .cloned();
                if let (Some(claimed), Some(last)) = (claimed, def.joins.last()) {
                    check_end(self.ops.store(), &steps, &claimed, &last.name.span)?;
                }

                let store = self.ops.store();
                let operation = match steps.last() {
                    Some(step) if store.join(step.join).self_join => operation.rename_alias(end.table, &step.alias),
                    _ => operation,
                };
                Some(Box::new(operation))
            }
        };

        Ok(JoinChain { source, steps, target })
    }

    /// Thread `joins` from `source`, recording a usage per join.
    pub fn steps(&mut self, joins: &[JoinRefDef], source: &TableAlias) -> SemanticResult<Vec<JoinStep>> {
        let store = self.ops.store();
        let mut cursor = source.table;
        let mut steps = Vec::with_capacity(joins.len());

        for join_ref in joins {
            let (id, database) = self.ops.lookup_join(join_ref)?;
            self.ops.addressed(join_ref.database.as_ref())?;
            let join = store.join(id);
            self.ops.record(
                Symbol::Join {
                    database: store.database(join.database).name.clone(),
                    join: join.name.clone(),
                },
                &join_ref.name.span,
            );

            let Some(to) = join.other_side(cursor) else {
                return Err(MappingError::JoinMissingSourceTable {
                    join: join.name.clone(),
                    table: store.describe(cursor, database),
                }
                .at(&join_ref.name.span));
            };

            let table = &store.table(to).name;
            let alias = if join.self_join {
                format!("t_{}", table)
            } else {
                table.clone()
            };
            trace!(join = %join.name, from = %store.table(cursor).name, to = %table, "join step");

            steps.push(JoinStep {
                join: id,
                name: join.name.clone(),
                database,
                join_type: join_ref.join_type,
                from: cursor,
                to,
                alias,
            });
            cursor = to;
        }
        Ok(steps)
    }

    /// Walk a chain backwards from its terminal column to find the table it
    /// starts on. Returns `None` for a chain without a terminal.
    pub fn infer_source(ops: &OperationResolver<'_>, def: &JoinPathDef) -> SemanticResult<Option<TableAlias>> {
        let Some(target) = &def.target else {
            return Ok(None);
        };
        let roots = ops.infer_roots(target)?;
        let Some(end) = roots.first() else {
            return Ok(None);
        };

        let store = ops.store();
        let mut cursor = end.table;
        for join_ref in def.joins.iter().rev() {
            let (id, database) = ops.lookup_join(join_ref)?;
            cursor = store.join(id).other_side(cursor).ok_or_else(|| {
                MappingError::JoinMissingSourceTable {
                    join: join_ref.name.value.clone(),
                    table: store.describe(cursor, database),
                }
                .at(&join_ref.name.span)
            })?;
        }

        let database = match def.joins.first() {
            Some(first) => ops.lookup_addressed(first.database.as_ref())?,
            None => end.database,
        };
        Ok(Some(TableAlias {
            name: store.table(cursor).name.clone(),
            table: cursor,
            database,
        }))
    }
}

/// Check that a chain ends on the table `claimed` names.
pub fn check_end(
    store: &StoreModel,
    steps: &[JoinStep],
    claimed: &TableAlias,
    span: &SourceSpan,
) -> SemanticResult<()> {
    let Some(last) = steps.last() else {
        return Ok(());
    };
    if last.to == claimed.table {
        return Ok(());
    }
    Err(MappingError::JoinNotConnected {
        join: last.name.clone(),
        from: store.describe(last.from, last.database),
        to: store.describe(claimed.table, claimed.database),
        actual: store.describe(last.to, last.database),
    }
    .at(span))
}

fn without_source(def: &JoinPathDef) -> crate::diagnostics::Diagnostic {
    match def.joins.first() {
        Some(first) => MappingError::JoinPathWithoutSource {
            join: first.name.value.clone(),
        }
        .at(&first.name.span),
        None => MappingError::JoinPathWithoutSource { join: String::new() }.at(&SourceSpan::default()),
    }
}
