//! Milestoning clause parsing.
//!
//! A table carries up to two raw clauses, `business(...)` and
//! `processing(...)`. Structural problems (unknown keyword or argument,
//! missing or conflicting arguments, malformed values) are parse errors;
//! references to columns that do not exist or have the wrong type are
//! compilation errors.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::ast::{MilestoningArgument, MilestoningClause};
use crate::model::span::{SourceSpan, Spanned};
use crate::semantic::error::{MappingError, SemanticResult};

use super::Column;

static INFINITY_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d+)?)?)?$")
        .expect("infinity date pattern is valid")
});

const BUSINESS: &str = "business";
const PROCESSING: &str = "processing";

const BUS_FROM: &str = "BUS_FROM";
const BUS_THRU: &str = "BUS_THRU";
const THRU_IS_INCLUSIVE: &str = "THRU_IS_INCLUSIVE";
const BUS_SNAPSHOT_DATE: &str = "BUS_SNAPSHOT_DATE";
const PROCESSING_IN: &str = "PROCESSING_IN";
const PROCESSING_OUT: &str = "PROCESSING_OUT";
const OUT_IS_INCLUSIVE: &str = "OUT_IS_INCLUSIVE";
const INFINITY: &str = "INFINITY_DATE";

const BUSINESS_ARGUMENTS: &[&str] = &[BUS_FROM, BUS_THRU, THRU_IS_INCLUSIVE, BUS_SNAPSHOT_DATE, INFINITY];
const PROCESSING_ARGUMENTS: &[&str] = &[PROCESSING_IN, PROCESSING_OUT, OUT_IS_INCLUSIVE, INFINITY];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingMilestoning {
    pub in_column: String,
    pub out_column: String,
    pub out_is_inclusive: bool,
    pub infinity_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessMilestoning {
    pub from_column: String,
    pub thru_column: String,
    pub thru_is_inclusive: bool,
    pub infinity_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessSnapshotMilestoning {
    pub snapshot_date_column: String,
    pub infinity_date: Option<String>,
}

/// Structured temporal-versioning metadata of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestoning {
    Processing(ProcessingMilestoning),
    Business(BusinessMilestoning),
    BusinessSnapshot(BusinessSnapshotMilestoning),
    Bitemporal {
        processing: ProcessingMilestoning,
        business: BusinessMilestoning,
    },
}

impl Milestoning {
    pub fn processing(&self) -> Option<&ProcessingMilestoning> {
        match self {
            Milestoning::Processing(p) | Milestoning::Bitemporal { processing: p, .. } => Some(p),
            _ => None,
        }
    }

    pub fn business(&self) -> Option<&BusinessMilestoning> {
        match self {
            Milestoning::Business(b) | Milestoning::Bitemporal { business: b, .. } => Some(b),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&BusinessSnapshotMilestoning> {
        match self {
            Milestoning::BusinessSnapshot(s) => Some(s),
            _ => None,
        }
    }

    /// Columns referenced by the milestoning spec.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = Vec::new();
        if let Some(b) = self.business() {
            columns.extend([b.from_column.as_str(), b.thru_column.as_str()]);
        }
        if let Some(s) = self.snapshot() {
            columns.push(s.snapshot_date_column.as_str());
        }
        if let Some(p) = self.processing() {
            columns.extend([p.in_column.as_str(), p.out_column.as_str()]);
        }
        columns
    }
}

/// One clause's arguments keyed by name, each seen once.
struct Arguments<'a> {
    keyword: &'a str,
    values: HashMap<&'a str, &'a Spanned<String>>,
    span: &'a SourceSpan,
}

impl<'a> Arguments<'a> {
    fn collect(clause: &'a MilestoningClause, allowed: &[&str]) -> SemanticResult<Self> {
        let keyword = clause.keyword.as_str();
        let mut values = HashMap::new();
        for MilestoningArgument { key, value } in &clause.arguments {
            if !allowed.contains(&key.as_str()) {
                return Err(MappingError::UnknownMilestoningArgument {
                    keyword: keyword.to_string(),
                    argument: key.value.clone(),
                }
                .at(&key.span));
            }
            if values.insert(key.as_str(), value).is_some() {
                return Err(MappingError::ConflictingMilestoning {
                    message: format!("{} is specified more than once", key.value),
                }
                .at(&key.span));
            }
        }
        Ok(Self {
            keyword,
            values,
            span: &clause.span,
        })
    }

    fn get(&self, key: &str) -> Option<&'a Spanned<String>> {
        self.values.get(key).copied()
    }

    fn require(&self, key: &str) -> SemanticResult<&'a Spanned<String>> {
        self.get(key).ok_or_else(|| {
            MappingError::MissingMilestoningArgument {
                keyword: self.keyword.to_string(),
                argument: key.to_string(),
            }
            .at(self.span)
        })
    }

    fn flag(&self, key: &str) -> SemanticResult<bool> {
        match self.get(key) {
            None => Ok(false),
            Some(value) => match value.as_str().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid(key, value)),
            },
        }
    }

    /// `INFINITY_DATE`, with an optional leading `%` date marker stripped.
    fn infinity_date(&self) -> SemanticResult<Option<String>> {
        let Some(value) = self.get(INFINITY) else {
            return Ok(None);
        };
        let date = value.as_str().strip_prefix('%').unwrap_or(value.as_str());
        if !INFINITY_DATE.is_match(date) {
            return Err(invalid(INFINITY, value));
        }
        Ok(Some(date.to_string()))
    }
}

fn invalid(argument: &str, value: &Spanned<String>) -> crate::diagnostics::Diagnostic {
    MappingError::InvalidMilestoningValue {
        argument: argument.to_string(),
        value: value.value.clone(),
    }
    .at(&value.span)
}

enum BusinessClause {
    Range(BusinessMilestoning),
    Snapshot(BusinessSnapshotMilestoning),
}

fn parse_business(clause: &MilestoningClause) -> SemanticResult<BusinessClause> {
    let args = Arguments::collect(clause, BUSINESS_ARGUMENTS)?;
    let infinity_date = args.infinity_date()?;

    if let Some(snapshot) = args.get(BUS_SNAPSHOT_DATE) {
        if [BUS_FROM, BUS_THRU, THRU_IS_INCLUSIVE]
            .iter()
            .any(|key| args.get(key).is_some())
        {
            return Err(MappingError::ConflictingMilestoning {
                message: format!(
                    "{} can't be combined with {}, {} or {}",
                    BUS_SNAPSHOT_DATE, BUS_FROM, BUS_THRU, THRU_IS_INCLUSIVE
                ),
            }
            .at(&snapshot.span));
        }
        return Ok(BusinessClause::Snapshot(BusinessSnapshotMilestoning {
            snapshot_date_column: snapshot.value.clone(),
            infinity_date,
        }));
    }

    Ok(BusinessClause::Range(BusinessMilestoning {
        from_column: args.require(BUS_FROM)?.value.clone(),
        thru_column: args.require(BUS_THRU)?.value.clone(),
        thru_is_inclusive: args.flag(THRU_IS_INCLUSIVE)?,
        infinity_date,
    }))
}

fn parse_processing(clause: &MilestoningClause) -> SemanticResult<ProcessingMilestoning> {
    let args = Arguments::collect(clause, PROCESSING_ARGUMENTS)?;
    Ok(ProcessingMilestoning {
        in_column: args.require(PROCESSING_IN)?.value.clone(),
        out_column: args.require(PROCESSING_OUT)?.value.clone(),
        out_is_inclusive: args.flag(OUT_IS_INCLUSIVE)?,
        infinity_date: args.infinity_date()?,
    })
}

/// Turn the raw clauses of a table into structured milestoning.
///
/// Returns `Ok(None)` for a table without clauses.
pub fn parse(table: &str, clauses: &[MilestoningClause], columns: &[Column]) -> SemanticResult<Option<Milestoning>> {
    let mut business: Option<(BusinessClause, &MilestoningClause)> = None;
    let mut processing: Option<(ProcessingMilestoning, &MilestoningClause)> = None;

    for clause in clauses {
        match clause.keyword.as_str() {
            BUSINESS => {
                if business.is_some() {
                    return Err(duplicate_clause(clause));
                }
                business = Some((parse_business(clause)?, clause));
            }
            PROCESSING => {
                if processing.is_some() {
                    return Err(duplicate_clause(clause));
                }
                processing = Some((parse_processing(clause)?, clause));
            }
            other => {
                return Err(MappingError::UnknownMilestoningKeyword {
                    keyword: other.to_string(),
                }
                .at(&clause.keyword.span));
            }
        }
    }

    let milestoning = match (business, processing) {
        (None, None) => return Ok(None),
        (Some((BusinessClause::Range(b), _)), None) => Milestoning::Business(b),
        (Some((BusinessClause::Snapshot(s), _)), None) => Milestoning::BusinessSnapshot(s),
        (None, Some((p, _))) => Milestoning::Processing(p),
        (Some((BusinessClause::Range(b), _)), Some((p, _))) => Milestoning::Bitemporal {
            processing: p,
            business: b,
        },
        (Some((BusinessClause::Snapshot(_), _)), Some((_, clause))) => {
            return Err(MappingError::ConflictingMilestoning {
                message: "business snapshot milestoning can't be combined with processing milestoning".into(),
            }
            .at(&clause.span));
        }
    };

    check_columns(table, clauses, &milestoning, columns)?;
    Ok(Some(milestoning))
}

fn duplicate_clause(clause: &MilestoningClause) -> crate::diagnostics::Diagnostic {
    MappingError::ConflictingMilestoning {
        message: format!("{} milestoning is specified more than once", clause.keyword.value),
    }
    .at(&clause.keyword.span)
}

/// Every referenced column must exist; a snapshot column must be a `DATE`.
fn check_columns(
    table: &str,
    clauses: &[MilestoningClause],
    milestoning: &Milestoning,
    columns: &[Column],
) -> SemanticResult<()> {
    // Diagnostics point at the argument naming the column.
    let span_of = |column: &str| {
        clauses
            .iter()
            .flat_map(|c| c.arguments.iter())
            .find(|a| a.value.as_str() == column)
            .map(|a| a.value.span.clone())
            .unwrap_or_default()
    };

    for name in milestoning.columns() {
        if !columns.iter().any(|c| c.name == name) {
            return Err(MappingError::UnknownColumn {
                column: name.to_string(),
                table: table.to_string(),
            }
            .at(&span_of(name)));
        }
    }

    if let Some(snapshot) = milestoning.snapshot() {
        let column = &snapshot.snapshot_date_column;
        if let Some(found) = columns.iter().find(|c| &c.name == column) {
            if !found.data_type.is_date() {
                return Err(MappingError::SnapshotColumnType {
                    table: table.to_string(),
                    column: column.clone(),
                    found: found.data_type.to_string(),
                }
                .at(&span_of(column)));
            }
        }
    }
    Ok(())
}
