//! relmap CLI - resolve and validate relational mapping workspaces
//!
//! Usage:
//!   relmap check <workspace.json> [--config <relmap.toml>] [--format text|json]
//!   relmap show <workspace.json> <mapping> [--config <relmap.toml>]
//!
//! Examples:
//!   relmap check models/firm.json
//!   relmap show models/firm.json model::FirmMapping

use clap::{Parser, Subcommand, ValueEnum};
use relmap::compile::{CompileError, CompiledGraph, UnitDiagnostic, Workspace, WorkspaceDef};
use relmap::config::Settings;
use relmap::semantic::enumeration::describe_source;
use relmap::semantic::{ClassMapping, PropertyValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relmap")]
#[command(about = "relmap - resolve and validate object-to-relational mappings")]
#[command(version)]
struct Cli {
    /// Path to a relmap.toml (defaults to $RELMAP_CONFIG, then ./relmap.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a workspace and report every diagnostic
    Check {
        /// Path to the workspace JSON document
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the resolved class, association and enumeration mappings of a unit
    Show {
        /// Path to the workspace JSON document
        file: PathBuf,

        /// Name of the mapping unit
        mapping: String,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// One line per diagnostic
    Text,
    /// Diagnostics as a JSON array
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&settings);

    match cli.command {
        Commands::Check { file, format } => cmd_check(&file, &settings, format),
        Commands::Show { file, mapping } => cmd_show(&file, &settings, &mapping),
    }
}

/// `RUST_LOG` wins over the configured filter.
fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_workspace(file: &Path, settings: &Settings) -> Result<Workspace, ExitCode> {
    let source = match fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", file.display(), e);
            return Err(ExitCode::FAILURE);
        }
    };
    let def: WorkspaceDef = match serde_json::from_str(&source) {
        Ok(def) => def,
        Err(e) => {
            eprintln!("Error parsing workspace '{}': {}", file.display(), e);
            return Err(ExitCode::FAILURE);
        }
    };
    Ok(Workspace::from_def(def, settings.resolution.clone()))
}

fn cmd_check(file: &Path, settings: &Settings, format: OutputFormat) -> ExitCode {
    let mut workspace = match load_workspace(file, settings) {
        Ok(w) => w,
        Err(code) => return code,
    };

    let failures: Vec<UnitDiagnostic> = match workspace.compile() {
        Ok(graph) => {
            if let OutputFormat::Text = format {
                println!("OK: {} mapping unit(s) resolved", graph.mapping_names().len());
            } else {
                println!("[]");
            }
            return ExitCode::SUCCESS;
        }
        Err(CompileError::Mappings(failures)) => failures,
        Err(CompileError::Store(diagnostic)) => vec![UnitDiagnostic {
            unit: "<store>".to_string(),
            diagnostic,
        }],
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match format {
        OutputFormat::Text => {
            eprintln!("Errors:");
            for failure in &failures {
                eprintln!("  [{}] {}", failure.unit, failure.diagnostic);
            }
        }
        OutputFormat::Json => match serde_json::to_string_pretty(&failures) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing diagnostics: {}", e),
        },
    }
    ExitCode::FAILURE
}

fn cmd_show(file: &Path, settings: &Settings, mapping: &str) -> ExitCode {
    let mut workspace = match load_workspace(file, settings) {
        Ok(w) => w,
        Err(code) => return code,
    };

    // Units that failed keep no state on a first compile, so failures are
    // only fatal when the requested unit is missing.
    let graph: Arc<CompiledGraph> = match workspace.compile() {
        Ok(graph) => graph,
        Err(CompileError::Mappings(failures)) => {
            for failure in &failures {
                eprintln!("  [{}] {}", failure.unit, failure.diagnostic);
            }
            workspace.snapshot()
        }
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(unit) = graph.mapping(mapping) else {
        eprintln!("Mapping '{}' is not resolved. Available: {}", mapping, graph.mapping_names().join(", "));
        return ExitCode::FAILURE;
    };
    let store = &unit.store;

    println!("Mapping: {}", unit.name);
    println!();

    println!("Class mappings:");
    for class_mapping in unit.effective_class_mappings() {
        let marker = if class_mapping.root() { "*" } else { " " };
        let origin = if class_mapping.is_local() {
            String::new()
        } else {
            format!(" (from {})", class_mapping.unit())
        };
        println!(
            "  {}{} [{}] on {}{}",
            marker,
            class_mapping.class(),
            class_mapping.id(),
            store.describe_alias(&class_mapping.main_table()),
            origin
        );
        for property in class_mapping.property_mappings() {
            let value = match &property.value {
                PropertyValue::Relational { .. } => "relational",
                PropertyValue::Embedded(_) => "embedded",
                PropertyValue::Inline { .. } => "inline",
            };
            match &property.target_id {
                Some(target) => println!("      {} -> {} ({})", property.property, target, value),
                None => println!("      {} ({})", property.property, value),
            }
        }
        if let ClassMapping::AggregationAware(aggregate) = class_mapping.declared() {
            for view in &aggregate.aggregates {
                println!(
                    "      aggregate {} on {}",
                    view.set_implementation.id,
                    store.describe_alias(&view.set_implementation.main_table)
                );
            }
        }
    }

    let associations = unit.effective_association_mappings();
    if !associations.is_empty() {
        println!();
        println!("Association mappings:");
        for association in &associations {
            println!("  - {} [{}]", association.association, association.id);
            for property in &association.property_mappings {
                println!(
                    "      {}[{}, {}]",
                    property.property,
                    property.source_id,
                    property.target_id.as_deref().unwrap_or("?")
                );
            }
        }
    }

    if !unit.enumeration_mappings.is_empty() {
        println!();
        println!("Enumeration mappings:");
        for enumeration in &unit.enumeration_mappings {
            println!("  - {} [{}]", enumeration.enumeration, enumeration.id);
            for (value, sources) in &enumeration.values {
                let sources: Vec<String> = sources.iter().map(describe_source).collect();
                println!("      {}: [{}]", value, sources.join(", "));
            }
        }
    }

    ExitCode::SUCCESS
}
