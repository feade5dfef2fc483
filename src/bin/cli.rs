//! unitstore CLI
//!
//! Offline inspection of a storage unit directory.

use std::collections::BTreeSet;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use unitstore::{Engine, Filter, Op, RangeSet, StorageProperties};

/// unitstore CLI
#[derive(Parser, Debug)]
#[command(name = "unitstore-cli")]
#[command(about = "Inspect a unitstore storage unit")]
#[command(version)]
struct Args {
    /// Storage unit directory
    #[arg(short, long, default_value = "./unitstore_data")]
    dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List persisted tables, oldest first
    Tables,

    /// Print every field with its type
    Schema,

    /// Print rows in key order
    Scan {
        /// Fields to read (all when omitted)
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<String>,

        /// First key (inclusive)
        #[arg(long)]
        from: Option<i64>,

        /// Last key (exclusive)
        #[arg(long)]
        to: Option<i64>,

        /// Stop after this many rows
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Count surviving cells per field
    Count {
        /// Fields to count (all when omitted)
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Print the span of stored keys
    Interval,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,unitstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    tracing::debug!("unitstore CLI v{}", unitstore::VERSION);

    // Inspection never writes a table
    let properties = match StorageProperties::builder().flush_on_close(false).build() {
        Ok(properties) => properties,
        Err(e) => {
            tracing::error!("Invalid properties: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = match Engine::open(&args.dir, properties) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.dir, e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&engine, args.command);
    if let Err(e) = engine.close() {
        tracing::warn!("Close failed: {}", e);
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Commands) -> unitstore::Result<()> {
    match command {
        Commands::Tables => {
            for name in engine.table_names() {
                println!("{}", name);
            }
        }
        Commands::Schema => {
            for (field, data_type) in engine.schema() {
                println!("{}\t{}", field, data_type);
            }
        }
        Commands::Scan {
            fields,
            from,
            to,
            limit,
        } => {
            let fields = resolve_fields(engine, fields);
            let mut bounds = Vec::new();
            if let Some(from) = from {
                bounds.push(Filter::Key(Op::Ge, from));
            }
            if let Some(to) = to {
                bounds.push(Filter::Key(Op::Lt, to));
            }
            let filter = Filter::and(bounds);

            let rows = engine.query(&fields, &RangeSet::all(), Some(&filter))?;
            for row in rows.take(limit.unwrap_or(usize::MAX)) {
                let row = row?;
                let cells: Vec<String> = row
                    .cells
                    .iter()
                    .map(|(field, value)| format!("{}={}", field, value))
                    .collect();
                println!("{}\t{}", row.key, cells.join("\t"));
            }
        }
        Commands::Count { fields } => {
            let fields = resolve_fields(engine, fields);
            for (field, count) in engine.count(&fields)? {
                println!("{}\t{}", field, count);
            }
        }
        Commands::Interval => match engine.range()? {
            Some(range) => println!("{}", range),
            None => println!("empty"),
        },
    }
    Ok(())
}

fn resolve_fields(engine: &Engine, fields: Vec<String>) -> BTreeSet<String> {
    if fields.is_empty() {
        engine.schema().into_keys().collect()
    } else {
        fields.into_iter().collect()
    }
}
