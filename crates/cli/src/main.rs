use clap::{Parser, Subcommand};
use clinrec_core::{
    records::parse_fields, AnalyticsAggregator, CoreConfig, ImportPipeline, RecordService,
    RecordStore, TimelineBuilder, TimelineQuery, TransformEngine, TransformRequest,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinrec")]
#[command(about = "Clinical record import and query CLI")]
struct Cli {
    /// Directory holding the record store
    #[arg(long, global = true, default_value = "clinrec-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a line-delimited JSON file
    Import {
        /// Path to the file to import
        file: PathBuf,
    },
    /// List stored records, newest first
    Records {
        /// Only records of this resource type
        #[arg(long)]
        resource_type: Option<String>,
        /// Only records with this subject reference
        #[arg(long)]
        subject: Option<String>,
        /// Extracted fields to show (comma-separated)
        #[arg(long)]
        fields: Option<String>,
    },
    /// Show a subject's timeline, earliest first
    Timeline {
        /// Subject reference, e.g. Patient/123
        #[arg(long)]
        subject: String,
        /// Resource types to include (comma-separated)
        #[arg(long)]
        resource_types: Option<String>,
        /// Inclusive lower bound (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        from: Option<String>,
        /// Inclusive upper bound (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        to: Option<String>,
        /// Maximum number of events
        #[arg(long, allow_hyphen_values = true)]
        limit: Option<i64>,
    },
    /// Show store-wide statistics
    Analytics,
    /// Run a transform request read from a JSON file
    Transform {
        /// Path to the transform request
        request: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'clinrec --help' for commands");
        return Ok(());
    };

    let cfg = CoreConfig::new(Some(cli.data_dir), clinrec_core::constants::MAX_QUERY_ROWS)?;
    let store: Arc<dyn RecordStore> = cfg.open_store()?;

    match command {
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            match ImportPipeline::with_default_rules(store).import(&text) {
                Ok(run) => print_json(&run.summary())?,
                Err(e) => eprintln!("Error importing {}: {}", file.display(), e),
            }
        }
        Commands::Records {
            resource_type,
            subject,
            fields,
        } => {
            let fields = fields.as_deref().map(parse_fields).unwrap_or_default();
            let service = RecordService::new(store, cfg.max_query_rows());
            match service.list(resource_type.as_deref(), subject.as_deref(), &fields) {
                Ok(records) if records.is_empty() => println!("No records found."),
                Ok(records) => print_json(&records)?,
                Err(e) => eprintln!("Error listing records: {}", e),
            }
        }
        Commands::Timeline {
            subject,
            resource_types,
            from,
            to,
            limit,
        } => {
            let query = TimelineQuery {
                subject: Some(subject),
                resource_types: resource_types
                    .as_deref()
                    .map(parse_fields)
                    .unwrap_or_default(),
                from,
                to,
                limit,
            };
            match TimelineBuilder::with_default_rules(store).build(&query) {
                Ok(events) => print_json(&events)?,
                Err(e) => eprintln!("Error building timeline: {}", e),
            }
        }
        Commands::Analytics => match AnalyticsAggregator::new(store).snapshot() {
            Ok(snapshot) => print_json(&snapshot)?,
            Err(e) => eprintln!("Error computing analytics: {}", e),
        },
        Commands::Transform { request } => {
            let request: TransformRequest =
                serde_json::from_str(&std::fs::read_to_string(&request)?)?;
            let engine = TransformEngine::new(store, cfg.max_query_rows());
            match engine.transform(&request) {
                Ok(rows) => print_json(&rows)?,
                Err(e) => eprintln!("Error running transform: {}", e),
            }
        }
    }

    Ok(())
}
