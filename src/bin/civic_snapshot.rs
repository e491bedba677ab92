use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use civic_snapshot::app::App;
use civic_snapshot::config::ConfigLoader;
use civic_snapshot::domain::{CollectionName, algorithm_info};
use civic_snapshot::error::SnapshotError;
use civic_snapshot::http::{FeedClient, FeedHttpClient, FeedResponse};
use civic_snapshot::output::{JsonOutput, LogSink};
use civic_snapshot::provenance::ProvDocument;

#[derive(Parser)]
#[command(name = "civic-snapshot")]
#[command(about = "Snapshot Boston, CDC and MBTA open-data feeds and record their provenance")]
#[command(version, author)]
struct Cli {
    /// Credential and repository config (defaults to ./auth.json)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Fetch every dataset, then print the provenance record (default)")]
    Run(RunArgs),
    #[command(about = "Fetch every dataset and print the per-dataset outcome")]
    Fetch(RunArgs),
    #[command(about = "Print the provenance record without fetching")]
    Provenance(ProvenanceArgs),
    #[command(about = "Create the repository and register the configured account")]
    Init,
    #[command(about = "List collections in the repository")]
    List,
    #[command(about = "Print the documents of a collection")]
    Show(ShowArgs),
    #[command(about = "Describe what this algorithm reads and writes")]
    Describe,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    /// Accepted for compatibility; has no effect
    #[arg(long)]
    trial: bool,
}

#[derive(Args)]
struct ProvenanceArgs {
    /// RFC 3339 start of the run window
    #[arg(long)]
    start: Option<String>,

    /// RFC 3339 end of the run window
    #[arg(long)]
    end: Option<String>,
}

#[derive(Args)]
struct ShowArgs {
    collection: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SnapshotError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SnapshotError) -> u8 {
    match error {
        SnapshotError::MissingConfig(_)
        | SnapshotError::ConfigRead(_)
        | SnapshotError::ConfigParse(_)
        | SnapshotError::MissingCredential { .. }
        | SnapshotError::CollectionNotFound(_) => 2,
        SnapshotError::FeedHttp(_) | SnapshotError::MalformedPayload { .. } => 3,
        SnapshotError::StoreUnreachable(_)
        | SnapshotError::AuthenticationFailed(_)
        | SnapshotError::PermissionDenied { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run(RunArgs::default()));
    if matches!(command, Command::Describe) {
        return JsonOutput::print_algorithm(&algorithm_info()).into_diagnostic();
    }
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match command {
        Command::Run(args) => {
            let client = FeedHttpClient::new(&config.http)?;
            let app = App::new(config, client);
            let result = app.execute(args.trial, &LogSink)?;
            let document = app
                .provenance(
                    ProvDocument::new(),
                    Some(result.window.start),
                    Some(result.window.end),
                    &LogSink,
                )?;
            JsonOutput::print_provenance(&document).into_diagnostic()
        }
        Command::Fetch(args) => {
            let client = FeedHttpClient::new(&config.http)?;
            let app = App::new(config, client);
            let result = app.execute(args.trial, &LogSink)?;
            JsonOutput::print_execute(&result).into_diagnostic()
        }
        Command::Provenance(args) => {
            let start = parse_timestamp(args.start.as_deref())?;
            let end = parse_timestamp(args.end.as_deref())?;
            let app = App::new(config, NopClient);
            let document = app.provenance(ProvDocument::new(), start, end, &LogSink)?;
            JsonOutput::print_provenance(&document).into_diagnostic()
        }
        Command::Init => {
            let app = App::new(config, NopClient);
            let result = app.init(&LogSink)?;
            JsonOutput::print_init(&result).into_diagnostic()
        }
        Command::List => {
            let app = App::new(config, NopClient);
            let result = app.list(&LogSink)?;
            JsonOutput::print_list(&result).into_diagnostic()
        }
        Command::Show(args) => {
            let collection = args.collection.parse::<CollectionName>()?;
            let app = App::new(config, NopClient);
            let documents = app.show(&collection, &LogSink)?;
            JsonOutput::print_documents(&documents).into_diagnostic()
        }
        Command::Describe => Ok(()),
    }
}

fn parse_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>, SnapshotError> {
    value
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|err| SnapshotError::InvalidTimestamp(format!("{value}: {err}")))
        })
        .transpose()
}

/// Client for commands that never touch the network.
struct NopClient;

impl FeedClient for NopClient {
    fn get(&self, _url: &str) -> Result<FeedResponse, SnapshotError> {
        Err(SnapshotError::FeedHttp("feed client not configured".to_string()))
    }
}
