use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use seqrun_upload_core::object_store::GcsObjectStore;
use seqrun_upload_core::progress::NullProgressSink;
use seqrun_upload_core::{Config, RunOutcome};
use tokio_util::sync::CancellationToken;

/// Incremental uploader for a growing Illumina sequencer run directory
/// (spec.md §6). Positional arguments and configuration environment
/// variables are the only supported interface; everything else is a
/// convenience for local testing.
#[derive(Parser)]
#[command(name = "seqrun-upload")]
#[command(about = "Incrementally archive a sequencer run directory to object storage", long_about = None)]
struct Cli {
    /// Absolute path to the run directory to observe.
    source_path: PathBuf,

    /// Remote object-store prefix, e.g. `gs://bucket/incoming`.
    destination_prefix: String,

    /// Override STAGING_AREA_PATH for this invocation.
    #[arg(long)]
    staging_area: Option<PathBuf>,

    /// Accepted for interface compatibility; logging is always JSON lines
    /// on stderr regardless of this flag.
    #[arg(long)]
    log_json: bool,
}

fn main() -> ExitCode {
    // `Cli::parse()` would exit(2) on a bad invocation; spec.md §6 requires
    // exit 1 for `BadArguments`, including missing positional arguments.
    // `--help`/`--version` are reported through the same `Err` path by
    // clap, so those still print to stdout and exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            let is_informational =
                matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            if is_informational {
                print!("{e}");
                return ExitCode::SUCCESS;
            }
            eprint!("{e}");
            return ExitCode::FAILURE;
        }
    };

    seqrun_upload_core::run_log::init_logging();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run_main(cli))
}

async fn run_main(cli: Cli) -> ExitCode {
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(staging_area) = cli.staging_area {
        config.staging_root = staging_area;
    }

    let http = reqwest::Client::new();
    let store = GcsObjectStore::new(http);

    let cancel = CancellationToken::new();
    seqrun_upload_core::signals::install_signal_handlers(cancel.clone());

    let result = seqrun_upload_core::run(
        &config,
        &store,
        &cli.source_path,
        &cli.destination_prefix,
        &NullProgressSink,
        &cancel,
    )
    .await;

    match result {
        Ok(RunOutcome::AlreadyComplete) => {
            tracing::info!(event = "cli.already_complete", "final object already present, nothing to do");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Done { chunks, bytes_uploaded, duration }) => {
            tracing::info!(
                event = "cli.done",
                chunks,
                bytes_uploaded,
                duration_secs = duration.as_secs(),
                "run finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
