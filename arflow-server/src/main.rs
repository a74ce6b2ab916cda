//! ARFlow command line interface.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use arflow_recorder::RerunRecorder;
use arflow_server::{ArFlowServicer, DEFAULT_PORT, run_server};

#[derive(Parser)]
#[command(name = "arflow", about = "ARFlow server CLI", version)]
struct Cli {
    /// Print debug information.
    #[arg(short = 'd', long, global = true, conflicts_with = "quiet")]
    debug: bool,

    /// Print only warnings and errors.
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the server and spawn the viewer to watch live data from clients.
    View {
        /// Port to run the server on.
        #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Application ID to store recordings under.
        #[arg(short = 'a', long, default_value = "arflow")]
        application_id: String,
    },
    /// Run the server and save session data to disk.
    Save {
        /// Port to run the server on.
        #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Application ID to store recordings under.
        #[arg(short = 'a', long, default_value = "arflow")]
        application_id: String,

        /// Directory to save session files to.
        #[arg(short = 's', long)]
        save_dir: Option<PathBuf>,
    },
    /// Pass everything through to the recorder's own CLI. Helpful for
    /// inspecting and manipulating session data files (`.rrd`).
    Rerun {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.quiet);

    match cli.command {
        Command::View {
            port,
            application_id,
        } => {
            let recorder = Arc::new(RerunRecorder::new(application_id, true));
            let servicer = ArFlowServicer::new(recorder, true, None)?;
            serve(servicer, port)
        }
        Command::Save {
            port,
            application_id,
            save_dir,
        } => {
            let save_dir =
                save_dir.unwrap_or_else(|| std::env::temp_dir().join("arflow"));
            if !save_dir.is_dir() {
                std::fs::create_dir_all(&save_dir)?;
                tracing::info!("created save directory {}", save_dir.display());
            }
            let recorder = Arc::new(RerunRecorder::new(application_id, false));
            let servicer = ArFlowServicer::new(recorder, false, Some(save_dir))?;
            serve(servicer, port)
        }
        Command::Rerun { args } => rerun_passthrough(args),
    }
}

fn serve(servicer: ArFlowServicer, port: u16) -> eyre::Result<()> {
    // ten RPC workers, the fixed-size pool the save paths are sized for
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(10)
        .enable_all()
        .build()?;
    runtime.block_on(run_server(servicer, port))
}

fn init_logging(debug: bool, quiet: bool) {
    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

/// Replace the process with the recorder's own CLI so every flag passes
/// through untouched.
fn rerun_passthrough(args: Vec<String>) -> eyre::Result<()> {
    let mut command = std::process::Command::new("rerun");
    command.args(&args);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = command.exec();
        Err(eyre::eyre!("failed to launch rerun: {err}"))
    }

    #[cfg(not(unix))]
    {
        let status = command.status()?;
        std::process::exit(status.code().unwrap_or(1));
    }
}
