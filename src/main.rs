//! Debugger Bootstrap - keeps a debug server running against pushed projects.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use debugger_bootstrap::bootstrap::{Bootstrapper, FsProbe};
use debugger_bootstrap::client::BootstrapClient;
use debugger_bootstrap::config::{BootstrapConfig, ConfigLoader};
use debugger_bootstrap::debugger::DebuggerInstance;
use debugger_bootstrap::display;
use debugger_bootstrap::protocol::ProjectDescription;
use debugger_bootstrap::server::{DispatchSettings, EventDispatcher};
use debugger_bootstrap::watcher::ProjectWatcher;

type BoxError = Box<dyn std::error::Error>;

#[derive(Parser)]
#[command(
    name = "debugger-bootstrap",
    about = "Keeps a debug server running against the project clients push",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept project descriptions and supervise the debug server.
    Serve {
        /// Port to listen on (0 picks one).
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind.
        #[arg(long)]
        host: Option<String>,
        /// Path of the debug server binary.
        #[arg(short = 'g', long = "debugger")]
        debugger: Option<String>,
        /// Argument placed before the program (repeatable).
        #[arg(long = "debugger-arg", allow_hyphen_values = true)]
        debugger_args: Vec<String>,
        /// Config file to use instead of the default search paths.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Rely on the periodic sweep only.
        #[arg(long)]
        no_watch: bool,
    },
    /// Hash local files and push them as the project to debug.
    Push {
        /// Server address (host:port).
        address: String,
        /// The executable to debug.
        #[arg(short, long)]
        executable: String,
        /// A link dependency (repeatable, in load order).
        #[arg(short, long = "lib")]
        libs: Vec<String>,
        /// Arguments for the executable.
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Print status updates until the server closes the connection.
    Subscribe {
        /// Server address (host:port).
        address: String,
        /// Print messages without shortening them.
        #[arg(long)]
        raw: bool,
    },
    /// Start the debugger regardless of file state.
    Start {
        /// Server address (host:port).
        address: String,
    },
    /// Stop the debugger regardless of file state.
    Stop {
        /// Server address (host:port).
        address: String,
    },
}

fn init_tracing(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Serve {
            port,
            host,
            debugger,
            debugger_args,
            config,
            no_watch,
        } => load_config(config).and_then(|mut config| {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(debugger) = debugger {
                config.debugger.path = debugger;
            }
            if !debugger_args.is_empty() {
                config.debugger.args = debugger_args;
            }
            if no_watch {
                config.server.watch_files = false;
            }
            serve(&config)
        }),
        Commands::Push {
            address,
            executable,
            libs,
            args,
        } => block_on(push(address, executable, libs, args)),
        Commands::Subscribe { address, raw } => block_on(subscribe(address, raw)),
        Commands::Start { address } => block_on(async move {
            BootstrapClient::new(address.as_str()).force_start().await?;
            display::print_sent("force start", &address);
            Ok::<(), BoxError>(())
        }),
        Commands::Stop { address } => block_on(async move {
            BootstrapClient::new(address.as_str()).force_stop().await?;
            display::print_sent("force stop", &address);
            Ok::<(), BoxError>(())
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<BootstrapConfig, BoxError> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    Ok(loader.load()?)
}

fn serve(config: &BootstrapConfig) -> Result<(), BoxError> {
    let listener = TcpListener::bind(config.server.bind_address())?;
    let address = listener.local_addr()?;
    tracing::info!(port = address.port(), %address, "Server socket bound");

    let debugger = DebuggerInstance::new(&config.debugger.path)
        .with_args(config.debugger.args.iter().cloned())
        .with_stop_timing(config.debugger.stop_timing());
    tracing::info!(
        debugger = %config.debugger.path,
        args = ?config.debugger.args,
        "Starting debugger bootstrap"
    );

    let mut dispatcher = EventDispatcher::new(listener, Bootstrapper::new(FsProbe, debugger))?
        .with_settings(DispatchSettings::from(&config.server));

    if config.server.watch_files {
        match ProjectWatcher::new() {
            Ok(watcher) => dispatcher = dispatcher.with_watcher(watcher),
            Err(e) => tracing::warn!(error = %e, "File watching unavailable, sweeping only"),
        }
    }

    let shutdown = dispatcher.shutdown_handle();
    signal_hook::flag::register(SIGINT, shutdown.flag())?;
    signal_hook::flag::register(SIGTERM, shutdown.flag())?;

    dispatcher.run()?;
    Ok(())
}

fn block_on<F>(future: F) -> Result<(), BoxError>
where
    F: std::future::Future<Output = Result<(), BoxError>>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(future)
}

async fn push(
    address: String,
    executable: String,
    libs: Vec<String>,
    args: Vec<String>,
) -> Result<(), BoxError> {
    let hash = |path: &str| {
        FsProbe::hash_file(path).map_err(|e| -> BoxError { format!("{path}: {e}").into() })
    };

    let mut description = ProjectDescription::new(executable.as_str(), hash(executable.as_str())?);
    for lib in &libs {
        description = description.with_dependency(lib.as_str(), hash(lib.as_str())?);
    }
    let description = description.with_arguments(args);

    tracing::info!(
        executable = %description.executable_name,
        dependencies = description.dependencies.len(),
        "Pushing project description"
    );
    BootstrapClient::new(address.as_str())
        .push_description(&description)
        .await?;
    display::print_sent("project description", &address);
    Ok(())
}

async fn subscribe(address: String, raw: bool) -> Result<(), BoxError> {
    let mut subscription = BootstrapClient::new(address.as_str()).subscribe().await?;
    while let Some(update) = subscription.next_update().await? {
        display::print_update(&update, raw);
    }
    tracing::info!(%address, "Server closed the connection");
    Ok(())
}
