#![forbid(unsafe_code)]

mod capture;
mod constants;
mod daemon;
mod events;
mod font;
mod geometry;
mod instance;
mod ipc;
mod manager;
mod mode;
mod platform;
mod profile;
mod store;

use clap::{Parser, Subcommand};
use tracing::Level as TraceLevel;
use tracing_subscriber::FmtSubscriber;

use daemon::DaemonOptions;
use ipc::{ControlClient, ControlRequest, ControlResponse};

#[derive(Parser)]
#[command(version, about = "Floating overlays that mirror screen regions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the overlay daemon in the foreground
    Run {
        /// Log halted capture loops at debug instead of warn
        #[arg(long)]
        quiet_capture: bool,
        /// Font family for overlay name labels
        #[arg(long)]
        label_font: Option<String>,
    },
    /// List the profiles known to the running daemon
    List,
    /// Select a screen region and create a profile for it
    New {
        /// Name for the new profile
        #[arg(long)]
        name: Option<String>,
    },
    /// Show the overlay for a profile
    Enable { name: String },
    /// Hide the overlay for a profile
    Disable { name: String },
    /// Raise and focus the overlay for a profile
    Activate { name: String },
    /// Remove a profile from the registry
    Delete { name: String },
    /// Ask the running daemon to exit
    Stop,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            quiet_capture,
            label_font,
        } => daemon::run(DaemonOptions {
            quiet_capture,
            label_font,
        })?,
        Commands::List => send(ControlRequest::List)?,
        Commands::New { name } => send(ControlRequest::Create { name })?,
        Commands::Enable { name } => send(ControlRequest::Enable(name))?,
        Commands::Disable { name } => send(ControlRequest::Disable(name))?,
        Commands::Activate { name } => send(ControlRequest::Activate(name))?,
        Commands::Delete { name } => send(ControlRequest::Delete(name))?,
        Commands::Stop => send(ControlRequest::Shutdown)?,
    }
    Ok(())
}

/// One request against the running daemon, with the reply printed for
/// humans. Errors (including "no such profile") exit nonzero.
fn send(request: ControlRequest) -> anyhow::Result<()> {
    let mut client = ControlClient::connect()?;
    match client.request(&request)? {
        ControlResponse::Profiles(profiles) => {
            if profiles.is_empty() {
                println!("no profiles");
            } else {
                for (index, summary) in profiles.iter().enumerate() {
                    let marker = if summary.active { "*" } else { " " };
                    println!(
                        "{index:>3} {marker} {:<24} {}x{} at ({}, {})",
                        summary.name,
                        summary.capture_area.width,
                        summary.capture_area.height,
                        summary.capture_area.x,
                        summary.capture_area.y,
                    );
                }
            }
        }
        ControlResponse::Created { name } => println!("created profile '{name}'"),
        ControlResponse::Cancelled => println!("selection cancelled"),
        ControlResponse::Done => {}
        ControlResponse::Error(message) => anyhow::bail!(message),
    }
    Ok(())
}
