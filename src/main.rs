//! drawpad: draw on the phone, see it on the computer.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use drawpad_lib::commands::{run_console, run_relay};
use drawpad_lib::{logger, Config, Role};

#[derive(Parser)]
#[command(name = "drawpad", version, about = "Peer-to-peer drawing pad")]
struct Cli {
    /// TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Rendezvous relay URL (overrides config and DRAWPAD_RELAY_URL).
    #[arg(long, global = true)]
    relay: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Computer mode: show a pairing code and receive strokes.
    Host {
        /// Save the drawing as SVG on exit.
        #[arg(long)]
        svg: Option<PathBuf>,
        /// Write the pairing QR code as SVG whenever a code is issued.
        #[arg(long, value_name = "FILE")]
        qr_svg: Option<PathBuf>,
    },
    /// Phone mode: connect to a computer by its pairing code.
    Join { code: String },
    /// Run the rendezvous relay.
    Relay {
        /// Address to listen on.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("drawpad: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(relay) = cli.relay {
        config.relay_url = relay;
    }
    logger::init(&config.logging);

    let result = match cli.command {
        Command::Host { svg, qr_svg } => {
            run_console(&config, Role::Host, None, svg, qr_svg).await
        }
        Command::Join { code } => {
            run_console(&config, Role::Joiner, Some(code), None, None).await
        }
        Command::Relay { bind } => {
            let bind = bind.unwrap_or_else(|| config.relay_bind.clone());
            run_relay(&bind).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "drawpad exited with an error");
            eprintln!("drawpad: {e}");
            ExitCode::FAILURE
        }
    }
}
