//! CLI entry point for the secure messenger.
//!
//! This binary provides a command-line interface for the messenger library:
//! running the messenger itself and generating, validating, and inspecting
//! configuration files.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use secure_messenger::{App, MessengerConfig};
use std::path::PathBuf;
use tokio::signal;

/// Secure Messenger - encrypted peer-to-peer chat over TCP
#[derive(Parser)]
#[command(name = "messenger")]
#[command(about = "An encrypted peer-to-peer messenger with RSA key exchange and AES sessions")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long)]
    quiet: bool,

    /// Data directory for history and state
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the messenger
    Run {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Peers to connect to at startup, as HOST:PORT
        #[arg(long = "connect", value_name = "HOST:PORT")]
        peers: Vec<String>,
        /// Display name shown to peers
        #[arg(short, long)]
        name: Option<String>,
        /// Disable UDP broadcast discovery
        #[arg(long)]
        no_discovery: bool,
    },
    /// Generate and validate configuration files
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Generate a default configuration file
    Generate {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        file: Option<PathBuf>,
    },
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = MessengerConfig::load(cli.config.as_deref())?;

    if let Some(data_dir) = cli.data_dir {
        config.storage.history_file = data_dir.join("message_history.json");
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Commands::Run {
            port,
            peers,
            name,
            no_discovery,
        } => handle_run_command(port, peers, name, no_discovery, config).await,
        Commands::Config { action } => handle_config_commands(action, &config),
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    let log_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();
}

async fn handle_run_command(
    port: Option<u16>,
    peers: Vec<String>,
    name: Option<String>,
    no_discovery: bool,
    mut config: MessengerConfig,
) -> Result<()> {
    if let Some(port) = port {
        config.network.listen_port = port;
    }
    if let Some(name) = name {
        config.network.display_name = name;
    }
    if no_discovery {
        config.network.enable_discovery = false;
    }

    info!("starting secure messenger on port {}", config.network.listen_port);

    let app = App::new(config)?;
    let manager = std::sync::Arc::clone(app.manager());
    let shutdown = app.shutdown_handle();

    // Dial the peers named on the command line once the app is running
    tokio::spawn(async move {
        for endpoint in peers {
            let Some((address, port)) = parse_endpoint(&endpoint) else {
                error!("ignoring malformed peer endpoint {endpoint:?}");
                continue;
            };
            match manager.connect(&address, port).await {
                Ok(peer) => info!("connected to {peer}"),
                Err(e) => error!("could not connect to {endpoint}: {e}"),
            }
        }
    });

    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("shutdown signal received");
    };

    tokio::select! {
        result = app.run(true) => {
            if let Err(e) = result {
                error!("application error: {e}");
                return Err(e.into());
            }
        }
        _ = shutdown_signal => {
            let _ = shutdown.send(true);
        }
    }

    Ok(())
}

fn handle_config_commands(action: ConfigCommands, config: &MessengerConfig) -> Result<()> {
    match action {
        ConfigCommands::Generate { output } => {
            let default_config = MessengerConfig::default();
            let output_path =
                output.unwrap_or_else(|| PathBuf::from(secure_messenger::utils::DEFAULT_CONFIG_FILE));

            default_config.save(&output_path)?;
            println!("configuration written to {}", output_path.display());
        }
        ConfigCommands::Validate { file } => {
            let config_to_validate = match file {
                Some(path) => MessengerConfig::from_file(path)?,
                None => config.clone(),
            };

            config_to_validate.validate()?;
            println!("configuration is valid");
        }
        ConfigCommands::Show => {
            println!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

fn parse_endpoint(endpoint: &str) -> Option<(String, u16)> {
    let (address, port) = endpoint.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if address.is_empty() || port == 0 {
        return None;
    }
    Some((address.to_string(), port))
}
