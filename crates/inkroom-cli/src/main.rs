use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use inkroom_core::config::{Config, LoggingConfig};
use inkroom_gateway::GatewayState;

#[derive(Parser)]
#[command(
    name = "inkroom",
    about = "Real-time collaborative whiteboard rooms over WebSocket",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the whiteboard server
    Serve {
        /// Port to listen on (default: 8001)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show configuration and whether a server is answering
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect or clear rooms on a running server
    Rooms {
        /// Server base URL (default: http://127.0.0.1:<port>)
        #[arg(long, global = true)]
        url: Option<String>,

        #[command(subcommand)]
        action: RoomsAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Check the configuration for mistakes
    Validate,
    /// Write the current configuration (defaults if none) to the config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum RoomsAction {
    /// List active rooms
    List,
    /// Show how many users are in a room
    Users { room: String },
    /// Clear a room's canvas for everyone in it
    Clear { room: String },
}

fn init_tracing(verbose: bool, logging: Option<&LoggingConfig>) {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    for directive in logging.map(|l| l.filters.as_slice()).unwrap_or_default() {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring invalid log filter {directive:?}: {e}"),
        }
    }

    let json = logging.is_some_and(|l| l.format == "json");
    let stdout = logging.is_some_and(|l| l.output == "stdout");
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}

fn base_url(url: Option<String>, config: &Config) -> String {
    url.unwrap_or_else(|| format!("http://127.0.0.1:{}", config.gateway_port()))
        .trim_end_matches('/')
        .to_string()
}

async fn fetch_json(request: reqwest::RequestBuilder) -> anyhow::Result<serde_json::Value> {
    let response = request.send().await.context("Server not reachable")?;
    let response = response.error_for_status()?;
    Ok(response.json().await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let mut config = Config::load(&config_path)?;

    init_tracing(cli.verbose, config.logging.as_ref());

    match cli.command {
        Commands::Serve { port, bind } => {
            let mut gateway = config.gateway.clone().unwrap_or_default();
            if let Some(port) = port {
                gateway.port = port;
            }
            if bind.is_some() {
                gateway.bind = bind;
            }
            config.gateway = Some(gateway);

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                tracing::warn!("{warning}");
            }
            if !errors.is_empty() {
                anyhow::bail!("Invalid configuration: {}", errors.join("; "));
            }

            tracing::info!(
                "Starting Inkroom on {}:{}",
                config.bind_addr(),
                config.gateway_port()
            );
            let state = Arc::new(GatewayState::new(Arc::new(config)));
            inkroom_gateway::start_gateway(state).await?;
        }
        Commands::Status => {
            println!("Inkroom v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway: {}:{}", config.bind_addr(), config.gateway_port());

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()?;
            let health = fetch_json(client.get(format!("{}/health", base_url(None, &config)))).await;
            match health {
                Ok(body) => println!(
                    "Status: running ({} connections, {} rooms)",
                    body["connections"], body["rooms"]
                ),
                Err(_) => println!("Status: not running"),
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} config error(s)", errors.len());
                }
                println!("Config OK");
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    anyhow::bail!(
                        "{} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                config.save(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
        },
        Commands::Rooms { url, action } => {
            let base = base_url(url, &config);
            let client = reqwest::Client::new();
            match action {
                RoomsAction::List => {
                    let body = fetch_json(client.get(format!("{base}/api/rooms"))).await?;
                    let rooms = body["rooms"].as_array().cloned().unwrap_or_default();
                    if rooms.is_empty() {
                        println!("No active rooms");
                    }
                    for room in rooms {
                        println!(
                            "{}\t{} users\t{} events\tsince {}",
                            room["room_id"].as_str().unwrap_or_default(),
                            room["user_count"],
                            room["buffered_events"],
                            room["created_at"].as_str().unwrap_or_default(),
                        );
                    }
                }
                RoomsAction::Users { room } => {
                    let body =
                        fetch_json(client.get(format!("{base}/api/rooms/{room}/users"))).await?;
                    println!("{room}: {} users", body["user_count"]);
                }
                RoomsAction::Clear { room } => {
                    let body =
                        fetch_json(client.post(format!("{base}/api/rooms/{room}/clear"))).await?;
                    println!("{}", body["message"].as_str().unwrap_or_default());
                }
            }
        }
    }

    Ok(())
}
