use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tl_agent::{AgentConfig, ClientEnvironment, FileStore, HttpTransport, TrackOutcome, TrackingAgent};
use tl_core::types::{Attributes, EventKind};
use tl_serve::config::ServeConfig;
use tl_serve::AppState;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "tl=info,tl_serve=info,tl_agent=info,tower_http=info";

#[derive(Parser)]
#[command(name = "tl", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion and analytics server.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        db_path: Option<String>,
    },
    /// Send one event through the tracking agent.
    Track {
        #[arg(long, default_value = "http://127.0.0.1:4830")]
        server: String,
        #[arg(long)]
        page: String,
        #[arg(long, default_value = "page_view")]
        kind: String,
        /// JSON object merged into the event attributes.
        #[arg(long)]
        data: Option<String>,
        /// Where the agent keeps its session id and retry queue.
        #[arg(long, default_value = ".tally/agent")]
        state_dir: PathBuf,
    },
    /// Print the OpenAPI document.
    Openapi,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve {
            config,
            port,
            db_path,
        } => serve(config.as_deref(), port, db_path).await,
        Command::Track {
            server,
            page,
            kind,
            data,
            state_dir,
        } => track(&server, page, &kind, data.as_deref(), state_dir).await,
        Command::Openapi => {
            println!("{}", tl_serve::openapi::generate_spec());
            Ok(())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn serve(config_path: Option<&Path>, port: Option<u16>, db_path: Option<String>) -> Result<(), String> {
    let mut config = ServeConfig::load(config_path).map_err(|err| err.to_string())?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(db_path) = db_path {
        config.db_path = db_path;
    }
    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("cannot create {}: {err}", parent.display()))?;
        }
    }
    let addr = SocketAddr::new(config.host, config.port);
    let state = AppState::from_config(&config);
    tl_serve::serve(state, addr)
        .await
        .map_err(|err| format!("serve error: {err}"))
}

async fn track(
    server: &str,
    page: String,
    kind: &str,
    data: Option<&str>,
    state_dir: PathBuf,
) -> Result<(), String> {
    let kind: EventKind = kind.parse().map_err(|err| format!("{err}"))?;
    let attributes = match data {
        Some(raw) => serde_json::from_str::<Attributes>(raw)
            .map_err(|err| format!("--data must be a JSON object: {err}"))?,
        None => Attributes::new(),
    };

    let config = AgentConfig::for_server(server);
    let transport = HttpTransport::from_config(&config).map_err(|err| err.to_string())?;
    let agent = TrackingAgent::new(
        config,
        Arc::new(transport),
        Arc::new(FileStore::new(state_dir)),
        ClientEnvironment::default(),
    );

    if agent.pending() > 0 {
        let report = agent.flush().await;
        tracing::info!(
            delivered = report.delivered,
            requeued = report.requeued,
            dropped = report.dropped,
            "flushed queued events"
        );
    }

    match agent.send_event(kind, page, attributes).await {
        TrackOutcome::Sent => {
            println!("sent (session {})", agent.session_id());
            Ok(())
        }
        TrackOutcome::Queued => Err(format!(
            "server unreachable, event queued ({} pending)",
            agent.pending()
        )),
        TrackOutcome::Dropped => Err("event rejected by the server".to_string()),
        TrackOutcome::Disabled => Err("tracking disabled after repeated failures".to_string()),
    }
}
