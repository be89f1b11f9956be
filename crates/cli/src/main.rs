use clap::{Parser, Subcommand};
use lib::config::{self, Config};
use lib::dashboard::{self, DashboardState};
use lib::gateway::{self, ClientSettings, Envelope, EventFilter, EventKind, GatewayEvent};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mission-control")]
#[command(about = "Mission Control CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Connect to the gateway and print every event until interrupted (Ctrl-C).
    Watch {
        /// Config file path (default: MISSION_CONTROL_CONFIG_PATH or ~/.mission-control/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Gateway url (overrides config and OPENCLAW_GATEWAY_URL)
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Gateway token (overrides config and OPENCLAW_GATEWAY_TOKEN)
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,

        /// Print one JSON object per event instead of a summary line.
        #[arg(long)]
        json: bool,
    },

    /// Connect, collect dashboard state for a few seconds, print it as JSON and exit.
    Snapshot {
        /// Config file path (default: MISSION_CONTROL_CONFIG_PATH or ~/.mission-control/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Gateway url (overrides config and OPENCLAW_GATEWAY_URL)
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Gateway token (overrides config and OPENCLAW_GATEWAY_TOKEN)
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,

        /// Seconds to collect events before printing.
        #[arg(long, value_name = "SECS", default_value_t = 3)]
        wait: u64,
    },

    /// Print the resolved configuration (token redacted).
    Config {
        /// Config file path (default: MISSION_CONTROL_CONFIG_PATH or ~/.mission-control/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("mission-control {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Watch {
            config,
            url,
            token,
            json,
        }) => {
            if let Err(e) = run_watch(config, url, token, json).await {
                log::error!("watch failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Snapshot {
            config,
            url,
            token,
            wait,
        }) => {
            if let Err(e) = run_snapshot(config, url, token, wait).await {
                log::error!("snapshot failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Config { config }) => {
            if let Err(e) = run_config(config) {
                log::error!("config failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

/// Config file plus env, then command-line overrides on top.
fn load_settings(
    config_path: Option<PathBuf>,
    url: Option<String>,
    token: Option<String>,
) -> anyhow::Result<ClientSettings> {
    let (config, path) = config::load_config(config_path)?;
    log::debug!("loaded config from {}", path.display());
    let mut settings = config::client_settings(&config);
    if let Some(url) = url {
        settings.url = url;
    }
    if let Some(token) = token {
        settings.token = token;
    }
    Ok(settings)
}

fn summarize(envelope: &Envelope) -> String {
    let detail = match &envelope.event {
        GatewayEvent::SessionStart(s) | GatewayEvent::SessionUpdate(s) => format!(
            "{} agent={} status={:?}{}",
            s.id,
            s.agent_id,
            s.status,
            s.task.as_deref().map(|t| format!(" task={:?}", t)).unwrap_or_default()
        ),
        GatewayEvent::SessionEnd(r) => r.id.clone(),
        GatewayEvent::CronStart(r) | GatewayEvent::CronEnd(r) => {
            r.name.clone().unwrap_or_else(|| r.id.clone())
        }
        GatewayEvent::CronUpdate(job) => format!("{} ({}) {:?}", job.name, job.schedule, job.status),
        GatewayEvent::Message(m) => format!("{} [{}] {}", m.agent_id, m.channel, m.content),
        GatewayEvent::AgentStatus(u) => match u.status {
            Some(status) => format!("{} {}", u.id, status.as_str()),
            None => u.id.clone(),
        },
        GatewayEvent::Connected { url } => url.clone(),
        GatewayEvent::Disconnected { code, reason } => match code {
            Some(code) => format!("code={} {}", code, reason),
            None => reason.clone(),
        },
        GatewayEvent::Error { error } => error.clone(),
    };
    format!(
        "{} {:<15} {}",
        envelope.timestamp.format("%H:%M:%S"),
        envelope.kind().as_str(),
        detail
    )
}

async fn run_watch(
    config_path: Option<PathBuf>,
    url: Option<String>,
    token: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let settings = load_settings(config_path, url, token)?;
    let client = gateway::init_gateway_client_with(settings);
    let attachment = dashboard::attach(&client);
    client.on(EventFilter::Any, move |env: &Envelope| {
        if json {
            println!("{}", env.to_json());
        } else {
            println!("{}", summarize(env));
        }
    });
    if !json {
        for kind in [EventKind::Connected, EventKind::Disconnected] {
            let state = Arc::clone(&attachment.state);
            client.on(kind, move |_: &Envelope| {
                let state = state.lock().unwrap_or_else(|e| e.into_inner());
                println!("-- {} | {}", kind, status_line(&state));
            });
        }
    }
    log::info!("watching gateway {}", client.url());
    attachment.connect(&client);

    tokio::signal::ctrl_c().await?;
    dashboard::detach(&client, &attachment);
    gateway::close_gateway_client();
    Ok(())
}

/// Agents and sessions as currently known (the dashboard header counters).
fn status_line(state: &DashboardState) -> String {
    format!(
        "{}/{} agents active, {} active sessions, {} cron jobs",
        state.active_agent_count(),
        state.agents.len(),
        state.active_session_count(),
        state.cron_jobs.len()
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    connection: &'a str,
    active_agents: usize,
    active_sessions: usize,
    agents: &'a [lib::agent::Agent],
    sessions: Vec<&'a lib::session::Session>,
    cron_jobs: &'a [lib::cron::CronJob],
    recent_messages: Vec<&'a lib::message::Message>,
    last_update: Option<String>,
}

impl<'a> Snapshot<'a> {
    fn of(state: &'a DashboardState) -> Self {
        Self {
            connection: state.connection.as_str(),
            active_agents: state.active_agent_count(),
            active_sessions: state.active_session_count(),
            agents: &state.agents,
            sessions: state.sessions.values().collect(),
            cron_jobs: &state.cron_jobs,
            recent_messages: state.recent_messages.iter().collect(),
            last_update: state.last_update.map(|t| t.to_rfc3339()),
        }
    }
}

async fn run_snapshot(
    config_path: Option<PathBuf>,
    url: Option<String>,
    token: Option<String>,
    wait: u64,
) -> anyhow::Result<()> {
    let settings = load_settings(config_path, url, token)?;
    let client = gateway::init_gateway_client_with(settings);
    let attachment = dashboard::attach(&client);
    attachment.connect(&client);

    tokio::time::sleep(Duration::from_secs(wait)).await;
    if !client.is_connected() {
        log::warn!("not connected to {}; snapshot shows defaults", client.url());
    }
    {
        let state = attachment.state.lock().unwrap_or_else(|e| e.into_inner());
        println!("{}", serde_json::to_string_pretty(&Snapshot::of(&state))?);
    }
    dashboard::detach(&client, &attachment);
    gateway::close_gateway_client();
    Ok(())
}

fn run_config(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path): (Config, PathBuf) = config::load_config(config_path)?;
    let settings = config::client_settings(&config);
    let out = serde_json::json!({
        "path": path.display().to_string(),
        "url": settings.url,
        "token": config::redact_token(&settings.token),
        "reconnect": config.gateway.reconnect,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
