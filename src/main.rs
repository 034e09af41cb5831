mod api;
mod channel;
mod config;
mod socketio;
mod store;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use channel::state::{ChannelState, Phase};
use channel::{Inputs, LiveReadingChannel};
use socketio::SocketIoTransport;

#[derive(Parser)]
#[command(name = "garden-live")]
#[command(about = "Garden marketplace admin: live device readings and REST administration")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Bearer access token (see `login`)
    #[arg(long, env = "GARDEN_LIVE_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream live readings of one device until Ctrl+C
    Watch { device_id: String },

    /// Sign in and print the access token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "GARDEN_LIVE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// List one page of a collection
    List {
        resource: ResourceKind,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long)]
        search: Option<String>,
        /// Extra filter as key=value (repeatable)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
        /// Walk every page from --page on
        #[arg(long)]
        all: bool,
    },

    /// Show one record
    Show { resource: ResourceKind, id: String },

    /// Create a record from a JSON draft
    Create { resource: ResourceKind, json: String },

    /// Update a record from a JSON draft
    Update {
        resource: ResourceKind,
        id: String,
        json: String,
    },

    /// Delete a record
    Delete { resource: ResourceKind, id: String },

    /// Stored readings of a device
    Readings {
        device_id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show the signed-in profile, or update it when fields are given
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },

    /// List user roles
    Roles,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResourceKind {
    Families,
    Genera,
    Species,
    Devices,
    Categories,
    Faqs,
    Users,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {:?}", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        config::Config::default()
    });

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("garden-live v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Watch { device_id } => watch_device(&config, device_id, cli.token).await,
        other => run_api_command(&config, cli.token, other).await,
    }
}

/// Stream readings for one device until Ctrl+C or a channel error
async fn watch_device(
    config: &config::Config,
    device_id: String,
    token: Option<String>,
) -> anyhow::Result<()> {
    let inputs = Inputs::new(Some(device_id.clone()), token);
    if !inputs.is_complete() {
        anyhow::bail!("an access token is required: pass --token or set GARDEN_LIVE_TOKEN");
    }

    let (phase_tx, mut phase_rx) = watch::channel(Phase::Idle);
    let channel = LiveReadingChannel::new(SocketIoTransport::new(config.realtime.clone()))
        .with_phase_updates(phase_tx);
    let (inputs_tx, inputs_rx) = watch::channel(inputs);
    let (state_tx, mut state_rx) = watch::channel(ChannelState::default());
    let task = tokio::spawn(channel.run(inputs_rx, state_tx));

    info!("Watching device {}. Press Ctrl+C to stop.", device_id);

    let outcome = loop {
        tokio::select! {
            // readings first so the last one is printed before a close
            biased;

            changed = state_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = state_rx.borrow_and_update().clone();
                if let Some(message) = state.error {
                    error!("{}", message);
                    break Err(anyhow::anyhow!(message));
                }
                if state.connecting {
                    info!("Connecting...");
                } else if let Some(reading) = state.reading {
                    println!("{} {}", chrono::Utc::now().to_rfc3339(), reading);
                }
            }
            changed = phase_rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                if *phase_rx.borrow_and_update() == Phase::Closed {
                    info!("Session closed by the server");
                    break Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break Ok(());
            }
        }
    };

    // dropping the inputs sender tears the channel down
    drop(inputs_tx);
    task.await?;
    outcome
}

#[cfg(feature = "api")]
async fn run_api_command(
    config: &config::Config,
    token: Option<String>,
    command: Command,
) -> anyhow::Result<()> {
    use api::types::{
        Category, Device, Faq, Family, Genus, ListQuery, ProfileUpdate, Species, User,
    };
    use api::ApiClient;

    let mut client = ApiClient::new(&config.api)?.with_token(token);

    let action = match command {
        Command::Login { email, password } => {
            let session = client.login(&email, &password).await?;
            println!("{}", session.access_token);
            return Ok(());
        }
        Command::Readings {
            device_id,
            page,
            limit,
        } => {
            let query = ListQuery {
                page,
                limit,
                ..Default::default()
            };
            let readings = client.device_readings(&device_id, &query).await?;
            for reading in &readings.data {
                println!("{}", reading);
            }
            println!(
                "-- page {} ({} readings total)",
                readings.meta.page, readings.meta.total
            );
            return Ok(());
        }
        Command::Profile { name, email } => {
            let user = if name.is_some() || email.is_some() {
                client
                    .update_profile(&ProfileUpdate {
                        name,
                        email,
                        password: None,
                    })
                    .await?
            } else {
                client.profile().await?
            };
            println!("{}", serde_json::to_string_pretty(&user)?);
            return Ok(());
        }
        Command::Roles => {
            for role in client.roles().await? {
                println!("{}", serde_json::to_string(&role)?);
            }
            return Ok(());
        }
        Command::List {
            resource,
            page,
            limit,
            search,
            filters,
            all,
        } => (
            resource,
            ResourceAction::List(
                ListQuery {
                    page: page.max(1),
                    limit: limit.max(1),
                    search,
                    filters: filters.into_iter().collect(),
                },
                all,
            ),
        ),
        Command::Show { resource, id } => (resource, ResourceAction::Show(id)),
        Command::Create { resource, json } => (resource, ResourceAction::Create(json)),
        Command::Update { resource, id, json } => (resource, ResourceAction::Update(id, json)),
        Command::Delete { resource, id } => (resource, ResourceAction::Delete(id)),
        Command::Watch { .. } => anyhow::bail!("watch does not use the REST API"),
    };

    let (resource, action) = action;
    match resource {
        ResourceKind::Families => run_resource::<Family>(client, action).await,
        ResourceKind::Genera => run_resource::<Genus>(client, action).await,
        ResourceKind::Species => run_resource::<Species>(client, action).await,
        ResourceKind::Devices => run_resource::<Device>(client, action).await,
        ResourceKind::Categories => run_resource::<Category>(client, action).await,
        ResourceKind::Faqs => run_resource::<Faq>(client, action).await,
        ResourceKind::Users => run_resource::<User>(client, action).await,
    }
}

#[cfg(not(feature = "api"))]
async fn run_api_command(
    _config: &config::Config,
    _token: Option<String>,
    _command: Command,
) -> anyhow::Result<()> {
    anyhow::bail!("this build has no REST support (enable the `api` feature)")
}

#[cfg(feature = "api")]
enum ResourceAction {
    List(api::types::ListQuery, bool),
    Show(String),
    Create(String),
    Update(String, String),
    Delete(String),
}

#[cfg(feature = "api")]
async fn run_resource<R: api::types::Resource>(
    client: api::ApiClient,
    action: ResourceAction,
) -> anyhow::Result<()> {
    use anyhow::Context;
    use api::types::ListQuery;
    use store::ListStore;

    match action {
        ResourceAction::List(query, all) => {
            let mut store = ListStore::<R, _>::new(client, query);
            store.refresh().await;
            loop {
                if let Some(message) = store.error() {
                    anyhow::bail!("{}", message);
                }
                for item in store.items() {
                    println!("{}", serde_json::to_string(item)?);
                }
                println!(
                    "-- page {}/{} ({} {} total)",
                    store.query().page,
                    store.total_pages(),
                    store.total(),
                    R::NAME
                );

                let page = store.query().page;
                if !all || page >= store.total_pages() {
                    break;
                }
                store.set_page(page + 1).await;
            }
        }
        ResourceAction::Show(id) => {
            let record = client.get_resource::<R>(&id).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        ResourceAction::Create(json) => {
            let draft: R::Draft =
                serde_json::from_str(&json).context("invalid JSON draft")?;
            let mut store = ListStore::<R, _>::new(client, ListQuery::default());
            let created = store.create(&draft).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
        ResourceAction::Update(id, json) => {
            let draft: R::Draft =
                serde_json::from_str(&json).context("invalid JSON draft")?;
            let mut store = ListStore::<R, _>::new(client, ListQuery::default());
            let updated = store.update(&id, &draft).await?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        ResourceAction::Delete(id) => {
            let mut store = ListStore::<R, _>::new(client, ListQuery::default());
            store.remove(&id).await?;
            println!("Deleted {} {}", R::NAME, id);
        }
    }
    Ok(())
}
