use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lobby_relay::config::{self, Config};
use lobby_relay::consumer::Consumer;
use lobby_relay::data::{CategoryFilter, DisplayBinding, WatchConfig};
use lobby_relay::integrations::discord::DiscordSurface;
use lobby_relay::reconcile::latest_by_name_prefix;
use lobby_relay::store::{Keyed, Stores};
use lobby_relay::transport::{ProcessLauncher, TransportServer, WireMessage};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "lobby-relay")]
#[command(about = "Relays the multiplayer lobby directory into live chat status views")]
#[command(version)]
struct Args {
    /// Path to config file
    #[arg(long, short)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the consumer and supervise the sampler (default)
    Run,
    /// Manage live status displays
    Display {
        #[command(subcommand)]
        action: DisplayAction,
    },
    /// Get notified when an identity shows up in a lobby
    Watch {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        identity: String,
    },
    /// Show the latest recorded lobby whose name starts with NAME
    Query { name: String },
}

#[derive(Subcommand, Debug)]
enum DisplayAction {
    /// Register (or replace) the display for a scope
    Create {
        #[arg(long)]
        scope: String,
        #[arg(long)]
        channel: String,
        /// Version tracks to show, e.g. "m,p" (default: all)
        #[arg(long, default_value = "")]
        versions: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lobby_relay=info".parse()?),
        )
        .init();

    let config = config::load(args.config.as_deref())?;
    let stores = Stores::open(&config::data_dir(&config)?)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config, stores).await,
        Command::Display {
            action:
                DisplayAction::Create {
                    scope,
                    channel,
                    versions,
                },
        } => create_display(&stores, &scope, &channel, &versions).await,
        Command::Watch {
            scope,
            channel,
            identity,
        } => add_watch(&stores, scope, channel, identity).await,
        Command::Query { name } => query(&stores, &name).await,
    }
}

async fn run(config: Config, stores: Stores) -> Result<()> {
    if config.surface.bot_token.is_empty() {
        tracing::warn!("No bot token configured; chat surface calls will fail");
    }
    let surface = Arc::new(DiscordSurface::new(&config.surface));
    let consumer = Consumer::new(stores, surface);

    let launcher = ProcessLauncher::from_config(config.transport.sampler_bin.as_deref())?;
    let server = TransportServer::bind(&config.transport).await?;

    let (inbound_tx, inbound_rx) = mpsc::channel::<WireMessage>(64);
    let transport = tokio::spawn(server.run(launcher, inbound_tx));

    tokio::select! {
        _ = consumer.run(inbound_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    transport.abort();
    Ok(())
}

async fn create_display(stores: &Stores, scope: &str, channel: &str, versions: &str) -> Result<()> {
    let visible = CategoryFilter::from_codes(versions)
        .with_context(|| format!("Unknown version codes {:?} (use m, p, s)", versions))?;
    let binding = DisplayBinding::new(scope, channel, visible);

    if stores.bindings.remove(&binding.key()).await? {
        println!("Replacing existing display for {}", scope);
    }
    stores.bindings.add(binding.clone()).await?;

    let tracks: Vec<&str> = binding
        .visible
        .categories()
        .iter()
        .map(|t| t.label())
        .collect();
    println!(
        "Display for {} will render in {} ({})",
        scope,
        channel,
        tracks.join(", ")
    );
    Ok(())
}

async fn add_watch(stores: &Stores, scope: String, channel: String, identity: String) -> Result<()> {
    let watch = WatchConfig {
        scope_id: scope,
        destination_id: channel,
        watched_identity_id: identity,
    };
    if stores.watches.get(&watch.key()).await?.is_some() {
        println!(
            "{} is already watched in {}",
            watch.watched_identity_id, watch.destination_id
        );
        return Ok(());
    }
    stores.watches.add(watch.clone()).await?;
    println!(
        "Watching {} (notices go to {})",
        watch.watched_identity_id, watch.destination_id
    );
    Ok(())
}

async fn query(stores: &Stores, name: &str) -> Result<()> {
    let Some(entry) = latest_by_name_prefix(stores.history.as_ref(), name).await? else {
        println!("No recorded lobby starts with {:?}", name);
        return Ok(());
    };

    let lobby = &entry.lobby;
    println!("{}", lobby.display_name());
    println!("  Host:     {}", lobby.owner_name);
    println!("  Mission:  {}", lobby.scenario_name);
    println!("  Players:  {}/{}", lobby.player_count, lobby.max_players);
    println!("  State:    {}", lobby.game_state.label());
    println!(
        "  Version:  {} ({})",
        lobby.game_version,
        lobby.version_track.label()
    );
    println!("  Seen:     {}", entry.recorded_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if lobby.is_modded() {
        println!("  Mods ({}):", lobby.mod_count);
        for name in &lobby.loaded_mods {
            println!("    - {}", name);
        }
    }
    Ok(())
}
