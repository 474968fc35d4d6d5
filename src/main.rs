mod agent;
mod config;
mod entity;
mod mastodon;
mod segment;
mod snowflake;
mod store;
mod thread;
mod transcript;
mod utils;
mod view;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tootclaw")]
#[command(about = "Character role-play bot for Mastodon")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the bot (default if no command specified)
    Run,
    /// List stored conversations, most recently updated first
    List {
        #[arg(short, long, default_value_t = 100)]
        limit: u64,
    },
    /// Show one conversation with its messages
    Show { id: i64 },
    /// Show the most recently updated conversation
    Latest,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = config::Config::from_file(&cli.config)?;
    let store = store::ConversationStore::open(&config.data_dir).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config, store).await,
        Command::List { limit } => view::list(&store, limit).await,
        Command::Show { id } => view::show(&store, id).await,
        Command::Latest => view::latest(&store).await,
    }
}

async fn run(config: config::Config, store: Arc<store::ConversationStore>) -> Result<()> {
    let client = Arc::new(mastodon::MastodonClient::new(
        &config.api_base_url,
        &config.access_token,
    )?);
    let me = client.verify_credentials().await?;
    info!("Logged in as @{}", me.acct);

    let generator = agent::create_generator(&config)?;
    let ids = Arc::new(snowflake::SnowflakeGenerator::new(
        config.datacenter_id,
        config.machine_id,
    ));
    let matcher = thread::ThreadMatcher::new(store.clone(), ids);

    let handler = mastodon::MentionHandler::new(
        client.clone(),
        generator,
        store,
        matcher,
        mastodon::HandlerSettings {
            self_acct: me.acct,
            character_prompt: config.character_prompt.clone(),
            visibility: config.visibility,
            max_post_len: config.max_post_len,
        },
    );

    let bot = mastodon::Bot::new(
        client,
        handler,
        config.startup_message.clone(),
        Duration::from_secs(config.poll_interval_secs),
    );

    run_until_shutdown(bot.start(), tokio::signal::ctrl_c()).await?;
    info!("Shutdown complete");

    Ok(())
}

/// Runs the bot until `shutdown` resolves. A bot that stops on its own is an error.
async fn run_until_shutdown<B, S>(bot: B, shutdown: S) -> Result<()>
where
    B: Future<Output = Result<()>> + Send + 'static,
    S: Future<Output = std::io::Result<()>>,
{
    let mut handle = tokio::spawn(bot);

    tokio::select! {
        joined = &mut handle => {
            joined.context("Mastodon bot task panicked")??;
            anyhow::bail!("Mastodon bot stopped unexpectedly");
        }
        signal = shutdown => {
            handle.abort();
            signal?;
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
