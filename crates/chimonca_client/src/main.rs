//! Chimonca client binary.

#![warn(missing_docs)]

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chimonca_client::{
    ChannelClient, ClientConfig, GameApi, Matchmaker, NavigationGuard, RestGameApi,
    SessionDriver, WebSocketConnector, tui,
};
use chimonca_wire::{CardId, RoomId};
use clap::Parser;
use cli::{Cli, Command};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    initialize_tracing(&cli.log_file)?;

    let config = ClientConfig::from_file(&cli.config)?.with_env_overrides()?;
    info!(player = %config.player_id(), "Starting chimonca client");

    match cli.command {
        Command::Match { cards, no_play } => run_match(config, cards, no_play).await,
        Command::Play { room } => run_play(config, RoomId(room)).await,
    }
}

/// Logs go to a file so they do not fight with the terminal UI.
fn initialize_tracing(path: &std::path::Path) -> Result<()> {
    let log_file = std::fs::File::create(path)?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,chimonca_client=debug")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

fn build_api(config: &ClientConfig) -> Result<Arc<dyn GameApi>> {
    let api = RestGameApi::new(config.api_base_url().clone(), config.access_token().clone())?;
    Ok(Arc::new(api))
}

fn build_channel(config: &ClientConfig) -> ChannelClient {
    ChannelClient::new(
        Arc::new(WebSocketConnector::new(config.ws_url().clone())),
        config.channel_config(),
    )
}

enum WaitStep {
    Matched(Result<RoomId, chimonca_client::MatchError>),
    Interrupted,
    Tick,
}

/// Queue up, wait for an opponent, then play.
#[instrument(skip_all, fields(cards = cards.len()))]
async fn run_match(config: ClientConfig, cards: Vec<i64>, no_play: bool) -> Result<()> {
    if cards.len() != *config.required_card_count() {
        bail!(
            "A deck needs exactly {} cards, got {}",
            config.required_card_count(),
            cards.len()
        );
    }

    let api = build_api(&config)?;
    let mut matchmaker = Matchmaker::new(*config.player_id(), api, build_channel(&config))
        .with_connect_timeout(CONNECT_TIMEOUT);
    matchmaker
        .register(cards.into_iter().map(CardId).collect())
        .await?;
    println!("Waiting for an opponent (Ctrl+C to cancel)...");

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let room = loop {
        let step = tokio::select! {
            result = matchmaker.wait_for_match() => WaitStep::Matched(result),
            _ = tokio::signal::ctrl_c() => WaitStep::Interrupted,
            _ = ticker.tick() => WaitStep::Tick,
        };
        match step {
            WaitStep::Matched(result) => break result?,
            WaitStep::Interrupted => {
                println!("\nCancelling...");
                if let Err(e) = matchmaker.cancel().await {
                    warn!(error = %e, "Cancel was not confirmed by the server");
                }
                return Ok(());
            }
            WaitStep::Tick => {
                if let Some(elapsed) = matchmaker.elapsed() {
                    print!("\rWaiting for an opponent... {}s", elapsed.as_secs());
                    use std::io::Write;
                    std::io::stdout().flush()?;
                }
            }
        }
    };

    println!("\nMatched into room {room}");
    if no_play {
        return Ok(());
    }
    run_play(config, room).await
}

/// Play one room until the user leaves.
#[instrument(skip(config))]
async fn run_play(config: ClientConfig, room: RoomId) -> Result<()> {
    let api = build_api(&config)?;
    let mut channel = build_channel(&config);
    channel.connect().wait_connected(CONNECT_TIMEOUT).await?;

    let (mut driver, handle, notices) =
        SessionDriver::new(room, *config.player_id(), api, config.session_config());
    driver.attach_channel(&channel).await?;
    let engine = tokio::spawn(driver.run());

    let ui = tui::run_session(handle.clone(), notices).await;
    if ui.is_err() {
        if let Some(warning) = NavigationGuard::new(handle.clone()).unload_warning() {
            eprintln!("{warning}");
        }
    }

    handle.close();
    let verdict = engine.await??;
    channel.disconnect().await;
    info!(?verdict, "Done");
    ui
}
