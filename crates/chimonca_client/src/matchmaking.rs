//! Matchmaking coordinator.
//!
//! `Idle → Registering → Waiting → {Success | Cancelling → Idle | Error}`

use std::sync::Arc;
use std::time::Duration;

use chimonca_wire::{CardId, JoinQueueRequest, PlayerId, RoomId, parse_match_success};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiError, GameApi};
use crate::channel::{ChannelClient, ChannelError, ChannelEvent, Subscription};

/// Per-player destination announcing the matched room.
pub fn match_success_destination(player: PlayerId) -> String {
    format!("/queue/game/matching/success/{player}")
}

/// Where the coordinator stands.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MatchState {
    /// Not queued.
    #[display("idle")]
    Idle,
    /// Opening the channel and joining the queue.
    #[display("registering")]
    Registering,
    /// Queued; waiting for an opponent.
    #[display("waiting")]
    Waiting,
    /// Leaving the queue.
    #[display("cancelling")]
    Cancelling,
    /// Matched into a room.
    #[display("matched into room {}", _0)]
    Success(RoomId),
    /// Registration or the channel failed.
    #[display("error: {}", _0)]
    Error(String),
}

/// Matchmaking failure.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum MatchError {
    /// Already registering or waiting.
    #[display("Already in the matchmaking queue")]
    AlreadyQueued,
    /// `wait_for_match` without a pending registration.
    #[display("Not waiting for a match")]
    NotWaiting,
    /// The channel could not be opened.
    #[display("Channel error: {}", _0)]
    Channel(ChannelError),
    /// A queue request failed.
    #[display("Queue request failed: {}", _0)]
    Api(ApiError),
    /// The channel broke while waiting.
    #[display("Channel broke while waiting for a match")]
    Broken,
}

/// Drives one player's trip through the matchmaking queue.
pub struct Matchmaker {
    player: PlayerId,
    api: Arc<dyn GameApi>,
    channel: ChannelClient,
    connect_timeout: Duration,
    state: MatchState,
    subscription: Option<Subscription>,
    waiting_since: Option<Instant>,
}

impl std::fmt::Debug for Matchmaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matchmaker")
            .field("player", &self.player)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Matchmaker {
    /// Creates an idle coordinator owning `channel`.
    pub fn new(player: PlayerId, api: Arc<dyn GameApi>, channel: ChannelClient) -> Self {
        Self {
            player,
            api,
            channel,
            connect_timeout: Duration::from_secs(10),
            state: MatchState::Idle,
            subscription: None,
            waiting_since: None,
        }
    }

    /// Overrides how long registration waits for the channel.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Current state.
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Time spent waiting so far.
    pub fn elapsed(&self) -> Option<Duration> {
        self.waiting_since.map(|since| since.elapsed())
    }

    /// Opens the channel, subscribes to the success address and joins the queue.
    #[instrument(skip(self, card_ids), fields(player = %self.player, cards = card_ids.len()))]
    pub async fn register(&mut self, card_ids: Vec<CardId>) -> Result<(), MatchError> {
        if matches!(
            self.state,
            MatchState::Registering | MatchState::Waiting | MatchState::Cancelling
        ) {
            warn!(state = %self.state, "Registration rejected");
            return Err(MatchError::AlreadyQueued);
        }
        self.state = MatchState::Registering;

        let mut connection = self.channel.connect();
        if let Err(e) = connection.wait_connected(self.connect_timeout).await {
            return Err(self.fail(MatchError::Channel(e)).await);
        }
        let destination = match_success_destination(self.player);
        match self.channel.subscribe(&destination).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => return Err(self.fail(MatchError::Channel(e)).await),
        }

        let request = JoinQueueRequest::new(self.player, card_ids);
        if let Err(e) = self.api.join_queue(&request).await {
            return Err(self.fail(MatchError::Api(e)).await);
        }

        self.state = MatchState::Waiting;
        self.waiting_since = Some(Instant::now());
        info!("Waiting for an opponent");
        Ok(())
    }

    /// Waits until the success address names a room.
    #[instrument(skip(self), fields(player = %self.player))]
    pub async fn wait_for_match(&mut self) -> Result<RoomId, MatchError> {
        if self.state != MatchState::Waiting {
            return Err(MatchError::NotWaiting);
        }
        loop {
            let event = match self.subscription.as_mut() {
                Some(subscription) => subscription.next_event().await,
                None => return Err(MatchError::NotWaiting),
            };
            match event {
                Some(ChannelEvent::Message { body, .. }) => match parse_match_success(&body) {
                    Ok(room) => {
                        self.release().await;
                        self.state = MatchState::Success(room);
                        info!(%room, "Match found");
                        return Ok(room);
                    }
                    Err(e) => warn!(error = %e, body = %body, "Ignoring malformed match notice"),
                },
                Some(ChannelEvent::Restored) => debug!("Channel restored"),
                Some(ChannelEvent::Broken) | None => return Err(self.fail(MatchError::Broken).await),
            }
        }
    }

    /// Leaves the queue. A no-op when idle; always ends `Idle`.
    ///
    /// A failed leave request is returned, but the local state is reset anyway.
    #[instrument(skip(self), fields(player = %self.player, state = %self.state))]
    pub async fn cancel(&mut self) -> Result<(), MatchError> {
        match self.state {
            MatchState::Idle | MatchState::Success(_) => {
                debug!("Nothing to cancel");
                return Ok(());
            }
            MatchState::Error(_) => {
                self.state = MatchState::Idle;
                return Ok(());
            }
            MatchState::Registering | MatchState::Waiting | MatchState::Cancelling => {}
        }

        self.state = MatchState::Cancelling;
        self.release().await;
        let left = self.api.leave_queue().await;
        self.state = MatchState::Idle;
        match left {
            Ok(()) => {
                info!("Matchmaking cancelled");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Leave request failed; treating cancel as done");
                Err(MatchError::Api(e))
            }
        }
    }

    async fn fail(&mut self, error: MatchError) -> MatchError {
        warn!(error = %error, "Matchmaking failed");
        self.release().await;
        self.state = MatchState::Error(error.to_string());
        error
    }

    async fn release(&mut self) {
        self.subscription = None;
        self.waiting_since = None;
        self.channel.disconnect().await;
    }
}
