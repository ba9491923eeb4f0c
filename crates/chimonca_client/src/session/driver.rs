//! Async shell around [`SessionMachine`].
//!
//! The driver is the single consumer of every session event: decoded pushes,
//! connection changes, clock expiries and user actions all go through one
//! queue and are handled to completion one at a time. Clocks and channel
//! feeds are owned here and released on the single teardown path.

use std::sync::Arc;
use std::time::Duration;

use chimonca_wire::{
    BattleRequest, FieldBattleRequest, GameCardId, PlayerId, RoomId, SessionPush,
    SubmitCardRequest, SurrenderRequest, Verdict,
};
use derive_setters::Setters;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{
    ActionError, ActionRejected, Effect, FailedRequest, LocalAction, Outcome, Phase, SessionInput,
    SessionMachine, SessionSnapshot,
};
use crate::api::{ApiError, GameApi};
use crate::channel::{ChannelClient, ChannelError, ChannelEvent, ConnectionState, Subscription};
use crate::turn_clock::TurnClock;

/// Per-player queue carrying session pushes.
pub fn player_queue(room: RoomId, player: PlayerId) -> String {
    format!("/queue/game/{room}/{player}")
}

/// Broadcast topic of a room.
pub fn room_topic(room: RoomId) -> String {
    format!("/topic/game/{room}")
}

/// Session timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Setters)]
#[setters(prefix = "with_")]
pub struct SessionConfig {
    /// Time the local player has per turn.
    turn_duration: Duration,
    /// How long a broken channel may stay down.
    grace_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            turn_duration: Duration::from_secs(90),
            grace_duration: Duration::from_secs(30),
        }
    }
}

/// User-facing notifications emitted while the session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// A local action was refused.
    Rejected(ActionRejected),
    /// An outbound request failed; state is unchanged.
    RequestFailed {
        /// Which request.
        action: &'static str,
        /// Why.
        error: ApiError,
    },
    /// The session resolved.
    Finished(Outcome),
}

/// Session start-up failure.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum SessionError {
    /// The initial fetch failed.
    #[display("Failed to load session: {}", _0)]
    Fetch(ApiError),
    /// The snapshot does not include the local player.
    #[display("Player {} is not part of room {}", player, room)]
    NotParticipant {
        /// Room.
        room: RoomId,
        /// Local player.
        player: PlayerId,
    },
    /// The snapshot hands the turn to someone outside the room.
    #[display("Room {} names unknown turn holder {}", room, holder)]
    UnknownTurnHolder {
        /// Room.
        room: RoomId,
        /// Turn holder named by the snapshot.
        holder: PlayerId,
    },
}

type Reply = oneshot::Sender<Result<(), ActionError>>;

#[derive(Debug)]
enum Event {
    Input(SessionInput, Option<Reply>),
    Shutdown,
}

/// Cloneable handle for renderers and input surfaces.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<Event>,
    snapshot: watch::Receiver<Arc<SessionSnapshot>>,
    remaining: watch::Receiver<Option<u32>>,
    grace_remaining: watch::Receiver<Option<u32>>,
}

impl SessionHandle {
    async fn request(&self, action: LocalAction) -> Result<(), ActionError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(Event::Input(SessionInput::Action(action), Some(tx)))
            .map_err(|_| ActionError::SessionClosed)?;
        rx.await.map_err(|_| ActionError::SessionClosed)?
    }

    /// Submits a hand card.
    pub async fn submit_card(&self, card: GameCardId) -> Result<(), ActionError> {
        self.request(LocalAction::SubmitCard(card)).await
    }

    /// Triggers a field battle.
    pub async fn trigger_field_battle(&self) -> Result<(), ActionError> {
        self.request(LocalAction::TriggerFieldBattle).await
    }

    /// Surrenders.
    pub async fn surrender(&self) -> Result<(), ActionError> {
        self.request(LocalAction::Surrender).await
    }

    /// Re-sends a battle request that failed.
    pub async fn retry_battle(&self) -> Result<(), ActionError> {
        self.request(LocalAction::RetryBattle).await
    }

    /// Dismisses the topmost modal.
    pub async fn acknowledge(&self) -> Result<(), ActionError> {
        self.request(LocalAction::AcknowledgeModal).await
    }

    /// Feeds a decoded push, bypassing the channel.
    pub fn deliver(&self, push: SessionPush) {
        let _ = self.events.send(Event::Input(SessionInput::Push(push), None));
    }

    /// Reports a connection state change, bypassing the channel.
    pub fn connection_changed(&self, state: ConnectionState) {
        let _ = self
            .events
            .send(Event::Input(SessionInput::Connection(state), None));
    }

    /// Stops the driver. Outstanding clocks and feeds are released.
    pub fn close(&self) {
        let _ = self.events.send(Event::Shutdown);
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Watches snapshots.
    pub fn watch(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshot.clone()
    }

    /// Seconds left on the local turn.
    pub fn turn_remaining(&self) -> Option<u32> {
        *self.remaining.borrow()
    }

    /// Seconds left in the disconnect grace window.
    pub fn grace_remaining(&self) -> Option<u32> {
        *self.grace_remaining.borrow()
    }
}

/// Owns one session's machine, clocks and feeds.
pub struct SessionDriver {
    room: RoomId,
    local: PlayerId,
    machine: SessionMachine,
    api: Arc<dyn GameApi>,
    clock: TurnClock,
    grace: TurnClock,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    snapshot: watch::Sender<Arc<SessionSnapshot>>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    feeds: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("room", &self.room)
            .field("local", &self.local)
            .field("phase", &self.machine.phase())
            .finish_non_exhaustive()
    }
}

impl SessionDriver {
    /// Creates a driver for `room` as `local`.
    pub fn new(
        room: RoomId,
        local: PlayerId,
        api: Arc<dyn GameApi>,
        config: SessionConfig,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionNotice>) {
        Self::with_machine(SessionMachine::new(room, local), room, local, api, config)
    }

    /// Creates a driver around a prepared machine.
    pub fn with_machine(
        machine: SessionMachine,
        room: RoomId,
        local: PlayerId,
        api: Arc<dyn GameApi>,
        config: SessionConfig,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionNotice>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(machine.snapshot()));
        let clock = TurnClock::new(config.turn_duration);
        let grace = TurnClock::new(config.grace_duration);

        let handle = SessionHandle {
            events: events_tx.clone(),
            snapshot: snapshot_rx,
            remaining: clock.subscribe(),
            grace_remaining: grace.subscribe(),
        };
        let driver = Self {
            room,
            local,
            machine,
            api,
            clock,
            grace,
            events_tx,
            events_rx,
            snapshot: snapshot_tx,
            notices: notices_tx,
            feeds: Vec::new(),
        };
        (driver, handle, notices_rx)
    }

    /// Subscribes to the session destinations and follows the connection state.
    #[instrument(skip(self, channel), fields(room = %self.room, player = %self.local))]
    pub async fn attach_channel(&mut self, channel: &ChannelClient) -> Result<(), ChannelError> {
        for destination in [player_queue(self.room, self.local), room_topic(self.room)] {
            let subscription = channel.subscribe(&destination).await?;
            self.feeds
                .push(tokio::spawn(forward_pushes(subscription, self.events_tx.clone())));
        }

        let mut connection = channel.connection();
        let events = self.events_tx.clone();
        self.feeds.push(tokio::spawn(async move {
            while let Some(state) = connection.changed().await {
                if events
                    .send(Event::Input(SessionInput::Connection(state), None))
                    .is_err()
                {
                    break;
                }
            }
        }));
        info!("Channel attached");
        Ok(())
    }

    /// Fetches the initial snapshot, then processes events until closed.
    ///
    /// Returns the verdict if the session resolved before it was closed.
    #[instrument(skip(self), fields(room = %self.room, player = %self.local))]
    pub async fn run(mut self) -> Result<Option<Verdict>, SessionError> {
        let info = match self.api.fetch_session(self.room).await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Initial fetch failed");
                self.teardown();
                return Err(SessionError::Fetch(e));
            }
        };
        if !info.is_participant(self.local) {
            self.teardown();
            return Err(SessionError::NotParticipant {
                room: self.room,
                player: self.local,
            });
        }
        let holder = info.current_turn_player_id;
        if !info.is_participant(holder) {
            warn!(%holder, "Initial snapshot names an unknown turn holder");
            self.teardown();
            return Err(SessionError::UnknownTurnHolder {
                room: self.room,
                holder,
            });
        }
        self.process(SessionInput::Initialized(info), None).await;

        while let Some(event) = self.events_rx.recv().await {
            match event {
                Event::Input(input, reply) => self.process(input, reply).await,
                Event::Shutdown => break,
            }
        }

        self.teardown();
        let verdict = match self.machine.phase() {
            Phase::Resolved(verdict) => Some(verdict),
            _ => None,
        };
        info!(?verdict, "Session closed");
        Ok(verdict)
    }

    async fn process(&mut self, input: SessionInput, reply: Option<Reply>) {
        let mut result = Ok(());
        for effect in self.machine.handle(input) {
            if let Err(e) = self.execute(effect).await {
                result = Err(e);
            }
        }
        self.snapshot.send_replace(Arc::new(self.machine.snapshot()));
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    async fn execute(&mut self, effect: Effect) -> Result<(), ActionError> {
        match effect {
            Effect::StartClock { generation } => {
                let events = self.events_tx.clone();
                self.clock.start(move || {
                    let _ = events.send(Event::Input(
                        SessionInput::ClockExpired { generation },
                        None,
                    ));
                });
            }
            Effect::StopClock => self.clock.stop(),
            Effect::StartGrace { generation } => {
                let events = self.events_tx.clone();
                self.grace.start(move || {
                    let _ = events.send(Event::Input(
                        SessionInput::GraceExpired { generation },
                        None,
                    ));
                });
            }
            Effect::CancelGrace => self.grace.stop(),
            Effect::SubmitCard(card) => {
                let request = SubmitCardRequest::new(self.local, card);
                let sent = self.api.submit_card(self.room, &request).await;
                self.report("submit-card", sent, FailedRequest::SubmitCard)?;
            }
            Effect::RequestBattle(pair) => {
                let request =
                    BattleRequest::new(self.local, pair.game_card_id1, pair.game_card_id2);
                let sent = self.api.request_battle(self.room, &request).await;
                self.report("battle", sent, FailedRequest::Battle(pair))?;
            }
            Effect::FieldBattle => {
                let request = FieldBattleRequest::new(self.local);
                let sent = self.api.field_battle(self.room, &request).await;
                self.report("field-battle", sent, FailedRequest::FieldBattle)?;
            }
            Effect::Surrender => {
                let request = SurrenderRequest::new(self.local);
                let sent = self.api.surrender(self.room, &request).await;
                if let Err(error) = sent {
                    return Err(self.request_failed("surrender", error));
                }
            }
            Effect::Rejected(reason) => {
                let _ = self.notices.send(SessionNotice::Rejected(reason));
                return Err(ActionError::Rejected(reason));
            }
            Effect::Finished(verdict) => {
                let outcome = Outcome::for_player(verdict, self.local);
                info!(%outcome, "Game over");
                let _ = self.notices.send(SessionNotice::Finished(outcome));
            }
        }
        Ok(())
    }

    /// Reports a failed request and queues it back to the machine, which
    /// decides whether anything must be re-armed.
    fn report(
        &self,
        action: &'static str,
        sent: Result<(), ApiError>,
        failed: FailedRequest,
    ) -> Result<(), ActionError> {
        match sent {
            Ok(()) => {
                debug!(action, "Request acknowledged");
                Ok(())
            }
            Err(error) => {
                let _ = self.events_tx.send(Event::Input(
                    SessionInput::RequestFailed(failed),
                    None,
                ));
                Err(self.request_failed(action, error))
            }
        }
    }

    fn request_failed(&self, action: &'static str, error: ApiError) -> ActionError {
        warn!(action, %error, "Request failed");
        let _ = self.notices.send(SessionNotice::RequestFailed {
            action,
            error: error.clone(),
        });
        ActionError::Request(error)
    }

    fn teardown(&mut self) {
        self.clock.stop();
        self.grace.stop();
        for feed in self.feeds.drain(..) {
            feed.abort();
        }
        debug!("Session resources released");
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        for feed in self.feeds.drain(..) {
            feed.abort();
        }
    }
}

async fn forward_pushes(mut subscription: Subscription, events: mpsc::UnboundedSender<Event>) {
    while let Some(event) = subscription.next_event().await {
        match event {
            ChannelEvent::Message { destination, body } => match SessionPush::decode(&body) {
                Ok(push) => {
                    debug!(destination = %destination, kind = push.kind(), "Push received");
                    if events
                        .send(Event::Input(SessionInput::Push(push), None))
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => warn!(destination = %destination, error = %e, "Dropping unrecognized push"),
            },
            other => debug!(destination = subscription.destination(), ?other, "Feed event"),
        }
    }
}
