//! Pure session state machine.
//!
//! [`SessionMachine::handle`] consumes one [`SessionInput`] at a time and
//! answers with the [`Effect`]s the driver must carry out. It never performs
//! I/O itself, which keeps every transition synchronous and atomic.

use std::mem;
use std::sync::Arc;

use chimonca_wire::{
    BattlePair, BattleResolved, FieldSlots, GameCardId, HandCard, PlayerId, RoomId, SessionInfo,
    SessionPush, SubmitResult, Verdict,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, warn};

use super::{ActionRejected, BattleDisplay, Phase, PlayerSide, SessionSnapshot};
use crate::channel::ConnectionState;

/// Something the local user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    /// Place a hand card on the field.
    SubmitCard(GameCardId),
    /// Battle over the whole field.
    TriggerFieldBattle,
    /// Concede.
    Surrender,
    /// Dismiss the topmost modal.
    AcknowledgeModal,
    /// Re-send a battle request that failed.
    RetryBattle,
}

/// An outbound request the driver could not deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedRequest {
    /// Submit-card request.
    SubmitCard,
    /// Battle-resolution request for the pair.
    Battle(BattlePair),
    /// Field-battle request.
    FieldBattle,
}

/// One event for the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// Initial fetch result.
    Initialized(SessionInfo),
    /// Decoded server push.
    Push(SessionPush),
    /// Channel connection state changed.
    Connection(ConnectionState),
    /// The turn clock started under `generation` ran out.
    ClockExpired {
        /// Generation the clock was started with.
        generation: u64,
    },
    /// The grace countdown started under `generation` ran out.
    GraceExpired {
        /// Generation the countdown was started with.
        generation: u64,
    },
    /// User action.
    Action(LocalAction),
    /// An effect's request failed.
    RequestFailed(FailedRequest),
}

/// Work the driver performs on behalf of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// (Re)start the turn clock; expiry must report `generation`.
    StartClock {
        /// Generation to report back on expiry.
        generation: u64,
    },
    /// Stop the turn clock.
    StopClock,
    /// Start the disconnect grace countdown.
    StartGrace {
        /// Generation to report back on expiry.
        generation: u64,
    },
    /// Stop the grace countdown.
    CancelGrace,
    /// Send a submit-card request.
    SubmitCard(GameCardId),
    /// Send a battle-resolution request.
    RequestBattle(BattlePair),
    /// Send a field-battle request.
    FieldBattle,
    /// Send a surrender request.
    Surrender,
    /// Tell the user an action was refused.
    Rejected(ActionRejected),
    /// The session just resolved.
    Finished(Verdict),
}

#[derive(Debug, Clone, Copy)]
struct Participants {
    player1: PlayerId,
    player2: PlayerId,
}

impl Participants {
    fn contains(&self, player: PlayerId) -> bool {
        player == self.player1 || player == self.player2
    }

    fn accepts(&self, verdict: Verdict) -> bool {
        verdict.winner().is_none_or(|w| self.contains(w))
    }
}

/// Session state owned by one match.
#[derive(Debug)]
pub struct SessionMachine {
    room: RoomId,
    local: PlayerId,
    participants: Option<Participants>,
    opponent_name: String,
    phase: Phase,
    turn_holder: Option<PlayerId>,
    field: Arc<FieldSlots>,
    hand: Arc<Vec<HandCard>>,
    battle: Option<BattleDisplay>,
    grace: bool,
    clock_armed: bool,
    battle_retry: bool,
    clock_generation: u64,
    grace_generation: u64,
    pending: Vec<SessionPush>,
    rng: StdRng,
}

impl SessionMachine {
    /// Creates a machine waiting for the initial fetch.
    pub fn new(room: RoomId, local: PlayerId) -> Self {
        Self::with_rng(room, local, StdRng::from_entropy())
    }

    /// Creates a machine whose fallback choices are reproducible.
    pub fn with_seed(room: RoomId, local: PlayerId, seed: u64) -> Self {
        Self::with_rng(room, local, StdRng::seed_from_u64(seed))
    }

    fn with_rng(room: RoomId, local: PlayerId, rng: StdRng) -> Self {
        Self {
            room,
            local,
            participants: None,
            opponent_name: String::new(),
            phase: Phase::AwaitingInit,
            turn_holder: None,
            field: Arc::new(FieldSlots::new()),
            hand: Arc::new(Vec::new()),
            battle: None,
            grace: false,
            clock_armed: false,
            battle_retry: false,
            clock_generation: 0,
            grace_generation: 0,
            pending: Vec::new(),
            rng,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the game has a result.
    pub fn is_resolved(&self) -> bool {
        self.phase.is_resolved()
    }

    /// Builds a renderer snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        let side = self.participants.map(|p| {
            if p.player1 == self.local {
                PlayerSide::Blue
            } else {
                PlayerSide::Red
            }
        });
        SessionSnapshot {
            room: self.room,
            local_player: self.local,
            opponent_name: self.opponent_name.clone(),
            side,
            phase: self.phase,
            turn_holder: self.turn_holder,
            field: Arc::clone(&self.field),
            hand: Arc::clone(&self.hand),
            battle: self.battle.clone(),
            disconnect_grace: self.grace,
        }
    }

    /// Processes one input to completion.
    pub fn handle(&mut self, input: SessionInput) -> Vec<Effect> {
        match input {
            SessionInput::Initialized(info) => self.initialize(info),
            SessionInput::Push(push) => self.apply_push(push),
            SessionInput::Connection(state) => self.connection_changed(state),
            SessionInput::ClockExpired { generation } => self.clock_expired(generation),
            SessionInput::GraceExpired { generation } => self.grace_expired(generation),
            SessionInput::Action(action) => self.act(action),
            SessionInput::RequestFailed(failed) => self.request_failed(failed),
        }
    }

    #[instrument(skip(self, info), fields(room = %self.room, turn = %info.current_turn_player_id))]
    fn initialize(&mut self, info: SessionInfo) -> Vec<Effect> {
        if self.is_resolved() {
            debug!("Ignoring snapshot for resolved session");
            return Vec::new();
        }
        if !info.is_participant(self.local) {
            warn!(local = %self.local, "Local player is not part of this session");
            return Vec::new();
        }
        let participants = Participants {
            player1: info.player1_id,
            player2: info.player2_id,
        };
        if !participants.contains(info.current_turn_player_id) {
            warn!("Snapshot names an unknown turn holder");
            return Vec::new();
        }

        self.participants = Some(participants);
        self.opponent_name = info.other_player;
        self.field = Arc::new(info.field_cards);
        self.hand = Arc::new(info.my_hand_cards);
        info!(hand = self.hand.len(), occupied = self.field.occupied(), "Session initialized");

        let mut effects = self.enter_turn(info.current_turn_player_id);
        for push in mem::take(&mut self.pending) {
            debug!(kind = push.kind(), "Replaying buffered push");
            effects.extend(self.apply_push(push));
        }
        effects
    }

    fn apply_push(&mut self, push: SessionPush) -> Vec<Effect> {
        let Some(participants) = self.participants else {
            debug!(kind = push.kind(), "Buffering push until initialized");
            self.pending.push(push);
            return Vec::new();
        };
        if self.is_resolved() {
            debug!(kind = push.kind(), "Ignoring push after resolution");
            return Vec::new();
        }
        match push {
            SessionPush::SubmitResult(result) => self.submit_result(participants, result),
            SessionPush::BattleResolved(result) => self.battle_resolved(participants, result),
            SessionPush::SurrenderNotice(notice) => {
                if !participants.accepts(notice.winner_id) {
                    warn!(winner = %notice.winner_id, "Surrender names an unknown player");
                    return Vec::new();
                }
                info!(winner = %notice.winner_id, "Opponent surrendered or was forfeited");
                self.battle = None;
                self.resolve(notice.winner_id)
            }
        }
    }

    #[instrument(skip_all, fields(turn = %result.current_turn_player_id))]
    fn submit_result(&mut self, participants: Participants, result: SubmitResult) -> Vec<Effect> {
        if !participants.contains(result.current_turn_player_id)
            || !result.winner_id.is_none_or(|v| participants.accepts(v))
        {
            warn!("Submit result references an unknown player");
            return Vec::new();
        }

        self.field = Arc::new(result.field_cards);
        if let Some(hand) = result.my_hand_cards {
            self.hand = Arc::new(hand);
        }

        if let Some(verdict) = result.winner_id {
            self.turn_holder = Some(result.current_turn_player_id);
            return self.resolve(verdict);
        }

        if let Some(pair) = result.battle_pair {
            if self.phase == Phase::BattleInProgress(pair) && !self.battle_retry {
                debug!("Duplicate battle nomination");
                return Vec::new();
            }
            self.battle_retry = false;
            self.turn_holder = Some(result.current_turn_player_id);
            self.phase = Phase::BattleInProgress(pair);
            self.battle = Some(BattleDisplay {
                card1_image_url: self.artwork(pair.game_card_id1),
                card2_image_url: self.artwork(pair.game_card_id2),
                result: None,
            });
            let mut effects = self.stop_clock();
            if result.current_turn_player_id == self.local {
                info!(card1 = %pair.game_card_id1, card2 = %pair.game_card_id2, "Requesting battle");
                effects.push(Effect::RequestBattle(pair));
            } else {
                debug!("Battle nominated; opponent resolves it");
            }
            return effects;
        }

        self.enter_turn(result.current_turn_player_id)
    }

    #[instrument(skip_all, fields(turn = %result.current_turn_player_id, battle = %result.battle_winner_id))]
    fn battle_resolved(&mut self, participants: Participants, result: BattleResolved) -> Vec<Effect> {
        if !participants.contains(result.current_turn_player_id)
            || !participants.accepts(result.battle_winner_id)
            || !result.winner_id.is_none_or(|v| participants.accepts(v))
        {
            warn!("Battle result references an unknown player");
            return Vec::new();
        }

        self.field = Arc::new(result.field_cards);
        let mut display = self.battle.take().unwrap_or_default();
        if result.card1_image_url.is_some() {
            display.card1_image_url = result.card1_image_url;
        }
        if result.card2_image_url.is_some() {
            display.card2_image_url = result.card2_image_url;
        }
        display.result = Some(result.battle_winner_id);
        self.battle = Some(display);
        info!("Battle resolved");

        match result.winner_id {
            Some(verdict) => {
                self.turn_holder = Some(result.current_turn_player_id);
                self.resolve(verdict)
            }
            None => self.enter_turn(result.current_turn_player_id),
        }
    }

    fn connection_changed(&mut self, state: ConnectionState) -> Vec<Effect> {
        match state {
            ConnectionState::Connected if self.grace => {
                info!("Channel restored; grace cancelled");
                self.grace = false;
                vec![Effect::CancelGrace]
            }
            ConnectionState::Disconnected
                if !self.grace && self.participants.is_some() && !self.is_resolved() =>
            {
                self.grace = true;
                self.grace_generation += 1;
                warn!(generation = self.grace_generation, "Channel lost; grace started");
                vec![Effect::StartGrace {
                    generation: self.grace_generation,
                }]
            }
            _ => Vec::new(),
        }
    }

    fn grace_expired(&mut self, generation: u64) -> Vec<Effect> {
        if !self.grace || generation != self.grace_generation || self.is_resolved() {
            debug!(generation, "Stale grace expiry");
            return Vec::new();
        }
        warn!("Grace elapsed without reconnection; forfeiting opponent");
        self.resolve(Verdict::Winner(self.local))
    }

    fn clock_expired(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.clock_generation {
            debug!(generation, current = self.clock_generation, "Stale clock expiry");
            return Vec::new();
        }
        match self.phase {
            Phase::MyTurn => {}
            Phase::BattleInProgress(pair) if self.battle_retry => {
                self.clock_generation += 1;
                self.clock_armed = false;
                self.battle_retry = false;
                info!(
                    card1 = %pair.game_card_id1,
                    card2 = %pair.game_card_id2,
                    "Turn expired; re-sending battle request"
                );
                return vec![Effect::RequestBattle(pair)];
            }
            _ => {
                debug!(generation, phase = ?self.phase, "Clock expired outside the local turn");
                return Vec::new();
            }
        }
        self.clock_generation += 1;
        self.clock_armed = false;
        let choice = if self.field.has_empty_slot() {
            self.hand.choose(&mut self.rng).map(|c| c.game_card_id)
        } else {
            None
        };
        if let Some(card) = choice {
            info!(card = %card, "Turn expired; submitting random card");
            return vec![Effect::SubmitCard(card)];
        }
        info!("Turn expired; triggering field battle");
        vec![Effect::FieldBattle]
    }

    /// Re-arms whatever keeps the game moving after a request was lost.
    fn request_failed(&mut self, failed: FailedRequest) -> Vec<Effect> {
        match failed {
            FailedRequest::Battle(pair) => {
                if self.phase != Phase::BattleInProgress(pair) || self.turn_holder != Some(self.local)
                {
                    debug!("Failed battle request no longer pending");
                    return Vec::new();
                }
                warn!(
                    card1 = %pair.game_card_id1,
                    card2 = %pair.game_card_id2,
                    "Battle request failed; retry armed"
                );
                self.battle_retry = true;
                self.arm_clock()
            }
            FailedRequest::SubmitCard | FailedRequest::FieldBattle => {
                if self.phase == Phase::MyTurn && !self.clock_armed {
                    warn!(?failed, "Fallback request failed; restarting the turn clock");
                    self.arm_clock()
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn act(&mut self, action: LocalAction) -> Vec<Effect> {
        let outcome = match action {
            LocalAction::SubmitCard(card) => self.check_turn().and_then(|()| {
                if !self.field.has_empty_slot() {
                    Err(ActionRejected::FieldFull)
                } else if !self.hand.iter().any(|c| c.game_card_id == card) {
                    Err(ActionRejected::CardNotInHand)
                } else {
                    Ok(vec![Effect::SubmitCard(card)])
                }
            }),
            LocalAction::TriggerFieldBattle => self.check_turn().map(|()| vec![Effect::FieldBattle]),
            LocalAction::Surrender => match self.phase {
                Phase::Resolved(_) => Err(ActionRejected::GameResolved),
                Phase::AwaitingInit => Err(ActionRejected::NotInitialized),
                _ => Ok(vec![Effect::Surrender]),
            },
            LocalAction::RetryBattle => match self.phase {
                Phase::BattleInProgress(pair) if self.battle_retry => {
                    self.battle_retry = false;
                    let mut effects = self.stop_clock();
                    effects.push(Effect::RequestBattle(pair));
                    Ok(effects)
                }
                Phase::BattleInProgress(_) => Err(ActionRejected::BattlePending),
                Phase::Resolved(_) => Err(ActionRejected::GameResolved),
                Phase::AwaitingInit => Err(ActionRejected::NotInitialized),
                Phase::MyTurn | Phase::OpponentTurn => Err(ActionRejected::NoBattleToRetry),
            },
            LocalAction::AcknowledgeModal => {
                if self.battle.take().is_some() {
                    debug!("Battle display dismissed");
                }
                Ok(Vec::new())
            }
        };
        outcome.unwrap_or_else(|reason| {
            debug!(?action, %reason, "Action rejected");
            vec![Effect::Rejected(reason)]
        })
    }

    fn check_turn(&self) -> Result<(), ActionRejected> {
        match self.phase {
            Phase::MyTurn => Ok(()),
            Phase::OpponentTurn => Err(ActionRejected::NotYourTurn),
            Phase::BattleInProgress(_) => Err(ActionRejected::BattlePending),
            Phase::Resolved(_) => Err(ActionRejected::GameResolved),
            Phase::AwaitingInit => Err(ActionRejected::NotInitialized),
        }
    }

    fn artwork(&self, card: GameCardId) -> Option<String> {
        self.field
            .find(card)
            .map(|(_, placed)| placed.image_url.clone())
    }

    fn enter_turn(&mut self, holder: PlayerId) -> Vec<Effect> {
        self.turn_holder = Some(holder);
        self.battle_retry = false;
        if holder == self.local {
            self.phase = Phase::MyTurn;
            self.arm_clock()
        } else {
            self.phase = Phase::OpponentTurn;
            self.stop_clock()
        }
    }

    fn arm_clock(&mut self) -> Vec<Effect> {
        self.clock_generation += 1;
        self.clock_armed = true;
        vec![Effect::StartClock {
            generation: self.clock_generation,
        }]
    }

    fn stop_clock(&mut self) -> Vec<Effect> {
        self.clock_generation += 1;
        self.clock_armed = false;
        vec![Effect::StopClock]
    }

    fn resolve(&mut self, verdict: Verdict) -> Vec<Effect> {
        info!(%verdict, "Session resolved");
        self.phase = Phase::Resolved(verdict);
        self.pending.clear();
        self.battle_retry = false;
        let mut effects = self.stop_clock();
        if mem::take(&mut self.grace) {
            effects.push(Effect::CancelGrace);
        }
        effects.push(Effect::Finished(verdict));
        effects
    }
}
