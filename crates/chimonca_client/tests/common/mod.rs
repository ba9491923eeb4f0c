//! Shared fixtures: a recording game API and board builders.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chimonca_client::{ApiError, GameApi};
use chimonca_wire::{
    BattleRequest, CardId, FieldBattleRequest, FieldSlots, GameCardId, HandCard,
    JoinQueueRequest, PlacedCard, PlayerId, RoomId, SessionInfo, SlotNumber, SubmitCardRequest,
    SurrenderRequest,
};

pub const LOCAL: PlayerId = PlayerId(3);
pub const OPPONENT: PlayerId = PlayerId(7);
pub const ROOM: RoomId = RoomId(55);

/// One request the fake received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Join(JoinQueueRequest),
    Leave,
    Fetch(RoomId),
    Submit(SubmitCardRequest),
    Battle(BattleRequest),
    FieldBattle(FieldBattleRequest),
    Surrender(SurrenderRequest),
}

/// In-memory [`GameApi`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingApi {
    calls: Mutex<Vec<ApiCall>>,
    session: Mutex<Option<SessionInfo>>,
    fail_join: AtomicBool,
    fail_leave: AtomicBool,
    fail_actions: AtomicBool,
}

impl RecordingApi {
    pub fn with_session(info: SessionInfo) -> Self {
        let api = Self::default();
        *api.session.lock().unwrap() = Some(info);
        api
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn fail_join(&self, fail: bool) {
        self.fail_join.store(fail, Ordering::SeqCst);
    }

    pub fn fail_leave(&self, fail: bool) {
        self.fail_leave.store(fail, Ordering::SeqCst);
    }

    pub fn fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn outcome(flag: &AtomicBool) -> Result<(), ApiError> {
        if flag.load(Ordering::SeqCst) {
            Err(ApiError::Rejected("refused by test".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GameApi for RecordingApi {
    async fn join_queue(&self, request: &JoinQueueRequest) -> Result<(), ApiError> {
        self.record(ApiCall::Join(request.clone()));
        Self::outcome(&self.fail_join)
    }

    async fn leave_queue(&self) -> Result<(), ApiError> {
        self.record(ApiCall::Leave);
        Self::outcome(&self.fail_leave)
    }

    async fn fetch_session(&self, room: RoomId) -> Result<SessionInfo, ApiError> {
        self.record(ApiCall::Fetch(room));
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                url: format!("game/{room}"),
            })
    }

    async fn submit_card(&self, _room: RoomId, request: &SubmitCardRequest) -> Result<(), ApiError> {
        self.record(ApiCall::Submit(*request));
        Self::outcome(&self.fail_actions)
    }

    async fn request_battle(&self, _room: RoomId, request: &BattleRequest) -> Result<(), ApiError> {
        self.record(ApiCall::Battle(*request));
        Self::outcome(&self.fail_actions)
    }

    async fn field_battle(
        &self,
        _room: RoomId,
        request: &FieldBattleRequest,
    ) -> Result<(), ApiError> {
        self.record(ApiCall::FieldBattle(*request));
        Self::outcome(&self.fail_actions)
    }

    async fn surrender(&self, _room: RoomId, request: &SurrenderRequest) -> Result<(), ApiError> {
        self.record(ApiCall::Surrender(*request));
        Self::outcome(&self.fail_actions)
    }
}

pub fn hand_card(id: i64) -> HandCard {
    HandCard {
        game_card_id: GameCardId(id),
        card_id: CardId(id * 10),
        title: format!("Card {id}"),
        attack_type: "ROCK".into(),
        grade: "A".into(),
        power: 50,
        image_url: format!("https://cdn/{id}.png"),
    }
}

pub fn hand(ids: impl IntoIterator<Item = i64>) -> Vec<HandCard> {
    ids.into_iter().map(hand_card).collect()
}

pub fn placed(id: i64, mine: bool) -> PlacedCard {
    PlacedCard {
        game_card_id: GameCardId(id),
        image_url: format!("https://cdn/{id}.png"),
        is_front: mine,
        is_mine: mine,
        grade: None,
        power: None,
        attack_type: None,
    }
}

pub fn slot(n: u8) -> SlotNumber {
    SlotNumber::from_number(n).expect("slot 1..=6")
}

pub fn full_field() -> FieldSlots {
    (1..=6).fold(FieldSlots::new(), |field, n| {
        field.with(slot(n), Some(placed(900 + i64::from(n), n % 2 == 0)))
    })
}

pub fn session_info(turn: PlayerId, cards: Vec<HandCard>) -> SessionInfo {
    SessionInfo {
        other_player: "rival".into(),
        my_hand_cards: cards,
        current_turn_player_id: turn,
        player1_id: LOCAL,
        player2_id: OPPONENT,
        field_cards: FieldSlots::new(),
    }
}
