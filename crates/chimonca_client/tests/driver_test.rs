//! End-to-end session driver tests over the in-memory broker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chimonca_client::session::{player_queue, room_topic};
use chimonca_client::{
    ActionError, ActionRejected, ChannelClient, ChannelConfig, ExitDecision, ExitPrompt,
    GameApi, MemoryBroker, NavigationGuard, Outcome, Phase, SessionConfig, SessionDriver,
    SessionError, SessionHandle, SessionMachine, SessionNotice, SessionSnapshot,
};
use chimonca_wire::{
    BattlePair, FieldSlots, GameCardId, HandCard, PlayerId, SessionPush, SubmitResult,
    SurrenderRequest, Verdict,
};
use common::{ApiCall, LOCAL, OPPONENT, ROOM, RecordingApi, hand, placed, session_info, slot};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    api: Arc<RecordingApi>,
    handle: SessionHandle,
    notices: mpsc::UnboundedReceiver<SessionNotice>,
    engine: JoinHandle<Result<Option<Verdict>, SessionError>>,
}

fn start(turn: PlayerId, cards: Vec<HandCard>) -> Harness {
    let api = Arc::new(RecordingApi::with_session(session_info(turn, cards)));
    let shared: Arc<dyn GameApi> = api.clone();
    let (driver, handle, notices) = SessionDriver::with_machine(
        SessionMachine::with_seed(ROOM, LOCAL, 7),
        ROOM,
        LOCAL,
        shared,
        SessionConfig::default(),
    );
    Harness {
        api,
        handle,
        notices,
        engine: tokio::spawn(driver.run()),
    }
}

async fn start_with_channel(
    turn: PlayerId,
    cards: Vec<HandCard>,
) -> (Harness, MemoryBroker, ChannelClient) {
    let broker = MemoryBroker::new();
    let mut channel = ChannelClient::new(
        Arc::new(broker.clone()),
        ChannelConfig::new("localhost").with_reconnect_delay(Duration::from_secs(5)),
    );
    channel
        .connect()
        .wait_connected(Duration::from_secs(5))
        .await
        .expect("connected");

    let api = Arc::new(RecordingApi::with_session(session_info(turn, cards)));
    let shared: Arc<dyn GameApi> = api.clone();
    let (mut driver, handle, notices) =
        SessionDriver::new(ROOM, LOCAL, shared, SessionConfig::default());
    driver.attach_channel(&channel).await.expect("attached");
    let harness = Harness {
        api,
        handle,
        notices,
        engine: tokio::spawn(driver.run()),
    };
    (harness, broker, channel)
}

async fn wait_for(
    handle: &SessionHandle,
    done: impl Fn(&SessionSnapshot) -> bool,
) -> Arc<SessionSnapshot> {
    let mut snapshots = handle.watch();
    tokio::time::timeout(Duration::from_secs(600), async {
        loop {
            let snapshot = Arc::clone(&snapshots.borrow_and_update());
            if done(&snapshot) {
                return snapshot;
            }
            snapshots.changed().await.expect("driver alive");
        }
    })
    .await
    .expect("snapshot condition reached")
}

fn submit_push(turn: PlayerId, field: FieldSlots, pair: Option<BattlePair>) -> String {
    SessionPush::SubmitResult(SubmitResult {
        current_turn_player_id: turn,
        field_cards: field,
        battle_pair: pair,
        my_hand_cards: None,
        winner_id: None,
    })
    .encode()
    .expect("encodes")
}

fn drain(notices: &mut mpsc::UnboundedReceiver<SessionNotice>) -> Vec<SessionNotice> {
    let mut seen = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        seen.push(notice);
    }
    seen
}

async fn finish(harness: Harness) -> Option<Verdict> {
    harness.handle.close();
    harness
        .engine
        .await
        .expect("engine task")
        .expect("engine result")
}

#[tokio::test(start_paused = true)]
async fn test_initial_fetch_starts_turn_clock() {
    let harness = start(LOCAL, hand(1..=7));
    let snapshot = wait_for(&harness.handle, |s| s.phase == Phase::MyTurn).await;

    assert_eq!(snapshot.hand.len(), 7);
    assert_eq!(harness.handle.turn_remaining(), Some(90));
    assert_eq!(harness.api.calls(), vec![ApiCall::Fetch(ROOM)]);
    assert_eq!(finish(harness).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_idle_turn_submits_exactly_one_random_card() {
    let harness = start(LOCAL, hand(1..=7));
    wait_for(&harness.handle, |s| s.phase == Phase::MyTurn).await;

    tokio::time::sleep(Duration::from_secs(89)).await;
    assert_eq!(harness.api.count(|c| matches!(c, ApiCall::Submit(_))), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_secs(300)).await;
    let submits: Vec<_> = harness
        .api
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ApiCall::Submit(request) => Some(request),
            _ => None,
        })
        .collect();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].player_id, LOCAL);
    assert!((1..=7).contains(&submits[0].game_card_id.0));
    assert_eq!(harness.api.count(|c| matches!(c, ApiCall::FieldBattle(_))), 0);

    // The request alone does not move the game forward.
    assert_eq!(harness.handle.snapshot().phase, Phase::MyTurn);
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_turn_with_empty_hand_triggers_field_battle() {
    let harness = start(LOCAL, Vec::new());
    wait_for(&harness.handle, |s| s.phase == Phase::MyTurn).await;

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(harness.api.count(|c| matches!(c, ApiCall::FieldBattle(_))), 1);
    assert_eq!(harness.api.count(|c| matches!(c, ApiCall::Submit(_))), 0);
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_opponent_turn_never_falls_back() {
    let harness = start(OPPONENT, hand(1..=7));
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert_eq!(harness.api.calls(), vec![ApiCall::Fetch(ROOM)]);
    assert_eq!(harness.handle.turn_remaining(), None);
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_action_sends_nothing() {
    let mut harness = start(OPPONENT, hand(1..=7));
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;

    assert_eq!(
        harness.handle.submit_card(GameCardId(1)).await,
        Err(ActionError::Rejected(ActionRejected::NotYourTurn))
    );
    assert_eq!(harness.api.count(|c| matches!(c, ApiCall::Submit(_))), 0);
    assert_eq!(
        drain(&mut harness.notices),
        vec![SessionNotice::Rejected(ActionRejected::NotYourTurn)]
    );
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_request_leaves_state_unchanged() {
    let mut harness = start(LOCAL, hand(1..=7));
    wait_for(&harness.handle, |s| s.phase == Phase::MyTurn).await;
    harness.api.fail_actions(true);

    let result = harness.handle.submit_card(GameCardId(2)).await;
    assert!(matches!(result, Err(ActionError::Request(_))));

    let snapshot = harness.handle.snapshot();
    assert_eq!(snapshot.phase, Phase::MyTurn);
    assert_eq!(snapshot.hand.len(), 7);
    assert!(matches!(
        drain(&mut harness.notices).as_slice(),
        [SessionNotice::RequestFailed {
            action: "submit-card",
            ..
        }]
    ));

    harness.api.fail_actions(false);
    harness
        .handle
        .submit_card(GameCardId(2))
        .await
        .expect("retry succeeds");
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_pushes_drive_the_board() {
    let (harness, broker, mut channel) = start_with_channel(LOCAL, hand(1..=7)).await;
    wait_for(&harness.handle, |s| s.phase == Phase::MyTurn).await;

    let field = FieldSlots::new().with(slot(2), Some(placed(1, true)));
    broker.publish(&player_queue(ROOM, LOCAL), &submit_push(OPPONENT, field.clone(), None));
    let snapshot = wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;
    assert_eq!(*snapshot.field, field);
    assert_eq!(harness.handle.turn_remaining(), None);

    broker.publish(&room_topic(ROOM), "{\"type\":\"CHAT\",\"text\":\"hi\"}");
    broker.publish(&room_topic(ROOM), &submit_push(LOCAL, FieldSlots::new(), None));
    let snapshot = wait_for(&harness.handle, |s| s.phase == Phase::MyTurn).await;
    assert_eq!(snapshot.field.occupied(), 0);

    finish(harness).await;
    channel.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_battle_nomination_requests_battle_once() {
    let (harness, broker, mut channel) = start_with_channel(OPPONENT, hand(1..=7)).await;
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;

    let pair = BattlePair {
        game_card_id1: GameCardId(1),
        game_card_id2: GameCardId(202),
    };
    let field = FieldSlots::new()
        .with(slot(1), Some(placed(1, true)))
        .with(slot(4), Some(placed(202, false)));
    let body = submit_push(LOCAL, field, Some(pair));
    broker.publish(&player_queue(ROOM, LOCAL), &body);
    broker.publish(&room_topic(ROOM), &body);

    wait_for(&harness.handle, |s| s.phase == Phase::BattleInProgress(pair)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let battles: Vec<_> = harness
        .api
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ApiCall::Battle(_)))
        .collect();
    assert_eq!(battles.len(), 1);
    let ApiCall::Battle(request) = &battles[0] else {
        unreachable!()
    };
    assert_eq!(request.game_card_id1, GameCardId(1));
    assert_eq!(request.game_card_id2, GameCardId(202));

    finish(harness).await;
    channel.disconnect().await;
}

fn nomination(pair: BattlePair) -> SessionPush {
    SessionPush::SubmitResult(SubmitResult {
        current_turn_player_id: LOCAL,
        field_cards: FieldSlots::new()
            .with(slot(1), Some(placed(1, true)))
            .with(slot(4), Some(placed(202, false))),
        battle_pair: Some(pair),
        my_hand_cards: None,
        winner_id: None,
    })
}

fn battle_calls(api: &RecordingApi) -> usize {
    api.count(|c| matches!(c, ApiCall::Battle(_)))
}

#[tokio::test(start_paused = true)]
async fn test_failed_battle_request_is_resent_when_clock_expires() {
    let mut harness = start(OPPONENT, hand(1..=7));
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;
    let pair = BattlePair {
        game_card_id1: GameCardId(1),
        game_card_id2: GameCardId(202),
    };

    harness.api.fail_actions(true);
    harness.handle.deliver(nomination(pair));
    wait_for(&harness.handle, |s| s.phase == Phase::BattleInProgress(pair)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(battle_calls(&harness.api), 1);
    assert!(harness.handle.turn_remaining().is_some());
    assert!(matches!(
        drain(&mut harness.notices).as_slice(),
        [SessionNotice::RequestFailed {
            action: "battle",
            ..
        }]
    ));

    harness.api.fail_actions(false);
    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(battle_calls(&harness.api), 2);
    assert_eq!(harness.handle.turn_remaining(), None);
    assert_eq!(harness.handle.snapshot().phase, Phase::BattleInProgress(pair));

    // Acknowledged now; nothing else goes out while the server resolves it.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(battle_calls(&harness.api), 2);
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_battle_request_is_resent_on_redelivery() {
    let harness = start(OPPONENT, hand(1..=7));
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;
    let pair = BattlePair {
        game_card_id1: GameCardId(1),
        game_card_id2: GameCardId(202),
    };

    harness.api.fail_actions(true);
    harness.handle.deliver(nomination(pair));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(battle_calls(&harness.api), 1);

    harness.api.fail_actions(false);
    harness.handle.deliver(nomination(pair));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(battle_calls(&harness.api), 2);
    assert_eq!(harness.handle.turn_remaining(), None);

    assert_eq!(
        harness.handle.retry_battle().await,
        Err(ActionError::Rejected(ActionRejected::BattlePending))
    );
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_player_retries_failed_battle_request() {
    let harness = start(OPPONENT, hand(1..=7));
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;
    let pair = BattlePair {
        game_card_id1: GameCardId(1),
        game_card_id2: GameCardId(202),
    };

    harness.api.fail_actions(true);
    harness.handle.deliver(nomination(pair));
    tokio::time::sleep(Duration::from_secs(1)).await;

    harness.api.fail_actions(false);
    harness.handle.retry_battle().await.expect("retry goes out");
    assert_eq!(battle_calls(&harness.api), 2);
    assert_eq!(harness.handle.turn_remaining(), None);
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_unknown_turn_holder_ends_session() {
    let mut info = session_info(LOCAL, hand(1..=7));
    info.current_turn_player_id = PlayerId(99);
    let api: Arc<dyn GameApi> = Arc::new(RecordingApi::with_session(info));
    let (driver, handle, _notices) =
        SessionDriver::new(ROOM, LOCAL, api, SessionConfig::default());

    assert_eq!(
        driver.run().await,
        Err(SessionError::UnknownTurnHolder {
            room: ROOM,
            holder: PlayerId(99),
        })
    );
    assert_eq!(handle.snapshot().phase, Phase::AwaitingInit);
}

#[tokio::test(start_paused = true)]
async fn test_lost_channel_forfeits_after_grace() {
    let (mut harness, broker, mut channel) = start_with_channel(OPPONENT, hand(1..=7)).await;
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;

    broker.set_refuse_connections(true);
    broker.drop_connections();
    wait_for(&harness.handle, |s| s.disconnect_grace).await;

    let snapshot = wait_for(&harness.handle, |s| s.is_resolved()).await;
    assert_eq!(snapshot.outcome(), Some(Outcome::Victory));
    assert!(!snapshot.disconnect_grace);
    assert!(
        drain(&mut harness.notices).contains(&SessionNotice::Finished(Outcome::Victory))
    );
    assert_eq!(finish(harness).await, Some(Verdict::Winner(LOCAL)));
    channel.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_keeps_playing() {
    let (harness, broker, mut channel) = start_with_channel(OPPONENT, hand(1..=7)).await;
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;

    broker.drop_connections();
    wait_for(&harness.handle, |s| s.disconnect_grace).await;
    wait_for(&harness.handle, |s| !s.disconnect_grace).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    let snapshot = harness.handle.snapshot();
    assert!(!snapshot.is_resolved());
    assert_eq!(snapshot.phase, Phase::OpponentTurn);

    finish(harness).await;
    channel.disconnect().await;
}

struct AlwaysConfirm;

#[async_trait]
impl ExitPrompt for AlwaysConfirm {
    async fn confirm_exit(&mut self) -> bool {
        true
    }
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_exit_surrenders_before_leaving() {
    let harness = start(OPPONENT, hand(1..=7));
    wait_for(&harness.handle, |s| s.phase == Phase::OpponentTurn).await;

    let guard = NavigationGuard::new(harness.handle.clone());
    assert!(guard.unload_warning().is_some());
    let decision = guard.request_exit(&mut AlwaysConfirm).await;

    assert_eq!(decision, ExitDecision::Leave { surrendered: true });
    assert_eq!(
        harness
            .api
            .count(|c| *c == ApiCall::Surrender(SurrenderRequest::new(LOCAL))),
        1
    );
    finish(harness).await;
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_ends_session() {
    let api: Arc<dyn GameApi> = Arc::new(RecordingApi::default());
    let (driver, handle, _notices) =
        SessionDriver::new(ROOM, LOCAL, api, SessionConfig::default());

    assert!(matches!(driver.run().await, Err(SessionError::Fetch(_))));
    assert_eq!(
        handle.submit_card(GameCardId(1)).await,
        Err(ActionError::SessionClosed)
    );
}
