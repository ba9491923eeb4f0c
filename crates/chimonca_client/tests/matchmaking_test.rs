//! Matchmaking coordinator against the in-memory broker and a recording API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chimonca_client::{
    ChannelClient, ChannelConfig, GameApi, MatchError, MatchState, Matchmaker, MemoryBroker,
    match_success_destination,
};
use chimonca_wire::{CardId, RoomId};
use common::{ApiCall, LOCAL, RecordingApi};

fn setup() -> (MemoryBroker, Arc<RecordingApi>, Matchmaker) {
    let broker = MemoryBroker::new();
    let api = Arc::new(RecordingApi::default());
    let channel = ChannelClient::new(
        Arc::new(broker.clone()),
        ChannelConfig::new("localhost").with_reconnect_delay(Duration::from_secs(1)),
    );
    let shared: Arc<dyn GameApi> = api.clone();
    let matchmaker = Matchmaker::new(LOCAL, shared, channel);
    (broker, api, matchmaker)
}

fn deck() -> Vec<CardId> {
    (1..=7).map(CardId).collect()
}

#[tokio::test(start_paused = true)]
async fn test_register_then_match() {
    let (broker, api, mut matchmaker) = setup();
    let destination = match_success_destination(LOCAL);
    assert_eq!(destination, "/queue/game/matching/success/3");

    matchmaker.register(deck()).await.expect("registered");
    assert_eq!(*matchmaker.state(), MatchState::Waiting);
    assert_eq!(broker.subscriber_count(&destination), 1);

    let calls = api.calls();
    let [ApiCall::Join(request)] = calls.as_slice() else {
        panic!("expected one join, got {calls:?}");
    };
    assert_eq!(request.player_id, LOCAL);
    assert_eq!(request.card_ids, deck());

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(matchmaker.elapsed().expect("waiting") >= Duration::from_secs(4));

    broker.publish(&destination, "55");
    assert_eq!(matchmaker.wait_for_match().await, Ok(RoomId(55)));
    assert_eq!(*matchmaker.state(), MatchState::Success(RoomId(55)));
    assert_eq!(broker.subscriber_count(&destination), 0);
    assert!(matchmaker.elapsed().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_registration_is_rejected() {
    let (_broker, api, mut matchmaker) = setup();
    matchmaker.register(deck()).await.expect("registered");

    assert_eq!(
        matchmaker.register(deck()).await,
        Err(MatchError::AlreadyQueued)
    );
    assert_eq!(*matchmaker.state(), MatchState::Waiting);
    assert_eq!(api.count(|c| matches!(c, ApiCall::Join(_))), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_from_idle_is_a_noop() {
    let (_broker, api, mut matchmaker) = setup();
    matchmaker.cancel().await.expect("noop");
    assert_eq!(*matchmaker.state(), MatchState::Idle);
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_twice_ends_idle_once() {
    let (broker, api, mut matchmaker) = setup();
    matchmaker.register(deck()).await.expect("registered");

    matchmaker.cancel().await.expect("cancelled");
    assert_eq!(*matchmaker.state(), MatchState::Idle);
    matchmaker.cancel().await.expect("second cancel");
    assert_eq!(*matchmaker.state(), MatchState::Idle);

    assert_eq!(api.count(|c| *c == ApiCall::Leave), 1);
    assert_eq!(broker.connection_count(), 0);
    assert_eq!(
        matchmaker.wait_for_match().await,
        Err(MatchError::NotWaiting)
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_leave_still_returns_to_idle() {
    let (_broker, api, mut matchmaker) = setup();
    matchmaker.register(deck()).await.expect("registered");
    api.fail_leave(true);

    assert!(matches!(
        matchmaker.cancel().await,
        Err(MatchError::Api(_))
    ));
    assert_eq!(*matchmaker.state(), MatchState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_failed_join_enters_error_and_allows_retry() {
    let (broker, api, mut matchmaker) = setup();
    api.fail_join(true);

    let err = matchmaker.register(deck()).await.unwrap_err();
    assert!(matches!(err, MatchError::Api(_)));
    let cause = std::error::Error::source(&err).expect("api error is the cause");
    assert_eq!(cause.to_string(), "Server rejected request: refused by test");
    assert!(matches!(matchmaker.state(), MatchState::Error(_)));
    assert_eq!(broker.subscriber_count(&match_success_destination(LOCAL)), 0);

    api.fail_join(false);
    matchmaker.register(deck()).await.expect("retry");
    assert_eq!(*matchmaker.state(), MatchState::Waiting);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_notice_is_skipped() {
    let (broker, _api, mut matchmaker) = setup();
    matchmaker.register(deck()).await.expect("registered");
    let destination = match_success_destination(LOCAL);

    broker.publish(&destination, "not a room");
    broker.publish(&destination, "\"56\"");
    assert_eq!(matchmaker.wait_for_match().await, Ok(RoomId(56)));
}

#[tokio::test(start_paused = true)]
async fn test_broken_channel_while_waiting_is_an_error() {
    let (broker, _api, mut matchmaker) = setup();
    matchmaker.register(deck()).await.expect("registered");

    broker.drop_connections();
    assert_eq!(matchmaker.wait_for_match().await, Err(MatchError::Broken));
    assert!(matches!(matchmaker.state(), MatchState::Error(_)));

    matchmaker.cancel().await.expect("reset");
    assert_eq!(*matchmaker.state(), MatchState::Idle);
}
