//! Tests for decoding server pushes at the wire boundary.

use chimonca_wire::{
    GameCardId, PlayerId, RoomId, SessionInfo, SessionPush, SlotNumber, Verdict, WireError,
    parse_match_success,
};

const SUBMIT_WITH_BATTLE: &str = r#"{
    "type": "SUBMIT_RESULT",
    "currentTurnPlayerId": 3,
    "fieldCards": {
        "1": {"gameCardId": 101, "imageUrl": "https://cdn/101.png", "isFront": true, "isMine": true},
        "2": null,
        "4": {"gameCardId": 202, "imageUrl": "https://cdn/202.png", "isFront": false, "isMine": false}
    },
    "battleCardDto": {"gameCardId1": 101, "gameCardId2": 202},
    "myHandCards": null,
    "winnerId": null
}"#;

#[test]
fn test_submit_result_with_legacy_battle_field_name() {
    let push = SessionPush::decode(SUBMIT_WITH_BATTLE).expect("decodes");
    let SessionPush::SubmitResult(result) = push else {
        panic!("expected submit result");
    };
    assert_eq!(result.current_turn_player_id, PlayerId(3));
    assert_eq!(result.field_cards.occupied(), 2);
    assert_eq!(
        result.field_cards.get(SlotNumber::Four).map(|c| c.game_card_id),
        Some(GameCardId(202))
    );
    let pair = result.battle_pair.expect("battle pair");
    assert_eq!(pair.game_card_id1, GameCardId(101));
    assert_eq!(pair.game_card_id2, GameCardId(202));
    assert!(result.my_hand_cards.is_none());
    assert!(result.winner_id.is_none());
}

#[test]
fn test_battle_result_with_terminal_draw() {
    let body = r#"{
        "type": "BATTLE_RESULT",
        "currentTurnPlayerId": 5,
        "fieldCards": {},
        "battleWinnerId": 5,
        "card1Art": "https://cdn/a.png",
        "winnerId": 0
    }"#;
    let SessionPush::BattleResolved(result) = SessionPush::decode(body).expect("decodes") else {
        panic!("expected battle result");
    };
    assert_eq!(result.battle_winner_id, Verdict::Winner(PlayerId(5)));
    assert_eq!(result.card1_image_url.as_deref(), Some("https://cdn/a.png"));
    assert!(result.card2_image_url.is_none());
    assert_eq!(result.winner_id, Some(Verdict::Draw));
    assert_eq!(result.field_cards.occupied(), 0);
}

#[test]
fn test_surrender_notice() {
    let push = SessionPush::decode(r#"{"type": "SURRENDER", "winnerId": 7}"#).expect("decodes");
    assert_eq!(push.kind(), "surrender");
    let SessionPush::SurrenderNotice(notice) = push else {
        panic!("expected surrender");
    };
    assert_eq!(notice.winner_id.winner(), Some(PlayerId(7)));
}

#[test]
fn test_untagged_submit_message() {
    let body = r#"{
        "currentTurnPlayerId": 7,
        "fieldCards": {
            "3": {"gameCardId": 101, "imageUrl": "https://cdn/101.png", "isFront": true, "isMine": true},
            "5": null
        },
        "battleCardDto": null,
        "myHandCards": [{"gameCardId": 2, "cardId": 20, "title": "Golem", "attackType": "ROCK",
                         "grade": "A", "power": 40, "imageUrl": "https://cdn/2.png"}]
    }"#;
    let SessionPush::SubmitResult(result) = SessionPush::decode(body).expect("decodes") else {
        panic!("expected submit result");
    };
    assert_eq!(result.current_turn_player_id, PlayerId(7));
    assert_eq!(result.field_cards.occupied(), 1);
    assert!(result.battle_pair.is_none());
    assert_eq!(result.my_hand_cards.map(|h| h.len()), Some(1));
    assert!(result.winner_id.is_none());
}

#[test]
fn test_untagged_submit_message_with_battle_pair() {
    let body = SUBMIT_WITH_BATTLE.replacen(r#""type": "SUBMIT_RESULT","#, "", 1);
    let SessionPush::SubmitResult(result) = SessionPush::decode(&body).expect("decodes") else {
        panic!("expected submit result");
    };
    assert_eq!(
        result.battle_pair.map(|p| p.game_card_id2),
        Some(GameCardId(202))
    );
}

#[test]
fn test_untagged_battle_message_names_battle_winner() {
    let body = r#"{"currentTurnPlayerId": 5, "fieldCards": {}, "winnerId": 5}"#;
    let SessionPush::BattleResolved(result) = SessionPush::decode(body).expect("decodes") else {
        panic!("expected battle result");
    };
    assert_eq!(result.battle_winner_id, Verdict::Winner(PlayerId(5)));
    assert!(result.winner_id.is_none());
    assert_eq!(result.current_turn_player_id, PlayerId(5));
}

#[test]
fn test_untagged_battle_message_with_explicit_battle_winner() {
    let body = r#"{"currentTurnPlayerId": 5, "fieldCards": {}, "battleWinnerId": 0, "winnerId": 5}"#;
    let SessionPush::BattleResolved(result) = SessionPush::decode(body).expect("decodes") else {
        panic!("expected battle result");
    };
    assert_eq!(result.battle_winner_id, Verdict::Draw);
    assert_eq!(result.winner_id, Some(Verdict::Winner(PlayerId(5))));
}

#[test]
fn test_untagged_surrender_notice() {
    let push = SessionPush::decode(r#"{"winnerId": 3}"#).expect("decodes");
    assert_eq!(
        push,
        SessionPush::SurrenderNotice(chimonca_wire::SurrenderNotice {
            winner_id: Verdict::Winner(PlayerId(3)),
        })
    );
}

#[test]
fn test_unrecognized_untagged_shape_is_rejected() {
    assert!(matches!(
        SessionPush::decode(r#"{"emote": "gg"}"#),
        Err(WireError::Json(_))
    ));
    assert!(matches!(SessionPush::decode("[1, 2]"), Err(WireError::Json(_))));
}

#[test]
fn test_unknown_type_is_rejected() {
    let body = r#"{"type": "EMOTE", "emote": "gg"}"#;
    assert!(SessionPush::decode(body).is_err());
}

#[test]
fn test_encode_then_decode_preserves_tag() {
    let push = SessionPush::decode(SUBMIT_WITH_BATTLE).expect("decodes");
    let encoded = push.encode().expect("encodes");
    assert!(encoded.contains(r#""type":"SUBMIT_RESULT""#));
    assert_eq!(SessionPush::decode(&encoded).expect("decodes again"), push);
}

#[test]
fn test_match_success_bodies() {
    assert_eq!(parse_match_success("42").unwrap(), RoomId(42));
    assert_eq!(parse_match_success("\"42\"").unwrap(), RoomId(42));
    assert!(matches!(
        parse_match_success("{\"room\": 42}"),
        Err(WireError::InvalidRoomId(_))
    ));
}

#[test]
fn test_initial_fetch_accepts_legacy_hand_name() {
    let body = r#"{
        "otherPlayer": "rival",
        "myCards": [{"gameCardId": 1, "cardId": 10, "title": "Dragon", "attackType": "FIRE",
                     "grade": "SSR", "power": 90, "imageUrl": "https://cdn/1.png"}],
        "currentTurnPlayerId": 1,
        "player1Id": 1,
        "player2Id": 2
    }"#;
    let info: SessionInfo = serde_json::from_str(body).expect("decodes");
    assert_eq!(info.my_hand_cards.len(), 1);
    assert_eq!(info.field_cards.occupied(), 0);
    assert_eq!(info.opponent_of(PlayerId(1)), Some(PlayerId(2)));
    assert!(!info.is_participant(PlayerId(9)));
}
