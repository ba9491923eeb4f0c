//! Outbound request bodies.

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{CardId, GameCardId, PlayerId};

/// Body of the join-queue request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct JoinQueueRequest {
    /// The local player.
    pub player_id: PlayerId,
    /// Exactly the staged deck.
    pub card_ids: Vec<CardId>,
}

/// Body of the submit-card request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCardRequest {
    /// The submitting player.
    pub player_id: PlayerId,
    /// Card leaving the hand.
    pub game_card_id: GameCardId,
}

/// Body of the battle-resolution request for a nominated pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct BattleRequest {
    /// The requesting player.
    pub player_id: PlayerId,
    /// First nominated card.
    pub game_card_id1: GameCardId,
    /// Second nominated card.
    pub game_card_id2: GameCardId,
}

/// Body of the field-battle request (no explicit pair; the server picks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct FieldBattleRequest {
    /// The requesting player.
    pub player_id: PlayerId,
}

/// Body of the surrender request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct SurrenderRequest {
    /// The forfeiting player.
    pub player_id: PlayerId,
}
