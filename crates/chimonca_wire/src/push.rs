//! Server-pushed session messages.
//!
//! Push bodies carry a full snapshot of the field. Newer servers tag them
//! with a `type` discriminator; older ones send bare shapes that are told
//! apart by their keys. Decoding happens once, here; the state machine only
//! ever sees a [`SessionPush`].

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{BattlePair, FieldSlots, HandCard, PlayerId, RoomId, Verdict, WireError};

/// Result of a card submission, pushed to both players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    /// New turn holder.
    pub current_turn_player_id: PlayerId,
    /// Full field snapshot.
    pub field_cards: FieldSlots,
    /// Pair nominated for a battle, if the submission triggered one.
    #[serde(default, alias = "battleCardDto")]
    pub battle_pair: Option<BattlePair>,
    /// Replacement hand; absent means "keep the current hand".
    #[serde(default)]
    pub my_hand_cards: Option<Vec<HandCard>>,
    /// Terminal decision, if the game ended.
    #[serde(default)]
    pub winner_id: Option<Verdict>,
}

/// Outcome of a battle, pushed to both players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleResolved {
    /// New turn holder.
    pub current_turn_player_id: PlayerId,
    /// Full field snapshot after the battle.
    pub field_cards: FieldSlots,
    /// Who won the battle.
    pub battle_winner_id: Verdict,
    /// Artwork of the first card, for clients that did not see the pair.
    #[serde(default, alias = "card1Art")]
    pub card1_image_url: Option<String>,
    /// Artwork of the second card.
    #[serde(default, alias = "card2Art")]
    pub card2_image_url: Option<String>,
    /// Terminal decision, if the battle ended the game.
    #[serde(default)]
    pub winner_id: Option<Verdict>,
}

/// A player forfeited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurrenderNotice {
    /// The remaining player.
    pub winner_id: Verdict,
}

/// Battle message of servers that send no `type` tag. Its `winnerId` is the
/// battle winner, not a game verdict.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UntaggedBattle {
    current_turn_player_id: PlayerId,
    field_cards: FieldSlots,
    winner_id: Verdict,
    #[serde(default)]
    card1_image_url: Option<String>,
    #[serde(default)]
    card2_image_url: Option<String>,
}

impl From<UntaggedBattle> for BattleResolved {
    fn from(battle: UntaggedBattle) -> Self {
        Self {
            current_turn_player_id: battle.current_turn_player_id,
            field_cards: battle.field_cards,
            battle_winner_id: battle.winner_id,
            card1_image_url: battle.card1_image_url,
            card2_image_url: battle.card2_image_url,
            winner_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Tagged,
    Submit,
    Battle,
    UntaggedBattle,
    Surrender,
}

impl Shape {
    fn of(fields: &serde_json::Map<String, serde_json::Value>) -> Option<Self> {
        let has = |key: &str| fields.contains_key(key);
        let submit_only = has("battleCardDto") || has("battlePair") || has("myHandCards");
        if has("type") {
            Some(Self::Tagged)
        } else if has("battleWinnerId") {
            Some(Self::Battle)
        } else if has("fieldCards") && submit_only {
            Some(Self::Submit)
        } else if has("fieldCards") && has("winnerId") {
            Some(Self::UntaggedBattle)
        } else if has("fieldCards") {
            Some(Self::Submit)
        } else if has("winnerId") {
            Some(Self::Surrender)
        } else {
            None
        }
    }
}

/// Closed set of session messages the server may push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPush {
    /// A card was submitted.
    SubmitResult(SubmitResult),
    /// A battle finished.
    #[serde(rename = "BATTLE_RESULT")]
    BattleResolved(BattleResolved),
    /// A player surrendered.
    #[serde(rename = "SURRENDER")]
    SurrenderNotice(SurrenderNotice),
}

impl SessionPush {
    /// Decodes a push body.
    ///
    /// A `type` tag selects the variant when present. Untagged bodies are
    /// classified by their keys: `battleWinnerId` marks a battle result,
    /// `battleCardDto`/`myHandCards` mark a submit result, a field snapshot
    /// with only `winnerId` is a battle result naming the battle winner, and
    /// a bare `winnerId` is a surrender notice.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Json`] for unknown `type` tags, unrecognized
    /// shapes, or fields that do not match the selected variant.
    #[instrument(skip(body), fields(len = body.len()))]
    pub fn decode(body: &str) -> Result<Self, WireError> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        let shape = value
            .as_object()
            .and_then(Shape::of)
            .ok_or_else(|| WireError::Json("unrecognized push shape".to_string()))?;
        let push = match shape {
            Shape::Tagged => serde_json::from_value(value)?,
            Shape::Submit => Self::SubmitResult(serde_json::from_value(value)?),
            Shape::Battle => Self::BattleResolved(serde_json::from_value(value)?),
            Shape::UntaggedBattle => {
                let battle: UntaggedBattle = serde_json::from_value(value)?;
                Self::BattleResolved(battle.into())
            }
            Shape::Surrender => Self::SurrenderNotice(serde_json::from_value(value)?),
        };
        debug!(kind = push.kind(), ?shape, "Decoded session push");
        Ok(push)
    }

    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubmitResult(_) => "submit_result",
            Self::BattleResolved(_) => "battle_resolved",
            Self::SurrenderNotice(_) => "surrender",
        }
    }

    /// Encodes the push as JSON (used by test brokers and replays).
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decodes the body of a match-success push into the room identifier.
///
/// The server sends either a bare JSON number or a quoted number.
///
/// # Errors
///
/// Returns [`WireError::InvalidRoomId`] for anything else.
#[instrument(skip(body))]
pub fn parse_match_success(body: &str) -> Result<RoomId, WireError> {
    let value: serde_json::Value = serde_json::from_str(body.trim())?;
    let raw = match &value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    raw.map(RoomId)
        .ok_or_else(|| WireError::InvalidRoomId(body.to_string()))
}
