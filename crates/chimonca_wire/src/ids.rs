//! Strongly typed identifiers.

use serde::{Deserialize, Serialize};

/// Identifier of a participant (the server's user id).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    derive_more::Display, derive_more::From,
)]
#[serde(transparent)]
pub struct PlayerId(pub i64);

/// Identifier of a game room (one session).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    derive_more::Display, derive_more::From,
)]
#[serde(transparent)]
pub struct RoomId(pub i64);

/// Identifier of a card instance inside one game.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    derive_more::Display, derive_more::From,
)]
#[serde(transparent)]
pub struct GameCardId(pub i64);

/// Identifier of a card in the catalog (the staged deck refers to these).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    derive_more::Display, derive_more::From,
)]
#[serde(transparent)]
pub struct CardId(pub i64);

/// Decision carried by `winnerId` / `battleWinnerId` fields.
///
/// The server encodes a draw as `0` and a win as the winner's player id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Verdict {
    /// Nobody won.
    Draw,
    /// The given participant won.
    Winner(PlayerId),
}

impl Verdict {
    /// Returns the winning player, if any.
    pub fn winner(self) -> Option<PlayerId> {
        match self {
            Self::Draw => None,
            Self::Winner(id) => Some(id),
        }
    }
}

impl From<i64> for Verdict {
    fn from(raw: i64) -> Self {
        if raw == 0 {
            Self::Draw
        } else {
            Self::Winner(PlayerId(raw))
        }
    }
}

impl From<Verdict> for i64 {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Draw => 0,
            Verdict::Winner(PlayerId(id)) => id,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draw => write!(f, "draw"),
            Self::Winner(id) => write!(f, "player {}", id),
        }
    }
}
