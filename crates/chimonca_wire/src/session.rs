//! Initial session snapshot returned by `GET game/{roomId}`.

use serde::{Deserialize, Serialize};

use crate::{FieldSlots, HandCard, PlayerId};

/// Everything the client needs to enter a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Opponent display name.
    pub other_player: String,
    /// The local hand.
    #[serde(alias = "myCards")]
    pub my_hand_cards: Vec<HandCard>,
    /// Who may act now.
    pub current_turn_player_id: PlayerId,
    /// Player one (blue side).
    pub player1_id: PlayerId,
    /// Player two (red side).
    pub player2_id: PlayerId,
    /// Field snapshot; older servers omit it on a fresh room.
    #[serde(default)]
    pub field_cards: FieldSlots,
}

impl SessionInfo {
    /// Whether the given player takes part in this session.
    pub fn is_participant(&self, player: PlayerId) -> bool {
        player == self.player1_id || player == self.player2_id
    }

    /// The other participant, seen from `player`.
    pub fn opponent_of(&self, player: PlayerId) -> Option<PlayerId> {
        if player == self.player1_id {
            Some(self.player2_id)
        } else if player == self.player2_id {
            Some(self.player1_id)
        } else {
            None
        }
    }
}
