//! Read-only views handed to renderers.

use std::sync::Arc;

use chimonca_wire::{BattlePair, FieldSlots, HandCard, PlayerId, RoomId, Verdict};

/// Coarse session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the initial fetch.
    AwaitingInit,
    /// The local player may act.
    MyTurn,
    /// The opponent may act.
    OpponentTurn,
    /// A battle pair was nominated and awaits its result.
    BattleInProgress(BattlePair),
    /// Terminal.
    Resolved(Verdict),
}

impl Phase {
    /// Whether the game has a result.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Which colour the local player plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum PlayerSide {
    /// Player one.
    #[display("blue")]
    Blue,
    /// Player two.
    #[display("red")]
    Red,
}

/// The game result from the local player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Outcome {
    /// The local player won.
    #[display("Victory")]
    Victory,
    /// The opponent won.
    #[display("Defeat")]
    Defeat,
    /// Nobody won.
    #[display("Draw")]
    Draw,
}

impl Outcome {
    /// Interprets a verdict for `local`.
    pub fn for_player(verdict: Verdict, local: PlayerId) -> Self {
        match verdict {
            Verdict::Draw => Self::Draw,
            Verdict::Winner(winner) if winner == local => Self::Victory,
            Verdict::Winner(_) => Self::Defeat,
        }
    }
}

/// What the battle modal shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BattleDisplay {
    /// Artwork of the first card.
    pub card1_image_url: Option<String>,
    /// Artwork of the second card.
    pub card2_image_url: Option<String>,
    /// Battle result; `None` while it is being resolved.
    pub result: Option<Verdict>,
}

/// The single modal a renderer should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal<'a> {
    /// Battle animation and result.
    Battle(&'a BattleDisplay),
    /// Final result.
    GameOver(Outcome),
    /// The channel is down and the grace countdown runs.
    DisconnectGrace,
}

/// Immutable picture of a session. Every update replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Room identifier.
    pub room: RoomId,
    /// The local player.
    pub local_player: PlayerId,
    /// Opponent display name, empty until initialized.
    pub opponent_name: String,
    /// Local colour, known after initialization.
    pub side: Option<PlayerSide>,
    /// Current phase.
    pub phase: Phase,
    /// Who may act.
    pub turn_holder: Option<PlayerId>,
    /// Board.
    pub field: Arc<FieldSlots>,
    /// Local hand.
    pub hand: Arc<Vec<HandCard>>,
    /// Pending or finished battle awaiting acknowledgement.
    pub battle: Option<BattleDisplay>,
    /// Whether the disconnect grace overlay is up.
    pub disconnect_grace: bool,
}

impl SessionSnapshot {
    /// Whether the game has a result.
    pub fn is_resolved(&self) -> bool {
        self.phase.is_resolved()
    }

    /// Whether the local player may act.
    pub fn is_my_turn(&self) -> bool {
        self.phase == Phase::MyTurn
    }

    /// Final result for the local player.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            Phase::Resolved(verdict) => Some(Outcome::for_player(verdict, self.local_player)),
            _ => None,
        }
    }

    /// Modal to show: battle first, then game over, then the grace overlay.
    pub fn modal(&self) -> Option<Modal<'_>> {
        if let Some(battle) = &self.battle {
            return Some(Modal::Battle(battle));
        }
        if let Some(outcome) = self.outcome() {
            return Some(Modal::GameOver(outcome));
        }
        self.disconnect_grace.then_some(Modal::DisconnectGrace)
    }
}
