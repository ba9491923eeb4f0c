//! Local action failures.

use crate::api::ApiError;

/// Why a local action was refused before any request went out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, derive_more::Error)]
pub enum ActionRejected {
    /// The opponent holds the turn.
    #[display("It is not your turn")]
    NotYourTurn,

    /// A battle is waiting for its result.
    #[display("A battle is in progress")]
    BattlePending,

    /// The game already has a result.
    #[display("The game is over")]
    GameResolved,

    /// The initial snapshot has not arrived yet.
    #[display("The game has not started yet")]
    NotInitialized,

    /// Every field slot is occupied.
    #[display("The field is full")]
    FieldFull,

    /// The nominated card is not in the local hand.
    #[display("That card is not in your hand")]
    CardNotInHand,

    /// No failed battle request is waiting to be re-sent.
    #[display("There is no battle request to retry")]
    NoBattleToRetry,
}

/// Outcome of a local action that did not go through.
#[derive(
    Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error, derive_more::From,
)]
pub enum ActionError {
    /// Refused locally.
    #[display("{}", _0)]
    Rejected(#[error(not(source))] ActionRejected),

    /// Sent, but the server or the network refused it.
    #[display("{}", _0)]
    Request(#[error(not(source))] ApiError),

    /// The session engine is gone.
    #[display("Session closed")]
    #[from(ignore)]
    SessionClosed,
}
