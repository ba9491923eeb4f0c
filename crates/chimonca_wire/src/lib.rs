//! Chimonca wire protocol - everything that crosses the network boundary.
//!
//! The session engine never sees raw JSON or raw STOMP text. Inbound data is
//! decoded here, once, into closed types:
//!
//! - **Identifiers**: [`PlayerId`], [`RoomId`], [`GameCardId`], [`CardId`]
//! - **Cards**: [`HandCard`], [`PlacedCard`], [`BattlePair`] and the six-slot [`FieldSlots`] map
//! - **REST**: the [`ApiResponse`] envelope, request bodies and the initial [`SessionInfo`]
//! - **Push**: the [`SessionPush`] union and match-success bodies
//! - **STOMP**: [`StompFrame`] encode/decode for the push channel

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod card;
mod envelope;
mod error;
mod ids;
mod push;
mod requests;
mod session;
mod stomp;

pub use card::{BattlePair, FieldSlots, HandCard, PlacedCard, SlotNumber};
pub use envelope::ApiResponse;
pub use error::WireError;
pub use ids::{CardId, GameCardId, PlayerId, RoomId, Verdict};
pub use push::{
    BattleResolved, SessionPush, SubmitResult, SurrenderNotice, parse_match_success,
};
pub use requests::{BattleRequest, FieldBattleRequest, JoinQueueRequest, SubmitCardRequest, SurrenderRequest};
pub use session::SessionInfo;
pub use stomp::{StompCommand, StompFrame};
