//! Game session engine.

mod driver;
mod error;
mod machine;
mod snapshot;

pub use driver::{
    SessionConfig, SessionDriver, SessionError, SessionHandle, SessionNotice, player_queue,
    room_topic,
};
pub use error::{ActionError, ActionRejected};
pub use machine::{Effect, FailedRequest, LocalAction, SessionInput, SessionMachine};
pub use snapshot::{BattleDisplay, Modal, Outcome, Phase, PlayerSide, SessionSnapshot};
