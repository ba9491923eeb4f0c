//! Chimonca client - game session synchronization engine.
//!
//! Matchmaking, a reconnecting STOMP push channel and the session state
//! machine that keeps the board in step with server pushes.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod channel;
pub mod config;
pub mod guard;
pub mod matchmaking;
pub mod session;
pub mod tui;
pub mod turn_clock;

pub use api::{ApiError, GameApi, RestGameApi};
pub use channel::{
    ChannelClient, ChannelConfig, ChannelError, ChannelEvent, ConnectionHandle, ConnectionState,
    Connector, MemoryBroker, Subscription, Transport, WebSocketConnector,
};
pub use config::{ClientConfig, ConfigError};
pub use guard::{ExitDecision, ExitPrompt, Forfeitable, NavigationGuard, UNLOAD_WARNING};
pub use matchmaking::{MatchError, MatchState, Matchmaker, match_success_destination};
pub use session::{
    ActionError, ActionRejected, BattleDisplay, Effect, FailedRequest, LocalAction, Modal,
    Outcome, Phase, PlayerSide, SessionConfig, SessionDriver, SessionError, SessionHandle,
    SessionInput, SessionMachine, SessionNotice, SessionSnapshot,
};
pub use turn_clock::TurnClock;
