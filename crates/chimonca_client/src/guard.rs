//! Exit protection for an unresolved session.
//!
//! Leaving an unresolved game forfeits it: the guard asks for confirmation
//! and, once confirmed, surrenders before letting the caller go.

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::session::{ActionError, SessionHandle};

/// Warning shown when the process is about to exit mid-game.
pub const UNLOAD_WARNING: &str = "The game is still running. Leaving now forfeits the match.";

/// The slice of a session the guard needs.
#[async_trait]
pub trait Forfeitable: Send + Sync {
    /// Whether the game already has a result.
    fn is_resolved(&self) -> bool;

    /// Concedes the game.
    async fn forfeit(&self) -> Result<(), ActionError>;
}

#[async_trait]
impl Forfeitable for SessionHandle {
    fn is_resolved(&self) -> bool {
        self.snapshot().is_resolved()
    }

    async fn forfeit(&self) -> Result<(), ActionError> {
        self.surrender().await
    }
}

/// Asks the user whether to leave.
#[async_trait]
pub trait ExitPrompt: Send {
    /// Returns `true` to leave, `false` to stay.
    async fn confirm_exit(&mut self) -> bool;
}

/// Result of an exit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Navigation may proceed.
    Leave {
        /// Whether a surrender was acknowledged on the way out.
        surrendered: bool,
    },
    /// The user chose to stay.
    Stay,
}

/// Blocks exits while the session is unresolved.
#[derive(Debug, Clone)]
pub struct NavigationGuard<S> {
    session: S,
}

impl<S: Forfeitable> NavigationGuard<S> {
    /// Guards `session`.
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// Whether an exit would currently be intercepted.
    pub fn is_blocking(&self) -> bool {
        !self.session.is_resolved()
    }

    /// Handles an exit attempt.
    #[instrument(skip_all)]
    pub async fn request_exit<P>(&self, prompt: &mut P) -> ExitDecision
    where
        P: ExitPrompt + ?Sized,
    {
        if !self.is_blocking() {
            debug!("Session resolved; exit unobstructed");
            return ExitDecision::Leave { surrendered: false };
        }
        if !prompt.confirm_exit().await {
            debug!("Exit cancelled");
            return ExitDecision::Stay;
        }
        match self.session.forfeit().await {
            Ok(()) => {
                info!("Surrendered on exit");
                ExitDecision::Leave { surrendered: true }
            }
            Err(e) => {
                warn!(error = %e, "Surrender on exit failed; leaving anyway");
                ExitDecision::Leave { surrendered: false }
            }
        }
    }

    /// Warning for a process exit; issues no requests.
    pub fn unload_warning(&self) -> Option<&'static str> {
        self.is_blocking().then_some(UNLOAD_WARNING)
    }
}
