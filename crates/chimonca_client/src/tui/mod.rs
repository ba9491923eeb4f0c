//! Terminal front end for a running session.

mod ui;

use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::guard::{ExitDecision, ExitPrompt, NavigationGuard};
use crate::session::{ActionError, Modal, SessionHandle, SessionNotice};
use ui::View;

type Tui = Terminal<CrosstermBackend<Stdout>>;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs the session screen until the user leaves.
#[instrument(skip_all)]
pub async fn run_session(
    handle: SessionHandle,
    mut notices: mpsc::UnboundedReceiver<SessionNotice>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(&mut terminal, &handle, &mut notices).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!("Session screen closed");
    result
}

fn describe(notice: &SessionNotice) -> String {
    match notice {
        SessionNotice::Rejected(reason) => reason.to_string(),
        SessionNotice::RequestFailed {
            action: "battle",
            error,
        } => format!("battle failed: {error} (r to retry)"),
        SessionNotice::RequestFailed { action, error } => format!("{action} failed: {error}"),
        SessionNotice::Finished(outcome) => format!("{outcome}!"),
    }
}

fn feedback(result: Result<(), ActionError>, done: &str) -> String {
    match result {
        Ok(()) => done.to_string(),
        Err(e) => e.to_string(),
    }
}

async fn event_loop(
    terminal: &mut Tui,
    handle: &SessionHandle,
    notices: &mut mpsc::UnboundedReceiver<SessionNotice>,
) -> Result<()> {
    let guard = NavigationGuard::new(handle.clone());
    let mut selected = 0usize;
    let mut status = String::from("Loading game...");

    loop {
        while let Ok(notice) = notices.try_recv() {
            status = describe(&notice);
        }
        let snapshot = handle.snapshot();
        selected = selected.min(snapshot.hand.len().saturating_sub(1));

        terminal.draw(|frame| {
            ui::draw(
                frame,
                &View {
                    snapshot: &snapshot,
                    turn_remaining: handle.turn_remaining(),
                    grace_remaining: handle.grace_remaining(),
                    selected,
                    status: &status,
                    confirming_exit: false,
                },
            )
        })?;

        if !event::poll(POLL_INTERVAL)? {
            tokio::task::yield_now().await;
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        debug!(code = ?key.code, "Key pressed");

        let play_index = match key.code {
            KeyCode::Char(c @ '1'..='9') => Some(c as usize - '1' as usize),
            KeyCode::Enter if snapshot.modal().is_none() => Some(selected),
            _ => None,
        };
        if let Some(index) = play_index {
            match snapshot.hand.get(index) {
                Some(card) => {
                    selected = index;
                    status = feedback(handle.submit_card(card.game_card_id).await, "Card played");
                }
                None => status = "No card in that position".to_string(),
            }
            continue;
        }

        let quit = matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL));

        match key.code {
            KeyCode::Left => selected = selected.saturating_sub(1),
            KeyCode::Right if selected + 1 < snapshot.hand.len() => selected += 1,
            KeyCode::Enter => match snapshot.modal() {
                Some(Modal::GameOver(_)) => return Ok(()),
                Some(Modal::Battle(_)) => {
                    if let Err(e) = handle.acknowledge().await {
                        status = e.to_string();
                    }
                }
                _ => {}
            },
            KeyCode::Char('b') => {
                status = feedback(handle.trigger_field_battle().await, "Field battle requested");
            }
            KeyCode::Char('r') => {
                status = feedback(handle.retry_battle().await, "Battle request re-sent");
            }
            _ if quit => {
                let mut prompt = TerminalPrompt {
                    terminal: &mut *terminal,
                    handle,
                    status: &status,
                    selected,
                };
                match guard.request_exit(&mut prompt).await {
                    ExitDecision::Leave { surrendered } => {
                        info!(surrendered, "Leaving session");
                        return Ok(());
                    }
                    ExitDecision::Stay => status = "Back to the game".to_string(),
                }
            }
            _ => {}
        }
    }
}

/// Leave confirmation drawn over the board.
struct TerminalPrompt<'a> {
    terminal: &'a mut Tui,
    handle: &'a SessionHandle,
    status: &'a str,
    selected: usize,
}

impl TerminalPrompt<'_> {
    fn ask(&mut self) -> io::Result<bool> {
        loop {
            let snapshot = self.handle.snapshot();
            self.terminal.draw(|frame| {
                ui::draw(
                    frame,
                    &View {
                        snapshot: &snapshot,
                        turn_remaining: self.handle.turn_remaining(),
                        grace_remaining: self.handle.grace_remaining(),
                        selected: self.selected,
                        status: self.status,
                        confirming_exit: true,
                    },
                )
            })?;
            if !event::poll(POLL_INTERVAL)? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => return Ok(true),
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => return Ok(false),
                    _ => {}
                }
            }
        }
    }
}

#[async_trait]
impl ExitPrompt for TerminalPrompt<'_> {
    async fn confirm_exit(&mut self) -> bool {
        self.ask().unwrap_or_else(|e| {
            warn!(error = %e, "Exit prompt failed; staying");
            false
        })
    }
}
