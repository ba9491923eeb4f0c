//! Stateless rendering of a session snapshot.

use chimonca_wire::{HandCard, PlacedCard, SlotNumber};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};

use crate::session::{Modal, Outcome, Phase, PlayerSide, SessionSnapshot};

/// Everything one frame needs.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    /// Session state.
    pub snapshot: &'a SessionSnapshot,
    /// Seconds left on the local turn.
    pub turn_remaining: Option<u32>,
    /// Seconds left in the disconnect grace window.
    pub grace_remaining: Option<u32>,
    /// Highlighted hand index.
    pub selected: usize,
    /// Last status message.
    pub status: &'a str,
    /// Whether the leave confirmation is open.
    pub confirming_exit: bool,
}

fn side_color(side: PlayerSide) -> Color {
    match side {
        PlayerSide::Blue => Color::Blue,
        PlayerSide::Red => Color::Red,
    }
}

fn other_side(side: PlayerSide) -> PlayerSide {
    match side {
        PlayerSide::Blue => PlayerSide::Red,
        PlayerSide::Red => PlayerSide::Blue,
    }
}

/// Renders the board, hand, status line and the active modal.
pub fn draw(frame: &mut Frame, view: &View<'_>) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Length(7), // Field
            Constraint::Min(5),    // Hand
            Constraint::Length(3), // Status
        ])
        .split(area);

    draw_header(frame, chunks[0], view);
    draw_field(frame, chunks[1], view.snapshot);
    draw_hand(frame, chunks[2], view);

    let status = Paragraph::new(view.status)
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, chunks[3]);

    if view.confirming_exit {
        draw_popup(
            frame,
            "Leave game?",
            vec![
                Line::from("Leaving now counts as a surrender."),
                Line::from(""),
                Line::from("[y] surrender and leave    [n] stay"),
            ],
            Color::Red,
        );
    } else if let Some(modal) = view.snapshot.modal() {
        draw_modal(frame, modal, view);
    }
}

fn draw_header(frame: &mut Frame, area: Rect, view: &View<'_>) {
    let snapshot = view.snapshot;
    let turn = match snapshot.phase {
        Phase::AwaitingInit => "Loading...".to_string(),
        Phase::MyTurn => match view.turn_remaining {
            Some(secs) => format!("Your turn ({secs}s)"),
            None => "Your turn".to_string(),
        },
        Phase::OpponentTurn => "Opponent's turn".to_string(),
        Phase::BattleInProgress(_) => "Battle!".to_string(),
        Phase::Resolved(_) => "Game over".to_string(),
    };
    let color = snapshot.side.map(side_color).unwrap_or(Color::Cyan);
    let title = Line::from(vec![
        Span::styled(
            format!("Room {} vs {}  ", snapshot.room, snapshot.opponent_name),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(turn, Style::default().fg(color).add_modifier(Modifier::BOLD)),
    ]);
    let header = Paragraph::new(title)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, area);
}

fn draw_field(frame: &mut Frame, area: Rect, snapshot: &SessionSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 6); 6])
        .split(area);

    for (slot, card) in snapshot.field.iter() {
        draw_slot(frame, cols[slot.index()], slot, card, snapshot.side);
    }
}

fn draw_slot(
    frame: &mut Frame,
    area: Rect,
    slot: SlotNumber,
    card: Option<&PlacedCard>,
    side: Option<PlayerSide>,
) {
    let (lines, style) = match card {
        None => (
            vec![Line::from("empty")],
            Style::default().fg(Color::DarkGray),
        ),
        Some(card) => {
            let owner = side.map(|s| if card.is_mine { s } else { other_side(s) });
            let style = Style::default().fg(owner.map(side_color).unwrap_or(Color::White));
            let lines = if card.can_inspect() {
                vec![
                    Line::from(format!(
                        "G{} P{}",
                        card.grade.as_deref().unwrap_or("?"),
                        card.power.map_or_else(|| "?".to_string(), |p| p.to_string())
                    )),
                    Line::from(card.attack_type.clone().unwrap_or_default()),
                    Line::from(if card.is_front { "" } else { "(hidden)" }),
                ]
            } else {
                vec![Line::from("face down")]
            };
            (lines, style)
        }
    };
    let cell = Paragraph::new(lines)
        .style(style)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(format!(" {slot} ")));
    frame.render_widget(cell, area);
}

fn hand_line(index: usize, card: &HandCard, selected: bool) -> Line<'static> {
    let text = format!(
        "[{}] {}  G{} P{} {}",
        index + 1,
        card.title,
        card.grade,
        card.power,
        card.attack_type
    );
    let style = if selected {
        Style::default().bg(Color::White).fg(Color::Black)
    } else {
        Style::default()
    };
    Line::from(Span::styled(text, style))
}

fn draw_hand(frame: &mut Frame, area: Rect, view: &View<'_>) {
    let hand = &view.snapshot.hand;
    let mut lines: Vec<Line> = hand
        .iter()
        .enumerate()
        .map(|(i, card)| hand_line(i, card, i == view.selected))
        .collect();
    if lines.is_empty() {
        lines.push(Line::from("No cards left. Press [b] for a field battle."));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Hand  (←/→ select, Enter play, 1-7 quick play, b battle, r retry, q leave) ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_modal(frame: &mut Frame, modal: Modal<'_>, view: &View<'_>) {
    match modal {
        Modal::Battle(battle) => {
            let result = match battle.result {
                None => "Resolving...".to_string(),
                Some(verdict) => match verdict.winner() {
                    None => "Draw".to_string(),
                    Some(winner) if winner == view.snapshot.local_player => {
                        "Your card wins".to_string()
                    }
                    Some(_) => "Opponent's card wins".to_string(),
                },
            };
            draw_popup(
                frame,
                "Battle",
                vec![
                    Line::from(battle.card1_image_url.clone().unwrap_or_default()),
                    Line::from("vs"),
                    Line::from(battle.card2_image_url.clone().unwrap_or_default()),
                    Line::from(""),
                    Line::from(result),
                    Line::from("[Enter] continue"),
                ],
                Color::Magenta,
            );
        }
        Modal::GameOver(outcome) => {
            let color = match outcome {
                Outcome::Victory => Color::Green,
                Outcome::Defeat => Color::Red,
                Outcome::Draw => Color::Yellow,
            };
            draw_popup(
                frame,
                "Game over",
                vec![
                    Line::from(Span::styled(
                        outcome.to_string(),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    )),
                    Line::from(""),
                    Line::from("[Enter] leave"),
                ],
                color,
            );
        }
        Modal::DisconnectGrace => {
            let remaining = view
                .grace_remaining
                .map_or_else(String::new, |secs| format!(" ({secs}s)"));
            draw_popup(
                frame,
                "Connection lost",
                vec![Line::from(format!("Reconnecting{remaining}..."))],
                Color::Yellow,
            );
        }
    }
}

fn draw_popup(frame: &mut Frame, title: &str, lines: Vec<Line<'_>>, color: Color) {
    let area = center_rect(frame.area(), 50, 10);
    frame.render_widget(Clear, area);
    let popup = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(format!(" {title} ")),
        );
    frame.render_widget(popup, area);
}

fn center_rect(area: Rect, width: u16, height: u16) -> Rect {
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((area.height.saturating_sub(height)) / 2),
            Constraint::Length(height),
            Constraint::Length((area.height.saturating_sub(height)) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length((area.width.saturating_sub(width)) / 2),
            Constraint::Length(width),
            Constraint::Length((area.width.saturating_sub(width)) / 2),
        ])
        .split(vert[1])[1]
}
