use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use weft_types::events::{ConnectionState, EventPayload, SystemEvent};

const MAX_LOG_ENTRIES: usize = 200;

pub enum UiMessage {
    Event(SystemEvent),
}

#[derive(Debug, Default)]
struct Counters {
    viewers: usize,
    activations: u64,
    snapshots: u64,
}

impl Counters {
    fn observe(&mut self, event: &SystemEvent) {
        match &event.payload {
            EventPayload::Connection(conn) => self.viewers = conn.live_connections,
            EventPayload::Activation(_) => self.activations += 1,
            EventPayload::Snapshot(_) => self.snapshots += 1,
            EventPayload::Lifecycle(_) => {}
        }
    }
}

pub fn run(receiver: Receiver<UiMessage>, summary: String) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    summary: &str,
) -> Result<()> {
    let mut logs: VecDeque<String> = VecDeque::with_capacity(MAX_LOG_ENTRIES);
    let mut counters = Counters::default();

    loop {
        let mut closed = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => {
                    counters.observe(&event);
                    if logs.len() == MAX_LOG_ENTRIES {
                        logs.pop_front();
                    }
                    logs.push_back(format_event(&event));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "weft",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(summary),
                Span::raw("  "),
                Span::styled("viewers", Style::default().fg(Color::Magenta)),
                Span::raw(format!(" {}  ", counters.viewers)),
                Span::styled("activations", Style::default().fg(Color::Magenta)),
                Span::raw(format!(" {}  ", counters.activations)),
                Span::styled("snapshots", Style::default().fg(Color::Magenta)),
                Span::raw(format!(" {}  ", counters.snapshots)),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(" quits"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Coordinator"));
            f.render_widget(header, chunks[0]);

            let items: Vec<ListItem> = logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("Recent events"));
            f.render_widget(list, chunks[1]);
        })?;

        if closed {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn format_event(event: &SystemEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "[{}] {:?} {}",
            timestamp,
            lifecycle.phase,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Activation(activation) => format!(
            "[{}] activate index={} delivered={} skipped={} failed={}",
            timestamp, activation.index, activation.delivered, activation.skipped, activation.failed
        ),
        EventPayload::Connection(conn) => {
            let verb = match conn.state {
                ConnectionState::Opened => "joined",
                ConnectionState::Closed => "left",
            };
            format!(
                "[{}] viewer #{} {} ({} live)",
                timestamp, conn.connection_id, verb, conn.live_connections
            )
        }
        EventPayload::Snapshot(snapshot) => format!(
            "[{}] snapshot id={} nfc={} texture={} {}B",
            timestamp,
            snapshot.id,
            snapshot.nfc_index,
            snapshot.texture_name.as_deref().unwrap_or("-"),
            snapshot.size
        ),
    }
}
