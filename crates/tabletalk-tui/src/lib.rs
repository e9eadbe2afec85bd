// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use crossterm::event::{self, Event, KeyCode, KeyEvent};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tabletalk_app::{
    AppCommand, AppMode, AppState, ChatAuthor, ChatEntry, PAGE_SIZES, PickerPhase, RemoteEvent,
    ResultSet, SchemaPicker, TableProjection, ViewState, project,
};
use time::OffsetDateTime;

const TYPING_FRAME_DELAY: Duration = Duration::from_millis(500);
const RESULT_SETTLE_DELAY: Duration = Duration::from_millis(500);
const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);
const TYPING_FRAMES: usize = 3;
const SORT_MARK_ASC: &str = "↑";
const SORT_MARK_DESC: &str = "↓";

/// The session surface the UI drives: outbound commands, inbound event
/// drainage, and read access to the authoritative result set. Implemented by
/// the binary over a live session, and by test doubles here.
pub trait SessionRuntime {
    fn send_chat(&mut self, text: &str) -> Result<()>;
    fn request_schema_context(&mut self) -> Result<()>;
    fn commit_schema_context(&mut self, tables: &[String]) -> Result<()>;
    fn poll_remote(&mut self) -> Vec<RemoteEvent>;
    /// Promote the reply's staged result set. True when a new generation
    /// (possibly empty) replaced the current one.
    fn apply_pending_result(&mut self) -> bool;
    fn result_set(&self) -> &ResultSet;
}

/// The repeating typing animation, owned by exactly one pending chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypingIndicator {
    frame: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ChatUiState {
    input: String,
    transcript: Vec<ChatEntry>,
    typing: Option<TypingIndicator>,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct TableUiState {
    view: ViewState,
    selected_col: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct PickerUiState {
    picker: SchemaPicker,
    cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    TypingTick { token: u64 },
    ApplyResult { token: u64 },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewData {
    chat: ChatUiState,
    table: TableUiState,
    picker: PickerUiState,
    /// Render snapshot of the session's current result set; refreshed after
    /// every applied generation. The session stays the single writer.
    result: ResultSet,
    notice: Option<String>,
    status_token: u64,
    typing_token: u64,
    apply_token: u64,
}

/// Presentation knobs the binary resolves from config before the loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiOptions {
    pub page_size: usize,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            page_size: tabletalk_app::DEFAULT_PAGE_SIZE,
        }
    }
}

pub fn run_app<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    options: UiOptions,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    view_data.table.view.set_page_size(options.page_size);
    let (internal_tx, internal_rx) = mpsc::channel();

    let mut result = Ok(());
    loop {
        handle_remote_events(state, runtime, &mut view_data, &internal_tx);
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn handle_remote_events<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    for event in runtime.poll_remote() {
        handle_remote_event(state, view_data, tx, event);
    }
}

fn handle_remote_event(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    event: RemoteEvent,
) {
    match event {
        RemoteEvent::Connected => {
            state.dispatch(AppCommand::MarkConnected);
            view_data.status_token += 1;
            schedule_status_clear(tx, view_data.status_token);
        }
        RemoteEvent::Reply { text, .. } => {
            // Reply dismisses the typing indicator before anything else.
            stop_typing(view_data);
            view_data
                .chat
                .transcript
                .push(ChatEntry::bot(text, OffsetDateTime::now_utc()));
            schedule_result_apply(view_data, tx);
        }
        RemoteEvent::SchemaSnapshot { tables, selected } => {
            let count = tables.len();
            if view_data.picker.picker.apply_snapshot(tables, &selected) {
                view_data.picker.cursor = 0;
                emit_status(state, view_data, tx, format!("schema loaded ({count} tables)"));
            }
        }
        RemoteEvent::SelectionConfirmed { tables } => {
            view_data.chat.transcript.push(ChatEntry::bot_markup(
                render_confirmation_message(&tables),
                OffsetDateTime::now_utc(),
            ));
        }
        RemoteEvent::FrameDropped { detail } => {
            emit_status(state, view_data, tx, format!("dropped malformed frame: {detail}"));
        }
        RemoteEvent::Closed { reason } => {
            stop_typing(view_data);
            view_data.notice = Some(format!("connection closed: {reason}"));
            state.dispatch(AppCommand::MarkClosed(reason));
        }
    }
}

fn process_internal_events<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        handle_internal_event(state, runtime, view_data, tx, event);
    }
}

fn handle_internal_event<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    event: InternalEvent,
) {
    match event {
        InternalEvent::ClearStatus { token } if token == view_data.status_token => {
            state.dispatch(AppCommand::ClearStatus);
        }
        InternalEvent::ClearStatus { .. } => {}
        InternalEvent::TypingTick { token } => {
            if token != view_data.typing_token {
                return;
            }
            if let Some(typing) = &mut view_data.chat.typing {
                typing.frame = typing.frame % TYPING_FRAMES + 1;
                schedule_typing_tick(tx, token);
            }
        }
        InternalEvent::ApplyResult { token } => {
            if token != view_data.apply_token {
                return;
            }
            if runtime.apply_pending_result() {
                view_data.result = runtime.result_set().clone();
                view_data.table.view.reset();
                view_data.table.selected_col = 0;
                let message = if view_data.result.is_empty() {
                    "query returned no rows".to_owned()
                } else {
                    format!("table updated ({} rows)", view_data.result.len())
                };
                emit_status(state, view_data, tx, message);
            }
        }
    }
}

fn schedule_status_clear(tx: &Sender<InternalEvent>, token: u64) {
    let sender = tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn schedule_typing_tick(tx: &Sender<InternalEvent>, token: u64) {
    let sender = tx.clone();
    thread::spawn(move || {
        thread::sleep(TYPING_FRAME_DELAY);
        let _ = sender.send(InternalEvent::TypingTick { token });
    });
}

/// Stage the deferred continuation between showing the reply and moving the
/// table: the reply text is already on screen when the update lands.
fn schedule_result_apply(view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    view_data.apply_token += 1;
    let token = view_data.apply_token;
    let sender = tx.clone();
    thread::spawn(move || {
        thread::sleep(RESULT_SETTLE_DELAY);
        let _ = sender.send(InternalEvent::ApplyResult { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token += 1;
    schedule_status_clear(tx, view_data.status_token);
}

/// Start the typing animation for the turn just sent. At most one indicator
/// is ever active; a second start while one runs is a caller bug.
fn start_typing(view_data: &mut ViewData, tx: &Sender<InternalEvent>) -> Result<()> {
    if view_data.chat.typing.is_some() {
        bail!("typing indicator already active");
    }
    view_data.chat.typing = Some(TypingIndicator { frame: 1 });
    view_data.typing_token += 1;
    schedule_typing_tick(tx, view_data.typing_token);
    Ok(())
}

fn stop_typing(view_data: &mut ViewData) {
    view_data.chat.typing = None;
    // Invalidate ticks already in flight.
    view_data.typing_token += 1;
}

fn handle_key_event<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    // A dead connection blocks everything except leaving.
    if view_data.notice.is_some() {
        return matches!(key.code, KeyCode::Char('q') | KeyCode::Esc);
    }

    match state.mode {
        AppMode::Nav => handle_nav_key(state, runtime, view_data, tx, key),
        AppMode::ChatInput => {
            handle_chat_input_key(state, runtime, view_data, tx, key);
            false
        }
        AppMode::Search => {
            handle_search_key(state, view_data, key);
            false
        }
        AppMode::Picker => {
            handle_picker_key(state, runtime, view_data, tx, key);
            false
        }
    }
}

fn handle_nav_key<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('i') | KeyCode::Enter => {
            state.dispatch(AppCommand::EnterChatInput);
        }
        KeyCode::Char('/') => {
            state.dispatch(AppCommand::EnterSearch);
        }
        KeyCode::Char('g') => open_schema_picker(state, runtime, view_data, tx),
        KeyCode::Char('s') => cycle_sort(state, view_data, tx),
        KeyCode::Left => move_selected_column(view_data, -1),
        KeyCode::Right => move_selected_column(view_data, 1),
        KeyCode::Char('n') | KeyCode::PageDown => next_page(state, view_data, tx),
        KeyCode::Char('p') | KeyCode::PageUp => prev_page(state, view_data, tx),
        KeyCode::Char('+') => step_page_size(state, view_data, tx, 1),
        KeyCode::Char('-') => step_page_size(state, view_data, tx, -1),
        _ => {}
    }
    false
}

fn handle_chat_input_key<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Enter => submit_chat_input(state, runtime, view_data, tx),
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Backspace => {
            view_data.chat.input.pop();
        }
        KeyCode::Char(ch) => view_data.chat.input.push(ch),
        _ => {}
    }
}

fn handle_search_key(state: &mut AppState, view_data: &mut ViewData, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Enter => {
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Backspace => {
            let mut query = view_data.table.view.query().to_owned();
            query.pop();
            view_data.table.view.set_query(query);
        }
        KeyCode::Char(ch) => {
            let mut query = view_data.table.view.query().to_owned();
            query.push(ch);
            view_data.table.view.set_query(query);
        }
        _ => {}
    }
}

fn handle_picker_key<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            view_data.picker.picker.cancel();
            state.dispatch(AppCommand::ClosePicker);
            emit_status(state, view_data, tx, "schema selection discarded");
        }
        KeyCode::Up => {
            view_data.picker.cursor = view_data.picker.cursor.saturating_sub(1);
        }
        KeyCode::Down => {
            let last = view_data.picker.picker.tables().len().saturating_sub(1);
            view_data.picker.cursor = (view_data.picker.cursor + 1).min(last);
        }
        KeyCode::Char(' ') => {
            let cursor = view_data.picker.cursor;
            if view_data.picker.picker.toggle(cursor).is_none()
                && view_data.picker.picker.phase() == PickerPhase::AwaitingSnapshot
            {
                emit_status(state, view_data, tx, "schema still loading");
            }
        }
        KeyCode::Enter => save_schema_selection(state, runtime, view_data, tx),
        _ => {}
    }
}

fn open_schema_picker<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    view_data.picker.picker.open();
    view_data.picker.cursor = 0;
    state.dispatch(AppCommand::OpenPicker);

    if let Err(error) = runtime.request_schema_context() {
        view_data.picker.picker.cancel();
        state.dispatch(AppCommand::ExitToNav);
        emit_status(state, view_data, tx, format!("schema request failed: {error}"));
    }
}

fn save_schema_selection<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    match view_data.picker.picker.save() {
        Some(tables) => {
            state.dispatch(AppCommand::ClosePicker);
            match runtime.commit_schema_context(&tables) {
                Ok(()) => {
                    emit_status(
                        state,
                        view_data,
                        tx,
                        format!("schema context saved ({} tables)", tables.len()),
                    );
                }
                Err(error) => {
                    emit_status(state, view_data, tx, format!("schema save failed: {error}"));
                }
            }
        }
        // No snapshot yet: the save is refused, not queued.
        None => emit_status(state, view_data, tx, "schema still loading; esc cancels"),
    }
}

fn submit_chat_input<R: SessionRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let text = view_data.chat.input.trim().to_owned();
    if text.is_empty() {
        return;
    }
    if view_data.chat.typing.is_some() {
        emit_status(state, view_data, tx, "still waiting for the last reply");
        return;
    }

    match runtime.send_chat(&text) {
        Ok(()) => {
            view_data
                .chat
                .transcript
                .push(ChatEntry::user(text, OffsetDateTime::now_utc()));
            view_data.chat.input.clear();
            if let Err(error) = start_typing(view_data, tx) {
                emit_status(state, view_data, tx, error.to_string());
            }
        }
        Err(error) => emit_status(state, view_data, tx, format!("send failed: {error}")),
    }
}

fn cycle_sort(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let headers = view_data.result.headers();
    if headers.is_empty() {
        emit_status(state, view_data, tx, "sort unavailable");
        return;
    }
    let column = headers[view_data.table.selected_col.min(headers.len() - 1)].clone();
    let direction = view_data.table.view.toggle_sort(&column);
    emit_status(state, view_data, tx, format!("sort {column} {}", direction.label()));
}

fn move_selected_column(view_data: &mut ViewData, delta: isize) {
    let columns = view_data.result.headers().len();
    if columns == 0 {
        return;
    }
    let current = view_data.table.selected_col.min(columns - 1) as isize;
    view_data.table.selected_col = (current + delta).rem_euclid(columns as isize) as usize;
}

fn next_page(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let page_count = project(&view_data.result, &view_data.table.view).page_count;
    if view_data.table.view.next_page(page_count) {
        emit_status(
            state,
            view_data,
            tx,
            format!("page {}/{page_count}", view_data.table.view.page()),
        );
    }
}

fn prev_page(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    if view_data.table.view.prev_page() {
        let page_count = project(&view_data.result, &view_data.table.view).page_count;
        emit_status(
            state,
            view_data,
            tx,
            format!("page {}/{page_count}", view_data.table.view.page()),
        );
    }
}

fn step_page_size(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    delta: isize,
) {
    let current = view_data.table.view.page_size();
    let index = PAGE_SIZES
        .iter()
        .position(|size| *size == current)
        .unwrap_or(1) as isize;
    let next = (index + delta).clamp(0, PAGE_SIZES.len() as isize - 1) as usize;
    if PAGE_SIZES[next] != current {
        view_data.table.view.set_page_size(PAGE_SIZES[next]);
        emit_status(state, view_data, tx, format!("{} rows per page", PAGE_SIZES[next]));
    }
}

fn render_confirmation_message(tables: &[String]) -> String {
    if tables.is_empty() {
        return "Schema context cleared: no tables in scope.".to_owned();
    }
    let mut out = String::from("Schema context updated:\n");
    for table in tables {
        out.push_str("- ");
        out.push_str(table);
        out.push('\n');
    }
    out
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(frame.area());

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(42), Constraint::Percentage(58)])
        .split(layout[0]);

    let chat = Paragraph::new(render_chat_text(state, view_data))
        .wrap(Wrap { trim: false })
        .block(Block::default().title("chat").borders(Borders::ALL));
    frame.render_widget(chat, panes[0]);

    render_results(frame, panes[1], view_data);

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[1]);

    if view_data.picker.picker.is_open() {
        let area = centered_rect(60, 70, frame.area());
        frame.render_widget(Clear, area);
        let picker = Paragraph::new(render_picker_text(view_data)).block(
            Block::default()
                .title("schema context")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(picker, area);
    }

    if let Some(notice) = &view_data.notice {
        let area = centered_rect(60, 30, frame.area());
        frame.render_widget(Clear, area);
        let widget = Paragraph::new(format!("{notice}\n\npress q to quit"))
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(Color::Red))
            .block(Block::default().title("disconnected").borders(Borders::ALL));
        frame.render_widget(widget, area);
    }
}

fn render_chat_text(state: &AppState, view_data: &ViewData) -> String {
    let mut out = String::new();
    for entry in &view_data.chat.transcript {
        match entry.author {
            ChatAuthor::User => {
                out.push_str("you: ");
                out.push_str(&entry.text);
            }
            ChatAuthor::Bot => {
                out.push_str("bot: ");
                if entry.markup {
                    // List markup renders as its own block.
                    out.push('\n');
                }
                out.push_str(&entry.text);
            }
        }
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    if let Some(typing) = &view_data.chat.typing {
        out.push_str("bot: ");
        out.push_str(&".".repeat(typing.frame));
        out.push('\n');
    }

    out.push('\n');
    match state.mode {
        AppMode::ChatInput => {
            out.push_str("> ");
            out.push_str(&view_data.chat.input);
            out.push('_');
        }
        _ => {
            out.push_str("> ");
            out.push_str(&view_data.chat.input);
            out.push_str("  (i to type, enter to send)");
        }
    }
    out
}

fn render_results(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let projection = project(&view_data.result, &view_data.table.view);
    let title = results_title(view_data, &projection);

    if projection.is_empty() {
        let empty = Paragraph::new("No results found")
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    }

    let widths = vec![Constraint::Min(8); projection.headers.len().max(1)];
    let header_cells = projection
        .headers
        .iter()
        .enumerate()
        .map(|(column_index, header)| {
            let label = header_label(view_data, header);
            let mut style = Style::default().fg(Color::White).add_modifier(Modifier::BOLD);
            if column_index == view_data.table.selected_col {
                style = style.fg(Color::Cyan);
            }
            Cell::from(label).style(style)
        });
    let header = Row::new(header_cells);

    let rows = projection.rows.iter().map(|record| {
        let cells = projection
            .headers
            .iter()
            .map(|column| {
                let text = record
                    .get(column)
                    .map(|value| value.display())
                    .unwrap_or_default();
                Cell::from(text)
            })
            .collect::<Vec<_>>();
        Row::new(cells)
    });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn header_label(view_data: &ViewData, header: &str) -> String {
    match view_data.table.view.sort() {
        Some(spec) if spec.column == header => {
            let mark = match spec.direction {
                tabletalk_app::SortDirection::Asc => SORT_MARK_ASC,
                tabletalk_app::SortDirection::Desc => SORT_MARK_DESC,
            };
            format!("{header} {mark}")
        }
        _ => header.to_owned(),
    }
}

fn results_title(view_data: &ViewData, projection: &TableProjection) -> String {
    let mut title = format!(
        " results · page {}/{} · {}/page ",
        if projection.page_count == 0 {
            0
        } else {
            projection.page
        },
        projection.page_count,
        view_data.table.view.page_size()
    );
    if !view_data.table.view.query().is_empty() {
        title.push_str(&format!("· filter {:?} ", view_data.table.view.query()));
    }
    title
}

fn render_picker_text(view_data: &ViewData) -> String {
    let picker = &view_data.picker.picker;
    let mut out = String::new();

    match picker.phase() {
        PickerPhase::AwaitingSnapshot => {
            out.push_str("loading schema...\n\nesc: cancel\n");
        }
        PickerPhase::Ready => {
            for (index, table) in picker.tables().iter().enumerate() {
                let cursor = if index == view_data.picker.cursor {
                    "> "
                } else {
                    "  "
                };
                let marker = if picker.is_selected(index) {
                    "[x]"
                } else {
                    "[ ]"
                };
                out.push_str(&format!("{cursor}{marker} {}\n", table.name));
                for (column_index, column) in table.columns.iter().enumerate() {
                    let branch = if column_index + 1 == table.columns.len() {
                        "└─"
                    } else {
                        "├─"
                    };
                    out.push_str(&format!(
                        "      {branch} {} {}\n",
                        column.name, column.data_type
                    ));
                }
            }
            out.push_str("\nspace: toggle · enter: save · esc: cancel\n");
        }
        PickerPhase::Closed => {}
    }
    out
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    let mode = match state.mode {
        AppMode::Nav => "nav",
        AppMode::ChatInput => "chat",
        AppMode::Search => "search",
        AppMode::Picker => "schema",
    };
    let connection = match &state.connection {
        tabletalk_app::ConnectionState::Connecting => "connecting",
        tabletalk_app::ConnectionState::Connected => "online",
        tabletalk_app::ConnectionState::Closed(_) => "offline",
    };

    match (&state.status_line, view_data.chat.typing.is_some()) {
        (Some(status), _) => format!("{mode} · {connection} · {status}"),
        (None, true) => format!("{mode} · {connection} · waiting for reply"),
        (None, false) => format!(
            "{mode} · {connection} · i chat · / search · s sort · n/p page · +/- size · g schema · q quit"
        ),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppCommand, AppMode, AppState, InternalEvent, SessionRuntime, ViewData,
        handle_internal_event, handle_key_event, handle_remote_event, render_chat_text,
        render_confirmation_message, render_picker_text, start_typing, status_text, stop_typing,
    };
    use anyhow::Result;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::sync::mpsc::{self, Receiver, Sender};
    use tabletalk_app::{
        ChatAuthor, PickerPhase, Record, RemoteEvent, ResultSet, Scalar, SchemaColumn,
        SchemaTable, SortDirection,
    };

    #[derive(Debug, Default)]
    struct TestRuntime {
        result: ResultSet,
        pending: Option<ResultSet>,
        queued_events: Vec<RemoteEvent>,
        chat_sent: Vec<String>,
        schema_requests: usize,
        committed: Vec<Vec<String>>,
    }

    impl SessionRuntime for TestRuntime {
        fn send_chat(&mut self, text: &str) -> Result<()> {
            self.chat_sent.push(text.to_owned());
            Ok(())
        }

        fn request_schema_context(&mut self) -> Result<()> {
            self.schema_requests += 1;
            Ok(())
        }

        fn commit_schema_context(&mut self, tables: &[String]) -> Result<()> {
            self.committed.push(tables.to_vec());
            Ok(())
        }

        fn poll_remote(&mut self) -> Vec<RemoteEvent> {
            std::mem::take(&mut self.queued_events)
        }

        fn apply_pending_result(&mut self) -> bool {
            match self.pending.take() {
                Some(next) => {
                    self.result = next;
                    true
                }
                None => false,
            }
        }

        fn result_set(&self) -> &ResultSet {
            &self.result
        }
    }

    fn channel() -> (Sender<InternalEvent>, Receiver<InternalEvent>) {
        mpsc::channel()
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn people() -> ResultSet {
        ResultSet::new(vec![
            Record::from_fields(vec![
                ("id".to_owned(), Scalar::Number(1.0)),
                ("name".to_owned(), Scalar::Text("Bob".to_owned())),
            ]),
            Record::from_fields(vec![
                ("id".to_owned(), Scalar::Number(2.0)),
                ("name".to_owned(), Scalar::Text("Amy".to_owned())),
            ]),
        ])
    }

    fn users_table() -> SchemaTable {
        SchemaTable {
            name: "users".to_owned(),
            columns: vec![SchemaColumn {
                name: "id".to_owned(),
                data_type: "INTEGER".to_owned(),
            }],
        }
    }

    fn type_chat(
        state: &mut AppState,
        runtime: &mut TestRuntime,
        view_data: &mut ViewData,
        tx: &Sender<InternalEvent>,
        text: &str,
    ) {
        for ch in text.chars() {
            handle_key_event(state, runtime, view_data, tx, key(KeyCode::Char(ch)));
        }
    }

    #[test]
    fn typing_indicator_is_single_owner() {
        let (tx, _rx) = channel();
        let mut view_data = ViewData::default();

        start_typing(&mut view_data, &tx).expect("first start succeeds");
        let error = start_typing(&mut view_data, &tx).expect_err("second start must fail");
        assert!(error.to_string().contains("already active"));

        stop_typing(&mut view_data);
        start_typing(&mut view_data, &tx).expect("restart after stop succeeds");
    }

    #[test]
    fn stale_typing_ticks_are_ignored_after_stop() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        start_typing(&mut view_data, &tx).expect("start typing");
        let stale_token = view_data.typing_token;
        stop_typing(&mut view_data);

        handle_internal_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            InternalEvent::TypingTick { token: stale_token },
        );
        assert_eq!(view_data.chat.typing, None);
    }

    #[test]
    fn typing_tick_advances_and_wraps_the_animation() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        start_typing(&mut view_data, &tx).expect("start typing");
        let token = view_data.typing_token;
        for expected in [2, 3, 1, 2] {
            handle_internal_event(
                &mut state,
                &mut runtime,
                &mut view_data,
                &tx,
                InternalEvent::TypingTick { token },
            );
            assert_eq!(view_data.chat.typing.map(|t| t.frame), Some(expected));
        }
    }

    #[test]
    fn submitted_chat_reaches_the_runtime_and_starts_typing() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('i')));
        assert_eq!(state.mode, AppMode::ChatInput);

        type_chat(&mut state, &mut runtime, &mut view_data, &tx, "show people");
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));

        assert_eq!(runtime.chat_sent, vec!["show people".to_owned()]);
        assert_eq!(view_data.chat.transcript.len(), 1);
        assert_eq!(view_data.chat.transcript[0].author, ChatAuthor::User);
        assert!(view_data.chat.typing.is_some());
        assert!(view_data.chat.input.is_empty());
    }

    #[test]
    fn second_chat_turn_is_refused_while_a_reply_is_pending() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        state.dispatch(AppCommand::EnterChatInput);
        type_chat(&mut state, &mut runtime, &mut view_data, &tx, "first");
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));

        type_chat(&mut state, &mut runtime, &mut view_data, &tx, "second");
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));

        assert_eq!(runtime.chat_sent, vec!["first".to_owned()]);
        assert_eq!(
            state.status_line.as_deref(),
            Some("still waiting for the last reply")
        );
    }

    #[test]
    fn reply_stops_typing_and_defers_the_table_update() {
        let (tx, rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        start_typing(&mut view_data, &tx).expect("start typing");
        runtime.pending = Some(people());

        handle_remote_event(
            &mut state,
            &mut view_data,
            &tx,
            RemoteEvent::Reply {
                text: "2 rows".to_owned(),
                carries_result: true,
            },
        );

        // Reply text lands first; the table only moves on the deferred apply.
        assert_eq!(view_data.chat.typing, None);
        assert_eq!(view_data.chat.transcript.last().map(|e| e.text.clone()), Some("2 rows".to_owned()));
        assert!(view_data.result.is_empty());

        let token = view_data.apply_token;
        handle_internal_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            InternalEvent::ApplyResult { token },
        );
        assert_eq!(view_data.result.len(), 2);
        assert_eq!(state.status_line.as_deref(), Some("table updated (2 rows)"));
        drop(rx);
    }

    #[test]
    fn stale_apply_events_do_not_touch_the_table() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        runtime.pending = Some(people());
        view_data.apply_token = 7;

        handle_internal_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            InternalEvent::ApplyResult { token: 3 },
        );
        assert!(view_data.result.is_empty());
    }

    #[test]
    fn applying_a_new_generation_resets_the_view_state() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        view_data.result = people();
        view_data.table.view.set_query("amy");
        view_data.table.view.toggle_sort("name");
        view_data.table.view.set_page_size(25);
        view_data.table.selected_col = 1;

        runtime.pending = Some(ResultSet::new(Vec::new()));
        let token = view_data.apply_token;
        handle_internal_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            InternalEvent::ApplyResult { token },
        );

        assert!(view_data.result.is_empty());
        assert_eq!(view_data.table.view.query(), "");
        assert_eq!(view_data.table.view.sort(), None);
        assert_eq!(view_data.table.view.page_size(), 25);
        assert_eq!(view_data.table.selected_col, 0);
        assert_eq!(state.status_line.as_deref(), Some("query returned no rows"));
    }

    #[test]
    fn search_keys_update_the_query_live() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        view_data.result = people();

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('/')));
        assert_eq!(state.mode, AppMode::Search);

        for ch in "amy".chars() {
            handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char(ch)));
        }
        assert_eq!(view_data.table.view.query(), "amy");

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Backspace));
        assert_eq!(view_data.table.view.query(), "am");

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Esc));
        assert_eq!(state.mode, AppMode::Nav);
    }

    #[test]
    fn sort_key_toggles_direction_on_the_selected_column() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        view_data.result = people();
        view_data.table.selected_col = 1;

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('s')));
        assert_eq!(
            view_data.table.view.sort().map(|s| s.direction),
            Some(SortDirection::Asc)
        );
        assert_eq!(state.status_line.as_deref(), Some("sort name asc"));

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('s')));
        assert_eq!(
            view_data.table.view.sort().map(|s| s.direction),
            Some(SortDirection::Desc)
        );
    }

    #[test]
    fn page_navigation_keys_respect_the_bounds() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        view_data.result = people();
        view_data.table.view.set_page_size(1);

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('p')));
        assert_eq!(view_data.table.view.page(), 1);

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('n')));
        assert_eq!(view_data.table.view.page(), 2);

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('n')));
        assert_eq!(view_data.table.view.page(), 2);
    }

    #[test]
    fn page_size_steps_through_the_fixed_ladder() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        view_data.result = people();

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('+')));
        assert_eq!(view_data.table.view.page_size(), 25);

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('-')));
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('-')));
        assert_eq!(view_data.table.view.page_size(), 5);

        // Clamped at the bottom of the ladder.
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('-')));
        assert_eq!(view_data.table.view.page_size(), 5);
    }

    #[test]
    fn picker_flow_requests_toggles_and_commits() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('g')));
        assert_eq!(state.mode, AppMode::Picker);
        assert_eq!(runtime.schema_requests, 1);
        assert_eq!(view_data.picker.picker.phase(), PickerPhase::AwaitingSnapshot);

        handle_remote_event(
            &mut state,
            &mut view_data,
            &tx,
            RemoteEvent::SchemaSnapshot {
                tables: vec![users_table()],
                selected: Vec::new(),
            },
        );
        assert_eq!(view_data.picker.picker.phase(), PickerPhase::Ready);

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char(' ')));
        assert!(view_data.picker.picker.is_selected(0));

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(runtime.committed, vec![vec!["users".to_owned()]]);
        assert_eq!(view_data.picker.picker.phase(), PickerPhase::Closed);
    }

    #[test]
    fn picker_save_is_refused_while_awaiting_the_snapshot() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('g')));
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Enter));

        assert!(runtime.committed.is_empty());
        assert_eq!(state.mode, AppMode::Picker);
        assert_eq!(view_data.picker.picker.phase(), PickerPhase::AwaitingSnapshot);
        assert_eq!(
            state.status_line.as_deref(),
            Some("schema still loading; esc cancels")
        );
    }

    #[test]
    fn picker_cancel_discards_without_committing() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('g')));
        handle_remote_event(
            &mut state,
            &mut view_data,
            &tx,
            RemoteEvent::SchemaSnapshot {
                tables: vec![users_table()],
                selected: vec!["users".to_owned()],
            },
        );
        handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Esc));

        assert!(runtime.committed.is_empty());
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(view_data.picker.picker.phase(), PickerPhase::Closed);
    }

    #[test]
    fn confirmation_event_appends_a_markup_bot_message() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut view_data = ViewData::default();

        handle_remote_event(
            &mut state,
            &mut view_data,
            &tx,
            RemoteEvent::SelectionConfirmed {
                tables: vec!["users".to_owned(), "orders".to_owned()],
            },
        );

        let entry = view_data.chat.transcript.last().expect("confirmation entry");
        assert_eq!(entry.author, ChatAuthor::Bot);
        assert!(entry.markup);
        assert!(entry.text.contains("- users"));
        assert!(entry.text.contains("- orders"));
    }

    #[test]
    fn closed_event_blocks_input_except_quit() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();

        handle_remote_event(
            &mut state,
            &mut view_data,
            &tx,
            RemoteEvent::Closed {
                reason: "server shut down".to_owned(),
            },
        );
        assert!(state.connection.is_closed());
        assert!(view_data.notice.as_deref().unwrap_or("").contains("server shut down"));

        // Regular keys are swallowed, only q/esc leaves.
        assert!(!handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('i'))));
        assert_eq!(state.mode, AppMode::Nav);
        assert!(handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, key(KeyCode::Char('q'))));
    }

    #[test]
    fn malformed_frame_notice_reaches_the_status_line() {
        let (tx, _rx) = channel();
        let mut state = AppState::default();
        let mut view_data = ViewData::default();

        handle_remote_event(
            &mut state,
            &mut view_data,
            &tx,
            RemoteEvent::FrameDropped {
                detail: "expected value at line 1".to_owned(),
            },
        );
        assert!(
            state
                .status_line
                .as_deref()
                .unwrap_or("")
                .contains("dropped malformed frame")
        );
    }

    #[test]
    fn confirmation_message_lists_tables_as_bullets() {
        let rendered = render_confirmation_message(&["users".to_owned(), "orders".to_owned()]);
        assert_eq!(rendered, "Schema context updated:\n- users\n- orders\n");

        let cleared = render_confirmation_message(&[]);
        assert!(cleared.contains("no tables"));
    }

    #[test]
    fn chat_text_shows_typing_dots() {
        let (tx, _rx) = channel();
        let state = AppState::default();
        let mut view_data = ViewData::default();
        start_typing(&mut view_data, &tx).expect("start typing");

        let text = render_chat_text(&state, &view_data);
        assert!(text.contains("bot: ."));
    }

    #[test]
    fn picker_text_reflects_selection_and_loading() {
        let mut view_data = ViewData::default();
        view_data.picker.picker.open();
        assert!(render_picker_text(&view_data).contains("loading schema"));

        view_data
            .picker
            .picker
            .apply_snapshot(vec![users_table()], &["users".to_owned()]);
        let text = render_picker_text(&view_data);
        assert!(text.contains("[x] users"));
        assert!(text.contains("└─ id INTEGER"));
    }

    #[test]
    fn status_text_prefers_the_status_line() {
        let mut state = AppState::default();
        let view_data = ViewData::default();
        assert!(status_text(&state, &view_data).contains("q quit"));

        state.dispatch(AppCommand::SetStatus("sort name asc".to_owned()));
        assert!(status_text(&state, &view_data).contains("sort name asc"));
    }
}
