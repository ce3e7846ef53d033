use std::io::{self, Stdout};
use std::mem;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use directories::UserDirs;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};

use crate::app::{App, Command, InputKind, ListTask, Modal, ViewMode};
use crate::models::{format_relative, format_size};
use crate::ops::{self, Operation};
use crate::picker::{FilePicker, PickerOutcome};

pub async fn run(app: &mut App) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    if app.gateway.is_some() {
        apply(app, Command::LoadBuckets);
    } else {
        app.set_status_for(
            "No API credentials; showing configured bucket names only".to_string(),
            false,
            5,
        );
    }

    let result = event_loop(&mut terminal, app).await;

    // Restore the terminal even when the loop failed; that error is the one
    // worth reporting.
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.tick_status();
        poll_completions(app).await;

        terminal.draw(|frame| draw(frame, app))?;

        if event::poll(Duration::from_millis(200))? {
            match event::read()? {
                Event::Key(key) => {
                    if let Some(command) = dispatch(app, key) {
                        apply(app, command);
                    }
                }
                Event::Resize(_, _) => continue,
                _ => continue,
            }
        }

        if app.quit {
            return Ok(());
        }

        if let Some(command) = app.wants_more() {
            apply(app, command);
        }
    }
}

/// Folds finished background tasks back into the state. Listings carry their
/// (bucket, prefix) tag so [`App::apply_object_listing`] can drop stale ones.
async fn poll_completions(app: &mut App) {
    if app
        .pending_list
        .as_ref()
        .is_some_and(|task| task.is_finished())
        && let Some(task) = app.pending_list.take()
    {
        match task {
            ListTask::Buckets { handle } => {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(err) => Err(anyhow!("bucket listing task failed: {err}")),
                };
                app.apply_bucket_listing(result);
            }
            ListTask::Objects {
                bucket,
                prefix,
                append,
                handle,
            } => {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(err) => Err(anyhow!("listing task failed: {err}")),
                };
                app.apply_object_listing(&bucket, &prefix, append, result);
            }
        }
    }

    if app
        .pending_op
        .as_ref()
        .is_some_and(|handle| handle.is_finished())
        && let Some(handle) = app.pending_op.take()
    {
        match handle.await {
            Ok(outcome) => {
                if let Some(follow_up) = app.apply_op_outcome(outcome) {
                    apply(app, follow_up);
                }
            }
            Err(err) => app.set_status(format!("Operation failed: {err}"), true),
        }
    }
}

/// Executes a command by spawning the matching background task. A new listing
/// replaces (and aborts) any in-flight one; operations run one at a time.
fn apply(app: &mut App, command: Command) {
    match command {
        Command::Quit => app.quit = true,
        Command::LoadBuckets => {
            let Some(gateway) = app.gateway.clone() else {
                return;
            };
            app.cancel_pending_list();
            app.loading = true;
            let handle = tokio::spawn(async move { gateway.list_buckets().await });
            app.pending_list = Some(ListTask::Buckets { handle });
        }
        Command::LoadObjects {
            bucket,
            prefix,
            append,
        } => {
            let Some(gateway) = app.gateway.clone() else {
                return;
            };
            app.cancel_pending_list();
            app.loading = true;
            let token = if append { app.next_token.clone() } else { None };
            let handle = {
                let bucket = bucket.clone();
                let prefix = prefix.clone();
                tokio::spawn(
                    async move { gateway.list_objects_page(&bucket, &prefix, token).await },
                )
            };
            app.pending_list = Some(ListTask::Objects {
                bucket,
                prefix,
                append,
                handle,
            });
        }
        Command::Operate(op) => {
            if app.pending_op.is_some() {
                app.set_status("Another operation is still running".to_string(), false);
                return;
            }
            let Some(gateway) = app.gateway.clone() else {
                return;
            };
            let (text, secs) = op.progress();
            app.set_status_for(text, false, secs);
            app.pending_op = Some(tokio::spawn(ops::run(gateway, op)));
        }
    }
}

/// Routes one key press. Priority is fixed: Ctrl+C, then the open modal, then
/// filter entry, then the main table. Only effectful requests come back as
/// commands; pure state changes happen in place.
fn dispatch(app: &mut App, key: KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if matches!(key.code, KeyCode::Char('c')) && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Command::Quit);
    }
    if !matches!(app.modal, Modal::None) {
        return dispatch_modal(app, key);
    }
    if app.filtering {
        dispatch_filter(app, key);
        return None;
    }
    dispatch_main(app, key)
}

fn dispatch_modal(app: &mut App, key: KeyEvent) -> Option<Command> {
    match app.modal {
        Modal::None => None,
        Modal::Help | Modal::Error(_) => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('?')) {
                app.modal = Modal::None;
            }
            None
        }
        Modal::ConfirmDelete { .. } => dispatch_confirm(app, key),
        Modal::TextInput { .. } => dispatch_input(app, key),
        Modal::FilePicker(_) => dispatch_picker(app, key),
    }
}

/// `y` is the only key that confirms a delete; Enter deliberately does
/// nothing here so a held-down Enter cannot destroy data.
fn dispatch_confirm(app: &mut App, key: KeyEvent) -> Option<Command> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            let Modal::ConfirmDelete { keys } = mem::replace(&mut app.modal, Modal::None) else {
                return None;
            };
            let bucket = app.bucket.clone()?;
            Some(Command::Operate(Operation::Delete { bucket, keys }))
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            app.modal = Modal::None;
            app.set_status("Delete cancelled".to_string(), false);
            None
        }
        _ => None,
    }
}

fn dispatch_input(app: &mut App, key: KeyEvent) -> Option<Command> {
    match key.code {
        KeyCode::Esc => {
            app.modal = Modal::None;
            None
        }
        KeyCode::Backspace => {
            if let Modal::TextInput { buffer, .. } = &mut app.modal {
                buffer.pop();
            }
            None
        }
        KeyCode::Enter => {
            let ready =
                matches!(&app.modal, Modal::TextInput { buffer, .. } if !buffer.trim().is_empty());
            if !ready {
                return None;
            }
            let Modal::TextInput { kind, buffer } = mem::replace(&mut app.modal, Modal::None)
            else {
                return None;
            };
            submit_input(app, kind, buffer.trim().to_string())
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            if let Modal::TextInput { buffer, .. } = &mut app.modal {
                buffer.push(ch);
            }
            None
        }
        _ => None,
    }
}

fn submit_input(app: &mut App, kind: InputKind, text: String) -> Option<Command> {
    match kind {
        InputKind::Upload => {
            let bucket = app.bucket.clone()?;
            Some(Command::Operate(Operation::Upload {
                bucket,
                prefix: app.prefix.clone(),
                source: ops::expand_home(&text),
            }))
        }
        InputKind::Download => {
            let bucket = app.bucket.clone()?;
            let key = app.cursor_object().map(|entry| entry.key.clone())?;
            Some(Command::Operate(Operation::Download {
                bucket,
                key,
                dest: text,
            }))
        }
        InputKind::NewFolder => {
            let bucket = app.bucket.clone()?;
            Some(Command::Operate(Operation::CreateFolder {
                bucket,
                prefix: app.prefix.clone(),
                name: text,
            }))
        }
        InputKind::NewBucket => {
            if !ops::valid_bucket_name(&text) {
                app.set_status(
                    "Bucket names are 3-63 lowercase letters, digits, dots or hyphens".to_string(),
                    true,
                );
                app.modal = Modal::TextInput {
                    kind: InputKind::NewBucket,
                    buffer: text,
                };
                return None;
            }
            Some(Command::Operate(Operation::CreateBucket { name: text }))
        }
    }
}

fn dispatch_picker(app: &mut App, key: KeyEvent) -> Option<Command> {
    let outcome = {
        let Modal::FilePicker(picker) = &mut app.modal else {
            return None;
        };
        let outcome = picker.handle_key(key);
        app.session.show_hidden = picker.show_hidden;
        outcome
    };
    match outcome {
        PickerOutcome::Pending => None,
        PickerOutcome::Cancelled => {
            app.modal = Modal::None;
            None
        }
        PickerOutcome::Picked(source) => {
            app.modal = Modal::None;
            let bucket = app.bucket.clone()?;
            Some(Command::Operate(Operation::Upload {
                bucket,
                prefix: app.prefix.clone(),
                source,
            }))
        }
    }
}

/// While the filter line is being typed every key is consumed; Enter and Esc
/// leave entry mode with the query still applied.
fn dispatch_filter(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Enter => app.filtering = false,
        KeyCode::Backspace => app.pop_filter(),
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.push_filter(ch);
        }
        _ => {}
    }
}

fn dispatch_main(app: &mut App, key: KeyEvent) -> Option<Command> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        if matches!(key.code, KeyCode::Char('a')) {
            app.select_all();
        }
        return None;
    }
    match key.code {
        KeyCode::Char('q') => Some(Command::Quit),
        KeyCode::Char('j') | KeyCode::Down => {
            app.move_down();
            None
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.move_up();
            None
        }
        KeyCode::Char('g') => {
            app.jump_top();
            None
        }
        KeyCode::Char('G') => {
            app.jump_bottom();
            None
        }
        KeyCode::Char('l') | KeyCode::Enter | KeyCode::Right => app.enter(),
        KeyCode::Char('h') | KeyCode::Backspace | KeyCode::Left => app.back(),
        KeyCode::Esc => {
            // First Esc drops the filter, the next one walks up.
            if !app.filter.is_empty() {
                app.clear_filter();
                None
            } else {
                app.back()
            }
        }
        KeyCode::Char('/') => {
            app.filter.clear();
            app.filtering = true;
            app.cursor = 0;
            None
        }
        KeyCode::Char('s') => {
            app.cycle_sort();
            None
        }
        KeyCode::Char(' ') => {
            app.toggle_select();
            None
        }
        KeyCode::Char('R') => app.refresh(),
        KeyCode::Char('?') => {
            app.modal = Modal::Help;
            None
        }
        KeyCode::Char('d') | KeyCode::Char('x') => {
            open_delete_confirm(app);
            None
        }
        KeyCode::Char('u') => {
            open_upload(app);
            None
        }
        KeyCode::Char('o') => {
            open_download(app);
            None
        }
        KeyCode::Char('n') => {
            open_new_folder(app);
            None
        }
        KeyCode::Char('N') => {
            open_new_bucket(app);
            None
        }
        KeyCode::Char('c') => show_path(app),
        _ => None,
    }
}

fn open_delete_confirm(app: &mut App) {
    if app.view != ViewMode::Objects {
        return;
    }
    let keys = app.delete_targets();
    if keys.is_empty() {
        return;
    }
    app.modal = Modal::ConfirmDelete { keys };
}

/// Opens the local file picker rooted at the home directory, or falls back
/// to a typed-path prompt when that directory cannot be read.
fn open_upload(app: &mut App) {
    if app.view != ViewMode::Objects {
        return;
    }
    let root = UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/"));
    match FilePicker::open(root, app.session.show_hidden) {
        Some(picker) => app.modal = Modal::FilePicker(picker),
        None => {
            app.modal = Modal::TextInput {
                kind: InputKind::Upload,
                buffer: String::new(),
            };
        }
    }
}

fn open_download(app: &mut App) {
    if app.view != ViewMode::Objects {
        return;
    }
    let is_dir = match app.cursor_object() {
        Some(entry) => entry.is_directory,
        None => return,
    };
    if is_dir {
        app.set_status("Folders cannot be downloaded".to_string(), false);
        return;
    }
    app.modal = Modal::TextInput {
        kind: InputKind::Download,
        buffer: "~/".to_string(),
    };
}

fn open_new_folder(app: &mut App) {
    if app.view != ViewMode::Objects {
        return;
    }
    app.modal = Modal::TextInput {
        kind: InputKind::NewFolder,
        buffer: String::new(),
    };
}

fn open_new_bucket(app: &mut App) {
    if app.view != ViewMode::Buckets {
        return;
    }
    if app.gateway.is_none() {
        app.modal = Modal::Error(app.config.credentials_help().to_string());
        return;
    }
    app.modal = Modal::TextInput {
        kind: InputKind::NewBucket,
        buffer: String::new(),
    };
}

/// Directories get their full path shown right away; files go through the
/// gateway so size and content type can be appended.
fn show_path(app: &mut App) -> Option<Command> {
    if app.view != ViewMode::Objects {
        return None;
    }
    let scheme = app.config.provider_label();
    let bucket = app.bucket.clone()?;
    let (key, is_dir) = {
        let entry = app.cursor_object()?;
        (entry.key.clone(), entry.is_directory)
    };
    if is_dir {
        app.set_status_for(format!("{scheme}://{bucket}/{key}"), false, 5);
        return None;
    }
    Some(Command::Operate(Operation::ShowDetails {
        scheme: scheme.to_string(),
        bucket,
        key,
    }))
}

fn draw(frame: &mut ratatui::Frame, app: &App) {
    let size = frame.size();

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(size);

    draw_header(frame, vertical[0], app);
    match app.view {
        ViewMode::Buckets => draw_buckets(frame, vertical[1], app),
        ViewMode::Objects => draw_objects(frame, vertical[1], app),
    }
    draw_status(frame, vertical[2], app);
    draw_command_bar(frame, vertical[3], app);

    match &app.modal {
        Modal::None => {}
        Modal::ConfirmDelete { keys } => draw_confirm_popup(frame, app, keys),
        Modal::TextInput { kind, buffer } => draw_input_popup(frame, app, *kind, buffer),
        Modal::Help => draw_help_popup(frame),
        Modal::Error(message) => draw_error_popup(frame, message),
        Modal::FilePicker(picker) => draw_picker_popup(frame, app, picker),
    }
}

fn draw_header(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let accent = app.config.accent();
    let location = match app.view {
        ViewMode::Buckets => format!("{} buckets", app.config.provider_label()),
        ViewMode::Objects => format!(
            "{}://{}/{}",
            app.config.provider_label(),
            app.bucket.as_deref().unwrap_or(""),
            app.prefix
        ),
    };

    let mut spans = vec![Span::styled(
        location,
        Style::default().fg(accent).add_modifier(Modifier::BOLD),
    )];
    if app.filtering || !app.filter.is_empty() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("/{}", app.filter),
            Style::default().fg(Color::LightYellow),
        ));
        if app.filtering {
            spans.push(Span::styled("▌", Style::default().fg(Color::LightYellow)));
        }
    }
    if app.loading {
        spans.push(Span::styled(" ⟳", Style::default().fg(Color::LightCyan)));
    }
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("sort: {}", app.sort.label()),
        Style::default().fg(Color::DarkGray),
    ));

    let block = Block::default()
        .title(Span::styled(
            " bucket-scout ",
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent));
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_buckets(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(area);

    let buckets = app.visible_buckets();
    let title = if app.filter.is_empty() {
        format!("Buckets ({})", buckets.len())
    } else {
        format!("Buckets ({} of {})", buckets.len(), app.buckets.len())
    };
    let title_style = Style::default()
        .fg(Color::LightCyan)
        .add_modifier(Modifier::BOLD);
    let block = Block::default()
        .title(Span::styled(title, title_style))
        .borders(Borders::ALL)
        .border_style(highlight_border(true));

    let name_width = columns[0].width.saturating_sub(18).max(16) as usize;
    let items: Vec<ListItem> = buckets
        .iter()
        .map(|bucket| {
            let spans = vec![
                Span::styled(
                    clip(&bucket.name, name_width),
                    Style::default().fg(Color::White),
                ),
                Span::raw(" "),
                Span::styled(
                    format!("{:>14}", format_relative(bucket.created_at)),
                    Style::default().fg(Color::DarkGray),
                ),
            ];
            ListItem::new(Line::from(spans))
        })
        .collect();
    let mut state = ListState::default();
    if !buckets.is_empty() {
        state.select(Some(app.cursor.min(buckets.len() - 1)));
    }
    let list = List::new(items)
        .highlight_style(Style::default().bg(Color::Blue))
        .block(block);
    frame.render_stateful_widget(list, columns[0], &mut state);

    draw_bucket_detail(frame, columns[1], app);
}

fn draw_bucket_detail(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let title_style = Style::default()
        .fg(Color::LightYellow)
        .add_modifier(Modifier::BOLD);
    let block = Block::default()
        .title(Span::styled("Details", title_style))
        .borders(Borders::ALL)
        .border_style(highlight_border(false));
    let lines = if let Some(bucket) = app.cursor_bucket() {
        vec![
            Line::from(format!("Name:    {}", bucket.name)),
            Line::from(format!("Created: {}", format_relative(bucket.created_at))),
            Line::from(""),
            Line::from(Span::styled(
                "Enter opens the bucket",
                Style::default().fg(Color::DarkGray),
            )),
        ]
    } else {
        vec![Line::from("No buckets")]
    };
    let para = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(para, area);
}

fn draw_objects(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let objects = app.visible_objects();
    let plus = if app.next_token.is_some() { "+" } else { "" };
    let title = if app.filter.is_empty() {
        format!("Objects ({}{plus})", objects.len())
    } else {
        format!("Objects ({} of {}{plus})", objects.len(), app.objects.len())
    };
    let title_style = Style::default()
        .fg(Color::LightCyan)
        .add_modifier(Modifier::BOLD);
    let block = Block::default()
        .title(Span::styled(title, title_style))
        .borders(Borders::ALL)
        .border_style(highlight_border(true));

    // marker + name + size + age columns; the name takes whatever is left
    let name_width = area.width.saturating_sub(30).max(16) as usize;

    let items: Vec<ListItem> = objects
        .iter()
        .map(|entry| {
            let marked = app.selection.contains(&entry.key);
            let marker = if marked { "*" } else { " " };
            let display_name = if entry.is_directory {
                format!("/{}", entry.file_name())
            } else {
                entry.file_name().to_string()
            };
            let (size_col, age_col) = if entry.is_directory {
                ("--".to_string(), "--".to_string())
            } else {
                (
                    format_size(entry.size),
                    format_relative(entry.last_modified),
                )
            };
            let name_style = if entry.is_directory {
                Style::default()
                    .fg(Color::LightCyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let spans = vec![
                Span::styled(
                    marker.to_string(),
                    Style::default()
                        .fg(Color::LightYellow)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(" "),
                Span::styled(clip(&display_name, name_width), name_style),
                Span::raw(" "),
                Span::styled(
                    format!("{size_col:>10}"),
                    Style::default().fg(Color::LightCyan),
                ),
                Span::raw(" "),
                Span::styled(
                    format!("{age_col:>14}"),
                    Style::default().fg(Color::DarkGray),
                ),
            ];
            ListItem::new(Line::from(spans))
        })
        .collect();
    let mut state = ListState::default();
    if !objects.is_empty() {
        state.select(Some(app.cursor.min(objects.len() - 1)));
    }
    let list = List::new(items)
        .highlight_style(Style::default().bg(Color::Blue))
        .block(block);
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_status(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let block = Block::default().borders(Borders::ALL).title(Span::styled(
        "Status",
        Style::default()
            .fg(Color::LightCyan)
            .add_modifier(Modifier::BOLD),
    ));
    let line = if let Some(status) = &app.status {
        let style = if status.error {
            Style::default()
                .fg(Color::LightRed)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::LightBlue)
        };
        Line::from(Span::styled(status.text.as_str(), style))
    } else {
        let plus = if app.next_token.is_some() { "+" } else { "" };
        let text = match app.view {
            ViewMode::Buckets => format!("{} bucket(s)", app.buckets.len()),
            ViewMode::Objects => {
                let mut text = if app.filter.is_empty() {
                    format!("{}{plus} item(s)", app.objects.len())
                } else {
                    format!(
                        "{} of {}{plus} item(s)",
                        app.visible_len(),
                        app.objects.len()
                    )
                };
                if !app.selection.is_empty() {
                    text.push_str(&format!(", {} selected", app.selection.len()));
                }
                text
            }
        };
        Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)))
    };
    let para = Paragraph::new(line).block(block).wrap(Wrap { trim: true });
    frame.render_widget(para, area);
}

fn draw_command_bar(frame: &mut ratatui::Frame, area: Rect, app: &App) {
    let key_style = Style::default()
        .bg(Color::LightCyan)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD);
    let chips: &[(&str, &str)] = match app.view {
        ViewMode::Buckets => &[
            ("Enter", " open "),
            ("N", " new bucket "),
            ("/", " filter "),
            ("s", " sort "),
            ("R", " refresh "),
            ("?", " help "),
            ("q", " quit"),
        ],
        ViewMode::Objects => &[
            ("Space", " mark "),
            ("d", " delete "),
            ("u", " upload "),
            ("o", " download "),
            ("n", " folder "),
            ("c", " path "),
            ("/", " filter "),
            ("?", " help "),
            ("q", " quit"),
        ],
    };
    let mut spans = Vec::new();
    for (key, label) in chips {
        spans.push(Span::styled(format!(" {key} "), key_style));
        spans.push(Span::raw(*label));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::Blue).fg(Color::White));
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn draw_confirm_popup(frame: &mut ratatui::Frame, app: &App, keys: &[String]) {
    let area = centered_rect(60, 40, frame.size());
    draw_modal_surface(frame, area);

    let key_style = Style::default()
        .bg(Color::LightYellow)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD);
    let highlight_style = Style::default()
        .fg(Color::LightGreen)
        .add_modifier(Modifier::BOLD);

    let mut lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::raw("  Delete "),
            Span::styled(format!("{}", keys.len()), highlight_style),
            Span::raw(" item(s) from "),
            Span::styled(app.bucket.as_deref().unwrap_or("?"), highlight_style),
            Span::raw("?"),
        ]),
        Line::from(""),
    ];
    for key in keys.iter().take(5) {
        lines.push(Line::from(format!("    {key}")));
    }
    if keys.len() > 5 {
        lines.push(Line::from(format!("    … and {} more", keys.len() - 5)));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Folders are emptied recursively. This cannot be undone.",
        Style::default()
            .fg(Color::LightYellow)
            .add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled(" y ", key_style),
        Span::raw(" Delete   "),
        Span::styled(" n / Esc ", key_style),
        Span::raw(" Cancel"),
    ]));

    let block = Block::default()
        .title(Span::styled(
            " Confirm delete ",
            Style::default()
                .fg(Color::LightYellow)
                .add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .style(Style::default().bg(Color::Black));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_input_popup(frame: &mut ratatui::Frame, app: &App, kind: InputKind, buffer: &str) {
    let area = centered_rect(60, 30, frame.size());
    draw_modal_surface(frame, area);

    let key_style = Style::default()
        .bg(Color::LightCyan)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD);
    let block = Block::default()
        .title(Span::styled(
            format!(" {} ", kind.title()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.config.accent()))
        .style(Style::default().bg(Color::Black));

    let lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  > ", Style::default().fg(Color::DarkGray)),
            Span::styled(
                buffer,
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(" ", Style::default().bg(Color::LightYellow)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled(" Enter ", key_style),
            Span::raw(" Confirm   "),
            Span::styled(" Esc ", key_style),
            Span::raw(" Cancel"),
        ]),
    ];
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_help_popup(frame: &mut ratatui::Frame) {
    let area = centered_rect(76, 80, frame.size());
    draw_modal_surface(frame, area);

    let title_style = Style::default()
        .fg(Color::LightYellow)
        .add_modifier(Modifier::BOLD);
    let block = Block::default()
        .title(Span::styled(" Help – ? or Esc closes ", title_style))
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::Black));

    let key_style = Style::default()
        .fg(Color::LightCyan)
        .add_modifier(Modifier::BOLD);
    let header_style = Style::default()
        .fg(Color::LightGreen)
        .add_modifier(Modifier::BOLD);

    let lines = vec![
        Line::from(vec![Span::styled("NAVIGATION", header_style)]),
        Line::from(vec![
            Span::styled("j/k ↑/↓", key_style),
            Span::raw(" move  "),
            Span::styled("g/G", key_style),
            Span::raw(" top/bottom  "),
            Span::styled("l/Enter", key_style),
            Span::raw(" open  "),
            Span::styled("h/Backspace", key_style),
            Span::raw(" up"),
        ]),
        Line::from(vec![
            Span::styled("/", key_style),
            Span::raw(" fuzzy filter (Enter or Esc keeps the query)  "),
            Span::styled("Esc", key_style),
            Span::raw(" clear filter, then go up"),
        ]),
        Line::from(vec![
            Span::styled("s", key_style),
            Span::raw(" cycle sort (name, size, date)  "),
            Span::styled("R", key_style),
            Span::raw(" refresh the current listing"),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("SELECTION", header_style)]),
        Line::from(vec![
            Span::styled("Space", key_style),
            Span::raw(" mark/unmark  "),
            Span::styled("Ctrl+A", key_style),
            Span::raw(" mark all visible (again: none)"),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("OBJECTS", header_style)]),
        Line::from(vec![
            Span::styled("d or x", key_style),
            Span::raw(" delete marked rows (or the cursor row); folders recurse"),
        ]),
        Line::from(vec![
            Span::styled("u", key_style),
            Span::raw(" upload a local file here  "),
            Span::styled("o", key_style),
            Span::raw(" download the file under the cursor"),
        ]),
        Line::from(vec![
            Span::styled("n", key_style),
            Span::raw(" create a folder  "),
            Span::styled("c", key_style),
            Span::raw(" show the full path (plus size/type for files)"),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("BUCKETS", header_style)]),
        Line::from(vec![
            Span::styled("Enter", key_style),
            Span::raw(" open  "),
            Span::styled("N", key_style),
            Span::raw(" create a bucket"),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled("OTHER", header_style)]),
        Line::from(vec![
            Span::styled("?", key_style),
            Span::raw(" toggle this help  "),
            Span::styled("q", key_style),
            Span::raw(" or "),
            Span::styled("Ctrl+C", key_style),
            Span::raw(" quit"),
        ]),
    ];
    let para = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(para, area);
}

fn draw_error_popup(frame: &mut ratatui::Frame, message: &str) {
    let area = centered_rect(70, 50, frame.size());
    draw_modal_surface(frame, area);

    let key_style = Style::default()
        .bg(Color::LightYellow)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD);
    let block = Block::default()
        .title(Span::styled(
            " Error ",
            Style::default()
                .fg(Color::LightYellow)
                .add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .style(Style::default().bg(Color::Black));

    let mut lines: Vec<Line> = vec![Line::from("")];
    lines.extend(message.lines().map(|text| Line::from(format!("  {text}"))));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("  Press "),
        Span::styled(" Esc ", key_style),
        Span::raw(" to close"),
    ]));
    let para = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    frame.render_widget(para, area);
}

fn draw_picker_popup(frame: &mut ratatui::Frame, app: &App, picker: &FilePicker) {
    let area = centered_rect(70, 70, frame.size());
    draw_modal_surface(frame, area);

    let block = Block::default()
        .title(Span::styled(
            format!(" Upload – {} ", picker.cwd.display()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.config.accent()))
        .style(Style::default().bg(Color::Black));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(inner);

    let query = Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            picker.query.as_str(),
            Style::default().fg(Color::LightYellow),
        ),
        Span::styled("▌", Style::default().fg(Color::LightYellow)),
    ]);
    frame.render_widget(Paragraph::new(query), rows[0]);

    let entries = picker.visible();
    let items: Vec<ListItem> = entries
        .iter()
        .map(|entry| {
            let (label, style) = if entry.is_dir {
                (
                    format!("{}/", entry.name),
                    Style::default()
                        .fg(Color::LightCyan)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                (entry.name.clone(), Style::default().fg(Color::White))
            };
            let size = if entry.is_dir {
                String::new()
            } else {
                format!("  {}", format_size(entry.size))
            };
            ListItem::new(Line::from(vec![
                Span::styled(label, style),
                Span::styled(size, Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();
    let mut state = ListState::default();
    if !entries.is_empty() {
        state.select(Some(picker.cursor.min(entries.len() - 1)));
    }
    let list = List::new(items).highlight_style(Style::default().bg(Color::Blue));
    frame.render_stateful_widget(list, rows[1], &mut state);

    let hidden = if picker.show_hidden { "on" } else { "off" };
    let hint = Line::from(Span::styled(
        format!("Enter pick  l/h descend/up  . hidden: {hidden}  type to filter  Esc cancel"),
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(hint), rows[2]);
}

fn draw_modal_surface(frame: &mut ratatui::Frame, area: Rect) {
    frame.render_widget(Clear, area);
    let backdrop = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(backdrop, area);

    let canvas = frame.size();
    let shadow_style = Style::default().bg(Color::DarkGray);
    if area.y + area.height < canvas.height {
        let shadow_width = area.width.min(canvas.width.saturating_sub(area.x + 1));
        if shadow_width > 0 {
            let shadow = Rect::new(area.x + 1, area.y + area.height, shadow_width, 1);
            frame.render_widget(Block::default().style(shadow_style), shadow);
        }
    }
    if area.x + area.width < canvas.width {
        let shadow_height = area.height.min(canvas.height.saturating_sub(area.y + 1));
        if shadow_height > 0 {
            let shadow = Rect::new(area.x + area.width, area.y + 1, 1, shadow_height);
            frame.render_widget(Block::default().style(shadow_style), shadow);
        }
    }
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100 - height_percent) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn highlight_border(active: bool) -> Style {
    if active {
        Style::default()
            .fg(Color::LightYellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

/// Char-safe truncation to a column width, padding short names out.
fn clip(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    } else {
        format!("{text:<width$}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Provider};
    use crate::models::ObjectEntry;
    use crate::session::Session;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    fn s3_app() -> App {
        App::new(
            Config {
                provider: Provider::S3,
            },
            None,
            Session::default(),
        )
    }

    fn entry(key: &str, size: u64) -> ObjectEntry {
        ObjectEntry {
            key: key.to_string(),
            size,
            last_modified: None,
            etag: None,
            is_directory: false,
        }
    }

    fn objects_app() -> App {
        let mut app = s3_app();
        app.view = ViewMode::Objects;
        app.bucket = Some("media".to_string());
        app.objects = vec![
            ObjectEntry::directory("photos/"),
            entry("a.txt", 10),
            entry("b.txt", 20),
        ];
        app
    }

    #[test]
    fn test_quit_keys() {
        let mut app = s3_app();
        assert_eq!(
            dispatch(&mut app, key(KeyCode::Char('q'))),
            Some(Command::Quit)
        );
        assert_eq!(dispatch(&mut app, ctrl('c')), Some(Command::Quit));
    }

    #[test]
    fn test_release_events_are_ignored() {
        let mut app = s3_app();
        let release = KeyEvent::new_with_kind(
            KeyCode::Char('q'),
            KeyModifiers::NONE,
            KeyEventKind::Release,
        );
        assert_eq!(dispatch(&mut app, release), None);
    }

    #[test]
    fn test_ctrl_c_quits_even_with_a_modal_open() {
        let mut app = objects_app();
        app.modal = Modal::TextInput {
            kind: InputKind::NewFolder,
            buffer: String::new(),
        };
        assert_eq!(dispatch(&mut app, ctrl('c')), Some(Command::Quit));
    }

    #[test]
    fn test_help_modal_consumes_every_other_key() {
        let mut app = objects_app();
        app.modal = Modal::Help;
        assert_eq!(dispatch(&mut app, key(KeyCode::Char('j'))), None);
        assert_eq!(app.cursor, 0);
        assert_eq!(dispatch(&mut app, key(KeyCode::Char('q'))), None);
        assert!(matches!(app.modal, Modal::Help));
        dispatch(&mut app, key(KeyCode::Esc));
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_filter_entry_captures_operation_keys() {
        let mut app = objects_app();
        assert_eq!(dispatch(&mut app, key(KeyCode::Char('/'))), None);
        assert!(app.filtering);
        assert_eq!(dispatch(&mut app, key(KeyCode::Char('d'))), None);
        assert!(matches!(app.modal, Modal::None), "no delete confirm");
        assert_eq!(app.filter, "d");
        dispatch(&mut app, key(KeyCode::Enter));
        assert!(!app.filtering);
        assert_eq!(app.filter, "d", "the query survives leaving entry mode");
    }

    #[test]
    fn test_escape_peels_filter_then_walks_up() {
        let mut app = objects_app();
        app.prefix = "photos/".to_string();
        dispatch(&mut app, key(KeyCode::Char('/')));
        dispatch(&mut app, key(KeyCode::Char('a')));
        assert!(app.filtering);

        dispatch(&mut app, key(KeyCode::Esc));
        assert!(!app.filtering);
        assert_eq!(app.filter, "a");

        dispatch(&mut app, key(KeyCode::Esc));
        assert_eq!(app.filter, "");

        let command = dispatch(&mut app, key(KeyCode::Esc));
        assert_eq!(
            command,
            Some(Command::LoadObjects {
                bucket: "media".to_string(),
                prefix: String::new(),
                append: false,
            })
        );
    }

    #[test]
    fn test_delete_opens_confirm_for_cursor_row() {
        let mut app = objects_app();
        assert_eq!(dispatch(&mut app, key(KeyCode::Char('d'))), None);
        let Modal::ConfirmDelete { keys } = &app.modal else {
            panic!("expected a confirm modal");
        };
        assert_eq!(keys, &vec!["photos/".to_string()]);

        // Nothing to confirm in the bucket view.
        let mut app = s3_app();
        assert_eq!(dispatch(&mut app, key(KeyCode::Char('d'))), None);
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_confirm_requires_y_and_enter_does_nothing() {
        let mut app = objects_app();
        app.modal = Modal::ConfirmDelete {
            keys: vec!["a.txt".to_string()],
        };
        assert_eq!(dispatch(&mut app, key(KeyCode::Enter)), None);
        assert!(matches!(app.modal, Modal::ConfirmDelete { .. }));

        let command = dispatch(&mut app, key(KeyCode::Char('y')));
        assert_eq!(
            command,
            Some(Command::Operate(Operation::Delete {
                bucket: "media".to_string(),
                keys: vec!["a.txt".to_string()],
            }))
        );
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_confirm_cancels_on_n_and_esc() {
        let mut app = objects_app();
        app.modal = Modal::ConfirmDelete {
            keys: vec!["a.txt".to_string()],
        };
        assert_eq!(dispatch(&mut app, key(KeyCode::Char('n'))), None);
        assert!(matches!(app.modal, Modal::None));

        app.modal = Modal::ConfirmDelete {
            keys: vec!["a.txt".to_string()],
        };
        assert_eq!(dispatch(&mut app, key(KeyCode::Esc)), None);
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_text_input_submits_trimmed_text() {
        let mut app = objects_app();
        dispatch(&mut app, key(KeyCode::Char('n')));
        assert!(matches!(
            app.modal,
            Modal::TextInput {
                kind: InputKind::NewFolder,
                ..
            }
        ));

        // Enter on an empty buffer keeps the prompt open.
        assert_eq!(dispatch(&mut app, key(KeyCode::Enter)), None);
        assert!(matches!(app.modal, Modal::TextInput { .. }));

        for ch in "docs ".chars() {
            dispatch(&mut app, key(KeyCode::Char(ch)));
        }
        let command = dispatch(&mut app, key(KeyCode::Enter));
        assert_eq!(
            command,
            Some(Command::Operate(Operation::CreateFolder {
                bucket: "media".to_string(),
                prefix: String::new(),
                name: "docs".to_string(),
            }))
        );
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_backspace_and_esc_edit_the_input() {
        let mut app = objects_app();
        app.modal = Modal::TextInput {
            kind: InputKind::NewFolder,
            buffer: "ab".to_string(),
        };
        dispatch(&mut app, key(KeyCode::Backspace));
        let Modal::TextInput { buffer, .. } = &app.modal else {
            panic!("expected the prompt to stay open");
        };
        assert_eq!(buffer, "a");
        dispatch(&mut app, key(KeyCode::Esc));
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_rejected_bucket_name_reopens_the_prompt() {
        let mut app = s3_app();
        app.modal = Modal::TextInput {
            kind: InputKind::NewBucket,
            buffer: "Bad_Name".to_string(),
        };
        assert_eq!(dispatch(&mut app, key(KeyCode::Enter)), None);
        let Modal::TextInput { kind, buffer } = &app.modal else {
            panic!("expected the prompt back");
        };
        assert_eq!(*kind, InputKind::NewBucket);
        assert_eq!(buffer, "Bad_Name");
        assert!(app.status.as_ref().is_some_and(|status| status.error));

        app.modal = Modal::TextInput {
            kind: InputKind::NewBucket,
            buffer: "logs-2024".to_string(),
        };
        let command = dispatch(&mut app, key(KeyCode::Enter));
        assert_eq!(
            command,
            Some(Command::Operate(Operation::CreateBucket {
                name: "logs-2024".to_string(),
            }))
        );
    }

    #[test]
    fn test_new_bucket_without_a_gateway_shows_the_credentials_help() {
        let mut app = App::new(
            Config {
                provider: Provider::R2 {
                    account_id: "acct".to_string(),
                    access_key_id: None,
                    secret_access_key: None,
                    external_buckets: vec!["assets".to_string()],
                },
            },
            None,
            Session::default(),
        );
        dispatch(
            &mut app,
            KeyEvent::new(KeyCode::Char('N'), KeyModifiers::SHIFT),
        );
        assert!(matches!(app.modal, Modal::Error(_)));

        // And it is not a bucket-view key at all inside a bucket.
        let mut app = objects_app();
        dispatch(
            &mut app,
            KeyEvent::new(KeyCode::Char('N'), KeyModifiers::SHIFT),
        );
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_upload_is_an_object_view_key() {
        let mut app = s3_app();
        dispatch(&mut app, key(KeyCode::Char('u')));
        assert!(matches!(app.modal, Modal::None));

        let mut app = objects_app();
        dispatch(&mut app, key(KeyCode::Char('u')));
        assert!(matches!(
            app.modal,
            Modal::FilePicker(_)
                | Modal::TextInput {
                    kind: InputKind::Upload,
                    ..
                }
        ));
    }

    #[test]
    fn test_picker_keys_stay_in_the_picker() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("report.pdf"), b"x").expect("write");

        let mut app = objects_app();
        app.prefix = "photos/".to_string();
        app.modal = Modal::FilePicker(
            FilePicker::open(dir.path().to_path_buf(), false).expect("picker"),
        );

        assert_eq!(dispatch(&mut app, key(KeyCode::Char('j'))), None);
        assert_eq!(app.cursor, 0, "picker keys must not move the object cursor");

        dispatch(&mut app, key(KeyCode::Char('.')));
        assert!(app.session.show_hidden, "hidden toggle lands in the session");

        let command = dispatch(&mut app, key(KeyCode::Enter));
        assert_eq!(
            command,
            Some(Command::Operate(Operation::Upload {
                bucket: "media".to_string(),
                prefix: "photos/".to_string(),
                source: dir.path().join("report.pdf"),
            }))
        );
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_picker_esc_cancels_without_a_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut app = objects_app();
        app.modal = Modal::FilePicker(
            FilePicker::open(dir.path().to_path_buf(), false).expect("picker"),
        );
        assert_eq!(dispatch(&mut app, key(KeyCode::Esc)), None);
        assert!(matches!(app.modal, Modal::None));
    }

    #[test]
    fn test_download_prompts_only_for_files() {
        let mut app = objects_app();
        dispatch(&mut app, key(KeyCode::Char('o')));
        assert!(matches!(app.modal, Modal::None), "cursor is on a directory");

        dispatch(&mut app, key(KeyCode::Char('j')));
        dispatch(&mut app, key(KeyCode::Char('o')));
        assert!(matches!(
            app.modal,
            Modal::TextInput {
                kind: InputKind::Download,
                ..
            }
        ));
    }

    #[test]
    fn test_path_is_local_for_directories_and_remote_for_files() {
        let mut app = objects_app();
        assert_eq!(dispatch(&mut app, key(KeyCode::Char('c'))), None);
        assert!(
            app.status
                .as_ref()
                .is_some_and(|status| status.text == "s3://media/photos/")
        );

        dispatch(&mut app, key(KeyCode::Char('j')));
        let command = dispatch(&mut app, key(KeyCode::Char('c')));
        assert_eq!(
            command,
            Some(Command::Operate(Operation::ShowDetails {
                scheme: "s3".to_string(),
                bucket: "media".to_string(),
                key: "a.txt".to_string(),
            }))
        );
    }

    #[test]
    fn test_selection_bindings() {
        let mut app = objects_app();
        dispatch(&mut app, key(KeyCode::Char(' ')));
        assert!(app.selection.contains("photos/"));

        dispatch(&mut app, ctrl('a'));
        assert_eq!(app.selection.len(), 3);
        dispatch(&mut app, ctrl('a'));
        assert!(app.selection.is_empty());
    }
}
