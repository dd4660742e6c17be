// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use tally_app::{
    Action, ActionMenu, BatchPhase, BatchSession, BrowserState, ItemState, MenuPhase, Overlay,
    Record,
};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::ViewData;

const CHECKED: &str = "☑";
const UNCHECKED: &str = "☐";
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub(crate) fn render(frame: &mut ratatui::Frame<'_>, state: &BrowserState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(frame.area());

    render_table(frame, layout[0], state);

    let status_widget = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout[1]);

    match state.overlay() {
        Overlay::None => {}
        Overlay::ActionMenu(menu) => {
            let area = centered_rect(50, 40, frame.area());
            frame.render_widget(Clear, area);
            let widget = Paragraph::new(render_menu_text(state.actions(), menu))
                .block(Block::default().title("actions").borders(Borders::ALL));
            frame.render_widget(widget, area);
        }
        Overlay::SearchInput => {
            let area = bottom_strip(frame.area(), 3);
            frame.render_widget(Clear, area);
            let widget = Paragraph::new(format!("/{}_", state.query()))
                .style(Style::default().fg(Color::Cyan))
                .block(Block::default().title("search").borders(Borders::ALL));
            frame.render_widget(widget, area);
        }
        Overlay::FullScreenDetail(id) => {
            let area = frame.area();
            frame.render_widget(Clear, area);
            let body = state
                .find_record(id)
                .map(render_detail_text)
                .unwrap_or_else(|| format!("{id} is no longer in the source"));
            let widget = Paragraph::new(body)
                .wrap(Wrap { trim: false })
                .block(Block::default().title(id.as_str()).borders(Borders::ALL));
            frame.render_widget(widget, area);
        }
        Overlay::ResultDialog(result) => {
            let area = centered_rect(70, 40, frame.area());
            frame.render_widget(Clear, area);
            let widget = Paragraph::new(format!("{}\n\nesc close", result.body))
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .title(result.title.as_str())
                        .borders(Borders::ALL)
                        .style(Style::default().fg(Color::Cyan)),
                );
            frame.render_widget(widget, area);
        }
        Overlay::Help => {
            let area = centered_rect(80, 72, frame.area());
            frame.render_widget(Clear, area);
            let widget = Paragraph::new(help_overlay_text())
                .block(Block::default().title("help").borders(Borders::ALL));
            frame.render_widget(widget, area);
        }
        Overlay::BatchProgress(batch) => {
            let area = centered_rect(70, 70, frame.area());
            frame.render_widget(Clear, area);
            let widget = Paragraph::new(render_batch_text(batch, state.records()))
                .block(
                    Block::default()
                        .title(batch.label())
                        .borders(Borders::ALL),
                );
            frame.render_widget(widget, area);
        }
    }
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, state: &BrowserState) {
    let multi = state.selection().multi_select();
    let mut widths = Vec::with_capacity(6);
    if multi {
        widths.push(Constraint::Length(2));
    }
    widths.extend([
        Constraint::Min(16),
        Constraint::Length(14),
        Constraint::Length(11),
        Constraint::Length(12),
        Constraint::Length(11),
    ]);

    let mut header_labels = Vec::with_capacity(6);
    if multi {
        header_labels.push("");
    }
    header_labels.extend(["name", "id", "plan", "mrr $", "since"]);
    let header = Row::new(header_labels.into_iter().map(|label| {
        Cell::from(label).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = state.page_rows().into_iter().map(|row| {
        let mut cells = Vec::with_capacity(6);
        if multi {
            cells.push(Cell::from(if row.selected { CHECKED } else { UNCHECKED }));
        }
        let value_style = if row.value <= 0 {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        cells.extend([
            Cell::from(row.record.name.clone()),
            Cell::from(row.record.id.as_str().to_owned()),
            Cell::from(row.record.plan.clone()),
            Cell::from(format_money(row.value)).style(value_style),
            Cell::from(format_created_on(row.record)),
        ]);
        let mut style = Style::default();
        if row.selected {
            style = style.fg(Color::Green);
        }
        if row.under_cursor {
            style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
        }
        Row::new(cells).style(style)
    });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(state))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn table_title(state: &BrowserState) -> String {
    let view = state.view();
    let mut title = format!(
        "tally | page {}/{} | {} of {}",
        state.selection().page() + 1,
        view.page_count(state.items_per_page()),
        view.len(),
        state.records().len()
    );
    if !state.query().is_empty() {
        title.push_str(&format!(" | filter {:?}", state.query()));
    }
    if state.hide_zero() {
        title.push_str(" | zero hidden");
    }
    title
}

fn status_text(state: &BrowserState, view_data: &ViewData) -> String {
    let hints = match state.overlay() {
        Overlay::None => {
            "j/k move | left/right n/p page | / search c clear | tab zero | m multi | enter/x actions | v detail | r reload | ? help | q quit"
        }
        Overlay::ActionMenu(menu) => match menu.phase() {
            MenuPhase::Open => "j/k choose | enter run | esc close",
            MenuPhase::Executing { .. } => "running...",
            MenuPhase::Failed { .. } => "esc close",
        },
        Overlay::SearchInput => "type to filter | arrows move | enter actions | esc clear",
        Overlay::FullScreenDetail(_) | Overlay::ResultDialog(_) => "esc close",
        Overlay::Help => "esc or ? close",
        Overlay::BatchProgress(batch) if batch.is_running() => "esc close (work continues)",
        Overlay::BatchProgress(_) => "esc close",
    };

    let mode = if state.selection().multi_select() {
        format!("MULTI {}", state.selection().selected().len())
    } else {
        "NAV".to_owned()
    };
    match &view_data.status {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn render_menu_text(actions: &[Action], menu: &ActionMenu) -> String {
    let mut lines = actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let marker = if index == menu.cursor() { ">" } else { " " };
            let batch = if action.batch_handler().is_some() {
                " [batch]"
            } else {
                ""
            };
            format!("{marker} {}{batch}", action.label)
        })
        .collect::<Vec<_>>();

    match menu.phase() {
        MenuPhase::Open => {}
        MenuPhase::Executing { label, .. } => {
            lines.push(String::new());
            lines.push(format!("running {label}..."));
        }
        MenuPhase::Failed { .. } => lines.push(String::new()),
    }
    if let Some(status) = menu.status() {
        lines.push(status.to_owned());
    }
    lines.join("\n")
}

fn render_detail_text(record: &Record) -> String {
    let mut lines = vec![
        format!("name     {}", record.name),
        format!("id       {}", record.id),
    ];
    if !record.email.is_empty() {
        lines.push(format!("email    {}", record.email));
    }
    if !record.aliases.is_empty() {
        lines.push(format!("aliases  {}", record.aliases.join(", ")));
    }
    if !record.plan.is_empty() {
        lines.push(format!("plan     {}", record.plan));
    }
    let since = format_created_on(record);
    if !since.is_empty() {
        lines.push(format!("since    {since}"));
    }
    lines.push(format!("mrr      {}", format_money(record.computed_value())));

    if !record.line_items.is_empty() {
        lines.push(String::new());
        lines.push("line items".to_owned());
        for item in &record.line_items {
            lines.push(format!(
                "  {:<24} {:>12}",
                item.description,
                format_money(item.amount_cents)
            ));
        }
    }
    if !record.fields.is_empty() {
        lines.push(String::new());
        for (key, value) in &record.fields {
            lines.push(format!("{key}: {value}"));
        }
    }
    lines.push(String::new());
    lines.push("esc close".to_owned());
    lines.join("\n")
}

fn render_batch_text(batch: &BatchSession, records: &[Record]) -> String {
    let counts = batch.counts();
    let mut lines = vec![format!(
        "{} done | {} failed | {} running | {} pending",
        counts.completed, counts.failed, counts.in_progress, counts.pending
    )];
    match batch.phase() {
        BatchPhase::Running => {}
        BatchPhase::Finished => lines.push("finished".to_owned()),
        BatchPhase::Aborted(message) => lines.push(format!("aborted: {message}")),
    }
    lines.push(String::new());

    for (id, status) in batch.entries() {
        let name = records
            .iter()
            .find(|record| &record.id == id)
            .map_or("", |record| record.name.as_str());
        let message = status.message.as_deref().unwrap_or("");
        lines.push(
            format!("{} {id} {name}  {message}", state_glyph(status.state))
                .trim_end()
                .to_owned(),
        );
    }
    lines.join("\n")
}

fn state_glyph(state: ItemState) -> &'static str {
    match state {
        ItemState::Pending => "·",
        ItemState::InProgress => "…",
        ItemState::Completed => "✓",
        ItemState::Failed => "✗",
    }
}

fn format_created_on(record: &Record) -> String {
    record
        .created_on
        .and_then(|date| date.format(DATE_FORMAT).ok())
        .unwrap_or_default()
}

pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    let dollars = absolute / 100;
    let cents_component = absolute % 100;
    let mut grouped = String::new();
    let digits = dollars.to_string();
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{sign}${grouped}.{cents_component:02}")
}

pub fn help_overlay_text() -> &'static str {
    "global: ctrl+q or ctrl+c quit\n\
nav: j/k or up/down move | p/n or left/right page | tab hide zero-value\n\
search: / search | c clear | typing filters (q still quits) | esc clear and close | enter actions\n\
select: m multi-select | space toggle row | a toggle page\n\
actions: enter or x open menu | j/k choose | enter run | esc close\n\
view: v detail | r reload | ? help\n\
batch: runs over the selection in multi-select mode | esc close (work continues)"
}

fn bottom_strip(area: Rect, height: u16) -> Rect {
    let height = height.min(area.height);
    Rect {
        x: area.x,
        y: area.y + area.height - height,
        width: area.width,
        height,
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
        bottom_strip, format_money, help_overlay_text, render_batch_text, render_detail_text,
        render_menu_text, status_text, table_title,
    };
    use crate::ViewData;
    use ratatui::layout::Rect;
    use tally_app::{
        Action, ActionMenu, ActionOutcome, BatchSession, BrowserState, DismissToken, Key,
        RecordId, RequestId, SessionToken, handler_fn,
    };
    use tally_testkit::fixture_records;

    fn noop(label: &str) -> Action {
        Action::new(
            label.to_ascii_lowercase(),
            label,
            handler_fn(|_id, _record, _status| Ok(ActionOutcome::Done)),
        )
    }

    #[test]
    fn format_money_groups_thousands_and_keeps_sign() {
        assert_eq!(format_money(0), "$0.00");
        assert_eq!(format_money(29_900), "$299.00");
        assert_eq!(format_money(123_456_789), "$1,234,567.89");
        assert_eq!(format_money(-1_100), "-$11.00");
    }

    #[test]
    fn menu_text_marks_cursor_and_phase() {
        let actions = vec![noop("Notify"), noop("Migrate")];
        let mut menu = ActionMenu::new();
        menu.move_cursor(1, actions.len());
        let open = render_menu_text(&actions, &menu);
        assert!(open.contains("> Migrate"));
        assert!(open.contains("  Notify"));

        menu.begin(RequestId::new(1), "Migrate");
        menu.set_status("step 2 of 3");
        let running = render_menu_text(&actions, &menu);
        assert!(running.contains("running Migrate..."));
        assert!(running.ends_with("step 2 of 3"));

        menu.fail("Error: quota exceeded", DismissToken::new(2));
        assert!(render_menu_text(&actions, &menu).ends_with("Error: quota exceeded"));
    }

    #[test]
    fn batch_text_lists_items_in_run_order() {
        let records = fixture_records();
        let ids = vec![RecordId::new("cus_cedar"), RecordId::new("cus_acme")];
        let mut batch = BatchSession::start(SessionToken::new(1), "Notify", &ids);
        batch.apply_status(&ids[0], "Notification completed successfully");
        batch.apply_status(&ids[1], "ERROR: muted");
        let text = render_batch_text(&batch, &records);
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "1 done | 1 failed | 0 running | 0 pending");
        assert!(lines[2].starts_with("✓ cus_cedar Cedar Analytics"));
        assert!(lines[3].starts_with("✗ cus_acme Acme Rockets"));

        batch.finish(Err("receiver down".to_owned()));
        assert!(render_batch_text(&batch, &records).contains("aborted: receiver down"));
    }

    #[test]
    fn detail_text_includes_line_items_and_total() {
        let records = fixture_records();
        let text = render_detail_text(&records[3]);
        assert!(text.contains("Delta Freight"));
        assert!(text.contains("-$40.00"));
        assert!(text.contains("mrr      -$11.00"));
    }

    #[test]
    fn title_reflects_filter_and_paging() {
        let mut state = BrowserState::new(fixture_records(), Vec::new(), 2);
        assert_eq!(table_title(&state), "tally | page 1/3 | 5 of 5");
        state.handle_key(Key::Tab);
        state.handle_key(Key::Char('/'));
        for ch in "acme".chars() {
            state.handle_key(Key::Char(ch));
        }
        let title = table_title(&state);
        assert!(title.contains("filter \"acme\""), "{title}");
        assert!(title.contains("zero hidden"));
    }

    #[test]
    fn status_line_tracks_mode_and_overlay() {
        let mut state = BrowserState::new(fixture_records(), vec![noop("Notify")], 10);
        let view_data = ViewData {
            status: Some("reloaded 5 records".to_owned()),
            status_token: 1,
        };
        let status = status_text(&state, &view_data);
        assert!(status.starts_with("NAV | reloaded 5 records |"));

        state.handle_key(Key::Char('m'));
        state.handle_key(Key::Char(' '));
        state.handle_key(Key::Char('x'));
        let status = status_text(&state, &ViewData::default());
        assert!(status.starts_with("MULTI 1 |"));
        assert!(status.contains("enter run"));
    }

    #[test]
    fn help_mentions_every_base_binding() {
        let help = help_overlay_text();
        for needle in ["multi-select", "reload", "search", "detail", "quit"] {
            assert!(help.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn bottom_strip_fits_inside_area() {
        let area = Rect::new(0, 0, 80, 24);
        assert_eq!(bottom_strip(area, 3), Rect::new(0, 21, 80, 3));
        assert_eq!(bottom_strip(Rect::new(0, 0, 10, 2), 3).height, 2);
    }
}
