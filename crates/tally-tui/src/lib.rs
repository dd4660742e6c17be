// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod render;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tally_app::{
    Action, BatchItem, BrowserState, Completion, DismissToken, Effect, Key, Record, RecordId,
    RequestId, SessionToken, StatusSink, execute_batch, guard_panics,
};
use tracing::{debug, info, warn};

pub use render::{format_money, help_overlay_text};

const POLL_INTERVAL: Duration = Duration::from_millis(120);
const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);

/// What the front end needs from its host.
pub trait AppRuntime {
    fn load_records(&mut self) -> Result<Vec<Record>>;
    fn actions(&self) -> Vec<Action>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    Completion(Completion),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    status: Option<String>,
    status_token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyInput {
    Quit,
    Key(Key),
    Ignored,
}

pub fn run_app<R: AppRuntime>(state: &mut BrowserState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();
    info!(records = state.records().len(), actions = state.actions().len(), "browser started");

    let mut result = Ok(());
    loop {
        if process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx) {
            break;
        }

        if let Err(error) = terminal.draw(|frame| render::render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(POLL_INTERVAL).context("poll event")?;
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

    // Dropping the receiver here turns any late worker or timer send into a
    // no-op.
    drop(internal_rx);
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    info!("browser stopped");
    result
}

fn classify_key(key: KeyEvent) -> KeyInput {
    if key.kind == KeyEventKind::Release {
        return KeyInput::Ignored;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') => KeyInput::Quit,
            _ => KeyInput::Ignored,
        };
    }
    let classified = match key.code {
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Enter => Key::Confirm,
        KeyCode::Esc => Key::Escape,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Char(ch) => Key::Char(ch),
        _ => return KeyInput::Ignored,
    };
    KeyInput::Key(classified)
}

/// Returns true when the app should exit.
fn handle_key_event<R: AppRuntime>(
    state: &mut BrowserState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match classify_key(key) {
        KeyInput::Quit => true,
        KeyInput::Ignored => false,
        KeyInput::Key(key) => {
            let effects = state.handle_key(key);
            run_effects(state, runtime, view_data, internal_tx, effects)
        }
    }
}

fn process_internal_events<R: AppRuntime>(
    state: &mut BrowserState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) -> bool {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                view_data.status = None;
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Completion(completion) => {
                let effects = state.apply(completion);
                if run_effects(state, runtime, view_data, tx, effects) {
                    return true;
                }
            }
        }
    }
    false
}

fn run_effects<R: AppRuntime>(
    state: &mut BrowserState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    effects: Vec<Effect>,
) -> bool {
    for effect in effects {
        match effect {
            Effect::Quit => return true,
            Effect::Reload => match runtime.load_records() {
                Ok(records) => {
                    let count = records.len();
                    state.replace_records(records);
                    info!(count, "records reloaded");
                    emit_status(view_data, tx, format!("reloaded {count} records"));
                }
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "reload failed");
                    emit_status(view_data, tx, format!("reload failed: {error:#}"));
                }
            },
            Effect::Status(message) => emit_status(view_data, tx, message),
            Effect::RunAction {
                request,
                action,
                id,
                record,
            } => spawn_action(tx, request, action, id, record),
            Effect::RunBatch {
                session,
                action,
                items,
            } => spawn_batch(tx, session, action, items),
            Effect::ScheduleDismiss { token, after } => schedule_dismiss(tx, token, after),
        }
    }
    false
}

#[derive(Debug, Clone, Copy)]
enum SinkTarget {
    Request(RequestId),
    Session(SessionToken),
}

/// Forwards handler progress onto the UI channel, tagged with the run it
/// belongs to.
struct ChannelSink {
    tx: Sender<InternalEvent>,
    target: SinkTarget,
}

impl StatusSink for ChannelSink {
    fn report(&self, id: &RecordId, message: &str) {
        let completion = match self.target {
            SinkTarget::Request(request) => Completion::ActionStatus {
                request,
                message: message.to_owned(),
            },
            SinkTarget::Session(session) => Completion::ItemStatus {
                session,
                id: id.clone(),
                message: message.to_owned(),
            },
        };
        let _ = self.tx.send(InternalEvent::Completion(completion));
    }
}

fn spawn_action(
    tx: &Sender<InternalEvent>,
    request: RequestId,
    action: Action,
    id: RecordId,
    record: Record,
) {
    let sender = tx.clone();
    thread::spawn(move || {
        let sink = ChannelSink {
            tx: sender.clone(),
            target: SinkTarget::Request(request),
        };
        let result = guard_panics(|| action.single_handler().run(&id, &record, &sink))
            .map_err(|error| format!("{error:#}"));
        if let Err(error) = &result {
            warn!(action = %action.id, %id, %error, "action failed");
        } else {
            debug!(action = %action.id, %id, "action finished");
        }
        let _ = sender.send(InternalEvent::Completion(Completion::ActionFinished {
            request,
            result,
        }));
    });
}

fn spawn_batch(
    tx: &Sender<InternalEvent>,
    session: SessionToken,
    action: Action,
    items: Vec<BatchItem>,
) {
    let sender = tx.clone();
    thread::spawn(move || {
        let sink = ChannelSink {
            tx: sender.clone(),
            target: SinkTarget::Session(session),
        };
        let result = guard_panics(|| execute_batch(&action, &items, &sink))
            .map_err(|error| format!("{error:#}"));
        let _ = sender.send(InternalEvent::Completion(Completion::BatchFinished {
            session,
            result,
        }));
    });
}

fn schedule_dismiss(tx: &Sender<InternalEvent>, token: DismissToken, after: Duration) {
    let sender = tx.clone();
    thread::spawn(move || {
        thread::sleep(after);
        let _ = sender.send(InternalEvent::Completion(Completion::DismissElapsed {
            token,
        }));
    });
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    view_data.status = Some(message.into());
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, InternalEvent, KeyInput, ViewData, classify_key, handle_key_event,
        process_internal_events,
    };
    use anyhow::{Result, anyhow, bail};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::{Duration, Instant};
    use tally_app::{
        Action, ActionOutcome, BrowserState, ItemState, Key, ModalContext, Overlay, Record,
        RenderedResult, handler_fn,
    };
    use tally_testkit::fixture_records;

    #[derive(Debug, Default)]
    struct TestRuntime {
        records: Vec<Record>,
        load_count: usize,
        fail_reload: bool,
    }

    impl AppRuntime for TestRuntime {
        fn load_records(&mut self) -> Result<Vec<Record>> {
            self.load_count += 1;
            if self.fail_reload {
                bail!("source unavailable");
            }
            Ok(self.records.clone())
        }

        fn actions(&self) -> Vec<Action> {
            Vec::new()
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn channel() -> (Sender<InternalEvent>, Receiver<InternalEvent>) {
        mpsc::channel()
    }

    /// Drains worker events until `done` holds or the deadline passes.
    fn pump_until(
        state: &mut BrowserState,
        runtime: &mut TestRuntime,
        view_data: &mut ViewData,
        tx: &Sender<InternalEvent>,
        rx: &Receiver<InternalEvent>,
        done: impl Fn(&BrowserState) -> bool,
    ) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(state) {
            if Instant::now() > deadline {
                return Err(anyhow!("timed out waiting for workers"));
            }
            process_internal_events(state, runtime, view_data, tx, rx);
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    #[test]
    fn control_keys_quit_globally() {
        for ch in ['c', 'q'] {
            assert_eq!(
                classify_key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)),
                KeyInput::Quit
            );
        }
        assert_eq!(
            classify_key(press(KeyCode::Enter)),
            KeyInput::Key(Key::Confirm)
        );
        assert_eq!(classify_key(press(KeyCode::F(5))), KeyInput::Ignored);
    }

    #[test]
    fn ctrl_q_quits_even_while_searching() {
        let mut state = BrowserState::new(fixture_records(), Vec::new(), 10);
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        assert!(!handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            press(KeyCode::Char('/')),
        ));
        assert!(!handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            press(KeyCode::Char('e')),
        ));
        assert_eq!(state.query(), "e");
        assert!(handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL),
        ));
    }

    #[test]
    fn reload_replaces_records_and_reports() {
        let mut state = BrowserState::new(fixture_records(), Vec::new(), 10);
        let mut runtime = TestRuntime {
            records: fixture_records().into_iter().take(2).collect(),
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, _rx) = channel();

        handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            press(KeyCode::Char('r')),
        );
        assert_eq!(runtime.load_count, 1);
        assert_eq!(state.records().len(), 2);
        assert_eq!(view_data.status.as_deref(), Some("reloaded 2 records"));

        runtime.fail_reload = true;
        handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            press(KeyCode::Char('r')),
        );
        assert_eq!(state.records().len(), 2);
        assert_eq!(
            view_data.status.as_deref(),
            Some("reload failed: source unavailable")
        );
    }

    #[test]
    fn stale_status_clear_is_ignored() {
        let mut state = BrowserState::new(Vec::new(), Vec::new(), 10);
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData {
            status: Some("fresh".to_owned()),
            status_token: 2,
        };
        let (tx, rx) = channel();
        tx.send(InternalEvent::ClearStatus { token: 1 }).ok();
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);
        assert_eq!(view_data.status.as_deref(), Some("fresh"));

        tx.send(InternalEvent::ClearStatus { token: 2 }).ok();
        process_internal_events(&mut state, &mut runtime, &mut view_data, &tx, &rx);
        assert_eq!(view_data.status, None);
    }

    #[test]
    fn worker_result_opens_dialog() -> Result<()> {
        let action = Action::new(
            "link",
            "Dashboard",
            handler_fn(|id, record, _status| {
                Ok(ActionOutcome::Rendered(RenderedResult {
                    title: record.name.clone(),
                    body: format!("https://billing.example/{id}"),
                }))
            }),
        );
        let mut state = BrowserState::new(fixture_records(), vec![action], 10);
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = channel();

        for _ in 0..2 {
            handle_key_event(
                &mut state,
                &mut runtime,
                &mut view_data,
                &tx,
                press(KeyCode::Enter),
            );
        }
        pump_until(&mut state, &mut runtime, &mut view_data, &tx, &rx, |state| {
            state.context() == ModalContext::ResultDialog
        })?;
        let Overlay::ResultDialog(result) = state.overlay() else {
            bail!("dialog expected");
        };
        // Highest value first: Cedar Analytics.
        assert_eq!(result.body, "https://billing.example/cus_cedar");
        Ok(())
    }

    #[test]
    fn panicking_handler_shows_error_then_dismisses() -> Result<()> {
        let action = Action::new(
            "boom",
            "Boom",
            handler_fn(|_id, _record, _status| panic!("handler bug")),
        );
        let mut state = BrowserState::new(fixture_records(), vec![action], 10);
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = channel();

        for _ in 0..2 {
            handle_key_event(
                &mut state,
                &mut runtime,
                &mut view_data,
                &tx,
                press(KeyCode::Enter),
            );
        }
        pump_until(&mut state, &mut runtime, &mut view_data, &tx, &rx, |state| {
            matches!(state.overlay(), Overlay::ActionMenu(menu) if menu.dismiss_token().is_some())
        })?;
        if let Overlay::ActionMenu(menu) = state.overlay() {
            assert!(menu.status().unwrap_or_default().contains("handler bug"));
        }
        pump_until(&mut state, &mut runtime, &mut view_data, &tx, &rx, |state| {
            state.context() == ModalContext::Base
        })?;
        Ok(())
    }

    #[test]
    fn batch_worker_reports_per_item() -> Result<()> {
        let action = Action::new(
            "notify",
            "Notify",
            handler_fn(|id, _record, status| {
                status.report(id, "Notification completed successfully");
                Ok(ActionOutcome::Done)
            }),
        );
        let mut state = BrowserState::new(fixture_records(), vec![action], 10);
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = channel();

        for code in [
            KeyCode::Char('m'),
            KeyCode::Char(' '),
            KeyCode::Down,
            KeyCode::Char(' '),
            KeyCode::Enter,
            KeyCode::Enter,
        ] {
            handle_key_event(&mut state, &mut runtime, &mut view_data, &tx, press(code));
        }
        pump_until(&mut state, &mut runtime, &mut view_data, &tx, &rx, |state| {
            matches!(state.overlay(), Overlay::BatchProgress(batch) if !batch.is_running())
        })?;
        let Overlay::BatchProgress(batch) = state.overlay() else {
            bail!("batch overlay expected");
        };
        assert!(
            batch
                .entries()
                .all(|(_, status)| status.state == ItemState::Completed)
        );
        assert_eq!(batch.len(), 2);
        Ok(())
    }
}
