// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::Duration;
use tracing::{debug, info};

use crate::action::{Action, ActionMenu, ActionOutcome, MenuPhase};
use crate::batch::{BatchItem, BatchPhase, BatchSession};
use crate::ids::{DismissToken, RecordId, RequestId, SessionToken, TokenAllocator};
use crate::model::{Key, Record, RenderedResult};
use crate::selection::{PageToggle, Selection};
use crate::view::{FilteredView, compute_view};

pub const DEFAULT_ITEMS_PER_PAGE: usize = 10;
pub const ERROR_DISMISS_DELAY: Duration = Duration::from_secs(2);

/// Which overlay owns the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalContext {
    Base,
    ActionMenu,
    SearchInput,
    FullScreenDetail,
    ResultDialog,
    Help,
    BatchProgress,
}

impl ModalContext {
    pub fn precedence(self) -> u8 {
        match self {
            Self::Base => 0,
            Self::ActionMenu => 1,
            Self::SearchInput => 2,
            Self::FullScreenDetail => 3,
            Self::ResultDialog => 4,
            Self::Help => 5,
            Self::BatchProgress => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Overlay {
    #[default]
    None,
    ActionMenu(ActionMenu),
    SearchInput,
    FullScreenDetail(RecordId),
    ResultDialog(RenderedResult),
    Help,
    BatchProgress(BatchSession),
}

impl Overlay {
    pub fn precedence(&self) -> u8 {
        self.context().precedence()
    }

    pub fn context(&self) -> ModalContext {
        match self {
            Self::None => ModalContext::Base,
            Self::ActionMenu(_) => ModalContext::ActionMenu,
            Self::SearchInput => ModalContext::SearchInput,
            Self::FullScreenDetail(_) => ModalContext::FullScreenDetail,
            Self::ResultDialog(_) => ModalContext::ResultDialog,
            Self::Help => ModalContext::Help,
            Self::BatchProgress(_) => ModalContext::BatchProgress,
        }
    }
}

/// Work the host has to carry out on behalf of the state machine.
#[derive(Debug, Clone)]
pub enum Effect {
    Quit,
    Reload,
    Status(String),
    RunAction {
        request: RequestId,
        action: Action,
        id: RecordId,
        record: Record,
    },
    RunBatch {
        session: SessionToken,
        action: Action,
        items: Vec<BatchItem>,
    },
    ScheduleDismiss {
        token: DismissToken,
        after: Duration,
    },
}

/// Asynchronous results fed back from handler workers and timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    ActionStatus {
        request: RequestId,
        message: String,
    },
    ActionFinished {
        request: RequestId,
        result: Result<ActionOutcome, String>,
    },
    ItemStatus {
        session: SessionToken,
        id: RecordId,
        message: String,
    },
    BatchFinished {
        session: SessionToken,
        result: Result<(), String>,
    },
    DismissElapsed {
        token: DismissToken,
    },
}

/// One row of the current page, ready to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRow<'a> {
    pub record: &'a Record,
    pub value: i64,
    pub selected: bool,
    pub under_cursor: bool,
}

#[derive(Debug, Clone)]
pub struct BrowserState {
    records: Vec<Record>,
    actions: Vec<Action>,
    query: String,
    hide_zero: bool,
    items_per_page: usize,
    selection: Selection,
    overlay: Overlay,
    tokens: TokenAllocator,
}

impl BrowserState {
    pub fn new(records: Vec<Record>, actions: Vec<Action>, items_per_page: usize) -> Self {
        Self {
            records,
            actions,
            query: String::new(),
            hide_zero: false,
            items_per_page: items_per_page.max(1),
            selection: Selection::default(),
            overlay: Overlay::None,
            tokens: TokenAllocator::default(),
        }
    }

    pub fn with_hide_zero(mut self, hide_zero: bool) -> Self {
        self.hide_zero = hide_zero;
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn hide_zero(&self) -> bool {
        self.hide_zero
    }

    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn context(&self) -> ModalContext {
        self.overlay.context()
    }

    pub fn view(&self) -> FilteredView {
        compute_view(&self.records, &self.query, self.hide_zero)
    }

    pub fn page_count(&self) -> usize {
        self.view().page_count(self.items_per_page)
    }

    pub fn page_rows(&self) -> Vec<PageRow<'_>> {
        let view = self.view();
        view.page(self.selection.page(), self.items_per_page)
            .iter()
            .enumerate()
            .map(|(position, row)| {
                let record = &self.records[row.index];
                PageRow {
                    record,
                    value: row.value,
                    selected: self.selection.is_selected(&record.id),
                    under_cursor: position == self.selection.cursor(),
                }
            })
            .collect()
    }

    pub fn cursor_record(&self) -> Option<&Record> {
        let view = self.view();
        let row = view
            .page(self.selection.page(), self.items_per_page)
            .get(self.selection.cursor())
            .copied()?;
        self.records.get(row.index)
    }

    pub fn find_record(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|record| &record.id == id)
    }

    /// Swaps in a freshly loaded source list. Selected ids are kept even if
    /// the new list no longer contains them.
    pub fn replace_records(&mut self, records: Vec<Record>) {
        self.records = records;
        let (page_count, page_len) = self.page_shape();
        self.selection.clamp(page_count, page_len);
        let detail_gone = match &self.overlay {
            Overlay::FullScreenDetail(id) => self.find_record(id).is_none(),
            _ => false,
        };
        if detail_gone {
            self.overlay = Overlay::None;
        }
    }

    /// Single entry point for key input. Exactly one consumer sees the key.
    pub fn handle_key(&mut self, key: Key) -> Vec<Effect> {
        match self.overlay.context() {
            ModalContext::BatchProgress => self.handle_batch_progress_key(key),
            ModalContext::Help => {
                if matches!(key, Key::Escape | Key::Char('?')) {
                    self.overlay = Overlay::None;
                }
                Vec::new()
            }
            ModalContext::ResultDialog | ModalContext::FullScreenDetail => {
                if key == Key::Escape {
                    self.overlay = Overlay::None;
                }
                Vec::new()
            }
            ModalContext::SearchInput => self.handle_search_key(key),
            ModalContext::ActionMenu => self.handle_menu_key(key),
            ModalContext::Base => self.handle_nav_key(key),
        }
    }

    /// Applies a worker or timer result. Results from superseded runs are
    /// dropped.
    pub fn apply(&mut self, completion: Completion) -> Vec<Effect> {
        match completion {
            Completion::ActionStatus { request, message } => {
                match self.executing_menu(request) {
                    Some(menu) => menu.set_status(message),
                    None => debug!(request = request.get(), "stale action status dropped"),
                }
                Vec::new()
            }
            Completion::ActionFinished { request, result } => self.finish_action(request, result),
            Completion::ItemStatus {
                session,
                id,
                message,
            } => {
                match self.batch_session(session) {
                    Some(batch) => {
                        batch.apply_status(&id, &message);
                    }
                    None => {
                        debug!(session = session.get(), %id, "stale batch status dropped");
                    }
                }
                Vec::new()
            }
            Completion::BatchFinished { session, result } => {
                let Some(batch) = self.batch_session(session) else {
                    debug!(session = session.get(), "stale batch completion dropped");
                    return Vec::new();
                };
                batch.finish(result);
                let counts = batch.counts();
                let summary = match batch.phase() {
                    BatchPhase::Aborted(message) => format!("batch aborted: {message}"),
                    _ => format!(
                        "batch done: {} completed, {} failed",
                        counts.completed, counts.failed
                    ),
                };
                vec![Effect::Status(summary)]
            }
            Completion::DismissElapsed { token } => {
                let due = matches!(
                    &self.overlay,
                    Overlay::ActionMenu(menu) if menu.dismiss_token() == Some(token)
                );
                if due {
                    self.overlay = Overlay::None;
                } else {
                    debug!(token = token.get(), "stale dismiss timer dropped");
                }
                Vec::new()
            }
        }
    }

    fn handle_batch_progress_key(&mut self, key: Key) -> Vec<Effect> {
        if key != Key::Escape {
            return Vec::new();
        }
        if let Overlay::BatchProgress(batch) = &self.overlay {
            info!(
                session = batch.token().get(),
                running = batch.is_running(),
                "batch overlay closed"
            );
        }
        // Handlers still in flight keep running; their reports no longer
        // match any session and are dropped in `apply`.
        self.overlay = Overlay::None;
        self.selection.exit_multi_select();
        vec![Effect::Status("batch closed".to_owned())]
    }

    fn handle_search_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Escape => {
                self.query.clear();
                self.overlay = Overlay::None;
                self.selection.reset_position();
                vec![Effect::Status("search cleared".to_owned())]
            }
            Key::Confirm => {
                self.overlay = Overlay::None;
                self.handle_nav_key(key)
            }
            Key::Up | Key::Down | Key::Left | Key::Right | Key::Tab | Key::Char('q') => {
                self.handle_nav_key(key)
            }
            Key::Backspace => {
                if self.query.pop().is_some() {
                    self.selection.reset_position();
                }
                Vec::new()
            }
            Key::Char(ch) => {
                self.query.push(ch);
                self.selection.reset_position();
                Vec::new()
            }
        }
    }

    fn handle_menu_key(&mut self, key: Key) -> Vec<Effect> {
        let action_count = self.actions.len();
        let Overlay::ActionMenu(menu) = &mut self.overlay else {
            return Vec::new();
        };
        match menu.phase() {
            MenuPhase::Executing { .. } => Vec::new(),
            MenuPhase::Failed { .. } => {
                if key == Key::Escape {
                    self.overlay = Overlay::None;
                }
                Vec::new()
            }
            MenuPhase::Open => match key {
                Key::Up | Key::Char('k') => {
                    menu.move_cursor(-1, action_count);
                    Vec::new()
                }
                Key::Down | Key::Char('j') => {
                    menu.move_cursor(1, action_count);
                    Vec::new()
                }
                Key::Confirm => self.execute_selected(),
                Key::Escape => {
                    self.overlay = Overlay::None;
                    Vec::new()
                }
                _ => Vec::new(),
            },
        }
    }

    fn handle_nav_key(&mut self, key: Key) -> Vec<Effect> {
        match key {
            Key::Char('q') => vec![Effect::Quit],
            Key::Up | Key::Char('k') => {
                self.move_cursor(-1);
                Vec::new()
            }
            Key::Down | Key::Char('j') => {
                self.move_cursor(1);
                Vec::new()
            }
            Key::Left | Key::Char('p') => {
                let (page_count, _) = self.page_shape();
                self.selection.prev_page(page_count);
                Vec::new()
            }
            Key::Right | Key::Char('n') => {
                let (page_count, _) = self.page_shape();
                self.selection.next_page(page_count);
                Vec::new()
            }
            Key::Char('m') => {
                let enabled = self.selection.toggle_multi_select();
                let label = if enabled {
                    "multi-select on"
                } else {
                    "multi-select off"
                };
                vec![Effect::Status(label.to_owned())]
            }
            Key::Char(' ') => self.toggle_current(),
            Key::Char('a') => self.toggle_all_visible(),
            Key::Char('v') => {
                let Some(id) = self.cursor_record().map(|record| record.id.clone()) else {
                    return vec![Effect::Status("nothing to show".to_owned())];
                };
                self.open_overlay(Overlay::FullScreenDetail(id));
                Vec::new()
            }
            Key::Char('x') | Key::Confirm => self.open_menu(),
            Key::Char('/') => {
                self.open_overlay(Overlay::SearchInput);
                Vec::new()
            }
            Key::Char('c') => {
                if self.query.is_empty() {
                    return Vec::new();
                }
                self.query.clear();
                self.selection.reset_position();
                vec![Effect::Status("search cleared".to_owned())]
            }
            Key::Tab => {
                self.hide_zero = !self.hide_zero;
                self.selection.reset_position();
                let label = if self.hide_zero {
                    "zero-value hidden"
                } else {
                    "zero-value shown"
                };
                vec![Effect::Status(label.to_owned())]
            }
            Key::Char('r') => vec![Effect::Reload],
            Key::Char('?') => {
                self.open_overlay(Overlay::Help);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn open_menu(&mut self) -> Vec<Effect> {
        if self.actions.is_empty() {
            return vec![Effect::Status("no actions configured".to_owned())];
        }
        self.open_overlay(Overlay::ActionMenu(ActionMenu::new()));
        Vec::new()
    }

    /// Batch when multi-select holds ids, otherwise the highlighted action
    /// against the record under the cursor.
    fn execute_selected(&mut self) -> Vec<Effect> {
        let Overlay::ActionMenu(menu) = &self.overlay else {
            return Vec::new();
        };
        let Some(action) = self.actions.get(menu.cursor()).cloned() else {
            return Vec::new();
        };

        if self.selection.multi_select() && !self.selection.selected().is_empty() {
            let ids = self.selection.ordered_selection(&self.records);
            let items = ids
                .iter()
                .map(|id| BatchItem {
                    id: id.clone(),
                    record: self.find_record(id).cloned(),
                })
                .collect::<Vec<_>>();
            let session: SessionToken = self.tokens.next();
            info!(session = session.get(), action = %action.id, items = ids.len(), "batch started");
            self.overlay = Overlay::BatchProgress(BatchSession::start(session, &action.label, &ids));
            return vec![Effect::RunBatch {
                session,
                action,
                items,
            }];
        }

        let Some(record) = self.cursor_record().cloned() else {
            return vec![Effect::Status("no record under cursor".to_owned())];
        };
        let request: RequestId = self.tokens.next();
        if let Overlay::ActionMenu(menu) = &mut self.overlay {
            menu.begin(request, action.label.clone());
        }
        debug!(request = request.get(), action = %action.id, id = %record.id, "action started");
        vec![Effect::RunAction {
            request,
            action,
            id: record.id.clone(),
            record,
        }]
    }

    fn finish_action(
        &mut self,
        request: RequestId,
        result: Result<ActionOutcome, String>,
    ) -> Vec<Effect> {
        let label = match self.overlay {
            Overlay::ActionMenu(ref menu) if menu.executing_request() == Some(request) => {
                match menu.phase() {
                    MenuPhase::Executing { label, .. } => label.clone(),
                    _ => String::new(),
                }
            }
            _ => {
                debug!(request = request.get(), "stale action result dropped");
                return Vec::new();
            }
        };

        match result {
            Ok(ActionOutcome::Rendered(rendered)) => {
                self.open_overlay(Overlay::ResultDialog(rendered));
                Vec::new()
            }
            Ok(ActionOutcome::Done) => {
                self.overlay = Overlay::None;
                vec![Effect::Status(format!("{label}: done"))]
            }
            Ok(ActionOutcome::Value(value)) => {
                self.overlay = Overlay::None;
                vec![Effect::Status(format!("{label}: {value}"))]
            }
            Err(message) => {
                let token: DismissToken = self.tokens.next();
                if let Overlay::ActionMenu(menu) = &mut self.overlay {
                    menu.fail(format!("Error: {message}"), token);
                }
                vec![Effect::ScheduleDismiss {
                    token,
                    after: ERROR_DISMISS_DELAY,
                }]
            }
        }
    }

    fn toggle_current(&mut self) -> Vec<Effect> {
        if !self.selection.multi_select() {
            return vec![Effect::Status("press m for multi-select".to_owned())];
        }
        let Some(id) = self.cursor_record().map(|record| record.id.clone()) else {
            return Vec::new();
        };
        self.selection.toggle(&id);
        vec![Effect::Status(format!(
            "{} selected",
            self.selection.selected().len()
        ))]
    }

    fn toggle_all_visible(&mut self) -> Vec<Effect> {
        if !self.selection.multi_select() {
            return vec![Effect::Status("press m for multi-select".to_owned())];
        }
        let page_ids = self
            .page_rows()
            .iter()
            .map(|row| row.record.id.clone())
            .collect::<Vec<_>>();
        let message = match self.selection.toggle_all_visible(&page_ids) {
            PageToggle::Selected(count) => format!("page selected ({count})"),
            PageToggle::Deselected(count) => format!("page cleared ({count})"),
        };
        vec![Effect::Status(message)]
    }

    fn move_cursor(&mut self, delta: isize) {
        let (_, page_len) = self.page_shape();
        self.selection.move_cursor(delta, page_len);
    }

    fn page_shape(&self) -> (usize, usize) {
        let view = self.view();
        let page_count = view.page_count(self.items_per_page);
        let page = self.selection.page().min(page_count.saturating_sub(1));
        (page_count, view.page(page, self.items_per_page).len())
    }

    /// Replaces the overlay unless a higher-precedence one is showing.
    fn open_overlay(&mut self, next: Overlay) -> bool {
        let current = self.overlay.context();
        if current != ModalContext::Base && next.precedence() < current.precedence() {
            debug!(?current, next = ?next.context(), "overlay blocked by higher precedence");
            return false;
        }
        self.overlay = next;
        true
    }

    fn executing_menu(&mut self, request: RequestId) -> Option<&mut ActionMenu> {
        match &mut self.overlay {
            Overlay::ActionMenu(menu) if menu.executing_request() == Some(request) => Some(menu),
            _ => None,
        }
    }

    fn batch_session(&mut self, session: SessionToken) -> Option<&mut BatchSession> {
        match &mut self.overlay {
            Overlay::BatchProgress(batch) if batch.token() == session => Some(batch),
            _ => None,
        }
    }
}
