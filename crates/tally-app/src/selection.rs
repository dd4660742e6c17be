// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::ids::RecordId;
use crate::model::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageToggle {
    Selected(usize),
    Deselected(usize),
}

/// Cursor within the current page plus the multi-select set. The set is keyed
/// by id so it survives paging, filtering and reloads.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    page: usize,
    cursor: usize,
    multi_select: bool,
    selected: BTreeSet<RecordId>,
}

impl Selection {
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn multi_select(&self) -> bool {
        self.multi_select
    }

    pub fn selected(&self) -> &BTreeSet<RecordId> {
        &self.selected
    }

    pub fn is_selected(&self, id: &RecordId) -> bool {
        self.selected.contains(id)
    }

    pub fn move_cursor(&mut self, delta: isize, page_len: usize) {
        if page_len == 0 {
            self.cursor = 0;
            return;
        }
        let next = if delta.is_negative() {
            self.cursor.saturating_sub(delta.unsigned_abs())
        } else {
            self.cursor.saturating_add(delta as usize)
        };
        self.cursor = next.min(page_len - 1);
    }

    pub fn set_page(&mut self, page: usize, page_count: usize) {
        self.page = page.min(page_count.saturating_sub(1));
        self.cursor = 0;
    }

    /// Returns false when already on the last page.
    pub fn next_page(&mut self, page_count: usize) -> bool {
        if self.page + 1 >= page_count {
            return false;
        }
        self.set_page(self.page + 1, page_count);
        true
    }

    pub fn prev_page(&mut self, page_count: usize) -> bool {
        if self.page == 0 {
            return false;
        }
        self.set_page(self.page - 1, page_count);
        true
    }

    /// Filter or query changed: back to the first row of the first page.
    pub fn reset_position(&mut self) {
        self.page = 0;
        self.cursor = 0;
    }

    /// Re-clamp after the source list changed underneath us.
    pub fn clamp(&mut self, page_count: usize, page_len: usize) {
        self.page = self.page.min(page_count.saturating_sub(1));
        self.cursor = if page_len == 0 {
            0
        } else {
            self.cursor.min(page_len - 1)
        };
    }

    pub fn toggle_multi_select(&mut self) -> bool {
        self.multi_select = !self.multi_select;
        if !self.multi_select {
            self.selected.clear();
        }
        self.multi_select
    }

    /// Leaves multi-select mode and forgets every selected id.
    pub fn exit_multi_select(&mut self) {
        self.multi_select = false;
        self.selected.clear();
    }

    pub fn toggle(&mut self, id: &RecordId) -> bool {
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.clone());
            true
        }
    }

    /// Page-scoped: if every id on the page is selected they are all removed,
    /// otherwise all of them are added. Ids on other pages are untouched.
    pub fn toggle_all_visible(&mut self, page_ids: &[RecordId]) -> PageToggle {
        let all_selected = page_ids.iter().all(|id| self.selected.contains(id));
        if all_selected {
            for id in page_ids {
                self.selected.remove(id);
            }
            PageToggle::Deselected(page_ids.len())
        } else {
            for id in page_ids {
                self.selected.insert(id.clone());
            }
            PageToggle::Selected(page_ids.len())
        }
    }

    /// Selected ids in source-list order, then ids the source no longer has.
    /// Batches run in this order, not in the order ids were toggled.
    pub fn ordered_selection(&self, records: &[Record]) -> Vec<RecordId> {
        let mut ordered = records
            .iter()
            .filter(|record| self.selected.contains(&record.id))
            .map(|record| record.id.clone())
            .collect::<Vec<_>>();
        let mut seen = ordered.iter().cloned().collect::<BTreeSet<_>>();
        for id in &self.selected {
            if seen.insert(id.clone()) {
                ordered.push(id.clone());
            }
        }
        ordered
    }
}
