// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use std::sync::LazyLock;

use crate::model::Record;

static MATCHER: LazyLock<SkimMatcherV2> = LazyLock::new(|| SkimMatcherV2::default().ignore_case());

/// A visible row: index into the source list plus derived values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRow {
    pub index: usize,
    pub value: i64,
    pub score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilteredView {
    rows: Vec<ViewRow>,
}

impl FilteredView {
    pub fn rows(&self) -> &[ViewRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn page_count(&self, per_page: usize) -> usize {
        page_count(self.rows.len(), per_page)
    }

    pub fn page(&self, page: usize, per_page: usize) -> &[ViewRow] {
        let per_page = per_page.max(1);
        let start = page.saturating_mul(per_page).min(self.rows.len());
        let end = start.saturating_add(per_page).min(self.rows.len());
        &self.rows[start..end]
    }
}

pub fn page_count(len: usize, per_page: usize) -> usize {
    len.div_ceil(per_page.max(1)).max(1)
}

/// Relevance of `query` against `text`, or `None` when nothing matches.
pub fn fuzzy_score(text: &str, query: &str) -> Option<i64> {
    MATCHER.fuzzy_match(text, query)
}

/// Zero filter, then fuzzy inclusion, then ordering. Never mutates `records`.
pub fn compute_view(records: &[Record], query: &str, hide_zero: bool) -> FilteredView {
    let query = query.trim();
    let mut rows = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let value = record.computed_value();
            if hide_zero && value <= 0 {
                return None;
            }
            if query.is_empty() {
                return Some(ViewRow {
                    index,
                    value,
                    score: None,
                });
            }
            let score = fuzzy_score(&record.searchable_text(), query)?;
            Some(ViewRow {
                index,
                value,
                score: Some(score),
            })
        })
        .collect::<Vec<_>>();

    if query.is_empty() {
        rows.sort_by(|left, right| right.value.cmp(&left.value));
    } else {
        rows.sort_by(|left, right| right.score.cmp(&left.score));
    }

    FilteredView { rows }
}
