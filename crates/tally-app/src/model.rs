// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::Date;

use crate::ids::RecordId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub amount_cents: i64,
}

/// One browsed account. Only `searchable_text` and `computed_value` feed the
/// filter pipeline; everything else is display payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default, with = "iso_date")]
    pub created_on: Option<Date>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: String::new(),
            aliases: Vec::new(),
            plan: String::new(),
            line_items: Vec::new(),
            created_on: None,
            fields: BTreeMap::new(),
        }
    }

    /// Monthly recurring value in cents.
    pub fn computed_value(&self) -> i64 {
        self.line_items
            .iter()
            .fold(0_i64, |total, item| total.saturating_add(item.amount_cents))
    }

    pub fn searchable_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.aliases.len() + 3);
        parts.push(self.name.as_str());
        parts.push(self.id.as_str());
        parts.extend(self.aliases.iter().map(String::as_str));
        parts.push(self.email.as_str());
        parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ItemState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemExecutionStatus {
    pub state: ItemState,
    pub message: Option<String>,
}

impl ItemExecutionStatus {
    pub const fn pending() -> Self {
        Self {
            state: ItemState::Pending,
            message: None,
        }
    }
}

/// Content a handler hands back for the result dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResult {
    pub title: String,
    pub body: String,
}

/// Key events after the terminal layer classified them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Confirm,
    Escape,
    Tab,
    Backspace,
    Char(char),
}

mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;
    use time::format_description::BorrowedFormatItem;
    use time::macros::format_description;

    const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

    pub fn serialize<S: Serializer>(value: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => {
                let text = date
                    .format(DATE_FORMAT)
                    .map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Date>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|text| Date::parse(&text, DATE_FORMAT).map_err(serde::de::Error::custom))
            .transpose()
    }
}
