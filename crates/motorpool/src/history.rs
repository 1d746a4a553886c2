//! Recently used driver names and trip purposes.
//!
//! These lists only pre-fill the checkout form. They are kept locally and
//! mirrored to the store's `history_entries` table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum number of entries kept per list.
pub const HISTORY_LIMIT: usize = 5;

/// Number of remote rows fetched when rebuilding the lists.
pub const HISTORY_FETCH_LIMIT: usize = 50;

/// Which list a history entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// Driver names.
    Driver,
    /// Trip purposes.
    Purpose,
}

impl HistoryKind {
    /// Identifier used in the store.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Purpose => "purpose",
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "driver" => Ok(Self::Driver),
            "purpose" => Ok(Self::Purpose),
            other => Err(Error::invalid_input("history kind", other)),
        }
    }
}

/// A stored history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Which list this belongs to.
    pub kind: HistoryKind,
    /// The recorded value.
    pub value: String,
    /// When it was recorded.
    pub created_at: DateTime<Utc>,
}

/// A most-recent-first list with no duplicates, capped at [`HISTORY_LIMIT`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct RecentList {
    items: Vec<String>,
}

impl RecentList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` as the most recent entry.
    ///
    /// Blank values are ignored.
    pub fn push(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.items.retain(|item| item != value);
        self.items.insert(0, value.to_string());
        self.items.truncate(HISTORY_LIMIT);
    }

    /// Entries, most recent first.
    #[must_use]
    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// The most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.items.first().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<String>> for RecentList {
    /// Normalise an externally supplied list, keeping first occurrences.
    fn from(values: Vec<String>) -> Self {
        let mut items: Vec<String> = Vec::with_capacity(HISTORY_LIMIT);
        for value in values {
            if items.len() == HISTORY_LIMIT {
                break;
            }
            if !value.trim().is_empty() && !items.contains(&value) {
                items.push(value);
            }
        }
        Self { items }
    }
}

impl From<RecentList> for Vec<String> {
    fn from(list: RecentList) -> Self {
        list.items
    }
}

/// Rebuild both lists from stored rows ordered newest first.
///
/// Returns `(drivers, purposes)`.
#[must_use]
pub fn lists_from_entries(entries: &[HistoryEntry]) -> (RecentList, RecentList) {
    let pick = |kind: HistoryKind| {
        RecentList::from(
            entries
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| e.value.clone())
                .collect::<Vec<_>>(),
        )
    };
    (pick(HistoryKind::Driver), pick(HistoryKind::Purpose))
}
