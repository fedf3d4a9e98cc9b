//! Shareable query-string state and navigation history.
//!
//! The selection is written to the query string as
//! `?date=YYYY-MM-DD&hour=H&layer=KEY` (local date and hour). The first write
//! replaces the current history entry, later writes push new ones.

use chrono::NaiveDate;
use hrrr_common::time::{format_local_date, parse_local_date};
use hrrr_common::{LayerId, LayerRegistry};
use serde::Deserialize;
use tracing::{debug, warn};

/// What the user is looking at, in their own timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub date: NaiveDate,
    pub hour: u32,
    pub layer: LayerId,
}

impl Selection {
    pub fn new(date: NaiveDate, hour: u32, layer: impl Into<LayerId>) -> Self {
        Self {
            date,
            hour,
            layer: layer.into(),
        }
    }

    pub fn to_query(&self) -> String {
        format!(
            "?date={}&hour={}&layer={}",
            format_local_date(self.date),
            self.hour,
            urlencoding::encode(self.layer.as_str())
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawQuery {
    date: Option<String>,
    hour: Option<String>,
    layer: Option<String>,
}

/// Fields recovered from a query string. Each is `None` when absent or invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryState {
    pub date: Option<NaiveDate>,
    pub hour: Option<u32>,
    pub layer: Option<LayerId>,
}

impl QueryState {
    /// Parse `query` (with or without the leading `?`), validating each field
    /// on its own so one bad value does not discard the others.
    pub fn parse(query: &str, layers: &LayerRegistry) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let raw: RawQuery = match serde_urlencoded::from_str(query) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(query = %query, error = %e, "Unreadable query string, using defaults");
                return Self::default();
            }
        };

        let date = raw.date.and_then(|d| match parse_local_date(&d) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(error = %e, "Ignoring date parameter");
                None
            }
        });

        let hour = raw.hour.and_then(|h| match h.trim().parse::<u32>() {
            Ok(hour) if hour <= 23 => Some(hour),
            _ => {
                warn!(hour = %h, "Ignoring hour parameter");
                None
            }
        });

        let layer = raw.layer.and_then(|l| {
            if layers.contains(&l) {
                Some(LayerId(l))
            } else {
                warn!(layer = %l, "Ignoring unknown layer parameter");
                None
            }
        });

        Self { date, hour, layer }
    }

    /// Fill missing fields from `defaults`.
    pub fn resolve(&self, defaults: &Selection) -> Selection {
        Selection {
            date: self.date.unwrap_or(defaults.date),
            hour: self.hour.unwrap_or(defaults.hour),
            layer: self.layer.clone().unwrap_or_else(|| defaults.layer.clone()),
        }
    }
}

/// The address bar, as far as the browser is concerned.
pub trait History: Send {
    /// Overwrite the current entry.
    fn replace(&mut self, query: &str);

    /// Add an entry after the current one, dropping any forward entries.
    fn push(&mut self, query: &str);

    fn current(&self) -> Option<&str>;

    /// Step back and return the entry now current.
    fn back(&mut self) -> Option<String>;

    /// Step forward and return the entry now current.
    fn forward(&mut self) -> Option<String>;
}

/// In-memory session history with back/forward.
#[derive(Debug, Clone, Default)]
pub struct NavigationHistory {
    entries: Vec<String>,
    index: usize,
}

impl NavigationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

impl History for NavigationHistory {
    fn replace(&mut self, query: &str) {
        match self.entries.get_mut(self.index) {
            Some(entry) => *entry = query.to_string(),
            None => {
                self.entries.push(query.to_string());
                self.index = self.entries.len() - 1;
            }
        }
    }

    fn push(&mut self, query: &str) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push(query.to_string());
        self.index = self.entries.len() - 1;
    }

    fn current(&self) -> Option<&str> {
        self.entries.get(self.index).map(String::as_str)
    }

    fn back(&mut self) -> Option<String> {
        if self.index == 0 || self.entries.is_empty() {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index).cloned()
    }

    fn forward(&mut self) -> Option<String> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index).cloned()
    }
}

/// Mirrors the selection into a [`History`].
#[derive(Debug, Default)]
pub struct UrlStateSync {
    initialized: bool,
}

impl UrlStateSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the selection: replace on first use, push afterwards. Returns
    /// false if the entry already matched and nothing was pushed.
    pub fn write(&mut self, history: &mut dyn History, selection: &Selection) -> bool {
        let query = selection.to_query();
        if !self.initialized {
            history.replace(&query);
            self.initialized = true;
            debug!(query = %query, "Replaced history entry");
            return true;
        }
        if history.current() == Some(query.as_str()) {
            return false;
        }
        history.push(&query);
        debug!(query = %query, "Pushed history entry");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}
