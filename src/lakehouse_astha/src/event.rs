//! Typed change-log events and component declarations (spec.md §4.4).

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;

/// `change_log.operation`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl std::str::FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(Error::UnknownOperation(other.to_string())),
        }
    }
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

/// A decoded change-log row, still carrying its payload as raw JSON (spec.md
/// §9: "generic event fan-out without a universal data type"). Subscribers
/// decode `data` into their own typed event via [`RawEvent::decode`].
#[derive(Clone, Debug)]
pub struct RawEvent {
    pub id: i64,
    pub table: String,
    pub operation: Operation,
    /// `after` for INSERT/UPDATE, `before` for DELETE (spec.md §4.4:
    /// "`data` is the decoded `after` payload (or `before` for DELETE)").
    pub data: serde_json::Value,
    pub timestamp: String,
    pub created_at: String,
}

impl RawEvent {
    /// Decodes `data` into a subscriber's declared concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(Into::into)
    }
}

/// `Event<T>` (spec.md §4.4): the typed view a concrete subscriber works with
/// after `RawEvent::decode`.
#[derive(Clone, Debug)]
pub struct Event<T> {
    pub id: i64,
    pub table: String,
    pub operation: Operation,
    pub data: T,
    pub timestamp: String,
    pub created_at: String,
}

impl RawEvent {
    /// Builds a fully typed [`Event<T>`] by decoding `data`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Event<T>> {
        let data = self.decode()?;
        Ok(Event {
            id: self.id,
            table: self.table,
            operation: self.operation,
            data,
            timestamp: self.timestamp,
            created_at: self.created_at,
        })
    }
}

/// Declared identity of a registered component (spec.md §4.4 `RegisterComponent`).
#[derive(Clone, Debug)]
pub struct ComponentInfo {
    pub name: String,
    pub version: String,
    pub subscribed_tables: Vec<String>,
}

impl ComponentInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        subscribed_tables: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            subscribed_tables: subscribed_tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_subscribed_to(&self, table: &str) -> bool {
        self.subscribed_tables.iter().any(|t| t == table)
    }
}
