//! Astha: the change-data-capture event dispatcher (spec.md §4.4). Polls
//! `lakehouse_registry`'s change log and fans out typed events to
//! subscribed components, one subscriber at a time, in change-log order.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod subscriber;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats};
pub use error::{Error, Result};
pub use event::{ComponentInfo, Event, Operation, RawEvent};
pub use subscriber::EventSubscriber;
