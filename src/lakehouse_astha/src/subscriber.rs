//! The subscriber contract (spec.md §4.4): "Subscribers expose three
//! operations: `OnEvent(ctx, event)`, `OnHealth(ctx)`, `OnRefresh(ctx)`."

use crate::error::Result;
use crate::event::RawEvent;
use async_trait::async_trait;

/// A component registered with the [`crate::Dispatcher`]. Implementations
/// adapt the raw JSON payload into their own typed event before acting on it
/// (spec.md §9: "an adapter layer converts the raw event into the
/// subscriber's typed event before invocation").
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Handles one change-log row. Returning `Err` logs the failure and
    /// halts the poller's cursor advance for the remainder of this poll
    /// batch (spec.md §4.4 ordering guarantees).
    async fn on_event(&self, event: &RawEvent) -> Result<()>;

    /// Called on a periodic health tick.
    async fn on_health(&self) -> Result<()>;

    /// Called at dispatcher startup and on configurable refresh triggers so
    /// the subscriber can reconcile its in-memory state from the registry.
    async fn on_refresh(&self) -> Result<()>;
}
