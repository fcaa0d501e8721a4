//! `Dispatcher`: the single-writer CDC tailer (spec.md §4.4). A dedicated
//! poller task advances a cursor over the change log in bounded batches and
//! fans decoded rows out to every subscribed component, sequentially per
//! subscriber so ordering guarantees hold without extra locking on their side.

use crate::error::{Error, Result};
use crate::event::{ComponentInfo, Operation, RawEvent};
use crate::subscriber::EventSubscriber;
use lakehouse_registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug)]
pub struct DispatcherConfig {
    /// Bounded batch size per poll (spec.md §4.4 default: 10).
    pub batch_size: i64,
    /// Poll interval (spec.md §4.4 default: 100ms).
    pub poll_interval: Duration,
    /// Interval between `OnHealth` ticks.
    pub health_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_millis(100),
            health_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DispatcherStats {
    pub rows_seen: u64,
    pub rows_delivered: u64,
    pub poll_errors: u64,
}

struct Registration {
    info: ComponentInfo,
    subscriber: Arc<dyn EventSubscriber>,
}

struct RunningHandles {
    poll_handle: JoinHandle<()>,
    health_handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// Polls `change_log`, decodes rows into [`RawEvent`]s, and delivers them to
/// every component subscribed to the row's source table.
pub struct Dispatcher {
    registry: Arc<Registry>,
    config: DispatcherConfig,
    components: Arc<Mutex<Vec<Registration>>>,
    cursor: Arc<Mutex<i64>>,
    stats: Arc<Mutex<DispatcherStats>>,
    running: Mutex<Option<RunningHandles>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, config: DispatcherConfig) -> Self {
        Self {
            registry,
            config,
            components: Arc::new(Mutex::new(Vec::new())),
            cursor: Arc::new(Mutex::new(0)),
            stats: Arc::new(Mutex::new(DispatcherStats::default())),
            running: Mutex::new(None),
        }
    }

    /// `RegisterComponent` (spec.md §4.4).
    pub async fn register_component(
        &self,
        info: ComponentInfo,
        subscriber: Arc<dyn EventSubscriber>,
    ) {
        info!(component = %info.name, tables = ?info.subscribed_tables, "registering dispatcher component");
        self.components
            .lock()
            .await
            .push(Registration { info, subscriber });
    }

    /// Calls `OnRefresh` on every registered subscriber, then starts the
    /// poll loop and health-tick loop. Idempotent to the second call
    /// (spec.md §4.4: "idempotent to the second call with
    /// `AlreadyRunning`/`NotRunning` errors").
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::AlreadyRunning);
        }

        self.refresh_all().await;

        let (stop_tx, stop_rx) = watch::channel(false);

        let poll_handle = {
            let registry = self.registry.clone();
            let components = self.components.clone();
            let cursor = self.cursor.clone();
            let stats = self.stats.clone();
            let config = self.config;
            let mut stop_rx = stop_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(config.poll_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            poll_once(&registry, &components, &cursor, &stats, config.batch_size).await;
                        }
                        _ = stop_rx.changed() => {
                            if *stop_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let health_handle = {
            let components = self.components.clone();
            let config = self.config;
            let mut stop_rx = stop_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(config.health_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            health_tick(&components).await;
                        }
                        _ = stop_rx.changed() => {
                            if *stop_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        *running = Some(RunningHandles {
            poll_handle,
            health_handle,
            stop_tx,
        });
        Ok(())
    }

    /// Stops both loops and waits for the in-flight poll (if any) to finish.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(handles) = running.take() else {
            return Err(Error::NotRunning);
        };
        let _ = handles.stop_tx.send(true);
        let _ = handles.poll_handle.await;
        let _ = handles.health_handle.await;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn stats(&self) -> DispatcherStats {
        *self.stats.lock().await
    }

    pub async fn cursor(&self) -> i64 {
        *self.cursor.lock().await
    }

    /// Triggers `OnRefresh` on every subscriber outside of startup (spec.md
    /// §4.4: "after configurable triggers").
    pub async fn refresh_all(&self) {
        let components = self.components.lock().await;
        for reg in components.iter() {
            if let Err(e) = reg.subscriber.on_refresh().await {
                warn!(component = %reg.info.name, error = %e, "on_refresh failed");
            }
        }
    }
}

/// One poll cycle: read up to `batch_size` rows past the cursor and deliver
/// each, in id order, to every interested subscriber. The cursor only
/// advances past rows whose subscribers all succeeded (spec.md §4.4: "the
/// cursor advances only after all subscribers for that row return").
async fn poll_once(
    registry: &Registry,
    components: &Mutex<Vec<Registration>>,
    cursor: &Mutex<i64>,
    stats: &Mutex<DispatcherStats>,
    batch_size: i64,
) {
    let start_cursor = *cursor.lock().await;
    let rows = match registry.read_change_log_since(start_cursor, batch_size).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "failed to read change log");
            stats.lock().await.poll_errors += 1;
            return;
        }
    };
    if rows.is_empty() {
        return;
    }

    let components = components.lock().await;
    let mut advanced_to = start_cursor;

    for row in rows {
        stats.lock().await.rows_seen += 1;

        let operation: Operation = match row.operation.parse() {
            Ok(op) => op,
            Err(e) => {
                error!(row_id = row.id, error = %e, "unknown change-log operation, skipping row");
                stats.lock().await.poll_errors += 1;
                advanced_to = row.id;
                continue;
            }
        };

        let payload = match operation {
            Operation::Delete => row.before.as_deref(),
            _ => row.after.as_deref(),
        };
        let data = match payload {
            Some(text) => match serde_json::from_str(text) {
                Ok(v) => v,
                Err(e) => {
                    error!(row_id = row.id, error = %e, "malformed change-log payload, skipping row");
                    stats.lock().await.poll_errors += 1;
                    advanced_to = row.id;
                    continue;
                }
            },
            None => serde_json::Value::Null,
        };

        let event = RawEvent {
            id: row.id,
            table: row.table_name.clone(),
            operation,
            data,
            timestamp: row.timestamp.clone(),
            created_at: row.created_at.clone(),
        };

        let mut row_failed = false;
        for reg in components.iter() {
            if !reg.info.is_subscribed_to(&row.table_name) {
                continue;
            }
            if let Err(e) = reg.subscriber.on_event(&event).await {
                error!(component = %reg.info.name, row_id = row.id, error = %e, "on_event failed, halting cursor advance");
                row_failed = true;
                break;
            }
            stats.lock().await.rows_delivered += 1;
        }

        if row_failed {
            stats.lock().await.poll_errors += 1;
            break;
        }
        advanced_to = row.id;
    }

    if advanced_to != start_cursor {
        *cursor.lock().await = advanced_to;
    }
}

async fn health_tick(components: &Mutex<Vec<Registration>>) {
    let components = components.lock().await;
    for reg in components.iter() {
        if let Err(e) = reg.subscriber.on_health().await {
            warn!(component = %reg.info.name, error = %e, "on_health failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lakehouse_registry::NewColumn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingSubscriber {
        events: AtomicUsize,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl EventSubscriber for CountingSubscriber {
        async fn on_event(&self, _event: &RawEvent) -> Result<()> {
            self.events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn on_health(&self) -> Result<()> {
            Ok(())
        }
        async fn on_refresh(&self) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn long_col(name: &str, ordinal: i64) -> NewColumn {
        NewColumn {
            column_name: name.to_string(),
            data_type: "long".to_string(),
            is_nullable: true,
            is_primary: false,
            is_unique: false,
            default_value: None,
            ordinal_position: ordinal,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    #[tokio::test]
    async fn delivers_insert_event_to_subscribed_component() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("registry.db");
        let registry = Arc::new(
            Registry::open(
                &format!("sqlite://{}", db_path.to_str().unwrap()),
                tmp.path().join("data"),
            )
            .await
            .unwrap(),
        );
        registry.create_database("sales").await.unwrap();
        registry
            .create_table_with_columns(
                "sales",
                "orders",
                &[long_col("id", 1)],
                "iceberg",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(
            registry.clone(),
            DispatcherConfig {
                batch_size: 10,
                poll_interval: Duration::from_millis(10),
                health_interval: Duration::from_secs(60),
            },
        );

        let subscriber = Arc::new(CountingSubscriber {
            events: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        });
        dispatcher
            .register_component(
                ComponentInfo::new("test", "1.0", ["table_files"]),
                subscriber.clone(),
            )
            .await;

        dispatcher.start().await.unwrap();
        assert_eq!(subscriber.refreshes.load(Ordering::SeqCst), 1);

        registry
            .update_table_after_insertion(
                "sales",
                "orders",
                lakehouse_registry::NewFileInfo {
                    file_name: "f1.parquet".to_string(),
                    file_path: "sales/orders/f1.parquet".to_string(),
                    file_size: 10,
                    file_type: "parquet".to_string(),
                    partition_path: None,
                    row_count: 1,
                    checksum: None,
                    is_compressed: false,
                },
            )
            .await
            .unwrap();

        // Give the poller a few ticks.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(subscriber.events.load(Ordering::SeqCst), 1);
        assert!(dispatcher.cursor().await > 0);

        dispatcher.stop().await.unwrap();
        assert!(dispatcher.stop().await.is_err());
    }

    #[tokio::test]
    async fn second_start_fails_with_already_running() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("registry.db");
        let registry = Arc::new(
            Registry::open(
                &format!("sqlite://{}", db_path.to_str().unwrap()),
                tmp.path().join("data"),
            )
            .await
            .unwrap(),
        );
        let dispatcher = Dispatcher::new(registry, DispatcherConfig::default());
        dispatcher.start().await.unwrap();
        assert!(matches!(dispatcher.start().await, Err(Error::AlreadyRunning)));
        dispatcher.stop().await.unwrap();
    }
}
