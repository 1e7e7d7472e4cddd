// SQLite QueueClient Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use courier_core::application::worker::constants::IDLE_POLL_DURATION;
use courier_core::application::ShutdownToken;
use courier_core::domain::{Event, QueueName};
use courier_core::error::Result;
use courier_core::port::{EventCallback, QueueClient, TimeProvider};
use parking_lot::Mutex;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    payload: String,
}

/// Durable queue transport on a `queue_events` table.
///
/// Delivery is at-least-once: a row is deleted only after its callback has
/// returned. One client serves the consumers registered on it; build one
/// client per worker when several workers share a pool.
pub struct SqliteQueueClient {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
    consumers: Mutex<BTreeMap<QueueName, Arc<dyn EventCallback>>>,
    idle_poll: Duration,
}

impl SqliteQueueClient {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
            consumers: Mutex::new(BTreeMap::new()),
            idle_poll: IDLE_POLL_DURATION,
        }
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// Number of events waiting on `queue`
    pub async fn pending(&self, queue: &QueueName) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_events WHERE queue = ?")
            .bind(queue.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn peek_next(&self, queue: &QueueName) -> Result<Option<EventRow>> {
        sqlx::query_as::<_, EventRow>(
            "SELECT id, payload FROM queue_events WHERE queue = ? ORDER BY id ASC LIMIT 1",
        )
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn ack(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM queue_events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn registered(&self) -> Vec<(QueueName, Arc<dyn EventCallback>)> {
        self.consumers
            .lock()
            .iter()
            .map(|(queue, callback)| (queue.clone(), Arc::clone(callback)))
            .collect()
    }
}

/// Rows that no longer parse are logged with their raw payload and skipped
fn decode(queue: &QueueName, row: &EventRow) -> Option<Event> {
    match Event::from_json(&row.payload) {
        Ok(event) => Some(event),
        Err(e) => {
            error!(
                queue = %queue,
                row_id = row.id,
                payload = %row.payload,
                error = %e,
                "Dropping undecodable event"
            );
            None
        }
    }
}

#[async_trait]
impl QueueClient for SqliteQueueClient {
    fn register_consumer(&self, queue: &QueueName, callback: Arc<dyn EventCallback>) {
        self.consumers.lock().insert(queue.clone(), callback);
    }

    async fn start_consuming(&self, mut shutdown: ShutdownToken) -> Result<()> {
        loop {
            let mut delivered = false;

            for (queue, callback) in self.registered() {
                if shutdown.is_shutdown() {
                    return Ok(());
                }

                let Some(row) = self.peek_next(&queue).await? else {
                    continue;
                };
                if let Some(event) = decode(&queue, &row) {
                    callback.on_event(event).await;
                }
                self.ack(row.id).await?;
                delivered = true;
            }

            if shutdown.is_shutdown() {
                return Ok(());
            }

            if !delivered {
                tokio::select! {
                    _ = tokio::time::sleep(self.idle_poll) => {},
                    _ = shutdown.wait() => return Ok(()),
                }
            }
        }
    }

    async fn drain_queue(&self, queue: &QueueName) -> Result<Vec<Event>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT id, payload FROM queue_events WHERE queue = ? ORDER BY id ASC",
        )
        .bind(queue.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if let Some(last) = rows.last() {
            sqlx::query("DELETE FROM queue_events WHERE queue = ? AND id <= ?")
                .bind(queue.as_str())
                .bind(last.id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(queue = %queue, drained = rows.len(), "Drained queue");
        Ok(rows.iter().filter_map(|row| decode(queue, row)).collect())
    }

    async fn publish(&self, queue: &QueueName, event: &Event) -> Result<()> {
        sqlx::query("INSERT INTO queue_events (queue, payload, enqueued_at) VALUES (?, ?, ?)")
            .bind(queue.as_str())
            .bind(event.to_json())
            .bind(self.time_provider.now_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
