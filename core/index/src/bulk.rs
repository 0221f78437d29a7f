//! Buffer documents submitted for bulk indexing and periodically flush them.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use tokio::sync::oneshot;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;

use breakglass_context::Context;

use crate::conf::BulkConf;
use crate::BulkItem;
use crate::BulkItemResult;
use crate::Credentials;
use crate::IndexBackend;

/// Commands sent from [`Index`](crate::Index) clients to the [`BulkWorker`].
pub(crate) enum BulkCommand {
    /// Flush buffered documents and notify when all in-flight requests completed.
    Flush(oneshot::Sender<()>),

    /// Buffer a document for the next flush.
    Item(BulkItem),
}

/// Buffer documents submitted for bulk indexing and flush them to the index.
///
/// A flush is triggered when:
///
/// - The number of buffered documents reaches the configured batch size.
/// - The configured flush interval elapses and there are buffered documents.
/// - A flush is explicitly requested with [`Index::flush`](crate::Index::flush).
/// - All [`Index`](crate::Index) clients are dropped (the worker then exits).
///
/// Documents buffered for the same index and ID between flushes are coalesced:
/// only the last submission is sent since each one fully replaces the previous.
///
/// Up to the configured number of workers bulk requests are sent concurrently.
pub struct BulkWorker {
    backend: Arc<dyn IndexBackend>,
    buffer: Vec<BulkItem>,
    commands: Receiver<BulkCommand>,
    conf: BulkConf,
    context: Context,
    credentials: Arc<Credentials>,
    in_flight: JoinSet<()>,
    workers: Arc<Semaphore>,
}

impl BulkWorker {
    pub(crate) fn new(
        context: &Context,
        backend: Arc<dyn IndexBackend>,
        credentials: Arc<Credentials>,
        commands: Receiver<BulkCommand>,
        conf: BulkConf,
    ) -> BulkWorker {
        let workers = Arc::new(Semaphore::new(conf.workers.max(1)));
        let context = context
            .derive()
            .log_values(slog::o!("component" => "bulk-indexer"))
            .build();
        BulkWorker {
            backend,
            buffer: Vec::new(),
            commands,
            conf,
            context,
            credentials,
            in_flight: JoinSet::new(),
            workers,
        }
    }

    /// Process bulk submissions until all [`Index`](crate::Index) clients are dropped.
    pub async fn run(mut self) -> Result<()> {
        let period = Duration::from_secs(self.conf.flush_interval_sec.max(1));
        let now = Instant::now();
        let start = now.checked_add(period).unwrap_or(now);
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None => break,
                    Some(BulkCommand::Item(item)) => {
                        self.buffer.push(item);
                        if self.buffer.len() >= self.conf.max_batch.max(1) {
                            self.flush().await;
                        }
                    }
                    Some(BulkCommand::Flush(ack)) => {
                        self.flush().await;
                        self.drain().await;
                        // The requester may have given up waiting and that is fine.
                        let _ = ack.send(());
                    }
                },

                _ = interval.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush().await;
                    }
                },

                Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    self.reap(result);
                },
            }
        }

        slog::debug!(self.context.logger, "Bulk indexer shutting down");
        self.flush().await;
        self.drain().await;
        Ok(())
    }

    /// Wait for all in-flight bulk requests to complete.
    async fn drain(&mut self) {
        while let Some(result) = self.in_flight.join_next().await {
            self.reap(result);
        }
    }

    /// Send all buffered documents to the index in the background.
    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let items = coalesce(std::mem::take(&mut self.buffer));
        let permit = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let backend = Arc::clone(&self.backend);
        let context = self.context.clone();
        let credentials = Arc::clone(&self.credentials);
        self.in_flight.spawn(async move {
            send(&context, backend.as_ref(), &credentials, &items).await;
            drop(permit);
        });
    }

    /// Report on the completion of a background bulk request.
    fn reap(&self, result: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(error) = result {
            let error = anyhow::Error::from(error);
            slog::warn!(
                self.context.logger, "Bulk index request did not complete";
                replisdk::utils::error::slog::ErrorAttributes::from(&error),
            );
        }
    }
}

/// Collapse documents with the same index and ID so only the last submission is kept.
fn coalesce(items: Vec<BulkItem>) -> Vec<BulkItem> {
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut coalesced: Vec<BulkItem> = Vec::with_capacity(items.len());
    for item in items {
        let key = (item.index.clone(), item.id.clone());
        match positions.get(&key) {
            Some(position) => coalesced[*position] = item,
            None => {
                positions.insert(key, coalesced.len());
                coalesced.push(item);
            }
        }
    }
    coalesced
}

/// Send a bulk request and route failures to [`on_error`].
async fn send(
    context: &Context,
    backend: &dyn IndexBackend,
    credentials: &Credentials,
    items: &[BulkItem],
) {
    crate::telemetry::BULK_FLUSH_COUNT.inc();
    crate::telemetry::REQUEST_COUNT
        .with_label_values(&["bulk"])
        .inc();
    let (observed, credential) = credentials.current();
    match backend.bulk(context, credential, items).await {
        Err(error) => {
            crate::telemetry::REQUEST_ERR
                .with_label_values(&["bulk"])
                .inc();
            if crate::error::is_unauthorized(&error) {
                crate::rotate_credentials(context, credentials, observed, &error);
            }
            slog::error!(
                context.logger, "Bulk index request failed";
                "items" => items.len(),
                replisdk::utils::error::slog::ErrorAttributes::from(&error),
            );
        }
        Ok(results) => {
            for result in results.iter().filter(|result| !result.is_success()) {
                on_error(context, credentials, observed, &credential.name, result);
            }
        }
    }
}

/// Handle the failure of an individual bulk item.
///
/// Authentication failures rotate credentials like any other request would.
/// Items are not retried: the next change to the same document re-submits it in full.
fn on_error(
    context: &Context,
    credentials: &Credentials,
    observed: usize,
    credential: &str,
    item: &BulkItemResult,
) {
    crate::telemetry::BULK_ITEM_ERR
        .with_label_values(&[&item.status.to_string()])
        .inc();
    let message = item.error.clone().unwrap_or_default();
    if item.status == 401 {
        let error = anyhow::anyhow!(crate::error::Unauthorized(credential.to_string()))
            .context(message.clone());
        crate::rotate_credentials(context, credentials, observed, &error);
    }
    slog::warn!(
        context.logger, "Index rejected bulk item";
        "id" => &item.id,
        "status" => item.status,
        "message" => message,
    );
}

#[cfg(test)]
mod tests {
    use super::coalesce;
    use crate::BulkItem;

    fn item(id: &str, version: u64) -> BulkItem {
        BulkItem {
            document: serde_json::json!({"version": version}),
            id: id.to_string(),
            index: "grants".to_string(),
        }
    }

    #[test]
    fn coalesce_keeps_last_submission() {
        let items = vec![item("a", 1), item("b", 1), item("a", 2), item("c", 1), item("a", 3)];
        let items = coalesce(items);
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(items[0].document, serde_json::json!({"version": 3}));
    }

    #[test]
    fn coalesce_distinguishes_indices() {
        let mut other = item("a", 2);
        other.index = "other".to_string();
        let items = coalesce(vec![item("a", 1), other]);
        assert_eq!(items.len(), 2);
    }
}
