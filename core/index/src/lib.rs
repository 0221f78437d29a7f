//! Client interface to the external full-text index persisting break-glass grants.
//!
//! The [`Index`] is a thin, replayable layer over a paginated search and indexing service.
//! It supports three operations:
//!
//! - [`Index::search`]: collect all hits matching a query, following pagination.
//! - [`Index::index`]: synchronously write a single document.
//! - [`Index::bulk_index`]: enqueue a document to be written with the next bulk flush.
//!
//! ## Backends
//!
//! The wire protocol is implemented by an [`IndexBackend`], selected at runtime by ID and
//! initialised through an [`IndexFactory`].
//! Backends are stateless with respect to authentication: the [`Index`] passes them the
//! [`Credential`] to use with every request.
//!
//! ## Credential rotation
//!
//! The [`Index`] holds an ordered set of credentials and issues all requests with the current one.
//! When a backend reports an [`Unauthorized`](error::Unauthorized) error the client moves to the
//! next credential, unless another request already did so (see [`Credentials::rotate_from`]).
//! Searches and single document writes are retried once after a rotation.
//! Bulk requests are fire-and-forget: per-item failures only trigger rotation.
//!
//! ## Bulk indexing
//!
//! Documents submitted with [`Index::bulk_index`] are sent over a bounded channel to a
//! [`BulkWorker`] that buffers them and flushes when the batch is full or the flush interval
//! elapses, whichever comes first.
//! When the channel is full submissions are dropped and counted: callers re-submit a full
//! snapshot on their next change so no state is permanently lost.
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;

use breakglass_context::Context;

mod bulk;
mod conf;
mod credentials;

pub mod error;
pub mod telemetry;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::{FixtureCall, IndexFixture};

#[cfg(test)]
mod tests;

pub use self::bulk::BulkWorker;
pub use self::conf::BulkConf;
pub use self::conf::Credential;
pub use self::conf::IndexConf;
pub use self::credentials::Credentials;

use self::bulk::BulkCommand;

/// Query matching all documents in an index.
pub fn match_all() -> Json {
    serde_json::json!({"match_all": {}})
}

/// Query, write and bulk-write documents to the external index.
#[derive(Clone)]
pub struct Index {
    /// Runtime configured implementation of the index protocol.
    backend: Arc<dyn IndexBackend>,

    /// Channel to submit documents to the [`BulkWorker`].
    bulk: mpsc::Sender<BulkCommand>,

    /// Credentials to authenticate requests with.
    credentials: Arc<Credentials>,

    /// Maximum number of hits to request with each search page.
    page_size: usize,
}

impl Index {
    /// Enqueue a document to be written with the next bulk flush.
    ///
    /// The submission never blocks: if the bulk buffer is full the document is dropped
    /// and a [`BulkBufferFull`](error::BulkBufferFull) error returned.
    pub fn bulk_index(
        &self,
        context: &Context,
        document: Json,
        index: &str,
        id: &str,
    ) -> Result<()> {
        let item = BulkItem {
            document,
            id: id.to_string(),
            index: index.to_string(),
        };
        match self.bulk.try_send(BulkCommand::Item(item)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self::telemetry::BULK_DROPPED.inc();
                slog::warn!(
                    context.logger, "Bulk index buffer is full, dropping document";
                    "index" => index, "id" => id,
                );
                anyhow::bail!(self::error::BulkBufferFull {
                    id: id.to_string(),
                    index: index.to_string(),
                })
            }
            Err(TrySendError::Closed(_)) => anyhow::bail!(self::error::BulkIndexerClosed),
        }
    }

    /// Flush all documents buffered for bulk indexing and wait for the flush to complete.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.bulk
            .send(BulkCommand::Flush(ack))
            .await
            .map_err(|_| self::error::BulkIndexerClosed)?;
        done.await.map_err(|_| self::error::BulkIndexerClosed)?;
        Ok(())
    }

    /// Synchronously write a single document, retrying once after a credential rotation.
    pub async fn index(
        &self,
        context: &Context,
        document: Json,
        index: &str,
        id: Option<&str>,
    ) -> Result<IndexResponse> {
        let request = IndexDocument {
            document,
            id: id.map(String::from),
            index: index.to_string(),
        };
        self::telemetry::REQUEST_COUNT
            .with_label_values(&["index"])
            .inc();
        let (observed, credential) = self.credentials.current();
        let result = match self.backend.index(context, credential, &request).await {
            Err(error) if self::error::is_unauthorized(&error) => {
                self.rotate(context, observed, &error);
                let (_, credential) = self.credentials.current();
                self.backend.index(context, credential, &request).await
            }
            result => result,
        };
        if result.is_err() {
            self::telemetry::REQUEST_ERR
                .with_label_values(&["index"])
                .inc();
        }
        result
    }

    /// Initialise an [`Index`] client and the [`BulkWorker`] serving its bulk submissions.
    ///
    /// The returned [`BulkWorker`] must be run (usually with [`tokio::spawn`]) for
    /// bulk indexing to make progress.
    pub fn new(
        context: &Context,
        backend: Arc<dyn IndexBackend>,
        conf: &IndexConf,
    ) -> Result<(Index, BulkWorker)> {
        if !conf.enabled {
            anyhow::bail!(self::error::BackendDisabled);
        }
        let credentials = Arc::new(Credentials::new(conf.credentials.clone())?);
        let (bulk, commands) = mpsc::channel(conf.bulk.max_buffered.max(1));
        let worker = BulkWorker::new(
            context,
            Arc::clone(&backend),
            Arc::clone(&credentials),
            commands,
            conf.bulk.clone(),
        );
        let client = Index {
            backend,
            bulk,
            credentials,
            page_size: conf.search_page_size.max(1),
        };
        Ok((client, worker))
    }

    /// Search an index for all documents matching the query, following pagination.
    ///
    /// Pages are requested with the cursor returned by the previous page so the number
    /// of documents is not bounded by how deep the backend allows offsets to go.
    pub async fn search(&self, context: &Context, query: Json, index: &str) -> Result<Vec<Hit>> {
        let mut hits = Vec::new();
        let mut request = SearchRequest {
            after: None,
            index: index.to_string(),
            query,
            size: self.page_size,
        };
        loop {
            let page = self.search_page(context, &request).await?;
            let received = page.hits.len();
            hits.extend(page.hits);
            match page.next {
                Some(next) if received > 0 => request.after = Some(next),
                _ => break,
            }
        }
        Ok(hits)
    }

    /// Fetch a single search page, retrying once after a credential rotation.
    async fn search_page(&self, context: &Context, request: &SearchRequest) -> Result<SearchPage> {
        self::telemetry::REQUEST_COUNT
            .with_label_values(&["search"])
            .inc();
        let (observed, credential) = self.credentials.current();
        let result = match self.backend.search(context, credential, request).await {
            Err(error) if self::error::is_unauthorized(&error) => {
                self.rotate(context, observed, &error);
                let (_, credential) = self.credentials.current();
                self.backend.search(context, credential, request).await
            }
            result => result,
        };
        if result.is_err() {
            self::telemetry::REQUEST_ERR
                .with_label_values(&["search"])
                .inc();
        }
        result
    }

    /// Rotate credentials after an authentication failure observed on credential `observed`.
    fn rotate(&self, context: &Context, observed: usize, error: &anyhow::Error) {
        rotate_credentials(context, &self.credentials, observed, error);
    }
}

/// Rotate credentials after an authentication failure and report the outcome.
pub(crate) fn rotate_credentials(
    context: &Context,
    credentials: &Credentials,
    observed: usize,
    error: &anyhow::Error,
) {
    if credentials.rotate_from(observed) {
        self::telemetry::CREDENTIAL_ROTATIONS.inc();
        let (_, current) = credentials.current();
        slog::warn!(
            context.logger, "Index rejected credential, rotated to the next one";
            "credential" => &current.name,
            replisdk::utils::error::slog::ErrorAttributes::from(error),
        );
    }
}

/// Operations implemented by index services supported by the break-glass cache.
#[async_trait::async_trait]
pub trait IndexBackend: Send + Sync {
    /// Write a batch of documents, returning the outcome of each item.
    ///
    /// An `Err` is returned only when the request as a whole failed.
    async fn bulk(
        &self,
        context: &Context,
        credential: &Credential,
        items: &[BulkItem],
    ) -> Result<Vec<BulkItemResult>>;

    /// Write a single document.
    async fn index(
        &self,
        context: &Context,
        credential: &Credential,
        request: &IndexDocument,
    ) -> Result<IndexResponse>;

    /// Fetch one page of search results.
    async fn search(
        &self,
        context: &Context,
        credential: &Credential,
        request: &SearchRequest,
    ) -> Result<SearchPage>;
}

/// Initialisation logic for index backends.
#[async_trait::async_trait]
pub trait IndexFactory: Send + Sync {
    /// Validate the user provided configuration for the backend.
    fn conf_check(&self, context: &Context, conf: &Json) -> Result<()>;

    /// Register backend specific metrics.
    fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()>;

    /// Instantiate an [`IndexBackend`] to access the index service.
    async fn backend<'a>(&self, args: IndexFactoryArgs<'a>) -> Result<Arc<dyn IndexBackend>>;

    /// Synchronise (create or update) indices so they can store documents.
    async fn sync<'a>(&self, args: IndexFactorySyncArgs<'a>) -> Result<()>;
}

/// Arguments passed to the [`IndexFactory`] backend initialisation method.
pub struct IndexFactoryArgs<'a> {
    /// The configuration block for the backend to initialise.
    pub conf: &'a Json,

    /// Container for operation scoped values.
    pub context: &'a Context,
}

/// Arguments passed to the [`IndexFactory`] synchronisation method.
pub struct IndexFactorySyncArgs<'a> {
    /// The configuration block for the backend to synchronise.
    pub conf: &'a Json,

    /// Container for operation scoped values.
    pub context: &'a Context,

    /// Credential to authenticate synchronisation requests with.
    pub credential: &'a Credential,

    /// Indices to create along with their definition.
    pub indices: &'a [IndexDefinition],
}

/// Document submitted for bulk indexing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    /// Document to store.
    pub document: Json,

    /// ID of the document, documents with the same ID are replaced.
    pub id: String,

    /// Index to store the document in.
    pub index: String,
}

/// Outcome of an individual bulk item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    /// Error message reported by the index, if the item failed.
    pub error: Option<String>,

    /// ID of the document the result is for.
    pub id: String,

    /// HTTP-like status code of the item.
    pub status: u16,
}

impl BulkItemResult {
    /// Check if the item was stored successfully.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Search hit returned by the index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// ID of the document.
    pub id: String,

    /// Raw document body.
    pub source: Json,
}

/// Definition of an index for [`IndexFactory::sync`] to create.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Backend specific mapping of document fields.
    pub mappings: Json,

    /// Name of the index.
    pub name: String,
}

/// Request to write a single document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Document to store.
    pub document: Json,

    /// ID of the document, if not set the index generates one.
    pub id: Option<String>,

    /// Index to store the document in.
    pub index: String,
}

/// Response to a single document write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    /// ID of the stored document.
    pub id: String,

    /// Backend specific outcome (such as `created` or `updated`).
    pub result: String,

    /// Version of the document after the write, if reported.
    pub version: Option<u64>,
}

/// Request for one page of search results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Backend specific cursor returned with the previous page, `None` for the first page.
    pub after: Option<Json>,

    /// Index to search.
    pub index: String,

    /// Backend specific query.
    pub query: Json,

    /// Maximum number of hits to return.
    pub size: usize,
}

/// One page of search results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    /// Hits in this page.
    pub hits: Vec<Hit>,

    /// Cursor to request the following page with, `None` once results are exhausted.
    pub next: Option<Json>,

    /// Total number of documents matching the query, if reported.
    pub total: Option<usize>,
}
