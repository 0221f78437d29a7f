//! In-memory implementation of [`IndexBackend`] for unit tests.
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::Result;
use serde_json::Value as Json;

use breakglass_context::Context;

use crate::BulkItem;
use crate::BulkItemResult;
use crate::Credential;
use crate::Hit;
use crate::IndexBackend;
use crate::IndexDocument;
use crate::IndexResponse;
use crate::SearchPage;
use crate::SearchRequest;

/// Record of a request received by the [`IndexFixture`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixtureCall {
    /// Name of the credential the request was issued with.
    pub credential: String,

    /// Operation requested (`bulk`, `index` or `search`).
    pub op: &'static str,
}

/// In-memory mock of an index service for unit tests.
///
/// Queries are ignored: every search matches all documents in the index,
/// sorted by document ID. Search cursors carry the ID of the last hit returned.
#[derive(Clone, Default)]
pub struct IndexFixture {
    inner: Arc<Mutex<IndexFixtureState>>,
}

impl IndexFixture {
    /// Accept requests issued with the named credential again.
    pub fn accept(&self, credential: &str) {
        self.access().rejected.remove(credential);
    }

    /// All bulk requests received, in order.
    pub fn bulk_requests(&self) -> Vec<Vec<BulkItem>> {
        self.access().bulk_requests.clone()
    }

    /// All requests received, in order.
    pub fn calls(&self) -> Vec<FixtureCall> {
        self.access().calls.clone()
    }

    /// Lookup a stored document.
    pub fn document(&self, index: &str, id: &str) -> Option<Json> {
        self.access()
            .indices
            .get(index)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    /// Make the bulk item with the given ID fail with the given status.
    pub fn fail_item(&self, id: &str, status: u16) {
        self.access().item_failures.insert(id.to_string(), status);
    }

    /// Store a document directly, without recording a call.
    pub fn insert(&self, index: &str, id: &str, document: Json) {
        self.access()
            .indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document);
    }

    /// Reject requests issued with the named credential as unauthorised.
    pub fn reject(&self, credential: &str) {
        self.access().rejected.insert(credential.to_string());
    }

    /// Fail searches asking for more hits than `window` in a single page.
    ///
    /// Cursor based pages are not bounded by the window, only their size is.
    pub fn result_window(&self, window: usize) {
        self.access().result_window = Some(window);
    }

    /// Lock and access the shared inner state.
    fn access(&self) -> MutexGuard<IndexFixtureState> {
        self.inner
            .lock()
            .expect("IndexFixture::inner state lock poisoned")
    }

    /// Record a call and check the credential is accepted.
    fn authenticate(&self, op: &'static str, credential: &Credential) -> Result<()> {
        let mut state = self.access();
        state.calls.push(FixtureCall {
            credential: credential.name.clone(),
            op,
        });
        if state.rejected.contains(&credential.name) {
            anyhow::bail!(crate::error::Unauthorized(credential.name.clone()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IndexBackend for IndexFixture {
    async fn bulk(
        &self,
        _: &Context,
        credential: &Credential,
        items: &[BulkItem],
    ) -> Result<Vec<BulkItemResult>> {
        self.authenticate("bulk", credential)?;
        let mut state = self.access();
        state.bulk_requests.push(items.to_vec());
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            if let Some(status) = state.item_failures.get(&item.id).copied() {
                results.push(BulkItemResult {
                    error: Some(format!("fixture failure for '{}'", item.id)),
                    id: item.id.clone(),
                    status,
                });
                continue;
            }
            state
                .indices
                .entry(item.index.clone())
                .or_default()
                .insert(item.id.clone(), item.document.clone());
            results.push(BulkItemResult {
                error: None,
                id: item.id.clone(),
                status: 200,
            });
        }
        Ok(results)
    }

    async fn index(
        &self,
        _: &Context,
        credential: &Credential,
        request: &IndexDocument,
    ) -> Result<IndexResponse> {
        self.authenticate("index", credential)?;
        let mut state = self.access();
        state.generated_ids += 1;
        let id = request
            .id
            .clone()
            .unwrap_or_else(|| format!("generated-{}", state.generated_ids));
        let previous = state
            .indices
            .entry(request.index.clone())
            .or_default()
            .insert(id.clone(), request.document.clone());
        let result = match previous {
            None => "created",
            Some(_) => "updated",
        };
        Ok(IndexResponse {
            id,
            result: result.to_string(),
            version: None,
        })
    }

    async fn search(
        &self,
        _: &Context,
        credential: &Credential,
        request: &SearchRequest,
    ) -> Result<SearchPage> {
        self.authenticate("search", credential)?;
        let state = self.access();
        if let Some(window) = state.result_window {
            if request.size > window {
                anyhow::bail!(
                    "result window is too large, size must be less than or equal to [{}]",
                    window
                );
            }
        }
        let documents = match state.indices.get(&request.index) {
            None => return Ok(SearchPage::default()),
            Some(documents) => documents,
        };
        let after = request
            .after
            .as_ref()
            .and_then(|cursor| cursor.get("after"))
            .and_then(Json::as_str);
        let remaining = documents.iter().filter(|(id, _)| match after {
            Some(after) => id.as_str() > after,
            None => true,
        });
        let hits: Vec<Hit> = remaining
            .take(request.size)
            .map(|(id, source)| Hit {
                id: id.clone(),
                source: source.clone(),
            })
            .collect();
        let next = match hits.last() {
            Some(last) if documents.keys().next_back() != Some(&last.id) => {
                Some(serde_json::json!({ "after": last.id }))
            }
            _ => None,
        };
        Ok(SearchPage {
            hits,
            next,
            total: Some(documents.len()),
        })
    }
}

/// Container for the shared state.
#[derive(Default)]
struct IndexFixtureState {
    bulk_requests: Vec<Vec<BulkItem>>,
    calls: Vec<FixtureCall>,
    generated_ids: u64,
    indices: HashMap<String, BTreeMap<String, Json>>,
    item_failures: HashMap<String, u16>,
    rejected: HashSet<String>,
    result_window: Option<usize>,
}

impl crate::Index {
    /// Initialise an [`Index`](crate::Index) backed by an [`IndexFixture`] for unit tests.
    ///
    /// The client is configured with two credentials, `primary` and `secondary`,
    /// and its [`BulkWorker`](crate::BulkWorker) is spawned onto the current runtime.
    pub fn fixture(context: &Context, fixture: IndexFixture) -> crate::Index {
        let conf = crate::IndexConf {
            credentials: vec![
                Credential::named("primary"),
                Credential::named("secondary"),
            ],
            ..Default::default()
        };
        Self::fixture_with_conf(context, fixture, &conf)
    }

    /// Initialise an [`Index`](crate::Index) backed by an [`IndexFixture`] with custom options.
    pub fn fixture_with_conf(
        context: &Context,
        fixture: IndexFixture,
        conf: &crate::IndexConf,
    ) -> crate::Index {
        let (index, worker) = crate::Index::new(context, Arc::new(fixture), conf)
            .expect("fixture index configuration must be valid");
        tokio::spawn(worker.run());
        index
    }
}
