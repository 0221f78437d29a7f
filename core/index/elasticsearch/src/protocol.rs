//! Request bodies and response payloads of the Elasticsearch HTTP API.
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use breakglass_index::BulkItem;
use breakglass_index::BulkItemResult;
use breakglass_index::Hit;
use breakglass_index::SearchPage;
use breakglass_index::SearchRequest;

use crate::error::ClientError;

/// Error type reported by Elasticsearch when creating an index that exists.
const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// How long a point in time is kept open between search pages.
pub const PIT_KEEP_ALIVE: &str = "1m";

/// Encode a batch of documents as an NDJSON `_bulk` request body.
pub fn bulk_body(items: &[BulkItem]) -> Result<String> {
    let mut body = String::new();
    for item in items {
        let action = serde_json::json!({
            "index": { "_index": item.index, "_id": item.id },
        });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&item.document)?);
        body.push('\n');
    }
    Ok(body)
}

/// Check if a request failed because the index to create already exists.
pub fn is_already_exists(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ClientError>()
        .map(|error| error.response.contains(ALREADY_EXISTS))
        .unwrap_or(false)
}

/// Position of a paginated search: the point in time searched and the last hit returned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchCursor {
    pub pit_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Json>,
}

/// Build the body of a `_search` request for one page of results.
///
/// Pages are read from a point in time and continue after the sort values of the
/// previous page, which is not bounded by the index `max_result_window`.
pub fn search_body(request: &SearchRequest, cursor: &SearchCursor) -> Json {
    let mut body = serde_json::json!({
        "pit": { "id": cursor.pit_id, "keep_alive": PIT_KEEP_ALIVE },
        "query": request.query,
        "size": request.size,
        "sort": [{ "_shard_doc": "asc" }],
        "track_total_hits": true,
    });
    if let Some(after) = &cursor.search_after {
        body["search_after"] = after.clone();
    }
    body
}

/// Response to a request opening a point in time.
#[derive(Debug, Deserialize)]
pub struct OpenPitResponse {
    pub id: String,
}

/// Response to a `_bulk` request.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub items: Vec<BulkResponseItem>,
}

impl BulkResponse {
    pub fn into_results(self) -> Vec<BulkItemResult> {
        self.items
            .into_iter()
            .filter_map(|item| item.index)
            .map(|item| BulkItemResult {
                error: item.error.map(|error| error.to_string()),
                id: item.id,
                status: item.status,
            })
            .collect()
    }
}

/// Entry for a single action in a `_bulk` response.
#[derive(Debug, Deserialize)]
pub struct BulkResponseItem {
    pub index: Option<BulkResponseAction>,
}

/// Outcome of a bulk index action.
#[derive(Debug, Deserialize)]
pub struct BulkResponseAction {
    #[serde(rename = "_id")]
    pub id: String,
    pub error: Option<Json>,
    pub status: u16,
}

/// Response to a single document index request.
#[derive(Debug, Deserialize)]
pub struct IndexResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub result: String,
    #[serde(rename = "_version")]
    pub version: Option<u64>,
}

impl From<IndexResponse> for breakglass_index::IndexResponse {
    fn from(value: IndexResponse) -> Self {
        breakglass_index::IndexResponse {
            id: value.id,
            result: value.result,
            version: value.version,
        }
    }
}

/// Response to a `_search` request.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub hits: SearchHits,
    pub pit_id: Option<String>,
}

impl SearchResponse {
    /// Convert the response into a [`SearchPage`] with a cursor to the following page.
    ///
    /// Short pages are the last ones and carry no cursor.
    pub fn into_page(self, pit_id: &str, size: usize) -> SearchPage {
        let total = self.hits.total.map(|total| match total {
            SearchTotal::Count(count) => count,
            SearchTotal::Object { value } => value,
        });
        let pit_id = self.pit_id.unwrap_or_else(|| pit_id.to_string());
        let full = self.hits.hits.len() >= size;
        let next = match self.hits.hits.last() {
            Some(SearchHit {
                sort: Some(sort), ..
            }) if full => {
                let cursor = SearchCursor {
                    pit_id,
                    search_after: Some(sort.clone()),
                };
                serde_json::to_value(cursor).ok()
            }
            _ => None,
        };
        let hits = self
            .hits
            .hits
            .into_iter()
            .map(|hit| Hit {
                id: hit.id,
                source: hit.source,
            })
            .collect();
        SearchPage { hits, next, total }
    }
}

/// Hits section of a `_search` response.
#[derive(Debug, Deserialize)]
pub struct SearchHits {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
    pub total: Option<SearchTotal>,
}

/// A document matching a search.
#[derive(Debug, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Json,
    pub sort: Option<Json>,
}

/// Total hits, reported as a number by older servers and as an object by newer ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SearchTotal {
    Count(usize),
    Object { value: usize },
}

#[cfg(test)]
mod tests {
    use breakglass_index::BulkItem;
    use breakglass_index::SearchRequest;
    use serde_json::json;

    use super::BulkResponse;
    use super::SearchCursor;
    use super::SearchResponse;
    use crate::error::ClientError;

    #[test]
    fn bulk_body_is_ndjson() {
        let items = vec![
            BulkItem {
                document: json!({"source": "a"}),
                id: "api+alice".into(),
                index: "grants".into(),
            },
            BulkItem {
                document: json!({"source": "b"}),
                id: "bob".into(),
                index: "grants".into(),
            },
        ];
        let body = super::bulk_body(&items).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));
        let action: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action, json!({"index": {"_index": "grants", "_id": "api+alice"}}));
        let doc: serde_json::Value = serde_json::from_str(lines[3]).unwrap();
        assert_eq!(doc, json!({"source": "b"}));
    }

    #[test]
    fn bulk_response_items() {
        let response: BulkResponse = serde_json::from_value(json!({
            "took": 3,
            "errors": true,
            "items": [
                {"index": {"_index": "grants", "_id": "a", "status": 201, "result": "created"}},
                {"index": {
                    "_index": "grants",
                    "_id": "b",
                    "status": 429,
                    "error": {"type": "es_rejected_execution_exception", "reason": "queue full"},
                }},
            ],
        }))
        .unwrap();
        let results = response.into_results();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert_eq!(results[1].id, "b");
        assert_eq!(results[1].status, 429);
        assert!(results[1]
            .error
            .as_ref()
            .unwrap()
            .contains("es_rejected_execution_exception"));
    }

    fn request() -> SearchRequest {
        SearchRequest {
            after: None,
            index: "grants".into(),
            query: json!({"match_all": {}}),
            size: 2,
        }
    }

    #[test]
    fn search_body_first_page() {
        let cursor = SearchCursor {
            pit_id: "pit-1".into(),
            search_after: None,
        };
        let body = super::search_body(&request(), &cursor);
        assert_eq!(body["pit"], json!({"id": "pit-1", "keep_alive": "1m"}));
        assert_eq!(body["size"], 2);
        assert_eq!(body["sort"], json!([{"_shard_doc": "asc"}]));
        assert_eq!(body["query"], json!({"match_all": {}}));
        assert!(body.get("from").is_none());
        assert!(body.get("search_after").is_none());
    }

    #[test]
    fn search_body_continues_after_cursor() {
        let cursor = SearchCursor {
            pit_id: "pit-1".into(),
            search_after: Some(json!([10042])),
        };
        let body = super::search_body(&request(), &cursor);
        assert_eq!(body["search_after"], json!([10042]));
        assert!(body.get("from").is_none());
    }

    #[test]
    fn full_page_has_cursor() {
        let response: SearchResponse = serde_json::from_value(json!({
            "pit_id": "pit-2",
            "hits": {
                "total": {"value": 12000, "relation": "eq"},
                "hits": [
                    {"_id": "a", "_source": {"source": "x"}, "sort": [10000]},
                    {"_id": "b", "_source": {"source": "y"}, "sort": [10001]},
                ],
            },
        }))
        .unwrap();
        let page = response.into_page("pit-1", 2);
        assert_eq!(page.total, Some(12000));
        assert_eq!(page.hits[1].id, "b");
        assert_eq!(page.hits[0].source, json!({"source": "x"}));
        let cursor: SearchCursor = serde_json::from_value(page.next.unwrap()).unwrap();
        assert_eq!(cursor.pit_id, "pit-2");
        assert_eq!(cursor.search_after, Some(json!([10001])));
    }

    #[test]
    fn short_page_is_last() {
        let response: SearchResponse = serde_json::from_value(json!({
            "hits": {
                "total": 1,
                "hits": [{"_id": "a", "_source": {}, "sort": [3]}],
            },
        }))
        .unwrap();
        let page = response.into_page("pit-1", 2);
        assert_eq!(page.total, Some(1));
        assert_eq!(page.hits.len(), 1);
        assert_eq!(page.next, None);
    }

    #[test]
    fn empty_page_is_last() {
        let response: SearchResponse = serde_json::from_value(json!({
            "pit_id": "pit-1",
            "hits": {"total": 0, "hits": []},
        }))
        .unwrap();
        let page = response.into_page("pit-1", 2);
        assert_eq!(page.total, Some(0));
        assert!(page.hits.is_empty());
        assert_eq!(page.next, None);
    }

    #[test]
    fn already_exists_detection() {
        let error = anyhow::anyhow!(ClientError {
            response: r#"{"error":{"type":"resource_already_exists_exception"}}"#.into(),
            status: 400,
        });
        assert!(super::is_already_exists(&error));
        let error = anyhow::anyhow!(ClientError {
            response: r#"{"error":{"type":"mapper_parsing_exception"}}"#.into(),
            status: 400,
        });
        assert!(!super::is_already_exists(&error));
    }
}
