use std::sync::Arc;
use std::time::Duration;

use breakglass_context::Context;

use super::Credential;
use super::FixtureCall;
use super::Index;
use super::IndexConf;
use super::IndexFixture;

fn call(op: &'static str, credential: &str) -> FixtureCall {
    FixtureCall {
        credential: credential.to_string(),
        op,
    }
}

#[tokio::test]
async fn index_rotates_after_unauthorized() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let index = Index::fixture(&context, fixture.clone());
    fixture.reject("primary");

    // First request fails on primary and is retried on secondary.
    let doc = serde_json::json!({"user": "one"});
    let response = index
        .index(&context, doc, "grants", Some("one"))
        .await
        .unwrap();
    assert_eq!(response.id, "one");
    assert_eq!(response.result, "created");

    // Later requests start with the secondary credential.
    fixture.accept("primary");
    let doc = serde_json::json!({"user": "two"});
    index
        .index(&context, doc, "grants", Some("two"))
        .await
        .unwrap();
    assert_eq!(
        fixture.calls(),
        vec![
            call("index", "primary"),
            call("index", "secondary"),
            call("index", "secondary"),
        ],
    );
}

#[tokio::test]
async fn index_returns_error_after_single_retry() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let index = Index::fixture(&context, fixture.clone());
    fixture.reject("primary");
    fixture.reject("secondary");

    let doc = serde_json::json!({});
    let error = index
        .index(&context, doc, "grants", None)
        .await
        .unwrap_err();
    assert!(super::error::is_unauthorized(&error));
    assert_eq!(fixture.calls().len(), 2);
}

#[tokio::test]
async fn index_generates_ids() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let index = Index::fixture(&context, fixture.clone());
    let response = index
        .index(&context, serde_json::json!({}), "grants", None)
        .await
        .unwrap();
    assert!(fixture.document("grants", &response.id).is_some());
}

#[tokio::test]
async fn search_follows_pagination() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    for id in 0..7 {
        fixture.insert("grants", &format!("doc-{}", id), serde_json::json!({"n": id}));
    }
    let conf = IndexConf {
        credentials: vec![Credential::named("primary")],
        search_page_size: 3,
        ..Default::default()
    };
    let index = Index::fixture_with_conf(&context, fixture.clone(), &conf);

    let hits = index
        .search(&context, super::match_all(), "grants")
        .await
        .unwrap();
    assert_eq!(hits.len(), 7);
    assert_eq!(hits[0].id, "doc-0");
    assert_eq!(hits[6].source, serde_json::json!({"n": 6}));
    assert_eq!(fixture.calls().len(), 3);
}

#[tokio::test]
async fn search_pages_past_result_window() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    fixture.result_window(10);
    for id in 0..25 {
        fixture.insert("grants", &format!("doc-{:02}", id), serde_json::json!({"n": id}));
    }
    let conf = IndexConf {
        credentials: vec![Credential::named("primary")],
        search_page_size: 4,
        ..Default::default()
    };
    let index = Index::fixture_with_conf(&context, fixture.clone(), &conf);

    let hits = index
        .search(&context, super::match_all(), "grants")
        .await
        .unwrap();
    assert_eq!(hits.len(), 25);
    assert_eq!(hits[24].id, "doc-24");
    let ids: std::collections::BTreeSet<_> = hits.iter().map(|hit| hit.id.clone()).collect();
    assert_eq!(ids.len(), 25);
    assert_eq!(fixture.calls().len(), 7);
}

#[tokio::test]
async fn search_page_larger_than_window_fails() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    fixture.result_window(10);
    fixture.insert("grants", "one", serde_json::json!({}));
    let conf = IndexConf {
        credentials: vec![Credential::named("primary")],
        search_page_size: 11,
        ..Default::default()
    };
    let index = Index::fixture_with_conf(&context, fixture, &conf);
    let result = index.search(&context, super::match_all(), "grants").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn search_missing_index_is_empty() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let index = Index::fixture(&context, fixture);
    let hits = index
        .search(&context, super::match_all(), "grants")
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn search_rotates_after_unauthorized() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    fixture.insert("grants", "one", serde_json::json!({}));
    let index = Index::fixture(&context, fixture.clone());
    fixture.reject("primary");

    let hits = index
        .search(&context, super::match_all(), "grants")
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        fixture.calls(),
        vec![call("search", "primary"), call("search", "secondary")],
    );
}

#[tokio::test]
async fn bulk_flush_on_request() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let index = Index::fixture(&context, fixture.clone());

    let doc = serde_json::json!({"user": "u"});
    index.bulk_index(&context, doc.clone(), "grants", "api+I").unwrap();
    assert!(fixture.bulk_requests().is_empty());

    index.flush().await.unwrap();
    assert_eq!(fixture.bulk_requests().len(), 1);
    assert_eq!(fixture.document("grants", "api+I"), Some(doc));
}

#[tokio::test]
async fn bulk_flush_coalesces_documents() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let index = Index::fixture(&context, fixture.clone());

    for version in 0..5 {
        let doc = serde_json::json!({"version": version});
        index.bulk_index(&context, doc, "grants", "I").unwrap();
    }
    index.flush().await.unwrap();

    let requests = fixture.bulk_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].len(), 1);
    assert_eq!(requests[0][0].document, serde_json::json!({"version": 4}));
}

#[tokio::test]
async fn bulk_flush_when_batch_is_full() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let mut conf = IndexConf {
        credentials: vec![Credential::named("primary")],
        ..Default::default()
    };
    conf.bulk.max_batch = 2;
    let index = Index::fixture_with_conf(&context, fixture.clone(), &conf);

    index
        .bulk_index(&context, serde_json::json!({}), "grants", "a")
        .unwrap();
    index
        .bulk_index(&context, serde_json::json!({}), "grants", "b")
        .unwrap();
    index
        .bulk_index(&context, serde_json::json!({}), "grants", "c")
        .unwrap();
    index.flush().await.unwrap();

    let requests = fixture.bulk_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].len(), 2);
    assert_eq!(requests[1].len(), 1);
}

#[tokio::test(start_paused = true)]
async fn bulk_flush_on_interval() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let mut conf = IndexConf {
        credentials: vec![Credential::named("primary")],
        ..Default::default()
    };
    conf.bulk.flush_interval_sec = 5;
    let index = Index::fixture_with_conf(&context, fixture.clone(), &conf);

    index
        .bulk_index(&context, serde_json::json!({}), "grants", "a")
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(fixture.bulk_requests().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(fixture.bulk_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn bulk_buffer_full_drops_documents() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let mut conf = IndexConf {
        credentials: vec![Credential::named("primary")],
        ..Default::default()
    };
    conf.bulk.max_buffered = 1;

    // Create the client without running the worker so the buffer can't drain.
    let (index, _worker) = Index::new(&context, Arc::new(fixture), &conf).unwrap();
    index
        .bulk_index(&context, serde_json::json!({}), "grants", "a")
        .unwrap();
    let error = index
        .bulk_index(&context, serde_json::json!({}), "grants", "b")
        .unwrap_err();
    assert!(error.is::<super::error::BulkBufferFull>());
}

#[tokio::test]
async fn bulk_item_unauthorized_rotates() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let index = Index::fixture(&context, fixture.clone());
    fixture.fail_item("a", 401);

    index
        .bulk_index(&context, serde_json::json!({}), "grants", "a")
        .unwrap();
    index.flush().await.unwrap();
    assert!(fixture.document("grants", "a").is_none());

    index
        .bulk_index(&context, serde_json::json!({}), "grants", "b")
        .unwrap();
    index.flush().await.unwrap();
    assert_eq!(
        fixture.calls(),
        vec![call("bulk", "primary"), call("bulk", "secondary")],
    );
}

#[tokio::test]
async fn bulk_item_other_failure_keeps_credential() {
    let context = Context::fixture();
    let fixture = IndexFixture::default();
    let index = Index::fixture(&context, fixture.clone());
    fixture.fail_item("a", 429);

    index
        .bulk_index(&context, serde_json::json!({}), "grants", "a")
        .unwrap();
    index.flush().await.unwrap();
    index
        .bulk_index(&context, serde_json::json!({}), "grants", "b")
        .unwrap();
    index.flush().await.unwrap();
    assert_eq!(
        fixture.calls(),
        vec![call("bulk", "primary"), call("bulk", "primary")],
    );
}

#[tokio::test]
async fn new_requires_credentials() {
    let context = Context::fixture();
    let conf = IndexConf::default();
    let error = Index::new(&context, Arc::new(IndexFixture::default()), &conf)
        .err()
        .unwrap();
    assert!(error.is::<super::error::NoCredentials>());
}

#[tokio::test]
async fn new_fails_when_disabled() {
    let context = Context::fixture();
    let conf = IndexConf {
        credentials: vec![Credential::named("primary")],
        enabled: false,
        ..Default::default()
    };
    let error = Index::new(&context, Arc::new(IndexFixture::default()), &conf)
        .err()
        .unwrap();
    assert!(error.is::<super::error::BackendDisabled>());
}
