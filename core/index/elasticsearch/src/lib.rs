//! Break-glass grants index backed by an Elasticsearch compatible service.
//!
//! Requests are issued over HTTP with [`reqwest`] and authenticated with either
//! an API key or basic authentication, based on the credential in use.
use std::time::Duration;

use anyhow::Context as AnyContext;
use anyhow::Result;
use reqwest::Client;
use reqwest::RequestBuilder;

use breakglass_context::Context;
use breakglass_index::BulkItem;
use breakglass_index::BulkItemResult;
use breakglass_index::Credential;
use breakglass_index::IndexBackend;
use breakglass_index::IndexDefinition;
use breakglass_index::IndexDocument;
use breakglass_index::IndexResponse;
use breakglass_index::SearchPage;
use breakglass_index::SearchRequest;

mod conf;
pub mod error;
mod factory;
mod protocol;
pub mod telemetry;

pub use self::conf::Conf;
pub use self::conf::ConfError;
pub use self::factory::ElasticsearchFactory;

use self::error::IndexNotFound;
use self::error::InvalidCursor;
use self::telemetry::REQUEST_DURATION;

/// Access grants documents stored in Elasticsearch.
pub struct Elasticsearch {
    client: Client,
    conf: Conf,
}

impl Elasticsearch {
    /// Initialise an Elasticsearch backend from its configuration.
    pub fn new(conf: Conf) -> Result<Elasticsearch> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(conf.timeout_connect_sec))
            .timeout(Duration::from_secs(conf.timeout_sec))
            .build()
            .context(ConfError)?;
        Ok(Elasticsearch { client, conf })
    }

    /// Create an index with the given definition if it does not exist yet.
    pub async fn create_index(
        &self,
        context: &Context,
        credential: &Credential,
        index: &IndexDefinition,
    ) -> Result<()> {
        let body = serde_json::json!({ "mappings": index.mappings });
        let request = self.client.put(self.conf.endpoint(&index.name)).json(&body);
        let response = authenticate(request, credential).send().await?;
        let result = error::inspect::<serde_json::Value>(response, &credential.name).await;
        match result {
            Ok(_) => {
                slog::info!(context.logger, "Created grants index"; "index" => &index.name);
                Ok(())
            }
            Err(error) if protocol::is_already_exists(&error) => {
                slog::debug!(context.logger, "Grants index already exists"; "index" => &index.name);
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

#[async_trait::async_trait]
impl IndexBackend for Elasticsearch {
    async fn bulk(
        &self,
        _: &Context,
        credential: &Credential,
        items: &[BulkItem],
    ) -> Result<Vec<BulkItemResult>> {
        let _timer = REQUEST_DURATION.with_label_values(&["bulk"]).start_timer();
        let body = protocol::bulk_body(items)?;
        let request = self
            .client
            .post(self.conf.endpoint("_bulk"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = authenticate(request, credential).send().await?;
        let response: protocol::BulkResponse =
            error::inspect(response, &credential.name).await?;
        Ok(response.into_results())
    }

    async fn index(
        &self,
        _: &Context,
        credential: &Credential,
        request: &IndexDocument,
    ) -> Result<IndexResponse> {
        let _timer = REQUEST_DURATION.with_label_values(&["index"]).start_timer();
        let http = match &request.id {
            Some(id) => {
                let path = format!("{}/_doc/{}", request.index, id);
                self.client.put(self.conf.endpoint(&path))
            }
            None => {
                let path = format!("{}/_doc", request.index);
                self.client.post(self.conf.endpoint(&path))
            }
        };
        let http = http.json(&request.document);
        let response = authenticate(http, credential).send().await?;
        let response: protocol::IndexResponse =
            error::inspect(response, &credential.name).await?;
        Ok(response.into())
    }

    async fn search(
        &self,
        context: &Context,
        credential: &Credential,
        request: &SearchRequest,
    ) -> Result<SearchPage> {
        let _timer = REQUEST_DURATION.with_label_values(&["search"]).start_timer();
        let cursor = match &request.after {
            Some(after) => serde_json::from_value::<protocol::SearchCursor>(after.clone())
                .context(InvalidCursor)?,
            None => match self.open_pit(credential, &request.index).await {
                Ok(pit_id) => protocol::SearchCursor {
                    pit_id,
                    search_after: None,
                },
                Err(error) if error.is::<IndexNotFound>() => {
                    return Ok(SearchPage {
                        total: Some(0),
                        ..Default::default()
                    })
                }
                Err(error) => return Err(error),
            },
        };

        let body = protocol::search_body(request, &cursor);
        let http = self.client.post(self.conf.endpoint("_search")).json(&body);
        let response = authenticate(http, credential).send().await?;
        let response: protocol::SearchResponse =
            error::inspect(response, &credential.name).await?;
        let pit_id = response.pit_id.clone().unwrap_or(cursor.pit_id);
        let page = response.into_page(&pit_id, request.size);
        if page.next.is_none() {
            self.close_pit(context, credential, &pit_id).await;
        }
        Ok(page)
    }
}

impl Elasticsearch {
    /// Open a point in time to paginate searches on the index from.
    async fn open_pit(&self, credential: &Credential, index: &str) -> Result<String> {
        let path = format!("{}/_pit?keep_alive={}", index, protocol::PIT_KEEP_ALIVE);
        let http = self.client.post(self.conf.endpoint(&path));
        let response = authenticate(http, credential).send().await?;
        let response: protocol::OpenPitResponse =
            error::inspect(response, &credential.name).await?;
        Ok(response.id)
    }

    /// Release a point in time once all pages are read.
    ///
    /// Failures are only logged since the point in time expires on its own.
    async fn close_pit(&self, context: &Context, credential: &Credential, pit_id: &str) {
        let body = serde_json::json!({ "id": pit_id });
        let http = self.client.delete(self.conf.endpoint("_pit")).json(&body);
        let result = match authenticate(http, credential).send().await {
            Ok(response) => error::inspect::<serde_json::Value>(response, &credential.name)
                .await
                .map(|_| ()),
            Err(error) => Err(anyhow::Error::from(error)),
        };
        if let Err(error) = result {
            slog::debug!(
                context.logger, "Unable to close search point in time";
                "error" => %error,
            );
        }
    }
}

/// Attach the authentication details of a credential to a request.
///
/// API keys take precedence over basic authentication.
fn authenticate(request: RequestBuilder, credential: &Credential) -> RequestBuilder {
    if let Some(api_key) = &credential.api_key {
        return request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {}", api_key));
    }
    match &credential.username {
        Some(username) => request.basic_auth(username, credential.password.as_ref()),
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use breakglass_index::Credential;

    use super::authenticate;

    fn header(credential: &Credential) -> Option<String> {
        let client = reqwest::Client::new();
        let request = authenticate(client.get("http://localhost:9200/"), credential)
            .build()
            .unwrap();
        request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .map(|value| value.to_str().unwrap().to_string())
    }

    #[test]
    fn api_key_preferred() {
        let mut credential = Credential::named("primary");
        credential.api_key = Some("abc123".into());
        credential.username = Some("user".into());
        assert_eq!(header(&credential), Some("ApiKey abc123".to_string()));
    }

    #[test]
    fn basic_auth() {
        let mut credential = Credential::named("primary");
        credential.username = Some("user".into());
        credential.password = Some("pass".into());
        // base64("user:pass")
        assert_eq!(header(&credential), Some("Basic dXNlcjpwYXNz".to_string()));
    }

    #[test]
    fn anonymous() {
        let credential = Credential::named("primary");
        assert_eq!(header(&credential), None);
    }
}
