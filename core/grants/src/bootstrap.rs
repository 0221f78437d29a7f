//! Restore persisted grants when the process starts.
use anyhow::Context as AnyContext;
use anyhow::Result;

use breakglass_context::Context;
use breakglass_index::Hit;

use crate::document::DocumentId;
use crate::document::GrantDocument;
use crate::document::Key;
use crate::errors::IndexUnavailable;
use crate::errors::SearchFailed;
use crate::ApiAuthorization;
use crate::GrantCache;
use crate::UserAuthorization;

/// Outcome of a bootstrap run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Documents returned by the index.
    pub documents: usize,

    /// Grants replayed into the cache.
    pub restored: usize,

    /// Documents or keys that could not be restored.
    pub skipped: usize,
}

/// Load all grants from the index into the cache, then allow writes to the index.
///
/// The [`WriteGate`](crate::WriteGate) is closed for the duration of the load and only
/// opened once every document is processed. If the index is unavailable or the search
/// fails the gate stays closed and the in-memory cache keeps working on its own.
pub async fn bootstrap(context: &Context, cache: &GrantCache) -> Result<BootstrapReport> {
    cache.gate().close();
    tokio::time::sleep(cache.conf().bootstrap_delay()).await;

    let index = match cache.index() {
        Some(index) => index,
        None => {
            slog::warn!(
                context.logger,
                "Grants index not available, grants will not be persisted"
            );
            anyhow::bail!(IndexUnavailable);
        }
    };
    let name = &cache.conf().index;
    let hits = index
        .search(context, breakglass_index::match_all(), name)
        .await
        .context(SearchFailed(name.clone()))?;

    let mut report = BootstrapReport {
        documents: hits.len(),
        ..Default::default()
    };
    for hit in hits {
        restore(context, cache, hit, &mut report);
    }
    cache.gate().open();
    slog::info!(
        context.logger, "Grants restored from index";
        "documents" => report.documents,
        "restored" => report.restored,
        "skipped" => report.skipped,
    );
    Ok(report)
}

/// Replay the grants of a single index document.
fn restore(context: &Context, cache: &GrantCache, hit: Hit, report: &mut BootstrapReport) {
    let id = match DocumentId::parse(&hit.id) {
        Some(id) => id,
        None => {
            skip(context, report, &hit.id, "empty_id", None);
            return;
        }
    };
    let document: GrantDocument = match serde_json::from_value(hit.source) {
        Ok(document) => document,
        Err(error) => {
            let error = anyhow::Error::from(error);
            skip(context, report, &hit.id, "decode", Some(&error));
            return;
        }
    };
    if document.user == hit.id {
        skip(context, report, &hit.id, "legacy_format", None);
        return;
    }

    match id {
        DocumentId::ApiKey(identity) => {
            for key in &document.keys {
                let secrets = open_secrets(cache, key);
                let (auth_key, token) = match secrets {
                    Ok(secrets) => secrets,
                    Err(error) => {
                        skip(context, report, &hit.id, "decrypt", Some(&error));
                        continue;
                    }
                };
                for (resource, permission, time) in grants(key) {
                    let authorization = ApiAuthorization {
                        auth_key: auth_key.clone(),
                        identity: identity.to_string(),
                        user: document.user.clone(),
                        source: key.source.clone(),
                        token: token.clone(),
                        resource: resource.to_string(),
                        permission: permission.to_string(),
                        time,
                    };
                    cache.add_authorization(context, authorization, true);
                    report.restored += 1;
                    crate::telemetry::BOOTSTRAP_RESTORED.inc();
                }
            }
        }
        DocumentId::Identity(identity) => {
            for key in &document.keys {
                for (resource, permission, time) in grants(key) {
                    let authorization = UserAuthorization {
                        identity: identity.to_string(),
                        user: document.user.clone(),
                        source: key.source.clone(),
                        resource: resource.to_string(),
                        permission: permission.to_string(),
                        time,
                    };
                    cache.add_user(context, authorization, true);
                    report.restored += 1;
                    crate::telemetry::BOOTSTRAP_RESTORED.inc();
                }
            }
        }
    }
}

/// Iterate over the `(resource, permission, time)` grants in a key.
fn grants(key: &Key) -> impl Iterator<Item = (&str, &str, i64)> {
    key.resources.iter().flat_map(|resource| {
        resource.permissions.iter().map(move |permission| {
            (
                resource.resource.as_str(),
                permission.permission.as_str(),
                permission.time,
            )
        })
    })
}

fn open_secrets(cache: &GrantCache, key: &Key) -> Result<(String, String)> {
    let auth_key = cache.envelope().open(&key.api_key, key.key_id)?;
    let token = cache.envelope().open(&key.token, key.key_id)?;
    Ok((auth_key, token))
}

fn skip(
    context: &Context,
    report: &mut BootstrapReport,
    id: &str,
    reason: &'static str,
    error: Option<&anyhow::Error>,
) {
    report.skipped += 1;
    crate::telemetry::BOOTSTRAP_SKIPPED
        .with_label_values(&[reason])
        .inc();
    match error {
        None => slog::warn!(
            context.logger, "Skipping grants record during bootstrap";
            "id" => id, "reason" => reason,
        ),
        Some(error) => slog::warn!(
            context.logger, "Skipping grants record during bootstrap";
            "id" => id, "reason" => reason,
            replisdk::utils::error::slog::ErrorAttributes::from(error),
        ),
    }
}
