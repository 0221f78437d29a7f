//! Errors reported by the index client and its backends.

/// The backend is disabled by configuration.
#[derive(Debug, thiserror::Error)]
#[error("the index backend is disabled by configuration")]
pub struct BackendDisabled;

/// The bulk buffer is full and the document was dropped.
#[derive(Debug, thiserror::Error)]
#[error("bulk index buffer is full, document '{index}/{id}' was dropped")]
pub struct BulkBufferFull {
    pub id: String,
    pub index: String,
}

/// The bulk indexer is no longer running.
#[derive(Debug, thiserror::Error)]
#[error("the bulk indexer is no longer running")]
pub struct BulkIndexerClosed;

/// No credentials are configured to access the index.
#[derive(Debug, thiserror::Error)]
#[error("no credentials configured to access the index")]
pub struct NoCredentials;

/// The index rejected the credential used for the request.
///
/// Backends must attach this error (directly or as context) to HTTP 401 or equivalent
/// failures so the client can rotate credentials.
#[derive(Debug, thiserror::Error)]
#[error("the index rejected credential '{0}'")]
pub struct Unauthorized(pub String);

/// Check if an error, or any of its causes, is an authentication failure.
pub fn is_unauthorized(error: &anyhow::Error) -> bool {
    error.is::<Unauthorized>() || error.chain().any(|cause| cause.is::<Unauthorized>())
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::is_unauthorized;
    use super::Unauthorized;

    #[test]
    fn unauthorized_as_context() {
        let error: anyhow::Result<()> = Err(anyhow::anyhow!("HTTP 401"));
        let error = error.context(Unauthorized("primary".into())).unwrap_err();
        assert!(is_unauthorized(&error));
    }

    #[test]
    fn unauthorized_as_cause() {
        let error = anyhow::anyhow!(Unauthorized("primary".into())).context("search failed");
        assert!(is_unauthorized(&error));
    }

    #[test]
    fn other_errors() {
        let error = anyhow::anyhow!("HTTP 500");
        assert!(!is_unauthorized(&error));
    }
}
