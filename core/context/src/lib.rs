//! Operation scoped values for the break-glass cache.
//!
//! A root [`Context`] is created once per process with the process-wide [`Logger`].
//! Work done for a specific principal (recording a grant, persisting its document,
//! restoring it at bootstrap) runs with a derived context that knows the identity
//! and tags every log record with it.
//!
//! Contexts are cheap to clone and never mutated: derive a new one to narrow the scope.
use slog::Logger;
use slog::OwnedKV;
use slog::SendSyncRefUnwindSafeKV;

/// Immutable container of operation scoped values.
#[derive(Clone, Debug)]
pub struct Context {
    /// Identity (IAM ID) of the principal the current operation acts for, if known.
    pub identity: Option<String>,

    /// Logger with the scope attributes attached to it.
    pub logger: Logger,
}

impl Context {
    /// Start a narrower scope from this context.
    pub fn derive(&self) -> ContextBuilder {
        ContextBuilder {
            identity: self.identity.clone(),
            logger: self.logger.clone(),
        }
    }

    /// Shorthand for [`Context::derive`] with the builder changes made by `scope`.
    pub fn derive_with<F>(&self, scope: F) -> Context
    where
        F: FnOnce(ContextBuilder) -> ContextBuilder,
    {
        scope(self.derive()).build()
    }

    /// Process-wide scope with no principal attached.
    pub fn root(logger: Logger) -> ContextBuilder {
        ContextBuilder {
            identity: None,
            logger,
        }
    }
}

/// Collects changes for a root or derived [`Context`].
pub struct ContextBuilder {
    identity: Option<String>,
    logger: Logger,
}

impl ContextBuilder {
    pub fn build(self) -> Context {
        Context {
            identity: self.identity,
            logger: self.logger,
        }
    }

    /// Scope the context to operations on behalf of the given identity.
    ///
    /// Empty identities are ignored since grants without one are never persisted.
    pub fn identity<S>(mut self, identity: S) -> Self
    where
        S: Into<String>,
    {
        let identity = identity.into();
        if identity.is_empty() {
            return self;
        }
        self.logger = self
            .logger
            .new(slog::o!("identity" => identity.clone()));
        self.identity = Some(identity);
        self
    }

    /// Attach additional key/value pairs to every record logged in the new scope.
    pub fn log_values<T>(mut self, entries: OwnedKV<T>) -> Self
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        self.logger = self.logger.new(entries);
        self
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Context {
    /// Root context that discards all log records.
    pub fn fixture() -> Context {
        Context::root(Logger::root(slog::Discard, slog::o!())).build()
    }
}

#[cfg(test)]
mod tests {
    use super::Context;

    const IAM_ID: &str = "iam-ServiceId-1234";

    #[test]
    fn identity_tags_logger() {
        let context = Context::fixture().derive().identity(IAM_ID).build();
        assert_eq!(context.identity.as_deref(), Some(IAM_ID));
        assert_eq!(format!("{:?}", context.logger.list()), "(identity)");
    }

    #[test]
    fn empty_identity_keeps_parent() {
        let parent = Context::fixture().derive_with(|scope| scope.identity(IAM_ID));
        let context = parent.derive_with(|scope| scope.identity(""));
        assert_eq!(context.identity.as_deref(), Some(IAM_ID));
        assert_eq!(format!("{:?}", context.logger.list()), "(identity)");
    }

    #[test]
    fn nested_scopes_stack_log_values() {
        let task = Context::fixture().derive_with(|scope| {
            scope.log_values(slog::o!("task" => "bootstrap", "index" => "breakglass-grants"))
        });
        let context = task.derive_with(|scope| scope.identity(IAM_ID));
        assert_eq!(
            format!("{:?}", context.logger.list()),
            "(identity, index, task)"
        );
    }

    #[test]
    fn root_has_no_identity() {
        let root = Context::fixture();
        let context = root.derive().build();
        assert_eq!(context.identity, None);
        assert_eq!(
            format!("{:?}", root.logger.list()),
            format!("{:?}", context.logger.list()),
        );
    }
}
