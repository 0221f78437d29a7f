//! Flag short-circuiting every resource authorisation as allowed.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Context as AnyContext;
use anyhow::Result;

use breakglass_context::Context;

use crate::errors::BypassFileRead;
use crate::ResourceAuthConf;

/// Bypass flag, set by configuration or read from a file mounted by a secret store.
#[derive(Debug)]
pub struct BypassFlag {
    fixed: bool,
    from_file: AtomicBool,
    path: Option<String>,
}

impl BypassFlag {
    /// Initialise the flag from configuration and read the bypass file, if any.
    pub async fn load(context: &Context, conf: &ResourceAuthConf) -> Result<BypassFlag> {
        let flag = BypassFlag {
            fixed: conf.bypass,
            from_file: AtomicBool::new(false),
            path: conf.bypass_file.clone(),
        };
        flag.refresh(context).await?;
        Ok(flag)
    }

    /// Check if resource authorisation is bypassed.
    pub fn is_set(&self) -> bool {
        self.fixed || self.from_file.load(Ordering::Acquire)
    }

    /// Read the bypass file again to pick up changes.
    pub async fn refresh(&self, context: &Context) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| BypassFileRead(path.clone()))?;
        let value = content.trim().eq_ignore_ascii_case("true");
        let previous = self.from_file.swap(value, Ordering::AcqRel);
        if previous != value {
            slog::warn!(
                context.logger, "Resource authorisation bypass changed";
                "bypass" => value, "path" => path,
            );
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl BypassFlag {
    /// Bypass flag with a fixed value for unit tests.
    pub fn fixture(bypass: bool) -> BypassFlag {
        BypassFlag {
            fixed: bypass,
            from_file: AtomicBool::new(false),
            path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use breakglass_context::Context;

    use super::BypassFlag;
    use crate::errors::BypassFileRead;
    use crate::ResourceAuthConf;

    fn temp_path(name: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "breakglass-bypass-{}-{}",
            name,
            std::process::id()
        ));
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn from_conf() {
        let context = Context::fixture();
        let conf = ResourceAuthConf {
            bypass: true,
            ..Default::default()
        };
        let flag = BypassFlag::load(&context, &conf).await.unwrap();
        assert!(flag.is_set());
    }

    #[tokio::test]
    async fn from_file() {
        let context = Context::fixture();
        let path = temp_path("from-file");
        tokio::fs::write(&path, "TRUE\n").await.unwrap();
        let conf = ResourceAuthConf {
            bypass_file: Some(path.clone()),
            ..Default::default()
        };
        let flag = BypassFlag::load(&context, &conf).await.unwrap();
        assert!(flag.is_set());

        tokio::fs::write(&path, "false").await.unwrap();
        flag.refresh(&context).await.unwrap();
        assert!(!flag.is_set());
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file() {
        let context = Context::fixture();
        let conf = ResourceAuthConf {
            bypass_file: Some(temp_path("missing")),
            ..Default::default()
        };
        let error = BypassFlag::load(&context, &conf).await.unwrap_err();
        assert!(error.is::<BypassFileRead>());
    }
}
