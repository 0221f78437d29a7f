//! Load configuration from files.
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;

use crate::Conf;

/// Path configuration is loaded from when none is given.
pub const DEFAULT_PATH: &str = "breakglass.yaml";

/// Errors handling the process configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unable to decode configuration from file at the given path.
    #[error("unable to decode configuration from file at '{0}'")]
    // (path,)
    Decode(String),

    /// Unable to read configuration file at the given path.
    #[error("unable to read configuration file at '{0}'")]
    // (path,)
    Open(String),

    /// Configuration file not found at the given path.
    #[error("configuration file not found at '{0}'")]
    // (path,)
    PathNotFound(String),
}

/// Load process configuration from the specified path.
pub fn load(path: &str) -> Result<Conf> {
    if !Path::new(path).exists() {
        anyhow::bail!(Error::PathNotFound(path.to_string()));
    }
    let file = File::open(path).with_context(|| Error::Open(path.into()))?;
    let conf = serde_yaml::from_reader(file).with_context(|| Error::Decode(path.into()))?;
    Ok(conf)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::load;
    use super::Error;

    fn write_conf(name: &str, content: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "breakglass-conf-{}-{}.yaml",
            name,
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn missing_file() {
        let error = load("/this/path/does/not/exist.yaml").unwrap_err();
        match error.downcast_ref::<Error>() {
            Some(Error::PathNotFound(path)) => assert_eq!(path, "/this/path/does/not/exist.yaml"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn invalid_file() {
        let path = write_conf("invalid", "index: [not, a, map]\n");
        let error = load(&path).unwrap_err();
        assert!(matches!(error.downcast_ref::<Error>(), Some(Error::Decode(_))));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn minimal_file() {
        let path = write_conf(
            "minimal",
            r#"
crypto:
  keys:
    - id: 1
      key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
index:
  url: "https://localhost:9200/"
  credentials:
    - name: primary
      api_key: abc
    - name: secondary
      username: user
      password: pass
"#,
        );
        let conf = load(&path).unwrap();
        std::fs::remove_file(path).unwrap();

        assert_eq!(conf.crypto.keys.len(), 1);
        assert_eq!(conf.index.backend, "elasticsearch");
        assert_eq!(conf.index.credentials.len(), 2);
        assert_eq!(conf.index.options["url"], "https://localhost:9200/");
        assert_eq!(conf.grants.index, "breakglass-grants");
        assert_eq!(conf.resource_auth.max_entries, 10_000);
    }
}
