//! Process configuration: where mapped files live.
//!
//! The collector installation describes itself through an environment file of
//! `KEY=VALUE` lines (by default `<root>/etc/pcp.conf`, with the root taken
//! from `PCP_DIR`). The only key this library consumes is `PCP_TMP_DIR`, the
//! directory under which the `mmv/` file tree lives; without it, mapped files
//! go below the OS temporary directory.
//!
//! The global configuration is loaded once, on first use, and is immutable
//! afterwards. Code paths that resolve file locations also accept an explicit
//! [`Config`] so tests can substitute their own.

use std::collections::HashMap;
use std::path::{PathBuf, MAIN_SEPARATOR};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

/// A `KEY=VALUE` line of the environment file.
static CONF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z0-9_]+)=(.*)$").expect("the configuration line pattern is valid")
});

static GLOBAL: LazyLock<Config> = LazyLock::new(Config::from_environment);

/// The environment-file configuration the library resolves paths against.
#[derive(Debug, Clone, Default)]
pub struct Config {
    root: PathBuf,
    values: HashMap<String, String>,
}

impl Config {
    /// Loads the configuration the way the process environment describes it:
    /// the root from `PCP_DIR` (default `/`), the environment file from
    /// `PCP_CONF` (default `<root>/etc/pcp.conf`). A missing or unreadable
    /// file yields an empty value map, which makes every lookup fall back.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Reads the ambient process environment - not reproducible under mutation.
    pub fn from_environment() -> Self {
        let root = PathBuf::from(std::env::var_os("PCP_DIR").unwrap_or_else(|| "/".into()));

        let conf_path = std::env::var_os("PCP_CONF")
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join("etc").join("pcp.conf"));

        let values = match std::fs::read_to_string(&conf_path) {
            Ok(contents) => parse_conf(&contents),
            Err(error) => {
                debug!(
                    path = %conf_path.display(),
                    %error,
                    "no readable environment file; falling back to the OS temporary directory"
                );
                HashMap::new()
            }
        };

        debug!(root = %root.display(), entries = values.len(), "loaded configuration");

        Self { root, values }
    }

    /// An empty configuration rooted at `/`; every lookup falls back.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            root: PathBuf::from("/"),
            values: HashMap::new(),
        }
    }

    /// Replaces the installation root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets a configuration value, as if read from the environment file.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// The value of `key`, if the environment file defined it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The directory mapped files live in: `<root>/<PCP_TMP_DIR>/mmv`, or
    /// `<os-temp>/mmv` when `PCP_TMP_DIR` is not configured.
    #[must_use]
    pub fn mmv_dir(&self) -> PathBuf {
        let base = match self.get("PCP_TMP_DIR") {
            // An absolute value is still relative to the configured root.
            Some(tmp) => self.root.join(tmp.trim_start_matches(MAIN_SEPARATOR)),
            None => std::env::temp_dir(),
        };

        base.join("mmv")
    }

    /// The path a mapping named `name` is written to.
    ///
    /// `name` is a file name, not a path: anything containing a path
    /// separator is rejected.
    pub fn file_location(&self, name: &str) -> Result<PathBuf> {
        if name.contains(MAIN_SEPARATOR) || name.contains('/') {
            return Err(Error::InvalidName {
                name: name.to_string(),
                problem: "name cannot contain a path separator".to_string(),
            });
        }

        if name.is_empty() {
            return Err(Error::InvalidName {
                name: name.to_string(),
                problem: "name cannot be empty".to_string(),
            });
        }

        Ok(self.mmv_dir().join(name))
    }
}

/// The process-wide configuration, loaded on first use.
pub(crate) fn global() -> &'static Config {
    &GLOBAL
}

fn parse_conf(contents: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();

    for line in contents.lines() {
        if let Some(captures) = CONF_LINE.captures(line) {
            values.insert(captures[1].to_string(), captures[2].to_string());
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines_and_skips_the_rest() {
        let contents = "\
# The performance toolkit environment file.
PCP_TMP_DIR=/var/tmp/pcp
PCP_LOG_DIR=/var/log/pcp

lowercase=ignored
ALSO IGNORED
TRAILING_OK=a=b
";

        let values = parse_conf(contents);

        assert_eq!(values.get("PCP_TMP_DIR").unwrap(), "/var/tmp/pcp");
        assert_eq!(values.get("PCP_LOG_DIR").unwrap(), "/var/log/pcp");
        assert_eq!(values.get("TRAILING_OK").unwrap(), "a=b");
        assert!(!values.contains_key("lowercase"));
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn tmp_dir_is_joined_under_the_root() {
        let config = Config::empty()
            .with_root("/opt/pcp")
            .with_value("PCP_TMP_DIR", "/var/tmp/pcp");

        assert_eq!(
            config.mmv_dir(),
            PathBuf::from("/opt/pcp/var/tmp/pcp/mmv")
        );
    }

    #[test]
    fn missing_tmp_dir_falls_back_to_os_temp() {
        let config = Config::empty();

        assert_eq!(config.mmv_dir(), std::env::temp_dir().join("mmv"));
    }

    #[test]
    fn file_location_rejects_path_separators() {
        let config = Config::empty();

        assert!(matches!(
            config.file_location("foo/bar"),
            Err(Error::InvalidName { .. })
        ));
        assert!(config.file_location("").is_err());

        let loc = config.file_location("foo").unwrap();
        assert_eq!(loc, std::env::temp_dir().join("mmv").join("foo"));
    }
}
