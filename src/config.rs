//! Application configuration.
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! cookie_name = "myapp"
//! debug = false
//! log_level = "info"
//! static_dir = "static"
//! csrf = true
//! session_idle_secs = 1209600
//! ```

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// Default port, `0xdead`.
pub const DEFAULT_PORT: u16 = 57005;

/// Two weeks.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 14 * 24 * 60 * 60;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Name of the session cookie. Defaults to the executable's file stem.
    pub cookie_name: String,
    /// Adds error details to 500 responses and exposes `debug` to templates.
    pub debug: bool,
    /// Filter directive used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Directory served under `/static/<file>`. Unset: URLs are built but
    /// nothing is served (a front proxy serves them).
    pub static_dir: Option<PathBuf>,
    /// Rejects `POST` requests without the session's form token.
    pub csrf: bool,
    /// Idle time after which the default in-memory store forgets a session.
    pub session_idle_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: DEFAULT_PORT,
            cookie_name: default_cookie_name(),
            debug: false,
            log_level: "info".to_owned(),
            static_dir: None,
            csrf: false,
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// Resolves `host:port` to the first matching socket address.
    pub fn addr(&self) -> Result<SocketAddr, Error> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config(format!("host `{}` resolves to no address", self.host)))
    }

    fn validate(&self) -> Result<(), Error> {
        let cookie_ok = !self.cookie_name.is_empty()
            && self.cookie_name.bytes().all(|b| b.is_ascii_alphanumeric() || b"-_.".contains(&b));
        if !cookie_ok {
            return Err(Error::Config(format!("invalid cookie_name `{}`", self.cookie_name)));
        }
        if self.session_idle_secs == 0 {
            return Err(Error::Config("session_idle_secs must be positive".to_owned()));
        }
        Ok(())
    }
}

fn default_cookie_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_stem)
        .map(|s| {
            s.to_string_lossy()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "kiri".to_owned())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.debug);
        assert!(config.static_dir.is_none());
        assert!(!config.csrf);
        assert_eq!(config.session_idle(), Duration::from_secs(DEFAULT_SESSION_IDLE_SECS));
        assert!(!config.cookie_name.is_empty());
    }

    #[test]
    fn overrides() {
        let config = Config::from_toml_str(
            r#"
            host = "127.0.0.1"
            port = 8080
            cookie_name = "shop"
            debug = true
            static_dir = "assets"
            csrf = true
            session_idle_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.addr().unwrap(), "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.cookie_name, "shop");
        assert!(config.debug);
        assert_eq!(config.static_dir.as_deref(), Some(Path::new("assets")));
        assert!(config.csrf);
        assert_eq!(config.session_idle(), Duration::from_secs(600));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_cookie_names() {
        assert!(matches!(Config::from_toml_str("prot = 1"), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml_str(r#"cookie_name = "a b""#), Err(Error::Config(_))));
        assert!(matches!(Config::from_toml_str("session_idle_secs = 0"), Err(Error::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9000").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.port, 9000);

        assert!(matches!(Config::from_file("/definitely/not/here.toml"), Err(Error::Config(_))));
    }
}
