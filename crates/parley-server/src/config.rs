//! Configuration loader (C9). Grounded on the teacher's
//! `paracord-server::config` (TOML file + one `if let Ok(value) =
//! std::env::var(...)` override per key, `Config::load`), scoped down to the
//! sections this system actually names: server, media, database, admin,
//! auth, network, tls.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_rtc_min_port() -> u16 {
    40000
}

fn default_rtc_max_port() -> u16 {
    49999
}

fn default_media_workers() -> u32 {
    1
}

fn default_db_path() -> String {
    "./data/parley.db".into()
}

fn default_tls_mode() -> String {
    "off".into()
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub tls: TlsConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `announced_ip`/`media_workers` are carried through to the media broker
/// adapter's construction site; the broker itself has no network surface of
/// its own yet (it is an in-memory façade, per the media adapter module), so
/// these fields are currently read but not dereferenced by `main`.
#[derive(Debug, Deserialize, Serialize)]
pub struct MediaConfig {
    #[serde(default = "default_rtc_min_port")]
    pub rtc_min_port: u16,
    #[serde(default = "default_rtc_max_port")]
    pub rtc_max_port: u16,
    pub announced_ip: Option<String>,
    #[serde(default = "default_media_workers")]
    pub media_workers: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            rtc_min_port: default_rtc_min_port(),
            rtc_max_port: default_rtc_max_port(),
            announced_ip: None,
            media_workers: default_media_workers(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    pub admin_token: Option<String>,
    #[serde(default)]
    pub open_admin: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub trust_proxy: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TlsConfig {
    /// `off`, `self-signed`, or `manual`.
    #[serde(default = "default_tls_mode")]
    pub tls_mode: String,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub tls_domain: Option<String>,
    pub tls_email: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            tls_mode: default_tls_mode(),
            tls_cert: None,
            tls_key: None,
            tls_domain: None,
            tls_email: None,
        }
    }
}

impl TlsConfig {
    pub fn enabled(&self) -> bool {
        self.tls_mode != "off"
    }
}

fn parse_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config file '{path}'"))?;
            toml::from_str(&content).with_context(|| format!("parsing config file '{path}'"))?
        } else {
            tracing::info!("config file not found at '{}', using defaults", path);
            Config::default()
        };

        if let Ok(value) = std::env::var("PARLEY_SERVER_HOST") {
            config.server.host = value;
        }
        if let Ok(value) = std::env::var("PARLEY_SERVER_PORT") {
            config.server.port = value
                .parse()
                .with_context(|| "PARLEY_SERVER_PORT must be a valid port number")?;
        }
        if let Ok(value) = std::env::var("PARLEY_MEDIA_RTC_MIN_PORT") {
            config.media.rtc_min_port = value
                .parse()
                .with_context(|| "PARLEY_MEDIA_RTC_MIN_PORT must be a valid port number")?;
        }
        if let Ok(value) = std::env::var("PARLEY_MEDIA_RTC_MAX_PORT") {
            config.media.rtc_max_port = value
                .parse()
                .with_context(|| "PARLEY_MEDIA_RTC_MAX_PORT must be a valid port number")?;
        }
        if let Ok(value) = std::env::var("PARLEY_MEDIA_ANNOUNCED_IP") {
            config.media.announced_ip = Some(value);
        }
        if let Ok(value) = std::env::var("PARLEY_MEDIA_MEDIA_WORKERS") {
            config.media.media_workers = value
                .parse()
                .with_context(|| "PARLEY_MEDIA_MEDIA_WORKERS must be a non-negative integer")?;
        }
        if let Ok(value) = std::env::var("PARLEY_DATABASE_DB_PATH") {
            config.database.db_path = value;
        }
        if let Ok(value) = std::env::var("PARLEY_ADMIN_ADMIN_TOKEN") {
            config.admin.admin_token = Some(value);
        }
        if std::env::var("PARLEY_ADMIN_OPEN_ADMIN").is_ok() {
            config.admin.open_admin = parse_env_bool("PARLEY_ADMIN_OPEN_ADMIN", config.admin.open_admin);
        }
        if let Ok(value) = std::env::var("PARLEY_AUTH_PASSWORD") {
            config.auth.password = Some(value);
        }
        if std::env::var("PARLEY_NETWORK_TRUST_PROXY").is_ok() {
            config.network.trust_proxy =
                parse_env_bool("PARLEY_NETWORK_TRUST_PROXY", config.network.trust_proxy);
        }
        if let Ok(value) = std::env::var("PARLEY_TLS_TLS_MODE") {
            config.tls.tls_mode = value;
        }
        if let Ok(value) = std::env::var("PARLEY_TLS_TLS_CERT") {
            config.tls.tls_cert = Some(value);
        }
        if let Ok(value) = std::env::var("PARLEY_TLS_TLS_KEY") {
            config.tls.tls_key = Some(value);
        }
        if let Ok(value) = std::env::var("PARLEY_TLS_TLS_DOMAIN") {
            config.tls.tls_domain = Some(value);
        }
        if let Ok(value) = std::env::var("PARLEY_TLS_TLS_EMAIL") {
            config.tls.tls_email = Some(value);
        }

        if !matches!(config.tls.tls_mode.as_str(), "off" | "self-signed" | "manual") {
            anyhow::bail!(
                "invalid [tls] tls_mode '{}': expected 'off', 'self-signed', or 'manual'",
                config.tls.tls_mode
            );
        }
        if config.media.rtc_min_port > config.media.rtc_max_port {
            anyhow::bail!("[media] rtc_min_port must be <= rtc_max_port");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/path/parley.toml").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tls.tls_mode, "off");
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        fs::write(
            &path,
            r#"
            [server]
            host = "127.0.0.1"
            port = 9090

            [tls]
            tls_mode = "self-signed"
            "#,
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert!(config.tls.enabled());
    }

    #[test]
    fn rejects_invalid_tls_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        fs::write(&path, "[tls]\ntls_mode = \"bogus\"\n").unwrap();
        assert!(Config::load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn env_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        fs::write(&path, "[server]\nport = 9090\n").unwrap();

        std::env::set_var("PARLEY_SERVER_PORT", "7070");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        std::env::remove_var("PARLEY_SERVER_PORT");

        assert_eq!(config.server.port, 7070);
    }
}
