//! Shared configuration for PowerFlex gateway clients.
//!
//! TOML profiles merged with `POWERFLEX_` environment variables, password
//! resolution (env + plaintext), translation to
//! `powerflex_api::GatewayConfig`, and log subscriber setup.

pub mod logging;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use powerflex_api::{AuthScheme, GatewayConfig, LogLevel};

pub use logging::{init_json_logging, init_logging};

/// Environment variable consulted for the password when the profile
/// names no variable of its own.
pub const PASSWORD_ENV: &str = "POWERFLEX_PASSWORD";

/// Environment variable consulted when a profile has no username.
pub const USERNAME_ENV: &str = "POWERFLEX_USERNAME";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' is not defined")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named gateway profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

/// Settings applied to every profile that does not override them.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub verify_certificate: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            verify_certificate: false,
            log_level: default_log_level(),
        }
    }
}

fn default_timeout() -> u64 {
    powerflex_api::config::DEFAULT_TIMEOUT.as_secs()
}
fn default_log_level() -> String {
    "error".into()
}

/// A named gateway profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Gateway host name or IP, optionally with a scheme.
    pub gateway: String,

    pub port: Option<u16>,

    pub username: Option<String>,

    /// Password in plaintext. Prefer `password_env`.
    pub password: Option<String>,

    /// Name of an environment variable holding the password.
    pub password_env: Option<String>,

    /// CA bundle for certificate verification.
    pub certificate_path: Option<PathBuf>,

    pub verify_certificate: Option<bool>,

    /// Request timeout in seconds.
    pub timeout: Option<u64>,

    /// "bearer" or "basic".
    pub auth_scheme: Option<String>,

    pub log_level: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "powerflex", "powerflex").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("powerflex");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the platform config file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path`, with `POWERFLEX_` variables layered on top.
///
/// Nested keys use a double underscore:
/// `POWERFLEX_PROFILES__LAB__GATEWAY=10.0.0.5`. A missing file is not an
/// error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("POWERFLEX_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the password for a profile.
///
/// Order: the profile's `password_env` variable, then `POWERFLEX_PASSWORD`,
/// then the plaintext `password`.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(val) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(val));
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

fn resolve_username(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

fn parse_setting<T: FromStr>(field: &str, raw: &str, expected: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("expected {expected}, got '{raw}'"),
    })
}

impl Config {
    /// Name of the profile `requested` resolves to.
    pub fn profile_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    /// Build a `GatewayConfig` for `requested` (or the default profile).
    pub fn gateway_config(&self, requested: Option<&str>) -> Result<GatewayConfig, ConfigError> {
        let name = self.profile_name(requested);
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })?;
        profile_to_gateway_config(profile, name, &self.defaults)
    }
}

/// Translate a profile into a `GatewayConfig`, filling gaps from `defaults`.
pub fn profile_to_gateway_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<GatewayConfig, ConfigError> {
    if profile.gateway.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "gateway".into(),
            reason: format!("profile '{profile_name}' has no gateway address"),
        });
    }

    let auth_scheme: AuthScheme = match profile.auth_scheme.as_deref() {
        Some(raw) => parse_setting("auth_scheme", raw, "'bearer' or 'basic'")?,
        None => AuthScheme::default(),
    };
    let log_level: LogLevel = parse_setting(
        "log_level",
        profile.log_level.as_deref().unwrap_or(&defaults.log_level),
        "one of error, warn, info, debug, trace",
    )?;

    let username = resolve_username(profile, profile_name)?;
    let password = resolve_password(profile, profile_name)?;

    let mut cfg = GatewayConfig::new(profile.gateway.clone(), username, String::new())
        .with_timeout(Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)))
        .with_auth_scheme(auth_scheme);
    cfg.password = password;
    cfg.log_level = log_level;
    if let Some(port) = profile.port {
        cfg = cfg.with_port(port);
    }
    cfg.verify_certificate = profile
        .verify_certificate
        .unwrap_or(defaults.verify_certificate);
    cfg.certificate_path.clone_from(&profile.certificate_path);

    Ok(cfg)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "lab"

[defaults]
timeout = 60

[profiles.lab]
gateway = "10.0.0.5"
port = 8443
username = "admin"
password = "plain"
auth_scheme = "basic"

[profiles.prod]
gateway = "pfxm.example.com"
username = "svc"
password_env = "PROD_PFX_PASSWORD"
verify_certificate = true
certificate_path = "/etc/ssl/pfx.pem"
log_level = "debug"
"#;

    #[test]
    fn profile_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            let config = load_config_from(Path::new("config.toml")).unwrap();

            let cfg = config.gateway_config(None).unwrap();
            assert_eq!(cfg.address, "10.0.0.5");
            assert_eq!(cfg.port, 8443);
            assert_eq!(cfg.username, "admin");
            assert_eq!(cfg.password.expose_secret(), "plain");
            assert_eq!(cfg.auth_scheme, AuthScheme::Basic);
            assert_eq!(cfg.timeout, Duration::from_secs(60));
            assert_eq!(cfg.log_level, LogLevel::Error);
            assert!(!cfg.verify_certificate);
            Ok(())
        });
    }

    #[test]
    fn password_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("PROD_PFX_PASSWORD", "from-env");
            jail.set_env(PASSWORD_ENV, "global");
            let config = load_config_from(Path::new("config.toml")).unwrap();

            let prod = config.gateway_config(Some("prod")).unwrap();
            assert_eq!(prod.password.expose_secret(), "from-env");
            assert_eq!(prod.log_level, LogLevel::Debug);
            assert_eq!(prod.certificate_path, Some(PathBuf::from("/etc/ssl/pfx.pem")));

            let lab = config.gateway_config(Some("lab")).unwrap();
            assert_eq!(lab.password.expose_secret(), "global");
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("POWERFLEX_DEFAULTS__TIMEOUT", "15");
            jail.set_env("POWERFLEX_PROFILES__LAB__GATEWAY", "10.0.0.9");
            let config = load_config_from(Path::new("config.toml")).unwrap();

            let cfg = config.gateway_config(Some("lab")).unwrap();
            assert_eq!(cfg.address, "10.0.0.9");
            assert_eq!(cfg.timeout, Duration::from_secs(15));
            Ok(())
        });
    }

    #[test]
    fn missing_file_gives_defaults() {
        Jail::expect_with(|_jail| {
            let config = load_config_from(Path::new("absent.toml")).unwrap();
            assert_eq!(config.default_profile.as_deref(), Some("default"));
            assert!(config.profiles.is_empty());
            assert!(matches!(
                config.gateway_config(None),
                Err(ConfigError::UnknownProfile { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn profile_without_password_has_no_credentials() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[profiles.default]\ngateway = \"10.0.0.5\"\nusername = \"admin\"\n",
            )?;
            let config = load_config_from(Path::new("config.toml")).unwrap();
            assert!(matches!(
                config.gateway_config(None),
                Err(ConfigError::NoCredentials { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn bad_auth_scheme_is_validation_error() {
        let profile = Profile {
            gateway: "10.0.0.5".into(),
            username: Some("admin".into()),
            password: Some("pw".into()),
            auth_scheme: Some("kerberos".into()),
            ..Profile::default()
        };
        let err = profile_to_gateway_config(&profile, "x", &Defaults::default()).unwrap_err();
        let ConfigError::Validation { field, .. } = err else {
            panic!("expected Validation, got {err:?}");
        };
        assert_eq!(field, "auth_scheme");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                gateway: "10.1.1.1".into(),
                username: Some("admin".into()),
                password: Some("pw".into()),
                ..Profile::default()
            },
        );
        save_config_to(&cfg, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("gateway = \"10.1.1.1\""));

        let loaded: Config = toml::from_str(&written).unwrap();
        assert_eq!(loaded.profiles["default"].gateway, "10.1.1.1");
        assert_eq!(loaded.defaults.timeout, 120);
    }
}
