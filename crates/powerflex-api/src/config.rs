// ── Runtime connection configuration ──
//
// Describes *how* to reach a gateway. Carries credentials and connection
// tuning but never touches disk; `powerflex-config` builds one of these
// from profiles and the environment.

use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use strum::{EnumString, IntoStaticStr};
use url::Url;

use crate::auth::AuthScheme;
use crate::error::Error;
use crate::transport::{TlsMode, TransportConfig};

/// Default gateway HTTPS port.
pub const DEFAULT_PORT: u16 = 443;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Log verbosity requested for the client.
///
/// The library only emits `tracing` events; the level is applied by
/// whoever installs the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    #[default]
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        self.into()
    }
}

/// Configuration for connecting to a single gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host name or IP. May carry an explicit `http://` or `https://`
    /// scheme; bare hosts default to HTTPS.
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub verify_certificate: bool,
    /// CA bundle used when `verify_certificate` is set.
    pub certificate_path: Option<PathBuf>,
    pub timeout: Duration,
    pub auth_scheme: AuthScheme,
    pub log_level: LogLevel,
}

impl GatewayConfig {
    /// A config with every optional setting at its default.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: SecretString::from(password.into()),
            verify_certificate: false,
            certificate_path: None,
            timeout: DEFAULT_TIMEOUT,
            auth_scheme: AuthScheme::default(),
            log_level: LogLevel::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    pub fn with_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.verify_certificate = true;
        self.certificate_path = Some(path.into());
        self
    }

    /// Reject configs missing address, port, username or password.
    pub fn validate(&self) -> Result<(), Error> {
        let mut missing = Vec::new();
        if self.address.trim().is_empty() {
            missing.push("gateway_address");
        }
        if self.port == 0 {
            missing.push("gateway_port");
        }
        if self.username.is_empty() {
            missing.push("username");
        }
        if self.password.expose_secret().is_empty() {
            missing.push("password");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfiguration {
                message: format!("the following parameters must be set: {}", missing.join(", ")),
            })
        }
    }

    /// Gateway root URL, e.g. `https://10.0.0.5:443/`.
    pub fn base_url(&self) -> Result<Url, Error> {
        let address = self.address.trim().trim_end_matches('/');
        let raw = if address.contains("://") {
            address.to_owned()
        } else if address.parse::<Ipv6Addr>().is_ok() {
            format!("https://[{address}]")
        } else {
            format!("https://{address}")
        };
        let mut url = Url::parse(&raw)?;
        url.set_port(Some(self.port))
            .map_err(|()| Error::InvalidConfiguration {
                message: format!("cannot set port on gateway address {address:?}"),
            })?;
        Ok(url)
    }

    /// Transport settings derived from the TLS options and timeout.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from_settings(self.verify_certificate, self.certificate_path.as_ref()),
            timeout: self.timeout,
        }
    }
}
