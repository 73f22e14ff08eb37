use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use strum::{EnumString, IntoStaticStr};

/// How the gateway issues tokens and how they travel on each request.
///
/// Gateways 4.x hand out bearer tokens from `/rest/auth/login`; 3.x
/// gateways return an opaque token from `/api/login` that is sent back
/// as the password of HTTP basic auth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>` (gateway 4.x).
    #[default]
    Bearer,
    /// Basic auth with the token as password (gateway 3.x).
    Basic,
}

impl AuthScheme {
    /// The login endpoint path, relative to the gateway root.
    pub fn login_path(self) -> &'static str {
        match self {
            Self::Bearer => "/rest/auth/login",
            Self::Basic => "/api/login",
        }
    }

    /// The logout endpoint path, relative to the gateway root.
    pub fn logout_path(self) -> &'static str {
        match self {
            Self::Bearer => "/rest/auth/logout",
            Self::Basic => "/api/logout",
        }
    }

    /// Attach `token` to an outgoing request.
    pub(crate) fn authorize(
        self,
        builder: reqwest::RequestBuilder,
        username: &str,
        token: &Token,
    ) -> reqwest::RequestBuilder {
        match self {
            Self::Bearer => builder.bearer_auth(token.access.expose_secret()),
            Self::Basic => builder.basic_auth(username, Some(token.access.expose_secret())),
        }
    }

    /// Whether a resource response means the token is no longer accepted.
    pub(crate) fn is_token_rejected(status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
    }
}

/// An issued gateway token.
#[derive(Debug, Clone)]
pub struct Token {
    access: SecretString,
    refresh: Option<SecretString>,
    issued_at: DateTime<Utc>,
}

impl Token {
    pub fn new(access: SecretString, refresh: Option<SecretString>) -> Self {
        Self {
            access,
            refresh,
            issued_at: Utc::now(),
        }
    }

    pub fn access(&self) -> &SecretString {
        &self.access
    }

    /// Refresh token, only issued by bearer gateways.
    pub fn refresh(&self) -> Option<&SecretString> {
        self.refresh.as_ref()
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Seconds since the token was issued.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.issued_at).num_seconds()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scheme_parses_case_insensitively() {
        assert_eq!("bearer".parse::<AuthScheme>().unwrap(), AuthScheme::Bearer);
        assert_eq!("BASIC".parse::<AuthScheme>().unwrap(), AuthScheme::Basic);
        assert!("cookie".parse::<AuthScheme>().is_err());
        let name: &'static str = AuthScheme::Basic.into();
        assert_eq!(name, "basic");
    }

    #[test]
    fn only_401_and_403_reject_the_token() {
        assert!(AuthScheme::is_token_rejected(StatusCode::UNAUTHORIZED));
        assert!(AuthScheme::is_token_rejected(StatusCode::FORBIDDEN));
        assert!(!AuthScheme::is_token_rejected(StatusCode::NOT_FOUND));
        assert!(!AuthScheme::is_token_rejected(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
