// Session management
//
// Owns the gateway credentials and the current token. The token lives
// in an `ArcSwapOption` so a request in flight always reads a complete
// token while another caller renews it; concurrent renewals are
// last-write-wins.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};
use url::Url;

use crate::auth::{AuthScheme, Token};
use crate::error::{ApiError, Error, Operation};

/// Body returned by the bearer login endpoint.
#[derive(Deserialize)]
struct BearerLogin {
    access_token: String,
    refresh_token: Option<String>,
}

/// Authentication state for one gateway.
pub struct Session {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
    scheme: AuthScheme,
    token: ArcSwapOption<Token>,
}

impl Session {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        username: String,
        password: SecretString,
        scheme: AuthScheme,
    ) -> Self {
        Self {
            http,
            base_url,
            username,
            password,
            scheme,
            token: ArcSwapOption::empty(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    pub fn is_initialized(&self) -> bool {
        self.token.load().is_some()
    }

    /// Log in and store the token. Re-initializing replaces the token.
    pub async fn initialize(&self) -> Result<(), Error> {
        let token = self.login().await?;
        self.token.store(Some(Arc::new(token)));
        debug!(username = %self.username, "session initialized");
        Ok(())
    }

    /// The active token, or `NotInitialized`.
    pub fn current_token(&self) -> Result<Arc<Token>, Error> {
        self.token.load_full().ok_or(Error::NotInitialized)
    }

    /// Log in again and swap in the new token.
    pub async fn refresh(&self) -> Result<Arc<Token>, Error> {
        if let Some(old) = self.token.load_full() {
            debug!(age_secs = old.age_secs(), "renewing gateway token");
        }
        let token = Arc::new(self.login().await?);
        self.token.store(Some(Arc::clone(&token)));
        Ok(token)
    }

    /// Drop the token without telling the gateway.
    pub(crate) fn clear(&self) {
        self.token.store(None);
    }

    /// Attach the token to an outgoing request.
    pub(crate) fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
        token: &Token,
    ) -> reqwest::RequestBuilder {
        self.scheme.authorize(builder, &self.username, token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// Perform the login exchange without storing the result.
    async fn login(&self) -> Result<Token, Error> {
        let url = self.endpoint(self.scheme.login_path())?;
        debug!("logging in at {}", url);

        let builder = match self.scheme {
            AuthScheme::Bearer => self.http.post(url).json(&json!({
                "username": self.username,
                "password": self.password.expose_secret(),
            })),
            AuthScheme::Basic => self
                .http
                .get(url)
                .basic_auth(&self.username, Some(self.password.expose_secret())),
        };

        let resp = builder.send().await.map_err(|e| {
            error!(error = %e, "gateway unreachable during login");
            Error::Connection(e)
        })?;

        let status = resp.status();
        let body = resp.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let exc = Error::Authentication {
                message: format!("login rejected for user {:?} (HTTP {status})", self.username),
            };
            error!("{exc}");
            return Err(exc);
        }
        if !status.is_success() {
            let exc = Error::FailedOperation {
                operation: Operation::Login,
                error: ApiError::from_body(status.as_u16(), &body, self.scheme.login_path()),
            };
            error!("{exc}");
            return Err(exc);
        }

        let token = match self.scheme {
            AuthScheme::Bearer => {
                let parsed: BearerLogin =
                    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                        message: format!("unexpected login response: {e}"),
                        body: String::new(),
                    })?;
                Token::new(
                    SecretString::from(parsed.access_token),
                    parsed.refresh_token.map(SecretString::from),
                )
            }
            AuthScheme::Basic => {
                let raw = serde_json::from_str::<String>(&body)
                    .unwrap_or_else(|_| body.trim().to_owned());
                if raw.is_empty() {
                    return Err(Error::Authentication {
                        message: "gateway returned an empty token".into(),
                    });
                }
                Token::new(SecretString::from(raw), None)
            }
        };

        debug!("login successful");
        Ok(token)
    }

    /// End the session on the gateway and forget the token.
    ///
    /// A session that never logged in has nothing to end. If the gateway
    /// does not confirm the logout the token is kept, so the caller can
    /// retry or keep using the session.
    pub async fn logout(&self) -> Result<(), Error> {
        let Some(token) = self.token.load_full() else {
            return Ok(());
        };

        let url = self.endpoint(self.scheme.logout_path())?;
        debug!("logging out at {}", url);

        let builder = match self.scheme {
            AuthScheme::Bearer => {
                let refresh = token.refresh().map(|r| r.expose_secret().to_owned());
                self.http
                    .post(url)
                    .json(&json!({ "refresh_token": refresh }))
            }
            AuthScheme::Basic => self.http.get(url),
        };

        let resp = self.authorize(builder, &token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let exc = Error::FailedOperation {
                operation: Operation::Login,
                error: ApiError::from_body(status.as_u16(), &body, self.scheme.logout_path()),
            };
            error!("{exc}");
            return Err(exc);
        }

        self.clear();
        debug!("logout complete");
        Ok(())
    }
}
