// Gateway HTTP client and request pipeline
//
// Every resource operation funnels through `Client::execute`: URL and
// query construction, token attachment, the single renewal retry, and
// response classification all happen here. Resource handles (entities,
// credentials, system queries) live in their own files as inherent
// methods or borrowed handles.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, trace};
use url::Url;

use crate::auth::{AuthScheme, Token};
use crate::config::GatewayConfig;
use crate::error::{ApiError, Error};
use crate::request::ApiRequest;
use crate::session::Session;
use crate::version::ApiVersion;

/// Prefix of every resource path on the gateway.
const API_ROOT: &str = "/api";

/// Client for one PowerFlex gateway.
///
/// Construct with [`Client::new`], call [`initialize`](Client::initialize)
/// once, then issue requests. Every call is a live round trip.
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl Client {
    /// Build a client from a validated config. No network traffic happens
    /// until [`initialize`](Self::initialize).
    pub fn new(config: &GatewayConfig) -> Result<Self, Error> {
        let http = config.transport().build_client()?;
        Self::with_client(http, config)
    }

    /// Build a client around a pre-configured `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, config: &GatewayConfig) -> Result<Self, Error> {
        config.validate()?;
        let base_url = config.base_url()?;
        let session = Session::new(
            http.clone(),
            base_url.clone(),
            config.username.clone(),
            config.password.clone(),
            config.auth_scheme,
        );
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    /// The gateway root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Log in and confirm the gateway speaks a supported API version.
    ///
    /// A gateway older than [`ApiVersion::MIN_SUPPORTED`] leaves the client
    /// uninitialized.
    pub async fn initialize(&self) -> Result<ApiVersion, Error> {
        self.session.initialize().await?;
        match self
            .require_version(ApiVersion::MIN_SUPPORTED, "PowerFlex client")
            .await
        {
            Ok(version) => {
                debug!(%version, "connected to gateway");
                Ok(version)
            }
            Err(e) => {
                self.session.clear();
                Err(e)
            }
        }
    }

    /// End the gateway session.
    pub async fn logout(&self) -> Result<(), Error> {
        self.session.logout().await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Full URL for a resource path: `{base}/api{path}?filter=..&fields=..`
    pub(crate) fn api_url(&self, request: &ApiRequest) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = request.path();
        let separator = if path.starts_with('/') { "" } else { "/" };
        let mut url = Url::parse(&format!("{base}{API_ROOT}{separator}{path}"))?;

        let pairs = request.query_pairs()?;
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    // ── Pipeline ─────────────────────────────────────────────────────

    /// Issue `request` and decode the JSON response.
    ///
    /// A rejected token is renewed once and the request repeated once; a
    /// second rejection is an [`Error::Authentication`]. An empty success
    /// body decodes to `Value::Null`.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, Error> {
        let url = self.api_url(request)?;
        let token = self.session.current_token()?;

        let resp = self.send(request, &url, &token).await?;
        let resp = if AuthScheme::is_token_rejected(resp.status()) {
            debug!(
                status = resp.status().as_u16(),
                "token rejected, re-logging in and repeating request"
            );
            let token = self.session.refresh().await?;
            let retry = self.send(request, &url, &token).await?;
            if AuthScheme::is_token_rejected(retry.status()) {
                let exc = Error::Authentication {
                    message: format!(
                        "{} {} rejected again after token renewal (HTTP {})",
                        request.method(),
                        request.path(),
                        retry.status()
                    ),
                };
                error!("{exc}");
                return Err(exc);
            }
            retry
        } else {
            resp
        };

        Self::decode(request, resp).await
    }

    /// [`execute`](Self::execute), then deserialize into `T`.
    pub async fn execute_as<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, Error> {
        let value = self.execute(request).await?;
        T::deserialize(&value).map_err(|e| Error::Deserialization {
            message: format!("{e} (from {} {})", request.method(), request.path()),
            body: value.to_string(),
        })
    }

    async fn send(
        &self,
        request: &ApiRequest,
        url: &Url,
        token: &Token,
    ) -> Result<reqwest::Response, Error> {
        debug!("{} {}", request.method(), url);

        let mut builder = self.http.request(request.method().clone(), url.clone());
        builder = self.session.authorize(builder, token);
        if let Some(body) = request.body() {
            if request.is_redacted() {
                trace!("request body redacted");
            } else {
                trace!(%body, "request body");
            }
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            error!(error = %e, "request to {} failed", request.path());
            Error::Connection(e)
        })?;
        debug!(status = resp.status().as_u16(), "response from {}", request.path());
        Ok(resp)
    }

    /// Classify the response: typed error on failure, JSON on success.
    async fn decode(request: &ApiRequest, resp: reqwest::Response) -> Result<Value, Error> {
        let status = resp.status();
        let body = resp.text().await?;
        trace!(%body, "response body");

        if !status.is_success() {
            let envelope = ApiError::from_body(status.as_u16(), &body, request.path());
            let exc = if status == StatusCode::NOT_FOUND {
                Error::ResourceNotFound(envelope)
            } else {
                Error::FailedOperation {
                    operation: request.operation_kind(),
                    error: envelope,
                }
            };
            error!("{exc}");
            return Err(exc);
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }
}
