// Gateway-level queries
//
// Version discovery and the version gate shared by initialization and
// credential management.

use serde_json::Value;
use tracing::{debug, error};

use crate::client::Client;
use crate::error::Error;
use crate::request::ApiRequest;
use crate::version::ApiVersion;

impl Client {
    /// Fetch the gateway API version.
    ///
    /// `GET /api/version` -- always a live request, never cached, so a
    /// gateway downgrade is noticed on the next call.
    pub async fn api_version(&self) -> Result<ApiVersion, Error> {
        let value = self.execute(&ApiRequest::get("/version")).await?;
        let version = match value {
            Value::String(raw) => raw.parse()?,
            other => other.to_string().parse()?,
        };
        debug!(%version, "gateway API version");
        Ok(version)
    }

    /// Fail with `UnsupportedGatewayVersion` unless the gateway is at least
    /// `required`. Returns the version the gateway reported.
    pub async fn require_version(
        &self,
        required: ApiVersion,
        operation: &'static str,
    ) -> Result<ApiVersion, Error> {
        let actual = self.api_version().await?;
        if actual < required {
            let exc = Error::UnsupportedGatewayVersion {
                operation,
                required,
                actual,
            };
            error!("{exc}");
            return Err(exc);
        }
        Ok(actual)
    }
}
