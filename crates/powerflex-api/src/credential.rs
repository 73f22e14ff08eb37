// Credential management
//
// PowerFlex Manager stores the logins it uses to reach servers, switches,
// vCenters and other managed elements. Each credential kind is a fixed
// payload shape; only some kinds carry a domain. All operations live under
// `/api/Api/V1/Credential` and require a 4.x gateway, checked on every call.

use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use strum::{EnumIter, EnumString, IntoEnumIterator};
use tracing::{debug, error, warn};

use crate::client::Client;
use crate::error::{Error, Operation};
use crate::query::{FieldProjection, FilterSpec};
use crate::request::{ApiRequest, check_segment};
use crate::version::ApiVersion;

const CREDENTIAL_PATH: &str = "/Api/V1/Credential";

/// The eight credential payload shapes understood by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum CredentialKind {
    #[strum(serialize = "server", serialize = "servercredential")]
    Server,
    #[strum(serialize = "iom", serialize = "iomcredential")]
    Iom,
    #[strum(serialize = "vcenter", serialize = "vcentercredential")]
    VCenter,
    #[strum(serialize = "em", serialize = "emcredential")]
    Em,
    #[strum(serialize = "scaleio", serialize = "scaleiocredential")]
    ScaleIo,
    #[strum(serialize = "ps", serialize = "pscredential")]
    Ps,
    #[strum(serialize = "os", serialize = "oscredential")]
    Os,
    #[strum(serialize = "osuser", serialize = "osusercredential")]
    OsUser,
}

/// Static properties of a credential kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindTraits {
    /// Element name of the kind in gateway payloads.
    pub tag: &'static str,
    pub accepts_domain: bool,
    pub min_version: ApiVersion,
}

impl CredentialKind {
    /// Dispatch table for every kind.
    pub const fn traits(self) -> KindTraits {
        const V4: ApiVersion = ApiVersion::CREDENTIAL_MANAGEMENT;
        let (tag, accepts_domain) = match self {
            Self::Server => ("serverCredential", false),
            Self::Iom => ("iomCredential", false),
            Self::VCenter => ("vCenterCredential", true),
            Self::Em => ("emCredential", true),
            Self::ScaleIo => ("scaleIOCredential", false),
            Self::Ps => ("psCredential", true),
            Self::Os => ("osCredential", true),
            Self::OsUser => ("osUserCredential", true),
        };
        KindTraits {
            tag,
            accepts_domain,
            min_version: V4,
        }
    }

    pub const fn tag(self) -> &'static str {
        self.traits().tag
    }

    pub const fn accepts_domain(self) -> bool {
        self.traits().accepts_domain
    }

    pub const fn min_version(self) -> ApiVersion {
        self.traits().min_version
    }

    /// Parse a kind name (`"server"`, `"vCenterCredential"`, ...).
    pub fn parse(name: &str) -> Result<Self, Error> {
        Self::from_str(name.trim())
            .map_err(|_| Error::invalid_option(format!("invalid credential type {name:?}")))
    }

    /// Find the kind of a credential document returned by the gateway,
    /// keyed by the kind's element name.
    pub fn detect(document: &Value) -> Option<Self> {
        let members = document.as_object()?;
        Self::iter().find(|kind| members.contains_key(kind.tag()))
    }
}

/// A credential as supplied by the caller for create or update.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub label: String,
    pub kind: CredentialKind,
    pub username: String,
    pub password: SecretString,
    pub domain: Option<String>,
}

impl CredentialRecord {
    pub fn new(
        kind: CredentialKind,
        label: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            kind,
            username: username.into(),
            password: SecretString::from(password.into()),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Label, username and password are all required.
    pub fn validate(&self) -> Result<(), Error> {
        if self.label.trim().is_empty() {
            return Err(Error::invalid_option("credential must have a label"));
        }
        if self.username.is_empty() {
            return Err(Error::invalid_option("credential must have a username"));
        }
        if self.password.expose_secret().is_empty() {
            return Err(Error::invalid_option("credential must have a password"));
        }
        Ok(())
    }
}

/// Wire payload for create and update.
///
/// A domain on a kind that cannot carry one is dropped, never sent.
pub fn build_payload(record: &CredentialRecord) -> Value {
    let kind = record.kind;
    let mut body = Map::new();
    body.insert("label".into(), Value::String(record.label.clone()));
    body.insert("username".into(), Value::String(record.username.clone()));
    body.insert(
        "password".into(),
        Value::String(record.password.expose_secret().to_owned()),
    );

    match (&record.domain, kind.accepts_domain()) {
        (Some(domain), true) => {
            body.insert("domain".into(), Value::String(domain.clone()));
        }
        (Some(_), false) => {
            warn!(
                kind = kind.tag(),
                "domain is not applicable to this credential type, ignoring it"
            );
        }
        (None, _) => {}
    }

    let mut wrapped = Map::new();
    wrapped.insert(kind.tag().to_owned(), Value::Object(body));
    json!({ "asmCredential": wrapped })
}

/// Fail unless the gateway supports credential management at all.
pub fn check_management_version(server: ApiVersion) -> Result<(), Error> {
    if server < ApiVersion::CREDENTIAL_MANAGEMENT {
        return Err(Error::UnsupportedGatewayVersion {
            operation: "credential management",
            required: ApiVersion::CREDENTIAL_MANAGEMENT,
            actual: server,
        });
    }
    Ok(())
}

/// Fail unless the gateway supports credentials of `kind`.
pub fn check_version(kind: CredentialKind, server: ApiVersion) -> Result<(), Error> {
    check_management_version(server)?;
    if server < kind.min_version() {
        return Err(Error::UnsupportedGatewayVersion {
            operation: kind.tag(),
            required: kind.min_version(),
            actual: server,
        });
    }
    Ok(())
}

/// Credential management operations, borrowed from a [`Client`].
pub struct Credentials<'a> {
    client: &'a Client,
}

impl Client {
    pub fn credentials(&self) -> Credentials<'_> {
        Credentials { client: self }
    }
}

impl Credentials<'_> {
    /// Ask the gateway for its version and apply the credential gate.
    async fn gate(&self, kind: Option<CredentialKind>) -> Result<ApiVersion, Error> {
        let version = self.client.api_version().await?;
        let checked = match kind {
            Some(kind) => check_version(kind, version),
            None => check_management_version(version),
        };
        if let Err(exc) = checked {
            error!("{exc}");
            return Err(exc);
        }
        Ok(version)
    }

    fn item_path(id: &str) -> Result<String, Error> {
        check_segment("credential id", id)?;
        Ok(format!("{CREDENTIAL_PATH}/{id}"))
    }

    /// Create a credential.
    ///
    /// `POST /api/Api/V1/Credential`
    pub async fn create(&self, record: &CredentialRecord) -> Result<Value, Error> {
        record.validate()?;
        self.gate(Some(record.kind)).await?;

        let request = ApiRequest::post(CREDENTIAL_PATH)
            .json(build_payload(record))
            .redacted();
        debug!(kind = record.kind.tag(), label = %record.label, "creating credential");
        self.client.execute(&request).await
    }

    /// List credentials.
    ///
    /// `GET /api/Api/V1/Credential`
    pub async fn list(
        &self,
        filter: &FilterSpec,
        fields: &FieldProjection,
    ) -> Result<Value, Error> {
        self.gate(None).await?;
        let request = ApiRequest::get(CREDENTIAL_PATH)
            .filter(filter.clone())
            .fields(fields.clone());
        self.client.execute(&request).await
    }

    /// Read one credential. Passwords are never returned.
    ///
    /// `GET /api/Api/V1/Credential/{id}`
    pub async fn get(&self, id: &str) -> Result<Value, Error> {
        let path = Self::item_path(id)?;
        self.gate(None).await?;
        self.client.execute(&ApiRequest::get(path)).await
    }

    /// Replace a credential with `record`.
    ///
    /// `PUT /api/Api/V1/Credential/{id}`
    pub async fn update(&self, id: &str, record: &CredentialRecord) -> Result<Value, Error> {
        let path = Self::item_path(id)?;
        record.validate()?;
        self.gate(Some(record.kind)).await?;

        let request = ApiRequest::put(path).json(build_payload(record)).redacted();
        debug!(id, kind = record.kind.tag(), "updating credential");
        self.client.execute(&request).await
    }

    /// Delete a credential. A missing id is reported as `ResourceNotFound`.
    ///
    /// `DELETE /api/Api/V1/Credential/{id}`
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        let path = Self::item_path(id)?;
        self.gate(None).await?;
        self.client
            .execute(&ApiRequest::delete(path).operation(Operation::Delete))
            .await?;
        debug!(id, "deleted credential");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn domain_capability_table() {
        let capable: Vec<_> = CredentialKind::iter()
            .filter(|k| k.accepts_domain())
            .collect();
        assert_eq!(
            capable,
            vec![
                CredentialKind::VCenter,
                CredentialKind::Em,
                CredentialKind::Ps,
                CredentialKind::Os,
                CredentialKind::OsUser,
            ]
        );
        assert_eq!(CredentialKind::iter().count(), 8);
    }

    #[test]
    fn domain_never_emitted_for_incapable_kinds() {
        for kind in CredentialKind::iter().filter(|k| !k.accepts_domain()) {
            let record =
                CredentialRecord::new(kind, "label", "admin", "pw").with_domain("corp.local");
            let payload = build_payload(&record);
            let body = &payload["asmCredential"][kind.tag()];
            assert!(body.is_object(), "{kind:?} payload missing body");
            assert!(body.get("domain").is_none(), "{kind:?} leaked a domain");
        }
    }

    #[test]
    fn domain_kept_for_capable_kinds() {
        let record = CredentialRecord::new(
            CredentialKind::VCenter,
            "Test vCenter",
            "vcadmin",
            "vcpassword",
        )
        .with_domain("vsphere.local");
        assert_eq!(
            build_payload(&record),
            json!({
                "asmCredential": {
                    "vCenterCredential": {
                        "label": "Test vCenter",
                        "username": "vcadmin",
                        "password": "vcpassword",
                        "domain": "vsphere.local"
                    }
                }
            })
        );
    }

    #[test]
    fn kind_names_parse_in_both_forms() {
        assert_eq!(CredentialKind::parse("server").unwrap(), CredentialKind::Server);
        assert_eq!(
            CredentialKind::parse("ServerCredential").unwrap(),
            CredentialKind::Server
        );
        assert_eq!(
            CredentialKind::parse("vCenterCredential").unwrap(),
            CredentialKind::VCenter
        );
        assert_eq!(CredentialKind::parse("OSUser").unwrap(), CredentialKind::OsUser);
        assert!(matches!(
            CredentialKind::parse("invalid_type"),
            Err(Error::InvalidOption { .. })
        ));
    }

    #[test]
    fn detect_kind_from_document() {
        let doc = json!({ "iomCredential": { "label": "switch" } });
        assert_eq!(CredentialKind::detect(&doc), Some(CredentialKind::Iom));
        assert_eq!(CredentialKind::detect(&json!({ "credential": {} })), None);
        assert_eq!(CredentialKind::detect(&json!([])), None);
    }

    #[test]
    fn record_validation() {
        let ok = CredentialRecord::new(CredentialKind::Server, "srv", "admin", "pw");
        assert!(ok.validate().is_ok());
        for (label, user, pass, needle) in [
            ("", "admin", "pw", "label"),
            ("srv", "", "pw", "username"),
            ("srv", "admin", "", "password"),
        ] {
            let Err(Error::InvalidOption { message }) =
                CredentialRecord::new(CredentialKind::Server, label, user, pass).validate()
            else {
                panic!("expected InvalidOption for missing {needle}");
            };
            assert!(message.contains(needle));
        }
    }

    #[test]
    fn credential_ids_cannot_reshape_the_url() {
        assert_eq!(
            Credentials::item_path("c1").unwrap(),
            "/Api/V1/Credential/c1"
        );
        for bad in ["", "c1#frag", "c1?x=1", "c 1", "../c1"] {
            assert!(
                matches!(Credentials::item_path(bad), Err(Error::InvalidOption { .. })),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn version_gate() {
        assert!(check_version(CredentialKind::Server, ApiVersion::new(4, 0)).is_ok());
        assert!(check_version(CredentialKind::OsUser, ApiVersion::new(4, 5)).is_ok());
        let Err(Error::UnsupportedGatewayVersion { required, actual, .. }) =
            check_version(CredentialKind::ScaleIo, ApiVersion::new(3, 6))
        else {
            panic!("expected UnsupportedGatewayVersion");
        };
        assert_eq!(required, ApiVersion::new(4, 0));
        assert_eq!(actual, ApiVersion::new(3, 6));
    }
}
