// powerflex-api: Async Rust client for the PowerFlex gateway REST API
//
// Session lifecycle, the request pipeline every resource operation goes
// through, filter/projection encoding, the generic object API and
// credential management.

pub mod auth;
pub mod client;
pub mod config;
pub mod credential;
pub mod entity;
pub mod error;
pub mod query;
pub mod request;
pub mod session;
pub mod system;
pub mod transport;
pub mod version;

pub use auth::{AuthScheme, Token};
pub use client::Client;
pub use config::{GatewayConfig, LogLevel};
pub use credential::{CredentialKind, CredentialRecord, Credentials, build_payload, check_version};
pub use entity::Entity;
pub use error::{ApiError, Error, Operation};
pub use query::{FieldProjection, FilterSpec, decode_filter, encode_fields, encode_filter};
pub use request::ApiRequest;
pub use session::Session;
pub use transport::{TlsMode, TransportConfig};
pub use version::ApiVersion;
