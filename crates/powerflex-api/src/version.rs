// Gateway API version
//
// The gateway reports its version as a JSON string such as "3.6" or
// "4.5". Only major.minor takes part in comparisons; build suffixes
// ("3.6.700.103") are accepted and ignored.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A `major.minor` gateway API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    /// Oldest gateway this client talks to at all.
    pub const MIN_SUPPORTED: Self = Self::new(3, 0);

    /// Oldest gateway exposing credential management.
    pub const CREDENTIAL_MANAGEMENT: Self = Self::new(4, 0);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim().trim_matches('"');
        let invalid = || Error::Deserialization {
            message: format!("invalid gateway API version {raw:?}"),
            body: raw.to_owned(),
        };

        let mut parts = trimmed.split('.');
        let major = parts
            .next()
            .filter(|p| !p.is_empty())
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}
