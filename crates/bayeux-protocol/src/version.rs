//! Protocol versioning and connection types.

use std::str::FromStr;

/// Bayeux protocol version implemented by this server.
pub const BAYEUX_VERSION: Version = Version { major: 1, minor: 0 };

/// Connection types the server accepts, in preference order.
pub const CONNECTION_TYPES: &[&str] = &[
    "long-polling",
    "cross-origin-long-polling",
    "callback-polling",
    "websocket",
    "eventsource",
    "in-process",
    "tcp",
];

/// Connection type whose transport holds the connection open itself.
pub const EVENTSOURCE: &str = "eventsource";

/// Check whether the server accepts a connection type.
#[must_use]
pub fn is_supported_connection_type(connection_type: &str) -> bool {
    CONNECTION_TYPES.contains(&connection_type)
}

/// Protocol version information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    /// Major version - breaking changes increment this.
    pub major: u8,
    /// Minor version - backwards-compatible changes increment this.
    pub minor: u8,
}

impl Version {
    /// Create a new version.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check if this version is compatible with another version.
    ///
    /// Versions are compatible if they share the same major version.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Default for Version {
    fn default() -> Self {
        BAYEUX_VERSION
    }
}

impl FromStr for Version {
    type Err = &'static str;

    /// Parse `major[.minor[.patch...]]`; anything past the minor is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or("Invalid major version")?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| "Invalid minor version")?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}
