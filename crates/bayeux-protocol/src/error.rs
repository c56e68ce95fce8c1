//! Protocol error catalog.
//!
//! Bayeux reports failures inside response envelopes as strings of the
//! form `"<code>:<param1>,<param2>,...:<message>"`.

use std::fmt;
use std::str::FromStr;

/// Canonical protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    VersionMismatch = 300,
    ConntypeMismatch = 301,
    ExtMismatch = 302,
    BadRequest = 400,
    ClientUnknown = 401,
    ParameterMissing = 402,
    ChannelForbidden = 403,
    ChannelUnknown = 404,
    ChannelInvalid = 405,
    ExtUnknown = 406,
    PublishFailed = 407,
    ServerError = 500,
}

impl ErrorCode {
    /// Numeric wire code.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Canonical human-readable message.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::VersionMismatch => "Version mismatch",
            ErrorCode::ConntypeMismatch => "Connection types not supported",
            ErrorCode::ExtMismatch => "Extension mismatch",
            ErrorCode::BadRequest => "Bad request",
            ErrorCode::ClientUnknown => "Unknown client",
            ErrorCode::ParameterMissing => "Missing required parameter",
            ErrorCode::ChannelForbidden => "Forbidden channel",
            ErrorCode::ChannelUnknown => "Unknown channel",
            ErrorCode::ChannelInvalid => "Invalid channel",
            ErrorCode::ExtUnknown => "Unknown extension",
            ErrorCode::PublishFailed => "Failed to publish",
            ErrorCode::ServerError => "Internal server error",
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code as u16
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = &'static str;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            300 => Ok(ErrorCode::VersionMismatch),
            301 => Ok(ErrorCode::ConntypeMismatch),
            302 => Ok(ErrorCode::ExtMismatch),
            400 => Ok(ErrorCode::BadRequest),
            401 => Ok(ErrorCode::ClientUnknown),
            402 => Ok(ErrorCode::ParameterMissing),
            403 => Ok(ErrorCode::ChannelForbidden),
            404 => Ok(ErrorCode::ChannelUnknown),
            405 => Ok(ErrorCode::ChannelInvalid),
            406 => Ok(ErrorCode::ExtUnknown),
            407 => Ok(ErrorCode::PublishFailed),
            500 => Ok(ErrorCode::ServerError),
            _ => Err("Invalid error code"),
        }
    }
}

/// A protocol error: code, ordered parameters and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    /// Numeric error code.
    pub code: u16,
    /// Ordered parameters, usually the offending values.
    pub params: Vec<String>,
    /// Human-readable message.
    pub message: String,
}

impl ProtocolError {
    /// Create an error from a catalog code.
    #[must_use]
    pub fn new<I, S>(code: ErrorCode, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code: code.code(),
            params: params.into_iter().map(Into::into).collect(),
            message: code.message().to_string(),
        }
    }

    /// The catalog entry for this error, if the code is canonical.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::try_from(self.code).ok()
    }

    /// Render the error in wire format.
    #[must_use]
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    pub fn version_mismatch<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::VersionMismatch, params)
    }

    pub fn conntype_mismatch<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ConntypeMismatch, params)
    }

    pub fn ext_mismatch<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ExtMismatch, params)
    }

    pub fn bad_request<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::BadRequest, params)
    }

    pub fn client_unknown<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ClientUnknown, params)
    }

    pub fn parameter_missing<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ParameterMissing, params)
    }

    pub fn channel_forbidden<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ChannelForbidden, params)
    }

    pub fn channel_unknown<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ChannelUnknown, params)
    }

    pub fn channel_invalid<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ChannelInvalid, params)
    }

    pub fn ext_unknown<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ExtUnknown, params)
    }

    pub fn publish_failed<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::PublishFailed, params)
    }

    pub fn server_error<I: IntoIterator<Item = S>, S: Into<String>>(params: I) -> Self {
        Self::new(ErrorCode::ServerError, params)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.code, self.params.join(","), self.message)
    }
}

impl std::error::Error for ProtocolError {}

impl FromStr for ProtocolError {
    type Err = &'static str;

    /// Parse a wire string back into an error.
    ///
    /// Parameters containing `:` are not representable on the wire, so the
    /// first and last colons delimit the parameter list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, rest) = s.split_once(':').ok_or("Missing error code")?;
        let (params, message) = rest.rsplit_once(':').ok_or("Missing error message")?;
        let code = code.parse().map_err(|_| "Invalid error code")?;
        let params = if params.is_empty() {
            Vec::new()
        } else {
            params.split(',').map(str::to_string).collect()
        };
        Ok(Self {
            code,
            params,
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let err = ProtocolError::channel_unknown(["/x"]);
        assert_eq!(err.to_string(), "404:/x:Unknown channel");
    }

    #[test]
    fn test_multiple_params() {
        let err = ProtocolError::conntype_mismatch(["long-polling", "flash"]);
        assert_eq!(
            err.to_wire(),
            "301:long-polling,flash:Connection types not supported"
        );
    }

    #[test]
    fn test_no_params() {
        let err = ProtocolError::server_error(Vec::<String>::new());
        assert_eq!(err.to_string(), "500::Internal server error");
    }

    #[test]
    fn test_parse_wire_string() {
        let err: ProtocolError = "402:clientId:Missing required parameter".parse().unwrap();
        assert_eq!(err.code, 402);
        assert_eq!(err.params, vec!["clientId"]);
        assert_eq!(err.kind(), Some(ErrorCode::ParameterMissing));

        let err: ProtocolError = "500::Internal server error".parse().unwrap();
        assert!(err.params.is_empty());

        assert!("nonsense".parse::<ProtocolError>().is_err());
    }

    #[test]
    fn test_catalog_codes() {
        assert_eq!(ErrorCode::VersionMismatch.code(), 300);
        assert_eq!(ErrorCode::ChannelForbidden.code(), 403);
        assert_eq!(ErrorCode::try_from(407), Ok(ErrorCode::PublishFailed));
        assert!(ErrorCode::try_from(418).is_err());
    }
}
