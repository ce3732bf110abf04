//! Connector error types.
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// Error that can occur while talking to an external collaborator.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish a connection to the target system.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request timed out.
    #[error("request timeout after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Network error during communication.
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The API asked us to slow down (HTTP 429).
    #[error("rate limited by target system")]
    RateLimited { retry_after_secs: Option<u64> },

    // Authentication errors (permanent)
    /// Token acquisition or credential validation failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // Configuration errors (permanent)
    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // API-level errors
    /// The API rejected the request with an error status.
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Object not found in the target system.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Object already exists in the target system (create conflict).
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Response body could not be interpreted.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl ConnectorError {
    /// Check if this error is transient and the operation may be retried.
    ///
    /// Transient errors are caused by temporary conditions that can resolve
    /// themselves: network trouble, timeouts, rate limits, 5xx responses.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectorError::ConnectionFailed { .. }
            | ConnectorError::Timeout { .. }
            | ConnectorError::Network { .. }
            | ConnectorError::RateLimited { .. } => true,
            ConnectorError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error is permanent and retry won't help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Short error code for classification in logs and reports.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::Timeout { .. } => "TIMEOUT",
            ConnectorError::Network { .. } => "NETWORK_ERROR",
            ConnectorError::RateLimited { .. } => "RATE_LIMITED",
            ConnectorError::AuthenticationFailed { .. } => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::Api { .. } => "API_ERROR",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::InvalidResponse { .. } => "INVALID_RESPONSE",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with its underlying cause.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        ConnectorError::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        ConnectorError::InvalidResponse {
            message: message.into(),
        }
    }

    /// Map an HTTP status and body into the matching error variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ConnectorError::AuthenticationFailed { message },
            404 => ConnectorError::ObjectNotFound {
                identifier: message,
            },
            409 => ConnectorError::ObjectAlreadyExists {
                identifier: message,
            },
            429 => ConnectorError::RateLimited {
                retry_after_secs: None,
            },
            status => ConnectorError::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConnectorError::Timeout { timeout_secs: 0 }
        } else if err.is_connect() {
            ConnectorError::ConnectionFailed {
                message: err.to_string(),
                source: Some(Box::new(err)),
            }
        } else {
            ConnectorError::Network {
                message: err.to_string(),
                source: Some(Box::new(err)),
            }
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let transient = vec![
            ConnectorError::connection_failed("down"),
            ConnectorError::Timeout { timeout_secs: 30 },
            ConnectorError::RateLimited {
                retry_after_secs: Some(2),
            },
            ConnectorError::Api {
                status: 503,
                message: "unavailable".into(),
            },
        ];
        for err in transient {
            assert!(err.is_transient(), "{} should be transient", err.error_code());
        }
    }

    #[test]
    fn permanent_classification() {
        let permanent = vec![
            ConnectorError::authentication("bad key"),
            ConnectorError::invalid_configuration("missing scope"),
            ConnectorError::Api {
                status: 400,
                message: "bad request".into(),
            },
            ConnectorError::ObjectNotFound {
                identifier: "spaces/unknown".into(),
            },
        ];
        for err in permanent {
            assert!(err.is_permanent(), "{} should be permanent", err.error_code());
        }
    }

    #[test]
    fn from_status_maps_variants() {
        assert!(matches!(
            ConnectorError::from_status(404, "spaces/x"),
            ConnectorError::ObjectNotFound { .. }
        ));
        assert!(matches!(
            ConnectorError::from_status(429, ""),
            ConnectorError::RateLimited { .. }
        ));
        assert!(matches!(
            ConnectorError::from_status(403, "forbidden"),
            ConnectorError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            ConnectorError::from_status(500, "boom"),
            ConnectorError::Api { status: 500, .. }
        ));
    }
}
