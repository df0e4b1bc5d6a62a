use serde::Serialize;

/// Fixed status object returned on `GET`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Always `true`; reaching the handler is the health signal
    pub ok: bool,
    /// Service name
    pub service: String,
    /// Chain the upstream serves
    pub chain: String,
}

impl HealthResponse {
    pub fn new(service: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            ok: true,
            service: service.into(),
            chain: chain.into(),
        }
    }
}

/// Error body for every gate-level rejection.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Human-readable message; callers branch on the status code instead
    pub error: String,
    /// Sanitised category, only set for upstream failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
