use std::time::Duration;

/// Provider call failures, split by how the caller should react.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The target model rejected an optional request parameter.  Retried
    /// exactly once by the caller with the optional bundle stripped.
    #[error("unsupported parameter `{param}`: {message}")]
    UnsupportedParameter { param: String, message: String },

    /// Client-side rejection (4xx) other than an unsupported parameter.
    /// Not retried.
    #[error("provider rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    /// Server-side failure (5xx).  Transient; retried with backoff.
    #[error("provider server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Connection-level failure.  Transient; retried with backoff.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The wall-clock budget for the call elapsed.
    #[error("provider call exceeded {:?} budget", .0)]
    Timeout(Duration),

    /// The response body could not be read as the expected shape.
    #[error("unparseable provider response: {0}")]
    Parse(String),

    /// The caller's circuit breaker is open.
    #[error("circuit open after repeated provider failures")]
    CircuitOpen,
}

impl LlmError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Server { .. } | LlmError::Network(_))
    }
}

/// Map a non-success provider response body to the right error variant.
///
/// Unsupported-parameter rejections arrive as 400s with a machine-readable
/// `error.code` (and usually `error.param`); everything else keeps its
/// status class.
pub fn classify_status(status: u16, body: &str) -> LlmError {
    if status >= 500 {
        return LlmError::Server {
            status,
            message: truncate(body, 300),
        };
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &json["error"];
        let code = error["code"].as_str().unwrap_or_default();
        let message = error["message"].as_str().unwrap_or_default();
        if code == "unsupported_parameter"
            || code == "unsupported_value"
            || message.to_lowercase().contains("unsupported parameter")
        {
            let param = error["param"]
                .as_str()
                .map(ToString::to_string)
                .unwrap_or_else(|| extract_quoted_param(message));
            return LlmError::UnsupportedParameter {
                param,
                message: truncate(message, 300),
            };
        }
    }

    LlmError::Api {
        status,
        message: truncate(body, 300),
    }
}

fn extract_quoted_param(message: &str) -> String {
    message
        .split('\'')
        .nth(1)
        .unwrap_or("unknown")
        .to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
