//! Shared error taxonomy for the storyforge workspace.
//!
//! Every subsystem reports failures through [`ForgeError`]. The variants split
//! along the lines that matter at run time:
//! - transient external failures (rate limits, retryable provider errors) that
//!   the retry wrapper may absorb,
//! - configuration defects (missing credentials, malformed graphs) that abort
//!   immediately,
//! - fatal run failures tagged with the stage that produced them.

/// Unified error type for all storyforge subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    // === Model provider errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    // === Configuration errors ===
    #[error("Missing required configuration: {key}")]
    MissingConfig { key: String },

    #[error("Graph configuration error: {0}")]
    GraphConfig(String),

    // === Run errors ===
    #[error("Node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

    #[error("Node '{node}' exhausted {attempts} repair attempts; outstanding findings:\n{findings}")]
    RepairExhausted {
        node: String,
        attempts: u32,
        findings: String,
    },

    #[error("Conditional edge on '{node}' selected undeclared target '{target}'")]
    UnroutedBranch { node: String, target: String },

    #[error("stage '{node}' failed: {source}")]
    Stage {
        node: String,
        #[source]
        source: Box<ForgeError>,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ForgeError {
    /// Returns `true` if the failure is transient and the call may succeed on
    /// retry. Only rate-limit signals and provider errors explicitly flagged
    /// retryable qualify; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ForgeError::RateLimited { .. } | ForgeError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ForgeError::AuthError { .. }
                | ForgeError::MissingConfig { .. }
                | ForgeError::GraphConfig(_)
        )
    }

    /// Maps the error to an HTTP status code for server mode.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ForgeError::RateLimited { .. } => Some(429),
            ForgeError::AuthError { .. } => Some(401),
            ForgeError::ProviderError { status, .. } => Some(*status),
            ForgeError::RepairExhausted { .. } => Some(502),
            ForgeError::Stage { source, .. } => source.http_status(),
            _ => None,
        }
    }

    /// Tag an error with the stage it escaped from. Errors already tagged are
    /// passed through unchanged so nesting never stacks.
    pub fn at_stage(self, node: &str) -> ForgeError {
        match self {
            tagged @ ForgeError::Stage { .. } => tagged,
            other => ForgeError::Stage {
                node: node.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// A convenience alias for `Result<T, ForgeError>`.
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = ForgeError::ProviderError {
            provider: "google".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider google returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_rate_limited() {
        let err = ForgeError::RateLimited {
            provider: "google".into(),
            retry_after_ms: 3000,
        };
        assert_eq!(err.to_string(), "Rate limited by google, retry after 3000ms");
    }

    #[test]
    fn error_display_missing_config() {
        let err = ForgeError::MissingConfig {
            key: "GEMINI_API_KEY".into(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required configuration: GEMINI_API_KEY"
        );
    }

    #[test]
    fn error_display_repair_exhausted_carries_findings() {
        let err = ForgeError::RepairExhausted {
            node: "lint_passages".into(),
            attempts: 3,
            findings: "Missing required passage 'StoryTitle'.".into(),
        };
        let text = err.to_string();
        assert!(text.contains("lint_passages"));
        assert!(text.contains("3 repair attempts"));
        assert!(text.contains("Missing required passage 'StoryTitle'."));
    }

    #[test]
    fn error_display_stage_wraps_source() {
        let err = ForgeError::NodeFailed {
            node: "brainstorm_concepts".into(),
            message: "model returned no text".into(),
        }
        .at_stage("brainstorm_concepts");
        assert_eq!(
            err.to_string(),
            "stage 'brainstorm_concepts' failed: Node 'brainstorm_concepts' failed: model returned no text"
        );
    }

    #[test]
    fn at_stage_does_not_nest() {
        let err = ForgeError::Other("boom".into())
            .at_stage("outline")
            .at_stage("later");
        match err {
            ForgeError::Stage { node, .. } => assert_eq!(node, "outline"),
            other => panic!("expected Stage, got {other:?}"),
        }
    }

    // --- is_transient ---

    #[test]
    fn transient_rate_limited() {
        let err = ForgeError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 1000,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn transient_provider_error_when_flagged() {
        let err = ForgeError::ProviderError {
            provider: "x".into(),
            status: 503,
            message: "unavailable".into(),
            retryable: true,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn not_transient_provider_error_when_not_flagged() {
        let err = ForgeError::ProviderError {
            provider: "x".into(),
            status: 400,
            message: "bad request".into(),
            retryable: false,
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn not_transient_auth_error() {
        let err = ForgeError::AuthError { provider: "x".into() };
        assert!(!err.is_transient());
    }

    #[test]
    fn not_transient_repair_exhausted() {
        let err = ForgeError::RepairExhausted {
            node: "lint".into(),
            attempts: 3,
            findings: "x".into(),
        };
        assert!(!err.is_transient());
    }

    // --- is_terminal ---

    #[test]
    fn terminal_auth_and_config_errors() {
        assert!(ForgeError::AuthError { provider: "x".into() }.is_terminal());
        assert!(ForgeError::MissingConfig { key: "K".into() }.is_terminal());
        assert!(ForgeError::GraphConfig("bad".into()).is_terminal());
    }

    #[test]
    fn not_terminal_rate_limited() {
        let err = ForgeError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 0,
        };
        assert!(!err.is_terminal());
    }

    // --- http_status ---

    #[test]
    fn http_status_rate_limited_429() {
        let err = ForgeError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 0,
        };
        assert_eq!(err.http_status(), Some(429));
    }

    #[test]
    fn http_status_provider_passes_through() {
        let err = ForgeError::ProviderError {
            provider: "x".into(),
            status: 502,
            message: "bad gateway".into(),
            retryable: true,
        };
        assert_eq!(err.http_status(), Some(502));
    }

    #[test]
    fn http_status_stage_delegates_to_source() {
        let err = ForgeError::AuthError { provider: "x".into() }.at_stage("outline");
        assert_eq!(err.http_status(), Some(401));
    }

    #[test]
    fn http_status_none_for_other() {
        assert_eq!(ForgeError::Other("x".into()).http_status(), None);
    }

    // --- From impls ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ForgeError = io_err.into();
        assert!(matches!(err, ForgeError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ForgeError = json_err.into();
        assert!(matches!(err, ForgeError::Json(_)));
    }
}
