//! Tool results.

use serde::Serialize;

use drivetool_common::{Descriptor, Error, ErrorKind};

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The operation completed.
    Success {
        /// Agent-facing text.
        summary: String,
        /// Objects listed or created by the call.
        items: Vec<Descriptor>,
    },
    /// The operation failed.
    Failure {
        /// Classified failure kind.
        kind: ErrorKind,
        /// Explanation, prefixed with what was being attempted.
        message: String,
    },
}

impl ToolOutcome {
    pub fn success(summary: impl Into<String>, items: Vec<Descriptor>) -> Self {
        ToolOutcome::Success {
            summary: summary.into(),
            items,
        }
    }

    /// Classify `err` raised while `action` was running.
    pub fn failure(action: &str, err: &Error) -> Self {
        ToolOutcome::Failure {
            kind: err.kind(),
            message: format!("Error {}: {}", action, err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// Failure kind, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Text handed back to the agent.
    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Success { summary, .. } => summary.clone(),
            ToolOutcome::Failure { kind, message } => format!("[{}] {}", kind, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_kind_and_action() {
        let outcome = ToolOutcome::failure(
            "listing files",
            &Error::Network("connection reset".to_string()),
        );

        assert!(!outcome.is_success());
        assert_eq!(outcome.kind(), Some(ErrorKind::TransientNetwork));
        assert_eq!(
            outcome.render(),
            "[transient_network_error] Error listing files: Network error: connection reset"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let outcome = ToolOutcome::failure("x", &Error::NotFound("gone".to_string()));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "not_found");
    }

    #[test]
    fn test_structured_kind_matches_rendered_tag() {
        let outcome = ToolOutcome::failure(
            "creating folder",
            &Error::Authentication("token revoked".to_string()),
        );
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["kind"], "auth_failure");
        assert!(outcome.render().starts_with("[auth_failure] "));
    }
}
