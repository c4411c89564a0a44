use graph_flow::GraphError;
use thiserror::Error;

use crate::models::{FailureKind, ReportKind, StepFailure};

#[derive(Debug, Error)]
pub enum ReportError {
    /// Missing key, unreadable or empty PDF, action out of order
    #[error("{0}")]
    Input(String),

    /// The provider rejected the credential
    #[error("API key rejected by provider: {0}")]
    Auth(String),

    /// Network failure, non-success status or malformed response
    #[error("LLM provider error: {0}")]
    Upstream(String),

    #[error("PDF export failed: {0}")]
    Export(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Workflow(GraphError),
}

impl ReportError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Auth(_) => FailureKind::Auth,
            Self::Upstream(_) => FailureKind::Upstream,
            Self::Export(_) => FailureKind::Export,
            Self::Workflow(_) => FailureKind::Internal,
            Self::Input(_) | Self::SessionNotFound(_) => FailureKind::Input,
        }
    }

    pub fn into_failure(self, step: Option<ReportKind>) -> StepFailure {
        StepFailure {
            kind: self.failure_kind(),
            step,
            message: self.to_string(),
        }
    }
}

impl From<GraphError> for ReportError {
    fn from(err: GraphError) -> Self {
        match err {
            // the session was ended while the action ran
            GraphError::SessionNotFound(id) => ReportError::SessionNotFound(id),
            other => ReportError::Workflow(other),
        }
    }
}

impl From<ReportError> for GraphError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Workflow(inner) => inner,
            ReportError::SessionNotFound(id) => GraphError::SessionNotFound(id),
            other => GraphError::TaskExecutionFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_session_keeps_its_meaning_across_layers() {
        let err: ReportError = GraphError::SessionNotFound("s1".to_string()).into();
        assert!(matches!(err, ReportError::SessionNotFound(ref id) if id == "s1"));

        let err: ReportError = GraphError::TaskNotFound("t1".to_string()).into();
        assert_eq!(err.failure_kind(), FailureKind::Internal);

        let back: GraphError = ReportError::SessionNotFound("s2".to_string()).into();
        assert!(matches!(back, GraphError::SessionNotFound(id) if id == "s2"));
    }
}
