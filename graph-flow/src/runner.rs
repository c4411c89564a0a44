//! FlowRunner – loads a session, executes one graph step and saves the session back.
//!
//! Interactive services run one step per request: the request handler puts the user's
//! input into the session context, then asks the runner to advance. Use
//! [`FlowRunner::resume_at`] when the user's action decides which task handles it
//! (for example re-uploading a document after the workflow has moved on).
//!
//! A session deleted while one of its tasks is running stays deleted: the runner
//! only writes back sessions that are still in storage.

use std::sync::Arc;

use crate::{
    error::{GraphError, Result},
    graph::{ExecutionResult, Graph},
    storage::{Session, SessionStorage},
};

/// High-level helper that orchestrates the common _load → execute → save_ pattern.
#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    /// Execute the session's current task and persist the updated session.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))?;

        let result = self.graph.execute_session(&mut session).await?;
        self.persist(session).await?;

        Ok(result)
    }

    /// Point the session at `task_id`, then execute from there.
    pub async fn resume_at(&self, session_id: &str, task_id: &str) -> Result<ExecutionResult> {
        if !self.graph.contains_task(task_id) {
            return Err(GraphError::TaskNotFound(task_id.to_string()));
        }

        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))?;

        session.current_task_id = task_id.to_string();
        let result = self.graph.execute_session(&mut session).await?;
        self.persist(session).await?;

        Ok(result)
    }

    async fn persist(&self, session: Session) -> Result<()> {
        let session_id = session.id.clone();
        if !self.storage.save_if_present(session).await? {
            return Err(GraphError::SessionNotFound(session_id));
        }
        Ok(())
    }
}
