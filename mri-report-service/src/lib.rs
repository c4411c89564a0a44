pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod generator;
pub mod models;
pub mod service;
pub mod tasks;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use config::ServiceConfig;
pub use error::ReportError;
pub use service::{AppState, create_app, create_app_with};
pub use workflow::{
    UserAction, WorkflowController, WorkflowDeps, build_mri_workflow, create_flow_runner,
    create_mri_session,
};
pub use models::*;
