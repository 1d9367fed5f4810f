pub mod artifact;
pub mod completion;
pub mod config;
pub mod encoder;
pub mod error;
pub mod intake;
pub mod models;
pub mod parser;
pub mod service;
pub mod storage;
pub mod tasks;
mod utils;
pub mod workflow;

pub use completion::{CompletionClient, CompletionRequest, MessagesApiClient};
pub use config::ServiceConfig;
pub use error::{AppealError, ErrorKind, Result};
pub use models::*;
pub use service::{AppState, build_router, create_app};
pub use workflow::{
    StepOutcome, WorkflowController, WorkflowSettings, WorkflowSnapshot, WorkflowState,
    WorkflowStatus,
};
