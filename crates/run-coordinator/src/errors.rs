use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("a run is already in progress: test `{0}`")]
    AlreadyRunning(String),

    #[error(transparent)]
    Flow(#[from] step_flow::FlowError),
}
