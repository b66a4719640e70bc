use std::path::PathBuf;

/// Error taxonomy for the conversion pipeline.
///
/// The executor treats these differently: `Config` and `UserInput` are
/// usage mistakes surfaced to the caller immediately, while `MissingArtifact`
/// and `Execution` stay local to the command that hit them (SKIPPED / FAIL
/// in the run report) and never abort sibling branches.
#[derive(Debug, thiserror::Error)]
pub enum PorterError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("input artifact not found: {path}")]
    MissingArtifact { path: PathBuf },
    #[error("command execution failed: {0}")]
    Execution(String),
    #[error("invalid input: {0}")]
    UserInput(String),
}

impl PorterError {
    pub fn config(msg: impl Into<String>) -> Self {
        PorterError::Config(msg.into())
    }

    pub fn user_input(msg: impl Into<String>) -> Self {
        PorterError::UserInput(msg.into())
    }
}
