use thiserror::Error;

#[derive(Error, Debug)]
pub enum EfciError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Migration apply failed: {0}")]
    MigrationFailed(String),

    #[error("Test run failed")]
    TestsFailed,
}

impl EfciError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    pub fn migration_failed(msg: impl Into<String>) -> Self {
        Self::MigrationFailed(msg.into())
    }
}
