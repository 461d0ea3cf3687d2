use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Plan contains no tasks")]
    EmptyPlan,

    #[error("No capability profile for agent type: {0}")]
    UnknownAgentType(String),

    #[error("No executor registered for agent type: {0}")]
    MissingExecutor(String),

    #[error("Unresolved dependency cycle while batching; {remaining} tasks unschedulable")]
    UnresolvedCycle { remaining: usize },

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
