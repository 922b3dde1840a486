use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Aggregated type-checker diagnostics, already formatted one per entry.
    #[error("{checker} failed {}", json_list(.messages))]
    TypeCheck {
        checker: String,
        messages: Vec<String>,
    },

    /// Aggregated bundler errors and warnings.
    #[error("{bundler} failed {}", json_list(.messages))]
    Bundle {
        bundler: String,
        messages: Vec<String>,
    },

    #[error("Service error: {0}")]
    Service(String),
}

impl BuilderError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }

    /// Formatted messages carried by an aggregated failure.
    pub fn messages(&self) -> &[String] {
        match self {
            BuilderError::TypeCheck { messages, .. } | BuilderError::Bundle { messages, .. } => {
                messages
            }
            _ => &[],
        }
    }
}

fn json_list(messages: &[String]) -> String {
    serde_json::to_string(messages).unwrap_or_else(|_| format!("{:?}", messages))
}

pub type Result<T> = std::result::Result<T, BuilderError>;

impl From<serde_json::Error> for BuilderError {
    fn from(err: serde_json::Error) -> Self {
        BuilderError::config(err.to_string())
    }
}

impl From<regex::Error> for BuilderError {
    fn from(err: regex::Error) -> Self {
        BuilderError::config(format!("Invalid filter: {}", err))
    }
}

impl From<tokio::task::JoinError> for BuilderError {
    fn from(err: tokio::task::JoinError) -> Self {
        BuilderError::service(err.to_string())
    }
}

impl From<anyhow::Error> for BuilderError {
    fn from(err: anyhow::Error) -> Self {
        BuilderError::service(err.to_string())
    }
}
