use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can end an evaluation run.
///
/// Each variant maps to one trust hop or pipeline stage so operators can
/// tell from the surfaced error which step broke.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Secret access error: {message}")]
    SecretAccess {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Federation error: {message}")]
    Federation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Role assumption error: {message}")]
    RoleAssumption {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Chat service error: {message}")]
    ChatService {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Evaluation error: {message}")]
    Evaluation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn secret_access(message: impl Into<String>) -> Self {
        Self::SecretAccess {
            message: message.into(),
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            source: None,
        }
    }

    pub fn federation(message: impl Into<String>) -> Self {
        Self::Federation {
            message: message.into(),
            source: None,
        }
    }

    pub fn role_assumption(message: impl Into<String>) -> Self {
        Self::RoleAssumption {
            message: message.into(),
            source: None,
        }
    }

    pub fn chat_service(message: impl Into<String>) -> Self {
        Self::ChatService {
            message: message.into(),
            source: None,
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause. Configuration errors carry no source.
    pub fn with_source(mut self, cause: impl Into<BoxError>) -> Self {
        match &mut self {
            Self::Configuration { .. } => {}
            Self::SecretAccess { source, .. }
            | Self::Authentication { source, .. }
            | Self::Federation { source, .. }
            | Self::RoleAssumption { source, .. }
            | Self::ChatService { source, .. }
            | Self::Evaluation { source, .. } => *source = Some(cause.into()),
        }
        self
    }

    /// Short name of the stage that failed, used in logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::SecretAccess { .. } => "secret",
            Self::Authentication { .. } => "authenticate",
            Self::Federation { .. } => "federate",
            Self::RoleAssumption { .. } => "assume-role",
            Self::ChatService { .. } => "chat",
            Self::Evaluation { .. } => "evaluation",
        }
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 2,
            Self::SecretAccess { .. } => 3,
            Self::Authentication { .. } => 4,
            Self::Federation { .. } => 5,
            Self::RoleAssumption { .. } => 6,
            Self::ChatService { .. } => 7,
            Self::Evaluation { .. } => 8,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure reported by an external collaborator (secret store, directory,
/// token services, chat service, scoring framework).
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub operation: &'static str,
    pub code: Option<String>,
    pub message: String,
    /// Whether repeating the identical request may succeed.
    pub transient: bool,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} failed ({}): {}", self.operation, code, self.message),
            None => write!(f, "{} failed: {}", self.operation, self.message),
        }
    }
}

impl std::error::Error for CallError {}

impl CallError {
    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: None,
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: None,
            message: message.into(),
            transient: true,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}
