//! Error types for vm-customize-rs

use thiserror::Error;

/// Main error type for customization operations
#[derive(Error, Debug)]
pub enum CustomizationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{action} cloud-init {payload} failed: {message}")]
    Codec {
        action: CodecAction,
        payload: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A remote operation against the live VM failed
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl CustomizationError {
    /// Create a decode error for the named payload
    pub fn decode(payload: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Codec {
            action: CodecAction::Decode,
            payload: payload.into(),
            message: message.to_string(),
        }
    }

    /// Create an encode error for the named payload
    pub fn encode(payload: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Codec {
            action: CodecAction::Encode,
            payload: payload.into(),
            message: message.to_string(),
        }
    }

    /// Attach the payload name to a codec error; other errors are unchanged
    pub fn for_payload(self, name: &str) -> Self {
        match self {
            Self::Codec {
                action, message, ..
            } => Self::Codec {
                action,
                payload: name.to_string(),
                message,
            },
            other => other,
        }
    }
}

/// Direction of a failed codec operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecAction {
    Decode,
    Encode,
}

impl std::fmt::Display for CodecAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecAction::Decode => write!(f, "decoding"),
            CodecAction::Encode => write!(f, "encoding"),
        }
    }
}

/// Fault kinds reported by the hypervisor that the engine distinguishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// A guest customization has already been started and not yet completed
    CustomizationPending,
    /// Any other fault, by name
    Other(String),
}

/// Failure of a hypervisor task
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TaskError {
    pub fault: Option<Fault>,
    pub message: String,
}

impl TaskError {
    /// A task failure with no decoded fault
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            fault: None,
            message: message.into(),
        }
    }

    /// A task failure carrying a decoded fault
    pub fn with_fault(fault: Fault, message: impl Into<String>) -> Self {
        Self {
            fault: Some(fault),
            message: message.into(),
        }
    }

    /// Whether the task failed because a customization is already pending
    pub fn is_customization_pending(&self) -> bool {
        matches!(self.fault, Some(Fault::CustomizationPending))
    }
}
