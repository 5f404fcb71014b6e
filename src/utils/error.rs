use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Cannot resolve destination '{address}:{port}': {reason}")]
    AddressResolution {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("Tag table has {labels} labels but {ports} input ports are declared")]
    TagTableTooShort { ports: usize, labels: usize },

    #[error("Tag '{tag}' is assigned to more than one input port")]
    DuplicateTag { tag: String },

    #[error("Contract mismatch: {message}")]
    ContractMismatch { message: String },

    #[error("Invalid port spec '{spec}': {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    #[error("Tick at {timestamp} carries {actual} ports, stage declares {expected}")]
    TickShape {
        timestamp: i64,
        expected: usize,
        actual: usize,
    },

    #[error("Send to {destination} failed ({kind}): {source}")]
    SendError {
        destination: std::net::SocketAddr,
        kind: crate::core::transmitter::SendFailure,
        #[source]
        source: std::io::Error,
    },

    #[error("Replay error at line {line}: {message}")]
    ReplayError { line: usize, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Contract,
    Transmission,
    Codec,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl RelayError {
    pub fn config(message: impl Into<String>) -> Self {
        RelayError::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::ConfigError { .. }
            | RelayError::InvalidConfigValueError { .. }
            | RelayError::AddressResolution { .. }
            | RelayError::TagTableTooShort { .. }
            | RelayError::DuplicateTag { .. }
            | RelayError::InvalidPortSpec { .. } => ErrorCategory::Configuration,
            RelayError::ContractMismatch { .. } | RelayError::TickShape { .. } => {
                ErrorCategory::Contract
            }
            RelayError::SendError { .. } => ErrorCategory::Transmission,
            RelayError::DecodeError(_)
            | RelayError::SerializationError(_)
            | RelayError::ReplayError { .. } => ErrorCategory::Codec,
            RelayError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Transmission => ErrorSeverity::Medium,
            ErrorCategory::Codec => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::Contract => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 是否屬於設定階段錯誤 (stage 無法進入 Ready)
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Contract
        ) && !matches!(self, RelayError::TickShape { .. })
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            RelayError::AddressResolution { .. } => {
                "Use a literal IPv4 address such as 127.0.0.1 and a non-zero port".to_string()
            }
            RelayError::TagTableTooShort { ports, .. } => format!(
                "Add labels to [tags] so there is one per input port ({} needed)",
                ports
            ),
            RelayError::DuplicateTag { .. } => {
                "Give every input port a distinct stream name or label".to_string()
            }
            RelayError::ContractMismatch { .. } => {
                "Declare output ports with the same tags and indexes as the input ports"
                    .to_string()
            }
            RelayError::InvalidPortSpec { .. } => {
                "Port specs look like 'stream', 'TAG:stream' or 'TAG:0:stream'".to_string()
            }
            RelayError::TickShape { .. } => {
                "Deliver one slot per declared input port on every tick".to_string()
            }
            RelayError::SendError { .. } => {
                "Check that the destination host is reachable; the next tick will send again"
                    .to_string()
            }
            RelayError::ReplayError { .. } | RelayError::SerializationError(_) => {
                "Check the tick file: one JSON object per line".to_string()
            }
            RelayError::DecodeError(_) => {
                "The datagram is not a tagged landmark list vector".to_string()
            }
            RelayError::ConfigError { .. }
            | RelayError::InvalidConfigValueError { .. } => {
                "Fix the configuration file and start again".to_string()
            }
            RelayError::IoError(_) => "Check file paths and permissions".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Contract => format!("Port contract problem: {}", self),
            ErrorCategory::Transmission => format!("Network send problem: {}", self),
            ErrorCategory::Codec => format!("Data format problem: {}", self),
            ErrorCategory::System => format!("System problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
