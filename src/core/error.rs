use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage adapter is not available")]
    AdapterUnavailable,

    #[error("Storage read failure: {0}")]
    StorageRead(String),

    #[error("Storage write failure: {0}")]
    StorageWrite(String),

    #[error("State corruption detected: {0}")]
    CorruptionDetected(String),

    #[error("Migration {version} fault: {reason}")]
    MigrationTransformFault { version: u32, reason: String },

    #[error("Metadata must be configured on the gateway before persisting state")]
    MetadataNotConfigured,

    #[error("Metadata has already been configured on this gateway")]
    MetadataAlreadyConfigured,

    #[error("Updated state is missing")]
    MissingState,

    #[error("Updated state must be an object keyed by controller, got {0}")]
    InvalidState(String),

    #[error("Migration targeting version {0} is already registered")]
    DuplicateVersion(u32),

    #[error("Migration targeting version {version} must be greater than {latest}")]
    OutOfOrder { version: u32, latest: u32 },

    #[error("State has already been bootstrapped in this process")]
    AlreadyBootstrapped,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl StoreError {
    /// Stable name of the failure class, used as the diagnostic kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdapterUnavailable => "AdapterUnavailable",
            Self::StorageRead(_) => "StorageReadFailure",
            Self::StorageWrite(_) => "StorageWriteFailure",
            Self::CorruptionDetected(_) => "CorruptionDetected",
            Self::MigrationTransformFault { .. } => "MigrationTransformFault",
            Self::MetadataNotConfigured => "MetadataNotConfigured",
            Self::MetadataAlreadyConfigured => "MetadataAlreadyConfigured",
            Self::MissingState => "MissingState",
            Self::InvalidState(_) => "InvalidState",
            Self::DuplicateVersion(_) => "DuplicateVersion",
            Self::OutOfOrder { .. } => "OutOfOrder",
            Self::AlreadyBootstrapped => "AlreadyBootstrapped",
            Self::Serialization(_) => "Serialization",
            Self::IoError(_) => "IoError",
        }
    }

    /// Configuration errors are broken call sequences by the integrating code.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MetadataNotConfigured
                | Self::MetadataAlreadyConfigured
                | Self::MissingState
                | Self::InvalidState(_)
                | Self::DuplicateVersion(_)
                | Self::OutOfOrder { .. }
                | Self::AlreadyBootstrapped
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
