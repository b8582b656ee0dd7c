/// Result alias that carries the custom [`ShowError`] type.
pub type Result<T> = std::result::Result<T, ShowError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ShowError {
    /// The setup phase could not be completed. No part of the show runs.
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),
    /// A setup-only call was made after the setup phase closed.
    #[error("`{operation}` can only be called during setup")]
    SetupClosed { operation: &'static str },
    /// Failure on the hardware link. The operation's state change was not
    /// committed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The acknowledgment byte did not echo the command id.
    #[error("acknowledgment mismatch: sent command {expected:#04x}, received {received:#04x}")]
    ProtocolMismatch { expected: u8, received: u8 },
    #[error("can't find fixture named `{0}`")]
    UnknownFixture(String),
    #[error("can't find model named `{0}`")]
    UnknownModel(String),
    #[error("can't find group named `{0}`")]
    UnknownGroup(String),
    /// The fixture's model has no wiring for the requested channel.
    #[error("fixture `{fixture}` has no {channel} channel")]
    UnsupportedChannel {
        fixture: String,
        channel: &'static str,
    },
    #[error("unknown option `{key}`")]
    InvalidOption { key: String },
    #[error("script error: {0}")]
    Script(#[from] ScriptError),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Free-form message for errors that don't warrant their own variant.
    #[error("{0}")]
    Message(String),
}

impl ShowError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for ShowError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ShowError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Errors that abort startup before the loop runs.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("group `{group}`, index {index}: can't find fixture named `{fixture}`")]
    UnknownFixture {
        group: String,
        fixture: String,
        index: usize,
    },
    #[error("timed flash references unknown fixture `{0}`")]
    UnknownFlashTarget(String),
    #[error("no model selected before declaring fixture `{0}`")]
    NoModelSelected(String),
    #[error("model limit of {0} reached")]
    TooManyModels(usize),
    #[error("fixture limit of {0} reached")]
    TooManyFixtures(usize),
    #[error("duplicate model name `{0}`")]
    DuplicateModel(String),
    #[error("invalid model file `{path}`: {reason}")]
    InvalidModel { path: String, reason: String },
    #[error("no port configured")]
    NoPort,
}

/// Failures of the byte link to the hardware.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open port `{port}`: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport is not open")]
    NotOpen,
    #[error("timed out waiting for acknowledgment")]
    Timeout,
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("frame payload of {0} bytes exceeds the 254 byte limit")]
    FrameTooLarge(usize),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised at the scripting host boundary.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("no callback registered for `{name}`")]
    MissingCallback { name: String },
    #[error("callback `{callback}` failed: {message}")]
    Failed { callback: String, message: String },
}
