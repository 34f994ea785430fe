// One error type for the whole stack, from XDR decoding up to the CSV writer

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("XDR decode error: {0}")]
    Xdr(&'static str),

    #[error("RPC error: {0}")]
    Rpc(&'static str),

    #[error("VXI-11 device error: {0}")]
    Device(#[from] DeviceError),

    #[error("VXI-11 link error: {0}")]
    Link(&'static str),

    #[error("Invalid VISA resource '{resource}': {reason}")]
    Resource { resource: String, reason: &'static str },

    #[error("Unsupported VISA resource: {0}")]
    Unsupported(String),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Unable to parse response '{response}': {reason}")]
    Parse { response: String, reason: &'static str },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to render plot: {0}")]
    Plot(String),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn parse(response: &str, reason: &'static str) -> Self {
        Error::Parse { response: response.trim().to_owned(), reason }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>> for Error {
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        Error::Plot(format!("{value:?}"))
    }
}

/// Error codes returned in the `error` field of VXI-11 device core replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Syntax error")]
    Syntax,
    #[error("Device not accessible")]
    NotAccessible,
    #[error("Invalid link identifier")]
    InvalidLink,
    #[error("Parameter error")]
    Parameter,
    #[error("Channel not established")]
    ChannelNotEstablished,
    #[error("Operation not supported")]
    NotSupported,
    #[error("Out of resources")]
    OutOfResources,
    #[error("Device locked by another link")]
    Locked,
    #[error("No lock held by this link")]
    NoLockHeld,
    #[error("I/O timeout")]
    IoTimeout,
    #[error("I/O error")]
    Io,
    #[error("Invalid address")]
    InvalidAddress,
    #[error("Abort")]
    Abort,
    #[error("Channel already established")]
    ChannelAlreadyEstablished,
    #[error("Unknown error code {0}")]
    Unknown(i32),
}

impl DeviceError {
    /// Maps a reply's error field, `None` meaning success
    pub fn from_code(code: i32) -> Option<Self> {
        let e = match code {
            0  => return None,
            1  => DeviceError::Syntax,
            3  => DeviceError::NotAccessible,
            4  => DeviceError::InvalidLink,
            5  => DeviceError::Parameter,
            6  => DeviceError::ChannelNotEstablished,
            8  => DeviceError::NotSupported,
            9  => DeviceError::OutOfResources,
            11 => DeviceError::Locked,
            12 => DeviceError::NoLockHeld,
            15 => DeviceError::IoTimeout,
            17 => DeviceError::Io,
            21 => DeviceError::InvalidAddress,
            23 => DeviceError::Abort,
            29 => DeviceError::ChannelAlreadyEstablished,
            x  => DeviceError::Unknown(x),
        };
        Some(e)
    }

    pub fn code(&self) -> i32 {
        match self {
            DeviceError::Syntax                    => 1,
            DeviceError::NotAccessible             => 3,
            DeviceError::InvalidLink               => 4,
            DeviceError::Parameter                 => 5,
            DeviceError::ChannelNotEstablished     => 6,
            DeviceError::NotSupported              => 8,
            DeviceError::OutOfResources            => 9,
            DeviceError::Locked                    => 11,
            DeviceError::NoLockHeld                => 12,
            DeviceError::IoTimeout                 => 15,
            DeviceError::Io                        => 17,
            DeviceError::InvalidAddress            => 21,
            DeviceError::Abort                     => 23,
            DeviceError::ChannelAlreadyEstablished => 29,
            DeviceError::Unknown(x)                => *x,
        }
    }
}

/// `Ok(())` for a zero error field, the typed error otherwise
pub fn check_device_error(code: i32) -> Result<()> {
    match DeviceError::from_code(code) {
        None    => Ok(()),
        Some(e) => Err(Error::Device(e)),
    }
}
