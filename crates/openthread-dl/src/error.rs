//! Error types shared by the binding table and the stack adapter.

use std::fmt;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the binding table or the adapter can report.
///
/// Native OpenThread failures arrive as [`Error::Stack`] carrying the
/// native [`OtError`] code; everything else describes a precondition or
/// capacity problem detected on the Rust side before the stack is touched.
#[derive(Debug, Error)]
pub enum Error {
    /// The shared library could not be opened.
    #[error("failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    /// The binding table has no library open.
    #[error("OpenThread library is not open")]
    NotOpen,

    /// The loaded library does not export the named entry point.
    #[error("{0} is not supported by the loaded OpenThread library")]
    Unsupported(&'static str),

    /// The native stack rejected the call.
    #[error("OpenThread error: {0}")]
    Stack(OtError),

    /// The adapter is not in a state that allows the operation.
    #[error("incorrect state")]
    IncorrectState,

    /// The stack instance or the SRP client has not been initialized yet.
    #[error("not initialized")]
    Uninitialized,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("string exceeds {max} bytes")]
    InvalidStringLength { max: usize },

    /// A fixed-capacity table or arena cannot hold the request.
    #[error("buffer too small")]
    BufferTooSmall,

    #[error("no matching configuration found")]
    ConfigNotFound,

    /// The build or the library lacks a capability (FTD-only, SSED-only).
    #[error("feature not supported by this device type")]
    UnsupportedFeature,

    /// The platform event loop refused an event, work item or timer.
    #[error("platform: {0}")]
    Platform(String),

    #[error("malformed operational dataset: {0}")]
    Dataset(&'static str),

    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    /// Native error code carried by this error, if any.
    pub fn ot_error(&self) -> Option<OtError> {
        match self {
            Error::Stack(e) => Some(*e),
            _ => None,
        }
    }
}

impl From<OtError> for Error {
    fn from(e: OtError) -> Self {
        Error::Stack(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Native OpenThread error codes (`otError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OtError {
    Failed = 1,
    Drop = 2,
    NoBufs = 3,
    NoRoute = 4,
    Busy = 5,
    Parse = 6,
    InvalidArgs = 7,
    Security = 8,
    AddressQuery = 9,
    NoAddress = 10,
    Abort = 11,
    NotImplemented = 12,
    InvalidState = 13,
    NoAck = 14,
    ChannelAccessFailure = 15,
    Detached = 16,
    FcsErr = 17,
    NoFrameReceived = 18,
    UnknownNeighbor = 19,
    InvalidSourceAddress = 20,
    AddressFiltered = 21,
    DestinationAddressFiltered = 22,
    NotFound = 23,
    Already = 24,
    Ip6AddressCreationFailure = 26,
    NotCapable = 27,
    ResponseTimeout = 28,
    Duplicated = 29,
    ReassemblyTimeout = 30,
    NotTmf = 31,
    NotLowpanDataFrame = 32,
    LinkMarginLow = 34,
    InvalidCommand = 35,
    Pending = 36,
    Rejected = 37,
    Generic = 255,
}

impl OtError {
    /// Decodes a raw `otError`. `OT_ERROR_NONE` decodes to `None`;
    /// unknown codes fold into [`OtError::Generic`].
    pub fn from_raw(code: i32) -> Option<OtError> {
        let e = match code {
            0 => return None,
            1 => OtError::Failed,
            2 => OtError::Drop,
            3 => OtError::NoBufs,
            4 => OtError::NoRoute,
            5 => OtError::Busy,
            6 => OtError::Parse,
            7 => OtError::InvalidArgs,
            8 => OtError::Security,
            9 => OtError::AddressQuery,
            10 => OtError::NoAddress,
            11 => OtError::Abort,
            12 => OtError::NotImplemented,
            13 => OtError::InvalidState,
            14 => OtError::NoAck,
            15 => OtError::ChannelAccessFailure,
            16 => OtError::Detached,
            17 => OtError::FcsErr,
            18 => OtError::NoFrameReceived,
            19 => OtError::UnknownNeighbor,
            20 => OtError::InvalidSourceAddress,
            21 => OtError::AddressFiltered,
            22 => OtError::DestinationAddressFiltered,
            23 => OtError::NotFound,
            24 => OtError::Already,
            26 => OtError::Ip6AddressCreationFailure,
            27 => OtError::NotCapable,
            28 => OtError::ResponseTimeout,
            29 => OtError::Duplicated,
            30 => OtError::ReassemblyTimeout,
            31 => OtError::NotTmf,
            32 => OtError::NotLowpanDataFrame,
            34 => OtError::LinkMarginLow,
            35 => OtError::InvalidCommand,
            36 => OtError::Pending,
            37 => OtError::Rejected,
            _ => OtError::Generic,
        };
        Some(e)
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    /// Short description used when the library's own `otThreadErrorToString`
    /// is unavailable.
    pub fn description(self) -> &'static str {
        match self {
            OtError::Failed => "Failed",
            OtError::Drop => "Drop",
            OtError::NoBufs => "NoBufs",
            OtError::NoRoute => "NoRoute",
            OtError::Busy => "Busy",
            OtError::Parse => "Parse",
            OtError::InvalidArgs => "InvalidArgs",
            OtError::Security => "Security",
            OtError::AddressQuery => "AddressQuery",
            OtError::NoAddress => "NoAddress",
            OtError::Abort => "Abort",
            OtError::NotImplemented => "NotImplemented",
            OtError::InvalidState => "InvalidState",
            OtError::NoAck => "NoAck",
            OtError::ChannelAccessFailure => "ChannelAccessFailure",
            OtError::Detached => "Detached",
            OtError::FcsErr => "FcsErr",
            OtError::NoFrameReceived => "NoFrameReceived",
            OtError::UnknownNeighbor => "UnknownNeighbor",
            OtError::InvalidSourceAddress => "InvalidSourceAddress",
            OtError::AddressFiltered => "AddressFiltered",
            OtError::DestinationAddressFiltered => "DestinationAddressFiltered",
            OtError::NotFound => "NotFound",
            OtError::Already => "Already",
            OtError::Ip6AddressCreationFailure => "Ipv6AddressCreationFailure",
            OtError::NotCapable => "NotCapable",
            OtError::ResponseTimeout => "ResponseTimeout",
            OtError::Duplicated => "Duplicated",
            OtError::ReassemblyTimeout => "ReassemblyTimeout",
            OtError::NotTmf => "NotTmf",
            OtError::NotLowpanDataFrame => "NonLowpanDataFrame",
            OtError::LinkMarginLow => "LinkMarginLow",
            OtError::InvalidCommand => "InvalidCommand",
            OtError::Pending => "Pending",
            OtError::Rejected => "Rejected",
            OtError::Generic => "GenericError",
        }
    }
}

impl fmt::Display for OtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_raw())
    }
}

/// Maps a raw native return code onto the crate result.
pub fn check(code: i32) -> Result<()> {
    match OtError::from_raw(code) {
        None => Ok(()),
        Some(e) => Err(Error::Stack(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_success() {
        assert!(check(0).is_ok());
        assert!(OtError::from_raw(0).is_none());
    }

    #[test]
    fn codes_map_one_to_one() {
        for code in [1, 5, 13, 16, 23, 28, 37, 255] {
            let e = OtError::from_raw(code).unwrap();
            assert_eq!(e.as_raw(), code);
        }
        assert_eq!(OtError::from_raw(25), Some(OtError::Generic));
        assert_eq!(OtError::from_raw(-4), Some(OtError::Generic));
    }

    #[test]
    fn check_wraps_stack_errors() {
        let err = check(13).unwrap_err();
        assert_eq!(err.ot_error(), Some(OtError::InvalidState));
        assert!(err.to_string().contains("InvalidState"));
    }
}
