//! Defines error types.
//!
//! Every operation of this crate reports failures through a typed completion:
//! [`ConnectionError`] for the connection cycle, [`ReadError`] and [`WriteError`]
//! for queued operations. [`Error`] unifies them for the `async` helpers.

use std::fmt::Debug;

/// Cause reported by the native Bluetooth stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeError {
    GattError(AttError),
    StatusCode(i32),
    Unauthorized,
    Platform(String),
}

impl NativeError {
    /// Checks if the cause means the link lacks authentication, authorization or encryption.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Unauthorized => true,
            Self::GattError(att) => matches!(
                *att,
                AttError::INSUFFICIENT_AUTHENTICATION
                    | AttError::INSUFFICIENT_AUTHORIZATION
                    | AttError::INSUFFICIENT_ENCRYPTION
                    | AttError::INSUFFICIENT_ENCRYPTION_KEY_SIZE
            ),
            _ => false,
        }
    }
}

impl std::error::Error for NativeError {}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GattError(att_error) => write!(f, "GATT error: {att_error}"),
            Self::StatusCode(code) => write!(f, "native stack returned status {code}"),
            Self::Unauthorized => f.write_str("the native stack is not authorized to use Bluetooth"),
            Self::Platform(msg) => write!(f, "platform error: {msg}"),
        }
    }
}

impl From<AttError> for NativeError {
    fn from(att_error: AttError) -> Self {
        Self::GattError(att_error)
    }
}

/// Failure of a connection cycle, reported to the connection completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionError {
    ConnectionFailed(Option<NativeError>),
    ServiceDiscoveryFailed(Option<NativeError>),
    CharacteristicDiscoveryFailed(Option<NativeError>),
}

impl ConnectionError {
    /// The wrapped native cause, if the stack reported one.
    pub fn cause(&self) -> Option<&NativeError> {
        match self {
            Self::ConnectionFailed(cause)
            | Self::ServiceDiscoveryFailed(cause)
            | Self::CharacteristicDiscoveryFailed(cause) => cause.as_ref(),
        }
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self {
            Self::ConnectionFailed(_) => "connection failed",
            Self::ServiceDiscoveryFailed(_) => "service discovery failed",
            Self::CharacteristicDiscoveryFailed(_) => "characteristic discovery failed",
        };
        match self.cause() {
            Some(cause) => write!(f, "{what}: {cause}"),
            None => f.write_str(what),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause().map(|x| {
            let x: &(dyn std::error::Error + 'static) = x;
            x
        })
    }
}

/// Failure of a read-kind operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadError {
    Read(Option<NativeError>),
    Timeout,
    Parse(ParseError),
    NoData,
    /// The link lacks authentication, authorization or encryption.
    Unauthorized(Option<NativeError>),
    Cancelled,
    /// The operation was rejected before entering the queue.
    NotConnected,
}

impl ReadError {
    pub(crate) fn from_native(cause: NativeError) -> Self {
        if cause.is_auth_failure() {
            Self::Unauthorized(Some(cause))
        } else {
            Self::Read(Some(cause))
        }
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read(Some(cause)) => write!(f, "read failed: {cause}"),
            Self::Read(None) => f.write_str("read failed"),
            Self::Timeout => f.write_str("read timed out"),
            Self::Parse(err) => write!(f, "cannot parse the response: {err}"),
            Self::NoData => f.write_str("the device returned no data"),
            Self::Unauthorized(Some(cause)) => write!(f, "read not authorized: {cause}"),
            Self::Unauthorized(None) => f.write_str("read not authorized"),
            Self::Cancelled => f.write_str("read cancelled"),
            Self::NotConnected => f.write_str("the device isn't connected"),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(Some(cause)) | Self::Unauthorized(Some(cause)) => Some(cause),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure of a write-kind operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteError {
    Write(Option<NativeError>),
    Timeout,
    /// The payload could not be encoded into bytes.
    Parse(CodecError),
    Cancelled,
    /// The operation was rejected before entering the queue.
    NotConnected,
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Write(Some(cause)) => write!(f, "write failed: {cause}"),
            Self::Write(None) => f.write_str("write failed"),
            Self::Timeout => f.write_str("write timed out"),
            Self::Parse(err) => write!(f, "cannot encode the payload: {err}"),
            Self::Cancelled => f.write_str("write cancelled"),
            Self::NotConnected => f.write_str("the device isn't connected"),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Write(Some(cause)) => Some(cause),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// A response could not be turned into the requested type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new<S: ToString>(message: S) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<CodecError> for ParseError {
    fn from(err: CodecError) -> Self {
        ParseError::new(err)
    }
}

/// Hex encoding or decoding failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The value does not fit in `width` bytes.
    Overflow { value: u128, width: usize },
    /// The string holds no complete byte, or an odd number of hex digits.
    InvalidHex(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overflow { value, width } => {
                write!(f, "value {value:#x} does not fit in {width} byte(s)")
            }
            Self::InvalidHex(s) => write!(f, "invalid hex string {s:?}"),
        }
    }
}

impl std::error::Error for CodecError {}

// NOTE: Code below is migrated from <https://docs.rs/bluest/0.6.9/src/bluest/error.rs.html>.

/// The error type returned by the `async` helpers of [crate::Central].
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<NativeError>,
    message: String,
}

impl Error {
    pub(crate) fn new<S: ToString>(
        kind: ErrorKind,
        source: Option<NativeError>,
        message: S,
    ) -> Self {
        Error {
            kind,
            source,
            message: message.to_string(),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message for this error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.message.is_empty(), &self.source) {
            (true, None) => write!(f, "{}", &self.kind),
            (false, None) => write!(f, "{}: {}", &self.kind, &self.message),
            (true, Some(err)) => write!(f, "{}: {}", &self.kind, err),
            (false, Some(err)) => write!(f, "{}: {} ({})", &self.kind, &self.message, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|x| {
            let x: &(dyn std::error::Error + 'static) = x;
            x
        })
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            source: None,
            message: String::new(),
        }
    }
}

impl From<NativeError> for Error {
    fn from(err: NativeError) -> Self {
        let kind = match &err {
            NativeError::GattError(att_error) => ErrorKind::Protocol(*att_error),
            NativeError::Unauthorized => ErrorKind::NotAuthorized,
            NativeError::StatusCode(_) | NativeError::Platform(_) => ErrorKind::Other,
        };
        Error::new(kind, Some(err), "")
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        let message = match &err {
            ConnectionError::ConnectionFailed(_) => "",
            ConnectionError::ServiceDiscoveryFailed(_) => "service discovery failed",
            ConnectionError::CharacteristicDiscoveryFailed(_) => "characteristic discovery failed",
        };
        let kind = match &err {
            ConnectionError::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            ConnectionError::ServiceDiscoveryFailed(None)
            | ConnectionError::CharacteristicDiscoveryFailed(None) => ErrorKind::NotFound,
            _ => ErrorKind::ConnectionFailed,
        };
        let source = match err {
            ConnectionError::ConnectionFailed(cause)
            | ConnectionError::ServiceDiscoveryFailed(cause)
            | ConnectionError::CharacteristicDiscoveryFailed(cause) => cause,
        };
        Error::new(kind, source, message)
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::Read(Some(cause)) => cause.into(),
            ReadError::Read(None) => Error::new(ErrorKind::Other, None, "read failed"),
            ReadError::Timeout => ErrorKind::Timeout.into(),
            ReadError::Parse(err) => Error::new(ErrorKind::InvalidData, None, err),
            ReadError::NoData => Error::new(ErrorKind::InvalidData, None, "no data"),
            ReadError::Unauthorized(cause) => Error::new(ErrorKind::NotAuthorized, cause, ""),
            ReadError::Cancelled => ErrorKind::Cancelled.into(),
            ReadError::NotConnected => ErrorKind::NotConnected.into(),
        }
    }
}

impl From<WriteError> for Error {
    fn from(err: WriteError) -> Self {
        match err {
            WriteError::Write(Some(cause)) => cause.into(),
            WriteError::Write(None) => Error::new(ErrorKind::Other, None, "write failed"),
            WriteError::Timeout => ErrorKind::Timeout.into(),
            WriteError::Parse(err) => Error::new(ErrorKind::InvalidParameter, None, err),
            WriteError::Cancelled => ErrorKind::Cancelled.into(),
            WriteError::NotConnected => ErrorKind::NotConnected.into(),
        }
    }
}

/// A list of general categories of Bluetooth error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// connection failed
    ConnectionFailed,
    /// the Bluetooth device isn't connected
    NotConnected,
    /// permission denied
    NotAuthorized,
    /// not found
    NotFound,
    /// invalid parameter
    InvalidParameter,
    /// invalid data received
    InvalidData,
    /// timed out
    Timeout,
    /// cancelled
    Cancelled,
    /// protocol error: {0}
    Protocol(AttError),
    /// error
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::ConnectionFailed => f.write_str("connection failed"),
            ErrorKind::NotConnected => f.write_str("the Bluetooth device isn't connected"),
            ErrorKind::NotAuthorized => f.write_str("permission denied"),
            ErrorKind::NotFound => f.write_str("not found"),
            ErrorKind::InvalidParameter => f.write_str("invalid parameter"),
            ErrorKind::InvalidData => f.write_str("invalid data received"),
            ErrorKind::Timeout => f.write_str("timed out"),
            ErrorKind::Cancelled => f.write_str("cancelled"),
            ErrorKind::Protocol(err) => write!(f, "protocol error: {err}"),
            ErrorKind::Other => f.write_str("error"),
        }
    }
}

/// Bluetooth Attribute Protocol error. See the Bluetooth Core Specification, Vol 3, Part F, §3.4.1.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttError(u8);

impl AttError {
    /// The operation completed successfully.
    pub const SUCCESS: AttError = AttError(0x00);
    /// The attribute handle given was not valid on this server.
    pub const INVALID_HANDLE: AttError = AttError(0x01);
    /// The attribute cannot be read.
    pub const READ_NOT_PERMITTED: AttError = AttError(0x02);
    /// The attribute cannot be written.
    pub const WRITE_NOT_PERMITTED: AttError = AttError(0x03);
    /// The attribute PDU was invalid.
    pub const INVALID_PDU: AttError = AttError(0x04);
    /// The attribute requires authentication before it can be read or written.
    pub const INSUFFICIENT_AUTHENTICATION: AttError = AttError(0x05);
    /// Attribute server does not support the request received from the client.
    pub const REQUEST_NOT_SUPPORTED: AttError = AttError(0x06);
    /// Offset specified was past the end of the attribute.
    pub const INVALID_OFFSET: AttError = AttError(0x07);
    /// The attribute requires authorization before it can be read or written.
    pub const INSUFFICIENT_AUTHORIZATION: AttError = AttError(0x08);
    /// Too many prepare writes have been queued.
    pub const PREPARE_QUEUE_FULL: AttError = AttError(0x09);
    /// No attribute found within the given attribute handle range.
    pub const ATTRIBUTE_NOT_FOUND: AttError = AttError(0x0a);
    /// The attribute cannot be read or written using the Read Blob Request.
    pub const ATTRIBUTE_NOT_LONG: AttError = AttError(0x0b);
    /// The Encryption Key Size used for encrypting this link is insufficient.
    pub const INSUFFICIENT_ENCRYPTION_KEY_SIZE: AttError = AttError(0x0c);
    /// The attribute value length is invalid for the operation.
    pub const INVALID_ATTRIBUTE_VALUE_LENGTH: AttError = AttError(0x0d);
    /// The attribute request that was requested has encountered an error that was unlikely, and therefore could not be completed as requested.
    pub const UNLIKELY_ERROR: AttError = AttError(0x0e);
    /// The attribute requires encryption before it can be read or written.
    pub const INSUFFICIENT_ENCRYPTION: AttError = AttError(0x0f);
    /// The attribute type is not a supported grouping attribute as defined by a higher layer specification.
    pub const UNSUPPORTED_GROUP_TYPE: AttError = AttError(0x10);
    /// Insufficient Resources to complete the request.
    pub const INSUFFICIENT_RESOURCES: AttError = AttError(0x11);
    /// The server requests the client to rediscover the database.
    pub const DATABASE_OUT_OF_SYNC: AttError = AttError(0x12);
    /// The attribute parameter value was not allowed.
    pub const VALUE_NOT_ALLOWED: AttError = AttError(0x13);
    /// Write Request Rejected
    pub const WRITE_REQUEST_REJECTED: AttError = AttError(0xfc);
    /// Client Characteristic Configuration Descriptor Improperly Configured
    pub const CCCD_IMPROPERLY_CONFIGURED: AttError = AttError(0xfd);
    /// Procedure Already in Progress
    pub const PROCEDURE_ALREADY_IN_PROGRESS: AttError = AttError(0xfe);
    /// Out of Range
    pub const OUT_OF_RANGE: AttError = AttError(0xff);

    /// Converts a [`u8`] value to an [`AttError`].
    pub const fn from_u8(val: u8) -> Self {
        AttError(val)
    }

    /// Converts an [`AttError`] to a [`u8`] value.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Checks if the error code is in the application error range.
    pub fn is_application(&self) -> bool {
        (0x80..0xa0).contains(&self.0)
    }
}

impl std::fmt::Display for AttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            AttError::SUCCESS => f.write_str("The operation completed successfully."),
            AttError::INVALID_HANDLE => f.write_str("The attribute handle given was not valid on this server."),
            AttError::READ_NOT_PERMITTED => f.write_str("The attribute cannot be read."),
            AttError::WRITE_NOT_PERMITTED => f.write_str("The attribute cannot be written."),
            AttError::INVALID_PDU => f.write_str("The attribute PDU was invalid."),
            AttError::INSUFFICIENT_AUTHENTICATION => f.write_str("The attribute requires authentication before it can be read or written."),
            AttError::REQUEST_NOT_SUPPORTED => f.write_str("Attribute server does not support the request received from the client."),
            AttError::INVALID_OFFSET => f.write_str("Offset specified was past the end of the attribute."),
            AttError::INSUFFICIENT_AUTHORIZATION => f.write_str("The attribute requires authorization before it can be read or written."),
            AttError::PREPARE_QUEUE_FULL => f.write_str("Too many prepare writes have been queued."),
            AttError::ATTRIBUTE_NOT_FOUND => f.write_str("No attribute found within the given attribute handle range."),
            AttError::ATTRIBUTE_NOT_LONG => f.write_str("The attribute cannot be read or written using the Read Blob Request."),
            AttError::INSUFFICIENT_ENCRYPTION_KEY_SIZE => f.write_str("The Encryption Key Size used for encrypting this link is insufficient."),
            AttError::INVALID_ATTRIBUTE_VALUE_LENGTH => f.write_str("The attribute value length is invalid for the operation."),
            AttError::UNLIKELY_ERROR => f.write_str("The attribute request that was requested has encountered an error that was unlikely, and therefore could not be completed as requested."),
            AttError::INSUFFICIENT_ENCRYPTION => f.write_str("The attribute requires encryption before it can be read or written."),
            AttError::UNSUPPORTED_GROUP_TYPE => f.write_str("The attribute type is not a supported grouping attribute as defined by a higher layer specification."),
            AttError::INSUFFICIENT_RESOURCES => f.write_str("Insufficient Resources to complete the request."),
            AttError::DATABASE_OUT_OF_SYNC => f.write_str("The server requests the client to rediscover the database."),
            AttError::VALUE_NOT_ALLOWED => f.write_str("The attribute parameter value was not allowed."),
            AttError::WRITE_REQUEST_REJECTED => f.write_str("Write Request Rejected"),
            AttError::CCCD_IMPROPERLY_CONFIGURED => f.write_str("Client Characteristic Configuration Descriptor Improperly Configured"),
            AttError::PROCEDURE_ALREADY_IN_PROGRESS => f.write_str("Procedure Already in Progress"),
            AttError::OUT_OF_RANGE => f.write_str("Out of Range"),
            _ => f.write_str(&format!("Unknown error 0x{:02x}", self.0)),
        }
    }
}

impl From<u8> for AttError {
    fn from(number: u8) -> Self {
        AttError(number)
    }
}

impl From<AttError> for u8 {
    fn from(val: AttError) -> Self {
        val.0
    }
}
