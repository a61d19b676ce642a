//! Command descriptors: what to send, and where the answer goes.
//!
//! A [`Request`] is built once from a [`Command`], an optional [`Value`] and a
//! completion. The wire payload is always the command code followed by the value.

use std::marker::PhantomData;
use std::time::Duration;

use log::trace;

use crate::codec::{self, HexInt};
use crate::error::{CodecError, NativeError, ParseError, ReadError, WriteError};
use crate::OperationKind;

/// An enumerated device command with a fixed-width integer code.
pub trait Command {
    type Raw: HexInt;

    fn code(&self) -> Self::Raw;

    /// The code as `2 * Raw::WIDTH` upper-case hex digits.
    fn hex(&self) -> String {
        codec::encode(self.code())
    }
}

macro_rules! impl_int_command {
    ($($t:ty),*) => {
        $(
            impl Command for $t {
                type Raw = $t;

                fn code(&self) -> $t {
                    *self
                }
            }
        )*
    };
}

impl_int_command!(u8, u16, u32, u64);

/// A command addressing one member of a family: `code = command + index * stride`.
///
/// This lets one declared command stand for "register N" style sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shifted<C: Command> {
    command: C,
    index: C::Raw,
    code: C::Raw,
}

impl<C: Command> Shifted<C> {
    pub fn new(command: C, index: C::Raw, stride: C::Raw) -> Result<Self, CodecError> {
        // each factor is at most 64 bits wide, so this cannot overflow `u128`
        let value = command.code().to_u128() + index.to_u128() * stride.to_u128();
        let code = C::Raw::from_u128(value).ok_or(CodecError::Overflow {
            value,
            width: C::Raw::WIDTH,
        })?;
        Ok(Self {
            command,
            index,
            code,
        })
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    pub fn index(&self) -> C::Raw {
        self.index
    }
}

impl<C: Command + Clone> Shifted<C> {
    /// The shifted commands for indices `0..=last_index`.
    pub fn family(command: C, stride: C::Raw, last_index: C::Raw) -> Result<Vec<Self>, CodecError> {
        (0..=last_index.to_u128())
            .filter_map(C::Raw::from_u128)
            .map(|index| Self::new(command.clone(), index, stride))
            .collect()
    }

    /// One row per index in `0..=last_index`, each holding every command of `commands`.
    pub fn grid(
        commands: &[C],
        stride: C::Raw,
        last_index: C::Raw,
    ) -> Result<Vec<Vec<Self>>, CodecError> {
        (0..=last_index.to_u128())
            .filter_map(C::Raw::from_u128)
            .map(|index| {
                commands
                    .iter()
                    .map(|cmd| Self::new(cmd.clone(), index, stride))
                    .collect()
            })
            .collect()
    }
}

impl<C: Command> Command for Shifted<C> {
    type Raw = C::Raw;

    fn code(&self) -> C::Raw {
        self.code
    }
}

/// A resolved command code in its hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandCode(String);

impl CommandCode {
    pub fn of<C: Command + ?Sized>(command: &C) -> Self {
        Self(command.hex())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommandCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value part of a payload, kept in hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value(String);

impl Value {
    /// `2 * T::WIDTH` upper-case hex digits.
    pub fn int<T: HexInt>(value: T) -> Self {
        Self(codec::encode(value))
    }

    pub fn bytes(bytes: &[u8]) -> Self {
        Self(codec::bytes_to_hex(bytes))
    }

    /// A caller-formatted hex string; it is validated when the payload is encoded.
    pub fn hex<S: Into<String>>(hex: S) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

/// A wire payload: command code first, then the optional value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Payload(String);

impl Payload {
    pub fn compose(command: &CommandCode, value: Option<&Value>) -> Self {
        let value = value.map(Value::as_hex).unwrap_or_default();
        Self(codec::concat([command.as_hex(), value]))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::hex_to_bytes(&self.0)
    }

    /// Splits wire bytes into the command code (`code_width` bytes, big-endian) and the value bytes.
    pub fn decode(bytes: &[u8], code_width: usize) -> Option<(u128, &[u8])> {
        if code_width > 16 || bytes.len() < code_width {
            return None;
        }
        let (code, value) = bytes.split_at(code_width);
        let code = code.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b));
        Some((code, value))
    }
}

/// A type that can be built from the bytes answering a command.
pub trait Parse: Sized {
    fn parse(bytes: &[u8], command: &CommandCode) -> Result<Self, ParseError>;
}

impl Parse for Vec<u8> {
    fn parse(bytes: &[u8], _: &CommandCode) -> Result<Self, ParseError> {
        Ok(bytes.to_vec())
    }
}

/// Lower-case hex of the response.
impl Parse for String {
    fn parse(bytes: &[u8], _: &CommandCode) -> Result<Self, ParseError> {
        Ok(codec::bytes_to_hex(bytes))
    }
}

impl Parse for u8 {
    fn parse(bytes: &[u8], _: &CommandCode) -> Result<Self, ParseError> {
        bytes
            .first()
            .copied()
            .ok_or_else(|| ParseError::new("expected 1 byte"))
    }
}

impl Parse for u16 {
    fn parse(bytes: &[u8], _: &CommandCode) -> Result<Self, ParseError> {
        codec::be_u16(bytes).ok_or_else(|| ParseError::new("expected 2 bytes"))
    }
}

/// Turns response bytes into a `T`; chosen per request.
///
/// Closures `Fn(&[u8]) -> Result<T, ParseError>` are parsers; [`Typed`] uses [`Parse`].
pub trait Parser<T>: Send + 'static {
    fn parse(&self, bytes: &[u8], command: &CommandCode) -> Result<T, ParseError>;
}

impl<T, F> Parser<T> for F
where
    F: Fn(&[u8]) -> Result<T, ParseError> + Send + 'static,
{
    fn parse(&self, bytes: &[u8], _: &CommandCode) -> Result<T, ParseError> {
        self(bytes)
    }
}

/// Parser delegating to `T`'s [`Parse`] implementation.
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Parse + 'static> Parser<T> for Typed<T> {
    fn parse(&self, bytes: &[u8], command: &CommandCode) -> Result<T, ParseError> {
        T::parse(bytes, command)
    }
}

pub type WriteCompletion = Box<dyn FnOnce(Result<(), WriteError>) + Send + 'static>;
type ErasedReadCompletion = Box<dyn FnOnce(Result<Vec<u8>, ReadError>) + Send + 'static>;

enum Completion {
    Write(WriteCompletion),
    Read(ErasedReadCompletion),
}

/// How the native stack is driven for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exchange {
    /// Write the payload and wait for the write acknowledgement.
    Write,
    /// Read the characteristic value.
    Read,
    /// Write the payload, then take the answer from the next value update.
    Query,
}

/// Terminal outcomes that do not depend on the request kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Failure {
    Timeout,
    Cancelled,
    NotConnected,
    Native(Option<NativeError>),
    Encode(CodecError),
}

/// A command bound to its completion. One request maps to exactly one queued operation.
pub struct Request {
    exchange: Exchange,
    command: CommandCode,
    value: Option<Value>,
    timeout: Option<Duration>,
    completion: Completion,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("kind", &self.kind())
            .field("exchange", &self.exchange)
            .field("command", &self.command)
            .field("value", &self.value)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Request {
    /// Writes `command` (+ `value`) and reports the acknowledgement to `on_write`.
    pub fn write<C: Command + ?Sized>(
        command: &C,
        value: Option<Value>,
        on_write: impl FnOnce(Result<(), WriteError>) + Send + 'static,
    ) -> Self {
        Self {
            exchange: Exchange::Write,
            command: CommandCode::of(command),
            value,
            timeout: None,
            completion: Completion::Write(Box::new(on_write)),
        }
    }

    /// Reads the characteristic value and parses it as the answer to `command`.
    pub fn read<T, C, P>(
        command: &C,
        parser: P,
        on_read: impl FnOnce(Result<T, ReadError>) + Send + 'static,
    ) -> Self
    where
        T: 'static,
        C: Command + ?Sized,
        P: Parser<T>,
    {
        Self::new_read(Exchange::Read, CommandCode::of(command), None, parser, on_read)
    }

    /// Writes `command` (+ `value`), then parses the next value update as its answer.
    pub fn query<T, C, P>(
        command: &C,
        value: Option<Value>,
        parser: P,
        on_read: impl FnOnce(Result<T, ReadError>) + Send + 'static,
    ) -> Self
    where
        T: 'static,
        C: Command + ?Sized,
        P: Parser<T>,
    {
        Self::new_read(Exchange::Query, CommandCode::of(command), value, parser, on_read)
    }

    fn new_read<T: 'static, P: Parser<T>>(
        exchange: Exchange,
        command: CommandCode,
        value: Option<Value>,
        parser: P,
        on_read: impl FnOnce(Result<T, ReadError>) + Send + 'static,
    ) -> Self {
        let context = command.clone();
        let completion: ErasedReadCompletion = Box::new(move |result| {
            on_read(result.and_then(|bytes| {
                parser.parse(&bytes, &context).map_err(ReadError::Parse)
            }))
        });
        Self {
            exchange,
            command,
            value,
            timeout: None,
            completion: Completion::Read(completion),
        }
    }

    /// Overrides the scheduler's default deadline for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn kind(&self) -> OperationKind {
        match self.completion {
            Completion::Write(_) => OperationKind::Write,
            Completion::Read(_) => OperationKind::Read,
        }
    }

    pub fn command(&self) -> &CommandCode {
        &self.command
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn payload(&self) -> Payload {
        Payload::compose(&self.command, self.value.as_ref())
    }

    pub(crate) fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub(crate) fn fail(self, failure: Failure) {
        match self.completion {
            Completion::Write(on_write) => on_write(Err(match failure {
                Failure::Timeout => WriteError::Timeout,
                Failure::Cancelled => WriteError::Cancelled,
                Failure::NotConnected => WriteError::NotConnected,
                Failure::Native(cause) => WriteError::Write(cause),
                Failure::Encode(err) => WriteError::Parse(err),
            })),
            Completion::Read(on_read) => on_read(Err(match failure {
                Failure::Timeout => ReadError::Timeout,
                Failure::Cancelled => ReadError::Cancelled,
                Failure::NotConnected => ReadError::NotConnected,
                Failure::Native(Some(cause)) => ReadError::from_native(cause),
                Failure::Native(None) => ReadError::Read(None),
                Failure::Encode(err) => ReadError::Parse(err.into()),
            })),
        }
    }

    /// Resolves a write-kind request with a successful acknowledgement.
    pub(crate) fn complete_write(self) {
        match self.completion {
            Completion::Write(on_write) => on_write(Ok(())),
            Completion::Read(on_read) => on_read(Err(ReadError::NoData)),
        }
    }

    /// Resolves a read-kind request with a native value update.
    pub(crate) fn complete_read(self, value: Option<Vec<u8>>, error: Option<NativeError>) {
        let result = match (value, error) {
            (_, Some(cause)) => Err(ReadError::from_native(cause)),
            (Some(bytes), None) if !bytes.is_empty() => {
                trace!("response to {}: {}", self.command, codec::bytes_to_hex(&bytes));
                Ok(bytes)
            }
            _ => Err(ReadError::NoData),
        };
        match self.completion {
            Completion::Read(on_read) => on_read(result),
            Completion::Write(on_write) => on_write(result.map(|_| ()).map_err(|_| {
                WriteError::Write(None)
            })),
        }
    }
}
