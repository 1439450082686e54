use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// TCP port the communication module serves the register protocol on.
pub const DEVICE_PORT: u16 = 30046;
/// UDP port the communication module answers discovery probes on.
pub const DISCOVERY_PORT: u16 = 30045;

/// Probe broadcast over UDP to locate communication modules on the local
/// network.
pub const DISCOVER_SEND: [u8; 9] = [0x0c, 0x00, 0x30, 0x00, 0x11, 0x00, 0x12, 0x00, 0x13];
/// Prefix a communication module's discovery reply starts with.
pub const DISCOVER_RECEIVE: [u8; 7] = [0x0d, 0x00, 0x07, 0x00, 0x02, 0x02, 0x00];

/// Operation selecting a block of historical readings.
///
/// Part of the wire vocabulary, but nothing in this tool reads history.
pub const GET_HISTORY: [u8; 2] = [0x00, 0x30];

/// Every reply from the unit is this long. Only a register-specific prefix
/// of it is meaningful; the rest is unspecified padding.
pub const RESPONSE_LENGTH: usize = 63;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("the string length byte claims {0} bytes, more than a reply can carry")]
    StringLength(u8),
    #[error("the string contains bytes outside 7-bit ASCII")]
    StringNotAscii,
    #[error("{0} is not an operating mode ordinal")]
    UnknownMode(u8),
    #[error("the reply does not contain a possible calendar time")]
    Timestamp(#[source] jiff::Error),
}

/// A single request frame: `operation ++ register ++ value`.
///
/// There is no length prefix, checksum or trailer; the unit knows the frame
/// length from the operation and register identifiers alone.
#[derive(Debug, Clone, Copy)]
pub struct Request {
    pub operation: [u8; 2],
    pub register: [u8; 2],
    pub value: WriteValue,
}

impl Request {
    pub fn read(operation: [u8; 2], register: [u8; 2]) -> Self {
        Self { operation, register, value: WriteValue::Empty }
    }

    pub fn write(operation: [u8; 2], register: [u8; 2], value: WriteValue) -> Self {
        Self { operation, register, value }
    }
}

/// Value trailer of a request. Reads carry none, writes carry one or two
/// big-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteValue {
    Empty,
    Byte(u8),
    Short(i16),
}

/// The fixed-size reply buffer with the decoding rules for every register
/// value representation the unit uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    data: [u8; RESPONSE_LENGTH],
}

impl Response {
    pub fn new(data: [u8; RESPONSE_LENGTH]) -> Self {
        Self { data }
    }

    pub fn boolean(&self) -> bool {
        self.data[0] != 0
    }

    pub fn byte(&self) -> u8 {
        self.data[0]
    }

    /// The unit reports some percentages on a 0-255 scale.
    pub fn percent_from_byte(&self) -> f32 {
        f32::from(self.data[0]) * 100.0 / 255.0
    }

    pub fn short(&self) -> i16 {
        i16::from_be_bytes([self.data[0], self.data[1]])
    }

    /// Temperatures are a signed short carrying hundredths of a degree.
    pub fn temperature(&self) -> f32 {
        f32::from(self.short()) / 100.0
    }

    /// The first byte holds the string length, the string itself follows.
    pub fn string(&self) -> Result<String, DecodeError> {
        let length = usize::from(self.data[0]);
        let Some(bytes) = self.data[1..].get(..length) else {
            return Err(DecodeError::StringLength(self.data[0]));
        };
        match std::str::from_utf8(bytes) {
            Ok(value) if value.is_ascii() => Ok(value.to_string()),
            _ => Err(DecodeError::StringNotAscii),
        }
    }

    /// Six raw bytes: second, minute, hour, day, month, year-since-2000.
    ///
    /// The hour and day bytes carry flags in their high bits. No time zone
    /// is transmitted; the unit reports wall clock time in the zone it was
    /// installed in.
    pub fn timestamp_in(&self, tz: jiff::tz::TimeZone) -> Result<jiff::Zoned, DecodeError> {
        let [second, minute, hour, day, month, year, ..] = self.data;
        let datetime = jiff::civil::DateTime::new(
            2000 + i16::from(year),
            month as i8,
            (day & 0x1f) as i8,
            (hour & 0x1f) as i8,
            minute as i8,
            second as i8,
            0,
        )
        .map_err(DecodeError::Timestamp)?;
        datetime.to_zoned(tz).map_err(DecodeError::Timestamp)
    }

    pub fn timestamp(&self) -> Result<jiff::Zoned, DecodeError> {
        self.timestamp_in(jiff::tz::TimeZone::system())
    }
}

pub struct AirCodec {}

impl Encoder<&Request> for AirCodec {
    type Error = std::io::Error;
    fn encode(&mut self, request: &Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend(request.operation);
        dst.extend(request.register);
        match request.value {
            WriteValue::Empty => {}
            WriteValue::Byte(value) => dst.extend([value]),
            WriteValue::Short(value) => dst.extend(value.to_be_bytes()),
        }
        trace!(message = "sending encoded", buffer = ?dst);
        Ok(())
    }
}

impl Decoder for AirCodec {
    type Item = Response;
    type Error = std::io::Error;
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A stream transport may deliver the reply in pieces. Accumulate
        // until the full fixed-size frame is buffered.
        trace!(message = "attempt at decoding", available = src.len());
        if src.len() < RESPONSE_LENGTH {
            return Ok(None);
        }
        let frame = src.split_to(RESPONSE_LENGTH);
        let mut data = [0; RESPONSE_LENGTH];
        data.copy_from_slice(&frame);
        Ok(Some(Response { data }))
    }
}
