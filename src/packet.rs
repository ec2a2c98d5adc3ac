//! Codec for the Socket.IO v0.9 packet grammar: `TYPE ":" [ID] ":" [ENDPOINT] [":" DATA]`.
//!
//! Packets are value objects; `data` stays opaque bytes end to end (UTF-8 for
//! the text types). Parsing JSON payloads is the listener's business.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::Error;

/// The wire tag of a [`Packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Close a session or leave a namespace
    Disconnect = 0,
    /// Acknowledge a transport bind or a namespace join
    Connect = 1,
    /// Keep-alive, sent both ways
    Heartbeat = 2,
    /// Plain text message
    Message = 3,
    /// Message carrying a JSON document
    Json = 4,
    /// Named event with arguments
    Event = 5,
    /// Acknowledgement of a previously id-tagged packet
    Ack = 6,
    /// Protocol-level error (`reason[+advice]` in data)
    Error = 7,
    /// No-op, used to complete parked polls
    Noop = 8,
}

impl PacketType {
    fn from_digit(digit: u8) -> Option<Self> {
        use PacketType::*;
        match digit {
            b'0' => Some(Disconnect),
            b'1' => Some(Connect),
            b'2' => Some(Heartbeat),
            b'3' => Some(Message),
            b'4' => Some(Json),
            b'5' => Some(Event),
            b'6' => Some(Ack),
            b'7' => Some(Error),
            b'8' => Some(Noop),
            _ => None,
        }
    }

    fn digit(self) -> u8 {
        b'0' + self as u8
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", (self.digit() - b'0'))
    }
}

/// A single Socket.IO v0.9 packet. Immutable once constructed.
///
/// `id` may carry a trailing `+` (the client requests an ack); the token is
/// preserved verbatim, no reply correlation happens here. `endpoint` is the
/// namespace path and is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    ptype: PacketType,
    id: String,
    endpoint: String,
    data: Option<Bytes>,
}

impl Packet {
    pub fn new(
        ptype: PacketType,
        id: impl Into<String>,
        endpoint: impl Into<String>,
        data: Option<Bytes>,
    ) -> Self {
        Self {
            ptype,
            id: id.into(),
            endpoint: endpoint.into(),
            data,
        }
    }

    /// `1::` or `1::/namespace`
    pub fn connect(endpoint: impl Into<String>) -> Self {
        Self::new(PacketType::Connect, "", endpoint, None)
    }

    /// `0::` or `0::/namespace`
    pub fn disconnect(endpoint: impl Into<String>) -> Self {
        Self::new(PacketType::Disconnect, "", endpoint, None)
    }

    /// `2::`
    pub fn heartbeat() -> Self {
        Self::new(PacketType::Heartbeat, "", "", None)
    }

    /// `8::`
    pub fn noop() -> Self {
        Self::new(PacketType::Noop, "", "", None)
    }

    /// `3:::<data>`
    pub fn message(data: impl Into<Bytes>) -> Self {
        Self::new(PacketType::Message, "", "", Some(data.into()))
    }

    /// `7::[/endpoint]:<reason[+advice]>`
    pub fn error(endpoint: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(PacketType::Error, "", endpoint, Some(data.into()))
    }

    pub fn ptype(&self) -> PacketType {
        self.ptype
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<Bytes> {
        self.data
    }

    /// Decode one packet from a buffer positioned at its start.
    ///
    /// The grammar requires at least two `:` separators; the third field runs
    /// to the next `:` or end of buffer, anything after that third separator
    /// is data and may itself contain colons or newlines.
    pub fn decode(buf: Bytes) -> Result<Self, Error> {
        let type_end = memchr::memchr(b':', &buf).ok_or(Error::MalformedPacket)?;
        if type_end != 1 {
            return Err(Error::MalformedPacket);
        }
        let ptype = PacketType::from_digit(buf[0]).ok_or(Error::MalformedPacket)?;

        let rest = &buf[type_end + 1..];
        let id_end = memchr::memchr(b':', rest).ok_or(Error::MalformedPacket)?;
        let id = std::str::from_utf8(&rest[..id_end])
            .map_err(|_| Error::MalformedPacket)?
            .to_owned();

        let rest_off = type_end + 1 + id_end + 1;
        let rest = &buf[rest_off..];
        let (endpoint, data) = match memchr::memchr(b':', rest) {
            Some(endpoint_end) => {
                let endpoint = std::str::from_utf8(&rest[..endpoint_end])
                    .map_err(|_| Error::MalformedPacket)?
                    .to_owned();
                let data = buf.slice(rest_off + endpoint_end + 1..);
                (endpoint, Some(data))
            }
            None => {
                let endpoint = std::str::from_utf8(rest)
                    .map_err(|_| Error::MalformedPacket)?
                    .to_owned();
                (endpoint, None)
            }
        };

        Ok(Self {
            ptype,
            id,
            endpoint,
            data,
        })
    }

    /// Encode to the wire form. The trailing `":" DATA` is emitted only when
    /// data is present; an empty id and endpoint render as empty fields.
    pub fn encode(&self) -> Bytes {
        let data_len = self.data.as_ref().map(|d| d.len() + 1).unwrap_or(0);
        let mut buf = BytesMut::with_capacity(3 + self.id.len() + self.endpoint.len() + data_len);
        buf.put_u8(self.ptype.digit());
        buf.put_u8(b':');
        buf.put_slice(self.id.as_bytes());
        buf.put_u8(b':');
        buf.put_slice(self.endpoint.as_bytes());
        if let Some(data) = &self.data {
            buf.put_u8(b':');
            buf.put_slice(data);
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(s: &str) -> Packet {
        Packet::decode(Bytes::copy_from_slice(s.as_bytes())).unwrap()
    }

    fn data_str(packet: &Packet) -> &str {
        std::str::from_utf8(packet.data().unwrap()).unwrap()
    }

    #[test]
    fn decode_disconnect_with_endpoint() {
        let packet = decode("0::/woot");
        assert_eq!(packet.ptype(), PacketType::Disconnect);
        assert_eq!(packet.endpoint(), "/woot");
        assert!(packet.data().is_none());
    }

    #[test]
    fn decode_connect_with_endpoint() {
        let packet = decode("1::/tobi");
        assert_eq!(packet.ptype(), PacketType::Connect);
        assert_eq!(packet.endpoint(), "/tobi");
    }

    #[test]
    fn decode_connect_with_query() {
        let packet = decode("1::/test:?test=1");
        assert_eq!(packet.ptype(), PacketType::Connect);
        assert_eq!(packet.endpoint(), "/test");
        assert_eq!(data_str(&packet), "?test=1");
    }

    #[test]
    fn decode_heartbeat() {
        let packet = decode("2:::");
        assert_eq!(packet.ptype(), PacketType::Heartbeat);
    }

    #[test]
    fn decode_message() {
        let packet = decode("3:::woot");
        assert_eq!(packet.ptype(), PacketType::Message);
        assert_eq!(data_str(&packet), "woot");
    }

    #[test]
    fn decode_message_with_id_and_endpoint() {
        let packet = decode("3:5:/tobi");
        assert_eq!(packet.ptype(), PacketType::Message);
        assert_eq!(packet.id(), "5");
        assert_eq!(packet.endpoint(), "/tobi");
        assert!(packet.data().is_none());
    }

    #[test]
    fn decode_message_with_newline_data() {
        let packet = decode("3:::\n");
        assert_eq!(packet.ptype(), PacketType::Message);
        assert_eq!(data_str(&packet), "\n");
    }

    #[test]
    fn decode_json() {
        let packet = decode("4:::\"2\"");
        assert_eq!(packet.ptype(), PacketType::Json);
        assert_eq!(data_str(&packet), "\"2\"");
    }

    #[test]
    fn decode_json_with_id_and_ack_data() {
        let packet = decode("4:1+::{\"a\":\"b\"}");
        assert_eq!(packet.ptype(), PacketType::Json);
        assert_eq!(packet.id(), "1+");
        assert_eq!(data_str(&packet), "{\"a\":\"b\"}");
    }

    #[test]
    fn decode_json_with_utf8_symbols() {
        let packet = decode("4:::\"Привет\"");
        assert_eq!(packet.ptype(), PacketType::Json);
        assert_eq!(data_str(&packet), "\"Привет\"");
    }

    #[test]
    fn decode_event() {
        let packet = decode("5:::{\"name\":\"woot\"}");
        assert_eq!(packet.ptype(), PacketType::Event);
        assert_eq!(data_str(&packet), "{\"name\":\"woot\"}");
    }

    #[test]
    fn decode_event_with_id_and_ack() {
        let packet = decode("5:1+::{\"name\":\"tobi\"}");
        assert_eq!(packet.ptype(), PacketType::Event);
        assert_eq!(packet.id(), "1+");
    }

    #[test]
    fn decode_ack() {
        let packet = decode("6:::140");
        assert_eq!(packet.ptype(), PacketType::Ack);
        assert_eq!(data_str(&packet), "140");
    }

    #[test]
    fn decode_ack_with_args() {
        let packet = decode("6:::12+[\"woot\",\"wa\"]");
        assert_eq!(packet.ptype(), PacketType::Ack);
        assert_eq!(data_str(&packet), "12+[\"woot\",\"wa\"]");
    }

    #[test]
    fn decode_error_variants() {
        assert_eq!(decode("7:::").ptype(), PacketType::Error);
        let packet = decode("7:::0");
        assert_eq!(packet.ptype(), PacketType::Error);
        assert_eq!(data_str(&packet), "0");
        let packet = decode("7:::2+0");
        assert_eq!(data_str(&packet), "2+0");
        let packet = decode("7::/woot");
        assert_eq!(packet.ptype(), PacketType::Error);
        assert_eq!(packet.endpoint(), "/woot");
    }

    #[test]
    fn decode_noop() {
        let packet = decode("8::");
        assert_eq!(packet.ptype(), PacketType::Noop);
        assert!(packet.data().is_none());
    }

    #[test]
    fn decode_rejects_bad_type_token() {
        for input in ["", "9:::", "a:::", "10:::", ":::", "3"] {
            let err = Packet::decode(Bytes::copy_from_slice(input.as_bytes()));
            assert!(matches!(err, Err(Error::MalformedPacket)), "input {input:?}");
        }
    }

    #[test]
    fn decode_rejects_missing_separator() {
        let err = Packet::decode(Bytes::from_static(b"3:"));
        assert!(matches!(err, Err(Error::MalformedPacket)));
    }

    #[test]
    fn encode_omits_absent_data() {
        assert_eq!(Packet::heartbeat().encode(), "2::");
        assert_eq!(Packet::noop().encode(), "8::");
        assert_eq!(Packet::connect("/tobi").encode(), "1::/tobi");
    }

    #[test]
    fn encode_renders_empty_fields_before_data() {
        assert_eq!(Packet::message("woot").encode(), "3:::woot");
        assert_eq!(Packet::message("\n").encode(), "3:::\n");
        assert_eq!(Packet::error("", "1+0").encode(), "7:::1+0");
    }

    #[test]
    fn roundtrip_preserves_fields() {
        let vectors = [
            "0::/woot",
            "1::/test:?test=1",
            "2::",
            "3:5:/tobi",
            "3:::woot",
            "4:1+::{\"a\":\"b\"}",
            "4:::\"Привет\"",
            "5:::{\"name\":\"woot\"}",
            "6:::12+[\"woot\",\"wa\"]",
            "7::/woot",
            "8::",
        ];
        for vector in vectors {
            let packet = decode(vector);
            assert_eq!(packet.encode(), vector.as_bytes(), "vector {vector:?}");
            assert_eq!(Packet::decode(packet.encode()).unwrap(), packet);
        }
    }
}
