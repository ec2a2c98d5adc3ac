//! Framed payload codec for the polling transports.
//!
//! Several packets travel in one HTTP body as `"\u{fffd}" LEN "\u{fffd}"
//! PAYLOAD` repeated, where LEN is the payload length in characters. A body
//! that does not start with the sentinel is a single unframed packet; a batch
//! of one is emitted unframed.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{errors::Error, packet::Packet};

/// U+FFFD, `EF BF BD` on the wire.
pub const FRAME_SENTINEL: char = '\u{fffd}';

const SENTINEL_BYTES: &[u8] = "\u{fffd}".as_bytes();

/// Decode a polling request body into its packets.
pub fn decode_payload(body: Bytes) -> Result<Vec<Packet>, Error> {
    if !body.starts_with(SENTINEL_BYTES) {
        return Ok(vec![Packet::decode(body)?]);
    }

    let text = std::str::from_utf8(&body).map_err(|_| Error::MalformedPacket)?;
    let mut packets = Vec::new();
    let mut off = 0;

    while off < text.len() {
        let rest = text[off..]
            .strip_prefix(FRAME_SENTINEL)
            .ok_or(Error::MalformedPacket)?;
        off += FRAME_SENTINEL.len_utf8();

        let len_end = rest.find(FRAME_SENTINEL).ok_or(Error::MalformedPacket)?;
        let char_len: usize = rest[..len_end]
            .parse()
            .map_err(|_| Error::MalformedPacket)?;
        off += len_end + FRAME_SENTINEL.len_utf8();

        let payload = &text[off..];
        let byte_len = match payload.char_indices().nth(char_len) {
            Some((i, _)) => i,
            None if payload.chars().count() == char_len => payload.len(),
            None => return Err(Error::MalformedPacket),
        };

        packets.push(Packet::decode(body.slice(off..off + byte_len))?);
        off += byte_len;
    }

    Ok(packets)
}

/// Encode a batch of packets into one polling response body.
pub fn encode_payload(packets: &[Packet]) -> Bytes {
    match packets {
        [] => Bytes::new(),
        [single] => single.encode(),
        many => {
            let mut buf = BytesMut::new();
            for packet in many {
                let encoded = packet.encode();
                let char_len = match std::str::from_utf8(&encoded) {
                    Ok(s) => s.chars().count(),
                    Err(_) => encoded.len(),
                };
                buf.put_slice(SENTINEL_BYTES);
                buf.put_slice(char_len.to_string().as_bytes());
                buf.put_slice(SENTINEL_BYTES);
                buf.put_slice(&encoded);
            }
            buf.freeze()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    fn decode(s: &str) -> Vec<Packet> {
        decode_payload(Bytes::copy_from_slice(s.as_bytes())).unwrap()
    }

    #[test]
    fn single_unframed_packet() {
        let packets = decode("3:::hello");
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].ptype(), PacketType::Message);
        assert_eq!(packets[0].data().unwrap(), &"hello");
    }

    #[test]
    fn framed_multi_packet() {
        let packets = decode("\u{fffd}9\u{fffd}3:::hello\u{fffd}3\u{fffd}2::");
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].ptype(), PacketType::Message);
        assert_eq!(packets[1].ptype(), PacketType::Heartbeat);
    }

    #[test]
    fn framed_length_counts_chars_not_bytes() {
        // "3:::Привет" is 10 chars, 16 bytes
        let packets = decode("\u{fffd}10\u{fffd}3:::Привет\u{fffd}3\u{fffd}8::");
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].data().unwrap(), &"Привет".as_bytes());
        assert_eq!(packets[1].ptype(), PacketType::Noop);
    }

    #[test]
    fn framed_single_frame() {
        let packets = decode("\u{fffd}5\u{fffd}2:::\n");
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].ptype(), PacketType::Heartbeat);
    }

    #[test]
    fn rejects_bad_length_token() {
        let err = decode_payload(Bytes::from("\u{fffd}x\u{fffd}2::".to_owned()));
        assert!(matches!(err, Err(Error::MalformedPacket)));
    }

    #[test]
    fn rejects_truncated_frame() {
        let err = decode_payload(Bytes::from("\u{fffd}9\u{fffd}3:::he".to_owned()));
        assert!(matches!(err, Err(Error::MalformedPacket)));
    }

    #[test]
    fn encode_single_is_unframed() {
        let body = encode_payload(&[Packet::message("hi")]);
        assert_eq!(body, "3:::hi");
    }

    #[test]
    fn encode_batch_roundtrips() {
        let batch = vec![
            Packet::message("hello"),
            Packet::heartbeat(),
            Packet::message("Привет"),
        ];
        let body = encode_payload(&batch);
        let decoded = decode_payload(body).unwrap();
        assert_eq!(decoded, batch);
    }
}
