use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use rand::Rng;

/// A session id handed out at handshake: 16 lowercase hex chars drawn from a
/// CSPRNG. Collisions are negligible but the registry retries on one anyway.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid([u8; 16]);

const HEX: &[u8; 16] = b"0123456789abcdef";

impl Sid {
    /// Generate a new random session id.
    pub fn new() -> Self {
        let mut random = [0u8; 8];
        let mut id = [0u8; 16];

        rand::thread_rng().fill(&mut random);

        for (i, byte) in random.iter().enumerate() {
            id[i * 2] = HEX[(byte >> 4) as usize];
            id[i * 2 + 1] = HEX[(byte & 0x0f) as usize];
        }

        Sid(id)
    }

    fn to_str(&self) -> &str {
        // SAFETY: a Sid only ever holds ASCII hex chars
        unsafe { std::str::from_utf8_unchecked(&self.0) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SidDecodeError {
    #[error("invalid sid length")]
    InvalidLength,
    #[error("invalid hex string")]
    InvalidHexString,
}

impl FromStr for Sid {
    type Err = SidDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use SidDecodeError::*;

        if s.len() != 16 {
            return Err(InvalidLength);
        }

        let mut id = [0u8; 16];
        for (i, byte) in s.as_bytes().iter().enumerate() {
            if byte.is_ascii_digit() || (b'a'..=b'f').contains(byte) {
                id[i] = *byte;
            } else {
                return Err(InvalidHexString);
            }
        }
        Ok(Sid(id))
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl Debug for Sid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}
