//! Boot ROM packet framing.
//!
//! ## Packet Format
//!
//! ```text
//! +-------------+----------+--------------------------+
//! |   Length    | Checksum |         Payload          |
//! +-------------+----------+--------------------------+
//! | 2 bytes BE  |  1 byte  |        variable          |
//! +-------------+----------+--------------------------+
//! | payload + 2 | sum mod  | opcode + args / response |
//! |             |   256    |                          |
//! +-------------+----------+--------------------------+
//! ```
//!
//! The receiver of a valid packet answers with the two-byte [`ACK`].
//! The checksum is a plain additive sum, as computed by the ROM itself.

use {
    crate::error::{Error, Result},
    byteorder::{BigEndian, ByteOrder, WriteBytesExt},
    std::fmt::Write as _,
};

/// Acknowledgement sent by the receiver of a valid packet.
pub const ACK: [u8; 2] = [0x00, 0xCC];

/// Size of the length + checksum header.
pub const HEADER_LEN: usize = 3;

/// Largest payload whose length still fits the 16-bit length field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - 2;

/// 8-bit additive checksum of a payload.
pub fn checksum(payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Declared length (payload length + 2).
    pub length: u16,
    /// Declared payload checksum.
    pub checksum: u8,
}

impl Header {
    /// Parse the 3 header bytes.
    pub fn parse(bytes: [u8; HEADER_LEN]) -> Result<Self> {
        let length = BigEndian::read_u16(&bytes[..2]);
        if length < 2 {
            return Err(Error::InvalidPacket(format!(
                "declared length {length} is shorter than the header"
            )));
        }
        Ok(Self {
            length,
            checksum: bytes[2],
        })
    }

    /// Number of payload bytes that follow the header.
    pub fn payload_len(&self) -> usize {
        usize::from(self.length) - 2
    }
}

/// Build a packet around `payload`.
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let length = u16::try_from(payload.len() + 2)
        .map_err(|_| Error::InvalidPacket(format!("payload too long ({} bytes)", payload.len())))?;

    let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
    packet
        .write_u16::<BigEndian>(length)
        .unwrap();
    packet.push(checksum(payload));
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Parse a complete packet and return its payload.
///
/// Trailing bytes beyond the declared length are rejected.
pub fn decode(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidPacket(format!(
            "{} bytes is shorter than the header",
            bytes.len()
        )));
    }
    let header = Header::parse([bytes[0], bytes[1], bytes[2]])?;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != header.payload_len() {
        return Err(Error::InvalidPacket(format!(
            "declared {} payload bytes, got {}",
            header.payload_len(),
            payload.len()
        )));
    }
    let actual = checksum(payload);
    if actual != header.checksum {
        return Err(Error::ChecksumMismatch {
            expected: header.checksum,
            actual,
        });
    }
    Ok(payload.to_vec())
}

/// Hex dump of at most `limit` bytes, for wire logging.
pub fn hex_preview(bytes: &[u8], limit: usize) -> String {
    let mut out = String::with_capacity(limit.min(bytes.len()) * 3 + 16);
    for (i, b) in bytes
        .iter()
        .take(limit)
        .enumerate()
    {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    if bytes.len() > limit {
        let _ = write!(out, " ... (+{} bytes)", bytes.len() - limit);
    }
    out
}
