//! The unit of data in a partition's log.

use crate::error::{ClientError, Result};
use crate::protocol::{encode_message, MESSAGE_HEADER_BYTES};
use bytes::{Bytes, BytesMut};
use std::fmt;

/// Version tag written by this client when none is given.
pub const DEFAULT_VERSION_TAG: u8 = 0;

/// A single log message: version tag, CRC-32 of the payload, and the payload.
///
/// Messages built from application data always carry a freshly computed
/// checksum. Messages decoded from the wire carry the checksum exactly as the
/// broker sent it, so corruption stays observable through [`Message::is_valid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    version_tag: u8,
    checksum: u32,
    payload: Bytes,
}

impl Message {
    /// Build a message from application payload with the default version tag.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self::with_version(payload, DEFAULT_VERSION_TAG)
    }

    /// Build a message from application payload; the checksum is computed here.
    pub fn with_version(payload: impl Into<Bytes>, version_tag: u8) -> Self {
        let payload = payload.into();
        Self {
            version_tag,
            checksum: checksum(&payload),
            payload,
        }
    }

    /// Rebuild a message from wire fields. The checksum is taken verbatim.
    pub fn from_parts(version_tag: u8, checksum: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            version_tag,
            checksum,
            payload: payload.into(),
        }
    }

    pub fn version_tag(&self) -> u8 {
        self.version_tag
    }

    /// Checksum as stored on this message (not recomputed).
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Checksum recomputed from the current payload.
    pub fn calculate_checksum(&self) -> u32 {
        checksum(&self.payload)
    }

    /// True if the stored checksum matches the payload.
    pub fn is_valid(&self) -> bool {
        self.checksum == self.calculate_checksum()
    }

    /// Like [`Message::is_valid`], but as an error for `?` call sites.
    pub fn verify(&self) -> Result<()> {
        let computed = self.calculate_checksum();
        if computed == self.checksum {
            Ok(())
        } else {
            Err(ClientError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            })
        }
    }

    /// Encoded form: `version_tag | crc32 | payload` (no size prefix).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_BYTES + self.payload.len());
        encode_message(self, &mut buf);
        buf.freeze()
    }
}

impl From<&'static str> for Message {
    fn from(payload: &'static str) -> Self {
        Message::new(payload)
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Message::new(payload)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.payload))
    }
}

/// CRC-32 (IEEE) of `payload`.
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}
