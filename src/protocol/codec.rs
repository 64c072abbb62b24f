//! Request/response codec for the legacy binary protocol.
//!
//! Every request is framed as `length (4 bytes BE) | request_type (2 bytes BE) | body`.
//! Fetch responses are framed as `length (4 bytes BE) | reserved (2 bytes) | message set`.

use crate::error::{ClientError, Result};
use crate::message::Message;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the `i32` length field in front of frames and message blocks.
pub const SIZE_FIELD_BYTES: usize = 4;
/// `version_tag (1) | crc32 (4)`.
pub const MESSAGE_HEADER_BYTES: usize = 5;
/// Reserved prefix of a fetch response body.
pub const RESPONSE_RESERVED_BYTES: usize = 2;

/// Request type ids of the legacy protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum RequestType {
    Produce = 0,
    Fetch = 1,
    MultiFetch = 2,
    MultiProduce = 3,
    Offsets = 4,
}

impl RequestType {
    pub fn id(self) -> i16 {
        self as i16
    }
}

impl TryFrom<i16> for RequestType {
    type Error = ClientError;

    fn try_from(id: i16) -> Result<Self> {
        match id {
            0 => Ok(Self::Produce),
            1 => Ok(Self::Fetch),
            2 => Ok(Self::MultiFetch),
            3 => Ok(Self::MultiProduce),
            4 => Ok(Self::Offsets),
            _ => Err(ClientError::MalformedFrame(format!(
                "unknown request type {}",
                id
            ))),
        }
    }
}

/// Client request.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    Produce {
        topic: &'a [u8],
        partition: i32,
        messages: &'a [Message],
    },
    Fetch {
        topic: &'a [u8],
        partition: i32,
        offset: u64,
        max_size: i32,
    },
}

impl Request<'_> {
    pub fn request_type(&self) -> RequestType {
        match self {
            Request::Produce { .. } => RequestType::Produce,
            Request::Fetch { .. } => RequestType::Fetch,
        }
    }
}

/// Decoded fetch response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// The two reserved bytes in front of the message set, read as a BE `i16`.
    /// Brokers use it as an error code; it is not interpreted here.
    pub error_code: i16,
    pub message_set: Bytes,
}

/// Result of scanning a message set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSet {
    pub messages: Vec<Message>,
    /// Bytes covered by the decoded messages, including their size fields.
    pub consumed: usize,
    /// Trailing bytes left unparsed (a partial message or fewer than 4 bytes).
    pub remaining: usize,
}

impl MessageSet {
    /// Scan `buf`, stopping at a trailing partial message.
    ///
    /// A block whose declared size runs past the end of `buf` is treated as
    /// truncated by the broker's fetch size limit and is left for the next
    /// fetch. A size too small to hold a message header is malformed.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Self::scan(buf, false)
    }

    /// Scan `buf`, rejecting a trailing block whose size overruns the buffer.
    pub fn decode_strict(buf: &[u8]) -> Result<Self> {
        Self::scan(buf, true)
    }

    fn scan(buf: &[u8], strict: bool) -> Result<Self> {
        let mut messages = Vec::new();
        let mut processed = 0usize;
        while buf.len() - processed >= SIZE_FIELD_BYTES {
            let rest = &buf[processed..];
            let size = block_size(rest)?;
            let available = rest.len() - SIZE_FIELD_BYTES;
            if size > available {
                if strict {
                    return Err(ClientError::MalformedFrame(format!(
                        "message size {} exceeds remaining {} bytes at position {}",
                        size, available, processed
                    )));
                }
                break;
            }
            messages.push(decode_message(rest)?);
            processed += SIZE_FIELD_BYTES + size;
        }
        Ok(Self {
            messages,
            consumed: processed,
            remaining: buf.len() - processed,
        })
    }

    /// Append `i32 len | encoded message` for each message to `dst`.
    pub fn encode(messages: &[Message], dst: &mut BytesMut) -> Result<()> {
        dst.reserve(encoded_set_len(messages));
        for message in messages {
            let len = length_field(
                MESSAGE_HEADER_BYTES + message.payload().len(),
                "message",
            )?;
            dst.put_i32(len);
            encode_message(message, dst);
        }
        Ok(())
    }
}

/// Write `version_tag | crc32 | payload` into `dst`. The checksum is
/// recomputed from the payload rather than copied from the message.
pub fn encode_message(message: &Message, dst: &mut BytesMut) {
    dst.put_u8(message.version_tag());
    dst.put_u32(message.calculate_checksum());
    dst.extend_from_slice(message.payload());
}

/// Decode `i32 size | version_tag | crc32 | payload[size - 5]` from the front of `src`.
///
/// Bytes after the message are ignored. The checksum is kept as read;
/// call [`Message::is_valid`] to check it.
pub fn decode_message(src: &[u8]) -> Result<Message> {
    let size = block_size(src)?;
    let mut body = &src[SIZE_FIELD_BYTES..];
    if body.remaining() < size {
        return Err(ClientError::MalformedFrame(format!(
            "message size {} exceeds available {} bytes",
            size,
            body.remaining()
        )));
    }
    let version_tag = body.get_u8();
    let checksum = body.get_u32();
    let payload = Bytes::copy_from_slice(&body[..size - MESSAGE_HEADER_BYTES]);
    Ok(Message::from_parts(version_tag, checksum, payload))
}

/// Read and sanity-check the size field at the front of a message block.
fn block_size(src: &[u8]) -> Result<usize> {
    let mut head = src;
    if head.remaining() < SIZE_FIELD_BYTES {
        return Err(ClientError::MalformedFrame(format!(
            "short message size field ({} bytes)",
            head.remaining()
        )));
    }
    let size = head.get_i32();
    if size < MESSAGE_HEADER_BYTES as i32 {
        return Err(ClientError::MalformedFrame(format!(
            "message size {} smaller than header",
            size
        )));
    }
    Ok(size as usize)
}

fn encoded_set_len(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| SIZE_FIELD_BYTES + MESSAGE_HEADER_BYTES + m.payload().len())
        .sum()
}

fn length_field(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        ClientError::MalformedFrame(format!("{} length {} does not fit in i32", what, len))
    })
}

fn topic_length(topic: &[u8]) -> Result<i16> {
    i16::try_from(topic.len()).map_err(|_| {
        ClientError::MalformedFrame(format!(
            "topic length {} does not fit in i16",
            topic.len()
        ))
    })
}

/// Encode a full, length-prefixed request frame into `dst`.
///
/// Nothing is written to `dst` if a length field would overflow.
pub fn encode_request(req: &Request<'_>, dst: &mut BytesMut) -> Result<()> {
    let mut body = BytesMut::new();
    body.put_i16(req.request_type().id());
    match *req {
        Request::Produce {
            topic,
            partition,
            messages,
        } => {
            let topic_len = topic_length(topic)?;
            let mut message_set = BytesMut::new();
            MessageSet::encode(messages, &mut message_set)?;
            let set_len = length_field(message_set.len(), "message set")?;
            body.reserve(2 + topic.len() + 4 + 4 + message_set.len());
            body.put_i16(topic_len);
            body.extend_from_slice(topic);
            body.put_i32(partition);
            body.put_i32(set_len);
            body.extend_from_slice(&message_set);
        }
        Request::Fetch {
            topic,
            partition,
            offset,
            max_size,
        } => {
            let topic_len = topic_length(topic)?;
            body.reserve(2 + topic.len() + 4 + 8 + 4);
            body.put_i16(topic_len);
            body.extend_from_slice(topic);
            body.put_i32(partition);
            body.put_u64(offset);
            body.put_i32(max_size);
        }
    }
    let frame_len = length_field(body.len(), "request")?;
    dst.reserve(SIZE_FIELD_BYTES + body.len());
    dst.put_i32(frame_len);
    dst.extend_from_slice(&body);
    Ok(())
}

/// Split a fetch response body (frame length already stripped) into its
/// reserved prefix and message set.
pub fn decode_fetch_response(mut body: Bytes) -> Result<FetchResponse> {
    if body.len() < RESPONSE_RESERVED_BYTES {
        return Err(ClientError::MalformedFrame(format!(
            "fetch response body of {} bytes has no reserved prefix",
            body.len()
        )));
    }
    let error_code = body.get_i16();
    Ok(FetchResponse {
        error_code,
        message_set: body,
    })
}
