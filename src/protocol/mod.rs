//! Wire protocol for producer/consumer.
//!
//! Request frame: length (4 bytes BE) | request_type (2 bytes BE) | body.
//! Message block: size (4 bytes BE) | version_tag (1) | crc32 (4 BE) | payload.

mod codec;

pub use codec::{
    decode_fetch_response, decode_message, encode_message, encode_request, FetchResponse,
    MessageSet, Request, RequestType, MESSAGE_HEADER_BYTES, RESPONSE_RESERVED_BYTES,
    SIZE_FIELD_BYTES,
};
