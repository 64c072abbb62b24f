//! Consumer: fetch messages sequentially from a byte offset.

use crate::config::{ClientConfig, DEFAULT_MAX_FETCH_SIZE, DEFAULT_POLLING_INTERVAL};
use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::observability::metrics;
use crate::protocol::{
    decode_fetch_response, encode_request, MessageSet, Request, RESPONSE_RESERVED_BYTES,
    SIZE_FIELD_BYTES,
};
use crate::transport::{SocketTransport, TcpConnector, TcpTransport, Transport};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Response bodies up to this size are always accepted; larger ones only
/// when the session's fetch size asks for them.
const MAX_RESPONSE_LEN: usize = 100 * 1024 * 1024; // 100MB

/// Granularity at which a sleeping [`Poller`] notices [`StopHandle::stop`].
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Consumer bound to one topic partition; tracks its byte offset in memory.
pub struct Consumer<T: Transport = TcpTransport> {
    transport: T,
    topic: Bytes,
    partition: i32,
    /// Next byte of the partition log to fetch.
    offset: u64,
    max_fetch_size: i32,
    polling_interval: Duration,
    last_error_code: Option<i16>,
}

impl Consumer<TcpTransport> {
    /// Connect to the broker named in `config`, starting at `config.offset`.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = SocketTransport::open(TcpConnector::from_config(config))?;
        let mut consumer = Self::new(
            transport,
            config.topic.clone().into_bytes(),
            config.partition,
        );
        consumer.offset = config.offset;
        consumer.max_fetch_size = config.max_fetch_size;
        consumer.polling_interval = config.polling_interval();
        Ok(consumer)
    }
}

impl<T: Transport> Consumer<T> {
    pub fn new(transport: T, topic: impl Into<Bytes>, partition: i32) -> Self {
        Self {
            transport,
            topic: topic.into(),
            partition,
            offset: 0,
            max_fetch_size: DEFAULT_MAX_FETCH_SIZE,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            last_error_code: None,
        }
    }

    pub fn topic(&self) -> &[u8] {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Current position: the next byte offset to fetch.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Move the position. The next fetch starts from `offset`.
    pub fn seek(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub fn max_fetch_size(&self) -> i32 {
        self.max_fetch_size
    }

    pub fn set_max_fetch_size(&mut self, max_fetch_size: i32) -> Result<()> {
        if max_fetch_size <= 0 {
            return Err(ClientError::Config(format!(
                "max_fetch_size must be positive, got {}",
                max_fetch_size
            )));
        }
        self.max_fetch_size = max_fetch_size;
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn set_polling_interval(&mut self, interval: Duration) {
        self.polling_interval = interval;
    }

    /// Reserved prefix of the most recent fetch response, if any.
    pub fn last_error_code(&self) -> Option<i16> {
        self.last_error_code
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Encode the fetch request for the current offset.
    pub fn encode_request(&self) -> Result<BytesMut> {
        let mut frame = BytesMut::new();
        encode_request(
            &Request::Fetch {
                topic: &self.topic,
                partition: self.partition,
                offset: self.offset,
                max_size: self.max_fetch_size,
            },
            &mut frame,
        )?;
        Ok(frame)
    }

    /// Run one fetch cycle and return the complete messages it delivered.
    ///
    /// The offset advances by the bytes those messages occupied; a trailing
    /// partial message is not counted and will be fetched again.
    pub fn consume(&mut self) -> Result<Vec<Message>> {
        let request = self.encode_request()?;
        self.transport.write(&request)?;
        let body = self.read_response()?;
        let response = decode_fetch_response(body)?;
        self.last_error_code = Some(response.error_code);
        if response.error_code != 0 {
            warn!(
                topic = %String::from_utf8_lossy(&self.topic),
                partition = self.partition,
                offset = self.offset,
                error_code = response.error_code,
                "fetch response carries non-zero reserved code"
            );
        }

        let set = MessageSet::decode(&response.message_set)?;
        self.offset = self.offset.checked_add(set.consumed as u64).ok_or_else(|| {
            ClientError::MalformedFrame(format!(
                "offset {} overflows after {} bytes",
                self.offset, set.consumed
            ))
        })?;
        metrics().record_fetch(set.messages.len(), set.consumed, set.remaining);
        debug!(
            topic = %String::from_utf8_lossy(&self.topic),
            partition = self.partition,
            messages = set.messages.len(),
            bytes = set.consumed,
            unparsed = set.remaining,
            offset = self.offset,
            "fetch response decoded"
        );
        Ok(set.messages)
    }

    /// Read one length-prefixed response body.
    fn read_response(&mut self) -> Result<Bytes> {
        let mut header = self.transport.read(SIZE_FIELD_BYTES)?;
        let len = header.get_i32();
        if len < 0 || len as usize > self.max_response_len() {
            self.transport.disconnect();
            return Err(ClientError::MalformedFrame(format!(
                "fetch response length {}",
                len
            )));
        }
        self.transport.read(len as usize)
    }

    /// Largest response body this session accepts: the message set the fetch
    /// size allows plus the reserved prefix.
    fn max_response_len(&self) -> usize {
        (self.max_fetch_size as usize + RESPONSE_RESERVED_BYTES).max(MAX_RESPONSE_LEN)
    }

    /// Lazily yield messages forever, sleeping the polling interval between
    /// fetches. Stop through [`Poller::stop_handle`].
    pub fn poll(&mut self) -> Poller<'_, T> {
        self.poll_until(StopHandle::new())
    }

    /// Like [`Consumer::poll`], ending once `stop` is triggered.
    pub fn poll_until(&mut self, stop: StopHandle) -> Poller<'_, T> {
        Poller {
            consumer: self,
            pending: VecDeque::new(),
            stop,
            fetched: false,
            done: false,
        }
    }
}

/// Shared flag that ends a [`Poller`]. Cheap to clone and send across threads.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Iterator over messages from repeated fetch cycles.
///
/// Yields `Err` once and then ends if a fetch fails. Otherwise it only ends
/// when its [`StopHandle`] is triggered; already-fetched messages are still
/// yielded after a stop.
pub struct Poller<'c, T: Transport> {
    consumer: &'c mut Consumer<T>,
    pending: VecDeque<Message>,
    stop: StopHandle,
    fetched: bool,
    done: bool,
}

impl<T: Transport> Poller<'_, T> {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Sleep the polling interval in slices; false if stopped meanwhile.
    fn wait(&self) -> bool {
        let deadline = Instant::now() + self.consumer.polling_interval;
        loop {
            if self.stop.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
        }
    }
}

impl<T: Transport> Iterator for Poller<'_, T> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(Ok(message));
            }
            if self.done || self.stop.is_stopped() {
                self.done = true;
                return None;
            }
            if self.fetched && !self.wait() {
                self.done = true;
                return None;
            }
            match self.consumer.consume() {
                Ok(messages) => {
                    self.fetched = true;
                    self.pending.extend(messages);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<T: Transport> std::iter::FusedIterator for Poller<'_, T> {}
