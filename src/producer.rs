//! Producer: append messages to a topic partition.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::observability::metrics;
use crate::protocol::{encode_request, Request};
use crate::transport::{SocketTransport, TcpConnector, TcpTransport, Transport};
use bytes::{Bytes, BytesMut};
use tracing::debug;

/// Producer client bound to one topic partition over one connection.
pub struct Producer<T: Transport = TcpTransport> {
    transport: T,
    topic: Bytes,
    partition: i32,
}

impl Producer<TcpTransport> {
    /// Connect to the broker named in `config`.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = SocketTransport::open(TcpConnector::from_config(config))?;
        Ok(Self::new(
            transport,
            config.topic.clone().into_bytes(),
            config.partition,
        ))
    }
}

impl<T: Transport> Producer<T> {
    pub fn new(transport: T, topic: impl Into<Bytes>, partition: i32) -> Self {
        Self {
            transport,
            topic: topic.into(),
            partition,
        }
    }

    pub fn topic(&self) -> &[u8] {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Encode `messages` as one produce request without sending it.
    pub fn encode_request(&self, messages: &[Message]) -> Result<BytesMut> {
        let mut frame = BytesMut::new();
        encode_request(
            &Request::Produce {
                topic: &self.topic,
                partition: self.partition,
                messages,
            },
            &mut frame,
        )?;
        Ok(frame)
    }

    /// Send `messages` in a single produce request; returns bytes written.
    pub fn send(&mut self, messages: &[Message]) -> Result<usize> {
        let frame = self.encode_request(messages)?;
        let written = self.transport.write(&frame)?;
        metrics().record_produce(messages.len(), written);
        debug!(
            topic = %String::from_utf8_lossy(&self.topic),
            partition = self.partition,
            messages = messages.len(),
            bytes = written,
            "produce request sent"
        );
        Ok(written)
    }

    pub fn send_one(&mut self, message: &Message) -> Result<usize> {
        self.send(std::slice::from_ref(message))
    }

    /// Wrap raw payloads in messages and send them as one request.
    pub fn send_payloads<I, P>(&mut self, payloads: I) -> Result<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        let messages: Vec<Message> = payloads.into_iter().map(Message::new).collect();
        self.send(&messages)
    }

    /// Start a batch. Nothing is sent until [`Batch::commit`].
    pub fn batch(&mut self) -> Batch<'_, T> {
        Batch {
            producer: self,
            messages: Vec::new(),
        }
    }

    /// Collect messages in `fill`, then send them in one request if it
    /// returns `Ok`. On `Err` nothing is sent and the error is returned.
    pub fn with_batch<F, E>(&mut self, fill: F) -> std::result::Result<usize, E>
    where
        F: FnOnce(&mut Batch<'_, T>) -> std::result::Result<(), E>,
        E: From<ClientError>,
    {
        let mut batch = self.batch();
        match fill(&mut batch) {
            Ok(()) => Ok(batch.commit()?),
            Err(e) => {
                batch.abort();
                Err(e)
            }
        }
    }
}

/// Messages accumulated for a single produce request.
///
/// Dropping a batch without calling [`Batch::commit`] discards its messages.
pub struct Batch<'p, T: Transport> {
    producer: &'p mut Producer<T>,
    messages: Vec<Message>,
}

impl<T: Transport> Batch<'_, T> {
    pub fn push(&mut self, message: impl Into<Message>) {
        self.messages.push(message.into());
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Send every accumulated message in exactly one request.
    pub fn commit(mut self) -> Result<usize> {
        let messages = std::mem::take(&mut self.messages);
        self.producer.send(&messages)
    }

    /// Discard the accumulated messages.
    pub fn abort(mut self) {
        let discarded = std::mem::take(&mut self.messages);
        debug!(messages = discarded.len(), "batch aborted");
    }
}

impl<T: Transport> Extend<Message> for Batch<'_, T> {
    fn extend<I: IntoIterator<Item = Message>>(&mut self, iter: I) {
        self.messages.extend(iter);
    }
}

impl<T: Transport> Drop for Batch<'_, T> {
    fn drop(&mut self) {
        if !self.messages.is_empty() {
            debug!(
                messages = self.messages.len(),
                "batch dropped without commit; discarding"
            );
        }
    }
}
