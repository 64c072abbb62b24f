//! Shared test doubles: in-memory transport, scripted sockets, loopback broker.

#![allow(dead_code)]

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use thorstream_client::{ClientError, Connector, Result, Transport};

// ---- Frame builders (independent of the crate's encoder) ----

/// `i32 size | version_tag | crc32 | payload`.
pub fn message_block(payload: &[u8], version_tag: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + payload.len());
    out.put_i32(5 + payload.len() as i32);
    out.put_u8(version_tag);
    out.put_u32(crc32fast::hash(payload));
    out.extend_from_slice(payload);
    out
}

/// Message set built from `payloads`, all with version tag 0.
pub fn message_set(payloads: &[&[u8]]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|p| message_block(p, 0))
        .collect()
}

/// `i32 len | i16 reserved | message_set`.
pub fn fetch_response(reserved: i16, message_set: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + message_set.len());
    out.put_i32(2 + message_set.len() as i32);
    out.put_i16(reserved);
    out.extend_from_slice(message_set);
    out
}

// ---- In-memory transport ----

/// Records every write as one frame and serves reads from a byte queue.
#[derive(Default)]
pub struct MockTransport {
    pub written: Vec<Bytes>,
    pub inbound: BytesMut,
    pub connected: bool,
    pub connects: usize,
    /// Error returned by every write when set.
    pub fail_writes: bool,
    pub write_attempts: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    pub fn with_responses(frames: &[Vec<u8>]) -> Self {
        let mut t = Self::new();
        for frame in frames {
            t.inbound.extend_from_slice(frame);
        }
        t
    }

    pub fn push_response(&mut self, frame: &[u8]) {
        self.inbound.extend_from_slice(frame);
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn read(&mut self, len: usize) -> Result<Bytes> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        if self.inbound.len() < len {
            let received = self.inbound.len();
            self.inbound.clear();
            self.connected = false;
            return Err(ClientError::ConnectionClosed {
                received,
                expected: len,
            });
        }
        Ok(self.inbound.split_to(len).freeze())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.write_attempts += 1;
        if self.fail_writes {
            return Err(ClientError::Connection {
                addr: "mock".into(),
                source: io::Error::from(ErrorKind::BrokenPipe),
            });
        }
        if !self.connected {
            self.connect()?;
        }
        self.written.push(Bytes::copy_from_slice(data));
        Ok(data.len())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ---- Scripted sockets ----

enum WriteStep {
    Accept(usize),
    Fail(ErrorKind),
}

/// A fake socket whose reads and writes follow a script.
///
/// Reads pop chunks (EOF once the script is empty). Writes follow the write
/// script and accept everything once it is exhausted.
pub struct ScriptedStream {
    reads: VecDeque<io::Result<Vec<u8>>>,
    writes: VecDeque<WriteStep>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl Default for ScriptedStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            writes: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn read_chunk(mut self, bytes: &[u8]) -> Self {
        self.reads.push_back(Ok(bytes.to_vec()));
        self
    }

    /// Deliver `bytes` one byte per read call.
    pub fn read_trickle(mut self, bytes: &[u8]) -> Self {
        for b in bytes {
            self.reads.push_back(Ok(vec![*b]));
        }
        self
    }

    pub fn read_error(mut self, kind: ErrorKind) -> Self {
        self.reads.push_back(Err(io::Error::from(kind)));
        self
    }

    pub fn write_accept(mut self, max: usize) -> Self {
        self.writes.push_back(WriteStep::Accept(max));
        self
    }

    pub fn write_error(mut self, kind: ErrorKind) -> Self {
        self.writes.push_back(WriteStep::Fail(kind));
        self
    }

    /// Everything this stream has accepted so far.
    pub fn sent(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.sent)
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(Ok(chunk.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.writes.pop_front() {
            None => buf.len(),
            Some(WriteStep::Accept(max)) => max.min(buf.len()),
            Some(WriteStep::Fail(kind)) => return Err(io::Error::from(kind)),
        };
        self.sent.lock().unwrap().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out scripted streams in order; refuses once they run out.
#[derive(Default)]
pub struct ScriptedConnector {
    streams: VecDeque<ScriptedStream>,
    pub connects: usize,
    pub closes: usize,
    pub fail_close: bool,
}

impl ScriptedConnector {
    pub fn new(streams: Vec<ScriptedStream>) -> Self {
        Self {
            streams: streams.into(),
            ..Default::default()
        }
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&mut self) -> io::Result<ScriptedStream> {
        self.connects += 1;
        self.streams
            .pop_front()
            .ok_or_else(|| io::Error::from(ErrorKind::ConnectionRefused))
    }

    fn addr(&self) -> String {
        "scripted:0".to_string()
    }

    fn close(&mut self, stream: ScriptedStream) -> io::Result<()> {
        self.closes += 1;
        drop(stream);
        if self.fail_close {
            Err(io::Error::from(ErrorKind::NotConnected))
        } else {
            Ok(())
        }
    }
}

// ---- Loopback broker ----

type Logs = Arc<Mutex<HashMap<(Vec<u8>, i32), Vec<u8>>>>;

/// Minimal broker on 127.0.0.1: appends produced message sets to a per-partition
/// byte log and serves fetches as raw byte ranges, truncating at `max_size`.
pub struct FakeBroker {
    pub port: u16,
    logs: Logs,
}

impl FakeBroker {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let logs: Logs = Arc::new(Mutex::new(HashMap::new()));
        let accept_logs = Arc::clone(&logs);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let logs = Arc::clone(&accept_logs);
                thread::spawn(move || {
                    let _ = serve(stream, logs);
                });
            }
        });
        Self { port, logs }
    }

    pub fn log_len(&self, topic: &str, partition: i32) -> usize {
        self.logs
            .lock()
            .unwrap()
            .get(&(topic.as_bytes().to_vec(), partition))
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

fn serve(mut stream: TcpStream, logs: Logs) -> io::Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        if stream.read_exact(&mut len_buf).is_err() {
            return Ok(());
        }
        let len = i32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body)?;
        let mut body = &body[..];
        let request_type = body.get_i16();
        let topic_len = body.get_i16() as usize;
        let topic = body[..topic_len].to_vec();
        body.advance(topic_len);
        let partition = body.get_i32();
        match request_type {
            0 => {
                let set_len = body.get_i32() as usize;
                let set = &body[..set_len];
                logs.lock()
                    .unwrap()
                    .entry((topic, partition))
                    .or_default()
                    .extend_from_slice(set);
            }
            1 => {
                let offset = body.get_u64() as usize;
                let max_size = body.get_i32() as usize;
                let chunk = {
                    let logs = logs.lock().unwrap();
                    let log = logs.get(&(topic, partition)).cloned().unwrap_or_default();
                    let start = offset.min(log.len());
                    let end = (start + max_size).min(log.len());
                    log[start..end].to_vec()
                };
                stream.write_all(&fetch_response(0, &chunk))?;
            }
            _ => return Ok(()),
        }
    }
}
