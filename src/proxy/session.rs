//! Proxied client session.
//!
//! # Responsibilities
//! - Own the client socket, the upstream socket and the delivery queue
//! - Frame both byte streams into lines and feed the state machines
//! - Execute the resulting effects in order
//! - Apply backpressure between the two sides
//!
//! # Design Decisions
//! - One task per session is the single consumer of everything it owns
//! - Write interest is a `select!` precondition: a write branch is armed only
//!   while its outbound buffer holds data
//! - A side stops reading while its consumer's outbound buffer is full
//! - Upstream lines are held while a capture is in the pipeline, so a later
//!   reply cannot overtake the transformed message

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::context::ProxyContext;
use crate::net::framing::{FrameError, LineBuffer, OutboundBuffer};
use crate::pipeline::capture::remove_quietly;
use crate::pipeline::{Capture, Delivery, SealedCapture};
use crate::proxy::dialog::{Dialog, Effect};
use crate::routing::Upstream;

pub const GREETING: &[u8] = b"+OK POP3 ready\r\n";

/// Bytes requested per socket read.
const READ_CHUNK: usize = 8 * 1024;

/// Pending pipeline deliveries per session.
const DELIVERY_QUEUE: usize = 8;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client I/O failed: {0}")]
    Client(#[source] io::Error),
    #[error("upstream I/O failed: {0}")]
    Upstream(#[source] io::Error),
    #[error("framing violation: {0}")]
    Frame(#[from] FrameError),
    #[error("capture failed: {0}")]
    Capture(#[source] io::Error),
}

/// Serve one accepted client until either side closes.
pub async fn serve(stream: TcpStream, peer: SocketAddr, ctx: Arc<ProxyContext>) {
    let guard = ctx.sessions.track();
    ctx.stats.record_connection();
    let span = tracing::info_span!("session", session_id = %guard.id(), peer = %peer);

    async move {
        tracing::debug!("Session opened");
        let mut session = Session::new(stream, ctx);
        let result = session.run().await;
        session.cleanup().await;
        match result {
            Ok(()) => tracing::debug!("Session closed"),
            Err(e) => tracing::warn!(error = %e, "Session terminated"),
        }
        drop(guard);
    }
    .instrument(span)
    .await
}

/// What woke the session up.
enum Event {
    Shutdown,
    ClientRead(io::Result<usize>),
    ClientWritten(io::Result<usize>),
    UpstreamRead(io::Result<usize>),
    UpstreamWritten(io::Result<usize>),
    Delivered(Option<Delivery>),
}

struct Session {
    ctx: Arc<ProxyContext>,
    dialog: Dialog,

    client_reader: OwnedReadHalf,
    client_writer: OwnedWriteHalf,
    client_in: LineBuffer,
    client_out: OutboundBuffer,
    /// Complete client lines not yet handed to the state machine.
    client_lines: VecDeque<Vec<u8>>,
    client_eof: bool,

    upstream_reader: Option<OwnedReadHalf>,
    upstream_writer: Option<OwnedWriteHalf>,
    upstream_in: LineBuffer,
    upstream_out: OutboundBuffer,
    upstream_lines: VecDeque<Vec<u8>>,

    capture: Option<Capture>,
    deliveries_tx: mpsc::Sender<Delivery>,
    deliveries: mpsc::Receiver<Delivery>,
    /// A capture is being transformed; upstream lines wait.
    in_flight: bool,
    /// Close once the client outbound buffer drains.
    closing: bool,
}

impl Session {
    fn new(stream: TcpStream, ctx: Arc<ProxyContext>) -> Self {
        let _ = stream.set_nodelay(true);
        let (client_reader, client_writer) = stream.into_split();
        let capacity = ctx.buffer_capacity;
        let (deliveries_tx, deliveries) = mpsc::channel(DELIVERY_QUEUE);

        let mut client_out = OutboundBuffer::new(capacity);
        client_out.push(GREETING);

        Self {
            ctx,
            dialog: Dialog::new(),
            client_reader,
            client_writer,
            client_in: LineBuffer::new(capacity),
            client_out,
            client_lines: VecDeque::new(),
            client_eof: false,
            upstream_reader: None,
            upstream_writer: None,
            upstream_in: LineBuffer::new(capacity),
            upstream_out: OutboundBuffer::new(capacity),
            upstream_lines: VecDeque::new(),
            capture: None,
            deliveries_tx,
            deliveries,
            in_flight: false,
            closing: false,
        }
    }

    async fn run(&mut self) -> Result<(), SessionError> {
        let mut shutdown = self.ctx.shutdown.subscribe();
        let mut client_buf = vec![0u8; READ_CHUNK];
        let mut upstream_buf = vec![0u8; READ_CHUNK];

        loop {
            self.dispatch().await?;

            if self.closing && self.client_out.is_empty() && !self.in_flight {
                return Ok(());
            }

            let read_client = !self.closing
                && !self.client_eof
                && self.client_lines.is_empty()
                && self.upstream_out.has_room();
            let read_upstream =
                !self.in_flight && self.upstream_lines.is_empty() && self.client_out.has_room();
            let write_client = !self.client_out.is_empty();
            let write_upstream = !self.upstream_out.is_empty();
            let take_delivery = self.in_flight && self.client_out.has_room();

            let event = tokio::select! {
                _ = shutdown.wait() => Event::Shutdown,
                r = self.client_reader.read(&mut client_buf), if read_client => Event::ClientRead(r),
                r = self.client_writer.write(self.client_out.pending()), if write_client => Event::ClientWritten(r),
                r = read_half(self.upstream_reader.as_mut(), &mut upstream_buf), if read_upstream => Event::UpstreamRead(r),
                r = write_half(self.upstream_writer.as_mut(), self.upstream_out.pending()), if write_upstream => Event::UpstreamWritten(r),
                d = self.deliveries.recv(), if take_delivery => Event::Delivered(d),
            };

            match event {
                Event::Shutdown => {
                    tracing::debug!("Stop flag observed");
                    return Ok(());
                }
                Event::ClientRead(r) => {
                    let n = r.map_err(SessionError::Client)?;
                    if n == 0 {
                        tracing::debug!("Client closed the connection");
                        self.client_eof = true;
                        return Ok(());
                    }
                    let lines = self.client_in.push(&client_buf[..n])?;
                    self.client_lines.extend(lines);
                }
                Event::ClientWritten(r) => {
                    let n = r.map_err(SessionError::Client)?;
                    if n == 0 {
                        return Err(SessionError::Client(io::ErrorKind::WriteZero.into()));
                    }
                    self.client_out.consume(n);
                }
                Event::UpstreamRead(r) => {
                    let n = r.map_err(SessionError::Upstream)?;
                    if n == 0 {
                        tracing::debug!("Upstream closed the connection");
                        self.disconnect();
                        self.closing = true;
                        continue;
                    }
                    let lines = self.upstream_in.push(&upstream_buf[..n])?;
                    self.upstream_lines.extend(lines);
                }
                Event::UpstreamWritten(r) => {
                    let n = r.map_err(SessionError::Upstream)?;
                    if n == 0 {
                        return Err(SessionError::Upstream(io::ErrorKind::WriteZero.into()));
                    }
                    self.upstream_out.consume(n);
                }
                Event::Delivered(Some(Delivery::Chunk(bytes))) => {
                    self.ctx.stats.record_response_bytes(bytes.len());
                    self.client_out.push(&bytes);
                }
                Event::Delivered(Some(Delivery::Finished { capture_id, delivered })) => {
                    tracing::debug!(capture_id, delivered, "Transformation finished");
                    self.in_flight = false;
                }
                Event::Delivered(None) => self.in_flight = false,
            }
        }
    }

    /// Feed held lines to the state machines for as long as they may proceed.
    async fn dispatch(&mut self) -> Result<(), SessionError> {
        loop {
            if !self.in_flight && self.client_out.has_room() {
                if let Some(line) = self.upstream_lines.pop_front() {
                    let effects = self.dialog.on_server_line(&line, &self.ctx.stats);
                    self.apply(effects).await?;
                    continue;
                }
            }
            if !self.closing && !self.dialog.is_waiting() && self.upstream_out.has_room() {
                if let Some(line) = self.client_lines.pop_front() {
                    let effects = self.dialog.on_client_line(&line, &self.ctx.registry, &self.ctx.stats);
                    self.apply(effects).await?;
                    continue;
                }
            }
            return Ok(());
        }
    }

    async fn apply(&mut self, effects: Vec<Effect>) -> Result<(), SessionError> {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Connect(upstream) => {
                    if let Err(e) = self.connect(&upstream).await {
                        tracing::warn!(upstream = %upstream, error = %e, "Upstream unreachable");
                        // Nothing else from this command can be carried out.
                        queue.clear();
                        queue.extend(self.dialog.on_connect_failed());
                    }
                }
                Effect::ToServer(bytes) => {
                    if self.upstream_writer.is_some() {
                        self.ctx.stats.record_request_bytes(bytes.len());
                        self.upstream_out.push(&bytes);
                    } else {
                        tracing::debug!("No upstream, dropping line");
                    }
                }
                Effect::ToClient(bytes) => {
                    self.ctx.stats.record_response_bytes(bytes.len());
                    self.client_out.push(&bytes);
                }
                Effect::Capture(line) => {
                    if self.capture.is_none() {
                        let capture = Capture::create(&self.ctx.captures)
                            .await
                            .map_err(SessionError::Capture)?;
                        tracing::debug!(capture_id = capture.id(), "Capture started");
                        self.capture = Some(capture);
                    }
                    if let Some(capture) = self.capture.as_mut() {
                        capture.append(&line).await.map_err(SessionError::Capture)?;
                    }
                }
                Effect::Transform => {
                    if let Some(capture) = self.capture.take() {
                        let sealed = capture.seal().await.map_err(SessionError::Capture)?;
                        tracing::debug!(capture_id = sealed.id(), "Capture handed to pipeline");
                        self.ctx.pool.submit(sealed, self.deliveries_tx.clone());
                        self.in_flight = true;
                    }
                }
                Effect::DiscardCapture => {
                    if let Some(capture) = self.capture.take() {
                        let sealed = capture.seal().await.map_err(SessionError::Capture)?;
                        discard(sealed).await;
                    }
                }
                Effect::Disconnect => self.disconnect(),
                Effect::Close => self.closing = true,
            }
        }
        Ok(())
    }

    async fn connect(&mut self, upstream: &Upstream) -> io::Result<()> {
        self.disconnect();
        let connecting = TcpStream::connect((upstream.host.as_str(), upstream.port));
        let stream = tokio::time::timeout(self.ctx.connect_timeout, connecting)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;

        tracing::info!(upstream = %upstream, "Upstream connected");
        let (reader, writer) = stream.into_split();
        self.upstream_reader = Some(reader);
        self.upstream_writer = Some(writer);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.upstream_reader.take().is_some() {
            tracing::debug!("Upstream dropped");
        }
        self.upstream_writer = None;
        self.upstream_in = LineBuffer::new(self.ctx.buffer_capacity);
        self.upstream_out.clear();
        self.upstream_lines.clear();
    }

    async fn cleanup(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.abandon().await;
        }
        self.disconnect();
        let _ = self.client_writer.shutdown().await;
    }
}

/// Parse a DELE capture for the log and remove it.
async fn discard(sealed: SealedCapture) {
    let capture_id = sealed.id();
    let path = sealed.path().to_path_buf();
    let parsed = tokio::task::spawn_blocking(move || match sealed.parse() {
        Ok(parsed) => {
            let from = parsed.outline().from.clone();
            parsed.discard();
            Ok(from)
        }
        Err(e) => {
            remove_quietly(capture_id, &path);
            Err(e)
        }
    })
    .await;
    match parsed {
        Ok(Ok(from)) => tracing::debug!(capture_id, from = ?from, "Deleted message inspected"),
        Ok(Err(e)) => tracing::warn!(capture_id, error = %e, "Failed to parse deleted message"),
        Err(e) => tracing::error!(capture_id, error = %e, "Discard task panicked"),
    }
}

async fn read_half(half: Option<&mut OwnedReadHalf>, buf: &mut [u8]) -> io::Result<usize> {
    match half {
        Some(half) => half.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn write_half(half: Option<&mut OwnedWriteHalf>, data: &[u8]) -> io::Result<usize> {
    match half {
        Some(half) => half.write(data).await,
        None => std::future::pending().await,
    }
}
