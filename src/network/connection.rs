//! Connection Handler
//!
//! Handles individual client connections.
//!
//! Each connection has a reader (this thread) that decodes requests and
//! submits them to the engine, and a writer thread that drains the session's
//! outbound channel onto the socket.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver};

use crate::coordinator::Session;
use crate::engine::Engine;
use crate::error::{MpdbError, Result};
use crate::protocol::{read_request, write_frame, Frame, Response};

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer, handed to the writer thread
    writer: BufWriter<TcpStream>,

    /// Frames emitted for this connection
    outbound: Receiver<Frame>,

    session: Arc<Session>,

    /// Reference to the engine
    engine: Arc<Engine>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and the session's outbound channel
    pub fn new(stream: TcpStream, engine: Arc<Engine>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let (sender, outbound) = channel::unbounded();

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            outbound,
            session: Arc::new(Session::new(sender)),
            engine,
            peer_addr,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads requests in a loop; responses reach the client through the
    /// writer thread. Returns when the client disconnects or sends a
    /// malformed frame.
    pub fn handle(self) -> Result<()> {
        let Connection {
            mut reader,
            writer,
            outbound,
            session,
            engine,
            peer_addr,
        } = self;
        tracing::debug!("Connection established from {} (session {})", peer_addr, session.id());

        let writer_peer = peer_addr.clone();
        let writer_thread = thread::Builder::new()
            .name(format!("mpdb-writer-{}", session.id()))
            .spawn(move || write_loop(writer, outbound, &writer_peer))?;

        let result = read_loop(&mut reader, &session, &engine, &peer_addr);

        engine.disconnect(&session);
        if writer_thread.join().is_err() {
            tracing::warn!("Writer thread for {} panicked", peer_addr);
        }
        result
    }
}

fn read_loop(
    reader: &mut BufReader<TcpStream>,
    session: &Session,
    engine: &Engine,
    peer_addr: &str,
) -> Result<()> {
    loop {
        let request = match read_request(reader) {
            Ok(request) => request,
            Err(MpdbError::Io(ref e)) => {
                match e.kind() {
                    ErrorKind::UnexpectedEof => tracing::debug!("Client {} disconnected", peer_addr),
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                        tracing::debug!("Connection to {} reset", peer_addr)
                    }
                    // Windows reports read timeouts as TimedOut instead of WouldBlock
                    ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                        tracing::debug!("Read timeout for client {}", peer_addr)
                    }
                    _ => tracing::warn!("Error reading from {}: {}", peer_addr, e),
                }
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Malformed frame from {}: {}", peer_addr, e);
                session.emit(Frame::Response(Response::from_error(&e)));
                return Err(e);
            }
        };

        tracing::trace!("Received {} from {}", request.kind.name(), peer_addr);
        engine.submit(session, request);
    }
}

fn write_loop(mut writer: BufWriter<TcpStream>, outbound: Receiver<Frame>, peer_addr: &str) {
    for frame in outbound.iter() {
        if let Err(e) = write_frame(&mut writer, &frame) {
            match e {
                MpdbError::Io(ref io_err)
                    if matches!(
                        io_err.kind(),
                        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
                    ) =>
                {
                    tracing::debug!("Client {} went away before a frame could be sent", peer_addr)
                }
                _ => tracing::warn!("Error writing to {}: {}", peer_addr, e),
            }
            return;
        }
    }
}
