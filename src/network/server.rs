//! TCP Server
//!
//! Accepts connections and runs each on its own thread.

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::coordinator::Session;
use crate::engine::Engine;
use crate::error::{MpdbError, Result};
use crate::protocol::{status, write_frame, Frame, Response};

use super::Connection;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// A live connection, as seen by the server
struct Registered {
    session: Arc<Session>,
    stream: TcpStream,
}

/// Stops a running server from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// TCP server for MPDB
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: TcpListener,
    shutdown: ShutdownHandle,
    connections: Arc<Mutex<HashMap<u64, Registered>>>,
}

impl Server {
    /// Bind the configured listen address (port 0 picks a free port)
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            MpdbError::Config(format!("Cannot listen on {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            engine,
            listener,
            shutdown: ShutdownHandle(Arc::new(AtomicBool::new(false))),
            connections: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Start the server (blocking until shutdown)
    ///
    /// On shutdown every open connection gets a shutdown frame before its
    /// socket is closed.
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    workers.retain(|worker| !worker.is_finished());
                    match self.accept(stream, addr) {
                        Ok(Some(worker)) => workers.push(worker),
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Failed to set up connection from {}: {}", addr, e),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        let open: Vec<Registered> = self.connections.lock().drain().map(|(_, conn)| conn).collect();
        tracing::info!("Shutting down, closing {} connections", open.len());
        for conn in open {
            conn.session.emit(Frame::Shutdown);
            conn.session.close();
            let _ = conn.stream.shutdown(Shutdown::Read);
        }
        for worker in workers {
            let _ = worker.join();
        }
        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) -> Result<Option<JoinHandle<()>>> {
        stream.set_nonblocking(false)?;

        if self.connection_count() >= self.config.max_connections {
            tracing::warn!("Rejecting {}: {} connections open", addr, self.config.max_connections);
            let mut stream = stream;
            let busy = Response::status(status::INTERNAL_ERROR, "Too many connections");
            let _ = write_frame(&mut stream, &Frame::Response(busy));
            return Ok(None);
        }

        let control = stream.try_clone()?;
        let mut connection = Connection::new(stream, Arc::clone(&self.engine))?;
        connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;

        let session = Arc::clone(connection.session());
        let id = session.id();
        self.connections.lock().insert(
            id,
            Registered {
                session,
                stream: control,
            },
        );

        let connections = Arc::clone(&self.connections);
        let worker = thread::Builder::new()
            .name(format!("mpdb-conn-{}", id))
            .spawn(move || {
                let peer = connection.peer_addr().to_string();
                if let Err(e) = connection.handle() {
                    tracing::debug!("Connection {} closed with error: {}", peer, e);
                }
                connections.lock().remove(&id);
            })?;
        Ok(Some(worker))
    }
}
