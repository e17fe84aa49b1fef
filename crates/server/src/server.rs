//! TCP listener
//!
//! One worker thread per connection: the accept loop hands each stream to
//! a worker that reads newline-delimited requests, dispatches them in
//! order, and dies quietly when the peer disconnects. There is no async
//! runtime anywhere in the process; the engine is synchronous and the
//! per-connection thread is the unit of concurrency.

use crate::dispatch::dispatch;
use crate::envelope::{Request, Response};
use granary_core::{GranaryError, Result};
use granary_engine::Database;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// The TCP server
pub struct Server {
    listener: TcpListener,
    db: Arc<Database>,
    stop: Arc<AtomicBool>,
}

impl Server {
    /// Bind a listener
    ///
    /// Use port 0 to let the OS pick (tests do).
    pub fn bind<A: ToSocketAddrs>(addr: A, db: Arc<Database>) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(Server {
            listener,
            db,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that stops the accept loop
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: self.stop.clone(),
            addr: self.listener.local_addr().ok(),
        }
    }

    /// Accept connections until stopped
    ///
    /// Blocks the calling thread. Each connection gets its own worker;
    /// requests within a connection are processed strictly in order.
    pub fn run(&self) -> Result<()> {
        for stream in self.listener.incoming() {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let db = self.db.clone();
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    thread::Builder::new()
                        .name(format!("granary-conn-{}", peer))
                        .spawn(move || serve_connection(stream, db))
                        .map_err(|e| GranaryError::io(format!("spawning worker: {}", e)))?;
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        info!("listener stopped");
        Ok(())
    }
}

/// Stops a running server from another thread
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    addr: Option<SocketAddr>,
}

impl StopHandle {
    /// Request the accept loop to stop
    ///
    /// Pokes the listener with a throwaway connection so a blocked
    /// `accept` wakes up and sees the flag.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(addr) = self.addr {
            let _ = TcpStream::connect(addr);
        }
    }
}

fn serve_connection(stream: TcpStream, db: Arc<Database>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    debug!(peer = %peer, "connection open");

    let reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!(peer = %peer, error = %e, "cannot clone stream");
            return;
        }
    });
    let mut writer = BufWriter::new(stream);

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break, // peer went away
        };
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(&db, request, &mut writer),
            Err(e) => {
                let err = GranaryError::invalid_query(format!("unparseable request: {}", e));
                serde_json::to_string(&Response::failure("", &err))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                    .and_then(|frame| {
                        writer.write_all(frame.as_bytes())?;
                        writer.write_all(b"\n")
                    })
            }
        };
        if outcome.and_then(|_| writer.flush()).is_err() {
            break; // write side gone; abort any in-flight stream
        }
    }
    debug!(peer = %peer, "connection closed");
}
