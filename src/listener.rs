//! UDP receiver for JSON pose packets from the HMD rig.
//!
//! One JSON object per datagram, no reassembly, no acknowledgement.
//! Undecodable datagrams are dropped with a warning; the loop only ends
//! when stopped.

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde_json::Value;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ListenerConfig;
use crate::error::{DecodeError, ListenerError};

/// Largest payload of a single IPv4 UDP datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

const RECV_BACKOFF_MIN: Duration = Duration::from_millis(5);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);
/// While receive errors persist, only every Nth one is logged.
const RECV_ERROR_LOG_EVERY: u64 = 100;

/// Pause after the `consecutive`-th receive error in a row (1-based).
fn recv_backoff(consecutive: u64) -> Duration {
    let shift = consecutive.saturating_sub(1).min(16) as u32;
    RECV_BACKOFF_MIN
        .saturating_mul(1 << shift)
        .min(RECV_BACKOFF_MAX)
}

/// Receives every successfully decoded payload with its sender.
pub trait PacketHandler: Send {
    fn handle(&mut self, payload: Value, addr: SocketAddr) -> anyhow::Result<()>;
}

impl<F> PacketHandler for F
where
    F: FnMut(Value, SocketAddr) -> anyhow::Result<()> + Send,
{
    fn handle(&mut self, payload: Value, addr: SocketAddr) -> anyhow::Result<()> {
        self(payload, addr)
    }
}

/// Decode one datagram: UTF-8 text, then JSON.
pub fn decode_datagram(bytes: &[u8]) -> Result<Value, DecodeError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(serde_json::from_str(text)?)
}

/// Cancels a running [`PacketListener`] from anywhere.
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Counters returned when the receive loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub decoded: u64,
    pub dropped: u64,
    pub handler_failures: u64,
}

pub struct PacketListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    max_datagram_size: usize,
}

impl PacketListener {
    pub async fn bind(host: &str, port: u16) -> Result<Self, ListenerError> {
        Self::bind_with_buffer(host, port, MAX_DATAGRAM_SIZE).await
    }

    pub async fn from_config(config: &ListenerConfig) -> Result<Self, ListenerError> {
        Self::bind_with_buffer(&config.host, config.port, config.max_datagram_size).await
    }

    async fn bind_with_buffer(
        host: &str,
        port: u16,
        max_datagram_size: usize,
    ) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            addr: format!("{}:{}", host, port),
            source,
        };
        let socket = UdpSocket::bind((host, port)).await.map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        Ok(Self {
            socket,
            local_addr,
            cancel: CancellationToken::new(),
            max_datagram_size: max_datagram_size.max(1),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.cancel.clone())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Receive loop. Runs until stopped, then closes the socket.
    ///
    /// The handler is called inline for each decoded datagram; its errors and
    /// panics are logged and counted, never propagated.
    pub async fn run<H: PacketHandler>(self, mut handler: H) -> ListenerStats {
        let Self {
            socket,
            local_addr,
            cancel,
            max_datagram_size,
        } = self;

        info!("Listening for UDP pose packets on udp://{}", local_addr);

        let mut stats = ListenerStats::default();
        let mut buf = vec![0u8; max_datagram_size];

        let mut recv_errors: u64 = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = socket.recv_from(&mut buf) => result,
            };
            let (len, addr) = match result {
                Ok(received) => {
                    recv_errors = 0;
                    received
                }
                Err(e) => {
                    // e.g. ICMP port unreachable surfacing as a reset
                    recv_errors += 1;
                    if recv_errors % RECV_ERROR_LOG_EVERY == 1 {
                        warn!(
                            "UDP receive error on {} ({} in a row): {}",
                            local_addr, recv_errors, e
                        );
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(recv_backoff(recv_errors)) => continue,
                    }
                }
            };
            stats.received += 1;

            let payload = match decode_datagram(&buf[..len]) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to decode UDP packet from {}: {}", addr, e);
                    stats.dropped += 1;
                    continue;
                }
            };
            stats.decoded += 1;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(payload, addr)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Packet handler failed for {}: {:#}", addr, e);
                    stats.handler_failures += 1;
                }
                Err(_) => {
                    error!("Packet handler panicked for {}", addr);
                    stats.handler_failures += 1;
                }
            }
        }

        drop(socket);
        debug!(
            "UDP listener on {} stopped ({} received, {} dropped)",
            local_addr, stats.received, stats.dropped
        );
        stats
    }
}
