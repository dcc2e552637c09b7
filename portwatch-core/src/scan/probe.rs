use std::{
    net::{IpAddr, SocketAddr},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use portwatch_model::PortStatus;
use tokio::{net::TcpStream, time::timeout};
use tracing::trace;

/// Ports probed on every address unless the configuration says otherwise.
pub const DEFAULT_PORTS: [u16; 14] = [
    21, 22, 23, 25, 53, 80, 143, 443, 445, 3306, 3389, 5900, 8080, 8443,
];

/// Classification of one connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub address: IpAddr,
    pub port: u16,
    pub status: PortStatus,
    /// Whole milliseconds from attempt start to established connection.
    /// Always `None` for closed ports.
    pub response_time_ms: Option<u32>,
}

impl ProbeOutcome {
    pub fn open(address: IpAddr, port: u16, response_time_ms: u32) -> Self {
        Self {
            address,
            port,
            status: PortStatus::Open,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn closed(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            status: PortStatus::Closed,
            response_time_ms: None,
        }
    }
}

/// Single TCP connect probe.
///
/// Probing never fails: refused, unreachable and timed-out attempts all
/// collapse into [`PortStatus::Closed`].
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(&self, address: IpAddr, port: u16) -> ProbeOutcome;
}

/// Plain connect-and-close prober. No bytes are exchanged.
#[derive(Debug, Clone, Copy)]
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl PortProber for TcpProber {
    async fn probe(&self, address: IpAddr, port: u16) -> ProbeOutcome {
        let socket = SocketAddr::new(address, port);
        let started = Instant::now();

        match timeout(self.timeout, TcpStream::connect(socket)).await {
            Ok(Ok(stream)) => {
                let elapsed = started.elapsed();
                drop(stream);
                let millis = u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX);
                ProbeOutcome::open(address, port, millis)
            }
            Ok(Err(err)) => {
                trace!(%address, port, error = %err, "connect failed");
                ProbeOutcome::closed(address, port)
            }
            Err(_elapsed) => {
                trace!(%address, port, "connect timed out");
                ProbeOutcome::closed(address, port)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn listening_port_is_open_with_latency() {
        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let outcome = TcpProber::new(Duration::from_secs(2))
            .probe(LOOPBACK, port)
            .await;
        assert_eq!(outcome.status, PortStatus::Open);
        assert!(outcome.response_time_ms.is_some());

        accept.await.unwrap();
    }

    #[tokio::test]
    async fn refused_port_is_closed_without_latency() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let prober = TcpProber::new(Duration::from_millis(500));
        for _ in 0..3 {
            let outcome = prober.probe(LOOPBACK, port).await;
            assert_eq!(outcome, ProbeOutcome::closed(LOOPBACK, port));
        }
    }

    #[tokio::test]
    #[ignore = "depends on an unroutable address being silently dropped"]
    async fn unroutable_address_times_out_as_closed() {
        let address: IpAddr = "203.0.113.1".parse().unwrap();
        let prober = TcpProber::new(Duration::from_millis(200));
        let outcome = prober.probe(address, 443).await;
        assert_eq!(outcome.status, PortStatus::Closed);
        assert_eq!(outcome.response_time_ms, None);
    }
}
