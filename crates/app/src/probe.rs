use std::{future::Future, time::Duration};

use tokio::{net::TcpStream, time::timeout};
use tracing::debug;

/// Something that can report whether a dependency is ready.
pub trait ReadinessCheck {
    fn check(&self) -> impl Future<Output = bool>;

    /// Human-readable name of what is being checked, used in log lines.
    fn target(&self) -> String;
}

/// TCP connect probe against `host:port`.
///
/// Name resolution failures count as not ready; in compose setups the
/// database host often does not resolve until its container is up.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }
}

impl ReadinessCheck for TcpProbe {
    async fn check(&self) -> bool {
        match timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                debug!(stage = "probe", endpoint = %self.target(), error = %err, "connect failed");
                false
            }
            Err(_) => {
                debug!(stage = "probe", endpoint = %self.target(), timeout_ms = self.connect_timeout.as_millis() as u64, "connect timed out");
                false
            }
        }
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
