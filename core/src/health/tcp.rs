//! Dial probe for plain TCP dependencies

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use super::{CheckContext, HealthError, Probe};

/// Healthy once a TCP handshake with `addr` completes
///
/// The stream is dropped right after the handshake. Each dial is bounded by
/// `connect_timeout` and by whatever deadline the caller's context carries.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    connect_timeout: Duration,
}

impl TcpProbe {
    /// `addr` is anything `TcpStream::connect` resolves, e.g. `"db.internal:5432"`
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self, ctx: &CheckContext) -> Result<(), HealthError> {
        let dial = ctx.with_timeout(self.connect_timeout);
        let _release = dial.cancel_on_drop();

        let outcome = dial
            .run(async {
                TcpStream::connect(self.addr.as_str())
                    .await
                    .map(drop)
                    .map_err(HealthError::from)
            })
            .await;

        match outcome {
            Err(HealthError::DeadlineExceeded) if ctx.err().is_none() => {
                Err(HealthError::Timeout(self.connect_timeout))
            }
            Err(err) => {
                debug!(addr = %self.addr, error = %err, "dial failed");
                Err(err)
            }
            Ok(()) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listening() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_dial_succeeds_against_listener() {
        let (listener, addr) = listening().await;
        tokio::spawn(async move { while listener.accept().await.is_ok() {} });

        let probe = TcpProbe::new(addr, Duration::from_secs(1));
        let result = probe.check(&CheckContext::background()).await;
        assert!(result.is_ok(), "dial should succeed: {result:?}");
    }

    #[tokio::test]
    async fn test_refused_dial_reports_io_error() {
        let (listener, addr) = listening().await;
        drop(listener);

        let probe = TcpProbe::new(addr, Duration::from_secs(1));
        match probe.check(&CheckContext::background()).await {
            Err(HealthError::Tcp(_)) => {}
            other => panic!("Expected HealthError::Tcp, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_dial() {
        let probe = TcpProbe::new("127.0.0.1:1", Duration::from_secs(1));
        let ctx = CheckContext::background();
        ctx.cancel();

        match probe.check(&ctx).await {
            Err(HealthError::Cancelled) => {}
            other => panic!("Expected HealthError::Cancelled, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_caller_deadline_is_not_reported_as_own_timeout() {
        let probe = TcpProbe::new("127.0.0.1:1", Duration::from_secs(1));
        let ctx = CheckContext::background().with_timeout(Duration::ZERO);

        match probe.check(&ctx).await {
            Err(HealthError::DeadlineExceeded) => {}
            other => panic!("Expected HealthError::DeadlineExceeded, got {other:?}"),
        }
    }
}
