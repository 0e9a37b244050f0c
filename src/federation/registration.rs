//! Outbound self-registration of a manager with the proxy.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::protocol::RegistrationRequest;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::registration";

use crate::{log_info, log_warn};

#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self, request: &RegistrationRequest) -> Result<()>;
}

/// Keeps registering every `retry` until the proxy accepts or `cancel`
/// fires. A manager stays up while the proxy is down rather than failing
/// at startup. Returns whether registration succeeded.
pub async fn register_until_accepted(
    registrar: &dyn Registrar,
    request: &RegistrationRequest,
    retry: Duration,
    cancel: CancellationToken,
) -> bool {
    let mut attempt: u32 = 1;
    loop {
        match registrar.register(request).await {
            Ok(()) => {
                log_info!(
                    "registered as {}://{}:{} after {} attempt(s)",
                    request.scheme,
                    request.host,
                    request.port,
                    attempt
                );
                return true;
            }
            Err(err) => {
                log_warn!(
                    "registration attempt {} failed: {:#}; retrying in {}s",
                    attempt,
                    err,
                    retry.as_secs_f32()
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(retry) => {}
            _ = cancel.cancelled() => {
                log_info!("registration abandoned at shutdown");
                return false;
            }
        }
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FlakyProxy {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Registrar for FlakyProxy {
        async fn register(&self, _request: &RegistrationRequest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                anyhow::bail!("proxy unavailable");
            }
            Ok(())
        }
    }

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            scheme: "http".into(),
            host: "site-a.example".into(),
            port: 8080,
        }
    }

    #[tokio::test]
    async fn retries_until_accepted() {
        let proxy = FlakyProxy {
            failures_left: AtomicUsize::new(2),
            calls: AtomicUsize::new(0),
        };
        let accepted = register_until_accepted(
            &proxy,
            &request(),
            Duration::from_millis(10),
            CancellationToken::new(),
        )
        .await;

        assert!(accepted);
        assert_eq!(proxy.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let proxy = FlakyProxy {
            failures_left: AtomicUsize::new(usize::MAX),
            calls: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let accepted =
            register_until_accepted(&proxy, &request(), Duration::from_secs(60), cancel).await;
        assert!(!accepted);
        assert_eq!(proxy.calls.load(Ordering::SeqCst), 1);
    }
}
