use std::future::Future;

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "roomsense::background";

use crate::log_info;

/// Owns one long-running task and the token that stops it.
pub struct BackgroundTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl BackgroundTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Spawns `body` with a fresh cancellation token.
    pub fn start<F, Fut>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.handle.is_some() {
            bail!("{} already running", self.name);
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(body(cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        log_info!("{} started", self.name);
        Ok(())
    }

    /// Signals the task and waits for it to finish.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .with_context(|| format!("{} task failed to join", self.name))?;
            log_info!("{} stopped", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn start_and_stop_are_deterministic() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let mut task = BackgroundTask::new("test loop");
        task.start(move |cancel| async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

        assert!(task.is_running());
        assert!(task.start(|_| async {}).is_err());

        task.stop().await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert!(!task.is_running());

        // Stopping twice is harmless.
        task.stop().await.unwrap();
    }
}
