//! Polling and text helpers shared by the session and interaction layers.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Polling Utilities
// ============================================================================

/// Configuration for polling operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub timeout_ms: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub use_exponential_backoff: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10000,
            initial_interval_ms: 100,
            max_interval_ms: 500,
            use_exponential_backoff: true,
        }
    }
}

impl PollConfig {
    /// Default intervals with a different timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of a single check inside [`poll_until`]
#[derive(Debug)]
pub enum Attempt<T> {
    /// Condition met
    Done(T),
    /// Not yet; the reason is kept for diagnostics
    Retry(String),
}

/// Outcome of [`poll_until`]
#[derive(Debug)]
pub enum Polled<T> {
    Ready(T),
    TimedOut {
        last_reason: Option<String>,
        checks: u32,
    },
}

impl<T> Polled<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Polled::Ready(value) => Some(value),
            Polled::TimedOut { .. } => None,
        }
    }
}

/// Poll `check_fn` until it returns [`Attempt::Done`] or the timeout elapses.
///
/// Each check is itself bounded by the remaining time, so a hung remote call
/// cannot outlive the deadline. The first check always runs.
pub async fn poll_until<T, F, Fut>(mut check_fn: F, config: &PollConfig) -> Polled<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let deadline = Instant::now() + config.timeout();
    let mut interval = config.initial_interval_ms.max(1);
    let mut checks = 0u32;

    loop {
        checks += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let window = if checks == 1 {
            remaining.max(Duration::from_millis(interval))
        } else {
            remaining
        };

        let last_reason = match tokio::time::timeout(window, check_fn()).await {
            Ok(Attempt::Done(value)) => return Polled::Ready(value),
            Ok(Attempt::Retry(reason)) => Some(reason),
            Err(_) => Some("check timed out".to_string()),
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Polled::TimedOut {
                last_reason,
                checks,
            };
        }

        tokio::time::sleep(Duration::from_millis(interval).min(remaining)).await;

        if config.use_exponential_backoff {
            interval = (interval * 3 / 2).min(config.max_interval_ms);
        }
    }
}

/// Generic polling function with optional exponential backoff
///
/// Calls `check_fn` repeatedly until it returns `true` or timeout is reached.
/// Returns `true` if condition was met, `false` if timed out.
pub async fn wait_until<F, Fut>(check_fn: F, config: PollConfig) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let polled = poll_until(
        || {
            let fut = check_fn();
            async move {
                if fut.await {
                    Attempt::Done(())
                } else {
                    Attempt::Retry("condition not met".to_string())
                }
            }
        },
        &config,
    )
    .await;
    matches!(polled, Polled::Ready(()))
}

/// Fixed pause used only where the app exposes no observable condition
pub async fn settle(duration: Duration, reason: &str) {
    log::trace!("Settling {}ms: {}", duration.as_millis(), reason);
    tokio::time::sleep(duration).await;
}

// ============================================================================
// Text Utilities
// ============================================================================

/// Escape text for Android shell `input text`
pub fn escape_for_android_shell(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(' ', "%s")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
        .replace('&', "\\&")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('|', "\\|")
        .replace(';', "\\;")
}

/// Replace anything outside `[a-zA-Z0-9-_.]` with `_` (file-name safe)
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
