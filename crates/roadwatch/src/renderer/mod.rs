// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for browser-driven crawling.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide), plus the
//! `Launch` factory the crawler uses to start one.

pub mod chromium;

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Number of elements currently matching a CSS selector.
    async fn count_matches(&self, selector: &str) -> Result<usize>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Starts a browser engine.
#[async_trait]
pub trait Launch: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Renderer>>;
}

/// Outcome of [`wait_for_selector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// At least one element matched.
    Ready(usize),
    TimedOut,
}

/// Poll the page until `selector` matches at least one element.
///
/// Script errors while polling are treated as "not yet" since pages often
/// throw while still hydrating.
pub async fn wait_for_selector(
    ctx: &dyn RenderContext,
    selector: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> WaitOutcome {
    let deadline = Instant::now() + timeout;
    loop {
        match ctx.count_matches(selector).await {
            Ok(n) if n > 0 => return WaitOutcome::Ready(n),
            Ok(_) => {}
            Err(e) => tracing::debug!("polling `{selector}` failed: {e}"),
        }

        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::TimedOut;
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports zero matches until polled `ready_after` times.
    struct SlowPage {
        polls: AtomicUsize,
        ready_after: usize,
    }

    #[async_trait]
    impl RenderContext for SlowPage {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
            Ok(NavigationResult {
                final_url: url.to_string(),
                load_time_ms: 0,
            })
        }
        async fn count_matches(&self, _selector: &str) -> Result<usize> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.ready_after {
                Ok(3)
            } else if n % 2 == 0 {
                Err(anyhow::anyhow!("document not ready"))
            } else {
                Ok(0)
            }
        }
        async fn get_html(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_wait_returns_once_elements_appear() {
        let page = SlowPage {
            polls: AtomicUsize::new(0),
            ready_after: 4,
        };
        let outcome = wait_for_selector(
            &page,
            ".item",
            Duration::from_secs(5),
            Duration::from_millis(5),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::Ready(3));
        assert_eq!(page.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let page = SlowPage {
            polls: AtomicUsize::new(0),
            ready_after: usize::MAX,
        };
        let start = Instant::now();
        let outcome = wait_for_selector(
            &page,
            ".item",
            Duration::from_millis(60),
            Duration::from_millis(10),
        )
        .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
