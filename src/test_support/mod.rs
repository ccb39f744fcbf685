//! Test utilities and mocks for Pier unit tests.
//!
//! Provides a mock HTTP transport for artifact downloads and on-disk
//! package fixtures.
//!
//! # Example
//!
//! ```rust,ignore
//! use pier::test_support::{MockFetcher, PackageFixture};
//!
//! #[test]
//! fn test_example() {
//!     let fetcher = MockFetcher::new().with_body("https://example.com/a.zip", b"zip".to_vec());
//!     // Resolve against the fetcher, then inspect fetcher.request_count(...)
//! }
//! ```

pub mod fixtures;

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use url::Url;

use crate::sources::fetch::{FetchError, Fetcher};

// Re-export fixtures for convenience
pub use fixtures::*;

#[derive(Debug, Default)]
struct MockState {
    requests: Vec<String>,
    /// Remaining failures per URL
    failures: HashMap<String, (u32, FetchError)>,
    /// Remaining corrupted responses per URL
    corruptions: HashMap<String, u32>,
    /// URLs whose requests hang until the run is cancelled
    stalled: HashSet<String>,
    /// URLs whose body was served in full
    completed: Vec<String>,
}

/// Upper bound on a stalled request, so a broken test fails instead of hanging.
const STALL_LIMIT: Duration = Duration::from_secs(10);

/// Mock fetcher serving canned bodies and recording requests.
///
/// Unknown URLs answer with HTTP 404.
#[derive(Debug, Default)]
pub struct MockFetcher {
    bodies: HashMap<String, Vec<u8>>,
    state: Mutex<MockState>,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        MockFetcher::default()
    }

    /// Serve `body` for `url`.
    pub fn with_body(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    /// Fail the first `times` requests for `url` with `error`.
    pub fn fail_first(self, url: &str, times: u32, error: FetchError) -> Self {
        self.lock().failures.insert(url.to_string(), (times, error));
        self
    }

    /// Flip one byte of the body in the first `times` responses for `url`.
    pub fn corrupt_first(self, url: &str, times: u32) -> Self {
        self.lock().corruptions.insert(url.to_string(), times);
        self
    }

    /// Hold every request for `url` until the cancel flag is set.
    pub fn stall(self, url: &str) -> Self {
        self.lock().stalled.insert(url.to_string());
        self
    }

    /// Whether a response for `url` was delivered in full.
    pub fn completed(&self, url: &str) -> bool {
        self.lock().completed.iter().any(|c| c == url)
    }

    /// All requested URLs, in order.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Number of requests made for `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.lock().requests.iter().filter(|r| *r == url).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Fetcher for MockFetcher {
    fn fetch(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        cancel: &AtomicBool,
    ) -> Result<u64, FetchError> {
        let key = url.to_string();
        let stalled = {
            let mut state = self.lock();
            state.requests.push(key.clone());
            state.stalled.contains(&key)
        };

        if stalled {
            let started = Instant::now();
            while !cancel.load(Ordering::Relaxed) && started.elapsed() < STALL_LIMIT {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        if cancel.load(Ordering::Relaxed) {
            return Err(FetchError::Cancelled);
        }

        let corrupt = {
            let mut state = self.lock();

            if let Some((remaining, error)) = state.failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }

            match state.corruptions.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        let Some(body) = self.bodies.get(&key) else {
            return Err(FetchError::Status(404));
        };

        let mut body = body.clone();
        if corrupt {
            if let Some(last) = body.last_mut() {
                *last ^= 0x01;
            }
        }

        sink.write_all(&body)
            .map_err(|e| FetchError::Sink(e.to_string()))?;
        self.lock().completed.push(key);
        Ok(body.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_mock_fetcher_serves_body() {
        let fetcher = MockFetcher::new().with_body("https://example.com/a.zip", b"abc".to_vec());
        let mut out = Vec::new();
        let n = fetcher
            .fetch(&url("https://example.com/a.zip"), &mut out, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, b"abc");
        assert_eq!(fetcher.request_count("https://example.com/a.zip"), 1);
    }

    #[test]
    fn test_mock_fetcher_unknown_url() {
        let fetcher = MockFetcher::new();
        let err = fetcher
            .fetch(&url("https://example.com/b.zip"), &mut Vec::new(), &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(err, FetchError::Status(404));
    }

    #[test]
    fn test_mock_fetcher_corrupts_once() {
        let u = "https://example.com/a.zip";
        let fetcher = MockFetcher::new()
            .with_body(u, b"abc".to_vec())
            .corrupt_first(u, 1);

        let mut first = Vec::new();
        fetcher.fetch(&url(u), &mut first, &AtomicBool::new(false)).unwrap();
        let mut second = Vec::new();
        fetcher.fetch(&url(u), &mut second, &AtomicBool::new(false)).unwrap();

        assert_eq!(first, b"abb");
        assert_eq!(second, b"abc");
    }

    #[test]
    fn test_mock_fetcher_stall_ends_on_cancel() {
        let u = "https://example.com/slow.zip";
        let fetcher = MockFetcher::new().with_body(u, b"abc".to_vec()).stall(u);
        let cancel = AtomicBool::new(false);

        let err = std::thread::scope(|s| {
            let handle = s.spawn(|| fetcher.fetch(&url(u), &mut Vec::new(), &cancel));
            std::thread::sleep(Duration::from_millis(20));
            cancel.store(true, Ordering::Relaxed);
            handle.join().unwrap()
        })
        .unwrap_err();

        assert_eq!(err, FetchError::Cancelled);
        assert!(!fetcher.completed(u));
        assert_eq!(fetcher.request_count(u), 1);
    }
}
