//! HTTP transport for remote artifacts.
//!
//! The `Fetcher` trait is the seam between artifact resolution and the
//! network so resolution can be tested without a server.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use url::Url;

const CHUNK_SIZE: usize = 64 * 1024;

/// A single failed download attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Transport(String),

    /// The local sink rejected a write; retrying will not help.
    #[error("failed to write download: {0}")]
    Sink(String),

    #[error("download cancelled")]
    Cancelled,
}

impl FetchError {
    /// Transport failures, server errors and rate limiting are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => *code >= 500 || *code == 429,
            FetchError::Transport(_) => true,
            FetchError::Sink(_) | FetchError::Cancelled => false,
        }
    }
}

/// Downloads a URL into a sink.
pub trait Fetcher: Send + Sync {
    /// Stream the body of `url` into `sink`, returning the byte count.
    ///
    /// Implementations must check `cancel` between chunks.
    fn fetch(&self, url: &Url, sink: &mut dyn Write, cancel: &AtomicBool)
        -> Result<u64, FetchError>;
}

/// Blocking reqwest-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("failed to build HTTP client")?;
        Ok(HttpFetcher { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        cancel: &AtomicBool,
    ) -> Result<u64, FetchError> {
        tracing::debug!("GET {}", url);

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        copy_with_cancel(&mut response, sink, cancel)
    }
}

/// Copy `reader` into `sink` chunk by chunk, stopping when `cancel` is set.
pub fn copy_with_cancel(
    reader: &mut dyn Read,
    sink: &mut dyn Write,
    cancel: &AtomicBool,
) -> Result<u64, FetchError> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(FetchError::Cancelled);
        }

        let n = reader
            .read(&mut buffer)
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if n == 0 {
            break;
        }

        sink.write_all(&buffer[..n])
            .map_err(|e| FetchError::Sink(e.to_string()))?;
        total += n as u64;
    }

    Ok(total)
}
