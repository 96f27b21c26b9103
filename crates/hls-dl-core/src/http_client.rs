//! Retried, cancellable HTTP GET built on libcurl, grounded on the
//! original engine's `myClient` wrapper: a shared transport with a fixed
//! connect/idle timeout, a desktop-Chrome default User-Agent, and a fixed
//! 1-second backoff between transport-level retries.

use crate::util::HeaderMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 100;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("transport error: {0}")]
    Curl(#[from] curl::Error),
    #[error("unexpected http status {0}")]
    Http(u32),
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a retried request: either it ran to completion (with the
/// final HTTP status) or the cancellation token fired mid-retry, in which
/// case there is deliberately no value and no error to report.
pub enum DoOutcome {
    Completed(u32),
    Cancelled,
}

/// What a job's opening request learns about the resource before deciding
/// whether to fan out ranged requests.
#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    pub status: u32,
    pub content_length: Option<u64>,
    pub accepts_ranges: bool,
}

/// A shared, retrying HTTP client. One instance is normally shared by a
/// job's first probing GET and every ranged transfer it spawns.
pub struct HttpClient {
    conn_timeout: Duration,
    /// Negative means retry forever, matching the configured `retry_count`'s
    /// `-1` sentinel.
    retry_count: i64,
    cancel: Arc<AtomicBool>,
}

impl HttpClient {
    pub fn new(conn_timeout: Duration, retry_count: i64, cancel: Arc<AtomicBool>) -> Self {
        Self {
            conn_timeout,
            retry_count,
            cancel,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Performs a GET against `url`, optionally range-restricted to
    /// `[start, end]` (inclusive, libcurl's own range syntax), streaming
    /// the body through `on_data`. `on_data` returns `true` to keep
    /// streaming or `false` to abort the transfer early (used by callers
    /// to honor pause/cancel mid-body).
    ///
    /// Retries on transport-level errors only; a non-2xx HTTP status is
    /// returned as `Completed(code)` for the caller to classify, never
    /// retried — matching the original client, which only retries
    /// connection failures, not application-level status codes.
    pub fn get<F>(
        &self,
        url: &str,
        headers: &HeaderMap,
        range: Option<(u64, u64)>,
        mut on_data: F,
    ) -> Result<DoOutcome, SegmentError>
    where
        F: FnMut(&[u8]) -> bool,
    {
        self.request(url, headers, range, &mut on_data, |_| {})
    }

    /// Issues a throwaway GET purely to inspect the response: status code,
    /// `Content-Length`, and whether `Accept-Ranges: bytes` is present. The
    /// body is streamed and discarded (matching the original engine, which
    /// opens one request to inspect headers before issuing fresh ones for
    /// the actual transfer, rather than reusing this response's body).
    pub fn probe(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<Option<ProbeResult>, SegmentError> {
        let mut lines = Vec::new();
        let outcome = self.request(url, headers, None, &mut |_| true, |line| lines.push(line))?;
        let status = match outcome {
            DoOutcome::Cancelled => return Ok(None),
            DoOutcome::Completed(code) => code,
        };

        let mut content_length = None;
        let mut accepts_ranges = false;
        for line in &lines {
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim();
                match name.as_str() {
                    "content-length" => content_length = value.parse::<u64>().ok(),
                    "accept-ranges" => accepts_ranges = value.eq_ignore_ascii_case("bytes"),
                    _ => {}
                }
            }
        }

        Ok(Some(ProbeResult {
            status,
            content_length,
            accepts_ranges,
        }))
    }

    /// Retrying request core shared by [`Self::get`] and [`Self::probe`].
    /// `on_header` is invoked once per raw response header line of the
    /// final (successful) attempt.
    fn request<F, H>(
        &self,
        url: &str,
        headers: &HeaderMap,
        range: Option<(u64, u64)>,
        on_data: &mut F,
        mut on_header: H,
    ) -> Result<DoOutcome, SegmentError>
    where
        F: FnMut(&[u8]) -> bool,
        H: FnMut(String),
    {
        let mut attempt: i64 = 0;
        loop {
            if self.is_cancelled() {
                return Ok(DoOutcome::Cancelled);
            }

            match self.perform_once(url, headers, range, on_data, &mut on_header) {
                Ok(code) => return Ok(DoOutcome::Completed(code)),
                Err(err) => {
                    let exhausted = self.retry_count >= 0 && attempt >= self.retry_count;
                    if exhausted {
                        return Err(err.into());
                    }
                    tracing::debug!(attempt, error = %err, "retrying request");
                    attempt += 1;

                    let waited = wait_or_cancel(Duration::from_secs(1), &self.cancel);
                    if !waited {
                        return Ok(DoOutcome::Cancelled);
                    }
                }
            }
        }
    }

    fn perform_once<F, H>(
        &self,
        url: &str,
        headers: &HeaderMap,
        range: Option<(u64, u64)>,
        on_data: &mut F,
        on_header: &mut H,
    ) -> Result<u32, curl::Error>
    where
        F: FnMut(&[u8]) -> bool,
        H: FnMut(String),
    {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.connect_timeout(self.conn_timeout)?;
        easy.max_connects(MAX_IDLE_CONNECTIONS_PER_HOST as u32)?;

        if let Some((start, end)) = range {
            easy.range(&format!("{start}-{end}"))?;
        }

        let mut list = curl::easy::List::new();
        if !headers.contains("user-agent") {
            list.append(&format!("User-Agent: {DEFAULT_USER_AGENT}"))?;
        }
        for (k, v) in headers.iter() {
            list.append(&format!("{k}: {v}"))?;
        }
        easy.http_headers(list)?;

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(line) = std::str::from_utf8(data) {
                    let line = line.trim();
                    if !line.is_empty() {
                        on_header(line.to_string());
                    }
                }
                true
            })?;
            transfer.write_function(|data| {
                if on_data(data) {
                    Ok(data.len())
                } else {
                    Ok(0)
                }
            })?;
            transfer.perform()?;
        }

        let code = easy.response_code()?;
        Ok(code)
    }
}

/// Sleeps for `duration` but wakes early (returning `false`) if
/// `cancel` flips true, polled in short slices.
fn wait_or_cancel(duration: Duration, cancel: &AtomicBool) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let step = remaining.min(SLICE);
        thread::sleep(step);
        remaining -= step;
    }
    !cancel.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_user_agent_injected_when_absent() {
        let headers = HeaderMap::new();
        assert!(!headers.contains("user-agent"));
    }

    #[test]
    fn custom_user_agent_is_not_overridden() {
        let mut headers = HeaderMap::new();
        headers.set("User-Agent", "custom/1.0");
        assert_eq!(headers.get("user-agent"), Some("custom/1.0"));
    }

    #[test]
    fn cancelled_before_attempt_short_circuits() {
        let cancel = Arc::new(AtomicBool::new(true));
        let client = HttpClient::new(Duration::from_secs(5), 3, cancel);
        let outcome = client
            .get("http://127.0.0.1:0", &HeaderMap::new(), None, |_| true)
            .unwrap();
        assert!(matches!(outcome, DoOutcome::Cancelled));
    }
}
