//! Single-resource HTTP GET with bounded retry.
//!
//! Every attempt produces an explicit [`FetchOutcome`] that is handed to a
//! [`FetchObserver`]; the retry decision is a plain loop over the attempt result.
//! Listings are fetched into memory, firmware images are streamed into a file.

use crate::core::config::TargetSpec;
use crate::core::retry::BackoffPolicy;
use crate::error::{Result, ScrapeError};
use reqwest::Url;
use std::fmt;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Raw response of one GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Status of one streamed GET and how many body bytes reached the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamedResponse {
    pub status: u16,
    pub bytes: u64,
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Server answered with a non-success status.
    Status(u16),
    Timeout(String),
    /// Connection refused, reset or aborted, or the body stream broke.
    Connection(String),
    /// Anything that will not get better by asking again (bad URL, redirect loop).
    Other(String),
}

impl AttemptError {
    /// Transport trouble and 5xx are worth another try; 4xx are not, except
    /// request-timeout and too-many-requests.
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Status(status) => *status >= 500 || *status == 408 || *status == 429,
            AttemptError::Timeout(_) | AttemptError::Connection(_) => true,
            AttemptError::Other(_) => false,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Status(status) => write!(f, "HTTP {status}"),
            AttemptError::Timeout(message) => write!(f, "timed out: {message}"),
            AttemptError::Connection(message) => write!(f, "connection error: {message}"),
            AttemptError::Other(message) => write!(f, "{message}"),
        }
    }
}

/// The seam between the retry logic and the network.
pub trait Transport {
    fn get(&self, url: &Url) -> std::result::Result<HttpResponse, AttemptError>;

    /// Copy a successful body into `sink` as it arrives. Non-success answers
    /// leave `sink` untouched.
    fn get_into(
        &self,
        url: &Url,
        sink: &mut dyn Write,
    ) -> std::result::Result<StreamedResponse, AttemptError> {
        let response = self.get(url)?;
        if !(200..300).contains(&response.status) {
            return Ok(StreamedResponse {
                status: response.status,
                bytes: 0,
            });
        }

        sink.write_all(&response.body)
            .map_err(|e| AttemptError::Other(e.to_string()))?;
        Ok(StreamedResponse {
            status: response.status,
            bytes: response.body.len() as u64,
        })
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &Url) -> std::result::Result<HttpResponse, AttemptError> {
        (**self).get(url)
    }

    fn get_into(
        &self,
        url: &Url,
        sink: &mut dyn Write,
    ) -> std::result::Result<StreamedResponse, AttemptError> {
        (**self).get_into(url, sink)
    }
}

/// Blocking `reqwest` client configured from the run's [`TargetSpec`].
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(spec: &TargetSpec) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(spec.timeout_secs))
            .user_agent(spec.user_agent.as_str())
            .build()
            .map_err(|e| ScrapeError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &Url) -> std::result::Result<HttpResponse, AttemptError> {
        let response = self.client.get(url.clone()).send().map_err(classify)?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            return Ok(HttpResponse {
                status,
                body: Vec::new(),
            });
        }

        let body = response.bytes().map_err(classify)?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn get_into(
        &self,
        url: &Url,
        sink: &mut dyn Write,
    ) -> std::result::Result<StreamedResponse, AttemptError> {
        let mut response = self.client.get(url.clone()).send().map_err(classify)?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            return Ok(StreamedResponse { status, bytes: 0 });
        }

        let bytes = response.copy_to(sink).map_err(classify)?;
        Ok(StreamedResponse { status, bytes })
    }
}

fn classify(error: reqwest::Error) -> AttemptError {
    let message = error.to_string();
    if error.is_timeout() {
        AttemptError::Timeout(message)
    } else if error.is_connect() || error.is_request() || error.is_body() || error.is_decode() {
        AttemptError::Connection(message)
    } else {
        AttemptError::Other(message)
    }
}

/// Keeps the first local write error, so a full disk is not retried as if the
/// network had failed.
struct SinkGuard<'a> {
    inner: &'a mut File,
    error: Option<io::Error>,
}

impl SinkGuard<'_> {
    fn track<R>(&mut self, result: io::Result<R>) -> io::Result<R> {
        result.map_err(|e| {
            let surfaced = io::Error::new(e.kind(), e.to_string());
            self.error.get_or_insert(e);
            surfaced
        })
    }
}

impl Write for SinkGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        self.track(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.inner.flush();
        self.track(result)
    }
}

/// Result of one attempt, as reported to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        attempt: u32,
        status: u16,
        bytes: u64,
    },
    Failure {
        attempt: u32,
        error: AttemptError,
        will_retry: bool,
    },
}

pub trait FetchObserver {
    fn on_attempt(&self, url: &Url, outcome: &FetchOutcome);
}

/// Reports attempts as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FetchObserver for TracingObserver {
    fn on_attempt(&self, url: &Url, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Success {
                attempt,
                status,
                bytes,
            } => debug!(%url, attempt, status, bytes, "fetched"),
            FetchOutcome::Failure {
                attempt,
                error,
                will_retry,
            } => warn!(%url, attempt, will_retry, "❌ Attempt {attempt} failed: {error}"),
        }
    }
}

/// A successful in-memory fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub body: Vec<u8>,
    pub attempts: u32,
}

/// A successful streamed fetch; the body is in the caller's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streamed {
    pub status: u16,
    pub bytes: u64,
    pub attempts: u32,
}

/// A fetch that gave up, carrying the last error.
#[derive(Debug, Clone, Error)]
#[error("{url}: {error} (after {attempts} attempt(s))")]
pub struct FetchFailure {
    pub url: String,
    pub error: AttemptError,
    pub attempts: u32,
}

impl FetchFailure {
    pub fn is_terminal(&self) -> bool {
        !self.error.is_retryable()
    }
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Fetch(#[from] FetchFailure),
    /// Writing to the local file failed; retrying the request will not help.
    #[error("local write failed: {0}")]
    Sink(io::Error),
}

pub struct Fetcher<T> {
    transport: T,
    max_attempts: u32,
    backoff: BackoffPolicy,
    observer: Box<dyn FetchObserver>,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            transport,
            max_attempts: max_attempts.max(1),
            backoff,
            observer: Box::new(TracingObserver),
        }
    }

    pub fn from_spec(transport: T, spec: &TargetSpec) -> Self {
        Self::new(transport, spec.max_attempts, spec.backoff)
    }

    pub fn with_observer(mut self, observer: Box<dyn FetchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// GET `url` into memory.
    pub fn fetch(&self, url: &Url) -> std::result::Result<Fetched, FetchFailure> {
        let (status, body, attempts) = self.with_retry(url, || {
            let response = self.transport.get(url)?;
            Ok((response.status, response.body.len() as u64, response.body))
        })?;

        Ok(Fetched {
            status,
            body,
            attempts,
        })
    }

    /// GET `url` straight into `sink`. The file is truncated before every
    /// attempt, so after success it holds exactly one body.
    pub fn fetch_into(
        &self,
        url: &Url,
        sink: &mut File,
    ) -> std::result::Result<Streamed, StreamError> {
        let mut sink_error = None;

        let result = self.with_retry(url, || {
            if let Err(e) = sink.set_len(0).and_then(|_| sink.rewind()) {
                sink_error = Some(e);
                return Err(AttemptError::Other("local file is not writable".to_string()));
            }

            let mut guard = SinkGuard {
                inner: &mut *sink,
                error: None,
            };
            let response = self.transport.get_into(url, &mut guard);
            if let Some(e) = guard.error {
                sink_error = Some(e);
                return Err(AttemptError::Other("local write failed".to_string()));
            }

            let response = response?;
            Ok((response.status, response.bytes, response.bytes))
        });

        if let Some(e) = sink_error {
            return Err(StreamError::Sink(e));
        }
        let (status, bytes, attempts) = result?;

        Ok(Streamed {
            status,
            bytes,
            attempts,
        })
    }

    /// Run `attempt` until it yields a 2xx status, a terminal error, or the
    /// attempt budget is spent. `attempt` returns the status, the byte count
    /// reported to the observer and its payload.
    fn with_retry<R>(
        &self,
        url: &Url,
        mut attempt_once: impl FnMut() -> std::result::Result<(u16, u64, R), AttemptError>,
    ) -> std::result::Result<(u16, R, u32), FetchFailure> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = attempt_once().and_then(|(status, bytes, payload)| {
                if (200..300).contains(&status) {
                    Ok((status, bytes, payload))
                } else {
                    Err(AttemptError::Status(status))
                }
            });

            match result {
                Ok((status, bytes, payload)) => {
                    self.observer.on_attempt(
                        url,
                        &FetchOutcome::Success {
                            attempt,
                            status,
                            bytes,
                        },
                    );
                    return Ok((status, payload, attempt));
                }
                Err(error) => {
                    let will_retry = error.is_retryable() && attempt < self.max_attempts;
                    self.observer.on_attempt(
                        url,
                        &FetchOutcome::Failure {
                            attempt,
                            error: error.clone(),
                            will_retry,
                        },
                    );

                    if !will_retry {
                        return Err(FetchFailure {
                            url: url.to_string(),
                            error,
                            attempts: attempt,
                        });
                    }

                    std::thread::sleep(self.backoff.delay(attempt - 1));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io::Read;
    use std::net::TcpListener;
    use std::rc::Rc;
    use std::thread;

    /// Replays a fixed script of attempt results and counts calls.
    struct Scripted {
        script: RefCell<VecDeque<std::result::Result<HttpResponse, AttemptError>>>,
        calls: Cell<u32>,
    }

    impl Scripted {
        fn new(script: Vec<std::result::Result<HttpResponse, AttemptError>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl Transport for Scripted {
        fn get(&self, _url: &Url) -> std::result::Result<HttpResponse, AttemptError> {
            self.calls.set(self.calls.get() + 1);
            self.script
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(AttemptError::Connection("script exhausted".into())))
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<FetchOutcome>>>);

    impl FetchObserver for Recorder {
        fn on_attempt(&self, _url: &Url, outcome: &FetchOutcome) {
            self.0.borrow_mut().push(outcome.clone());
        }
    }

    fn ok(body: &[u8]) -> std::result::Result<HttpResponse, AttemptError> {
        Ok(HttpResponse {
            status: 200,
            body: body.to_vec(),
        })
    }

    fn status(code: u16) -> std::result::Result<HttpResponse, AttemptError> {
        Ok(HttpResponse {
            status: code,
            body: Vec::new(),
        })
    }

    fn url() -> Url {
        Url::parse("http://example.test/DIR/fw.bin").unwrap()
    }

    fn no_wait() -> BackoffPolicy {
        BackoffPolicy::fixed(Duration::ZERO)
    }

    #[test]
    fn test_success_on_first_attempt() {
        let transport = Scripted::new(vec![ok(b"firmware")]);
        let recorder = Recorder::default();
        let fetcher =
            Fetcher::new(&transport, 3, no_wait()).with_observer(Box::new(recorder.clone()));

        let fetched = fetcher.fetch(&url()).unwrap();
        assert_eq!(fetched.body, b"firmware");
        assert_eq!(fetched.attempts, 1);
        assert_eq!(transport.calls.get(), 1);
        assert_eq!(
            recorder.0.borrow().as_slice(),
            &[FetchOutcome::Success {
                attempt: 1,
                status: 200,
                bytes: 8
            }]
        );
    }

    #[test]
    fn test_terminal_failure_makes_one_attempt() {
        for code in [404, 403, 400] {
            let transport = Scripted::new(vec![status(code), ok(b"never")]);
            let fetcher = Fetcher::new(&transport, 5, no_wait());

            let failure = fetcher.fetch(&url()).unwrap_err();
            assert_eq!(failure.attempts, 1);
            assert_eq!(failure.error, AttemptError::Status(code));
            assert!(failure.is_terminal());
            assert_eq!(transport.calls.get(), 1);
        }
    }

    #[test]
    fn test_retryable_failures_exhaust_attempts() {
        let transport = Scripted::new(vec![
            status(503),
            Err(AttemptError::Timeout("read".into())),
            Err(AttemptError::Connection("reset by peer".into())),
            ok(b"too late"),
        ]);
        let recorder = Recorder::default();
        let fetcher =
            Fetcher::new(&transport, 3, no_wait()).with_observer(Box::new(recorder.clone()));

        let failure = fetcher.fetch(&url()).unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.error, AttemptError::Connection("reset by peer".into()));
        assert_eq!(transport.calls.get(), 3);

        let events = recorder.0.borrow();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[2],
            FetchOutcome::Failure {
                attempt: 3,
                will_retry: false,
                ..
            }
        ));
        assert!(matches!(
            events[0],
            FetchOutcome::Failure {
                attempt: 1,
                will_retry: true,
                ..
            }
        ));
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let transport = Scripted::new(vec![status(502), ok(b"ok")]);
        let fetcher = Fetcher::new(&transport, 3, no_wait());

        let fetched = fetcher.fetch(&url()).unwrap();
        assert_eq!(fetched.attempts, 2);
        assert_eq!(transport.calls.get(), 2);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let transport = Scripted::new(vec![status(500)]);
        let fetcher = Fetcher::new(&transport, 0, no_wait());

        let failure = fetcher.fetch(&url()).unwrap_err();
        assert_eq!(failure.attempts, 1);
    }

    #[test]
    fn test_error_classification() {
        assert!(AttemptError::Status(500).is_retryable());
        assert!(AttemptError::Status(503).is_retryable());
        assert!(AttemptError::Status(429).is_retryable());
        assert!(AttemptError::Status(408).is_retryable());
        assert!(!AttemptError::Status(404).is_retryable());
        assert!(!AttemptError::Status(403).is_retryable());
        assert!(AttemptError::Timeout(String::new()).is_retryable());
        assert!(AttemptError::Connection(String::new()).is_retryable());
        assert!(!AttemptError::Other(String::new()).is_retryable());
    }

    #[test]
    fn test_streamed_fetch_retries_into_a_clean_file() {
        let transport = Scripted::new(vec![status(503), ok(b"image")]);
        let fetcher = Fetcher::new(&transport, 3, no_wait());
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"leftover from an earlier attempt").unwrap();

        let streamed = fetcher.fetch_into(&url(), &mut file).unwrap();
        assert_eq!(
            streamed,
            Streamed {
                status: 200,
                bytes: 5,
                attempts: 2
            }
        );

        let mut content = Vec::new();
        file.rewind().unwrap();
        file.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"image");
    }

    #[test]
    fn test_streamed_fetch_reports_fetch_failure() {
        let transport = Scripted::new(vec![status(404)]);
        let fetcher = Fetcher::new(&transport, 3, no_wait());
        let mut file = tempfile::tempfile().unwrap();

        let err = fetcher.fetch_into(&url(), &mut file).unwrap_err();
        assert!(matches!(err, StreamError::Fetch(ref failure) if failure.attempts == 1));
    }

    #[test]
    fn test_streamed_fetch_does_not_retry_local_write_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fw.bin");
        std::fs::write(&path, b"").unwrap();
        let mut read_only = File::open(&path).unwrap();

        let transport = Scripted::new(vec![ok(b"image"), ok(b"image")]);
        let fetcher = Fetcher::new(&transport, 3, no_wait());

        let err = fetcher.fetch_into(&url(), &mut read_only).unwrap_err();
        assert!(matches!(err, StreamError::Sink(_)));
        assert!(transport.calls.get() <= 1);
    }

    /// Real client that talks to 127.0.0.1 directly, whatever the proxy environment.
    fn local_transport() -> ReqwestTransport {
        let client = reqwest::blocking::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        ReqwestTransport { client }
    }

    fn closed_port_url() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        Url::parse(&format!("http://127.0.0.1:{port}/fw.bin")).unwrap()
    }

    #[test]
    fn test_refused_connection_is_retryable() {
        let transport = local_transport();

        let err = transport.get(&closed_port_url()).unwrap_err();
        assert!(matches!(err, AttemptError::Connection(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    /// Serve one canned HTTP response on a local port.
    fn serve_once(response: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response).unwrap();
        });
        Url::parse(&format!("http://127.0.0.1:{port}/fw.bin")).unwrap()
    }

    #[test]
    fn test_reqwest_streams_body_into_sink() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 8\r\nConnection: close\r\n\r\nfirmware",
        );
        let transport = local_transport();
        let mut sink = Vec::new();

        let response = transport.get_into(&url, &mut sink).unwrap();
        assert_eq!(
            response,
            StreamedResponse {
                status: 200,
                bytes: 8
            }
        );
        assert_eq!(sink, b"firmware");
    }

    #[test]
    fn test_reqwest_error_status_leaves_sink_empty() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found",
        );
        let transport = local_transport();
        let mut sink = Vec::new();

        let response = transport.get_into(&url, &mut sink).unwrap();
        assert_eq!(response.status, 404);
        assert!(sink.is_empty());
    }
}
