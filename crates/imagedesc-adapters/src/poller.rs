//! Marker-framed reads over a non-blocking byte stream.
//!
//! The REPL writes its answer in chunks of unpredictable size with no length
//! prefix; the only framing is the marker it prints when it is ready for the
//! next line. The poller accumulates chunks until the marker shows up, the
//! peer goes away, or the timeout elapses. When nothing is available it
//! sleeps for the poll interval instead of blocking or spinning.
//!
//! Bytes are buffered raw and decoded once at the end, so a multi-byte
//! character split across two reads survives intact.

use imagedesc_core::ReadEnd;
use std::io::{self, Read};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Text collected by one marker-bounded read.
#[derive(Debug)]
pub struct ReadOutcome {
    /// Accumulated output, lossily decoded and trimmed.
    pub text: String,
    /// Why the read stopped.
    pub end: ReadEnd,
    /// The I/O error that ended the read, if any.
    pub error: Option<io::Error>,
}

impl ReadOutcome {
    /// Error describing a read that ended because the peer closed.
    pub fn into_error(self) -> io::Error {
        self.error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "PTY peer closed")
        })
    }
}

/// Polls a non-blocking reader until a marker appears.
#[derive(Debug, Clone)]
pub struct MarkerPoller {
    poll_interval: Duration,
    chunk_size: usize,
    echo_chunks: bool,
}

impl MarkerPoller {
    pub fn new(poll_interval: Duration, chunk_size: usize) -> Self {
        Self {
            poll_interval,
            chunk_size: chunk_size.max(1),
            echo_chunks: false,
        }
    }

    /// Logs every chunk as it arrives.
    pub fn with_chunk_echo(mut self, enabled: bool) -> Self {
        self.echo_chunks = enabled;
        self
    }

    /// Reads until `marker` occurs in the accumulated output.
    ///
    /// Never fails: a timeout or a closed peer returns whatever arrived so
    /// far, tagged with the matching `ReadEnd`.
    pub async fn read_until_marker<R>(
        &self,
        reader: &mut R,
        marker: &str,
        timeout: Duration,
    ) -> ReadOutcome
    where
        R: Read + ?Sized,
    {
        let deadline = Instant::now() + timeout;
        let marker = marker.as_bytes();
        let mut buffer: Vec<u8> = Vec::new();
        let mut chunk = vec![0u8; self.chunk_size];

        let (end, error) = loop {
            match reader.read(&mut chunk) {
                Ok(0) => {
                    debug!(bytes = buffer.len(), "PTY reader: EOF");
                    break (ReadEnd::Closed, None);
                }
                Ok(n) => {
                    if self.echo_chunks {
                        debug!(
                            bytes = n,
                            chunk = ?String::from_utf8_lossy(&chunk[..n]),
                            "PTY chunk"
                        );
                    }
                    let search_from = buffer.len().saturating_sub(marker.len().saturating_sub(1));
                    buffer.extend_from_slice(&chunk[..n]);
                    if contains(&buffer[search_from..], marker) {
                        break (ReadEnd::Marker, None);
                    }
                    if Instant::now() >= deadline {
                        break (ReadEnd::TimedOut, None);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        break (ReadEnd::TimedOut, None);
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    debug!(error = %e, bytes = buffer.len(), "PTY reader: error");
                    break (ReadEnd::Closed, Some(e));
                }
            }
        };

        ReadOutcome {
            text: String::from_utf8_lossy(&buffer).trim().to_string(),
            end,
            error,
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    enum Step {
        Data(&'static [u8]),
        WouldBlock,
        Interrupted,
        Eof,
        Fail(io::ErrorKind),
    }

    /// Replays a fixed script, then reports "no data" forever.
    struct ScriptedReader {
        steps: VecDeque<Step>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Step::Data(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(bytes);
                    Ok(bytes.len())
                }
                Some(Step::Eof) => Ok(0),
                Some(Step::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
                Some(Step::Fail(kind)) => Err(kind.into()),
                Some(Step::WouldBlock) | None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    fn poller() -> MarkerPoller {
        MarkerPoller::new(Duration::from_millis(5), 4096)
    }

    #[tokio::test]
    async fn test_marker_split_across_chunks_is_found() {
        let mut reader = ScriptedReader::new(vec![
            Step::Data(b"A red car\n>"),
            Step::WouldBlock,
            Step::Data(b">> "),
            Step::Data(b"never read"),
        ]);
        let outcome = poller()
            .read_until_marker(&mut reader, ">>>", Duration::from_secs(5))
            .await;
        assert_eq!(outcome.end, ReadEnd::Marker);
        assert_eq!(outcome.text, "A red car\n>>>");
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_timeout_returns_partial_text() {
        let mut reader = ScriptedReader::new(vec![Step::Data(b"  car, red")]);
        let started = Instant::now();
        let outcome = poller()
            .read_until_marker(&mut reader, ">>>", Duration::from_millis(100))
            .await;
        assert_eq!(outcome.end, ReadEnd::TimedOut);
        assert_eq!(outcome.text, "car, red");
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_eof_returns_buffer_as_closed() {
        let mut reader = ScriptedReader::new(vec![Step::Data(b"half an answer"), Step::Eof]);
        let outcome = poller()
            .read_until_marker(&mut reader, ">>>", Duration::from_secs(5))
            .await;
        assert_eq!(outcome.end, ReadEnd::Closed);
        assert_eq!(outcome.text, "half an answer");
        assert_eq!(outcome.into_error().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_hard_error_is_kept() {
        let mut reader = ScriptedReader::new(vec![
            Step::Data(b"text"),
            Step::Fail(io::ErrorKind::BrokenPipe),
        ]);
        let outcome = poller()
            .read_until_marker(&mut reader, ">>>", Duration::from_secs(5))
            .await;
        assert_eq!(outcome.end, ReadEnd::Closed);
        assert_eq!(outcome.text, "text");
        assert_eq!(
            outcome.error.map(|e| e.kind()),
            Some(io::ErrorKind::BrokenPipe)
        );
    }

    #[tokio::test]
    async fn test_interrupted_reads_are_retried() {
        let mut reader = ScriptedReader::new(vec![
            Step::Interrupted,
            Step::Data(b"ok\n>>>"),
        ]);
        let outcome = poller()
            .read_until_marker(&mut reader, ">>>", Duration::from_secs(5))
            .await;
        assert_eq!(outcome.end, ReadEnd::Marker);
        assert_eq!(outcome.text, "ok\n>>>");
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_reads() {
        let mut reader = ScriptedReader::new(vec![
            Step::Data(b"caf\xc3"),
            Step::Data(b"\xa9\n>>>"),
        ]);
        let outcome = poller()
            .read_until_marker(&mut reader, ">>>", Duration::from_secs(5))
            .await;
        assert_eq!(outcome.text, "caf\u{e9}\n>>>");
    }

    #[tokio::test]
    async fn test_small_chunks_still_find_marker() {
        let mut reader = ScriptedReader::new(vec![
            Step::Data(b"a"),
            Step::Data(b">"),
            Step::Data(b">"),
            Step::Data(b">"),
        ]);
        let outcome = MarkerPoller::new(Duration::from_millis(5), 1)
            .read_until_marker(&mut reader, ">>>", Duration::from_secs(5))
            .await;
        assert_eq!(outcome.end, ReadEnd::Marker);
        assert_eq!(outcome.text, "a>>>");
    }

    #[test]
    fn test_contains() {
        assert!(contains(b"ab>>>cd", b">>>"));
        assert!(!contains(b"ab>>cd", b">>>"));
        assert!(contains(b"anything", b""));
    }
}
