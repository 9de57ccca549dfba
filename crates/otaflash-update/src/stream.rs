//! Pull based byte sources for `write_stream`

use std::io::{BufRead, ErrorKind, Read};

use tracing::{trace, warn};

use crate::config::StreamRetryPolicy;

/// Peekable, blocking byte source
///
/// `read_up_to` may return 0 when no data arrived in time; the caller
/// retries according to its [`StreamRetryPolicy`].
pub trait ByteSource {
    /// Next byte without consuming it, `None` if nothing is available
    fn peek(&mut self) -> Option<u8>;

    /// Read up to `buf.len()` bytes, returning how many were read
    fn read_up_to(&mut self, buf: &mut [u8]) -> usize;
}

/// [`ByteSource`] over any buffered reader
///
/// I/O errors are logged and reported as empty reads.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
}

impl<R: BufRead> ReaderSource<R> {
    /// Wrap a buffered reader
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> ByteSource for ReaderSource<R> {
    fn peek(&mut self) -> Option<u8> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return buf.first().copied(),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("peek failed: {}", err);
                    return None;
                }
            }
        }
    }

    fn read_up_to(&mut self, buf: &mut [u8]) -> usize {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("stream read failed: {}", err);
                    return 0;
                }
            }
        }
    }
}

/// Read into `buf`, retrying empty reads per `policy`
///
/// Returns `None` once `policy.max_attempts` consecutive reads came back
/// empty. Blocks for at most `policy.worst_case()`.
pub(crate) fn read_with_retry<S: ByteSource + ?Sized>(
    source: &mut S,
    buf: &mut [u8],
    policy: &StreamRetryPolicy,
) -> Option<usize> {
    let mut failures = 0u32;
    loop {
        let read = source.read_up_to(buf).min(buf.len());
        if read > 0 {
            return Some(read);
        }

        failures += 1;
        if failures >= policy.max_attempts {
            return None;
        }
        trace!("empty read, attempt {}/{}", failures, policy.max_attempts);
        std::thread::sleep(policy.interval());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Silent {
        reads: u32,
    }

    impl ByteSource for Silent {
        fn peek(&mut self) -> Option<u8> {
            None
        }

        fn read_up_to(&mut self, _buf: &mut [u8]) -> usize {
            self.reads += 1;
            0
        }
    }

    #[test]
    fn test_reader_source_peek_does_not_consume() {
        let mut source = ReaderSource::new(Cursor::new(vec![0xE9, 1, 2]));
        assert_eq!(source.peek(), Some(0xE9));
        assert_eq!(source.peek(), Some(0xE9));

        let mut buf = [0u8; 8];
        assert_eq!(source.read_up_to(&mut buf), 3);
        assert_eq!(&buf[..3], &[0xE9, 1, 2]);
        assert_eq!(source.peek(), None);
        assert_eq!(source.read_up_to(&mut buf), 0);
    }

    #[test]
    fn test_retry_budget_is_bounded() {
        let mut source = Silent { reads: 0 };
        let policy = StreamRetryPolicy {
            max_attempts: 4,
            interval_ms: 0,
        };
        let mut buf = [0u8; 4];

        assert_eq!(read_with_retry(&mut source, &mut buf, &policy), None);
        assert_eq!(source.reads, 4);
    }

    #[test]
    fn test_retry_returns_first_data() {
        let mut source = ReaderSource::new(Cursor::new(vec![5u8; 10]));
        let policy = StreamRetryPolicy::default();
        let mut buf = [0u8; 4];

        assert_eq!(read_with_retry(&mut source, &mut buf, &policy), Some(4));
    }
}
