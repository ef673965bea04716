//! Newline framing of the raw serial byte stream.

/// Longest partial line kept before it is discarded.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024;

/// Splits a byte stream into `\n`-terminated lines.
///
/// Bytes are buffered until a delimiter arrives, so a line may span
/// any number of reads. The delimiter itself is not part of the
/// returned line. A partial line longer than the limit is dropped up to
/// the next delimiter, which keeps a device that never sends `\n` from
/// growing the buffer without bound.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line_bytes: usize,
    discarding: bool,
}

impl LineFramer {
    /// Creates a framer with the given line length limit.
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_line_bytes.min(DEFAULT_MAX_LINE_BYTES)),
            max_line_bytes: max_line_bytes.max(1),
            discarding: false,
        }
    }

    /// Feeds bytes in and returns every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    lines.push(std::mem::take(&mut self.buffer));
                }
                continue;
            }

            if self.discarding {
                continue;
            }
            if self.buffer.len() >= self.max_line_bytes {
                tracing::warn!(
                    limit = self.max_line_bytes,
                    "Discarding overlong serial line"
                );
                self.buffer.clear();
                self.discarding = true;
                continue;
            }
            self.buffer.push(byte);
        }

        lines
    }

    /// Bytes held for the line currently being assembled.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any partially assembled line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}
