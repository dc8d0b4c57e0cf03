//! Incremental splitter for the `data: <payload><blank line>` framing that
//! the upstream stream endpoint emits.

use memchr::memchr2;

const DATA_PREFIX: &[u8] = b"data: ";

/// One upstream event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub data: String,
    /// Set on the residual emitted by [`FrameParser::finish`]; the bytes did
    /// not end with a frame terminator.
    pub truncated: bool,
}

enum Step {
    Frame { payload_end: usize, consumed: usize },
    NeedMore,
    Stalled,
}

/// Byte-level frame parser.
///
/// A frame is `data: ` followed by a payload without line breaks and one of
/// `\n\n`, `\r\r` or `\r\n\r\n`. Bytes that cannot start a frame stay in the
/// buffer until [`FrameParser::finish`] hands them out verbatim.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    read_offset: usize,
}

impl FrameParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and append complete frames into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<SseFrame>) {
        self.buffer.extend_from_slice(chunk);
        while let Step::Frame {
            payload_end,
            consumed,
        } = self.next_step()
        {
            let start = self.read_offset + DATA_PREFIX.len();
            let payload = &self.buffer[start..self.read_offset + payload_end];
            out.push(SseFrame {
                data: String::from_utf8_lossy(payload).into_owned(),
                truncated: false,
            });
            self.read_offset += consumed;
        }
        self.compact();
    }

    /// Drain whatever is left once the upstream stream has ended.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let residual = &self.buffer[self.read_offset..];
        let frame = (!residual.is_empty()).then(|| SseFrame {
            data: String::from_utf8_lossy(residual).into_owned(),
            truncated: true,
        });
        self.buffer.clear();
        self.read_offset = 0;
        frame
    }

    fn next_step(&self) -> Step {
        let rest = &self.buffer[self.read_offset..];
        if rest.len() < DATA_PREFIX.len() {
            return if DATA_PREFIX.starts_with(rest) {
                Step::NeedMore
            } else {
                Step::Stalled
            };
        }
        if !rest.starts_with(DATA_PREFIX) {
            return Step::Stalled;
        }
        let body = &rest[DATA_PREFIX.len()..];
        let Some(rel) = memchr2(b'\n', b'\r', body) else {
            return Step::NeedMore;
        };
        let payload_end = DATA_PREFIX.len() + rel;
        let tail = &rest[payload_end..];
        let terminator: &[u8] = match tail {
            [b'\n', b'\n', ..] => b"\n\n",
            [b'\r', b'\r', ..] => b"\r\r",
            [b'\r', b'\n', b'\r', b'\n', ..] => b"\r\n\r\n",
            [b'\n'] | [b'\r'] | [b'\r', b'\n'] | [b'\r', b'\n', b'\r'] => return Step::NeedMore,
            _ => return Step::Stalled,
        };
        Step::Frame {
            payload_end,
            consumed: payload_end + terminator.len(),
        }
    }

    fn compact(&mut self) {
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}
