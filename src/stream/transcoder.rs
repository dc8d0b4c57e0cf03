use std::collections::VecDeque;
use std::fmt::Display;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use pin_project_lite::pin_project;

use super::sse::{FrameParser, SseFrame};
use crate::observability::log_usage;
use crate::protocol::gemini::stream::DeltaSynthesizer;

pin_project! {
    /// Turns a Gemini `alt=sse` byte stream into an `OpenAI` chunk stream.
    ///
    /// Upstream is polled only once every queued output frame has been handed
    /// out. An upstream read error ends the stream with that error and no
    /// `[DONE]` sentinel.
    pub struct ChatCompletionStream<S> {
        #[pin]
        upstream: S,
        parser: FrameParser,
        synthesizer: DeltaSynthesizer,
        frames: Vec<SseFrame>,
        scratch: Vec<Bytes>,
        pending: VecDeque<Bytes>,
        finished: bool,
    }
}

impl<S> ChatCompletionStream<S> {
    pub fn new(upstream: S, synthesizer: DeltaSynthesizer) -> Self {
        Self {
            upstream,
            parser: FrameParser::new(),
            synthesizer,
            frames: Vec::with_capacity(4),
            scratch: Vec::with_capacity(8),
            pending: VecDeque::with_capacity(8),
            finished: false,
        }
    }
}

impl<S, E> Stream for ChatCompletionStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if *this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.upstream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.parser.feed_into(&chunk, this.frames);
                    for frame in this.frames.drain(..) {
                        this.synthesizer.push_frame(&frame, this.scratch);
                    }
                }
                Some(Err(err)) => {
                    *this.finished = true;
                    tracing::warn!(error = %err, "upstream stream read failed");
                    return Poll::Ready(Some(Err(io::Error::other(err.to_string()))));
                }
                None => {
                    *this.finished = true;
                    if let Some(residual) = this.parser.finish() {
                        tracing::debug!(bytes = residual.data.len(), "flushing unterminated stream tail");
                        this.synthesizer.push_frame(&residual, this.scratch);
                    }
                    this.synthesizer.finish(this.scratch);
                    log_usage(this.synthesizer.model(), this.synthesizer.usage());
                }
            }
            this.pending.extend(this.scratch.drain(..));
        }
    }
}
