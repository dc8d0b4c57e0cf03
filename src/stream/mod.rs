pub mod sse;
pub mod transcoder;

pub use sse::{FrameParser, SseFrame};
pub use transcoder::ChatCompletionStream;
