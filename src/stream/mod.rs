pub mod decoder;
pub mod responder;
pub mod sse;
pub mod translate;

pub use decoder::{decode_record, record_stream, DecoderError, LineDecoder};
pub use responder::{ResponseStreamer, StreamEnd, StreamerError, StreamerState};
pub use translate::{translate, ChunkContext};
