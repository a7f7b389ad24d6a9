pub mod assembler;
pub mod tailer;

pub use assembler::{Frame, FrameAssembler, DEFAULT_FRAME_CAPACITY};
pub use tailer::{FileTailer, DEFAULT_READ_CEILING};
