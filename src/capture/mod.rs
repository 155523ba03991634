pub mod ffmpeg;
pub mod frame;
pub mod stream;

pub use ffmpeg::FfmpegPipe;
pub use frame::{Frame, FrameMetadata, PixelFormat, Size};
pub use stream::FrameStream;
