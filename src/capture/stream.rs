//! Fixed-size raw frames pulled from a blocking byte source

use std::io::{ErrorKind, Read};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat, Size};

/// Cuts a continuous byte stream into frames of `width * height * bpp` bytes.
///
/// Reads block until a whole frame is available. While nobody pulls, the
/// producer fills its pipe buffer and stalls on its own write, which is all
/// the flow control a paused session needs.
pub struct FrameStream<R> {
    reader: R,
    size: Size,
    format: PixelFormat,
    frame_len: usize,
    delivered: u64,
    ended: bool,
}

impl<R: Read> FrameStream<R> {
    pub fn new(reader: R, size: Size, format: PixelFormat) -> Self {
        Self {
            reader,
            size,
            format,
            frame_len: size.frame_len(format),
            delivered: 0,
            ended: false,
        }
    }

    /// Pull the next frame, or `None` once the stream has ended.
    ///
    /// A short read is the normal end of streaming (the producer exited or
    /// closed the pipe). The partial frame is discarded and never retried.
    pub fn pull(&mut self) -> Option<Frame> {
        if self.ended {
            return None;
        }

        let mut buf = vec![0u8; self.frame_len];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {
                let meta = Arc::new(FrameMetadata {
                    sequence: self.delivered,
                    width: self.size.width,
                    height: self.size.height,
                    format: self.format,
                });
                self.delivered += 1;
                Some(Frame {
                    data: Bytes::from(buf),
                    meta,
                })
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!(delivered = self.delivered, "frame stream ended");
                self.ended = true;
                None
            }
            Err(e) => {
                warn!(delivered = self.delivered, "frame stream read failed: {}", e);
                self.ended = true;
                None
            }
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Number of complete frames handed out so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}
