use std::path::Path;

use jewel_tryon::{Capture, CaptureSource, Error, Result};
use log::{debug, info};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};

use crate::mat;

fn unavailable(err: opencv::Error) -> Error {
    Error::CaptureUnavailable(err.to_string())
}

/// A webcam or a video file read through OpenCV. Released when dropped.
pub struct OpenCvCapture {
    cap: VideoCapture,
    buffer: Mat,
    source: String,
}

impl OpenCvCapture {
    pub fn camera(index: i32) -> Result<Self> {
        let cap = VideoCapture::new(index, videoio::CAP_ANY).map_err(unavailable)?;
        Self::opened(cap, format!("camera {index}"))
    }

    pub fn file(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy();
        let cap = VideoCapture::from_file(&name, videoio::CAP_ANY).map_err(unavailable)?;
        Self::opened(cap, name.into_owned())
    }

    fn opened(cap: VideoCapture, source: String) -> Result<Self> {
        if !cap.is_opened().map_err(unavailable)? {
            return Err(Error::CaptureUnavailable(format!("could not open {source}")));
        }
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(unavailable)?;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(unavailable)?;
        info!("opened {source} at {width}x{height}");
        Ok(Self {
            cap,
            buffer: Mat::default(),
            source,
        })
    }
}

impl CaptureSource for OpenCvCapture {
    fn next_frame(&mut self) -> Result<Capture> {
        match self.cap.read(&mut self.buffer) {
            Ok(true) if !self.buffer.empty() => {
                let frame = mat::bgr_to_frame(&self.buffer).map_err(unavailable)?;
                Ok(Capture::Frame(frame))
            }
            // End of file, or the device handed back nothing.
            Ok(_) => Ok(Capture::Closed),
            Err(err) => Err(unavailable(err)),
        }
    }
}

impl Drop for OpenCvCapture {
    fn drop(&mut self) {
        if let Err(err) = self.cap.release() {
            debug!("releasing {}: {err}", self.source);
        }
    }
}
