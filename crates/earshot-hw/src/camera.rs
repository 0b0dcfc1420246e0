//! V4L2 webcam acquisition.

use crate::frame::{rgb_from_rgb3, yuyv_to_rgb, Frame, FrameError};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Mmap buffers queued while streaming.
const STREAM_BUFFERS: u32 = 4;
/// Highest `/dev/videoN` index probed by [`Camera::list_devices`].
const MAX_DEVICE_INDEX: u32 = 16;
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no webcam at {0}")]
    NotFound(String),
    #[error("webcam {0} is in use by another process")]
    Busy(String),
    #[error("{0} is not a video capture device")]
    NotCapture(String),
    #[error("no usable pixel format: {0}")]
    Format(String),
    #[error("stream error: {0}")]
    Stream(String),
}

/// A capture node found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub card: String,
    pub driver: String,
    pub bus: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {} ({}, {})", self.path, self.card, self.driver, self.bus)
    }
}

/// Pixel layouts the converter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2, two bytes per pixel.
    Yuyv,
    /// Packed RGB888.
    Rgb3,
}

impl PixelFormat {
    pub fn fourcc(self) -> FourCC {
        match self {
            Self::Yuyv => FourCC::new(b"YUYV"),
            Self::Rgb3 => FourCC::new(b"RGB3"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        [Self::Yuyv, Self::Rgb3].into_iter().find(|p| p.fourcc() == fourcc)
    }

    /// YUYV pairs pixels, so it cannot carry an odd width.
    pub fn supports_width(self, width: u32) -> bool {
        match self {
            Self::Yuyv => width % 2 == 0,
            Self::Rgb3 => true,
        }
    }

    fn to_rgb(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
        match self {
            Self::Yuyv => yuyv_to_rgb(buf, width, height),
            Self::Rgb3 => rgb_from_rgb3(buf, width, height),
        }
    }
}

/// An opened, format-negotiated webcam.
pub struct Camera {
    device: Device,
    path: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Camera {
    /// Open `path` and ask for `width`×`height` YUYV.
    ///
    /// Drivers may answer with another size or with RGB3; the handle keeps
    /// whatever was negotiated. Any other format is an error.
    pub fn open(path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::NotFound(path.to_string()));
        }
        let device = Device::with_path(path).map_err(|e| match e.raw_os_error() {
            Some(EBUSY) => CameraError::Busy(path.to_string()),
            _ => CameraError::NotFound(format!("{path}: {e}")),
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::Stream(format!("querying capabilities: {e}")))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture(path.to_string()));
        }
        tracing::info!(device = path, card = %caps.card, driver = %caps.driver, "webcam opened");

        let (width, height, format) = negotiate(&device, width, height)?;
        tracing::info!(device = path, width, height, ?format, "capture format negotiated");

        Ok(Self {
            device,
            path: path.to_string(),
            width,
            height,
            format,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Hand each captured frame to `on_frame` until it returns false.
    ///
    /// Blocks the calling thread. A buffer that does not convert is dropped
    /// with a warning; a dequeue failure ends the stream.
    pub fn stream<F>(&self, mut on_frame: F) -> Result<(), CameraError>
    where
        F: FnMut(Frame) -> bool,
    {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::Stream(format!("mapping buffers: {e}")))?;

        loop {
            let (buf, meta) = stream
                .next()
                .map_err(|e| CameraError::Stream(format!("dequeue: {e}")))?;
            let data = match self.format.to_rgb(buf, self.width, self.height) {
                Ok(data) => data,
                Err(err) => {
                    tracing::warn!(sequence = meta.sequence, error = %err, "dropping frame");
                    continue;
                }
            };
            let frame = Frame {
                data,
                width: self.width,
                height: self.height,
                timestamp: Instant::now(),
                sequence: meta.sequence,
            };
            if !on_frame(frame) {
                tracing::debug!(device = %self.path, "capture released by consumer");
                return Ok(());
            }
        }
    }

    /// Capture nodes among `/dev/video0..15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut found = Vec::new();
        for index in 0..MAX_DEVICE_INDEX {
            let path = format!("/dev/video{index}");
            let Ok(device) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = device.query_caps() else {
                continue;
            };
            if caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                found.push(DeviceInfo {
                    path,
                    card: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                });
            }
        }
        found
    }
}

fn negotiate(device: &Device, width: u32, height: u32) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut wanted = device
        .format()
        .map_err(|e| CameraError::Format(format!("reading current format: {e}")))?;
    wanted.width = width;
    wanted.height = height;
    wanted.fourcc = PixelFormat::Yuyv.fourcc();

    let got = device
        .set_format(&wanted)
        .map_err(|e| CameraError::Format(format!("requesting {width}x{height} YUYV: {e}")))?;
    let format = PixelFormat::from_fourcc(got.fourcc)
        .ok_or_else(|| CameraError::Format(format!("driver offered {:?}", got.fourcc)))?;
    if !format.supports_width(got.width) {
        return Err(CameraError::Format(format!(
            "driver offered {format:?} at odd width {}",
            got.width
        )));
    }
    Ok((got.width, got.height, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"RGB3")), Some(PixelFormat::Rgb3));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_to_rgb_dispatch() {
        let rgb = PixelFormat::Rgb3.to_rgb(&[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(rgb, vec![1, 2, 3, 4, 5, 6]);
        assert!(PixelFormat::Yuyv.to_rgb(&[0; 3], 2, 1).is_err());
    }

    #[test]
    fn test_odd_width_only_for_rgb3() {
        assert!(PixelFormat::Yuyv.supports_width(640));
        assert!(!PixelFormat::Yuyv.supports_width(639));
        assert!(PixelFormat::Rgb3.supports_width(639));
        assert!(PixelFormat::Yuyv.to_rgb(&[128; 12], 3, 2).is_err());
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/video-does-not-exist", 640, 480).err().unwrap();
        assert!(matches!(err, CameraError::NotFound(_)));
    }

    #[test]
    fn test_open_real_device() {
        let Some(dev) = Camera::list_devices().into_iter().next() else {
            eprintln!("Skipping test: no capture device");
            return;
        };
        match Camera::open(&dev.path, 640, 480) {
            Ok(camera) => assert!(camera.width > 0 && camera.height > 0),
            Err(err) => eprintln!("Skipping test: {dev}: {err}"),
        }
    }
}
