//! V4L2 camera frame source via the `v4l` crate.

use crate::frame::{self, PixelFormat, Plane, RawFrame};
use crate::source::FrameSource;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("camera has been shut down")]
    Closed,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Requested capture parameters.
#[derive(Debug, Clone)]
pub struct CameraOptions {
    pub width: u32,
    pub height: u32,
    /// Rotation reported on every frame (sensor mounting orientation).
    pub rotation_degrees: i32,
    /// Frames discarded after opening for auto-exposure to settle.
    pub warmup_frames: usize,
    /// Ask for MJPG instead of YUYV.
    pub prefer_mjpeg: bool,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            rotation_degrees: 0,
            warmup_frames: 4,
            prefer_mjpeg: false,
        }
    }
}

/// Negotiated stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamFormat {
    Mjpg,
    Yuyv,
    Grey,
}

/// V4L2 camera implementing [`FrameSource`].
pub struct Camera {
    device: Option<Device>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    stream_format: StreamFormat,
    rotation_degrees: i32,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str, options: &CameraOptions) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = if options.prefer_mjpeg {
            FourCC::new(b"MJPG")
        } else {
            FourCC::new(b"YUYV")
        };
        fmt.width = options.width;
        fmt.height = options.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let stream_format = if fourcc == FourCC::new(b"MJPG") {
            StreamFormat::Mjpg
        } else if fourcc == FourCC::new(b"YUYV") {
            StreamFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            StreamFormat::Grey
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need MJPG, YUYV, or GREY)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        let mut camera = Self {
            device: Some(device),
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            stream_format,
            rotation_degrees: options.rotation_degrees,
        };

        if options.warmup_frames > 0 {
            tracing::debug!(count = options.warmup_frames, "discarding warmup frames");
            let mut failed = 0u32;
            for _ in 0..options.warmup_frames {
                if let Err(e) = camera.grab() {
                    if failed == 0 {
                        tracing::debug!(error = %e, "warmup frame failed");
                    }
                    failed += 1;
                }
            }
            if failed > 0 {
                tracing::debug!(failed, "warmup finished with dropped frames");
            }
        }

        Ok(camera)
    }

    /// Dequeue one buffer and wrap it as a [`RawFrame`].
    fn grab(&mut self) -> Result<RawFrame, CameraError> {
        let device = self.device.as_ref().ok_or(CameraError::Closed)?;
        let mut stream = MmapStream::with_buffers(device, BufType::VideoCapture, 4).map_err(|e| {
            CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
        })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let bytes = if used > 0 { &buf[..used] } else { buf };
        let frame = self.buf_to_frame(bytes)?;
        Ok(frame
            .with_rotation(self.rotation_degrees)
            .with_sequence(meta.sequence))
    }

    fn buf_to_frame(&self, buf: &[u8]) -> Result<RawFrame, CameraError> {
        let (w, h) = (self.width, self.height);
        match self.stream_format {
            StreamFormat::Mjpg => {
                let plane = Plane::encoded(buf.to_vec());
                Ok(RawFrame::new(w, h, PixelFormat::Jpeg, vec![plane]))
            }
            StreamFormat::Yuyv => {
                let planes = frame::yuyv_to_i420(buf, w, h).map_err(|e| {
                    CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))
                })?;
                Ok(RawFrame::new(w, h, PixelFormat::Yuv420, planes))
            }
            StreamFormat::Grey => {
                let pixels = (w * h) as usize;
                if buf.len() < pixels {
                    return Err(CameraError::CaptureFailed(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                Ok(RawFrame::new(
                    w,
                    h,
                    PixelFormat::Grey,
                    vec![Plane::packed(buf[..pixels].to_vec(), w as usize)],
                ))
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .filter_map(|i| {
                let path = format!("/dev/video{i}");
                if !Path::new(&path).exists() {
                    return None;
                }
                let dev = Device::with_path(&path).ok()?;
                let caps = dev.query_caps().ok()?;
                if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                    return None;
                }
                Some(DeviceInfo {
                    path,
                    name: caps.card.clone(),
                    driver: caps.driver.clone(),
                    bus: caps.bus.clone(),
                })
            })
            .collect()
    }
}

impl FrameSource for Camera {
    fn next_preview(&mut self) -> Result<RawFrame, CameraError> {
        self.grab()
    }

    fn capture_still(&mut self) -> Result<RawFrame, CameraError> {
        let frame = self.grab()?;
        tracing::debug!(seq = frame.sequence, fourcc = ?self.fourcc, "captured still");
        Ok(frame)
    }

    fn shutdown(&mut self) {
        if self.device.take().is_some() {
            tracing::info!(device = %self.device_path, "camera released");
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        FrameSource::shutdown(self);
    }
}
