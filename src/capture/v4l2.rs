//! V4L2 camera stream.
//!
//! Opens a local device node (e.g., /dev/video0) and streams frames through
//! libv4l memory-mapped buffers. The device is closed when the stream is
//! dropped.
//!
//! Nothing reads the stream between captures, so the driver fills every
//! buffer and then stalls. A capture first drops those queued buffers and
//! keeps the next one, which was filled after the request.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};

const BUFFER_COUNT: u32 = 4;

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub(crate) struct V4l2Stream {
    device: String,
    state: DeviceState,
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl V4l2Stream {
    pub(crate) fn open(path: &str, width: u32, height: u32) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(path)
            .with_context(|| format!("open v4l2 device {}", path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = width;
        format.height = height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("camera: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = pixel_format_for(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {} negotiated unsupported pixel format {}",
                path,
                format.fourcc
            )
        })?;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "camera: opened {} ({}x{} {:?})",
            path,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            device: path.to_string(),
            state,
            format: pixel_format,
            width: format.width,
            height: format.height,
        })
    }

    pub(crate) fn device(&self) -> &str {
        &self.device
    }

    pub(crate) fn next_frame(&mut self) -> Result<RgbImage> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let pixels = self.state.with_mut(|fields| {
            read_fresh(BUFFER_COUNT, |keep| {
                let (buf, meta) = fields
                    .stream
                    .next()
                    .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;
                if !keep {
                    return Ok(None);
                }
                let used = (meta.bytesused as usize).min(buf.len());
                let data = if used == 0 { buf } else { &buf[..used] };
                normalize_to_rgb(data, width, height, format).map(Some)
            })
        })?;
        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("v4l2 frame size mismatch on {}", self.device))
    }
}

fn pixel_format_for(fourcc: &[u8; 4]) -> Option<PixelFormat> {
    match fourcc {
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"NV12" => Some(PixelFormat::Nv12),
        b"MJPG" => Some(PixelFormat::Mjpeg),
        _ => None,
    }
}

/// Dequeue and drop `stale` buffers, then keep the next one.
///
/// `dequeue(keep)` pulls one buffer from the driver and returns its frame
/// only when `keep` is set.
fn read_fresh<T>(stale: u32, mut dequeue: impl FnMut(bool) -> Result<Option<T>>) -> Result<T> {
    for _ in 0..stale {
        dequeue(false)?;
    }
    dequeue(true)?.ok_or_else(|| anyhow!("camera returned no frame"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Driver queue holding frames stamped with the time they were filled.
    struct FilledQueue {
        frames: VecDeque<u64>,
        next_stamp: u64,
        dequeued: u32,
    }

    impl FilledQueue {
        fn filled_at(stamp: u64, buffers: u32) -> Self {
            Self {
                frames: (0..buffers).map(|_| stamp).collect(),
                next_stamp: stamp,
                dequeued: 0,
            }
        }

        fn dequeue(&mut self, keep: bool) -> Result<Option<u64>> {
            self.dequeued += 1;
            let frame = match self.frames.pop_front() {
                Some(frame) => frame,
                None => {
                    self.next_stamp += 1;
                    self.next_stamp
                }
            };
            Ok(keep.then_some(frame))
        }
    }

    #[test]
    fn capture_skips_buffers_filled_before_the_request() -> Result<()> {
        let mut queue = FilledQueue::filled_at(0, BUFFER_COUNT);
        queue.next_stamp = 30;
        let frame = read_fresh(BUFFER_COUNT, |keep| queue.dequeue(keep))?;
        assert_eq!(frame, 31);
        assert_eq!(queue.dequeued, BUFFER_COUNT + 1);
        Ok(())
    }

    #[test]
    fn dequeue_errors_abort_the_capture() {
        let mut calls = 0;
        let result: Result<u64> = read_fresh(BUFFER_COUNT, |_| {
            calls += 1;
            Err(anyhow!("device unplugged"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn pixel_formats_map_from_fourcc() {
        assert_eq!(pixel_format_for(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(pixel_format_for(b"MJPG"), Some(PixelFormat::Mjpeg));
        assert_eq!(pixel_format_for(b"H264"), None);
    }
}
