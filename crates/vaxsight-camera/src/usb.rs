//! V4L2 USB camera backend.

use async_trait::async_trait;
use image::RgbImage;
use tracing::{error, info};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::camera::Camera;

/// USB camera driven through V4L2 in YUYV.
///
/// The device handle lives on the struct between captures. Each grab moves
/// it into a blocking task, builds a short-lived mmap stream there, and
/// hands the handle back afterwards, so the async runtime never blocks on
/// the driver.
pub struct UsbCamera {
    device_index: usize,
    width: u32,
    height: u32,
    device: Option<Device>,
}

impl UsbCamera {
    pub fn new(device_index: usize, width: u32, height: u32) -> Self {
        Self {
            device_index,
            width,
            height,
            device: None,
        }
    }
}

#[async_trait]
impl Camera for UsbCamera {
    async fn open(&mut self) -> bool {
        let device = match Device::new(self.device_index) {
            Ok(device) => device,
            Err(err) => {
                error!(index = self.device_index, error = %err, "unable to open USB camera");
                return false;
            }
        };

        let mut format = match device.format() {
            Ok(format) => format,
            Err(err) => {
                error!(index = self.device_index, error = %err, "unable to read camera format");
                return false;
            }
        };
        format.width = self.width;
        format.height = self.height;
        format.fourcc = FourCC::new(b"YUYV");

        match device.set_format(&format) {
            Ok(applied) => {
                // The driver may clamp the requested resolution.
                self.width = applied.width;
                self.height = applied.height;
            }
            Err(err) => {
                error!(index = self.device_index, error = %err, "unable to apply camera format");
                return false;
            }
        }

        info!(
            index = self.device_index,
            width = self.width,
            height = self.height,
            "USB camera opened"
        );
        self.device = Some(device);
        true
    }

    async fn capture(&mut self) -> Option<RgbImage> {
        let device = self.device.take()?;
        let (width, height) = (self.width, self.height);

        let grab = tokio::task::spawn_blocking(move || {
            let frame = grab_frame(&device, width, height);
            (device, frame)
        })
        .await;

        match grab {
            Ok((device, frame)) => {
                self.device = Some(device);
                frame
            }
            Err(err) => {
                error!(error = %err, "capture task failed");
                None
            }
        }
    }

    async fn close(&mut self) {
        if self.device.take().is_some() {
            info!(index = self.device_index, "USB camera closed");
        }
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }
}

/// Grabs a single YUYV frame through a freshly mapped stream. The stream
/// borrows the device, so it is created and torn down inside one call.
fn grab_frame(device: &Device, width: u32, height: u32) -> Option<RgbImage> {
    let mut stream = match Stream::with_buffers(device, Type::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(err) => {
            error!(error = %err, "unable to start capture stream");
            return None;
        }
    };

    match stream.next() {
        Ok((buffer, _meta)) => {
            RgbImage::from_raw(width, height, yuyv_to_rgb(buffer))
        }
        Err(err) => {
            error!(error = %err, "frame grab failed");
            None
        }
    }
}

/// Expands packed YUYV into RGB using BT.601 coefficients. A short input
/// buffer yields a short output, which the caller rejects via `from_raw`.
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
    for chunk in yuyv.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;
        for y in [y0, y1] {
            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_gray_maps_to_gray() {
        // Y = 128, U = V = 128 is mid gray for both pixels in the pair.
        let rgb = yuyv_to_rgb(&[128, 128, 128, 128]);

        assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
    }

    #[test]
    fn yuyv_extremes_are_clamped() {
        // Full luma with a strong red chroma must not wrap around.
        let rgb = yuyv_to_rgb(&[255, 0, 255, 255]);

        assert_eq!(rgb.len(), 6);
        assert_eq!(rgb[0], 255);
        assert_eq!(rgb[3], 255);
    }

    #[test]
    fn trailing_bytes_are_dropped() {
        let rgb = yuyv_to_rgb(&[128, 128, 128, 128, 7, 7]);

        assert_eq!(rgb.len(), 6);
    }

    #[tokio::test]
    async fn capture_without_open_returns_none() {
        let mut camera = UsbCamera::new(0, 640, 480);

        assert!(!camera.is_open());
        assert!(camera.capture().await.is_none());
    }
}
