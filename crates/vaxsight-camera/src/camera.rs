//! Common interface implemented by every camera backend.

use async_trait::async_trait;
use image::RgbImage;

/// A frame source with an explicit open/close lifecycle.
///
/// Backends report hardware failures through their return values rather
/// than errors: `open` yields `false` when the device is unreachable and
/// `capture` yields `None` when a grab fails. The manager decides how to
/// degrade in both cases.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Opens the device. `false` means the hardware is unreachable.
    async fn open(&mut self) -> bool;

    /// Grabs one frame. `None` when the camera is not open or the grab
    /// failed.
    async fn capture(&mut self) -> Option<RgbImage>;

    /// Releases the device. Safe to call at any time.
    async fn close(&mut self);

    /// Whether the device is currently open.
    fn is_open(&self) -> bool;
}
