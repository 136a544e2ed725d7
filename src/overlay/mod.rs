//! Overlay boundary: frame sources in, composed frames out.

pub mod compositor;
pub mod frame;

pub use compositor::{LoggingCompositor, OverlayCompositor};
pub use frame::{FrameSource, LatestFrameGrabber, SyntheticFrameSource, VideoFrame};
