pub mod configure;
pub mod frame;
pub mod settings;

pub use configure::{configure, ConfiguredCamera};
pub use frame::{FrameMeta, Image, PixelFormat};
