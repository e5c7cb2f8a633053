//! Inkboard Render Library
//!
//! CPU rasterization for Inkboard built on tiny-skia: the static and live
//! raster layers, the render scheduler that keeps them current, snapshot
//! compaction, PNG export and the [`Session`] that ties them to input and history.

pub mod cache;
pub mod codec;
pub mod compact;
mod error;
pub mod export;
pub mod scheduler;
pub mod session;
pub mod surface;

pub use cache::ImageCache;
pub use compact::{Compacted, rasterize};
pub use error::{RenderError, RenderResult, SessionError};
pub use export::{ExportedImage, export};
pub use scheduler::{RenderScheduler, RepaintKind};
pub use session::Session;
pub use surface::{PaintMode, RasterSurface, opaque_bounds};
