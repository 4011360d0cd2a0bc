//! Batch-apply tiled image or text watermarks with bounded transparency.
//!
//! A watermark (an image file or rendered text) is scaled relative to each
//! source image, faded to the requested opacity (never below 20%), repeated
//! edge to edge across the canvas (or placed once, see [`Placement`]) and
//! alpha-blended onto it. Grayscale, RGB
//! and RGBA sources keep their channel layout.
//!
//! # Quick Start
//!
//! ```no_run
//! use batch_watermark::{
//!     OpacityPercent, ProcessOptions, SizePercent, WatermarkEngine, WatermarkSpec,
//! };
//!
//! let spec = WatermarkSpec::Image { path: "logo.png".into() };
//! let engine = WatermarkEngine::new(
//!     &spec,
//!     SizePercent::new(15.0).unwrap(),
//!     OpacityPercent(50),
//!     ProcessOptions::default(),
//! )
//! .expect("failed to prepare watermark");
//! engine
//!     .process_file("photo.jpg".as_ref(), "photo_marked.jpg".as_ref())
//!     .unwrap();
//! ```
//!
//! # Batches
//!
//! [`spawn`] processes a whole folder on a worker thread, reporting progress
//! and honouring cancellation between files.
//!
//! ```no_run
//! use batch_watermark::{spawn, JobDescription, TextContent, TextWatermark, WatermarkSpec};
//!
//! let job = JobDescription {
//!     input_dir: "photos".into(),
//!     output_dir: "marked".into(),
//!     watermark: WatermarkSpec::Text(TextWatermark::new(TextContent::Plain(
//!         "CONFIDENTIAL".into(),
//!     ))),
//!     size: Default::default(),
//!     opacity: Default::default(),
//!     options: Default::default(),
//! };
//! let handle = spawn(job).unwrap();
//! for p in handle.progress() {
//!     println!("{}/{}", p.current, p.total);
//! }
//! let report = handle.join().unwrap();
//! println!("{}", report.summary());
//! ```

#![deny(missing_docs)]

pub mod batch;
pub mod blending;
mod engine;
pub mod error;
pub mod font;
pub mod geometry;
pub mod opacity;
pub mod settings;
pub mod text;
pub mod watermark;

pub use batch::{
    run, spawn, BatchHandle, BatchReport, BatchState, CancelToken, JobDescription, JobResult,
    JobStatus, Progress,
};
pub use engine::{
    is_supported_image, save_image, Placement, ProcessOptions, WatermarkEngine, CORNER_PADDING,
};
pub use error::{Error, ErrorKind, Result};
pub use geometry::SizePercent;
pub use opacity::OpacityPercent;
pub use settings::Settings;
pub use text::{TextContent, TextLayout, TextStyle, TextWatermark};
pub use watermark::{Watermark, WatermarkSpec};
