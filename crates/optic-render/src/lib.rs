//! optic-render — Result image annotation and output.
//!
//! Draws server detections (boxes, labels, pose skeletons) onto a copy of
//! the input image and writes it next to the other workflow outputs.

pub mod annotate;
pub mod output;

pub use annotate::{Annotator, Directive, JOINT_PAIRS};
pub use output::{result_path, save_annotated};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to read font {}: {source}", .path.display())]
    FontIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a usable TrueType/OpenType font: {}", .0.display())]
    InvalidFont(PathBuf),
    #[error("bundled label font failed to parse")]
    BundledFont,
    #[error("failed to create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source path {} has no file name", .0.display())]
    NoFileName(PathBuf),
    #[error("image write failed: {0}")]
    Image(#[from] image::ImageError),
}
