use crate::RenderError;
use image::RgbImage;
use std::path::{Path, PathBuf};

/// `<output_dir>/result_<file name of source>`.
pub fn result_path(source: &Path, output_dir: &Path) -> Result<PathBuf, RenderError> {
    let name = source
        .file_name()
        .ok_or_else(|| RenderError::NoFileName(source.to_path_buf()))?;
    let mut file_name = std::ffi::OsString::from("result_");
    file_name.push(name);
    Ok(output_dir.join(file_name))
}

/// Write an annotated image for `source` into `output_dir`, creating it if needed.
///
/// The output format follows the source file's extension.
pub fn save_annotated(
    image: &RgbImage,
    source: &Path,
    output_dir: &Path,
) -> Result<PathBuf, RenderError> {
    std::fs::create_dir_all(output_dir).map_err(|source| RenderError::OutputDir {
        path: output_dir.to_path_buf(),
        source,
    })?;
    let path = result_path(source, output_dir)?;
    image.save(&path)?;
    tracing::info!(path = %path.display(), "saved result image");
    Ok(path)
}
