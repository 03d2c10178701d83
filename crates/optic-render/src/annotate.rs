//! Drawing of detections onto result images.

use crate::RenderError;
use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use optic_core::{BoundingBox, Keypoint, Pose};
use std::path::Path;

/// DejaVu Sans, used when no font file is configured or the configured one
/// cannot be loaded.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const JOINT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BONE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

const LABEL_SCALE: f32 = 24.0;
const LABEL_PADDING: u32 = 4;
const JOINT_RADIUS: i32 = 3;
/// How far past the frame edge a clipped box outline is placed.
const BOX_THICKNESS: i64 = 2;

/// Skeleton edges, indexed by the keypoint id that draws them.
///
/// Only keypoint ids below `JOINT_PAIRS.len()` draw a bone; higher ids
/// (the last ankle in a 17-point skeleton) only draw their joint.
pub const JOINT_PAIRS: [[usize; 2]; 16] = [
    [0, 1],
    [1, 3],
    [0, 2],
    [2, 4],
    [5, 6],
    [5, 7],
    [7, 9],
    [6, 8],
    [8, 10],
    [5, 11],
    [6, 12],
    [11, 12],
    [11, 13],
    [12, 14],
    [13, 15],
    [14, 16],
];

/// A single drawing instruction.
#[derive(Debug, Clone)]
pub enum Directive {
    /// Outline of a detection.
    Box(BoundingBox),
    /// Text on a filled background, anchored at a pixel position.
    Label { text: String, left: i32, top: i32 },
    /// Text stacked down from the image's top-left corner, one row per caption.
    Caption(String),
    /// Joints and skeleton of one pose; joints below `threshold` are skipped.
    Pose { pose: Pose, threshold: f32 },
}

/// Renders [`Directive`]s onto copies of source images.
pub struct Annotator {
    font: FontArc,
    scale: PxScale,
}

impl Annotator {
    /// Annotator rendering label text with the bundled font.
    pub fn bundled() -> Result<Self, RenderError> {
        let font = FontArc::try_from_slice(BUNDLED_FONT).map_err(|_| RenderError::BundledFont)?;
        Ok(Self::with_font(font))
    }

    /// Annotator rendering label text with the font at `path`.
    pub fn with_font_file(path: &Path) -> Result<Self, RenderError> {
        let bytes = std::fs::read(path).map_err(|source| RenderError::FontIo {
            path: path.to_path_buf(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|_| RenderError::InvalidFont(path.to_path_buf()))?;
        tracing::debug!(path = %path.display(), "loaded label font");
        Ok(Self::with_font(font))
    }

    /// Load the configured font, falling back to the bundled one.
    pub fn load(font_path: Option<&Path>) -> Result<Self, RenderError> {
        let Some(path) = font_path else {
            return Self::bundled();
        };
        match Self::with_font_file(path) {
            Ok(annotator) => Ok(annotator),
            Err(e) => {
                tracing::warn!(error = %e, "configured label font unavailable; using bundled font");
                Self::bundled()
            }
        }
    }

    fn with_font(font: FontArc) -> Self {
        Self {
            font,
            scale: PxScale::from(LABEL_SCALE),
        }
    }

    /// Apply `directives` in order to a clone of `source`.
    pub fn annotate(&self, source: &RgbImage, directives: &[Directive]) -> RgbImage {
        let mut frame = source.clone();
        let mut caption_top = 0i32;

        for directive in directives {
            match directive {
                Directive::Box(bbox) => self.draw_box(&mut frame, bbox),
                Directive::Label { text, left, top } => self.draw_label(&mut frame, text, *left, *top),
                Directive::Caption(text) => {
                    self.draw_label(&mut frame, text, 0, caption_top);
                    caption_top += self.label_size(text).1 as i32;
                }
                Directive::Pose { pose, threshold } => self.draw_pose(&mut frame, pose, *threshold),
            }
        }

        frame
    }

    /// Two-pixel outline at (left, top).
    ///
    /// Edges lying beyond the frame are moved to just outside it, so a box
    /// that overhangs the image keeps only its visible sides.
    fn draw_box(&self, frame: &mut RgbImage, bbox: &BoundingBox) {
        let (fw, fh) = (i64::from(frame.width()), i64::from(frame.height()));
        let x0 = bbox.left as i64;
        let y0 = bbox.top as i64;
        let x1 = x0.saturating_add((bbox.width as i64).max(1));
        let y1 = y0.saturating_add((bbox.height as i64).max(1));
        if x1 <= 0 || y1 <= 0 || x0 >= fw || y0 >= fh {
            tracing::debug!(?bbox, "box outside image; skipped");
            return;
        }

        let x0 = x0.max(-BOX_THICKNESS);
        let y0 = y0.max(-BOX_THICKNESS);
        let w = (x1.min(fw + BOX_THICKNESS) - x0) as u32;
        let h = (y1.min(fh + BOX_THICKNESS) - y0) as u32;
        let (x, y) = (x0 as i32, y0 as i32);

        draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(w, h), BOX_COLOR);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(frame, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), BOX_COLOR);
        }
    }

    /// Size of a label's background, padding included.
    fn label_size(&self, text: &str) -> (u32, u32) {
        let (w, h) = text_size(self.scale, &self.font, text);
        (w + 2 * LABEL_PADDING, h + 2 * LABEL_PADDING)
    }

    fn draw_label(&self, frame: &mut RgbImage, text: &str, left: i32, top: i32) {
        let (w, h) = self.label_size(text);
        let max_x = (frame.width() as i32 - w as i32).max(0);
        let max_y = (frame.height() as i32 - h as i32).max(0);
        let x = left.clamp(0, max_x);
        let y = top.clamp(0, max_y);

        draw_filled_rect_mut(frame, Rect::at(x, y).of_size(w.max(1), h.max(1)), LABEL_BACKGROUND);
        let pad = LABEL_PADDING as i32;
        draw_text_mut(frame, LABEL_TEXT_COLOR, x + pad, y + pad, self.scale, &self.font, text);
    }

    fn draw_pose(&self, frame: &mut RgbImage, pose: &Pose, threshold: f32) {
        for (id, point) in pose.confident_points(threshold) {
            if !near_frame(frame, point) {
                tracing::debug!(pose = pose.index, id, x = point.x, y = point.y, "joint off image; skipped");
                continue;
            }
            draw_filled_circle_mut(
                frame,
                (point.x as i32, point.y as i32),
                JOINT_RADIUS,
                JOINT_COLOR,
            );

            let Some([a, b]) = JOINT_PAIRS.get(id).copied() else {
                continue;
            };
            let (Some(pa), Some(pb)) = (pose.points.get(a), pose.points.get(b)) else {
                tracing::debug!(pose = pose.index, id, a, b, "bone endpoint missing; skipped");
                continue;
            };
            if !near_frame(frame, pa) || !near_frame(frame, pb) {
                continue;
            }
            let start = (pa.x.trunc(), pa.y.trunc());
            let end = (pb.x.trunc(), pb.y.trunc());
            draw_line_segment_mut(frame, start, end, BONE_COLOR);
            draw_line_segment_mut(frame, (start.0 + 1.0, start.1), (end.0 + 1.0, end.1), BONE_COLOR);
        }
    }
}

/// Whether `point` lies within one frame size of the image.
fn near_frame(frame: &RgbImage, point: &Keypoint) -> bool {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    point.x.is_finite()
        && point.y.is_finite()
        && (-w..=2.0 * w).contains(&point.x)
        && (-h..=2.0 * h).contains(&point.y)
}
