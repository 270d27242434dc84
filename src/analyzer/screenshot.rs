//! Screenshots with marked elements outlined, so the model can tie element ids to what it sees.

use crate::dom::{BoundingBox, ElementNode};
use crate::error::{Result, ScrapeError};
use image::{ImageOutputFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;

const PALETTE: [[u8; 4]; 6] = [
    [230, 25, 75, 255],
    [60, 180, 75, 255],
    [0, 130, 200, 255],
    [245, 130, 48, 255],
    [145, 30, 180, 255],
    [240, 50, 230, 255],
];

/// Clip a CSS-pixel box (scaled to image pixels) to the image bounds
fn to_rect(bbox: &BoundingBox, scale: f64, width: u32, height: u32) -> Option<Rect> {
    if !bbox.is_visible() {
        return None;
    }
    let left = (bbox.x * scale).max(0.0);
    let top = (bbox.y * scale).max(0.0);
    let right = ((bbox.x + bbox.width) * scale).min(width as f64);
    let bottom = ((bbox.y + bbox.height) * scale).min(height as f64);
    if right - left < 1.0 || bottom - top < 1.0 {
        return None;
    }
    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
}

/// Outline every visible node of `nodes` on the PNG `screenshot`.
///
/// `scale` converts CSS pixels to screenshot pixels (the device pixel ratio).
pub fn annotate(screenshot: &[u8], nodes: &[&ElementNode], scale: f64) -> Result<Vec<u8>> {
    let mut canvas: RgbaImage = image::load_from_memory(screenshot)
        .map_err(|e| ScrapeError::Image(e.to_string()))?
        .to_rgba8();
    let (width, height) = canvas.dimensions();

    let mut drawn = 0;
    for node in nodes {
        let Some(rect) = node
            .bounding_box
            .as_ref()
            .and_then(|bbox| to_rect(bbox, scale, width, height))
        else {
            continue;
        };
        let color = Rgba(PALETTE[(node.marker.0 as usize) % PALETTE.len()]);
        draw_hollow_rect_mut(&mut canvas, rect, color);
        // Second outline for visibility on busy backgrounds
        if rect.width() > 2 && rect.height() > 2 {
            let inner = Rect::at(rect.left() + 1, rect.top() + 1).of_size(rect.width() - 2, rect.height() - 2);
            draw_hollow_rect_mut(&mut canvas, inner, color);
        }
        drawn += 1;
    }
    log::debug!("Annotated {} of {} elements", drawn, nodes.len());

    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut out, ImageOutputFormat::Png)
        .map_err(|e| ScrapeError::Image(e.to_string()))?;
    Ok(out.into_inner())
}
