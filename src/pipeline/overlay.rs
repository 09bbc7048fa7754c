//! Debug overlays: block outlines drawn over the rendered page.
//!
//! Each block's normalised bbox is scaled to the raster size and outlined in
//! a colour keyed on the block type, with a small filled tab in the top-left
//! corner so adjacent blocks of different types stay distinguishable.

use crate::model::{BlockKind, PageLayout};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

/// Outline thickness in pixels.
const LINE_THICKNESS: u32 = 2;
const TAB_SIZE: u32 = 8;

/// Outline colour for a block type.
pub const fn block_color(kind: &BlockKind) -> Rgba<u8> {
    match kind {
        BlockKind::Title => Rgba([0, 102, 204, 255]),
        BlockKind::Heading { .. } => Rgba([0, 153, 255, 255]),
        BlockKind::Paragraph => Rgba([0, 153, 0, 255]),
        BlockKind::ListItem => Rgba([0, 204, 102, 255]),
        BlockKind::Table { .. } => Rgba([204, 102, 0, 255]),
        BlockKind::Figure => Rgba([204, 0, 0, 255]),
        BlockKind::Equation => Rgba([153, 0, 153, 255]),
        BlockKind::Caption => Rgba([102, 102, 102, 255]),
        BlockKind::Footer | BlockKind::Header => Rgba([153, 153, 153, 255]),
    }
}

/// Draw every block of `page` onto a copy of `raster`.
///
/// Boxes are clamped to the image; boxes that collapse to nothing after
/// clamping are skipped.
pub fn draw_overlay(raster: &DynamicImage, page: &PageLayout) -> RgbaImage {
    let mut img = raster.to_rgba8();
    let (width, height) = img.dimensions();

    for block in &page.blocks {
        let color = block_color(&block.kind);
        let scale = |v: f64, max: u32| (v.clamp(0.0, 1.0) * max as f64).round() as u32;
        let x0 = scale(block.bbox.x0, width);
        let y0 = scale(block.bbox.y0, height);
        let x1 = scale(block.bbox.x1, width);
        let y1 = scale(block.bbox.y1, height);
        let w = x1.saturating_sub(x0);
        let h = y1.saturating_sub(y0);
        if w == 0 || h == 0 {
            continue;
        }

        for t in 0..LINE_THICKNESS {
            let inner_w = w.saturating_sub(2 * t);
            let inner_h = h.saturating_sub(2 * t);
            if inner_w > 0 && inner_h > 0 {
                let rect = Rect::at((x0 + t) as i32, (y0 + t) as i32).of_size(inner_w, inner_h);
                draw_hollow_rect_mut(&mut img, rect, color);
            }
        }

        let tab = Rect::at(x0 as i32, y0 as i32).of_size(TAB_SIZE.min(w), TAB_SIZE.min(h));
        draw_filled_rect_mut(&mut img, tab, color);
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BBox, Block};

    fn layout(blocks: Vec<Block>) -> PageLayout {
        PageLayout {
            page_number: 1,
            width_px: 100,
            height_px: 100,
            blocks,
        }
    }

    #[test]
    fn outlines_use_type_colour() {
        let raster = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 100, Rgba([255; 4])));
        let page = layout(vec![Block {
            id: "t".into(),
            kind: BlockKind::Title,
            bbox: BBox::new(0.1, 0.1, 0.5, 0.5),
            text: Some("x".into()),
            conf: None,
        }]);
        let img = draw_overlay(&raster, &page);
        let title = block_color(&BlockKind::Title);
        // Left edge, below the tab.
        assert_eq!(*img.get_pixel(10, 30), title);
        // Interior untouched.
        assert_eq!(*img.get_pixel(30, 30), Rgba([255; 4]));
    }

    #[test]
    fn out_of_range_boxes_do_not_panic() {
        let raster = DynamicImage::ImageRgba8(RgbaImage::new(20, 10));
        let page = layout(vec![
            Block {
                id: "wide".into(),
                kind: BlockKind::Paragraph,
                bbox: BBox::new(-0.5, 0.2, 1.7, 2.0),
                text: None,
                conf: None,
            },
            Block {
                id: "inverted".into(),
                kind: BlockKind::Figure,
                bbox: BBox::new(0.8, 0.8, 0.2, 0.2),
                text: None,
                conf: None,
            },
        ]);
        let img = draw_overlay(&raster, &page);
        assert_eq!(img.dimensions(), (20, 10));
    }

    #[test]
    fn palette_distinguishes_content_types() {
        let kinds = [
            BlockKind::Title,
            BlockKind::Paragraph,
            BlockKind::Figure,
            BlockKind::Equation,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(block_color(a), block_color(b));
            }
        }
    }
}
