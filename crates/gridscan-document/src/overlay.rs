// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Debug overlay: detected cell outlines drawn over the scanned page.

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use tracing::debug;

use gridscan_core::types::{Grid, Quad};

/// Outline colours, cycled per row so neighbouring rows are told apart.
const ROW_COLOURS: [Rgba<u8>; 3] = [
    Rgba([0, 200, 0, 255]),
    Rgba([220, 0, 0, 255]),
    Rgba([0, 90, 230, 255]),
];

/// Anchor marker colour.
const ANCHOR_COLOUR: Rgba<u8> = Rgba([255, 160, 0, 255]);

/// Copy of `page` with every cell of `grid` outlined.
pub fn render_overlay(page: &DynamicImage, grid: &Grid) -> RgbaImage {
    let mut canvas = page.to_rgba8();
    for (r, _, quad) in grid.cells() {
        draw_quad(&mut canvas, quad, ROW_COLOURS[r % ROW_COLOURS.len()]);
    }
    debug!(rows = grid.len(), cells = grid.cell_count(), "Overlay rendered");
    canvas
}

fn draw_quad(canvas: &mut RgbaImage, quad: &Quad, colour: Rgba<u8>) {
    let points = quad.points();
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            canvas,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            colour,
        );
    }

    // Small cross on the anchor vertex.
    let anchor = quad.anchor();
    let (x, y) = (anchor.x as f32, anchor.y as f32);
    draw_line_segment_mut(canvas, (x - 3.0, y), (x + 3.0, y), ANCHOR_COLOUR);
    draw_line_segment_mut(canvas, (x, y - 3.0), (x, y + 3.0), ANCHOR_COLOUR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridscan_core::types::{Point, Row};
    use image::{Rgb, RgbImage};

    fn square(x: i32, y: i32, side: i32) -> Quad {
        Quad::new([
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ])
    }

    fn white_page() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([255, 255, 255])))
    }

    #[test]
    fn outlines_use_row_colours() {
        let grid = Grid::new(vec![
            Row::new(vec![square(20, 20, 40)]).unwrap(),
            Row::new(vec![square(20, 120, 40)]).unwrap(),
        ]);
        let overlay = render_overlay(&white_page(), &grid);

        assert_eq!(overlay.dimensions(), (200, 200));
        // Middle of the top edge of each square.
        assert_eq!(*overlay.get_pixel(40, 20), ROW_COLOURS[0]);
        assert_eq!(*overlay.get_pixel(40, 120), ROW_COLOURS[1]);
        // Interior untouched.
        assert_eq!(*overlay.get_pixel(40, 40), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn every_cell_in_a_row_shares_its_colour() {
        let grid = Grid::new(vec![
            Row::new(vec![square(10, 10, 40), square(110, 12, 40)]).unwrap(),
            Row::new(vec![square(10, 120, 40), square(110, 118, 40)]).unwrap(),
        ]);
        let overlay = render_overlay(&white_page(), &grid);
        assert_eq!(*overlay.get_pixel(30, 10), ROW_COLOURS[0]);
        assert_eq!(*overlay.get_pixel(130, 12), ROW_COLOURS[0]);
        assert_eq!(*overlay.get_pixel(30, 120), ROW_COLOURS[1]);
        assert_eq!(*overlay.get_pixel(130, 118), ROW_COLOURS[1]);
    }

    #[test]
    fn anchor_is_marked() {
        let grid = Grid::new(vec![Row::new(vec![square(50, 50, 40)]).unwrap()]);
        let overlay = render_overlay(&white_page(), &grid);
        assert_eq!(*overlay.get_pixel(50, 50), ANCHOR_COLOUR);
    }

    #[test]
    fn empty_grid_leaves_page_unchanged() {
        let page = white_page();
        let overlay = render_overlay(&page, &Grid::default());
        assert_eq!(overlay, page.to_rgba8());
    }

    #[test]
    fn out_of_bounds_quads_are_clipped() {
        let grid = Grid::new(vec![Row::new(vec![square(180, 180, 60)]).unwrap()]);
        let overlay = render_overlay(&white_page(), &grid);
        assert_eq!(*overlay.get_pixel(199, 180), ROW_COLOURS[0]);
    }
}
