// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-channel distance-field bitmaps and the rasterizer seam.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;

/// Produces distance-field bitmaps for the glyphs of one font.
///
/// Computing the field from glyph outlines happens outside this crate; the
/// cache only needs glyph bounds to size atlas slots and a bitmap once a slot
/// has been found.
pub trait DistanceFieldRasterizer {
    /// Number of glyphs in the font, or 0 if unknown.
    fn glyph_count(&self) -> u32 {
        0
    }

    /// Bounds of the glyph outline at the reference pixel size.
    ///
    /// An empty rectangle marks a glyph with nothing to draw (a space, for
    /// instance); such glyphs never take atlas space.
    fn bounding_rect(&self, glyph_id: u32) -> Rect;

    /// Renders the glyph's distance field.
    ///
    /// The bitmap is expected to be the bounding rect grown by the
    /// distance-field radius on every side, rounded up to whole texels.
    fn rasterize(&mut self, glyph_id: u32, double_resolution: bool) -> DistanceField;
}

/// A single-channel 8-bit distance field, stored row by row.
#[derive(Clone, PartialEq, Eq)]
pub struct DistanceField {
    glyph: u32,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl DistanceField {
    /// Creates a zero-filled field.
    pub fn new(glyph: u32, width: u32, height: u32) -> Self {
        Self {
            glyph,
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Wraps existing pixels. Returns `None` if `data` is not exactly
    /// `width * height` bytes.
    pub fn from_data(glyph: u32, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize).then_some(Self {
            glyph,
            width,
            height,
            data,
        })
    }

    /// The glyph this field was rendered for.
    #[inline]
    pub fn glyph(&self) -> u32 {
        self.glyph
    }

    /// Width in texels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// All pixels, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the field and returns its pixels.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// One row of pixels.
    pub fn scan_line(&self, y: u32) -> &[u8] {
        let start = y as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }

    /// The value at `(x, y)`, or 0 outside the field.
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Copies a `width` by `height` window whose top-left corner sits at
    /// `(x, y)` in this field. Parts of the window outside the field are zero.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "offsets are clamped to the source field, which fits in memory"
    )]
    pub fn copy(&self, x: i32, y: i32, width: u32, height: u32) -> Self {
        let mut out = Self::new(self.glyph, width, height);
        let src_w = i64::from(self.width);
        let src_h = i64::from(self.height);
        let (x, y) = (i64::from(x), i64::from(y));
        let col_start = x.max(0);
        let col_end = (x + i64::from(width)).min(src_w);
        if col_start >= col_end {
            return out;
        }
        let len = (col_end - col_start) as usize;
        let dst_col = (col_start - x) as usize;
        for row in 0..i64::from(height) {
            let src_row = y + row;
            if src_row < 0 || src_row >= src_h {
                continue;
            }
            let src = (src_row * src_w + col_start) as usize;
            let dst = row as usize * width as usize + dst_col;
            out.data[dst..dst + len].copy_from_slice(&self.data[src..src + len]);
        }
        out
    }

    /// Writes `src` into this field with its top-left corner at `(x, y)`,
    /// clipped to this field's bounds.
    pub fn blit(&mut self, src: &Self, x: u32, y: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let len = src.width.min(self.width - x) as usize;
        let rows = src.height.min(self.height - y);
        for row in 0..rows {
            let dst = (y + row) as usize * self.width as usize + x as usize;
            self.data[dst..dst + len].copy_from_slice(&src.scan_line(row)[..len]);
        }
    }
}

impl fmt::Debug for DistanceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistanceField")
            .field("glyph", &self.glyph)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
