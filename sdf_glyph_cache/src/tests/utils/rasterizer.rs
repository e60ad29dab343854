// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::vec;
use alloc::vec::Vec;

use hashbrown::HashMap;
use kurbo::Rect;

use crate::distance_field::{DistanceField, DistanceFieldRasterizer};

/// Distance-field radius with default settings.
const RADIUS: f64 = 5.0;
/// Padding with default settings.
const PADDING: u32 = 2;

/// A rasterizer producing solid fields, with glyph bounds set per test.
///
/// Every pixel of glyph `g`'s field has the value `g + 1`, so uploads can be
/// traced back to their glyph.
#[derive(Debug, Default)]
pub(crate) struct MockRasterizer {
    pub(crate) glyph_count: u32,
    pub(crate) bounds: HashMap<u32, Rect>,
    /// Rows added below every field, making it taller than its bounds.
    pub(crate) extra_rows: u32,
    pub(crate) rasterized: Vec<u32>,
}

impl MockRasterizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Gives `glyph` bounds whose padded atlas slot is `width` by `height`.
    pub(crate) fn with_slot(mut self, glyph: u32, width: u32, height: u32) -> Self {
        self.set_slot(glyph, width, height);
        self
    }

    pub(crate) fn set_slot(&mut self, glyph: u32, width: u32, height: u32) {
        let extra = RADIUS * 2.0 + f64::from(PADDING * 2);
        let bounds = Rect::new(
            0.0,
            0.0,
            f64::from(width) - extra,
            f64::from(height) - extra,
        );
        self.bounds.insert(glyph, bounds);
    }
}

impl DistanceFieldRasterizer for MockRasterizer {
    fn glyph_count(&self) -> u32 {
        self.glyph_count
    }

    fn bounding_rect(&self, glyph_id: u32) -> Rect {
        self.bounds.get(&glyph_id).copied().unwrap_or(Rect::ZERO)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "test glyph sizes and ids are small"
    )]
    fn rasterize(&mut self, glyph_id: u32, _double_resolution: bool) -> DistanceField {
        self.rasterized.push(glyph_id);
        let bounds = self.bounding_rect(glyph_id);
        let width = (bounds.width() + RADIUS * 2.0).ceil() as u32;
        let height = (bounds.height() + RADIUS * 2.0).ceil() as u32 + self.extra_rows;
        let value = glyph_id as u8 + 1;
        DistanceField::from_data(
            glyph_id,
            width,
            height,
            vec![value; width as usize * height as usize],
        )
        .unwrap()
    }
}
