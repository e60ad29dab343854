// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cache configuration.

/// Distance-field radius at the reference scale, in font units.
pub const DEFAULT_RADIUS: u32 = 80;

/// Reference scale the radius is expressed at.
pub const DEFAULT_SCALE: u32 = 16;

/// Radius used for narrow-outline glyphs rendered at double resolution.
pub const NARROW_OUTLINE_RADIUS: u32 = DEFAULT_RADIUS / 4;

/// Scale used for narrow-outline glyphs rendered at double resolution.
pub const NARROW_OUTLINE_SCALE: u32 = DEFAULT_SCALE / 4;

/// Empty texels kept around every glyph slot.
pub const DEFAULT_PADDING: u32 = 2;

/// Number of textures the atlas may grow to.
pub const DEFAULT_MAX_TEXTURE_COUNT: u32 = 3;

/// Glyph count above which a font counts as large.
pub const DEFAULT_HIGH_GLYPH_COUNT: u32 = 2000;

/// Environment variable that forces the texture resize workaround.
#[cfg(feature = "std")]
pub const RESIZE_WORKAROUND_ENV: &str = "SDF_GLYPH_CACHE_RESIZE_WORKAROUND";

/// Environment variable that enables full-size textures for large fonts.
#[cfg(feature = "std")]
pub const FULL_SIZE_TEXTURES_ENV: &str = "SDF_GLYPH_CACHE_FULL_SIZE_TEXTURES";

/// Settings for a [`DistanceFieldGlyphCache`](crate::DistanceFieldGlyphCache).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Empty texels kept around every glyph slot so that bilinear sampling
    /// never bleeds into a neighbour.
    pub padding: u32,
    /// Number of textures the atlas may grow to.
    pub max_texture_count: u32,
    /// Texture size override. `None` uses the backend's limit; a value
    /// larger than the backend's limit is clamped to it.
    pub max_texture_size: Option<u32>,
    /// Always grow textures by re-uploading a CPU-side copy instead of a GPU
    /// copy, even when the backend supports texture copies.
    pub force_resize_workaround: bool,
    /// Create textures at their final size right away for fonts with more
    /// than [`high_glyph_count`](Self::high_glyph_count) glyphs.
    pub prefer_full_size_textures: bool,
    /// Glyph count above which [`prefer_full_size_textures`] applies.
    ///
    /// [`prefer_full_size_textures`]: Self::prefer_full_size_textures
    pub high_glyph_count: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            padding: DEFAULT_PADDING,
            max_texture_count: DEFAULT_MAX_TEXTURE_COUNT,
            max_texture_size: None,
            force_resize_workaround: false,
            prefer_full_size_textures: false,
            high_glyph_count: DEFAULT_HIGH_GLYPH_COUNT,
        }
    }
}

impl CacheConfig {
    /// The default configuration with the environment overrides applied.
    ///
    /// Both variables are read as integers; any non-zero value enables the
    /// option and anything unparsable leaves the default.
    #[cfg(feature = "std")]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    #[cfg(feature = "std")]
    fn with_overrides(mut self, var: impl Fn(&str) -> Option<std::string::String>) -> Self {
        let flag = |name: &str| {
            var(name)
                .and_then(|value| value.trim().parse::<i64>().ok())
                .map(|value| value != 0)
        };
        if let Some(enabled) = flag(RESIZE_WORKAROUND_ENV) {
            self.force_resize_workaround = enabled;
        }
        if let Some(enabled) = flag(FULL_SIZE_TEXTURES_ENV) {
            self.prefer_full_size_textures = enabled;
        }
        self
    }
}

/// Distance-field spread in texels.
///
/// Double resolution uses the narrow-outline radius and scale, which give the
/// same spread as the defaults.
pub fn distance_field_radius(double_glyph_resolution: bool) -> f64 {
    let (radius, scale) = if double_glyph_resolution {
        (NARROW_OUTLINE_RADIUS, NARROW_OUTLINE_SCALE)
    } else {
        (DEFAULT_RADIUS, DEFAULT_SCALE)
    };
    f64::from(radius) / f64::from(scale)
}
