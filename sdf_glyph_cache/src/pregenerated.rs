// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reading and writing the `qtdf` font table.
//!
//! Fonts can carry a pregenerated glyph cache in a `qtdf` table: the packed
//! atlas textures, the state of the allocator that packed them and one record
//! per glyph. Loading it lets a renderer skip distance-field generation for
//! those glyphs entirely.
//!
//! All values are big-endian. The table starts with a 14-byte header
//!
//! | Offset | Type  | Field          |
//! |--------|-------|----------------|
//! | 0      | `u8`  | major version  |
//! | 1      | `u8`  | minor version  |
//! | 2      | `u16` | pixel size     |
//! | 4      | `u32` | texture size   |
//! | 8      | `u8`  | flags          |
//! | 9      | `u8`  | padding        |
//! | 10     | `u32` | glyph count    |
//!
//! followed by the serialized [`AreaAllocator`], one 17-byte record per
//! texture, one 46-byte record per glyph and finally the pixels of every
//! texture. The number of textures is the allocator height divided by the
//! texture size. Glyph coordinates are 16.16 fixed point.

#[cfg(feature = "libm")]
#[allow(unused_imports, reason = "only needed when `std` is disabled")]
use core_maths::CoreFloat;

use alloc::borrow::Cow;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;
use read_fonts::{
    FontData, FontRef,
    types::{Scalar, Tag},
};

use crate::area_allocator::{AllocatorError, AreaAllocator, AtlasRect};
use crate::glyph::{GlyphRecord, TexCoord};

/// Tag of the font table holding a pregenerated cache.
pub const QTDF_TAG: Tag = Tag::new(b"qtdf");

/// Major version of the table format.
pub const MAJOR_VERSION: u8 = 5;
/// Minor version of the table format.
pub const MINOR_VERSION: u8 = 12;

const HEADER_SIZE: usize = 14;
const TEXTURE_RECORD_SIZE: usize = 17;
const GLYPH_RECORD_SIZE: usize = 46;

/// Header flag marking glyphs rendered at double resolution.
const FLAG_DOUBLE_GLYPH_RESOLUTION: u8 = 1;

const FIXED_ONE: f64 = 65536.0;

/// An error returned when a pregenerated cache cannot be loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoadError {
    /// The font data could not be parsed.
    InvalidFont,
    /// The table is shorter than its header.
    HeaderTooShort,
    /// The table has a version other than 5.12.
    UnsupportedVersion {
        /// Major version found in the table.
        major: u8,
        /// Minor version found in the table.
        minor: u8,
    },
    /// The header's pixel size is zero.
    InvalidPixelSize,
    /// The header's texture size is zero or out of range.
    InvalidTextureSize,
    /// The embedded allocator could not be decoded.
    Allocator(AllocatorError),
    /// The allocator height is not a whole number of textures.
    AllocatorSizeMismatch {
        /// Height of the allocator region.
        height: u32,
        /// Texture size from the header.
        texture_size: u32,
    },
    /// The allocator is wider than a texture.
    AllocatorTooWide {
        /// Width of the allocator region.
        width: u32,
        /// Texture size from the header.
        texture_size: u32,
    },
    /// The table ends before the texture records, glyph records or pixel
    /// data it announces.
    TableTooSmall,
    /// A texture's allocated area reaches past the texture size.
    InvalidTextureArea {
        /// Index of the texture record.
        index: u32,
    },
    /// A glyph refers to a texture that does not exist.
    InvalidTextureIndex {
        /// Texture index found in the glyph record.
        index: u32,
        /// Number of textures in the table.
        count: u32,
    },
    /// A glyph's padded slot reaches past the edge of its texture.
    InvalidGlyphPlacement {
        /// Id of the glyph.
        glyph: u32,
    },
    /// The cache already allocated glyphs, so a pregenerated cache can no
    /// longer be loaded into it.
    CacheInUse,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFont => f.write_str("invalid font data"),
            Self::HeaderTooShort => f.write_str("qtdf table too short to fit its header"),
            Self::UnsupportedVersion { major, minor } => {
                write!(f, "unsupported qtdf table version {major}.{minor}")
            }
            Self::InvalidPixelSize => f.write_str("invalid pixel size in qtdf table"),
            Self::InvalidTextureSize => f.write_str("invalid texture size in qtdf table"),
            Self::Allocator(err) => write!(f, "invalid allocator in qtdf table: {err}"),
            Self::AllocatorSizeMismatch {
                height,
                texture_size,
            } => write!(
                f,
                "allocator height {height} is not a multiple of the texture size {texture_size}"
            ),
            Self::AllocatorTooWide {
                width,
                texture_size,
            } => write!(
                f,
                "allocator width {width} exceeds the texture size {texture_size}"
            ),
            Self::TableTooSmall => f.write_str("qtdf table too small"),
            Self::InvalidTextureArea { index } => {
                write!(f, "allocated area of texture {index} exceeds the texture size")
            }
            Self::InvalidTextureIndex { index, count } => {
                write!(f, "invalid texture index {index} (texture count is {count})")
            }
            Self::InvalidGlyphPlacement { glyph } => {
                write!(f, "glyph {glyph} lies outside its texture")
            }
            Self::CacheInUse => {
                f.write_str("a pregenerated cache must be loaded before the cache is used")
            }
        }
    }
}

impl core::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Allocator(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AllocatorError> for LoadError {
    fn from(err: AllocatorError) -> Self {
        Self::Allocator(err)
    }
}

/// Texture record of a pregenerated cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureRecord {
    /// Area of the texture covered by glyphs. Its size is also the size of
    /// the texture's pixel data.
    pub allocated_area: AtlasRect,
    /// Padding around the glyphs in this texture.
    pub padding: u8,
}

/// A decoded `qtdf` table.
///
/// Texture pixels borrow from the table when parsed, and can be owned when a
/// cache is assembled for writing.
#[derive(Clone)]
pub struct PregeneratedCache<'a> {
    /// Pixel size the glyphs were rendered at.
    pub pixel_size: u16,
    /// Size of every texture; also the allocator's page height.
    pub texture_size: u32,
    /// Raw header flags.
    pub flags: u8,
    /// Padding the cache was generated with.
    pub padding: u8,
    /// Occupancy of the textures, stacked vertically.
    pub allocator: AreaAllocator,
    /// One record per texture, in index order.
    pub textures: Vec<TextureRecord>,
    /// One record per glyph.
    pub glyphs: Vec<GlyphRecord>,
    /// Pixels of every texture, `allocated_area.width * allocated_area.height`
    /// bytes each, in index order.
    pub texture_data: Vec<Cow<'a, [u8]>>,
}

impl<'a> PregeneratedCache<'a> {
    /// Decodes a `qtdf` table.
    ///
    /// The whole table is validated before anything is returned. Bytes after
    /// the last texture are ignored.
    pub fn parse(table: &'a [u8]) -> Result<Self, LoadError> {
        let data = FontData::new(table);
        if data.len() < HEADER_SIZE {
            log::warn!("qtdf table too short to fit its header");
            return Err(LoadError::HeaderTooShort);
        }
        let major = read::<u8>(data, 0)?;
        let minor = read::<u8>(data, 1)?;
        if (major, minor) != (MAJOR_VERSION, MINOR_VERSION) {
            log::warn!("unsupported qtdf table version {major}.{minor}");
            return Err(LoadError::UnsupportedVersion { major, minor });
        }
        let pixel_size = read::<u16>(data, 2)?;
        let texture_size = read::<u32>(data, 4)?;
        let flags = read::<u8>(data, 8)?;
        let padding = read::<u8>(data, 9)?;
        let glyph_count = read::<u32>(data, 10)?;
        if pixel_size == 0 {
            log::warn!("invalid pixel size in qtdf table");
            return Err(LoadError::InvalidPixelSize);
        }
        if texture_size == 0 || i32::try_from(texture_size).is_err() {
            log::warn!("invalid texture size {texture_size} in qtdf table");
            return Err(LoadError::InvalidTextureSize);
        }

        let (allocator, allocator_len) = AreaAllocator::deserialize(&table[HEADER_SIZE..])?;
        let height = allocator.height();
        if height % texture_size != 0 {
            log::warn!("allocator height {height} does not match texture size {texture_size}");
            return Err(LoadError::AllocatorSizeMismatch {
                height,
                texture_size,
            });
        }
        let width = allocator.width();
        if width > texture_size {
            log::warn!("allocator width {width} exceeds texture size {texture_size}");
            return Err(LoadError::AllocatorTooWide {
                width,
                texture_size,
            });
        }
        let texture_count = height / texture_size;

        let mut offset = HEADER_SIZE + allocator_len;
        ensure_remaining(data, offset, texture_count as usize, TEXTURE_RECORD_SIZE)?;
        let mut textures = Vec::with_capacity(texture_count as usize);
        for index in 0..texture_count {
            let texture = TextureRecord {
                allocated_area: AtlasRect::new(
                    read(data, offset)?,
                    read(data, offset + 4)?,
                    read(data, offset + 8)?,
                    read(data, offset + 12)?,
                ),
                padding: read(data, offset + 16)?,
            };
            if !fits_in_texture(texture.allocated_area, texture_size) {
                log::warn!(
                    "allocated area {:?} of texture {index} exceeds texture size {texture_size}",
                    texture.allocated_area
                );
                return Err(LoadError::InvalidTextureArea { index });
            }
            textures.push(texture);
            offset += TEXTURE_RECORD_SIZE;
        }

        ensure_remaining(data, offset, glyph_count as usize, GLYPH_RECORD_SIZE)?;
        let mut glyphs = Vec::with_capacity(glyph_count as usize);
        for _ in 0..glyph_count {
            let glyph = read_glyph(data, offset)?;
            if glyph.texture_index >= texture_count {
                log::warn!(
                    "invalid texture index {} (texture count is {texture_count}) in qtdf table",
                    glyph.texture_index
                );
                return Err(LoadError::InvalidTextureIndex {
                    index: glyph.texture_index,
                    count: texture_count,
                });
            }
            let padding = textures[glyph.texture_index as usize].padding;
            let local = GlyphRecord {
                texture_index: 0,
                ..glyph
            }
            .atlas_rect(padding.into(), texture_size);
            if !fits_in_texture(local, texture_size) {
                log::warn!(
                    "glyph {} at {local:?} lies outside texture {}",
                    glyph.glyph_id,
                    glyph.texture_index
                );
                return Err(LoadError::InvalidGlyphPlacement {
                    glyph: glyph.glyph_id,
                });
            }
            glyphs.push(glyph);
            offset += GLYPH_RECORD_SIZE;
        }

        let mut texture_data = Vec::with_capacity(textures.len());
        for texture in &textures {
            let area = texture.allocated_area;
            let pixels = (area.width as usize)
                .checked_mul(area.height as usize)
                .and_then(|len| table.get(offset..offset.checked_add(len)?))
                .ok_or_else(|| {
                    log::warn!("qtdf table too small for the pixels of its textures");
                    LoadError::TableTooSmall
                })?;
            texture_data.push(Cow::Borrowed(pixels));
            offset += pixels.len();
        }

        Ok(Self {
            pixel_size,
            texture_size,
            flags,
            padding,
            allocator,
            textures,
            glyphs,
            texture_data,
        })
    }

    /// Finds and decodes the `qtdf` table of font `index` in `font_data`.
    ///
    /// Returns `Ok(None)` when the font has no such table.
    pub fn from_font(font_data: &'a [u8], index: u32) -> Result<Option<Self>, LoadError> {
        let font = FontRef::from_index(font_data, index).map_err(|_| LoadError::InvalidFont)?;
        match font.table_data(QTDF_TAG) {
            Some(table) if !table.is_empty() => Self::parse(table.as_bytes()).map(Some),
            _ => Ok(None),
        }
    }

    /// Whether the glyphs were rendered at double resolution.
    pub fn double_glyph_resolution(&self) -> bool {
        self.flags == FLAG_DOUBLE_GLYPH_RESOLUTION
    }

    /// Number of textures.
    pub fn texture_count(&self) -> u32 {
        self.allocator.height() / self.texture_size.max(1)
    }

    /// Encodes the cache as a `qtdf` table.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "glyph counts and texture indices are bounded by the format"
    )]
    pub fn to_bytes(&self) -> Vec<u8> {
        let allocator = self.allocator.serialize();
        let pixels: usize = self.texture_data.iter().map(|data| data.len()).sum();
        let mut out = Vec::with_capacity(
            HEADER_SIZE
                + allocator.len()
                + TEXTURE_RECORD_SIZE * self.textures.len()
                + GLYPH_RECORD_SIZE * self.glyphs.len()
                + pixels,
        );
        out.push(MAJOR_VERSION);
        out.push(MINOR_VERSION);
        out.extend_from_slice(&self.pixel_size.to_be_bytes());
        out.extend_from_slice(&self.texture_size.to_be_bytes());
        out.push(self.flags);
        out.push(self.padding);
        out.extend_from_slice(&(self.glyphs.len() as u32).to_be_bytes());
        out.extend_from_slice(&allocator);

        for texture in &self.textures {
            let area = texture.allocated_area;
            for value in [area.x, area.y, area.width, area.height] {
                out.extend_from_slice(&value.to_be_bytes());
            }
            out.push(texture.padding);
        }

        for glyph in &self.glyphs {
            let tc = &glyph.tex_coord;
            let rect = &glyph.bounding_rect;
            out.extend_from_slice(&glyph.glyph_id.to_be_bytes());
            for value in [tc.x, tc.y, tc.width, tc.height, tc.x_margin, tc.y_margin] {
                out.extend_from_slice(&to_fixed(value).to_be_bytes());
            }
            out.extend_from_slice(&to_signed_fixed(rect.x0).to_be_bytes());
            out.extend_from_slice(&to_signed_fixed(rect.y0).to_be_bytes());
            out.extend_from_slice(&to_fixed(rect.width()).to_be_bytes());
            out.extend_from_slice(&to_fixed(rect.height()).to_be_bytes());
            out.extend_from_slice(&(glyph.texture_index as u16).to_be_bytes());
        }

        for data in &self.texture_data {
            out.extend_from_slice(data);
        }
        out
    }
}

impl fmt::Debug for PregeneratedCache<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PregeneratedCache")
            .field("pixel_size", &self.pixel_size)
            .field("texture_size", &self.texture_size)
            .field("flags", &self.flags)
            .field("padding", &self.padding)
            .field("allocator", &self.allocator)
            .field("textures", &self.textures)
            .field("glyphs", &self.glyphs.len())
            .finish_non_exhaustive()
    }
}

fn read<T: Scalar>(data: FontData<'_>, offset: usize) -> Result<T, LoadError> {
    data.read_at(offset).map_err(|_| {
        log::warn!("qtdf table too small");
        LoadError::TableTooSmall
    })
}

/// Fails unless `count` records of `size` bytes fit after `offset`.
fn ensure_remaining(
    data: FontData<'_>,
    offset: usize,
    count: usize,
    size: usize,
) -> Result<(), LoadError> {
    let needed = count.checked_mul(size).ok_or(LoadError::TableTooSmall)?;
    if data.len().saturating_sub(offset) < needed {
        log::warn!("qtdf table too small for its {count} records");
        return Err(LoadError::TableTooSmall);
    }
    Ok(())
}

/// Whether `rect` lies within a `texture_size` square at the origin.
fn fits_in_texture(rect: AtlasRect, texture_size: u32) -> bool {
    let right = rect.x.checked_add(rect.width);
    let bottom = rect.y.checked_add(rect.height);
    right.is_some_and(|right| right <= texture_size)
        && bottom.is_some_and(|bottom| bottom <= texture_size)
}

fn read_glyph(data: FontData<'_>, offset: usize) -> Result<GlyphRecord, LoadError> {
    let fixed = |at: usize| read::<u32>(data, offset + at).map(from_fixed);
    let signed_fixed = |at: usize| read::<i32>(data, offset + at).map(from_signed_fixed);
    let tex_coord = TexCoord {
        x: fixed(4)?,
        y: fixed(8)?,
        width: fixed(12)?,
        height: fixed(16)?,
        x_margin: fixed(20)?,
        y_margin: fixed(24)?,
    };
    let origin = (signed_fixed(28)?, signed_fixed(32)?);
    let size = (fixed(36)?, fixed(40)?);
    Ok(GlyphRecord {
        glyph_id: read(data, offset)?,
        tex_coord,
        bounding_rect: Rect::from_origin_size(origin, size),
        texture_index: read::<u16>(data, offset + 44)?.into(),
    })
}

fn from_fixed(value: u32) -> f64 {
    f64::from(value) / FIXED_ONE
}

fn from_signed_fixed(value: i32) -> f64 {
    f64::from(value) / FIXED_ONE
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "16.16 values decoded from a table convert back exactly"
)]
fn to_fixed(value: f64) -> u32 {
    (value * FIXED_ONE).round() as u32
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "16.16 values decoded from a table convert back exactly"
)]
fn to_signed_fixed(value: f64) -> i32 {
    (value * FIXED_ONE).round() as i32
}
