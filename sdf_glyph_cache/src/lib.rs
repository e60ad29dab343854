// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A signed distance field glyph cache backed by GPU textures.
//!
//! The cache packs distance-field glyph bitmaps into one or more textures of
//! equal size, keeps track of which glyphs are in use, evicts unused glyphs
//! when the atlas runs out of space, and prepares texture uploads for the
//! renderer to submit. It can also be seeded from a pregenerated `qtdf` table
//! embedded in a font file, which skips rasterization for those glyphs.
//!
//! The crate never talks to a GPU API directly. Texture creation and release
//! go through [`TextureBackend`], rasterization through
//! [`DistanceFieldRasterizer`], and all uploads and copies are collected into
//! a [`ResourceUpdateBatch`] that the renderer drains when it is ready.
//!
//! A frame typically looks like this:
//!
//! 1. [`DistanceFieldGlyphCache::populate`] for the glyphs about to be drawn.
//! 2. [`DistanceFieldGlyphCache::update`] to rasterize and store new glyphs.
//! 3. [`DistanceFieldGlyphCache::commit_resource_updates`] into the frame's
//!    resource batch, before the draw calls that sample the atlas.
//! 4. [`DistanceFieldGlyphCache::release`] once the text is no longer shown.
//!
//! ## Features
//!
//! - `std` (enabled by default): Get floating point functions from the standard library
//!   (likely using your target's libc). Also enables [`CacheConfig::from_env`]
//!   and load timing in the debug log.
//! - `libm`: Use floating point implementations from [libm].
//!
//! At least one of `std` and `libm` is required; `std` overrides `libm`.
//!
//! [libm]: https://crates.io/crates/libm

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

#[cfg(not(any(feature = "std", feature = "libm")))]
compile_error!("sdf_glyph_cache requires either the `std` or `libm` feature to be enabled");

extern crate alloc;

pub use kurbo;

pub mod area_allocator;
pub mod atlas;
pub mod backend;
pub mod cache;
pub mod config;
pub mod distance_field;
pub mod glyph;
pub mod pregenerated;

#[cfg(test)]
mod tests;

pub use area_allocator::{AllocatorError, AreaAllocator, AtlasRect};
pub use atlas::{TextureAtlas, TextureInfo};
pub use backend::{
    BackendFeature, ResourceUpdate, ResourceUpdateBatch, TextureBackend, TextureDescriptor,
    TextureFormat, UploadEntry,
};
pub use cache::DistanceFieldGlyphCache;
pub use config::CacheConfig;
pub use distance_field::{DistanceField, DistanceFieldRasterizer};
pub use glyph::{GlyphRecord, GlyphRecordStore, TexCoord};
pub use pregenerated::{LoadError, PregeneratedCache, TextureRecord};
