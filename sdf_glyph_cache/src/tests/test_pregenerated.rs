// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::area_allocator::AtlasRect;
use crate::backend::ResourceUpdate;
use crate::cache::DistanceFieldGlyphCache;
use crate::config::CacheConfig;
use crate::pregenerated::LoadError;

use super::utils::{
    MockBackend, MockRasterizer, drain_updates, font_with_table, qtdf_table, sample_cache,
};

fn loaded_cache(backend: &mut MockBackend) -> DistanceFieldGlyphCache<u32> {
    let mut cache = DistanceFieldGlyphCache::new(&*backend, CacheConfig::default());
    cache.load_pregenerated(backend, &sample_cache()).unwrap();
    cache
}

#[test]
fn loaded_glyphs_are_resident_and_unused() {
    let mut backend = MockBackend::new(256);
    let mut cache = loaded_cache(&mut backend);

    assert_eq!(cache.unused_glyphs().len(), 3);
    for glyph in [7, 42, 9] {
        assert!(cache.unused_glyphs().contains(&glyph));
    }
    assert!(!cache.is_active());
    assert!(cache.pending_glyphs().is_empty());
    assert_eq!(cache.max_texture_size(), 64);
    assert_eq!(cache.max_texture_count(), 3);
    assert_eq!(cache.pixel_size(), Some(54));
    assert!(!cache.double_glyph_resolution());
    assert_eq!(cache.glyph(42).unwrap().tex_coord.x, 18.5);

    assert_eq!(cache.texture_count(), 2);
    // The allocator still spans the two loaded textures only.
    assert_eq!(cache.allocator().unwrap().height(), 128);
    let info = cache.texture_info(1).unwrap();
    assert_eq!(info.size(), (16, 52));
    assert_eq!(info.allocated_area(), AtlasRect::new(0, 0, 16, 52));
    assert_eq!(info.padding(), Some(2));

    let updates = drain_updates(&mut cache);
    assert_eq!(updates.len(), 2);
    for (index, (update, value)) in updates.iter().zip([1_u8, 2]).enumerate() {
        let ResourceUpdate::Upload { texture, entries } = update else {
            panic!("expected an upload, got {update:?}");
        };
        assert_eq!(*texture as usize, index);
        assert!(entries[0].data.iter().all(|&pixel| pixel == value));
    }
}

#[test]
fn cache_in_use_refuses_a_load() {
    let mut backend = MockBackend::new(256);
    let rasterizer = MockRasterizer::new().with_slot(1, 32, 32);
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());
    cache.request_glyphs([1], &rasterizer);

    assert_eq!(
        cache.load_pregenerated(&mut backend, &sample_cache()),
        Err(LoadError::CacheInUse)
    );
    assert!(cache.unused_glyphs().is_empty());
    assert!(backend.created.is_empty());

    // Loading twice is refused as well.
    let mut cache = loaded_cache(&mut backend);
    assert_eq!(
        cache.load_pregenerated(&mut backend, &sample_cache()),
        Err(LoadError::CacheInUse)
    );
}

#[test]
fn loading_from_a_font() {
    let mut backend = MockBackend::new(256);
    let font = font_with_table(*b"qtdf", &qtdf_table());
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());
    assert_eq!(
        cache.load_pregenerated_from_font(&mut backend, &font, 0),
        Ok(true)
    );
    assert!(cache.glyph(9).is_some());

    let font = font_with_table(*b"name", &qtdf_table());
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());
    assert_eq!(
        cache.load_pregenerated_from_font(&mut backend, &font, 0),
        Ok(false)
    );
    assert!(cache.allocator().is_none());
}

#[test]
fn failed_load_leaves_the_cache_untouched() {
    let mut backend = MockBackend::new(256);
    let table = qtdf_table();
    let font = font_with_table(*b"qtdf", &table[..10]);
    let rasterizer = MockRasterizer::new().with_slot(1, 32, 32);
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());

    assert_eq!(
        cache.load_pregenerated_from_font(&mut backend, &font, 0),
        Err(LoadError::HeaderTooShort)
    );
    assert!(cache.allocator().is_none());
    assert_eq!(cache.max_texture_size(), 256);
    assert_eq!(cache.pixel_size(), None);

    cache.request_glyphs([1], &rasterizer);
    assert!(cache.glyph(1).is_some());
}

#[test]
fn table_with_an_oversized_texture_area_is_refused() {
    let mut backend = MockBackend::new(256);
    let mut pregenerated = sample_cache();
    pregenerated.textures[1].allocated_area = AtlasRect::new(u32::MAX - 4, 0, 16, 52);
    let font = font_with_table(*b"qtdf", &pregenerated.to_bytes());
    let mut rasterizer = MockRasterizer::new().with_slot(100, 64, 64);
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());

    assert_eq!(
        cache.load_pregenerated_from_font(&mut backend, &font, 0),
        Err(LoadError::InvalidTextureArea { index: 1 })
    );
    assert!(cache.allocator().is_none());
    assert!(backend.created.is_empty());

    cache.populate(&[100], &rasterizer);
    cache.update(&mut backend, &mut rasterizer);
    let record = cache.glyph(100).unwrap();
    assert_eq!(record.texture_index, 0);
    assert_eq!(cache.texture_info(0).unwrap().size(), (64, 64));
}

#[test]
fn unused_pregenerated_glyph_is_evicted() {
    let mut backend = MockBackend::new(256);
    let mut rasterizer = MockRasterizer::new().with_slot(100, 64, 64);
    let mut cache = loaded_cache(&mut backend);
    drain_updates(&mut cache);

    cache.reference_glyphs([7, 42]);
    cache.populate(&[100], &rasterizer);
    assert!(cache.glyph(9).is_none());
    let record = *cache.glyph(100).unwrap();
    assert_eq!(record.texture_index, 1);
    assert_eq!((record.tex_coord.x, record.tex_coord.y), (2.0, 2.0));

    cache.update(&mut backend, &mut rasterizer);
    assert_eq!(cache.texture_info(1).unwrap().size(), (64, 64));
    assert_eq!(backend.released, [1]);

    let updates = drain_updates(&mut cache);
    assert_eq!(updates.len(), 3);
    assert_eq!(
        updates[1],
        ResourceUpdate::Copy {
            destination: 2,
            source: 1,
        }
    );
}

#[test]
fn glyphs_of_a_missing_texture_are_dropped() {
    let mut backend = MockBackend::new(256);
    backend.fail_creation = true;
    let cache = loaded_cache(&mut backend);

    for glyph in [7, 42, 9] {
        assert!(cache.glyph(glyph).is_none());
    }
    assert!(cache.unused_glyphs().is_empty());
    assert!(cache.allocator().unwrap().is_empty());
    assert!(cache.texture(0).is_none());
}
