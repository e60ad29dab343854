// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::cache::DistanceFieldGlyphCache;
use crate::config::CacheConfig;

use super::utils::{MockBackend, MockRasterizer};

const A: u32 = 1;
const B: u32 = 2;
const X: u32 = 5;

#[test]
fn references_are_counted_per_occurrence() {
    let rasterizer = MockRasterizer::new().with_slot(A, 32, 32);
    let backend = MockBackend::new(256);
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());

    cache.populate(&[A, A], &rasterizer);
    assert!(cache.referenced_glyphs().contains(&A));
    assert_eq!(cache.pending_glyphs(), &[A]);

    cache.release(&[A]);
    assert!(cache.referenced_glyphs().contains(&A));
    assert!(cache.unused_glyphs().is_empty());

    cache.release(&[A]);
    assert!(!cache.is_active());
    assert!(cache.unused_glyphs().contains(&A));
    assert!(cache.glyph(A).is_some());

    // Nothing left to release.
    cache.release(&[A]);
    assert!(cache.unused_glyphs().contains(&A));

    // Drawing it again takes it out of the eviction pool.
    cache.populate(&[A], &rasterizer);
    assert!(cache.unused_glyphs().is_empty());
    assert!(cache.is_active());
}

#[test]
fn glyphs_outside_the_font_are_skipped() {
    let mut rasterizer = MockRasterizer::new()
        .with_slot(3, 32, 32)
        .with_slot(12, 32, 32);
    rasterizer.glyph_count = 10;
    let backend = MockBackend::new(256);
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());

    cache.populate(&[3, 12], &rasterizer);
    assert!(cache.referenced_glyphs().contains(&3));
    assert!(!cache.referenced_glyphs().contains(&12));
    assert_eq!(cache.pending_glyphs(), &[3]);

    // Unbalanced releases are harmless.
    cache.release(&[12]);
    assert!(cache.referenced_glyphs().contains(&3));
}

#[test]
fn empty_glyphs_take_no_space() {
    let rasterizer = MockRasterizer::new();
    let backend = MockBackend::new(256);
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());

    cache.populate(&[A], &rasterizer);
    assert!(cache.referenced_glyphs().contains(&A));
    assert!(cache.glyph(A).is_none());
    assert!(cache.pending_glyphs().is_empty());

    cache.release(&[A]);
    assert!(!cache.is_active());
    assert!(cache.unused_glyphs().is_empty());
}

#[test]
fn failed_requests_wait_for_the_next_update() {
    let mut backend = MockBackend::new(256);
    let mut rasterizer = MockRasterizer::new()
        .with_slot(X, 256, 256)
        .with_slot(A, 64, 64);
    let config = CacheConfig {
        max_texture_count: 1,
        ..CacheConfig::default()
    };
    let mut cache = DistanceFieldGlyphCache::new(&backend, config);

    cache.populate(&[X], &rasterizer);
    cache.populate(&[A], &rasterizer);
    assert!(cache.glyph(A).is_none());

    // Space frees up, but `A` was already requested this frame.
    cache.release(&[X]);
    cache.populate(&[A], &rasterizer);
    assert!(cache.glyph(A).is_none());
    assert!(cache.glyph(X).is_some());

    cache.update(&mut backend, &mut rasterizer);
    cache.populate(&[A], &rasterizer);
    assert!(cache.glyph(A).is_some());
    assert!(cache.glyph(X).is_none());
}

#[test]
fn update_rasterizes_pending_glyphs_in_order() {
    let mut backend = MockBackend::new(256);
    let mut rasterizer = MockRasterizer::new()
        .with_slot(A, 32, 32)
        .with_slot(B, 32, 32);
    let mut cache = DistanceFieldGlyphCache::new(&backend, CacheConfig::default());

    cache.populate(&[B, A], &rasterizer);
    cache.update(&mut backend, &mut rasterizer);
    assert_eq!(rasterizer.rasterized, [B, A]);
    assert!(cache.pending_glyphs().is_empty());

    // Resident glyphs are not rasterized again.
    cache.populate(&[A, B], &rasterizer);
    cache.update(&mut backend, &mut rasterizer);
    assert_eq!(rasterizer.rasterized, [B, A]);
    assert_eq!(backend.created.len(), 1);
}

#[test]
fn double_resolution_keeps_the_radius() {
    let backend = MockBackend::new(256);
    let mut cache = DistanceFieldGlyphCache::<u32>::new(&backend, CacheConfig::default());
    cache.set_double_glyph_resolution(true);
    assert!(cache.double_glyph_resolution());
    assert_eq!(cache.distance_field_radius(), 5.0);
}
