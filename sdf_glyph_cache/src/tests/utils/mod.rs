// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod backend;
mod rasterizer;
mod samples;

use alloc::vec::Vec;

use crate::backend::{ResourceUpdate, ResourceUpdateBatch};
use crate::cache::DistanceFieldGlyphCache;

pub(crate) use backend::MockBackend;
pub(crate) use rasterizer::MockRasterizer;
pub(crate) use samples::{font_with_table, qtdf_table, sample_cache};

/// Commits the cache's resource updates and returns them in order.
pub(crate) fn drain_updates(cache: &mut DistanceFieldGlyphCache<u32>) -> Vec<ResourceUpdate<u32>> {
    let mut batch = ResourceUpdateBatch::new();
    cache.commit_resource_updates(&mut batch);
    batch.take()
}
