// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::vec::Vec;

use crate::backend::{BackendFeature, TextureBackend, TextureDescriptor};

/// A backend whose textures are numbered handles.
///
/// Records every creation and deferred release so tests can check the
/// resource lifecycle.
#[derive(Debug)]
pub(crate) struct MockBackend {
    pub(crate) max_texture_size: u32,
    pub(crate) texture_copy: bool,
    pub(crate) red_or_alpha8_is_red: bool,
    pub(crate) fail_creation: bool,
    pub(crate) created: Vec<TextureDescriptor>,
    pub(crate) released: Vec<u32>,
}

impl MockBackend {
    pub(crate) fn new(max_texture_size: u32) -> Self {
        Self {
            max_texture_size,
            texture_copy: true,
            red_or_alpha8_is_red: true,
            fail_creation: false,
            created: Vec::new(),
            released: Vec::new(),
        }
    }

    /// A backend that cannot copy textures safely, like GLES2.
    pub(crate) fn without_texture_copy(max_texture_size: u32) -> Self {
        Self {
            texture_copy: false,
            ..Self::new(max_texture_size)
        }
    }
}

impl TextureBackend for MockBackend {
    type Texture = u32;

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn is_feature_supported(&self, feature: BackendFeature) -> bool {
        match feature {
            BackendFeature::RedOrAlpha8IsRed => self.red_or_alpha8_is_red,
            BackendFeature::ScreenSpaceDerivatives => true,
            BackendFeature::TextureCopy => self.texture_copy,
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "tests create a handful of textures"
    )]
    fn create_texture(&mut self, descriptor: TextureDescriptor) -> Option<u32> {
        if self.fail_creation {
            return None;
        }
        self.created.push(descriptor);
        Some(self.created.len() as u32 - 1)
    }

    fn release_texture(&mut self, texture: u32) {
        assert!(
            !self.released.contains(&texture),
            "texture {texture} released twice"
        );
        self.released.push(texture);
    }
}
