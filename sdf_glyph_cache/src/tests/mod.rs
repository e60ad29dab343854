// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod test_frame;
mod test_pregenerated;
pub(crate) mod utils;
