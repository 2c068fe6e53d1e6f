// SPDX-License-Identifier: CEPL-1.0
pub mod geometry;
pub mod uniform;

pub use geometry::{Position, QUAD_STRIP};
pub use uniform::{CubeUniform, UNIFORM_LAYOUT_VERSION};
