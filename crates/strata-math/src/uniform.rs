// SPDX-License-Identifier: CEPL-1.0
//! Uniform block packing with a declared byte layout.
//!
//! Layout version 1 (all little-endian f32, std140-compatible offsets):
//!
//! | offset | size | field                          |
//! |--------|------|--------------------------------|
//! | 0      | 64   | `mvp`, column-major 4x4        |
//! | 64     | 576  | `position[36]`, vec4 each      |
//! | 640    | 576  | `attr[36]`, vec4 each          |
//!
//! The packed form never depends on how the compiler lays out [`CubeUniform`].
//!
//! Nothing in the Vulkan pipeline consumes this yet: the pipeline layout has no
//! descriptor sets, so the block is packed but never bound.

use glam::{Mat4, Vec4};

pub const UNIFORM_LAYOUT_VERSION: u32 = 1;

/// Vertices in the cube table (12 triangles).
pub const CUBE_VERTS: usize = 12 * 3;

const MAT4_BYTES: usize = 16 * 4;
const VEC4_BYTES: usize = 4 * 4;

#[derive(Clone, Debug, PartialEq)]
pub struct CubeUniform {
    pub mvp: Mat4,
    pub position: [Vec4; CUBE_VERTS],
    pub attr: [Vec4; CUBE_VERTS],
}

impl Default for CubeUniform {
    fn default() -> Self {
        Self {
            mvp: Mat4::IDENTITY,
            position: [Vec4::ZERO; CUBE_VERTS],
            attr: [Vec4::ZERO; CUBE_VERTS],
        }
    }
}

impl CubeUniform {
    pub const POSITION_OFFSET: usize = MAT4_BYTES;
    pub const ATTR_OFFSET: usize = Self::POSITION_OFFSET + CUBE_VERTS * VEC4_BYTES;
    pub const PACKED_SIZE: usize = Self::ATTR_OFFSET + CUBE_VERTS * VEC4_BYTES;

    /// Camera at `eye` looking at the origin, 45° vertical fov.
    pub fn looking_at_origin(eye: glam::Vec3, aspect: f32) -> Self {
        let proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 100.0);
        let view = Mat4::look_at_rh(eye, glam::Vec3::ZERO, glam::Vec3::Y);
        Self {
            mvp: proj * view,
            ..Self::default()
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::PACKED_SIZE);
        for f in self.mvp.to_cols_array() {
            out.extend_from_slice(&f.to_le_bytes());
        }
        for v in self.position.iter().chain(self.attr.iter()) {
            for f in v.to_array() {
                out.extend_from_slice(&f.to_le_bytes());
            }
        }
        debug_assert_eq!(out.len(), Self::PACKED_SIZE);
        out
    }
}
