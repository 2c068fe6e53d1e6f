// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};

/// One vertex: a single 3-float position, nothing else.
/// Matches the pipeline's only attribute (location 0, R32G32B32_SFLOAT, stride 12).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Position {
    pub xyz: [f32; 3],
}

impl Position {
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { xyz: [x, y, z] }
    }
}

/// Centered quad drawn as a 4-vertex triangle strip.
pub const QUAD_STRIP: [Position; 4] = [
    Position::new(-0.5, -0.5, 0.0),
    Position::new(0.5, -0.5, 0.0),
    Position::new(-0.5, 0.5, 0.0),
    Position::new(0.5, 0.5, 0.0),
];

pub fn as_bytes(verts: &[Position]) -> &[u8] {
    bytemuck::cast_slice(verts)
}
