//! Mesh, texture, and uniform data definitions
//!
//! Decoding model or image files is not this crate's job: collaborators
//! hand over raw vertex/index arrays and RGBA8 pixel buffers, and this
//! module gives them a GPU-compatible shape.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Unit, Vector3};
use std::mem;

/// A single mesh vertex: position, color, and texture coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Per-vertex color, multiplied with the sampled texel
    pub color: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Vertex buffer binding description (binding 0, per-vertex rate)
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(mem::size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// Attribute descriptions matching the shader's input locations
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: (3 * mem::size_of::<f32>()) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: (6 * mem::size_of::<f32>()) as u32,
            },
        ]
    }
}

/// Raw mesh data delivered by a model-decoding collaborator
#[derive(Debug, Clone)]
pub struct MeshData {
    /// Vertex array
    pub vertices: Vec<Vertex>,
    /// 32-bit index array, triangle list
    pub indices: Vec<u32>,
}

impl MeshData {
    /// A unit quad in the XY plane, counter-clockwise winding
    pub fn unit_quad() -> Self {
        Self {
            vertices: vec![
                Vertex {
                    position: [-0.5, -0.5, 0.0],
                    color: [1.0, 1.0, 1.0],
                    uv: [0.0, 1.0],
                },
                Vertex {
                    position: [0.5, -0.5, 0.0],
                    color: [1.0, 1.0, 1.0],
                    uv: [1.0, 1.0],
                },
                Vertex {
                    position: [0.5, 0.5, 0.0],
                    color: [1.0, 1.0, 1.0],
                    uv: [1.0, 0.0],
                },
                Vertex {
                    position: [-0.5, 0.5, 0.0],
                    color: [1.0, 1.0, 1.0],
                    uv: [0.0, 0.0],
                },
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }
}

/// Raw RGBA8 pixel data delivered by a texture-decoding collaborator
#[derive(Debug, Clone)]
pub struct TextureData {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes
    pub rgba8: Vec<u8>,
}

impl TextureData {
    /// Generate a simple two-tone checkerboard
    pub fn checkerboard(width: u32, height: u32) -> Self {
        let mut rgba8 = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let light = ((x / 8) + (y / 8)) % 2 == 0;
                let value = if light { 0xff } else { 0x40 };
                rgba8.extend_from_slice(&[value, value, value, 0xff]);
            }
        }
        Self {
            width,
            height,
            rgba8,
        }
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_size(&self) -> vk::DeviceSize {
        self.rgba8.len() as vk::DeviceSize
    }
}

/// Per-frame shader uniforms, rewritten every frame
///
/// Column-major matrices, std140-compatible: three mat4s with no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct UniformBlock {
    /// Model transform (time-based spin)
    pub model: [[f32; 4]; 4],
    /// View transform (fixed look-at)
    pub view: [[f32; 4]; 4],
    /// Perspective projection
    pub proj: [[f32; 4]; 4],
}

impl UniformBlock {
    /// Build the per-frame transform: the mesh spins about the Z axis at a
    /// quarter turn per second, viewed from a fixed diagonal eye point.
    ///
    /// No Y flip is baked into the projection; the pipeline's negated
    /// viewport height takes care of the coordinate convention.
    pub fn spin(elapsed_secs: f32, aspect: f32) -> Self {
        let angle = elapsed_secs * std::f32::consts::FRAC_PI_2;
        let model = Matrix4::from_axis_angle(&Unit::new_normalize(Vector3::z()), angle);
        let view = Matrix4::look_at_rh(
            &Point3::new(2.0, 2.0, 2.0),
            &Point3::origin(),
            &Vector3::z(),
        );
        let proj = Matrix4::new_perspective(aspect, std::f32::consts::FRAC_PI_4, 0.1, 10.0);

        Self {
            model: model.into(),
            view: view.into(),
            proj: proj.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vertex_attributes_match_struct_layout() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[2].offset, 24);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(Vertex::binding_description().stride, 32);
    }

    #[test]
    fn uniform_block_is_three_packed_mat4s() {
        assert_eq!(mem::size_of::<UniformBlock>(), 3 * 64);
    }

    #[test]
    fn model_matrix_starts_as_identity() {
        let block = UniformBlock::spin(0.0, 4.0 / 3.0);
        let model = Matrix4::from(block.model);
        assert_relative_eq!(model, Matrix4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn quad_indices_reference_valid_vertices() {
        let mesh = MeshData::unit_quad();
        assert!(mesh
            .indices
            .iter()
            .all(|&i| (i as usize) < mesh.vertices.len()));
        assert_eq!(mesh.indices.len() % 3, 0);
    }

    #[test]
    fn checkerboard_has_expected_byte_size() {
        let tex = TextureData::checkerboard(16, 8);
        assert_eq!(tex.rgba8.len(), 16 * 8 * 4);
        assert_eq!(tex.byte_size(), 512);
    }
}
