use ash::vk;
use hybrid_gfx::{commands::resource_state::GfxImageState, error::GfxResult};
use hybrid_render_interface::{exec_context::ExecContext, resource_desc::ImageDesc};

use crate::components::mesh::Mesh;

/// 交错排列的顶点：位置、法线、uv
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VertexPosNormalUv {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// 坐标系：RightHand, X-Right, Y-Up
///
/// 位于 XY 平面上的正立三角形，法线 +Z，绕序 CCW
///
/// ```text
///          y^
///           |
///           C
///          / \
///         /   \
///        /     \
///       A-------B---->x
/// ```
pub struct TriangleShape;

impl TriangleShape {
    const VERTICES: [VertexPosNormalUv; 3] = [
        VertexPosNormalUv {
            position: [-1.0, -1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 1.0],
        },
        VertexPosNormalUv {
            position: [1.0, -1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [1.0, 1.0],
        },
        VertexPosNormalUv {
            position: [0.0, 1.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            uv: [0.5, 0.0],
        },
    ];

    const INDICES: [u32; 3] = [0, 1, 2];

    pub fn create_mesh<C: ExecContext>(ctx: &mut C) -> GfxResult<Mesh<C>> {
        Mesh::new(
            ctx,
            bytemuck::cast_slice(&Self::VERTICES),
            size_of::<VertexPosNormalUv>() as u32,
            &Self::INDICES,
            "triangle",
        )
    }

    /// 1x1 的白色纹理，可以作为默认的 diffuse 纹理
    pub fn create_texture<C: ExecContext>(ctx: &mut C) -> GfxResult<C::Image> {
        ctx.create_image(&ImageDesc {
            extent: vk::Extent2D { width: 1, height: 1 },
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            initial_state: GfxImageState::SHADER_READ_FRAGMENT,
            name: "white-1x1".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::RecordingContext;

    use super::*;

    #[test]
    fn test_triangle_mesh() {
        let mut ctx = RecordingContext::new(16, 16);
        let mesh = TriangleShape::create_mesh(&mut ctx).unwrap();
        assert_eq!(mesh.vertex_stride(), 32);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);
        assert!(mesh.bottom_level_as().is_none());
        assert_eq!(mesh.index_buffer().contents(), bytemuck::cast_slice::<u32, u8>(&[0, 1, 2]).to_vec());
    }
}
