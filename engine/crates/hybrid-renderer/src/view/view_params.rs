use ash::vk;
use hybrid_gfx::{error::GfxResult, utils::helper};
use hybrid_render_interface::{exec_context::ExecContext, resource_desc::BufferDesc};
use xxhash_rust::xxh32::Xxh32;

use crate::settings::{RendererSettings, ViewDesc};

/// 与 shader 中的 constant buffer 布局一致
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewParams {
    pub view: glam::Mat4,
    pub view_i: glam::Mat4,
    pub prev_view_proj: glam::Mat4,
    pub projection: glam::Mat4,
    pub projection_i: glam::Mat4,
    /// x, y, width, height
    pub viewport: glam::Vec4,
    /// 光追宽高，屏幕宽高
    pub resolution: glam::Vec4,
    pub random_seed: u32,
    pub soft_light_samples: i32,
    pub gi_bounces: i32,
    pub gi_env_bounces: i32,
    pub max_light_samples: i32,
    pub amb_gi_mix_weight: f32,
    pub frame_count: u32,
    pub _padding: u32,
}
impl Default for ViewParams {
    fn default() -> Self {
        let desc = ViewDesc::default();
        Self {
            view: glam::Mat4::IDENTITY,
            view_i: glam::Mat4::IDENTITY,
            prev_view_proj: glam::Mat4::IDENTITY,
            projection: glam::Mat4::IDENTITY,
            projection_i: glam::Mat4::IDENTITY,
            viewport: glam::Vec4::ZERO,
            resolution: glam::Vec4::ZERO,
            random_seed: 0,
            soft_light_samples: desc.soft_light_samples,
            gi_bounces: desc.gi_bounces,
            gi_env_bounces: desc.gi_env_bounces,
            max_light_samples: desc.max_light_samples,
            amb_gi_mix_weight: desc.amb_gi_mix_weight,
            frame_count: 0,
            _padding: 0,
        }
    }
}
impl ViewParams {
    /// 相机不动时种子保持不变
    pub fn compute_seed(view: &glam::Mat4, projection: &glam::Mat4) -> u32 {
        let mut hasher = Xxh32::new(0);
        hasher.update(bytemuck::bytes_of(view));
        hasher.update(bytemuck::bytes_of(projection));
        hasher.digest()
    }
}

/// view params 以及对应的 uniform buffer
pub struct ViewParamsBuffer<C: ExecContext> {
    pub data: ViewParams,
    buffer: C::Buffer,
    /// 每帧只记录一次上一帧的 view-projection
    updated_this_frame: bool,
}
// new & init
impl<C: ExecContext> ViewParamsBuffer<C> {
    pub fn new(ctx: &mut C) -> GfxResult<Self> {
        let size = helper::align_up(size_of::<ViewParams>() as u64, RendererSettings::CONSTANT_BUFFER_ALIGNMENT);
        let buffer = ctx.create_buffer(&BufferDesc::new(
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            true,
            "view-params",
        ))?;
        Ok(Self {
            data: ViewParams::default(),
            buffer,
            updated_this_frame: false,
        })
    }
}
// getters
impl<C: ExecContext> ViewParamsBuffer<C> {
    #[inline]
    pub fn buffer(&self) -> &C::Buffer {
        &self.buffer
    }

    #[inline]
    pub fn updated_this_frame(&self) -> bool {
        self.updated_this_frame
    }
}
// tools
impl<C: ExecContext> ViewParamsBuffer<C> {
    /// 重新计算逆矩阵与随机种子，并写入 GPU
    pub fn update(&mut self, ctx: &mut C) -> GfxResult<()> {
        let _span = tracy_client::span!("ViewParamsBuffer::update");

        let data = &mut self.data;
        if !self.updated_this_frame {
            data.prev_view_proj = data.projection * data.view;
            self.updated_this_frame = true;
        }

        data.random_seed = ViewParams::compute_seed(&data.view, &data.projection);
        data.view_i = data.view.inverse();
        data.projection_i = data.projection.inverse();

        ctx.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&self.data))
    }

    #[inline]
    pub fn end_frame(&mut self) {
        self.updated_this_frame = false;
        self.data.frame_count = self.data.frame_count.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::{exec_context::GpuBuffer, recording::RecordingContext};

    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(size_of::<ViewParams>(), 384);
        let mut ctx = RecordingContext::new(8, 8);
        let params = ViewParamsBuffer::new(&mut ctx).unwrap();
        assert_eq!(params.buffer().size(), 512);
        assert_eq!(params.data.max_light_samples, 12);
        assert_eq!(params.data.amb_gi_mix_weight, 0.8);
    }

    #[test]
    fn test_seed_is_stable_for_still_camera() {
        let view = glam::Mat4::look_at_rh(glam::Vec3::Z, glam::Vec3::ZERO, glam::Vec3::Y);
        let proj = glam::Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0);
        let seed = ViewParams::compute_seed(&view, &proj);
        assert_eq!(seed, ViewParams::compute_seed(&view, &proj));

        let moved = view * glam::Mat4::from_translation(glam::Vec3::X);
        assert_ne!(seed, ViewParams::compute_seed(&moved, &proj));
    }

    #[test]
    fn test_prev_view_proj_captured_once_per_frame() {
        let mut ctx = RecordingContext::new(8, 8);
        let mut params = ViewParamsBuffer::new(&mut ctx).unwrap();
        let first = glam::Mat4::from_translation(glam::Vec3::X);
        params.data.view = first;
        params.update(&mut ctx).unwrap();
        assert_eq!(params.data.prev_view_proj, first);

        params.data.view = glam::Mat4::from_translation(glam::Vec3::Y);
        params.update(&mut ctx).unwrap();
        assert_eq!(params.data.prev_view_proj, first);
        assert!(params.data.view_i.abs_diff_eq(glam::Mat4::from_translation(-glam::Vec3::Y), 1e-6));

        params.end_frame();
        assert!(!params.updated_this_frame());
        assert_eq!(params.data.frame_count, 1);

        let bytes = params.buffer().contents();
        let uploaded = bytemuck::pod_read_unaligned::<ViewParams>(&bytes[..size_of::<ViewParams>()]);
        assert_eq!(uploaded.view, glam::Mat4::from_translation(glam::Vec3::Y));
    }
}
