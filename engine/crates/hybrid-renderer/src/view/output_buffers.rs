use ash::vk;
use hybrid_gfx::{commands::resource_state::GfxImageState, error::GfxResult};
use hybrid_render_interface::{
    exec_context::ExecContext,
    resource_desc::{BufferDesc, ImageDesc},
};

use crate::settings::RendererSettings;

/// 视图的中间结果：背景、光追输出以及每个像素的 hit 信息
///
/// 分辨率或缩放比例变化时整体重建
pub struct OutputBuffers<C: ExecContext> {
    screen_extent: vk::Extent2D,
    rt_extent: vk::Extent2D,

    /// 屏幕分辨率，光追时作为环境贴图
    pub raster_bg: C::Image,

    pub rt_output: C::Image,
    pub rt_albedo: C::Image,
    pub rt_normal: C::Image,

    pub hit_distance: C::Buffer,
    pub hit_color: C::Buffer,
    pub hit_normal: C::Buffer,
    pub hit_specular: C::Buffer,
    pub hit_instance_id: C::Buffer,
    /// hit_instance_id 第一层的 CPU 副本，用于拾取
    pub hit_instance_id_readback: C::Buffer,
}
// new & init
impl<C: ExecContext> OutputBuffers<C> {
    /// 光追分辨率的常驻状态
    pub const RT_OUTPUT_STATE: GfxImageState = GfxImageState::SHADER_READ_FRAGMENT;
    pub const RT_AUX_STATE: GfxImageState = GfxImageState::STORAGE_READ_WRITE_RAY_TRACING;
    pub const RASTER_BG_STATE: GfxImageState = GfxImageState::SHADER_READ_RAY_TRACING;

    pub fn new(ctx: &mut C, screen_extent: vk::Extent2D, rt_scale: f32) -> GfxResult<Self> {
        let _span = tracy_client::span!("OutputBuffers::new");

        let rt_extent = Self::scaled_extent(screen_extent, rt_scale);
        log::info!(
            "create view output buffers, screen: {}x{}, raytracing: {}x{}",
            screen_extent.width,
            screen_extent.height,
            rt_extent.width,
            rt_extent.height
        );

        let raster_bg = ctx.create_image(&ImageDesc {
            extent: screen_extent,
            format: RendererSettings::RASTER_BG_FORMAT,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            initial_state: Self::RASTER_BG_STATE,
            name: "view-raster-bg".to_string(),
        })?;

        let rt_image = |ctx: &mut C, name: &str, state: GfxImageState| {
            ctx.create_image(&ImageDesc {
                extent: rt_extent,
                format: RendererSettings::RT_OUTPUT_FORMAT,
                usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
                initial_state: state,
                name: name.to_string(),
            })
        };
        let rt_output = rt_image(ctx, "view-rt-output", Self::RT_OUTPUT_STATE)?;
        let rt_albedo = rt_image(ctx, "view-rt-albedo", Self::RT_AUX_STATE)?;
        let rt_normal = rt_image(ctx, "view-rt-normal", Self::RT_AUX_STATE)?;

        let size_one = rt_extent.width as u64 * rt_extent.height as u64;
        let size_all = size_one * RendererSettings::MAX_QUERIES;
        let hit_buffer = |ctx: &mut C, bytes_per_query: u64, extra_usage: vk::BufferUsageFlags, name: &str| {
            ctx.create_buffer(&BufferDesc::new(
                size_all * bytes_per_query,
                vk::BufferUsageFlags::STORAGE_BUFFER | extra_usage,
                false,
                name,
            ))
        };
        let no_usage = vk::BufferUsageFlags::empty();
        let hit_distance = hit_buffer(ctx, 4, no_usage, "view-hit-distance")?;
        let hit_color = hit_buffer(ctx, 4, no_usage, "view-hit-color")?;
        let hit_normal = hit_buffer(ctx, 8, no_usage, "view-hit-normal")?;
        let hit_specular = hit_buffer(ctx, 1, no_usage, "view-hit-specular")?;
        let hit_instance_id = hit_buffer(ctx, 2, vk::BufferUsageFlags::TRANSFER_SRC, "view-hit-instance-id")?;
        let hit_instance_id_readback = ctx.create_buffer(&BufferDesc::new(
            size_one * 2,
            vk::BufferUsageFlags::TRANSFER_DST,
            true,
            "view-hit-instance-id-readback",
        ))?;

        Ok(Self {
            screen_extent,
            rt_extent,
            raster_bg,
            rt_output,
            rt_albedo,
            rt_normal,
            hit_distance,
            hit_color,
            hit_normal,
            hit_specular,
            hit_instance_id,
            hit_instance_id_readback,
        })
    }

    /// 四舍五入到整数像素，且至少为 1
    pub fn scaled_extent(screen_extent: vk::Extent2D, rt_scale: f32) -> vk::Extent2D {
        vk::Extent2D {
            width: ((screen_extent.width as f32 * rt_scale).round() as u32).max(1),
            height: ((screen_extent.height as f32 * rt_scale).round() as u32).max(1),
        }
    }
}
// getters
impl<C: ExecContext> OutputBuffers<C> {
    #[inline]
    pub fn screen_extent(&self) -> vk::Extent2D {
        self.screen_extent
    }

    #[inline]
    pub fn rt_extent(&self) -> vk::Extent2D {
        self.rt_extent
    }

    /// resolution 字段：光追宽高，屏幕宽高
    #[inline]
    pub fn resolution(&self) -> glam::Vec4 {
        glam::vec4(
            self.rt_extent.width as f32,
            self.rt_extent.height as f32,
            self.screen_extent.width as f32,
            self.screen_extent.height as f32,
        )
    }
}
