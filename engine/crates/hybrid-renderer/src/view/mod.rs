//! 一个视口的全部 GPU 状态以及每帧的更新、渲染流程
//!
//! 每帧的流程：
//! 1. [`View::update`]：按需重建输出 buffer，分类 instance，构建 TLAS、instance properties、
//!    descriptor heap 与 SBT
//! 2. [`View::render`]：背景光栅化（屏幕与环境贴图），光追，可选的降噪，compose，前景光栅化

mod camera;
pub mod descriptor_table;
pub mod instance_props;
pub mod output_buffers;
pub mod overlay;
mod picking;
pub mod raster_state;
pub mod render_instance;
pub mod render_phase;
pub mod sbt;
pub mod tlas;
pub mod view_params;

#[cfg(test)]
pub(crate) mod test_scene;

pub use camera::CameraState;

use hybrid_gfx::{
    commands::resource_state::GfxImageState,
    error::{GfxError, GfxResult},
};
use hybrid_render_interface::{
    denoiser::Denoiser,
    exec_context::ExecContext,
    overlay::OverlayDrawList,
    resource_desc::{RasterDraw, RenderTarget, ScreenRect},
};
use hybrid_scene::scene::Scene;
use itertools::Itertools;

use crate::{
    settings::ViewDesc,
    view::{
        descriptor_table::{DescriptorTable, HeapResources},
        instance_props::InstancePropsBuffer,
        output_buffers::OutputBuffers,
        overlay::OverlayRenderer,
        raster_state::RasterState,
        render_instance::{RenderBuckets, RenderInstance},
        render_phase::RenderPhase,
        sbt::ShaderBindingTable,
        tlas::TlasBuffers,
        view_params::ViewParamsBuffer,
    },
};

pub struct View<C: ExecContext> {
    /// 宿主设置的缩放比例，下一次 update 时生效
    resolution_scale: f32,
    /// 当前输出 buffer 使用的缩放比例
    rt_scale: f32,

    outputs: OutputBuffers<C>,
    buckets: RenderBuckets,
    tlas: TlasBuffers<C>,
    instance_props: InstancePropsBuffer<C>,
    descriptor_table: DescriptorTable<C>,
    sbt: ShaderBindingTable<C>,
    view_params: ViewParamsBuffer<C>,
    camera: CameraState,

    denoiser: Option<Box<dyn Denoiser<C>>>,
    denoiser_enabled: bool,

    overlay: OverlayRenderer<C>,
    raster_state: RasterState,

    /// 本帧是否已经把 hit instance id 拷贝回 CPU
    hit_readback_valid: bool,
    phase: RenderPhase,
}
// new & init
impl<C: ExecContext> View<C> {
    pub fn new(ctx: &mut C) -> GfxResult<Self> {
        let _span = tracy_client::span!("View::new");

        let extent = ctx.frame_extent();
        let outputs = OutputBuffers::new(ctx, extent, 1.0)?;
        let mut view_params = ViewParamsBuffer::new(ctx)?;
        view_params.data.resolution = outputs.resolution();

        Ok(Self {
            resolution_scale: 1.0,
            rt_scale: 1.0,
            outputs,
            buckets: RenderBuckets::default(),
            tlas: TlasBuffers::default(),
            instance_props: InstancePropsBuffer::default(),
            descriptor_table: DescriptorTable::default(),
            sbt: ShaderBindingTable::default(),
            view_params,
            camera: CameraState::default(),
            denoiser: None,
            denoiser_enabled: false,
            overlay: OverlayRenderer::default(),
            raster_state: RasterState::default(),
            hit_readback_valid: false,
            phase: RenderPhase::Update,
        })
    }

    /// 按照 ctx 当前的 frame extent 以及 rt_scale 重建所有输出 buffer
    fn create_output_buffers(&mut self, ctx: &mut C) -> GfxResult<()> {
        let extent = ctx.frame_extent();
        self.outputs = OutputBuffers::new(ctx, extent, self.rt_scale)?;
        self.view_params.data.resolution = self.outputs.resolution();
        self.hit_readback_valid = false;

        if self.denoiser_enabled {
            self.bind_denoiser(ctx)?;
        }
        Ok(())
    }

    fn bind_denoiser(&mut self, ctx: &mut C) -> GfxResult<()> {
        let Some(denoiser) = self.denoiser.as_mut() else {
            return Ok(());
        };
        let outputs = &self.outputs;
        denoiser.set(ctx, outputs.rt_extent(), &outputs.rt_output, &outputs.rt_albedo, &outputs.rt_normal)
    }
}
// getters
impl<C: ExecContext> View<C> {
    #[inline]
    pub fn outputs(&self) -> &OutputBuffers<C> {
        &self.outputs
    }

    #[inline]
    pub fn buckets(&self) -> &RenderBuckets {
        &self.buckets
    }

    #[inline]
    pub fn tlas(&self) -> &TlasBuffers<C> {
        &self.tlas
    }

    #[inline]
    pub fn instance_props(&self) -> &InstancePropsBuffer<C> {
        &self.instance_props
    }

    #[inline]
    pub fn descriptor_table(&self) -> &DescriptorTable<C> {
        &self.descriptor_table
    }

    #[inline]
    pub fn sbt(&self) -> &ShaderBindingTable<C> {
        &self.sbt
    }

    #[inline]
    pub fn view_params(&self) -> &ViewParamsBuffer<C> {
        &self.view_params
    }

    #[inline]
    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    #[inline]
    pub fn rt_scale(&self) -> f32 {
        self.rt_scale
    }
}
// tunables
impl<C: ExecContext> View<C> {
    #[inline]
    pub fn resolution_scale(&self) -> f32 {
        self.resolution_scale
    }

    /// 下一次 update 时生效，范围限制在 [0.01, 2.0]
    #[inline]
    pub fn set_resolution_scale(&mut self, scale: f32) {
        self.resolution_scale = scale;
    }

    #[inline]
    pub fn soft_light_samples(&self) -> i32 {
        self.view_params.data.soft_light_samples
    }

    #[inline]
    pub fn set_soft_light_samples(&mut self, samples: i32) {
        self.view_params.data.soft_light_samples = samples;
    }

    #[inline]
    pub fn gi_bounces(&self) -> i32 {
        self.view_params.data.gi_bounces
    }

    #[inline]
    pub fn set_gi_bounces(&mut self, bounces: i32) {
        self.view_params.data.gi_bounces = bounces;
    }

    #[inline]
    pub fn gi_env_bounces(&self) -> i32 {
        self.view_params.data.gi_env_bounces
    }

    #[inline]
    pub fn set_gi_env_bounces(&mut self, bounces: i32) {
        self.view_params.data.gi_env_bounces = bounces;
    }

    #[inline]
    pub fn max_light_samples(&self) -> i32 {
        self.view_params.data.max_light_samples
    }

    #[inline]
    pub fn set_max_light_samples(&mut self, samples: i32) {
        self.view_params.data.max_light_samples = samples;
    }

    #[inline]
    pub fn amb_gi_mix_weight(&self) -> f32 {
        self.view_params.data.amb_gi_mix_weight
    }

    #[inline]
    pub fn set_amb_gi_mix_weight(&mut self, weight: f32) {
        self.view_params.data.amb_gi_mix_weight = weight;
    }

    #[inline]
    pub fn is_denoiser_enabled(&self) -> bool {
        self.denoiser_enabled
    }

    /// 第一次开启时通过 ctx 创建降噪器；设备不支持时保持关闭
    pub fn set_denoiser_enabled(&mut self, ctx: &mut C, enabled: bool) -> GfxResult<()> {
        if enabled == self.denoiser_enabled {
            return Ok(());
        }
        if enabled && self.denoiser.is_none() {
            match ctx.create_denoiser() {
                Ok(denoiser) => self.denoiser = Some(denoiser),
                Err(GfxError::Unavailable(what)) => {
                    log::warn!("{} is unavailable, denoising stays disabled", what);
                    self.denoiser_enabled = false;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        self.denoiser_enabled = enabled;
        if enabled {
            self.bind_denoiser(ctx)?;
        }
        Ok(())
    }

    pub fn description(&self) -> ViewDesc {
        ViewDesc {
            resolution_scale: self.resolution_scale,
            soft_light_samples: self.soft_light_samples(),
            gi_bounces: self.gi_bounces(),
            gi_env_bounces: self.gi_env_bounces(),
            max_light_samples: self.max_light_samples(),
            amb_gi_mix_weight: self.amb_gi_mix_weight(),
            denoiser_enabled: self.denoiser_enabled,
        }
    }

    pub fn set_description(&mut self, ctx: &mut C, desc: &ViewDesc) -> GfxResult<()> {
        self.set_resolution_scale(desc.resolution_scale);
        self.set_soft_light_samples(desc.soft_light_samples);
        self.set_gi_bounces(desc.gi_bounces);
        self.set_gi_env_bounces(desc.gi_env_bounces);
        self.set_max_light_samples(desc.max_light_samples);
        self.set_amb_gi_mix_weight(desc.amb_gi_mix_weight);
        self.set_denoiser_enabled(ctx, desc.denoiser_enabled)
    }
}
// update
impl<C: ExecContext> View<C> {
    pub fn update(&mut self, ctx: &mut C, scene: &Scene<C>) -> GfxResult<()> {
        let _span = tracy_client::span!("View::update");
        self.phase = RenderPhase::Update;

        let scale = ViewDesc::clamped_resolution_scale(self.resolution_scale);
        self.resolution_scale = scale;
        if self.rt_scale != scale {
            log::debug!("resolution scale changed: {} -> {}", self.rt_scale, scale);
            self.rt_scale = scale;
            self.create_output_buffers(ctx)?;
        }

        if scene.instance_count() == 0 {
            self.buckets.clear();
            return Ok(());
        }

        self.buckets = RenderBuckets::classify(scene, self.outputs.screen_extent().height);
        log::debug!(
            "view buckets, raytraced: {}, background: {}, foreground: {}, textures: {}",
            self.buckets.raytraced.len(),
            self.buckets.raster_bg.len(),
            self.buckets.raster_fg.len(),
            self.buckets.used_textures.len()
        );

        if !self.buckets.raytraced.is_empty() {
            self.tlas.build(ctx, &self.buckets.raytraced)?;
        }
        self.instance_props.prepare(ctx, &self.buckets)?;
        self.build_descriptor_table(ctx, scene)?;
        self.sbt.build(ctx, self.descriptor_table.heap_gpu_handle(), &self.buckets.raytraced)?;
        self.instance_props.upload(ctx)?;
        Ok(())
    }

    fn build_descriptor_table(&mut self, ctx: &mut C, scene: &Scene<C>) -> GfxResult<()> {
        let Some(instance_props) = self.instance_props.buffer() else {
            return Ok(());
        };
        let textures = self
            .buckets
            .used_textures
            .iter()
            .filter_map(|handle| scene.texture(*handle))
            .collect_vec();

        let res = HeapResources {
            outputs: &self.outputs,
            tlas: self.tlas.result(),
            view_params: self.view_params.buffer(),
            lights: scene.lights_buffer(),
            lights_count: scene.lights_count(),
            instance_props,
            textures,
        };
        self.descriptor_table.build(ctx, &res)
    }

    /// frame extent 变化后调用
    pub fn resize(&mut self, ctx: &mut C) -> GfxResult<()> {
        self.create_output_buffers(ctx)
    }
}
// render
impl<C: ExecContext> View<C> {
    /// 在第一次有 instance 的 update 之前什么都不做
    pub fn render(&mut self, ctx: &mut C, scene: &Scene<C>) -> GfxResult<()> {
        let _span = tracy_client::span!("View::render");

        let Some(heap) = self.descriptor_table.heap() else {
            return Ok(());
        };
        let outputs = &self.outputs;
        let buckets = &self.buckets;
        let raster_state = &mut self.raster_state;
        let rt_count = buckets.raytraced.len() as u32;
        let bg_count = buckets.raster_bg.len() as u32;

        // 背景直接画到屏幕上
        self.phase = RenderPhase::RasterBackgroundToScreen;
        ctx.cmd_begin_label(self.phase.name());
        ctx.cmd_bind_raster_pipeline(heap);
        ctx.cmd_begin_rendering(RenderTarget::Screen, None);
        raster_state.reset(ctx);
        Self::draw_instances(ctx, scene, raster_state, &buckets.raster_bg, rt_count, true);
        ctx.cmd_end_rendering();
        ctx.cmd_end_label();

        // 背景再画一次到环境贴图中，不使用 instance 的 scissor / viewport
        self.phase = RenderPhase::RasterBackgroundToEnvMap;
        ctx.cmd_begin_label(self.phase.name());
        ctx.cmd_image_barrier(
            &outputs.raster_bg,
            OutputBuffers::<C>::RASTER_BG_STATE,
            GfxImageState::COLOR_ATTACHMENT_READ_WRITE,
        );
        ctx.cmd_begin_rendering(RenderTarget::Image(&outputs.raster_bg), Some([0.0; 4]));
        raster_state.reset(ctx);
        Self::draw_instances(ctx, scene, raster_state, &buckets.raster_bg, rt_count, false);
        ctx.cmd_end_rendering();
        ctx.cmd_image_barrier(
            &outputs.raster_bg,
            GfxImageState::COLOR_ATTACHMENT_READ_WRITE,
            OutputBuffers::<C>::RASTER_BG_STATE,
        );
        ctx.cmd_end_label();

        if let Some(first) = buckets.raytraced.first() {
            self.phase = RenderPhase::Raytrace;
            ctx.cmd_begin_label(self.phase.name());
            ctx.cmd_image_barrier(
                &outputs.rt_output,
                OutputBuffers::<C>::RT_OUTPUT_STATE,
                GfxImageState::STORAGE_READ_WRITE_RAY_TRACING,
            );

            // 光追使用第一个光追 instance 的 scissor / viewport
            let rt_scissor = if first.scissor_rect.is_empty() {
                Self::screen_rect_of_scissor(ctx.scissor())
            } else {
                first.scissor_rect
            };
            let rt_viewport = if first.viewport_rect.is_empty() {
                Self::screen_rect_of_viewport(ctx.viewport())
            } else {
                first.viewport_rect
            };
            self.view_params.data.viewport = glam::vec4(
                rt_viewport.x as f32,
                rt_viewport.y as f32,
                rt_viewport.w as f32,
                rt_viewport.h as f32,
            );
            self.view_params.update(ctx)?;

            ctx.cmd_trace_rays(self.sbt.regions(), heap, outputs.rt_extent());
            ctx.cmd_image_barrier(
                &outputs.rt_output,
                GfxImageState::STORAGE_READ_WRITE_RAY_TRACING,
                OutputBuffers::<C>::RT_OUTPUT_STATE,
            );
            ctx.cmd_end_label();

            if let Some(denoiser) = self.denoiser.as_mut().filter(|_| self.denoiser_enabled) {
                self.phase = RenderPhase::Denoise;
                let aux_state = OutputBuffers::<C>::RT_AUX_STATE;
                ctx.cmd_image_barrier(&outputs.rt_albedo, aux_state, aux_state);
                ctx.cmd_image_barrier(&outputs.rt_normal, aux_state, aux_state);

                // 降噪器直接读写图像，需要等待光追完成
                ctx.submit_and_wait()?;
                denoiser.denoise(ctx)?;
                raster_state.reset(ctx);
            }

            self.phase = RenderPhase::Compose;
            ctx.cmd_begin_label(self.phase.name());
            raster_state.apply_scissor(ctx, &rt_scissor);
            raster_state.apply_viewport(ctx, &rt_viewport);
            ctx.cmd_begin_rendering(RenderTarget::Screen, None);
            if let Some(compose_heap) = self.descriptor_table.compose_heap() {
                ctx.cmd_compose(compose_heap);
            }
            ctx.cmd_end_label();
        } else {
            ctx.cmd_begin_rendering(RenderTarget::Screen, None);
        }

        self.phase = RenderPhase::RasterForegroundToScreen;
        ctx.cmd_begin_label(self.phase.name());
        ctx.cmd_bind_raster_pipeline(heap);
        raster_state.reset(ctx);
        Self::draw_instances(ctx, scene, raster_state, &buckets.raster_fg, rt_count + bg_count, true);
        ctx.cmd_end_rendering();
        ctx.cmd_end_label();

        self.phase = RenderPhase::FrameComplete;
        self.hit_readback_valid = false;
        self.view_params.end_frame();
        Ok(())
    }

    /// 在屏幕上叠加调试图元，需要在 render 之后、帧结束之前调用
    pub fn render_overlay(&mut self, ctx: &mut C, draw_lists: &[OverlayDrawList]) -> GfxResult<()> {
        self.overlay.render(ctx, draw_lists)
    }

    fn draw_instances(
        ctx: &mut C,
        scene: &Scene<C>,
        raster_state: &mut RasterState,
        instances: &[RenderInstance],
        base_instance_index: u32,
        apply_overrides: bool,
    ) {
        for (j, inst) in instances.iter().enumerate() {
            let Some(mesh) = scene.mesh(inst.mesh) else {
                continue;
            };
            if apply_overrides {
                raster_state.apply_scissor(ctx, &inst.scissor_rect);
                raster_state.apply_viewport(ctx, &inst.viewport_rect);
            }
            ctx.cmd_draw_indexed(&RasterDraw {
                vertex_buffer: mesh.vertex_buffer(),
                vertex_stride: mesh.vertex_stride(),
                index_buffer: mesh.index_buffer(),
                index_count: inst.index_count,
                instance_index: base_instance_index + j as u32,
            });
        }
    }

    fn screen_rect_of_scissor(scissor: ash::vk::Rect2D) -> ScreenRect {
        ScreenRect::new(
            scissor.offset.x,
            scissor.offset.y,
            scissor.extent.width as i32,
            scissor.extent.height as i32,
        )
    }

    fn screen_rect_of_viewport(viewport: ash::vk::Viewport) -> ScreenRect {
        ScreenRect::new(
            viewport.x as i32,
            viewport.y as i32,
            viewport.width as i32,
            viewport.height as i32,
        )
    }
}
