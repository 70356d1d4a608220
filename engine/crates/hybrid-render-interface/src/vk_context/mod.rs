//! 基于 hybrid-gfx 的执行上下文
//!
//! 需要先完成 [`Gfx::init`]。instance、device、swapchain 以及各种管线都由宿主创建，
//! 上下文只负责录制与提交。

mod pipelines;
mod resources;

pub use pipelines::{FrameTarget, HostPipeline, HostPipelines};

use std::collections::HashMap;

use ash::vk;
use hybrid_gfx::{
    commands::{
        barrier::{GfxBufferBarrier, GfxImageBarrier},
        command_buffer::{GfxCommandBuffer, GfxLabelColor},
        command_pool::GfxCommandPool,
        fence::GfxFence,
        resource_state::{GfxBufferState, GfxImageState},
        submit_info::GfxSubmitInfo,
    },
    descriptors::descriptor_heap::{GfxDescriptorHeap, GfxDescriptorSetLayout},
    error::{GfxError, GfxResult, VkResultExt},
    gfx::Gfx,
    raytracing::{
        acceleration::GfxAcceleration,
        sbt::{GfxSbtHandleLayout, GfxSbtRegions},
    },
    resources::{
        buffer::GfxBuffer,
        image::GfxImage2D,
        sampler::{GfxSampler, GfxSamplerDesc},
    },
};
use itertools::Itertools;

use crate::{
    denoiser::Denoiser,
    exec_context::ExecContext,
    overlay::OverlayPrimitive,
    queue_barrier::DeferredQueueBarrier,
    resource_desc::{
        AccelBuildSizes, BufferDesc, DescriptorKind, DescriptorWrite, ImageDesc, MAX_HEAP_TEXTURES, RasterDraw,
        RenderTarget, ShaderGroup, TlasBuild,
    },
};

/// 由宿主提供的降噪器工厂
pub type DenoiserFactory = Box<dyn FnMut() -> GfxResult<Box<dyn Denoiser<VkExecContext>>>>;

pub struct VkExecContext {
    set_layouts: HashMap<Vec<DescriptorKind>, GfxDescriptorSetLayout>,
    default_sampler: GfxSampler,

    fence: GfxFence,
    /// 始终处于录制状态
    cmd: GfxCommandBuffer,
    command_pool: GfxCommandPool,

    default_extent: vk::Extent2D,
    frame_target: Option<FrameTarget>,

    pipelines: Option<HostPipelines>,
    /// 所有 shader group 的 handle，按管线中的顺序紧密排列
    shader_group_handles: Vec<u8>,
    sbt_layout: GfxSbtHandleLayout,

    /// 最近一次绑定的光栅化管线 layout，push constant 需要它
    bound_raster_layout: Option<vk::PipelineLayout>,

    denoiser_factory: Option<DenoiserFactory>,
    queue_barrier: DeferredQueueBarrier<vk::Image>,
}

// new & init
impl VkExecContext {
    const CMD_LABEL: &'static str = "hybrid-frame";

    pub fn new(default_extent: vk::Extent2D) -> GfxResult<Self> {
        let _span = tracy_client::span!("VkExecContext::new");

        let queue_family_index = Gfx::get().gfx_queue().queue_family_index();
        let command_pool = GfxCommandPool::new(
            queue_family_index,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "hybrid-exec-context",
        )?;
        let cmd = GfxCommandBuffer::new(&command_pool, "hybrid-exec-context")?;
        let fence = GfxFence::new(false, "hybrid-exec-context")?;
        let default_sampler = GfxSampler::new(&GfxSamplerDesc::default(), "hybrid-default-sampler")?;

        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, Self::CMD_LABEL)?;

        log::info!("vk exec context created, default extent: {}x{}", default_extent.width, default_extent.height);

        Ok(Self {
            set_layouts: HashMap::new(),
            default_sampler,
            fence,
            cmd,
            command_pool,
            default_extent,
            frame_target: None,
            pipelines: None,
            shader_group_handles: Vec::new(),
            sbt_layout: GfxSbtHandleLayout::from_props(Gfx::get().rt_pipeline_props()),
            bound_raster_layout: None,
            denoiser_factory: None,
            queue_barrier: DeferredQueueBarrier::default(),
        })
    }

    /// 设置管线，并缓存光追管线中所有 shader group 的 handle
    pub fn set_pipelines(&mut self, pipelines: HostPipelines) -> GfxResult<()> {
        let group_count = pipelines.rt_shader_groups.len() as u32;
        let data_size = group_count as usize * self.sbt_layout.handle_size as usize;
        self.shader_group_handles = unsafe {
            Gfx::get()
                .gfx_device()
                .ray_tracing_pipeline()
                .get_ray_tracing_shader_group_handles(pipelines.ray_tracing.pipeline, 0, group_count, data_size)
                .vk_context("vkGetRayTracingShaderGroupHandlesKHR")?
        };
        log::info!("ray tracing pipeline set with groups: {:?}", pipelines.rt_shader_groups);
        self.pipelines = Some(pipelines);
        Ok(())
    }

    pub fn set_denoiser_factory(&mut self, factory: DenoiserFactory) {
        self.denoiser_factory = Some(factory);
    }

    /// 每帧开始前由宿主设置当前的 render target
    pub fn set_frame_target(&mut self, target: FrameTarget) {
        self.frame_target = Some(target);
    }
}
// getters
impl VkExecContext {
    /// 固定槽位为 kinds 的 heap 所使用的 set layout，宿主用它创建管线
    pub fn set_layout(&mut self, kinds: &[DescriptorKind]) -> GfxResult<vk::DescriptorSetLayout> {
        Ok(self.cached_set_layout(kinds)?.handle())
    }

    #[inline]
    pub fn frame_target(&self) -> Option<&FrameTarget> {
        self.frame_target.as_ref()
    }
}
// tools
impl VkExecContext {
    fn cached_set_layout(&mut self, kinds: &[DescriptorKind]) -> GfxResult<&GfxDescriptorSetLayout> {
        if !self.set_layouts.contains_key(kinds) {
            let types = kinds.iter().map(|k| k.vk_descriptor_type()).collect_vec();
            let layout = GfxDescriptorSetLayout::new(
                &types,
                MAX_HEAP_TEXTURES,
                format!("hybrid-heap-layout-{}", self.set_layouts.len()),
            )?;
            self.set_layouts.insert(kinds.to_vec(), layout);
        }
        self.set_layouts.get(kinds).ok_or(GfxError::InvalidHandle {
            kind: "descriptor set layout",
        })
    }

    fn pipelines(&self) -> Option<&HostPipelines> {
        if self.pipelines.is_none() {
            log::warn!("pipelines are not set, command skipped");
        }
        self.pipelines.as_ref()
    }

    fn transition_frame_target(&mut self, dst: GfxImageState) {
        if let Some(target) = self.frame_target.as_mut() {
            if target.state != dst {
                self.cmd.image_memory_barrier(
                    vk::DependencyFlags::empty(),
                    &[GfxImageBarrier::from_states(target.image, target.state, dst)],
                );
                target.state = dst;
            }
        }
    }

    fn set_default_viewport_scissor(&mut self) {
        let viewport = self.viewport();
        let scissor = self.scissor();
        self.cmd.cmd_set_viewport(0, &[viewport]);
        self.cmd.cmd_set_scissor(0, &[scissor]);
    }
}

impl ExecContext for VkExecContext {
    type Buffer = GfxBuffer;
    type Image = GfxImage2D;
    type Accel = GfxAcceleration;
    type DescriptorHeap = GfxDescriptorHeap;

    fn frame_extent(&self) -> vk::Extent2D {
        self.frame_target.map_or(self.default_extent, |t| t.extent)
    }

    fn viewport(&self) -> vk::Viewport {
        let extent = self.frame_extent();
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.frame_extent(),
        }
    }

    fn sbt_handle_layout(&self) -> GfxSbtHandleLayout {
        self.sbt_layout
    }

    #[inline]
    fn scratch_offset_alignment(&self) -> u64 {
        Gfx::get().physical_device().min_scratch_offset_align()
    }

    fn shader_group_handle(&self, group: ShaderGroup) -> GfxResult<&[u8]> {
        let index = self
            .pipelines
            .as_ref()
            .and_then(|p| p.rt_shader_groups.iter().position(|g| *g == group))
            .ok_or_else(|| GfxError::MissingShaderGroup(group.name().to_string()))?;
        let handle_size = self.sbt_layout.handle_size as usize;
        self.shader_group_handles
            .get(index * handle_size..(index + 1) * handle_size)
            .ok_or_else(|| GfxError::MissingShaderGroup(group.name().to_string()))
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> GfxResult<GfxBuffer> {
        GfxBuffer::new(desc.size, desc.usage, desc.align, desc.host_visible, &desc.name)
    }

    fn create_image(&mut self, desc: &ImageDesc) -> GfxResult<GfxImage2D> {
        let image = GfxImage2D::new(desc.extent, desc.format, desc.usage, &desc.name)?;
        self.cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::from_states(image.handle(), GfxImageState::UNDEFINED, desc.initial_state)],
        );
        Ok(image)
    }

    fn create_tlas(&mut self, size: u64, name: &str) -> GfxResult<GfxAcceleration> {
        GfxAcceleration::new(size, vk::AccelerationStructureTypeKHR::TOP_LEVEL, name)
    }

    fn tlas_build_sizes(&self, instance_count: u32) -> AccelBuildSizes {
        let sizes = GfxAcceleration::tlas_build_sizes(instance_count);
        AccelBuildSizes {
            scratch_size: sizes.scratch_size,
            result_size: sizes.result_size,
            instance_desc_size: sizes.instance_desc_size,
        }
    }

    fn create_descriptor_heap(
        &mut self,
        kinds: &[DescriptorKind],
        texture_capacity: u32,
        name: &str,
    ) -> GfxResult<GfxDescriptorHeap> {
        let layout = self.cached_set_layout(kinds)?;
        GfxDescriptorHeap::new(layout, texture_capacity, name)
    }

    fn create_denoiser(&mut self) -> GfxResult<Box<dyn Denoiser<Self>>> {
        match self.denoiser_factory.as_mut() {
            Some(factory) => factory(),
            None => Err(GfxError::Unavailable("denoiser")),
        }
    }

    fn write_buffer(&mut self, buffer: &GfxBuffer, offset: u64, data: &[u8]) -> GfxResult<()> {
        buffer.write_bytes(offset, data)
    }

    fn read_buffer(&mut self, buffer: &GfxBuffer, offset: u64, dst: &mut [u8]) -> GfxResult<()> {
        buffer.read_bytes(offset, dst)
    }

    fn write_descriptors(
        &mut self,
        heap: &mut GfxDescriptorHeap,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> GfxResult<()> {
        for write in writes {
            match write {
                DescriptorWrite::StorageImage { slot, image } => heap.write_storage_image(*slot, image.view()),
                DescriptorWrite::SampledImage { slot, image } => heap.write_sampled_image(*slot, image.view()),
                DescriptorWrite::StorageBuffer { slot, buffer } => heap.write_buffer(
                    *slot,
                    vk::DescriptorType::STORAGE_BUFFER,
                    buffer.vk_buffer(),
                    vk::WHOLE_SIZE,
                ),
                DescriptorWrite::UniformBuffer { slot, buffer } => heap.write_buffer(
                    *slot,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    buffer.vk_buffer(),
                    vk::WHOLE_SIZE,
                ),
                DescriptorWrite::AccelerationStructure { slot, accel } => {
                    heap.write_acceleration_structure(*slot, accel.handle())
                }
                DescriptorWrite::Texture { array_index, image } => {
                    heap.write_texture(*array_index, image.view(), self.default_sampler.handle())?
                }
            }
        }
        Ok(())
    }

    fn cmd_image_barrier(&mut self, image: &GfxImage2D, src: GfxImageState, dst: GfxImageState) {
        self.cmd.image_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxImageBarrier::from_states(image.handle(), src, dst)],
        );
    }

    fn cmd_buffer_barrier(&mut self, buffer: &GfxBuffer, src: GfxBufferState, dst: GfxBufferState) {
        self.cmd.buffer_memory_barrier(
            vk::DependencyFlags::empty(),
            &[GfxBufferBarrier::from_states(buffer.vk_buffer(), src, dst)],
        );
    }

    fn cmd_build_tlas(&mut self, build: &TlasBuild<'_, Self>) {
        GfxAcceleration::cmd_build_tlas(&self.cmd, build.result, build.instances, build.instance_count, build.scratch);
        // 光追着色器读取 TLAS 之前需要等待构建完成
        self.cmd.memory_barrier(&[vk::MemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
            .src_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR)
            .dst_stage_mask(vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR)
            .dst_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR)]);
    }

    fn cmd_set_viewport(&mut self, viewport: vk::Viewport) {
        self.cmd.cmd_set_viewport(0, &[viewport]);
    }

    fn cmd_set_scissor(&mut self, scissor: vk::Rect2D) {
        self.cmd.cmd_set_scissor(0, &[scissor]);
    }

    fn cmd_bind_raster_pipeline(&mut self, heap: &GfxDescriptorHeap) {
        let Some(raster) = self.pipelines().map(|p| p.raster) else {
            return;
        };
        self.cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, raster.pipeline);
        self.cmd.bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, raster.layout, 0, &[heap.set()]);
        self.bound_raster_layout = Some(raster.layout);
    }

    fn cmd_begin_rendering(&mut self, target: RenderTarget<'_, Self>, clear: Option<[f32; 4]>) {
        let (view, extent) = match target {
            RenderTarget::Screen => match self.frame_target {
                Some(t) => (t.view, t.extent),
                None => {
                    log::warn!("no frame target, rendering skipped");
                    return;
                }
            },
            RenderTarget::Image(image) => (image.view(), image.extent()),
        };

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(if clear.is_some() { vk::AttachmentLoadOp::CLEAR } else { vk::AttachmentLoadOp::LOAD })
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear.unwrap_or_default(),
                },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));
        self.cmd.cmd_begin_rendering(&rendering_info);
    }

    fn cmd_end_rendering(&mut self) {
        self.cmd.end_rendering();
    }

    fn cmd_draw_indexed(&mut self, draw: &RasterDraw<'_, Self>) {
        let Some(layout) = self.bound_raster_layout else {
            log::warn!("raster pipeline is not bound, draw skipped");
            return;
        };
        self.cmd.cmd_bind_vertex_buffers(0, &[draw.vertex_buffer.vk_buffer()], &[0]);
        self.cmd.cmd_bind_index_buffer(draw.index_buffer.vk_buffer(), 0, vk::IndexType::UINT32);
        self.cmd.cmd_push_constants(
            layout,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            0,
            &draw.instance_index.to_ne_bytes(),
        );
        self.cmd.draw_indexed(draw.index_count, 0, 1, 0, 0);
    }

    fn cmd_trace_rays(&mut self, regions: &GfxSbtRegions, heap: &GfxDescriptorHeap, extent: vk::Extent2D) {
        let Some(rt) = self.pipelines().map(|p| p.ray_tracing) else {
            return;
        };
        self.cmd.cmd_bind_pipeline(vk::PipelineBindPoint::RAY_TRACING_KHR, rt.pipeline);
        self.cmd.bind_descriptor_sets(vk::PipelineBindPoint::RAY_TRACING_KHR, rt.layout, 0, &[heap.set()]);
        self.cmd.trace_rays(
            &regions.raygen,
            &regions.miss,
            &regions.hit,
            &regions.callable,
            [extent.width, extent.height, 1],
        );
    }

    fn cmd_compose(&mut self, heap: &GfxDescriptorHeap) {
        let Some(compose) = self.pipelines().map(|p| p.compose) else {
            return;
        };
        self.cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, compose.pipeline);
        self.cmd.bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, compose.layout, 0, &[heap.set()]);
        // 全屏三角形，顶点位置由 vertex shader 根据 vertex index 生成
        self.cmd.cmd_draw(3, 1, 0, 0);
        self.bound_raster_layout = None;
    }

    fn cmd_copy_buffer(&mut self, src: &GfxBuffer, dst: &GfxBuffer, size: u64) {
        self.cmd.cmd_copy_buffer(
            src.vk_buffer(),
            dst.vk_buffer(),
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            }],
        );
    }

    fn cmd_draw_overlay(&mut self, primitive: OverlayPrimitive, buffer: &GfxBuffer, first_vertex: u32, count: u32) {
        let Some(overlay) = self.pipelines().map(|p| p.overlay[primitive.index()]) else {
            return;
        };
        self.cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, overlay.pipeline);
        self.cmd.cmd_bind_vertex_buffers(0, &[buffer.vk_buffer()], &[0]);
        self.cmd.cmd_draw(count, 1, first_vertex, 0);
        self.bound_raster_layout = None;
    }

    fn cmd_begin_label(&mut self, label: &str) {
        self.cmd.begin_label(label, GfxLabelColor::COLOR_PASS);
    }

    fn cmd_end_label(&mut self) {
        self.cmd.end_label();
    }

    fn set_last_queue_barrier(&mut self, image: &GfxImage2D, src: GfxImageState, dst: GfxImageState) {
        self.queue_barrier.stage(image.handle(), src, dst);
    }

    fn flush_queue_barrier(&mut self) {
        if let Some((image, src, dst)) = self.queue_barrier.take() {
            self.cmd
                .image_memory_barrier(vk::DependencyFlags::empty(), &[GfxImageBarrier::from_states(image, src, dst)]);
        }
    }

    fn submit_and_wait(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("VkExecContext::submit_and_wait");
        self.flush_queue_barrier();

        self.cmd.end()?;
        Gfx::get().gfx_queue().submit(&[GfxSubmitInfo::new(&[&self.cmd])], Some(&self.fence))?;
        self.fence.wait()?;
        self.fence.reset()?;

        self.cmd.reset()?;
        self.cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, Self::CMD_LABEL)?;
        self.bound_raster_layout = None;
        Ok(())
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> GfxResult<()> {
        self.flush_queue_barrier();
        self.transition_frame_target(GfxImageState::COLOR_ATTACHMENT_READ_WRITE);
        self.cmd_begin_rendering(RenderTarget::Screen, Some(clear_color));
        self.cmd_end_rendering();
        self.set_default_viewport_scissor();
        Ok(())
    }

    fn end_frame(&mut self) -> GfxResult<()> {
        self.flush_queue_barrier();
        self.transition_frame_target(GfxImageState::PRESENT);
        self.submit_and_wait()
    }

    fn read_render_target(&mut self) -> GfxResult<Vec<u8>> {
        let _span = tracy_client::span!("VkExecContext::read_render_target");
        let target = self.frame_target.ok_or(GfxError::Unavailable("frame target"))?;
        let size = target.extent.width as u64 * target.extent.height as u64 * 4;
        let readback = GfxBuffer::new(size, vk::BufferUsageFlags::TRANSFER_DST, None, true, "render-target-dump")?;

        let restore_state = target.state;
        self.transition_frame_target(GfxImageState::TRANSFER_SRC);
        self.cmd.cmd_copy_image_to_buffer(
            target.image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            readback.vk_buffer(),
            &[vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: target.extent.width,
                    height: target.extent.height,
                    depth: 1,
                },
            }],
        );
        self.cmd_buffer_barrier(&readback, GfxBufferState::TRANSFER_DST, GfxBufferState::HOST_READ);
        self.transition_frame_target(restore_state);
        self.submit_and_wait()?;

        let mut pixels = vec![0; size as usize];
        readback.read_bytes(0, &mut pixels)?;
        Ok(pixels)
    }
}

impl Drop for VkExecContext {
    fn drop(&mut self) {
        if let Err(e) = Gfx::get().gfx_device().wait_idle() {
            log::error!("failed to wait device idle when dropping exec context: {}", e);
        }
    }
}
