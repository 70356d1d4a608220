//! 不依赖 GPU 的执行上下文
//!
//! buffer 的内容保存在 CPU 内存中，拷贝命令会被立即执行；
//! 所有命令按顺序记录下来，方便检查渲染流程。

mod resources;

pub use resources::{RecAccel, RecBuffer, RecDescriptor, RecDescriptorHeap, RecImage};

use std::cell::RefCell;

use ash::vk;
use hybrid_gfx::{
    commands::resource_state::{GfxBufferState, GfxImageState},
    error::{GfxError, GfxResult},
    raytracing::sbt::{GfxSbtHandleLayout, GfxSbtRegions},
    utils::helper,
};

use crate::{
    denoiser::Denoiser,
    exec_context::{ExecContext, GpuBuffer, GpuDescriptorHeap},
    overlay::OverlayPrimitive,
    queue_barrier::DeferredQueueBarrier,
    resource_desc::{
        AccelBuildSizes, BufferDesc, DescriptorKind, DescriptorWrite, ImageDesc, RasterDraw, RenderTarget,
        ShaderGroup, TlasBuild,
    },
};

/// 记录下来的一条命令
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCmd {
    ImageBarrier {
        image: u64,
        src: GfxImageState,
        dst: GfxImageState,
    },
    BufferBarrier {
        buffer: u64,
        src: GfxBufferState,
        dst: GfxBufferState,
    },
    BuildTlas {
        result: u64,
        instance_count: u32,
        has_source: bool,
    },
    /// x, y, width, height
    SetViewport([f32; 4]),
    /// x, y, width, height
    SetScissor([i32; 4]),
    BindRasterPipeline {
        heap: u64,
    },
    /// target 为 None 时表示屏幕
    BeginRendering {
        target: Option<u64>,
        clear: Option<[f32; 4]>,
    },
    EndRendering,
    DrawIndexed {
        index_count: u32,
        instance_index: u32,
    },
    TraceRays {
        width: u32,
        height: u32,
        heap: u64,
        hit_group_size: u64,
        hit_group_stride: u64,
    },
    Compose {
        heap: u64,
    },
    CopyBuffer {
        src: u64,
        dst: u64,
        size: u64,
    },
    DrawOverlay {
        primitive: OverlayPrimitive,
        first_vertex: u32,
        count: u32,
    },
    BeginLabel(String),
    EndLabel,
    SubmitAndWait,
    BeginFrame,
    EndFrame,
    ReadRenderTarget,
    DenoiserSet {
        width: u32,
        height: u32,
    },
    Denoise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreatedKind {
    Buffer,
    Image,
    Tlas,
    DescriptorHeap,
    Denoiser,
}

/// 资源创建记录
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedResource {
    pub kind: CreatedKind,
    pub name: String,
    pub size: u64,
}

pub struct RecordingContext {
    extent: vk::Extent2D,
    sbt_layout: GfxSbtHandleLayout,
    shader_group_handles: Vec<Vec<u8>>,
    denoiser_available: bool,
    scratch_alignment: u64,

    next_id: u64,
    next_address: u64,

    queue_barrier: DeferredQueueBarrier<u64>,

    commands: Vec<RecordedCmd>,
    created: Vec<CreatedResource>,
}
// new & init
impl RecordingContext {
    pub fn new(width: u32, height: u32) -> Self {
        let sbt_layout = GfxSbtHandleLayout {
            handle_size: 32,
            handle_alignment: 32,
            base_alignment: 64,
        };
        // 每个 group 的 handle 用 group 序号填充，方便在 SBT 中辨认
        let shader_group_handles = (0..ShaderGroup::ALL.len())
            .map(|i| vec![i as u8 + 1; sbt_layout.handle_size as usize])
            .collect();

        Self {
            extent: vk::Extent2D { width, height },
            sbt_layout,
            shader_group_handles,
            denoiser_available: true,
            scratch_alignment: 128,
            next_id: 1,
            next_address: 0x1_0000,
            queue_barrier: DeferredQueueBarrier::default(),
            commands: Vec::new(),
            created: Vec::new(),
        }
    }
}
// getters
impl RecordingContext {
    #[inline]
    pub fn commands(&self) -> &[RecordedCmd] {
        &self.commands
    }

    #[inline]
    pub fn created(&self) -> &[CreatedResource] {
        &self.created
    }

    /// 名字为 name 的资源被创建的次数
    pub fn created_count(&self, kind: CreatedKind, name: &str) -> usize {
        self.created.iter().filter(|c| c.kind == kind && c.name == name).count()
    }

    #[inline]
    pub fn shader_group_index(group: ShaderGroup) -> usize {
        ShaderGroup::ALL.iter().position(|g| *g == group).unwrap_or_default()
    }
}
// tools
impl RecordingContext {
    pub fn set_frame_extent(&mut self, width: u32, height: u32) {
        self.extent = vk::Extent2D { width, height };
    }

    pub fn set_denoiser_available(&mut self, available: bool) {
        self.denoiser_available = available;
    }

    pub fn set_scratch_offset_alignment(&mut self, align: u64) {
        self.scratch_alignment = align;
    }

    /// 清空命令记录，资源创建记录保持不变
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// 直接修改 buffer 的内容，模拟 GPU 写入
    pub fn poke_buffer(&self, buffer: &RecBuffer, offset: u64, data: &[u8]) -> GfxResult<()> {
        GfxError::check_range(&buffer.name, offset, data.len() as u64, buffer.size)?;
        let offset = offset as usize;
        buffer.data.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    pub fn record(&mut self, cmd: RecordedCmd) {
        self.commands.push(cmd);
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn alloc_address(&mut self, size: u64, align: Option<u64>) -> u64 {
        let address = helper::align_up(self.next_address, align.unwrap_or(1).max(256));
        self.next_address = address + helper::align_up(size.max(1), 256);
        address
    }

    fn log_created(&mut self, kind: CreatedKind, name: &str, size: u64) {
        self.created.push(CreatedResource {
            kind,
            name: name.to_string(),
            size,
        });
    }

    fn set_descriptor(
        heap: &mut RecDescriptorHeap,
        slot: u32,
        expected: DescriptorKind,
        descriptor: RecDescriptor,
    ) -> GfxResult<()> {
        match heap.kinds.get(slot as usize) {
            Some(kind) if *kind == expected => {
                heap.entries[slot as usize] = Some(descriptor);
                Ok(())
            }
            Some(_) => Err(GfxError::InvalidHandle { kind: "descriptor slot" }),
            None => Err(GfxError::OutOfBounds {
                name: "descriptor heap".to_string(),
                offset: slot as u64,
                len: 1,
                size: heap.kinds.len() as u64,
            }),
        }
    }
}

impl ExecContext for RecordingContext {
    type Buffer = RecBuffer;
    type Image = RecImage;
    type Accel = RecAccel;
    type DescriptorHeap = RecDescriptorHeap;

    fn frame_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        }
    }

    fn sbt_handle_layout(&self) -> GfxSbtHandleLayout {
        self.sbt_layout
    }

    fn scratch_offset_alignment(&self) -> u64 {
        self.scratch_alignment
    }

    fn shader_group_handle(&self, group: ShaderGroup) -> GfxResult<&[u8]> {
        self.shader_group_handles
            .get(Self::shader_group_index(group))
            .map(Vec::as_slice)
            .ok_or_else(|| GfxError::MissingShaderGroup(group.name().to_string()))
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> GfxResult<RecBuffer> {
        let id = self.alloc_id();
        let address = self.alloc_address(desc.size, desc.align);
        self.log_created(CreatedKind::Buffer, &desc.name, desc.size);
        Ok(RecBuffer {
            id,
            size: desc.size,
            address: if desc.usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) { address } else { 0 },
            host_visible: desc.host_visible,
            name: desc.name.clone(),
            data: RefCell::new(vec![0; desc.size as usize]),
        })
    }

    fn create_image(&mut self, desc: &ImageDesc) -> GfxResult<RecImage> {
        let id = self.alloc_id();
        self.log_created(CreatedKind::Image, &desc.name, desc.extent.width as u64 * desc.extent.height as u64);
        self.record(RecordedCmd::ImageBarrier {
            image: id,
            src: GfxImageState::UNDEFINED,
            dst: desc.initial_state,
        });
        Ok(RecImage {
            id,
            extent: desc.extent,
            format: desc.format,
            name: desc.name.clone(),
        })
    }

    fn create_tlas(&mut self, size: u64, name: &str) -> GfxResult<RecAccel> {
        let id = self.alloc_id();
        let address = self.alloc_address(size, None);
        self.log_created(CreatedKind::Tlas, name, size);
        Ok(RecAccel { id, size, address })
    }

    fn tlas_build_sizes(&self, instance_count: u32) -> AccelBuildSizes {
        let n = instance_count as u64;
        AccelBuildSizes {
            scratch_size: 128 + 32 * n,
            result_size: 256 + 64 * n,
            instance_desc_size: 64 * n,
        }
    }

    fn create_descriptor_heap(
        &mut self,
        kinds: &[DescriptorKind],
        texture_capacity: u32,
        name: &str,
    ) -> GfxResult<RecDescriptorHeap> {
        let id = self.alloc_id();
        let capacity = kinds.len() + texture_capacity as usize;
        self.log_created(CreatedKind::DescriptorHeap, name, capacity as u64);
        Ok(RecDescriptorHeap {
            id,
            kinds: kinds.to_vec(),
            entries: vec![None; capacity],
        })
    }

    fn create_denoiser(&mut self) -> GfxResult<Box<dyn Denoiser<Self>>> {
        if !self.denoiser_available {
            return Err(GfxError::Unavailable("denoiser"));
        }
        self.log_created(CreatedKind::Denoiser, "denoiser", 0);
        Ok(Box::new(RecordingDenoiser))
    }

    fn write_buffer(&mut self, buffer: &RecBuffer, offset: u64, data: &[u8]) -> GfxResult<()> {
        if !buffer.host_visible {
            return Err(GfxError::NotHostVisible {
                name: buffer.name.clone(),
            });
        }
        self.poke_buffer(buffer, offset, data)
    }

    fn read_buffer(&mut self, buffer: &RecBuffer, offset: u64, dst: &mut [u8]) -> GfxResult<()> {
        if !buffer.host_visible {
            return Err(GfxError::NotHostVisible {
                name: buffer.name.clone(),
            });
        }
        GfxError::check_range(&buffer.name, offset, dst.len() as u64, buffer.size)?;
        let offset = offset as usize;
        dst.copy_from_slice(&buffer.data.borrow()[offset..offset + dst.len()]);
        Ok(())
    }

    fn write_descriptors(
        &mut self,
        heap: &mut RecDescriptorHeap,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> GfxResult<()> {
        for write in writes {
            match write {
                DescriptorWrite::StorageImage { slot, image } => {
                    Self::set_descriptor(heap, *slot, DescriptorKind::StorageImage, RecDescriptor::Image(image.id))?
                }
                DescriptorWrite::SampledImage { slot, image } => {
                    Self::set_descriptor(heap, *slot, DescriptorKind::SampledImage, RecDescriptor::Image(image.id))?
                }
                DescriptorWrite::StorageBuffer { slot, buffer } => Self::set_descriptor(
                    heap,
                    *slot,
                    DescriptorKind::StorageBuffer,
                    RecDescriptor::Buffer(buffer.id),
                )?,
                DescriptorWrite::UniformBuffer { slot, buffer } => Self::set_descriptor(
                    heap,
                    *slot,
                    DescriptorKind::UniformBuffer,
                    RecDescriptor::Buffer(buffer.id),
                )?,
                DescriptorWrite::AccelerationStructure { slot, accel } => Self::set_descriptor(
                    heap,
                    *slot,
                    DescriptorKind::AccelerationStructure,
                    RecDescriptor::Accel(accel.id),
                )?,
                DescriptorWrite::Texture { array_index, image } => {
                    let index = heap.kinds.len() + *array_index as usize;
                    let capacity = heap.capacity() as u64;
                    let entry = heap.entries.get_mut(index).ok_or_else(|| GfxError::OutOfBounds {
                        name: "descriptor heap".to_string(),
                        offset: index as u64,
                        len: 1,
                        size: capacity,
                    })?;
                    *entry = Some(RecDescriptor::Image(image.id));
                }
            }
        }
        Ok(())
    }

    fn cmd_image_barrier(&mut self, image: &RecImage, src: GfxImageState, dst: GfxImageState) {
        self.record(RecordedCmd::ImageBarrier {
            image: image.id,
            src,
            dst,
        });
    }

    fn cmd_buffer_barrier(&mut self, buffer: &RecBuffer, src: GfxBufferState, dst: GfxBufferState) {
        self.record(RecordedCmd::BufferBarrier {
            buffer: buffer.id,
            src,
            dst,
        });
    }

    fn cmd_build_tlas(&mut self, build: &TlasBuild<'_, Self>) {
        self.record(RecordedCmd::BuildTlas {
            result: build.result.id,
            instance_count: build.instance_count,
            has_source: build.source.is_some(),
        });
    }

    fn cmd_set_viewport(&mut self, viewport: vk::Viewport) {
        self.record(RecordedCmd::SetViewport([viewport.x, viewport.y, viewport.width, viewport.height]));
    }

    fn cmd_set_scissor(&mut self, scissor: vk::Rect2D) {
        self.record(RecordedCmd::SetScissor([
            scissor.offset.x,
            scissor.offset.y,
            scissor.extent.width as i32,
            scissor.extent.height as i32,
        ]));
    }

    fn cmd_bind_raster_pipeline(&mut self, heap: &RecDescriptorHeap) {
        self.record(RecordedCmd::BindRasterPipeline { heap: heap.id });
    }

    fn cmd_begin_rendering(&mut self, target: RenderTarget<'_, Self>, clear: Option<[f32; 4]>) {
        let target = match target {
            RenderTarget::Screen => None,
            RenderTarget::Image(image) => Some(image.id),
        };
        self.record(RecordedCmd::BeginRendering { target, clear });
    }

    fn cmd_end_rendering(&mut self) {
        self.record(RecordedCmd::EndRendering);
    }

    fn cmd_draw_indexed(&mut self, draw: &RasterDraw<'_, Self>) {
        self.record(RecordedCmd::DrawIndexed {
            index_count: draw.index_count,
            instance_index: draw.instance_index,
        });
    }

    fn cmd_trace_rays(&mut self, regions: &GfxSbtRegions, heap: &RecDescriptorHeap, extent: vk::Extent2D) {
        self.record(RecordedCmd::TraceRays {
            width: extent.width,
            height: extent.height,
            heap: heap.id,
            hit_group_size: regions.hit.size,
            hit_group_stride: regions.hit.stride,
        });
    }

    fn cmd_compose(&mut self, heap: &RecDescriptorHeap) {
        self.record(RecordedCmd::Compose { heap: heap.id });
    }

    fn cmd_copy_buffer(&mut self, src: &RecBuffer, dst: &RecBuffer, size: u64) {
        let size = size.min(src.size).min(dst.size) as usize;
        {
            let src_data = src.data.borrow();
            dst.data.borrow_mut()[..size].copy_from_slice(&src_data[..size]);
        }
        self.record(RecordedCmd::CopyBuffer {
            src: src.id,
            dst: dst.id,
            size: size as u64,
        });
    }

    fn cmd_draw_overlay(&mut self, primitive: OverlayPrimitive, _buffer: &RecBuffer, first_vertex: u32, count: u32) {
        self.record(RecordedCmd::DrawOverlay {
            primitive,
            first_vertex,
            count,
        });
    }

    fn cmd_begin_label(&mut self, label: &str) {
        self.record(RecordedCmd::BeginLabel(label.to_string()));
    }

    fn cmd_end_label(&mut self) {
        self.record(RecordedCmd::EndLabel);
    }

    fn set_last_queue_barrier(&mut self, image: &RecImage, src: GfxImageState, dst: GfxImageState) {
        self.queue_barrier.stage(image.id, src, dst);
    }

    fn flush_queue_barrier(&mut self) {
        if let Some((image, src, dst)) = self.queue_barrier.take() {
            self.record(RecordedCmd::ImageBarrier { image, src, dst });
        }
    }

    fn submit_and_wait(&mut self) -> GfxResult<()> {
        self.flush_queue_barrier();
        self.record(RecordedCmd::SubmitAndWait);
        Ok(())
    }

    fn begin_frame(&mut self, _clear_color: [f32; 4]) -> GfxResult<()> {
        self.flush_queue_barrier();
        self.record(RecordedCmd::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> GfxResult<()> {
        self.flush_queue_barrier();
        self.record(RecordedCmd::EndFrame);
        Ok(())
    }

    fn read_render_target(&mut self) -> GfxResult<Vec<u8>> {
        self.record(RecordedCmd::ReadRenderTarget);
        Ok(vec![0; self.extent.width as usize * self.extent.height as usize * 4])
    }
}

/// 只记录调用的降噪器
pub struct RecordingDenoiser;
impl Denoiser<RecordingContext> for RecordingDenoiser {
    fn set(
        &mut self,
        ctx: &mut RecordingContext,
        extent: vk::Extent2D,
        _output: &RecImage,
        _albedo: &RecImage,
        _normal: &RecImage,
    ) -> GfxResult<()> {
        ctx.record(RecordedCmd::DenoiserSet {
            width: extent.width,
            height: extent.height,
        });
        Ok(())
    }

    fn denoise(&mut self, ctx: &mut RecordingContext) -> GfxResult<()> {
        ctx.record(RecordedCmd::Denoise);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_buffer(ctx: &mut RecordingContext, size: u64, name: &str) -> RecBuffer {
        ctx.create_buffer(&BufferDesc::new(
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            true,
            name,
        ))
        .unwrap()
    }

    #[test]
    fn test_buffer_write_read() {
        let mut ctx = RecordingContext::new(64, 32);
        let buffer = host_buffer(&mut ctx, 16, "buf");
        ctx.write_buffer(&buffer, 4, &[1, 2, 3, 4]).unwrap();

        let mut dst = [0u8; 4];
        ctx.read_buffer(&buffer, 4, &mut dst).unwrap();
        assert_eq!(dst, [1, 2, 3, 4]);
        assert!(ctx.write_buffer(&buffer, 14, &[0; 4]).is_err());
        assert_ne!(buffer.device_address(), 0);
    }

    #[test]
    fn test_buffer_address_alignment() {
        let mut ctx = RecordingContext::new(64, 32);
        host_buffer(&mut ctx, 16, "small");
        let aligned = ctx
            .create_buffer(
                &BufferDesc::new(16, vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS, false, "aligned").align(4096),
            )
            .unwrap();
        assert_eq!(aligned.device_address() % 4096, 0);
        let next = host_buffer(&mut ctx, 16, "next");
        assert_eq!(next.device_address(), aligned.device_address() + 256);
    }

    #[test]
    fn test_device_local_buffer_is_not_host_visible() {
        let mut ctx = RecordingContext::new(64, 32);
        let buffer = ctx
            .create_buffer(&BufferDesc::new(8, vk::BufferUsageFlags::STORAGE_BUFFER, false, "gpu-only"))
            .unwrap();
        assert!(matches!(ctx.write_buffer(&buffer, 0, &[0; 4]), Err(GfxError::NotHostVisible { .. })));
        // poke 模拟 GPU 写入，不受限制
        ctx.poke_buffer(&buffer, 0, &[7; 4]).unwrap();
        assert_eq!(&buffer.contents()[..4], &[7; 4]);
        assert_eq!(buffer.device_address(), 0);
    }

    #[test]
    fn test_copy_buffer_is_eager() {
        let mut ctx = RecordingContext::new(64, 32);
        let src = host_buffer(&mut ctx, 8, "src");
        let dst = host_buffer(&mut ctx, 8, "dst");
        ctx.write_buffer(&src, 0, &[9; 8]).unwrap();
        ctx.cmd_copy_buffer(&src, &dst, 8);
        assert_eq!(dst.contents(), vec![9; 8]);
        assert!(matches!(ctx.commands().last(), Some(RecordedCmd::CopyBuffer { size: 8, .. })));
    }

    #[test]
    fn test_descriptor_writes_check_kind() {
        let mut ctx = RecordingContext::new(64, 32);
        let buffer = host_buffer(&mut ctx, 8, "buf");
        let mut heap = ctx
            .create_descriptor_heap(&[DescriptorKind::StorageBuffer, DescriptorKind::UniformBuffer], 2, "heap")
            .unwrap();
        assert_eq!(heap.capacity(), 4);

        ctx.write_descriptors(&mut heap, &[DescriptorWrite::StorageBuffer { slot: 0, buffer: &buffer }]).unwrap();
        assert_eq!(heap.entry(0), Some(RecDescriptor::Buffer(buffer.id())));

        let wrong_kind = ctx.write_descriptors(&mut heap, &[DescriptorWrite::StorageBuffer { slot: 1, buffer: &buffer }]);
        assert!(wrong_kind.is_err());
        let out_of_range = ctx.write_descriptors(&mut heap, &[DescriptorWrite::UniformBuffer { slot: 5, buffer: &buffer }]);
        assert!(out_of_range.is_err());
    }

    #[test]
    fn test_queue_barrier_flushed_on_submit() {
        let mut ctx = RecordingContext::new(64, 32);
        let image = ctx
            .create_image(&ImageDesc {
                extent: vk::Extent2D { width: 4, height: 4 },
                format: vk::Format::R8G8B8A8_UNORM,
                usage: vk::ImageUsageFlags::SAMPLED,
                initial_state: GfxImageState::SHADER_READ_FRAGMENT,
                name: "img".to_string(),
            })
            .unwrap();
        ctx.clear_commands();

        ctx.set_last_queue_barrier(&image, GfxImageState::SHADER_READ_FRAGMENT, GfxImageState::TRANSFER_SRC);
        assert!(ctx.commands().is_empty());
        ctx.submit_and_wait().unwrap();
        assert_eq!(
            ctx.commands(),
            &[
                RecordedCmd::ImageBarrier {
                    image: image.id(),
                    src: GfxImageState::SHADER_READ_FRAGMENT,
                    dst: GfxImageState::TRANSFER_SRC,
                },
                RecordedCmd::SubmitAndWait,
            ]
        );
    }

    #[test]
    fn test_shader_group_handles_are_distinct() {
        let ctx = RecordingContext::new(64, 32);
        let raygen = ctx.shader_group_handle(ShaderGroup::TraceRayGen).unwrap().to_vec();
        let hit = ctx.shader_group_handle(ShaderGroup::SurfaceHitGroup).unwrap().to_vec();
        assert_eq!(raygen.len(), 32);
        assert_ne!(raygen, hit);
    }

    #[test]
    fn test_denoiser_unavailable() {
        let mut ctx = RecordingContext::new(64, 32);
        ctx.set_denoiser_available(false);
        assert!(matches!(ctx.create_denoiser(), Err(GfxError::Unavailable("denoiser"))));
    }
}
