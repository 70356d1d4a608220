//! 执行上下文：视图与 GPU 之间唯一的通道
//!
//! 上下文独占唯一的 command buffer / queue / fence，所有视图共享它。
//! command buffer 始终处于录制状态，`submit_and_wait` 会提交、等待并重新开始录制。

use ash::vk;
use hybrid_gfx::{
    commands::resource_state::{GfxBufferState, GfxImageState},
    error::GfxResult,
    raytracing::sbt::{GfxSbtHandleLayout, GfxSbtRegions},
};

use crate::{
    denoiser::Denoiser,
    overlay::OverlayPrimitive,
    resource_desc::{
        AccelBuildSizes, BufferDesc, DescriptorKind, DescriptorWrite, ImageDesc, RasterDraw, RenderTarget,
        ShaderGroup, TlasBuild,
    },
};

pub trait GpuBuffer {
    fn size(&self) -> u64;
    /// 没有 device address 的 buffer 返回 0
    fn device_address(&self) -> u64;
}

pub trait GpuImage {
    fn extent(&self) -> vk::Extent2D;
    fn format(&self) -> vk::Format;
}

pub trait GpuAccel {
    fn size(&self) -> u64;
    fn device_address(&self) -> u64;
}

pub trait GpuDescriptorHeap {
    /// 固定槽位数量 + 纹理数量
    fn capacity(&self) -> u32;
    /// 写入 SBT 记录中的 heap 指针
    fn gpu_handle(&self) -> u64;
}

pub trait ExecContext: Sized {
    type Buffer: GpuBuffer;
    type Image: GpuImage;
    type Accel: GpuAccel;
    type DescriptorHeap: GpuDescriptorHeap;

    // ---------------- 查询 ----------------

    /// 当前帧 render target 的尺寸
    fn frame_extent(&self) -> vk::Extent2D;

    fn aspect_ratio(&self) -> f32 {
        let extent = self.frame_extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// 设备默认的 viewport，覆盖整个 render target
    fn viewport(&self) -> vk::Viewport;

    /// 设备默认的 scissor，覆盖整个 render target
    fn scissor(&self) -> vk::Rect2D;

    fn sbt_handle_layout(&self) -> GfxSbtHandleLayout;

    /// 构建加速结构时 scratch buffer 地址需要满足的对齐
    fn scratch_offset_alignment(&self) -> u64;

    /// 根据名字查询光追管线中 shader group 的 handle
    fn shader_group_handle(&self, group: ShaderGroup) -> GfxResult<&[u8]>;

    // ---------------- 资源创建 ----------------

    fn create_buffer(&mut self, desc: &BufferDesc) -> GfxResult<Self::Buffer>;

    /// 创建图像，并在 command buffer 中把它转换到 `desc.initial_state`
    fn create_image(&mut self, desc: &ImageDesc) -> GfxResult<Self::Image>;

    fn create_tlas(&mut self, size: u64, name: &str) -> GfxResult<Self::Accel>;

    fn tlas_build_sizes(&self, instance_count: u32) -> AccelBuildSizes;

    /// kinds 依次对应固定槽位，之后是 texture_capacity 个纹理
    fn create_descriptor_heap(
        &mut self,
        kinds: &[DescriptorKind],
        texture_capacity: u32,
        name: &str,
    ) -> GfxResult<Self::DescriptorHeap>;

    fn create_denoiser(&mut self) -> GfxResult<Box<dyn Denoiser<Self>>>;

    // ---------------- CPU 访问 ----------------

    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> GfxResult<()>;

    fn read_buffer(&mut self, buffer: &Self::Buffer, offset: u64, dst: &mut [u8]) -> GfxResult<()>;

    fn write_descriptors(
        &mut self,
        heap: &mut Self::DescriptorHeap,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> GfxResult<()>;

    // ---------------- 命令 ----------------

    fn cmd_image_barrier(&mut self, image: &Self::Image, src: GfxImageState, dst: GfxImageState);

    fn cmd_buffer_barrier(&mut self, buffer: &Self::Buffer, src: GfxBufferState, dst: GfxBufferState);

    fn cmd_build_tlas(&mut self, build: &TlasBuild<'_, Self>);

    fn cmd_set_viewport(&mut self, viewport: vk::Viewport);

    fn cmd_set_scissor(&mut self, scissor: vk::Rect2D);

    /// 绑定光栅化管线以及视图的 descriptor heap
    fn cmd_bind_raster_pipeline(&mut self, heap: &Self::DescriptorHeap);

    /// clear 为 None 时保留 render target 原有的内容
    fn cmd_begin_rendering(&mut self, target: RenderTarget<'_, Self>, clear: Option<[f32; 4]>);

    fn cmd_end_rendering(&mut self);

    fn cmd_draw_indexed(&mut self, draw: &RasterDraw<'_, Self>);

    fn cmd_trace_rays(&mut self, regions: &GfxSbtRegions, heap: &Self::DescriptorHeap, extent: vk::Extent2D);

    /// 全屏三角形，通过 compose heap 采样光追输出并叠加到当前 render target 上
    fn cmd_compose(&mut self, heap: &Self::DescriptorHeap);

    fn cmd_copy_buffer(&mut self, src: &Self::Buffer, dst: &Self::Buffer, size: u64);

    fn cmd_draw_overlay(&mut self, primitive: OverlayPrimitive, buffer: &Self::Buffer, first_vertex: u32, count: u32);

    fn cmd_begin_label(&mut self, label: &str);

    fn cmd_end_label(&mut self);

    // ---------------- 同步与帧 ----------------

    /// 暂存一个 barrier，在下一次实质性的 GPU 操作之前自动录制
    fn set_last_queue_barrier(&mut self, image: &Self::Image, src: GfxImageState, dst: GfxImageState);

    /// 录制暂存的 barrier（如果有）
    fn flush_queue_barrier(&mut self);

    /// 提交目前录制的命令，阻塞等待完成，然后重新开始录制
    fn submit_and_wait(&mut self) -> GfxResult<()>;

    /// 将当前帧的 render target 转换为可写状态并清屏
    fn begin_frame(&mut self, clear_color: [f32; 4]) -> GfxResult<()>;

    /// 将 render target 转换为呈现状态，提交并等待
    fn end_frame(&mut self) -> GfxResult<()>;

    /// 将当前 render target 的像素拷贝回 CPU
    fn read_render_target(&mut self) -> GfxResult<Vec<u8>>;
}
