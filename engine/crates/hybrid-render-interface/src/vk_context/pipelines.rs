use ash::vk;
use hybrid_gfx::commands::resource_state::GfxImageState;

use crate::{overlay::OverlayPrimitive, resource_desc::ShaderGroup};

/// 宿主创建的管线，生命周期由宿主管理
#[derive(Clone, Copy, Debug)]
pub struct HostPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// 视图渲染需要的全部管线
///
/// 管线的 set 0 需要与 [`VkExecContext::set_layout`](super::VkExecContext::set_layout) 返回的 layout 一致，
/// 光栅化管线使用 4 字节的 push constant 传递 instance 序号
#[derive(Clone, Debug)]
pub struct HostPipelines {
    pub raster: HostPipeline,
    pub compose: HostPipeline,
    /// 按 [`OverlayPrimitive::index`] 排列
    pub overlay: [HostPipeline; OverlayPrimitive::COUNT],
    pub ray_tracing: HostPipeline,
    /// 光追管线中 shader group 的顺序
    pub rt_shader_groups: Vec<ShaderGroup>,
}

/// 宿主提供的当前帧 render target，通常是 swapchain image
#[derive(Clone, Copy, Debug)]
pub struct FrameTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    /// 交给上下文时所处的状态
    pub state: GfxImageState,
}
