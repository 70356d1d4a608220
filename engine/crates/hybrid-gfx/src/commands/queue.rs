use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{fence::GfxFence, submit_info::GfxSubmitInfo},
    error::{GfxResult, VkResultExt},
    foundation::debug_type::DebugType,
    gfx::Gfx,
};

/// 渲染使用的唯一队列
///
/// 需要同时支持 graphics 与 compute，光追、光栅化、拷贝都提交到这里
pub struct GfxQueue {
    handle: vk::Queue,
    queue_family_index: u32,
}
impl DebugType for GfxQueue {
    fn debug_type_name() -> &'static str {
        "GfxQueue"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// new & init
impl GfxQueue {
    pub(crate) fn new(device: &ash::Device, queue_family_index: u32) -> Self {
        let handle = unsafe { device.get_device_queue(queue_family_index, 0) };
        Self {
            handle,
            queue_family_index,
        }
    }
}

// getters
impl GfxQueue {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

// tools
impl GfxQueue {
    pub fn submit(&self, batches: &[GfxSubmitInfo], fence: Option<&GfxFence>) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxQueue::submit");
        // batches 的存在是有必要的，submit_infos 引用的 batches 的内存
        let submit_infos = batches.iter().map(|b| b.submit_info()).collect_vec();
        unsafe {
            Gfx::get()
                .gfx_device()
                .queue_submit2(self.handle, &submit_infos, fence.map_or(vk::Fence::null(), |f| f.handle()))
                .vk_context("vkQueueSubmit2")
        }
    }

    /// 根据 Vulkan 规范，vkQueueWaitIdle 应该和 Fence 效率相同
    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        unsafe { Gfx::get().gfx_device().queue_wait_idle(self.handle).vk_context("vkQueueWaitIdle") }
    }
}
