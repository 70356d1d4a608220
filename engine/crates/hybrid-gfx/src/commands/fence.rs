use ash::vk;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::debug_type::DebugType,
    gfx::Gfx,
};

pub struct GfxFence {
    fence: vk::Fence,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let gfx_device = Gfx::get().gfx_device();
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe {
            gfx_device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None).vk_context("vkCreateFence")?
        };

        let fence = Self { fence };
        gfx_device.set_debug_name(&fence, debug_name);
        Ok(fence)
    }
}
impl Drop for GfxFence {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_fence(self.fence, None);
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence
    #[inline]
    pub fn wait(&self) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxFence::wait");
        let gfx_device = Gfx::get().gfx_device();
        unsafe {
            gfx_device.wait_for_fences(std::slice::from_ref(&self.fence), true, u64::MAX).vk_context("vkWaitForFences")
        }
    }

    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        let gfx_device = Gfx::get().gfx_device();
        unsafe { gfx_device.reset_fences(std::slice::from_ref(&self.fence)).vk_context("vkResetFences") }
    }
}
