use ash::vk;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::debug_type::DebugType,
    gfx::Gfx,
};

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    debug_name: String,
}
// new & init
impl GfxCommandPool {
    pub fn new(queue_family_index: u32, flags: vk::CommandPoolCreateFlags, debug_name: &str) -> GfxResult<Self> {
        let gfx_device = Gfx::get().gfx_device();
        let pool = unsafe {
            gfx_device
                .create_command_pool(
                    &vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index).flags(flags),
                    None,
                )
                .vk_context("vkCreateCommandPool")?
        };

        let command_pool = Self {
            handle: pool,
            debug_name: debug_name.to_string(),
        };
        gfx_device.set_debug_name(&command_pool, debug_name);
        Ok(command_pool)
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        log::debug!("dropping command pool: {}", self.debug_name);
        // 销毁 pool 会一并释放其中分配的 command buffer
        unsafe {
            Gfx::get().gfx_device().destroy_command_pool(self.handle, None);
        }
    }
}
