use ash::vk;
use std::ptr;

use vk_mem::Alloc;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::debug_type::DebugType,
    gfx::Gfx,
};

/// RAII 的 buffer，drop 时通过全局分配器释放
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,
    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,

    debug_name: String,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        let allocator = Gfx::get().allocator();
        unsafe {
            if self.map_ptr.is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }

            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
// init & destroy
impl GfxBuffer {
    /// - align: buffer 起始地址的对齐，默认对齐到 8 字节
    /// - mem_map: 需要 CPU 读写时为 true，此时内存是 host visible 的
    /// - 优先使用 device memory
    pub fn new(
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        align: Option<vk::DeviceSize>,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxBuffer::new");

        // 不允许 UNIFORM + DBA 的组合，会有隐患
        debug_assert!(
            !(buffer_usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
                && buffer_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)),
            "UNIFORM_BUFFER + SHADER_DEVICE_ADDRESS is not allowed"
        );

        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size.max(1)).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let allocator = Gfx::get().allocator();
        let align = align.unwrap_or(8);
        let (buffer, mut alloc) = unsafe {
            allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, align).vk_context("vmaCreateBuffer")?
        };

        let mut mapped_ptr = None;
        if mem_map {
            match unsafe { allocator.map_memory(&mut alloc) } {
                Ok(ptr) => mapped_ptr = Some(ptr),
                Err(result) => {
                    unsafe { allocator.destroy_buffer(buffer, &mut alloc) };
                    return Err(GfxError::Vk {
                        call: "vmaMapMemory",
                        result,
                    });
                }
            }
        }

        let mut device_addr = None;
        if buffer_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            let gfx_device = Gfx::get().gfx_device();
            unsafe {
                device_addr =
                    Some(gfx_device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer)));
            }
        }

        Gfx::get().gfx_device().set_object_debug_name(buffer, format!("Buffer::{}", name.as_ref()));
        Ok(Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            map_ptr: mapped_ptr,
            device_addr,

            debug_name: name.as_ref().to_string(),
        })
    }
}
// getter
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    /// 没有 SHADER_DEVICE_ADDRESS usage 的 buffer 返回 0
    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_addr.unwrap_or_default()
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
// tools
impl GfxBuffer {
    fn mapped_ptr(&self) -> GfxResult<*mut u8> {
        self.map_ptr.ok_or_else(|| GfxError::NotHostVisible {
            name: self.debug_name.clone(),
        })
    }

    /// 通过 mem map 的方式将 data 写入到 buffer 的 offset 处
    pub fn write_bytes(&self, offset: vk::DeviceSize, data: &[u8]) -> GfxResult<()> {
        GfxError::check_range(&self.debug_name, offset, data.len() as u64, self.size)?;
        let dst = self.mapped_ptr()?;
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), dst.add(offset as usize), data.len());
        }
        Gfx::get()
            .allocator()
            .flush_allocation(&self.allocation, offset, data.len() as vk::DeviceSize)
            .vk_context("vmaFlushAllocation")
    }

    /// 将 buffer 中 offset 处的内容读到 dst 中
    pub fn read_bytes(&self, offset: vk::DeviceSize, dst: &mut [u8]) -> GfxResult<()> {
        GfxError::check_range(&self.debug_name, offset, dst.len() as u64, self.size)?;
        let src = self.mapped_ptr()?;
        Gfx::get()
            .allocator()
            .invalidate_allocation(&self.allocation, offset, dst.len() as vk::DeviceSize)
            .vk_context("vmaInvalidateAllocation")?;
        unsafe {
            ptr::copy_nonoverlapping(src.add(offset as usize), dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }
}
