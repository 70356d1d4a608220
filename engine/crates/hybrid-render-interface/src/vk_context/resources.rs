//! hybrid-gfx 的 RAII 资源作为 [`ExecContext`](crate::exec_context::ExecContext) 的关联类型

use ash::vk::{self, Handle};
use hybrid_gfx::{
    descriptors::descriptor_heap::GfxDescriptorHeap, raytracing::acceleration::GfxAcceleration,
    resources::buffer::GfxBuffer, resources::image::GfxImage2D,
};

use crate::exec_context::{GpuAccel, GpuBuffer, GpuDescriptorHeap, GpuImage};

impl GpuBuffer for GfxBuffer {
    #[inline]
    fn size(&self) -> u64 {
        GfxBuffer::size(self)
    }

    #[inline]
    fn device_address(&self) -> u64 {
        GfxBuffer::device_address(self)
    }
}

impl GpuImage for GfxImage2D {
    #[inline]
    fn extent(&self) -> vk::Extent2D {
        GfxImage2D::extent(self)
    }

    #[inline]
    fn format(&self) -> vk::Format {
        GfxImage2D::format(self)
    }
}

impl GpuAccel for GfxAcceleration {
    #[inline]
    fn size(&self) -> u64 {
        GfxAcceleration::size(self)
    }

    #[inline]
    fn device_address(&self) -> u64 {
        GfxAcceleration::device_address(self)
    }
}

impl GpuDescriptorHeap for GfxDescriptorHeap {
    #[inline]
    fn capacity(&self) -> u32 {
        GfxDescriptorHeap::capacity(self)
    }

    /// descriptor set 的原始 handle
    #[inline]
    fn gpu_handle(&self) -> u64 {
        self.set().as_raw()
    }
}
