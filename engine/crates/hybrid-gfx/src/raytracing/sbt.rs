//! shader binding table 的布局
//!
//! 每条记录由 shader group handle 和紧随其后的本地参数组成：
//! - raygen：handle + descriptor heap 指针
//! - miss：只有 handle
//! - hit group：handle + 三个 8 字节的本地参数

use ash::vk;

use crate::utils::helper;

/// 8 字节的本地参数
pub const SBT_ARG_SIZE: u64 = 8;
/// hit group 记录中本地参数的数量
pub const SBT_HIT_GROUP_ARG_COUNT: u64 = 3;

/// 由设备属性决定的 SBT 记录尺寸
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxSbtHandleLayout {
    pub handle_size: u64,
    pub handle_alignment: u64,
    pub base_alignment: u64,
}
impl GfxSbtHandleLayout {
    pub fn from_props(props: &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR) -> Self {
        Self {
            handle_size: props.shader_group_handle_size as u64,
            handle_alignment: props.shader_group_handle_alignment as u64,
            base_alignment: props.shader_group_base_alignment as u64,
        }
    }

    /// raygen 的 stride 需要和 size 一样
    #[inline]
    pub fn raygen_stride(&self) -> u64 {
        helper::align_up(self.handle_size + SBT_ARG_SIZE, self.base_alignment)
    }

    #[inline]
    pub fn miss_stride(&self) -> u64 {
        helper::align_up(self.handle_size, self.handle_alignment)
    }

    #[inline]
    pub fn hit_group_stride(&self) -> u64 {
        helper::align_up(self.handle_size + SBT_ARG_SIZE * SBT_HIT_GROUP_ARG_COUNT, self.handle_alignment)
    }

    /// 给定 miss 与 hit group 的记录数量，计算各个区域在 SBT 中的偏移
    pub fn sections(&self, miss_count: u64, hit_group_count: u64) -> GfxSbtSections {
        let raygen_size = self.raygen_stride();
        let miss_offset = helper::align_up(raygen_size, self.base_alignment);
        let miss_size = self.miss_stride() * miss_count;
        let hit_group_offset = helper::align_up(miss_offset + miss_size, self.base_alignment);
        let hit_group_size = self.hit_group_stride() * hit_group_count;
        let total_size = helper::align_up(hit_group_offset + hit_group_size, self.base_alignment);

        GfxSbtSections {
            raygen_offset: 0,
            raygen_size,
            miss_offset,
            miss_size,
            hit_group_offset,
            hit_group_size,
            total_size,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxSbtSections {
    pub raygen_offset: u64,
    pub raygen_size: u64,
    pub miss_offset: u64,
    pub miss_size: u64,
    pub hit_group_offset: u64,
    pub hit_group_size: u64,
    pub total_size: u64,
}

/// cmd_trace_rays 需要的四个区域
#[derive(Clone, Copy, Debug, Default)]
pub struct GfxSbtRegions {
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
    pub callable: vk::StridedDeviceAddressRegionKHR,
}
impl GfxSbtRegions {
    pub fn new(sbt_address: vk::DeviceAddress, layout: &GfxSbtHandleLayout, sections: &GfxSbtSections) -> Self {
        Self {
            raygen: vk::StridedDeviceAddressRegionKHR::default()
                .device_address(sbt_address + sections.raygen_offset)
                .stride(layout.raygen_stride())
                .size(sections.raygen_size),
            miss: vk::StridedDeviceAddressRegionKHR::default()
                .device_address(sbt_address + sections.miss_offset)
                .stride(layout.miss_stride())
                .size(sections.miss_size),
            hit: vk::StridedDeviceAddressRegionKHR::default()
                .device_address(sbt_address + sections.hit_group_offset)
                .stride(layout.hit_group_stride())
                .size(sections.hit_group_size),
            // 不使用 callable shader
            callable: vk::StridedDeviceAddressRegionKHR::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nvidia_like_layout() -> GfxSbtHandleLayout {
        GfxSbtHandleLayout {
            handle_size: 32,
            handle_alignment: 32,
            base_alignment: 64,
        }
    }

    #[test]
    fn test_strides() {
        let layout = nvidia_like_layout();
        assert_eq!(layout.raygen_stride(), 64);
        assert_eq!(layout.miss_stride(), 32);
        // 32 + 24 = 56 -> 64
        assert_eq!(layout.hit_group_stride(), 64);
    }

    #[test]
    fn test_sections_aligned_to_base() {
        let layout = nvidia_like_layout();
        let sections = layout.sections(1, 6);
        assert_eq!(sections.raygen_offset, 0);
        assert_eq!(sections.miss_offset, 64);
        assert_eq!(sections.miss_size, 32);
        assert_eq!(sections.hit_group_offset, 128);
        assert_eq!(sections.hit_group_size, 6 * 64);
        assert_eq!(sections.total_size, 128 + 384);
        assert_eq!(sections.hit_group_offset % layout.base_alignment, 0);
    }

    #[test]
    fn test_regions() {
        let layout = nvidia_like_layout();
        let sections = layout.sections(1, 2);
        let regions = GfxSbtRegions::new(0x1000, &layout, &sections);
        assert_eq!(regions.raygen.device_address, 0x1000);
        assert_eq!(regions.raygen.stride, regions.raygen.size);
        assert_eq!(regions.miss.device_address, 0x1040);
        assert_eq!(regions.hit.device_address, 0x1080);
        assert_eq!(regions.hit.size, 128);
        assert_eq!(regions.callable.size, 0);
    }
}
