//! 单个 descriptor set 形式的 descriptor heap
//!
//! 固定槽位依次占据 binding 0..n，每个 binding 只有一个 descriptor；
//! 纹理数组放在最后一个 binding，数量可变。

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, GfxResult, VkResultExt},
    foundation::debug_type::DebugType,
    gfx::Gfx,
};

pub struct GfxDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    fixed_types: Vec<vk::DescriptorType>,
    max_textures: u32,
}
// new & init
impl GfxDescriptorSetLayout {
    /// - fixed_types: 每个固定槽位的 descriptor 类型，槽位序号即 binding
    /// - max_textures: 纹理数组的最大长度，0 表示没有纹理数组
    pub fn new(fixed_types: &[vk::DescriptorType], max_textures: u32, debug_name: impl AsRef<str>) -> GfxResult<Self> {
        let mut bindings = fixed_types
            .iter()
            .enumerate()
            .map(|(binding, ty)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding as u32)
                    .descriptor_type(*ty)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect_vec();
        let mut binding_flags = vec![vk::DescriptorBindingFlags::PARTIALLY_BOUND; fixed_types.len()];

        if max_textures > 0 {
            bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(fixed_types.len() as u32)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(max_textures)
                    .stage_flags(vk::ShaderStageFlags::ALL),
            );
            binding_flags.push(
                vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
            );
        }

        let mut bind_flags_ci = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings).push_next(&mut bind_flags_ci);

        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe {
            gfx_device.create_descriptor_set_layout(&create_info, None).vk_context("vkCreateDescriptorSetLayout")?
        };
        let layout = Self {
            handle,
            fixed_types: fixed_types.to_vec(),
            max_textures,
        };
        gfx_device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }
}
// getters
impl GfxDescriptorSetLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    #[inline]
    pub fn fixed_types(&self) -> &[vk::DescriptorType] {
        &self.fixed_types
    }

    #[inline]
    pub fn max_textures(&self) -> u32 {
        self.max_textures
    }

    /// 纹理数组所在的 binding
    #[inline]
    pub fn texture_binding(&self) -> u32 {
        self.fixed_types.len() as u32
    }
}
impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_set_layout(self.handle, None);
        }
    }
}
impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// 拥有独立 pool 的 descriptor set
///
/// pool 只为这一个 set 服务，drop 时 set 跟随 pool 一起释放
pub struct GfxDescriptorHeap {
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,

    texture_binding: u32,
    /// 固定槽位数量 + 纹理数量
    capacity: u32,
    texture_capacity: u32,
}
// new & init
impl GfxDescriptorHeap {
    /// texture_capacity 不能超过 layout 的 max_textures
    pub fn new(layout: &GfxDescriptorSetLayout, texture_capacity: u32, debug_name: impl AsRef<str>) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxDescriptorHeap::new");
        let texture_capacity = texture_capacity.min(layout.max_textures());

        let mut pool_sizes = layout
            .fixed_types()
            .iter()
            .counts()
            .into_iter()
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: count as u32,
            })
            .collect_vec();
        if layout.max_textures() > 0 {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: texture_capacity.max(1),
            });
        }

        let gfx_device = Gfx::get().gfx_device();
        let pool = unsafe {
            gfx_device
                .create_descriptor_pool(
                    &vk::DescriptorPoolCreateInfo::default().max_sets(1).pool_sizes(&pool_sizes),
                    None,
                )
                .vk_context("vkCreateDescriptorPool")?
        };

        let set_layouts = [layout.handle()];
        let variable_counts = [texture_capacity];
        let mut variable_count_info =
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::default().descriptor_counts(&variable_counts);
        let mut alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(&set_layouts);
        if layout.max_textures() > 0 {
            alloc_info = alloc_info.push_next(&mut variable_count_info);
        }

        let set = match unsafe { gfx_device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets[0],
            Err(e) => {
                unsafe { gfx_device.destroy_descriptor_pool(pool, None) };
                return Err(e).vk_context("vkAllocateDescriptorSets");
            }
        };

        let heap = Self {
            pool,
            set,
            texture_binding: layout.texture_binding(),
            capacity: layout.texture_binding() + texture_capacity,
            texture_capacity,
        };
        gfx_device.set_debug_name(&heap, debug_name.as_ref());
        gfx_device.set_object_debug_name(pool, format!("DescriptorPool::{}", debug_name.as_ref()));
        Ok(heap)
    }
}
// getters
impl GfxDescriptorHeap {
    #[inline]
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn texture_capacity(&self) -> u32 {
        self.texture_capacity
    }
}
// tools
impl GfxDescriptorHeap {
    fn update(&self, write: vk::WriteDescriptorSet) {
        unsafe {
            Gfx::get().gfx_device().update_descriptor_sets(std::slice::from_ref(&write), &[]);
        }
    }

    pub fn write_storage_image(&self, binding: u32, view: vk::ImageView) {
        let image_info = [vk::DescriptorImageInfo::default().image_view(view).image_layout(vk::ImageLayout::GENERAL)];
        self.update(
            vk::WriteDescriptorSet::default()
                .dst_set(self.set)
                .dst_binding(binding)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .image_info(&image_info),
        );
    }

    pub fn write_sampled_image(&self, binding: u32, view: vk::ImageView) {
        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        self.update(
            vk::WriteDescriptorSet::default()
                .dst_set(self.set)
                .dst_binding(binding)
                .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                .image_info(&image_info),
        );
    }

    pub fn write_buffer(&self, binding: u32, ty: vk::DescriptorType, buffer: vk::Buffer, range: vk::DeviceSize) {
        let buffer_info = [vk::DescriptorBufferInfo::default().buffer(buffer).offset(0).range(range)];
        self.update(
            vk::WriteDescriptorSet::default()
                .dst_set(self.set)
                .dst_binding(binding)
                .descriptor_type(ty)
                .buffer_info(&buffer_info),
        );
    }

    pub fn write_acceleration_structure(&self, binding: u32, accel: vk::AccelerationStructureKHR) {
        let accels = [accel];
        let mut accel_info =
            vk::WriteDescriptorSetAccelerationStructureKHR::default().acceleration_structures(&accels);
        let mut write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
            .push_next(&mut accel_info);
        // acceleration structure 的数量不会由 push_next 自动填充
        write.descriptor_count = 1;
        self.update(write);
    }

    /// 写入纹理数组的第 array_index 个元素
    pub fn write_texture(&self, array_index: u32, view: vk::ImageView, sampler: vk::Sampler) -> GfxResult<()> {
        if array_index >= self.texture_capacity {
            return Err(GfxError::OutOfBounds {
                name: "descriptor heap textures".to_string(),
                offset: array_index as u64,
                len: 1,
                size: self.texture_capacity as u64,
            });
        }
        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(view)
            .sampler(sampler)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        self.update(
            vk::WriteDescriptorSet::default()
                .dst_set(self.set)
                .dst_binding(self.texture_binding)
                .dst_array_element(array_index)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info),
        );
        Ok(())
    }
}
impl Drop for GfxDescriptorHeap {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_pool(self.pool, None);
        }
    }
}
impl DebugType for GfxDescriptorHeap {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorHeap"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.set
    }
}
