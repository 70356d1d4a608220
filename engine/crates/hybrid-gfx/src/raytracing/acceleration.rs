//! 光追使用的加速结构

use ash::vk;

use crate::{
    commands::command_buffer::GfxCommandBuffer,
    error::{GfxResult, VkResultExt},
    foundation::debug_type::DebugType,
    gfx::Gfx,
    resources::buffer::GfxBuffer,
};

/// 构建 TLAS 所需的各种尺寸
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxTlasBuildSizes {
    pub scratch_size: vk::DeviceSize,
    pub result_size: vk::DeviceSize,
    pub instance_desc_size: vk::DeviceSize,
}

/// 加速结构以及存放它的 buffer
pub struct GfxAcceleration {
    acceleration_structure: vk::AccelerationStructureKHR,
    buffer: GfxBuffer,
}
impl DebugType for GfxAcceleration {
    fn debug_type_name() -> &'static str {
        "GfxAcceleration"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.acceleration_structure
    }
}
// new & init
impl GfxAcceleration {
    /// 创建 AccelerationStructure 以及 buffer，内容需要之后通过 build 命令写入
    pub fn new(
        size: vk::DeviceSize,
        ty: vk::AccelerationStructureTypeKHR,
        debug_name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let buffer = GfxBuffer::new(
            size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            Some(256),
            false,
            format!("{}-buffer", debug_name.as_ref()),
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default() //
            .ty(ty)
            .size(size)
            .buffer(buffer.vk_buffer());

        let acceleration_structure = unsafe {
            Gfx::get()
                .gfx_device()
                .acceleration_structure()
                .create_acceleration_structure(&create_info, None)
                .vk_context("vkCreateAccelerationStructureKHR")?
        };

        let acc = Self {
            acceleration_structure,
            buffer,
        };
        Gfx::get().gfx_device().set_debug_name(&acc, debug_name);
        Ok(acc)
    }
}
// getters
impl GfxAcceleration {
    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.acceleration_structure
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }

    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        unsafe {
            Gfx::get().gfx_device().acceleration_structure().get_acceleration_structure_device_address(
                &vk::AccelerationStructureDeviceAddressInfoKHR::default()
                    .acceleration_structure(self.acceleration_structure),
            )
        }
    }
}
// tools
impl GfxAcceleration {
    fn tlas_geometry(instance_address: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR<'static> {
        vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    // true: data 是 &[vk::AccelerationStructureInstanceKHR]
                    // false: data 是 &[&vk::AccelerationStructureInstanceKHR]
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: instance_address,
                    }),
            })
    }

    /// 查询包含 instance_count 个实例的 TLAS 所需的尺寸
    pub fn tlas_build_sizes(instance_count: u32) -> GfxTlasBuildSizes {
        let geometry = Self::tlas_geometry(0);
        let build_geometry_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .geometries(std::slice::from_ref(&geometry));

        let size_info = unsafe {
            let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
            Gfx::get().gfx_device().acceleration_structure().get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_geometry_info,
                &[instance_count],
                &mut size_info,
            );
            size_info
        };

        GfxTlasBuildSizes {
            scratch_size: size_info.build_scratch_size,
            result_size: size_info.acceleration_structure_size,
            instance_desc_size: (size_of::<vk::AccelerationStructureInstanceKHR>() as u64) * instance_count as u64,
        }
    }

    /// 录制 TLAS 的构建命令，每次都以 BUILD 模式完整构建
    ///
    /// instance buffer 中需要已经写入了 instance_count 个 instance desc
    pub fn cmd_build_tlas(
        cmd: &GfxCommandBuffer,
        dst: &GfxAcceleration,
        instance_buffer: &GfxBuffer,
        instance_count: u32,
        scratch_buffer: &GfxBuffer,
    ) {
        let geometry = Self::tlas_geometry(instance_buffer.device_address());
        let range_info = vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(instance_count);

        let mut build_geometry_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .geometries(std::slice::from_ref(&geometry));
        build_geometry_info.dst_acceleration_structure = dst.handle();
        build_geometry_info.scratch_data.device_address = scratch_buffer.device_address();

        cmd.build_acceleration_structure(&build_geometry_info, std::slice::from_ref(&range_info));
    }
}
impl Drop for GfxAcceleration {
    fn drop(&mut self) {
        unsafe {
            Gfx::get()
                .gfx_device()
                .acceleration_structure()
                .destroy_acceleration_structure(self.acceleration_structure, None);
        }
    }
}
