use ash::vk;

/// 物理设备以及光追相关的属性
///
/// 物理设备的选择由外部完成，这里只负责查询需要用到的属性
pub struct GfxPhysicalDevice {
    pub(crate) handle: vk::PhysicalDevice,
    pub(crate) rt_pipeline_props: vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static>,
    pub(crate) acc_props: vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static>,
}
// new & init
impl GfxPhysicalDevice {
    pub fn new(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let _span = tracy_client::span!("GfxPhysicalDevice::new");

        let mut rt_pipeline_props = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut acc_props = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
        let basic_props = {
            let mut props2 =
                vk::PhysicalDeviceProperties2::default().push_next(&mut rt_pipeline_props).push_next(&mut acc_props);
            unsafe {
                instance.get_physical_device_properties2(handle, &mut props2);
            }
            props2.properties
        };

        // p_next 指向的是栈上的结构体，拷贝出来之后需要清空
        rt_pipeline_props.p_next = std::ptr::null_mut();
        acc_props.p_next = std::ptr::null_mut();

        log::info!(
            "physical device: {:?}, sbt handle size: {}, handle alignment: {}, base alignment: {}",
            basic_props.device_name_as_c_str().unwrap_or_default(),
            rt_pipeline_props.shader_group_handle_size,
            rt_pipeline_props.shader_group_handle_alignment,
            rt_pipeline_props.shader_group_base_alignment,
        );

        Self {
            handle,
            rt_pipeline_props,
            acc_props,
        }
    }
}
// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    #[inline]
    pub fn rt_pipeline_props(&self) -> &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static> {
        &self.rt_pipeline_props
    }

    /// scratch buffer 的地址必须是这个值的整数倍
    #[inline]
    pub fn min_scratch_offset_align(&self) -> vk::DeviceSize {
        self.acc_props.min_acceleration_structure_scratch_offset_alignment as vk::DeviceSize
    }
}
