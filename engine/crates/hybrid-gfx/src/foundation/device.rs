use std::{
    ffi::{CStr, CString},
    ops::Deref,
};

use ash::vk;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::debug_type::DebugType,
};

/// Vulkan 逻辑设备封装
///
/// 逻辑设备由宿主程序创建（设备与 adapter 的选择不属于这一层），
/// 这里只持有设备以及各种扩展的函数指针。
///
/// # 扩展支持
/// - Dynamic Rendering (KHR)
/// - Acceleration Structure (KHR)
/// - Ray Tracing Pipeline (KHR)
/// - Debug Utils (EXT)，可选
pub struct GfxDevice {
    /// 核心 Vulkan 设备 API
    pub(crate) device: ash::Device,
    /// 动态渲染扩展 API
    pub(crate) dynamic_rendering: ash::khr::dynamic_rendering::Device,
    /// 加速结构扩展 API
    pub(crate) acceleration_structure: ash::khr::acceleration_structure::Device,
    /// 光线追踪管线扩展 API
    pub(crate) ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device,
    /// 调试工具扩展 API，instance 没有开启 debug utils 时为 None
    pub(crate) debug_utils: Option<ash::ext::debug_utils::Device>,
}

// 构造
impl GfxDevice {
    pub fn from_raw(instance: &ash::Instance, device: ash::Device, debug_utils_enabled: bool) -> Self {
        let _span = tracy_client::span!("GfxDevice::from_raw");

        let vk_dynamic_render_pf = ash::khr::dynamic_rendering::Device::new(instance, &device);
        let vk_acceleration_struct_pf = ash::khr::acceleration_structure::Device::new(instance, &device);
        let vk_rt_pipeline_pf = ash::khr::ray_tracing_pipeline::Device::new(instance, &device);
        let vk_debug_utils_device =
            debug_utils_enabled.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        Self {
            device,
            dynamic_rendering: vk_dynamic_render_pf,
            acceleration_structure: vk_acceleration_struct_pf,
            ray_tracing_pipeline: vk_rt_pipeline_pf,
            debug_utils: vk_debug_utils_device,
        }
    }

    /// 宿主创建 device 时必须开启的 extensions
    pub fn required_device_exts() -> Vec<&'static CStr> {
        vec![
            ash::khr::dynamic_rendering::NAME,
            // RayTracing 相关的
            ash::khr::acceleration_structure::NAME,
            ash::khr::ray_tracing_pipeline::NAME,
            ash::khr::deferred_host_operations::NAME,
        ]
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }
    #[inline]
    pub fn dynamic_rendering(&self) -> &ash::khr::dynamic_rendering::Device {
        &self.dynamic_rendering
    }
    #[inline]
    pub fn acceleration_structure(&self) -> &ash::khr::acceleration_structure::Device {
        &self.acceleration_structure
    }
    #[inline]
    pub fn ray_tracing_pipeline(&self) -> &ash::khr::ray_tracing_pipeline::Device {
        &self.ray_tracing_pipeline
    }
    #[inline]
    pub fn debug_utils(&self) -> Option<&ash::ext::debug_utils::Device> {
        self.debug_utils.as_ref()
    }
}

// tools
impl GfxDevice {
    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name.as_ref()) else {
            return;
        };
        unsafe {
            if let Err(e) = debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            ) {
                log::warn!("failed to set debug name {:?}: {}", name, e);
            }
        }
    }

    #[inline]
    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        self.set_object_debug_name(handle.vk_handle(), format!("{}::{}", T::debug_type_name(), name.as_ref()));
    }

    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle().vk_context("vkDeviceWaitIdle") }
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}
