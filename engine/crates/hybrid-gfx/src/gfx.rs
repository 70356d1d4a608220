use ash::vk;

use crate::{
    commands::queue::GfxQueue,
    error::GfxResult,
    foundation::{allocator::GfxAllocator, device::GfxDevice, physical_device::GfxPhysicalDevice},
};

/// 宿主程序创建好的 Vulkan 对象
///
/// instance / device 的创建、adapter 的选择以及 swapchain 都由宿主负责，
/// device 需要开启 [`GfxDevice::required_device_exts`] 中的扩展
pub struct GfxInitInfo {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family_index: u32,
    pub debug_utils_enabled: bool,
}

/// Vulkan 图形上下文单例
///
/// 管理分配器、设备、队列等核心资源。
/// 采用单例模式简化参数传递和生命周期管理，仅适用于单线程环境。
///
/// # 初始化流程
/// ```ignore
/// Gfx::init(init_info)?;
/// let device = Gfx::get().gfx_device();
/// // 使用...
/// Gfx::destroy();
/// ```
pub struct Gfx {
    // 字段的 drop 顺序与声明顺序一致，allocator 需要最先释放
    pub(crate) vm_allocator: GfxAllocator,
    pub(crate) gfx_queue: GfxQueue,
    pub(crate) physical_device: GfxPhysicalDevice,
    pub(crate) gfx_device: GfxDevice,
    pub(crate) instance: ash::Instance,
}

// 创建
impl Gfx {
    fn new(info: GfxInitInfo) -> GfxResult<Self> {
        let _span = tracy_client::span!("Gfx::new");

        let physical_device = GfxPhysicalDevice::new(&info.instance, info.physical_device);
        let allocator = GfxAllocator::new(&info.instance, info.physical_device, &info.device)?;
        let gfx_queue = GfxQueue::new(&info.device, info.queue_family_index);
        let gfx_device = GfxDevice::from_raw(&info.instance, info.device, info.debug_utils_enabled);

        log::info!("gfx initialized, queue family: {}", info.queue_family_index);

        Ok(Self {
            vm_allocator: allocator,
            gfx_queue,
            physical_device,
            gfx_device,
            instance: info.instance,
        })
    }
}

// 注意：此静态变量仅用于单线程环境
static mut G_GFX: Option<Gfx> = None;

// 单例模式
// - Gfx 自身的生命周期管理比较简单，因此适合使用单例模式
// - 让 RAII 资源在 Drop 时能拿到 allocator
// - 其他类的类型签名也会变得更简单
impl Gfx {
    /// 获取单例实例
    ///
    /// # Panics
    /// 如果 Gfx 还未初始化，此方法会 panic
    #[inline]
    pub fn get() -> &'static Gfx {
        unsafe {
            // 使用 addr_of! 避免直接对 static mut 创建引用，编译器不允许这种行为
            let ptr = std::ptr::addr_of!(G_GFX);
            (*ptr).as_ref().expect("Gfx not initialized. Call Gfx::init() first.")
        }
    }

    /// 初始化 Gfx 单例
    ///
    /// # Panics
    /// 如果 Gfx 已经被初始化，此方法会 panic
    pub fn init(info: GfxInitInfo) -> GfxResult<()> {
        let gfx = Self::new(info)?;
        unsafe {
            // 使用 addr_of_mut! 避免直接对 static mut 创建可变引用
            let ptr = std::ptr::addr_of_mut!(G_GFX);
            assert!((*ptr).is_none(), "Gfx already initialized");
            *ptr = Some(gfx);
        }
        Ok(())
    }

    /// 销毁 Gfx 单例
    ///
    /// 所有 GfxBuffer / GfxImage 等资源必须在此之前释放。
    /// device 与 instance 由宿主销毁。
    pub fn destroy() {
        unsafe {
            let ptr = std::ptr::addr_of_mut!(G_GFX);
            if let Some(gfx) = (*ptr).take() {
                log::info!("destroying gfx");
                drop(gfx);
            }
        }
    }
}

// getter
impl Gfx {
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn gfx_device(&self) -> &GfxDevice {
        &self.gfx_device
    }

    #[inline]
    pub fn allocator(&self) -> &GfxAllocator {
        &self.vm_allocator
    }

    #[inline]
    pub fn physical_device(&self) -> &GfxPhysicalDevice {
        &self.physical_device
    }

    #[inline]
    pub fn gfx_queue(&self) -> &GfxQueue {
        &self.gfx_queue
    }

    #[inline]
    pub fn rt_pipeline_props(&self) -> &vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static> {
        self.physical_device.rt_pipeline_props()
    }
}
