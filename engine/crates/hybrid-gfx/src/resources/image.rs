use ash::vk;
use vk_mem::Alloc;

use crate::{
    error::{GfxResult, VkResultExt},
    foundation::debug_type::DebugType,
    gfx::Gfx,
};

/// 单个 mip、单个 layer 的 2D 图像，附带一个覆盖整个图像的 view
///
/// 视图的输出图像都是这种形式
pub struct GfxImage2D {
    handle: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,

    extent: vk::Extent2D,
    format: vk::Format,
}
// new & init
impl GfxImage2D {
    pub fn new(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        debug_name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxImage2D::new");
        let allocator = Gfx::get().allocator();
        let gfx_device = Gfx::get().gfx_device();

        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width.max(1),
                height: extent.height.max(1),
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, mut allocation) =
            unsafe { allocator.create_image(&image_ci, &alloc_ci).vk_context("vmaCreateImage")? };

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { gfx_device.create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { allocator.destroy_image(image, &mut allocation) };
                return Err(e).vk_context("vkCreateImageView");
            }
        };

        let image = Self {
            handle: image,
            view,
            allocation,
            extent,
            format,
        };
        gfx_device.set_debug_name(&image, debug_name.as_ref());
        gfx_device.set_object_debug_name(view, format!("ImageView::{}", debug_name.as_ref()));
        Ok(image)
    }
}
// getters
impl GfxImage2D {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}
impl DebugType for GfxImage2D {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxImage2D {
    fn drop(&mut self) {
        unsafe {
            Gfx::get().gfx_device().destroy_image_view(self.view, None);
            Gfx::get().allocator().destroy_image(self.handle, &mut self.allocation);
        }
    }
}
