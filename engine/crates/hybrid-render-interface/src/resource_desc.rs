//! 创建 GPU 资源以及录制命令时使用的描述结构

use ash::vk;
use hybrid_gfx::commands::resource_state::GfxImageState;

use crate::exec_context::ExecContext;

/// descriptor heap 中纹理数组的上限
pub const MAX_HEAP_TEXTURES: u32 = 1024;

#[derive(Clone, Debug)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    /// 需要 CPU 读写时为 true
    pub host_visible: bool,
    /// 起始地址的对齐，None 表示使用默认对齐
    pub align: Option<u64>,
    pub name: String,
}
impl BufferDesc {
    #[inline]
    pub fn new(size: u64, usage: vk::BufferUsageFlags, host_visible: bool, name: impl Into<String>) -> Self {
        Self {
            size,
            usage,
            host_visible,
            align: None,
            name: name.into(),
        }
    }

    /// builder
    #[inline]
    pub fn align(mut self, align: u64) -> Self {
        self.align = Some(align);
        self
    }
}

#[derive(Clone, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// 创建完成后图像所处的状态
    pub initial_state: GfxImageState,
    pub name: String,
}

/// descriptor heap 中每个固定槽位的类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    StorageImage,
    SampledImage,
    StorageBuffer,
    UniformBuffer,
    AccelerationStructure,
}
impl DescriptorKind {
    pub fn vk_descriptor_type(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::AccelerationStructure => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        }
    }
}

/// 写入 descriptor heap 的一个条目
///
/// slot 是固定槽位的序号，纹理使用纹理数组中的序号
pub enum DescriptorWrite<'a, C: ExecContext> {
    StorageImage { slot: u32, image: &'a C::Image },
    SampledImage { slot: u32, image: &'a C::Image },
    StorageBuffer { slot: u32, buffer: &'a C::Buffer },
    UniformBuffer { slot: u32, buffer: &'a C::Buffer },
    AccelerationStructure { slot: u32, accel: &'a C::Accel },
    Texture { array_index: u32, image: &'a C::Image },
}

/// 光追管线中的 shader group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderGroup {
    TraceRayGen,
    ShadowMiss,
    SurfaceHitGroup,
    ShadowHitGroup,
}
impl ShaderGroup {
    pub const ALL: [ShaderGroup; 4] = [
        ShaderGroup::TraceRayGen,
        ShaderGroup::ShadowMiss,
        ShaderGroup::SurfaceHitGroup,
        ShaderGroup::ShadowHitGroup,
    ];

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            ShaderGroup::TraceRayGen => "TraceRayGen",
            ShaderGroup::ShadowMiss => "ShadowMiss",
            ShaderGroup::SurfaceHitGroup => "SurfaceHitGroup",
            ShaderGroup::ShadowHitGroup => "ShadowHitGroup",
        }
    }
}

/// 构建 TLAS 时需要的尺寸
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccelBuildSizes {
    pub scratch_size: u64,
    pub result_size: u64,
    pub instance_desc_size: u64,
}

pub struct TlasBuild<'a, C: ExecContext> {
    /// 已经写入 instance desc 的 buffer
    pub instances: &'a C::Buffer,
    pub instance_count: u32,
    pub scratch: &'a C::Buffer,
    pub result: &'a C::Accel,
    /// 上一帧的结果，后端可以用来做 refit，正确性不依赖它
    pub source: Option<&'a C::Accel>,
}

/// 光栅化的渲染目标
pub enum RenderTarget<'a, C: ExecContext> {
    /// 宿主提供的当前帧 render target
    Screen,
    Image(&'a C::Image),
}

/// 一次光栅化的 indexed draw
pub struct RasterDraw<'a, C: ExecContext> {
    pub vertex_buffer: &'a C::Buffer,
    pub vertex_stride: u32,
    pub index_buffer: &'a C::Buffer,
    pub index_count: u32,
    /// 通过 push constant 传给 shader，用于索引 instance properties
    pub instance_index: u32,
}

/// 宿主使用的矩形，原点位于左下角
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}
impl ScreenRect {
    #[inline]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// 面积为 0 的矩形表示不覆盖设备的默认值
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// 翻转到设备坐标系（原点位于左上角）
    #[inline]
    pub fn flip_y(&self, screen_height: u32) -> ScreenRect {
        ScreenRect {
            x: self.x,
            y: screen_height as i32 - self.y - self.h,
            w: self.w,
            h: self.h,
        }
    }

    #[inline]
    pub fn to_vk_rect(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: self.x, y: self.y },
            extent: vk::Extent2D {
                width: self.w.max(0) as u32,
                height: self.h.max(0) as u32,
            },
        }
    }

    #[inline]
    pub fn to_vk_viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: self.x as f32,
            y: self.y as f32,
            width: self.w as f32,
            height: self.h as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_y() {
        let rect = ScreenRect::new(10, 20, 100, 50);
        let flipped = rect.flip_y(720);
        assert_eq!(flipped, ScreenRect::new(10, 650, 100, 50));
        // 翻转两次回到原处
        assert_eq!(flipped.flip_y(720), rect);
    }

    #[test]
    fn test_empty_rect() {
        assert!(ScreenRect::default().is_empty());
        assert!(ScreenRect::new(0, 0, 10, 0).is_empty());
        assert!(!ScreenRect::new(0, 0, 1, 1).is_empty());
    }

    #[test]
    fn test_vk_conversion() {
        let rect = ScreenRect::new(4, 8, 16, 32);
        let r = rect.to_vk_rect();
        assert_eq!((r.offset.x, r.offset.y, r.extent.width, r.extent.height), (4, 8, 16, 32));
        let v = rect.to_vk_viewport();
        assert_eq!((v.x, v.y, v.width, v.height, v.max_depth), (4.0, 8.0, 16.0, 32.0, 1.0));
    }
}
