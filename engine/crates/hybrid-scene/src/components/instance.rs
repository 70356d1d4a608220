use hybrid_render_interface::resource_desc::ScreenRect;

use crate::{
    components::material::Material,
    guid_new_type::{MeshHandle, TextureHandle},
};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u32 {
        /// 光追时关闭背面剔除
        const DISABLE_BACKFACE_CULLING = 1 << 0;
        /// 没有 BLAS 时作为背景绘制，同时作为光追的环境贴图
        const RASTER_BACKGROUND = 1 << 1;
    }
}

/// 场景中的一个实例
///
/// 矩形使用宿主的坐标系（原点位于左下角），None 表示使用设备的默认值
#[derive(Clone, Debug)]
pub struct Instance {
    pub mesh: MeshHandle,
    pub transform: glam::Mat4,
    pub material: Material,

    pub diffuse_texture: TextureHandle,
    pub normal_texture: Option<TextureHandle>,
    pub specular_texture: Option<TextureHandle>,

    pub scissor_rect: Option<ScreenRect>,
    pub viewport_rect: Option<ScreenRect>,
    pub flags: InstanceFlags,
}
impl Instance {
    pub fn new(mesh: MeshHandle, diffuse_texture: TextureHandle) -> Self {
        Self {
            mesh,
            transform: glam::Mat4::IDENTITY,
            material: Material::default(),
            diffuse_texture,
            normal_texture: None,
            specular_texture: None,
            scissor_rect: None,
            viewport_rect: None,
            flags: InstanceFlags::empty(),
        }
    }

    /// builder
    #[inline]
    pub fn with_transform(mut self, transform: glam::Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// builder
    #[inline]
    pub fn with_flags(mut self, flags: InstanceFlags) -> Self {
        self.flags = flags;
        self
    }
}
