/// 点光源，GPU 侧布局与 shader 一致
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Light {
    /// xyz 为位置，w 未使用
    pub position: glam::Vec4,
    /// rgb 为颜色，a 未使用
    pub diffuse_color: glam::Vec4,
    pub attenuation_radius: f32,
    pub point_radius: f32,
    pub specular_intensity: f32,
    pub shadow_offset: f32,
}
impl Light {
    pub fn new(position: glam::Vec3, color: glam::Vec3, attenuation_radius: f32) -> Self {
        Self {
            position: position.extend(1.0),
            diffuse_color: color.extend(1.0),
            attenuation_radius,
            point_radius: 1.0,
            specular_intensity: 1.0,
            shadow_offset: 0.0,
        }
    }
}
