/// GPU 侧的材质，与 shader 中的布局一致
///
/// 三个纹理序号由视图在每帧分类时改写为本帧纹理列表中的位置，-1 表示没有该纹理
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Material {
    pub diffuse_tex_index: i32,
    pub normal_tex_index: i32,
    pub specular_tex_index: i32,
    pub light_group_mask_bits: u32,

    /// rgb 为颜色，a 为与纹理颜色的混合比例
    pub diffuse_color_mix: glam::Vec4,
    /// rgb 为自发光，a 未使用
    pub self_light: glam::Vec4,
    /// rgb 为雾的颜色，a 为雾的强度
    pub fog_color: glam::Vec4,

    pub specular_intensity: f32,
    pub specular_exponent: f32,
    pub reflection_factor: f32,
    pub reflection_fresnel_factor: f32,
    pub refraction_factor: f32,
    pub ignore_normal_factor: f32,
    pub fog_mul: f32,
    pub fog_offset: f32,
}
impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse_tex_index: -1,
            normal_tex_index: -1,
            specular_tex_index: -1,
            light_group_mask_bits: u32::MAX,
            diffuse_color_mix: glam::Vec4::ZERO,
            self_light: glam::Vec4::ZERO,
            fog_color: glam::Vec4::ZERO,
            specular_intensity: 1.0,
            specular_exponent: 1.0,
            reflection_factor: 0.0,
            reflection_fresnel_factor: 0.0,
            refraction_factor: 0.0,
            ignore_normal_factor: 0.0,
            fog_mul: 0.0,
            fog_offset: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_layout() {
        assert_eq!(size_of::<Material>(), 96);
        let mat = Material::default();
        assert_eq!((mat.diffuse_tex_index, mat.normal_tex_index, mat.specular_tex_index), (-1, -1, -1));
    }
}
