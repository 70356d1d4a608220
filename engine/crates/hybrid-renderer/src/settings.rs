use ash::vk;
use hybrid_render_interface::resource_desc::MAX_HEAP_TEXTURES;
use serde::{Deserialize, Serialize};

/// 渲染器的固定配置
pub struct RendererSettings;
impl RendererSettings {
    /// 每个像素同时进行的光线查询数量上限
    pub const MAX_QUERIES: u64 = 16 + 1;
    /// 每帧使用的纹理数量上限
    pub const MAX_TEXTURES: usize = MAX_HEAP_TEXTURES as usize;
    /// uniform buffer 以及 instance properties buffer 的尺寸对齐
    pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

    pub const RT_OUTPUT_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;
    pub const RASTER_BG_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

    pub const MIN_RESOLUTION_SCALE: f32 = 0.01;
    pub const MAX_RESOLUTION_SCALE: f32 = 2.0;
}

/// 视图的可调参数
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewDesc {
    /// 光追分辨率相对于屏幕的比例
    pub resolution_scale: f32,
    pub soft_light_samples: i32,
    pub gi_bounces: i32,
    pub gi_env_bounces: i32,
    pub max_light_samples: i32,
    pub amb_gi_mix_weight: f32,
    pub denoiser_enabled: bool,
}
impl Default for ViewDesc {
    fn default() -> Self {
        Self {
            resolution_scale: 1.0,
            soft_light_samples: 0,
            gi_bounces: 0,
            gi_env_bounces: 0,
            max_light_samples: 12,
            amb_gi_mix_weight: 0.8,
            denoiser_enabled: false,
        }
    }
}
impl ViewDesc {
    /// 缺失的字段使用默认值
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// NaN 与无穷大回退到默认的 1.0
    #[inline]
    pub fn clamped_resolution_scale(scale: f32) -> f32 {
        if !scale.is_finite() {
            return Self::default().resolution_scale;
        }
        scale.clamp(RendererSettings::MIN_RESOLUTION_SCALE, RendererSettings::MAX_RESOLUTION_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let desc = ViewDesc::from_toml_str(
            r#"
            resolution_scale = 0.5
            gi_bounces = 2
            denoiser_enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(desc.resolution_scale, 0.5);
        assert_eq!(desc.gi_bounces, 2);
        assert!(desc.denoiser_enabled);
        assert_eq!(desc.max_light_samples, 12);
        assert_eq!(desc.amb_gi_mix_weight, 0.8);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(ViewDesc::from_toml_str("resolution_scale = \"big\"").is_err());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = toml::to_string(&ViewDesc::default()).unwrap();
        assert_eq!(ViewDesc::from_toml_str(&text).unwrap(), ViewDesc::default());
    }

    #[test]
    fn test_clamp_scale() {
        assert_eq!(ViewDesc::clamped_resolution_scale(0.0), 0.01);
        assert_eq!(ViewDesc::clamped_resolution_scale(5.0), 2.0);
        assert_eq!(ViewDesc::clamped_resolution_scale(0.75), 0.75);
        assert_eq!(ViewDesc::clamped_resolution_scale(f32::NAN), 1.0);
        assert_eq!(ViewDesc::clamped_resolution_scale(f32::INFINITY), 1.0);
    }
}
