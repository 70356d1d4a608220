/// 每帧渲染流程中的阶段，严格按声明顺序推进
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPhase {
    #[default]
    Update,
    RasterBackgroundToScreen,
    RasterBackgroundToEnvMap,
    Raytrace,
    Denoise,
    Compose,
    RasterForegroundToScreen,
    FrameComplete,
}
impl RenderPhase {
    /// 同时用作 debug label
    pub fn name(self) -> &'static str {
        match self {
            RenderPhase::Update => "update",
            RenderPhase::RasterBackgroundToScreen => "raster-bg-to-screen",
            RenderPhase::RasterBackgroundToEnvMap => "raster-bg-to-env-map",
            RenderPhase::Raytrace => "raytrace",
            RenderPhase::Denoise => "denoise",
            RenderPhase::Compose => "compose",
            RenderPhase::RasterForegroundToScreen => "raster-fg-to-screen",
            RenderPhase::FrameComplete => "frame-complete",
        }
    }
}
