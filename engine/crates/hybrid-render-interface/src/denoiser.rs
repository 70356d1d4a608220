use ash::vk;
use hybrid_gfx::error::GfxResult;

use crate::exec_context::ExecContext;

/// 降噪器的接入点
///
/// 降噪算法本身由外部提供，直接在 output / albedo / normal 图像上原地工作。
/// 调用 `denoise` 之前，之前录制的命令已经全部执行完毕。
pub trait Denoiser<C: ExecContext> {
    /// 绑定输入输出图像，尺寸变化或图像重建后需要重新调用
    fn set(
        &mut self,
        ctx: &mut C,
        extent: vk::Extent2D,
        output: &C::Image,
        albedo: &C::Image,
        normal: &C::Image,
    ) -> GfxResult<()>;

    fn denoise(&mut self, ctx: &mut C) -> GfxResult<()>;
}
