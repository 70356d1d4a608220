use hybrid_render_interface::{exec_context::ExecContext, resource_desc::ScreenRect};

/// scissor 或 viewport 当前是否被 instance 覆盖
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AxisState {
    /// 使用设备的默认值
    #[default]
    Reset,
    Applied,
}

/// 光栅化时 scissor / viewport 的状态
///
/// 空矩形表示不覆盖：之前被覆盖过则恢复默认值，否则保持不变
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RasterState {
    scissor: AxisState,
    viewport: AxisState,
}
// getters
impl RasterState {
    #[inline]
    pub fn scissor(&self) -> AxisState {
        self.scissor
    }

    #[inline]
    pub fn viewport(&self) -> AxisState {
        self.viewport
    }
}
// tools
impl RasterState {
    pub fn reset_scissor<C: ExecContext>(&mut self, ctx: &mut C) {
        let scissor = ctx.scissor();
        ctx.cmd_set_scissor(scissor);
        self.scissor = AxisState::Reset;
    }

    pub fn reset_viewport<C: ExecContext>(&mut self, ctx: &mut C) {
        let viewport = ctx.viewport();
        ctx.cmd_set_viewport(viewport);
        self.viewport = AxisState::Reset;
    }

    #[inline]
    pub fn reset<C: ExecContext>(&mut self, ctx: &mut C) {
        self.reset_scissor(ctx);
        self.reset_viewport(ctx);
    }

    pub fn apply_scissor<C: ExecContext>(&mut self, ctx: &mut C, rect: &ScreenRect) {
        if !rect.is_empty() {
            ctx.cmd_set_scissor(rect.to_vk_rect());
            self.scissor = AxisState::Applied;
        } else if self.scissor == AxisState::Applied {
            self.reset_scissor(ctx);
        }
    }

    pub fn apply_viewport<C: ExecContext>(&mut self, ctx: &mut C, rect: &ScreenRect) {
        if !rect.is_empty() {
            ctx.cmd_set_viewport(rect.to_vk_viewport());
            self.viewport = AxisState::Applied;
        } else if self.viewport == AxisState::Applied {
            self.reset_viewport(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::{RecordedCmd, RecordingContext};

    use super::*;

    #[test]
    fn test_empty_rect_resets_only_after_apply() {
        let mut ctx = RecordingContext::new(64, 32);
        let mut state = RasterState::default();

        state.apply_scissor(&mut ctx, &ScreenRect::default());
        assert!(ctx.commands().is_empty());

        state.apply_scissor(&mut ctx, &ScreenRect::new(1, 2, 3, 4));
        assert_eq!(state.scissor(), AxisState::Applied);
        state.apply_scissor(&mut ctx, &ScreenRect::default());
        assert_eq!(state.scissor(), AxisState::Reset);
        assert_eq!(
            ctx.commands(),
            &[RecordedCmd::SetScissor([1, 2, 3, 4]), RecordedCmd::SetScissor([0, 0, 64, 32])]
        );
    }

    #[test]
    fn test_viewport_axis_is_independent() {
        let mut ctx = RecordingContext::new(64, 32);
        let mut state = RasterState::default();
        state.apply_viewport(&mut ctx, &ScreenRect::new(0, 0, 8, 8));
        state.apply_scissor(&mut ctx, &ScreenRect::default());
        assert_eq!((state.scissor(), state.viewport()), (AxisState::Reset, AxisState::Applied));

        state.reset(&mut ctx);
        assert_eq!(state, RasterState::default());
        assert_eq!(ctx.commands().last(), Some(&RecordedCmd::SetViewport([0.0, 0.0, 64.0, 32.0])));
    }
}
