use ash::vk;
use hybrid_gfx::error::{GfxError, GfxResult};
use hybrid_render_interface::{exec_context::ExecContext, frame_counter::FrameCounter, overlay::OverlayDrawList};
use hybrid_scene::{guid_new_type::InstanceHandle, scene::Scene};
use slotmap::{SlotMap, new_key_type};

use crate::view::View;

new_key_type! { pub struct SceneHandle; }
new_key_type! { pub struct ViewHandle; }

struct ViewEntry<C: ExecContext> {
    scene: SceneHandle,
    view: View<C>,
    /// 下一帧要叠加的调试图元，绘制后清空
    overlay: Vec<OverlayDrawList>,
}

/// 设备级别的帧驱动
///
/// 持有唯一的执行上下文，所有场景与视图共享它
pub struct Renderer<C: ExecContext> {
    ctx: C,
    scenes: SlotMap<SceneHandle, Scene<C>>,
    views: SlotMap<ViewHandle, ViewEntry<C>>,

    frame_counter: FrameCounter,
    /// 上一帧的尺寸，变化时重建所有视图的输出 buffer
    frame_extent: vk::Extent2D,
    clear_color: [f32; 4],
}
// new & init
impl<C: ExecContext> Renderer<C> {
    pub fn new(ctx: C) -> Self {
        let frame_extent = ctx.frame_extent();
        log::info!("create renderer, frame extent: {}x{}", frame_extent.width, frame_extent.height);
        Self {
            ctx,
            scenes: SlotMap::with_key(),
            views: SlotMap::with_key(),
            frame_counter: FrameCounter::default(),
            frame_extent,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
// getters
impl<C: ExecContext> Renderer<C> {
    #[inline]
    pub fn ctx(&self) -> &C {
        &self.ctx
    }

    #[inline]
    pub fn ctx_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    #[inline]
    pub fn scene(&self, handle: SceneHandle) -> Option<&Scene<C>> {
        self.scenes.get(handle)
    }

    /// 修改场景时通常还需要执行上下文（创建 mesh、上传灯光）
    #[inline]
    pub fn scene_and_ctx_mut(&mut self, handle: SceneHandle) -> Option<(&mut Scene<C>, &mut C)> {
        self.scenes.get_mut(handle).map(|scene| (scene, &mut self.ctx))
    }

    #[inline]
    pub fn view(&self, handle: ViewHandle) -> Option<&View<C>> {
        self.views.get(handle).map(|entry| &entry.view)
    }

    #[inline]
    pub fn view_and_ctx_mut(&mut self, handle: ViewHandle) -> Option<(&mut View<C>, &mut C)> {
        self.views.get_mut(handle).map(|entry| (&mut entry.view, &mut self.ctx))
    }

    pub fn views_of(&self, scene: SceneHandle) -> impl Iterator<Item = ViewHandle> + '_ {
        self.views.iter().filter(move |(_, entry)| entry.scene == scene).map(|(handle, _)| handle)
    }

    #[inline]
    pub fn set_clear_color(&mut self, clear_color: [f32; 4]) {
        self.clear_color = clear_color;
    }
}
// scenes & views
impl<C: ExecContext> Renderer<C> {
    pub fn create_scene(&mut self) -> SceneHandle {
        self.add_scene(Scene::new())
    }

    pub fn add_scene(&mut self, scene: Scene<C>) -> SceneHandle {
        self.scenes.insert(scene)
    }

    /// 同时销毁挂在这个场景上的所有视图
    pub fn destroy_scene(&mut self, handle: SceneHandle) -> Option<Scene<C>> {
        self.views.retain(|_, entry| entry.scene != handle);
        self.scenes.remove(handle)
    }

    pub fn create_view(&mut self, scene: SceneHandle) -> GfxResult<ViewHandle> {
        if !self.scenes.contains_key(scene) {
            return Err(GfxError::InvalidHandle { kind: "scene" });
        }
        let view = View::new(&mut self.ctx)?;
        Ok(self.views.insert(ViewEntry {
            scene,
            view,
            overlay: Vec::new(),
        }))
    }

    pub fn destroy_view(&mut self, handle: ViewHandle) -> bool {
        self.views.remove(handle).is_some()
    }
}
// frame
impl<C: ExecContext> Renderer<C> {
    /// 更新并渲染所有视图，然后提交并等待
    pub fn draw(&mut self) -> GfxResult<()> {
        let _span = tracy_client::span!("Renderer::draw");

        self.draw_frame().inspect_err(|e| {
            log::error!("{} draw failed: {}", self.frame_counter.frame_name(), e);
        })?;
        self.frame_counter.next_frame();
        Ok(())
    }

    fn draw_frame(&mut self) -> GfxResult<()> {
        let extent = self.ctx.frame_extent();
        if extent != self.frame_extent {
            log::info!(
                "frame extent changed: {}x{} -> {}x{}",
                self.frame_extent.width,
                self.frame_extent.height,
                extent.width,
                extent.height
            );
            for entry in self.views.values_mut() {
                entry.view.resize(&mut self.ctx)?;
            }
            self.frame_extent = extent;
        }

        self.ctx.flush_queue_barrier();

        for entry in self.views.values_mut() {
            let Some(scene) = self.scenes.get(entry.scene) else {
                continue;
            };
            entry.view.update(&mut self.ctx, scene)?;
        }

        self.ctx.begin_frame(self.clear_color)?;
        for entry in self.views.values_mut() {
            let Some(scene) = self.scenes.get(entry.scene) else {
                continue;
            };
            entry.view.render(&mut self.ctx, scene)?;
            if !entry.overlay.is_empty() {
                let draw_lists = std::mem::take(&mut entry.overlay);
                entry.view.render_overlay(&mut self.ctx, &draw_lists)?;
            }
        }
        self.ctx.end_frame()
    }

    /// 为下一次 draw 设置调试图元，在视图渲染之后、帧结束之前绘制，只生效一帧
    pub fn set_overlay(&mut self, view: ViewHandle, draw_lists: Vec<OverlayDrawList>) -> GfxResult<()> {
        let entry = self.views.get_mut(view).ok_or(GfxError::InvalidHandle { kind: "view" })?;
        entry.overlay = draw_lists;
        Ok(())
    }

    pub fn pick(&mut self, view: ViewHandle, x: i32, y: i32) -> GfxResult<Option<InstanceHandle>> {
        let entry = self.views.get_mut(view).ok_or(GfxError::InvalidHandle { kind: "view" })?;
        entry.view.get_raytraced_instance_at(&mut self.ctx, x, y)
    }

    /// 把当前 render target 的像素拷贝回 CPU
    pub fn dump_render_target(&mut self) -> GfxResult<Vec<u8>> {
        let _span = tracy_client::span!("Renderer::dump_render_target");
        self.ctx.read_render_target()
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::{CreatedKind, RecordedCmd, RecordingContext};

    use itertools::Itertools;

    use super::*;
    use crate::view::test_scene::TestScene;

    fn renderer_with(t: TestScene) -> (Renderer<RecordingContext>, SceneHandle) {
        let mut renderer = Renderer::new(t.ctx);
        let scene = renderer.add_scene(t.scene);
        (renderer, scene)
    }

    #[test]
    fn test_draw_flow() {
        let mut t = TestScene::new(64, 32);
        t.add_raytraced();
        t.add_foreground();
        let (mut renderer, scene) = renderer_with(t);
        renderer.create_view(scene).unwrap();
        renderer.ctx_mut().clear_commands();

        renderer.draw().unwrap();

        let commands = renderer.ctx().commands();
        let begin = commands.iter().position(|c| *c == RecordedCmd::BeginFrame).unwrap();
        let end = commands.iter().position(|c| *c == RecordedCmd::EndFrame).unwrap();
        let build = commands.iter().position(|c| matches!(c, RecordedCmd::BuildTlas { .. })).unwrap();
        let trace = commands.iter().position(|c| matches!(c, RecordedCmd::TraceRays { .. })).unwrap();
        assert!(build < begin && begin < trace && trace < end);
        assert_eq!(end, commands.len() - 1);
        assert_eq!(renderer.frame_counter().frame_id(), 1);
    }

    #[test]
    fn test_multiple_views_render_each_frame() {
        let mut t = TestScene::new(64, 32);
        t.add_foreground();
        let (mut renderer, scene) = renderer_with(t);
        renderer.create_view(scene).unwrap();
        renderer.create_view(scene).unwrap();
        assert_eq!(renderer.views_of(scene).count(), 2);

        renderer.draw().unwrap();
        let fg_passes = renderer
            .ctx()
            .commands()
            .iter()
            .filter(|c| **c == RecordedCmd::BeginLabel("raster-fg-to-screen".to_string()))
            .count();
        assert_eq!(fg_passes, 2);
    }

    #[test]
    fn test_overlay_drawn_inside_frame() {
        use hybrid_render_interface::overlay::{OverlayPrimitive, OverlayVertex};

        let mut t = TestScene::new(64, 32);
        t.add_foreground();
        let (mut renderer, scene) = renderer_with(t);
        let view = renderer.create_view(scene).unwrap();
        let lines = OverlayDrawList::new(OverlayPrimitive::Lines)
            .with_vertices((0..4).map(|i| OverlayVertex::new(glam::Vec3::splat(i as f32), glam::Vec4::ONE)));
        renderer.set_overlay(view, vec![lines]).unwrap();
        renderer.ctx_mut().clear_commands();

        renderer.draw().unwrap();
        let commands = renderer.ctx().commands();
        let begin = commands.iter().position(|c| *c == RecordedCmd::BeginFrame).unwrap();
        let end = commands.iter().position(|c| *c == RecordedCmd::EndFrame).unwrap();
        let fg = commands
            .iter()
            .position(|c| *c == RecordedCmd::BeginLabel("raster-fg-to-screen".to_string()))
            .unwrap();
        let overlays = commands
            .iter()
            .positions(|c| matches!(c, RecordedCmd::DrawOverlay { .. }))
            .collect::<Vec<_>>();
        assert_eq!(overlays.len(), 1);
        assert!(overlays.iter().all(|&i| begin < i && fg < i && i < end));

        // 只生效一帧
        renderer.ctx_mut().clear_commands();
        renderer.draw().unwrap();
        assert!(!renderer.ctx().commands().iter().any(|c| matches!(c, RecordedCmd::DrawOverlay { .. })));
        assert!(renderer.set_overlay(ViewHandle::default(), Vec::new()).is_err());
    }

    #[test]
    fn test_destroy_scene_destroys_views() {
        let t = TestScene::new(64, 32);
        let (mut renderer, scene) = renderer_with(t);
        let view = renderer.create_view(scene).unwrap();
        let other = renderer.create_scene();
        let other_view = renderer.create_view(other).unwrap();

        assert!(renderer.destroy_scene(scene).is_some());
        assert!(renderer.view(view).is_none());
        assert!(renderer.view(other_view).is_some());
        assert!(matches!(renderer.create_view(scene), Err(GfxError::InvalidHandle { kind: "scene" })));
        assert!(renderer.destroy_view(other_view));
        assert!(!renderer.destroy_view(other_view));
    }

    #[test]
    fn test_extent_change_resizes_views() {
        let mut t = TestScene::new(64, 32);
        t.add_raytraced();
        let (mut renderer, scene) = renderer_with(t);
        let view = renderer.create_view(scene).unwrap();
        renderer.draw().unwrap();

        renderer.ctx_mut().set_frame_extent(100, 50);
        renderer.draw().unwrap();
        assert_eq!(renderer.ctx().created_count(CreatedKind::Buffer, "view-hit-distance"), 2);
        let outputs = renderer.view(view).unwrap().outputs();
        assert_eq!(outputs.screen_extent(), vk::Extent2D { width: 100, height: 50 });

        renderer.draw().unwrap();
        assert_eq!(renderer.ctx().created_count(CreatedKind::Buffer, "view-hit-distance"), 2);
    }

    #[test]
    fn test_pick_and_dump() {
        let mut t = TestScene::new(16, 16);
        let rt = t.add_raytraced();
        let (mut renderer, scene) = renderer_with(t);
        let view = renderer.create_view(scene).unwrap();
        renderer.draw().unwrap();

        assert_eq!(renderer.pick(view, 2, 2).unwrap(), Some(rt));
        assert_eq!(renderer.pick(view, -2, 2).unwrap(), None);
        assert!(renderer.pick(ViewHandle::default(), 0, 0).is_err());
        assert_eq!(renderer.dump_render_target().unwrap().len(), 16 * 16 * 4);
    }

    #[test]
    fn test_scene_edit_through_renderer() {
        let t = TestScene::new(16, 16);
        let (mut renderer, scene) = renderer_with(t);
        let lights = [hybrid_scene::components::light::Light::new(glam::Vec3::ZERO, glam::Vec3::ONE, 5.0)];
        let (scene_mut, ctx) = renderer.scene_and_ctx_mut(scene).unwrap();
        scene_mut.set_lights(ctx, &lights).unwrap();
        assert_eq!(renderer.scene(scene).unwrap().lights_count(), 1);
    }
}
