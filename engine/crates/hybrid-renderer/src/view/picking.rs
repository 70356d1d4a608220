use hybrid_gfx::{commands::resource_state::GfxBufferState, error::GfxResult};
use hybrid_render_interface::exec_context::ExecContext;
use hybrid_scene::guid_new_type::InstanceHandle;

use crate::view::View;

impl<C: ExecContext> View<C> {
    /// 屏幕坐标 (x, y) 处光追命中的 instance，坐标原点在左上角
    ///
    /// 每帧第一次调用时会把 hit instance id 拷贝回 CPU（提交并等待 GPU）。
    /// 像素上没有命中任何几何体时，id buffer 中的值为 0，返回的是第一个光追 instance。
    pub fn get_raytraced_instance_at(&mut self, ctx: &mut C, x: i32, y: i32) -> GfxResult<Option<InstanceHandle>> {
        let _span = tracy_client::span!("View::get_raytraced_instance_at");

        if !self.hit_readback_valid {
            self.copy_hit_instance_ids(ctx)?;
            self.hit_readback_valid = true;
        }

        let screen = self.outputs.screen_extent();
        if x < 0 || y < 0 || x >= screen.width as i32 || y >= screen.height as i32 {
            return Ok(None);
        }

        let rt = self.outputs.rt_extent();
        let rx = (x as f32 * self.rt_scale) as i32;
        let ry = (y as f32 * self.rt_scale) as i32;
        if rx < 0 || ry < 0 || rx >= rt.width as i32 || ry >= rt.height as i32 {
            return Ok(None);
        }

        let offset = (rt.width as u64 * ry as u64 + rx as u64) * 2;
        let mut id = [0u8; 2];
        ctx.read_buffer(&self.outputs.hit_instance_id_readback, offset, &mut id)?;
        let id = u16::from_ne_bytes(id) as usize;

        Ok(self.buckets.raytraced.get(id).map(|inst| inst.instance))
    }

    /// 只拷贝第一层 query 的数据
    fn copy_hit_instance_ids(&self, ctx: &mut C) -> GfxResult<()> {
        let rt = self.outputs.rt_extent();
        let size = rt.width as u64 * rt.height as u64 * 2;
        let outputs = &self.outputs;

        ctx.cmd_buffer_barrier(
            &outputs.hit_instance_id,
            GfxBufferState::STORAGE_READ_WRITE_RAY_TRACING,
            GfxBufferState::TRANSFER_SRC,
        );
        ctx.cmd_copy_buffer(&outputs.hit_instance_id, &outputs.hit_instance_id_readback, size);
        ctx.cmd_buffer_barrier(
            &outputs.hit_instance_id,
            GfxBufferState::TRANSFER_SRC,
            GfxBufferState::STORAGE_READ_WRITE_RAY_TRACING,
        );
        ctx.cmd_buffer_barrier(
            &outputs.hit_instance_id_readback,
            GfxBufferState::TRANSFER_DST,
            GfxBufferState::HOST_READ,
        );
        ctx.submit_and_wait()
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::{RecordedCmd, RecordingContext};

    use crate::view::{View, test_scene::TestScene};

    fn set_id(t: &TestScene, view: &View<RecordingContext>, x: u32, y: u32, id: u16) {
        let width = view.outputs().rt_extent().width;
        let offset = ((width * y + x) * 2) as u64;
        t.ctx.poke_buffer(&view.outputs().hit_instance_id, offset, &id.to_ne_bytes()).unwrap();
    }

    #[test]
    fn test_pick_hit_and_stale_ids() {
        let mut t = TestScene::new(20, 10);
        let first = t.add_raytraced();
        let second = t.add_raytraced();
        t.add_foreground();

        let mut view = View::new(&mut t.ctx).unwrap();
        view.update(&mut t.ctx, &t.scene).unwrap();
        set_id(&t, &view, 3, 4, 1);
        set_id(&t, &view, 5, 5, 7);

        assert_eq!(view.get_raytraced_instance_at(&mut t.ctx, 3, 4).unwrap(), Some(second));
        // 没有命中时是 0，对应第一个 instance
        assert_eq!(view.get_raytraced_instance_at(&mut t.ctx, 0, 0).unwrap(), Some(first));
        assert_eq!(view.get_raytraced_instance_at(&mut t.ctx, 5, 5).unwrap(), None);

        // 一帧只回读一次
        let submits = t.ctx.commands().iter().filter(|c| **c == RecordedCmd::SubmitAndWait).count();
        assert_eq!(submits, 1);
    }

    #[test]
    fn test_pick_out_of_bounds() {
        let mut t = TestScene::new(20, 10);
        t.add_raytraced();
        let mut view = View::new(&mut t.ctx).unwrap();
        view.update(&mut t.ctx, &t.scene).unwrap();

        for (x, y) in [(-1, 0), (0, -1), (20, 0), (0, 10), (100, 100)] {
            assert_eq!(view.get_raytraced_instance_at(&mut t.ctx, x, y).unwrap(), None);
        }
    }

    #[test]
    fn test_pick_uses_scaled_coordinates() {
        let mut t = TestScene::new(20, 10);
        t.add_raytraced();
        let second = t.add_raytraced();
        let mut view = View::new(&mut t.ctx).unwrap();
        view.set_resolution_scale(0.5);
        view.update(&mut t.ctx, &t.scene).unwrap();
        assert_eq!(view.outputs().rt_extent().width, 10);

        set_id(&t, &view, 4, 2, 1);
        assert_eq!(view.get_raytraced_instance_at(&mut t.ctx, 9, 5).unwrap(), Some(second));
        assert!(view.get_raytraced_instance_at(&mut t.ctx, 19, 9).unwrap().is_some());
    }

    #[test]
    fn test_readback_refreshed_next_frame() {
        let mut t = TestScene::new(8, 8);
        t.add_raytraced();
        let second = t.add_raytraced();
        let mut view = View::new(&mut t.ctx).unwrap();
        view.update(&mut t.ctx, &t.scene).unwrap();

        view.get_raytraced_instance_at(&mut t.ctx, 1, 1).unwrap();
        set_id(&t, &view, 1, 1, 1);
        // 同一帧内仍然是旧数据
        assert_ne!(view.get_raytraced_instance_at(&mut t.ctx, 1, 1).unwrap(), Some(second));

        view.render(&mut t.ctx, &t.scene).unwrap();
        assert_eq!(view.get_raytraced_instance_at(&mut t.ctx, 1, 1).unwrap(), Some(second));
    }
}
