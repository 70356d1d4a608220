use ash::vk;
use hybrid_gfx::error::GfxResult;
use hybrid_render_interface::{
    exec_context::ExecContext,
    overlay::{OverlayDrawList, OverlayVertex},
    resource_desc::{BufferDesc, RenderTarget},
};

/// 调试叠加层，所有 draw list 的顶点依次放在同一个 vertex buffer 中
pub struct OverlayRenderer<C: ExecContext> {
    vertex_buffer: Option<C::Buffer>,
    /// vertex buffer 能容纳的顶点数量，只增不减
    vertex_capacity: usize,
}
// new & init
impl<C: ExecContext> Default for OverlayRenderer<C> {
    fn default() -> Self {
        Self {
            vertex_buffer: None,
            vertex_capacity: 0,
        }
    }
}
// getters
impl<C: ExecContext> OverlayRenderer<C> {
    #[inline]
    pub fn vertex_capacity(&self) -> usize {
        self.vertex_capacity
    }
}
// tools
impl<C: ExecContext> OverlayRenderer<C> {
    /// 绘制到屏幕上，保留已有的内容
    pub fn render(&mut self, ctx: &mut C, draw_lists: &[OverlayDrawList]) -> GfxResult<()> {
        let _span = tracy_client::span!("OverlayRenderer::render");

        let total_vertices: usize = draw_lists.iter().map(|list| list.vertices.len()).sum();
        if total_vertices == 0 {
            return Ok(());
        }

        if self.vertex_buffer.is_none() || total_vertices > self.vertex_capacity {
            log::debug!("recreate overlay vertex buffer, vertices: {}", total_vertices);
            self.vertex_buffer = None;
            self.vertex_buffer = Some(ctx.create_buffer(&BufferDesc::new(
                (total_vertices * size_of::<OverlayVertex>()) as u64,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                true,
                "view-overlay-vertices",
            ))?);
            self.vertex_capacity = total_vertices;
        }
        let Some(vertex_buffer) = self.vertex_buffer.as_ref() else {
            return Ok(());
        };

        let mut offset = 0u64;
        for list in draw_lists.iter().filter(|list| !list.vertices.is_empty()) {
            let bytes: &[u8] = bytemuck::cast_slice(&list.vertices);
            ctx.write_buffer(vertex_buffer, offset, bytes)?;
            offset += bytes.len() as u64;
        }

        ctx.cmd_begin_label("overlay");
        ctx.cmd_begin_rendering(RenderTarget::Screen, None);
        let viewport = ctx.viewport();
        let scissor = ctx.scissor();
        ctx.cmd_set_viewport(viewport);
        ctx.cmd_set_scissor(scissor);

        let mut first_vertex = 0u32;
        for list in draw_lists {
            let count = list.vertices.len() as u32;
            if count > 0 {
                ctx.cmd_draw_overlay(list.primitive, vertex_buffer, first_vertex, count);
            }
            first_vertex += count;
        }

        ctx.cmd_end_rendering();
        ctx.cmd_end_label();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::{
        overlay::OverlayPrimitive,
        recording::{CreatedKind, RecordedCmd, RecordingContext},
    };

    use super::*;

    fn list(primitive: OverlayPrimitive, count: usize) -> OverlayDrawList {
        OverlayDrawList::new(primitive)
            .with_vertices((0..count).map(|i| OverlayVertex::new(glam::Vec3::splat(i as f32), glam::Vec4::ONE)))
    }

    #[test]
    fn test_draws_at_running_offsets() {
        let mut ctx = RecordingContext::new(32, 32);
        let mut overlay = OverlayRenderer::<RecordingContext>::default();
        let lists = [
            list(OverlayPrimitive::Lines, 4),
            list(OverlayPrimitive::Points, 0),
            list(OverlayPrimitive::Triangles, 3),
            list(OverlayPrimitive::Points, 2),
        ];
        overlay.render(&mut ctx, &lists).unwrap();

        let draws = ctx
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCmd::DrawOverlay {
                    primitive,
                    first_vertex,
                    count,
                } => Some((*primitive, *first_vertex, *count)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            draws,
            vec![
                (OverlayPrimitive::Lines, 0, 4),
                (OverlayPrimitive::Triangles, 4, 3),
                (OverlayPrimitive::Points, 7, 2),
            ]
        );
        assert_eq!(ctx.commands().first(), Some(&RecordedCmd::BeginLabel("overlay".to_string())));
    }

    #[test]
    fn test_vertex_buffer_grows_only() {
        let mut ctx = RecordingContext::new(32, 32);
        let mut overlay = OverlayRenderer::<RecordingContext>::default();

        for count in [3usize, 2, 3, 8, 0, 5] {
            overlay.render(&mut ctx, &[list(OverlayPrimitive::Lines, count)]).unwrap();
        }
        assert_eq!(overlay.vertex_capacity(), 8);
        assert_eq!(ctx.created_count(CreatedKind::Buffer, "view-overlay-vertices"), 2);
    }

    #[test]
    fn test_empty_lists_record_nothing() {
        let mut ctx = RecordingContext::new(32, 32);
        let mut overlay = OverlayRenderer::<RecordingContext>::default();
        overlay.render(&mut ctx, &[list(OverlayPrimitive::Points, 0)]).unwrap();
        assert!(ctx.commands().is_empty());
        assert!(ctx.created().is_empty());
    }
}
