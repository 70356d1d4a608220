use ash::vk;
use hybrid_gfx::{error::GfxResult, utils::helper};
use hybrid_render_interface::{
    exec_context::{ExecContext, GpuBuffer},
    resource_desc::BufferDesc,
};
use hybrid_scene::components::material::Material;

use crate::{settings::RendererSettings, view::render_instance::RenderBuckets};

/// shader 中每个 instance 的属性，与 shader 中的布局一致
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceProperties {
    pub object_to_world: glam::Mat4,
    /// 上 3x3 的逆转置，平移为 0
    pub object_to_world_normal: glam::Mat4,
    pub material: Material,
}
impl InstanceProperties {
    pub fn new(transform: glam::Mat4, material: Material) -> Self {
        Self {
            object_to_world: transform,
            object_to_world_normal: Self::normal_matrix(&transform),
            material,
        }
    }

    pub fn normal_matrix(transform: &glam::Mat4) -> glam::Mat4 {
        let upper = glam::Mat3::from_mat4(*transform);
        glam::Mat4::from_mat3(upper.inverse().transpose())
    }
}

/// 所有 instance 的属性，顺序为光追、背景、前景
pub struct InstancePropsBuffer<C: ExecContext> {
    buffer: Option<C::Buffer>,
    records: Vec<InstanceProperties>,
}
// new & init
impl<C: ExecContext> Default for InstancePropsBuffer<C> {
    fn default() -> Self {
        Self {
            buffer: None,
            records: Vec::new(),
        }
    }
}
// getters
impl<C: ExecContext> InstancePropsBuffer<C> {
    #[inline]
    pub fn buffer(&self) -> Option<&C::Buffer> {
        self.buffer.as_ref()
    }

    #[inline]
    pub fn records(&self) -> &[InstanceProperties] {
        &self.records
    }

    /// 按 constant buffer 的对齐取整，至少一个对齐单位
    #[inline]
    pub fn required_size(count: usize) -> u64 {
        helper::align_up(
            (count * size_of::<InstanceProperties>()) as u64,
            RendererSettings::CONSTANT_BUFFER_ALIGNMENT,
        )
        .max(RendererSettings::CONSTANT_BUFFER_ALIGNMENT)
    }
}
// tools
impl<C: ExecContext> InstancePropsBuffer<C> {
    /// 尺寸变化时重建 buffer，同时在 CPU 端准备好所有记录
    pub fn prepare(&mut self, ctx: &mut C, buckets: &RenderBuckets) -> GfxResult<()> {
        let _span = tracy_client::span!("InstancePropsBuffer::prepare");

        let size = Self::required_size(buckets.total_count());
        if self.buffer.as_ref().is_none_or(|buffer| buffer.size() != size) {
            log::debug!("recreate instance properties buffer, size: {}", size);
            self.buffer = None;
            self.buffer = Some(ctx.create_buffer(&BufferDesc::new(
                size,
                vk::BufferUsageFlags::STORAGE_BUFFER,
                true,
                "view-instance-props",
            ))?);
        }

        self.records.clear();
        self.records
            .extend(buckets.iter_ordered().map(|inst| InstanceProperties::new(inst.transform, inst.material)));
        Ok(())
    }

    pub fn upload(&self, ctx: &mut C) -> GfxResult<()> {
        let _span = tracy_client::span!("InstancePropsBuffer::upload");

        match self.buffer.as_ref() {
            Some(buffer) if !self.records.is_empty() => {
                ctx.write_buffer(buffer, 0, bytemuck::cast_slice(&self.records))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::{CreatedKind, RecordingContext};

    use super::*;
    use crate::view::test_scene::TestScene;

    #[test]
    fn test_layout() {
        assert_eq!(size_of::<InstanceProperties>(), 224);
        assert_eq!(InstancePropsBuffer::<RecordingContext>::required_size(0), 256);
        assert_eq!(InstancePropsBuffer::<RecordingContext>::required_size(1), 256);
        assert_eq!(InstancePropsBuffer::<RecordingContext>::required_size(3), 768);
    }

    #[test]
    fn test_normal_matrix() {
        let transform = glam::Mat4::from_scale_rotation_translation(
            glam::vec3(2.0, 1.0, 1.0),
            glam::Quat::IDENTITY,
            glam::vec3(5.0, 6.0, 7.0),
        );
        let normal = InstanceProperties::normal_matrix(&transform);
        assert_eq!(normal.w_axis, glam::Vec4::W);
        assert!((normal.x_axis.x - 0.5).abs() < 1e-6);
        assert_eq!(normal.y_axis.y, 1.0);
    }

    #[test]
    fn test_records_follow_bucket_order() {
        let mut t = TestScene::new(16, 16);
        let fg = t.add_foreground();
        let bg = t.add_background();
        let rt = t.add_raytraced();
        for (handle, x) in [(rt, 1.0), (bg, 2.0), (fg, 3.0)] {
            t.scene.instance_mut(handle).unwrap().transform = glam::Mat4::from_translation(glam::vec3(x, 0.0, 0.0));
        }

        let buckets = RenderBuckets::classify(&t.scene, 16);
        let mut props = InstancePropsBuffer::<RecordingContext>::default();
        props.prepare(&mut t.ctx, &buckets).unwrap();
        props.upload(&mut t.ctx).unwrap();

        let xs = props.records().iter().map(|r| r.object_to_world.w_axis.x).collect::<Vec<_>>();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);

        let bytes = props.buffer().unwrap().contents();
        let uploaded = bytes[..3 * 224]
            .chunks_exact(224)
            .map(bytemuck::pod_read_unaligned::<InstanceProperties>)
            .collect::<Vec<_>>();
        assert_eq!(uploaded, props.records());
    }

    #[test]
    fn test_recreated_only_when_size_changes() {
        let mut t = TestScene::new(16, 16);
        t.add_foreground();
        let mut props = InstancePropsBuffer::<RecordingContext>::default();

        let buckets = RenderBuckets::classify(&t.scene, 16);
        props.prepare(&mut t.ctx, &buckets).unwrap();
        props.prepare(&mut t.ctx, &buckets).unwrap();
        assert_eq!(t.ctx.created_count(CreatedKind::Buffer, "view-instance-props"), 1);

        t.add_foreground();
        t.add_foreground();
        let buckets = RenderBuckets::classify(&t.scene, 16);
        props.prepare(&mut t.ctx, &buckets).unwrap();
        assert_eq!(t.ctx.created_count(CreatedKind::Buffer, "view-instance-props"), 2);
        assert_eq!(props.buffer().unwrap().size(), 768);
    }
}
