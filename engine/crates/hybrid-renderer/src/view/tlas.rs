use ash::vk;
use hybrid_gfx::{error::GfxResult, utils::helper};
use hybrid_render_interface::{
    exec_context::ExecContext,
    resource_desc::{AccelBuildSizes, BufferDesc, TlasBuild},
};

use crate::view::render_instance::RenderInstance;

/// TLAS 及其构建所需的 buffer
///
/// 三个 buffer 只在查询到的尺寸超过当前容量时重建，不会缩小
pub struct TlasBuffers<C: ExecContext> {
    scratch: Option<C::Buffer>,
    result: Option<C::Accel>,
    instance_desc: Option<C::Buffer>,
    capacity: AccelBuildSizes,
}
// new & init
impl<C: ExecContext> Default for TlasBuffers<C> {
    fn default() -> Self {
        Self {
            scratch: None,
            result: None,
            instance_desc: None,
            capacity: AccelBuildSizes::default(),
        }
    }
}
// getters
impl<C: ExecContext> TlasBuffers<C> {
    #[inline]
    pub fn result(&self) -> Option<&C::Accel> {
        self.result.as_ref()
    }

    #[inline]
    pub fn capacity(&self) -> AccelBuildSizes {
        self.capacity
    }

    #[inline]
    pub fn instance_desc(&self) -> Option<&C::Buffer> {
        self.instance_desc.as_ref()
    }

    #[inline]
    pub fn scratch(&self) -> Option<&C::Buffer> {
        self.scratch.as_ref()
    }
}
// tools
impl<C: ExecContext> TlasBuffers<C> {
    /// 每次都完整构建
    ///
    /// 第 i 个 instance 的 custom index 为 i，hit group 记录的偏移为 2i（surface 与 shadow）
    pub fn build(&mut self, ctx: &mut C, rt_instances: &[RenderInstance]) -> GfxResult<()> {
        let _span = tracy_client::span!("TlasBuffers::build");

        let instance_count = rt_instances.len() as u32;
        let sizes = ctx.tlas_build_sizes(instance_count);
        self.ensure_capacity(ctx, sizes)?;

        let (Some(scratch), Some(result), Some(instance_desc)) =
            (self.scratch.as_ref(), self.result.as_ref(), self.instance_desc.as_ref())
        else {
            return Ok(());
        };

        let instances = rt_instances
            .iter()
            .enumerate()
            .map(|(i, inst)| Self::get_as_instance_info(i as u32, inst))
            .collect::<Vec<_>>();
        if !instances.is_empty() {
            ctx.write_buffer(instance_desc, 0, unsafe { helper::as_bytes(&instances) })?;
        }

        // 上一次的结果作为 source 传入，后端可以选择 refit
        ctx.cmd_build_tlas(&TlasBuild {
            instances: instance_desc,
            instance_count,
            scratch,
            result,
            source: Some(result),
        });
        Ok(())
    }

    fn ensure_capacity(&mut self, ctx: &mut C, sizes: AccelBuildSizes) -> GfxResult<()> {
        let fits = self.result.is_some()
            && self.capacity.scratch_size >= sizes.scratch_size
            && self.capacity.result_size >= sizes.result_size
            && self.capacity.instance_desc_size >= sizes.instance_desc_size;
        if fits {
            return Ok(());
        }

        log::info!(
            "recreate tlas buffers, scratch: {}, result: {}, instance desc: {}",
            sizes.scratch_size,
            sizes.result_size,
            sizes.instance_desc_size
        );
        self.scratch = None;
        self.result = None;
        self.instance_desc = None;
        self.capacity = AccelBuildSizes::default();

        let scratch_align = ctx.scratch_offset_alignment();
        self.scratch = Some(ctx.create_buffer(
            &BufferDesc::new(
                sizes.scratch_size,
                vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                false,
                "view-tlas-scratch",
            )
            .align(scratch_align),
        )?);
        self.result = Some(ctx.create_tlas(sizes.result_size, "view-tlas")?);
        // vkGetAccelerationStructureBuildSizes 要求 instance 数据 16 字节对齐
        self.instance_desc = Some(ctx.create_buffer(
            &BufferDesc::new(
                sizes.instance_desc_size.max(1),
                vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
                    | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
                true,
                "view-tlas-instances",
            )
            .align(16),
        )?);
        self.capacity = sizes;
        Ok(())
    }

    fn get_as_instance_info(index: u32, inst: &RenderInstance) -> vk::AccelerationStructureInstanceKHR {
        let flags = if inst.cull_disable {
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE
        } else {
            vk::GeometryInstanceFlagsKHR::empty()
        };
        vk::AccelerationStructureInstanceKHR {
            // 3x4 row-major matrix
            transform: Self::get_rt_matrix(&inst.transform),
            instance_custom_index_and_mask: vk::Packed24_8::new(index, 0xFF),
            instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
                2 * index,
                flags.as_raw() as u8,
            ),
            acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                device_handle: inst.blas_address.unwrap_or_default(),
            },
        }
    }

    pub fn get_rt_matrix(trans: &glam::Mat4) -> vk::TransformMatrixKHR {
        let c1 = &trans.x_axis;
        let c2 = &trans.y_axis;
        let c3 = &trans.z_axis;
        let c4 = &trans.w_axis;

        vk::TransformMatrixKHR {
            matrix: [
                c1.x, c2.x, c3.x, c4.x, // row 1
                c1.y, c2.y, c3.y, c4.y, // row 2
                c1.z, c2.z, c3.z, c4.z, // row 3
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::{
        exec_context::GpuBuffer,
        recording::{CreatedKind, RecordedCmd, RecordingContext},
    };

    use super::*;
    use crate::view::{render_instance::RenderBuckets, test_scene::TestScene};

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_instance_desc_layout() {
        let mut t = TestScene::new(32, 32);
        let first = t.add_raytraced();
        t.add_raytraced();
        t.scene.instance_mut(first).unwrap().flags |=
            hybrid_scene::components::instance::InstanceFlags::DISABLE_BACKFACE_CULLING;
        t.scene.instance_mut(first).unwrap().transform = glam::Mat4::from_translation(glam::vec3(1.0, 2.0, 3.0));

        let buckets = RenderBuckets::classify(&t.scene, 32);
        let mut tlas = TlasBuffers::<RecordingContext>::default();
        tlas.build(&mut t.ctx, &buckets.raytraced).unwrap();

        let bytes = tlas.instance_desc().unwrap().contents();
        assert_eq!(size_of::<vk::AccelerationStructureInstanceKHR>(), 64);
        for i in 0..2usize {
            let base = i * 64;
            let index_and_mask = read_u32(&bytes, base + 48);
            let offset_and_flags = read_u32(&bytes, base + 52);
            assert_eq!(index_and_mask & 0xFF_FFFF, i as u32);
            assert_eq!(index_and_mask >> 24, 0xFF);
            assert_eq!(offset_and_flags & 0xFF_FFFF, 2 * i as u32);
        }
        assert_eq!(read_u32(&bytes, 52) >> 24, 1);
        assert_eq!(read_u32(&bytes, 64 + 52) >> 24, 0);
        // 平移位于每一行的最后一列
        assert_eq!(f32::from_ne_bytes(bytes[12..16].try_into().unwrap()), 1.0);
        assert_eq!(f32::from_ne_bytes(bytes[28..32].try_into().unwrap()), 2.0);
        assert_eq!(f32::from_ne_bytes(bytes[44..48].try_into().unwrap()), 3.0);

        assert!(t.ctx.commands().iter().any(|c| matches!(
            c,
            RecordedCmd::BuildTlas {
                instance_count: 2,
                has_source: true,
                ..
            }
        )));
    }

    #[test]
    fn test_capacity_grows_monotonically() {
        let mut t = TestScene::new(32, 32);
        let mut tlas = TlasBuffers::<RecordingContext>::default();

        t.add_raytraced();
        let template = RenderBuckets::classify(&t.scene, 32).raytraced[0].clone();

        let mut last = AccelBuildSizes::default();
        for count in [1usize, 3, 3, 2, 5, 1] {
            let instances = vec![template.clone(); count];
            tlas.build(&mut t.ctx, &instances).unwrap();
            let cap = tlas.capacity();
            assert!(cap.scratch_size >= last.scratch_size);
            assert!(cap.result_size >= last.result_size);
            assert!(cap.instance_desc_size >= last.instance_desc_size);
            last = cap;
        }
        // 只在 1 -> 3 -> 5 时重建
        assert_eq!(t.ctx.created_count(CreatedKind::Tlas, "view-tlas"), 3);
    }

    #[test]
    fn test_scratch_follows_device_alignment() {
        let mut t = TestScene::new(32, 32);
        t.add_raytraced();
        t.ctx.set_scratch_offset_alignment(0x1_0000);
        let buckets = RenderBuckets::classify(&t.scene, 32);

        let mut tlas = TlasBuffers::<RecordingContext>::default();
        tlas.build(&mut t.ctx, &buckets.raytraced).unwrap();
        let scratch = tlas.scratch().unwrap();
        assert_ne!(scratch.device_address(), 0);
        assert_eq!(scratch.device_address() % 0x1_0000, 0);
    }
}
