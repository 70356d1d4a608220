use ash::vk;
use hybrid_gfx::{
    error::GfxResult,
    raytracing::sbt::{GfxSbtRegions, GfxSbtSections, SBT_ARG_SIZE},
};
use hybrid_render_interface::{
    exec_context::{ExecContext, GpuBuffer},
    resource_desc::{BufferDesc, ShaderGroup},
};

use crate::view::render_instance::RenderInstance;

/// 每个光追 instance 对应的两条 hit group 记录
const HIT_GROUPS_PER_INSTANCE: u64 = 2;

/// shader binding table
///
/// 每帧重写全部内容；存储只在需要的尺寸超过当前容量时重建
pub struct ShaderBindingTable<C: ExecContext> {
    storage: Option<C::Buffer>,
    sections: GfxSbtSections,
    regions: GfxSbtRegions,
}
// new & init
impl<C: ExecContext> Default for ShaderBindingTable<C> {
    fn default() -> Self {
        Self {
            storage: None,
            sections: GfxSbtSections::default(),
            regions: GfxSbtRegions::default(),
        }
    }
}
// getters
impl<C: ExecContext> ShaderBindingTable<C> {
    #[inline]
    pub fn regions(&self) -> &GfxSbtRegions {
        &self.regions
    }

    #[inline]
    pub fn sections(&self) -> &GfxSbtSections {
        &self.sections
    }

    #[inline]
    pub fn storage(&self) -> Option<&C::Buffer> {
        self.storage.as_ref()
    }
}
// tools
impl<C: ExecContext> ShaderBindingTable<C> {
    /// 记录顺序：raygen，shadow miss，之后每个 instance 依次是 surface、shadow 两条 hit group
    pub fn build(&mut self, ctx: &mut C, heap_ptr: u64, rt_instances: &[RenderInstance]) -> GfxResult<()> {
        let _span = tracy_client::span!("ShaderBindingTable::build");

        let layout = ctx.sbt_handle_layout();
        let hit_group_count = rt_instances.len() as u64 * HIT_GROUPS_PER_INSTANCE;
        let sections = layout.sections(1, hit_group_count);

        let needs_grow = self.storage.as_ref().is_none_or(|buffer| buffer.size() < sections.total_size);
        if needs_grow {
            log::info!("recreate shader binding table, size: {}", sections.total_size);
            self.storage = None;
            self.storage = Some(ctx.create_buffer(
                &BufferDesc::new(
                    sections.total_size,
                    vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    true,
                    "view-sbt",
                )
                .align(layout.base_alignment),
            )?);
        }

        let mut data = vec![0u8; sections.total_size as usize];
        let handle_size = layout.handle_size as usize;
        let mut write_record = |ctx: &C, offset: u64, group: ShaderGroup, args: &[u64]| -> GfxResult<()> {
            let offset = offset as usize;
            data[offset..offset + handle_size].copy_from_slice(ctx.shader_group_handle(group)?);
            for (i, arg) in args.iter().enumerate() {
                let arg_offset = offset + handle_size + i * SBT_ARG_SIZE as usize;
                data[arg_offset..arg_offset + SBT_ARG_SIZE as usize].copy_from_slice(&arg.to_ne_bytes());
            }
            Ok(())
        };

        write_record(ctx, sections.raygen_offset, ShaderGroup::TraceRayGen, &[heap_ptr])?;
        write_record(ctx, sections.miss_offset, ShaderGroup::ShadowMiss, &[])?;

        let hit_stride = layout.hit_group_stride();
        for (i, inst) in rt_instances.iter().enumerate() {
            let args = [inst.vertex_address, inst.index_address, heap_ptr];
            let base = sections.hit_group_offset + i as u64 * HIT_GROUPS_PER_INSTANCE * hit_stride;
            write_record(ctx, base, ShaderGroup::SurfaceHitGroup, &args)?;
            write_record(ctx, base + hit_stride, ShaderGroup::ShadowHitGroup, &args)?;
        }

        let Some(storage) = self.storage.as_ref() else {
            return Ok(());
        };
        ctx.write_buffer(storage, 0, &data)?;

        self.sections = sections;
        self.regions = GfxSbtRegions::new(storage.device_address(), &layout, &sections);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::{CreatedKind, RecordingContext};

    use super::*;
    use crate::view::{render_instance::RenderBuckets, test_scene::TestScene};

    fn read_u64(bytes: &[u8], offset: u64) -> u64 {
        let offset = offset as usize;
        u64::from_ne_bytes(bytes[offset..offset + 8].try_into().unwrap())
    }

    fn group_tag(group: ShaderGroup) -> u8 {
        RecordingContext::shader_group_index(group) as u8 + 1
    }

    #[test]
    fn test_hit_records_follow_instance_order() {
        let mut t = TestScene::new(16, 16);
        for _ in 0..3 {
            t.add_raytraced();
        }
        t.add_foreground();
        let mut buckets = RenderBuckets::classify(&t.scene, 16);
        // 不同的地址，方便检查顺序
        for (i, inst) in buckets.raytraced.iter_mut().enumerate() {
            inst.vertex_address = 0x1000 * (i as u64 + 1);
            inst.index_address = 0x10 * (i as u64 + 1);
        }

        let mut sbt = ShaderBindingTable::<RecordingContext>::default();
        sbt.build(&mut t.ctx, 0xABCD, &buckets.raytraced).unwrap();

        let layout = t.ctx.sbt_handle_layout();
        let sections = *sbt.sections();
        assert_eq!(sections.hit_group_size, 6 * layout.hit_group_stride());

        let bytes = sbt.storage().unwrap().contents();
        assert_eq!(bytes[0], group_tag(ShaderGroup::TraceRayGen));
        assert_eq!(read_u64(&bytes, layout.handle_size), 0xABCD);
        assert_eq!(bytes[sections.miss_offset as usize], group_tag(ShaderGroup::ShadowMiss));

        let stride = layout.hit_group_stride();
        for i in 0..3u64 {
            for (j, group) in [ShaderGroup::SurfaceHitGroup, ShaderGroup::ShadowHitGroup].into_iter().enumerate() {
                let record = sections.hit_group_offset + (2 * i + j as u64) * stride;
                assert_eq!(bytes[record as usize], group_tag(group));
                let args = record + layout.handle_size;
                assert_eq!(read_u64(&bytes, args), 0x1000 * (i + 1));
                assert_eq!(read_u64(&bytes, args + 8), 0x10 * (i + 1));
                assert_eq!(read_u64(&bytes, args + 16), 0xABCD);
            }
        }

        let regions = sbt.regions();
        assert_eq!(regions.hit.size, 6 * stride);
        assert_eq!(regions.hit.device_address, sbt.storage().unwrap().device_address() + sections.hit_group_offset);
    }

    #[test]
    fn test_storage_grows_only() {
        let mut t = TestScene::new(16, 16);
        t.add_raytraced();
        let template = RenderBuckets::classify(&t.scene, 16).raytraced[0].clone();
        let mut sbt = ShaderBindingTable::<RecordingContext>::default();

        let mut sizes = Vec::new();
        for count in [2usize, 1, 2, 4, 0] {
            sbt.build(&mut t.ctx, 1, &vec![template.clone(); count]).unwrap();
            sizes.push(sbt.storage().unwrap().size());
        }
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(t.ctx.created_count(CreatedKind::Buffer, "view-sbt"), 2);
        // 容量保持不变，但区域只覆盖本帧的记录
        assert_eq!(sbt.regions().hit.size, 0);
    }
}
