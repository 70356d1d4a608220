//! 视图的 descriptor heap
//!
//! 固定槽位按注册顺序排列，之后是本帧使用的纹理。
//! 槽位顺序与 shader 中的绑定一一对应，不能随意调整。

use hybrid_gfx::error::GfxResult;
use hybrid_render_interface::{
    exec_context::{ExecContext, GpuDescriptorHeap},
    resource_desc::{DescriptorKind, DescriptorWrite},
};
use indexmap::IndexMap;

use crate::view::output_buffers::OutputBuffers;

/// heap 中的固定槽位
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeapSlot {
    Output,
    Albedo,
    Normal,
    HitDistance,
    HitColor,
    HitNormal,
    HitSpecular,
    HitInstanceId,
    Background,
    SceneBvh,
    ViewParams,
    SceneLights,
    InstanceProps,
}
impl HeapSlot {
    pub const ALL: [HeapSlot; 13] = [
        HeapSlot::Output,
        HeapSlot::Albedo,
        HeapSlot::Normal,
        HeapSlot::HitDistance,
        HeapSlot::HitColor,
        HeapSlot::HitNormal,
        HeapSlot::HitSpecular,
        HeapSlot::HitInstanceId,
        HeapSlot::Background,
        HeapSlot::SceneBvh,
        HeapSlot::ViewParams,
        HeapSlot::SceneLights,
        HeapSlot::InstanceProps,
    ];

    pub fn kind(self) -> DescriptorKind {
        match self {
            HeapSlot::Output | HeapSlot::Albedo | HeapSlot::Normal => DescriptorKind::StorageImage,
            HeapSlot::HitDistance
            | HeapSlot::HitColor
            | HeapSlot::HitNormal
            | HeapSlot::HitSpecular
            | HeapSlot::HitInstanceId
            | HeapSlot::SceneLights
            | HeapSlot::InstanceProps => DescriptorKind::StorageBuffer,
            HeapSlot::Background => DescriptorKind::SampledImage,
            HeapSlot::SceneBvh => DescriptorKind::AccelerationStructure,
            HeapSlot::ViewParams => DescriptorKind::UniformBuffer,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorTableError {
    #[error("heap slot {0:?} is registered twice")]
    Duplicate(HeapSlot),

    #[error("cannot register heap slot {slot:?}: table holds at most {max_slots} slots")]
    Overflow { slot: HeapSlot, max_slots: usize },
}

/// 按注册顺序分配槽位
pub struct DescriptorTableLayoutBuilder {
    slots: IndexMap<HeapSlot, DescriptorKind>,
    max_slots: usize,
}
impl DescriptorTableLayoutBuilder {
    pub fn new(max_slots: usize) -> Self {
        Self {
            slots: IndexMap::with_capacity(max_slots),
            max_slots,
        }
    }

    pub fn register(mut self, slot: HeapSlot) -> Result<Self, DescriptorTableError> {
        if self.slots.contains_key(&slot) {
            return Err(DescriptorTableError::Duplicate(slot));
        }
        if self.slots.len() >= self.max_slots {
            return Err(DescriptorTableError::Overflow {
                slot,
                max_slots: self.max_slots,
            });
        }
        self.slots.insert(slot, slot.kind());
        Ok(self)
    }

    pub fn build(self) -> DescriptorTableLayout {
        let kinds = self.slots.values().copied().collect();
        DescriptorTableLayout {
            slots: self.slots,
            kinds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorTableLayout {
    slots: IndexMap<HeapSlot, DescriptorKind>,
    kinds: Vec<DescriptorKind>,
}
impl DescriptorTableLayout {
    /// shader 使用的布局：[`HeapSlot::ALL`] 的顺序
    pub fn standard() -> Self {
        let builder = HeapSlot::ALL
            .iter()
            .try_fold(DescriptorTableLayoutBuilder::new(HeapSlot::ALL.len()), |builder, slot| builder.register(*slot));
        match builder {
            Ok(builder) => builder.build(),
            Err(e) => panic!("invalid standard descriptor table layout: {e}"),
        }
    }

    /// 槽位在 heap 中的序号
    #[inline]
    pub fn slot_index(&self, slot: HeapSlot) -> Option<u32> {
        self.slots.get_index_of(&slot).map(|i| i as u32)
    }

    #[inline]
    pub fn kinds(&self) -> &[DescriptorKind] {
        &self.kinds
    }

    #[inline]
    pub fn fixed_count(&self) -> u32 {
        self.kinds.len() as u32
    }
}

/// 写入 heap 的资源
pub struct HeapResources<'a, C: ExecContext> {
    pub outputs: &'a OutputBuffers<C>,
    /// 没有光追 instance 时为 None，槽位依然保留
    pub tlas: Option<&'a C::Accel>,
    pub view_params: &'a C::Buffer,
    pub lights: Option<&'a C::Buffer>,
    pub lights_count: u32,
    pub instance_props: &'a C::Buffer,
    pub textures: Vec<&'a C::Image>,
}

pub struct DescriptorTable<C: ExecContext> {
    layout: DescriptorTableLayout,
    heap: Option<C::DescriptorHeap>,
    /// 只有一个槽位，用于 compose 时采样光追输出
    compose_heap: Option<C::DescriptorHeap>,
}
// new & init
impl<C: ExecContext> Default for DescriptorTable<C> {
    fn default() -> Self {
        Self {
            layout: DescriptorTableLayout::standard(),
            heap: None,
            compose_heap: None,
        }
    }
}
// getters
impl<C: ExecContext> DescriptorTable<C> {
    #[inline]
    pub fn layout(&self) -> &DescriptorTableLayout {
        &self.layout
    }

    #[inline]
    pub fn heap(&self) -> Option<&C::DescriptorHeap> {
        self.heap.as_ref()
    }

    #[inline]
    pub fn compose_heap(&self) -> Option<&C::DescriptorHeap> {
        self.compose_heap.as_ref()
    }

    /// 写入 SBT 的 heap 指针
    #[inline]
    pub fn heap_gpu_handle(&self) -> u64 {
        self.heap.as_ref().map_or(0, |heap| heap.gpu_handle())
    }
}
// tools
impl<C: ExecContext> DescriptorTable<C> {
    pub fn build(&mut self, ctx: &mut C, res: &HeapResources<'_, C>) -> GfxResult<()> {
        let _span = tracy_client::span!("DescriptorTable::build");

        let entry_count = self.layout.fixed_count() + res.textures.len() as u32;
        let needs_grow = self.heap.as_ref().is_none_or(|heap| heap.capacity() < entry_count);
        if needs_grow {
            log::info!("recreate view descriptor heap, entries: {}", entry_count);
            self.heap = None;
            self.heap = Some(ctx.create_descriptor_heap(
                self.layout.kinds(),
                res.textures.len() as u32,
                "view-descriptor-heap",
            )?);
        }

        let writes = self.collect_writes(res);
        if let Some(heap) = self.heap.as_mut() {
            ctx.write_descriptors(heap, &writes)?;
        }

        if self.compose_heap.is_none() {
            self.compose_heap =
                Some(ctx.create_descriptor_heap(&[DescriptorKind::SampledImage], 0, "view-compose-heap")?);
        }
        if let Some(compose_heap) = self.compose_heap.as_mut() {
            ctx.write_descriptors(
                compose_heap,
                &[DescriptorWrite::SampledImage {
                    slot: 0,
                    image: &res.outputs.rt_output,
                }],
            )?;
        }
        Ok(())
    }

    fn collect_writes<'a>(&self, res: &HeapResources<'a, C>) -> Vec<DescriptorWrite<'a, C>> {
        let outputs = res.outputs;
        let mut writes = Vec::with_capacity(HeapSlot::ALL.len() + res.textures.len());

        for slot in HeapSlot::ALL {
            let Some(index) = self.layout.slot_index(slot) else {
                continue;
            };
            let write = match slot {
                HeapSlot::Output => Some(DescriptorWrite::StorageImage {
                    slot: index,
                    image: &outputs.rt_output,
                }),
                HeapSlot::Albedo => Some(DescriptorWrite::StorageImage {
                    slot: index,
                    image: &outputs.rt_albedo,
                }),
                HeapSlot::Normal => Some(DescriptorWrite::StorageImage {
                    slot: index,
                    image: &outputs.rt_normal,
                }),
                HeapSlot::HitDistance => Some(DescriptorWrite::StorageBuffer {
                    slot: index,
                    buffer: &outputs.hit_distance,
                }),
                HeapSlot::HitColor => Some(DescriptorWrite::StorageBuffer {
                    slot: index,
                    buffer: &outputs.hit_color,
                }),
                HeapSlot::HitNormal => Some(DescriptorWrite::StorageBuffer {
                    slot: index,
                    buffer: &outputs.hit_normal,
                }),
                HeapSlot::HitSpecular => Some(DescriptorWrite::StorageBuffer {
                    slot: index,
                    buffer: &outputs.hit_specular,
                }),
                HeapSlot::HitInstanceId => Some(DescriptorWrite::StorageBuffer {
                    slot: index,
                    buffer: &outputs.hit_instance_id,
                }),
                HeapSlot::Background => Some(DescriptorWrite::SampledImage {
                    slot: index,
                    image: &outputs.raster_bg,
                }),
                HeapSlot::SceneBvh => res
                    .tlas
                    .map(|accel| DescriptorWrite::AccelerationStructure { slot: index, accel }),
                HeapSlot::ViewParams => Some(DescriptorWrite::UniformBuffer {
                    slot: index,
                    buffer: res.view_params,
                }),
                HeapSlot::SceneLights => res
                    .lights
                    .filter(|_| res.lights_count > 0)
                    .map(|buffer| DescriptorWrite::StorageBuffer { slot: index, buffer }),
                HeapSlot::InstanceProps => Some(DescriptorWrite::StorageBuffer {
                    slot: index,
                    buffer: res.instance_props,
                }),
            };
            writes.extend(write);
        }

        writes.extend(
            res.textures
                .iter()
                .enumerate()
                .map(|(i, image)| DescriptorWrite::Texture {
                    array_index: i as u32,
                    image: *image,
                }),
        );
        writes
    }
}

#[cfg(test)]
mod tests {
    use ash::vk;
    use hybrid_render_interface::{
        recording::{CreatedKind, RecDescriptor, RecordingContext},
        resource_desc::BufferDesc,
    };

    use super::*;
    use crate::view::test_scene::TestScene;

    struct Fixture {
        t: TestScene,
        outputs: OutputBuffers<RecordingContext>,
        params: hybrid_render_interface::recording::RecBuffer,
        props: hybrid_render_interface::recording::RecBuffer,
    }
    impl Fixture {
        fn new() -> Self {
            let mut t = TestScene::new(16, 16);
            let extent = t.ctx.frame_extent();
            let outputs = OutputBuffers::new(&mut t.ctx, extent, 1.0).unwrap();
            let params = t
                .ctx
                .create_buffer(&BufferDesc::new(512, vk::BufferUsageFlags::UNIFORM_BUFFER, true, "params"))
                .unwrap();
            let props = t
                .ctx
                .create_buffer(&BufferDesc::new(256, vk::BufferUsageFlags::STORAGE_BUFFER, true, "props"))
                .unwrap();
            Self { t, outputs, params, props }
        }
    }

    #[test]
    fn test_standard_layout_order() {
        let layout = DescriptorTableLayout::standard();
        assert_eq!(layout.fixed_count(), 13);
        assert_eq!(layout.slot_index(HeapSlot::Output), Some(0));
        assert_eq!(layout.slot_index(HeapSlot::HitInstanceId), Some(7));
        assert_eq!(layout.slot_index(HeapSlot::SceneBvh), Some(9));
        assert_eq!(layout.slot_index(HeapSlot::InstanceProps), Some(12));
        assert_eq!(layout.kinds()[10], DescriptorKind::UniformBuffer);
    }

    #[test]
    fn test_builder_rejects_duplicate_and_overflow() {
        let dup = DescriptorTableLayoutBuilder::new(4)
            .register(HeapSlot::Output)
            .and_then(|b| b.register(HeapSlot::Output));
        assert!(matches!(dup, Err(DescriptorTableError::Duplicate(HeapSlot::Output))));

        let overflow = DescriptorTableLayoutBuilder::new(1)
            .register(HeapSlot::Output)
            .and_then(|b| b.register(HeapSlot::Albedo));
        assert!(matches!(
            overflow,
            Err(DescriptorTableError::Overflow {
                slot: HeapSlot::Albedo,
                max_slots: 1
            })
        ));
    }

    #[test]
    fn test_missing_tlas_and_lights_keep_offsets() {
        let mut f = Fixture::new();
        let mut table = DescriptorTable::<RecordingContext>::default();
        let texture = f.t.scene.texture(f.t.texture).unwrap();
        let res = HeapResources {
            outputs: &f.outputs,
            tlas: None,
            view_params: &f.params,
            lights: None,
            lights_count: 0,
            instance_props: &f.props,
            textures: vec![texture, texture],
        };
        table.build(&mut f.t.ctx, &res).unwrap();

        let heap = table.heap().unwrap();
        assert_eq!(heap.capacity(), 15);
        assert_eq!(heap.entry(0), Some(RecDescriptor::Image(f.outputs.rt_output.id())));
        assert_eq!(heap.entry(9), None);
        assert_eq!(heap.entry(10), Some(RecDescriptor::Buffer(f.params.id())));
        assert_eq!(heap.entry(11), None);
        assert_eq!(heap.entry(12), Some(RecDescriptor::Buffer(f.props.id())));
        assert_eq!(heap.texture_entry(0), Some(RecDescriptor::Image(texture.id())));
        assert_eq!(heap.entry(14), Some(RecDescriptor::Image(texture.id())));

        let compose = table.compose_heap().unwrap();
        assert_eq!(compose.entry(0), Some(RecDescriptor::Image(f.outputs.rt_output.id())));
    }

    #[test]
    fn test_heap_grows_monotonically() {
        let mut f = Fixture::new();
        let mut table = DescriptorTable::<RecordingContext>::default();
        let texture = f.t.scene.texture(f.t.texture).unwrap();

        let mut capacities = Vec::new();
        for count in [1usize, 3, 2, 3, 4, 0] {
            let res = HeapResources {
                outputs: &f.outputs,
                tlas: None,
                view_params: &f.params,
                lights: None,
                lights_count: 0,
                instance_props: &f.props,
                textures: vec![texture; count],
            };
            table.build(&mut f.t.ctx, &res).unwrap();
            capacities.push(table.heap().unwrap().capacity());
        }
        assert_eq!(capacities, vec![14, 16, 16, 16, 17, 17]);
        assert_eq!(f.t.ctx.created_count(CreatedKind::DescriptorHeap, "view-descriptor-heap"), 3);
        assert_eq!(f.t.ctx.created_count(CreatedKind::DescriptorHeap, "view-compose-heap"), 1);
    }

    #[test]
    fn test_tlas_and_lights_written_when_present() {
        let mut f = Fixture::new();
        let mut table = DescriptorTable::<RecordingContext>::default();
        let tlas = f.t.ctx.create_tlas(256, "tlas").unwrap();
        let lights = f
            .t
            .ctx
            .create_buffer(&BufferDesc::new(48, vk::BufferUsageFlags::STORAGE_BUFFER, true, "lights"))
            .unwrap();
        let res = HeapResources {
            outputs: &f.outputs,
            tlas: Some(&tlas),
            view_params: &f.params,
            lights: Some(&lights),
            lights_count: 1,
            instance_props: &f.props,
            textures: Vec::new(),
        };
        table.build(&mut f.t.ctx, &res).unwrap();

        let heap = table.heap().unwrap();
        assert_eq!(heap.entry(9), Some(RecDescriptor::Accel(tlas.id())));
        assert_eq!(heap.entry(11), Some(RecDescriptor::Buffer(lights.id())));
        assert_ne!(table.heap_gpu_handle(), 0);
    }
}
