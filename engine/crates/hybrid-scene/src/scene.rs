use ash::vk;
use hybrid_gfx::error::GfxResult;
use hybrid_render_interface::{
    exec_context::{ExecContext, GpuBuffer},
    resource_desc::BufferDesc,
};
use indexmap::IndexSet;
use slotmap::SlotMap;

use crate::{
    components::{instance::Instance, light::Light, mesh::Mesh},
    guid_new_type::{InstanceHandle, MeshHandle, TextureHandle},
};

/// 在 CPU 侧管理场景数据
///
/// instance 按照添加的顺序遍历，移除不会打乱其余 instance 的顺序
pub struct Scene<C: ExecContext> {
    all_meshes: SlotMap<MeshHandle, Mesh<C>>,
    all_textures: SlotMap<TextureHandle, C::Image>,
    all_instances: SlotMap<InstanceHandle, Instance>,
    instance_order: IndexSet<InstanceHandle>,

    lights_buffer: Option<C::Buffer>,
    lights_count: u32,
}
// new & init
impl<C: ExecContext> Default for Scene<C> {
    fn default() -> Self {
        Self {
            all_meshes: SlotMap::with_key(),
            all_textures: SlotMap::with_key(),
            all_instances: SlotMap::with_key(),
            instance_order: IndexSet::new(),
            lights_buffer: None,
            lights_count: 0,
        }
    }
}
impl<C: ExecContext> Scene<C> {
    pub fn new() -> Self {
        Self::default()
    }
}
// getters
impl<C: ExecContext> Scene<C> {
    #[inline]
    pub fn mesh(&self, handle: MeshHandle) -> Option<&Mesh<C>> {
        self.all_meshes.get(handle)
    }
    #[inline]
    pub fn mesh_mut(&mut self, handle: MeshHandle) -> Option<&mut Mesh<C>> {
        self.all_meshes.get_mut(handle)
    }
    #[inline]
    pub fn texture(&self, handle: TextureHandle) -> Option<&C::Image> {
        self.all_textures.get(handle)
    }
    #[inline]
    pub fn instance(&self, handle: InstanceHandle) -> Option<&Instance> {
        self.all_instances.get(handle)
    }
    #[inline]
    pub fn instance_mut(&mut self, handle: InstanceHandle) -> Option<&mut Instance> {
        self.all_instances.get_mut(handle)
    }

    /// 按添加顺序遍历所有 instance
    pub fn instances(&self) -> impl Iterator<Item = (InstanceHandle, &Instance)> {
        self.instance_order
            .iter()
            .filter_map(|handle| self.all_instances.get(*handle).map(|instance| (*handle, instance)))
    }

    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instance_order.len()
    }

    #[inline]
    pub fn lights_buffer(&self) -> Option<&C::Buffer> {
        self.lights_buffer.as_ref()
    }

    /// lights buffer 中有效的光源数量
    #[inline]
    pub fn lights_count(&self) -> u32 {
        self.lights_count
    }
}
// tools
impl<C: ExecContext> Scene<C> {
    pub fn register_mesh(&mut self, mesh: Mesh<C>) -> MeshHandle {
        self.all_meshes.insert(mesh)
    }

    pub fn remove_mesh(&mut self, handle: MeshHandle) -> Option<Mesh<C>> {
        self.all_meshes.remove(handle)
    }

    pub fn register_texture(&mut self, image: C::Image) -> TextureHandle {
        self.all_textures.insert(image)
    }

    pub fn remove_texture(&mut self, handle: TextureHandle) -> Option<C::Image> {
        self.all_textures.remove(handle)
    }

    pub fn register_instance(&mut self, instance: Instance) -> InstanceHandle {
        let handle = self.all_instances.insert(instance);
        self.instance_order.insert(handle);
        handle
    }

    pub fn remove_instance(&mut self, handle: InstanceHandle) -> Option<Instance> {
        self.instance_order.shift_remove(&handle);
        self.all_instances.remove(handle)
    }

    /// 上传光源，buffer 只在容量不足时重新创建
    pub fn set_lights(&mut self, ctx: &mut C, lights: &[Light]) -> GfxResult<()> {
        let _span = tracy_client::span!("Scene::set_lights");

        let bytes: &[u8] = bytemuck::cast_slice(lights);
        let capacity = self.lights_buffer.as_ref().map_or(0, |b| b.size());
        if (bytes.len() as u64) > capacity {
            log::info!("recreate lights buffer for {} lights", lights.len());
            self.lights_buffer = Some(ctx.create_buffer(&BufferDesc::new(
                bytes.len() as u64,
                vk::BufferUsageFlags::STORAGE_BUFFER,
                true,
                "scene-lights",
            ))?);
        }
        if let Some(buffer) = &self.lights_buffer {
            if !bytes.is_empty() {
                ctx.write_buffer(buffer, 0, bytes)?;
            }
        }
        self.lights_count = lights.len() as u32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::{CreatedKind, RecordingContext};

    use super::*;
    use crate::shapes::triangle::TriangleShape;

    #[test]
    fn test_instance_order_survives_removal() {
        let mut ctx = RecordingContext::new(64, 64);
        let mut scene = Scene::<RecordingContext>::new();
        let mesh = scene.register_mesh(TriangleShape::create_mesh(&mut ctx).unwrap());
        let texture = scene.register_texture(TriangleShape::create_texture(&mut ctx).unwrap());

        let a = scene.register_instance(Instance::new(mesh, texture));
        let b = scene.register_instance(Instance::new(mesh, texture));
        let c = scene.register_instance(Instance::new(mesh, texture));
        assert!(scene.remove_instance(b).is_some());

        let order: Vec<_> = scene.instances().map(|(h, _)| h).collect();
        assert_eq!(order, vec![a, c]);
        assert_eq!(scene.instance_count(), 2);
    }

    #[test]
    fn test_lights_buffer_grows_only() {
        let mut ctx = RecordingContext::new(64, 64);
        let mut scene = Scene::<RecordingContext>::new();
        let light = Light::new(glam::Vec3::ONE, glam::Vec3::ONE, 10.0);

        scene.set_lights(&mut ctx, &[light; 4]).unwrap();
        scene.set_lights(&mut ctx, &[light; 2]).unwrap();
        assert_eq!(scene.lights_count(), 2);
        assert_eq!(ctx.created_count(CreatedKind::Buffer, "scene-lights"), 1);

        scene.set_lights(&mut ctx, &[light; 8]).unwrap();
        assert_eq!(ctx.created_count(CreatedKind::Buffer, "scene-lights"), 2);
        assert_eq!(scene.lights_buffer().map(|b| b.size()), Some(8 * 48));

        scene.set_lights(&mut ctx, &[]).unwrap();
        assert_eq!(scene.lights_count(), 0);
    }
}
