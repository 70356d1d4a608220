use hybrid_render_interface::{
    exec_context::{ExecContext, GpuAccel, GpuBuffer},
    resource_desc::ScreenRect,
};
use hybrid_scene::{
    components::{
        instance::{Instance, InstanceFlags},
        material::Material,
    },
    guid_new_type::{InstanceHandle, MeshHandle, TextureHandle},
    scene::Scene,
};

use crate::settings::RendererSettings;

/// 每帧从 [`Instance`] 展开的渲染数据，只在视图内部使用
#[derive(Clone, Debug, PartialEq)]
pub struct RenderInstance {
    pub instance: InstanceHandle,
    pub mesh: MeshHandle,
    /// BLAS 的 device address，None 表示走光栅化
    pub blas_address: Option<u64>,
    pub vertex_address: u64,
    pub index_address: u64,
    pub index_count: u32,

    pub transform: glam::Mat4,
    /// 纹理序号已经改写为本帧纹理列表中的位置
    pub material: Material,

    /// 设备坐标系下的矩形，空矩形表示使用设备的默认值
    pub scissor_rect: ScreenRect,
    pub viewport_rect: ScreenRect,

    pub cull_disable: bool,
}

/// 一帧的分类结果
///
/// 每个 instance 只会进入其中一个桶，每帧从头计算
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderBuckets {
    pub raytraced: Vec<RenderInstance>,
    pub raster_bg: Vec<RenderInstance>,
    pub raster_fg: Vec<RenderInstance>,
    /// 按添加顺序排列，同一个纹理被多个 instance 使用时会出现多次
    pub used_textures: Vec<TextureHandle>,
}
// new & init
impl RenderBuckets {
    /// 按场景中 instance 的顺序分类
    ///
    /// mesh 或 diffuse 纹理已经被移除的 instance 会被跳过
    pub fn classify<C: ExecContext>(scene: &Scene<C>, screen_height: u32) -> Self {
        let _span = tracy_client::span!("RenderBuckets::classify");

        let total = scene.instance_count();
        let mut buckets = Self {
            raytraced: Vec::with_capacity(total),
            raster_bg: Vec::with_capacity(total),
            raster_fg: Vec::with_capacity(total),
            used_textures: Vec::with_capacity(RendererSettings::MAX_TEXTURES.min(total * 3)),
        };

        for (handle, instance) in scene.instances() {
            let Some(mesh) = scene.mesh(instance.mesh) else {
                log::warn!("instance {:?} references a removed mesh, skipped", handle);
                continue;
            };
            if scene.texture(instance.diffuse_texture).is_none() {
                log::warn!("instance {:?} references a removed diffuse texture, skipped", handle);
                continue;
            }

            let mut material = instance.material;
            material.diffuse_tex_index = buckets.push_texture(instance.diffuse_texture);
            material.normal_tex_index = match instance.normal_texture.filter(|t| scene.texture(*t).is_some()) {
                Some(texture) => buckets.push_texture(texture),
                None => -1,
            };
            material.specular_tex_index = match instance.specular_texture.filter(|t| scene.texture(*t).is_some()) {
                Some(texture) => buckets.push_texture(texture),
                None => -1,
            };

            let render_instance = RenderInstance {
                instance: handle,
                mesh: instance.mesh,
                blas_address: mesh.bottom_level_as().map(|blas| blas.device_address()),
                vertex_address: mesh.vertex_buffer().device_address(),
                index_address: mesh.index_buffer().device_address(),
                index_count: mesh.index_count(),
                transform: instance.transform,
                material,
                scissor_rect: Self::device_rect(instance.scissor_rect, screen_height),
                viewport_rect: Self::device_rect(instance.viewport_rect, screen_height),
                cull_disable: instance.flags.contains(InstanceFlags::DISABLE_BACKFACE_CULLING),
            };

            buckets.bucket_for(instance, &render_instance).push(render_instance);
        }

        assert!(
            buckets.used_textures.len() <= RendererSettings::MAX_TEXTURES,
            "a frame may use at most {} textures, got {}",
            RendererSettings::MAX_TEXTURES,
            buckets.used_textures.len()
        );

        buckets
    }
}
// getters
impl RenderBuckets {
    #[inline]
    pub fn total_count(&self) -> usize {
        self.raytraced.len() + self.raster_bg.len() + self.raster_fg.len()
    }

    /// 光追、背景、前景的顺序，与 instance properties buffer 的顺序一致
    pub fn iter_ordered(&self) -> impl Iterator<Item = &RenderInstance> {
        self.raytraced.iter().chain(self.raster_bg.iter()).chain(self.raster_fg.iter())
    }
}
// tools
impl RenderBuckets {
    pub fn clear(&mut self) {
        self.raytraced.clear();
        self.raster_bg.clear();
        self.raster_fg.clear();
        self.used_textures.clear();
    }

    fn push_texture(&mut self, texture: TextureHandle) -> i32 {
        let index = self.used_textures.len() as i32;
        self.used_textures.push(texture);
        index
    }

    fn bucket_for(&mut self, instance: &Instance, render_instance: &RenderInstance) -> &mut Vec<RenderInstance> {
        if render_instance.blas_address.is_some() {
            &mut self.raytraced
        } else if instance.flags.contains(InstanceFlags::RASTER_BACKGROUND) {
            &mut self.raster_bg
        } else {
            &mut self.raster_fg
        }
    }

    fn device_rect(rect: Option<ScreenRect>, screen_height: u32) -> ScreenRect {
        rect.map_or(ScreenRect::default(), |r| r.flip_y(screen_height))
    }
}

#[cfg(test)]
mod tests {
    use hybrid_render_interface::recording::RecordingContext;
    use itertools::Itertools;

    use super::*;
    use crate::view::test_scene::TestScene;

    #[test]
    fn test_partition_is_exact() {
        let mut t = TestScene::new(64, 32);
        let rt = t.add_raytraced();
        let bg = t.add_background();
        let fg = t.add_foreground();
        let rt2 = t.add_raytraced();

        let buckets = RenderBuckets::classify(&t.scene, 32);
        assert_eq!(
            (buckets.raytraced.len(), buckets.raster_bg.len(), buckets.raster_fg.len()),
            (2, 1, 1)
        );
        assert_eq!(buckets.total_count(), t.scene.instance_count());

        let ordered = buckets.iter_ordered().map(|r| r.instance).collect_vec();
        assert_eq!(ordered, vec![rt, rt2, bg, fg]);
        assert_eq!(ordered.iter().collect::<std::collections::HashSet<_>>().len(), ordered.len());
    }

    #[test]
    fn test_texture_indices_follow_append_order() {
        let mut t = TestScene::new(64, 32);
        let a = t.add_foreground();
        let b = t.add_foreground();
        let image = t.white_texture();
        let normal = t.scene.register_texture(image);
        t.scene.instance_mut(a).unwrap().normal_texture = Some(normal);
        let image = t.white_texture();
        let specular = t.scene.register_texture(image);
        t.scene.instance_mut(b).unwrap().specular_texture = Some(specular);

        let buckets = RenderBuckets::classify(&t.scene, 32);
        let mats = buckets.raster_fg.iter().map(|r| r.material).collect_vec();
        assert_eq!((mats[0].diffuse_tex_index, mats[0].normal_tex_index, mats[0].specular_tex_index), (0, 1, -1));
        assert_eq!((mats[1].diffuse_tex_index, mats[1].normal_tex_index, mats[1].specular_tex_index), (2, -1, 3));
        // 共享的 diffuse 纹理不做去重
        assert_eq!(buckets.used_textures.len(), 4);
        assert_eq!(buckets.used_textures[0], buckets.used_textures[2]);
    }

    #[test]
    fn test_rects_are_flipped() {
        let mut t = TestScene::new(64, 32);
        let fg = t.add_foreground();
        t.scene.instance_mut(fg).unwrap().scissor_rect = Some(ScreenRect::new(2, 4, 10, 8));

        let buckets = RenderBuckets::classify(&t.scene, 32);
        assert_eq!(buckets.raster_fg[0].scissor_rect, ScreenRect::new(2, 20, 10, 8));
        assert!(buckets.raster_fg[0].viewport_rect.is_empty());
    }

    #[test]
    fn test_removed_mesh_is_skipped() {
        let mut t = TestScene::new(64, 32);
        t.add_foreground();
        let removed = hybrid_scene::shapes::triangle::TriangleShape::create_mesh(&mut t.ctx).unwrap();
        let mesh = t.scene.register_mesh(removed);
        let texture = t.texture;
        t.scene.register_instance(Instance::new(mesh, texture));
        t.scene.remove_mesh(mesh);

        let buckets = RenderBuckets::classify::<RecordingContext>(&t.scene, 32);
        assert_eq!(buckets.total_count(), 1);
    }
}
