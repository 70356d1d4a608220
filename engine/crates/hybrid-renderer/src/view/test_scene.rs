//! 测试用的场景搭建工具

use hybrid_render_interface::{
    exec_context::ExecContext,
    recording::{RecImage, RecordingContext},
};
use hybrid_scene::{
    components::instance::{Instance, InstanceFlags},
    guid_new_type::{InstanceHandle, MeshHandle, TextureHandle},
    scene::Scene,
    shapes::triangle::TriangleShape,
};

pub struct TestScene {
    pub ctx: RecordingContext,
    pub scene: Scene<RecordingContext>,
    /// 带有 BLAS 的 mesh
    pub rt_mesh: MeshHandle,
    pub raster_mesh: MeshHandle,
    pub texture: TextureHandle,
}
impl TestScene {
    pub fn new(width: u32, height: u32) -> Self {
        hybrid_crate_tools::init_log::init_log_with(log::LevelFilter::Debug);

        let mut ctx = RecordingContext::new(width, height);
        let mut scene = Scene::new();

        let mut rt_mesh = TriangleShape::create_mesh(&mut ctx).unwrap();
        // BLAS 由外部构建，这里只需要一个有 device address 的加速结构
        rt_mesh.set_bottom_level_as(Some(ctx.create_tlas(256, "test-blas").unwrap()));
        let rt_mesh = scene.register_mesh(rt_mesh);
        let raster_mesh = scene.register_mesh(TriangleShape::create_mesh(&mut ctx).unwrap());
        let texture = scene.register_texture(TriangleShape::create_texture(&mut ctx).unwrap());

        Self {
            ctx,
            scene,
            rt_mesh,
            raster_mesh,
            texture,
        }
    }

    pub fn white_texture(&mut self) -> RecImage {
        TriangleShape::create_texture(&mut self.ctx).unwrap()
    }

    pub fn add_raytraced(&mut self) -> InstanceHandle {
        self.scene.register_instance(Instance::new(self.rt_mesh, self.texture))
    }

    pub fn add_background(&mut self) -> InstanceHandle {
        self.scene
            .register_instance(Instance::new(self.raster_mesh, self.texture).with_flags(InstanceFlags::RASTER_BACKGROUND))
    }

    pub fn add_foreground(&mut self) -> InstanceHandle {
        self.scene.register_instance(Instance::new(self.raster_mesh, self.texture))
    }
}
