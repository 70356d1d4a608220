use ash::vk;
use hybrid_gfx::error::GfxResult;
use hybrid_render_interface::{exec_context::ExecContext, resource_desc::BufferDesc};

/// 一个 mesh 的 GPU 数据
///
/// 顶点与索引都放在 host visible 的 buffer 中。BLAS 由外部构建，视图只使用它的结果
pub struct Mesh<C: ExecContext> {
    vertex_buffer: C::Buffer,
    index_buffer: C::Buffer,
    vertex_stride: u32,
    vertex_count: u32,
    index_count: u32,

    blas: Option<C::Accel>,
    name: String,
}
// new & init
impl<C: ExecContext> Mesh<C> {
    /// - vertices: 紧密排列的顶点数据，每个顶点 vertex_stride 字节
    /// - indices: 三角形列表，u32 索引
    pub fn new(ctx: &mut C, vertices: &[u8], vertex_stride: u32, indices: &[u32], name: &str) -> GfxResult<Self> {
        let _span = tracy_client::span!("Mesh::new");

        let usage = vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            | vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR;

        let vertex_buffer = ctx.create_buffer(&BufferDesc::new(
            vertices.len() as u64,
            usage | vk::BufferUsageFlags::VERTEX_BUFFER,
            true,
            format!("{name}-vertex"),
        ))?;
        ctx.write_buffer(&vertex_buffer, 0, vertices)?;

        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        let index_buffer = ctx.create_buffer(&BufferDesc::new(
            index_bytes.len() as u64,
            usage | vk::BufferUsageFlags::INDEX_BUFFER,
            true,
            format!("{name}-index"),
        ))?;
        ctx.write_buffer(&index_buffer, 0, index_bytes)?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_stride,
            vertex_count: vertices.len() as u32 / vertex_stride.max(1),
            index_count: indices.len() as u32,
            blas: None,
            name: name.to_string(),
        })
    }

    /// 设置外部构建好的 BLAS，None 表示该 mesh 不参与光追
    pub fn set_bottom_level_as(&mut self, blas: Option<C::Accel>) {
        self.blas = blas;
    }
}
// getters
impl<C: ExecContext> Mesh<C> {
    #[inline]
    pub fn vertex_buffer(&self) -> &C::Buffer {
        &self.vertex_buffer
    }
    #[inline]
    pub fn index_buffer(&self) -> &C::Buffer {
        &self.index_buffer
    }
    #[inline]
    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
    #[inline]
    pub fn bottom_level_as(&self) -> Option<&C::Accel> {
        self.blas.as_ref()
    }
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
