//! 调试用的叠加层：点、线、三角形

/// 叠加层图元，每种图元对应一条固定的管线
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverlayPrimitive {
    Points,
    Lines,
    Triangles,
}
impl OverlayPrimitive {
    pub const COUNT: usize = 3;

    #[inline]
    pub fn index(self) -> usize {
        match self {
            OverlayPrimitive::Points => 0,
            OverlayPrimitive::Lines => 1,
            OverlayPrimitive::Triangles => 2,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OverlayVertex {
    pub position: glam::Vec4,
    pub color: glam::Vec4,
}
impl OverlayVertex {
    #[inline]
    pub fn new(position: glam::Vec3, color: glam::Vec4) -> Self {
        Self {
            position: position.extend(1.0),
            color,
        }
    }
}

/// 同一种图元的一组顶点
#[derive(Clone, Debug)]
pub struct OverlayDrawList {
    pub primitive: OverlayPrimitive,
    pub vertices: Vec<OverlayVertex>,
}
impl OverlayDrawList {
    pub fn new(primitive: OverlayPrimitive) -> Self {
        Self {
            primitive,
            vertices: Vec::new(),
        }
    }

    /// builder
    pub fn with_vertices(mut self, vertices: impl IntoIterator<Item = OverlayVertex>) -> Self {
        self.vertices.extend(vertices);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(size_of::<OverlayVertex>(), 32);
        let v = OverlayVertex::new(glam::vec3(1.0, 2.0, 3.0), glam::Vec4::ONE);
        assert_eq!(v.position.w, 1.0);
    }

    #[test]
    fn test_primitive_index() {
        let indices = [OverlayPrimitive::Points, OverlayPrimitive::Lines, OverlayPrimitive::Triangles]
            .map(OverlayPrimitive::index);
        assert_eq!(indices, [0, 1, 2]);
    }
}
