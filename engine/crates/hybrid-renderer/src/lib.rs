//! 混合渲染器
//!
//! - [`view::View`]：每帧的分类、TLAS、descriptor heap、SBT 以及渲染流程
//! - [`renderer::Renderer`]：持有执行上下文、场景与视图，驱动每一帧

pub mod renderer;
pub mod settings;
pub mod view;
