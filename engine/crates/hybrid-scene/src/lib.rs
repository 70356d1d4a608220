//! CPU 侧的场景数据
//!
//! 场景由宿主程序创建和修改，视图只在每帧读取它。

pub mod components;
pub mod guid_new_type;
pub mod scene;
pub mod shapes;
