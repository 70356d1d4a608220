//! Hybrid 的 GFX 层
//!
//! 对 Vulkan 的薄封装：设备与扩展函数指针、vk-mem 分配器、RAII 的 buffer / image / 加速结构、
//! command buffer、barrier、descriptor heap 以及 SBT 的布局计算。
//!
//! 全局状态集中在 [`gfx::Gfx`] 单例中，仅适用于单线程环境。

pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod gfx;
pub mod raytracing;
pub mod resources;
pub mod utils;
