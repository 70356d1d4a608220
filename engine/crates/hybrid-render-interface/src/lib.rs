//! 渲染层与 GPU 之间的边界
//!
//! - [`exec_context::ExecContext`]：视图渲染所需的全部 GPU 操作
//! - [`vk_context::VkExecContext`]：基于 hybrid-gfx 的 Vulkan 实现
//! - [`recording::RecordingContext`]：不依赖 GPU 的实现，记录所有命令，用于测试

pub mod denoiser;
pub mod exec_context;
pub mod frame_counter;
pub mod overlay;
pub mod queue_barrier;
pub mod recording;
pub mod resource_desc;
pub mod vk_context;
