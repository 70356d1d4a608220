pub mod barrier;
pub mod command_buffer;
pub mod command_pool;
pub mod fence;
pub mod queue;
pub mod resource_state;
pub mod submit_info;
