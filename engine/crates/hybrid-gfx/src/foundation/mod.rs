pub mod allocator;
pub mod debug_type;
pub mod device;
pub mod physical_device;
