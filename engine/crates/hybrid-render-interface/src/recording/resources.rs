use std::cell::RefCell;

use ash::vk;

use crate::{
    exec_context::{GpuAccel, GpuBuffer, GpuDescriptorHeap, GpuImage},
    resource_desc::DescriptorKind,
};

/// heap 中的一个 descriptor，记录它指向的资源 id
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecDescriptor {
    Image(u64),
    Buffer(u64),
    Accel(u64),
}

pub struct RecBuffer {
    pub(crate) id: u64,
    pub(crate) size: u64,
    pub(crate) address: u64,
    pub(crate) host_visible: bool,
    pub(crate) name: String,
    pub(crate) data: RefCell<Vec<u8>>,
}
impl RecBuffer {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.host_visible
    }

    /// 当前的内容，不经过任何同步
    pub fn contents(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }
}
impl GpuBuffer for RecBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn device_address(&self) -> u64 {
        self.address
    }
}

pub struct RecImage {
    pub(crate) id: u64,
    pub(crate) extent: vk::Extent2D,
    pub(crate) format: vk::Format,
    pub(crate) name: String,
}
impl RecImage {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
impl GpuImage for RecImage {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        self.format
    }
}

pub struct RecAccel {
    pub(crate) id: u64,
    pub(crate) size: u64,
    pub(crate) address: u64,
}
impl RecAccel {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}
impl GpuAccel for RecAccel {
    fn size(&self) -> u64 {
        self.size
    }

    fn device_address(&self) -> u64 {
        self.address
    }
}

pub struct RecDescriptorHeap {
    pub(crate) id: u64,
    pub(crate) kinds: Vec<DescriptorKind>,
    pub(crate) entries: Vec<Option<RecDescriptor>>,
}
impl RecDescriptorHeap {
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 固定槽位以及纹理数组的全部内容
    #[inline]
    pub fn entries(&self) -> &[Option<RecDescriptor>] {
        &self.entries
    }

    #[inline]
    pub fn entry(&self, index: usize) -> Option<RecDescriptor> {
        self.entries.get(index).copied().flatten()
    }

    #[inline]
    pub fn texture_entry(&self, array_index: usize) -> Option<RecDescriptor> {
        self.entry(self.kinds.len() + array_index)
    }
}
impl GpuDescriptorHeap for RecDescriptorHeap {
    fn capacity(&self) -> u32 {
        self.entries.len() as u32
    }

    fn gpu_handle(&self) -> u64 {
        0xD000_0000 + self.id
    }
}
