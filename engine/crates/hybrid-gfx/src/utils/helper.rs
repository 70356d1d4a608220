/// round x up to a multiple of align
///
/// * align must be a power of 2
#[inline]
pub const fn align_up(x: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (x + (align - 1)) & !(align - 1)
}

/// 将 Pod 之外的 `Copy` 类型（例如含有 union 的 vk 结构体）按字节查看
///
/// # Safety
/// T 不能包含 padding 以外的未初始化内存
#[inline]
pub unsafe fn as_bytes<T: Copy>(data: &[T]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(data.as_ptr() as *const u8, size_of_val(data)) }
}
