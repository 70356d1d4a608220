//! GFX 层的错误类型
//!
//! 所有会失败的 GPU 调用都返回 [`GfxResult`]，错误中携带格式化好的诊断信息，
//! 由调用方决定记录日志还是继续向上传递。

use ash::vk;

pub type GfxResult<T> = Result<T, GfxError>;

#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// Vulkan 调用返回了错误码
    #[error("vulkan call `{call}` failed: {result}")]
    Vk { call: &'static str, result: vk::Result },

    /// 需要 CPU 读写的 buffer 没有被 map
    #[error("buffer `{name}` is not host visible")]
    NotHostVisible { name: String },

    #[error("access of {len} bytes at offset {offset} exceeds `{name}` ({size} bytes)")]
    OutOfBounds {
        name: String,
        offset: u64,
        len: u64,
        size: u64,
    },

    /// 光追管线中找不到指定名字的 shader group
    #[error("shader group `{0}` is not part of the ray tracing pipeline")]
    MissingShaderGroup(String),

    /// 可选的外部协作者没有提供
    #[error("{0} is not available")]
    Unavailable(&'static str),

    #[error("invalid {kind} handle")]
    InvalidHandle { kind: &'static str },
}

impl GfxError {
    /// 检查 `[offset, offset + len)` 是否落在大小为 `size` 的资源中
    pub fn check_range(name: &str, offset: u64, len: u64, size: u64) -> GfxResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(GfxError::OutOfBounds {
                name: name.to_string(),
                offset,
                len,
                size,
            }),
        }
    }
}

/// 将 `VkResult<T>` 转换为 [`GfxResult<T>`]，并记录是哪一个调用失败
pub trait VkResultExt<T> {
    fn vk_context(self, call: &'static str) -> GfxResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    #[inline]
    fn vk_context(self, call: &'static str) -> GfxResult<T> {
        self.map_err(|result| GfxError::Vk { call, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_context_keeps_call_name() {
        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let err = r.vk_context("vkCreateBuffer").unwrap_err();
        match &err {
            GfxError::Vk { call, result } => {
                assert_eq!(*call, "vkCreateBuffer");
                assert_eq!(*result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("vkCreateBuffer"));
    }

    #[test]
    fn test_check_range() {
        assert!(GfxError::check_range("buf", 0, 16, 16).is_ok());
        assert!(GfxError::check_range("buf", 8, 8, 16).is_ok());
        assert!(GfxError::check_range("buf", 0, 0, 0).is_ok());

        let err = GfxError::check_range("buf", 12, 8, 16).unwrap_err();
        assert!(matches!(err, GfxError::OutOfBounds { offset: 12, len: 8, size: 16, .. }));
        assert!(GfxError::check_range("buf", u64::MAX, 2, 16).is_err());
    }
}
