use hybrid_gfx::commands::resource_state::GfxImageState;

/// 暂存的 "last queue barrier"
///
/// 只保存一个，新暂存的 barrier 会覆盖旧的。K 是上下文用来标识图像的键
#[derive(Debug)]
pub struct DeferredQueueBarrier<K> {
    pending: Option<(K, GfxImageState, GfxImageState)>,
}
impl<K> Default for DeferredQueueBarrier<K> {
    fn default() -> Self {
        Self { pending: None }
    }
}
impl<K> DeferredQueueBarrier<K> {
    #[inline]
    pub fn stage(&mut self, image: K, src: GfxImageState, dst: GfxImageState) {
        if self.pending.is_some() {
            log::debug!("overwriting a pending queue barrier");
        }
        self.pending = Some((image, src, dst));
    }

    #[inline]
    pub fn take(&mut self) -> Option<(K, GfxImageState, GfxImageState)> {
        self.pending.take()
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_take() {
        let mut barrier = DeferredQueueBarrier::<u64>::default();
        assert!(barrier.take().is_none());

        barrier.stage(1, GfxImageState::UNDEFINED, GfxImageState::SHADER_READ_FRAGMENT);
        barrier.stage(2, GfxImageState::TRANSFER_DST, GfxImageState::SHADER_READ_FRAGMENT);
        assert!(barrier.is_pending());

        let (image, src, _) = barrier.take().unwrap();
        assert_eq!(image, 2);
        assert_eq!(src, GfxImageState::TRANSFER_DST);
        assert!(!barrier.is_pending());
    }
}
