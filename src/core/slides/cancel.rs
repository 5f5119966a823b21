use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 协作式取消标记，克隆后共享同一状态
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 清除标记；所有克隆同时恢复
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
