// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 停止信号: 主循环与推理线程共享, 任一方都可置位

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 析构时置位 (线程正常退出、出错或 panic 都会触发)
pub struct CancelOnDrop(StopToken);

impl CancelOnDrop {
    pub fn new(token: StopToken) -> Self {
        Self(token)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
