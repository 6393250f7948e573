// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 有界交接队列 (单生产者 / 单消费者)
//!
//! 满时 `try_put` 丢弃新元素, 取空时返回 `Received::Empty` 而不是错误。

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};

/// 带超时取值的结果
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Item(T),
    /// 超时仍无数据
    Empty,
    /// 发送端已全部释放
    Closed,
}

/// 生产端
pub struct Producer<T> {
    tx: Sender<T>,
    capacity: usize,
}

/// 消费端
pub struct Consumer<T> {
    rx: Receiver<T>,
}

/// 创建容量为 `capacity` 的队列 (容量至少为1)
pub fn bounded<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (Producer { tx, capacity }, Consumer { rx })
}

impl<T> Producer<T> {
    /// 非阻塞放入; 队列满或已关闭时丢弃并返回 false
    pub fn try_put(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// 阻塞放入, 最多等待 `timeout`; 失败时归还元素
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), T> {
        self.tx.send_timeout(item, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(item) | SendTimeoutError::Disconnected(item) => item,
        })
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Consumer<T> {
    /// 非阻塞取值
    pub fn try_get(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// 最多等待 `timeout`
    pub fn get_timeout(&self, timeout: Duration) -> Received<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Received::Item(item),
            Err(RecvTimeoutError::Timeout) => Received::Empty,
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }

    /// 取出当前所有元素, 只保留最新的一个
    pub fn drain_latest(&self) -> Option<T> {
        self.rx.try_iter().last()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_third_put_is_dropped_without_blocking() {
        let (tx, rx) = bounded(2);
        assert!(tx.try_put(1));
        assert!(tx.try_put(2));
        let start = Instant::now();
        assert!(!tx.try_put(3));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(tx.len(), 2);

        assert_eq!(rx.try_get(), Some(1));
        assert_eq!(rx.try_get(), Some(2));
        assert_eq!(rx.try_get(), None);
    }

    #[test]
    fn test_get_timeout_reports_empty_then_closed() {
        let (tx, rx) = bounded::<u32>(2);
        assert_eq!(rx.get_timeout(Duration::from_millis(10)), Received::Empty);
        drop(tx);
        assert_eq!(rx.get_timeout(Duration::from_millis(10)), Received::Closed);
    }

    #[test]
    fn test_put_timeout_returns_item_when_full() {
        let (tx, rx) = bounded(1);
        assert!(tx.put_timeout("a", Duration::from_millis(10)).is_ok());
        assert!(tx.is_full());
        assert_eq!(tx.put_timeout("b", Duration::from_millis(10)), Err("b"));
        assert_eq!(rx.drain_latest(), Some("a"));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_try_put_after_consumer_dropped() {
        let (tx, rx) = bounded(2);
        drop(rx);
        assert!(!tx.try_put(7));
        assert_eq!(tx.capacity(), 2);
    }
}
