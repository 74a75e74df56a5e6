/// 通知系统 (Notification System)
///
/// 独立回调线程, 侦测循环只负责投递触发信号
/// - Dispatcher:      有界队列 + 单消费者线程
/// - RateLimiter:     冷却时间内只放行一次
/// - WebhookNotifier: HTTP 通知
pub mod rate_limit;
pub mod webhook;

pub use rate_limit::RateLimiter;
pub use webhook::WebhookNotifier;

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

/// 运动回调: 无参数, 触发即忘
pub type Callback = Box<dyn FnMut() + Send>;

/// 释放时等待正在执行的回调的上限, 超时后分离回调线程
pub const RELEASE_WAIT: Duration = Duration::from_millis(200);

/// Runs the detection callback on its own thread.
///
/// Each trigger is one queued invocation. `trigger` never blocks; once the queue is full
/// further triggers are rejected until the consumer catches up.
pub struct Dispatcher {
    tx: Option<Sender<()>>,
    stop: Arc<AtomicBool>,
    exited: Receiver<()>, // 回调线程退出时断开
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn(mut callback: Callback, capacity: usize) -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<()>(capacity.max(1));
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();

        let worker = thread::Builder::new()
            .name("motion-callback".to_string())
            .spawn(move || {
                let _exit = exit_tx;
                for () in rx.iter() {
                    // 已释放: 剩余触发直接丢弃
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }
                    if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                        log::error!("运动回调 panic, 回调线程继续运行");
                    }
                }
                log::debug!("回调线程退出");
            })?;

        Ok(Self {
            tx: Some(tx),
            stop,
            exited,
            worker: Some(worker),
        })
    }

    /// 投递一次触发, 队列已满或已释放时返回 false
    pub fn trigger(&self) -> bool {
        match &self.tx {
            Some(tx) => match tx.try_send(()) {
                Ok(()) => true,
                Err(TrySendError::Full(())) => false,
                Err(TrySendError::Disconnected(())) => {
                    log::warn!("回调线程已退出");
                    false
                }
            },
            None => false,
        }
    }

    /// Stops accepting triggers and discards the queued ones.
    ///
    /// A callback that is already running gets [`RELEASE_WAIT`] to finish; after that the
    /// consumer thread is detached and exits on its own once the callback returns.
    pub fn release(&mut self) -> anyhow::Result<()> {
        self.stop.store(true, Ordering::Release);
        drop(self.tx.take());
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match self.exited.recv_timeout(RELEASE_WAIT) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("运动回调仍在执行, 不再等待, 回调线程分离");
                Ok(())
            }
            _ => worker
                .join()
                .map_err(|_| anyhow::anyhow!("callback thread terminated abnormally")),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn counting() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    /// 等待回调计数达到 `n`, 最多 5 秒
    fn wait_for(count: &AtomicUsize, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < n && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_triggers_run_on_worker() {
        let (count, cb) = counting();
        let mut dispatcher = Dispatcher::spawn(cb, 16).unwrap();
        for _ in 0..5 {
            assert!(dispatcher.trigger());
        }
        wait_for(&count, 5);
        dispatcher.release().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(!dispatcher.trigger());
    }

    #[test]
    fn test_release_discards_pending_and_does_not_wait() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut dispatcher = Dispatcher::spawn(
            Box::new(move || {
                let _ = gate_rx.recv();
                c.fetch_add(1, Ordering::SeqCst);
            }),
            8,
        )
        .unwrap();

        assert!(dispatcher.trigger());
        std::thread::sleep(Duration::from_millis(50));
        assert!(dispatcher.trigger());
        assert!(dispatcher.trigger());

        // 第一个回调阻塞在 gate 上, release 不等它
        let started = Instant::now();
        dispatcher.release().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        // 放行后只有正在执行的那一次完成, 排队的两次被丢弃
        drop(gate_tx);
        wait_for(&count, 1);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_full_queue_rejects_without_blocking() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let mut dispatcher = Dispatcher::spawn(
            Box::new(move || {
                let _ = gate_rx.recv();
            }),
            2,
        )
        .unwrap();

        // 第一个触发被消费者取走后阻塞在 gate 上, 之后队列容量为 2
        assert!(dispatcher.trigger());
        std::thread::sleep(Duration::from_millis(50));
        assert!(dispatcher.trigger());
        assert!(dispatcher.trigger());
        assert!(!dispatcher.trigger());

        drop(gate_tx);
        dispatcher.release().unwrap();
    }

    #[test]
    fn test_panicking_callback_keeps_worker_alive() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut dispatcher = Dispatcher::spawn(
            Box::new(move || {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first call fails");
                }
            }),
            4,
        )
        .unwrap();
        dispatcher.trigger();
        dispatcher.trigger();
        wait_for(&count, 2);
        dispatcher.release().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
