//! blocking access to the async api
//!
//! Futures run on the context's tokio runtime while the calling thread polls for completion. A
//! timeout gives up waiting, not the work: the transfer keeps running and fills the node's
//! cache once it completes.
use crate::vfs::{FileOrFolder, Transfer};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};

#[derive(Debug, Clone, derive_new::new)]
pub struct Blocking {
    handle: Handle,
    poll_interval: Duration,
    timeout: Duration,
}

impl Blocking {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Same waiter with another timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    /// Whether the calling thread can wait here
    ///
    /// Not from inside a runtime while the futures run on a current-thread runtime: the only
    /// thread able to drive them would be the one sleeping in the poll loop.
    pub fn can_block(&self) -> bool {
        self.handle.runtime_flavor() != RuntimeFlavor::CurrentThread
            || Handle::try_current().is_err()
    }

    /// Runs `future` to completion, `None` on timeout or when [Blocking::can_block] is false
    pub fn wait<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.can_block() {
            tracing::error!("blocking call on a current-thread runtime, use the async api");
            return None;
        }
        let task = self.handle.spawn(future);
        let started = Instant::now();
        while !task.is_finished() {
            if started.elapsed() >= self.timeout {
                tracing::warn!(
                    timeout = ?self.timeout,
                    "gave up waiting, work continues in the background"
                );
                return None;
            }
            std::thread::sleep(self.poll_interval);
        }
        match futures::executor::block_on(task) {
            Ok(output) => Some(output),
            Err(err) => {
                tracing::error!(%err, "background task failed");
                None
            }
        }
    }
}

/// Sleeps until `node` has no transfer in flight
///
/// Returns whether the node became idle before `timeout`.
pub fn wait_while_busy(
    node: &dyn FileOrFolder,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let started = Instant::now();
    while node.transfer() != Transfer::Idle {
        if started.elapsed() >= timeout {
            tracing::warn!(node = node.full_name(), transfer = ?node.transfer(), "still busy");
            return false;
        }
        std::thread::sleep(poll_interval);
    }
    true
}

/// Async twin of [wait_while_busy]
pub async fn wait_while_busy_async(
    node: &dyn FileOrFolder,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let started = Instant::now();
    while node.transfer() != Transfer::Idle {
        if started.elapsed() >= timeout {
            tracing::warn!(node = node.full_name(), transfer = ?node.transfer(), "still busy");
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vfs::Busy;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Node {
        busy: Busy,
    }

    impl FileOrFolder for Node {
        fn name(&self) -> &str {
            "node"
        }

        fn full_name(&self) -> &str {
            "node"
        }

        fn transfer(&self) -> Transfer {
            self.busy.current()
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap()
    }

    #[test]
    fn wait_returns_output() {
        let runtime = runtime();
        let blocking = Blocking::new(
            runtime.handle().clone(),
            Duration::from_millis(1),
            Duration::from_secs(5),
        );
        assert_eq!(blocking.wait(async { 40 + 2 }), Some(42));
    }

    #[test]
    fn wait_times_out_but_work_continues() {
        let runtime = runtime();
        let blocking = Blocking::new(
            runtime.handle().clone(),
            Duration::from_millis(1),
            Duration::from_millis(20),
        );
        let (tx, rx) = std::sync::mpsc::channel();
        let slow = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send("done").unwrap();
        };
        assert_eq!(blocking.wait(slow), None);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok("done"));
    }

    #[tokio::test]
    async fn current_thread_runtime_fails_fast() {
        let blocking = Blocking::new(
            Handle::current(),
            Duration::from_millis(1),
            Duration::from_secs(30),
        );
        assert!(!blocking.can_block());

        let started = Instant::now();
        assert_eq!(blocking.wait(async { 1 }), None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn other_threads_can_block() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let blocking = Blocking::new(
            runtime.handle().clone(),
            Duration::from_millis(1),
            Duration::from_secs(5),
        );
        assert!(blocking.can_block());

        let multi_thread = self::runtime();
        let inside = multi_thread.block_on(async {
            Blocking::new(Handle::current(), Duration::from_millis(1), Duration::from_secs(5))
                .can_block()
        });
        assert!(inside);
    }

    #[test]
    fn busy_node() {
        let node = Node::default();
        assert!(wait_while_busy(&node, Duration::ZERO, Duration::from_millis(1)));

        let _token = node.busy.begin(Transfer::Downloading, "node");
        assert!(!wait_while_busy(
            &node,
            Duration::from_millis(10),
            Duration::from_millis(1)
        ));
    }
}
