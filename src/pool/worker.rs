//! Per-thread socket poller
//!
//! A `SocketWorker` owns a subset of the pool's sockets and drives their
//! read path from one dedicated thread. Callers on any thread queue add and
//! remove requests into a lock-protected mutation queue; only the poll
//! thread drains the queue and applies it to its live set, at the start of
//! each cycle. The live set itself is never shared, so the lock is held for
//! list mutation only and never across the readiness wait.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{PoolError, RejectedSocket, SocketError};
use crate::poll::{is_valid_handle, Readiness, SocketHandle};
use crate::pool::PoolConfig;
use crate::socket::PollableSocket;

/// Deferred mutations, shared between caller threads and the poll thread
#[derive(Default)]
struct MutationQueue {
    /// Sockets queued for inclusion, not yet polled
    pending_add: Vec<Box<dyn PollableSocket>>,
    /// Handles queued for exclusion
    pending_remove: Vec<SocketHandle>,
    /// Mirror of the poll thread's live set, so callers can answer
    /// membership and capacity questions without touching that set
    live_handles: BTreeSet<SocketHandle>,
}

impl MutationQueue {
    fn contains(&self, handle: SocketHandle) -> bool {
        self.live_handles.contains(&handle)
            || self.pending_add.iter().any(|s| s.handle() == handle)
    }

    fn registered_count(&self) -> usize {
        self.live_handles.len() + self.pending_add.len()
    }
}

/// Socket poller bound to one dedicated thread
pub struct SocketWorker {
    /// Position in the pool, used for thread naming and error reporting
    index: usize,
    capacity: usize,
    poll_timeout: Duration,
    idle_sleep: Duration,
    poller: Arc<dyn Readiness>,
    queue: Arc<Mutex<MutationQueue>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SocketWorker {
    pub fn new(index: usize, config: &PoolConfig, poller: Arc<dyn Readiness>) -> Self {
        Self {
            index,
            capacity: config.max_sockets_per_worker,
            poll_timeout: config.poll_timeout,
            idle_sleep: config.idle_sleep,
            poller,
            queue: Arc::new(Mutex::new(MutationQueue::default())),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Spawn the poll thread. Returns `Ok` if it is already running.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let poll_loop = self.poll_loop();

        let handle = thread::Builder::new()
            .name(format!("socket-worker-{}", self.index))
            .spawn(move || poll_loop.run())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                PoolError::SpawnFailed(e.to_string())
            })?;

        self.thread = Some(handle);
        tracing::debug!("Worker {} started", self.index);
        Ok(())
    }

    /// Signal the poll thread to exit and join it. Idempotent; stop latency
    /// is bounded by the poll timeout, not by socket activity.
    pub fn stop(&mut self) -> Result<(), PoolError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread.take() {
            handle
                .join()
                .map_err(|_| PoolError::WorkerPanicked(self.index))?;
            tracing::debug!("Worker {} stopped", self.index);
        }
        Ok(())
    }

    /// Check if the poll thread has been started
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queue a socket for inclusion in the next poll cycle.
    ///
    /// On rejection the socket rides back to the caller inside the error;
    /// the worker has taken no ownership.
    pub fn add_socket(
        &self,
        socket: Box<dyn PollableSocket>,
    ) -> Result<(), RejectedSocket> {
        let handle = socket.handle();
        if !is_valid_handle(handle) {
            return Err(RejectedSocket::new(
                socket,
                SocketError::InvalidHandle(handle),
            ));
        }

        let mut queue = self.queue.lock();
        if queue.registered_count() >= self.capacity {
            drop(queue);
            return Err(RejectedSocket::new(
                socket,
                SocketError::AtCapacity(self.capacity),
            ));
        }
        if queue.contains(handle) {
            drop(queue);
            return Err(RejectedSocket::new(
                socket,
                SocketError::DuplicateHandle(handle),
            ));
        }
        queue.pending_add.push(socket);
        Ok(())
    }

    /// Queue a socket for removal and eventual destruction.
    ///
    /// Destruction is deferred to the next merge so it cannot race an
    /// in-flight readiness check over the same handle.
    pub fn remove_socket(&self, handle: SocketHandle) -> Result<(), SocketError> {
        let mut queue = self.queue.lock();
        if queue.contains(handle) {
            queue.pending_remove.push(handle);
            Ok(())
        } else {
            Err(SocketError::NotFound(handle))
        }
    }

    /// Number of sockets this worker currently owns (live plus queued adds)
    pub fn registered_count(&self) -> usize {
        self.queue.lock().registered_count()
    }

    fn poll_loop(&self) -> PollLoop {
        PollLoop {
            queue: self.queue.clone(),
            poller: self.poller.clone(),
            running: self.running.clone(),
            poll_timeout: self.poll_timeout,
            idle_sleep: self.idle_sleep,
            live: BTreeMap::new(),
        }
    }
}

impl Drop for SocketWorker {
    fn drop(&mut self) {
        let _ = self.stop();

        // Sockets queued while the thread was not running still need their
        // teardown notification.
        let mut orphans = {
            let mut queue = self.queue.lock();
            queue.pending_remove.clear();
            queue.live_handles.clear();
            std::mem::take(&mut queue.pending_add)
        };
        for socket in orphans.iter_mut() {
            socket.on_teardown();
        }
    }
}

/// State owned by the poll thread.
///
/// The live set has a single writer: this loop. Callers only ever touch the
/// mutation queue.
struct PollLoop {
    queue: Arc<Mutex<MutationQueue>>,
    poller: Arc<dyn Readiness>,
    running: Arc<AtomicBool>,
    poll_timeout: Duration,
    idle_sleep: Duration,
    live: BTreeMap<SocketHandle, Box<dyn PollableSocket>>,
}

impl PollLoop {
    fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.cycle();
        }
        self.teardown_all();
    }

    /// One merge → build → wait → dispatch iteration
    fn cycle(&mut self) {
        self.merge();

        let handles: Vec<SocketHandle> = self.live.keys().copied().collect();
        if handles.is_empty() {
            thread::sleep(self.idle_sleep);
            return;
        }

        let ready = match self.poller.wait_readable(&handles, self.poll_timeout) {
            Ok(ready) => ready,
            Err(e) => {
                // Transient: nothing ready this cycle, retry on the next.
                tracing::debug!("Readiness wait failed: {}", e);
                thread::sleep(self.idle_sleep);
                return;
            }
        };

        for handle in ready {
            if let Some(socket) = self.live.get_mut(&handle) {
                socket.on_readable();
            }
        }
    }

    /// Fold queued removals and additions into the live set.
    ///
    /// Removals are applied first: a handle still sitting in the add list
    /// was never polled and can be destroyed straight away. Teardown runs
    /// outside the lock.
    fn merge(&mut self) {
        let mut doomed: Vec<Box<dyn PollableSocket>> = Vec::new();
        {
            let mut queue = self.queue.lock();

            let removals: Vec<SocketHandle> = queue.pending_remove.drain(..).collect();
            for handle in removals {
                if let Some(pos) = queue.pending_add.iter().position(|s| s.handle() == handle) {
                    doomed.push(queue.pending_add.remove(pos));
                    continue;
                }
                // Queued twice before one merge: the second entry finds
                // nothing and is a no-op.
                if queue.live_handles.remove(&handle) {
                    if let Some(socket) = self.live.remove(&handle) {
                        doomed.push(socket);
                    }
                }
            }

            let promoted: Vec<Box<dyn PollableSocket>> = queue.pending_add.drain(..).collect();
            for socket in promoted {
                queue.live_handles.insert(socket.handle());
                self.live.insert(socket.handle(), socket);
            }
        }

        for socket in doomed.iter_mut() {
            socket.on_teardown();
        }
    }

    /// Destroy every remaining live and pending socket exactly once
    fn teardown_all(&mut self) {
        let mut doomed = {
            let mut queue = self.queue.lock();
            queue.pending_remove.clear();
            queue.live_handles.clear();
            std::mem::take(&mut queue.pending_add)
        };
        doomed.extend(std::mem::take(&mut self.live).into_values());

        for socket in doomed.iter_mut() {
            socket.on_teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    /// Readiness fake that reports a fixed set of handles as readable
    struct ScriptedReadiness {
        ready: Vec<SocketHandle>,
    }

    impl ScriptedReadiness {
        fn new(ready: Vec<SocketHandle>) -> Arc<Self> {
            Arc::new(Self { ready })
        }

        fn idle() -> Arc<Self> {
            Self::new(Vec::new())
        }
    }

    impl Readiness for ScriptedReadiness {
        fn wait_readable(
            &self,
            handles: &[SocketHandle],
            timeout: Duration,
        ) -> std::io::Result<Vec<SocketHandle>> {
            let ready: Vec<SocketHandle> = handles
                .iter()
                .copied()
                .filter(|h| self.ready.contains(h))
                .collect();
            if ready.is_empty() {
                // Simulate the bounded wait timing out.
                thread::sleep(timeout);
            }
            Ok(ready)
        }
    }

    #[derive(Clone, Default)]
    struct Counters {
        readable: Arc<AtomicUsize>,
        teardown: Arc<AtomicUsize>,
    }

    impl Counters {
        fn readable(&self) -> usize {
            self.readable.load(Ordering::SeqCst)
        }

        fn teardown(&self) -> usize {
            self.teardown.load(Ordering::SeqCst)
        }
    }

    struct TestSocket {
        handle: SocketHandle,
        counters: Counters,
    }

    impl TestSocket {
        fn new(handle: SocketHandle) -> (Box<dyn PollableSocket>, Counters) {
            let counters = Counters::default();
            let socket = Box::new(Self {
                handle,
                counters: counters.clone(),
            });
            (socket, counters)
        }
    }

    impl PollableSocket for TestSocket {
        fn handle(&self) -> SocketHandle {
            self.handle
        }

        fn on_readable(&mut self) {
            self.counters.readable.fetch_add(1, Ordering::SeqCst);
        }

        fn on_teardown(&mut self) {
            self.counters.teardown.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_worker(capacity: usize, poller: Arc<dyn Readiness>) -> SocketWorker {
        let config = PoolConfig {
            max_sockets_per_worker: capacity,
            poll_timeout: Duration::from_millis(1),
            idle_sleep: Duration::from_millis(1),
        };
        SocketWorker::new(0, &config, poller)
    }

    #[test]
    fn test_merge_promotes_pending_add() {
        let worker = test_worker(8, ScriptedReadiness::idle());
        let (socket, _) = TestSocket::new(5);
        worker.add_socket(socket).unwrap();

        let mut poll_loop = worker.poll_loop();
        poll_loop.merge();

        assert!(poll_loop.live.contains_key(&5));
        let queue = worker.queue.lock();
        assert!(queue.pending_add.is_empty());
        assert!(queue.live_handles.contains(&5));
    }

    #[test]
    fn test_removal_before_poll_never_dispatches() {
        let worker = test_worker(8, ScriptedReadiness::new(vec![5]));
        let (socket, counters) = TestSocket::new(5);
        worker.add_socket(socket).unwrap();
        worker.remove_socket(5).unwrap();

        let mut poll_loop = worker.poll_loop();
        poll_loop.cycle();
        poll_loop.cycle();

        assert_eq!(counters.readable(), 0);
        assert_eq!(counters.teardown(), 1);
        assert!(poll_loop.live.is_empty());
    }

    #[test]
    fn test_no_double_free_after_promotion() {
        let worker = test_worker(8, ScriptedReadiness::idle());
        let (socket, counters) = TestSocket::new(7);
        worker.add_socket(socket).unwrap();

        let mut poll_loop = worker.poll_loop();
        poll_loop.merge();
        worker.remove_socket(7).unwrap();
        poll_loop.merge();
        poll_loop.teardown_all();

        assert_eq!(counters.teardown(), 1);
    }

    #[test]
    fn test_duplicate_removal_is_applied_once() {
        let worker = test_worker(8, ScriptedReadiness::idle());
        let (socket, counters) = TestSocket::new(3);
        worker.add_socket(socket).unwrap();

        let mut poll_loop = worker.poll_loop();
        poll_loop.merge();
        worker.remove_socket(3).unwrap();
        worker.remove_socket(3).unwrap();
        poll_loop.merge();

        assert_eq!(counters.teardown(), 1);
        assert_eq!(worker.registered_count(), 0);
    }

    #[test]
    fn test_capacity_rejection_leaves_queue_untouched() {
        let worker = test_worker(2, ScriptedReadiness::idle());
        worker.add_socket(TestSocket::new(1).0).unwrap();
        worker.add_socket(TestSocket::new(2).0).unwrap();

        let (third, counters) = TestSocket::new(3);
        let rejected = worker.add_socket(third).unwrap_err();

        assert!(matches!(rejected.error, SocketError::AtCapacity(2)));
        assert_eq!(rejected.socket.handle(), 3);
        assert_eq!(worker.registered_count(), 2);
        // Ownership stayed with the caller; no teardown has fired.
        assert_eq!(counters.teardown(), 0);
    }

    #[test]
    fn test_invalid_handle_rejected() {
        let worker = test_worker(8, ScriptedReadiness::idle());
        let (socket, _) = TestSocket::new(-1);
        let rejected = worker.add_socket(socket).unwrap_err();

        assert!(matches!(rejected.error, SocketError::InvalidHandle(-1)));
        assert_eq!(worker.registered_count(), 0);
    }

    #[test]
    fn test_duplicate_handle_rejected() {
        let worker = test_worker(8, ScriptedReadiness::idle());
        worker.add_socket(TestSocket::new(4).0).unwrap();

        let rejected = worker.add_socket(TestSocket::new(4).0).unwrap_err();
        assert!(matches!(rejected.error, SocketError::DuplicateHandle(4)));
    }

    #[test]
    fn test_remove_unknown_handle_fails() {
        let worker = test_worker(8, ScriptedReadiness::idle());
        assert!(matches!(
            worker.remove_socket(99),
            Err(SocketError::NotFound(99))
        ));
    }

    #[test]
    fn test_dispatch_only_ready_sockets() {
        let worker = test_worker(8, ScriptedReadiness::new(vec![5]));
        let (ready_socket, ready_counters) = TestSocket::new(5);
        let (quiet_socket, quiet_counters) = TestSocket::new(6);
        worker.add_socket(ready_socket).unwrap();
        worker.add_socket(quiet_socket).unwrap();

        let mut poll_loop = worker.poll_loop();
        poll_loop.cycle();

        assert_eq!(ready_counters.readable(), 1);
        assert_eq!(quiet_counters.readable(), 0);
    }

    #[test]
    fn test_start_stop_tears_down_live_sockets() {
        let mut worker = test_worker(8, ScriptedReadiness::idle());
        let (socket, counters) = TestSocket::new(9);
        worker.add_socket(socket).unwrap();

        worker.start().unwrap();
        assert!(worker.is_running());
        // Second start while running is a no-op.
        worker.start().unwrap();

        thread::sleep(Duration::from_millis(30));
        worker.stop().unwrap();
        worker.stop().unwrap();

        assert!(!worker.is_running());
        assert_eq!(counters.teardown(), 1);
        assert_eq!(worker.registered_count(), 0);
    }

    #[test]
    fn test_stop_reports_panicked_thread() {
        struct PanicSocket;
        impl PollableSocket for PanicSocket {
            fn handle(&self) -> SocketHandle {
                20
            }
            fn on_readable(&mut self) {
                panic!("socket read blew up");
            }
            fn on_teardown(&mut self) {}
        }

        let mut worker = test_worker(8, ScriptedReadiness::new(vec![20]));
        worker.add_socket(Box::new(PanicSocket)).unwrap();
        worker.start().unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(matches!(worker.stop(), Err(PoolError::WorkerPanicked(0))));
        // Idempotent after the failure has been reported.
        assert!(worker.stop().is_ok());
    }

    #[test]
    fn test_drop_tears_down_never_polled_sockets() {
        let (socket, counters) = TestSocket::new(11);
        {
            let worker = test_worker(8, ScriptedReadiness::idle());
            worker.add_socket(socket).unwrap();
        }
        assert_eq!(counters.teardown(), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(SocketHandle),
        Remove(SocketHandle),
        Merge,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..8i32).prop_map(Op::Add),
            (0..8i32).prop_map(Op::Remove),
            Just(Op::Merge),
        ]
    }

    proptest! {
        /// For any sequence of add/remove/merge, a handle never sits in
        /// pending_add and the live set at once after a merge, and every
        /// accepted socket is torn down exactly once.
        #[test]
        fn test_ownership_invariant(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let worker = test_worker(8, ScriptedReadiness::idle());
            let mut poll_loop = worker.poll_loop();
            let mut accepted: Vec<Counters> = Vec::new();

            for op in ops {
                match op {
                    Op::Add(handle) => {
                        let (socket, counters) = TestSocket::new(handle);
                        if worker.add_socket(socket).is_ok() {
                            accepted.push(counters);
                        }
                    }
                    Op::Remove(handle) => {
                        let _ = worker.remove_socket(handle);
                    }
                    Op::Merge => {
                        poll_loop.merge();
                        let queue = worker.queue.lock();
                        for socket in &queue.pending_add {
                            prop_assert!(!poll_loop.live.contains_key(&socket.handle()));
                        }
                        prop_assert_eq!(
                            queue.live_handles.iter().copied().collect::<Vec<_>>(),
                            poll_loop.live.keys().copied().collect::<Vec<_>>()
                        );
                    }
                }
            }

            poll_loop.teardown_all();
            for counters in &accepted {
                prop_assert_eq!(counters.teardown(), 1);
            }
        }
    }
}
