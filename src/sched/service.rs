// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, OnceLock, Weak,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info};

use super::{InstanceId, Notifier, SchedKind, Task};

/// Reason codes a schedulable holds before further ones are dropped.
pub const SCHED_QUEUE_SIZE: usize = 8;

/// Schedulables waiting on the worker.
const RUN_QUEUE_SIZE: usize = 64;

/// The worker also wakes on its own this often, so a missed wakeup cannot
/// stall scheduled work.
const WAKE_TIMEOUT: Duration = Duration::from_millis(20);

struct WorkerState {
    refs: usize,
    running: bool,
    generation: u64,
    thread: Option<JoinHandle<()>>,
}

struct NotifierEntry {
    id: u64,
    instance: InstanceId,
    notifier: Arc<dyn Notifier>,
}

struct Inner {
    state: Mutex<WorkerState>,
    wake: Condvar,
    run_tx: Sender<Arc<Sched>>,
    run_rx: Receiver<Arc<Sched>>,
    /// Every live schedulable, swept for codes that missed the run queue.
    live: Mutex<Vec<Weak<Sched>>>,
    notifiers: RwLock<Vec<NotifierEntry>>,
    next_notifier: AtomicU64,
}

/// Owns the worker thread that processes scheduled work. The worker is
/// started when the first [`Sched`] is created and stopped and joined when
/// the last one is dropped.
#[derive(Clone)]
pub struct SchedService {
    inner: Arc<Inner>,
}

impl Default for SchedService {
    fn default() -> Self {
        SchedService::new()
    }
}

impl SchedService {
    pub fn new() -> SchedService {
        let (run_tx, run_rx) = bounded(RUN_QUEUE_SIZE);
        SchedService {
            inner: Arc::new(Inner {
                state: Mutex::new(WorkerState {
                    refs: 0,
                    running: false,
                    generation: 0,
                    thread: None,
                }),
                wake: Condvar::new(),
                run_tx,
                run_rx,
                live: Mutex::new(Vec::new()),
                notifiers: RwLock::new(Vec::new()),
                next_notifier: AtomicU64::new(0),
            }),
        }
    }

    /// The process wide service engines use unless they are given one.
    pub fn shared() -> SchedService {
        static SHARED: OnceLock<SchedService> = OnceLock::new();
        SHARED.get_or_init(SchedService::new).clone()
    }

    /// Whether the worker thread is running.
    pub fn is_running(&self) -> bool {
        let state = self.inner.state.lock();
        state.running && state.thread.is_some()
    }

    /// The number of live schedulables.
    pub fn refs(&self) -> usize {
        self.inner.state.lock().refs
    }

    /// Registers an observer of the given engine instance. It is unregistered
    /// when the handle is dropped.
    pub fn register_notifier(
        &self,
        instance: InstanceId,
        notifier: Arc<dyn Notifier>,
    ) -> NotifierHandle {
        let id = self.inner.next_notifier.fetch_add(1, Ordering::Relaxed);
        self.inner.notifiers.write().push(NotifierEntry {
            id,
            instance,
            notifier,
        });
        NotifierHandle {
            service: self.clone(),
            id,
        }
    }

    fn acquire(&self) {
        let mut state = self.inner.state.lock();
        state.refs += 1;
        if state.thread.is_some() {
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        let inner = self.inner.clone();
        match thread::Builder::new()
            .name(String::from("kitsynth-sched"))
            .spawn(move || run(inner, generation))
        {
            Ok(handle) => {
                state.running = true;
                state.thread = Some(handle);
                info!("Scheduler worker started");
            }
            Err(e) => error!(err = %e, "Unable to start scheduler worker"),
        }
    }

    fn release(&self) {
        let handle = {
            let mut state = self.inner.state.lock();
            state.refs = state.refs.saturating_sub(1);
            if state.refs > 0 {
                return;
            }
            state.running = false;
            state.thread.take()
        };
        self.inner.wake.notify_all();

        if let Some(handle) = handle {
            // The last schedulable may be dropped by the worker itself, which
            // then exits on its own.
            if handle.thread().id() != thread::current().id() {
                if handle.join().is_err() {
                    error!("Scheduler worker panicked");
                }
                info!("Scheduler worker stopped");
            }
        }
    }

    fn enqueue(&self, sched: Arc<Sched>) -> bool {
        self.inner.run_tx.try_send(sched).is_ok()
    }

    /// Wakes the worker without ever blocking the caller.
    fn wake(&self) {
        if let Some(_state) = self.inner.state.try_lock() {
            self.inner.wake.notify_one();
        }
    }

    fn notify(&self, instance: InstanceId, kind: SchedKind, id: i32) {
        for entry in self.inner.notifiers.read().iter() {
            if entry.instance == instance {
                entry.notifier.notify(kind, id);
            }
        }
    }
}

/// Schedulables holding codes that are not on the run queue.
fn stranded(inner: &Inner) -> Vec<Arc<Sched>> {
    let mut live = inner.live.lock();
    live.retain(|sched| sched.strong_count() > 0);
    live.iter()
        .filter_map(Weak::upgrade)
        .filter(|sched| !sched.sync_wait.load(Ordering::Acquire) && !sched.rx.is_empty())
        .collect()
}

fn run(inner: Arc<Inner>, generation: u64) {
    loop {
        while let Ok(sched) = inner.run_rx.try_recv() {
            sched.sync_process();
        }
        for sched in stranded(&inner) {
            sched.sync_process();
        }

        let mut state = inner.state.lock();
        if !state.running || state.generation != generation {
            break;
        }
        if inner.run_rx.is_empty() {
            inner.wake.wait_for(&mut state, WAKE_TIMEOUT);
        }
        if !state.running || state.generation != generation {
            break;
        }
    }
    debug!(generation, "Scheduler worker exiting");
}

/// Unregisters its notifier when dropped.
pub struct NotifierHandle {
    service: SchedService,
    id: u64,
}

impl Drop for NotifierHandle {
    fn drop(&mut self) {
        self.service
            .inner
            .notifiers
            .write()
            .retain(|entry| entry.id != self.id);
    }
}

/// A unit of deferred work: a bounded queue of reason codes and the task
/// that processes them on the worker thread.
pub struct Sched {
    kind: SchedKind,
    instance: InstanceId,
    tx: Sender<i32>,
    rx: Receiver<i32>,
    sync_wait: AtomicBool,
    task: Mutex<Task>,
    service: SchedService,
}

impl Sched {
    pub fn new(service: &SchedService, instance: InstanceId, task: Task) -> Arc<Sched> {
        service.acquire();
        let (tx, rx) = bounded(SCHED_QUEUE_SIZE);
        let sched = Arc::new(Sched {
            kind: task.kind(),
            instance,
            tx,
            rx,
            sync_wait: AtomicBool::new(false),
            task: Mutex::new(task),
            service: service.clone(),
        });
        service.inner.live.lock().push(Arc::downgrade(&sched));
        sched
    }

    /// Queues a reason code for the worker. Never blocks; returns false when
    /// the queue is full and the code was dropped.
    pub fn schedule(self: &Arc<Self>, id: i32) -> bool {
        if self.tx.try_send(id).is_err() {
            return false;
        }
        if !self.sync_wait.swap(true, Ordering::AcqRel) && !self.service.enqueue(self.clone()) {
            // The run queue is full. The worker's sweep picks the code up.
            self.sync_wait.store(false, Ordering::Release);
        }
        self.service.wake();
        true
    }

    pub fn kind(&self) -> SchedKind {
        self.kind
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Reason codes waiting on the worker.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    fn sync_process(&self) {
        self.sync_wait.store(false, Ordering::Release);
        let mut task = self.task.lock();
        while let Ok(id) = self.rx.try_recv() {
            task.process(id);
            self.service.notify(self.instance, self.kind, id);
        }
    }
}

impl Drop for Sched {
    fn drop(&mut self) {
        self.service.release();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::sched::ChannelNotifier;
    use crate::testutil::eventually;

    use super::*;

    const RECV_TIMEOUT: Duration = Duration::from_secs(3);

    #[test]
    fn test_lifecycle() {
        let service = SchedService::new();
        assert!(!service.is_running());

        let instance = InstanceId::next();
        let a = Sched::new(&service, instance, Task::MidiIn);
        assert!(service.is_running());
        let b = Sched::new(&service, instance, Task::Controller);
        assert_eq!(service.refs(), 2);
        assert_eq!(a.kind(), SchedKind::MidiIn);
        assert_eq!(b.kind(), SchedKind::Controller);

        drop(a);
        assert!(service.is_running());
        drop(b);
        assert_eq!(service.refs(), 0);
        assert!(!service.is_running());

        // A new schedulable starts a new worker.
        let c = Sched::new(&service, instance, Task::MidiIn);
        assert!(service.is_running());
        drop(c);
        assert!(!service.is_running());
    }

    #[test]
    fn test_delivery_exactly_once() {
        let service = SchedService::new();
        let instance = InstanceId::next();
        let (notifier, receiver) = ChannelNotifier::channel();
        let _handle = service.register_notifier(instance, Arc::new(notifier));

        let sched = Sched::new(&service, instance, Task::MidiIn);
        for id in 0..100 {
            while !sched.schedule(id) {
                thread::sleep(Duration::from_millis(1));
            }
        }

        for id in 0..100 {
            let (kind, got) = receiver.recv_timeout(RECV_TIMEOUT).expect("notification");
            assert_eq!(kind, SchedKind::MidiIn);
            assert_eq!(got, id);
        }
        thread::sleep(Duration::from_millis(50));
        assert!(receiver.try_recv().is_err());
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn test_overflow_drops() {
        let service = SchedService::new();
        let instance = InstanceId::next();
        let (notifier, receiver) = ChannelNotifier::channel();
        let _handle = service.register_notifier(instance, Arc::new(notifier));

        let sched = Sched::new(&service, instance, Task::MidiIn);
        {
            // Holding the task keeps the worker from draining.
            let _task = sched.task.lock();
            for id in 0..SCHED_QUEUE_SIZE as i32 {
                assert!(sched.schedule(id));
            }
            assert!(!sched.schedule(99));
            assert_eq!(sched.pending(), SCHED_QUEUE_SIZE);
        }

        for id in 0..SCHED_QUEUE_SIZE as i32 {
            let (_, got) = receiver.recv_timeout(RECV_TIMEOUT).expect("notification");
            assert_eq!(got, id);
        }
        thread::sleep(Duration::from_millis(50));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_full_run_queue_still_delivers() {
        let service = SchedService::new();
        let instance = InstanceId::next();
        let (notifier, receiver) = ChannelNotifier::channel();
        let _handle = service.register_notifier(instance, Arc::new(notifier));

        let busy = Sched::new(&service, InstanceId::next(), Task::MidiIn);
        let scheds: Vec<Arc<Sched>> = (0..RUN_QUEUE_SIZE + 1)
            .map(|_| Sched::new(&service, instance, Task::MidiIn))
            .collect();
        {
            // The worker sits on the busy task while everything else queues up.
            let _task = busy.task.lock();
            assert!(busy.schedule(0));
            eventually(
                || !busy.sync_wait.load(Ordering::Acquire),
                "Worker never picked up the busy task",
            );
            for (id, sched) in scheds.iter().enumerate() {
                assert!(sched.schedule(id as i32));
            }
            assert!(service.inner.run_tx.is_full());
        }

        let mut got: Vec<i32> = (0..scheds.len())
            .map(|_| receiver.recv_timeout(RECV_TIMEOUT).expect("notification").1)
            .collect();
        got.sort();
        assert_eq!(got, (0..scheds.len() as i32).collect::<Vec<_>>());
        thread::sleep(Duration::from_millis(50));
        assert!(receiver.try_recv().is_err());
        assert!(scheds.iter().all(|sched| sched.pending() == 0));
    }

    #[test]
    fn test_notifiers_are_per_instance() {
        let service = SchedService::new();
        let mine = InstanceId::next();
        let other = InstanceId::next();
        let (notifier, receiver) = ChannelNotifier::channel();
        let handle = service.register_notifier(mine, Arc::new(notifier));

        let theirs = Sched::new(&service, other, Task::MidiIn);
        assert!(theirs.schedule(1));
        eventually(|| theirs.pending() == 0, "Other instance never drained");
        let ours = Sched::new(&service, mine, Task::MidiIn);
        assert!(ours.schedule(2));

        let (_, got) = receiver.recv_timeout(RECV_TIMEOUT).expect("notification");
        assert_eq!(got, 2);

        drop(handle);
        assert!(ours.schedule(3));
        eventually(|| ours.pending() == 0, "Never drained");
        thread::sleep(Duration::from_millis(50));
        assert!(receiver.try_recv().is_err());
    }
}
