use futures::{future::{BoxFuture, FutureExt}, task::{waker_ref, ArcWake, Context, Poll}};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::{future::Future, pin::Pin, sync::{Arc, Mutex}};

use crate::kernel::Sim;
use crate::shared::lock;
use crate::{WbError, WbResult};

pub(crate) type ReadyQueue = Arc<Mutex<Queue<Arc<Task>>>>;

pub(crate) fn new_ready_queue() -> ReadyQueue {
    Arc::new(Mutex::new(Queue::new()))
}

fn schedule_task(ready: &ReadyQueue, task: Arc<Task>) {
    // Queue::add never rejects, it only reports a capacity for bounded queues
    let _ = lock(ready).add(task);
}

fn next_task(ready: &ReadyQueue) -> Option<Arc<Task>> {
    lock(ready).remove().ok()
}

pub(crate) fn has_ready_tasks(ready: &ReadyQueue) -> bool {
    lock(ready).size() > 0
}

/// Polls every ready task until none is left. Tasks woken while this runs are
/// picked up in the same call.
#[inline]
pub(crate) fn run_once(ready: &ReadyQueue) {
    while let Some(task) = next_task(ready) {
        process_task(task);
    }
}

/// Cancels every queued task, dropping its future.
pub(crate) fn cancel_all(ready: &ReadyQueue) {
    while let Some(task) = next_task(ready) {
        task.cancel();
    }
}

#[inline]
fn process_task(task: Arc<Task>) {
    if task.state() == TaskState::Cancelled {
        // do not execute, the future is dropped together with the last reference
        if let Ok(mut slot) = task.future.try_lock() {
            slot.take();
        }
        return;
    }

    let mut fut_slot = lock(&task.future);
    let Some(mut fut) = fut_slot.take() else {
        // woken after completion, e.g. by a trigger that fired in the same delta
        tracing::trace!(task = %task.name, "ignoring wake of finished task");
        return;
    };
    let waker = waker_ref(&task);
    let context = &mut Context::from_waker(&waker);
    match fut.as_mut().poll(context) {
        Poll::Pending => {
            if task.state() != TaskState::Cancelled {
                *fut_slot = Some(fut);
            }
        }
        Poll::Ready(()) => {
            *lock(&task.state) = TaskState::Done;
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum TaskState {
    Pending,
    Done,
    Cancelled,
}

pub struct Task {
    name: String,
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    state: Mutex<TaskState>,
    ready: ReadyQueue,
}

impl Task {
    /// Schedules `future` on the simulation's executor. It first runs in the current
    /// (or next) time step.
    pub fn fork<T: Send + 'static>(
        sim: &Sim,
        future: impl Future<Output = T> + Send + 'static,
    ) -> JoinHandle<T> {
        Task::spawn_named(sim, "forked", future)
    }

    pub fn spawn_named<T: Send + 'static>(
        sim: &Sim,
        name: &str,
        future: impl Future<Output = T> + Send + 'static,
    ) -> JoinHandle<T> {
        let (tx, rx) = oneshot::channel::<T>();
        let wrapped = async move {
            let _ = tx.send(future.await);
        };
        let task = Arc::new(Task {
            name: name.to_string(),
            future: Mutex::new(Some(wrapped.boxed())),
            state: Mutex::new(TaskState::Pending),
            ready: sim.ready_queue().clone(),
        });
        schedule_task(&task.ready, task.clone());
        JoinHandle { task, join_rx: rx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> TaskState {
        *lock(&self.state)
    }

    pub fn cancel(&self) {
        // The executor drops the future instead of polling it. If the task is polling
        // right now the slot is locked and the executor drops it after the poll.
        let mut state = lock(&self.state);
        if *state == TaskState::Pending {
            *state = TaskState::Cancelled;
            drop(state);
            if let Ok(mut slot) = self.future.try_lock() {
                slot.take();
            }
        }
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(&arc_self.ready, arc_self.clone());
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Resolves to the forked task's output, or [`WbError::Cancelled`] if it was cancelled.
pub struct JoinHandle<T> {
    task: Arc<Task>,
    join_rx: oneshot::Receiver<T>,
}

impl<T> JoinHandle<T> {
    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    pub fn is_finished(&self) -> bool {
        self.task.state() != TaskState::Pending
    }

    /// Takes the output without awaiting, for use outside the executor.
    pub fn try_take(&mut self) -> WbResult<Option<T>> {
        self.join_rx
            .try_recv()
            .map_err(|_| WbError::Cancelled(self.task.name.clone()))
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = WbResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let name = self.task.name.clone();
        self.join_rx
            .poll_unpin(cx)
            .map(|result| result.map_err(|_| WbError::Cancelled(name)))
    }
}

impl<T> std::fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("JoinHandle").field(&self.task).finish()
    }
}
