//! # Task System Core Traits
//!
//! A `Task` is a self-contained unit of work executed on a worker thread. It owns everything it
//! needs, so nothing it touches can change underneath it, and it produces an `Output` that is
//! handed back to the thread owning the [`TaskManager`](super::TaskManager).
//!
//! ## Task Lifecycle
//! 1. A task is published via `TaskManager::publish_task()`
//! 2. Its `process()` method runs on a worker thread (or inline when there are no workers)
//! 3. If `process()` panics, `recover()` turns the panic message into an output instead
//! 4. The output is collected on the owning thread by `TaskManager::drain_completed()`

/// A unit of work that can be executed on a worker thread.
pub trait Task: Send + 'static {
    /// What the task hands back to the owning thread.
    type Output: Send + 'static;

    /// Performs the work.
    fn process(&self) -> Self::Output;

    /// Output reported when `process()` panicked.
    fn recover(&self, panic_message: String) -> Self::Output;
}
