//! # Task Management System
//!
//! A small worker pool for executing [`Task`]s off the owning thread.
//!
//! ## Architecture Overview
//! - `TaskManager`: central coordinator for task distribution and result collection
//! - `Task`: a unit of work with a typed output
//! - `TaskChannel`: the pair of channels connecting the owner to one worker thread
//!
//! ## Task Lifecycle
//! 1. Tasks are published via `TaskManager::publish_task()`
//! 2. The manager hands them to worker channels round-robin, queueing when every worker is busy
//! 3. Workers run `Task::process()`, catching panics and converting them with `Task::recover()`
//! 4. Outputs are collected on the owning thread by `TaskManager::drain_completed()`, which also
//!    feeds queued tasks to workers that became free
//!
//! With zero workers every task runs inline inside `publish_task()` and its output is returned
//! by the next `drain_completed()`. Tests rely on this for deterministic scheduling.
//!
//! ## Example Usage
//! ```rust
//! use voxel_runtime::engine_state::task_management::{task::Task, TaskManager};
//!
//! struct Square(u32);
//!
//! impl Task for Square {
//!     type Output = u32;
//!     fn process(&self) -> u32 { self.0 * self.0 }
//!     fn recover(&self, _panic_message: String) -> u32 { 0 }
//! }
//!
//! let mut task_manager = TaskManager::new(0);
//! task_manager.publish_task(Square(7));
//! assert_eq!(task_manager.drain_completed(), vec![49]);
//! ```

pub mod task;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};

use task::Task;

use crate::core::panic_message;

/// A communication channel between the owning thread and one worker thread.
#[derive(Debug)]
pub struct TaskChannel<T: Task> {
    task_sender: Sender<T>,
    result_receiver: Receiver<T::Output>,
    num_tasks_in_flight: usize,
    _worker: JoinHandle<()>,
}

/// Manages a pool of worker threads and coordinates task execution.
///
/// Dropping the manager closes every task channel; workers exit once their current task is
/// done and its output is discarded.
pub struct TaskManager<T: Task> {
    channels: Vec<TaskChannel<T>>,
    queued_tasks: VecDeque<T>,
    completed_inline: Vec<T::Output>,
    current_channel: usize,
}

/// Maximum number of tasks that can be in flight per worker channel.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

fn run_isolated<T: Task>(task: &T) -> T::Output {
    match panic::catch_unwind(AssertUnwindSafe(|| task.process())) {
        Ok(output) => output,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("Task panicked: {}", message);
            task.recover(message)
        }
    }
}

impl<T: Task> TaskManager<T> {
    /// Creates a new `TaskManager` with the specified number of worker threads.
    ///
    /// Zero workers means every task runs inline on the publishing thread.
    pub fn new(num_workers: usize) -> Self {
        let mut channels = Vec::with_capacity(num_workers);

        if num_workers > 0 {
            log::info!(
                "Starting {} task worker(s), available parallelism: {:?}",
                num_workers,
                thread::available_parallelism()
            );
        }

        for _ in 0..num_workers {
            let (task_tx, task_rx) = channel::<T>();
            let (result_tx, result_rx) = channel::<T::Output>();

            let worker = thread::spawn(move || {
                while let Ok(task) = task_rx.recv() {
                    if result_tx.send(run_isolated(&task)).is_err() {
                        break;
                    }
                }
            });

            channels.push(TaskChannel {
                task_sender: task_tx,
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                _worker: worker,
            });
        }

        TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            completed_inline: Vec::new(),
            current_channel: 0,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.channels.len()
    }

    /// Tasks sent to a worker whose output has not been collected yet.
    pub fn tasks_in_flight(&self) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.num_tasks_in_flight)
            .sum()
    }

    /// Tasks waiting for a free worker.
    pub fn queued_len(&self) -> usize {
        self.queued_tasks.len()
    }

    /// Attempts to send a task to a specific worker channel, handing it back on failure.
    fn try_send_task(&mut self, task: T, channel_idx: usize) -> Result<(), T> {
        match self.channels[channel_idx].task_sender.send(task) {
            Ok(_) => {
                self.channels[channel_idx].num_tasks_in_flight += 1;
                Ok(())
            }
            Err(error) => {
                log::error!("Task worker {} disconnected", channel_idx);
                Err(error.0)
            }
        }
    }

    /// Finds a worker channel below `MAX_TASKS_IN_FLIGHT`, round-robin from the last used one.
    fn find_available_channel(&self) -> Option<usize> {
        let channel_count = self.channels.len();
        (0..channel_count)
            .map(|offset| (self.current_channel + offset) % channel_count)
            .find(|&idx| self.channels[idx].num_tasks_in_flight < MAX_TASKS_IN_FLIGHT)
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was handed to a worker or already ran inline
    /// - `false` if the task was queued because all workers are busy
    pub fn publish_task(&mut self, task: T) -> bool {
        if self.channels.is_empty() {
            let output = run_isolated(&task);
            self.completed_inline.push(output);
            return true;
        }

        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                    true
                }
                Err(task) => {
                    self.queued_tasks.push_back(task);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Hands queued tasks to free workers, oldest first.
    pub fn process_queued_tasks(&mut self) {
        while let Some(channel_idx) = self.find_available_channel() {
            let Some(task) = self.queued_tasks.pop_front() else {
                return;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => self.current_channel = (channel_idx + 1) % self.channels.len(),
                Err(task) => {
                    self.queued_tasks.push_front(task);
                    return;
                }
            }
        }
    }

    /// Collects every output that is ready without blocking, then refills free workers from the
    /// queue.
    pub fn drain_completed(&mut self) -> Vec<T::Output> {
        let mut completed = std::mem::take(&mut self.completed_inline);
        for channel in &mut self.channels {
            while let Ok(output) = channel.result_receiver.try_recv() {
                channel.num_tasks_in_flight -= 1;
                completed.push(output);
            }
        }
        self.process_queued_tasks();
        completed
    }

    /// Blocks until every published task has produced its output, and returns all of them.
    pub fn wait_all(&mut self) -> Vec<T::Output> {
        let mut completed = Vec::new();
        loop {
            completed.extend(self.drain_completed());
            if self.tasks_in_flight() == 0 {
                if !self.queued_tasks.is_empty() {
                    log::error!("{} queued task(s) have no worker to run on", self.queued_tasks.len());
                }
                return completed;
            }
            for channel in &mut self.channels {
                if channel.num_tasks_in_flight == 0 {
                    continue;
                }
                match channel.result_receiver.recv() {
                    Ok(output) => {
                        channel.num_tasks_in_flight -= 1;
                        completed.push(output);
                    }
                    Err(_) => {
                        log::error!(
                            "Task worker exited with {} task(s) in flight",
                            channel.num_tasks_in_flight
                        );
                        channel.num_tasks_in_flight = 0;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Double(i32);

    impl Task for Double {
        type Output = Result<i32, String>;

        fn process(&self) -> Self::Output {
            if self.0 < 0 {
                panic!("negative input {}", self.0);
            }
            Ok(self.0 * 2)
        }

        fn recover(&self, panic_message: String) -> Self::Output {
            Err(panic_message)
        }
    }

    #[test]
    fn zero_workers_run_inline() {
        let mut manager = TaskManager::new(0);
        assert!(manager.publish_task(Double(2)));
        assert!(manager.publish_task(Double(5)));
        assert_eq!(manager.tasks_in_flight(), 0);
        assert_eq!(manager.drain_completed(), vec![Ok(4), Ok(10)]);
        assert!(manager.drain_completed().is_empty());
    }

    #[test]
    fn panics_are_recovered() {
        let mut manager = TaskManager::new(0);
        manager.publish_task(Double(-3));
        let outputs = manager.drain_completed();
        assert!(matches!(&outputs[..], [Err(message)] if message.contains("negative input -3")));
    }

    #[test]
    fn workers_process_everything_published() {
        let mut manager = TaskManager::new(2);
        let queued = (0..10).map(|n| manager.publish_task(Double(n))).filter(|sent| !sent).count();
        assert_eq!(manager.queued_len(), queued);

        let mut outputs: Vec<_> = manager.wait_all().into_iter().map(|o| o.unwrap()).collect();
        outputs.sort();
        assert_eq!(outputs, (0..10).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(manager.tasks_in_flight(), 0);
        assert_eq!(manager.queued_len(), 0);
    }
}
