//! Task executor metrics.

use core::fmt;
use metrics::Counter;

/// Task executor metrics.
#[derive(Clone, Debug)]
pub struct TaskExecutorMetrics {
    /// Number of spawned critical tasks
    pub(crate) critical_tasks_total: Counter,
    /// Number of finished spawned critical tasks
    pub(crate) finished_critical_tasks_total: Counter,
    /// Number of spawned regular tasks
    pub(crate) regular_tasks_total: Counter,
    /// Number of finished spawned regular tasks
    pub(crate) finished_regular_tasks_total: Counter,
}

impl Default for TaskExecutorMetrics {
    fn default() -> Self {
        Self {
            critical_tasks_total: metrics::counter!("wayfare_executor_critical_tasks_total"),
            finished_critical_tasks_total: metrics::counter!(
                "wayfare_executor_finished_critical_tasks_total"
            ),
            regular_tasks_total: metrics::counter!("wayfare_executor_regular_tasks_total"),
            finished_regular_tasks_total: metrics::counter!(
                "wayfare_executor_finished_regular_tasks_total"
            ),
        }
    }
}

impl TaskExecutorMetrics {
    pub(crate) fn inc_critical_tasks(&self) {
        self.critical_tasks_total.increment(1);
    }

    pub(crate) fn inc_regular_tasks(&self) {
        self.regular_tasks_total.increment(1);
    }
}

/// Increments a counter when dropped, so finished tasks are counted even on panic.
pub struct IncCounterOnDrop(Counter);

impl fmt::Debug for IncCounterOnDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IncCounterOnDrop").finish()
    }
}

impl IncCounterOnDrop {
    /// Creates a new instance of `IncCounterOnDrop` with the given counter.
    pub const fn new(counter: Counter) -> Self {
        Self(counter)
    }
}

impl Drop for IncCounterOnDrop {
    fn drop(&mut self) {
        self.0.increment(1);
    }
}
