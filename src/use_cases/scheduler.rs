// Owned, stoppable handles for the periodic background tasks of one process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct TaskHandle {
    name: &'static str,
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    // Signals the task and waits for the pass in flight to finish.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.join.await {
            warn!(task = self.name, error = %err, "background task ended abnormally");
        }
    }
}

// Runs `task` every `period`. A pass that overruns delays the next one instead of queueing more.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut task: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = signal.notified() => break,
                _ = interval.tick() => task().await,
            }
        }
        debug!(task = name, "background task stopped");
    });

    TaskHandle {
        name,
        shutdown,
        join,
    }
}

#[derive(Default)]
pub struct BackgroundTasks {
    tasks: Vec<TaskHandle>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: TaskHandle) {
        info!(task = handle.name(), "background task started");
        self.tasks.push(handle);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub async fn stop_all(&mut self) {
        for handle in self.tasks.drain(..) {
            let name = handle.name();
            handle.stop().await;
            info!(task = name, "background task stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(period: Duration) -> (TaskHandle, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_periodic("counter", period, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (handle, runs)
    }

    #[tokio::test]
    async fn when_task_is_stopped_then_no_further_passes_run() {
        let (handle, runs) = counting(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;

        handle.stop().await;
        let stopped_at = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(stopped_at >= 2, "ran {stopped_at} times");
        assert_eq!(runs.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test]
    async fn when_stop_all_runs_then_every_task_finishes() {
        let mut tasks = BackgroundTasks::new();
        let (first, _) = counting(Duration::from_millis(5));
        let (second, _) = counting(Duration::from_millis(5));
        tasks.push(first);
        tasks.push(second);
        assert_eq!(tasks.len(), 2);

        tasks.stop_all().await;

        assert!(tasks.is_empty());
    }
}
