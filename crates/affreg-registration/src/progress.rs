//! Progress reporting for iterative registration and network training.
//!
//! A [`ProgressTracker`] fans each update out to a set of [`ProgressCallback`]s. The same
//! tracker drives both the per-iteration loop of the classical baseline and the
//! per-epoch loop of the trainer, so "iteration" means whichever unit the caller counts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot passed to callbacks.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub iteration: usize,
    pub total_iterations: Option<usize>,
    pub loss: f64,
    pub elapsed: Duration,
    pub estimated_remaining: Option<Duration>,
    pub learning_rate: f64,
    /// Extra named values, e.g. validation loss.
    pub metrics: Vec<(String, f64)>,
}

impl ProgressInfo {
    pub fn new(
        iteration: usize,
        total_iterations: Option<usize>,
        loss: f64,
        elapsed: Duration,
        learning_rate: f64,
    ) -> Self {
        Self {
            iteration,
            total_iterations,
            loss,
            elapsed,
            estimated_remaining: None,
            learning_rate,
            metrics: Vec::new(),
        }
    }

    pub fn progress_percent(&self) -> Option<f64> {
        self.total_iterations
            .filter(|&total| total > 0)
            .map(|total| (self.iteration as f64 / total as f64) * 100.0)
    }

    /// Extrapolate the remaining time from the mean time per iteration so far.
    pub fn calculate_remaining(&mut self) {
        if let Some(total) = self.total_iterations {
            if self.iteration > 0 {
                let per_iteration = self.elapsed.as_secs_f64() / self.iteration as f64;
                let remaining = total.saturating_sub(self.iteration);
                self.estimated_remaining = Some(Duration::from_secs_f64(per_iteration * remaining as f64));
            }
        }
    }

    pub fn add_metric(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.push((name.into(), value));
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Receives progress events.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, info: &ProgressInfo);

    fn on_start(&self) {}

    fn on_complete(&self, _info: &ProgressInfo) {}

    fn on_error(&self, _error: &str) {}

    /// Ask the running loop to stop early.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Logs every `log_interval` iterations through `tracing`.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    pub log_interval: usize,
    /// Prefix of every line, e.g. "Registration" or "Training".
    pub label: String,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
            label: "Registration".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration % self.log_interval != 0 && info.total_iterations != Some(info.iteration) {
            return;
        }
        let remaining = info
            .estimated_remaining
            .map(|d| format!("{:.2}s", d.as_secs_f64()))
            .unwrap_or_else(|| "N/A".to_string());

        tracing::info!(
            "{} {}/{} ({:.1}%) | Loss: {:.6} | LR: {:.2e} | Elapsed: {:.2}s | ETA: {}",
            self.label,
            info.iteration,
            info.total_iterations.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
            info.progress_percent().unwrap_or(0.0),
            info.loss,
            info.learning_rate,
            info.elapsed.as_secs_f64(),
            remaining
        );
        for (name, value) in &info.metrics {
            tracing::info!("  {}: {:.6}", name, value);
        }
    }

    fn on_start(&self) {
        tracing::info!("{} started", self.label);
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "{} completed after {} iterations in {:.2}s with final loss: {:.6}",
            self.label,
            info.iteration,
            info.elapsed.as_secs_f64(),
            info.loss
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("{} failed: {}", self.label, error);
    }
}

/// Records every update.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_history(&self) -> Vec<ProgressInfo> {
        lock(&self.history).clone()
    }

    pub fn losses(&self) -> Vec<f64> {
        lock(&self.history).iter().map(|info| info.loss).collect()
    }

    pub fn clear(&self) {
        lock(&self.history).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        lock(&self.history).push(info.clone());
    }
}

#[derive(Debug)]
struct EarlyStoppingState {
    counter: usize,
    best_loss: f64,
    should_stop: bool,
}

impl Default for EarlyStoppingState {
    fn default() -> Self {
        Self {
            counter: 0,
            best_loss: f64::INFINITY,
            should_stop: false,
        }
    }
}

/// Stops after `patience` updates without an improvement larger than `min_improvement`.
///
/// By default the update's loss is watched; [`EarlyStoppingCallback::monitoring`] selects
/// one of the extra metrics instead (the trainer monitors validation loss this way).
#[derive(Debug, Clone)]
pub struct EarlyStoppingCallback {
    pub min_improvement: f64,
    pub patience: usize,
    pub min_loss: Option<f64>,
    monitor: Option<String>,
    state: Arc<Mutex<EarlyStoppingState>>,
}

impl EarlyStoppingCallback {
    pub fn new(min_improvement: f64, patience: usize) -> Self {
        Self {
            min_improvement,
            patience: patience.max(1),
            min_loss: None,
            monitor: None,
            state: Arc::new(Mutex::new(EarlyStoppingState::default())),
        }
    }

    pub fn with_min_loss(mut self, min_loss: f64) -> Self {
        self.min_loss = Some(min_loss);
        self
    }

    pub fn monitoring(mut self, metric: impl Into<String>) -> Self {
        self.monitor = Some(metric.into());
        self
    }

    pub fn best_loss(&self) -> f64 {
        lock(&self.state).best_loss
    }

    pub fn reset(&self) {
        *lock(&self.state) = EarlyStoppingState::default();
    }
}

impl ProgressCallback for EarlyStoppingCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        let value = match &self.monitor {
            Some(name) => match info.metric(name) {
                Some(v) => v,
                None => return,
            },
            None => info.loss,
        };
        let mut state = lock(&self.state);

        if let Some(min_loss) = self.min_loss {
            if value <= min_loss {
                state.should_stop = true;
                tracing::info!("Early stopping: loss {} reached minimum threshold {}", value, min_loss);
                return;
            }
        }

        if state.best_loss - value > self.min_improvement {
            state.best_loss = value;
            state.counter = 0;
        } else {
            state.counter += 1;
        }

        if state.counter >= self.patience && !state.should_stop {
            state.should_stop = true;
            tracing::info!(
                "Early stopping: no improvement for {} updates (best loss: {:.6}, current: {:.6})",
                self.patience,
                state.best_loss,
                value
            );
        }
    }

    fn should_stop(&self) -> bool {
        lock(&self.state).should_stop
    }
}

/// Fans updates out to registered callbacks and keeps the clock.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
    last: Arc<Mutex<Option<ProgressInfo>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.add_callback(callback);
        self
    }

    pub fn start(&self) {
        *lock(&self.start_time) = Some(Instant::now());
        *lock(&self.last) = None;
        for callback in &self.callbacks {
            callback.on_start();
        }
    }

    fn elapsed(&self) -> Duration {
        lock(&self.start_time).map(|t| t.elapsed()).unwrap_or(Duration::ZERO)
    }

    pub fn update(&self, iteration: usize, total_iterations: Option<usize>, loss: f64, learning_rate: f64) {
        self.update_with_metrics(iteration, total_iterations, loss, learning_rate, Vec::new());
    }

    pub fn update_with_metrics(
        &self,
        iteration: usize,
        total_iterations: Option<usize>,
        loss: f64,
        learning_rate: f64,
        metrics: Vec<(String, f64)>,
    ) {
        let mut info = ProgressInfo::new(iteration, total_iterations, loss, self.elapsed(), learning_rate);
        info.metrics = metrics;
        info.calculate_remaining();

        for callback in &self.callbacks {
            callback.on_progress(&info);
        }
        *lock(&self.last) = Some(info);
    }

    /// Whether any callback asked to stop.
    pub fn should_stop(&self) -> bool {
        self.callbacks.iter().any(|callback| callback.should_stop())
    }

    /// Report completion with the last update's iteration count and the given loss.
    pub fn complete(&self, final_loss: f64, learning_rate: f64) {
        let last = lock(&self.last).clone();
        let mut info = ProgressInfo::new(
            last.as_ref().map(|info| info.iteration).unwrap_or(0),
            last.as_ref().and_then(|info| info.total_iterations),
            final_loss,
            self.elapsed(),
            learning_rate,
        );
        if let Some(last) = last {
            info.metrics = last.metrics;
        }

        for callback in &self.callbacks {
            callback.on_complete(&info);
        }
    }

    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_info() {
        let info = ProgressInfo::new(10, Some(100), 0.5, Duration::from_secs(10), 0.01);
        assert_eq!(info.progress_percent(), Some(10.0));
        assert_eq!(ProgressInfo::new(0, Some(0), 0.5, Duration::ZERO, 0.01).progress_percent(), None);
    }

    #[test]
    fn test_progress_info_remaining() {
        let mut info = ProgressInfo::new(10, Some(100), 0.5, Duration::from_secs(10), 0.01);
        info.calculate_remaining();
        let remaining = info.estimated_remaining.unwrap();
        assert!((remaining.as_secs_f64() - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_early_stopping() {
        let callback = EarlyStoppingCallback::new(0.01, 3);
        for (i, loss) in [1.0, 0.9, 0.8].into_iter().enumerate() {
            callback.on_progress(&ProgressInfo::new(i, Some(10), loss, Duration::ZERO, 0.01));
        }
        assert!(!callback.should_stop());

        for i in 3..6 {
            callback.on_progress(&ProgressInfo::new(i, Some(10), 0.8, Duration::ZERO, 0.01));
        }
        assert!(callback.should_stop());
        assert_eq!(callback.best_loss(), 0.8);

        callback.reset();
        assert!(!callback.should_stop());
    }

    #[test]
    fn test_early_stopping_on_metric() {
        let callback = EarlyStoppingCallback::new(0.0, 2).monitoring("val_loss");
        let info = |loss: f64, val: f64| {
            let mut info = ProgressInfo::new(0, None, loss, Duration::ZERO, 0.01);
            info.add_metric("val_loss", val);
            info
        };
        // training loss improves, validation does not
        callback.on_progress(&info(1.0, 0.5));
        callback.on_progress(&info(0.5, 0.6));
        assert!(!callback.should_stop());
        callback.on_progress(&info(0.2, 0.7));
        assert!(callback.should_stop());
    }

    #[test]
    fn test_history_callback() {
        let callback = HistoryCallback::new();
        callback.on_progress(&ProgressInfo::new(1, Some(10), 0.5, Duration::ZERO, 0.01));
        callback.on_progress(&ProgressInfo::new(2, Some(10), 0.4, Duration::ZERO, 0.01));

        let history = callback.get_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].iteration, 2);
        assert_eq!(callback.losses(), vec![0.5, 0.4]);
    }

    #[test]
    fn test_progress_tracker() {
        let history = Arc::new(HistoryCallback::new());
        let stopper = Arc::new(EarlyStoppingCallback::new(0.0, 1).with_min_loss(0.1));
        let tracker = ProgressTracker::new()
            .with_callback(Arc::new(ConsoleProgressCallback::new(1)))
            .with_callback(history.clone())
            .with_callback(stopper);

        tracker.start();
        tracker.update(1, Some(10), 0.5, 0.01);
        assert!(!tracker.should_stop());
        tracker.update(2, Some(10), 0.05, 0.01);
        assert!(tracker.should_stop());
        tracker.complete(0.05, 0.01);

        assert_eq!(history.get_history().len(), 2);
    }
}
