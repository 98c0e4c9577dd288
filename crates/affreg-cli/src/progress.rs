use affreg_registration::{ProgressCallback, ProgressInfo};
use indicatif::{ProgressBar, ProgressStyle};

/// Drives a terminal progress bar from tracker updates.
pub struct BarCallback {
    bar: ProgressBar,
    loss_label: &'static str,
}

impl BarCallback {
    pub fn new(total: usize, loss_label: &'static str) -> anyhow::Result<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({eta})")?
                .progress_chars("#>-"),
        );
        Ok(Self { bar, loss_label })
    }
}

impl ProgressCallback for BarCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.iteration as u64);
        let mut message = format!("{} {:.4}", self.loss_label, info.loss);
        for (name, value) in &info.metrics {
            message.push_str(&format!(", {name} {value:.4}"));
        }
        self.bar.set_message(message);
    }

    fn on_complete(&self, _info: &ProgressInfo) {
        self.bar.finish();
    }

    fn on_error(&self, error: &str) {
        self.bar.abandon_with_message(error.to_string());
    }
}
