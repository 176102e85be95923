use std::time::Duration;
use tokio::time::Instant;

use crate::models::EMOJI_HOURGLASS;
use crate::notify::{MessageId, Notifier};

const BAR_WIDTH: usize = 20;

/// Per-scan progress state: one status message, edited in place.
#[derive(Debug)]
pub struct ProgressContext {
    chat_id: i64,
    started: Instant,
    message_id: Option<MessageId>,
    last_text: Option<String>,
}

impl ProgressContext {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            started: Instant::now(),
            message_id: None,
            last_text: None,
        }
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    /// Sends the status message on first use and edits it afterwards, but
    /// only when the rendered text changed.
    pub async fn report(&mut self, notifier: &dyn Notifier, group_title: &str, current: usize, total: usize) {
        let text = render_progress(group_title, current, total, self.started.elapsed());

        if self.last_text.as_deref() == Some(text.as_str()) {
            return;
        }

        match self.message_id {
            Some(message_id) => notifier.edit_message(self.chat_id, message_id, &text).await,
            None => self.message_id = notifier.send_message(self.chat_id, &text).await,
        }

        self.last_text = Some(text);
    }
}

/// Linear projection `elapsed × total / current − elapsed`; zero before the
/// first link completes.
pub fn estimate_remaining(elapsed: Duration, current: usize, total: usize) -> Duration {
    if current == 0 || total <= current {
        return Duration::ZERO;
    }

    let projected = elapsed.as_secs_f64() * total as f64 / current as f64;
    Duration::from_secs_f64((projected - elapsed.as_secs_f64()).max(0.0))
}

pub fn percent_done(current: usize, total: usize) -> usize {
    if total == 0 {
        return 100;
    }
    (current.min(total) * 100) / total
}

pub fn render_bar(current: usize, total: usize) -> String {
    let filled = if total == 0 {
        BAR_WIDTH
    } else {
        current.min(total) * BAR_WIDTH / total
    };

    format!("[{}{}]", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn render_progress(group_title: &str, current: usize, total: usize, elapsed: Duration) -> String {
    let remaining = estimate_remaining(elapsed, current, total);

    format!(
        "{} Scanning «{}»\n{} {}%\nLinks: {}/{}\nElapsed: {}\nRemaining: ~{}",
        EMOJI_HOURGLASS,
        group_title,
        render_bar(current, total),
        percent_done(current, total),
        current,
        total,
        format_duration(elapsed),
        format_duration(remaining),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        edited: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send_message(&self, _chat_id: i64, text: &str) -> Option<MessageId> {
            self.sent.lock().unwrap().push(text.to_string());
            Some(MessageId(99))
        }

        async fn edit_message(&self, _chat_id: i64, message_id: MessageId, text: &str) {
            self.edited.lock().unwrap().push((message_id.0, text.to_string()));
        }

        async fn send_document(&self, _chat_id: i64, _file_name: &str, _bytes: Vec<u8>, _caption: &str) {}
    }

    #[test]
    fn single_link_scan_is_complete() {
        let text = render_progress("Tools", 1, 1, Duration::from_secs(5));
        assert!(text.contains("100%"));
        assert!(text.contains("Remaining: ~00:00:00"));
        assert_eq!(estimate_remaining(Duration::from_secs(5), 1, 1), Duration::ZERO);
    }

    #[test]
    fn remaining_is_linear_projection() {
        let remaining = estimate_remaining(Duration::from_secs(30), 1, 4);
        assert_eq!(remaining, Duration::from_secs(90));
        assert_eq!(estimate_remaining(Duration::from_secs(30), 0, 4), Duration::ZERO);
    }

    #[test]
    fn bar_has_fixed_width() {
        assert_eq!(render_bar(0, 4), format!("[{}]", "░".repeat(20)));
        assert_eq!(render_bar(2, 4), format!("[{}{}]", "█".repeat(10), "░".repeat(10)));
        assert_eq!(render_bar(4, 4), format!("[{}]", "█".repeat(20)));
        assert_eq!(percent_done(1, 3), 33);
    }

    #[tokio::test]
    async fn sends_once_then_edits_only_on_change() {
        let recorder = Recorder::default();
        let mut progress = ProgressContext::new(7);

        progress.report(&recorder, "Tools", 1, 2).await;
        progress.report(&recorder, "Tools", 1, 2).await;
        progress.report(&recorder, "Tools", 2, 2).await;

        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
        let edited = recorder.edited.lock().unwrap();
        assert_eq!(edited.len(), 1);
        assert_eq!(edited[0].0, 99);
        assert!(edited[0].1.contains("Links: 2/2"));
        assert_eq!(progress.message_id(), Some(MessageId(99)));
    }
}
