use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub created: Instant,
    pub duration: Duration,
}

impl Notice {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created) >= self.duration
    }
}

pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(3);

/// The single transient-notification channel. Every user-initiated action
/// reports success or failure here; background polls never do.
#[derive(Default)]
pub struct NoticeCenter {
    notices: Vec<Notice>,
}

impl NoticeCenter {
    pub fn push(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.push_with_duration(kind, message, DEFAULT_NOTICE_DURATION);
    }

    pub fn push_with_duration(
        &mut self,
        kind: NoticeKind,
        message: impl Into<String>,
        duration: Duration,
    ) {
        self.notices.push(Notice {
            kind,
            message: message.into(),
            created: Instant::now(),
            duration,
        });
    }

    pub fn retain_unexpired(&mut self, now: Instant) {
        self.notices.retain(|notice| !notice.is_expired(now));
    }

    pub fn active(&self) -> &[Notice] {
        &self.notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_expire_after_their_duration() {
        let mut center = NoticeCenter::default();
        center.push_with_duration(NoticeKind::Info, "short", Duration::from_millis(0));
        center.push_with_duration(NoticeKind::Success, "long", Duration::from_secs(60));
        assert_eq!(center.active().len(), 2);

        center.retain_unexpired(Instant::now());
        assert_eq!(center.active().len(), 1);
        assert_eq!(center.active()[0].message, "long");
    }
}
