//! UI-side collaborators: redirect and user notifications.

use tracing::{info, warn};

/// Navigates the user away once onboarding is confirmed complete.
pub trait Redirect: Send + Sync {
    /// Navigate to `path`. `replace` drops the wizard from history.
    fn navigate(&self, path: &str, replace: bool);
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Best-effort toast sink. Not required for correctness.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Headless redirect that only logs the target.
#[derive(Debug, Default)]
pub struct LogRedirect;

impl Redirect for LogRedirect {
    fn navigate(&self, path: &str, replace: bool) {
        info!(path, replace, "Redirecting after onboarding");
    }
}

/// Headless notifier that writes notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Success => info!(message, "Onboarding notice"),
            NoticeLevel::Error => warn!(message, "Onboarding notice"),
        }
    }
}
