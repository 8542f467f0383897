//! User-facing notifications for failed operations.
//!
//! The pipeline only decides *what* to tell the user; how a [`Notice`] is
//! shown belongs to whoever implements [`Notifier`].

use log::{Level, log};
use std::time::Duration;

use crate::error::{AppError, Severity};

/// How long a notice stays visible unless it asks for longer.
pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(4);

/// Critical notices stay up longer so the support link can be used.
pub const CRITICAL_NOTICE_DURATION: Duration = Duration::from_secs(10);

pub const SUPPORT_CONTACT_PATH: &str = "/contact";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeAction {
    /// Re-run the operation that failed.
    Retry,
    /// Open the support contact page.
    ContactSupport,
}

impl NoticeAction {
    pub fn label(self) -> &'static str {
        match self {
            NoticeAction::Retry => "Retry",
            NoticeAction::ContactSupport => "Contact Support",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
    pub action: Option<NoticeAction>,
    pub duration: Duration,
}

impl Notice {
    /// Builds the notice for `error`. `retry_available` says whether the
    /// caller can actually re-run the failed operation.
    pub fn for_error(error: &AppError, retry_available: bool) -> Self {
        let (action, duration) = match error.severity {
            Severity::Info => (None, DEFAULT_NOTICE_DURATION),
            Severity::Warning | Severity::Error => {
                let action = (error.retryable && retry_available).then_some(NoticeAction::Retry);
                (action, DEFAULT_NOTICE_DURATION)
            }
            Severity::Critical => (Some(NoticeAction::ContactSupport), CRITICAL_NOTICE_DURATION),
        };

        Self {
            message: error.message.clone(),
            severity: error.severity,
            action,
            duration,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log, one level per severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    /// The level and line a notice is logged with.
    pub fn render(notice: &Notice) -> (Level, String) {
        let hint = match notice.action {
            Some(NoticeAction::Retry) => format!(" [{}]", NoticeAction::Retry.label()),
            Some(NoticeAction::ContactSupport) => format!(
                " [{}: {}]",
                NoticeAction::ContactSupport.label(),
                SUPPORT_CONTACT_PATH
            ),
            None => String::new(),
        };

        let level = match notice.severity {
            Severity::Info => Level::Info,
            Severity::Warning => Level::Warn,
            Severity::Error | Severity::Critical => Level::Error,
        };
        (level, format!("{}{}", notice.message, hint))
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        let (level, line) = Self::render(&notice);
        log!(level, "{}", line);
    }
}
