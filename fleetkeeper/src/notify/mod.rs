//! Notification sink
//!
//! Monitors and operator commands report through a [`Notifier`]. Delivery is
//! fire-and-forget: a sink that cannot deliver logs and drops the notice.

use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Notice status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i64)]
pub enum Code {
    Success = 1000,
    ErrorRestore = 1001,
    MonitorAddrError = 1002,
    MonitorSentinelError = 1003,
    MonitorClusterError = 1004,
    ClusterOperationError = 1005,
}

impl Code {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    /// Default title for notices with this code
    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ErrorRestore => "fault recovered",
            Self::MonitorAddrError => "redis instance unhealthy",
            Self::MonitorSentinelError => "redis sentinel unhealthy",
            Self::MonitorClusterError => "redis cluster unhealthy",
            Self::ClusterOperationError => "redis cluster operation failed",
        }
    }

    pub fn is_error(self) -> bool {
        !matches!(self, Self::Success | Self::ErrorRestore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeBody {
    Content(String),
    Error(String),
}

/// One notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub code: Code,
    pub title: String,
    pub time: String,
    pub body: NoticeBody,
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl Notice {
    pub fn content(code: Code, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            code,
            title: title.into(),
            time: now(),
            body: NoticeBody::Content(content.into()),
        }
    }

    /// Error notice titled with the code's default message
    pub fn error(code: Code, err: impl fmt::Display) -> Self {
        Self {
            code,
            title: code.message().to_string(),
            time: now(),
            body: NoticeBody::Error(err.to_string()),
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self::content(Code::Success, Code::Success.message(), content)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, NoticeBody::Error(_))
    }

    pub fn text(&self) -> &str {
        match &self.body {
            NoticeBody::Content(s) | NoticeBody::Error(s) => s,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== notice =====")?;
        writeln!(f, "time: {}", self.time)?;
        writeln!(f, "title: {}", self.title)?;
        match &self.body {
            NoticeBody::Error(e) => write!(f, "error: {}", e),
            NoticeBody::Content(c) => write!(f, "content: {}", c),
        }
    }
}

/// Where notices go
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Prints framed notices to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: &Notice) {
        println!("{}", notice);
    }
}

/// Emits notices as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        if notice.is_error() {
            error!(
                code = notice.code.as_i64(),
                title = %notice.title,
                "{}",
                notice.text()
            );
        } else {
            info!(
                code = notice.code.as_i64(),
                title = %notice.title,
                "{}",
                notice.text()
            );
        }
    }
}

/// Forwards notices into a bounded queue
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notice>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: &Notice) {
        if let Err(e) = self.tx.try_send(notice.clone()) {
            warn!("Dropping notice {:?}: {}", notice.title, e);
        }
    }
}
