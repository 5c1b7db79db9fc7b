use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    FocusLost,
    BlacklistedProcess,
    Debugger,
    RemoteSession,
    MonitorAdded,
    ScreenRecording,
    SuspiciousWindow,
    VirtualMachine,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::FocusLost => "focus_lost",
            ViolationKind::BlacklistedProcess => "blacklisted_process",
            ViolationKind::Debugger => "debugger",
            ViolationKind::RemoteSession => "remote_session",
            ViolationKind::MonitorAdded => "monitor_added",
            ViolationKind::ScreenRecording => "screen_recording",
            ViolationKind::SuspiciousWindow => "suspicious_window",
            ViolationKind::VirtualMachine => "virtual_machine",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl Violation {
    pub fn new(kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}

pub type ViolationSender = mpsc::UnboundedSender<Violation>;

/// Single subscriber for violations raised by the enforcer. Counts them and
/// shows a banner line; nothing here ends the exam.
pub struct ViolationMonitor {
    rx: mpsc::UnboundedReceiver<Violation>,
    count: usize,
}

impl ViolationMonitor {
    pub fn channel() -> (ViolationSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, count: 0 })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Waits for the next violation. `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<(Violation, usize)> {
        let violation = self.rx.recv().await?;
        self.count += 1;
        warn!(
            kind = violation.kind.as_str(),
            detail = %violation.detail,
            count = self.count,
            "lockdown violation"
        );
        Some((violation, self.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn monitor_counts_until_senders_drop() {
        let (tx, mut monitor) = ViolationMonitor::channel();
        tx.send(Violation::new(ViolationKind::FocusLost, "notepad"))
            .unwrap();
        tx.send(Violation::new(ViolationKind::Debugger, "x64dbg"))
            .unwrap();
        drop(tx);

        let (first, n) = monitor.next().await.unwrap();
        assert_eq!(first.kind, ViolationKind::FocusLost);
        assert_eq!(n, 1);
        let (_, n) = monitor.next().await.unwrap();
        assert_eq!(n, 2);
        assert!(monitor.next().await.is_none());
        assert_eq!(monitor.count(), 2);
    }
}
