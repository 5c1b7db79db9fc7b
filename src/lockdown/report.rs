use chrono::{DateTime, Utc};
use serde::Serialize;

use super::violation::ViolationKind;

/// Point-in-time result of a posture check. Inconclusive checks keep their
/// passing value and are named in `inconclusive`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityReport {
    pub is_admin: bool,
    pub monitor_count: usize,
    pub remote_session: bool,
    /// Hypervisor label when a virtual machine was detected.
    pub virtual_machine: Option<String>,
    pub debugger_attached: bool,
    pub critical_processes: Vec<String>,
    pub soft_processes: Vec<String>,
    pub screen_recording: bool,
    pub suspicious_windows: Vec<String>,
    pub vpn_active: bool,
    pub proxy_configured: bool,
    pub inconclusive: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// A blocking condition the monitoring loop raises when it becomes true.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Finding {
    pub kind: ViolationKind,
    pub detail: String,
}

impl SecurityReport {
    /// A report with every check passing.
    pub fn clean(checked_at: DateTime<Utc>) -> Self {
        Self {
            is_admin: true,
            monitor_count: 1,
            remote_session: false,
            virtual_machine: None,
            debugger_attached: false,
            critical_processes: Vec::new(),
            soft_processes: Vec::new(),
            screen_recording: false,
            suspicious_windows: Vec::new(),
            vpn_active: false,
            proxy_configured: false,
            inconclusive: Vec::new(),
            checked_at,
        }
    }

    pub fn is_virtual_machine(&self) -> bool {
        self.virtual_machine.is_some()
    }

    pub fn can_launch(&self) -> bool {
        self.is_admin
            && self.monitor_count == 1
            && !self.remote_session
            && !self.is_virtual_machine()
            && !self.debugger_attached
            && self.critical_processes.is_empty()
            && !self.screen_recording
            && self.suspicious_windows.is_empty()
    }

    pub fn blocking_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if !self.is_admin {
            reasons.push("The exam client must run as administrator.".to_string());
        }
        if self.monitor_count != 1 {
            reasons.push(format!(
                "{} displays detected. Exactly one display is allowed.",
                self.monitor_count
            ));
        }
        if self.remote_session {
            reasons.push("Remote desktop session detected. Run the exam locally.".to_string());
        }
        if let Some(label) = &self.virtual_machine {
            reasons.push(format!(
                "Virtual machine detected ({}). Run the exam on physical hardware.",
                label
            ));
        }
        if self.debugger_attached {
            reasons.push("A debugger is attached to the exam client.".to_string());
        }
        if !self.critical_processes.is_empty() {
            reasons.push(format!(
                "Close these applications: {}.",
                self.critical_processes.join(", ")
            ));
        }
        if self.screen_recording {
            reasons.push("Screen recording is active.".to_string());
        }
        if !self.suspicious_windows.is_empty() {
            reasons.push(format!(
                "Close these windows: {}.",
                self.suspicious_windows.join(", ")
            ));
        }
        reasons
    }

    /// Advisory lines that never block a launch.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.vpn_active {
            warnings.push("A VPN connection appears to be active.".to_string());
        }
        if self.proxy_configured {
            warnings.push("A network proxy is configured.".to_string());
        }
        if !self.soft_processes.is_empty() {
            warnings.push(format!(
                "Communication apps are running: {}.",
                self.soft_processes.join(", ")
            ));
        }
        for check in &self.inconclusive {
            warnings.push(format!("Could not complete the {} check.", check));
        }
        warnings
    }

    pub fn critical_findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        if self.debugger_attached {
            findings.push(Finding {
                kind: ViolationKind::Debugger,
                detail: "debugger attached".to_string(),
            });
        }
        if self.remote_session {
            findings.push(Finding {
                kind: ViolationKind::RemoteSession,
                detail: "remote desktop session".to_string(),
            });
        }
        if self.monitor_count > 1 {
            findings.push(Finding {
                kind: ViolationKind::MonitorAdded,
                detail: format!("{} displays", self.monitor_count),
            });
        }
        if let Some(label) = &self.virtual_machine {
            findings.push(Finding {
                kind: ViolationKind::VirtualMachine,
                detail: label.clone(),
            });
        }
        if self.screen_recording {
            findings.push(Finding {
                kind: ViolationKind::ScreenRecording,
                detail: "screen recording".to_string(),
            });
        }
        findings.extend(self.critical_processes.iter().map(|name| Finding {
            kind: ViolationKind::BlacklistedProcess,
            detail: name.clone(),
        }));
        findings.extend(self.suspicious_windows.iter().map(|title| Finding {
            kind: ViolationKind::SuspiciousWindow,
            detail: title.clone(),
        }));
        findings
    }
}
