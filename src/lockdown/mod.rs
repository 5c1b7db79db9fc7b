//! Desktop side of the exam lockdown: posture checks before launch and the
//! enforcer that keeps the machine locked while the exam runs.

pub mod blacklist;
pub mod enforcer;
pub mod exit_gate;
pub mod keyboard;
pub mod platform;
pub mod posture;
pub mod probe;
pub mod report;
pub mod shell;
pub mod violation;

pub use enforcer::{LockdownEnforcer, SuspendGuard};
pub use exit_gate::{ExitDecision, ExitGate};
pub use posture::PostureChecker;
pub use report::SecurityReport;
pub use violation::{Violation, ViolationKind, ViolationMonitor};
