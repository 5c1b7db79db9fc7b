//! Kiosk lockdown: hides the shell, filters keys, keeps focus and polls for
//! lost invariants until exit.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::keyboard::LockFlags;
use super::posture::PostureChecker;
use super::report::Finding;
use super::shell::{AccessibilityFlags, DesktopShell, HookEvent, HookGuard, WindowChrome};
use super::violation::{Violation, ViolationKind, ViolationSender};

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(500);
/// Floor for the monitoring period; `tokio::time::interval` rejects zero.
pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_millis(10);

struct ActiveLockdown {
    saved_chrome: Option<WindowChrome>,
    saved_accessibility: Option<AccessibilityFlags>,
    hooks: Option<HookGuard>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct LockdownEnforcer {
    shell: Arc<dyn DesktopShell>,
    posture: PostureChecker,
    flags: Arc<LockFlags>,
    interval: Duration,
    violations: ViolationSender,
    active: Mutex<Option<ActiveLockdown>>,
}

/// Resumes enforcement when dropped.
pub struct SuspendGuard {
    flags: Arc<LockFlags>,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.flags.pop_suspend();
    }
}

fn step<T>(what: &str, result: anyhow::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(step = what, error = %e, "lockdown step failed");
            None
        }
    }
}

impl LockdownEnforcer {
    pub fn new(
        shell: Arc<dyn DesktopShell>,
        posture: PostureChecker,
        interval: Duration,
        violations: ViolationSender,
    ) -> Self {
        Self {
            shell,
            posture,
            flags: Arc::new(LockFlags::default()),
            interval: interval.max(MIN_MONITOR_INTERVAL),
            violations,
            active: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.flags.is_active()
    }

    pub fn is_suspended(&self) -> bool {
        self.flags.is_suspended()
    }

    /// Enters lockdown. Calling it again while active does nothing. Must be
    /// called from within a tokio runtime.
    pub fn enter(&self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            debug!("lockdown already active");
            return;
        }
        let shell = self.shell.as_ref();

        let saved_chrome = step("snapshot window chrome", shell.window_chrome());
        step("apply locked chrome", shell.apply_chrome(&WindowChrome::locked()));
        step("exclude from capture", shell.set_capture_exclusion(true));
        step("hide shell", shell.set_shell_visible(false));

        self.flags.set_active(true);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let hooks = step("install hooks", shell.install_hooks(self.flags.clone(), events_tx));
        step("clear clipboard", shell.clear_clipboard());

        let saved_accessibility = step("snapshot accessibility", shell.accessibility_flags());
        if let Some(flags) = saved_accessibility {
            step(
                "disable accessibility shortcuts",
                shell.set_accessibility_flags(&flags.without_hotkeys()),
            );
        }

        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(monitor_loop(
                self.shell.clone(),
                self.posture.clone(),
                self.flags.clone(),
                self.interval,
                self.violations.clone(),
                cancel.clone(),
            )),
            tokio::spawn(hook_event_loop(
                self.shell.clone(),
                self.flags.clone(),
                self.violations.clone(),
                events_rx,
                cancel.clone(),
            )),
        ];

        step("focus host", shell.focus_host());

        *active = Some(ActiveLockdown {
            saved_chrome,
            saved_accessibility,
            hooks,
            cancel,
            tasks,
        });
        info!("lockdown entered");
    }

    /// Leaves lockdown, restoring what `enter` changed. Does nothing when
    /// not active.
    pub async fn exit(&self) {
        let taken = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut active) = taken else {
            return;
        };

        active.cancel.cancel();
        self.flags.set_active(false);
        for task in active.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "lockdown task ended abnormally");
            }
        }
        self.restore(active);
        info!("lockdown exited");
    }

    pub fn suspend(&self) -> SuspendGuard {
        self.flags.push_suspend();
        SuspendGuard {
            flags: self.flags.clone(),
        }
    }

    fn restore(&self, active: ActiveLockdown) {
        let shell = self.shell.as_ref();
        if let Some(flags) = active.saved_accessibility {
            step("restore accessibility", shell.set_accessibility_flags(&flags));
        }
        drop(active.hooks);
        step("show shell", shell.set_shell_visible(true));
        step("allow capture", shell.set_capture_exclusion(false));
        step(
            "restore window chrome",
            shell.apply_chrome(&active.saved_chrome.unwrap_or_default()),
        );
    }
}

impl Drop for LockdownEnforcer {
    fn drop(&mut self) {
        let taken = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = taken {
            active.cancel.cancel();
            self.flags.set_active(false);
            self.restore(active);
        }
    }
}

/// One monitoring pass. `None` when enforcement is off.
fn run_tick(shell: &dyn DesktopShell, posture: &PostureChecker, flags: &LockFlags) -> Option<Vec<Finding>> {
    if !flags.is_enforcing() {
        return None;
    }

    if let Some(false) = step("check maximized", shell.is_maximized()) {
        step("re-maximize", shell.apply_chrome(&WindowChrome::locked()));
    }
    step("hide shell", shell.set_shell_visible(false));
    if step("check foreground", shell.foreground_is_foreign()).unwrap_or(false) {
        step("reclaim focus", shell.focus_host());
    }

    let findings = posture.check().critical_findings();
    step("clear clipboard", shell.clear_clipboard());
    Some(findings)
}

fn raise(violations: &ViolationSender, violation: Violation) {
    if violations.send(violation).is_err() {
        debug!("no violation subscriber");
    }
}

fn raise_new_findings(seen: &mut HashSet<Finding>, current: Vec<Finding>, violations: &ViolationSender) {
    let current: HashSet<Finding> = current.into_iter().collect();
    for finding in current.difference(seen) {
        raise(violations, Violation::new(finding.kind, finding.detail.clone()));
    }
    *seen = current;
}

async fn monitor_loop(
    shell: Arc<dyn DesktopShell>,
    posture: PostureChecker,
    flags: Arc<LockFlags>,
    interval: Duration,
    violations: ViolationSender,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seen = HashSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if !flags.is_enforcing() {
            continue;
        }

        let (shell, posture, tick_flags) = (shell.clone(), posture.clone(), flags.clone());
        match tokio::task::spawn_blocking(move || run_tick(shell.as_ref(), &posture, &tick_flags)).await {
            Ok(Some(findings)) if !cancel.is_cancelled() => {
                raise_new_findings(&mut seen, findings, &violations)
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "monitoring tick failed"),
        }
    }
    debug!("monitoring stopped");
}

fn handle_hook_event(
    shell: &dyn DesktopShell,
    flags: &LockFlags,
    violations: &ViolationSender,
    event: HookEvent,
) {
    match event {
        HookEvent::ClipboardClearRequested => {
            step("clear clipboard", shell.clear_clipboard());
        }
        HookEvent::ForegroundChanged { foreign: false, .. } => {}
        HookEvent::ForegroundChanged {
            foreign: true,
            title,
        } => {
            if !flags.is_enforcing() {
                return;
            }
            step("reclaim focus", shell.focus_host());
            step("hide shell", shell.set_shell_visible(false));
            raise(
                violations,
                Violation::new(
                    ViolationKind::FocusLost,
                    title.unwrap_or_else(|| "another application".to_string()),
                ),
            );
        }
    }
}

async fn hook_event_loop(
    shell: Arc<dyn DesktopShell>,
    flags: Arc<LockFlags>,
    violations: ViolationSender,
    mut events: mpsc::UnboundedReceiver<HookEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        handle_hook_event(shell.as_ref(), &flags, &violations, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockdown::platform::recording::RecordingShell;
    use crate::lockdown::probe::{DebuggerSignals, HardwareInventory, NetworkAdapter, SystemProbe};
    use crate::lockdown::shell::{WindowState, HOTKEY_ACTIVE};
    use crate::lockdown::violation::ViolationMonitor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct DeskProbe {
        extra_monitors: AtomicUsize,
    }

    impl SystemProbe for DeskProbe {
        fn is_elevated(&self) -> anyhow::Result<bool> {
            Ok(true)
        }
        fn monitor_count(&self) -> anyhow::Result<usize> {
            Ok(1 + self.extra_monitors.load(Ordering::SeqCst))
        }
        fn is_remote_session(&self) -> anyhow::Result<bool> {
            Ok(false)
        }
        fn hardware_inventory(&self) -> anyhow::Result<HardwareInventory> {
            Ok(HardwareInventory::default())
        }
        fn registry_key_exists(&self, _path: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
        fn network_adapters(&self) -> anyhow::Result<Vec<NetworkAdapter>> {
            Ok(Vec::new())
        }
        fn debugger_signals(&self) -> anyhow::Result<DebuggerSignals> {
            Ok(DebuggerSignals::default())
        }
        fn running_processes(&self) -> anyhow::Result<Vec<String>> {
            Ok(vec!["explorer.exe".to_string()])
        }
        fn game_capture_enabled(&self) -> anyhow::Result<bool> {
            Ok(false)
        }
        fn visible_window_titles(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn proxy_configured(&self) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    struct Rig {
        shell: Arc<RecordingShell>,
        probe: Arc<DeskProbe>,
        enforcer: LockdownEnforcer,
        monitor: ViolationMonitor,
    }

    fn rig() -> Rig {
        let shell = Arc::new(RecordingShell::with_accessibility(AccessibilityFlags {
            sticky_keys: 0x7E,
            toggle_keys: 0x1E,
            filter_keys: 0x7E,
        }));
        let probe = Arc::new(DeskProbe::default());
        let (tx, monitor) = ViolationMonitor::channel();
        let enforcer = LockdownEnforcer::new(
            shell.clone(),
            PostureChecker::new(probe.clone()),
            Duration::from_millis(10),
            tx,
        );
        Rig {
            shell,
            probe,
            enforcer,
            monitor,
        }
    }

    async fn next_violation(monitor: &mut ViolationMonitor) -> Option<Violation> {
        tokio::time::timeout(Duration::from_millis(500), monitor.next())
            .await
            .ok()
            .flatten()
            .map(|(v, _)| v)
    }

    #[tokio::test]
    async fn enter_locks_and_exit_restores_exactly() {
        let rig = rig();
        let before = rig.shell.snapshot();

        rig.enforcer.enter();
        let locked = rig.shell.snapshot();
        assert!(rig.enforcer.is_active());
        assert_eq!(locked.chrome, WindowChrome::locked());
        assert!(!locked.shell_visible);
        assert!(locked.capture_excluded);
        assert!(locked.hooks_installed);
        assert!(locked.clipboard_clears >= 1);
        assert!(locked.focus_requests >= 1);
        assert_eq!(locked.accessibility.sticky_keys & HOTKEY_ACTIVE, 0);

        rig.enforcer.exit().await;
        let after = rig.shell.snapshot();
        assert!(!rig.enforcer.is_active());
        assert_eq!(after.chrome, before.chrome);
        assert_eq!(after.accessibility, before.accessibility);
        assert!(after.shell_visible);
        assert!(!after.capture_excluded);
        assert!(!after.hooks_installed);
    }

    #[tokio::test]
    async fn enter_and_exit_are_idempotent() {
        let rig = rig();
        let before = rig.shell.snapshot();

        rig.enforcer.exit().await;
        rig.enforcer.enter();
        rig.enforcer.enter();
        rig.enforcer.exit().await;
        rig.enforcer.exit().await;

        assert_eq!(rig.shell.snapshot().chrome, before.chrome);
        assert!(rig.shell.snapshot().shell_visible);
    }

    #[tokio::test]
    async fn foreign_focus_is_reclaimed_and_reported() {
        let mut rig = rig();
        rig.enforcer.enter();
        let focus_before = rig.shell.snapshot().focus_requests;

        assert!(rig.shell.emit(HookEvent::ForegroundChanged {
            foreign: true,
            title: Some("Notepad".to_string()),
        }));
        let violation = next_violation(&mut rig.monitor).await.unwrap();
        assert_eq!(violation.kind, ViolationKind::FocusLost);
        assert_eq!(violation.detail, "Notepad");
        assert!(rig.shell.snapshot().focus_requests > focus_before);

        // own windows are ignored
        rig.shell.emit(HookEvent::ForegroundChanged {
            foreign: false,
            title: None,
        });
        assert!(next_violation(&mut rig.monitor).await.is_none());

        rig.enforcer.exit().await;
    }

    #[tokio::test]
    async fn suspended_enforcer_ignores_focus_changes() {
        let mut rig = rig();
        rig.enforcer.enter();

        {
            let _guard = rig.enforcer.suspend();
            assert!(rig.enforcer.is_suspended());
            rig.shell.emit(HookEvent::ForegroundChanged {
                foreign: true,
                title: Some("Exit dialog".to_string()),
            });
            assert!(next_violation(&mut rig.monitor).await.is_none());
        }
        assert!(!rig.enforcer.is_suspended());

        rig.enforcer.exit().await;
    }

    #[tokio::test]
    async fn monitoring_raises_new_findings_once() {
        let mut rig = rig();
        rig.enforcer.enter();

        rig.probe.extra_monitors.store(1, Ordering::SeqCst);
        let violation = next_violation(&mut rig.monitor).await.unwrap();
        assert_eq!(violation.kind, ViolationKind::MonitorAdded);
        assert_eq!(violation.detail, "2 displays");

        // still true on later ticks, but not raised again
        assert!(next_violation(&mut rig.monitor).await.is_none());

        rig.enforcer.exit().await;
    }

    #[tokio::test]
    async fn monitoring_re_maximizes_the_window() {
        let rig = rig();
        rig.enforcer.enter();

        rig.shell.set_window_state(WindowState::Normal);
        rig.shell.set_foreground_foreign(true);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = rig.shell.snapshot();
        assert_eq!(snapshot.chrome.state, WindowState::Maximized);
        assert!(!snapshot.foreground_foreign);

        rig.enforcer.exit().await;
    }

    #[tokio::test]
    async fn zero_interval_still_self_heals() {
        let shell = Arc::new(RecordingShell::default());
        let (tx, _monitor) = ViolationMonitor::channel();
        let enforcer = LockdownEnforcer::new(
            shell.clone(),
            PostureChecker::new(Arc::new(DeskProbe::default())),
            Duration::ZERO,
            tx,
        );
        enforcer.enter();

        shell.set_window_state(WindowState::Normal);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(shell.snapshot().chrome.state, WindowState::Maximized);

        enforcer.exit().await;
    }

    #[tokio::test]
    async fn print_screen_clears_clipboard_through_the_event_loop() {
        let rig = rig();
        rig.enforcer.enter();
        // stop the monitoring tick from clearing as well
        let _guard = rig.enforcer.suspend();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let before = rig.shell.snapshot().clipboard_clears;

        rig.shell.emit(HookEvent::ClipboardClearRequested);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rig.shell.snapshot().clipboard_clears, before + 1);

        drop(_guard);
        rig.enforcer.exit().await;
    }
}
