//! In-memory shell for tests: records what lockdown would have applied and
//! lets tests feed hook events as the OS would.

use std::sync::{Arc, Mutex, PoisonError};

use crate::lockdown::keyboard::LockFlags;
use crate::lockdown::shell::{
    AccessibilityFlags, DesktopShell, HookEvent, HookGuard, HookSender, WindowChrome,
    WindowState,
};

#[derive(Debug, Clone)]
pub struct ShellState {
    pub chrome: WindowChrome,
    pub shell_visible: bool,
    pub capture_excluded: bool,
    pub hooks_installed: bool,
    pub accessibility: AccessibilityFlags,
    pub clipboard_clears: usize,
    pub focus_requests: usize,
    pub foreground_foreign: bool,
}

impl Default for ShellState {
    fn default() -> Self {
        Self {
            chrome: WindowChrome::default(),
            shell_visible: true,
            capture_excluded: false,
            hooks_installed: false,
            accessibility: AccessibilityFlags::default(),
            clipboard_clears: 0,
            focus_requests: 0,
            foreground_foreign: false,
        }
    }
}

#[derive(Default)]
pub struct RecordingShell {
    state: Arc<Mutex<ShellState>>,
    hook_events: Arc<Mutex<Option<HookSender>>>,
}

impl RecordingShell {
    pub fn with_accessibility(flags: AccessibilityFlags) -> Self {
        let shell = Self::default();
        shell.with_state(|s| s.accessibility = flags);
        shell
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ShellState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    pub fn snapshot(&self) -> ShellState {
        self.with_state(|s| s.clone())
    }

    /// Feeds an event through the installed hooks, as an OS callback would.
    pub fn emit(&self, event: HookEvent) -> bool {
        let sender = self
            .hook_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        sender.map(|tx| tx.send(event).is_ok()).unwrap_or(false)
    }

    pub fn set_foreground_foreign(&self, foreign: bool) {
        self.with_state(|s| s.foreground_foreign = foreign);
    }

    pub fn set_window_state(&self, state: WindowState) {
        self.with_state(|s| s.chrome.state = state);
    }
}

impl DesktopShell for RecordingShell {
    fn window_chrome(&self) -> anyhow::Result<WindowChrome> {
        Ok(self.with_state(|s| s.chrome))
    }

    fn apply_chrome(&self, chrome: &WindowChrome) -> anyhow::Result<()> {
        self.with_state(|s| s.chrome = *chrome);
        Ok(())
    }

    fn is_maximized(&self) -> anyhow::Result<bool> {
        Ok(self.with_state(|s| s.chrome.state == WindowState::Maximized))
    }

    fn set_capture_exclusion(&self, exclude: bool) -> anyhow::Result<()> {
        self.with_state(|s| s.capture_excluded = exclude);
        Ok(())
    }

    fn set_shell_visible(&self, visible: bool) -> anyhow::Result<()> {
        self.with_state(|s| s.shell_visible = visible);
        Ok(())
    }

    fn install_hooks(&self, _flags: Arc<LockFlags>, events: HookSender) -> anyhow::Result<HookGuard> {
        *self
            .hook_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(events);
        self.with_state(|s| s.hooks_installed = true);

        let state = self.state.clone();
        let hook_events = self.hook_events.clone();
        Ok(HookGuard::new(move || {
            hook_events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .hooks_installed = false;
        }))
    }

    fn clear_clipboard(&self) -> anyhow::Result<()> {
        self.with_state(|s| s.clipboard_clears += 1);
        Ok(())
    }

    fn accessibility_flags(&self) -> anyhow::Result<AccessibilityFlags> {
        Ok(self.with_state(|s| s.accessibility))
    }

    fn set_accessibility_flags(&self, flags: &AccessibilityFlags) -> anyhow::Result<()> {
        self.with_state(|s| s.accessibility = *flags);
        Ok(())
    }

    fn focus_host(&self) -> anyhow::Result<()> {
        self.with_state(|s| {
            s.focus_requests += 1;
            s.foreground_foreign = false;
        });
        Ok(())
    }

    fn foreground_is_foreign(&self) -> anyhow::Result<bool> {
        Ok(self.with_state(|s| s.foreground_foreign))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_guard_detaches_emitter() {
        let shell = RecordingShell::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let guard = shell
            .install_hooks(Arc::new(LockFlags::default()), tx)
            .unwrap();
        assert!(shell.emit(HookEvent::ClipboardClearRequested));
        assert_eq!(rx.try_recv().unwrap(), HookEvent::ClipboardClearRequested);

        drop(guard);
        assert!(!shell.snapshot().hooks_installed);
        assert!(!shell.emit(HookEvent::ClipboardClearRequested));
    }
}
