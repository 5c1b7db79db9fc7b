//! Window and shell operations the enforcer needs from the desktop.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::keyboard::LockFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Normal,
    Maximized,
    Minimized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStyle {
    Bordered,
    Borderless,
}

/// The parts of the host window lockdown changes and later restores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChrome {
    pub state: WindowState,
    pub style: WindowStyle,
    pub resizable: bool,
    pub topmost: bool,
    pub show_in_taskbar: bool,
}

impl WindowChrome {
    pub fn locked() -> Self {
        Self {
            state: WindowState::Maximized,
            style: WindowStyle::Borderless,
            resizable: false,
            topmost: true,
            show_in_taskbar: false,
        }
    }
}

impl Default for WindowChrome {
    fn default() -> Self {
        Self {
            state: WindowState::Normal,
            style: WindowStyle::Bordered,
            resizable: true,
            topmost: false,
            show_in_taskbar: true,
        }
    }
}

/// Bit that lets a feature be toggled from its keyboard shortcut.
pub const HOTKEY_ACTIVE: u32 = 0x0000_0004;

/// Raw flag words of the sticky/toggle/filter keys accessibility features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessibilityFlags {
    pub sticky_keys: u32,
    pub toggle_keys: u32,
    pub filter_keys: u32,
}

impl AccessibilityFlags {
    pub fn without_hotkeys(self) -> Self {
        Self {
            sticky_keys: self.sticky_keys & !HOTKEY_ACTIVE,
            toggle_keys: self.toggle_keys & !HOTKEY_ACTIVE,
            filter_keys: self.filter_keys & !HOTKEY_ACTIVE,
        }
    }
}

/// What hook callbacks forward to the enforcer. Callbacks never touch
/// windows themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    ClipboardClearRequested,
    ForegroundChanged { foreign: bool, title: Option<String> },
}

pub type HookSender = mpsc::UnboundedSender<HookEvent>;

/// Uninstalls whatever hooks it was created for when dropped.
pub struct HookGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl HookGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for HookGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookGuard")
            .field("installed", &self.release.is_some())
            .finish()
    }
}

/// Desktop shell windows lockdown hides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellSurface {
    /// Taskbars and the start button; shown again on exit.
    Taskbar,
    /// Flyouts such as search, task view and the tray overflow. Hidden while
    /// locked and left closed on exit.
    Flyout,
}

const TASKBAR_CLASSES: &[&str] = &["Shell_TrayWnd", "Shell_SecondaryTrayWnd"];
const FLYOUT_CLASSES: &[&str] = &[
    "NotifyIconOverflowWindow",
    "TopLevelWindowForOverflowXamlIsland",
    "MultitaskingViewFrame",
];
const CORE_WINDOW_CLASS: &str = "Windows.UI.Core.CoreWindow";
const CORE_WINDOW_FLYOUTS: &[&str] = &["Search", "Cortana", "Start", "Task View"];

/// Classifies a top-level window by class name and title.
pub fn classify_shell_surface(class: &str, title: &str) -> Option<ShellSurface> {
    if TASKBAR_CLASSES.contains(&class) || (class == "Button" && title == "Start") {
        return Some(ShellSurface::Taskbar);
    }
    if FLYOUT_CLASSES.contains(&class)
        || (class == CORE_WINDOW_CLASS && CORE_WINDOW_FLYOUTS.contains(&title))
    {
        return Some(ShellSurface::Flyout);
    }
    None
}

/// Platform seam for every mutation lockdown makes. Calls may block.
pub trait DesktopShell: Send + Sync {
    fn window_chrome(&self) -> anyhow::Result<WindowChrome>;
    fn apply_chrome(&self, chrome: &WindowChrome) -> anyhow::Result<()>;
    fn is_maximized(&self) -> anyhow::Result<bool>;

    /// Excludes the host window from screen capture, falling back to
    /// monitor-only display where exclusion is unavailable.
    fn set_capture_exclusion(&self, exclude: bool) -> anyhow::Result<()>;

    /// Shows or hides the taskbar and other shell surfaces.
    fn set_shell_visible(&self, visible: bool) -> anyhow::Result<()>;

    /// Installs the keyboard filter and foreground observer.
    fn install_hooks(&self, flags: Arc<LockFlags>, events: HookSender) -> anyhow::Result<HookGuard>;

    fn clear_clipboard(&self) -> anyhow::Result<()>;
    fn accessibility_flags(&self) -> anyhow::Result<AccessibilityFlags>;
    fn set_accessibility_flags(&self, flags: &AccessibilityFlags) -> anyhow::Result<()>;
    fn focus_host(&self) -> anyhow::Result<()>;

    /// Whether the foreground window belongs to another process.
    fn foreground_is_foreign(&self) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn guard_releases_once_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let guard = HookGuard::new(move || flag.store(true, Ordering::SeqCst));
        assert!(!released.load(Ordering::SeqCst));
        drop(guard);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn hotkey_bits_are_cleared_and_others_kept() {
        let flags = AccessibilityFlags {
            sticky_keys: 0x7E,
            toggle_keys: 0x1E,
            filter_keys: 0x7E,
        };
        let off = flags.without_hotkeys();
        assert_eq!(off.sticky_keys, 0x7A);
        assert_eq!(off.toggle_keys, 0x1A);
        assert_eq!(off.filter_keys & HOTKEY_ACTIVE, 0);
    }

    #[test]
    fn every_taskbar_and_flyout_is_a_shell_surface() {
        assert_eq!(classify_shell_surface("Shell_TrayWnd", ""), Some(ShellSurface::Taskbar));
        assert_eq!(
            classify_shell_surface("Shell_SecondaryTrayWnd", ""),
            Some(ShellSurface::Taskbar)
        );
        assert_eq!(classify_shell_surface("Button", "Start"), Some(ShellSurface::Taskbar));
        assert_eq!(
            classify_shell_surface("NotifyIconOverflowWindow", ""),
            Some(ShellSurface::Flyout)
        );
        assert_eq!(
            classify_shell_surface("Windows.UI.Core.CoreWindow", "Search"),
            Some(ShellSurface::Flyout)
        );
        assert_eq!(
            classify_shell_surface("Windows.UI.Core.CoreWindow", "Task View"),
            Some(ShellSurface::Flyout)
        );
    }

    #[test]
    fn ordinary_windows_are_not_shell_surfaces() {
        assert_eq!(classify_shell_surface("Button", "OK"), None);
        assert_eq!(classify_shell_surface("Windows.UI.Core.CoreWindow", "Calculator"), None);
        assert_eq!(classify_shell_surface("Notepad", "Search"), None);
    }
}
