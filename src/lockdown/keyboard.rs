//! Low-level keyboard filter. The decision is a pure function of the key,
//! its modifiers and the lockdown flags, so hook callbacks stay trivial.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const VK_TAB: u32 = 0x09;
pub const VK_ESCAPE: u32 = 0x1B;
pub const VK_SNAPSHOT: u32 = 0x2C;
pub const VK_LWIN: u32 = 0x5B;
pub const VK_RWIN: u32 = 0x5C;
pub const VK_F1: u32 = 0x70;
pub const VK_F4: u32 = 0x73;
pub const VK_F5: u32 = 0x74;
pub const VK_F24: u32 = 0x87;

/// Lockdown flags shared with OS callback threads.
#[derive(Debug, Default)]
pub struct LockFlags {
    active: AtomicBool,
    suspend_depth: AtomicUsize,
}

impl LockFlags {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_depth.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn push_suspend(&self) {
        self.suspend_depth.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn pop_suspend(&self) {
        let _ = self
            .suspend_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }

    /// Active and not suspended.
    pub fn is_enforcing(&self) -> bool {
        self.is_active() && !self.is_suspended()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub vk: u32,
    pub alt: bool,
}

impl KeyEvent {
    pub fn new(vk: u32) -> Self {
        Self { vk, alt: false }
    }

    pub fn with_alt(vk: u32) -> Self {
        Self { vk, alt: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    Pass,
    Swallow,
    /// Swallow and wipe the clipboard (PrintScreen).
    SwallowAndClearClipboard,
}

impl KeyDecision {
    pub fn swallows(self) -> bool {
        !matches!(self, KeyDecision::Pass)
    }
}

pub fn filter_key(event: KeyEvent, flags: &LockFlags) -> KeyDecision {
    if !flags.is_enforcing() {
        return KeyDecision::Pass;
    }
    decide(event)
}

fn decide(event: KeyEvent) -> KeyDecision {
    match event.vk {
        VK_LWIN | VK_RWIN => KeyDecision::Swallow,
        VK_SNAPSHOT => KeyDecision::SwallowAndClearClipboard,
        VK_TAB if event.alt => KeyDecision::Swallow,
        // Alt+Esc, Ctrl+Esc and bare Escape
        VK_ESCAPE => KeyDecision::Swallow,
        // F5 stays available to refresh the exam page
        VK_F5 => KeyDecision::Pass,
        VK_F1..=VK_F24 => KeyDecision::Swallow,
        _ => KeyDecision::Pass,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcing() -> LockFlags {
        let flags = LockFlags::default();
        flags.set_active(true);
        flags
    }

    #[test]
    fn shell_shortcuts_are_swallowed() {
        let flags = enforcing();
        assert_eq!(filter_key(KeyEvent::new(VK_LWIN), &flags), KeyDecision::Swallow);
        assert_eq!(filter_key(KeyEvent::new(VK_RWIN), &flags), KeyDecision::Swallow);
        assert_eq!(filter_key(KeyEvent::with_alt(VK_TAB), &flags), KeyDecision::Swallow);
        assert_eq!(filter_key(KeyEvent::with_alt(VK_ESCAPE), &flags), KeyDecision::Swallow);
        assert_eq!(filter_key(KeyEvent::with_alt(VK_F4), &flags), KeyDecision::Swallow);
        assert_eq!(filter_key(KeyEvent::new(VK_ESCAPE), &flags), KeyDecision::Swallow);
    }

    #[test]
    fn print_screen_requests_clipboard_clear() {
        let flags = enforcing();
        assert_eq!(
            filter_key(KeyEvent::new(VK_SNAPSHOT), &flags),
            KeyDecision::SwallowAndClearClipboard
        );
    }

    #[test]
    fn function_keys_except_f5() {
        let flags = enforcing();
        for vk in VK_F1..=VK_F24 {
            let decision = filter_key(KeyEvent::new(vk), &flags);
            if vk == VK_F5 {
                assert_eq!(decision, KeyDecision::Pass);
            } else {
                assert!(decision.swallows(), "vk {vk:#x} should be swallowed");
            }
        }
    }

    #[test]
    fn plain_typing_and_tab_pass() {
        let flags = enforcing();
        assert_eq!(filter_key(KeyEvent::new(0x41), &flags), KeyDecision::Pass);
        assert_eq!(filter_key(KeyEvent::new(VK_TAB), &flags), KeyDecision::Pass);
    }

    #[test]
    fn everything_passes_when_inactive_or_suspended() {
        let flags = LockFlags::default();
        assert_eq!(filter_key(KeyEvent::new(VK_LWIN), &flags), KeyDecision::Pass);

        flags.set_active(true);
        flags.push_suspend();
        assert_eq!(filter_key(KeyEvent::with_alt(VK_TAB), &flags), KeyDecision::Pass);
        flags.pop_suspend();
        assert_eq!(filter_key(KeyEvent::with_alt(VK_TAB), &flags), KeyDecision::Swallow);
    }
}
