use std::sync::Arc;

use super::probe::SystemProbe;
use super::shell::DesktopShell;

pub mod portable;
#[cfg(test)]
pub mod recording;
#[cfg(windows)]
pub mod win32;

#[cfg(windows)]
pub fn default_probe() -> Arc<dyn SystemProbe> {
    Arc::new(win32::WindowsProbe::new())
}

#[cfg(not(windows))]
pub fn default_probe() -> Arc<dyn SystemProbe> {
    Arc::new(portable::ProcProbe::new())
}

/// Shell bound to the window hosting the client.
#[cfg(windows)]
pub fn default_shell() -> anyhow::Result<Arc<dyn DesktopShell>> {
    Ok(Arc::new(win32::WindowsShell::for_console()?))
}

#[cfg(not(windows))]
pub fn default_shell() -> anyhow::Result<Arc<dyn DesktopShell>> {
    Ok(Arc::new(portable::UnsupportedShell::new()))
}
