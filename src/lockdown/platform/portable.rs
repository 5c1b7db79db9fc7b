//! Backend for platforms without the Win32 surface. Facts come from procfs
//! and sysfs; anything else is reported as unsupported.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{debug, warn};

use crate::lockdown::keyboard::LockFlags;
use crate::lockdown::probe::{DebuggerSignals, HardwareInventory, NetworkAdapter, SystemProbe};
use crate::lockdown::shell::{
    AccessibilityFlags, DesktopShell, HookGuard, HookSender, WindowChrome,
};

/// procfs and sysfs entries are small; anything larger is not what we expect.
const MAX_READ_SIZE: u64 = 4096;
const MAX_SCAN_ENTRIES: usize = 65_536;

const REMOTE_SESSION_VARS: &[&str] = &["SSH_CONNECTION", "SSH_TTY", "XRDP_SESSION"];
const PROXY_VARS: &[&str] = &[
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
];

fn read_bounded(path: &Path) -> anyhow::Result<String> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut content = String::new();
    file.take(MAX_READ_SIZE)
        .read_to_string(&mut content)
        .with_context(|| format!("read {}", path.display()))?;
    Ok(content.trim().to_string())
}

fn read_or_empty(path: &Path) -> String {
    read_bounded(path).unwrap_or_default()
}

fn env_set(vars: &[&str]) -> bool {
    vars.iter()
        .any(|v| std::env::var(v).map(|s| !s.trim().is_empty()).unwrap_or(false))
}

/// Value of a `Name:\tvalue` line in `/proc/<pid>/status`.
fn status_field<'a>(status: &'a str, name: &str) -> Option<&'a str> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
        .map(str::trim)
}

fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.trim().split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() || mac == [0u8; 6] {
        return None;
    }
    Some(mac)
}

fn dir_entries(dir: &Path) -> anyhow::Result<Vec<fs::DirEntry>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))?;
    let mut out = Vec::new();
    for entry in entries {
        if out.len() >= MAX_SCAN_ENTRIES {
            return Err(anyhow!("{} has more than {} entries", dir.display(), MAX_SCAN_ENTRIES));
        }
        if let Ok(entry) = entry {
            out.push(entry);
        }
    }
    Ok(out)
}

pub struct ProcProbe {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl Default for ProcProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcProbe {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    fn self_status(&self) -> anyhow::Result<String> {
        read_bounded(&self.proc_root.join("self").join("status"))
    }
}

impl SystemProbe for ProcProbe {
    fn is_elevated(&self) -> anyhow::Result<bool> {
        let status = self.self_status()?;
        let uid = status_field(&status, "Uid").ok_or_else(|| anyhow!("no Uid line"))?;
        // real, effective, saved, filesystem
        let effective = uid
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow!("malformed Uid line"))?;
        Ok(effective == "0")
    }

    fn monitor_count(&self) -> anyhow::Result<usize> {
        let drm = self.sys_root.join("class").join("drm");
        let connected = dir_entries(&drm)?
            .into_iter()
            .filter(|e| e.file_name().to_string_lossy().contains('-'))
            .filter(|e| read_or_empty(&e.path().join("status")) == "connected")
            .count();
        Ok(connected)
    }

    fn is_remote_session(&self) -> anyhow::Result<bool> {
        Ok(env_set(REMOTE_SESSION_VARS))
    }

    fn hardware_inventory(&self) -> anyhow::Result<HardwareInventory> {
        let dmi = self.sys_root.join("class").join("dmi").join("id");
        let disk_models = match dir_entries(&self.sys_root.join("block")) {
            Ok(entries) => entries
                .into_iter()
                .map(|e| read_or_empty(&e.path().join("device").join("model")))
                .filter(|m| !m.is_empty())
                .collect(),
            Err(e) => {
                debug!(error = %e, "no block devices listed");
                Vec::new()
            }
        };
        Ok(HardwareInventory {
            system_manufacturer: read_or_empty(&dmi.join("sys_vendor")),
            system_model: read_or_empty(&dmi.join("product_name")),
            bios_vendor: read_or_empty(&dmi.join("bios_vendor")),
            bios_version: read_or_empty(&dmi.join("bios_version")),
            disk_models,
        })
    }

    fn registry_key_exists(&self, path: &str) -> anyhow::Result<bool> {
        Err(anyhow!("registry lookup of {} is unsupported on this platform", path))
    }

    fn network_adapters(&self) -> anyhow::Result<Vec<NetworkAdapter>> {
        let net = self.sys_root.join("class").join("net");
        Ok(dir_entries(&net)?
            .into_iter()
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if name == "lo" {
                    return None;
                }
                let path = e.path();
                let operstate = read_or_empty(&path.join("operstate"));
                Some(NetworkAdapter {
                    description: name.clone(),
                    name,
                    mac: parse_mac(&read_or_empty(&path.join("address"))),
                    // tun devices report "unknown" while carrying traffic
                    is_up: operstate == "up" || operstate == "unknown",
                })
            })
            .collect())
    }

    fn debugger_signals(&self) -> anyhow::Result<DebuggerSignals> {
        let status = self.self_status()?;
        let tracer = status_field(&status, "TracerPid").unwrap_or("0");
        Ok(DebuggerSignals {
            debugger_present: tracer != "0",
            ..DebuggerSignals::default()
        })
    }

    fn running_processes(&self) -> anyhow::Result<Vec<String>> {
        Ok(dir_entries(&self.proc_root)?
            .into_iter()
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .chars()
                    .all(|c| c.is_ascii_digit())
            })
            .filter_map(|e| read_bounded(&e.path().join("comm")).ok())
            .filter(|comm| !comm.is_empty())
            .collect())
    }

    fn game_capture_enabled(&self) -> anyhow::Result<bool> {
        Err(anyhow!("game capture settings are unsupported on this platform"))
    }

    fn visible_window_titles(&self) -> anyhow::Result<Vec<String>> {
        Err(anyhow!("window enumeration is unsupported on this platform"))
    }

    fn proxy_configured(&self) -> anyhow::Result<bool> {
        Ok(env_set(PROXY_VARS))
    }
}

/// Production shell where no window, hook or clipboard primitive exists.
/// Every operation fails, so the enforcer logs each step as not applied and
/// lockdown visibly runs degraded.
#[derive(Debug, Default)]
pub struct UnsupportedShell;

fn unsupported<T>(operation: &str) -> anyhow::Result<T> {
    Err(anyhow!("{} is unsupported on this platform", operation))
}

impl UnsupportedShell {
    pub fn new() -> Self {
        warn!("desktop lockdown is not enforced on this platform");
        Self
    }
}

impl DesktopShell for UnsupportedShell {
    fn window_chrome(&self) -> anyhow::Result<WindowChrome> {
        unsupported("reading window chrome")
    }

    fn apply_chrome(&self, _chrome: &WindowChrome) -> anyhow::Result<()> {
        unsupported("changing window chrome")
    }

    fn is_maximized(&self) -> anyhow::Result<bool> {
        unsupported("reading window state")
    }

    fn set_capture_exclusion(&self, _exclude: bool) -> anyhow::Result<()> {
        unsupported("capture exclusion")
    }

    fn set_shell_visible(&self, _visible: bool) -> anyhow::Result<()> {
        unsupported("hiding the desktop shell")
    }

    fn install_hooks(&self, _flags: Arc<LockFlags>, _events: HookSender) -> anyhow::Result<HookGuard> {
        unsupported("keyboard and focus hooks")
    }

    fn clear_clipboard(&self) -> anyhow::Result<()> {
        unsupported("clearing the clipboard")
    }

    fn accessibility_flags(&self) -> anyhow::Result<AccessibilityFlags> {
        unsupported("reading accessibility shortcuts")
    }

    fn set_accessibility_flags(&self, _flags: &AccessibilityFlags) -> anyhow::Result<()> {
        unsupported("changing accessibility shortcuts")
    }

    fn focus_host(&self) -> anyhow::Result<()> {
        unsupported("focusing the exam window")
    }

    fn foreground_is_foreign(&self) -> anyhow::Result<bool> {
        unsupported("reading the foreground window")
    }
}
