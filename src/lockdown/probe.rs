//! Read-only platform facts consumed by the posture checker.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareInventory {
    pub system_manufacturer: String,
    pub system_model: String,
    pub bios_vendor: String,
    pub bios_version: String,
    pub disk_models: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAdapter {
    pub name: String,
    pub description: String,
    pub mac: Option<[u8; 6]>,
    pub is_up: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebuggerSignals {
    pub debugger_present: bool,
    pub remote_debugger_present: bool,
    pub kernel_debug_port: bool,
}

impl DebuggerSignals {
    pub fn any(&self) -> bool {
        self.debugger_present || self.remote_debugger_present || self.kernel_debug_port
    }
}

/// Each call is independent; an `Err` only makes that one check inconclusive.
#[cfg_attr(test, mockall::automock)]
pub trait SystemProbe: Send + Sync {
    fn is_elevated(&self) -> anyhow::Result<bool>;
    fn monitor_count(&self) -> anyhow::Result<usize>;
    fn is_remote_session(&self) -> anyhow::Result<bool>;
    fn hardware_inventory(&self) -> anyhow::Result<HardwareInventory>;
    fn registry_key_exists(&self, path: &str) -> anyhow::Result<bool>;
    fn network_adapters(&self) -> anyhow::Result<Vec<NetworkAdapter>>;
    fn debugger_signals(&self) -> anyhow::Result<DebuggerSignals>;
    fn running_processes(&self) -> anyhow::Result<Vec<String>>;
    /// OS game-capture (background recording) setting.
    fn game_capture_enabled(&self) -> anyhow::Result<bool>;
    fn visible_window_titles(&self) -> anyhow::Result<Vec<String>>;
    fn proxy_configured(&self) -> anyhow::Result<bool>;
}
