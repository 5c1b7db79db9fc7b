//! Synchronous security posture check run before launch and on every
//! monitoring tick.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::blacklist::{
    label_for, mac_label, matching_processes, process_matches, CRITICAL_PROCESSES,
    GAME_CAPTURE_HELPERS, SCREEN_RECORDERS, SOFT_PROCESSES, SUSPICIOUS_WINDOW_PHRASES,
    VM_DISK_MODELS, VM_GUEST_PROCESSES, VM_REGISTRY_KEYS, VM_VENDOR_STRINGS,
    VPN_ADAPTER_KEYWORDS, VPN_ADAPTER_PREFIXES,
};
use super::probe::{HardwareInventory, NetworkAdapter, SystemProbe};
use super::report::SecurityReport;

#[derive(Clone)]
pub struct PostureChecker {
    probe: Arc<dyn SystemProbe>,
}

fn best_effort<T>(check: &str, inconclusive: &mut Vec<String>, result: anyhow::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(check, error = %e, "posture check inconclusive");
            if !inconclusive.iter().any(|c| c == check) {
                inconclusive.push(check.to_string());
            }
            None
        }
    }
}

impl PostureChecker {
    pub fn new(probe: Arc<dyn SystemProbe>) -> Self {
        Self { probe }
    }

    pub fn check(&self) -> SecurityReport {
        let mut report = SecurityReport::clean(Utc::now());
        let mut inconclusive = Vec::new();
        let probe = self.probe.as_ref();

        if let Some(elevated) = best_effort("administrator", &mut inconclusive, probe.is_elevated()) {
            report.is_admin = elevated;
        }
        if let Some(count) = best_effort("monitors", &mut inconclusive, probe.monitor_count()) {
            report.monitor_count = count;
        }
        if let Some(remote) = best_effort("remote session", &mut inconclusive, probe.is_remote_session()) {
            report.remote_session = remote;
        }

        let processes = best_effort("processes", &mut inconclusive, probe.running_processes())
            .unwrap_or_default();
        let adapters = best_effort("network adapters", &mut inconclusive, probe.network_adapters())
            .unwrap_or_default();

        report.virtual_machine = self
            .detect_virtual_machine(&processes, &adapters, &mut inconclusive)
            .map(str::to_string);

        if let Some(signals) = best_effort("debugger", &mut inconclusive, probe.debugger_signals()) {
            report.debugger_attached = signals.any();
        }

        report.critical_processes = matching_processes(&processes, CRITICAL_PROCESSES);
        report.soft_processes = matching_processes(&processes, SOFT_PROCESSES);

        let recorder_running = !matching_processes(&report.critical_processes, SCREEN_RECORDERS).is_empty();
        let game_capture = best_effort("game capture", &mut inconclusive, probe.game_capture_enabled())
            .unwrap_or(false)
            && !matching_processes(&processes, GAME_CAPTURE_HELPERS).is_empty();
        report.screen_recording = recorder_running || game_capture;

        if let Some(titles) = best_effort("windows", &mut inconclusive, probe.visible_window_titles()) {
            report.suspicious_windows = suspicious_titles(&titles);
        }

        report.vpn_active = adapters.iter().any(looks_like_vpn);
        if let Some(proxy) = best_effort("proxy", &mut inconclusive, probe.proxy_configured()) {
            report.proxy_configured = proxy;
        }

        report.inconclusive = inconclusive;
        debug!(can_launch = report.can_launch(), "posture check complete");
        report
    }

    /// First matching signal wins: vendor strings, guest tools, registry
    /// keys, disk models, then MAC prefixes.
    fn detect_virtual_machine(
        &self,
        processes: &[String],
        adapters: &[NetworkAdapter],
        inconclusive: &mut Vec<String>,
    ) -> Option<&'static str> {
        let inventory = best_effort(
            "hardware inventory",
            inconclusive,
            self.probe.hardware_inventory(),
        );

        if let Some(label) = inventory.as_ref().and_then(vendor_label) {
            return Some(label);
        }

        for name in processes {
            if let Some((_, label)) = VM_GUEST_PROCESSES
                .iter()
                .find(|(needle, _)| process_matches(name, needle))
            {
                return Some(*label);
            }
        }

        for (key, label) in VM_REGISTRY_KEYS {
            if best_effort("vm registry", inconclusive, self.probe.registry_key_exists(key))
                .unwrap_or(false)
            {
                return Some(*label);
            }
        }

        if let Some(label) = inventory.as_ref().and_then(|inv| {
            inv.disk_models
                .iter()
                .find_map(|model| label_for(model, VM_DISK_MODELS))
        }) {
            return Some(label);
        }

        mac_heuristic(adapters)
    }
}

fn vendor_label(inventory: &HardwareInventory) -> Option<&'static str> {
    [
        &inventory.system_manufacturer,
        &inventory.system_model,
        &inventory.bios_vendor,
        &inventory.bios_version,
    ]
    .into_iter()
    .find_map(|s| label_for(s, VM_VENDOR_STRINGS))
}

/// Only when every active adapter with a MAC carries a hypervisor prefix;
/// a host with a physical NIC plus a VM bridge is not flagged.
fn mac_heuristic(adapters: &[NetworkAdapter]) -> Option<&'static str> {
    let macs: Vec<&[u8; 6]> = adapters
        .iter()
        .filter(|a| a.is_up)
        .filter_map(|a| a.mac.as_ref())
        .collect();
    if macs.is_empty() {
        return None;
    }
    let labels: Vec<Option<&'static str>> = macs.iter().map(|m| mac_label(m)).collect();
    if labels.iter().all(Option::is_some) {
        labels.into_iter().flatten().next()
    } else {
        None
    }
}

fn suspicious_titles(titles: &[String]) -> Vec<String> {
    titles
        .iter()
        .filter(|title| {
            let lower = title.to_lowercase();
            SUSPICIOUS_WINDOW_PHRASES.iter().any(|p| lower.contains(p))
        })
        .cloned()
        .collect()
}

fn looks_like_vpn(adapter: &NetworkAdapter) -> bool {
    if !adapter.is_up {
        return false;
    }
    let name = adapter.name.to_lowercase();
    let description = adapter.description.to_lowercase();
    VPN_ADAPTER_PREFIXES.iter().any(|p| name.starts_with(p))
        || VPN_ADAPTER_KEYWORDS
            .iter()
            .any(|k| name.contains(k) || description.contains(k))
}
