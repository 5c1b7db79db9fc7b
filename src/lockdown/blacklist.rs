//! Curated names and fingerprints the posture checker matches against.

/// Screen recorders, remote access, automation and injection tools,
/// reverse-engineering tools and traffic sniffers.
pub const CRITICAL_PROCESSES: &[&str] = &[
    // recorders and streaming
    "obs64",
    "obs32",
    "bandicam",
    "camtasia",
    "fraps",
    "sharex",
    "xsplit",
    "streamlabs",
    "flashbackrecorder",
    "screencastomatic",
    "snagit",
    "loom",
    "simplescreenrecorder",
    "kazam",
    "vokoscreenng",
    // remote access
    "teamviewer",
    "anydesk",
    "rustdesk",
    "ultraviewer",
    "parsecd",
    "remoting_host",
    "tvnserver",
    "winvnc",
    "vncviewer",
    "splashtop",
    "supremo",
    // automation and injection
    "autohotkey",
    "autoit3",
    "cheatengine",
    "extremeinjector",
    // reverse engineering
    "processhacker",
    "x64dbg",
    "x32dbg",
    "ollydbg",
    "ida64",
    "idaq",
    "windbg",
    "dnspy",
    "ilspy",
    // sniffers
    "wireshark",
    "fiddler",
    "charles",
    "httpdebuggerui",
    "burpsuite",
];

/// Subset of the critical list that records the screen.
pub const SCREEN_RECORDERS: &[&str] = &[
    "obs64",
    "obs32",
    "bandicam",
    "camtasia",
    "fraps",
    "sharex",
    "xsplit",
    "streamlabs",
    "flashbackrecorder",
    "screencastomatic",
    "snagit",
    "loom",
    "simplescreenrecorder",
    "kazam",
    "vokoscreenng",
];

/// Chat, communication and clipboard managers. Reported, never blocking.
pub const SOFT_PROCESSES: &[&str] = &[
    "discord",
    "slack",
    "telegram",
    "whatsapp",
    "skype",
    "zoom",
    "msteams",
    "signal",
    "viber",
    "messenger",
    "ditto",
    "clipx",
    "clipboardfusion",
    "copyq",
];

/// Helpers that run while the OS game-capture feature records.
pub const GAME_CAPTURE_HELPERS: &[&str] = &["bcastdvr", "gamebarftserver"];

pub const SUSPICIOUS_WINDOW_PHRASES: &[&str] = &[
    "chatgpt",
    "claude",
    "gemini",
    "copilot",
    "perplexity",
    "stack overflow",
    "chegg",
    "course hero",
    "quizlet",
    "brainly",
    "wolfram",
    "photomath",
    "google translate",
    "deepl",
];

/// (needle, hypervisor label) for system and BIOS vendor strings.
pub const VM_VENDOR_STRINGS: &[(&str, &str)] = &[
    ("vmware", "VMware"),
    ("virtualbox", "VirtualBox"),
    ("innotek", "VirtualBox"),
    ("vbox", "VirtualBox"),
    ("qemu", "QEMU"),
    ("kvm", "KVM"),
    ("bochs", "Bochs"),
    ("xen", "Xen"),
    ("parallels", "Parallels"),
    ("virtual machine", "Hyper-V"),
];

pub const VM_GUEST_PROCESSES: &[(&str, &str)] = &[
    ("vmtoolsd", "VMware"),
    ("vmwaretray", "VMware"),
    ("vmwareuser", "VMware"),
    ("vboxservice", "VirtualBox"),
    ("vboxtray", "VirtualBox"),
    ("vboxclient", "VirtualBox"),
    ("qemu-ga", "QEMU"),
    ("prl_tools", "Parallels"),
    ("prl_cc", "Parallels"),
    ("xenservice", "Xen"),
    ("vmsrvc", "Virtual PC"),
    ("vmusrvc", "Virtual PC"),
];

pub const VM_REGISTRY_KEYS: &[(&str, &str)] = &[
    (r"HKLM\SOFTWARE\Oracle\VirtualBox Guest Additions", "VirtualBox"),
    (r"HKLM\SYSTEM\CurrentControlSet\Services\VBoxGuest", "VirtualBox"),
    (r"HKLM\SOFTWARE\VMware, Inc.\VMware Tools", "VMware"),
    (r"HKLM\SYSTEM\CurrentControlSet\Services\vmhgfs", "VMware"),
    (r"HKLM\SOFTWARE\Microsoft\Virtual Machine\Guest\Parameters", "Hyper-V"),
    (r"HKLM\SYSTEM\CurrentControlSet\Services\xenevtchn", "Xen"),
];

pub const VM_DISK_MODELS: &[(&str, &str)] = &[
    ("vbox", "VirtualBox"),
    ("vmware", "VMware"),
    ("qemu", "QEMU"),
    ("virtio", "KVM"),
    ("virtual disk", "Hyper-V"),
    ("xen", "Xen"),
];

pub const VM_MAC_PREFIXES: &[([u8; 3], &str)] = &[
    ([0x00, 0x05, 0x69], "VMware"),
    ([0x00, 0x0C, 0x29], "VMware"),
    ([0x00, 0x1C, 0x14], "VMware"),
    ([0x00, 0x50, 0x56], "VMware"),
    ([0x08, 0x00, 0x27], "VirtualBox"),
    ([0x52, 0x54, 0x00], "QEMU"),
    ([0x00, 0x15, 0x5D], "Hyper-V"),
    ([0x00, 0x16, 0x3E], "Xen"),
    ([0x00, 0x1C, 0x42], "Parallels"),
];

pub const VPN_ADAPTER_PREFIXES: &[&str] = &["tun", "tap", "wg", "ppp", "utun"];

pub const VPN_ADAPTER_KEYWORDS: &[&str] = &[
    "vpn",
    "wireguard",
    "wintun",
    "tap-windows",
    "openvpn",
    "nordlynx",
    "anyconnect",
    "fortinet",
    "pangp",
];

/// Lowercases, drops a trailing `.exe` and removes ` `, `-`, `_` and `.`.
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let stem = lower.strip_suffix(".exe").unwrap_or(&lower);
    stem.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '.'))
        .collect()
}

/// Substring match in both directions; the reverse direction only for
/// running names of at least three characters.
pub fn process_matches(running: &str, entry: &str) -> bool {
    let running = normalize_process_name(running);
    let entry = normalize_process_name(entry);
    if running.is_empty() || entry.is_empty() {
        return false;
    }
    running.contains(&entry) || (running.chars().count() >= 3 && entry.contains(&running))
}

/// Running names matching any entry, deduplicated, in first-seen order.
pub fn matching_processes(running: &[String], list: &[&str]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for name in running {
        if list.iter().any(|entry| process_matches(name, entry))
            && !found.iter().any(|f| f.eq_ignore_ascii_case(name))
        {
            found.push(name.clone());
        }
    }
    found
}

/// First label whose needle occurs in `haystack`, case-insensitively.
pub fn label_for<'a>(haystack: &str, table: &'a [(&'a str, &'a str)]) -> Option<&'a str> {
    let haystack = haystack.to_lowercase().replace(['_', '&'], " ");
    table
        .iter()
        .find(|(needle, _)| haystack.contains(needle))
        .map(|(_, label)| *label)
}

pub fn mac_label(mac: &[u8; 6]) -> Option<&'static str> {
    VM_MAC_PREFIXES
        .iter()
        .find(|(prefix, _)| mac[..3] == prefix[..])
        .map(|(_, label)| *label)
}
