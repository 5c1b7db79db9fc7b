//! Win32 backend: token, registry, toolhelp and IP helper probes; window,
//! shell, clipboard and hook control for the host window.

use std::ffi::c_void;
use std::mem::size_of;
use std::cell::RefCell;
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;

use anyhow::{anyhow, Context};
use tracing::warn;
use windows::core::{HSTRING, PCWSTR};
use windows::Wdk::System::Threading::{NtQueryInformationProcess, PROCESSINFOCLASS};
use windows::Win32::Foundation::{
    CloseHandle, BOOL, ERROR_BUFFER_OVERFLOW, ERROR_FILE_NOT_FOUND, ERROR_SUCCESS, HANDLE,
    HINSTANCE, HMODULE, HWND, LPARAM, LRESULT, WPARAM,
};
use windows::Win32::NetworkManagement::IpHelper::{
    GetAdaptersAddresses, GAA_FLAG_SKIP_ANYCAST, GAA_FLAG_SKIP_DNS_SERVER,
    GAA_FLAG_SKIP_MULTICAST, IP_ADAPTER_ADDRESSES_LH,
};
use windows::Win32::NetworkManagement::Ndis::IfOperStatusUp;
use windows::Win32::Networking::WinSock::AF_UNSPEC;
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::System::Console::GetConsoleWindow;
use windows::Win32::System::DataExchange::{CloseClipboard, EmptyClipboard, OpenClipboard};
use windows::Win32::System::Diagnostics::Debug::{CheckRemoteDebuggerPresent, IsDebuggerPresent};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Registry::{
    RegCloseKey, RegGetValueW, RegOpenKeyExW, HKEY, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE,
    KEY_READ, RRF_RT_REG_DWORD, RRF_RT_REG_SZ,
};
use windows::Win32::System::Threading::{GetCurrentProcess, GetCurrentProcessId, GetCurrentThreadId, OpenProcessToken};
use windows::Win32::UI::Accessibility::{SetWinEventHook, UnhookWinEvent, HWINEVENTHOOK};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, EnumWindows, FindWindowExW, GetClassNameW, GetForegroundWindow,
    GetMessageW, GetSystemMetrics, GetWindowLongPtrW, GetWindowTextW, GetWindowThreadProcessId,
    IsIconic, IsWindowVisible, IsZoomed, PostThreadMessageW, SetForegroundWindow,
    SetWindowDisplayAffinity, SetWindowLongPtrW, SetWindowPos, SetWindowsHookExW, ShowWindow,
    SystemParametersInfoW, TranslateMessage, UnhookWindowsHookEx, EVENT_SYSTEM_FOREGROUND,
    GWL_EXSTYLE, GWL_STYLE, HC_ACTION, HHOOK, HWND_NOTOPMOST, HWND_TOPMOST, KBDLLHOOKSTRUCT,
    LLKHF_ALTDOWN, MSG, SM_CMONITORS, SM_REMOTESESSION, SPIF_SENDCHANGE, SPI_GETFILTERKEYS,
    SPI_GETSTICKYKEYS, SPI_GETTOGGLEKEYS, SPI_SETFILTERKEYS, SPI_SETSTICKYKEYS,
    SPI_SETTOGGLEKEYS, SWP_FRAMECHANGED, SWP_NOMOVE, SWP_NOSIZE, SW_HIDE, SW_MAXIMIZE,
    SW_MINIMIZE, SW_RESTORE, SW_SHOW, SYSTEM_PARAMETERS_INFO_ACTION,
    SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS, WDA_EXCLUDEFROMCAPTURE, WDA_MONITOR, WDA_NONE,
    WH_KEYBOARD_LL, WINEVENT_OUTOFCONTEXT, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN, WS_CAPTION,
    WS_EX_APPWINDOW, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_THICKFRAME,
};

use crate::lockdown::keyboard::{filter_key, KeyDecision, KeyEvent, LockFlags};
use crate::lockdown::probe::{DebuggerSignals, HardwareInventory, NetworkAdapter, SystemProbe};
use crate::lockdown::shell::{
    classify_shell_surface, AccessibilityFlags, DesktopShell, HookEvent, HookGuard, HookSender,
    ShellSurface, WindowChrome, WindowState, WindowStyle,
};

const BIOS_KEY: &str = r"HKLM\HARDWARE\DESCRIPTION\System\BIOS";
const DISK_ENUM_KEY: &str = r"HKLM\SYSTEM\CurrentControlSet\Services\disk\Enum";
const INTERNET_SETTINGS_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Internet Settings";
const GAME_CONFIG_KEY: &str = r"HKCU\System\GameConfigStore";
const GAME_DVR_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\GameDVR";
const PROCESS_DEBUG_PORT: PROCESSINFOCLASS = PROCESSINFOCLASS(7);
const IF_TYPE_SOFTWARE_LOOPBACK: u32 = 24;

fn wide_to_string(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

fn split_hive(path: &str) -> anyhow::Result<(HKEY, &str)> {
    if let Some(rest) = path.strip_prefix(r"HKLM\") {
        Ok((HKEY_LOCAL_MACHINE, rest))
    } else if let Some(rest) = path.strip_prefix(r"HKCU\") {
        Ok((HKEY_CURRENT_USER, rest))
    } else {
        Err(anyhow!("unsupported registry hive in {path}"))
    }
}

fn reg_key_exists(path: &str) -> anyhow::Result<bool> {
    let (hive, sub) = split_hive(path)?;
    let mut key = HKEY::default();
    let status = unsafe { RegOpenKeyExW(hive, &HSTRING::from(sub), 0, KEY_READ, &mut key) };
    if status == ERROR_SUCCESS {
        unsafe {
            let _ = RegCloseKey(key);
        }
        Ok(true)
    } else if status == ERROR_FILE_NOT_FOUND {
        Ok(false)
    } else {
        Err(anyhow!("RegOpenKeyExW({path}) failed: {status:?}"))
    }
}

fn reg_string(path: &str, value: &str) -> anyhow::Result<Option<String>> {
    let (hive, sub) = split_hive(path)?;
    let mut buf = vec![0u16; 1024];
    let mut size = (buf.len() * size_of::<u16>()) as u32;
    let status = unsafe {
        RegGetValueW(
            hive,
            &HSTRING::from(sub),
            &HSTRING::from(value),
            RRF_RT_REG_SZ,
            None,
            Some(buf.as_mut_ptr() as *mut c_void),
            Some(&mut size),
        )
    };
    if status == ERROR_FILE_NOT_FOUND {
        return Ok(None);
    }
    if status != ERROR_SUCCESS {
        return Err(anyhow!("RegGetValueW({path}\\{value}) failed: {status:?}"));
    }
    Ok(Some(wide_to_string(&buf)))
}

fn reg_dword(path: &str, value: &str) -> anyhow::Result<Option<u32>> {
    let (hive, sub) = split_hive(path)?;
    let mut data = 0u32;
    let mut size = size_of::<u32>() as u32;
    let status = unsafe {
        RegGetValueW(
            hive,
            &HSTRING::from(sub),
            &HSTRING::from(value),
            RRF_RT_REG_DWORD,
            None,
            Some(&mut data as *mut u32 as *mut c_void),
            Some(&mut size),
        )
    };
    if status == ERROR_FILE_NOT_FOUND {
        return Ok(None);
    }
    if status != ERROR_SUCCESS {
        return Err(anyhow!("RegGetValueW({path}\\{value}) failed: {status:?}"));
    }
    Ok(Some(data))
}

fn window_title(hwnd: HWND) -> Option<String> {
    let mut buf = [0u16; 512];
    let len = unsafe { GetWindowTextW(hwnd, &mut buf) };
    (len > 0).then(|| String::from_utf16_lossy(&buf[..len as usize]))
}

fn window_pid(hwnd: HWND) -> u32 {
    let mut pid = 0u32;
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut pid));
    }
    pid
}

unsafe extern "system" fn collect_visible_title(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let titles = &mut *(lparam.0 as *mut Vec<String>);
    if IsWindowVisible(hwnd).as_bool() {
        if let Some(title) = window_title(hwnd) {
            titles.push(title);
        }
    }
    BOOL(1)
}

fn window_class(hwnd: HWND) -> Option<String> {
    let mut buf = [0u16; 256];
    let len = unsafe { GetClassNameW(hwnd, &mut buf) };
    (len > 0).then(|| String::from_utf16_lossy(&buf[..len as usize]))
}

unsafe extern "system" fn collect_shell_surface(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let found = &mut *(lparam.0 as *mut Vec<(HWND, ShellSurface)>);
    if let Some(class) = window_class(hwnd) {
        let title = window_title(hwnd).unwrap_or_default();
        if let Some(kind) = classify_shell_surface(&class, &title) {
            found.push((hwnd, kind));
        }
    }
    BOOL(1)
}

/// Every top-level shell surface, plus the start button hosted inside each
/// taskbar.
fn shell_surfaces() -> anyhow::Result<Vec<(HWND, ShellSurface)>> {
    let mut found: Vec<(HWND, ShellSurface)> = Vec::new();
    unsafe {
        EnumWindows(
            Some(collect_shell_surface),
            LPARAM(&mut found as *mut Vec<(HWND, ShellSurface)> as isize),
        )
        .context("enumerate shell windows")?;
    }
    let taskbars: Vec<HWND> = found
        .iter()
        .filter(|(_, kind)| *kind == ShellSurface::Taskbar)
        .map(|(hwnd, _)| *hwnd)
        .collect();
    for tray in taskbars {
        if let Ok(start) =
            unsafe { FindWindowExW(tray, HWND::default(), &HSTRING::from("Start"), PCWSTR::null()) }
        {
            if !start.0.is_null() {
                found.push((start, ShellSurface::Taskbar));
            }
        }
    }
    Ok(found)
}

#[derive(Debug, Default)]
pub struct WindowsProbe;

impl WindowsProbe {
    pub fn new() -> Self {
        Self
    }
}

impl SystemProbe for WindowsProbe {
    fn is_elevated(&self) -> anyhow::Result<bool> {
        unsafe {
            let mut token = HANDLE::default();
            OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token)?;
            let mut elevation = TOKEN_ELEVATION::default();
            let mut len = 0u32;
            let result = GetTokenInformation(
                token,
                TokenElevation,
                Some(&mut elevation as *mut TOKEN_ELEVATION as *mut c_void),
                size_of::<TOKEN_ELEVATION>() as u32,
                &mut len,
            );
            let _ = CloseHandle(token);
            result?;
            Ok(elevation.TokenIsElevated != 0)
        }
    }

    fn monitor_count(&self) -> anyhow::Result<usize> {
        let count = unsafe { GetSystemMetrics(SM_CMONITORS) };
        Ok(count.max(0) as usize)
    }

    fn is_remote_session(&self) -> anyhow::Result<bool> {
        Ok(unsafe { GetSystemMetrics(SM_REMOTESESSION) } != 0)
    }

    fn hardware_inventory(&self) -> anyhow::Result<HardwareInventory> {
        let bios = |value: &str| -> anyhow::Result<String> {
            Ok(reg_string(BIOS_KEY, value)?.unwrap_or_default())
        };
        let disk_count = reg_dword(DISK_ENUM_KEY, "Count")?.unwrap_or(0);
        let mut disk_models = Vec::new();
        for index in 0..disk_count {
            if let Some(id) = reg_string(DISK_ENUM_KEY, &index.to_string())? {
                disk_models.push(id);
            }
        }
        Ok(HardwareInventory {
            system_manufacturer: bios("SystemManufacturer")?,
            system_model: bios("SystemProductName")?,
            bios_vendor: bios("BIOSVendor")?,
            bios_version: bios("BIOSVersion")?,
            disk_models,
        })
    }

    fn registry_key_exists(&self, path: &str) -> anyhow::Result<bool> {
        reg_key_exists(path)
    }

    fn network_adapters(&self) -> anyhow::Result<Vec<NetworkAdapter>> {
        // u64 storage keeps the adapter records aligned
        let mut size: u32 = 16 * 1024;
        let mut buf: Vec<u64> = vec![0; size as usize / 8];
        loop {
            let rc = unsafe {
                GetAdaptersAddresses(
                    AF_UNSPEC.0 as u32,
                    GAA_FLAG_SKIP_ANYCAST | GAA_FLAG_SKIP_MULTICAST | GAA_FLAG_SKIP_DNS_SERVER,
                    None,
                    Some(buf.as_mut_ptr() as *mut IP_ADAPTER_ADDRESSES_LH),
                    &mut size,
                )
            };
            if rc == ERROR_BUFFER_OVERFLOW.0 {
                buf.resize(size as usize / 8 + 1, 0);
                continue;
            }
            if rc != ERROR_SUCCESS.0 {
                return Err(anyhow!("GetAdaptersAddresses failed: {rc}"));
            }
            break;
        }

        let mut adapters = Vec::new();
        let mut cursor = buf.as_ptr() as *const IP_ADAPTER_ADDRESSES_LH;
        while !cursor.is_null() {
            let adapter = unsafe { &*cursor };
            cursor = adapter.Next;
            if adapter.IfType == IF_TYPE_SOFTWARE_LOOPBACK {
                continue;
            }
            let mac = (adapter.PhysicalAddressLength == 6).then(|| {
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&adapter.PhysicalAddress[..6]);
                mac
            });
            adapters.push(NetworkAdapter {
                name: unsafe { adapter.FriendlyName.to_string() }.unwrap_or_default(),
                description: unsafe { adapter.Description.to_string() }.unwrap_or_default(),
                mac,
                is_up: adapter.OperStatus == IfOperStatusUp,
            });
        }
        Ok(adapters)
    }

    fn debugger_signals(&self) -> anyhow::Result<DebuggerSignals> {
        unsafe {
            let process = GetCurrentProcess();
            let mut remote = BOOL(0);
            CheckRemoteDebuggerPresent(process, &mut remote)?;

            let mut port: usize = 0;
            let mut returned = 0u32;
            let status = NtQueryInformationProcess(
                process,
                PROCESS_DEBUG_PORT,
                &mut port as *mut usize as *mut c_void,
                size_of::<usize>() as u32,
                &mut returned,
            );

            Ok(DebuggerSignals {
                debugger_present: IsDebuggerPresent().as_bool(),
                remote_debugger_present: remote.as_bool(),
                kernel_debug_port: status.is_ok() && port != 0,
            })
        }
    }

    fn running_processes(&self) -> anyhow::Result<Vec<String>> {
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)?;
            let mut entry = PROCESSENTRY32W {
                dwSize: size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };
            let mut names = Vec::new();
            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    names.push(wide_to_string(&entry.szExeFile));
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }
            let _ = CloseHandle(snapshot);
            Ok(names)
        }
    }

    fn game_capture_enabled(&self) -> anyhow::Result<bool> {
        Ok(reg_dword(GAME_CONFIG_KEY, "GameDVR_Enabled")? == Some(1)
            || reg_dword(GAME_DVR_KEY, "AppCaptureEnabled")? == Some(1))
    }

    fn visible_window_titles(&self) -> anyhow::Result<Vec<String>> {
        let mut titles: Vec<String> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_visible_title),
                LPARAM(&mut titles as *mut Vec<String> as isize),
            )?;
        }
        Ok(titles)
    }

    fn proxy_configured(&self) -> anyhow::Result<bool> {
        let env_proxy = ["HTTP_PROXY", "HTTPS_PROXY", "ALL_PROXY"]
            .iter()
            .any(|v| std::env::var(v).map(|s| !s.is_empty()).unwrap_or(false));
        Ok(env_proxy || reg_dword(INTERNET_SETTINGS_KEY, "ProxyEnable")? == Some(1))
    }
}

struct HookContext {
    flags: Arc<LockFlags>,
    events: HookSender,
    host_pid: u32,
}

thread_local! {
    // Both hooks call back on the thread that installed them, so the hook
    // thread owns its context and callbacks never wait on a lock.
    static HOOK_CONTEXT: RefCell<Option<HookContext>> = const { RefCell::new(None) };
}

fn with_hook_context<T>(f: impl FnOnce(&HookContext) -> T) -> Option<T> {
    HOOK_CONTEXT.with(|cell| cell.try_borrow().ok()?.as_ref().map(f))
}

/// Whether the key is swallowed. A Print Screen press also asks for the
/// clipboard to be cleared.
fn handle_key(ctx: &HookContext, event: KeyEvent, key_down: bool) -> bool {
    let decision = filter_key(event, &ctx.flags);
    if key_down && decision == KeyDecision::SwallowAndClearClipboard {
        let _ = ctx.events.send(HookEvent::ClipboardClearRequested);
    }
    decision.swallows()
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let info = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
        let event = KeyEvent {
            vk: info.vkCode,
            alt: info.flags.0 & LLKHF_ALTDOWN.0 != 0,
        };
        let key_down = matches!(wparam.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN);
        let swallowed = with_hook_context(|ctx| handle_key(ctx, event, key_down)).unwrap_or(false);
        if swallowed {
            return LRESULT(1);
        }
    }
    CallNextHookEx(HHOOK::default(), code, wparam, lparam)
}

unsafe extern "system" fn foreground_proc(
    _hook: HWINEVENTHOOK,
    _event: u32,
    hwnd: HWND,
    _id_object: i32,
    _id_child: i32,
    _thread: u32,
    _time: u32,
) {
    let pid = window_pid(hwnd);
    let title = window_title(hwnd);
    with_hook_context(|ctx| {
        let _ = ctx.events.send(HookEvent::ForegroundChanged {
            foreign: pid != ctx.host_pid,
            title,
        });
    });
}

/// Installs both hooks and pumps messages until `WM_QUIT`.
fn run_hook_thread(context: HookContext, ready: std_mpsc::Sender<anyhow::Result<u32>>) {
    HOOK_CONTEXT.with(|cell| *cell.borrow_mut() = Some(context));
    unsafe {
        let keyboard = match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), HINSTANCE::default(), 0) {
            Ok(hook) => hook,
            Err(e) => {
                let _ = ready.send(Err(e.into()));
                return;
            }
        };
        let foreground = SetWinEventHook(
            EVENT_SYSTEM_FOREGROUND,
            EVENT_SYSTEM_FOREGROUND,
            HMODULE::default(),
            Some(foreground_proc),
            0,
            0,
            WINEVENT_OUTOFCONTEXT,
        );
        if foreground.is_invalid() {
            warn!("foreground observer could not be installed");
        }
        let _ = ready.send(Ok(GetCurrentThreadId()));

        let mut msg = MSG::default();
        while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        if !foreground.is_invalid() {
            let _ = UnhookWinEvent(foreground);
        }
        let _ = UnhookWindowsHookEx(keyboard);
    }
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct KeyFeature {
    cb_size: u32,
    flags: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct FilterKeysFeature {
    cb_size: u32,
    flags: u32,
    timings: [u32; 4],
}

unsafe fn spi_get<T>(action: SYSTEM_PARAMETERS_INFO_ACTION, value: &mut T) -> windows::core::Result<()> {
    SystemParametersInfoW(
        action,
        size_of::<T>() as u32,
        Some(value as *mut T as *mut c_void),
        SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
    )
}

unsafe fn spi_set<T>(action: SYSTEM_PARAMETERS_INFO_ACTION, value: &mut T) -> windows::core::Result<()> {
    SystemParametersInfoW(
        action,
        size_of::<T>() as u32,
        Some(value as *mut T as *mut c_void),
        SPIF_SENDCHANGE,
    )
}

/// Shell bound to one host window.
pub struct WindowsShell {
    // HWND is not Send; keep the raw handle value
    hwnd: isize,
    host_pid: u32,
}

impl WindowsShell {
    pub fn for_console() -> anyhow::Result<Self> {
        let hwnd = unsafe { GetConsoleWindow() };
        if hwnd.0.is_null() {
            return Err(anyhow!("no console window to lock"));
        }
        Ok(Self::for_window(hwnd))
    }

    pub fn for_window(hwnd: HWND) -> Self {
        Self {
            hwnd: hwnd.0 as isize,
            host_pid: unsafe { GetCurrentProcessId() },
        }
    }

    fn hwnd(&self) -> HWND {
        HWND(self.hwnd as *mut c_void)
    }
}

impl DesktopShell for WindowsShell {
    fn window_chrome(&self) -> anyhow::Result<WindowChrome> {
        let hwnd = self.hwnd();
        unsafe {
            let style = GetWindowLongPtrW(hwnd, GWL_STYLE) as u32;
            let ex_style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE) as u32;
            let state = if IsIconic(hwnd).as_bool() {
                WindowState::Minimized
            } else if IsZoomed(hwnd).as_bool() {
                WindowState::Maximized
            } else {
                WindowState::Normal
            };
            Ok(WindowChrome {
                state,
                style: if style & WS_CAPTION.0 != 0 {
                    WindowStyle::Bordered
                } else {
                    WindowStyle::Borderless
                },
                resizable: style & WS_THICKFRAME.0 != 0,
                topmost: ex_style & WS_EX_TOPMOST.0 != 0,
                show_in_taskbar: ex_style & WS_EX_TOOLWINDOW.0 == 0,
            })
        }
    }

    fn apply_chrome(&self, chrome: &WindowChrome) -> anyhow::Result<()> {
        let hwnd = self.hwnd();
        unsafe {
            let mut style = GetWindowLongPtrW(hwnd, GWL_STYLE) as u32;
            match chrome.style {
                WindowStyle::Bordered => style |= WS_CAPTION.0,
                WindowStyle::Borderless => style &= !WS_CAPTION.0,
            }
            if chrome.resizable {
                style |= WS_THICKFRAME.0;
            } else {
                style &= !WS_THICKFRAME.0;
            }
            SetWindowLongPtrW(hwnd, GWL_STYLE, style as isize);

            let mut ex_style = GetWindowLongPtrW(hwnd, GWL_EXSTYLE) as u32;
            if chrome.show_in_taskbar {
                ex_style = (ex_style & !WS_EX_TOOLWINDOW.0) | WS_EX_APPWINDOW.0;
            } else {
                ex_style = (ex_style & !WS_EX_APPWINDOW.0) | WS_EX_TOOLWINDOW.0;
            }
            SetWindowLongPtrW(hwnd, GWL_EXSTYLE, ex_style as isize);

            let insert_after = if chrome.topmost { HWND_TOPMOST } else { HWND_NOTOPMOST };
            SetWindowPos(
                hwnd,
                insert_after,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_FRAMECHANGED,
            )
            .context("SetWindowPos")?;

            let command = match chrome.state {
                WindowState::Maximized => SW_MAXIMIZE,
                WindowState::Minimized => SW_MINIMIZE,
                WindowState::Normal => SW_RESTORE,
            };
            let _ = ShowWindow(hwnd, command);
        }
        Ok(())
    }

    fn is_maximized(&self) -> anyhow::Result<bool> {
        Ok(unsafe { IsZoomed(self.hwnd()) }.as_bool())
    }

    fn set_capture_exclusion(&self, exclude: bool) -> anyhow::Result<()> {
        let hwnd = self.hwnd();
        unsafe {
            if !exclude {
                return SetWindowDisplayAffinity(hwnd, WDA_NONE).context("clear display affinity");
            }
            if let Err(e) = SetWindowDisplayAffinity(hwnd, WDA_EXCLUDEFROMCAPTURE) {
                warn!(error = %e, "capture exclusion unavailable, using monitor-only affinity");
                SetWindowDisplayAffinity(hwnd, WDA_MONITOR).context("monitor display affinity")?;
            }
        }
        Ok(())
    }

    fn set_shell_visible(&self, visible: bool) -> anyhow::Result<()> {
        let surfaces = shell_surfaces()?;
        if !surfaces.iter().any(|(_, kind)| *kind == ShellSurface::Taskbar) {
            return Err(anyhow!("taskbar window not found"));
        }
        let command = if visible { SW_SHOW } else { SW_HIDE };
        for (hwnd, kind) in surfaces {
            // flyouts only open on demand
            if visible && kind == ShellSurface::Flyout {
                continue;
            }
            unsafe {
                let _ = ShowWindow(hwnd, command);
            }
        }
        Ok(())
    }

    fn install_hooks(&self, flags: Arc<LockFlags>, events: HookSender) -> anyhow::Result<HookGuard> {
        let context = HookContext {
            flags,
            events,
            host_pid: self.host_pid,
        };

        let (ready_tx, ready_rx) = std_mpsc::channel();
        let handle = thread::Builder::new()
            .name("lockdown-hooks".to_string())
            .spawn(move || run_hook_thread(context, ready_tx))
            .context("spawn hook thread")?;

        let thread_id = match ready_rx.recv() {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => return Err(anyhow!("hook thread exited before installing hooks")),
        };

        Ok(HookGuard::new(move || {
            unsafe {
                let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            let _ = handle.join();
        }))
    }

    fn clear_clipboard(&self) -> anyhow::Result<()> {
        unsafe {
            OpenClipboard(self.hwnd()).context("OpenClipboard")?;
            let emptied = EmptyClipboard();
            let _ = CloseClipboard();
            emptied.context("EmptyClipboard")?;
        }
        Ok(())
    }

    fn accessibility_flags(&self) -> anyhow::Result<AccessibilityFlags> {
        unsafe {
            let mut sticky = KeyFeature {
                cb_size: size_of::<KeyFeature>() as u32,
                ..Default::default()
            };
            let mut toggle = sticky;
            let mut filter = FilterKeysFeature {
                cb_size: size_of::<FilterKeysFeature>() as u32,
                ..Default::default()
            };
            spi_get(SPI_GETSTICKYKEYS, &mut sticky).context("read sticky keys")?;
            spi_get(SPI_GETTOGGLEKEYS, &mut toggle).context("read toggle keys")?;
            spi_get(SPI_GETFILTERKEYS, &mut filter).context("read filter keys")?;
            Ok(AccessibilityFlags {
                sticky_keys: sticky.flags,
                toggle_keys: toggle.flags,
                filter_keys: filter.flags,
            })
        }
    }

    fn set_accessibility_flags(&self, flags: &AccessibilityFlags) -> anyhow::Result<()> {
        unsafe {
            let mut sticky = KeyFeature {
                cb_size: size_of::<KeyFeature>() as u32,
                flags: flags.sticky_keys,
            };
            let mut toggle = KeyFeature {
                cb_size: size_of::<KeyFeature>() as u32,
                flags: flags.toggle_keys,
            };
            // keep the current filter-keys timings
            let mut filter = FilterKeysFeature {
                cb_size: size_of::<FilterKeysFeature>() as u32,
                ..Default::default()
            };
            spi_get(SPI_GETFILTERKEYS, &mut filter).context("read filter keys")?;
            filter.flags = flags.filter_keys;

            spi_set(SPI_SETSTICKYKEYS, &mut sticky).context("write sticky keys")?;
            spi_set(SPI_SETTOGGLEKEYS, &mut toggle).context("write toggle keys")?;
            spi_set(SPI_SETFILTERKEYS, &mut filter).context("write filter keys")?;
        }
        Ok(())
    }

    fn focus_host(&self) -> anyhow::Result<()> {
        if unsafe { SetForegroundWindow(self.hwnd()) }.as_bool() {
            Ok(())
        } else {
            Err(anyhow!("SetForegroundWindow refused"))
        }
    }

    fn foreground_is_foreign(&self) -> anyhow::Result<bool> {
        let foreground = unsafe { GetForegroundWindow() };
        if foreground.0.is_null() {
            return Ok(false);
        }
        Ok(window_pid(foreground) != self.host_pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockdown::keyboard::VK_SNAPSHOT;

    fn context(active: bool) -> (HookContext, tokio::sync::mpsc::UnboundedReceiver<HookEvent>) {
        let (events, rx) = tokio::sync::mpsc::unbounded_channel();
        let flags = Arc::new(LockFlags::default());
        flags.set_active(active);
        (
            HookContext {
                flags,
                events,
                host_pid: 1,
            },
            rx,
        )
    }

    #[test]
    fn print_screen_is_swallowed_and_clears_the_clipboard() {
        let (ctx, mut rx) = context(true);
        assert!(handle_key(&ctx, KeyEvent::new(VK_SNAPSHOT), true));
        assert_eq!(rx.try_recv().unwrap(), HookEvent::ClipboardClearRequested);

        // key-up is swallowed without a second clear
        assert!(handle_key(&ctx, KeyEvent::new(VK_SNAPSHOT), false));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn inactive_flags_pass_keys_through() {
        let (ctx, mut rx) = context(false);
        assert!(!handle_key(&ctx, KeyEvent::new(VK_SNAPSHOT), true));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn hook_context_belongs_to_the_hook_thread() {
        let (ctx, _rx) = context(true);
        let seen = thread::spawn(move || {
            HOOK_CONTEXT.with(|cell| *cell.borrow_mut() = Some(ctx));
            with_hook_context(|ctx| ctx.host_pid)
        })
        .join()
        .unwrap();
        assert_eq!(seen, Some(1));
        assert_eq!(with_hook_context(|ctx| ctx.host_pid), None);
    }
}
