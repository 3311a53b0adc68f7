use std::fmt;

use crate::logging::LogSink;
use crate::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:04}", self.width, self.height)
    }
}

impl Resolution {
    /// Parses `1920_1080` (also `1920x1080`).
    pub fn parse(value: &str) -> Option<Self> {
        let (w, h) = value.trim().split_once(['_', 'x', 'X'])?;
        let width = w.trim().parse().ok()?;
        let height = h.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }
}

/// Distinct `WWWW_HHHH` strings, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionSet(Vec<String>);

impl ResolutionSet {
    pub fn from_resolutions<I: IntoIterator<Item = Resolution>>(items: I) -> Self {
        let mut out = Vec::<String>::new();
        for res in items {
            let key = res.to_string();
            if !out.contains(&key) {
                out.push(key);
            }
        }
        Self(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Attached-display resolutions, queried fresh on every call.
pub trait DisplayResolutionSource: Send + Sync {
    fn resolutions(&self) -> ResolutionSet;
}

/// Fixed list from configuration, used in place of display enumeration.
pub struct FixedResolutions(pub Vec<Resolution>);

impl FixedResolutions {
    pub fn parse_list(values: &[String], log: &dyn LogSink) -> Self {
        let parsed = values
            .iter()
            .filter_map(|v| {
                let res = Resolution::parse(v);
                if res.is_none() {
                    warn!(log, "[LOCKSCREEN][DISPLAY] Ignoring malformed resolution '{}'", v);
                }
                res
            })
            .collect();
        Self(parsed)
    }
}

impl DisplayResolutionSource for FixedResolutions {
    fn resolutions(&self) -> ResolutionSet {
        ResolutionSet::from_resolutions(self.0.iter().copied())
    }
}

/// Current mode of every attached monitor.
pub struct SystemDisplays;

#[cfg(windows)]
impl DisplayResolutionSource for SystemDisplays {
    fn resolutions(&self) -> ResolutionSet {
        ResolutionSet::from_resolutions(win::enumerate_display_modes())
    }
}

#[cfg(not(windows))]
impl DisplayResolutionSource for SystemDisplays {
    fn resolutions(&self) -> ResolutionSet {
        ResolutionSet::default()
    }
}

#[cfg(windows)]
mod win {
    use std::mem;

    use windows::{
        core::{BOOL, PCWSTR},
        Win32::{
            Foundation::{LPARAM, RECT},
            Graphics::Gdi::{
                EnumDisplayMonitors, EnumDisplaySettingsW, GetMonitorInfoW, DEVMODEW,
                ENUM_CURRENT_SETTINGS, HDC, HMONITOR, MONITORINFOEXW,
            },
        },
    };

    use super::Resolution;

    /// Physical pixel size of each monitor's current display mode.
    /// `rcMonitor` is DPI-virtualized, so the device mode is read instead.
    pub fn enumerate_display_modes() -> Vec<Resolution> {
        unsafe extern "system" fn enum_monitor_proc(
            monitor: HMONITOR,
            _hdc: HDC,
            _rect: *mut RECT,
            lparam: LPARAM,
        ) -> BOOL {
            let out = &mut *(lparam.0 as *mut Vec<Resolution>);

            let mut info: MONITORINFOEXW = mem::zeroed();
            info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;
            if !GetMonitorInfoW(monitor, &mut info as *mut MONITORINFOEXW as *mut _).as_bool() {
                return BOOL(1);
            }

            let mut mode: DEVMODEW = mem::zeroed();
            mode.dmSize = mem::size_of::<DEVMODEW>() as u16;
            let device = PCWSTR(info.szDevice.as_ptr());
            if EnumDisplaySettingsW(device, ENUM_CURRENT_SETTINGS, &mut mode).as_bool() {
                out.push(Resolution {
                    width: mode.dmPelsWidth,
                    height: mode.dmPelsHeight,
                });
            } else {
                let rc = info.monitorInfo.rcMonitor;
                out.push(Resolution {
                    width: (rc.right - rc.left).max(0) as u32,
                    height: (rc.bottom - rc.top).max(0) as u32,
                });
            }

            BOOL(1)
        }

        let mut modes = Vec::<Resolution>::new();
        unsafe {
            let _ = EnumDisplayMonitors(
                None,
                None,
                Some(enum_monitor_proc),
                LPARAM((&mut modes as *mut Vec<Resolution>) as isize),
            );
        }
        modes
    }
}
