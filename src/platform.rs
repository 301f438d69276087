//! Platform version detection
//!
//! Only Android has version bands with enumeration quirks. Its API level is
//! read once per process and cached; every other Linux reports
//! [`ApiLevel::HOST`], which sits above all quirk bands.

use std::io::BufRead;

use once_cell::sync::OnceCell;
use tracing::debug;

#[cfg(target_os = "android")]
use crate::config::{BUILD_PROP, SDK_PROPERTY};

/// Android API level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiLevel(pub u32);

impl ApiLevel {
    /// 4.1, the oldest level handled
    pub const J: ApiLevel = ApiLevel(16);
    /// 5.0
    pub const L: ApiLevel = ApiLevel(21);
    /// 5.1
    pub const L_MR1: ApiLevel = ApiLevel(22);
    /// 8.1
    pub const O_MR1: ApiLevel = ApiLevel(27);
    /// 10
    pub const Q: ApiLevel = ApiLevel(29);
    /// Any non-Android host.
    pub const HOST: ApiLevel = ApiLevel(u32::MAX);

    /// Level from a raw reading, raised to at least [`ApiLevel::J`].
    pub fn clamped(raw: i64) -> Self {
        if raw < Self::J.0 as i64 {
            Self::J
        } else {
            ApiLevel(u32::try_from(raw).unwrap_or(u32::MAX))
        }
    }
}

static API_LEVEL: OnceCell<ApiLevel> = OnceCell::new();

/// API level of the running system, computed on first use.
pub fn api_level() -> ApiLevel {
    *API_LEVEL.get_or_init(|| {
        let level = detect();
        debug!(api_level = level.0, "Detected platform level");
        level
    })
}

#[cfg(target_os = "android")]
fn detect() -> ApiLevel {
    let raw = property_level()
        .or_else(|| {
            let file = std::fs::File::open(BUILD_PROP).ok()?;
            parse_build_prop(std::io::BufReader::new(file))
        })
        .unwrap_or(-1);
    ApiLevel::clamped(raw)
}

#[cfg(not(target_os = "android"))]
fn detect() -> ApiLevel {
    ApiLevel::HOST
}

#[cfg(target_os = "android")]
fn property_level() -> Option<i64> {
    let mut value = [0 as libc::c_char; libc::PROP_VALUE_MAX as usize];
    let key = std::ffi::CString::new(SDK_PROPERTY).ok()?;
    // SAFETY: `value` has room for PROP_VALUE_MAX bytes including the NUL.
    let len = unsafe { libc::__system_property_get(key.as_ptr(), value.as_mut_ptr()) };
    if len <= 0 {
        return None;
    }
    // SAFETY: the property API always NUL-terminates within PROP_VALUE_MAX.
    let text = unsafe { std::ffi::CStr::from_ptr(value.as_ptr()) };
    leading_int(&text.to_string_lossy()).filter(|&level| level > 0)
}

/// Find the first `ro.build.version.sdk=` line of a build.prop file and read
/// its value. Values that are not a positive integer yield `None`.
pub fn parse_build_prop<R: BufRead>(reader: R) -> Option<i64> {
    let prefix = "ro.build.version.sdk=";
    let line = reader
        .lines()
        .map_while(|line| line.ok())
        .find(|line| line.starts_with(prefix))?;
    leading_int(&line[prefix.len()..]).filter(|&level| level > 0)
}

/// Integer at the start of `text` after leading whitespace, with an optional
/// sign; trailing garbage is ignored.
fn leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}
