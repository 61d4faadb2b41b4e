//! Browser discovery and launch configuration.
//!
//! Launches a plain Chromium-family browser: no fingerprint masking, no
//! user-agent rotation. A persistent profile directory can be supplied so a
//! logged-in session survives restarts.

use crate::core::config::BotSettings;
use crate::core::error::{BotError, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use std::path::Path;

const WINDOW_WIDTH: u32 = 1366;
const WINDOW_HEIGHT: u32 = 900;

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. explicit override (`settings.chrome_executable`, which `CHROME_EXECUTABLE`
///    fills in)
/// 2. PATH scan
/// 3. OS-specific well-known install paths
pub fn find_chrome_executable(explicit: Option<&str>) -> Option<String> {
    if let Some(p) = explicit {
        if Path::new(p).exists() {
            return Some(p.to_string());
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build the launch config for one booking session.
///
/// `profile_suffix` keeps parallel accounts on separate profile directories.
pub fn build_launch_config(
    exe: &str,
    settings: &BotSettings,
    profile_suffix: &str,
) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
        .arg("--disable-dev-shm-usage")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio");

    if settings.headless {
        builder = builder.arg("--disable-gpu");
    } else {
        builder = builder.with_head();
    }

    if let Some(dir) = settings.profile_dir.as_ref() {
        builder = builder.user_data_dir(dir.join(sanitize_profile_name(profile_suffix)));
    }

    builder
        .build()
        .map_err(|e| BotError::Config(format!("failed to build browser config: {}", e)))
}

fn sanitize_profile_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
