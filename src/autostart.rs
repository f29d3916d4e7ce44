//! Start-at-login registration.
//!
//! Linux and other Unix desktops get an XDG autostart `.desktop` entry, macOS
//! a LaunchAgent plist, Windows a launcher script in the Startup folder. The
//! launcher changes into the working directory first so a relative `.env`
//! still resolves.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Autostart {
    name: String,
    entry_dir: PathBuf,
}

impl Autostart {
    /// Entry named `name` in this platform's autostart location.
    pub fn for_current_platform(name: &str) -> Result<Self> {
        let entry_dir = platform_dir()
            .ok_or_else(|| Error::Autostart("no autostart directory on this platform".into()))?;
        Ok(Self::with_dir(name, entry_dir))
    }

    pub fn with_dir(name: &str, entry_dir: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            entry_dir,
        }
    }

    pub fn entry_path(&self) -> PathBuf {
        self.entry_dir.join(format!("{}.{}", self.name, ENTRY_EXTENSION))
    }

    pub fn is_registered(&self) -> bool {
        self.entry_path().exists()
    }

    pub fn register(&self, exe: &Path, working_dir: &Path) -> Result<()> {
        let entry = render_entry(&self.name, exe, working_dir);
        fs::create_dir_all(&self.entry_dir).map_err(|e| {
            Error::Autostart(format!("{}: {e}", self.entry_dir.display()))
        })?;
        let path = self.entry_path();
        fs::write(&path, entry).map_err(|e| Error::Autostart(format!("{}: {e}", path.display())))?;
        info!(entry = %path.display(), "registered for autostart");
        Ok(())
    }
}

/// Registers the running executable unless an entry already exists.
/// Failures are logged and swallowed; the next start tries again.
pub fn ensure_registered(name: &str) -> bool {
    match try_ensure_registered(name) {
        Ok(()) => true,
        Err(e) => {
            warn!("{e}");
            false
        }
    }
}

fn try_ensure_registered(name: &str) -> Result<()> {
    let autostart = Autostart::for_current_platform(name)?;
    if autostart.is_registered() {
        return Ok(());
    }
    let exe = std::env::current_exe().map_err(|e| Error::Autostart(format!("current executable: {e}")))?;
    let cwd = std::env::current_dir().map_err(|e| Error::Autostart(format!("working directory: {e}")))?;
    autostart.register(&exe, &cwd)
}

#[cfg(target_os = "windows")]
const ENTRY_EXTENSION: &str = "cmd";
#[cfg(target_os = "macos")]
const ENTRY_EXTENSION: &str = "plist";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const ENTRY_EXTENSION: &str = "desktop";

#[cfg(target_os = "windows")]
fn platform_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| {
        d.join("Microsoft")
            .join("Windows")
            .join("Start Menu")
            .join("Programs")
            .join("Startup")
    })
}

#[cfg(target_os = "macos")]
fn platform_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join("Library").join("LaunchAgents"))
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("autostart"))
}

#[cfg(target_os = "windows")]
fn render_entry(_name: &str, exe: &Path, working_dir: &Path) -> String {
    format!(
        "@echo off\r\ncd /d \"{}\"\r\nstart \"\" /b \"{}\" run\r\n",
        working_dir.display(),
        exe.display()
    )
}

#[cfg(target_os = "macos")]
fn render_entry(name: &str, exe: &Path, working_dir: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{name}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
        <string>run</string>
    </array>
    <key>WorkingDirectory</key>
    <string>{}</string>
    <key>RunAtLoad</key>
    <true/>
</dict>
</plist>
"#,
        exe.display(),
        working_dir.display()
    )
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn render_entry(name: &str, exe: &Path, working_dir: &Path) -> String {
    format!(
        "[Desktop Entry]\nType=Application\nName={name}\nExec=\"{}\" run\nPath={}\nX-GNOME-Autostart-enabled=true\nNoDisplay=true\n",
        exe.display(),
        working_dir.display()
    )
}
