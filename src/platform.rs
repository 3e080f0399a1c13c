//! Host platform detection.
//!
//! The platform is detected once at startup and carried read-only in
//! [`Settings`](crate::config::Settings). Classification itself is the pure
//! function [`classify`]; [`detect`] only gathers the host facts it needs.

use std::fs;

use camino::Utf8Path;
use strum::Display;

/// Path of the distribution identification file on Linux hosts.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

const DEBIAN_IDS: &[&str] = &["ubuntu", "debian"];
const REDHAT_IDS: &[&str] = &["fedora", "rhel", "centos"];

/// Operating system family used to select package names and install commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    /// Darwin kernel
    MacOs,
    /// Ubuntu, Debian
    Debian,
    /// Fedora, RHEL, CentOS
    RedHat,
    /// Anything else
    Unknown,
}

impl Platform {
    /// Returns true for every platform except [`Platform::Unknown`].
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Extracts the `ID=` value from os-release content.
///
/// Surrounding single or double quotes are removed and the value is
/// lowercased. Returns `None` when no non-empty `ID` line exists.
pub fn os_release_id(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix("ID=")?;
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_ascii_lowercase())
    })
}

/// Classifies a host from its kernel name and optional os-release content.
pub fn classify(kernel_name: &str, os_release: Option<&str>) -> Platform {
    if kernel_name.contains("Darwin") {
        return Platform::MacOs;
    }

    let Some(id) = os_release.and_then(os_release_id) else {
        return Platform::Unknown;
    };

    if DEBIAN_IDS.contains(&id.as_str()) {
        Platform::Debian
    } else if REDHAT_IDS.contains(&id.as_str()) {
        Platform::RedHat
    } else {
        Platform::Unknown
    }
}

/// Returns the kernel name reported by `uname(2)`.
pub fn kernel_name() -> String {
    rustix::system::uname()
        .sysname()
        .to_string_lossy()
        .into_owned()
}

/// Detects the host platform using the given os-release path.
///
/// An unreadable or missing os-release file is treated as absent.
pub fn detect_with(os_release_path: &Utf8Path) -> Platform {
    let kernel = kernel_name();
    let os_release = match fs::read_to_string(os_release_path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::debug!("os-release not readable at {}: {}", os_release_path, e);
            None
        }
    };
    let platform = classify(&kernel, os_release.as_deref());
    tracing::debug!(kernel = %kernel, platform = %platform, "detected platform");
    platform
}

/// Detects the host platform.
pub fn detect() -> Platform {
    detect_with(Utf8Path::new(OS_RELEASE_PATH))
}
