// ABOUTME: Stable machine identifier used as one KDF input for the deployment's symmetric key
// ABOUTME: Prefers the OS-provided id, falls back to a hash of hostname + primary MAC when unavailable

use sha2::{Digest, Sha256};

/// Paths the major Linux distributions use for a stable, install-scoped id.
const LINUX_MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Return a stable identifier for the host this process is running on.
///
/// Tries, in order: the Linux `/etc/machine-id`/`dbus` files, macOS's
/// `IOPlatformUUID` (via `ioreg`), and the Windows `MachineGuid` registry
/// value — each generated once at install time and persisted across
/// reboots. When none is readable — containers without the file
/// bind-mounted, a sandboxed host, a probe binary missing from `$PATH` —
/// fall back to a hash of the hostname and the primary network interface's
/// MAC address. The fallback is weaker (two containers sharing both a
/// hostname and a virtual MAC would derive the same key material) but
/// never fails, which matters because this id feeds key derivation at
/// startup.
#[must_use]
pub fn stable_machine_id() -> String {
    for path in LINUX_MACHINE_ID_PATHS {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    if let Some(uuid) = macos_platform_uuid() {
        return uuid;
    }

    if let Some(guid) = windows_machine_guid() {
        return guid;
    }

    hostname_and_mac_fallback()
}

/// Read `IOPlatformUUID` via `ioreg`, the same facility Apple's own
/// `system_profiler`/`diskutil` tooling reads it from. A no-op (returns
/// `None`) on every other platform or if the probe binary isn't present.
#[cfg(target_os = "macos")]
fn macos_platform_uuid() -> Option<String> {
    let output = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines().find_map(|line| {
        let (_, value) = line.split_once("IOPlatformUUID")?;
        let uuid = value.trim().trim_matches(|c| c == '=' || c == ' ' || c == '"');
        (!uuid.is_empty()).then(|| uuid.to_string())
    })
}

#[cfg(not(target_os = "macos"))]
const fn macos_platform_uuid() -> Option<String> {
    None
}

/// Read `HKLM\SOFTWARE\Microsoft\Cryptography\MachineGuid` via the `reg`
/// console tool, generated once by Windows setup and stable for the life
/// of the install.
#[cfg(target_os = "windows")]
fn windows_machine_guid() -> Option<String> {
    let output = std::process::Command::new("reg")
        .args(["query", r"HKLM\SOFTWARE\Microsoft\Cryptography", "/v", "MachineGuid"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        if fields.next()? != "MachineGuid" {
            return None;
        }
        fields.next()?; // REG_SZ
        let guid = fields.next()?;
        (!guid.is_empty()).then(|| guid.to_string())
    })
}

#[cfg(not(target_os = "windows"))]
const fn windows_machine_guid() -> Option<String> {
    None
}

/// The primary network interface's MAC address, formatted as lowercase hex
/// pairs joined by `:`. `None` if the host has no such interface (loopback
/// only) or the lookup fails.
fn primary_mac_address() -> Option<String> {
    mac_address::get_mac_address().ok().flatten().map(|mac| mac.to_string())
}

fn hostname_and_mac_fallback() -> String {
    let hostname = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-host".to_string());
    let mac = primary_mac_address().unwrap_or_else(|| "no-mac-address".to_string());

    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(b"|");
    hasher.update(mac.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_machine_id_is_deterministic_within_a_process() {
        assert_eq!(stable_machine_id(), stable_machine_id());
    }

    #[test]
    fn hostname_and_mac_fallback_is_deterministic_and_nonempty() {
        let a = hostname_and_mac_fallback();
        let b = hostname_and_mac_fallback();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn fallback_differs_when_hostname_differs() {
        std::env::set_var("HOSTNAME", "host-one");
        let a = hostname_and_mac_fallback();
        std::env::set_var("HOSTNAME", "host-two");
        let b = hostname_and_mac_fallback();
        assert_ne!(a, b);
        std::env::remove_var("HOSTNAME");
    }
}
