//! Platform-specific privilege and process helpers.

/// Whether the current process already runs with administrator rights.
///
/// On Windows this asks shell32 directly; elsewhere it checks for an
/// effective uid of 0.
#[cfg(windows)]
pub fn is_elevated() -> bool {
    #[link(name = "shell32")]
    extern "system" {
        fn IsUserAnAdmin() -> i32;
    }
    unsafe { IsUserAnAdmin() != 0 }
}

#[cfg(not(windows))]
pub fn is_elevated() -> bool {
    std::process::Command::new("id")
        .arg("-u")
        .output()
        .ok()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim() == "0")
        .unwrap_or(false)
}

/// Whether non-interactive consent is currently available for running a
/// command at elevated privilege. On Unix this means cached sudo
/// credentials; there is no prompting from inside the engine.
#[cfg(not(windows))]
pub fn consent_available() -> bool {
    std::process::Command::new("sudo")
        .args(["-n", "true"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// On Windows, UAC consent cannot be obtained non-interactively from an
/// unelevated host, and an elevated child cannot be attached to the
/// host's pseudo console. Consent is only "available" when the host
/// itself is already elevated.
#[cfg(windows)]
pub fn consent_available() -> bool {
    is_elevated()
}

/// Best-effort force kill of a process and its descendants. Used after
/// the grace period when a child ignored the initial kill signal.
#[cfg(windows)]
pub fn kill_process_tree(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
}

#[cfg(not(windows))]
pub fn kill_process_tree(pid: u32) {
    let _ = std::process::Command::new("kill")
        .args(["-KILL", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
}
