use anyhow::Result;
use std::path::PathBuf;
use tokio::process::Command;

/// Environment variable that points directly at an Appium executable
pub const APPIUM_BINARY_ENV: &str = "APPIUM_BINARY";

/// Find the Appium executable.
///
/// Order: `APPIUM_BINARY`, system PATH, then the global npm prefixes under
/// the home directory.
pub fn find_appium() -> Result<PathBuf> {
    let names: &[&str] = if cfg!(windows) {
        &["appium.cmd", "appium.exe", "appium"]
    } else {
        &["appium"]
    };
    find_binary(names)
}

/// Find one of `names`, trying the explicit override first
pub fn find_binary(names: &[&str]) -> Result<PathBuf> {
    let mut checked_paths = Vec::new();

    if let Ok(explicit) = std::env::var(APPIUM_BINARY_ENV) {
        let path = PathBuf::from(&explicit);
        checked_paths.push(format!("{}: {:?}", APPIUM_BINARY_ENV, path));
        if path.exists() {
            return Ok(path);
        }
    }

    for name in names {
        checked_paths.push(format!("System PATH: {}", name));
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    let (installed, mut install_paths) = find_installed_binary(names);
    checked_paths.append(&mut install_paths);
    if let Some(path) = installed {
        return Ok(path);
    }

    Err(anyhow::anyhow!(
        "Could not find Appium binary. Install it with `npm install -g appium` or set {}. Checked paths:\n{}",
        APPIUM_BINARY_ENV,
        checked_paths.join("\n")
    ))
}

/// Look in the usual npm global prefixes under the home directory
fn find_installed_binary(names: &[&str]) -> (Option<PathBuf>, Vec<String>) {
    let mut checked_paths = Vec::new();

    let Some(home) = dirs::home_dir() else {
        checked_paths.push("Failed to get home directory".to_string());
        return (None, checked_paths);
    };

    let prefixes = [
        home.join(".appium").join("node_modules").join(".bin"),
        home.join(".npm-global").join("bin"),
        home.join(".local").join("bin"),
    ];

    for prefix in &prefixes {
        for name in names {
            let candidate = prefix.join(name);
            checked_paths.push(format!("Install Dir: {:?}", candidate));
            if candidate.exists() {
                return (Some(candidate), checked_paths);
            }
        }
    }

    (None, checked_paths)
}

/// Create a Command for the resolved Appium binary
pub fn appium_command() -> Result<Command> {
    let path = find_appium()?;
    Ok(Command::new(path))
}
