//! Path resolution for server data files.

use std::path::PathBuf;

/// Value of `--log-dir` that selects the per-user default location.
pub const DEFAULT_LOG_DIR_SENTINEL: &str = "default";

/// `~/.chatdock`
pub fn data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("HOME directory not found"))?;
    Ok(home.join(".chatdock"))
}

/// Resolve the `--log-dir` argument. `None` means log to stderr.
pub fn resolve_log_dir(arg: Option<&str>) -> anyhow::Result<Option<PathBuf>> {
    match arg.map(str::trim) {
        None | Some("") => Ok(None),
        Some(DEFAULT_LOG_DIR_SENTINEL) => Ok(Some(data_dir()?.join("logs"))),
        Some(path) => Ok(Some(PathBuf::from(path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_log_dir_argument() {
        assert_eq!(resolve_log_dir(None).ok(), Some(None));
        assert_eq!(resolve_log_dir(Some("  ")).ok(), Some(None));
        assert_eq!(
            resolve_log_dir(Some("/var/log/chatdock")).ok(),
            Some(Some(PathBuf::from("/var/log/chatdock")))
        );
    }
}
