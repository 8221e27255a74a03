use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

const APPLICATION: &str = "burnbox";

/// Per-user application data location, e.g. `~/.local/share/burnbox` on Linux.
///
/// Only consulted when no data directory was configured. Nothing is created here.
pub fn platform_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APPLICATION)
        .map(|project| project.data_dir().to_path_buf())
        .context("no home directory to place application data under")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_dir_is_named_after_the_application() {
        // Environments without a home directory legitimately yield an error.
        if let Ok(dir) = platform_data_dir() {
            assert!(dir.ends_with(APPLICATION));
        }
    }
}
