//! The external stitching executable.
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum StitcherError {
    #[error("cannot run {tool}: {e}")]
    Spawn { e: std::io::Error, tool: String },

    #[error("{tool} -V: unexpected output '{output}'")]
    BadVersionOutput { tool: String, output: String },

    #[error("unsupported stitcher version {version} (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    #[error("{tool} failed: {status}")]
    Failed { tool: String, status: ExitStatus },
}
type Result<T> = core::result::Result<T, StitcherError>;

/// Extract the version from the output of `-V`: the second word, as in
/// "FSTK 3.1.0"
pub fn parse_version(output: &str) -> Option<&str> {
    output.split_whitespace().nth(1)
}

/// A stitcher executable
#[derive(Clone, Debug)]
pub struct Stitcher {
    path: PathBuf,
}

impl Stitcher {
    /// Use the executable at @path
    pub fn new(path: impl Into<PathBuf>) -> Stitcher {
        Stitcher { path: path.into() }
    }

    /// Path to the executable
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tool(&self) -> String {
        self.path.display().to_string()
    }

    /// Query the version of the stitcher
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.path)
            .arg("-V")
            .output()
            .map_err(|e| StitcherError::Spawn { e, tool: self.tool() })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        log::debug!("{} -V: {} {}", self.tool(), output.status, stdout.trim());
        if !output.status.success() {
            return Err(StitcherError::Failed {
                tool: format!("{} -V", self.tool()),
                status: output.status,
            });
        }

        parse_version(&stdout)
            .map(str::to_string)
            .ok_or_else(|| StitcherError::BadVersionOutput {
                tool: self.tool(),
                output: stdout.trim().to_string(),
            })
    }

    /// Run the stitcher on the given artifacts
    pub fn stitch(&self, stitch_config: &Path, platform: &Path, key_override: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("-l")
            .arg(stitch_config)
            .arg("-k")
            .arg(platform)
            .arg("-o")
            .arg(key_override);
        log::debug!("Running {cmd:?}");

        let status = cmd
            .status()
            .map_err(|e| StitcherError::Spawn { e, tool: self.tool() })?;
        if !status.success() {
            return Err(StitcherError::Failed {
                tool: self.tool(),
                status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("FSTK 3.1.0\n"), Some("3.1.0"));
        assert_eq!(parse_version("  fstk\t3.0.4 (build 12)"), Some("3.0.4"));
        assert_eq!(parse_version("FSTK"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_missing_tool() {
        let stitcher = Stitcher::new("/nonexistent/fstk");
        assert!(matches!(stitcher.version(), Err(StitcherError::Spawn { .. })));
        assert!(matches!(
            stitcher.stitch(Path::new("a"), Path::new("b"), Path::new("c")),
            Err(StitcherError::Spawn { .. })
        ));
    }
}
