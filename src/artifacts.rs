//! Stitcher configuration and key override files, and the temporary files
//! holding the three artifacts of one invocation.
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};

use crate::layout::Layout;
use crate::settings::SteppingProfile;
use crate::utils::*;

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum ArtifactError {
    #[error("file {filename} error: {e}")]
    File { e: std::io::Error, filename: String },

    #[error("format: {0}")]
    Format(#[from] std::fmt::Error),
}
type Result<T> = core::result::Result<T, ArtifactError>;

/// Render the stitcher configuration given with `-l`
pub fn render_stitch_config(
    profile: &SteppingProfile,
    layout: &Layout,
    platform: &Path,
    output: &Path,
    signed: bool,
) -> Result<String> {
    let mut out = String::new();

    writeln!(out, "[PlatformInfo]")?;
    writeln!(out, "Stepping = {}", profile.name)?;
    writeln!(out, "PlatformDescriptor = {}", platform.display())?;
    writeln!(out)?;
    writeln!(out, "[Output]")?;
    writeln!(out, "File = {}", output.display())?;
    writeln!(out, "Signed = {signed}")?;
    writeln!(out, "SectorSize = {SECTOR_SIZE}")?;
    writeln!(out, "TotalSectors = {}", layout.total_sectors)?;
    writeln!(out, "ImageCount = {}", layout.descriptors.len())?;

    for (index, desc) in layout.descriptors.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "[Image{index}]")?;
        writeln!(out, "File = {}", desc.path.display())?;
        writeln!(out, "Attribute = {:#04x}", desc.attribute_code)?;
        writeln!(out, "Signed = {}", desc.signed())?;
        writeln!(out, "SourceSector = {}", desc.source_pointer)?;
        writeln!(out, "Sectors = {}", desc.reported_size)?;
    }
    Ok(out)
}

/// Render the key override file given with `-o`: one `Name=path` line per
/// key of the stepping.
pub fn render_key_override(profile: &SteppingProfile, keydir: &Path) -> Result<String> {
    let mut out = String::new();
    for key in &profile.keys {
        writeln!(out, "{}={}", key.name, keydir.join(&key.file).display())?;
    }
    Ok(out)
}

/// Key files of the stepping that don't exist in @keydir
pub fn missing_keys(profile: &SteppingProfile, keydir: &Path) -> Vec<PathBuf> {
    profile
        .keys
        .iter()
        .map(|key| keydir.join(&key.file))
        .filter(|path| !is_regular_file(path))
        .collect()
}

/// The generated files, created with unique names in the temporary
/// directory. They are removed when this is dropped, unless kept.
#[derive(Debug)]
pub struct Artifacts {
    stitch_config: NamedTempFile,
    platform: NamedTempFile,
    key_override: NamedTempFile,
}

fn create(tmpdir: &Path, suffix: &str) -> Result<NamedTempFile> {
    Builder::new()
        .prefix("fstk-")
        .suffix(suffix)
        .tempfile_in(tmpdir)
        .map_err(|e| ArtifactError::File {
            e,
            filename: tmpdir.display().to_string(),
        })
}

fn write_file(file: &mut NamedTempFile, content: &str) -> Result<()> {
    file.write_all(content.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| ArtifactError::File {
            e,
            filename: file.path().display().to_string(),
        })?;
    log::debug!("Wrote {}", file.path().display());
    Ok(())
}

impl Artifacts {
    /// Create the three empty files in @tmpdir
    pub fn new(tmpdir: &Path) -> Result<Artifacts> {
        Ok(Artifacts {
            stitch_config: create(tmpdir, "-stitch.cfg")?,
            platform: create(tmpdir, "-platform.xml")?,
            key_override: create(tmpdir, "-override.txt")?,
        })
    }

    /// Stitcher configuration
    pub fn stitch_config(&self) -> &Path {
        self.stitch_config.path()
    }

    /// Platform descriptor
    pub fn platform(&self) -> &Path {
        self.platform.path()
    }

    /// Key override
    pub fn key_override(&self) -> &Path {
        self.key_override.path()
    }

    /// Write the content of the three artifacts
    pub fn write(&mut self, stitch_config: &str, platform: &str, key_override: &str) -> Result<()> {
        write_file(&mut self.stitch_config, stitch_config)?;
        write_file(&mut self.platform, platform)?;
        write_file(&mut self.key_override, key_override)?;
        Ok(())
    }

    /// Leave the files on disk and return their paths
    pub fn keep(self) -> Result<Vec<PathBuf>> {
        [self.stitch_config, self.platform, self.key_override]
            .into_iter()
            .map(|file| {
                let (_, path) = file.keep().map_err(|e| ArtifactError::File {
                    filename: e.file.path().display().to_string(),
                    e: e.error,
                })?;
                Ok(path)
            })
            .collect()
    }
}
