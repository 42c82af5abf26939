//! One stitching invocation: validate the inputs, check the stitcher, compute
//! the layout, generate the artifacts and run the stitcher.
use std::fs;
use std::path::PathBuf;

use crate::artifacts::*;
use crate::command_line::StitchArgs;
use crate::layout::{layout_from_paths, Layout, LayoutError};
use crate::platform::{osip_header, render_platform, PlatformError};
use crate::settings::{Settings, SettingsError};
use crate::stitcher::{Stitcher, StitcherError};
use crate::utils::*;

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum StitchError {
    #[error("{0}")]
    Input(String),

    #[error("config: {0}")]
    Settings(#[from] SettingsError),

    #[error("layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("platform descriptor: {0}")]
    Platform(#[from] PlatformError),

    #[error("{0}")]
    Artifact(#[from] ArtifactError),

    #[error("{0}")]
    Version(StitcherError),

    #[error("{0}")]
    Invocation(StitcherError),

    #[error("file {filename} error: {e}")]
    File { e: std::io::Error, filename: String },

    #[error("cannot encode layout: {0}")]
    Json(#[from] serde_json::Error),
}
type Result<T> = core::result::Result<T, StitchError>;

impl StitchError {
    /// Process exit status for this error: 2 when the stitcher itself failed,
    /// 1 for everything detected before running it.
    pub fn exit_code(&self) -> i32 {
        match self {
            StitchError::Invocation(_) => 2,
            _ => 1,
        }
    }
}

/// A validated stitch request
#[derive(Debug)]
pub struct StitchJob {
    settings: Settings,
    stepping: String,
    tmpdir: PathBuf,
    signed: bool,
    keydir: PathBuf,
    output: PathBuf,
    stitcher: Stitcher,
    images: Vec<PathBuf>,
    layout_json: Option<PathBuf>,
    keep_temps: bool,
}

impl StitchJob {
    /// Create a job from command-line arguments, loading the config files and
    /// checking that all inputs exist
    pub fn from_args(args: &StitchArgs) -> Result<StitchJob> {
        let mut settings = Settings::default();
        for filename in &args.config {
            settings.load_config(filename)?;
        }

        let job = StitchJob {
            settings,
            stepping: args.stepping.clone(),
            tmpdir: args.tmpdir.clone(),
            signed: args.signed,
            keydir: args.keydir.clone(),
            output: args.output.clone(),
            stitcher: Stitcher::new(&args.fstk),
            images: args.images.clone(),
            layout_json: args.layout_json.clone(),
            keep_temps: args.keep_temps,
        };
        job.validate()?;
        Ok(job)
    }

    fn validate(&self) -> Result<()> {
        self.settings.stepping(&self.stepping)?;

        if !is_directory(&self.keydir) {
            return Err(StitchError::Input(format!(
                "key directory {} does not exist",
                self.keydir.display()
            )));
        }
        if !is_directory(&self.tmpdir) {
            return Err(StitchError::Input(format!(
                "temporary directory {} does not exist",
                self.tmpdir.display()
            )));
        }
        if !is_regular_file(self.stitcher.path()) {
            return Err(StitchError::Input(format!(
                "stitcher {} does not exist",
                self.stitcher.path().display()
            )));
        }
        if self.images.is_empty() {
            return Err(StitchError::Input("no image to stitch".to_string()));
        }
        for image in &self.images {
            if !is_regular_file(image) {
                return Err(StitchError::Input(format!(
                    "image file {} does not exist",
                    image.display()
                )));
            }
        }
        Ok(())
    }

    /// Compute the layout of the images
    pub fn layout(&self) -> Result<Layout> {
        let layout = layout_from_paths(&self.images, self.signed)?;

        if let Err(e) = osip_header(&layout)?.verify_sizes() {
            log::warn!("{e}");
        }
        Ok(layout)
    }

    fn write_layout_json(&self, layout: &Layout) -> Result<()> {
        let Some(filename) = &self.layout_json else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(layout)?;
        fs::write(filename, json).map_err(|e| StitchError::File {
            e,
            filename: filename.display().to_string(),
        })
    }

    /// Query the stitcher version and check that it is allowed
    fn check_version(&self) -> Result<String> {
        let version = self.stitcher.version().map_err(StitchError::Version)?;
        if !self.settings.is_version_allowed(&version) {
            return Err(StitchError::Version(StitcherError::UnsupportedVersion {
                version,
                supported: self.settings.allowed_versions.join(", "),
            }));
        }
        log::info!(
            "Using {} version {version}",
            self.stitcher.path().display()
        );
        Ok(version)
    }

    /// Check the stitcher, generate the artifacts and run the stitcher.
    /// Return the layout of the stitched images.
    pub fn run(&self) -> Result<Layout> {
        self.check_version()?;

        let profile = self.settings.stepping(&self.stepping)?;
        let layout = self.layout()?;

        if self.signed {
            for key in missing_keys(profile, &self.keydir) {
                log::warn!("missing key file {}", key.display());
            }
        }

        let mut artifacts = Artifacts::new(&self.tmpdir)?;
        let stitch_config = render_stitch_config(
            profile,
            &layout,
            artifacts.platform(),
            &self.output,
            self.signed,
        )?;
        let platform = render_platform(profile, &layout, self.signed)?;
        let key_override = render_key_override(profile, &self.keydir)?;
        artifacts.write(&stitch_config, &platform, &key_override)?;

        let status = self.stitcher.stitch(
            artifacts.stitch_config(),
            artifacts.platform(),
            artifacts.key_override(),
        );
        if self.keep_temps {
            for path in artifacts.keep()? {
                log::info!("Kept {}", path.display());
            }
        }
        status.map_err(StitchError::Invocation)?;

        self.write_layout_json(&layout)?;
        log::info!(
            "Stitched {} images ({} sectors) into {}",
            layout.descriptors.len(),
            layout.total_sectors,
            self.output.display()
        );
        Ok(layout)
    }
}
