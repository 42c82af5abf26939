//! Stepping profiles and stitcher requirements.
//!
//! Built-in defaults can be overlaid with TOML files, for example:
//!
//! ```toml
//! allowed-versions = ["3.1.0"]
//!
//! [steppings.B0]
//! keys = [{ name = "OEMPrivateKey", file = "b0/oem_priv.pem" }]
//! regions = [{ region = "SMIP", offset = 0x10, size = 4, value = 0x1 }]
//! ```
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum SettingsError {
    #[error("file {filename} error: {e}")]
    File { e: std::io::Error, filename: String },

    #[error("cannot parse {filename}: {e}")]
    Parse {
        e: toml::de::Error,
        filename: String,
    },

    #[error("unknown stepping '{name}' (known: {known})")]
    UnknownStepping { name: String, known: String },

    #[error("invalid {0}")]
    Invalid(String),
}
type Result<T> = core::result::Result<T, SettingsError>;

/// Stitcher versions known to produce valid images
const DEFAULT_ALLOWED_VERSIONS: &[&str] = &["3.0.4", "3.1.0"];

/// Built-in key files, relative to the key directory
const DEFAULT_KEYS: &[(&str, &[(&str, &str)])] = &[
    (
        "B0",
        &[
            ("OEMPrivateKey", "oem_b0_private.pem"),
            ("OEMPublicKey", "oem_b0_public.pem"),
        ],
    ),
    (
        "C0",
        &[
            ("OEMPrivateKey", "oem_c0_private.pem"),
            ("OEMPublicKey", "oem_c0_public.pem"),
        ],
    ),
];

/// A signing key named in the override file
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyEntry {
    /// Name of the override, as understood by the stitcher
    pub name: String,
    /// Key file, relative to the key directory
    pub file: String,
}

/// An opaque value of a vendor header region (SMIP, UMIP, FIP), passed to the
/// stitcher as is
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionField {
    /// Region name
    pub region: String,
    /// Byte offset in the region
    pub offset: u64,
    /// Size in bytes: 1, 2, 4 or 8
    pub size: u8,
    /// Value
    pub value: u64,
}

impl RegionField {
    fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(SettingsError::Invalid("empty region name".to_string()));
        }
        if ![1, 2, 4, 8].contains(&self.size) {
            return Err(SettingsError::Invalid(format!(
                "size {} for {} field at {:#x}",
                self.size, self.region, self.offset
            )));
        }
        if self.size < 8 && self.value >> (8 * self.size as u32) != 0 {
            return Err(SettingsError::Invalid(format!(
                "value {:#x} for {}-byte {} field at {:#x}",
                self.value, self.size, self.region, self.offset
            )));
        }
        Ok(())
    }
}

/// Everything that depends on the silicon revision
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SteppingProfile {
    /// Stepping identifier, uppercase
    pub name: String,
    /// Signing keys, in override file order
    pub keys: Vec<KeyEntry>,
    /// Vendor region values, in descriptor order
    pub regions: Vec<RegionField>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SteppingFile {
    keys: Option<Vec<KeyEntry>>,
    regions: Option<Vec<RegionField>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SettingsFile {
    allowed_versions: Option<Vec<String>>,
    #[serde(default)]
    steppings: BTreeMap<String, SteppingFile>,
}

/// Stitcher requirements and stepping profiles
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Versions of the stitcher that may be invoked
    pub allowed_versions: Vec<String>,
    steppings: BTreeMap<String, SteppingProfile>,
}

impl Default for Settings {
    fn default() -> Self {
        let steppings = DEFAULT_KEYS
            .iter()
            .map(|(name, keys)| {
                let profile = SteppingProfile {
                    name: name.to_string(),
                    keys: keys
                        .iter()
                        .map(|(name, file)| KeyEntry {
                            name: name.to_string(),
                            file: file.to_string(),
                        })
                        .collect(),
                    regions: vec![],
                };
                (name.to_string(), profile)
            })
            .collect();

        Settings {
            allowed_versions: DEFAULT_ALLOWED_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
            steppings,
        }
    }
}

impl Settings {
    /// Overlay the content of a TOML file. Values present in the file replace
    /// the current ones, new steppings are added.
    pub fn load_config(&mut self, filename: &Path) -> Result<()> {
        let content = fs::read_to_string(filename).map_err(|e| SettingsError::File {
            filename: filename.display().to_string(),
            e,
        })?;
        self.load_str(&content, &filename.display().to_string())?;
        log::debug!("Loaded {}", filename.display());
        Ok(())
    }

    /// Overlay TOML content. @origin names the content in errors.
    pub fn load_str(&mut self, content: &str, origin: &str) -> Result<()> {
        let file: SettingsFile = toml::from_str(content).map_err(|e| SettingsError::Parse {
            e,
            filename: origin.to_string(),
        })?;
        self.update(file)
    }

    fn update(&mut self, file: SettingsFile) -> Result<()> {
        let mut seen = BTreeSet::new();
        for name in file.steppings.keys() {
            if !seen.insert(name.to_uppercase()) {
                return Err(SettingsError::Invalid(format!(
                    "duplicate stepping '{name}'"
                )));
            }
        }

        if let Some(versions) = file.allowed_versions {
            self.allowed_versions = versions;
        }

        for (name, stepping) in file.steppings {
            for key in stepping.keys.iter().flatten() {
                if key.name.is_empty() || key.name.contains(['=', '\n']) {
                    return Err(SettingsError::Invalid(format!("key name '{}'", key.name)));
                }
            }
            for field in stepping.regions.iter().flatten() {
                field.validate()?;
            }

            let name = name.to_uppercase();
            let profile = self
                .steppings
                .entry(name.clone())
                .or_insert_with(|| SteppingProfile {
                    name,
                    ..Default::default()
                });
            if let Some(keys) = stepping.keys {
                profile.keys = keys;
            }
            if let Some(regions) = stepping.regions {
                profile.regions = regions;
            }
        }
        Ok(())
    }

    /// Return the profile of a stepping, case-insensitive
    pub fn stepping(&self, name: &str) -> Result<&SteppingProfile> {
        self.steppings
            .get(&name.to_uppercase())
            .ok_or_else(|| SettingsError::UnknownStepping {
                name: name.to_string(),
                known: self.stepping_names().collect::<Vec<_>>().join(", "),
            })
    }

    /// Known stepping identifiers
    pub fn stepping_names(&self) -> impl Iterator<Item = &str> {
        self.steppings.keys().map(|k| k.as_str())
    }

    /// True if stitcher version @version may be used
    pub fn is_version_allowed(&self, version: &str) -> bool {
        self.allowed_versions.iter().any(|v| v == version)
    }
}
