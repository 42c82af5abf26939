//! Placement of the input images in the stitched blob.
//!
//! Each image occupies a whole number of sectors in the concatenated stream,
//! and is described by one OSII record of the OSIP header. This module
//! computes those records from the image files.
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::utils::*;

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum LayoutError {
    #[error("{filename}: unknown image extension '{ext}'")]
    UnknownExtension { filename: String, ext: String },

    #[error("file {filename} error: {e}")]
    File { e: std::io::Error, filename: String },
}
type Result<T> = core::result::Result<T, LayoutError>;

/// Type of image, derived from the file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageKind {
    /// `.bin`: OS image, loaded into memory and executed
    OperatingSystem,
    /// `.fv`: second-stage firmware volume
    FirmwareVolume,
    /// `.img`: raw filesystem image
    FilesystemImage,
}

impl ImageKind {
    /// Map a lowercase extension to an image kind
    pub fn from_extension(ext: &str) -> Option<ImageKind> {
        match ext {
            "bin" => Some(ImageKind::OperatingSystem),
            "fv" => Some(ImageKind::FirmwareVolume),
            "img" => Some(ImageKind::FilesystemImage),
            _ => None,
        }
    }

    /// Image kind of a file, from the text after the last '.' of its name
    pub fn from_path(path: &Path) -> Result<ImageKind> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = match name.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => String::new(),
        };
        Self::from_extension(&ext).ok_or_else(|| LayoutError::UnknownExtension {
            filename: path.display().to_string(),
            ext,
        })
    }

    /// Combine the kind with the requested signature state. Filesystem images
    /// are always unsigned.
    pub fn with_signing(self, signed: bool) -> ImageAttribute {
        match self {
            ImageKind::OperatingSystem => ImageAttribute::OperatingSystem { signed },
            ImageKind::FirmwareVolume => ImageAttribute::FirmwareVolume { signed },
            ImageKind::FilesystemImage => ImageAttribute::FilesystemImage,
        }
    }
}

/// Image kind and signature state, which together select the OSII attribute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ImageAttribute {
    #[allow(missing_docs)]
    OperatingSystem { signed: bool },
    #[allow(missing_docs)]
    FirmwareVolume { signed: bool },
    /// Never signed
    FilesystemImage,
}

impl ImageAttribute {
    /// The image kind
    pub fn kind(&self) -> ImageKind {
        match self {
            ImageAttribute::OperatingSystem { .. } => ImageKind::OperatingSystem,
            ImageAttribute::FirmwareVolume { .. } => ImageKind::FirmwareVolume,
            ImageAttribute::FilesystemImage => ImageKind::FilesystemImage,
        }
    }

    /// True if the stitcher signs this image
    pub fn signed(&self) -> bool {
        match self {
            ImageAttribute::OperatingSystem { signed }
            | ImageAttribute::FirmwareVolume { signed } => *signed,
            ImageAttribute::FilesystemImage => false,
        }
    }

    /// OSII attribute code
    pub fn code(&self) -> u8 {
        match self {
            ImageAttribute::OperatingSystem { signed: true } => osip::ATTR_SIGNED_KERNEL,
            ImageAttribute::OperatingSystem { signed: false } => osip::ATTR_UNSIGNED_KERNEL,
            ImageAttribute::FirmwareVolume { signed: true } => osip::ATTR_SIGNED_FW,
            ImageAttribute::FirmwareVolume { signed: false } => osip::ATTR_UNSIGNED_FW,
            ImageAttribute::FilesystemImage => osip::ATTR_FILESYSTEM,
        }
    }
}

/// An input image
#[derive(Clone, Debug, PartialEq)]
pub struct ImageFile {
    /// Path to the file
    pub path: PathBuf,
    /// Size in bytes
    pub len: u64,
    /// Kind, from the extension
    pub kind: ImageKind,
}

impl ImageFile {
    /// Describe an image of known size
    pub fn new(path: impl Into<PathBuf>, len: u64) -> Result<ImageFile> {
        let path = path.into();
        let kind = ImageKind::from_path(&path)?;
        Ok(ImageFile { path, len, kind })
    }

    /// Describe an image file, reading its size
    pub fn open(path: impl Into<PathBuf>) -> Result<ImageFile> {
        let path = path.into();
        let kind = ImageKind::from_path(&path)?;
        let len = fs::metadata(&path)
            .map_err(|e| LayoutError::File {
                e,
                filename: path.display().to_string(),
            })?
            .len();
        Ok(ImageFile { path, len, kind })
    }
}

/// Placement of one image in the stitched blob
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageDescriptor {
    /// Source file
    pub path: PathBuf,
    /// Kind and signature state
    #[serde(flatten)]
    pub attribute: ImageAttribute,
    /// OSII attribute code
    pub attribute_code: u8,
    /// Size of the file in sectors, rounded up
    pub sectors: u64,
    /// Size recorded in the header: one more sector for the signature of
    /// signed images
    pub reported_size: u64,
    /// First sector of the image in the concatenated stream, 1-based
    pub source_pointer: u64,
    /// Load address of OS images, zero otherwise
    pub destination_pointer: u32,
    /// Entry point of OS images, zero otherwise
    pub handoff_pointer: u32,
}

impl ImageDescriptor {
    /// Describe @image, placed after @offset sectors of the stream
    pub fn new(image: &ImageFile, signed: bool, offset: u64) -> ImageDescriptor {
        let attribute = image.kind.with_signing(signed);
        let sectors = bytes_to_sectors(image.len);
        let reported_size = if attribute.signed() {
            sectors + 1
        } else {
            sectors
        };
        let (destination_pointer, handoff_pointer) = match attribute.kind() {
            ImageKind::OperatingSystem => (osip::DDR_LOAD_ADDX, osip::ENTRY_POINT),
            _ => (0, 0),
        };

        ImageDescriptor {
            path: image.path.clone(),
            attribute,
            attribute_code: attribute.code(),
            sectors,
            reported_size,
            source_pointer: offset + 1,
            destination_pointer,
            handoff_pointer,
        }
    }

    /// True if the stitcher signs this image
    pub fn signed(&self) -> bool {
        self.attribute.signed()
    }
}

/// Placement of all images
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Layout {
    /// One descriptor per image, in input order
    pub descriptors: Vec<ImageDescriptor>,
    /// Sum of the unsigned sector counts
    pub total_sectors: u64,
}

/// Place @images one after the other.
///
/// The offset advances by the unsigned sector count of each image, even when
/// the image is signed and its reported size includes a signature sector.
pub fn compute_layout(images: &[ImageFile], signed: bool) -> Layout {
    let mut offset = 0;
    let descriptors = images
        .iter()
        .map(|image| {
            let desc = ImageDescriptor::new(image, signed, offset);
            offset += desc.sectors;
            desc
        })
        .collect();

    Layout {
        descriptors,
        total_sectors: offset,
    }
}

/// Read the size of each file and compute their layout
pub fn layout_from_paths<P: AsRef<Path>>(paths: &[P], signed: bool) -> Result<Layout> {
    let images = paths
        .iter()
        .map(|p| ImageFile::open(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let layout = compute_layout(&images, signed);
    for desc in &layout.descriptors {
        log::debug!("{desc:?}");
    }
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, len: u64) -> ImageFile {
        ImageFile::new(name, len).unwrap()
    }

    #[test]
    fn test_extensions() {
        let kind = |name: &str| ImageKind::from_path(Path::new(name));
        assert_eq!(kind("a.bin").unwrap(), ImageKind::OperatingSystem);
        assert_eq!(kind("dir.x/A.BIN").unwrap(), ImageKind::OperatingSystem);
        assert_eq!(kind("fw.1.fv").unwrap(), ImageKind::FirmwareVolume);
        assert_eq!(kind("system.img").unwrap(), ImageKind::FilesystemImage);

        assert!(matches!(
            kind("vmlinux.elf"),
            Err(LayoutError::UnknownExtension { ext, .. }) if ext == "elf"
        ));
        assert!(kind("bin").is_err());
        assert!(kind("a.bin.gz").is_err());
    }

    #[test]
    fn test_attributes() {
        use ImageKind::*;
        assert_eq!(OperatingSystem.with_signing(true).code(), 0x00);
        assert_eq!(OperatingSystem.with_signing(false).code(), 0x01);
        assert_eq!(FirmwareVolume.with_signing(true).code(), 0x08);
        assert_eq!(FirmwareVolume.with_signing(false).code(), 0x09);
        assert_eq!(FilesystemImage.with_signing(true).code(), 0x03);
        assert_eq!(FilesystemImage.with_signing(false).code(), 0x03);
        assert!(!FilesystemImage.with_signing(true).signed());
        assert_eq!(FirmwareVolume.with_signing(true).kind(), FirmwareVolume);
    }

    #[test]
    fn test_sector_counts() {
        let layout = compute_layout(
            &[image("a.fv", 512), image("b.fv", 513), image("c.fv", 0)],
            false,
        );
        let sectors: Vec<u64> = layout.descriptors.iter().map(|d| d.sectors).collect();
        assert_eq!(sectors, [1, 2, 0]);
        assert_eq!(layout.total_sectors, 3);
        // An empty image doesn't move the next one
        assert_eq!(layout.descriptors[2].source_pointer, 4);
    }

    #[test]
    fn test_filesystem_never_signed() {
        let layout = compute_layout(&[image("a.img", 1000)], true);
        let desc = &layout.descriptors[0];
        assert!(!desc.signed());
        assert_eq!(desc.sectors, 2);
        assert_eq!(desc.reported_size, 2);
        assert_eq!(desc.attribute_code, osip::ATTR_FILESYSTEM);
    }

    #[test]
    fn test_pointers() {
        let layout = compute_layout(&[image("os.bin", 10), image("fw.fv", 10)], false);
        let os = &layout.descriptors[0];
        assert_eq!(os.destination_pointer, 0x01100000);
        assert_eq!(os.handoff_pointer, 0x01101000);
        let fw = &layout.descriptors[1];
        assert_eq!(fw.destination_pointer, 0);
        assert_eq!(fw.handoff_pointer, 0);
    }

    #[test]
    fn test_offsets() {
        let layout = compute_layout(
            &[image("a.bin", 512), image("b.bin", 1024), image("c.bin", 1)],
            true,
        );
        let sources: Vec<u64> = layout
            .descriptors
            .iter()
            .map(|d| d.source_pointer)
            .collect();
        // The signature sector is not accounted in the offset
        assert_eq!(sources, [1, 2, 4]);
        assert_eq!(layout.total_sectors, 4);

        let sizes: Vec<u64> = layout
            .descriptors
            .iter()
            .map(|d| d.reported_size)
            .collect();
        assert_eq!(sizes, [2, 3, 2]);
    }

    #[test]
    fn test_signed_os_and_firmware() {
        let layout = compute_layout(&[image("a.bin", 1000), image("b.fv", 100)], true);

        let a = &layout.descriptors[0];
        assert_eq!(a.sectors, 2);
        assert!(a.signed());
        assert_eq!(a.reported_size, 3);
        assert_eq!(a.source_pointer, 1);
        assert_eq!(a.destination_pointer, 0x01100000);
        assert_eq!(a.attribute_code, osip::ATTR_SIGNED_KERNEL);

        let b = &layout.descriptors[1];
        assert_eq!(b.sectors, 1);
        assert!(b.signed());
        assert_eq!(b.reported_size, 2);
        assert_eq!(b.source_pointer, 3);
        assert_eq!(b.attribute_code, osip::ATTR_SIGNED_FW);

        assert_eq!(layout.total_sectors, 3);
    }

    #[test]
    fn test_empty() {
        let layout = compute_layout(&[], true);
        assert!(layout.descriptors.is_empty());
        assert_eq!(layout.total_sectors, 0);
    }

    #[test]
    fn test_json() {
        let layout = compute_layout(&[image("a.img", 1)], false);
        let json = serde_json::to_value(&layout).unwrap();
        let desc = &json["descriptors"][0];
        assert_eq!(desc["kind"], "filesystem-image");
        assert_eq!(desc["attribute_code"], 3);
        assert_eq!(desc["source_pointer"], 1);
        assert_eq!(json["total_sectors"], 1);
    }
}
