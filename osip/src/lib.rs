//! Structures and values of the OS Image Profile
//!
//! A stitched firmware blob starts with one 512-byte block holding the OS
//! Image Profile (OSIP) header, followed by the image payloads. The header
//! describes up to eight images with OS Image Identifier (OSII) records: where
//! the image starts in the blob, how large it is, where the boot ROM loads it
//! and what kind of image it is.
//!
//! This library provides the structure definitions, their little-endian
//! encoding and the checks the boot flow applies to them.
#![warn(missing_docs)]
use core::mem;

use serde::{Deserialize, Serialize};

/// Header signature, `$OS$`
pub const OSIP_SIG: u32 = 0x24534f24;
/// Maximum number of OSII records in one header
pub const MAX_OSIP_DESC: usize = 8;
/// Size of a logical block, the unit of start blocks and image sizes
pub const LBA_SIZE: u64 = 512;

/// Size in bytes of the fixed part of the header, before the records
pub const OSIP_FIXED_SIZE: usize = 0x20;
/// Size in bytes of one OSII record
pub const OSII_SIZE: usize = 0x18;
/// Size in bytes of the encoded header, including all record slots
pub const OSIP_HEADER_SIZE: usize = OSIP_FIXED_SIZE + MAX_OSIP_DESC * OSII_SIZE;

/// Default load address of OS images
pub const DDR_LOAD_ADDX: u32 = 0x01100000;
/// Default entry point of OS images
pub const ENTRY_POINT: u32 = 0x01101000;

/// Signed kernel
pub const ATTR_SIGNED_KERNEL: u8 = 0;
/// Unsigned kernel
pub const ATTR_UNSIGNED_KERNEL: u8 = 1;
/// Filesystem image, never signed
pub const ATTR_FILESYSTEM: u8 = 3;
/// Signed splash screen
pub const ATTR_SIGNED_SPLASHSCREEN: u8 = 0x04;
/// Signed firmware
pub const ATTR_SIGNED_FW: u8 = 8;
/// Unsigned firmware
pub const ATTR_UNSIGNED_FW: u8 = 9;
/// Signed charging OS
pub const ATTR_SIGNED_COS: u8 = 0x0a;
/// Signed recovery OS
pub const ATTR_SIGNED_ROS: u8 = 0x0c;
/// Signed provisioning OS
pub const ATTR_SIGNED_POS: u8 = 0x0e;
/// Signed combined OS
pub const ATTR_SIGNED_COMB: u8 = 0x10;
/// Signed RAM dump OS
pub const ATTR_SIGNED_RAMDUMPOS: u8 = 0x16;
/// Record slot not in use
pub const ATTR_NOTUSED: u8 = 0xff;

/// Maximum size of a firmware image, in blocks
pub const FW_MAX_LBA: u32 = 2000;
/// Maximum size of an OS image, in blocks
pub const OS_MAX_LBA: u32 = 32000;

/// Error from the OSIP library
#[derive(Debug, thiserror::Error)]
pub enum OsipError {
    /// Error while encoding or decoding
    #[error("encoding error")]
    EncodeError(#[from] bincode::Error),

    /// More records than header slots
    #[error("too many OSII records: {0} (max 8)")]
    TooManyRecords(usize),

    /// Input shorter than a header
    #[error("truncated OSIP header: {0} bytes")]
    Truncated(usize),

    /// Wrong header signature
    #[error("bad OSIP signature {0:#010x}")]
    BadSignature(u32),

    /// Header checksum mismatch
    #[error("bad OSIP checksum {found:#04x}, expected {expected:#04x}")]
    BadChecksum {
        /// Checksum stored in the header
        found: u8,
        /// Checksum computed from the content
        expected: u8,
    },

    /// Image exceeds the slot reserved for its attribute
    #[error("image {index} (attribute {attribute:#04x}) is {size} blocks, max {max}")]
    ImageTooLarge {
        /// Record index
        index: usize,
        /// Record attribute
        attribute: u8,
        /// Image size in blocks
        size: u32,
        /// Limit for this attribute
        max: u32,
    },
}
type Result<T> = core::result::Result<T, OsipError>;

/// Return a readable name for an attribute code
pub fn attribute_name(attribute: u8) -> &'static str {
    match attribute {
        ATTR_SIGNED_KERNEL => "signed kernel",
        ATTR_UNSIGNED_KERNEL => "unsigned kernel",
        ATTR_FILESYSTEM => "filesystem",
        ATTR_SIGNED_SPLASHSCREEN => "signed splash screen",
        ATTR_SIGNED_FW => "signed firmware",
        ATTR_UNSIGNED_FW => "unsigned firmware",
        ATTR_SIGNED_COS => "signed COS",
        ATTR_SIGNED_ROS => "signed ROS",
        ATTR_SIGNED_POS => "signed POS",
        ATTR_SIGNED_COMB => "signed combined OS",
        ATTR_SIGNED_RAMDUMPOS => "signed RAM dump OS",
        ATTR_NOTUSED => "not used",
        _ => "unknown",
    }
}

/// Size limit in blocks for images with this attribute, if any
pub fn max_size_lba(attribute: u8) -> Option<u32> {
    match attribute & !1 {
        ATTR_SIGNED_FW => Some(FW_MAX_LBA),
        ATTR_SIGNED_KERNEL | ATTR_SIGNED_COS | ATTR_SIGNED_POS | ATTR_SIGNED_ROS
        | ATTR_SIGNED_COMB | ATTR_SIGNED_RAMDUMPOS => Some(OS_MAX_LBA),
        // Don't care about other image types
        _ => None,
    }
}

/// OS Image Identifier: one image of the stitched blob
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[repr(C)]
pub struct Osii {
    /// Image minor revision
    pub os_rev_minor: u16,
    /// Image major revision
    pub os_rev_major: u16,
    /// First block of the image in the blob
    pub logical_start_block: u32,
    /// Load address, zero for images that aren't loaded into memory
    pub ddr_load_address: u32,
    /// Handoff address, zero for images that aren't executed
    pub entry_point: u32,
    /// Size of the image in blocks
    pub size_of_os_image: u32,
    /// Image type and signature state
    pub attribute: u8,
    reserved: [u8; 3],
}

impl Osii {
    /// Create a new record
    pub fn new(
        logical_start_block: u32,
        ddr_load_address: u32,
        entry_point: u32,
        size_of_os_image: u32,
        attribute: u8,
    ) -> Osii {
        Osii {
            logical_start_block,
            ddr_load_address,
            entry_point,
            size_of_os_image,
            attribute,
            ..Default::default()
        }
    }
}

/// One value of the encoded header, located by its byte offset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OsipField {
    /// Field name. Record fields are prefixed with `osii[N].`
    pub name: String,
    /// Byte offset from the start of the header
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
    /// Value, little-endian in the encoding
    pub value: u64,
}

/// OS Image Profile header
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[repr(C)]
pub struct OsipHeader {
    /// [OSIP_SIG]
    pub sig: u32,
    intel_reserved: u8,
    /// Header minor revision
    pub header_rev_minor: u8,
    /// Header major revision
    pub header_rev_major: u8,
    /// XOR of all header bytes
    pub header_checksum: u8,
    /// Number of records in use
    pub num_pointers: u8,
    /// Number of images
    pub num_images: u8,
    /// Size in bytes of the fixed part and the records in use
    pub header_size: u16,
    reserved: [u32; 5],
    /// Record slots. Only the first `num_pointers` are meaningful.
    pub desc: [Osii; MAX_OSIP_DESC],
}

impl OsipHeader {
    /// Create a header describing the given records, with a valid checksum
    pub fn new(records: &[Osii]) -> Result<OsipHeader> {
        if records.len() > MAX_OSIP_DESC {
            return Err(OsipError::TooManyRecords(records.len()));
        }
        let num = records.len() as u8;

        let mut osip = OsipHeader {
            sig: OSIP_SIG,
            header_rev_minor: 0,
            header_rev_major: 1,
            num_pointers: num,
            num_images: num,
            header_size: (records.len() * OSII_SIZE + OSIP_FIXED_SIZE) as u16,
            ..Default::default()
        };
        osip.desc[..records.len()].copy_from_slice(records);
        osip.update_checksum()?;
        Ok(osip)
    }

    /// Records in use
    pub fn records(&self) -> &[Osii] {
        let num = (self.num_pointers as usize).min(MAX_OSIP_DESC);
        &self.desc[..num]
    }

    /// Convert the structure to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = bincode::serialize(self)?;
        assert!(bytes.len() == mem::size_of::<OsipHeader>());
        Ok(bytes)
    }

    /// Decode a header from the start of `bytes`. The signature is checked,
    /// the checksum isn't.
    pub fn from_bytes(bytes: &[u8]) -> Result<OsipHeader> {
        if bytes.len() < OSIP_HEADER_SIZE {
            return Err(OsipError::Truncated(bytes.len()));
        }
        let osip: OsipHeader = bincode::deserialize(&bytes[..OSIP_HEADER_SIZE])?;
        if osip.sig != OSIP_SIG {
            return Err(OsipError::BadSignature(osip.sig));
        }
        Ok(osip)
    }

    /// Compute the checksum of the header, ignoring the stored one
    pub fn checksum(&self) -> Result<u8> {
        let mut copy = *self;
        copy.header_checksum = 0;
        Ok(copy.to_bytes()?.iter().fold(0, |crc, b| crc ^ b))
    }

    /// Store the checksum of the current content
    pub fn update_checksum(&mut self) -> Result<()> {
        self.header_checksum = self.checksum()?;
        Ok(())
    }

    /// Check the stored checksum
    pub fn verify_checksum(&self) -> Result<()> {
        let expected = self.checksum()?;
        if expected != self.header_checksum {
            return Err(OsipError::BadChecksum {
                found: self.header_checksum,
                expected,
            });
        }
        Ok(())
    }

    /// Check that each image fits in the slot reserved for its type
    pub fn verify_sizes(&self) -> Result<()> {
        for (index, osii) in self.records().iter().enumerate() {
            let Some(max) = max_size_lba(osii.attribute) else {
                continue;
            };
            if osii.size_of_os_image > max {
                return Err(OsipError::ImageTooLarge {
                    index,
                    attribute: osii.attribute,
                    size: osii.size_of_os_image,
                    max,
                });
            }
        }
        Ok(())
    }

    /// List the header fields and the fields of the records in use, in
    /// encoding order. Reserved fields are omitted.
    pub fn fields(&self) -> Vec<OsipField> {
        fn field(name: &str, offset: usize, size: usize, value: u64) -> OsipField {
            OsipField {
                name: name.to_string(),
                offset,
                size,
                value,
            }
        }

        let mut fields = vec![
            field("sig", 0x00, 4, self.sig.into()),
            field("header_rev_minor", 0x05, 1, self.header_rev_minor.into()),
            field("header_rev_major", 0x06, 1, self.header_rev_major.into()),
            field("header_checksum", 0x07, 1, self.header_checksum.into()),
            field("num_pointers", 0x08, 1, self.num_pointers.into()),
            field("num_images", 0x09, 1, self.num_images.into()),
            field("header_size", 0x0a, 2, self.header_size.into()),
        ];

        for (i, osii) in self.records().iter().enumerate() {
            let base = OSIP_FIXED_SIZE + i * OSII_SIZE;
            let prefix = format!("osii[{i}].");
            let mut add = |name: &str, offset: usize, size: usize, value: u64| {
                fields.push(field(&(prefix.clone() + name), base + offset, size, value))
            };
            add("os_rev_minor", 0x00, 2, osii.os_rev_minor.into());
            add("os_rev_major", 0x02, 2, osii.os_rev_major.into());
            add("logical_start_block", 0x04, 4, osii.logical_start_block.into());
            add("ddr_load_address", 0x08, 4, osii.ddr_load_address.into());
            add("entry_point", 0x0c, 4, osii.entry_point.into());
            add("size_of_os_image", 0x10, 4, osii.size_of_os_image.into());
            add("attribute", 0x14, 1, osii.attribute.into());
        }
        fields
    }
}
