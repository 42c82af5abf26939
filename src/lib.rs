//! Prepare boot images for the FSTK firmware stitcher and invoke it.
//!
//! The stitcher combines OS images and firmware volumes into one firmware
//! blob, optionally signed, that starts with an OS Image Profile (OSIP)
//! header. This crate computes where each image lands in the blob, generates
//! the files the stitcher needs, and runs it.
//!
//! Example
//! ```bash
//! fstk-stitch stitch
//!     -s B0                       # Silicon stepping
//!     -t /tmp                     # Directory for the generated files
//!     -k keys/                    # Signing keys
//!     -f /opt/fstk/bin/fstk       # Stitcher executable
//!     -o ifwi.bin                 # Output blob
//!     --signed
//!     os.bin firmware.fv system.img
//! ```
//!
//! # Generated files
//!
//! The stitcher is invoked as `fstk -l <stitch config> -k <platform
//! descriptor> -o <key override>`:
//!
//! * The stitch configuration names the output and the input images in order.
//! * The platform descriptor lists the OSIP header fields as offset/size/value
//!   records, followed by the stepping-specific vendor regions.
//! * The key override names the signing key files of the stepping.
//!
//! Before running it, `fstk -V` must report one of the supported versions.

#![warn(missing_docs)]
/// Image placement in the stitched blob
pub mod layout;
/// Stepping profiles and supported stitcher versions
pub mod settings;
/// Platform descriptor
pub mod platform;
/// Stitch configuration and key override
pub mod artifacts;
/// External stitcher executable
pub mod stitcher;
/// Stitch command
pub mod stitch;
/// Inspect command
pub mod inspect;
/// Osimage command
pub mod osimage;

#[allow(missing_docs)]
pub mod command_line;
mod utils;

pub use layout::{compute_layout, ImageDescriptor, ImageFile, ImageKind, Layout};
pub use stitch::{StitchError, StitchJob};
