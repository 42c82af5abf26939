//! Build an OS image from its components. The stitcher takes the result as a
//! `.bin` input.
//!
//! Layout:
//!
//! | Offset | Content                                            |
//! |--------|----------------------------------------------------|
//! | 0      | kernel command line, padded to 512 bytes           |
//! | 0x200  | kernel size, ramdisk size, console suppression,    |
//! |        | console device type (u32 LE), padded to 3584 bytes |
//! | 0x1000 | bootstub, padded to 4096 bytes                     |
//! | 0x2000 | kernel, then ramdisk                               |
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};

use crate::command_line::OsimageArgs;

/// The bootstub only reserves this much space for the command line
pub const MAX_CMDLINE_SIZE: usize = 511;

const CMDLINE_AREA_SIZE: usize = 512;
const PARAMS_AREA_SIZE: usize = 3584;
const BOOTSTUB_AREA_SIZE: usize = 4096;

const CONSOLE_SUPPRESSION: u32 = 0;
const CONSOLE_DEV_TYPE: u32 = 0xff;

fn write_padded(out: &mut impl Write, data: &[u8], size: usize, what: &str) -> Result<()> {
    if data.len() > size {
        bail!("{what} too large: {} bytes, max {size}", data.len());
    }
    out.write_all(data)?;
    out.write_all(&vec![0u8; size - data.len()])?;
    Ok(())
}

/// Write the OS image made of the given components into @out
pub fn make_osimage(
    out: &mut impl Write,
    bootstub: &[u8],
    kernel: &[u8],
    cmdline: &[u8],
    ramdisk: &[u8],
) -> Result<()> {
    if cmdline.len() > MAX_CMDLINE_SIZE {
        bail!("Command line too long, max {MAX_CMDLINE_SIZE} bytes");
    }
    let kernel_size = u32::try_from(kernel.len()).context("kernel too large")?;
    let ramdisk_size = u32::try_from(ramdisk.len()).context("ramdisk too large")?;

    let mut params: Vec<u8> = vec![];
    params.write_u32::<LittleEndian>(kernel_size)?;
    params.write_u32::<LittleEndian>(ramdisk_size)?;
    params.write_u32::<LittleEndian>(CONSOLE_SUPPRESSION)?;
    params.write_u32::<LittleEndian>(CONSOLE_DEV_TYPE)?;

    write_padded(out, cmdline, CMDLINE_AREA_SIZE, "command line")?;
    write_padded(out, &params, PARAMS_AREA_SIZE, "parameters")?;
    write_padded(out, bootstub, BOOTSTUB_AREA_SIZE, "bootstub")?;
    out.write_all(kernel)?;
    out.write_all(ramdisk)?;
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

/// Build the OS image described by the command-line arguments
pub fn osimage(args: &OsimageArgs) -> Result<()> {
    let bootstub = read(&args.bootstub)?;
    let kernel = read(&args.kernel)?;
    let cmdline = read(&args.cmdline)?;
    let ramdisk = read(&args.ramdisk)?;

    let file = File::create(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    make_osimage(&mut out, &bootstub, &kernel, &cmdline, &ramdisk)?;
    out.flush()?;

    log::info!("Wrote {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let mut out: Vec<u8> = vec![];
        make_osimage(&mut out, b"STUB", b"KERNEL", b"console=ttyS0", b"RD").unwrap();

        assert_eq!(out.len(), 0x2000 + 6 + 2);
        assert_eq!(&out[..13], b"console=ttyS0");
        assert!(out[13..0x200].iter().all(|&b| b == 0));
        assert_eq!(
            &out[0x200..0x210],
            &[6, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0xff, 0, 0, 0]
        );
        assert!(out[0x210..0x1000].iter().all(|&b| b == 0));
        assert_eq!(&out[0x1000..0x1004], b"STUB");
        assert_eq!(&out[0x2000..], b"KERNELRD");
    }

    #[test]
    fn test_limits() {
        let mut out: Vec<u8> = vec![];
        let cmdline = vec![b'a'; MAX_CMDLINE_SIZE];
        assert!(make_osimage(&mut out, b"", b"", &cmdline, b"").is_ok());
        assert_eq!(out.len(), 0x2000);

        let cmdline = vec![b'a'; MAX_CMDLINE_SIZE + 1];
        assert!(make_osimage(&mut Vec::<u8>::new(), b"", b"", &cmdline, b"").is_err());

        let bootstub = vec![0u8; BOOTSTUB_AREA_SIZE + 1];
        assert!(make_osimage(&mut Vec::<u8>::new(), &bootstub, b"", b"", b"").is_err());
    }
}
