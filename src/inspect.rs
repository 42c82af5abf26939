//! Decode the OSIP header of a stitched blob
use std::fs::{self, File};
use std::path::Path;

use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use osip::{attribute_name, Osii, OsipHeader, LBA_SIZE};

use crate::command_line::InspectArgs;

/// Byte range of an image payload in a blob of @blob_len bytes, clamped to the
/// end of the blob
pub fn payload_range(osii: &Osii, blob_len: usize) -> std::ops::Range<usize> {
    let start = (osii.logical_start_block as u64 * LBA_SIZE) as usize;
    let len = (osii.size_of_os_image as u64 * LBA_SIZE) as usize;
    let start = start.min(blob_len);
    start..start.saturating_add(len).min(blob_len)
}

/// One line per record
pub fn format_records(osip: &OsipHeader) -> Vec<String> {
    osip.records()
        .iter()
        .enumerate()
        .map(|(i, osii)| {
            format!(
                "{i}: attribute {:#04x} ({}) start {} size {} load {:#010x} entry {:#010x} rev {}.{}",
                osii.attribute,
                attribute_name(osii.attribute),
                osii.logical_start_block,
                osii.size_of_os_image,
                osii.ddr_load_address,
                osii.entry_point,
                osii.os_rev_major,
                osii.os_rev_minor,
            )
        })
        .collect()
}

/// Decode and check the header at the start of @data
pub fn decode(data: &[u8]) -> Result<OsipHeader> {
    let osip = OsipHeader::from_bytes(data)?;
    osip.verify_checksum()?;
    if osip.num_pointers as usize > osip::MAX_OSIP_DESC {
        bail!("header has {} records", osip.num_pointers);
    }
    Ok(osip)
}

/// Display the header of a stitched blob, optionally extracting its images
pub fn inspect(args: &InspectArgs) -> Result<()> {
    let file = File::open(&args.blob)
        .with_context(|| format!("cannot open {}", args.blob.display()))?;
    // SAFETY: possible UB with concurrent modifications
    // https://docs.rs/memmap2/latest/memmap2/struct.Mmap.html#safety
    let map = unsafe { Mmap::map(&file)? };

    let osip = decode(&map).with_context(|| format!("{}", args.blob.display()))?;
    println!(
        "OSIP v{}.{}, {} images, header size {:#x}",
        osip.header_rev_major, osip.header_rev_minor, osip.num_images, osip.header_size
    );
    for line in format_records(&osip) {
        println!("{line}");
    }
    if let Err(e) = osip.verify_sizes() {
        log::warn!("{e}");
    }

    if let Some(dir) = &args.extract {
        extract(&osip, &map, dir)?;
    }
    Ok(())
}

fn extract(osip: &OsipHeader, data: &[u8], dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;

    for (i, osii) in osip.records().iter().enumerate() {
        let range = payload_range(osii, data.len());
        if range.len() < (osii.size_of_os_image as u64 * LBA_SIZE) as usize {
            log::warn!("image {i} is truncated to {} bytes", range.len());
        }
        let filename = dir.join(format!("image{i}.bin"));
        fs::write(&filename, &data[range])
            .with_context(|| format!("cannot write {}", filename.display()))?;
        log::info!("Extracted {}", filename.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use osip::{ATTR_SIGNED_FW, ATTR_UNSIGNED_KERNEL};

    fn blob() -> Vec<u8> {
        let osip = OsipHeader::new(&[
            Osii::new(1, osip::DDR_LOAD_ADDX, osip::ENTRY_POINT, 2, ATTR_UNSIGNED_KERNEL),
            Osii::new(3, 0, 0, 1, ATTR_SIGNED_FW),
        ])
        .unwrap();
        let mut data = osip.to_bytes().unwrap();
        data.resize(512, 0);
        data.extend([0xaa; 1024]);
        data.extend([0xbb; 300]);
        data
    }

    #[test]
    fn test_decode() {
        let data = blob();
        let osip = decode(&data).unwrap();
        let lines = format_records(&osip);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "0: attribute 0x01 (unsigned kernel) start 1 size 2 load 0x01100000 entry 0x01101000 rev 0.0"
        );
        assert!(lines[1].starts_with("1: attribute 0x08 (signed firmware) start 3 size 1"));

        let mut corrupt = data.clone();
        corrupt[0x30] ^= 1;
        assert!(decode(&corrupt).is_err());
        assert!(decode(&data[..64]).is_err());
    }

    #[test]
    fn test_payload_range() {
        let data = blob();
        let osip = decode(&data).unwrap();
        let records = osip.records();

        let r0 = payload_range(&records[0], data.len());
        assert_eq!(r0, 512..1536);
        assert!(data[r0].iter().all(|&b| b == 0xaa));

        // Clamped at the end of the blob
        let r1 = payload_range(&records[1], data.len());
        assert_eq!(r1, 1536..1836);

        let far = Osii::new(100, 0, 0, 1, ATTR_SIGNED_FW);
        assert!(payload_range(&far, data.len()).is_empty());
    }
}
