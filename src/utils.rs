use std::fs;
use std::path::Path;

/// Size of a sector, the unit of image sizes and offsets in the stitched blob
pub const SECTOR_SIZE: u64 = 512;

/// Number of sectors needed to hold @len bytes
pub fn bytes_to_sectors(len: u64) -> u64 {
    len.div_ceil(SECTOR_SIZE)
}

/// True if @path exists and is a regular file
pub fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// True if @path exists and is a directory
pub fn is_directory(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}
