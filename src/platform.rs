//! Platform descriptor given to the stitcher with `-k`.
//!
//! The descriptor lists the values of the vendor header regions as
//! offset/size/value records. The OSIP region is generated from the image
//! layout, the other regions are copied from the stepping profile.
use std::fmt::Write;

use osip::{Osii, OsipError, OsipHeader};

use crate::layout::{ImageDescriptor, Layout};
use crate::settings::SteppingProfile;
use crate::utils::SECTOR_SIZE;

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum PlatformError {
    #[error("{what} {value} does not fit in the OSIP header")]
    Overflow { what: &'static str, value: u64 },

    #[error("OSIP: {0}")]
    Osip(#[from] OsipError),

    #[error("format: {0}")]
    Format(#[from] std::fmt::Error),
}
type Result<T> = core::result::Result<T, PlatformError>;

fn to_u32(what: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| PlatformError::Overflow { what, value })
}

/// Build the OSII record of an image
pub fn osii_from_descriptor(desc: &ImageDescriptor) -> Result<Osii> {
    Ok(Osii::new(
        to_u32("source pointer", desc.source_pointer)?,
        desc.destination_pointer,
        desc.handoff_pointer,
        to_u32("image size", desc.reported_size)?,
        desc.attribute_code,
    ))
}

/// Build the OSIP header describing all images of the layout
pub fn osip_header(layout: &Layout) -> Result<OsipHeader> {
    let records = layout
        .descriptors
        .iter()
        .map(osii_from_descriptor)
        .collect::<Result<Vec<_>>>()?;
    Ok(OsipHeader::new(&records)?)
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Hex value zero-padded to the field size
fn hex_value(value: u64, size: usize) -> String {
    format!("{:#0width$x}", value, width = 2 + 2 * size)
}

/// Render the platform descriptor for the given layout
pub fn render_platform(
    profile: &SteppingProfile,
    layout: &Layout,
    signed: bool,
) -> Result<String> {
    let osip = osip_header(layout)?;
    let mut out = String::new();

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<platform stepping="{}" signed="{}" sector-size="{}" total-sectors="{}">"#,
        xml_escape(&profile.name),
        signed,
        SECTOR_SIZE,
        layout.total_sectors
    )?;

    writeln!(
        out,
        r#"  <region name="OSIP" size="{:#x}">"#,
        osip::OSIP_HEADER_SIZE
    )?;
    for field in osip.fields() {
        writeln!(
            out,
            r#"    <field name="{}" offset="{:#05x}" size="{}" value="{}"/>"#,
            field.name,
            field.offset,
            field.size,
            hex_value(field.value, field.size)
        )?;
    }
    writeln!(out, "  </region>")?;

    writeln!(out, "  <images>")?;
    for (index, desc) in layout.descriptors.iter().enumerate() {
        writeln!(
            out,
            r#"    <image index="{}" file="{}" attribute="{:#04x}" signed="{}" source="{}" sectors="{}"/>"#,
            index,
            xml_escape(&desc.path.display().to_string()),
            desc.attribute_code,
            desc.signed(),
            desc.source_pointer,
            desc.reported_size
        )?;
    }
    writeln!(out, "  </images>")?;

    // Group the opaque fields by region, in order of first appearance
    let mut regions: Vec<&str> = vec![];
    for field in &profile.regions {
        if !regions.contains(&field.region.as_str()) {
            regions.push(&field.region);
        }
    }
    for region in regions {
        writeln!(out, r#"  <region name="{}">"#, xml_escape(region))?;
        for field in profile.regions.iter().filter(|f| f.region == region) {
            writeln!(
                out,
                r#"    <field offset="{:#05x}" size="{}" value="{}"/>"#,
                field.offset,
                field.size,
                hex_value(field.value, field.size as usize)
            )?;
        }
        writeln!(out, "  </region>")?;
    }

    writeln!(out, "</platform>")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{compute_layout, ImageFile};
    use crate::settings::RegionField;

    fn profile() -> SteppingProfile {
        SteppingProfile {
            name: "B0".to_string(),
            keys: vec![],
            regions: vec![
                RegionField {
                    region: "SMIP".to_string(),
                    offset: 0x10,
                    size: 4,
                    value: 1,
                },
                RegionField {
                    region: "FIP".to_string(),
                    offset: 0,
                    size: 1,
                    value: 0xa5,
                },
                RegionField {
                    region: "SMIP".to_string(),
                    offset: 0x14,
                    size: 2,
                    value: 0xbeef,
                },
            ],
        }
    }

    fn layout() -> Layout {
        compute_layout(
            &[
                ImageFile::new("a.bin", 1000).unwrap(),
                ImageFile::new("b.fv", 100).unwrap(),
            ],
            true,
        )
    }

    #[test]
    fn test_osii() {
        let osip = osip_header(&layout()).unwrap();
        let records = osip.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].logical_start_block, 1);
        assert_eq!(records[0].size_of_os_image, 3);
        assert_eq!(records[0].ddr_load_address, 0x01100000);
        assert_eq!(records[0].entry_point, 0x01101000);
        assert_eq!(records[0].attribute, osip::ATTR_SIGNED_KERNEL);
        assert_eq!(records[1].logical_start_block, 3);
        assert_eq!(records[1].size_of_os_image, 2);
        assert_eq!(records[1].ddr_load_address, 0);
        assert_eq!(records[1].attribute, osip::ATTR_SIGNED_FW);
        assert!(osip.verify_checksum().is_ok());
    }

    #[test]
    fn test_overflow() {
        let huge = compute_layout(&[ImageFile::new("a.fv", 1 << 42).unwrap()], false);
        assert!(matches!(
            osip_header(&huge),
            Err(PlatformError::Overflow { .. })
        ));

        let images: Vec<ImageFile> = (0..9)
            .map(|i| ImageFile::new(format!("{i}.fv"), 512).unwrap())
            .collect();
        assert!(matches!(
            osip_header(&compute_layout(&images, false)),
            Err(PlatformError::Osip(OsipError::TooManyRecords(9)))
        ));
    }

    #[test]
    fn test_render() {
        let xml = render_platform(&profile(), &layout(), true).unwrap();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(
            r#"<platform stepping="B0" signed="true" sector-size="512" total-sectors="3">"#
        ));
        assert!(xml.contains(r#"<field name="sig" offset="0x000" size="4" value="0x24534f24"/>"#));
        assert!(xml.contains(r#"<field name="num_pointers" offset="0x008" size="1" value="0x02"/>"#));
        assert!(xml.contains(
            r#"<field name="osii[0].ddr_load_address" offset="0x028" size="4" value="0x01100000"/>"#
        ));
        assert!(xml.contains(
            r#"<field name="osii[1].logical_start_block" offset="0x03c" size="4" value="0x00000003"/>"#
        ));
        assert!(xml.contains(
            r#"<image index="1" file="b.fv" attribute="0x08" signed="true" source="3" sectors="2"/>"#
        ));
        assert!(xml.trim_end().ends_with("</platform>"));

        // SMIP fields are grouped, before FIP
        let smip = xml.find(r#"<region name="SMIP">"#).unwrap();
        let fip = xml.find(r#"<region name="FIP">"#).unwrap();
        assert!(smip < fip);
        let smip_body = &xml[smip..fip];
        assert!(smip_body.contains(r#"<field offset="0x010" size="4" value="0x00000001"/>"#));
        assert!(smip_body.contains(r#"<field offset="0x014" size="2" value="0xbeef"/>"#));
        assert!(xml[fip..].contains(r#"<field offset="0x000" size="1" value="0xa5"/>"#));
    }

    #[test]
    fn test_escape() {
        assert_eq!(xml_escape(r#"a&b<"c">'"#), "a&amp;b&lt;&quot;c&quot;&gt;&apos;");
        let layout = compute_layout(&[ImageFile::new("R&D/os.bin", 1).unwrap()], false);
        let xml = render_platform(&SteppingProfile::default(), &layout, false).unwrap();
        assert!(xml.contains(r#"file="R&amp;D/os.bin""#));
        assert!(xml.contains(r#"attribute="0x01""#));
    }
}
