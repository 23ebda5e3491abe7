// Licensed under the Apache-2.0 license

//! Zero-copy reader for a PLDM firmware-update package (DSP0267 v1.0).
//!
//! Unlike [`crate::manifest`], which builds a `FirmwareManifest` by
//! allocating a `String`/`Vec<u8>` per field off a `std::io::Read`, this
//! module walks a package that already sits in memory and hands back
//! lazy iterators whose items borrow straight from the caller's buffer.
//! Every fixed-size field and every length-prefixed span is read
//! through [`pldm::msgbuf`], so a truncated or lying record is rejected
//! with a typed error instead of panicking or reading out of bounds.

use pldm::msgbuf::{MsgBuf, MsgBufError};

pub const PACKAGE_HEADER_IDENTIFIER_V1_0: [u8; 16] = [
    0xF0, 0x18, 0x87, 0x8C, 0xCB, 0x7D, 0x49, 0x43, 0x98, 0x00, 0xA0, 0x2F, 0x05, 0x9A, 0xCA, 0x02,
];
pub const FORMAT_REVISION_V1_0: u8 = 0x01;
pub const DESCRIPTOR_TYPE_VENDOR_DEFINED: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageError {
    UnrecognizedIdentifier,
    UnsupportedFormatRevision,
    HeaderSizeMismatch,
    DeviceRecordCountMismatch,
    ComponentCountMismatch,
    BitmapBitLengthNotByteMultiple,
    ApplicableComponentsBitmapMismatch,
    DescriptorNotVendorDefined,
    ChecksumMismatch,
    SizeInvariantViolation,
    Truncated,
}

impl From<MsgBufError> for PackageError {
    fn from(_: MsgBufError) -> Self {
        PackageError::Truncated
    }
}

impl core::fmt::Display for PackageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PackageError {}

#[derive(Debug, Clone, Copy)]
pub struct TypedString<'a> {
    pub string_type: u8,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct PackageHeaderInfo<'a> {
    pub identifier: [u8; 16],
    pub format_revision: u8,
    pub header_size: u16,
    /// Raw TIMESTAMP104 bytes; see [`crate::manifest::Timestamp104`] for
    /// the field layout.
    pub release_date_time: [u8; 13],
    pub component_bitmap_bit_length: u16,
    pub version_string: TypedString<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorView<'a> {
    pub descriptor_type: u16,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct VendorDefinedDescriptor<'a> {
    pub title_string_type: u8,
    pub title: &'a [u8],
    pub vendor_data: &'a [u8],
}

impl<'a> DescriptorView<'a> {
    /// Decodes the vendor-defined nested TLV: `(title_string_type: u8,
    /// title_string_length: u8, title_bytes, vendor_data)`.
    pub fn vendor_defined(&self) -> Result<VendorDefinedDescriptor<'a>, PackageError> {
        if self.descriptor_type != DESCRIPTOR_TYPE_VENDOR_DEFINED {
            return Err(PackageError::DescriptorNotVendorDefined);
        }
        let mut cur = MsgBuf::new(self.data, 2)?;
        let title_string_type = cur.extract_u8()?;
        let title_len = cur.extract_u8()? as usize;
        let title = cur.span_required(title_len)?;
        let vendor_data = cur.span_required(cur.remaining().max(0) as usize)?;
        cur.complete_consumed()?;
        Ok(VendorDefinedDescriptor {
            title_string_type,
            title,
            vendor_data,
        })
    }
}

pub struct DescriptorIter<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining_count: u8,
}

impl<'a> Iterator for DescriptorIter<'a> {
    type Item = Result<DescriptorView<'a>, PackageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining_count == 0 {
            return None;
        }
        let rest = &self.buf[self.pos..];
        let mut cur = match MsgBuf::new(rest, 4) {
            Ok(c) => c,
            Err(e) => return Some(Err(e.into())),
        };
        let descriptor_type = match cur.extract_u16() {
            Ok(v) => v,
            Err(e) => return Some(Err(e.into())),
        };
        let length = match cur.extract_u16() {
            Ok(v) => v as usize,
            Err(e) => return Some(Err(e.into())),
        };
        let data = match cur.span_required(length) {
            Ok(v) => v,
            Err(e) => return Some(Err(e.into())),
        };
        self.pos += 4 + length;
        self.remaining_count -= 1;
        Some(Ok(DescriptorView {
            descriptor_type,
            data,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceIdRecordView<'a> {
    pub device_update_option_flags: u32,
    /// Raw applicable-components bitmap, `component_bitmap_bit_length /
    /// 8` bytes.
    pub applicable_components: &'a [u8],
    pub component_image_set_version: TypedString<'a>,
    pub descriptor_count: u8,
    descriptors_buf: &'a [u8],
    pub firmware_device_package_data: &'a [u8],
}

impl<'a> DeviceIdRecordView<'a> {
    pub fn descriptors(&self) -> DescriptorIter<'a> {
        DescriptorIter {
            buf: self.descriptors_buf,
            pos: 0,
            remaining_count: self.descriptor_count,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ComponentImageInfo<'a> {
    pub classification: u16,
    pub identifier: u16,
    pub comparison_stamp: u32,
    pub options: u16,
    pub requested_activation_method: u16,
    pub location_offset: u32,
    pub size: u32,
    pub version_string: TypedString<'a>,
}

impl<'a> ComponentImageInfo<'a> {
    /// The component's image bytes, sliced out of the whole package.
    pub fn image<'p>(&self, package: &'p [u8]) -> &'p [u8] {
        &package[self.location_offset as usize..(self.location_offset + self.size) as usize]
    }
}

pub struct DeviceIdRecordIter<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining_count: u8,
    bitmap_bytes: usize,
}

impl<'a> Iterator for DeviceIdRecordIter<'a> {
    type Item = Result<DeviceIdRecordView<'a>, PackageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining_count == 0 {
            return None;
        }
        match decode_device_id_record(&self.buf[self.pos..], self.bitmap_bytes) {
            Ok((record, consumed)) => {
                self.pos += consumed;
                self.remaining_count -= 1;
                Some(Ok(record))
            }
            Err(e) => {
                self.remaining_count = 0;
                Some(Err(e))
            }
        }
    }
}

fn decode_device_id_record(
    buf: &[u8],
    bitmap_bytes: usize,
) -> Result<(DeviceIdRecordView<'_>, usize), PackageError> {
    let mut peek = MsgBuf::new(buf, 2)?;
    let record_length = peek.extract_u16()? as usize;
    if record_length < 2 || record_length > buf.len() {
        return Err(PackageError::Truncated);
    }
    let record_buf = &buf[..record_length];

    let mut cur = MsgBuf::new(record_buf, 2)?;
    let _record_length_field = cur.extract_u16()?;
    let descriptor_count = cur.extract_u8()?;
    let device_update_option_flags = cur.extract_u32()?;
    let version_string_type = cur.extract_u8()?;
    let version_string_len = cur.extract_u8()? as usize;
    let package_data_len = cur.extract_u16()? as usize;
    let applicable_components = cur.span_required(bitmap_bytes)?;
    let version_bytes = cur.span_required(version_string_len)?;
    let descriptors_start = {
        // remaining buffer from here to end-of-record minus package data
        // trailer is the descriptor TLV list.
        cur.span_until(package_data_len)?
    };
    let firmware_device_package_data = cur.span_required(package_data_len)?;
    cur.complete_consumed()?;

    Ok((
        DeviceIdRecordView {
            device_update_option_flags,
            applicable_components,
            component_image_set_version: TypedString {
                string_type: version_string_type,
                bytes: version_bytes,
            },
            descriptor_count,
            descriptors_buf: descriptors_start,
            firmware_device_package_data,
        },
        record_length,
    ))
}

pub struct ComponentImageInfoIter<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining_count: u16,
}

impl<'a> Iterator for ComponentImageInfoIter<'a> {
    type Item = Result<ComponentImageInfo<'a>, PackageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining_count == 0 {
            return None;
        }
        let rest = &self.buf[self.pos..];
        match decode_component_image_info(rest) {
            Ok((info, consumed)) => {
                self.pos += consumed;
                self.remaining_count -= 1;
                Some(Ok(info))
            }
            Err(e) => {
                self.remaining_count = 0;
                Some(Err(e))
            }
        }
    }
}

fn decode_component_image_info(buf: &[u8]) -> Result<(ComponentImageInfo<'_>, usize), PackageError> {
    let mut cur = MsgBuf::new(buf, 18)?;
    let classification = cur.extract_u16()?;
    let identifier = cur.extract_u16()?;
    let comparison_stamp = cur.extract_u32()?;
    let options = cur.extract_u16()?;
    let requested_activation_method = cur.extract_u16()?;
    let location_offset = cur.extract_u32()?;
    let size = cur.extract_u32()?;
    let version_string_type = cur.extract_u8()?;
    let version_string_len = cur.extract_u8()? as usize;
    let version_bytes = cur.span_required(version_string_len)?;
    let consumed = 2 + 2 + 4 + 2 + 2 + 4 + 4 + 1 + 1 + version_string_len;
    Ok((
        ComponentImageInfo {
            classification,
            identifier,
            comparison_stamp,
            options,
            requested_activation_method,
            location_offset,
            size,
            version_string: TypedString {
                string_type: version_string_type,
                bytes: version_bytes,
            },
        },
        consumed,
    ))
}

pub struct PackageView<'a> {
    pub buf: &'a [u8],
    pub header: PackageHeaderInfo<'a>,
    device_records_buf: &'a [u8],
    device_record_count: u8,
    downstream_records_buf: &'a [u8],
    downstream_record_count: u8,
    component_records_buf: &'a [u8],
    component_count: u16,
}

impl<'a> PackageView<'a> {
    pub fn device_id_records(&self) -> DeviceIdRecordIter<'a> {
        DeviceIdRecordIter {
            buf: self.device_records_buf,
            pos: 0,
            remaining_count: self.device_record_count,
            bitmap_bytes: (self.header.component_bitmap_bit_length as usize).div_ceil(8),
        }
    }

    pub fn downstream_device_id_records(&self) -> DeviceIdRecordIter<'a> {
        DeviceIdRecordIter {
            buf: self.downstream_records_buf,
            pos: 0,
            remaining_count: self.downstream_record_count,
            bitmap_bytes: (self.header.component_bitmap_bit_length as usize).div_ceil(8),
        }
    }

    pub fn component_image_infos(&self) -> ComponentImageInfoIter<'a> {
        ComponentImageInfoIter {
            buf: self.component_records_buf,
            pos: 0,
            remaining_count: self.component_count,
        }
    }
}

fn crc32_ieee(data: &[u8]) -> u32 {
    const CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    CRC.checksum(data)
}

/// Parses a firmware-update package from a contiguous buffer.
///
/// Performs every check named in the component-design validation order:
/// identifier, format revision, header-size bounds, declared record
/// counts against what is actually parsed, exact-fit record lengths,
/// applicable-components bitmap length, CRC32, and the total-size /
/// per-component-offset invariant.
pub fn parse(buf: &[u8]) -> Result<PackageView<'_>, PackageError> {
    if buf.len() < 16 + 1 + 2 {
        return Err(PackageError::Truncated);
    }
    if buf[0..16] != PACKAGE_HEADER_IDENTIFIER_V1_0 {
        return Err(PackageError::UnrecognizedIdentifier);
    }

    let mut cur = MsgBuf::new(buf, 16 + 1 + 2)?;
    let mut identifier = [0u8; 16];
    identifier.copy_from_slice(cur.span_required(16)?);
    let format_revision = cur.extract_u8()?;
    if format_revision != FORMAT_REVISION_V1_0 {
        return Err(PackageError::UnsupportedFormatRevision);
    }
    let header_size = cur.extract_u16()?;
    if header_size as usize > buf.len() {
        return Err(PackageError::HeaderSizeMismatch);
    }

    let mut release_date_time = [0u8; 13];
    release_date_time.copy_from_slice(cur.span_required(13)?);

    let component_bitmap_bit_length = cur.extract_u16()?;
    if component_bitmap_bit_length % 8 != 0 {
        return Err(PackageError::BitmapBitLengthNotByteMultiple);
    }
    let bitmap_bytes = (component_bitmap_bit_length as usize).div_ceil(8);

    let version_string_type = cur.extract_u8()?;
    let version_string_len = cur.extract_u8()? as usize;
    let version_string = cur.span_required(version_string_len)?;

    let device_record_count = cur.extract_u8()?;

    // Device-ID records: each carries its own record_length, so walk
    // them to find the region boundary, cross-checking the declared
    // count against what is actually present.
    let device_records_start = header_size as usize; // placeholder, replaced below
    let _ = device_records_start;
    let region_start_in_buf = {
        // position of cur within buf
        buf.len() as isize - cur.remaining()
    } as usize;
    let mut scan_pos = region_start_in_buf;
    for _ in 0..device_record_count {
        let (_, consumed) = decode_device_id_record(&buf[scan_pos..], bitmap_bytes)?;
        scan_pos += consumed;
    }
    let device_records_buf = &buf[region_start_in_buf..scan_pos];

    let mut cur = MsgBuf::new(&buf[scan_pos..], 1)?;
    let downstream_record_count = cur.extract_u8()?;
    let downstream_region_start = scan_pos + 1;
    let mut scan_pos = downstream_region_start;
    for _ in 0..downstream_record_count {
        let (_, consumed) = decode_device_id_record(&buf[scan_pos..], bitmap_bytes)?;
        scan_pos += consumed;
    }
    let downstream_records_buf = &buf[downstream_region_start..scan_pos];

    let mut cur = MsgBuf::new(&buf[scan_pos..], 2)?;
    let component_count = cur.extract_u16()?;
    let component_region_start = scan_pos + 2;
    let mut scan_pos = component_region_start;
    for _ in 0..component_count {
        let (_, consumed) = decode_component_image_info(&buf[scan_pos..])?;
        scan_pos += consumed;
    }
    let component_records_buf = &buf[component_region_start..scan_pos];

    if scan_pos + 4 != header_size as usize {
        return Err(PackageError::HeaderSizeMismatch);
    }

    let declared_crc = u32::from_le_bytes(
        buf[header_size as usize - 4..header_size as usize]
            .try_into()
            .unwrap(),
    );
    let computed_crc = crc32_ieee(&buf[0..header_size as usize - 4]);
    if declared_crc != computed_crc {
        return Err(PackageError::ChecksumMismatch);
    }

    let view = PackageView {
        buf,
        header: PackageHeaderInfo {
            identifier,
            format_revision,
            header_size,
            release_date_time,
            component_bitmap_bit_length,
            version_string: TypedString {
                string_type: version_string_type,
                bytes: version_string,
            },
        },
        device_records_buf,
        device_record_count,
        downstream_records_buf,
        downstream_record_count,
        component_records_buf,
        component_count,
    };

    // Total-size invariant: headerSize + sum(componentSize) ==
    // packageSize, and each component's offset equals the running sum.
    let mut running_offset = header_size as u32;
    for info in view.component_image_infos() {
        let info = info?;
        if info.location_offset != running_offset {
            return Err(PackageError::SizeInvariantViolation);
        }
        running_offset += info.size;
    }
    if running_offset as usize != buf.len() {
        return Err(PackageError::SizeInvariantViolation);
    }

    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_typed_string(out: &mut Vec<u8>, string_type: u8, s: &[u8]) {
        out.push(string_type);
        out.push(s.len() as u8);
        out.extend_from_slice(s);
    }

    /// Builds the 139-byte package used as the round-trip scenario: one
    /// device-ID record (update-option bit 0 set, one UUID descriptor),
    /// one 1-byte component image.
    fn build_tiny_package() -> Vec<u8> {
        let descriptor_data = [0xAAu8; 16];
        let version2 = b"VersionString2";
        let version3 = b"VersionString3";

        // --- device-id record body (everything after its own length field) ---
        let mut device_record_body = Vec::new();
        device_record_body.push(1u8); // descriptor_count
        device_record_body.extend_from_slice(&1u32.to_le_bytes()); // update_option_flags, bit0 set
        device_record_body.push(1u8); // version_string_type = ASCII
        device_record_body.push(version2.len() as u8);
        device_record_body.extend_from_slice(&0u16.to_le_bytes()); // package_data_length = 0
        device_record_body.extend_from_slice(&[0u8]); // applicable_components bitmap (bit-length 8 -> 1 byte)
        device_record_body.extend_from_slice(version2);
        device_record_body.extend_from_slice(&2u16.to_le_bytes()); // descriptor type = UUID
        device_record_body.extend_from_slice(&16u16.to_le_bytes()); // descriptor length
        device_record_body.extend_from_slice(&descriptor_data);
        // no package data

        let record_length = (2 + device_record_body.len()) as u16;
        let mut device_record = Vec::new();
        device_record.extend_from_slice(&record_length.to_le_bytes());
        device_record.extend_from_slice(&device_record_body);

        // --- component image info ---
        let mut component = Vec::new();
        component.extend_from_slice(&10u16.to_le_bytes()); // classification
        component.extend_from_slice(&100u16.to_le_bytes()); // identifier
        component.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // comparison_stamp
        component.extend_from_slice(&0u16.to_le_bytes()); // options
        component.extend_from_slice(&0u16.to_le_bytes()); // requested_activation_method
        // location_offset filled in once header_size is known
        let location_offset_patch_idx = component.len();
        component.extend_from_slice(&0u32.to_le_bytes());
        component.extend_from_slice(&1u32.to_le_bytes()); // size = 1
        push_typed_string(&mut component, 1, version3);

        // --- assemble header up to (but not including) the CRC ---
        let mut header = Vec::new();
        header.extend_from_slice(&PACKAGE_HEADER_IDENTIFIER_V1_0);
        header.push(FORMAT_REVISION_V1_0);
        let header_size_patch_idx = header.len();
        header.extend_from_slice(&0u16.to_le_bytes()); // header_size, patched below
        header.extend_from_slice(&[0u8; 13]); // release_date_time
        header.extend_from_slice(&8u16.to_le_bytes()); // component_bitmap_bit_length
        header.push(0u8); // package version_string_type = Unknown
        header.push(0u8); // package version_string_length = 0
        header.push(1u8); // device_record_count = 1
        header.extend_from_slice(&device_record);
        header.push(0u8); // downstream_record_count = 0
        header.extend_from_slice(&1u16.to_le_bytes()); // component_count = 1
        header.extend_from_slice(&component);

        let header_size = (header.len() + 4) as u16;
        header[header_size_patch_idx..header_size_patch_idx + 2]
            .copy_from_slice(&header_size.to_le_bytes());
        let component_offset_idx =
            header.len() - component.len() + location_offset_patch_idx;
        header[component_offset_idx..component_offset_idx + 4]
            .copy_from_slice(&header_size.to_le_bytes());

        let crc = crc32_ieee(&header);
        header.extend_from_slice(&crc.to_le_bytes());

        header.push(0xEE); // the single 1-byte component image payload
        header
    }

    #[test]
    fn round_trips_tiny_package() {
        let pkg = build_tiny_package();
        assert_eq!(pkg.len(), 139);
        let view = parse(&pkg).expect("package should parse");
        assert_eq!(view.header.format_revision, FORMAT_REVISION_V1_0);
        assert_eq!(view.header.header_size, 0x008b);

        let records: Vec<_> = view.device_id_records().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].component_image_set_version.bytes,
            b"VersionString2"
        );
        assert_eq!(records[0].device_update_option_flags & 1, 1);

        let descriptors: Vec<_> = records[0].descriptors().collect::<Result<_, _>>().unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].descriptor_type, 2);
        assert_eq!(descriptors[0].data, &[0xAAu8; 16]);

        let components: Vec<_> = view
            .component_image_infos()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].classification, 10);
        assert_eq!(components[0].identifier, 100);
        assert_eq!(components[0].comparison_stamp, 0xFFFFFFFF);
        assert_eq!(components[0].location_offset, 0x8b);
        assert_eq!(components[0].size, 1);
        assert_eq!(components[0].version_string.bytes, b"VersionString3");
        assert_eq!(components[0].image(&pkg), &[0xEE]);
    }

    #[test]
    fn rejects_bad_identifier() {
        let mut pkg = build_tiny_package();
        pkg[0] ^= 0xFF;
        assert_eq!(parse(&pkg), Err(PackageError::UnrecognizedIdentifier));
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut pkg = build_tiny_package();
        let last_image_byte = pkg.len() - 1;
        pkg[last_image_byte - 1] ^= 0xFF; // corrupt a CRC byte
        assert_eq!(parse(&pkg), Err(PackageError::ChecksumMismatch));
    }

    #[test]
    fn rejects_truncated_device_record() {
        let mut pkg = build_tiny_package();
        pkg.truncate(30);
        assert!(parse(&pkg).is_err());
    }
}
