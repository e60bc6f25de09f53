//
// codec.rs
// Dicom-Inference-Client
//
// Serializes in-memory data sets to Part 10 byte streams and back, for archive transport.
//
// Thales Matheus Mendonça Santos - November 2025

use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::{from_reader, FileDicomObject, FileMetaTableBuilder};
use dicom::transfer_syntax::entries::EXPLICIT_VR_LITTLE_ENDIAN;
use rand::Rng;

use crate::dicom_access::{ElementAccess, Record};
use crate::error::{Error, Result};

const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);
const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";
const PREAMBLE_LEN: usize = 128;

/// Parse a Part 10 stream, with or without the 128-byte preamble.
pub fn decode(bytes: &[u8]) -> Result<Record> {
    let body = match bytes.get(PREAMBLE_LEN..PREAMBLE_LEN + 4) {
        Some(magic) if magic == b"DICM" => &bytes[PREAMBLE_LEN..],
        _ => bytes,
    };
    let obj = from_reader(body).map_err(|e| Error::Codec(e.to_string()))?;
    Ok(obj.into_inner())
}

/// Serialize a data set as an Explicit VR Little Endian Part 10 stream.
pub fn encode(record: &Record) -> Result<Vec<u8>> {
    let sop_class = record
        .element_str(SOP_CLASS_UID)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| SECONDARY_CAPTURE.to_string());
    let sop_instance = record
        .element_str(SOP_INSTANCE_UID)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("2.25.{}", rand::thread_rng().gen::<u128>()));

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN.uid())
        .media_storage_sop_class_uid(sop_class)
        .media_storage_sop_instance_uid(sop_instance)
        .build()
        .map_err(|e| Error::Codec(e.to_string()))?;

    let mut file_obj = FileDicomObject::new_empty_with_dict_and_meta(StandardDataDictionary, meta);
    // Copy elements into the file object in insertion order.
    for elem in record.clone() {
        file_obj.put(elem);
    }

    let mut bytes = Vec::new();
    file_obj
        .write_all(&mut bytes)
        .map_err(|e| Error::Codec(e.to_string()))?;
    Ok(bytes)
}
