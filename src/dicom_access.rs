use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::object::InMemDicomObject;

/// In-memory data set the transforms operate on.
pub type Record = InMemDicomObject<StandardDataDictionary>;

/// Small helper trait to read and rewrite single fields of a data set.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn element_vr(&self, tag: Tag) -> Option<VR>;
    fn has_element(&self, tag: Tag) -> bool;
    /// Replace a text value, keeping the element's VR when it already exists.
    fn set_str(&mut self, tag: Tag, fallback_vr: VR, value: &str);
    /// Copy the element verbatim from `source`. Returns false when `source` lacks it.
    fn copy_element_from(&mut self, source: &Record, tag: Tag) -> bool;
}

impl ElementAccess for Record {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim_end_matches(['\0', ' ']).to_string())
    }

    fn element_vr(&self, tag: Tag) -> Option<VR> {
        self.element(tag).ok().map(|e| e.header().vr)
    }

    fn has_element(&self, tag: Tag) -> bool {
        self.element(tag).is_ok()
    }

    fn set_str(&mut self, tag: Tag, fallback_vr: VR, value: &str) {
        let vr = self.element_vr(tag).unwrap_or(fallback_vr);
        self.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
    }

    fn copy_element_from(&mut self, source: &Record, tag: Tag) -> bool {
        match source.element(tag) {
            Ok(elem) => {
                self.put(elem.clone());
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_str_keeps_existing_vr() {
        let mut obj = Record::new_empty();
        obj.put(DataElement::new(
            Tag(0x0010, 0x0010),
            VR::PN,
            PrimitiveValue::from("Doe^John"),
        ));

        obj.set_str(Tag(0x0010, 0x0010), VR::LO, "Roe^Jane");
        assert_eq!(obj.element_vr(Tag(0x0010, 0x0010)), Some(VR::PN));
        assert_eq!(obj.element_str(Tag(0x0010, 0x0010)).as_deref(), Some("Roe^Jane"));

        obj.set_str(Tag(0x0010, 0x0020), VR::LO, "ID1");
        assert_eq!(obj.element_vr(Tag(0x0010, 0x0020)), Some(VR::LO));
    }

    #[test]
    fn copy_reports_missing_source_element() {
        let mut source = Record::new_empty();
        source.put(DataElement::new(
            Tag(0x0008, 0x0020),
            VR::DA,
            PrimitiveValue::from("20240101"),
        ));
        let mut target = Record::new_empty();

        assert!(target.copy_element_from(&source, Tag(0x0008, 0x0020)));
        assert!(!target.copy_element_from(&source, Tag(0x0008, 0x0030)));
        assert_eq!(
            target.element_str(Tag(0x0008, 0x0020)).as_deref(),
            Some("20240101")
        );
    }
}
