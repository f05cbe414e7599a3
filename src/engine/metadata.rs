//! Header modules read from DICOM objects, and the probe contract the
//! classifier relies on.

use super::ImageLocator;
use crate::error::EngineError;
use crate::model::UploadedFile;
use crate::utils::{format_tag, value_to_string};
use dicom::core::dictionary::DataDictionary;
use dicom::core::header::Header;
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::DefaultDicomObject;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SopCommonModule {
    pub sop_class_uid: String,
    pub sop_instance_uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiframeModule {
    pub number_of_frames: u32,
    /// Nominal time between frames, in milliseconds.
    pub frame_time_ms: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct HeaderRow {
    pub tag: String,
    pub vr: String,
    pub alias: String,
    pub value: String,
}

/// Metadata access as the classifier needs it: register a file, load its
/// header once, then read modules synchronously. Missing attributes are
/// `None`, never an error.
pub trait MetadataProbe: Send + Sync {
    /// Returns the same locator when called again for the same upload.
    fn register_file(&self, file: &UploadedFile) -> ImageLocator;

    fn load_metadata(
        &self,
        locator: &ImageLocator,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    fn sop_common_module(&self, locator: &ImageLocator) -> Option<SopCommonModule>;

    fn multiframe_module(&self, locator: &ImageLocator) -> Option<MultiframeModule>;

    fn number_of_frames(&self, locator: &ImageLocator) -> Option<u32>;
}

pub fn sop_common_module(object: &DefaultDicomObject) -> Option<SopCommonModule> {
    let sop_class_uid = uid_text(object, tags::SOP_CLASS_UID)?;
    Some(SopCommonModule {
        sop_class_uid,
        sop_instance_uid: uid_text(object, tags::SOP_INSTANCE_UID),
    })
}

/// Present only when the object carries a Number of Frames attribute.
pub fn multiframe_module(object: &DefaultDicomObject) -> Option<MultiframeModule> {
    let number_of_frames = object
        .element(tags::NUMBER_OF_FRAMES)
        .ok()?
        .to_int::<u32>()
        .ok()?;

    Some(MultiframeModule {
        number_of_frames,
        frame_time_ms: object
            .element(tags::FRAME_TIME)
            .ok()
            .and_then(|element| element.to_float64().ok())
            .filter(|ms| *ms > 0.0),
    })
}

/// Frame count for objects without a usable Number of Frames, taken from
/// the Per-frame Functional Groups of enhanced multi-frame objects.
pub fn number_of_frames(object: &DefaultDicomObject) -> Option<u32> {
    let count = object
        .element(tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE)
        .ok()?
        .items()?
        .len();
    u32::try_from(count).ok().filter(|count| *count > 0)
}

/// Shortest cadence a header may declare. Anything faster is treated as
/// absent so the configured default applies.
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

/// Playback cadence declared by the object, if any.
pub fn frame_interval(object: &DefaultDicomObject) -> Option<Duration> {
    let frame_time = multiframe_module(object)
        .and_then(|module| module.frame_time_ms)
        .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok());

    let declared = frame_time.or_else(|| {
        [tags::CINE_RATE, tags::RECOMMENDED_DISPLAY_FRAME_RATE]
            .into_iter()
            .find_map(|tag| {
                object
                    .element(tag)
                    .ok()
                    .and_then(|element| element.to_float64().ok())
                    .filter(|rate| *rate > 0.0)
            })
            .and_then(|rate| Duration::try_from_secs_f64(1.0 / rate).ok())
    });

    declared.filter(|interval| *interval >= MIN_FRAME_INTERVAL)
}

pub fn instance_number(object: &DefaultDicomObject) -> Option<i32> {
    object
        .element(tags::INSTANCE_NUMBER)
        .ok()?
        .to_int::<i32>()
        .ok()
}

/// Top-level attributes in tag order, for the metadata panel.
pub fn header_rows(object: &DefaultDicomObject) -> Vec<HeaderRow> {
    object
        .iter()
        .map(|element| {
            let tag = element.tag();
            let vr = element.vr();
            HeaderRow {
                tag: format_tag(tag),
                vr: vr.to_string().to_owned(),
                alias: StandardDataDictionary
                    .by_tag(tag)
                    .map(|entry| entry.alias)
                    .unwrap_or("Unknown")
                    .to_string(),
                value: value_to_string(element.value(), vr),
            }
        })
        .collect()
}

fn uid_text(object: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<String> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .map(|value| value.trim_end_matches(['\0', ' ']).to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use dicom::core::value::DataSetSequence;
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use dicom::dictionary_std::tags;
    use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
    use std::path::Path;

    pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

    #[derive(Default)]
    pub struct Fixture<'a> {
        pub sop_class_uid: &'a str,
        pub number_of_frames: Option<&'a str>,
        pub frame_time: Option<&'a str>,
        pub per_frame_groups: usize,
        pub instance_number: Option<&'a str>,
        /// Rows and columns of an 8-bit monochrome image, one value per pixel.
        pub pixels: Option<(u16, u16, Vec<u8>)>,
    }

    impl Fixture<'_> {
        pub fn write(&self, path: &Path) {
            let mut object = InMemDicomObject::new_empty();
            object.put(DataElement::new(
                tags::SOP_CLASS_UID,
                VR::UI,
                PrimitiveValue::from(self.sop_class_uid),
            ));
            object.put(DataElement::new(
                tags::SOP_INSTANCE_UID,
                VR::UI,
                PrimitiveValue::from("2.25.1234"),
            ));
            if let Some(frames) = self.number_of_frames {
                object.put(DataElement::new(
                    tags::NUMBER_OF_FRAMES,
                    VR::IS,
                    PrimitiveValue::from(frames),
                ));
            }
            if let Some(frame_time) = self.frame_time {
                object.put(DataElement::new(
                    tags::FRAME_TIME,
                    VR::DS,
                    PrimitiveValue::from(frame_time),
                ));
            }
            if let Some(number) = self.instance_number {
                object.put(DataElement::new(
                    tags::INSTANCE_NUMBER,
                    VR::IS,
                    PrimitiveValue::from(number),
                ));
            }
            if self.per_frame_groups > 0 {
                let items: Vec<InMemDicomObject> = (0..self.per_frame_groups)
                    .map(|_| InMemDicomObject::new_empty())
                    .collect();
                object.put(DataElement::new(
                    tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE,
                    VR::SQ,
                    DataSetSequence::from(items),
                ));
            }
            if let Some((rows, columns, pixels)) = &self.pixels {
                put_u16(&mut object, tags::ROWS, *rows);
                put_u16(&mut object, tags::COLUMNS, *columns);
                put_u16(&mut object, tags::SAMPLES_PER_PIXEL, 1);
                put_u16(&mut object, tags::BITS_ALLOCATED, 8);
                put_u16(&mut object, tags::BITS_STORED, 8);
                put_u16(&mut object, tags::HIGH_BIT, 7);
                put_u16(&mut object, tags::PIXEL_REPRESENTATION, 0);
                object.put(DataElement::new(
                    tags::PHOTOMETRIC_INTERPRETATION,
                    VR::CS,
                    PrimitiveValue::from("MONOCHROME2"),
                ));
                object.put(DataElement::new(
                    tags::PIXEL_DATA,
                    VR::OB,
                    PrimitiveValue::from(pixels.clone()),
                ));
            }

            let file = object
                .with_meta(
                    FileMetaTableBuilder::new()
                        .transfer_syntax(EXPLICIT_VR_LE)
                        .media_storage_sop_class_uid(self.sop_class_uid)
                        .media_storage_sop_instance_uid("2.25.1234"),
                )
                .expect("valid file meta");
            file.write_to_file(path).expect("write DICOM fixture");
        }
    }

    fn put_u16(object: &mut InMemDicomObject, tag: dicom::core::Tag, value: u16) {
        object.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
    }
}
