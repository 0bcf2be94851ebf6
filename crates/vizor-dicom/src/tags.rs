//! DICOM JSON 中使用的8位十六进制标签键

pub const ACQUISITION_TIME: &str = "00080032";
pub const SOP_INSTANCE_UID: &str = "00080018";
pub const STUDY_DATE: &str = "00080020";
pub const MODALITY: &str = "00080060";
pub const STUDY_DESCRIPTION: &str = "00081030";
pub const STUDY_INSTANCE_UID: &str = "0020000D";
pub const SERIES_INSTANCE_UID: &str = "0020000E";
pub const INSTANCE_NUMBER: &str = "00200013";
pub const IMAGE_POSITION_PATIENT: &str = "00200032";
pub const IMAGE_ORIENTATION_PATIENT: &str = "00200037";
pub const FRAME_OF_REFERENCE_UID: &str = "00200052";
pub const PIXEL_SPACING: &str = "00280030";
