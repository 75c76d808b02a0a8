//! Typed processing configuration and the web form that produces it.
//!
//! A submission carries a flat multipart form. [`Submission::from_form`]
//! overlays the form onto [`ProcessingConfig::default`], rejects unknown
//! fields and malformed values, and runs `validator` over the result. Values
//! outside their documented range are rejected rather than clamped.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Text element identifiers and their display labels.
pub const ELEMENT_NAMES: &[(&str, &str)] = &[
    ("Model", "Camera model"),
    ("Make", "Camera make"),
    ("LensModel", "Lens model"),
    ("Param", "Shooting parameters"),
    ("Datetime", "Date and time"),
    ("Date", "Date"),
    ("Custom", "Custom text"),
    ("None", "Nothing"),
    ("LensMake_LensModel", "Lens make + model"),
    ("CameraModel_LensModel", "Camera model + lens model"),
    ("TotalPixel", "Total pixels"),
    ("CameraMake_CameraModel", "Camera make + model"),
    ("Filename", "File name"),
    ("Date_Filename", "Date + file name"),
    ("Datetime_Filename", "Date and time + file name"),
    ("GeoInfo", "GPS location"),
    ("FocusDistance", "Focus distance"),
];

/// Element name whose text comes from the `value` field.
pub const CUSTOM_ELEMENT: &str = "Custom";

/// The four text slots of a bottom-bar layout, in form order.
pub const ELEMENT_SLOTS: [&str; 4] = ["left_top", "left_bottom", "right_top", "right_bottom"];

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Font size levels are small/medium/large.
pub const MIN_FONT_SIZE_LEVEL: u8 = 1;
pub const MAX_FONT_SIZE_LEVEL: u8 = 3;

/// Upper bound for the white margin, as a percentage of the short edge.
pub const MAX_WHITE_MARGIN_WIDTH: u8 = 30;

pub const MIN_PREVIEW_MAX_SIZE: u32 = 200;
pub const MAX_PREVIEW_MAX_SIZE: u32 = 8000;
pub const DEFAULT_PREVIEW_MAX_SIZE: u32 = 1600;
pub const DEFAULT_PREVIEW_QUALITY: u8 = 80;

/// Form fields that belong to the submission rather than the configuration.
const SUBMISSION_FIELDS: &[&str] = &["preview", "preview_max_size", "preview_quality"];

/// Plain configuration fields accepted on the form.
const CONFIG_FIELDS: &[&str] = &[
    "layout",
    "quality",
    "background_color",
    "logo_enable",
    "logo_position",
    "font_size",
    "bold_font_size",
    "font",
    "bold_font",
    "alternative_font",
    "alternative_bold_font",
    "shadow",
    "white_margin",
    "white_margin_width",
    "padding_ratio",
    "equivalent_focal_length",
];

/// Per-slot element field suffixes (`element_{slot}_{suffix}`).
const ELEMENT_FIELDS: &[&str] = &["name", "value", "color", "is_bold"];

/// Raw multipart text fields, keyed by field name.
pub type FormFields = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Output layout applied to every image of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutType {
    WatermarkLeftLogo,
    WatermarkRightLogo,
    DarkWatermarkLeftLogo,
    DarkWatermarkRightLogo,
    CustomWatermark,
    Square,
    Simple,
    BackgroundBlur,
    BackgroundBlurWithWhiteBorder,
    PureWhiteMargin,
}

impl LayoutType {
    pub const ALL: [LayoutType; 10] = [
        LayoutType::WatermarkLeftLogo,
        LayoutType::WatermarkRightLogo,
        LayoutType::DarkWatermarkLeftLogo,
        LayoutType::DarkWatermarkRightLogo,
        LayoutType::CustomWatermark,
        LayoutType::Square,
        LayoutType::Simple,
        LayoutType::BackgroundBlur,
        LayoutType::BackgroundBlurWithWhiteBorder,
        LayoutType::PureWhiteMargin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutType::WatermarkLeftLogo => "watermark_left_logo",
            LayoutType::WatermarkRightLogo => "watermark_right_logo",
            LayoutType::DarkWatermarkLeftLogo => "dark_watermark_left_logo",
            LayoutType::DarkWatermarkRightLogo => "dark_watermark_right_logo",
            LayoutType::CustomWatermark => "custom_watermark",
            LayoutType::Square => "square",
            LayoutType::Simple => "simple",
            LayoutType::BackgroundBlur => "background_blur",
            LayoutType::BackgroundBlurWithWhiteBorder => "background_blur_with_white_border",
            LayoutType::PureWhiteMargin => "pure_white_margin",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LayoutType::WatermarkLeftLogo => "Watermark, logo on the left",
            LayoutType::WatermarkRightLogo => "Watermark, logo on the right",
            LayoutType::DarkWatermarkLeftLogo => "Dark watermark, logo on the left",
            LayoutType::DarkWatermarkRightLogo => "Dark watermark, logo on the right",
            LayoutType::CustomWatermark => "Custom watermark",
            LayoutType::Square => "1:1 square",
            LayoutType::Simple => "Simple",
            LayoutType::BackgroundBlur => "Blurred background",
            LayoutType::BackgroundBlurWithWhiteBorder => "Blurred background with white border",
            LayoutType::PureWhiteMargin => "Pure white margin",
        }
    }

    /// Layouts that draw a text bar under the photo and use the element slots.
    pub fn has_text_bar(self) -> bool {
        matches!(
            self,
            LayoutType::WatermarkLeftLogo
                | LayoutType::WatermarkRightLogo
                | LayoutType::DarkWatermarkLeftLogo
                | LayoutType::DarkWatermarkRightLogo
                | LayoutType::CustomWatermark
        )
    }
}

impl FromStr for LayoutType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayoutType::ALL
            .into_iter()
            .find(|layout| layout.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown layout: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoPosition {
    Left,
    Right,
}

impl LogoPosition {
    pub const ALL: [LogoPosition; 2] = [LogoPosition::Left, LogoPosition::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            LogoPosition::Left => "left",
            LogoPosition::Right => "right",
        }
    }
}

impl FromStr for LogoPosition {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogoPosition::ALL
            .into_iter()
            .find(|pos| pos.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown logo position: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fully resolved configuration for one batch. Copied into the job record at
/// submission and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProcessingConfig {
    #[validate(nested)]
    pub layout: LayoutConfig,
    #[validate(nested)]
    pub base: BaseConfig,
    #[validate(nested)]
    pub global: GlobalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LayoutConfig {
    #[serde(rename = "type")]
    pub layout_type: LayoutType,
    #[validate(custom(function = "validate_hex_color"))]
    pub background_color: String,
    pub logo_enable: bool,
    pub logo_position: LogoPosition,
    #[validate(nested)]
    pub elements: ElementSlots,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            layout_type: LayoutType::WatermarkRightLogo,
            background_color: "#ffffff".to_string(),
            logo_enable: false,
            logo_position: LogoPosition::Left,
            elements: ElementSlots::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ElementSlots {
    #[validate(nested)]
    pub left_top: TextElement,
    #[validate(nested)]
    pub left_bottom: TextElement,
    #[validate(nested)]
    pub right_top: TextElement,
    #[validate(nested)]
    pub right_bottom: TextElement,
}

impl ElementSlots {
    fn slot_mut(&mut self, slot: &str) -> Option<&mut TextElement> {
        match slot {
            "left_top" => Some(&mut self.left_top),
            "left_bottom" => Some(&mut self.left_bottom),
            "right_top" => Some(&mut self.right_top),
            "right_bottom" => Some(&mut self.right_bottom),
            _ => None,
        }
    }
}

impl Default for ElementSlots {
    fn default() -> Self {
        Self {
            left_top: TextElement::new("LensModel", "#212121", true),
            left_bottom: TextElement::new("Model", "#757575", false),
            right_top: TextElement::new("Param", "#212121", true),
            right_bottom: TextElement::new("Datetime", "#757575", false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TextElement {
    #[validate(custom(function = "validate_element_name"))]
    pub name: String,
    /// Only meaningful for the `Custom` element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[validate(custom(function = "validate_hex_color"))]
    pub color: String,
    pub is_bold: bool,
}

impl TextElement {
    fn new(name: &str, color: &str, is_bold: bool) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            color: color.to_string(),
            is_bold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    #[validate(range(min = 1, max = 100))]
    pub quality: u8,
    #[validate(range(min = 1, max = 3))]
    pub font_size: u8,
    #[validate(range(min = 1, max = 3))]
    pub bold_font_size: u8,
    #[validate(length(min = 1, max = 255))]
    pub font: String,
    #[validate(length(min = 1, max = 255))]
    pub bold_font: String,
    #[validate(length(min = 1, max = 255))]
    pub alternative_font: String,
    #[validate(length(min = 1, max = 255))]
    pub alternative_bold_font: String,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            quality: MAX_QUALITY,
            font_size: MIN_FONT_SIZE_LEVEL,
            bold_font_size: MIN_FONT_SIZE_LEVEL,
            font: "NotoSans-Regular.ttf".to_string(),
            bold_font: "NotoSans-Bold.ttf".to_string(),
            alternative_font: "NotoSansSC-Regular.otf".to_string(),
            alternative_bold_font: "NotoSansSC-Bold.otf".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    pub shadow: Toggle,
    #[validate(nested)]
    pub white_margin: WhiteMargin,
    pub padding_with_original_ratio: Toggle,
    pub focal_length: FocalLength,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Toggle {
    pub enable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WhiteMargin {
    pub enable: bool,
    /// Percentage of the short edge.
    #[validate(range(max = 30))]
    pub width: u8,
}

impl Default for WhiteMargin {
    fn default() -> Self {
        Self {
            enable: false,
            width: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FocalLength {
    pub use_equivalent_focal_length: bool,
}

/// Downscale parameters for preview jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PreviewOptions {
    /// Longest edge of the preview, in pixels.
    #[validate(range(min = 200, max = 8000))]
    pub max_size: u32,
    #[validate(range(min = 1, max = 100))]
    pub quality: u8,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_PREVIEW_MAX_SIZE,
            quality: DEFAULT_PREVIEW_QUALITY,
        }
    }
}

// ---------------------------------------------------------------------------
// Form parsing
// ---------------------------------------------------------------------------

/// Everything a submission form resolves to besides the uploaded files.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub config: ProcessingConfig,
    /// `Some` when the caller asked for a preview job.
    pub preview: Option<PreviewOptions>,
}

impl Submission {
    /// Resolve and validate the text fields of a submission form.
    ///
    /// Checkbox fields follow HTML semantics: present means `true` (unless
    /// the value is `false`, `0` or `off`), absent means `false`.
    pub fn from_form(fields: &FormFields) -> Result<Self, CoreError> {
        if let Some(unknown) = fields.keys().find(|key| !is_known_field(key)) {
            return Err(CoreError::Validation(format!(
                "Unknown configuration field: {unknown}"
            )));
        }

        let config = ProcessingConfig::from_form(fields)?;

        let preview = if checkbox(fields, "preview") {
            let options = PreviewOptions {
                max_size: number(fields, "preview_max_size")?.unwrap_or(DEFAULT_PREVIEW_MAX_SIZE),
                quality: number(fields, "preview_quality")?.unwrap_or(DEFAULT_PREVIEW_QUALITY),
            };
            options.validate().map_err(validation_error)?;
            Some(options)
        } else {
            None
        };

        Ok(Self { config, preview })
    }
}

impl ProcessingConfig {
    /// Overlay form fields onto the defaults and validate the result.
    pub fn from_form(fields: &FormFields) -> Result<Self, CoreError> {
        let mut config = ProcessingConfig::default();

        if let Some(layout) = text(fields, "layout") {
            config.layout.layout_type = layout.parse()?;
        }
        if let Some(color) = text(fields, "background_color") {
            config.layout.background_color = color.to_ascii_lowercase();
        }
        config.layout.logo_enable = checkbox(fields, "logo_enable");
        if let Some(position) = text(fields, "logo_position") {
            config.layout.logo_position = position.parse()?;
        }

        for slot in ELEMENT_SLOTS {
            apply_element(&mut config.layout.elements, slot, fields)?;
        }

        if let Some(quality) = number(fields, "quality")? {
            config.base.quality = quality;
        }
        if let Some(size) = number(fields, "font_size")? {
            config.base.font_size = size;
        }
        if let Some(size) = number(fields, "bold_font_size")? {
            config.base.bold_font_size = size;
        }
        for (key, target) in [
            ("font", &mut config.base.font),
            ("bold_font", &mut config.base.bold_font),
            ("alternative_font", &mut config.base.alternative_font),
            ("alternative_bold_font", &mut config.base.alternative_bold_font),
        ] {
            if let Some(value) = text(fields, key) {
                *target = value.to_string();
            }
        }

        config.global.shadow.enable = checkbox(fields, "shadow");
        config.global.white_margin.enable = checkbox(fields, "white_margin");
        if let Some(width) = number(fields, "white_margin_width")? {
            config.global.white_margin.width = width;
        }
        config.global.padding_with_original_ratio.enable = checkbox(fields, "padding_ratio");
        config.global.focal_length.use_equivalent_focal_length =
            checkbox(fields, "equivalent_focal_length");

        config.validate().map_err(validation_error)?;
        Ok(config)
    }
}

fn apply_element(
    slots: &mut ElementSlots,
    slot: &str,
    fields: &FormFields,
) -> Result<(), CoreError> {
    let element = slots
        .slot_mut(slot)
        .ok_or_else(|| CoreError::Internal(format!("unknown element slot {slot}")))?;

    if let Some(name) = text(fields, &format!("element_{slot}_name")) {
        element.name = name.to_string();
    }
    if let Some(color) = text(fields, &format!("element_{slot}_color")) {
        element.color = color.to_ascii_lowercase();
    }
    element.is_bold = checkbox(fields, &format!("element_{slot}_is_bold"));

    element.value = if element.name == CUSTOM_ELEMENT {
        Some(
            fields
                .get(&format!("element_{slot}_value"))
                .cloned()
                .unwrap_or_default(),
        )
    } else {
        None
    };
    Ok(())
}

fn is_known_field(key: &str) -> bool {
    if CONFIG_FIELDS.contains(&key) || SUBMISSION_FIELDS.contains(&key) {
        return true;
    }
    let Some(rest) = key.strip_prefix("element_") else {
        return false;
    };
    ELEMENT_SLOTS.iter().any(|slot| {
        rest.strip_prefix(slot)
            .and_then(|suffix| suffix.strip_prefix('_'))
            .is_some_and(|suffix| ELEMENT_FIELDS.contains(&suffix))
    })
}

/// Non-empty trimmed text value of a field.
fn text<'a>(fields: &'a FormFields, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn checkbox(fields: &FormFields, key: &str) -> bool {
    match fields.get(key) {
        None => false,
        Some(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "false" | "0" | "off"
        ),
    }
}

/// Parse an optional integer field, rejecting non-numeric and
/// unrepresentable values. Range checks are left to `validator`.
fn number<T>(fields: &FormFields, key: &str) -> Result<Option<T>, CoreError>
where
    T: TryFrom<i64>,
{
    let Some(raw) = text(fields, key) else {
        return Ok(None);
    };
    let value: i64 = raw
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} must be an integer, got {raw:?}")))?;
    T::try_from(value)
        .map(Some)
        .map_err(|_| CoreError::Validation(format!("{key} is out of range: {value}")))
}

fn validation_error(errors: validator::ValidationErrors) -> CoreError {
    CoreError::Validation(errors.to_string())
}

// ---------------------------------------------------------------------------
// Field validators
// ---------------------------------------------------------------------------

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// `#rrggbb`, lowercase or uppercase hex.
fn validate_hex_color(value: &str) -> Result<(), ValidationError> {
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(invalid("hex_color", "must be a #rrggbb colour"))
    }
}

fn validate_element_name(value: &str) -> Result<(), ValidationError> {
    if ELEMENT_NAMES.iter().any(|(name, _)| *name == value) {
        Ok(())
    } else {
        Err(invalid("element_name", "unknown element name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn form(pairs: &[(&str, &str)]) -> FormFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(ProcessingConfig::default().validate().is_ok());
        assert!(PreviewOptions::default().validate().is_ok());
    }

    #[test]
    fn empty_form_resolves_to_defaults_with_checkboxes_off() {
        let submission = Submission::from_form(&FormFields::new()).unwrap();
        let config = submission.config;
        assert_eq!(config.layout.layout_type, LayoutType::WatermarkRightLogo);
        assert_eq!(config.base.quality, 100);
        assert!(!config.layout.elements.left_top.is_bold);
        assert!(!config.global.shadow.enable);
        assert!(submission.preview.is_none());
    }

    #[test]
    fn form_fields_overlay_defaults() {
        let fields = form(&[
            ("layout", "square"),
            ("quality", "85"),
            ("background_color", "#ABCDEF"),
            ("logo_enable", "on"),
            ("logo_position", "right"),
            ("white_margin", "on"),
            ("white_margin_width", "5"),
            ("element_left_top_name", "Custom"),
            ("element_left_top_value", "Shot on film"),
            ("element_left_top_is_bold", "on"),
        ]);
        let config = ProcessingConfig::from_form(&fields).unwrap();
        assert_eq!(config.layout.layout_type, LayoutType::Square);
        assert_eq!(config.base.quality, 85);
        assert_eq!(config.layout.background_color, "#abcdef");
        assert!(config.layout.logo_enable);
        assert_eq!(config.layout.logo_position, LogoPosition::Right);
        assert!(config.global.white_margin.enable);
        assert_eq!(config.global.white_margin.width, 5);
        let element = &config.layout.elements.left_top;
        assert_eq!(element.name, "Custom");
        assert_eq!(element.value.as_deref(), Some("Shot on film"));
        assert!(element.is_bold);
    }

    #[test]
    fn value_is_dropped_for_non_custom_elements() {
        let fields = form(&[
            ("element_right_top_name", "Param"),
            ("element_right_top_value", "ignored"),
        ]);
        let config = ProcessingConfig::from_form(&fields).unwrap();
        assert_eq!(config.layout.elements.right_top.value, None);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = Submission::from_form(&form(&[("qualiti", "80")])).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("qualiti"));
    }

    #[test]
    fn unknown_element_suffix_is_rejected() {
        let result = Submission::from_form(&form(&[("element_left_top_size", "3")]));
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn out_of_range_quality_is_rejected_not_clamped() {
        for raw in ["0", "101", "300", "-5"] {
            let result = ProcessingConfig::from_form(&form(&[("quality", raw)]));
            assert_matches!(result, Err(CoreError::Validation(_)), "quality={raw}");
        }
    }

    #[test]
    fn non_numeric_quality_is_rejected() {
        let err = ProcessingConfig::from_form(&form(&[("quality", "high")])).unwrap_err();
        assert_matches!(err, CoreError::Validation(msg) if msg.contains("quality"));
    }

    #[test]
    fn unknown_layout_is_rejected() {
        let result = ProcessingConfig::from_form(&form(&[("layout", "polaroid")]));
        assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("polaroid"));
    }

    #[test]
    fn malformed_color_is_rejected() {
        for raw in ["white", "#fff", "#gggggg", "ffffff0"] {
            let result = ProcessingConfig::from_form(&form(&[("background_color", raw)]));
            assert_matches!(result, Err(CoreError::Validation(_)), "color={raw}");
        }
    }

    #[test]
    fn unknown_element_name_is_rejected() {
        let result = ProcessingConfig::from_form(&form(&[("element_left_bottom_name", "Iso")]));
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn white_margin_width_is_bounded() {
        let result = ProcessingConfig::from_form(&form(&[("white_margin_width", "31")]));
        assert_matches!(result, Err(CoreError::Validation(_)));
    }

    #[test]
    fn explicit_false_checkbox_is_off() {
        let config = ProcessingConfig::from_form(&form(&[("shadow", "false")])).unwrap();
        assert!(!config.global.shadow.enable);
    }

    #[test]
    fn preview_uses_defaults_when_unspecified() {
        let submission = Submission::from_form(&form(&[("preview", "1")])).unwrap();
        assert_eq!(submission.preview, Some(PreviewOptions::default()));
    }

    #[test]
    fn preview_bounds_are_enforced() {
        let small = form(&[("preview", "on"), ("preview_max_size", "100")]);
        assert_matches!(Submission::from_form(&small), Err(CoreError::Validation(_)));

        let quality = form(&[("preview", "on"), ("preview_quality", "0")]);
        assert_matches!(Submission::from_form(&quality), Err(CoreError::Validation(_)));
    }

    #[test]
    fn preview_fields_without_preview_flag_are_ignored() {
        let fields = form(&[("preview_max_size", "100")]);
        let submission = Submission::from_form(&fields).unwrap();
        assert!(submission.preview.is_none());
    }

    #[test]
    fn config_round_trips_through_json_with_type_key() {
        let json = serde_json::to_value(ProcessingConfig::default()).unwrap();
        assert_eq!(json["layout"]["type"], "watermark_right_logo");
        let back: ProcessingConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, ProcessingConfig::default());
    }

    #[test]
    fn layout_parses_every_wire_name() {
        for layout in LayoutType::ALL {
            assert_eq!(layout.as_str().parse::<LayoutType>().unwrap(), layout);
        }
    }
}
