//! Self-describing configuration schema served to the browser form.
//!
//! Field `path`s address keys of the serialized [`ProcessingConfig`], so a
//! client can render the form and read defaults from the same document.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::processing_config::{
    LayoutType, LogoPosition, ProcessingConfig, CUSTOM_ELEMENT, ELEMENT_NAMES, ELEMENT_SLOTS,
    MAX_FONT_SIZE_LEVEL, MAX_QUALITY, MAX_WHITE_MARGIN_WIDTH, MIN_FONT_SIZE_LEVEL, MIN_QUALITY,
};

/// Bumped whenever field paths or enum identifiers change incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSchema {
    pub version: u32,
    pub defaults: ProcessingConfig,
    pub groups: Vec<SchemaGroup>,
    pub enums: BTreeMap<&'static str, Vec<EnumOption>>,
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaGroup {
    pub id: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnumOption {
    pub value: Value,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Enum,
    Color,
    Boolean,
    #[serde(rename = "string")]
    Text,
    Integer,
    Font,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaField {
    pub path: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    pub group: &'static str,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_ref: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_when: Option<VisibleWhen>,
}

/// Show the field only while the field at `path` equals `equals`.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleWhen {
    pub path: String,
    pub equals: Value,
}

impl SchemaField {
    fn new(path: impl Into<String>, field_type: FieldType, label: impl Into<String>, group: &'static str) -> Self {
        Self {
            path: path.into(),
            field_type,
            label: label.into(),
            group,
            enum_ref: None,
            min: None,
            max: None,
            visible_when: None,
        }
    }

    fn with_enum(mut self, enum_ref: &'static str) -> Self {
        self.enum_ref = Some(enum_ref);
        self
    }

    fn with_range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn visible_when(mut self, path: impl Into<String>, equals: Value) -> Self {
        self.visible_when = Some(VisibleWhen {
            path: path.into(),
            equals,
        });
        self
    }
}

impl ConfigSchema {
    /// The schema for the configuration this build understands.
    pub fn current() -> Self {
        Self {
            version: SCHEMA_VERSION,
            defaults: ProcessingConfig::default(),
            groups: groups(),
            enums: enums(),
            fields: fields(),
        }
    }
}

fn groups() -> Vec<SchemaGroup> {
    vec![
        SchemaGroup { id: "layout", label: "Layout" },
        SchemaGroup { id: "elements", label: "Text elements" },
        SchemaGroup { id: "output", label: "Output" },
        SchemaGroup { id: "fonts", label: "Fonts" },
        SchemaGroup { id: "effects", label: "Effects" },
    ]
}

fn enums() -> BTreeMap<&'static str, Vec<EnumOption>> {
    let layouts = LayoutType::ALL
        .into_iter()
        .map(|layout| EnumOption {
            value: json!(layout.as_str()),
            label: layout.label().to_string(),
        })
        .collect();
    let elements = ELEMENT_NAMES
        .iter()
        .map(|(name, label)| EnumOption {
            value: json!(name),
            label: label.to_string(),
        })
        .collect();
    let logo_positions = LogoPosition::ALL
        .into_iter()
        .map(|pos| EnumOption {
            value: json!(pos.as_str()),
            label: pos.as_str().to_string(),
        })
        .collect();
    let font_sizes = (MIN_FONT_SIZE_LEVEL..=MAX_FONT_SIZE_LEVEL)
        .zip(["Small", "Medium", "Large"])
        .map(|(level, label)| EnumOption {
            value: json!(level),
            label: label.to_string(),
        })
        .collect();

    BTreeMap::from([
        ("layout_type", layouts),
        ("element_name", elements),
        ("logo_position", logo_positions),
        ("font_size", font_sizes),
    ])
}

fn fields() -> Vec<SchemaField> {
    use FieldType::*;

    let mut fields = vec![
        SchemaField::new("layout.type", Enum, "Layout", "layout").with_enum("layout_type"),
        SchemaField::new("layout.background_color", Color, "Background colour", "layout"),
        SchemaField::new("layout.logo_enable", Boolean, "Show logo", "layout"),
        SchemaField::new("layout.logo_position", Enum, "Logo position", "layout")
            .with_enum("logo_position")
            .visible_when("layout.logo_enable", json!(true)),
    ];

    for slot in ELEMENT_SLOTS {
        let base = format!("layout.elements.{slot}");
        let title = slot.replace('_', " ");
        fields.push(
            SchemaField::new(format!("{base}.name"), Enum, format!("{title} element"), "elements")
                .with_enum("element_name"),
        );
        fields.push(
            SchemaField::new(format!("{base}.value"), Text, format!("{title} text"), "elements")
                .visible_when(format!("{base}.name"), json!(CUSTOM_ELEMENT)),
        );
        fields.push(SchemaField::new(
            format!("{base}.color"),
            Color,
            format!("{title} colour"),
            "elements",
        ));
        fields.push(SchemaField::new(
            format!("{base}.is_bold"),
            Boolean,
            format!("{title} bold"),
            "elements",
        ));
    }

    fields.extend([
        SchemaField::new("base.quality", Integer, "JPEG quality", "output")
            .with_range(MIN_QUALITY.into(), MAX_QUALITY.into()),
        SchemaField::new("base.font_size", Enum, "Font size", "fonts").with_enum("font_size"),
        SchemaField::new("base.bold_font_size", Enum, "Bold font size", "fonts")
            .with_enum("font_size"),
        SchemaField::new("base.font", Font, "Font", "fonts"),
        SchemaField::new("base.bold_font", Font, "Bold font", "fonts"),
        SchemaField::new("base.alternative_font", Font, "Fallback font", "fonts"),
        SchemaField::new("base.alternative_bold_font", Font, "Fallback bold font", "fonts"),
        SchemaField::new("global.shadow.enable", Boolean, "Drop shadow", "effects"),
        SchemaField::new("global.white_margin.enable", Boolean, "White margin", "effects"),
        SchemaField::new("global.white_margin.width", Integer, "White margin width (%)", "effects")
            .with_range(0, MAX_WHITE_MARGIN_WIDTH.into())
            .visible_when("global.white_margin.enable", json!(true)),
        SchemaField::new(
            "global.padding_with_original_ratio.enable",
            Boolean,
            "Pad to original aspect ratio",
            "effects",
        ),
        SchemaField::new(
            "global.focal_length.use_equivalent_focal_length",
            Boolean,
            "Use 35mm equivalent focal length",
            "effects",
        ),
    ]);

    fields
}
