use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameter name to numeric value mapping driving font generation.
pub type ParameterValues = BTreeMap<String, f64>;

/// Origin of a suggestion or an added font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FontKind {
    Template,
    Preset,
    Variant,
}

impl FontKind {
    /// Returns the canonical representation used by the GraphQL backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Template => "TEMPLATE",
            Self::Preset => "PRESET",
            Self::Variant => "VARIANT",
        }
    }
}

impl fmt::Display for FontKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a durable abstracted-font record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractedFontRef {
    pub id: String,
}

/// Variant parameter values as stored in the library.
///
/// Older library entries keep the values JSON-encoded in a string while newer
/// ones carry the parsed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValues {
    Encoded(String),
    Parsed(ParameterValues),
}

impl VariantValues {
    /// Returns the decoded parameter values.
    pub fn decode(&self) -> Result<ParameterValues, serde_json::Error> {
        match self {
            Self::Encoded(raw) if raw.trim().is_empty() => Ok(ParameterValues::new()),
            Self::Encoded(raw) => serde_json::from_str(raw),
            Self::Parsed(values) => Ok(values.clone()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Encoded(raw) => raw.is_empty(),
            Self::Parsed(values) => values.is_empty(),
        }
    }
}

impl Default for VariantValues {
    fn default() -> Self {
        Self::Parsed(ParameterValues::new())
    }
}

/// A weight/width/italic instance within a family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontVariant {
    pub id: String,
    pub name: String,
    pub weight: u32,
    pub width: String,
    #[serde(default)]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "VariantValues::is_empty")]
    pub values: VariantValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstracted_font: Option<AbstractedFontRef>,
}

impl FontVariant {
    /// Builds the single "regular" variant exposed by template and preset suggestions.
    pub fn regular(id: impl Into<String>, abstracted_font_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: "regular".to_string(),
            weight: 500,
            width: "normal".to_string(),
            italic: false,
            values: VariantValues::default(),
            abstracted_font: abstracted_font_id.map(|id| AbstractedFontRef { id }),
        }
    }

    /// Returns the abstracted-font id when the variant is already registered.
    pub fn abstracted_font_id(&self) -> Option<&str> {
        self.abstracted_font
            .as_ref()
            .map(|font| font.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Returns `true` when both variants share width, weight and italic flag.
    pub fn same_style(&self, other: &FontVariant) -> bool {
        self.width == other.width && self.weight == other.weight && self.italic == other.italic
    }

    pub fn style_label(&self) -> &'static str {
        if self.italic {
            "italic"
        } else {
            "normal"
        }
    }
}

/// Template listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub name: String,
    pub template_name: String,
    pub family_name: String,
}

/// Generation data attached to a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    pub name: String,
    #[serde(default)]
    pub glyphs: Vec<String>,
    #[serde(default)]
    pub init_values: ParameterValues,
}

/// Abstracted-font record registered for a bare template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractedTemplate {
    pub id: String,
    pub template: String,
}

/// Named parameter set for a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub template: String,
    pub family_name: String,
    #[serde(default)]
    pub base_values: ParameterValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstracted_font: Option<AbstractedFontRef>,
}

/// Font family owned by a library user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub id: String,
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub variants: Vec<FontVariant>,
}

/// Library owner: the signed-in user or a team member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryUser {
    pub id: String,
    #[serde(default)]
    pub library: Vec<Family>,
}

/// Hosted font registered for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedVariant {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstracted_font: Option<AbstractedFontRef>,
}

/// Website domain serving a set of hosted fonts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedDomain {
    pub id: String,
    pub domain: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub hosted_variants: Vec<HostedVariant>,
}

/// Abstracted-font record returned by the backend after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedAbstractedFont {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FontKind,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub preset_id: Option<String>,
    #[serde(default)]
    pub family_id: Option<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
}

/// Autocomplete entry produced by the catalog lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: FontKind,
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    pub variants: Vec<FontVariant>,
}

impl Suggestion {
    pub fn variant(&self, variant_id: &str) -> Option<&FontVariant> {
        self.variants.iter().find(|variant| variant.id == variant_id)
    }
}

/// Information needed to create the abstracted-font record of an added font.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractedFontMeta {
    #[serde(rename = "type")]
    pub kind: FontKind,
    pub family_id: Option<String>,
    pub template: Option<String>,
    pub preset_id: Option<String>,
    pub name: String,
}

/// Kind of conflict flagged on an added font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntegrityType {
    FamilyName,
    Metadata,
}

impl IntegrityType {
    /// Returns the warning shown next to the flagged font.
    pub fn message(self) -> &'static str {
        match self {
            Self::FamilyName => "A project with a similar name already exists in this website",
            Self::Metadata => "A variant with the same metadatas is already added",
        }
    }
}

/// A font the user intends to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedFont {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FontKind,
    pub name: String,
    pub variant: FontVariant,
    pub template: String,
    pub values: ParameterValues,
    pub glyphs: Vec<String>,
    pub abstracted_font_meta: AbstractedFontMeta,
    #[serde(default)]
    pub integrity: Option<String>,
    #[serde(default)]
    pub integrity_type: Option<IntegrityType>,
}

impl AddedFont {
    /// Composite identifier of a suggestion/variant pair.
    pub fn composite_id(suggestion_id: &str, variant_id: &str) -> String {
        format!("{suggestion_id}{variant_id}")
    }

    pub fn family_id(&self) -> Option<&str> {
        self.abstracted_font_meta.family_id.as_deref()
    }

    pub fn is_variant(&self) -> bool {
        matches!(self.kind, FontKind::Variant)
    }

    /// Label attached to uploads and logs, `<name> <variant>`.
    pub fn display_label(&self) -> String {
        format!("{} {}", self.name, self.variant.name)
    }

    /// Full label listing name, variant and style.
    pub fn preview_label(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.name,
            self.variant.name,
            self.variant.weight,
            self.variant.width,
            self.variant.style_label()
        )
    }

    pub(crate) fn set_integrity(&mut self, integrity: Option<IntegrityType>) {
        self.integrity_type = integrity;
        self.integrity = integrity.map(|kind| kind.message().to_string());
    }
}

/// Style metadata sent to the generator for each font.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleMetadata {
    pub weight: u32,
    pub width: String,
    pub italic: bool,
}

impl From<&FontVariant> for StyleMetadata {
    fn from(variant: &FontVariant) -> Self {
        Self {
            weight: variant.weight,
            width: variant.width.clone(),
            italic: variant.italic,
        }
    }
}
