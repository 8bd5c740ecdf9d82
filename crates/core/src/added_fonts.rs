use serde::Serialize;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::types::{
    AbstractedFontMeta, AddedFont, FontKind, FontVariant, IntegrityType, Suggestion,
};

/// Errors raised while turning a suggestion into an [`AddedFont`].
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("template suggestion '{0}' carries no template name")]
    MissingTemplateName(String),
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
    #[error("unknown family '{0}'")]
    UnknownFamily(String),
    #[error("invalid parameter values for variant '{variant}': {message}")]
    InvalidValues { variant: String, message: String },
}

/// Resolves a suggestion/variant pair into a fully populated [`AddedFont`].
pub fn resolve_added_font(
    catalog: &Catalog,
    suggestion: &Suggestion,
    variant: &FontVariant,
) -> Result<AddedFont, ResolveError> {
    let (template, values, glyphs, meta) = match suggestion.kind {
        FontKind::Template => {
            let template_name = suggestion
                .template_name
                .as_deref()
                .ok_or_else(|| ResolveError::MissingTemplateName(suggestion.id.clone()))?;
            let data = catalog
                .template_data(template_name)
                .ok_or_else(|| ResolveError::UnknownTemplate(template_name.to_string()))?;
            let meta = AbstractedFontMeta {
                kind: FontKind::Template,
                family_id: None,
                template: Some(data.name.clone()),
                preset_id: None,
                name: suggestion.name.clone(),
            };
            (
                data.name.clone(),
                data.init_values.clone(),
                data.glyphs.clone(),
                meta,
            )
        }
        FontKind::Preset => {
            let preset = catalog
                .preset(&suggestion.id)
                .ok_or_else(|| ResolveError::UnknownPreset(suggestion.id.clone()))?;
            let template = registered_template(catalog, &preset.template)?;
            let data = catalog
                .template_data(&preset.template)
                .ok_or_else(|| ResolveError::UnknownTemplate(preset.template.clone()))?;
            let meta = AbstractedFontMeta {
                kind: FontKind::Preset,
                family_id: None,
                template: None,
                preset_id: Some(suggestion.id.clone()),
                name: suggestion.name.clone(),
            };
            (
                template,
                preset.base_values.clone(),
                data.glyphs.clone(),
                meta,
            )
        }
        FontKind::Variant => {
            let family_id = suggestion.family_id.as_deref().unwrap_or(&suggestion.id);
            let family = catalog
                .family(family_id)
                .ok_or_else(|| ResolveError::UnknownFamily(family_id.to_string()))?;
            let data = catalog
                .template_data(&family.template)
                .ok_or_else(|| ResolveError::UnknownTemplate(family.template.clone()))?;
            let overrides = variant
                .values
                .decode()
                .map_err(|err| ResolveError::InvalidValues {
                    variant: variant.id.clone(),
                    message: err.to_string(),
                })?;
            let mut values = data.init_values.clone();
            values.extend(overrides);
            let template = registered_template(catalog, &family.template)?;
            let meta = AbstractedFontMeta {
                kind: FontKind::Variant,
                family_id: Some(family.id.clone()),
                template: None,
                preset_id: None,
                name: suggestion.name.clone(),
            };
            (template, values, data.glyphs.clone(), meta)
        }
    };

    Ok(AddedFont {
        id: AddedFont::composite_id(&suggestion.id, &variant.id),
        kind: suggestion.kind,
        name: suggestion.name.clone(),
        variant: variant.clone(),
        template,
        values,
        glyphs,
        abstracted_font_meta: meta,
        integrity: None,
        integrity_type: None,
    })
}

fn registered_template(catalog: &Catalog, template: &str) -> Result<String, ResolveError> {
    catalog
        .template_info(template)
        .map(|info| info.template_name.clone())
        .ok_or_else(|| ResolveError::UnknownTemplate(template.to_string()))
}

/// Ordered set of fonts queued for hosting.
///
/// Conflict flags are recomputed for every entry whenever membership
/// changes, so a flag can appear or disappear because of another entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AddedFontSet {
    fonts: Vec<AddedFont>,
}

impl AddedFontSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AddedFont> {
        self.fonts.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&AddedFont> {
        self.fonts.iter().find(|font| font.id == id)
    }

    /// Appends a font unless one with the same id is already queued.
    ///
    /// Returns `false` when the font was rejected as a duplicate.
    pub fn insert(&mut self, font: AddedFont) -> bool {
        if self.contains(&font.id) {
            return false;
        }
        self.fonts.push(font);
        self.refresh_integrity();
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<AddedFont> {
        let index = self.fonts.iter().position(|font| font.id == id)?;
        let removed = self.fonts.remove(index);
        self.refresh_integrity();
        Some(removed)
    }

    /// Keeps the flagged font and drops every entry it collides with under
    /// its current conflict kind. Returns the number of removed entries.
    pub fn resolve_conflict(&mut self, id: &str) -> usize {
        let Some(keeper) = self.get(id).cloned() else {
            return 0;
        };
        let Some(kind) = keeper.integrity_type else {
            return 0;
        };

        let before = self.fonts.len();
        self.fonts
            .retain(|font| font.id == keeper.id || !collides(kind, &keeper, font));
        let removed = before - self.fonts.len();
        self.refresh_integrity();
        removed
    }

    fn refresh_integrity(&mut self) {
        let flags: Vec<Option<IntegrityType>> = self
            .fonts
            .iter()
            .map(|font| detect_conflict(font, &self.fonts))
            .collect();
        for (font, flag) in self.fonts.iter_mut().zip(flags) {
            font.set_integrity(flag);
        }
    }
}

impl<'a> IntoIterator for &'a AddedFontSet {
    type Item = &'a AddedFont;
    type IntoIter = std::slice::Iter<'a, AddedFont>;

    fn into_iter(self) -> Self::IntoIter {
        self.fonts.iter()
    }
}

/// Returns the conflict flag of `candidate` against the other entries of `fonts`.
///
/// Only variant fonts are ever flagged; a family-name clash wins over a
/// metadata clash.
pub fn detect_conflict(candidate: &AddedFont, fonts: &[AddedFont]) -> Option<IntegrityType> {
    if !candidate.is_variant() {
        return None;
    }
    let others = || fonts.iter().filter(|font| font.id != candidate.id);

    if others().any(|font| collides(IntegrityType::FamilyName, candidate, font)) {
        Some(IntegrityType::FamilyName)
    } else if others().any(|font| collides(IntegrityType::Metadata, candidate, font)) {
        Some(IntegrityType::Metadata)
    } else {
        None
    }
}

fn collides(kind: IntegrityType, font: &AddedFont, other: &AddedFont) -> bool {
    if !font.is_variant() || !other.is_variant() {
        return false;
    }
    match kind {
        IntegrityType::FamilyName => {
            other.name == font.name && other.family_id() != font.family_id()
        }
        IntegrityType::Metadata => {
            other.id != font.id
                && other.family_id() == font.family_id()
                && other.variant.same_style(&font.variant)
        }
    }
}
