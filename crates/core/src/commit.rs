use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::added_fonts::AddedFontSet;
use crate::types::{AddedFont, FontKind, ParameterValues, StyleMetadata};
use crate::workflow::SubmissionId;

/// Generation request dispatched to the external generator.
///
/// All vectors are parallel and follow the order of the Added-Font Set.
/// `font_ids` carries the correlation key the generator echoes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub submission_id: SubmissionId,
    pub font_ids: Vec<String>,
    pub family_names: Vec<String>,
    pub variant_names: Vec<String>,
    pub values: Vec<ParameterValues>,
    pub metadata: Vec<StyleMetadata>,
    pub templates: Vec<String>,
    pub glyphs: Vec<Vec<String>>,
}

impl GenerationRequest {
    pub fn from_fonts(submission_id: SubmissionId, fonts: &AddedFontSet) -> Self {
        let mut request = Self {
            submission_id,
            font_ids: Vec::with_capacity(fonts.len()),
            family_names: Vec::with_capacity(fonts.len()),
            variant_names: Vec::with_capacity(fonts.len()),
            values: Vec::with_capacity(fonts.len()),
            metadata: Vec::with_capacity(fonts.len()),
            templates: Vec::with_capacity(fonts.len()),
            glyphs: Vec::with_capacity(fonts.len()),
        };
        for font in fonts {
            request.font_ids.push(font.id.clone());
            request.family_names.push(font.name.clone());
            request.variant_names.push(font.variant.name.clone());
            request.values.push(font.values.clone());
            request.metadata.push(StyleMetadata::from(&font.variant));
            request.templates.push(font.template.clone());
            request.glyphs.push(font.glyphs.clone());
        }
        request
    }

    pub fn len(&self) -> usize {
        self.font_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.font_ids.is_empty()
    }
}

/// One generated font binary delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedBuffer {
    pub font_id: Option<String>,
    pub data: Vec<u8>,
}

/// Parameters of an abstracted-font record to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAbstractedFont {
    #[serde(rename = "type")]
    pub kind: FontKind,
    pub variant_id: Option<String>,
    pub template: Option<String>,
    pub preset_id: Option<String>,
    pub family_id: Option<String>,
    pub name: String,
}

impl NewAbstractedFont {
    fn for_font(font: &AddedFont) -> Self {
        let meta = &font.abstracted_font_meta;
        Self {
            kind: meta.kind,
            variant_id: matches!(meta.kind, FontKind::Variant).then(|| font.variant.id.clone()),
            template: meta.template.clone(),
            preset_id: meta.preset_id.clone(),
            family_id: meta.family_id.clone(),
            name: meta.name.clone(),
        }
    }
}

/// Where the abstracted-font id of a committed font comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbstractedFontSource {
    Existing(String),
    Create(NewAbstractedFont),
}

/// A font paired with its generated binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitItem {
    pub font_id: String,
    pub label: String,
    pub buffer: Vec<u8>,
    pub abstracted_font: AbstractedFontSource,
}

/// Everything the upload/register/commit chain needs, detached from the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPlan {
    pub submission_id: SubmissionId,
    pub domain: String,
    pub items: Vec<CommitItem>,
}

impl CommitPlan {
    /// Pairs every queued font with its generated buffer.
    ///
    /// Buffers carrying a `font_id` are matched by key. Positional pairing is
    /// used only when no buffer carries a key and the counts agree.
    pub fn build(
        submission_id: SubmissionId,
        domain: &str,
        fonts: &AddedFontSet,
        buffers: Vec<GeneratedBuffer>,
    ) -> Result<Self, CorrelationError> {
        let keyed = buffers.iter().filter(|b| b.font_id.is_some()).count();
        let paired: Vec<(&AddedFont, Vec<u8>)> = if keyed == 0 {
            if buffers.len() != fonts.len() {
                return Err(CorrelationError::CountMismatch {
                    expected: fonts.len(),
                    received: buffers.len(),
                });
            }
            fonts
                .iter()
                .zip(buffers.into_iter().map(|b| b.data))
                .collect()
        } else if keyed != buffers.len() {
            return Err(CorrelationError::PartiallyKeyed);
        } else {
            let mut by_id: HashMap<String, Vec<u8>> = HashMap::with_capacity(buffers.len());
            for buffer in buffers {
                let font_id = buffer.font_id.unwrap_or_default();
                if !fonts.contains(&font_id) {
                    return Err(CorrelationError::UnknownFont(font_id));
                }
                if by_id.insert(font_id.clone(), buffer.data).is_some() {
                    return Err(CorrelationError::DuplicateBuffer(font_id));
                }
            }
            let mut paired = Vec::with_capacity(fonts.len());
            for font in fonts {
                let data = by_id
                    .remove(&font.id)
                    .ok_or_else(|| CorrelationError::MissingBuffer(font.id.clone()))?;
                paired.push((font, data));
            }
            paired
        };

        let items = paired
            .into_iter()
            .map(|(font, buffer)| CommitItem {
                font_id: font.id.clone(),
                label: font.display_label(),
                buffer,
                abstracted_font: match font.variant.abstracted_font_id() {
                    Some(id) => AbstractedFontSource::Existing(id.to_string()),
                    None => AbstractedFontSource::Create(NewAbstractedFont::for_font(font)),
                },
            })
            .collect();

        Ok(Self {
            submission_id,
            domain: domain.to_string(),
            items,
        })
    }

    /// Number of abstracted-font records the commit has to create.
    pub fn pending_creations(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.abstracted_font, AbstractedFontSource::Create(_)))
            .count()
    }
}

/// Failure to pair generated buffers with queued fonts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("expected {expected} generated buffers, received {received}")]
    CountMismatch { expected: usize, received: usize },
    #[error("generated buffers mix keyed and unkeyed entries")]
    PartiallyKeyed,
    #[error("generated buffer for unknown font '{0}'")]
    UnknownFont(String),
    #[error("font '{0}' received more than one buffer")]
    DuplicateBuffer(String),
    #[error("no generated buffer for font '{0}'")]
    MissingBuffer(String),
}
