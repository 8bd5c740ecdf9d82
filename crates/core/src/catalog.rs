use serde::{Deserialize, Serialize};

use crate::types::{
    AbstractedFontRef, AbstractedTemplate, CreatedAbstractedFont, Family, FontKind, FontVariant,
    HostedDomain, LibraryUser, Preset, Suggestion, TemplateData, TemplateInfo,
};

/// In-memory read model of everything the hosting form looks up.
///
/// Mutations go through the explicit repository operations
/// [`Catalog::record_abstracted_font`] and [`Catalog::append_hosted_domain`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub user: LibraryUser,
    #[serde(default)]
    pub sub_users: Vec<LibraryUser>,
    #[serde(default)]
    pub templates: Vec<TemplateInfo>,
    #[serde(default)]
    pub templates_data: Vec<TemplateData>,
    #[serde(default)]
    pub abstracted_templates: Vec<AbstractedTemplate>,
    #[serde(default)]
    pub presets: Vec<Preset>,
    #[serde(default)]
    pub hosted_domains: Vec<HostedDomain>,
}

impl Catalog {
    /// Builds autocomplete suggestions for the provided query.
    ///
    /// Matching is a case-insensitive substring test. Results are grouped as
    /// templates, presets, own families, then team families.
    pub fn suggestions(&self, query: &str) -> Vec<Suggestion> {
        if query.chars().all(char::is_whitespace) {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        let matches = |value: &str| value.to_lowercase().contains(&needle);

        let mut suggestions = Vec::new();

        for template in self.templates.iter().filter(|t| matches(&t.family_name)) {
            let abstracted_id = self
                .abstracted_templates
                .iter()
                .find(|at| at.template == template.name)
                .map(|at| at.id.clone());
            suggestions.push(Suggestion {
                kind: FontKind::Template,
                id: format!("template{}", template.family_name),
                name: template.family_name.clone(),
                template_name: Some(template.template_name.clone()),
                preset_id: None,
                family_id: None,
                variants: vec![FontVariant::regular("base", abstracted_id)],
            });
        }

        for preset in self.presets.iter().filter(|p| matches(&p.family_name)) {
            let abstracted_id = preset.abstracted_font.as_ref().map(|af| af.id.clone());
            suggestions.push(Suggestion {
                kind: FontKind::Preset,
                id: preset.id.clone(),
                name: preset.family_name.clone(),
                template_name: None,
                preset_id: Some(preset.id.clone()),
                family_id: None,
                variants: vec![FontVariant::regular(preset.id.clone(), abstracted_id)],
            });
        }

        for family in self.user.library.iter().filter(|f| matches(&f.name)) {
            suggestions.push(family_suggestion(family));
        }

        let team_families = self
            .sub_users
            .iter()
            .filter(|member| member.id != self.user.id)
            .flat_map(|member| member.library.iter())
            .filter(|f| matches(&f.name));
        for family in team_families {
            suggestions.push(family_suggestion(family));
        }

        suggestions
    }

    pub fn template_info(&self, template_name: &str) -> Option<&TemplateInfo> {
        self.templates
            .iter()
            .find(|info| info.template_name == template_name)
    }

    pub fn template_data(&self, name: &str) -> Option<&TemplateData> {
        self.templates_data.iter().find(|data| data.name == name)
    }

    pub fn preset(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    /// Finds a family in the user's library, then in the team libraries.
    pub fn family(&self, id: &str) -> Option<&Family> {
        self.families().find(|family| family.id == id)
    }

    fn families(&self) -> impl Iterator<Item = &Family> {
        self.user
            .library
            .iter()
            .chain(self.sub_users.iter().flat_map(|member| member.library.iter()))
    }

    fn families_mut(&mut self) -> impl Iterator<Item = &mut Family> {
        self.user.library.iter_mut().chain(
            self.sub_users
                .iter_mut()
                .flat_map(|member| member.library.iter_mut()),
        )
    }

    /// Patches the preset, family variant or template matching a freshly
    /// created abstracted font so later lookups treat it as registered.
    ///
    /// Returns `false` when nothing in the catalog matched.
    pub fn record_abstracted_font(&mut self, created: &CreatedAbstractedFont) -> bool {
        let reference = AbstractedFontRef {
            id: created.id.clone(),
        };
        match created.kind {
            FontKind::Preset => {
                let Some(preset_id) = created.preset_id.as_deref() else {
                    return false;
                };
                match self.presets.iter_mut().find(|p| p.id == preset_id) {
                    Some(preset) => {
                        preset.abstracted_font = Some(reference);
                        true
                    }
                    None => false,
                }
            }
            FontKind::Variant => {
                let (Some(family_id), Some(variant_id)) =
                    (created.family_id.as_deref(), created.variant_id.as_deref())
                else {
                    return false;
                };
                let variant = self
                    .families_mut()
                    .find(|family| family.id == family_id)
                    .and_then(|family| family.variants.iter_mut().find(|v| v.id == variant_id));
                match variant {
                    Some(variant) => {
                        variant.abstracted_font = Some(reference);
                        true
                    }
                    None => false,
                }
            }
            FontKind::Template => {
                let Some(template_name) = created.template.as_deref() else {
                    return false;
                };
                let Some(template) = self.template_info(template_name) else {
                    return false;
                };
                let template = template.name.clone();
                match self
                    .abstracted_templates
                    .iter_mut()
                    .find(|at| at.template == template)
                {
                    Some(existing) => existing.id = created.id.clone(),
                    None => self.abstracted_templates.push(AbstractedTemplate {
                        id: created.id.clone(),
                        template,
                    }),
                }
                true
            }
        }
    }

    /// Appends a newly created hosted domain to the user's domain list.
    pub fn append_hosted_domain(&mut self, domain: HostedDomain) {
        self.hosted_domains.push(domain);
    }
}

fn family_suggestion(family: &Family) -> Suggestion {
    Suggestion {
        kind: FontKind::Variant,
        id: family.id.clone(),
        name: family.name.clone(),
        template_name: None,
        preset_id: None,
        family_id: Some(family.id.clone()),
        variants: family.variants.clone(),
    }
}
