use serde::Serialize;

use crate::types::{FontKind, IntegrityType, Suggestion};
use crate::workflow::{HostingForm, HostingStatus};

pub const PLAN_NOTICE: &str = "Free plan: 1000 views / month / website";
pub const DOMAIN_ERROR: &str = "The domain you entered is incorrect. Please re-check it.";
pub const HOSTED_FONTS_ERROR: &str = "Please add at least one font to your website.";
pub const HOSTING_ERROR: &str = "Something happenened while trying to host your fonts. Please retry or contact us using the in-app chat.";
pub const HOSTED_FONTS_LABEL: &str = "Hosted fonts";
pub const EMPTY_FONTS_HINT: &str =
    "Add a font to your website using our autocomplete search input below!";

/// Labeled input field with its error/warning styling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledInput {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    pub required: bool,
    pub placeholder: String,
    pub value: String,
    pub class: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip)]
    warning: bool,
}

impl LabeledInput {
    pub fn new(name: &'static str, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::unlabeled(name)
        }
    }

    /// An input rendered without a `<label>`, such as the font search box.
    pub fn unlabeled(name: &'static str) -> Self {
        let mut input = Self {
            name,
            label: None,
            info: None,
            required: false,
            placeholder: String::new(),
            value: String::new(),
            class: String::new(),
            error: None,
            warning: false,
        };
        input.refresh_class();
        input
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Flags the field as invalid when `message` is set.
    pub fn error(mut self, message: Option<&'static str>) -> Self {
        self.error = message;
        self.refresh_class();
        self
    }

    pub fn warning(mut self, warning: bool) -> Self {
        self.warning = warning;
        self.refresh_class();
        self
    }

    fn refresh_class(&mut self) {
        let mut class = String::from("input-with-label-input");
        if self.error.is_some() {
            class.push_str(" is-error");
        }
        if self.warning {
            class.push_str(" is-warning");
        }
        self.class = class;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionVariantView {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FontKind,
    pub name: String,
    pub variants: Vec<SuggestionVariantView>,
}

impl From<&Suggestion> for SuggestionView {
    fn from(suggestion: &Suggestion) -> Self {
        Self {
            id: suggestion.id.clone(),
            kind: suggestion.kind,
            name: suggestion.name.clone(),
            variants: suggestion
                .variants
                .iter()
                .map(|variant| SuggestionVariantView {
                    id: variant.id.clone(),
                    label: format!(
                        "{} {} {} {} {}",
                        suggestion.name,
                        variant.name,
                        variant.weight,
                        variant.width,
                        variant.style_label()
                    ),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddedFontView {
    pub id: String,
    pub preview_family: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_type: Option<IntegrityType>,
    pub can_resolve: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitButton {
    pub label: &'static str,
    pub disabled: bool,
    pub loading: bool,
    pub error: bool,
}

/// Render-ready projection of a [`HostingForm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostingFormView {
    pub plan: &'static str,
    pub status: HostingStatus,
    pub domain: LabeledInput,
    pub added_fonts_label: &'static str,
    pub added_fonts: Vec<AddedFontView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_fonts_hint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_fonts_error: Option<&'static str>,
    pub autocomplete: LabeledInput,
    pub suggestions_open: bool,
    pub suggestions: Vec<SuggestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosting_error: Option<&'static str>,
    pub submit: SubmitButton,
}

impl HostingFormView {
    pub fn render(form: &HostingForm) -> Self {
        let errors = form.errors();

        let domain = LabeledInput::new("hosting_domain", "Domain where your fonts will be displayed")
            .required()
            .placeholder("www.mysite.com")
            .value(form.domain())
            .error(errors.domain.then_some(DOMAIN_ERROR));
        let autocomplete = LabeledInput::unlabeled("user_name")
            .placeholder("Type your font name...")
            .value(form.autocomplete_text());

        let added_fonts: Vec<AddedFontView> = form
            .added_fonts()
            .iter()
            .map(|font| AddedFontView {
                id: font.id.clone(),
                preview_family: format!("preview{}", font.id),
                label: font.preview_label(),
                integrity: font.integrity.clone(),
                integrity_type: font.integrity_type,
                can_resolve: font.integrity.is_some(),
            })
            .collect();

        let suggestions: Vec<SuggestionView> =
            form.suggestions().iter().map(SuggestionView::from).collect();

        Self {
            plan: PLAN_NOTICE,
            status: form.status(),
            domain,
            added_fonts_label: HOSTED_FONTS_LABEL,
            empty_fonts_hint: added_fonts.is_empty().then_some(EMPTY_FONTS_HINT),
            added_fonts,
            hosted_fonts_error: errors.hosted_fonts.then_some(HOSTED_FONTS_ERROR),
            autocomplete,
            suggestions_open: !suggestions.is_empty(),
            suggestions,
            hosting_error: errors.hosting.then_some(HOSTING_ERROR),
            submit: SubmitButton {
                label: "Add website",
                disabled: form.added_fonts().is_empty() || form.domain().is_empty(),
                loading: form.loading(),
                error: errors.hosting,
            },
        }
    }
}
