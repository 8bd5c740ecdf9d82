//! Side-effect-free state machine behind the hosting form.
//!
//! The form never performs I/O. Callers drive it with user actions and
//! with completions of the external calls, each tagged with the
//! [`SubmissionId`] it belongs to, and perform the returned work themselves.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::added_fonts::{resolve_added_font, AddedFontSet, ResolveError};
use crate::catalog::Catalog;
use crate::commit::{CommitPlan, CorrelationError, GeneratedBuffer, GenerationRequest};
use crate::domain::{normalize_domain, validate_domain};
use crate::types::{AddedFont, Suggestion};

/// Route the form navigates to after a successful submission or on "back".
pub const HOSTING_LIST_PATH: &str = "/library/hosting";

/// Time a submission may spend generating and uploading before it is reset.
pub const DEFAULT_HOSTING_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifier tying feed deliveries and call completions to one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostingStatus {
    Idle,
    Generating,
    Uploading,
    Hosting,
}

impl HostingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Uploading => "uploading",
            Self::Hosting => "hosting",
        }
    }
}

/// Independent error flags rendered by the form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormErrors {
    pub domain: bool,
    pub hosted_fonts: bool,
    pub hosting: bool,
}

impl FormErrors {
    fn hosting_failed() -> Self {
        Self {
            hosting: true,
            ..Self::default()
        }
    }
}

/// Why a submission request did not start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitRejection {
    #[error("a submission is already in flight")]
    Pending,
    #[error("'{0}' is not a valid domain")]
    InvalidDomain(String),
    #[error("no font has been added")]
    NoFonts,
}

impl SubmitRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InvalidDomain(_) => "invalid_domain",
            Self::NoFonts => "no_fonts",
        }
    }
}

/// Errors raised by font-list actions.
#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error("unknown suggestion '{0}'")]
    UnknownSuggestion(String),
    #[error("suggestion '{suggestion}' has no variant '{variant}'")]
    UnknownVariant { suggestion: String, variant: String },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// What a feed delivery meant for the form.
#[derive(Debug, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Not the awaited delivery: wrong submission, or not generating.
    Ignored,
    /// The submission moved to `uploading`; run the plan.
    Commit(CommitPlan),
    /// Buffers could not be paired with fonts; the submission failed.
    Rejected(CorrelationError),
}

/// A submission in flight and the fonts that were sent to the generator.
///
/// Buffers are paired against this copy, so editing the form's font list
/// while generation runs cannot shift the pairing.
#[derive(Debug, Clone, PartialEq)]
struct PendingSubmission {
    id: SubmissionId,
    fonts: AddedFontSet,
}

/// Ephemeral state of one hosting form instance.
#[derive(Debug, Clone, PartialEq)]
pub struct HostingForm {
    domain: String,
    autocomplete_text: String,
    suggestions: Vec<Suggestion>,
    added_fonts: AddedFontSet,
    errors: FormErrors,
    loading: bool,
    status: HostingStatus,
    pending: Option<PendingSubmission>,
}

impl Default for HostingForm {
    fn default() -> Self {
        Self::new()
    }
}

impl HostingForm {
    pub fn new() -> Self {
        Self {
            domain: String::new(),
            autocomplete_text: String::new(),
            suggestions: Vec::new(),
            added_fonts: AddedFontSet::new(),
            errors: FormErrors::default(),
            loading: false,
            status: HostingStatus::Idle,
            pending: None,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn autocomplete_text(&self) -> &str {
        &self.autocomplete_text
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn added_fonts(&self) -> &AddedFontSet {
        &self.added_fonts
    }

    pub fn errors(&self) -> FormErrors {
        self.errors
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn status(&self) -> HostingStatus {
        self.status
    }

    pub fn pending_submission(&self) -> Option<SubmissionId> {
        self.pending.as_ref().map(|pending| pending.id)
    }

    pub fn is_current(&self, submission: SubmissionId) -> bool {
        self.pending_submission() == Some(submission)
    }

    /// Replaces the domain field and clears its error flag.
    pub fn set_domain(&mut self, value: impl Into<String>) {
        self.domain = value.into();
        self.errors.domain = false;
    }

    /// Rebuilds the suggestion list for the new autocomplete text.
    pub fn update_autocomplete(&mut self, catalog: &Catalog, text: impl Into<String>) {
        self.autocomplete_text = text.into();
        self.suggestions = catalog.suggestions(&self.autocomplete_text);
    }

    /// Adds the variant of a currently displayed suggestion.
    ///
    /// Returns `Ok(false)` when the pair is already queued.
    pub fn add_font(
        &mut self,
        catalog: &Catalog,
        suggestion_id: &str,
        variant_id: &str,
    ) -> Result<bool, FormError> {
        let suggestion = self
            .suggestions
            .iter()
            .find(|s| s.id == suggestion_id)
            .ok_or_else(|| FormError::UnknownSuggestion(suggestion_id.to_string()))?;
        let variant = suggestion
            .variant(variant_id)
            .ok_or_else(|| FormError::UnknownVariant {
                suggestion: suggestion_id.to_string(),
                variant: variant_id.to_string(),
            })?;

        if self
            .added_fonts
            .contains(&AddedFont::composite_id(suggestion_id, variant_id))
        {
            return Ok(false);
        }

        let font = resolve_added_font(catalog, suggestion, variant)?;
        self.errors.domain = false;
        self.errors.hosted_fonts = false;
        Ok(self.added_fonts.insert(font))
    }

    pub fn remove_font(&mut self, font_id: &str) -> bool {
        self.added_fonts.remove(font_id).is_some()
    }

    /// Keeps `font_id` and drops every font it conflicts with.
    pub fn resolve_conflict(&mut self, font_id: &str) -> usize {
        self.added_fonts.resolve_conflict(font_id)
    }

    /// Starts a submission: normalizes and validates the domain, then moves
    /// to `generating` and returns the request to dispatch.
    ///
    /// While another submission is pending the call leaves the form untouched.
    pub fn begin_submission(
        &mut self,
        submission: SubmissionId,
    ) -> Result<GenerationRequest, SubmitRejection> {
        if self.pending.is_some() {
            return Err(SubmitRejection::Pending);
        }

        self.domain = normalize_domain(&self.domain);
        if validate_domain(&self.domain).is_err() {
            self.errors = FormErrors {
                domain: true,
                ..FormErrors::default()
            };
            return Err(SubmitRejection::InvalidDomain(self.domain.clone()));
        }
        if self.added_fonts.is_empty() {
            self.errors = FormErrors {
                hosted_fonts: true,
                ..FormErrors::default()
            };
            return Err(SubmitRejection::NoFonts);
        }

        self.errors = FormErrors::default();
        self.loading = true;
        self.autocomplete_text.clear();
        self.suggestions.clear();
        self.status = HostingStatus::Generating;
        self.pending = Some(PendingSubmission {
            id: submission,
            fonts: self.added_fonts.clone(),
        });

        Ok(GenerationRequest::from_fonts(submission, &self.added_fonts))
    }

    /// Handles generated buffers delivered by the feed.
    ///
    /// Buffers are paired with the fonts the submission was dispatched with,
    /// not with the current font list.
    pub fn accept_buffers(
        &mut self,
        submission: SubmissionId,
        buffers: Vec<GeneratedBuffer>,
    ) -> FeedOutcome {
        if !self.is_current(submission) || self.status != HostingStatus::Generating {
            return FeedOutcome::Ignored;
        }
        let Some(pending) = self.pending.as_ref() else {
            return FeedOutcome::Ignored;
        };
        match CommitPlan::build(submission, &self.domain, &pending.fonts, buffers) {
            Ok(plan) => {
                self.status = HostingStatus::Uploading;
                FeedOutcome::Commit(plan)
            }
            Err(err) => {
                self.fail_submission(submission);
                FeedOutcome::Rejected(err)
            }
        }
    }

    /// Marks the final hosted-domain commit as started.
    pub fn mark_hosting(&mut self, submission: SubmissionId) -> bool {
        if !self.is_current(submission) || self.status != HostingStatus::Uploading {
            return false;
        }
        self.status = HostingStatus::Hosting;
        true
    }

    /// Watchdog expiry. Only a submission still generating or uploading is reset.
    pub fn watchdog_expired(&mut self, submission: SubmissionId) -> bool {
        if !matches!(
            self.status,
            HostingStatus::Generating | HostingStatus::Uploading
        ) {
            return false;
        }
        self.fail_submission(submission)
    }

    /// Returns the form to idle with every error cleared.
    pub fn complete_submission(&mut self, submission: SubmissionId) -> bool {
        if !self.is_current(submission) {
            return false;
        }
        self.errors = FormErrors::default();
        self.loading = false;
        self.status = HostingStatus::Idle;
        self.pending = None;
        true
    }

    /// Returns the form to idle with the hosting banner raised.
    ///
    /// Covers dispatch failures and failures anywhere in the commit chain.
    pub fn fail_submission(&mut self, submission: SubmissionId) -> bool {
        if !self.is_current(submission) {
            return false;
        }
        self.errors = FormErrors::hosting_failed();
        self.loading = false;
        self.status = HostingStatus::Idle;
        self.pending = None;
        true
    }
}
