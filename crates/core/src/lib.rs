//! Domain layer of the font hosting service: catalog lookup, the
//! Added-Font Set with its conflict rules, domain validation and the
//! submission state machine. Nothing in this crate performs I/O.

pub mod added_fonts;
pub mod catalog;
pub mod commit;
pub mod domain;
pub mod types;
pub mod view;
pub mod workflow;

pub use added_fonts::{resolve_added_font, AddedFontSet, ResolveError};
pub use catalog::Catalog;
pub use commit::{
    AbstractedFontSource, CommitItem, CommitPlan, CorrelationError, GeneratedBuffer,
    GenerationRequest, NewAbstractedFont,
};
pub use domain::{normalize_domain, validate_domain, DomainError};
pub use view::{HostingFormView, LabeledInput};
pub use workflow::{
    FeedOutcome, FormError, FormErrors, HostingForm, HostingStatus, SubmissionId,
    SubmitRejection, DEFAULT_HOSTING_TIMEOUT, HOSTING_LIST_PATH,
};
