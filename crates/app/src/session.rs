//! One hosting form instance driven over HTTP.
//!
//! A session owns a [`HostingForm`] behind an async mutex, a feed listener
//! task and at most one watchdog. The form decides every transition; this
//! module performs the I/O it asks for and reports completions back tagged
//! with the submission id, so late results of a reset submission are dropped.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex as StdMutex, Weak},
    time::{Duration, Instant},
};

use fonthost_core::{
    types::{HostedDomain, HostedVariant},
    AbstractedFontSource, Catalog, CommitPlan, FeedOutcome, FormError, HostingForm,
    HostingFormView, SubmissionId, SubmitRejection, HOSTING_LIST_PATH,
};
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::{
    sync::{Mutex, RwLock},
    task::{AbortHandle, JoinError, JoinHandle, JoinSet},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, HostingBackend, Navigator};
use crate::events::{SessionEvent, SessionEvents};
use crate::feed::{BufferFeed, FeedDelivery, FeedSubscription};

pub type SharedCatalog = Arc<RwLock<Catalog>>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] SubmitRejection),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("generation dispatch failed: {0}")]
    Dispatch(#[source] BackendError),
}

#[derive(Debug, Error)]
enum CommitError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("commit task failed: {0}")]
    Task(#[from] JoinError),
}

/// Collaborators shared by every session of the process.
#[derive(Clone)]
pub struct SessionDeps {
    pub catalog: SharedCatalog,
    pub backend: Arc<dyn HostingBackend>,
    pub feed: BufferFeed,
    pub hosting_timeout: Duration,
}

struct FormSlot {
    form: HostingForm,
    watchdog: Option<AbortHandle>,
}

impl FormSlot {
    fn cancel_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }
}

struct SessionInner {
    id: Uuid,
    slot: Mutex<FormSlot>,
    catalog: SharedCatalog,
    backend: Arc<dyn HostingBackend>,
    navigator: Arc<dyn Navigator>,
    events: SessionEvents,
    timeout: Duration,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct HostingSession {
    inner: Arc<SessionInner>,
}

impl HostingSession {
    /// Creates the session and subscribes it to the buffer feed.
    pub fn mount(deps: &SessionDeps, events: SessionEvents, navigator: Arc<dyn Navigator>) -> Self {
        let session = Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                slot: Mutex::new(FormSlot {
                    form: HostingForm::new(),
                    watchdog: None,
                }),
                catalog: deps.catalog.clone(),
                backend: deps.backend.clone(),
                navigator,
                events,
                timeout: deps.hosting_timeout,
                listener: StdMutex::new(None),
            }),
        };

        let subscription = deps.feed.subscribe();
        let handle = tokio::spawn(listen(Arc::downgrade(&session.inner), subscription));
        if let Ok(mut listener) = session.inner.listener.lock() {
            *listener = Some(handle);
        }
        info!(stage = "session", session_id = %session.inner.id, "hosting session mounted");
        session
    }

    /// Tears the session down: stops the feed listener and the watchdog.
    /// Calling it more than once is harmless.
    pub async fn unmount(&self) {
        let handle = match self.inner.listener.lock() {
            Ok(mut listener) => listener.take(),
            Err(_) => None,
        };
        let Some(handle) = handle else {
            return;
        };
        handle.abort();
        let _ = handle.await;
        self.inner.slot.lock().await.cancel_watchdog();
        info!(stage = "session", session_id = %self.inner.id, "hosting session unmounted");
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn events(&self) -> &SessionEvents {
        &self.inner.events
    }

    #[cfg(test)]
    pub async fn form(&self) -> HostingForm {
        self.inner.slot.lock().await.form.clone()
    }

    pub async fn view(&self) -> HostingFormView {
        HostingFormView::render(&self.inner.slot.lock().await.form)
    }

    pub async fn set_domain(&self, value: String) {
        self.inner.slot.lock().await.form.set_domain(value);
    }

    pub async fn update_autocomplete(&self, text: String) {
        let catalog = self.inner.catalog.read().await;
        self.inner
            .slot
            .lock()
            .await
            .form
            .update_autocomplete(&catalog, text);
    }

    pub async fn add_font(&self, suggestion_id: &str, variant_id: &str) -> Result<bool, SessionError> {
        let catalog = self.inner.catalog.read().await;
        let mut slot = self.inner.slot.lock().await;
        Ok(slot.form.add_font(&catalog, suggestion_id, variant_id)?)
    }

    pub async fn remove_font(&self, font_id: &str) -> bool {
        self.inner.slot.lock().await.form.remove_font(font_id)
    }

    pub async fn resolve_conflict(&self, font_id: &str) -> usize {
        self.inner.slot.lock().await.form.resolve_conflict(font_id)
    }

    /// Leaves the form for the hosting list.
    pub fn back(&self) {
        self.inner.navigator.navigate(HOSTING_LIST_PATH);
    }

    /// Validates the form, arms the watchdog and dispatches generation.
    pub async fn submit(&self) -> Result<SubmissionId, SessionError> {
        let submission = SubmissionId::new();
        let request = {
            let mut slot = self.inner.slot.lock().await;
            match slot.form.begin_submission(submission) {
                Ok(request) => {
                    slot.watchdog = Some(self.arm_watchdog(submission));
                    self.publish_status(&slot.form);
                    request
                }
                Err(rejection) => {
                    counter!("hosting_submissions_total", "result" => rejection.as_str())
                        .increment(1);
                    self.publish_status(&slot.form);
                    return Err(rejection.into());
                }
            }
        };

        info!(
            stage = "session",
            session_id = %self.inner.id,
            %submission,
            fonts = request.len(),
            "dispatching font generation"
        );
        if let Err(err) = self.inner.backend.dispatch_generation(&request).await {
            error!(
                stage = "session",
                session_id = %self.inner.id,
                %submission,
                error = %err,
                "font generation dispatch failed"
            );
            let mut slot = self.inner.slot.lock().await;
            if slot.form.fail_submission(submission) {
                slot.cancel_watchdog();
                counter!("hosting_submissions_total", "result" => "dispatch_failed").increment(1);
                self.publish_status(&slot.form);
            }
            return Err(SessionError::Dispatch(err));
        }
        Ok(submission)
    }

    fn arm_watchdog(&self, submission: SubmissionId) -> AbortHandle {
        let weak = Arc::downgrade(&self.inner);
        let timeout = self.inner.timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let session = HostingSession { inner };
            let mut slot = session.inner.slot.lock().await;
            if slot.form.watchdog_expired(submission) {
                slot.watchdog = None;
                warn!(
                    stage = "session",
                    session_id = %session.inner.id,
                    %submission,
                    timeout_secs = timeout.as_secs_f64(),
                    "hosting submission timed out"
                );
                counter!("hosting_submissions_total", "result" => "timeout").increment(1);
                session.publish_status(&slot.form);
            }
        });
        task.abort_handle()
    }

    async fn on_delivery(&self, delivery: Arc<FeedDelivery>) {
        let submission = delivery.submission_id;
        let buffers = Arc::try_unwrap(delivery)
            .map(|delivery| delivery.buffers)
            .unwrap_or_else(|shared| shared.buffers.clone());

        let mut slot = self.inner.slot.lock().await;
        match slot.form.accept_buffers(submission, buffers) {
            FeedOutcome::Ignored => {
                debug!(stage = "feed", session_id = %self.inner.id, %submission, "ignoring stray delivery");
                counter!("generation_results_total", "outcome" => "ignored").increment(1);
            }
            FeedOutcome::Rejected(err) => {
                warn!(
                    stage = "feed",
                    session_id = %self.inner.id,
                    %submission,
                    error = %err,
                    "generated buffers do not match the queued fonts"
                );
                slot.cancel_watchdog();
                counter!("generation_results_total", "outcome" => "rejected").increment(1);
                counter!("hosting_submissions_total", "result" => "failed").increment(1);
                self.publish_status(&slot.form);
            }
            FeedOutcome::Commit(plan) => {
                counter!("generation_results_total", "outcome" => "accepted").increment(1);
                info!(
                    stage = "feed",
                    session_id = %self.inner.id,
                    %submission,
                    fonts = plan.items.len(),
                    creations = plan.pending_creations(),
                    "starting hosting commit"
                );
                self.publish_status(&slot.form);
                let session = self.clone();
                tokio::spawn(async move { session.commit(plan).await });
            }
        }
    }

    async fn commit(&self, plan: CommitPlan) {
        let submission = plan.submission_id;
        let started = Instant::now();
        let result = self.execute_plan(plan).await;
        histogram!("hosting_commit_seconds").record(started.elapsed().as_secs_f64());

        let mut slot = self.inner.slot.lock().await;
        match result {
            Ok(Some(domain)) => {
                if slot.form.complete_submission(submission) {
                    slot.cancel_watchdog();
                    info!(
                        stage = "session",
                        session_id = %self.inner.id,
                        %submission,
                        domain = %domain.domain,
                        hosted_fonts = domain.hosted_variants.len(),
                        "fonts hosted"
                    );
                    counter!("hosting_submissions_total", "result" => "hosted").increment(1);
                    self.publish_status(&slot.form);
                    drop(slot);
                    self.inner.navigator.navigate(HOSTING_LIST_PATH);
                }
            }
            Ok(None) => {
                debug!(stage = "session", session_id = %self.inner.id, %submission, "submission superseded during commit");
            }
            Err(err) => {
                error!(
                    stage = "session",
                    session_id = %self.inner.id,
                    %submission,
                    error = %err,
                    "hosting commit failed"
                );
                if slot.form.fail_submission(submission) {
                    slot.cancel_watchdog();
                    counter!("hosting_submissions_total", "result" => "failed").increment(1);
                    self.publish_status(&slot.form);
                }
            }
        }
    }

    /// Runs upload, abstracted-font creation, hosted-font registration and the
    /// hosted-domain commit. Returns `Ok(None)` when the submission stopped
    /// being current between two batches.
    async fn execute_plan(&self, plan: CommitPlan) -> Result<Option<HostedDomain>, CommitError> {
        let submission = plan.submission_id;
        let backend = &self.inner.backend;

        let uploads = plan.items.iter().map(|item| {
            let backend = backend.clone();
            let label = item.label.clone();
            let data = item.buffer.clone();
            async move { backend.upload(&label, data).await }
        });
        let urls = run_batch(uploads).await?;
        if !self.is_current(submission).await {
            return Ok(None);
        }

        let mut abstracted_ids: Vec<Option<String>> = Vec::with_capacity(plan.items.len());
        let mut creations = Vec::new();
        for (index, item) in plan.items.iter().enumerate() {
            match &item.abstracted_font {
                AbstractedFontSource::Existing(id) => abstracted_ids.push(Some(id.clone())),
                AbstractedFontSource::Create(font) => {
                    abstracted_ids.push(None);
                    let backend = backend.clone();
                    let font = font.clone();
                    creations.push((index, async move {
                        backend.create_abstracted_font(&font).await
                    }));
                }
            }
        }
        let (indexes, jobs): (Vec<usize>, Vec<_>) = creations.into_iter().unzip();
        let created = run_batch(jobs).await?;
        if !created.is_empty() {
            let mut catalog = self.inner.catalog.write().await;
            for created in &created {
                if !catalog.record_abstracted_font(created) {
                    warn!(stage = "session", abstracted_font_id = %created.id, "created abstracted font matched nothing in the catalog");
                }
            }
        }
        for (index, created) in indexes.into_iter().zip(created) {
            abstracted_ids[index] = Some(created.id);
        }
        if !self.is_current(submission).await {
            return Ok(None);
        }

        let registrations = abstracted_ids
            .into_iter()
            .zip(urls)
            .map(|(abstracted_id, url)| {
                let backend = backend.clone();
                let abstracted_id = abstracted_id.unwrap_or_default();
                async move { backend.host_font(&abstracted_id, &url).await }
            });
        let hosted: Vec<HostedVariant> = run_batch(registrations).await?;

        {
            let mut slot = self.inner.slot.lock().await;
            if !slot.form.mark_hosting(submission) {
                return Ok(None);
            }
            self.publish_status(&slot.form);
        }

        let creator_id = self.inner.catalog.read().await.user.id.clone();
        let hosted_ids: Vec<String> = hosted.into_iter().map(|variant| variant.id).collect();
        let domain = backend
            .create_hosted_domain(&plan.domain, &creator_id, &hosted_ids)
            .await?;
        self.inner
            .catalog
            .write()
            .await
            .append_hosted_domain(domain.clone());
        Ok(Some(domain))
    }

    async fn is_current(&self, submission: SubmissionId) -> bool {
        self.inner.slot.lock().await.form.is_current(submission)
    }

    fn publish_status(&self, form: &HostingForm) {
        self.inner.events.publish(SessionEvent::status(form));
    }
}

async fn listen(session: Weak<SessionInner>, mut subscription: FeedSubscription) {
    while let Some(delivery) = subscription.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        HostingSession { inner }.on_delivery(delivery).await;
    }
    subscription.unsubscribe();
}

/// Runs the jobs concurrently and returns their results in input order.
///
/// The first failure is returned; calls already in flight keep running but
/// their results are discarded.
async fn run_batch<T, F, I>(jobs: I) -> Result<Vec<T>, CommitError>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, BackendError>> + Send + 'static,
    T: Send + 'static,
{
    let mut set = JoinSet::new();
    let mut len = 0;
    for (index, job) in jobs.into_iter().enumerate() {
        set.spawn(async move { job.await.map(|value| (index, value)) });
        len += 1;
    }

    let mut results: Vec<Option<T>> = (0..len).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok((index, value))) => results[index] = Some(value),
            Ok(Err(err)) => {
                set.detach_all();
                return Err(err.into());
            }
            Err(err) => {
                set.detach_all();
                return Err(err.into());
            }
        }
    }
    Ok(results.into_iter().flatten().collect())
}

struct RegisteredSession {
    session: HostingSession,
    last_seen: tokio::time::Instant,
}

/// Mounted sessions by id. Every lookup refreshes the session's idle clock.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, RegisteredSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: HostingSession) {
        self.sessions.write().await.insert(
            session.id(),
            RegisteredSession {
                session,
                last_seen: tokio::time::Instant::now(),
            },
        );
    }

    pub async fn get(&self, id: Uuid) -> Option<HostingSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = tokio::time::Instant::now();
        Some(entry.session.clone())
    }

    pub async fn remove(&self, id: Uuid) -> Option<HostingSession> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.session)
    }

    /// Unmounts and drops every session idle for at least `idle`.
    /// Returns how many were evicted.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let expired: Vec<HostingSession> = {
            let mut sessions = self.sessions.write().await;
            let now = tokio::time::Instant::now();
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_seen) >= idle)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| sessions.remove(id))
                .map(|entry| entry.session)
                .collect()
        };
        for session in &expired {
            info!(stage = "session", session_id = %session.id(), "evicting idle hosting session");
            session.unmount().await;
        }
        expired.len()
    }

    /// Sweeps idle sessions in the background until the runtime shuts down.
    pub fn spawn_reaper(&self, idle: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(idle / 2);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle(idle).await;
                if evicted > 0 {
                    debug!(stage = "session", evicted, "idle sessions evicted");
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{sync::Mutex as StdMutex, time::Duration};

    use chrono::{TimeZone, Utc};
    use fonthost_core::{
        types::{AbstractedFontRef, CreatedAbstractedFont, HostedDomain, HostedVariant},
        Catalog, GenerationRequest, NewAbstractedFont,
    };
    use serde_json::json;

    use crate::backend::{BackendError, BackendFuture, HostingBackend, Navigator};

    pub fn catalog() -> Catalog {
        serde_json::from_value(json!({
            "user": {
                "id": "user-1",
                "library": [
                    {
                        "id": "fam-grotesk",
                        "name": "Grotesk Display",
                        "template": "venus.ptf",
                        "variants": [
                            {
                                "id": "v-regular",
                                "name": "regular",
                                "weight": 400,
                                "width": "normal",
                                "values": "{\"thickness\": 110}",
                                "abstracted_font": { "id": "af-existing" }
                            },
                            {
                                "id": "v-bold",
                                "name": "bold",
                                "weight": 700,
                                "width": "normal",
                                "values": { "thickness": 140 }
                            }
                        ]
                    }
                ]
            },
            "templates": [
                { "name": "venus", "template_name": "venus.ptf", "family_name": "Spectral Grotesk" }
            ],
            "templates_data": [
                { "name": "venus.ptf", "glyphs": ["A", "B"], "init_values": { "thickness": 80 } }
            ]
        }))
        .expect("catalog fixture")
    }

    #[derive(Debug, Default, Clone)]
    pub struct Calls {
        pub dispatched: Vec<GenerationRequest>,
        pub uploads: Vec<String>,
        pub created: Vec<NewAbstractedFont>,
        pub hosted: Vec<(String, String)>,
        pub domains: Vec<(String, String, Vec<String>)>,
    }

    /// Records every call and answers with canned records.
    #[derive(Default)]
    pub struct FakeBackend {
        pub calls: StdMutex<Calls>,
        pub fail_dispatch: bool,
        pub fail_upload: bool,
        pub upload_delay: Option<Duration>,
    }

    impl FakeBackend {
        pub fn calls(&self) -> Calls {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    fn timestamp() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    impl HostingBackend for FakeBackend {
        fn dispatch_generation<'a>(
            &'a self,
            request: &'a GenerationRequest,
        ) -> BackendFuture<'a, ()> {
            Box::pin(async move {
                if self.fail_dispatch {
                    return Err(BackendError::Unavailable("generator down".to_string()));
                }
                self.calls
                    .lock()
                    .expect("calls lock")
                    .dispatched
                    .push(request.clone());
                Ok(())
            })
        }

        fn upload<'a>(&'a self, label: &'a str, _data: Vec<u8>) -> BackendFuture<'a, String> {
            Box::pin(async move {
                if let Some(delay) = self.upload_delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail_upload {
                    return Err(BackendError::Unavailable("upload refused".to_string()));
                }
                let mut calls = self.calls.lock().expect("calls lock");
                calls.uploads.push(label.to_string());
                Ok(format!("https://files.example.com/tmp/{}", calls.uploads.len()))
            })
        }

        fn create_abstracted_font<'a>(
            &'a self,
            font: &'a NewAbstractedFont,
        ) -> BackendFuture<'a, CreatedAbstractedFont> {
            Box::pin(async move {
                let mut calls = self.calls.lock().expect("calls lock");
                calls.created.push(font.clone());
                Ok(CreatedAbstractedFont {
                    id: format!("af-created-{}", calls.created.len()),
                    kind: font.kind,
                    template: font.template.clone(),
                    preset_id: font.preset_id.clone(),
                    family_id: font.family_id.clone(),
                    variant_id: font.variant_id.clone(),
                })
            })
        }

        fn host_font<'a>(
            &'a self,
            abstracted_font_id: &'a str,
            tmp_file_url: &'a str,
        ) -> BackendFuture<'a, HostedVariant> {
            Box::pin(async move {
                let mut calls = self.calls.lock().expect("calls lock");
                calls
                    .hosted
                    .push((abstracted_font_id.to_string(), tmp_file_url.to_string()));
                Ok(HostedVariant {
                    id: format!("hf-{}", calls.hosted.len()),
                    url: format!("https://fonts.example.com/hf-{}.otf", calls.hosted.len()),
                    created_at: timestamp(),
                    version: Some(1),
                    abstracted_font: Some(AbstractedFontRef {
                        id: abstracted_font_id.to_string(),
                    }),
                })
            })
        }

        fn create_hosted_domain<'a>(
            &'a self,
            domain: &'a str,
            creator_id: &'a str,
            hosted_variant_ids: &'a [String],
        ) -> BackendFuture<'a, HostedDomain> {
            Box::pin(async move {
                self.calls.lock().expect("calls lock").domains.push((
                    domain.to_string(),
                    creator_id.to_string(),
                    hosted_variant_ids.to_vec(),
                ));
                Ok(HostedDomain {
                    id: "hd-1".to_string(),
                    domain: domain.to_string(),
                    updated_at: timestamp(),
                    hosted_variants: Vec::new(),
                })
            })
        }
    }

    #[derive(Default)]
    pub struct RecordingNavigator {
        pub paths: StdMutex<Vec<String>>,
    }

    impl RecordingNavigator {
        pub fn paths(&self) -> Vec<String> {
            self.paths.lock().expect("paths lock").clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, path: &str) {
            self.paths.lock().expect("paths lock").push(path.to_string());
        }
    }
}
