//! Acquisition session controller
//!
//! Drives one run through the state machine
//! IDLE → INITIALIZING → LOGGEDIN → ACQUIRING ⇄ ROTATING → COMPLETED | ABORTED.
//!
//! The loop is strictly sequential: the automation surface is a single
//! stateful session. Cancellation is cooperative and checked once per
//! iteration. The surface is shut down on every exit path once created.

use super::image_fetcher::{should_skip, ImageFetcher};
use super::image_intake::{ImageIntake, IntakeOutcome};
use super::label_synthesizer::{LabelContext, LabelSchema, LabelSynthesizer};
use super::location_rotator::LocationRotator;
use super::naming::{format_item_id, image_filename};
use crate::error::{AcqError, AcqResult};
use crate::models::{
    AcquisitionParameters, AcquisitionSession, AcquisitionState, ItemRecord, ItemStatus,
    SessionSnapshot,
};
use crate::sink::{
    data_rows, error_row, event_row, record_row, EventStatus, Row, Sink, SinkError, SinkTable,
};
use crate::surface::{
    AutomationSurface, Credentials, FetchOutcome, RawImage, RawItem, SurfaceError, SurfaceFactory,
};
use crate::utils::retry_with_timeout;
use chrono::Utc;
use gleaner_common::events::{AcquisitionEvent, EventBus};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Collaborators of a controller
#[derive(Clone)]
pub struct ControllerDeps {
    pub factory: Arc<dyn SurfaceFactory>,
    pub sink: Arc<dyn Sink>,
    pub event_bus: EventBus,
    pub credentials: Credentials,
    /// Image store (thumbnails live in its `thumbnails/` subdirectory)
    pub image_dir: PathBuf,
    pub label_schema: LabelSchema,
}

pub struct SessionController {
    params: AcquisitionParameters,
    deps: ControllerDeps,
    session: Arc<RwLock<AcquisitionSession>>,
    cancel: CancellationToken,
}

/// Per-run working state
struct Run<'a> {
    ctl: &'a SessionController,
    surface: &'a dyn AutomationSurface,
    rotator: LocationRotator,
    intake: ImageIntake,
    synthesizer: LabelSynthesizer,
    fetcher: ImageFetcher,
    /// Location the surface is currently set to
    surface_location: Option<String>,
    next_item_id: u64,
    target_count: usize,
    accepted: usize,
}

impl SessionController {
    pub fn new(params: AcquisitionParameters, deps: ControllerDeps) -> Self {
        Self {
            params,
            deps,
            session: Arc::new(RwLock::new(AcquisitionSession::new(0, Vec::new()))),
            cancel: CancellationToken::new(),
        }
    }

    /// Shared handle for status reads
    pub fn session_handle(&self) -> Arc<RwLock<AcquisitionSession>> {
        self.session.clone()
    }

    /// Token that stops the run at the next loop iteration
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn session_id(&self) -> uuid::Uuid {
        self.session.read().await.session_id
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.read().await.snapshot()
    }

    /// Run one acquisition session to a terminal state
    ///
    /// Returns `Err` only when the inputs are rejected before the run starts;
    /// every failure after that is reported through the terminal snapshot.
    pub async fn run(
        &self,
        target_count: usize,
        locations: Vec<String>,
    ) -> AcqResult<SessionSnapshot> {
        if target_count == 0 {
            return Err(AcqError::InvalidInput(
                "target_count must be at least 1".to_string(),
            ));
        }
        if self.session.read().await.state != AcquisitionState::Idle {
            return Err(AcqError::InvalidInput(
                "controller has already been run".to_string(),
            ));
        }
        self.params.validate().map_err(AcqError::InvalidInput)?;

        let rotator = LocationRotator::new(
            locations.clone(),
            self.params.items_per_location,
            self.params.seed,
        )?;
        let intake = ImageIntake::open(
            &self.deps.image_dir,
            self.params.intake.clone(),
            self.params.dedup,
        )?;
        let fetcher = ImageFetcher::new(self.surface_timeout(), self.params.surface_retries)
            .map_err(|e| AcqError::Common(gleaner_common::Error::Internal(e.to_string())))?;
        let synthesizer = LabelSynthesizer::new(self.deps.label_schema.clone(), self.params.seed);
        let next_item_id = self.next_item_id(&intake).await;

        let session_id = {
            let mut session = self.session.write().await;
            session.target_count = target_count;
            session.locations = locations.clone();
            session.started_at = Utc::now();
            session.location_stats = rotator.summaries();
            session.session_id
        };

        self.transition(AcquisitionState::Initializing).await?;
        self.deps.event_bus.emit_lossy(AcquisitionEvent::SessionStarted {
            session_id,
            target_count,
            locations: locations.clone(),
            timestamp: Utc::now(),
        });
        info!(
            session_id = %session_id,
            target_count,
            locations = ?locations,
            "Acquisition session started"
        );

        let factory = &self.deps.factory;
        let surface = match retry_with_timeout(
            "create surface",
            self.params.surface_retries,
            self.surface_timeout(),
            move || factory.create(),
        )
        .await
        {
            Ok(surface) => surface,
            Err(e) => return Ok(self.abort(AcqError::DriverInit(e.to_string()), None).await),
        };

        let mut run = Run {
            ctl: self,
            surface: surface.as_ref(),
            rotator,
            intake,
            synthesizer,
            fetcher,
            surface_location: None,
            next_item_id,
            target_count,
            accepted: 0,
        };
        let outcome = run.drive().await;
        let location = run.surface_location.clone();
        drop(run);

        // teardown is guaranteed once the surface exists
        match tokio::time::timeout(self.surface_timeout(), surface.shutdown()).await {
            Ok(Ok(())) => debug!(session_id = %session_id, "Automation surface released"),
            Ok(Err(e)) => warn!(session_id = %session_id, error = %e, "Surface shutdown failed"),
            Err(_) => warn!(session_id = %session_id, "Surface shutdown timed out"),
        }

        Ok(match outcome {
            Ok(exhausted) => self.complete(exhausted).await,
            Err(e) => self.abort(e, location.as_deref()).await,
        })
    }

    fn surface_timeout(&self) -> Duration {
        Duration::from_secs(self.params.surface_timeout_secs)
    }

    /// First unused item id, from stored filenames and sink rows
    async fn next_item_id(&self, intake: &ImageIntake) -> u64 {
        let mut max = intake.max_item_id().unwrap_or(0);

        for table in [SinkTable::ExtractedRecords, SinkTable::ExtractionEvents] {
            match self.deps.sink.read(table).await {
                Ok(rows) => {
                    let highest = data_rows(table, rows)
                        .iter()
                        .filter_map(|r| r.get(1).and_then(|id| id.parse::<u64>().ok()))
                        .max()
                        .unwrap_or(0);
                    max = max.max(highest);
                }
                Err(e) => warn!(table = table.name(), error = %e, "Cannot read sink for item ids"),
            }
        }

        max + 1
    }

    async fn transition(&self, new_state: AcquisitionState) -> AcqResult<()> {
        let transition = self.session.write().await.transition_to(new_state)?;
        debug!(
            session_id = %transition.session_id,
            from = %transition.old_state,
            to = %transition.new_state,
            "State transition"
        );
        self.deps.event_bus.emit_lossy(AcquisitionEvent::StateChanged {
            session_id: transition.session_id,
            old_state: transition.old_state.to_string(),
            new_state: transition.new_state.to_string(),
            timestamp: transition.transitioned_at,
        });
        Ok(())
    }

    async fn complete(&self, exhausted: bool) -> SessionSnapshot {
        self.session.write().await.exhausted = exhausted;
        if let Err(e) = self.transition(AcquisitionState::Completed).await {
            return self.abort(e, None).await;
        }

        let snapshot = self.snapshot().await;
        let duration_seconds = self.session.read().await.duration_seconds();
        info!(
            session_id = %snapshot.session_id,
            accepted = snapshot.accepted_count,
            skipped = snapshot.skipped_count,
            errored = snapshot.errored_count,
            exhausted,
            duration_seconds,
            "Acquisition session completed"
        );
        self.deps.event_bus.emit_lossy(AcquisitionEvent::SessionCompleted {
            session_id: snapshot.session_id,
            accepted: snapshot.accepted_count,
            exhausted,
            duration_seconds,
            timestamp: Utc::now(),
        });
        snapshot
    }

    async fn abort(&self, err: AcqError, location: Option<&str>) -> SessionSnapshot {
        let message = err.to_string();
        let fatal = err.is_fatal();
        self.session
            .write()
            .await
            .add_error(err.error_type(), &message, location, None);
        self.log_error(err.error_type(), &message, location.unwrap_or_default(), None)
            .await;
        if let Err(e) = self.transition(AcquisitionState::Aborted).await {
            error!(error = %e, "Session could not be marked aborted");
        }

        let snapshot = self.snapshot().await;
        error!(
            session_id = %snapshot.session_id,
            accepted = snapshot.accepted_count,
            error = %message,
            fatal,
            "Acquisition session aborted"
        );
        self.deps.event_bus.emit_lossy(AcquisitionEvent::SessionAborted {
            session_id: snapshot.session_id,
            accepted: snapshot.accepted_count,
            error_message: message,
            timestamp: Utc::now(),
        });
        snapshot
    }

    /// Append with bounded retries
    async fn append_with_retry(&self, table: SinkTable, rows: Vec<Row>) -> Result<(), SinkError> {
        let sink = &self.deps.sink;
        let rows = rows.as_slice();
        retry_with_timeout(
            "sink append",
            self.params.sink_retries,
            self.surface_timeout(),
            move || sink.append(table, rows),
        )
        .await
    }

    /// Best-effort extraction event
    async fn log_event(&self, item_id: &str, location: &str, status: EventStatus, details: &str) {
        let row = event_row(Utc::now(), item_id, location, status, details);
        if let Err(e) = self.append_with_retry(SinkTable::ExtractionEvents, vec![row]).await {
            warn!(item_id, location, status = status.as_str(), error = %e, "Failed to log extraction event");
        }
    }

    /// Best-effort error event
    async fn log_error(&self, error_type: &str, message: &str, location: &str, item_id: Option<&str>) {
        let row = error_row(Utc::now(), error_type, message, location, item_id);
        if let Err(e) = self.append_with_retry(SinkTable::ErrorEvents, vec![row]).await {
            warn!(error_type, location, error = %e, "Failed to log error event");
        }
    }
}

impl<'a> Run<'a> {
    /// LOGGEDIN → ACQUIRING loop; `Ok(true)` when locations ran out
    async fn drive(&mut self) -> AcqResult<bool> {
        let credentials = &self.ctl.deps.credentials;
        let surface = self.surface;
        self.surface_call("authenticate", move || surface.authenticate(credentials))
            .await
            .map_err(|e| AcqError::Auth(e.to_string()))?;
        self.ctl.transition(AcquisitionState::LoggedIn).await?;
        let session_id = self.ctl.session_id().await;
        info!(session_id = %session_id, "Authenticated");

        self.ctl.transition(AcquisitionState::Acquiring).await?;
        let initial = self.rotator.current().to_string();
        self.activate(None, initial).await?;

        loop {
            if self.ctl.cancel.is_cancelled() {
                return Err(AcqError::Cancelled);
            }
            if self.accepted >= self.target_count {
                return Ok(false);
            }

            let current = self.rotator.current().to_string();
            if self.rotator.should_rotate(&current) || self.rotator.is_exhausted(&current) {
                if !self.rotate(&current).await? {
                    return Ok(true);
                }
                continue;
            }

            if self.surface_location.as_deref() != Some(current.as_str()) {
                let from = self.surface_location.clone();
                self.activate(from, current.clone()).await?;
            }

            let surface = self.surface;
            match self.surface_call("fetch_next_item", move || surface.fetch_next_item()).await? {
                FetchOutcome::NoMoreItems => {
                    info!(location = %current, "Location has no more items");
                    self.rotator.mark_exhausted(&current)?;
                }
                FetchOutcome::Item(raw) => {
                    self.process_item(&current, &raw).await?;
                    self.surface_call("reject_current_item", move || surface.reject_current_item())
                        .await?;
                }
            }
        }
    }

    async fn surface_call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, SurfaceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SurfaceError>>,
    {
        retry_with_timeout(
            operation,
            self.ctl.params.surface_retries,
            self.ctl.surface_timeout(),
            f,
        )
        .await
    }

    /// ACQUIRING → ROTATING → ACQUIRING; false when no location is left
    async fn rotate(&mut self, from: &str) -> AcqResult<bool> {
        self.ctl.transition(AcquisitionState::Rotating).await?;

        let Some(next) = self.rotator.select(self.ctl.params.rotation).map(str::to_string) else {
            info!(from, "All locations exhausted or at quota");
            self.ctl.transition(AcquisitionState::Acquiring).await?;
            return Ok(false);
        };

        self.activate(Some(from.to_string()), next).await?;
        self.ctl.transition(AcquisitionState::Acquiring).await?;
        Ok(true)
    }

    async fn activate(&mut self, from: Option<String>, to: String) -> AcqResult<()> {
        let surface = self.surface;
        let target = to.as_str();
        self.surface_call("set_active_location", move || surface.set_active_location(target))
            .await?;
        self.surface_location = Some(to.clone());

        let session_id = {
            let mut session = self.ctl.session.write().await;
            session.current_location = Some(to.clone());
            session.session_id
        };

        info!(session_id = %session_id, from = ?from, to = %to, "Active location changed");
        self.ctl
            .log_event("", &to, EventStatus::LocationChange, &format!("Changed location to {}", to))
            .await;
        self.ctl.deps.event_bus.emit_lossy(AcquisitionEvent::LocationRotated {
            session_id,
            from,
            to,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn process_item(&mut self, location: &str, raw: &RawItem) -> AcqResult<()> {
        let item_id = format_item_id(self.next_item_id);
        self.next_item_id += 1;
        let mut item = ItemRecord::new(item_id.clone(), location.to_string());

        let surface = self.surface;
        let images = self
            .surface_call("extract_images", move || surface.extract_images(raw))
            .await?;
        debug!(item_id = %item_id, location, candidates = images.len(), "Item images extracted");

        for raw_image in images {
            let (bytes, source_url) = match raw_image {
                RawImage::Bytes { data, source_url } => (data, source_url),
                RawImage::Url(url) => {
                    if should_skip(&url) {
                        debug!(item_id = %item_id, "Skipping non-image URL");
                        continue;
                    }
                    match self.fetcher.fetch(&url).await {
                        Ok(bytes) => (bytes, Some(url)),
                        Err(e) => {
                            warn!(item_id = %item_id, url = %url, error = %e, "Image download failed");
                            self.ctl
                                .log_error("Image Download", &e.to_string(), location, Some(&item_id))
                                .await;
                            continue;
                        }
                    }
                }
            };

            let filename = image_filename(self.intake.next_sequence(), location, &item_id);
            match self.intake.ingest(&bytes, &filename) {
                IntakeOutcome::Stored(mut reference) => {
                    reference.source_url = source_url;
                    item.push_image(reference);
                }
                IntakeOutcome::Duplicate {
                    fingerprint,
                    existing,
                } => {
                    debug!(item_id = %item_id, fingerprint = %fingerprint, existing = %existing, "Duplicate image skipped");
                }
                IntakeOutcome::Invalid(reason) => {
                    let err = AcqError::from(reason);
                    debug!(item_id = %item_id, error_type = err.error_type(), error = %err, "Invalid image skipped");
                }
            }
        }

        let usable = item.image_count();
        if usable < self.ctl.params.min_images_per_item {
            self.skip_item(&mut item, usable).await?;
            return Ok(());
        }

        let context = LabelContext {
            anchors: raw.attributes.clone(),
        };
        let labels = self.synthesizer.synthesize(&context);
        if let Err(e) = self.synthesizer.validate(&labels) {
            return self.fail_item(&mut item, e.into()).await;
        }
        item.set_labels(labels);

        let row = match record_row(&item, Utc::now()) {
            Ok(row) => row,
            Err(e) => return self.fail_item(&mut item, e.into()).await,
        };
        if let Err(e) = self
            .ctl
            .append_with_retry(SinkTable::ExtractedRecords, vec![row])
            .await
        {
            return self.fail_item(&mut item, e.into()).await;
        }

        item.finalize(ItemStatus::Accepted);
        self.rotator.record(location, 1, 0, 0)?;
        self.accepted += 1;

        let session_id = self.update_session(|s| s.accepted += 1).await;
        info!(
            session_id = %session_id,
            item_id = %item_id,
            location,
            images = usable,
            accepted = self.accepted,
            target = self.target_count,
            "Item accepted"
        );
        self.ctl
            .log_event(&item_id, location, EventStatus::Scraped, &format!("Scraped {} images", usable))
            .await;
        self.ctl.deps.event_bus.emit_lossy(AcquisitionEvent::ItemAccepted {
            session_id,
            item_id,
            location: location.to_string(),
            image_count: usable,
            accepted_total: self.accepted,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn skip_item(&mut self, item: &mut ItemRecord, usable: usize) -> AcqResult<()> {
        self.intake.discard(&item.images);
        item.finalize(ItemStatus::Skipped);
        self.rotator.record(&item.location, 0, 1, 0)?;

        let session_id = self.update_session(|s| s.skipped += 1).await;
        warn!(
            session_id = %session_id,
            item_id = %item.item_id,
            location = %item.location,
            usable,
            required = self.ctl.params.min_images_per_item,
            "Item skipped: insufficient images"
        );
        self.ctl
            .log_event(
                &item.item_id,
                &item.location,
                EventStatus::Skipped,
                &format!("Insufficient images: {}", usable),
            )
            .await;
        self.ctl.deps.event_bus.emit_lossy(AcquisitionEvent::ItemSkipped {
            session_id,
            item_id: item.item_id.clone(),
            location: item.location.clone(),
            usable_images: usable,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Drop an item after a labeling or sink failure; the session continues
    async fn fail_item(&mut self, item: &mut ItemRecord, err: AcqError) -> AcqResult<()> {
        self.intake.discard(&item.images);
        item.finalize(ItemStatus::Errored);
        self.rotator.record(&item.location, 0, 0, 1)?;

        let message = err.to_string();
        let session_id = {
            let mut session = self.ctl.session.write().await;
            session.errored += 1;
            session.add_error(err.error_type(), &message, Some(&item.location), Some(&item.item_id));
            session.location_stats = self.rotator.summaries();
            session.unique_fingerprints = self.intake.unique_fingerprints();
            session.session_id
        };

        error!(
            session_id = %session_id,
            item_id = %item.item_id,
            location = %item.location,
            error = %message,
            "Item dropped"
        );
        self.ctl
            .log_error(err.error_type(), &message, &item.location, Some(&item.item_id))
            .await;
        self.ctl
            .log_event(&item.item_id, &item.location, EventStatus::Errored, &message)
            .await;
        self.ctl.deps.event_bus.emit_lossy(AcquisitionEvent::ItemErrored {
            session_id,
            item_id: item.item_id.clone(),
            location: item.location.clone(),
            reason: message,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Apply `f` and refresh derived counters; returns the session id
    async fn update_session(&self, f: impl FnOnce(&mut AcquisitionSession)) -> uuid::Uuid {
        let mut session = self.ctl.session.write().await;
        f(&mut session);
        session.location_stats = self.rotator.summaries();
        session.unique_fingerprints = self.intake.unique_fingerprints();
        session.session_id
    }
}
