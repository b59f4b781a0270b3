//! Acquisition service
//!
//! Owns the single acquisition slot: at most one session runs at a time,
//! spawned in the background. Status of the last session stays readable
//! after it finishes.

use super::image_intake::{disk_counts, stored_fingerprints, IntakeStats};
use super::location_rotator::LocationRotator;
use super::session_controller::{ControllerDeps, SessionController};
use crate::error::{AcqError, AcqResult};
use crate::models::{AcquisitionParameters, AcquisitionSession, DedupScope, SessionSnapshot};
use crate::sink::{recent_items, statistics, RecordSummary, SinkStatistics};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Aggregate view over the sink and the image store
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub records: SinkStatistics,
    pub images: IntakeStats,
}

struct ActiveRun {
    session: Arc<RwLock<AcquisitionSession>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<SessionSnapshot>>,
}

#[derive(Clone)]
pub struct AcquisitionService {
    params: AcquisitionParameters,
    deps: ControllerDeps,
    slot: Arc<Semaphore>,
    current: Arc<Mutex<Option<ActiveRun>>>,
}

impl AcquisitionService {
    pub fn new(params: AcquisitionParameters, deps: ControllerDeps) -> Self {
        Self {
            params,
            deps,
            slot: Arc::new(Semaphore::new(1)),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn parameters(&self) -> &AcquisitionParameters {
        &self.params
    }

    /// Whether a session currently holds the slot
    pub fn is_running(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Start a session in the background
    ///
    /// Fails with [`AcqError::AlreadyRunning`] while another session is active
    /// and with [`AcqError::InvalidInput`] for an empty target or location list.
    pub async fn start(&self, target_count: usize, locations: Vec<String>) -> AcqResult<Uuid> {
        if target_count == 0 {
            return Err(AcqError::InvalidInput(
                "target_count must be at least 1".to_string(),
            ));
        }
        LocationRotator::new(
            locations.clone(),
            self.params.items_per_location,
            self.params.seed,
        )?;

        let permit = self.slot.clone().try_acquire_owned().map_err(|_| {
            AcqError::AlreadyRunning("Acquisition session already running".to_string())
        })?;

        let controller = SessionController::new(self.params.clone(), self.deps.clone());
        let session = controller.session_handle();
        let cancel = controller.cancellation_token();
        let session_id = controller.session_id().await;

        let handle = tokio::spawn(async move {
            let _permit = permit;
            info!(session_id = %session_id, "Background acquisition task started");

            match controller.run(target_count, locations).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "Acquisition task failed to start");
                    controller.snapshot().await
                }
            }
        });

        *self.current.lock().await = Some(ActiveRun {
            session,
            cancel,
            handle: Some(handle),
        });

        Ok(session_id)
    }

    /// Snapshot of the current or most recent session
    pub async fn status(&self) -> Option<SessionSnapshot> {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(run) => Some(run.session.read().await.snapshot()),
            None => None,
        }
    }

    /// Request cancellation; false when nothing is running
    pub async fn cancel(&self) -> bool {
        let current = self.current.lock().await;
        let Some(run) = current.as_ref() else {
            return false;
        };
        if run.session.read().await.is_terminal() {
            return false;
        }

        info!("Acquisition cancellation requested");
        run.cancel.cancel();
        true
    }

    /// Wait for the background session to finish
    pub async fn wait(&self) -> Option<SessionSnapshot> {
        let (handle, session) = {
            let mut current = self.current.lock().await;
            let run = current.as_mut()?;
            (run.handle.take(), run.session.clone())
        };

        if let Some(handle) = handle {
            match handle.await {
                Ok(snapshot) => return Some(snapshot),
                Err(e) => error!(error = %e, "Acquisition task panicked"),
            }
        }

        let snapshot = session.read().await.snapshot();
        Some(snapshot)
    }

    pub async fn stats(&self) -> AcqResult<ServiceStats> {
        let records = statistics(self.deps.sink.as_ref()).await?;
        let (total_images, total_thumbnails) = disk_counts(&self.deps.image_dir);
        // a session's live table wins; otherwise only a persistent table survives between runs
        let unique_fingerprints = match self.status().await {
            Some(status) => status.unique_fingerprints,
            None if self.params.dedup == DedupScope::Persistent => {
                stored_fingerprints(&self.deps.image_dir)
            }
            None => 0,
        };

        Ok(ServiceStats {
            records,
            images: IntakeStats {
                total_images,
                total_thumbnails,
                unique_fingerprints,
            },
        })
    }

    /// Newest accepted records first
    pub async fn recent_items(&self, limit: usize) -> AcqResult<Vec<RecordSummary>> {
        Ok(recent_items(self.deps.sink.as_ref(), limit).await?)
    }
}
