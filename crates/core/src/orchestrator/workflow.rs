//! The per-upload site processing workflow.
//!
//! EXTRACT -> DISPATCH -> AWAIT_EXTERNAL -> FANOUT{site node || imagery}
//! -> PERSIST_RASTER_RESULTS -> ANALYSIS -> done.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{JobOutcome, JobStage, OrchestratorError};
use crate::activities::Activities;
use crate::analysis::{AnalysisRequest, AnalysisSubOrchestrator};
use crate::audit::{AuditEvent, AuditHandle};
use crate::event_bus::{CorrelationEventBus, CorrelationKey, EventBusError};
use crate::imagery::{ImageryRequest, ImagerySubOrchestrator};
use crate::job::{extract_metadata, ExtractError, ProcessFileRequest, ProcessingJob};
use crate::metrics;
use crate::site::Coordinates;

/// Receives stage transitions of a running instance.
#[async_trait]
pub trait StageObserver: Send + Sync {
    async fn stage_changed(&self, stage: JobStage, site_id: Option<&str>);
}

/// Observer that ignores every transition.
pub struct NoopObserver;

#[async_trait]
impl StageObserver for NoopObserver {
    async fn stage_changed(&self, _stage: JobStage, _site_id: Option<&str>) {}
}

/// Stage bookkeeping for one run.
struct Progress<'a> {
    instance_id: &'a str,
    site_id: Option<String>,
    stage: JobStage,
    cancel: &'a CancellationToken,
    observer: &'a dyn StageObserver,
}

/// Drives one uploaded file through the pipeline.
pub struct SiteProcessingWorkflow {
    bus: Arc<CorrelationEventBus>,
    activities: Activities,
    imagery: Option<Arc<ImagerySubOrchestrator>>,
    analysis: Arc<AnalysisSubOrchestrator>,
    audit: Option<AuditHandle>,
    external_event_timeout: Option<Duration>,
}

impl SiteProcessingWorkflow {
    pub fn new(
        bus: Arc<CorrelationEventBus>,
        activities: Activities,
        analysis: Arc<AnalysisSubOrchestrator>,
    ) -> Self {
        Self {
            bus,
            activities,
            imagery: None,
            analysis,
            audit: None,
            external_event_timeout: None,
        }
    }

    /// Enable satellite imagery generation.
    pub fn with_imagery(mut self, imagery: Arc<ImagerySubOrchestrator>) -> Self {
        self.imagery = Some(imagery);
        self
    }

    pub fn with_audit(mut self, audit: Option<AuditHandle>) -> Self {
        self.audit = audit;
        self
    }

    /// Bound the wait for the completion event. `None` waits forever.
    pub fn with_external_event_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.external_event_timeout = timeout;
        self
    }

    pub fn bus(&self) -> &Arc<CorrelationEventBus> {
        &self.bus
    }

    /// Hand the job to the external processors through the event bus.
    pub async fn initiate_pipeline(
        &self,
        job: &ProcessingJob,
    ) -> Result<CorrelationKey, OrchestratorError> {
        let key = self
            .bus
            .dispatch(job)
            .await
            .map_err(OrchestratorError::Dispatch)?;
        self.emit(AuditEvent::JobDispatched {
            instance_id: job.instance_id.clone(),
            site_id: job.site_id.clone(),
            event_name: job.event_name.clone(),
        })
        .await;
        Ok(key)
    }

    /// Run the pipeline for `request`.
    ///
    /// `started_at` seeds the site id, so a replay with the same start time
    /// derives the same id. Cancellation is honored between stages and while
    /// waiting for the completion event.
    pub async fn run(
        &self,
        instance_id: &str,
        request: &ProcessFileRequest,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
        observer: &dyn StageObserver,
    ) -> Result<JobOutcome, OrchestratorError> {
        let mut progress = Progress {
            instance_id,
            site_id: None,
            stage: JobStage::Submitted,
            cancel,
            observer,
        };

        // EXTRACT
        self.enter(&mut progress, JobStage::Extract).await?;
        let job = match extract_metadata(request, instance_id, started_at) {
            Ok(job) => job,
            Err(ExtractError::UnsupportedFileType(file_name)) => {
                warn!(
                    "Instance {} stops: unsupported file type for {}",
                    instance_id, file_name
                );
                return Ok(JobOutcome::Unsupported { file_name });
            }
            Err(e @ ExtractError::MissingFileName) => {
                return Err(OrchestratorError::InvalidRequest(e.to_string()));
            }
        };
        progress.site_id = Some(job.site_id.clone());
        let site_id = job.site_id.as_str();

        // DISPATCH
        self.enter(&mut progress, JobStage::Dispatch).await?;
        let key = self.initiate_pipeline(&job).await?;

        // AWAIT_EXTERNAL
        if let Err(e) = self.enter(&mut progress, JobStage::AwaitExternal).await {
            self.bus.release(&key).await;
            return Err(e);
        }
        let waited = Instant::now();
        let result = self
            .bus
            .await_completion(&key, self.external_event_timeout, cancel)
            .await
            .map_err(|e| match e {
                EventBusError::Timeout { key, timeout } => OrchestratorError::ExternalEventTimeout {
                    key: key.to_string(),
                    timeout,
                },
                EventBusError::Cancelled(_) => {
                    OrchestratorError::Cancelled(instance_id.to_string())
                }
                other => OrchestratorError::EventBus(other),
            })?;
        let waited_secs = waited.elapsed().as_secs_f64();
        metrics::EXTERNAL_WAIT_SECONDS
            .with_label_values(&[&job.event_name])
            .observe(waited_secs);
        self.emit(AuditEvent::ExternalEventReceived {
            instance_id: instance_id.to_string(),
            event_name: job.event_name.clone(),
            status: result.status.clone(),
            waited_secs,
        })
        .await;

        if !result.is_success() {
            let reason = format!(
                "processing {} for site {}: {}",
                result.status,
                site_id,
                result.error_message.as_deref().unwrap_or("no error message")
            );
            warn!("Aborting instance {}: {}", instance_id, reason);
            return Ok(JobOutcome::Aborted { reason });
        }

        let coordinates = resolve_coordinates(request.coordinates, result.coordinates());
        if !coordinates.is_valid() {
            let reason = format!("no usable coordinates for site {}", site_id);
            warn!("Aborting instance {}: {}", instance_id, reason);
            return Ok(JobOutcome::Aborted { reason });
        }
        info!(
            "Processing completed for {} & site {} at {}, {}",
            instance_id, site_id, coordinates.latitude, coordinates.longitude
        );

        // FANOUT: site node || imagery generation. Images are attached once
        // both branches are in, so the node always exists by then.
        self.enter(&mut progress, JobStage::Fanout).await?;
        let imagery_request = ImageryRequest::from_parameters(site_id, coordinates, &job.parameters);
        let imagery_branch = async {
            match &self.imagery {
                Some(imagery) => imagery.generate_all(&imagery_request).await,
                None => {
                    debug!("Satellite imagery disabled for site {}", site_id);
                    None
                }
            }
        };
        let (node, generated) = tokio::join!(
            self.activities
                .instantiate_site_node(site_id, coordinates, request.user.clone()),
            imagery_branch,
        );
        node?;

        let imagery = match (&self.imagery, generated) {
            (Some(sub), Some(generated)) => sub.persist(generated, coordinates).await,
            _ => None,
        };
        if let Some(imagery) = &imagery {
            self.emit(AuditEvent::ImageryCompleted {
                instance_id: instance_id.to_string(),
                site_id: site_id.to_string(),
                generated: imagery.generated_count(),
            })
            .await;
        }

        // PERSIST_RASTER_RESULTS
        self.enter(&mut progress, JobStage::PersistRasterResults).await?;
        self.activities
            .persist_raster_results(site_id, &result, coordinates)
            .await?;

        // ANALYSIS
        self.enter(&mut progress, JobStage::Analysis).await?;
        let analysis_request = AnalysisRequest::new(site_id, coordinates)
            .with_user(request.user.as_ref().map(|u| u.id.clone()))
            .with_raster_results(&result)
            .with_imagery(imagery.as_ref());
        let outcome = self.analysis.run(analysis_request).await;
        self.emit(AuditEvent::AnalysisCompleted {
            instance_id: instance_id.to_string(),
            site_id: site_id.to_string(),
            groups: outcome.groups.clone(),
            mean_confidence: outcome.mean_confidence,
            verdict: outcome.verdict.to_string(),
            turns: outcome.turns,
        })
        .await;

        self.enter(&mut progress, JobStage::Done).await?;
        info!("Instance {} finished site {}", instance_id, site_id);

        Ok(JobOutcome::Completed {
            site_id: site_id.to_string(),
            analysis: Some(outcome),
        })
    }

    /// Cancellation checkpoint plus stage transition.
    async fn enter(
        &self,
        progress: &mut Progress<'_>,
        stage: JobStage,
    ) -> Result<(), OrchestratorError> {
        if progress.cancel.is_cancelled() {
            return Err(OrchestratorError::Cancelled(
                progress.instance_id.to_string(),
            ));
        }

        debug!(
            "Instance {} {} -> {}",
            progress.instance_id, progress.stage, stage
        );
        self.emit(AuditEvent::JobStageChanged {
            instance_id: progress.instance_id.to_string(),
            site_id: progress.site_id.clone(),
            from_stage: progress.stage.to_string(),
            to_stage: stage.to_string(),
        })
        .await;
        progress.stage = stage;
        progress
            .observer
            .stage_changed(stage, progress.site_id.as_deref())
            .await;
        Ok(())
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.emit(event).await;
        }
    }
}

/// The uploader's coordinates win when usable; otherwise the processor's.
fn resolve_coordinates(supplied: Option<Coordinates>, reported: Coordinates) -> Coordinates {
    match supplied {
        Some(coords) if coords.is_valid() => coords,
        _ => reported,
    }
}
