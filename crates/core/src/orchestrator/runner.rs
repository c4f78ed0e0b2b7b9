//! Site orchestrator host.
//!
//! Owns the running instances: one tokio task per uploaded file, each with
//! its own child cancellation token, plus the bookkeeping behind
//! [`SiteOrchestrator::instance`] and [`SiteOrchestrator::status`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::event_bus::{CorrelationKey, EventBusError, ProcessingResult};
use crate::job::ProcessFileRequest;
use crate::metrics;

use super::config::OrchestratorConfig;
use super::types::{
    InstanceRecord, InstanceState, JobOutcome, JobStage, OrchestratorError, OrchestratorStatus,
};
use super::workflow::{SiteProcessingWorkflow, StageObserver};

struct InstanceSlot {
    record: InstanceRecord,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    /// Fired once the terminal record is written.
    done: CancellationToken,
}

/// Instance slots plus the order in which they finished.
struct InstanceTable {
    slots: HashMap<String, InstanceSlot>,
    finished: VecDeque<String>,
    /// Finished records kept; 0 keeps all.
    retained: usize,
}

impl InstanceTable {
    fn new(retained: usize) -> Self {
        Self {
            slots: HashMap::new(),
            finished: VecDeque::new(),
            retained,
        }
    }

    /// Note that `instance_id` finished and evict the oldest finished
    /// records over the retention limit.
    fn mark_finished(&mut self, instance_id: &str) {
        self.finished.push_back(instance_id.to_string());
        if self.retained == 0 {
            return;
        }
        while self.finished.len() > self.retained {
            if let Some(evicted) = self.finished.pop_front() {
                debug!("Evicting finished instance {}", evicted);
                self.slots.remove(&evicted);
            }
        }
    }
}

type Instances = Arc<RwLock<InstanceTable>>;

/// Mirrors stage transitions into the host's instance record.
struct RecordUpdater {
    instance_id: String,
    instances: Instances,
}

#[async_trait]
impl StageObserver for RecordUpdater {
    async fn stage_changed(&self, stage: JobStage, site_id: Option<&str>) {
        let mut instances = self.instances.write().await;
        match instances.slots.get_mut(&self.instance_id) {
            Some(slot) => {
                slot.record.stage = stage;
                if let Some(site_id) = site_id {
                    slot.record.site_id = Some(site_id.to_string());
                }
                slot.record.updated_at = Utc::now();
            }
            None => warn!(
                "Stage change for unknown instance {}: {}",
                self.instance_id, stage
            ),
        }
    }
}

/// Runs site processing instances.
pub struct SiteOrchestrator {
    config: OrchestratorConfig,
    workflow: Arc<SiteProcessingWorkflow>,
    audit: Option<AuditHandle>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown: CancellationToken,
    instances: Instances,
}

impl SiteOrchestrator {
    /// Create a host that accepts jobs immediately.
    ///
    /// The configured external event timeout and the audit handle are
    /// applied to `workflow`.
    pub fn new(
        config: OrchestratorConfig,
        workflow: SiteProcessingWorkflow,
        audit: Option<AuditHandle>,
    ) -> Self {
        let workflow = workflow
            .with_external_event_timeout(config.external_event_timeout())
            .with_audit(audit.clone());

        let instances = Arc::new(RwLock::new(InstanceTable::new(config.retained_instances)));

        Self {
            config,
            workflow: Arc::new(workflow),
            audit,
            running: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
            instances,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start an instance for `request`. Returns its id.
    pub async fn submit(&self, request: ProcessFileRequest) -> Result<String, OrchestratorError> {
        if !self.is_running() {
            return Err(OrchestratorError::Stopped);
        }
        if request.file_name.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "file name is missing".to_string(),
            ));
        }

        let instance_id = uuid::Uuid::new_v4().to_string();
        let user_id = request.user.as_ref().map(|u| u.id.clone());
        let record = InstanceRecord::new(&instance_id, &request.file_name, user_id.clone());
        let started_at = record.created_at;
        let cancel = self.shutdown.child_token();

        {
            let mut instances = self.instances.write().await;
            let running: Vec<&InstanceRecord> = instances
                .slots
                .values()
                .map(|slot| &slot.record)
                .filter(|r| r.state == InstanceState::Running)
                .collect();

            if running.iter().any(|r| r.file_name == request.file_name) {
                return Err(OrchestratorError::DuplicateJob(request.file_name));
            }
            if self.config.max_instances > 0 && running.len() >= self.config.max_instances {
                return Err(OrchestratorError::AtCapacity(running.len()));
            }

            instances.slots.insert(
                instance_id.clone(),
                InstanceSlot {
                    record,
                    cancel: cancel.clone(),
                    handle: None,
                    done: CancellationToken::new(),
                },
            );
        }

        info!(
            "Submitted instance {} for file {}",
            instance_id, request.file_name
        );
        metrics::JOBS_IN_FLIGHT.inc();
        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::JobSubmitted {
                    instance_id: instance_id.clone(),
                    file_name: request.file_name.clone(),
                    user_id,
                })
                .await;
        }

        let workflow = Arc::clone(&self.workflow);
        let instances = Arc::clone(&self.instances);
        let audit = self.audit.clone();
        let id = instance_id.clone();

        let handle = tokio::spawn(async move {
            let observer = RecordUpdater {
                instance_id: id.clone(),
                instances: Arc::clone(&instances),
            };
            let result = workflow
                .run(&id, &request, started_at, &cancel, &observer)
                .await;
            Self::finish(&id, result, &instances, &audit).await;
        });

        if let Some(slot) = self.instances.write().await.slots.get_mut(&instance_id) {
            if !slot.record.state.is_terminal() {
                slot.handle = Some(handle);
            }
        }

        Ok(instance_id)
    }

    /// Record the terminal state of an instance.
    async fn finish(
        instance_id: &str,
        result: Result<JobOutcome, OrchestratorError>,
        instances: &Instances,
        audit: &Option<AuditHandle>,
    ) {
        let (state, error, analysis) = match &result {
            Ok(JobOutcome::Completed { analysis, .. }) => {
                (InstanceState::Completed, None, analysis.clone())
            }
            Ok(JobOutcome::Unsupported { file_name }) => (
                InstanceState::Unsupported,
                Some(format!("unsupported file type: {}", file_name)),
                None,
            ),
            Ok(JobOutcome::Aborted { reason }) => {
                (InstanceState::Aborted, Some(reason.clone()), None)
            }
            Err(OrchestratorError::Cancelled(_)) => (InstanceState::Cancelled, None, None),
            Err(e) => (InstanceState::Failed, Some(e.to_string()), None),
        };

        let record = {
            let mut instances = instances.write().await;
            let Some(slot) = instances.slots.get_mut(instance_id) else {
                error!("Finished instance {} has no record", instance_id);
                return;
            };
            slot.record.state = state;
            slot.record.error = error.clone();
            slot.record.analysis = analysis;
            slot.record.updated_at = Utc::now();
            slot.handle = None;
            slot.done.cancel();
            let record = slot.record.clone();
            instances.mark_finished(instance_id);
            record
        };

        metrics::JOBS_IN_FLIGHT.dec();
        metrics::JOBS_TOTAL.with_label_values(&[state.as_str()]).inc();

        match state {
            InstanceState::Failed => error!(
                "Instance {} failed at stage {}: {}",
                instance_id,
                record.stage,
                error.as_deref().unwrap_or_default()
            ),
            _ => info!("Instance {} ended {}", instance_id, state.as_str()),
        }

        let Some(audit) = audit else {
            return;
        };
        let event = match (state, result) {
            (InstanceState::Completed, Ok(JobOutcome::Completed { site_id, .. })) => {
                AuditEvent::JobCompleted {
                    instance_id: instance_id.to_string(),
                    site_id,
                }
            }
            (InstanceState::Unsupported, _) => AuditEvent::JobUnsupported {
                instance_id: instance_id.to_string(),
                file_name: record.file_name.clone(),
            },
            (InstanceState::Aborted, _) => AuditEvent::JobAborted {
                instance_id: instance_id.to_string(),
                site_id: record.site_id.clone(),
                reason: error.unwrap_or_default(),
            },
            (InstanceState::Cancelled, _) => AuditEvent::JobCancelled {
                instance_id: instance_id.to_string(),
                stage: record.stage.to_string(),
            },
            _ => AuditEvent::JobFailed {
                instance_id: instance_id.to_string(),
                error: error.unwrap_or_default(),
            },
        };
        audit.emit(event).await;
    }

    /// Deliver a processor's completion event to the instance waiting on it.
    pub async fn raise_event(
        &self,
        instance_id: &str,
        event_name: &str,
        payload: ProcessingResult,
    ) -> Result<(), OrchestratorError> {
        if !self.instances.read().await.slots.contains_key(instance_id) {
            metrics::EVENTS_RAISED.with_label_values(&["unknown"]).inc();
            return Err(OrchestratorError::InstanceNotFound(instance_id.to_string()));
        }

        let key = CorrelationKey::new(instance_id, event_name);
        match self.workflow.bus().raise_event(&key, payload).await {
            Ok(()) => {
                metrics::EVENTS_RAISED.with_label_values(&["delivered"]).inc();
                debug!("Raised {} for instance {}", event_name, instance_id);
                Ok(())
            }
            Err(e) => {
                let label = match e {
                    EventBusError::DuplicateEvent(_) => "duplicate",
                    _ => "unknown",
                };
                metrics::EVENTS_RAISED.with_label_values(&[label]).inc();
                warn!("Rejected event {} for instance {}: {}", event_name, instance_id, e);
                Err(e.into())
            }
        }
    }

    /// Request cancellation of one instance. A no-op for finished instances.
    pub async fn cancel(&self, instance_id: &str) -> Result<(), OrchestratorError> {
        let instances = self.instances.read().await;
        let slot = instances
            .slots
            .get(instance_id)
            .ok_or_else(|| OrchestratorError::InstanceNotFound(instance_id.to_string()))?;

        if slot.record.state.is_terminal() {
            debug!("Instance {} already ended, nothing to cancel", instance_id);
        } else {
            info!("Cancelling instance {}", instance_id);
            slot.cancel.cancel();
        }
        Ok(())
    }

    /// Stop accepting jobs, cancel every instance and wait for them to end.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping site orchestrator");
        self.shutdown.cancel();

        let handles: Vec<(JoinHandle<()>, CancellationToken)> = self
            .instances
            .write()
            .await
            .slots
            .values_mut()
            .filter_map(|slot| slot.handle.take().map(|h| (h, slot.done.clone())))
            .collect();
        for (handle, done) in handles {
            if let Err(e) = handle.await {
                error!("Instance task panicked during shutdown: {}", e);
                done.cancel();
            }
        }

        info!("Site orchestrator stopped");
    }

    /// Wait for an instance to end and return its final record.
    ///
    /// Any number of callers may wait on the same instance. A record evicted
    /// before the caller reads it back is reported as not found.
    pub async fn run_to_completion(
        &self,
        instance_id: &str,
    ) -> Result<InstanceRecord, OrchestratorError> {
        let (handle, done) = {
            let mut instances = self.instances.write().await;
            let slot = instances
                .slots
                .get_mut(instance_id)
                .ok_or_else(|| OrchestratorError::InstanceNotFound(instance_id.to_string()))?;
            (slot.handle.take(), slot.done.clone())
        };

        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    error!("Instance {} task panicked: {}", instance_id, e);
                    // Release other waiters; the record never reached a terminal state.
                    done.cancel();
                }
            }
            None => done.cancelled().await,
        }

        self.instance(instance_id)
            .await
            .ok_or_else(|| OrchestratorError::InstanceNotFound(instance_id.to_string()))
    }

    pub async fn instance(&self, instance_id: &str) -> Option<InstanceRecord> {
        self.instances
            .read()
            .await
            .slots
            .get(instance_id)
            .map(|slot| slot.record.clone())
    }

    /// All instances, newest first.
    pub async fn list(&self) -> Vec<InstanceRecord> {
        let mut records: Vec<InstanceRecord> = self
            .instances
            .read()
            .await
            .slots
            .values()
            .map(|slot| slot.record.clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let mut status = OrchestratorStatus {
            running: self.is_running(),
            ..Default::default()
        };

        for slot in self.instances.read().await.slots.values() {
            status.total += 1;
            match slot.record.state {
                InstanceState::Running => status.running_count += 1,
                InstanceState::Completed => status.completed_count += 1,
                InstanceState::Unsupported => status.unsupported_count += 1,
                InstanceState::Aborted => status.aborted_count += 1,
                InstanceState::Failed => status.failed_count += 1,
                InstanceState::Cancelled => status.cancelled_count += 1,
            }
        }
        status.pending_events = self.workflow.bus().pending_count().await;
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::Activities;
    use crate::analysis::{AnalysisSubOrchestrator, ImageGroupAnalyzer};
    use crate::event_bus::CorrelationEventBus;
    use crate::site::MemorySiteStore;
    use crate::testing::{fixtures, MockCompletionClient, MockWorkQueue};

    fn orchestrator(config: OrchestratorConfig) -> (Arc<MockWorkQueue>, SiteOrchestrator) {
        let store = Arc::new(MemorySiteStore::new());
        let queue = Arc::new(MockWorkQueue::new());
        let activities = Activities::from_store(store);
        let analysis = Arc::new(AnalysisSubOrchestrator::new(
            ImageGroupAnalyzer::new(Arc::new(MockCompletionClient::new())),
            Arc::new(fixtures::rejecting_panel()),
            activities.clone(),
        ));
        let bus = Arc::new(CorrelationEventBus::new(queue.clone(), "https://blobs.test"));
        let workflow = SiteProcessingWorkflow::new(bus, activities, analysis);
        (queue, SiteOrchestrator::new(config, workflow, None))
    }

    async fn wait_for_stage(orchestrator: &SiteOrchestrator, id: &str, stage: JobStage) {
        loop {
            match orchestrator.instance(id).await {
                Some(record) if record.stage == stage => return,
                Some(record) if record.state.is_terminal() => {
                    panic!("instance ended {:?} before {}", record.state, stage)
                }
                _ => tokio::task::yield_now().await,
            }
        }
    }

    #[tokio::test]
    async fn test_rejects_missing_file_name() {
        let (_queue, orchestrator) = orchestrator(OrchestratorConfig::default());
        let err = orchestrator
            .submit(ProcessFileRequest::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
        assert_eq!(orchestrator.status().await.total, 0);
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_file_rejected() {
        let (_queue, orchestrator) = orchestrator(OrchestratorConfig::default());
        let id = orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap();
        wait_for_stage(&orchestrator, &id, JobStage::AwaitExternal).await;

        let err = orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateJob(ref f) if f == "mound_survey.las"));

        // A different file is fine.
        orchestrator.submit(fixtures::upload("ridge.laz")).await.unwrap();
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let config = OrchestratorConfig {
            max_instances: 1,
            ..Default::default()
        };
        let (_queue, orchestrator) = orchestrator(config);
        orchestrator.submit(fixtures::upload("a.las")).await.unwrap();

        let err = orchestrator.submit(fixtures::upload("b.las")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AtCapacity(1)));
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_waiting_instance() {
        let (queue, orchestrator) = orchestrator(OrchestratorConfig::default());
        let id = orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap();
        wait_for_stage(&orchestrator, &id, JobStage::AwaitExternal).await;
        assert_eq!(queue.published().await.len(), 1);
        assert_eq!(orchestrator.status().await.pending_events, 1);

        orchestrator.cancel(&id).await.unwrap();
        let record = orchestrator.run_to_completion(&id).await.unwrap();

        assert_eq!(record.state, InstanceState::Cancelled);
        assert_eq!(record.stage, JobStage::AwaitExternal);
        assert!(record.site_id.unwrap().starts_with("mound_survey_"));
        let status = orchestrator.status().await;
        assert_eq!(status.cancelled_count, 1);
        assert_eq!(status.pending_events, 0);

        // Same file may be submitted again once the first instance ended.
        orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap();
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_unsupported_and_aborted_records() {
        let (_queue, orchestrator) = orchestrator(OrchestratorConfig::default());

        let unsupported = orchestrator
            .submit(fixtures::upload("notes.docx"))
            .await
            .unwrap();
        let record = orchestrator.run_to_completion(&unsupported).await.unwrap();
        assert_eq!(record.state, InstanceState::Unsupported);

        let aborted = orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap();
        wait_for_stage(&orchestrator, &aborted, JobStage::AwaitExternal).await;
        orchestrator
            .raise_event(
                &aborted,
                "LiDARProcessingCompleted",
                fixtures::failed_result("corrupt header"),
            )
            .await
            .unwrap();
        let record = orchestrator.run_to_completion(&aborted).await.unwrap();
        assert_eq!(record.state, InstanceState::Aborted);
        assert!(record.error.unwrap().contains("corrupt header"));

        let status = orchestrator.status().await;
        assert_eq!(status.total, 2);
        assert_eq!(status.unsupported_count, 1);
        assert_eq!(status.aborted_count, 1);
        assert_eq!(orchestrator.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_finished_records_are_evicted_oldest_first() {
        let config = OrchestratorConfig {
            retained_instances: 2,
            ..Default::default()
        };
        let (_queue, orchestrator) = orchestrator(config);

        let mut ids = Vec::new();
        for n in 0..5 {
            let id = orchestrator
                .submit(fixtures::upload(&format!("notes_{}.txt", n)))
                .await
                .unwrap();
            let record = orchestrator.run_to_completion(&id).await.unwrap();
            assert_eq!(record.state, InstanceState::Unsupported);
            ids.push(id);
        }

        assert_eq!(orchestrator.list().await.len(), 2);
        assert_eq!(orchestrator.status().await.total, 2);
        assert!(orchestrator.instance(&ids[0]).await.is_none());
        assert!(orchestrator.instance(&ids[2]).await.is_none());
        assert!(orchestrator.instance(&ids[3]).await.is_some());
        assert!(orchestrator.instance(&ids[4]).await.is_some());

        let err = orchestrator.cancel(&ids[0]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_running_records_are_never_evicted() {
        let config = OrchestratorConfig {
            retained_instances: 1,
            ..Default::default()
        };
        let (_queue, orchestrator) = orchestrator(config);
        let waiting = orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap();
        wait_for_stage(&orchestrator, &waiting, JobStage::AwaitExternal).await;

        for n in 0..3 {
            let id = orchestrator
                .submit(fixtures::upload(&format!("notes_{}.txt", n)))
                .await
                .unwrap();
            orchestrator.run_to_completion(&id).await.unwrap();
        }

        let status = orchestrator.status().await;
        assert_eq!(status.running_count, 1);
        assert_eq!(status.unsupported_count, 1);
        assert_eq!(status.total, 2);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_waiters_see_final_record() {
        let (_queue, orchestrator) = orchestrator(OrchestratorConfig::default());
        let id = orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap();
        wait_for_stage(&orchestrator, &id, JobStage::AwaitExternal).await;

        let (first, second, raised) = tokio::join!(
            orchestrator.run_to_completion(&id),
            orchestrator.run_to_completion(&id),
            orchestrator.raise_event(
                &id,
                "LiDARProcessingCompleted",
                fixtures::failed_result("corrupt header"),
            ),
        );

        raised.unwrap();
        assert_eq!(first.unwrap().state, InstanceState::Aborted);
        assert_eq!(second.unwrap().state, InstanceState::Aborted);
    }

    #[tokio::test]
    async fn test_raise_event_errors() {
        let (_queue, orchestrator) = orchestrator(OrchestratorConfig::default());
        let err = orchestrator
            .raise_event("nope", "LiDARProcessingCompleted", fixtures::success_result(1.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InstanceNotFound(_)));

        let id = orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap();
        wait_for_stage(&orchestrator, &id, JobStage::AwaitExternal).await;
        let err = orchestrator
            .raise_event(&id, "RasterProcessingCompleted", fixtures::success_result(1.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::EventBus(EventBusError::UnknownCorrelation(_))
        ));
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_and_rejects() {
        let (_queue, orchestrator) = orchestrator(OrchestratorConfig::default());
        let id = orchestrator
            .submit(fixtures::upload("mound_survey.las"))
            .await
            .unwrap();
        wait_for_stage(&orchestrator, &id, JobStage::AwaitExternal).await;

        orchestrator.stop().await;

        assert!(!orchestrator.is_running());
        assert_eq!(
            orchestrator.instance(&id).await.unwrap().state,
            InstanceState::Cancelled
        );
        let err = orchestrator
            .submit(fixtures::upload("ridge.laz"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Stopped));
    }
}
