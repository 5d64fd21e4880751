use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::machine::{Machine, Policy};
use super::notice::Notice;
use super::types::{Effect, Input, Phase, Ticket, WorkflowState};
use crate::analysis::{AnalysisClient, PredictionService};
use crate::blob::{BlobId, ImageBlob};
use crate::camera::{CameraSession, CameraSessionBuilder, CameraStream, RawFrame};
use crate::config::MoodcamConfig;
use crate::error::{AnalysisError, CameraError, Result};
use crate::events::{EventBus, WorkflowEvent};
use crate::prediction::PredictionResult;
use crate::preview::{PreviewHandle, PreviewRegistry};
use crate::validator::ImageValidator;

/// User-level requests, as a front end issues them
#[derive(Debug, Clone)]
pub enum Command {
    SelectFile(ImageBlob),
    StartCamera,
    Capture,
    CancelCamera,
    Analyze,
    Reset,
}

/// Result of asynchronous work, delivered back to the driver
enum Completion {
    Camera {
        attempt: Ticket,
        result: std::result::Result<CameraStream, CameraError>,
    },
    Analysis {
        request: Ticket,
        blob: BlobId,
        result: std::result::Result<PredictionResult, AnalysisError>,
    },
}

struct CurrentImage {
    blob: ImageBlob,
    preview: PreviewHandle,
}

/// Outstanding spawned work. `abandoned` is checked under its lock before a
/// camera stream is handed back, so a cancelled attempt never delivers one.
struct Pending {
    token: CancellationToken,
    abandoned: Arc<Mutex<bool>>,
}

impl Pending {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            abandoned: Arc::new(Mutex::new(false)),
        }
    }

    fn abandon(self) {
        *self.abandoned.lock() = true;
        self.token.cancel();
    }
}

/// Executes machine effects against real resources. Owns the camera stream,
/// the current image with its preview, and every in-flight camera attempt or
/// analysis request. Spawned work reports back through a completion channel.
pub struct AcquisitionWorkflow {
    machine: Machine,
    camera: CameraSession,
    analyzer: Arc<dyn PredictionService>,
    previews: PreviewRegistry,
    event_bus: EventBus,
    analysis_timeout: Duration,
    current: Option<CurrentImage>,
    // staged for the duration of a single dispatch
    candidate: Option<ImageBlob>,
    arrived: Option<CameraStream>,
    stream: Option<CameraStream>,
    in_flight: HashMap<Ticket, Pending>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    shutdown: CancellationToken,
}

impl AcquisitionWorkflow {
    pub fn new(
        policy: Policy,
        camera: CameraSession,
        analyzer: Arc<dyn PredictionService>,
        event_bus: EventBus,
        analysis_timeout: Duration,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Self {
            machine: Machine::new(policy),
            camera,
            analyzer,
            previews: PreviewRegistry::new(),
            event_bus,
            analysis_timeout,
            current: None,
            candidate: None,
            arrived: None,
            stream: None,
            in_flight: HashMap::new(),
            completions_tx,
            completions_rx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire a workflow from configuration: camera backend, HTTP analysis
    /// client, validator and fallback policy
    pub fn from_config(config: &MoodcamConfig, event_bus: EventBus) -> Result<Self> {
        let camera = CameraSessionBuilder::new()
            .config(config.camera.clone())
            .build()?;
        let analyzer = AnalysisClient::from_config(&config.analysis)?;
        let policy = Policy {
            validator: ImageValidator::from_config(&config.validation),
            fallback: config.analysis.fallback,
        };

        info!(
            "Workflow ready: camera backend {}, analysis endpoint {}",
            camera.backend_name(),
            analyzer.endpoint()
        );

        Ok(Self::new(
            policy,
            camera,
            Arc::new(analyzer),
            event_bus,
            config.analysis.timeout(),
        ))
    }

    pub fn state(&self) -> &WorkflowState {
        self.machine.state()
    }

    pub fn phase(&self) -> Phase {
        self.machine.state().phase()
    }

    pub fn current_image(&self) -> Option<&ImageBlob> {
        self.current.as_ref().map(|c| &c.blob)
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.current.as_ref().map(|c| &c.preview)
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        self.machine.state().result()
    }

    pub fn camera_stream(&self) -> Option<&CameraStream> {
        self.stream.as_ref()
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Camera attempts and analysis requests not yet completed or cancelled
    pub fn pending_requests(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn select_file(&mut self, blob: ImageBlob) -> Vec<Notice> {
        let meta = blob.meta();
        self.candidate = Some(blob);
        self.dispatch(Input::SelectFile(meta)).await
    }

    pub async fn start_camera(&mut self) -> Vec<Notice> {
        self.dispatch(Input::StartCamera).await
    }

    pub async fn capture(&mut self) -> Vec<Notice> {
        self.dispatch(Input::Capture).await
    }

    pub async fn cancel_camera(&mut self) -> Vec<Notice> {
        let mut notices = self.dispatch(Input::CancelCamera).await;
        notices.extend(self.drain_ready().await);
        notices
    }

    pub async fn analyze(&mut self) -> Vec<Notice> {
        self.dispatch(Input::Analyze).await
    }

    pub async fn reset(&mut self) -> Vec<Notice> {
        let mut notices = self.dispatch(Input::Reset).await;
        notices.extend(self.drain_ready().await);
        notices
    }

    pub async fn handle(&mut self, command: Command) -> Vec<Notice> {
        match command {
            Command::SelectFile(blob) => self.select_file(blob).await,
            Command::StartCamera => self.start_camera().await,
            Command::Capture => self.capture().await,
            Command::CancelCamera => self.cancel_camera().await,
            Command::Analyze => self.analyze().await,
            Command::Reset => self.reset().await,
        }
    }

    /// Wait for the next camera or analysis completion and apply it
    pub async fn next_completion(&mut self) -> Vec<Notice> {
        match self.completions_rx.recv().await {
            Some(completion) => self.complete(completion).await,
            None => Vec::new(),
        }
    }

    /// Latest frame from the live camera, for rendering the live surface
    pub fn preview_frame(&mut self) -> std::result::Result<RawFrame, CameraError> {
        match self.stream.as_mut() {
            Some(stream) => self.camera.preview_frame(stream),
            None => Err(CameraError::DeviceUnavailable {
                details: "camera is not live".to_string(),
            }),
        }
    }

    /// Release everything and stop outstanding work
    pub async fn shutdown(mut self) {
        info!("Shutting down acquisition workflow");
        self.reset().await;
        self.shutdown.cancel();
    }

    /// Apply completions that were already queued. After a reset or cancel
    /// these are stale, and a stream among them is released right away.
    async fn drain_ready(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            notices.extend(self.complete(completion).await);
        }
        notices
    }

    async fn complete(&mut self, completion: Completion) -> Vec<Notice> {
        match completion {
            Completion::Camera { attempt, result } => {
                self.in_flight.remove(&attempt);
                match result {
                    Ok(stream) => {
                        let id = stream.id();
                        self.arrived = Some(stream);
                        self.dispatch(Input::CameraAcquired {
                            attempt,
                            stream: id,
                        })
                        .await
                    }
                    Err(error) => self.dispatch(Input::CameraFailed { attempt, error }).await,
                }
            }
            Completion::Analysis {
                request,
                blob,
                result,
            } => {
                self.in_flight.remove(&request);
                let input = match result {
                    Ok(result) => Input::AnalysisSucceeded {
                        request,
                        blob,
                        result,
                    },
                    Err(error) => Input::AnalysisFailed {
                        request,
                        blob,
                        error,
                    },
                };
                self.dispatch(input).await
            }
        }
    }

    async fn dispatch(&mut self, input: Input) -> Vec<Notice> {
        let mut notices = Vec::new();
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let from = self.phase();
            trace!("Handling {} in {}", input.name(), from);

            let effects = self.machine.handle(input);
            for effect in effects {
                if let Some(follow_up) = self.perform(effect, &mut notices).await {
                    queue.push_back(follow_up);
                }
            }

            let to = self.phase();
            if from != to {
                debug!("Workflow {} -> {}", from, to);
                self.emit(WorkflowEvent::StateChanged {
                    from,
                    to,
                    timestamp: Utc::now(),
                })
                .await;

                if let (Phase::Analyzing, Some(result)) = (from, self.result().copied()) {
                    if let Some(blob) = self.current_image().map(|b| b.id()) {
                        self.emit(WorkflowEvent::PredictionReady {
                            blob,
                            result,
                            degraded: result.is_placeholder(),
                            timestamp: Utc::now(),
                        })
                        .await;
                    }
                }
            }
        }

        self.drop_unclaimed();
        notices
    }

    async fn perform(&mut self, effect: Effect, notices: &mut Vec<Notice>) -> Option<Input> {
        match effect {
            Effect::AdoptImage { blob } => {
                match self.candidate.take() {
                    Some(candidate) if candidate.id() == blob => {
                        let preview = self.previews.allocate(&candidate);
                        let preview_id = preview.id();
                        info!(
                            "Adopted {} ({}, {} bytes) as current image",
                            candidate.file_name(),
                            candidate.media_type(),
                            candidate.size()
                        );
                        self.current = Some(CurrentImage {
                            blob: candidate,
                            preview,
                        });
                        self.emit(WorkflowEvent::PreviewAllocated {
                            preview: preview_id,
                            blob,
                            timestamp: Utc::now(),
                        })
                        .await;
                    }
                    other => {
                        warn!("No staged image {} to adopt", blob);
                        self.candidate = other;
                    }
                }
                None
            }
            Effect::DiscardCandidate { blob } => {
                if self.candidate.as_ref().map(|c| c.id()) == Some(blob) {
                    self.candidate = None;
                    debug!("Discarded candidate image {}", blob);
                }
                None
            }
            Effect::DiscardImage { blob } => {
                if let Some(current) = self.current.take() {
                    if current.blob.id() != blob {
                        warn!(
                            "Discarding image {} while machine expected {}",
                            current.blob.id(),
                            blob
                        );
                    }
                    let preview_id = current.preview.id();
                    current.preview.revoke();
                    self.emit(WorkflowEvent::PreviewRevoked {
                        preview: preview_id,
                        timestamp: Utc::now(),
                    })
                    .await;
                }
                None
            }
            Effect::AcquireCamera { attempt } => {
                self.spawn_acquire(attempt);
                None
            }
            Effect::AttachPreview { stream } => {
                let Some(mut arrived) = self.arrived.take() else {
                    return Some(Input::PreviewFailed {
                        stream,
                        error: CameraError::StreamReleased {
                            stream: stream.to_string(),
                        },
                    });
                };

                if let Err(error) = self.camera.attach_preview(&mut arrived) {
                    self.arrived = Some(arrived);
                    return Some(Input::PreviewFailed { stream, error });
                }

                self.stream = Some(arrived);
                self.emit(WorkflowEvent::CameraStatusChanged {
                    stream,
                    live: true,
                    timestamp: Utc::now(),
                })
                .await;
                None
            }
            Effect::CaptureFrame { stream } => {
                let Some(live) = self.stream.as_mut().filter(|s| s.id() == stream) else {
                    return Some(Input::CaptureFailed {
                        stream,
                        error: CameraError::StreamReleased {
                            stream: stream.to_string(),
                        },
                    });
                };

                match self.camera.capture_frame(live) {
                    Ok(blob) => {
                        let image = blob.meta();
                        self.candidate = Some(blob);
                        Some(Input::FrameCaptured { stream, image })
                    }
                    Err(error) => Some(Input::CaptureFailed { stream, error }),
                }
            }
            Effect::ReleaseCamera { stream } => {
                let held = if self.stream.as_ref().map(|s| s.id()) == Some(stream) {
                    self.stream.take()
                } else if self.arrived.as_ref().map(|s| s.id()) == Some(stream) {
                    self.arrived.take()
                } else {
                    None
                };

                if let Some(mut held) = held {
                    self.camera.release(&mut held);
                    self.emit(WorkflowEvent::CameraStatusChanged {
                        stream,
                        live: false,
                        timestamp: Utc::now(),
                    })
                    .await;
                }
                None
            }
            Effect::StartAnalysis { request, blob } => {
                let image = match self.current.as_ref() {
                    Some(current) if current.blob.id() == blob => current.blob.clone(),
                    _ => {
                        return Some(Input::AnalysisFailed {
                            request,
                            blob,
                            error: AnalysisError::Cancelled,
                        })
                    }
                };
                self.spawn_analysis(request, image);
                None
            }
            Effect::Cancel { ticket } => {
                if let Some(pending) = self.in_flight.remove(&ticket) {
                    debug!("Cancelling request {}", ticket);
                    pending.abandon();
                }
                None
            }
            Effect::Notify(notice) => {
                self.emit(WorkflowEvent::Notice {
                    notice: notice.clone(),
                    timestamp: Utc::now(),
                })
                .await;
                notices.push(notice);
                None
            }
        }
    }

    fn spawn_acquire(&mut self, attempt: Ticket) {
        let pending = Pending::new(self.shutdown.child_token());
        let token = pending.token.clone();
        let abandoned = Arc::clone(&pending.abandoned);
        self.in_flight.insert(attempt, pending);

        let session = self.camera.clone();
        let tx = self.completions_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Camera attempt {} abandoned", attempt);
                }
                result = session.acquire() => {
                    let abandoned = abandoned.lock();
                    match result {
                        Ok(mut stream) if *abandoned => {
                            debug!(
                                "Camera attempt {} abandoned, releasing {}",
                                attempt,
                                stream.id()
                            );
                            session.release(&mut stream);
                        }
                        // a stream nobody receives is released on drop
                        result => {
                            let _ = tx.send(Completion::Camera { attempt, result });
                        }
                    }
                }
            }
        });
    }

    fn spawn_analysis(&mut self, request: Ticket, image: ImageBlob) {
        let pending = Pending::new(self.shutdown.child_token());
        let token = pending.token.clone();
        self.in_flight.insert(request, pending);

        let analyzer = Arc::clone(&self.analyzer);
        let tx = self.completions_tx.clone();
        let limit = self.analysis_timeout;

        info!("Analyzing image {} (request {})", image.id(), request);

        tokio::spawn(async move {
            let blob = image.id();
            let result = tokio::select! {
                _ = token.cancelled() => Err(AnalysisError::Cancelled),
                outcome = tokio::time::timeout(limit, analyzer.analyze(&image)) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(AnalysisError::Timeout {
                        timeout_ms: limit.as_millis() as u64,
                    }),
                },
            };

            let _ = tx.send(Completion::Analysis {
                request,
                blob,
                result,
            });
        });
    }

    fn drop_unclaimed(&mut self) {
        if let Some(candidate) = self.candidate.take() {
            debug!("Dropping unclaimed image {}", candidate.id());
        }
        if let Some(mut stream) = self.arrived.take() {
            warn!("Releasing unclaimed camera stream {}", stream.id());
            self.camera.release(&mut stream);
        }
    }

    async fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            trace!("Event not delivered: {}", e);
        }
    }
}

impl Drop for AcquisitionWorkflow {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
