use crate::blob::BlobId;
use crate::camera::StreamId;
use crate::error::EventBusError;
use crate::prediction::PredictionResult;
use crate::preview::PreviewId;
use crate::workflow::{Notice, Phase, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Observable changes in the acquisition workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    /// The workflow moved between phases
    StateChanged {
        from: Phase,
        to: Phase,
        timestamp: DateTime<Utc>,
    },
    /// A user-visible message was raised
    Notice {
        notice: Notice,
        timestamp: DateTime<Utc>,
    },
    /// A prediction is ready to display. `degraded` marks a placeholder.
    PredictionReady {
        blob: BlobId,
        result: PredictionResult,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },
    /// A preview reference was handed out
    PreviewAllocated {
        preview: PreviewId,
        blob: BlobId,
        timestamp: DateTime<Utc>,
    },
    /// A preview reference was revoked
    PreviewRevoked {
        preview: PreviewId,
        timestamp: DateTime<Utc>,
    },
    /// Camera stream opened or released
    CameraStatusChanged {
        stream: StreamId,
        live: bool,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            WorkflowEvent::StateChanged { timestamp, .. }
            | WorkflowEvent::Notice { timestamp, .. }
            | WorkflowEvent::PredictionReady { timestamp, .. }
            | WorkflowEvent::PreviewAllocated { timestamp, .. }
            | WorkflowEvent::PreviewRevoked { timestamp, .. }
            | WorkflowEvent::CameraStatusChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            WorkflowEvent::StateChanged { from, to, .. } => {
                format!("State changed: {} -> {}", from, to)
            }
            WorkflowEvent::Notice { notice, .. } => {
                format!("{}: {}", notice.title(), notice.description())
            }
            WorkflowEvent::PredictionReady {
                result, degraded, ..
            } => format!(
                "Prediction: {} ({}%){}",
                result.expression(),
                result.confidence_percent(),
                if *degraded { " [placeholder]" } else { "" }
            ),
            WorkflowEvent::PreviewAllocated { preview, blob, .. } => {
                format!("Preview {} allocated for blob {}", preview, blob)
            }
            WorkflowEvent::PreviewRevoked { preview, .. } => {
                format!("Preview {} revoked", preview)
            }
            WorkflowEvent::CameraStatusChanged { stream, live, .. } => format!(
                "Camera stream {} {}",
                stream,
                if *live { "live" } else { "released" }
            ),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::StateChanged { .. } => "state_changed",
            WorkflowEvent::Notice { .. } => "notice",
            WorkflowEvent::PredictionReady { .. } => "prediction_ready",
            WorkflowEvent::PreviewAllocated { .. } => "preview_allocated",
            WorkflowEvent::PreviewRevoked { .. } => "preview_revoked",
            WorkflowEvent::CameraStatusChanged { .. } => "camera_status_changed",
        }
    }
}

/// Broadcast fan-out of workflow events to any number of observers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
    debug_logging: bool,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Subscribe through a filter
    pub fn subscribe_filtered(
        &self,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.into())
    }

    /// Publish an event to all subscribers. Fails when nobody is listening.
    pub async fn publish(&self, event: WorkflowEvent) -> Result<usize, EventBusError> {
        match &event {
            WorkflowEvent::Notice { notice, .. } => match notice.severity() {
                Severity::Info => info!("{}: {}", notice.title(), notice.description()),
                Severity::Destructive => warn!("{}: {}", notice.title(), notice.description()),
            },
            WorkflowEvent::PredictionReady { .. } => info!("{}", event.description()),
            WorkflowEvent::CameraStatusChanged { .. } => info!("{}", event.description()),
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    Custom(fn(&WorkflowEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &WorkflowEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Named receiver that skips events its filter rejects
pub struct EventReceiver {
    receiver: broadcast::Receiver<WorkflowEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<WorkflowEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next event that passes the filter
    pub async fn recv(&mut self) -> Result<WorkflowEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { missed: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Drain one matching event without waiting
    pub fn try_recv(&mut self) -> Result<Option<WorkflowEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { missed: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
