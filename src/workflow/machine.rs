use tracing::debug;

use super::notice::Notice;
use super::types::{Effect, Input, Ticket, Transition, WorkflowState};
use crate::config::FallbackMode;
use crate::prediction::PredictionResult;
use crate::validator::ImageValidator;

/// Fixed rules a machine applies to every step
#[derive(Debug, Clone)]
pub struct Policy {
    pub validator: ImageValidator,
    pub fallback: FallbackMode,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            validator: ImageValidator::default(),
            fallback: FallbackMode::Placeholder,
        }
    }
}

/// Compute the next state and the ordered effects the driver must carry out.
/// No I/O happens here. `ticket` is used when the step issues a new camera
/// attempt or analysis request. Completions whose ticket no longer matches
/// the current state are dropped.
pub fn step(state: &WorkflowState, input: Input, policy: &Policy, ticket: Ticket) -> Transition {
    use WorkflowState as S;

    match (state, input) {
        (
            S::AwaitingSource | S::PreviewReady { .. } | S::ResultReady { .. },
            Input::SelectFile(meta),
        ) => {
            if let Err(e) = policy.validator.validate(&meta) {
                return Transition::to(state.clone())
                    .with(Effect::DiscardCandidate { blob: meta.id })
                    .with(Effect::Notify(Notice::Rejected(e)));
            }

            let mut transition = Transition::to(S::PreviewReady {
                image: meta.clone(),
                last_error: None,
            });
            if let Some(old) = state.image() {
                transition = transition.with(Effect::DiscardImage { blob: old.id });
            }
            transition.with(Effect::AdoptImage { blob: meta.id })
        }
        (_, Input::SelectFile(meta)) => {
            let blob = meta.id;
            unavailable(state, "select_file").with(Effect::DiscardCandidate { blob })
        }

        (S::AwaitingSource, Input::StartCamera) => {
            Transition::to(S::AcquiringCamera { attempt: ticket })
                .with(Effect::AcquireCamera { attempt: ticket })
        }
        (_, Input::StartCamera) => unavailable(state, "start_camera"),

        (S::AcquiringCamera { attempt }, Input::CameraAcquired { attempt: got, stream })
            if *attempt == got =>
        {
            Transition::to(S::CameraLive { stream }).with(Effect::AttachPreview { stream })
        }
        (_, Input::CameraAcquired { attempt, stream }) => {
            debug!("Releasing stream {} from stale attempt {}", stream, attempt);
            Transition::to(state.clone()).with(Effect::ReleaseCamera { stream })
        }

        (S::AcquiringCamera { attempt }, Input::CameraFailed { attempt: got, error })
            if *attempt == got =>
        {
            Transition::to(S::AwaitingSource)
                .with(Effect::Notify(Notice::CameraUnavailable(error)))
        }

        (S::CameraLive { stream }, Input::PreviewFailed { stream: got, error })
            if *stream == got =>
        {
            Transition::to(S::AwaitingSource)
                .with(Effect::ReleaseCamera { stream: got })
                .with(Effect::Notify(Notice::CameraUnavailable(error)))
        }

        (S::CameraLive { stream }, Input::Capture) => {
            Transition::to(state.clone()).with(Effect::CaptureFrame { stream: *stream })
        }
        (_, Input::Capture) => unavailable(state, "capture"),

        (S::CameraLive { stream }, Input::FrameCaptured { stream: got, image })
            if *stream == got =>
        {
            let blob = image.id;
            Transition::to(S::PreviewReady {
                image,
                last_error: None,
            })
            .with(Effect::ReleaseCamera { stream: got })
            .with(Effect::AdoptImage { blob })
        }
        (_, Input::FrameCaptured { image, .. }) => {
            Transition::to(state.clone()).with(Effect::DiscardCandidate { blob: image.id })
        }

        (S::CameraLive { stream }, Input::CaptureFailed { stream: got, error })
            if *stream == got =>
        {
            Transition::to(state.clone()).with(Effect::Notify(Notice::CaptureFailed(error)))
        }

        (S::CameraLive { stream }, Input::CancelCamera) => {
            Transition::to(S::AwaitingSource).with(Effect::ReleaseCamera { stream: *stream })
        }
        (S::AcquiringCamera { attempt }, Input::CancelCamera) => {
            Transition::to(S::AwaitingSource).with(Effect::Cancel { ticket: *attempt })
        }
        (_, Input::CancelCamera) => unavailable(state, "cancel_camera"),

        (S::PreviewReady { image, .. }, Input::Analyze) => start_analysis(image, ticket),
        (S::ResultReady { image, result }, Input::Analyze) if result.is_placeholder() => {
            start_analysis(image, ticket)
        }
        (_, Input::Analyze) => unavailable(state, "analyze"),

        (
            S::Analyzing { image, request },
            Input::AnalysisSucceeded {
                request: got,
                blob,
                result,
            },
        ) if *request == got && image.id == blob => Transition::to(S::ResultReady {
            image: image.clone(),
            result,
        })
        .with(Effect::Notify(Notice::AnalysisComplete {
            expression: result.expression(),
        })),

        (
            S::Analyzing { image, request },
            Input::AnalysisFailed {
                request: got,
                blob,
                error,
            },
        ) if *request == got && image.id == blob => match policy.fallback {
            FallbackMode::Placeholder => Transition::to(S::ResultReady {
                image: image.clone(),
                result: PredictionResult::placeholder(blob),
            })
            .with(Effect::Notify(Notice::AnalysisFailed {
                error,
                placeholder_shown: true,
            })),
            FallbackMode::Disabled => Transition::to(S::PreviewReady {
                image: image.clone(),
                last_error: Some(error.clone()),
            })
            .with(Effect::Notify(Notice::AnalysisFailed {
                error,
                placeholder_shown: false,
            })),
        },

        (_, Input::Reset) => reset(state),

        (_, input) => {
            debug!("Dropping stale {} in {}", input.name(), state.phase());
            Transition::to(state.clone())
        }
    }
}

fn start_analysis(image: &crate::blob::BlobMeta, ticket: Ticket) -> Transition {
    Transition::to(WorkflowState::Analyzing {
        image: image.clone(),
        request: ticket,
    })
    .with(Effect::StartAnalysis {
        request: ticket,
        blob: image.id,
    })
}

fn unavailable(state: &WorkflowState, action: &str) -> Transition {
    Transition::to(state.clone()).with(Effect::Notify(Notice::ActionUnavailable {
        action: action.to_string(),
        phase: state.phase(),
    }))
}

fn reset(state: &WorkflowState) -> Transition {
    let next = Transition::to(WorkflowState::AwaitingSource);
    match state {
        WorkflowState::AwaitingSource => next,
        WorkflowState::AcquiringCamera { attempt } => {
            next.with(Effect::Cancel { ticket: *attempt })
        }
        WorkflowState::CameraLive { stream } => {
            next.with(Effect::ReleaseCamera { stream: *stream })
        }
        WorkflowState::PreviewReady { image, .. } | WorkflowState::ResultReady { image, .. } => {
            next.with(Effect::DiscardImage { blob: image.id })
        }
        WorkflowState::Analyzing { image, request } => next
            .with(Effect::Cancel { ticket: *request })
            .with(Effect::DiscardImage { blob: image.id }),
    }
}

/// Owns the current state and mints tickets
#[derive(Debug, Clone)]
pub struct Machine {
    state: WorkflowState,
    policy: Policy,
    next_ticket: u64,
}

impl Machine {
    pub fn new(policy: Policy) -> Self {
        Self {
            state: WorkflowState::AwaitingSource,
            policy,
            next_ticket: 1,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Apply one input and return the effects to perform
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;

        let Transition { state, effects } = step(&self.state, input, &self.policy, ticket);
        self.state = state;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobId, BlobMeta, ImageSource};
    use crate::camera::StreamId;
    use crate::error::{AnalysisError, CameraError, ValidationError};
    use crate::prediction::{Expression, Provenance};
    use crate::workflow::Phase;

    fn meta(media_type: &str, size: u64) -> BlobMeta {
        BlobMeta {
            id: BlobId::new(),
            media_type: media_type.to_string(),
            size,
            source: ImageSource::Upload {
                file_name: "face.jpg".to_string(),
            },
        }
    }

    fn preview_ready(machine: &mut Machine) -> BlobMeta {
        let image = meta("image/jpeg", 2 * 1024 * 1024);
        machine.handle(Input::SelectFile(image.clone()));
        image
    }

    fn analyzing(machine: &mut Machine) -> (BlobMeta, Ticket) {
        let image = preview_ready(machine);
        let effects = machine.handle(Input::Analyze);
        match effects.as_slice() {
            [Effect::StartAnalysis { request, blob }] => {
                assert_eq!(*blob, image.id);
                (image, *request)
            }
            other => panic!("Unexpected effects: {:?}", other),
        }
    }

    fn notices(effects: &[Effect]) -> Vec<&Notice> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_valid_upload_reaches_preview_ready() {
        let mut machine = Machine::new(Policy::default());
        let image = meta("image/jpeg", 2 * 1024 * 1024);

        let effects = machine.handle(Input::SelectFile(image.clone()));

        assert_eq!(effects, vec![Effect::AdoptImage { blob: image.id }]);
        assert_eq!(machine.state().phase(), Phase::PreviewReady);
        assert_eq!(machine.state().image(), Some(&image));
    }

    #[test]
    fn test_rejected_upload_leaves_state_alone() {
        let mut machine = Machine::new(Policy::default());
        let pdf = meta("application/pdf", 100 * 1024);

        let effects = machine.handle(Input::SelectFile(pdf.clone()));

        assert_eq!(machine.state(), &WorkflowState::AwaitingSource);
        assert_eq!(effects[0], Effect::DiscardCandidate { blob: pdf.id });
        assert_eq!(notices(&effects)[0].title(), "Invalid file type");
    }

    #[test]
    fn test_oversized_upload_keeps_existing_image() {
        let mut machine = Machine::new(Policy::default());
        let kept = preview_ready(&mut machine);

        let effects = machine.handle(Input::SelectFile(meta("image/png", 6 * 1024 * 1024)));

        assert_eq!(machine.state().image(), Some(&kept));
        assert!(matches!(
            notices(&effects)[0],
            Notice::Rejected(ValidationError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_second_upload_discards_previous_image_first() {
        let mut machine = Machine::new(Policy::default());
        let first = preview_ready(&mut machine);
        let second = meta("image/png", 1024);

        let effects = machine.handle(Input::SelectFile(second.clone()));

        assert_eq!(
            effects,
            vec![
                Effect::DiscardImage { blob: first.id },
                Effect::AdoptImage { blob: second.id },
            ]
        );
        assert_eq!(machine.state().image(), Some(&second));
    }

    #[test]
    fn test_select_while_analyzing_is_refused() {
        let mut machine = Machine::new(Policy::default());
        let (image, _) = analyzing(&mut machine);
        let other = meta("image/png", 10);

        let effects = machine.handle(Input::SelectFile(other.clone()));

        assert_eq!(machine.state().image(), Some(&image));
        assert_eq!(machine.state().phase(), Phase::Analyzing);
        assert!(effects.contains(&Effect::DiscardCandidate { blob: other.id }));
        assert!(matches!(
            notices(&effects)[0],
            Notice::ActionUnavailable { phase: Phase::Analyzing, .. }
        ));
    }

    #[test]
    fn test_camera_acquire_capture_releases_before_adopting() {
        let mut machine = Machine::new(Policy::default());
        let attempt = match machine.handle(Input::StartCamera).as_slice() {
            [Effect::AcquireCamera { attempt }] => *attempt,
            other => panic!("Unexpected effects: {:?}", other),
        };
        assert_eq!(machine.state().phase(), Phase::AcquiringCamera);

        let stream = StreamId::new();
        let effects = machine.handle(Input::CameraAcquired { attempt, stream });
        assert_eq!(effects, vec![Effect::AttachPreview { stream }]);

        assert_eq!(
            machine.handle(Input::Capture),
            vec![Effect::CaptureFrame { stream }]
        );

        let mut captured = meta("image/png", 4096);
        captured.source = ImageSource::Capture {
            width: 640,
            height: 480,
        };
        let effects = machine.handle(Input::FrameCaptured {
            stream,
            image: captured.clone(),
        });

        assert_eq!(
            effects,
            vec![
                Effect::ReleaseCamera { stream },
                Effect::AdoptImage { blob: captured.id },
            ]
        );
        assert_eq!(machine.state().phase(), Phase::PreviewReady);
    }

    #[test]
    fn test_permission_denied_returns_to_awaiting() {
        let mut machine = Machine::new(Policy::default());
        let attempt = match machine.handle(Input::StartCamera).as_slice() {
            [Effect::AcquireCamera { attempt }] => *attempt,
            other => panic!("Unexpected effects: {:?}", other),
        };

        let effects = machine.handle(Input::CameraFailed {
            attempt,
            error: CameraError::PermissionDenied {
                details: "denied".to_string(),
            },
        });

        assert_eq!(machine.state(), &WorkflowState::AwaitingSource);
        assert_eq!(notices(&effects)[0].title(), "Camera access denied");
    }

    #[test]
    fn test_stream_arriving_after_reset_is_released() {
        let mut machine = Machine::new(Policy::default());
        machine.handle(Input::StartCamera);
        let attempt = match machine.state() {
            WorkflowState::AcquiringCamera { attempt } => *attempt,
            other => panic!("Unexpected state: {:?}", other),
        };

        assert_eq!(
            machine.handle(Input::Reset),
            vec![Effect::Cancel { ticket: attempt }]
        );

        let stream = StreamId::new();
        let effects = machine.handle(Input::CameraAcquired { attempt, stream });
        assert_eq!(effects, vec![Effect::ReleaseCamera { stream }]);
        assert_eq!(machine.state(), &WorkflowState::AwaitingSource);
    }

    #[test]
    fn test_start_camera_only_from_awaiting_source() {
        let mut machine = Machine::new(Policy::default());
        preview_ready(&mut machine);

        let effects = machine.handle(Input::StartCamera);

        assert_eq!(machine.state().phase(), Phase::PreviewReady);
        assert!(matches!(
            notices(&effects)[0],
            Notice::ActionUnavailable { .. }
        ));
    }

    #[test]
    fn test_successful_analysis() {
        let mut machine = Machine::new(Policy::default());
        let (image, request) = analyzing(&mut machine);
        let result = PredictionResult::new(Expression::Happy, 0.87).unwrap();

        let effects = machine.handle(Input::AnalysisSucceeded {
            request,
            blob: image.id,
            result,
        });

        assert_eq!(machine.state().result(), Some(&result));
        assert_eq!(notices(&effects)[0].title(), "Analysis Complete");
    }

    #[test]
    fn test_failure_with_placeholder_fallback() {
        let mut machine = Machine::new(Policy::default());
        let (image, request) = analyzing(&mut machine);

        let effects = machine.handle(Input::AnalysisFailed {
            request,
            blob: image.id,
            error: AnalysisError::Status { status: 500 },
        });

        let result = machine.state().result().copied().unwrap();
        assert_eq!(result.provenance(), Provenance::Placeholder);
        assert!(result.confidence() >= 0.5 && result.confidence() < 1.0);
        assert_eq!(result, PredictionResult::placeholder(image.id));
        assert_eq!(notices(&effects)[0].title(), "Error analyzing image");

        // placeholder results can be retried
        assert!(matches!(
            machine.handle(Input::Analyze).as_slice(),
            [Effect::StartAnalysis { .. }]
        ));
    }

    #[test]
    fn test_failure_with_fallback_disabled_keeps_preview() {
        let mut machine = Machine::new(Policy {
            fallback: FallbackMode::Disabled,
            ..Policy::default()
        });
        let (image, request) = analyzing(&mut machine);

        machine.handle(Input::AnalysisFailed {
            request,
            blob: image.id,
            error: AnalysisError::Timeout { timeout_ms: 15_000 },
        });

        assert_eq!(machine.state().phase(), Phase::PreviewReady);
        assert_eq!(
            machine.state().last_error(),
            Some(&AnalysisError::Timeout { timeout_ms: 15_000 })
        );
    }

    #[test]
    fn test_genuine_result_cannot_be_reanalyzed() {
        let mut machine = Machine::new(Policy::default());
        let (image, request) = analyzing(&mut machine);
        machine.handle(Input::AnalysisSucceeded {
            request,
            blob: image.id,
            result: PredictionResult::new(Expression::Sad, 0.6).unwrap(),
        });

        let effects = machine.handle(Input::Analyze);

        assert_eq!(machine.state().phase(), Phase::ResultReady);
        assert!(matches!(notices(&effects)[0], Notice::ActionUnavailable { .. }));
    }

    #[test]
    fn test_stale_completion_is_dropped() {
        let mut machine = Machine::new(Policy::default());
        let (image, request) = analyzing(&mut machine);

        let effects = machine.handle(Input::Reset);
        assert_eq!(
            effects,
            vec![
                Effect::Cancel { ticket: request },
                Effect::DiscardImage { blob: image.id },
            ]
        );

        let effects = machine.handle(Input::AnalysisSucceeded {
            request,
            blob: image.id,
            result: PredictionResult::new(Expression::Fear, 0.9).unwrap(),
        });
        assert!(effects.is_empty());
        assert_eq!(machine.state(), &WorkflowState::AwaitingSource);
    }

    #[test]
    fn test_completion_for_other_blob_is_dropped() {
        let mut machine = Machine::new(Policy::default());
        let (_, request) = analyzing(&mut machine);

        let effects = machine.handle(Input::AnalysisSucceeded {
            request,
            blob: BlobId::new(),
            result: PredictionResult::new(Expression::Fear, 0.9).unwrap(),
        });

        assert!(effects.is_empty());
        assert_eq!(machine.state().phase(), Phase::Analyzing);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut machine = Machine::new(Policy::default());
        assert!(machine.handle(Input::Reset).is_empty());
        assert!(machine.handle(Input::Reset).is_empty());
        assert_eq!(machine.state(), &WorkflowState::AwaitingSource);
    }

    #[test]
    fn test_tickets_are_unique() {
        let mut machine = Machine::new(Policy::default());
        let (_, first) = analyzing(&mut machine);
        machine.handle(Input::Reset);
        let (_, second) = analyzing(&mut machine);
        assert_ne!(first, second);
    }
}
