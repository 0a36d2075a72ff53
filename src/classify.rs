use crate::upstream::{TransportFailure, UpstreamOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedResult {
    Success(Vec<u8>),
    /// Upstream is cold-starting the model.
    ModelLoading,
    ModelNotFound,
    UpstreamError { status: u16, body: Vec<u8> },
    Timeout,
    Unreachable,
}

pub fn classify(outcome: UpstreamOutcome) -> ClassifiedResult {
    match outcome {
        UpstreamOutcome::TransportFailure(TransportFailure::Timeout) => ClassifiedResult::Timeout,
        UpstreamOutcome::TransportFailure(TransportFailure::Unreachable) => {
            ClassifiedResult::Unreachable
        }
        UpstreamOutcome::Response { status: 200, body } => ClassifiedResult::Success(body),
        UpstreamOutcome::Response { status: 503, .. } => ClassifiedResult::ModelLoading,
        UpstreamOutcome::Response { status: 404, .. } => ClassifiedResult::ModelNotFound,
        UpstreamOutcome::Response { status, body } => {
            ClassifiedResult::UpstreamError { status, body }
        }
    }
}
