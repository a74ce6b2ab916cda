//! Error taxonomy for the RPC surface.
//!
//! Per-frame anomalies are not errors: decoders warn and skip so a bad
//! capture never aborts a batch. Everything that does surface to a client
//! maps onto one of three RPC status codes.

use arflow_recorder::RecorderError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session `{0}` not found")]
    SessionNotFound(String),

    #[error("device already in session")]
    DeviceAlreadyInSession,

    /// A device tried to leave a session it never joined.
    #[error("device not in session")]
    DeviceNotInSession,

    /// A device tried to save frames into a session it is not a member of.
    #[error("device is not a member of this session")]
    NotAMember,

    #[error("no frames provided")]
    EmptyFrameBatch,

    #[error("either spawn the viewer or save the data, but not both, and neither can be disabled")]
    ModeConflict,

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("hook failed: {0}")]
    Hook(eyre::Report),
}

impl From<SessionError> for tonic::Status {
    fn from(err: SessionError) -> Self {
        // Log every error before it is flattened into a wire status.
        match &err {
            SessionError::SessionNotFound(_) | SessionError::DeviceNotInSession => {
                tracing::warn!("{err}");
                tonic::Status::not_found(err.to_string())
            }
            SessionError::DeviceAlreadyInSession
            | SessionError::NotAMember
            | SessionError::EmptyFrameBatch
            | SessionError::ModeConflict => {
                tracing::warn!("{err}");
                tonic::Status::invalid_argument(err.to_string())
            }
            SessionError::Recorder(_) | SessionError::Hook(_) => {
                tracing::error!("{err}");
                tonic::Status::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let status: tonic::Status = SessionError::SessionNotFound("x".into()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = SessionError::DeviceNotInSession.into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = SessionError::NotAMember.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = SessionError::EmptyFrameBatch.into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = SessionError::Hook(eyre::eyre!("boom")).into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }
}
