use crate::RequestHandle;

/// Error type reported by [`BlockSource`](crate::BlockSource) and
/// [`MeshGenerator`](crate::MeshGenerator) implementations.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Fatal error of a [`BlockMeshStream`](crate::BlockMeshStream).
///
/// None of these are retried. Once one is returned from
/// [`BlockMeshStream::tick()`](crate::BlockMeshStream::tick), the stream is halted: it stops
/// polling and requesting, keeps the scene entries it already has, and returns
/// [`StreamError::Halted`] from every later tick until it is
/// [restarted](crate::BlockMeshStream::restart).
#[derive(Debug, displaydoc::Display)]
#[non_exhaustive]
pub enum StreamError {
    /// block source query failed
    Query(BoxError),

    /// failed to submit a mesh generation request for {count} blocks
    #[non_exhaustive]
    Request {
        /// Number of blocks in the batch that could not be submitted.
        count: usize,
        /// Error from the generator.
        source: BoxError,
    },

    /// failed to apply new mesh settings to the generator
    ApplySettings(BoxError),

    /// received a result for {0:?}, which is not an outstanding request
    UnknownHandle(RequestHandle),

    /// mesh generator returned {0:?} for a new request, but that request is still outstanding
    DuplicateHandle(RequestHandle),

    /// mesh generation request {handle:?} failed
    #[non_exhaustive]
    GenerationFailed {
        /// The request that failed.
        handle: RequestHandle,
        /// Error from the generator.
        source: BoxError,
    },

    /// could not fill a batch although {pending} blocks are pending
    #[non_exhaustive]
    EmptyBatch {
        /// Size of the pending set when the queue ran dry.
        pending: usize,
    },

    /// the stream halted due to an earlier error
    Halted,
}

impl core::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            StreamError::Query(source)
            | StreamError::Request { source, .. }
            | StreamError::ApplySettings(source)
            | StreamError::GenerationFailed { source, .. } => Some(&**source),
            StreamError::UnknownHandle(_)
            | StreamError::DuplicateHandle(_)
            | StreamError::EmptyBatch { .. }
            | StreamError::Halted => None,
        }
    }
}

impl StreamError {
    /// Returns whether this error indicates that the scheduler's own bookkeeping, or the
    /// generator's use of request handles, is inconsistent, as opposed to a collaborator
    /// reporting failure.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            StreamError::UnknownHandle(_)
                | StreamError::DuplicateHandle(_)
                | StreamError::EmptyBatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::error::Error as _;

    #[test]
    fn display_and_source() {
        let error = StreamError::GenerationFailed {
            handle: RequestHandle::new(7),
            source: "device lost".into(),
        };
        assert_eq!(error.to_string(), "mesh generation request #7 failed");
        assert_eq!(error.source().unwrap().to_string(), "device lost");
        assert!(!error.is_protocol_violation());
    }

    #[test]
    fn protocol_violations() {
        assert!(StreamError::UnknownHandle(RequestHandle::new(1)).is_protocol_violation());
        assert!(StreamError::EmptyBatch { pending: 3 }.is_protocol_violation());
        assert_eq!(
            StreamError::EmptyBatch { pending: 3 }.to_string(),
            "could not fill a batch although 3 blocks are pending"
        );
        assert!(StreamError::Halted.source().is_none());
    }
}
