//! Simulated mesh generation service, running on a background thread.

use std::thread;
use std::time::Duration;

use meshstream::{
    BlockResult, BoxError, GenerationRequest, GenerationResult, LevelOfDetail, MeshGenerator,
    MeshSettings, MeshingFlags, RequestHandle, ResolvedBlock, ResultSender,
};

/// Stand-in for generated mesh data: only its size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct SimMesh {
    pub triangles: usize,
}

struct Job {
    handle: RequestHandle,
    request: GenerationRequest,
    flags: MeshingFlags,
    reply: ResultSender<SimMesh>,
}

/// [`MeshGenerator`] which processes requests, one at a time, on a worker thread, taking
/// `latency` for each.
#[derive(Debug)]
pub(crate) struct ThreadedGenerator {
    next_handle: u64,
    flags: MeshingFlags,
    /// [`None`] only while dropping.
    jobs: Option<flume::Sender<Job>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ThreadedGenerator {
    pub fn new(latency: Duration) -> Result<Self, anyhow::Error> {
        let (jobs, job_receiver) = flume::unbounded::<Job>();
        let thread = thread::Builder::new()
            .name("mesh generator".to_owned())
            .spawn(move || {
                while let Ok(job) = job_receiver.recv() {
                    thread::sleep(latency);
                    job.reply.send(run_job(job.handle, &job.request, job.flags));
                }
                log::trace!("mesh generator thread exiting");
            })?;
        Ok(Self {
            next_handle: 0,
            flags: MeshSettings::default().flags,
            jobs: Some(jobs),
            thread: Some(thread),
        })
    }
}

impl MeshGenerator for ThreadedGenerator {
    type Geometry = SimMesh;

    fn request(
        &mut self,
        request: GenerationRequest,
        reply: ResultSender<SimMesh>,
    ) -> Result<RequestHandle, BoxError> {
        let handle = RequestHandle::new(self.next_handle);
        self.next_handle += 1;
        let job = Job {
            handle,
            request,
            flags: self.flags,
            reply,
        };
        self.jobs
            .as_ref()
            .ok_or("generator is shutting down")?
            .send(job)
            .map_err(|_| "mesh generator thread has exited")?;
        Ok(handle)
    }

    fn apply_settings(&mut self, settings: &MeshSettings) -> Result<(), BoxError> {
        self.flags = settings.flags;
        Ok(())
    }
}

impl Drop for ThreadedGenerator {
    fn drop(&mut self) {
        // Disconnecting the channel tells the thread to exit.
        self.jobs = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("mesh generator thread panicked");
            }
        }
    }
}

fn run_job(
    handle: RequestHandle,
    request: &GenerationRequest,
    flags: MeshingFlags,
) -> GenerationResult<SimMesh> {
    let triangles = match request.level_of_detail {
        LevelOfDetail::Minimum => 200,
        LevelOfDetail::Medium => 1_000,
        LevelOfDetail::Maximum => 5_000,
    };
    let blocks = request
        .ids
        .iter()
        .map(|&id| {
            // Some blocks have too little data to mesh.
            let sparse = u128::from(id) % 17 == 0;
            let mesh = SimMesh {
                triangles: if sparse { 0 } else { triangles },
            };
            let block = ResolvedBlock::new(id, request.level_of_detail, flags, mesh);
            let block = if sparse {
                block.with_result(BlockResult::Pending)
            } else {
                block
            };
            if flags.contains(MeshingFlags::COMPUTE_CONFIDENCE) {
                block.with_confidence(vec![1.0_f32; mesh.triangles * 3])
            } else {
                block
            }
        })
        .collect();
    GenerationResult::success(handle, blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshstream::BlockId;
    use pretty_assertions::assert_eq;

    #[test]
    fn run_job_counts_triangles() {
        let request = GenerationRequest::new(
            vec![BlockId::new(0, 1), BlockId::new(0, 17)],
            LevelOfDetail::Minimum,
        );
        let result = run_job(RequestHandle::new(3), &request, MeshingFlags::COMPUTE_CONFIDENCE);
        assert_eq!(result.handle, RequestHandle::new(3));
        let blocks = result.outcome.unwrap();
        assert_eq!(blocks[0].geometry, SimMesh { triangles: 200 });
        assert_eq!(blocks[0].confidence.as_ref().map(|c| c.len()), Some(600));
        assert_eq!(blocks[1].result, BlockResult::Pending);
        assert_eq!(blocks[1].geometry, SimMesh { triangles: 0 });
    }
}
