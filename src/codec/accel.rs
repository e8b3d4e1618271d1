use super::{fast, Codec};
use crate::error::Result;
use std::sync::Mutex;

/// Codec that prepares per-job state once per tree instance and serializes
/// calls under a mutex, modeling a hardware-accelerator "job handle".
///
/// The actual compression primitive is shared with [`super::FastCodec`]
/// (see the module docs on why); what `Accel` adds is the job-lifetime and
/// locking contract, which is real and testable independently of which
/// bytes come out the other end.
pub struct AccelCodec {
    /// Represents exclusive ownership of the single accelerator job; held
    /// for the duration of a compress/decompress call.
    job: Mutex<JobHandle>,
}

/// Opaque per-tree job state. A real accelerator binding would stash
/// hardware queue/descriptor state here; this substitute has none, but the
/// type still exists so the lock has something concrete to guard.
struct JobHandle {
    operations: u64,
}

impl AccelCodec {
    /// Prepares a new job handle for this tree instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            job: Mutex::new(JobHandle { operations: 0 }),
        }
    }

    /// Number of compress/decompress calls served by this job handle.
    pub fn operations(&self) -> u64 {
        self.job
            .lock()
            .expect("accel codec job mutex poisoned")
            .operations
    }
}

impl Default for AccelCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for AccelCodec {
    fn compress(&self, src: &[u8]) -> Vec<u8> {
        let mut job = self.job.lock().expect("accel codec job mutex poisoned");
        job.operations += 1;
        fast::compress(src)
    }

    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let mut job = self.job.lock().expect("accel codec job mutex poisoned");
        job.operations += 1;
        fast::decompress(src, uncompressed_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_job_reuse() {
        let codec = AccelCodec::new();
        let data = b"accelerated payload".repeat(4);
        let compressed = codec.compress(&data);
        let decompressed = codec.decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
        assert_eq!(codec.operations(), 2);
    }
}
