//! Sample collection: per-thread wait-free rings and the hot-path record.
//!
//! Application threads are producers only. The framework poll thread is
//! the single consumer, draining every ring once per tick into a segment.

pub mod registry;
pub mod ring;

pub use registry::{sample_buffers, BufferNode, SampleBufferRegistry};
pub use ring::SampleRing;

use crate::probes::Sample;
use crate::{pmu, util};

/// Record one probe hit into the calling thread's ring.
///
/// Registers the thread's buffer on its first hit. Wait-free: a full ring
/// drops the sample and counts the overflow.
#[inline]
pub(crate) fn record_hit(call_site_id: u64) {
    let node = sample_buffers().current_buffer();
    let mut sample = Sample::new(util::rdtsc(), call_site_id, node.tid());
    sample.pmc_count = pmu::pmu_ctl().read_counters(&mut sample.pmcs);
    node.ring().push(sample);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hit_registers_and_stores() {
        // Run in a dedicated thread so this test owns its ring.
        std::thread::spawn(|| {
            record_hit(77);
            record_hit(78);

            let tid = util::gettid();
            let mut seen = Vec::new();
            sample_buffers().for_each_buffer(|node| {
                if node.tid() == tid {
                    node.ring().drain(|s| seen.push(s));
                }
            });
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0].call_site_id, 77);
            assert_eq!(seen[1].call_site_id, 78);
            assert_eq!(seen[0].tid, tid);
            assert!(seen[1].tsc >= seen[0].tsc);
        })
        .join()
        .unwrap();
    }
}
