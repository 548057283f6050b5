//! Per-thread sample buffer registry.
//!
//! An append-only intrusive list of per-thread rings: an atomic head
//! pointer, each node's `next` written once before the CAS publish. The
//! poll thread traverses without locks; nodes are never freed while the
//! process lives, so buffers outlive their owning threads and the final
//! drain at shutdown still sees them.

use super::ring::SampleRing;
use crate::probes::Sample;
use crate::util;
use log::info;
use std::cell::Cell;
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Ring capacity in bytes used before any profile configures one.
const DEFAULT_CAPACITY_BYTES: usize = 1 << 20;

pub struct BufferNode {
    ring: SampleRing,
    tid: u32,
    next: *const BufferNode,
}

// SAFETY: `next` is written exactly once, before the node is published via
// a Release CAS; afterwards every field is either immutable or internally
// synchronized (the ring).
unsafe impl Send for BufferNode {}
unsafe impl Sync for BufferNode {}

impl BufferNode {
    pub fn ring(&self) -> &SampleRing {
        &self.ring
    }

    /// Kernel thread id of the owning producer thread.
    pub fn tid(&self) -> u32 {
        self.tid
    }
}

pub struct SampleBufferRegistry {
    head: AtomicPtr<BufferNode>,
    /// Records per ring for buffers allocated from now on.
    ring_capacity: AtomicUsize,
    buffer_count: AtomicUsize,
}

thread_local! {
    static CURRENT_BUFFER: Cell<*const BufferNode> = const { Cell::new(ptr::null()) };
}

impl SampleBufferRegistry {
    const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            ring_capacity: AtomicUsize::new(DEFAULT_CAPACITY_BYTES / size_of::<Sample>()),
            buffer_count: AtomicUsize::new(0),
        }
    }

    /// Configure the per-thread ring capacity, in bytes of sample data.
    /// Applies to rings allocated after this call; existing rings keep
    /// their size.
    pub fn set_ring_capacity_bytes(&self, bytes: u64) {
        let records = ((bytes as usize) / size_of::<Sample>()).max(1);
        self.ring_capacity.store(records, Ordering::Relaxed);
    }

    /// Register the calling thread's sample buffer. Idempotent per thread;
    /// returns whether an allocation happened.
    pub fn initialize_thread(&self) -> bool {
        CURRENT_BUFFER.with(|current| {
            if !current.get().is_null() {
                return false;
            }
            current.set(self.allocate_buffer());
            true
        })
    }

    fn allocate_buffer(&self) -> *const BufferNode {
        let tid = util::gettid();
        let capacity = self.ring_capacity.load(Ordering::Relaxed);
        let node = Box::into_raw(Box::new(BufferNode {
            ring: SampleRing::new(capacity),
            tid,
            next: ptr::null(),
        }));

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            // SAFETY: the node is unpublished; we are its only owner.
            unsafe {
                (*node).next = head;
            }
            match self.head.compare_exchange_weak(
                head,
                node,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => head = actual,
            }
        }
        self.buffer_count.fetch_add(1, Ordering::Relaxed);
        info!("registered sample buffer for thread {tid} ({capacity} records)");
        node
    }

    /// The calling thread's buffer, registering it on first use.
    #[inline]
    pub(crate) fn current_buffer(&self) -> &'static BufferNode {
        let node = CURRENT_BUFFER.with(|current| {
            let mut node = current.get();
            if node.is_null() {
                node = self.allocate_buffer();
                current.set(node);
            }
            node
        });
        // SAFETY: nodes are never freed once published.
        unsafe { &*node }
    }

    /// Visit every registered buffer. Lock-free; safe to call from the
    /// poll thread while producers keep appending.
    pub fn for_each_buffer(&self, mut f: impl FnMut(&BufferNode)) {
        let mut node = self.head.load(Ordering::Acquire) as *const BufferNode;
        while !node.is_null() {
            // SAFETY: published nodes are immortal and their `next` is
            // immutable after publication.
            unsafe {
                f(&*node);
                node = (*node).next;
            }
        }
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count.load(Ordering::Relaxed)
    }
}

static SAMPLE_BUFFERS: SampleBufferRegistry = SampleBufferRegistry::new();

/// The process-wide sample buffer registry.
pub fn sample_buffers() -> &'static SampleBufferRegistry {
    &SAMPLE_BUFFERS
}
