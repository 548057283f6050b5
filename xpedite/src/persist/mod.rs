//! Binary sample file emission.
//!
//! A sample file is one `FileHeader`, a call-site table, then a stream of
//! `SegmentHeader`-prefixed sample batches — one segment per poll tick.
//! All fields are little-endian with no padding beyond the declared
//! layout:
//!
//! ```text
//! FileHeader (48 bytes):
//!   signature: u64 = 0xC01DC01DC0FFEEEE, version: u64 = 0x0200,
//!   sec: i64, usec: i64, tsc_hz: u64, pmc_count: u32, call_site_count: u32
//! CallSiteInfo (204 bytes, call_site_count times):
//!   id: u64, line: u32, file: [u8; 128] NUL-padded, name: [u8; 64] NUL-padded
//! Segment (repeated):
//!   signature: u64 = 0x5CA1AB1E887A57EF, sec: i64, usec: i64,
//!   size: u32, seq: u32, then `size` samples of (24 + 8 * pmc_count) bytes:
//!   tsc: u64, call_site_id: u64, tid: u32, reserved: u32, pmc[pmc_count]: u64
//! ```
//!
//! Each header and each segment goes to the file in a single `write` call;
//! a short write is reported, never patched up.

pub mod reader;

pub use reader::{DecodedSample, SampleFile, SampleFileInfo, Segment};

use crate::probes::Sample;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

pub const FILE_HEADER_SIGNATURE: u64 = 0xC01D_C01D_C0FF_EEEE;
pub const SEGMENT_SIGNATURE: u64 = 0x5CA1_AB1E_887A_57EF;
pub const FILE_FORMAT_VERSION: u64 = 0x0200;

pub const CALL_SITE_FILE_CAP: usize = 128;
pub const CALL_SITE_NAME_CAP: usize = 64;

/// Textual coordinates of one probe, captured at header write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteRecord {
    pub id: u64,
    pub line: u32,
    pub file: String,
    pub name: String,
}

/// Wall-clock time as `(sec, usec)` since the epoch.
fn timeval(now: SystemTime) -> (i64, i64) {
    match now.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => (elapsed.as_secs() as i64, i64::from(elapsed.subsec_micros())),
        Err(_) => (0, 0),
    }
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// NUL-padded fixed-width string field, truncated at `cap` bytes.
fn put_str(buf: &mut Vec<u8>, s: &str, cap: usize) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(cap);
    buf.extend_from_slice(&bytes[..len]);
    buf.resize(buf.len() + (cap - len), 0);
}

/// Write the file header and call-site table. Called exactly once per
/// sample file, before any sample bytes.
pub fn persist_header<W: Write>(
    out: &mut W,
    call_sites: &[CallSiteRecord],
    tsc_hz: u64,
    pmc_count: u32,
    now: SystemTime,
) -> io::Result<()> {
    let (sec, usec) = timeval(now);
    let mut buf =
        Vec::with_capacity(48 + call_sites.len() * (8 + 4 + CALL_SITE_FILE_CAP + CALL_SITE_NAME_CAP));
    put_u64(&mut buf, FILE_HEADER_SIGNATURE);
    put_u64(&mut buf, FILE_FORMAT_VERSION);
    put_i64(&mut buf, sec);
    put_i64(&mut buf, usec);
    put_u64(&mut buf, tsc_hz);
    put_u32(&mut buf, pmc_count);
    put_u32(&mut buf, call_sites.len() as u32);
    for site in call_sites {
        put_u64(&mut buf, site.id);
        put_u32(&mut buf, site.line);
        put_str(&mut buf, &site.file, CALL_SITE_FILE_CAP);
        put_str(&mut buf, &site.name, CALL_SITE_NAME_CAP);
    }
    out.write_all(&buf)
}

/// Write one segment: header plus `samples.len()` records, each carrying
/// `pmc_count` counters (missing counters are zero-filled).
pub fn persist_segment<W: Write>(
    out: &mut W,
    samples: &[Sample],
    pmc_count: u32,
    seq: u32,
    now: SystemTime,
) -> io::Result<()> {
    let (sec, usec) = timeval(now);
    let record_len = 24 + 8 * pmc_count as usize;
    let mut buf = Vec::with_capacity(32 + samples.len() * record_len);
    put_u64(&mut buf, SEGMENT_SIGNATURE);
    put_i64(&mut buf, sec);
    put_i64(&mut buf, usec);
    put_u32(&mut buf, samples.len() as u32);
    put_u32(&mut buf, seq);
    for sample in samples {
        put_u64(&mut buf, sample.tsc);
        put_u64(&mut buf, sample.call_site_id);
        put_u32(&mut buf, sample.tid);
        put_u32(&mut buf, 0);
        for slot in 0..pmc_count as usize {
            let value = if slot < sample.pmc_count as usize { sample.pmcs[slot] } else { 0 };
            put_u64(&mut buf, value);
        }
    }
    out.write_all(&buf)
}
