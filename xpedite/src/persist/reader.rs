//! Sample file parsing, for offline consumers and round-trip tests.
//!
//! A file is complete when the writing process closed it; there is no
//! terminator record. Parsing stops cleanly at end of input, at the first
//! segment whose signature does not match, or at a segment whose declared
//! sample bytes are missing (a segment interrupted by an I/O failure).

use super::{
    CallSiteRecord, CALL_SITE_FILE_CAP, CALL_SITE_NAME_CAP, FILE_FORMAT_VERSION,
    FILE_HEADER_SIGNATURE, SEGMENT_SIGNATURE,
};
use std::io;
use std::path::Path;

/// Fixed fields of the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFileInfo {
    pub version: u64,
    pub sec: i64,
    pub usec: i64,
    pub tsc_hz: u64,
    pub pmc_count: u32,
}

/// One decoded sample record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSample {
    pub tsc: u64,
    pub call_site_id: u64,
    pub tid: u32,
    pub pmcs: Vec<u64>,
}

/// One drained batch of samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seq: u32,
    pub sec: i64,
    pub usec: i64,
    pub samples: Vec<DecodedSample>,
}

/// A fully parsed sample file.
#[derive(Debug, Clone)]
pub struct SampleFile {
    pub info: SampleFileInfo,
    pub call_sites: Vec<CallSiteRecord>,
    pub segments: Vec<Segment>,
}

impl SampleFile {
    pub fn read_from(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::parse(&std::fs::read(path)?)
    }

    pub fn parse(bytes: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let signature = cursor.u64()?;
        if signature != FILE_HEADER_SIGNATURE {
            return Err(invalid(format!("bad file signature 0x{signature:016X}")));
        }
        let version = cursor.u64()?;
        if version != FILE_FORMAT_VERSION {
            return Err(invalid(format!("unsupported file version 0x{version:04X}")));
        }
        let sec = cursor.i64()?;
        let usec = cursor.i64()?;
        let tsc_hz = cursor.u64()?;
        let pmc_count = cursor.u32()?;
        let call_site_count = cursor.u32()?;

        let mut call_sites = Vec::with_capacity(call_site_count as usize);
        for _ in 0..call_site_count {
            let id = cursor.u64()?;
            let line = cursor.u32()?;
            let file = cursor.padded_str(CALL_SITE_FILE_CAP)?;
            let name = cursor.padded_str(CALL_SITE_NAME_CAP)?;
            call_sites.push(CallSiteRecord { id, line, file, name });
        }

        let mut segments = Vec::new();
        while let Some(segment) = cursor.segment(pmc_count) {
            segments.push(segment);
        }

        Ok(Self {
            info: SampleFileInfo { version, sec, usec, tsc_hz, pmc_count },
            call_sites,
            segments,
        })
    }

    /// Total samples across every segment.
    pub fn total_sample_count(&self) -> usize {
        self.segments.iter().map(|s| s.samples.len()).sum()
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take(&mut self, len: usize) -> io::Result<&[u8]> {
        if self.pos + len > self.bytes.len() {
            return Err(invalid(format!("truncated file at offset {}", self.pos)));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u32(&mut self) -> io::Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> io::Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn i64(&mut self) -> io::Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn padded_str(&mut self, cap: usize) -> io::Result<String> {
        let raw = self.take(cap)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(cap);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Parse the next segment, or `None` at end of stream / on a segment
    /// that cannot be trusted.
    fn segment(&mut self, pmc_count: u32) -> Option<Segment> {
        let mark = self.pos;
        let header = (|| -> io::Result<(u32, u32, i64, i64)> {
            let signature = self.u64()?;
            if signature != SEGMENT_SIGNATURE {
                return Err(invalid(format!("bad segment signature 0x{signature:016X}")));
            }
            let sec = self.i64()?;
            let usec = self.i64()?;
            let size = self.u32()?;
            let seq = self.u32()?;
            Ok((size, seq, sec, usec))
        })();

        let (size, seq, sec, usec) = match header {
            Ok(fields) => fields,
            Err(_) => {
                self.pos = mark;
                return None;
            }
        };

        let mut samples = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let record = (|| -> io::Result<DecodedSample> {
                let tsc = self.u64()?;
                let call_site_id = self.u64()?;
                let tid = self.u32()?;
                let _reserved = self.u32()?;
                let mut pmcs = Vec::with_capacity(pmc_count as usize);
                for _ in 0..pmc_count {
                    pmcs.push(self.u64()?);
                }
                Ok(DecodedSample { tsc, call_site_id, tid, pmcs })
            })();
            match record {
                Ok(sample) => samples.push(sample),
                Err(_) => {
                    // interrupted segment — drop it entirely
                    self.pos = mark;
                    return None;
                }
            }
        }
        Some(Segment { seq, sec, usec, samples })
    }
}
