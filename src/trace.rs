//! Trace ingest: the textual and binary record formats, a file-type sniffer, and a
//! parallel binary reader that range-partitions the file across worker threads.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info};

use crate::error::{Result, SimulationError};

/// One memory access as captured in a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRequest {
    pub tid: i32,
    pub size: i32,
    /// Raw scatter/gather bitfield: bit0=Start, bit1=Middle, bit2=End; 0 = not a bundle.
    pub bundle_kind: i32,
    pub is_write: bool,
    pub address: u64,
    pub pc: u64,
}

/// Size in bytes of one binary-format record: `3*i32 + u8 + 2*u64`.
pub const BINARY_RECORD_SIZE: usize = 3 * 4 + 1 + 2 * 8;

/// Reserved bundle-kind value skipped by bundle-statistics passes.
pub const BUNDLE_KIND_SENTINEL: i32 = 7;

impl MemoryRequest {
    pub fn new(
        tid: i32,
        size: i32,
        bundle_kind: i32,
        is_write: bool,
        address: u64,
        pc: u64,
    ) -> Self {
        Self {
            tid,
            size,
            bundle_kind,
            is_write,
            address,
            pc,
        }
    }

    pub fn is_bundle(&self) -> bool {
        self.bundle_kind != 0
    }

    pub fn is_bundle_start(&self) -> bool {
        self.bundle_kind & 0b001 != 0
    }

    pub fn is_bundle_middle(&self) -> bool {
        self.bundle_kind & 0b010 != 0
    }

    pub fn is_bundle_end(&self) -> bool {
        self.bundle_kind & 0b100 != 0
    }

    fn to_binary_bytes(self) -> [u8; BINARY_RECORD_SIZE] {
        let mut buf = [0u8; BINARY_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.tid.to_le_bytes());
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.bundle_kind.to_le_bytes());
        buf[12] = self.is_write as u8;
        buf[13..21].copy_from_slice(&self.address.to_le_bytes());
        buf[21..29].copy_from_slice(&self.pc.to_le_bytes());
        buf
    }

    fn from_binary_bytes(buf: &[u8; BINARY_RECORD_SIZE]) -> Self {
        Self {
            tid: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            size: i32::from_le_bytes(buf[4..8].try_into().unwrap()),
            bundle_kind: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
            is_write: buf[12] != 0,
            address: u64::from_le_bytes(buf[13..21].try_into().unwrap()),
            pc: u64::from_le_bytes(buf[21..29].try_into().unwrap()),
        }
    }
}

/// An in-memory, read-only trace: insertion-ordered requests plus their addresses in
/// the same order (built once, read many times).
#[derive(Clone, Debug, Default)]
pub struct MemoryTrace {
    requests: Vec<MemoryRequest>,
    addresses: Vec<u64>,
}

impl MemoryTrace {
    pub fn from_requests(requests: Vec<MemoryRequest>) -> Self {
        let addresses = requests.iter().map(|r| r.address).collect();
        Self {
            requests,
            addresses,
        }
    }

    pub fn requests(&self) -> &[MemoryRequest] {
        &self.requests
    }

    pub fn addresses(&self) -> &[u64] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// A sniffed trace encoding: whether a file looks like the binary or textual format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEncoding {
    Text,
    Binary,
}

/// Reads up to 500 bytes from the start of the file; any NUL byte anywhere in that
/// prefix means Binary, otherwise Text. Empty files are Text.
pub fn sniff_encoding(path: impl AsRef<Path>) -> Result<TraceEncoding> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 500];
    let read = file.read(&mut buf)?;
    let encoding = if buf[..read].contains(&0) {
        TraceEncoding::Binary
    } else {
        TraceEncoding::Text
    };
    debug!("sniffed trace encoding: {encoding:?}");
    Ok(encoding)
}

/// Parses the textual trace format: one record per line, commas stripped, fields
/// tokenized by whitespace as `seq tid bundle_kind is_write size` (decimal) followed
/// by `address pc` (hex). `seq` is parsed and discarded. Blank lines are skipped.
pub fn parse_text(reader: impl BufRead) -> Result<MemoryTrace> {
    let mut requests = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let stripped: String = line.chars().filter(|&c| c != ',').collect();
        let tokens: Vec<&str> = stripped.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        let malformed = |detail: &str| {
            SimulationError::InvalidTrace(format!(
                "line {}: {detail}: {line:?}",
                line_no + 1
            ))
        };

        if tokens.len() != 7 {
            return Err(malformed(&format!(
                "expected 7 fields, found {}",
                tokens.len()
            )));
        }

        let _seq: i64 = tokens[0]
            .parse()
            .map_err(|_| malformed("seq is not an integer"))?;
        let tid: i32 = tokens[1]
            .parse()
            .map_err(|_| malformed("tid is not an integer"))?;
        let bundle_kind: i32 = tokens[2]
            .parse()
            .map_err(|_| malformed("bundle_kind is not an integer"))?;
        let is_write: bool = match tokens[3] {
            "0" => false,
            "1" => true,
            _ => return Err(malformed("is_write is not 0 or 1")),
        };
        let size: i32 = tokens[4]
            .parse()
            .map_err(|_| malformed("size is not an integer"))?;
        let address = u64::from_str_radix(tokens[5].trim_start_matches("0x"), 16)
            .map_err(|_| malformed("address is not hexadecimal"))?;
        let pc = u64::from_str_radix(tokens[6].trim_start_matches("0x"), 16)
            .map_err(|_| malformed("pc is not hexadecimal"))?;

        requests.push(MemoryRequest::new(
            tid,
            size,
            bundle_kind,
            is_write,
            address,
            pc,
        ));
    }

    Ok(MemoryTrace::from_requests(requests))
}

/// Reads the binary format serially: an 8-byte record count header followed by N
/// fixed-width records.
pub fn read_binary(mut reader: impl Read) -> Result<MemoryTrace> {
    let count = read_header(&mut reader)?;
    let mut requests = Vec::with_capacity(count as usize);
    let mut buf = [0u8; BINARY_RECORD_SIZE];
    for _ in 0..count {
        reader.read_exact(&mut buf).map_err(|e| {
            SimulationError::InvalidTrace(format!("truncated binary trace: {e}"))
        })?;
        requests.push(MemoryRequest::from_binary_bytes(&buf));
    }
    Ok(MemoryTrace::from_requests(requests))
}

fn read_header(reader: &mut impl Read) -> Result<u64> {
    let mut header = [0u8; 8];
    reader
        .read_exact(&mut header)
        .map_err(|e| SimulationError::InvalidTrace(format!("missing binary header: {e}")))?;
    Ok(u64::from_le_bytes(header))
}

/// Writes the binary format: header then each record in the same field order/width.
pub fn write_binary(mut writer: impl Write, trace: &MemoryTrace) -> Result<()> {
    writer.write_all(&(trace.len() as u64).to_le_bytes())?;
    for request in &trace.requests {
        writer.write_all(&request.to_binary_bytes())?;
    }
    Ok(())
}

/// Reads the binary format by range-partitioning the file across `worker_count`
/// scoped OS threads, each seeking independently and filling a disjoint mutable
/// slice of the destination. Deterministically reconstructs the input order.
pub fn read_binary_parallel(path: impl AsRef<Path>, worker_count: usize) -> Result<MemoryTrace> {
    let path = path.as_ref();
    let count = {
        let mut file = File::open(path)?;
        read_header(&mut file)?
    };

    let hw = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let workers = worker_count.max(1).min(hw).min(count.max(1) as usize);

    info!("reading {count} binary trace records with {workers} worker thread(s)");

    let mut requests = vec![
        MemoryRequest::new(0, 0, 0, false, 0, 0);
        count as usize
    ];

    let rec_per_worker = (count as usize).div_ceil(workers.max(1)).max(1);
    let bytes_per_worker = rec_per_worker * BINARY_RECORD_SIZE;

    let errors: Vec<std::io::Result<()>> = std::thread::scope(|scope| {
        let mut remaining = requests.as_mut_slice();
        let mut handles = Vec::with_capacity(workers);
        let mut start = 0usize;

        while start < count as usize {
            let end = (start + rec_per_worker).min(count as usize);
            let (chunk, rest) = remaining.split_at_mut(end - start);
            remaining = rest;

            let worker_index = start / rec_per_worker;
            handles.push(scope.spawn(move || -> std::io::Result<()> {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(
                    8 + (worker_index * bytes_per_worker) as u64,
                ))?;
                let mut buf = [0u8; BINARY_RECORD_SIZE];
                for slot in chunk.iter_mut() {
                    file.read_exact(&mut buf)?;
                    *slot = MemoryRequest::from_binary_bytes(&buf);
                }
                Ok(())
            }));

            start = end;
        }

        handles
            .into_iter()
            .map(|h| h.join().expect("trace worker thread panicked"))
            .collect()
    });

    for result in errors {
        result.map_err(|e| SimulationError::InvalidTrace(format!("parallel read failed: {e}")))?;
    }

    Ok(MemoryTrace::from_requests(requests))
}

/// Convenience: sniffs, then parses a trace file with the serial reader appropriate
/// to its detected encoding.
pub fn load_trace(path: impl AsRef<Path>) -> Result<MemoryTrace> {
    let path = path.as_ref();
    match sniff_encoding(path)? {
        TraceEncoding::Text => parse_text(BufReader::new(File::open(path)?)),
        TraceEncoding::Binary => read_binary(BufReader::new(File::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_requests() -> Vec<MemoryRequest> {
        vec![
            MemoryRequest::new(0, 16, 0, false, 0xffff_3741_4010, 0x0040_091c),
            MemoryRequest::new(0, 16, 0, true, 0xffff_3731_3010, 0x0040_0924),
            MemoryRequest::new(0, 8, 3, false, 0x006c_f540, 0x0040_e364),
            MemoryRequest::new(0, 8, 2, false, 0x006c_f580, 0x0040_e364),
            MemoryRequest::new(0, 8, 6, false, 0x006c_f620, 0x0040_e364),
        ]
    }

    #[test]
    fn parse_text_matches_the_five_entry_fixture() {
        let text = "\
            32,0,0,0,16,0xffff37414010,0x40091c\n\
            33,0,0,1,16,0xffff37313010,0x400924\n\
            4016116,0,3,0,8,0x6cf540,0x40e364\n\
            4016118,0,2,0,8,0x6cf580,0x40e364\n\
            4016123,0,6,0,8,0x6cf620,0x40e364\n";
        let trace = parse_text(Cursor::new(text)).unwrap();
        assert_eq!(trace.requests(), sample_requests().as_slice());
    }

    #[test]
    fn parse_text_skips_blank_lines() {
        let text = "32,0,0,0,16,0x10,0x20\n\n33,0,0,1,16,0x11,0x21\n";
        let trace = parse_text(Cursor::new(text)).unwrap();
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn parse_text_rejects_malformed_line() {
        let text = "not,a,valid,line\n";
        assert!(parse_text(Cursor::new(text)).is_err());
    }

    #[test]
    fn sniff_empty_file_is_text() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("cachesim-empty-{:?}.trace", std::thread::current().id()));
        std::fs::write(&path, []).unwrap();
        assert_eq!(sniff_encoding(&path).unwrap(), TraceEncoding::Text);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn binary_round_trip_preserves_fields() {
        let trace = MemoryTrace::from_requests(sample_requests());
        let mut buf = Vec::new();
        write_binary(&mut buf, &trace).unwrap();
        let read_back = read_binary(Cursor::new(buf)).unwrap();
        assert_eq!(read_back.requests(), trace.requests());
        assert_eq!(read_back.addresses(), trace.addresses());
    }

    #[test]
    fn text_to_binary_round_trip() {
        let text = "\
            32,0,0,0,16,0xffff37414010,0x40091c\n\
            33,0,0,1,16,0xffff37313010,0x400924\n";
        let original = parse_text(Cursor::new(text)).unwrap();
        let mut buf = Vec::new();
        write_binary(&mut buf, &original).unwrap();
        let round_tripped = read_binary(Cursor::new(buf)).unwrap();
        assert_eq!(round_tripped.requests(), original.requests());
    }

    #[test]
    fn parallel_binary_read_matches_serial_for_various_worker_counts() {
        let mut requests = Vec::new();
        for i in 0..257u64 {
            requests.push(MemoryRequest::new(
                (i % 4) as i32,
                8,
                0,
                i % 2 == 0,
                i * 64,
                i,
            ));
        }
        let trace = MemoryTrace::from_requests(requests);

        let dir = std::env::temp_dir();
        let path = dir.join(format!(
            "cachesim-parallel-{:?}.bin",
            std::thread::current().id()
        ));
        let mut file = File::create(&path).unwrap();
        write_binary(&mut file, &trace).unwrap();
        drop(file);

        let hw = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        for workers in 1..=hw.max(4) {
            let parallel = read_binary_parallel(&path, workers).unwrap();
            assert_eq!(parallel.requests(), trace.requests(), "workers={workers}");
        }

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bundle_kind_bit_derivations() {
        let start_middle = MemoryRequest::new(0, 8, 3, false, 0, 0);
        assert!(start_middle.is_bundle());
        assert!(start_middle.is_bundle_start());
        assert!(start_middle.is_bundle_middle());
        assert!(!start_middle.is_bundle_end());

        let middle_end = MemoryRequest::new(0, 8, 6, false, 0, 0);
        assert!(middle_end.is_bundle_middle());
        assert!(middle_end.is_bundle_end());
        assert!(!middle_end.is_bundle_start());

        let none = MemoryRequest::new(0, 8, 0, false, 0, 0);
        assert!(!none.is_bundle());
    }
}
