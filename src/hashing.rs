//! Hash Service: a 64-bit, non-cryptographic, content-addressed hash over a file's
//! bytes, computed in fixed-size logical chunks.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use memmap2::Mmap;
use xxhash_rust::xxh3::Xxh3;

use crate::config::HashingConsts;

pub use crate::config::HASH_ALGORITHM_NAME;

/// Hash a file's contents. Uses memory-mapped I/O above the mmap threshold,
/// chunked reads (64 KiB logical chunks) otherwise.
pub fn hash_file(path: &Path) -> io::Result<u64> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    hash_file_with_len(file, len)
}

fn hash_file_with_len(file: File, len: u64) -> io::Result<u64> {
    let mut hasher = Xxh3::new();

    if len > HashingConsts::HASH_MMAP_THRESHOLD {
        // Safety: the file is opened read-only for the lifetime of this mapping and is not
        // truncated concurrently by this process.
        let mmap = unsafe { Mmap::map(&file)? };
        for chunk in mmap.chunks(HashingConsts::HASH_CHUNK_SIZE) {
            hasher.update(chunk);
        }
    } else {
        let mut reader = io::BufReader::with_capacity(HashingConsts::HASH_CHUNK_SIZE, file);
        let mut buffer = vec![0u8; HashingConsts::HASH_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
    }

    Ok(hasher.digest())
}

/// Hash an in-memory byte slice the same way `hash_file` hashes chunks, for tests
/// and for content already read into memory by the File Processor.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = Xxh3::new();
    for chunk in bytes.chunks(HashingConsts::HASH_CHUNK_SIZE) {
        hasher.update(chunk);
    }
    hasher.digest()
}
