use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

// Upper bound for any JSON or blob file the CLI reads.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 64 * 1024 * 1024; // 64 MiB

pub fn max_input_bytes() -> usize {
    if let Ok(mb_str) = std::env::var("VOTE_CLI_MAX_INPUT_MB") {
        if let Ok(mb) = mb_str.parse::<usize>() {
            return mb.saturating_mul(1024 * 1024);
        }
    }
    DEFAULT_MAX_INPUT_BYTES
}

pub fn read_all_with_limit<R: Read>(mut reader: R, max_size: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(std::cmp::min(max_size, 64 * 1024));
    let mut chunk = [0u8; 8192];
    let mut total = 0usize;
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        total += n;
        if total > max_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "input size limit exceeded",
            ));
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(out)
}

pub fn read_file_with_limit(path: &Path, max_size: usize) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    read_all_with_limit(file, max_size)
}
