use crate::core::error::Result;
use crate::core::fs::is_gzipped;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Build a tab-separated reader for a file (plain or gzip) or stdin (`-`).
pub fn get_reader<P: AsRef<Path>>(path: P, has_headers: bool) -> Result<csv::Reader<Box<dyn Read>>> {
    let path = path.as_ref();
    let raw_reader: Box<dyn Read> = if path.as_os_str() == "-" {
        Box::new(io::stdin())
    } else {
        let reader = BufReader::with_capacity(256 * 1024, File::open(path)?);
        if is_gzipped(path) {
            Box::new(MultiGzDecoder::new(reader))
        } else {
            Box::new(reader)
        }
    };

    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(raw_reader))
}
