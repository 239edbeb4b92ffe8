use crate::config::MERGE_BUFFER_SIZE;
use crate::relations::Relation;
use crate::writer::OutputStream;
use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `<path>_<worker>`: one worker's headerless rows for `path`
pub fn fragment_path(path: &Path, worker: usize) -> PathBuf {
    suffixed(path, &worker.to_string())
}

/// `<path>_header`: the header line for `path`
pub fn header_path(path: &Path) -> PathBuf {
    suffixed(path, "header")
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("_");
    name.push(suffix);
    PathBuf::from(name)
}

/// Counts consecutive fragments `<path>_0`, `<path>_1`, ...
pub fn detect_fragment_count(path: &Path) -> Result<usize> {
    let mut count = 0;
    while fragment_path(path, count).exists() {
        count += 1;
    }
    if count == 0 {
        bail!(
            "No fragments found for {} (expected {})",
            path.display(),
            fragment_path(path, 0).display()
        );
    }
    Ok(count)
}

/// Concatenates the header file and worker fragments of `path`, in worker
/// order, into `path` itself. The output is compressed when the extension
/// asks for it. Returns the number of data rows.
pub fn merge_fragments(path: &Path, workers: usize, remove: bool) -> Result<u64> {
    let header = header_path(path);
    let mut parts = Vec::with_capacity(workers + 1);
    parts.push(header);
    parts.extend((0..workers).map(|worker| fragment_path(path, worker)));
    for part in &parts {
        if !part.exists() {
            bail!("Missing fragment {}", part.display());
        }
    }

    let mut out = OutputStream::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut buf = vec![0u8; MERGE_BUFFER_SIZE];
    let mut lines = 0u64;
    for part in &parts {
        let mut file =
            File::open(part).with_context(|| format!("Failed to open {}", part.display()))?;
        loop {
            let read = file.read(&mut buf)?;
            if read == 0 {
                break;
            }
            lines += memchr::memchr_iter(b'\n', &buf[..read]).count() as u64;
            out.write_all(&buf[..read])?;
        }
    }
    out.finish()
        .with_context(|| format!("Failed to finish {}", path.display()))?;

    if remove {
        for part in &parts {
            fs::remove_file(part)
                .with_context(|| format!("Failed to remove {}", part.display()))?;
        }
    }
    let rows = lines.saturating_sub(1);
    debug!(path = %path.display(), rows, "Merged fragments");
    Ok(rows)
}

/// Merges every output in parallel
pub fn merge_all(
    outputs: &BTreeMap<Relation, PathBuf>,
    workers: usize,
    remove: bool,
) -> Result<BTreeMap<Relation, u64>> {
    info!(files = outputs.len(), workers, "Merging worker fragments");
    outputs
        .par_iter()
        .map(|(relation, path)| {
            merge_fragments(path, workers, remove)
                .with_context(|| format!("Failed to merge {} file", relation.name()))
                .map(|rows| (*relation, rows))
        })
        .collect()
}
