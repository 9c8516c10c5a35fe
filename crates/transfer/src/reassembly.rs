use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::ZlibDecoder;
use partrelay_protocol::{CompletionRecord, Compression};
use sha2::{Digest, Sha256};

use crate::TransferError;
use crate::store::{StagingStore, TransferKey};

/// Everything needed to rebuild one artifact.
#[derive(Debug, Clone)]
pub struct ReassemblyJob<'a> {
    pub transfer: &'a TransferKey,
    pub record: CompletionRecord,
    /// Absolute directory the artifact is written into.
    pub destination_dir: &'a Path,
    pub filename: &'a str,
}

/// A fully written artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
    /// SHA-256 hex digest of the artifact contents.
    pub sha256: String,
}

/// Decodes one staged chunk: base64 text, then zlib inflate for
/// [`Compression::Deflate`].
///
/// ASCII whitespace in the staged text is ignored.
pub fn decode_part(
    part: u32,
    staged: &[u8],
    compression: Compression,
) -> Result<Vec<u8>, TransferError> {
    let text: Vec<u8> = staged
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let raw = STANDARD
        .decode(&text)
        .map_err(|source| TransferError::Decode { part, source })?;

    match compression {
        Compression::None => Ok(raw),
        Compression::Deflate => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(raw.as_slice())
                .read_to_end(&mut inflated)
                .map_err(|source| TransferError::Inflate { part, source })?;
            Ok(inflated)
        }
    }
}

/// Attempts at publishing under a fresh revision name before giving up.
const PUBLISH_ATTEMPTS: u32 = 8;

/// Writes parts `1..=max_part` of a transfer, in order, into a new
/// artifact.
///
/// Parts are written to a hidden partial file owned by this call, which is
/// then linked into place under the name picked by revision resolution.
/// Linking fails rather than replacing an existing file, so a concurrent
/// reassembly of the same name moves on to the next revision. Staged
/// entries are only read. On any error only the partial file is removed.
pub fn reassemble<S: StagingStore + ?Sized>(
    store: &S,
    job: &ReassemblyJob<'_>,
) -> Result<Artifact, TransferError> {
    tracing::info!(
        transfer = %job.transfer,
        max_part = job.record.max_part,
        compression = %job.record.compression,
        "all chunks staged, reassembling"
    );

    partrelay_file_ops::ensure_dir(job.destination_dir)?;
    let (partial, file) = create_partial(job.destination_dir, job.filename)?;

    let result = write_parts(store, job, file).and_then(|written| {
        let path = publish(job.destination_dir, job.filename, &partial)?;
        Ok((path, written))
    });

    if let Err(e) = std::fs::remove_file(&partial) {
        tracing::warn!(path = %partial.display(), error = %e, "failed to remove partial artifact");
    }

    let (path, (size, sha256)) = result?;
    tracing::info!(path = %path.display(), size, %sha256, "artifact written");
    Ok(Artifact { path, size, sha256 })
}

/// Creates `.{filename}.{n}.partial` with the first free `n`.
fn create_partial(dir: &Path, filename: &str) -> Result<(PathBuf, File), TransferError> {
    let mut n = 0u32;
    loop {
        let path = dir.join(format!(".{filename}.{n}.partial"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

fn write_parts<S: StagingStore + ?Sized>(
    store: &S,
    job: &ReassemblyJob<'_>,
    file: File,
) -> Result<(u64, String), TransferError> {
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut size = 0u64;

    for part in 1..=job.record.max_part {
        let staged = store.read_chunk(job.transfer, part)?;
        let data = decode_part(part, &staged, job.record.compression)?;
        tracing::debug!(part, bytes = data.len(), "appending chunk");
        writer.write_all(&data)?;
        hasher.update(&data);
        size += data.len() as u64;
    }

    writer.flush()?;
    writer
        .into_inner()
        .map_err(std::io::IntoInnerError::into_error)?
        .sync_all()?;

    Ok((size, hex::encode(hasher.finalize())))
}

/// Links the finished partial file under a free artifact name.
fn publish(dir: &Path, filename: &str, partial: &Path) -> Result<PathBuf, TransferError> {
    let mut attempt = 1;
    loop {
        let name = partrelay_file_ops::resolve_artifact_name(dir, filename)?;
        let path = dir.join(&name);
        match std::fs::hard_link(partial, &path) {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < PUBLISH_ATTEMPTS => {
                tracing::debug!(name = %name, attempt, "artifact name taken concurrently, re-resolving");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
