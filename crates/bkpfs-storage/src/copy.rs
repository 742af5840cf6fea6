//! Chunked node-to-node copy.

use crate::{Backend, StorageError, StorageResult};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default chunk size for streaming copies (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Copy the content of `src` into `dst`, replacing whatever `dst` held.
///
/// The copy is bounded by the size of `src` observed when it starts, so a
/// concurrent writer that keeps appending cannot make it run forever. Each
/// chunk is a suspension point; `cancel` is checked before every chunk.
/// Returns the number of bytes copied.
///
/// On error the destination is left partially written. Callers own cleanup.
pub async fn copy_node(
    backend: &dyn Backend,
    src: &Path,
    dst: &Path,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> StorageResult<u64> {
    let chunk_size = chunk_size.max(1);
    let total = backend.stat(src).await?.size;
    backend.truncate(dst, 0).await?;

    let mut offset = 0u64;
    while offset < total {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled(dst.display().to_string()));
        }

        let want = usize::try_from(total - offset)
            .unwrap_or(usize::MAX)
            .min(chunk_size);
        let chunk = backend.read_at(src, offset, want).await?;
        if chunk.is_empty() {
            // Source shrank underneath us.
            break;
        }
        backend.write_at(dst, offset, &chunk).await?;
        offset += chunk.len() as u64;
    }

    debug!(
        src = %src.display(),
        dst = %dst.display(),
        bytes = offset,
        "Copied node"
    );
    Ok(offset)
}
