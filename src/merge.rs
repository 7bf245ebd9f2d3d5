//! Merge Module
//!
//! Rewrites live records into a compact file set and swaps it in on the
//! next open.
//!
//! ## Directory Layout During A Merge
//! ```text
//! {dir}/            000000000.scl ... 000000007.scl (7 = boundary, active)
//! {dir}-merge/      000000000.scl ... hint-index  merge-finished
//! ```
//!
//! Files below the boundary are frozen when the merge starts. Once
//! `merge-finished` exists the merge directory replaces them; without it
//! the merge directory is thrown away.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{IndexKind, SyncStrategy};
use crate::data::{
    encode_key_with_seq, parse_data_file_id, parse_key_with_seq, DataFile, LogRecord,
    LogRecordPos, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME, NON_TXN_SEQ, SEQ_NO_FILE_NAME,
};
use crate::engine::Engine;
use crate::error::{CaskError, Result};

/// Key of the single record in the merge marker file
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

/// Clears the merge flag when the merge returns, whatever the outcome
struct MergeGuard<'a>(&'a AtomicBool);

impl Drop for MergeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    /// Compact sealed data files into `{dir}-merge`
    ///
    /// Steps:
    /// 1. Refuse if another merge is running
    /// 2. Seal the active file; files below the new active id are frozen
    /// 3. Copy each record the index still points at into a scratch engine
    /// 4. Write a hint file with the new positions
    /// 5. Write the marker holding the boundary id
    ///
    /// The result is adopted by the next `Engine::open`.
    pub fn merge(&self) -> Result<()> {
        if self
            .merging
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaskError::MergeInProgress);
        }
        let _guard = MergeGuard(&self.merging);

        // Step 2: Freeze everything written so far
        let (mut merge_files, boundary) = {
            let mut files = self.files.write();
            if files.active.is_none() {
                return Ok(());
            }

            files.rotate(self.dir_path())?;
            let boundary = match &files.active {
                Some(active) => active.file_id(),
                None => return Ok(()),
            };
            let merge_files: Vec<Arc<DataFile>> = files.sealed.values().cloned().collect();
            (merge_files, boundary)
        };
        merge_files.sort_by_key(|file| file.file_id());

        tracing::info!(files = merge_files.len(), boundary, "merge started");

        // Step 3: Fresh scratch directory + engine
        let merge_path = merge_dir_path(self.dir_path());
        if merge_path.exists() {
            fs::remove_dir_all(&merge_path)?;
        }
        fs::create_dir_all(&merge_path)?;

        let mut merge_config = self.config().clone();
        merge_config.dir_path = merge_path.clone();
        merge_config.sync_strategy = SyncStrategy::OsBuffered;
        merge_config.index_kind = IndexKind::BTree;
        let merge_engine = Engine::open(merge_config)?;

        let mut hint_file = DataFile::open_hint_file(&merge_path)?;
        let mut kept = 0usize;
        let mut dropped = 0usize;

        for data_file in &merge_files {
            let mut offset = 0;
            loop {
                let (record, size) = match data_file.read_record(offset) {
                    Ok(r) => r,
                    Err(CaskError::UnexpectedEof) => break,
                    Err(e) => return Err(e),
                };

                let (_, key) = parse_key_with_seq(&record.key).ok_or_else(|| {
                    CaskError::MalformedRecord(format!(
                        "bad sequence prefix in file {} at offset {}",
                        data_file.file_id(),
                        offset
                    ))
                })?;

                // Live only if the index points at exactly this record
                let here = LogRecordPos {
                    file_id: data_file.file_id(),
                    offset,
                };
                if self.index.get(key) == Some(here) {
                    let rewritten =
                        LogRecord::normal(encode_key_with_seq(NON_TXN_SEQ, key), record.value);
                    let new_pos = merge_engine.append_record(&rewritten)?;
                    hint_file.write_hint_record(key, new_pos)?;
                    kept += 1;
                } else {
                    dropped += 1;
                }

                offset += size;
            }
        }

        // Step 4: Persist hint file and merged data
        hint_file.sync()?;
        merge_engine.sync()?;

        // Step 5: Completion marker
        let mut marker = DataFile::open_merge_finished_file(&merge_path)?;
        marker.write_record(&LogRecord::normal(
            MERGE_FINISHED_KEY.to_vec(),
            boundary.to_string().into_bytes(),
        ))?;
        marker.sync()?;

        tracing::info!(kept, dropped, boundary, "merge finished");
        Ok(())
    }
}

/// Sibling directory merge output is written to: `{dir}-merge`
pub(crate) fn merge_dir_path(dir: &Path) -> PathBuf {
    match dir.file_name() {
        Some(name) => {
            let mut merge_name = name.to_os_string();
            merge_name.push("-merge");
            dir.with_file_name(merge_name)
        }
        None => dir.join("merge"),
    }
}

/// Boundary file id stored in `dir`'s merge marker, if there is one
pub(crate) fn read_merge_boundary(dir: &Path) -> Result<Option<u32>> {
    if !dir.join(MERGE_FINISHED_FILE_NAME).is_file() {
        return Ok(None);
    }

    let marker = DataFile::open_merge_finished_file(dir)?;
    let (record, _) = marker.read_record(0)?;

    std::str::from_utf8(&record.value)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Some)
        .ok_or_else(|| CaskError::MalformedRecord("bad merge boundary".to_string()))
}

/// Move a finished merge into `dir`, or discard an unfinished one
///
/// Order: delete originals below the boundary, move the hint file, move
/// data files, move the marker last. A hint file already gone from the
/// merge directory means deletion completed on an earlier attempt.
pub(crate) fn adopt_merge_output(dir: &Path) -> Result<()> {
    let merge_path = merge_dir_path(dir);
    if !merge_path.is_dir() {
        return Ok(());
    }

    if !merge_path.join(MERGE_FINISHED_FILE_NAME).is_file() {
        tracing::warn!(path = %merge_path.display(), "discarding unfinished merge output");
        fs::remove_dir_all(&merge_path)?;
        return Ok(());
    }

    let boundary = read_merge_boundary(&merge_path)?.unwrap_or_default();

    if merge_path.join(HINT_FILE_NAME).is_file() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(id) = parse_data_file_id(&path)? {
                if id < boundary {
                    fs::remove_file(&path)?;
                }
            }
        }
        fs::rename(merge_path.join(HINT_FILE_NAME), dir.join(HINT_FILE_NAME))?;
    }

    for entry in fs::read_dir(&merge_path)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == MERGE_FINISHED_FILE_NAME || name == SEQ_NO_FILE_NAME {
            continue;
        }
        fs::rename(entry.path(), dir.join(&name))?;
    }

    fs::rename(
        merge_path.join(MERGE_FINISHED_FILE_NAME),
        dir.join(MERGE_FINISHED_FILE_NAME),
    )?;
    fs::remove_dir_all(&merge_path)?;

    tracing::info!(boundary, "adopted merge output");
    Ok(())
}
