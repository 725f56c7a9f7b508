// Copyright 2026 Roadwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Filesystem-backed artifact store.
//!
//! Artifacts are addressed by paths relative to the store root. Presence of
//! the file is the only cache signal. Every write goes through an
//! [`ArtifactWriter`], which stages bytes in a temp file next to the target
//! and renames it into place on [`ArtifactWriter::commit`]. Dropping the
//! writer before commit deletes the temp file, so a failed or interrupted
//! write never leaves a visible artifact behind.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};

/// Handle to a directory of artifacts. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Handle on `root` without touching the filesystem. For read-only use;
    /// writes still create parent directories on demand.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of an artifact.
    pub fn resolve(&self, artifact: &Path) -> PathBuf {
        self.root.join(artifact)
    }

    pub fn exists(&self, artifact: &Path) -> bool {
        self.resolve(artifact).is_file()
    }

    /// Write a whole payload in one scoped write.
    pub fn write(&self, artifact: &Path, payload: &[u8]) -> StoreResult<()> {
        let mut writer = self.begin_write(artifact)?;
        writer.write_chunk(payload)?;
        writer.commit()
    }

    /// Start a scoped write. Nothing is visible at `artifact` until `commit`.
    pub fn begin_write(&self, artifact: &Path) -> StoreResult<ArtifactWriter> {
        let target = self.resolve(artifact);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        let prefix = format!(
            ".{}.",
            target
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("artifact")
        );
        let tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(&parent)
            .map_err(|e| StoreError::io(&parent, e))?;

        Ok(ArtifactWriter {
            inner: BufWriter::new(tmp),
            target,
            written: 0,
        })
    }

    /// Read a whole artifact into memory.
    pub fn read(&self, artifact: &Path) -> StoreResult<Vec<u8>> {
        let path = self.resolve(artifact);
        fs::read(&path).map_err(|e| not_found_or_io(path, e))
    }

    /// Open an artifact for buffered streaming reads.
    pub fn reader(&self, artifact: &Path) -> StoreResult<BufReader<File>> {
        let path = self.resolve(artifact);
        let file = File::open(&path).map_err(|e| not_found_or_io(path, e))?;
        Ok(BufReader::new(file))
    }
}

fn not_found_or_io(path: PathBuf, e: io::Error) -> StoreError {
    if e.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(path)
    } else {
        StoreError::io(path, e)
    }
}

/// An in-progress artifact write.
///
/// Bytes land in a hidden `.part` file beside the target. `commit` flushes,
/// syncs, and renames it over the target; drop without commit removes it.
pub struct ArtifactWriter {
    inner: BufWriter<NamedTempFile>,
    target: PathBuf,
    written: u64,
}

impl ArtifactWriter {
    pub fn write_chunk(&mut self, chunk: &[u8]) -> StoreResult<()> {
        self.inner
            .write_all(chunk)
            .map_err(|e| StoreError::io(&self.target, e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes staged so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Publish the staged bytes at the target path.
    pub fn commit(self) -> StoreResult<()> {
        let target = self.target;
        let tmp = self
            .inner
            .into_inner()
            .map_err(|e| StoreError::io(&target, e.into_error()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&target, e))?;
        tmp.persist(&target)
            .map_err(|e| StoreError::io(&target, e.error))?;
        tracing::debug!("committed artifact {}", target.display());
        Ok(())
    }
}

impl Write for ArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
