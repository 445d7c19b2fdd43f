//! Whole-tree credential counting
//!
//! Walks the root tree of every branch tip and sums the credentials found in
//! each blob. A blob's count depends only on its content, so it is computed
//! once per walk and reused for every tree and branch that references it.

use gix::prelude::{Find, FindExt};
use gix::ObjectId;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sniff::{is_text, LineReader, Sniffer};

use super::BranchScope;

/// Buffer pool for reusing decode buffers across recursion
#[derive(Default)]
struct BufferPool {
    buffers: Vec<Vec<u8>>,
}

impl BufferPool {
    /// Take a buffer from the pool (or allocate a new one)
    fn take(&mut self) -> Vec<u8> {
        self.buffers
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(8 * 1024))
    }

    /// Return a buffer to the pool
    fn give(&mut self, mut buf: Vec<u8>) {
        buf.clear();
        self.buffers.push(buf);
    }
}

/// Blob id -> violation count, valid for the lifetime of one walk.
///
/// Assumes the classifier does not change while the walk runs.
#[derive(Debug, Default)]
pub struct BlobScanCache {
    counts: FxHashMap<ObjectId, u64>,
    hits: usize,
}

impl BlobScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, oid: &ObjectId) -> Option<u64> {
        let count = self.counts.get(oid).copied();
        if count.is_some() {
            self.hits += 1;
        }
        count
    }

    pub fn insert(&mut self, oid: ObjectId, count: u64) {
        self.counts.insert(oid, count);
    }

    /// Distinct blobs scanned (or skipped as binary)
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Lookups answered without rescanning
    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Recursive tree walk state shared across all branches of one walk
pub struct BranchWalkCtx<'a, S: Find> {
    odb: &'a S,
    sniffer: &'a Sniffer,
    cancel: &'a CancellationToken,
    buf_pool: BufferPool,
    cache: BlobScanCache,
}

impl<'a, S: Find> BranchWalkCtx<'a, S> {
    pub fn new(odb: &'a S, sniffer: &'a Sniffer, cancel: &'a CancellationToken) -> Self {
        Self {
            odb,
            sniffer,
            cancel,
            buf_pool: BufferPool::default(),
            cache: BlobScanCache::new(),
        }
    }

    /// Total credentials in every blob reachable from `tree_oid`
    pub fn count_tree(&mut self, tree_oid: ObjectId) -> Result<u64> {
        let mut path_buf = Vec::with_capacity(256);
        self.scan_tree(tree_oid, &mut path_buf)
    }

    pub fn cache(&self) -> &BlobScanCache {
        &self.cache
    }

    fn scan_tree(&mut self, tree_oid: ObjectId, path: &mut Vec<u8>) -> Result<u64> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut buf = self.buf_pool.take();
        let tree = self
            .odb
            .find_tree(&tree_oid, &mut buf)
            .map_err(|e| Error::upstream(format!("tree {}: {}", tree_oid, e)))?;

        let base_len = path.len();
        let mut total = 0;

        for entry in tree.entries.iter() {
            if !path.is_empty() {
                path.push(b'/');
            }
            path.extend_from_slice(entry.filename.as_ref());

            let oid = entry.oid.to_owned();
            let count = if entry.mode.is_blob() {
                self.handle_blob(oid, path)
            } else if entry.mode.is_tree() {
                self.scan_tree(oid, path)
            } else {
                // Submodules and symlinks carry no scannable content
                Ok(0)
            };

            path.truncate(base_len);
            total += count?;
        }

        self.buf_pool.give(buf);
        Ok(total)
    }

    fn handle_blob(&mut self, oid: ObjectId, path: &[u8]) -> Result<u64> {
        if let Some(count) = self.cache.get(&oid) {
            return Ok(count);
        }

        let mut buf = self.buf_pool.take();
        let blob = self
            .odb
            .find_blob(&oid, &mut buf)
            .map_err(|e| Error::upstream(format!("blob {}: {}", oid, e)))?;

        let count = if is_text(blob.data) {
            let path = String::from_utf8_lossy(path).into_owned();
            self.sniffer.count(LineReader::new(path, blob.data))?
        } else {
            0
        };

        self.buf_pool.give(buf);
        self.cache.insert(oid, count);
        Ok(count)
    }
}

/// Tips of the branches in `scope`, keyed by short name (`main`, `origin/main`)
fn branch_tips(repo: &gix::Repository, scope: BranchScope) -> Result<Vec<(String, ObjectId)>> {
    let platform = repo.references().map_err(Error::upstream)?;
    let mut tips = Vec::new();

    if scope.includes_local() {
        for reference in platform.local_branches().map_err(Error::upstream)? {
            push_tip(&mut tips, &reference.map_err(Error::upstream)?);
        }
    }
    if scope.includes_remote() {
        for reference in platform.remote_branches().map_err(Error::upstream)? {
            push_tip(&mut tips, &reference.map_err(Error::upstream)?);
        }
    }

    Ok(tips)
}

fn push_tip(tips: &mut Vec<(String, ObjectId)>, reference: &gix::Reference<'_>) {
    // Symbolic refs such as origin/HEAD have no direct target
    if let Some(id) = reference.target().try_id() {
        tips.push((reference.name().shorten().to_string(), id.to_owned()));
    }
}

/// Count credentials at the tip of every branch in `scope`.
///
/// Binary blobs are skipped. Each distinct blob is classified at most once;
/// its count is added to every branch whose tree contains it.
pub fn branch_credential_counts(
    repo_path: &Path,
    sniffer: &Sniffer,
    scope: BranchScope,
    cancel: &CancellationToken,
) -> Result<BTreeMap<String, u64>> {
    let repo = gix::open(repo_path).map_err(Error::upstream)?;
    let tips = branch_tips(&repo, scope)?;

    let odb = repo.objects.clone();
    let mut ctx = BranchWalkCtx::new(&odb, sniffer, cancel);
    let mut counts = BTreeMap::new();

    for (branch, tip) in tips {
        let mut commit_buf = Vec::new();
        let commit = odb
            .find_commit(&tip, &mut commit_buf)
            .map_err(|e| Error::upstream(format!("commit {}: {}", tip, e)))?;
        let total = ctx.count_tree(commit.tree())?;
        counts.insert(branch, total);
    }

    debug!(
        path = ?repo_path,
        branches = counts.len(),
        blobs = ctx.cache().len(),
        cache_hits = ctx.cache().hits(),
        "branch credential walk finished"
    );
    Ok(counts)
}
