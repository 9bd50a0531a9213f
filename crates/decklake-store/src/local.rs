// SPDX-License-Identifier: Apache-2.0

use crate::backend::{BlobMeta, BlobStore, ListPage, ListingSession};
use crate::error::{StoreError, StoreErrorCode};
use crate::key::{validate_key, validate_prefix};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::instrument;
use walkdir::WalkDir;

static TMP_NONCE: AtomicU64 = AtomicU64::new(0);

/// Blobs as files under `root`, keys mapped to relative paths.
///
/// Listing walks directories in file-name order, so keys come back ordered
/// segment by segment. Dot-prefixed files are in-flight temporaries and are
/// never listed.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

async fn blocking<T, F>(task: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        StoreError::new(StoreErrorCode::Internal, format!("blocking store task failed: {e}"))
    })?
}

#[async_trait]
impl BlobStore for LocalFsStore {
    fn backend_tag(&self) -> &'static str {
        "localfs"
    }

    #[instrument(name = "store_local_read", skip(self))]
    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::not_found(key),
            _ => StoreError::io(format!("read {}: {e}", path.display())),
        })
    }

    #[instrument(name = "store_local_write", skip(self, bytes), fields(len = bytes.len()))]
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let bytes = bytes.to_vec();
        let key = key.to_string();
        blocking(move || write_atomic(&key, &path, &bytes)).await
    }

    async fn stat(&self, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(BlobMeta {
                size: meta.len(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(e)),
        }
    }

    #[instrument(name = "store_local_list_page", skip(self))]
    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, StoreError> {
        validate_prefix(prefix)?;
        let mut walk = DirWalk::new(self.root.clone(), prefix, start_after);
        blocking(move || walk.next_page(limit)).await
    }

    fn listing_session(
        &self,
        prefix: &str,
        start_after: Option<&str>,
    ) -> Result<Option<Box<dyn ListingSession>>, StoreError> {
        validate_prefix(prefix)?;
        Ok(Some(Box::new(LocalListing {
            walk: Some(DirWalk::new(self.root.clone(), prefix, start_after)),
        })))
    }
}

/// Holds the walk between pages so each directory is read once per listing.
struct LocalListing {
    walk: Option<DirWalk>,
}

#[async_trait]
impl ListingSession for LocalListing {
    async fn next_page(&mut self, limit: usize) -> Result<ListPage, StoreError> {
        let Some(mut walk) = self.walk.take() else {
            return Ok(ListPage::default());
        };
        let (walk, page) = blocking(move || {
            let page = walk.next_page(limit);
            Ok((walk, page))
        })
        .await?;
        self.walk = Some(walk);
        page
    }
}

/// One directory's children, sorted by name, with a read position.
struct Frame {
    /// Key prefix of the directory, `""` or ending in `/`.
    rel: String,
    entries: Vec<(String, bool)>,
    pos: usize,
}

/// Depth-first walk that seeks to a cursor along the cursor's own directory
/// chain instead of replaying everything before it. Each directory is read
/// and sorted once; writes that land in an already-read directory are not
/// seen by the same walk.
struct DirWalk {
    root: PathBuf,
    prefix: String,
    start_after: Option<String>,
    stack: Vec<Frame>,
    started: bool,
    entries_read: u64,
}

impl DirWalk {
    fn new(root: PathBuf, prefix: &str, start_after: Option<&str>) -> Self {
        Self {
            root,
            prefix: prefix.to_string(),
            start_after: start_after.map(str::to_string),
            stack: Vec::new(),
            started: false,
            entries_read: 0,
        }
    }

    fn read_frame(&mut self, rel: String, name_prefix: &str) -> Result<Option<Frame>, StoreError> {
        let dir = self.root.join(&rel);
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut entries = Vec::new();
        let listing = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in listing {
            let entry = entry.map_err(|e| StoreError::io(format!("list {}: {e}", dir.display())))?;
            self.entries_read += 1;
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(name_prefix) {
                continue;
            }
            if entry.file_type().is_dir() {
                entries.push((name.to_string(), true));
            } else if entry.file_type().is_file() {
                entries.push((name.to_string(), false));
            }
        }
        Ok(Some(Frame { rel, entries, pos: 0 }))
    }

    fn start(&mut self) -> Result<(), StoreError> {
        let (base, name_prefix) = match self.prefix.rfind('/') {
            Some(idx) => (self.prefix[..=idx].to_string(), self.prefix[idx + 1..].to_string()),
            None => (String::new(), self.prefix.clone()),
        };
        let Some(frame) = self.read_frame(base.clone(), &name_prefix)? else {
            return Ok(());
        };
        self.stack.push(frame);

        let Some(cursor) = self.start_after.take() else {
            return Ok(());
        };
        if let Some(rest) = cursor.strip_prefix(base.as_str()) {
            if !rest.is_empty() {
                let segments: Vec<&str> = rest.split('/').collect();
                self.seek(&segments)?;
            }
        } else if segment_cmp(base.trim_end_matches('/'), &cursor) == Ordering::Less {
            self.stack.clear();
        }
        Ok(())
    }

    /// Positions the stack just past `segments`, descending only into the
    /// directories named by the cursor.
    fn seek(&mut self, segments: &[&str]) -> Result<(), StoreError> {
        for (depth, segment) in segments.iter().enumerate() {
            let last = depth + 1 == segments.len();
            let child = {
                let Some(frame) = self.stack.last_mut() else {
                    return Ok(());
                };
                let pos = frame.entries.partition_point(|(name, _)| name.as_str() < *segment);
                match frame.entries.get(pos) {
                    Some((name, true)) if name == segment && !last => {
                        frame.pos = pos + 1;
                        format!("{}{name}/", frame.rel)
                    }
                    Some((name, false)) if name == segment => {
                        frame.pos = pos + 1;
                        return Ok(());
                    }
                    _ => {
                        frame.pos = pos;
                        return Ok(());
                    }
                }
            };
            match self.read_frame(child, "")? {
                Some(frame) => self.stack.push(frame),
                None => return Ok(()),
            }
        }
        Ok(())
    }

    fn next_page(&mut self, limit: usize) -> Result<ListPage, StoreError> {
        if !self.started {
            self.started = true;
            self.start()?;
        }
        let mut page = ListPage::default();
        while page.keys.len() < limit {
            let next = {
                let Some(frame) = self.stack.last_mut() else {
                    break;
                };
                match frame.entries.get(frame.pos) {
                    Some((name, is_dir)) => {
                        let entry = (format!("{}{name}", frame.rel), *is_dir);
                        frame.pos += 1;
                        Some(entry)
                    }
                    None => None,
                }
            };
            match next {
                Some((key, true)) => {
                    if let Some(frame) = self.read_frame(format!("{key}/"), "")? {
                        self.stack.push(frame);
                    }
                }
                Some((key, false)) => page.keys.push(key),
                None => {
                    self.stack.pop();
                }
            }
        }
        page.truncated = self.stack.iter().any(|f| f.pos < f.entries.len());
        Ok(page)
    }
}

/// Orders keys the way a name-sorted directory walk visits them.
fn segment_cmp(a: &str, b: &str) -> Ordering {
    a.split('/').cmp(b.split('/'))
}

fn write_atomic(key: &str, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::io(format!("blob path has no parent: {key}")))?;
    fs::create_dir_all(parent).map_err(StoreError::io)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let nonce = TMP_NONCE.fetch_add(1, AtomicOrdering::Relaxed);
    let tmp = parent.join(format!(".{file_name}.{}.{nonce}.tmp", std::process::id()));

    if let Err(err) = write_and_sync(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(format!("write {}: {err}", tmp.display())));
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(format!("rename into {}: {err}", path.display())));
    }
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(StoreError::io)
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, key: &str) {
        let path = root.join(key);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, key).expect("write");
    }

    fn drain(walk: &mut DirWalk, page_size: usize) -> (Vec<String>, usize) {
        let mut keys = Vec::new();
        let mut pages = 0;
        loop {
            let page = walk.next_page(page_size).expect("page");
            pages += 1;
            keys.extend(page.keys);
            if !page.truncated {
                return (keys, pages);
            }
        }
    }

    #[test]
    fn segment_order_matches_directory_walk_order() {
        assert_eq!(segment_cmp("a/z", "a-b"), Ordering::Less);
        assert_eq!("a/z".cmp("a-b"), Ordering::Greater);
        assert_eq!(segment_cmp("a/b/c", "a/b"), Ordering::Greater);
    }

    #[test]
    fn paged_walk_reads_each_directory_once() {
        let dir = tempdir().expect("tempdir");
        for i in 0..2_000 {
            touch(dir.path(), &format!("magic/mtgtop8/{i:05}.json"));
        }
        let mut walk = DirWalk::new(dir.path().to_path_buf(), "magic/mtgtop8/", None);
        let (keys, pages) = drain(&mut walk, 100);

        assert_eq!(keys.len(), 2_000);
        assert!(pages >= 20);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(walk.entries_read, 2_000);
    }

    #[test]
    fn cursor_seek_reads_only_the_cursor_chain() {
        let dir = tempdir().expect("tempdir");
        for i in 0..500 {
            touch(dir.path(), &format!("magic/goldfish/{i:03}.json"));
            touch(dir.path(), &format!("magic/mtgtop8/{i:03}.json"));
        }
        touch(dir.path(), "magic/scryfall/set.json");

        let mut walk = DirWalk::new(
            dir.path().to_path_buf(),
            "magic/",
            Some("magic/mtgtop8/497.json"),
        );
        let page = walk.next_page(10).expect("page");
        assert_eq!(
            page.keys,
            vec![
                "magic/mtgtop8/498.json".to_string(),
                "magic/mtgtop8/499.json".to_string(),
                "magic/scryfall/set.json".to_string(),
            ]
        );
        assert!(!page.truncated);
        // magic/ (3 dirs) + mtgtop8 (500) + scryfall (1); goldfish never read.
        assert_eq!(walk.entries_read, 504);
    }

    #[test]
    fn cursor_on_a_directory_name_includes_its_contents() {
        let dir = tempdir().expect("tempdir");
        touch(dir.path(), "a/x.json");
        touch(dir.path(), "b.json");
        let mut walk = DirWalk::new(dir.path().to_path_buf(), "", Some("a"));
        let (keys, _) = drain(&mut walk, 10);
        assert_eq!(keys, vec!["a/x.json".to_string(), "b.json".to_string()]);
    }

    #[test]
    fn cursor_past_the_prefix_yields_nothing() {
        let dir = tempdir().expect("tempdir");
        touch(dir.path(), "magic/mtgtop8/1.json");
        let mut walk = DirWalk::new(dir.path().to_path_buf(), "magic/mtgtop8/", Some("pokemon/a"));
        let (keys, _) = drain(&mut walk, 10);
        assert!(keys.is_empty());

        let mut walk = DirWalk::new(dir.path().to_path_buf(), "magic/mtgtop8/", Some("magic/a"));
        let (keys, _) = drain(&mut walk, 10);
        assert_eq!(keys, vec!["magic/mtgtop8/1.json".to_string()]);
    }

    #[test]
    fn name_prefix_filters_the_base_directory_only() {
        let dir = tempdir().expect("tempdir");
        touch(dir.path(), "magic/mtg-a/1.json");
        touch(dir.path(), "magic/mtg.json");
        touch(dir.path(), "magic/other/1.json");
        touch(dir.path(), "magic/.mtg.json.1.0.tmp");
        let mut walk = DirWalk::new(dir.path().to_path_buf(), "magic/mtg", None);
        let (keys, _) = drain(&mut walk, 10);
        assert_eq!(keys, vec!["magic/mtg-a/1.json".to_string(), "magic/mtg.json".to_string()]);
    }
}
