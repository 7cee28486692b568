//! Stream registry: logical stream keys to open files and write offsets.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::util::{Error, Result};

/// One open output stream.
struct StreamHandle {
    file: Arc<File>,
    /// Base name of the physical file; this is what the index records.
    filename: String,
    /// Offset assigned to the next enqueued payload.
    next_offset: u64,
    /// Set when a background write failed; the stream accepts no more data.
    poisoned: bool,
}

/// Maps stream keys to open handles and monotonically advancing offsets.
///
/// The internal mutex guards only this metadata map. File handles are
/// handed out as `Arc<File>` clones so no lock is ever held across a
/// write or flush syscall.
pub(crate) struct StreamRegistry {
    streams: Mutex<HashMap<String, StreamHandle>>,
    extension: String,
}

impl StreamRegistry {
    pub fn new(extension: &str) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            extension: extension.to_string(),
        }
    }

    /// Reserve the byte range for a `len`-byte payload on `key`.
    ///
    /// Opens the stream file on first use (creating parent directories) and
    /// returns the physical file name together with the offset the payload
    /// will land at. Offsets for a given key are the running sum of the
    /// payload sizes reserved before it.
    pub fn reserve(&self, key: &str, len: u64) -> Result<(String, u64)> {
        let mut streams = self.streams.lock();
        let handle = match streams.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(open_stream(key, &self.extension)?),
        };
        if handle.poisoned {
            return Err(Error::StreamPoisoned(key.to_string()));
        }
        let offset = handle.next_offset;
        handle.next_offset += len;
        Ok((handle.filename.clone(), offset))
    }

    /// Fetch the file for a queued job. Returns `None` when the stream is
    /// poisoned (remaining queued jobs for it are dropped).
    pub fn file_for(&self, key: &str) -> Option<Arc<File>> {
        let streams = self.streams.lock();
        let handle = streams.get(key)?;
        if handle.poisoned {
            return None;
        }
        Some(Arc::clone(&handle.file))
    }

    /// Mark a stream as failed; `reserve` reports the error on the next use.
    pub fn poison(&self, key: &str) {
        let mut streams = self.streams.lock();
        if let Some(handle) = streams.get_mut(key) {
            handle.poisoned = true;
        }
    }

    /// Snapshot the currently open handles for flushing.
    pub fn snapshot_files(&self) -> Vec<Arc<File>> {
        let streams = self.streams.lock();
        streams.values().map(|h| Arc::clone(&h.file)).collect()
    }
}

/// Open the physical file for a stream key.
///
/// The name embeds creation time, host, and pid so concurrent runs never
/// collide: `{key}.{unix_time}.{hostname}.{pid}{extension}`.
fn open_stream(key: &str, extension: &str) -> Result<StreamHandle> {
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    let pid = std::process::id();

    let path = PathBuf::from(format!("{key}.{created}.{host}.{pid}{extension}"));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    tracing::debug!(file = %path.display(), "stream file opened for writing");

    Ok(StreamHandle {
        file: Arc::new(file),
        filename,
        next_offset: 0,
        poisoned: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key_in(dir: &std::path::Path, name: &str) -> String {
        dir.join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn test_offsets_are_prefix_sums() {
        let dir = tempdir().unwrap();
        let registry = StreamRegistry::new(".bin");
        let key = key_in(dir.path(), "run/points");

        let (name0, off0) = registry.reserve(&key, 10).unwrap();
        let (name1, off1) = registry.reserve(&key, 7).unwrap();
        let (name2, off2) = registry.reserve(&key, 0).unwrap();
        let (_, off3) = registry.reserve(&key, 5).unwrap();

        assert_eq!((off0, off1, off2, off3), (0, 10, 17, 17));
        assert_eq!(name0, name1);
        assert_eq!(name1, name2);
    }

    #[test]
    fn test_independent_keys() {
        let dir = tempdir().unwrap();
        let registry = StreamRegistry::new(".bin");
        let a = key_in(dir.path(), "a");
        let b = key_in(dir.path(), "b");

        registry.reserve(&a, 100).unwrap();
        let (_, off_b) = registry.reserve(&b, 4).unwrap();
        let (_, off_a) = registry.reserve(&a, 4).unwrap();

        assert_eq!(off_b, 0);
        assert_eq!(off_a, 100);
    }

    #[test]
    fn test_filename_format() {
        let dir = tempdir().unwrap();
        let registry = StreamRegistry::new(".bin");
        let key = key_in(dir.path(), "nested/dir/tag");

        let (filename, _) = registry.reserve(&key, 1).unwrap();
        assert!(filename.starts_with("tag."));
        assert!(filename.ends_with(".bin"));
        assert!(filename.contains(&std::process::id().to_string()));
        assert!(dir.path().join("nested/dir").join(&filename).exists());
    }

    #[test]
    fn test_poisoned_stream_rejects_reserve() {
        let dir = tempdir().unwrap();
        let registry = StreamRegistry::new(".bin");
        let key = key_in(dir.path(), "tag");

        registry.reserve(&key, 8).unwrap();
        registry.poison(&key);

        assert!(matches!(
            registry.reserve(&key, 8),
            Err(Error::StreamPoisoned(_))
        ));
        assert!(registry.file_for(&key).is_none());
    }
}
