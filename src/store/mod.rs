//! Encrypted, append-only persistence for `Context` snapshots.
//!
//! One file per context, named `{id}_{unix-timestamp}.context`, each holding
//! a ChaCha20-Poly1305 sealed JSON document. Listing order and retention are
//! driven by file modification time.

mod crypto;
mod error;
mod keys;

pub use crypto::{generate_key, ContextKey};
pub use error::StoreError;
pub use keys::{decode_key, load_or_create_key};

use chrono::Utc;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use crate::models::Context;

pub const FILE_EXTENSION: &str = "context";

pub struct ContextStore {
    directory: PathBuf,
    key: ContextKey,
}

impl ContextStore {
    /// The store only consumes a ready key; provisioning lives in
    /// [`load_or_create_key`].
    pub fn new(directory: PathBuf, key: ContextKey) -> Self {
        Self { directory, key }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_name(context: &Context) -> String {
        format!(
            "{}_{}.{FILE_EXTENSION}",
            context.id,
            context.timestamp.timestamp()
        )
    }

    pub fn save(&self, context: &Context) -> Result<PathBuf, StoreError> {
        self.ensure_directory()?;

        let plaintext = serde_json::to_vec(context).map_err(StoreError::Serialize)?;
        let sealed = crypto::seal(&plaintext, &self.key)?;

        let path = self.directory.join(Self::file_name(context));
        fs::write(&path, sealed).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        log::debug!("Saved context {} to {}", context.id, path.display());
        Ok(path)
    }

    /// Up to `limit` contexts, most recently written first. Files that cannot
    /// be read, decrypted or parsed are skipped.
    pub fn load(&self, limit: usize) -> Result<Vec<Context>, StoreError> {
        self.ensure_directory()?;

        let mut files = self.context_files()?;
        files.sort_by(|lhs, rhs| rhs.1.cmp(&lhs.1));

        let mut contexts = Vec::with_capacity(limit.min(files.len()));
        for (path, _) in files.into_iter().take(limit) {
            match self.read_context(&path) {
                Ok(Some(context)) => contexts.push(context),
                Ok(None) => log::debug!("Context file {} vanished during load", path.display()),
                Err(err) => log::warn!("Skipping context file {}: {err}", path.display()),
            }
        }
        Ok(contexts)
    }

    /// Delete context files last modified strictly before `older_than_days`
    /// ago. Returns how many were removed.
    pub fn cleanup(&self, older_than_days: u32) -> Result<usize, StoreError> {
        let age = Duration::from_secs(u64::from(older_than_days) * 24 * 60 * 60);
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.cleanup_before(cutoff)
    }

    pub fn cleanup_before(&self, cutoff: SystemTime) -> Result<usize, StoreError> {
        self.ensure_directory()?;

        let mut removed = 0;
        for (path, modified) in self.context_files()? {
            if modified >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => log::warn!("Failed to delete expired context {}: {err}", path.display()),
            }
        }

        if removed > 0 {
            log::info!(
                "Retention sweep removed {removed} context file(s) from {} at {}",
                self.directory.display(),
                Utc::now().to_rfc3339()
            );
        }
        Ok(removed)
    }

    fn ensure_directory(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.directory).map_err(|source| StoreError::Directory {
            path: self.directory.clone(),
            source,
        })
    }

    fn context_files(&self) -> Result<Vec<(PathBuf, SystemTime)>, StoreError> {
        let entries = fs::read_dir(&self.directory).map_err(|source| StoreError::Directory {
            path: self.directory.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Failed to read entry in {}: {err}", self.directory.display());
                    continue;
                }
            };
            let path = entry.path();
            let is_context = path
                .extension()
                .is_some_and(|ext| ext == FILE_EXTENSION);
            let is_hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !is_context || is_hidden {
                continue;
            }
            // Another process may delete the file between listing and stat.
            match entry.metadata().and_then(|meta| meta.modified()) {
                Ok(modified) => files.push((path, modified)),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => log::warn!("Cannot stat {}: {err}", path.display()),
            }
        }
        Ok(files)
    }

    fn read_context(&self, path: &Path) -> Result<Option<Context>, StoreError> {
        let sealed = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let plaintext = crypto::open(&sealed, &self.key)?;
        let context = serde_json::from_slice(&plaintext).map_err(StoreError::Deserialize)?;
        Ok(Some(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, ActivityKind};
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    fn sample_context(summary: &str) -> Context {
        let now = Utc::now();
        Context {
            id: Uuid::new_v4(),
            timestamp: now,
            summary: summary.to_string(),
            activities: vec![
                Activity::new(
                    ActivityKind::Keystroke,
                    now,
                    "Editor",
                    Some("com.example.editor".into()),
                    Some("fn main() {}\n".into()),
                ),
                Activity::new(
                    ActivityKind::AppSwitch,
                    now - ChronoDuration::seconds(3),
                    "Editor",
                    None,
                    None,
                ),
            ],
            keywords: vec!["main".into(), "editor".into()],
            main_application: Some("Editor".into()),
        }
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path().join("Contexts"), generate_key());
        let context = sample_context("Editing the main entry point.");

        let path = store.save(&context).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("{}_{}.context", context.id, context.timestamp.timestamp())
        );

        let loaded = store.load(10).unwrap();
        assert_eq!(loaded, vec![context]);
    }

    #[test]
    fn load_orders_by_mtime_and_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path().to_path_buf(), generate_key());
        let now = SystemTime::now();

        for (index, age_secs) in [300u64, 100, 200].into_iter().enumerate() {
            let context = sample_context(&format!("context {index}"));
            let path = store.save(&context).unwrap();
            set_mtime(&path, now - Duration::from_secs(age_secs));
        }

        let loaded = store.load(2).unwrap();
        let summaries: Vec<_> = loaded.iter().map(|c| c.summary.as_str()).collect();
        assert_eq!(summaries, vec!["context 1", "context 2"]);
    }

    #[test]
    fn corrupt_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path().to_path_buf(), generate_key());
        let context = sample_context("good one");
        store.save(&context).unwrap();
        fs::write(dir.path().join("garbage_1.context"), b"not sealed").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let loaded = store.load(10).unwrap();
        assert_eq!(loaded, vec![context]);
    }

    #[test]
    fn wrong_key_cannot_read_saved_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ContextStore::new(dir.path().to_path_buf(), generate_key());
        let path = writer.save(&sample_context("private summary")).unwrap();

        let raw = fs::read(&path).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("private summary"));

        let reader = ContextStore::new(dir.path().to_path_buf(), generate_key());
        assert!(reader.load(10).unwrap().is_empty());
        assert!(matches!(
            reader.read_context(&path),
            Err(StoreError::Decrypt)
        ));
    }

    #[test]
    fn cleanup_removes_only_files_older_than_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path().to_path_buf(), generate_key());
        let now = SystemTime::now();
        let day = Duration::from_secs(24 * 60 * 60);

        let old = store.save(&sample_context("old")).unwrap();
        set_mtime(&old, now - day * 40);
        let recent = store.save(&sample_context("recent")).unwrap();
        set_mtime(&recent, now - day * 5);
        let fresh = store.save(&sample_context("fresh")).unwrap();

        let removed = store.cleanup(30).unwrap();
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(recent.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn cleanup_boundary_keeps_file_at_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path().to_path_buf(), generate_key());
        let cutoff = SystemTime::now() - Duration::from_secs(3600);

        let at_cutoff = store.save(&sample_context("at")).unwrap();
        set_mtime(&at_cutoff, cutoff);
        let before = store.save(&sample_context("before")).unwrap();
        set_mtime(&before, cutoff - Duration::from_secs(1));

        assert_eq!(store.cleanup_before(cutoff).unwrap(), 1);
        assert!(at_cutoff.exists());
        assert!(!before.exists());
    }

    #[test]
    fn unusable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a dir").unwrap();
        let store = ContextStore::new(blocker.join("Contexts"), generate_key());

        assert!(matches!(
            store.save(&sample_context("x")),
            Err(StoreError::Directory { .. })
        ));
        assert!(matches!(store.load(5), Err(StoreError::Directory { .. })));
    }
}
