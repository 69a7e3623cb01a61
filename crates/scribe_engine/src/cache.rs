//! Bounded text-source compile cache and mtime-invalidated file compile
//! cache. Both use the two-phase read-lock-then-write-lock-with-double-check
//! idiom: a hot read path under a shared lock, and a cold path that takes
//! the exclusive lock and re-checks before doing the (possibly duplicate)
//! work, so concurrent callers never race to insert the same key twice.

use crate::ast::Node;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::SystemTime,
};

/// Maximum number of distinct source strings the text cache will hold.
/// Once full, further compiles are served but not cached.
pub const TEXT_CACHE_CAP: usize = 1_000;

#[derive(Default)]
pub struct TextCache {
    entries: RwLock<HashMap<String, Arc<Vec<Node>>>>,
}

impl TextCache {
    /// Get the compiled nodes for `source`, compiling and caching on miss.
    pub fn get_or_compile(
        &self,
        source: &str,
        compile: impl FnOnce(&str) -> Vec<Node>,
    ) -> Arc<Vec<Node>> {
        if let Some(nodes) = self.entries.read().unwrap().get(source) {
            return Arc::clone(nodes);
        }

        let mut entries = self.entries.write().unwrap();
        // Double-check: another writer may have compiled this while we
        // waited for the write lock.
        if let Some(nodes) = entries.get(source) {
            return Arc::clone(nodes);
        }

        let nodes = Arc::new(compile(source));
        if entries.len() < TEXT_CACHE_CAP {
            entries.insert(source.to_owned(), Arc::clone(&nodes));
        }
        nodes
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

struct FileEntry {
    nodes: Arc<Vec<Node>>,
    mtime: Option<SystemTime>,
}

#[derive(Default)]
pub struct FileCache {
    entries: RwLock<HashMap<PathBuf, FileEntry>>,
}

impl FileCache {
    /// Get the compiled nodes for the file at `path`, re-reading and
    /// re-compiling if the file's mtime has advanced since it was cached.
    /// A file that can't be stat'd or read compiles to an empty node list
    /// (silent failure, per the engine's error policy) rather than
    /// propagating an error.
    pub fn get_or_compile(
        &self,
        path: &Path,
        compile: impl FnOnce(&str) -> Vec<Node>,
    ) -> Arc<Vec<Node>> {
        let current_mtime = fs::metadata(path).and_then(|m| m.modified()).ok();
        let stat_failed = current_mtime.is_none();

        {
            let entries = self.entries.read().unwrap();
            if let Some(entry) = entries.get(path) {
                if stat_failed {
                    // File gone since it was cached: serve empty rather than
                    // the stale compiled nodes.
                    return Arc::new(Vec::new());
                }
                if current_mtime <= entry.mtime {
                    return Arc::clone(&entry.nodes);
                }
            }
        }

        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get(path) {
            if stat_failed {
                let empty = Arc::new(Vec::new());
                entries.insert(
                    path.to_owned(),
                    FileEntry {
                        nodes: Arc::clone(&empty),
                        mtime: None,
                    },
                );
                return empty;
            }
            if current_mtime <= entry.mtime {
                return Arc::clone(&entry.nodes);
            }
        }

        let nodes = match fs::read_to_string(path) {
            Ok(source) => Arc::new(compile(&source)),
            Err(error) => {
                tracing::debug!(
                    path = %path.display(),
                    %error,
                    "failed to read template file"
                );
                Arc::new(Vec::new())
            }
        };
        entries.insert(
            path.to_owned(),
            FileEntry {
                nodes: Arc::clone(&nodes),
                mtime: current_mtime,
            },
        );
        nodes
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_text_cache_hits_on_second_call() {
        let cache = TextCache::default();
        let calls = Cell::new(0);
        let compile = |_: &str| {
            calls.set(calls.get() + 1);
            Vec::new()
        };
        cache.get_or_compile("hello", compile);
        cache.get_or_compile("hello", compile);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_text_cache_clear() {
        let cache = TextCache::default();
        cache.get_or_compile("hello", |_| Vec::new());
        cache.clear();
        assert_eq!(cache.entries.read().unwrap().len(), 0);
    }

    #[test]
    fn test_file_cache_reload_on_touch() {
        let dir = std::env::temp_dir().join(format!(
            "scribe_engine_test_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("t.tpl");
        std::fs::write(&path, "v1").unwrap();

        let cache = FileCache::default();
        let calls = Cell::new(0);
        let first = cache.get_or_compile(&path, |s| {
            calls.set(calls.get() + 1);
            vec![Node::Text(vec![crate::ast::TextPart::Literal(
                s.to_owned(),
            )])]
        });
        assert_eq!(calls.get(), 1);
        let _ = first;

        // Re-fetch with no change: should hit cache
        cache.get_or_compile(&path, |s| {
            calls.set(calls.get() + 1);
            vec![Node::Text(vec![crate::ast::TextPart::Literal(
                s.to_owned(),
            )])]
        });
        assert_eq!(calls.get(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_text_cache_concurrent_compiles_of_same_source_compile_once() {
        let cache = TextCache::default();
        let calls = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    cache.get_or_compile("shared source", |s| {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        vec![Node::Text(vec![crate::ast::TextPart::Literal(
                            s.to_owned(),
                        )])]
                    });
                });
            }
        });

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
