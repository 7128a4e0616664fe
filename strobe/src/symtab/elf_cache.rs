//! Process-wide symbol resolver cache
//!
//! One pool of built resolvers behind two LRU indices: by GNU build-id and
//! by file identity (device/inode/size/mtime). Many short-lived processes
//! map the same binaries, often under different paths; either key finds the
//! already-built table. Entries are `Arc`-shared, so evicting one key never
//! frees a resolver the other index (or a live `ElfTable`) still holds.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;

use super::elf::BuildId;
use super::lru::LruIndex;
use super::resolver::SymbolResolver;

/// A built resolver shared between cache keys and the tables using it.
pub type SharedResolver = Arc<dyn SymbolResolver>;

/// Identity of a file on disk, the secondary cache key for binaries
/// without a build-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileStat {
    dev: u64,
    inode: u64,
    size: u64,
    mtime: i64,
    mtime_nsec: i64,
}

impl FileStat {
    /// Stat the file behind `path`.
    ///
    /// # Errors
    /// Propagates the underlying stat error (typically "not found").
    pub fn of(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        Ok(Self {
            dev: metadata.dev(),
            inode: metadata.ino(),
            size: metadata.size(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
        })
    }
}

/// Two lookup indices over one pool of symbol resolvers.
pub struct ElfCache {
    by_build_id: LruIndex<BuildId, SharedResolver>,
    by_stat: LruIndex<FileStat, SharedResolver>,
}

impl ElfCache {
    /// `capacity` bounds each index independently.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            by_build_id: LruIndex::new(capacity),
            by_stat: LruIndex::new(capacity),
        }
    }

    pub fn get_by_build_id(&mut self, build_id: Option<&BuildId>) -> Option<SharedResolver> {
        let build_id = build_id?;
        self.by_build_id.get(build_id).map(Arc::clone)
    }

    pub fn get_by_stat(&mut self, stat: &FileStat) -> Option<SharedResolver> {
        self.by_stat.get(stat).map(Arc::clone)
    }

    /// No-op when the binary carries no build-id.
    pub fn cache_by_build_id(&mut self, build_id: Option<BuildId>, resolver: &SharedResolver) {
        if let Some(build_id) = build_id {
            self.by_build_id.insert(build_id, Arc::clone(resolver));
        }
    }

    pub fn cache_by_stat(&mut self, stat: FileStat, resolver: &SharedResolver) {
        self.by_stat.insert(stat, Arc::clone(resolver));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubResolver {
        name: &'static str,
        drops: Arc<AtomicUsize>,
    }

    impl SymbolResolver for StubResolver {
        fn resolve(&self, _addr: u64) -> Option<String> {
            Some(self.name.to_string())
        }
    }

    impl Drop for StubResolver {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stat(inode: u64) -> FileStat {
        FileStat {
            dev: 1,
            inode,
            size: 100,
            mtime: 0,
            mtime_nsec: 0,
        }
    }

    #[test]
    fn test_dual_key_lookup_shares_resolver() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut cache = ElfCache::new(4);
        let resolver: SharedResolver = Arc::new(StubResolver {
            name: "shared",
            drops: Arc::clone(&drops),
        });
        let id = BuildId(vec![0xab; 20]);
        cache.cache_by_build_id(Some(id.clone()), &resolver);
        cache.cache_by_stat(stat(7), &resolver);
        drop(resolver);

        let by_id = cache.get_by_build_id(Some(&id)).expect("by build-id");
        let by_stat = cache.get_by_stat(&stat(7)).expect("by stat");
        assert_eq!(by_id.resolve(0).as_deref(), Some("shared"));
        assert!(Arc::ptr_eq(&by_id, &by_stat));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_eviction_of_one_key_keeps_shared_resolver_alive() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut cache = ElfCache::new(1);
        let resolver: SharedResolver = Arc::new(StubResolver {
            name: "pinned",
            drops: Arc::clone(&drops),
        });
        let id = BuildId(vec![1]);
        cache.cache_by_build_id(Some(id.clone()), &resolver);
        cache.cache_by_stat(stat(1), &resolver);
        drop(resolver);

        // Evict the build-id key; the stat index still owns the resolver.
        cache.cache_by_build_id(
            Some(BuildId(vec![2])),
            &(Arc::new(StubResolver {
                name: "other",
                drops: Arc::clone(&drops),
            }) as SharedResolver),
        );
        assert!(cache.get_by_build_id(Some(&id)).is_none());
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        let survivor = cache.get_by_stat(&stat(1)).expect("stat key survives");
        assert_eq!(survivor.resolve(0).as_deref(), Some("pinned"));

        // Evicting the stat key as well releases it.
        drop(survivor);
        cache.cache_by_stat(stat(2), &(Arc::new(StubResolver {
            name: "other2",
            drops: Arc::clone(&drops),
        }) as SharedResolver));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_build_id_is_not_cached() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut cache = ElfCache::new(4);
        let resolver: SharedResolver = Arc::new(StubResolver {
            name: "anon",
            drops: Arc::clone(&drops),
        });
        cache.cache_by_build_id(None, &resolver);
        assert!(cache.get_by_build_id(None).is_none());
    }
}
