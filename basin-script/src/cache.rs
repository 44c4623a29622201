//! The handler cache: resolves a `(collection, event)` pair to a compiled
//! program, recompiling only when the backing file's fingerprint changes.
//! Concurrent requests for the same uncached handler don't each pay
//! compilation; the first one compiles while the rest wait on a per-key
//! lock, matching spec §4.2's single-flight requirement.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;

use crate::context::Event;
use crate::error::ScriptError;
use crate::lua_runtime;
use crate::native_runtime::NativeHandler;

const NATIVE_EXTENSION: &str = "so";
const SCRIPT_EXTENSION: &str = "lua";

/// What a resolved handler runs with.
pub enum CompiledProgram {
    Script(String),
    Native(Arc<NativeHandler>),
    /// No handler file exists for this event; the caller skips the stage.
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    mtime: SystemTime,
    len: u64,
}

fn fingerprint_of(path: &Path) -> std::io::Result<Fingerprint> {
    let meta = std::fs::metadata(path)?;
    Ok(Fingerprint { mtime: meta.modified()?, len: meta.len() })
}

enum CacheEntry {
    Ready { path: PathBuf, fingerprint: Fingerprint, program: Arc<CompiledProgram> },
    Failed { since: Instant, message: String, location: String },
}

pub struct HandlerCache {
    collections_dir: PathBuf,
    entries: DashMap<(String, Event), CacheEntry>,
    locks: DashMap<(String, Event), Arc<tokio::sync::Mutex<()>>>,
    failure_ttl: Duration,
}

impl HandlerCache {
    pub fn new(collections_dir: impl Into<PathBuf>) -> Self {
        Self {
            collections_dir: collections_dir.into(),
            entries: DashMap::new(),
            locks: DashMap::new(),
            failure_ttl: Duration::from_secs(5),
        }
    }

    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    /// Drop the cached entry for one event, forcing recompilation on next
    /// resolve. Called by the filesystem watcher and by the admin API on
    /// handler upload/delete.
    pub fn invalidate(&self, collection: &str, event: Event) {
        self.entries.remove(&(collection.to_string(), event));
    }

    pub fn invalidate_collection(&self, collection: &str) {
        self.entries.retain(|(c, _), _| c != collection);
    }

    fn handler_dir(&self, collection: &str) -> PathBuf {
        self.collections_dir.join(collection).join("handlers")
    }

    fn locate(&self, collection: &str, event: Event) -> Option<PathBuf> {
        let dir = self.handler_dir(collection);
        let native = dir.join(format!("{}.{}", event.file_stem(), NATIVE_EXTENSION));
        if native.is_file() {
            return Some(native);
        }
        let script = dir.join(format!("{}.{}", event.file_stem(), SCRIPT_EXTENSION));
        if script.is_file() {
            return Some(script);
        }
        None
    }

    /// Resolve `(collection, event)` to a compiled program, compiling or
    /// recompiling as needed. Returns `Ok(Noop)` when no handler file
    /// exists — not an error condition.
    pub async fn resolve(&self, collection: &str, event: Event) -> Result<Arc<CompiledProgram>, ScriptError> {
        if let Some(result) = self.try_cached(collection, event) {
            return result;
        }

        let key = (collection.to_string(), event);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another task may have compiled this while we waited for the lock.
        if let Some(result) = self.try_cached(collection, event) {
            return result;
        }

        self.compile_and_store(collection, event)
    }

    fn try_cached(&self, collection: &str, event: Event) -> Option<Result<Arc<CompiledProgram>, ScriptError>> {
        let key = (collection.to_string(), event);
        let entry = self.entries.get(&key)?;
        match &*entry {
            CacheEntry::Ready { path, fingerprint, program } => {
                match fingerprint_of(path) {
                    Ok(current) if &current == fingerprint => Some(Ok(program.clone())),
                    _ => None,
                }
            }
            CacheEntry::Failed { since, message, location } => {
                if since.elapsed() < self.failure_ttl {
                    Some(Err(ScriptError::CompileFailed {
                        location: location.clone(),
                        message: message.clone(),
                    }))
                } else {
                    None
                }
            }
        }
    }

    fn compile_and_store(&self, collection: &str, event: Event) -> Result<Arc<CompiledProgram>, ScriptError> {
        let key = (collection.to_string(), event);
        let Some(path) = self.locate(collection, event) else {
            return Ok(Arc::new(CompiledProgram::Noop));
        };
        let location = format!("{collection}/{}", event.file_stem());

        let program = if path.extension().and_then(|e| e.to_str()) == Some(NATIVE_EXTENSION) {
            NativeHandler::load(&path).map(|h| CompiledProgram::Native(Arc::new(h)))
        } else {
            std::fs::read_to_string(&path)
                .map_err(|e| ScriptError::CompileFailed { location: location.clone(), message: e.to_string() })
                .and_then(|source| {
                    lua_runtime::syntax_check(&source, &location)?;
                    Ok(CompiledProgram::Script(source))
                })
        };

        match program {
            Ok(program) => {
                let fingerprint = fingerprint_of(&path)
                    .map_err(|e| ScriptError::CompileFailed { location: location.clone(), message: e.to_string() })?;
                let program = Arc::new(program);
                self.entries.insert(key, CacheEntry::Ready { path, fingerprint, program: program.clone() });
                Ok(program)
            }
            Err(err) => {
                let message = err.to_string();
                self.entries.insert(key, CacheEntry::Failed { since: Instant::now(), message, location });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_handler(dir: &Path, collection: &str, event: &str, ext: &str, body: &str) {
        let handlers = dir.join(collection).join("handlers");
        fs::create_dir_all(&handlers).unwrap();
        fs::write(handlers.join(format!("{event}.{ext}")), body).unwrap();
    }

    #[tokio::test]
    async fn missing_handler_resolves_to_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HandlerCache::new(dir.path());
        let program = cache.resolve("todo", Event::Validate).await.unwrap();
        assert!(matches!(*program, CompiledProgram::Noop));
    }

    #[tokio::test]
    async fn script_handler_compiles_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        write_handler(dir.path(), "todo", "validate", "lua", "if data.title == nil then error('title', 'required') end");
        let cache = HandlerCache::new(dir.path());
        let first = cache.resolve("todo", Event::Validate).await.unwrap();
        let second = cache.resolve("todo", Event::Validate).await.unwrap();
        assert!(matches!(*first, CompiledProgram::Script(_)));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn editing_the_handler_invalidates_the_cached_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        write_handler(dir.path(), "todo", "validate", "lua", "x = 1");
        let cache = HandlerCache::new(dir.path());
        let first = cache.resolve("todo", Event::Validate).await.unwrap();

        std::thread::sleep(Duration::from_millis(10));
        write_handler(dir.path(), "todo", "validate", "lua", "x = 2");
        let second = cache.resolve("todo", Event::Validate).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn invalid_syntax_is_cached_as_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_handler(dir.path(), "todo", "validate", "lua", "if then then");
        let cache = HandlerCache::new(dir.path()).with_failure_ttl(Duration::from_secs(60));
        let err1 = cache.resolve("todo", Event::Validate).await.unwrap_err();
        let err2 = cache.resolve("todo", Event::Validate).await.unwrap_err();
        assert!(matches!(err1, ScriptError::CompileFailed { .. }));
        assert!(matches!(err2, ScriptError::CompileFailed { .. }));
    }
}
