//! Hot-reload: a single filesystem watcher per `HandlerCache` invalidates
//! the cached entry for whichever `(collection, event)` file just changed.
//! The cache's own fingerprint check would eventually notice a stale entry
//! on the next request anyway; the watcher exists so a write is visible
//! immediately rather than on next access (spec §5's hot-reload
//! invariant).

use std::path::Path;
use std::sync::Arc;

use notify::{Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};

use crate::cache::HandlerCache;
use crate::context::Event;

pub struct HandlerWatcher {
    // Kept alive for as long as the watcher should run; dropping it stops
    // the background watch thread.
    _watcher: RecommendedWatcher,
}

impl HandlerWatcher {
    pub fn start(collections_dir: impl AsRef<Path>, cache: Arc<HandlerCache>) -> notify::Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| match res {
            Ok(event) => {
                for path in &event.paths {
                    if let Some((collection, ev)) = parse_handler_path(path) {
                        tracing::debug!(collection = %collection, event = ?ev, "invalidating cached handler");
                        cache.invalidate(&collection, ev);
                    }
                }
            }
            Err(err) => tracing::warn!("handler file watcher error: {err}"),
        })?;
        watcher.watch(collections_dir.as_ref(), RecursiveMode::Recursive)?;
        Ok(Self { _watcher: watcher })
    }
}

fn parse_handler_path(path: &Path) -> Option<(String, Event)> {
    let stem = path.file_stem()?.to_str()?.to_lowercase();
    let event = match stem.as_str() {
        "beforerequest" => Event::BeforeRequest,
        "validate" => Event::Validate,
        "get" => Event::Get,
        "post" => Event::Post,
        "put" => Event::Put,
        "delete" => Event::Delete,
        "aftercommit" => Event::AfterCommit,
        _ => return None,
    };

    let handlers_dir = path.parent()?;
    if handlers_dir.file_name()?.to_str()? != "handlers" {
        return None;
    }
    let collection = handlers_dir.parent()?.file_name()?.to_str()?.to_string();
    Some((collection, event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_a_well_formed_handler_path() {
        let path = Path::new("/data/collections/todo/handlers/validate.lua");
        assert_eq!(parse_handler_path(path), Some(("todo".to_string(), Event::Validate)));
    }

    #[test]
    fn ignores_files_outside_a_handlers_directory() {
        let path = Path::new("/data/collections/todo/descriptor.yaml");
        assert_eq!(parse_handler_path(path), None);
    }
}
