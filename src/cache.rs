//! In-memory story cache with an absolute time-to-live.
//!
//! Entries expire `ttl` after insertion regardless of how often they are
//! read. Expired entries are dropped lazily on lookup and in bulk by
//! [`StoryCache::purge_expired`], which the server calls periodically.
//!
//! Time comes from `tokio::time::Instant` so tests can drive expiry with a
//! paused clock.

use crate::story::GeneratedStory;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Entry {
    story: GeneratedStory,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct StoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl StoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `story` under its id, replacing any previous entry and
    /// restarting its lifetime.
    pub async fn insert(&self, story: GeneratedStory) {
        let expires_at = Instant::now() + self.ttl;
        let id = story.id.clone();
        self.entries
            .write()
            .await
            .insert(id.clone(), Entry { story, expires_at });
        debug!("Cached story {} for {:?}", id, self.ttl);
    }

    /// A clone of the live entry for `id`, if any.
    pub async fn get(&self, id: &str) -> Option<GeneratedStory> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                None => return None,
                Some(entry) if entry.expires_at > now => return Some(entry.story.clone()),
                Some(_) => {}
            }
        }
        // Expired: drop it unless someone re-inserted in the meantime.
        let mut entries = self.entries.write().await;
        if entries.get(id).is_some_and(|e| e.expires_at <= now) {
            entries.remove(id);
            debug!("Story {} expired from cache", id);
        }
        None
    }

    /// Apply `f` to the live entry for `id`. Returns `false` when absent or
    /// expired. The entry keeps its original expiry.
    pub async fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut GeneratedStory),
    {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(entry) if entry.expires_at > now => {
                f(&mut entry.story);
                true
            }
            _ => false,
        }
    }

    pub async fn remove(&self, id: &str) -> Option<GeneratedStory> {
        self.entries.write().await.remove(id).map(|e| e.story)
    }

    /// Drop every expired entry; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Purged {} expired stories", removed);
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn story(id: &str) -> GeneratedStory {
        GeneratedStory {
            id: id.into(),
            title: format!("Story {id}"),
            phases: vec![],
            created_at: Utc::now(),
            source_file_name: "doc.pdf".into(),
            pdf_file_path: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = StoryCache::new(Duration::from_secs(60));
        cache.insert(story("a")).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("a").await.unwrap().title, "Story a");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.is_empty().await, "expired entry is evicted on lookup");
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_lifetime() {
        let cache = StoryCache::new(Duration::from_secs(10));
        cache.insert(story("a")).await;
        for _ in 0..9 {
            tokio::time::advance(Duration::from_secs(1)).await;
            assert!(cache.get("a").await.is_some());
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = StoryCache::new(Duration::from_secs(30));
        cache.insert(story("old")).await;
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.insert(story("new")).await;
        tokio::time::advance(Duration::from_secs(15)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("new").await.is_some());
    }

    #[tokio::test]
    async fn update_and_remove() {
        let cache = StoryCache::new(Duration::from_secs(60));
        cache.insert(story("a")).await;
        assert!(
            cache
                .update("a", |s| s.pdf_file_path = Some("generated-stories/a.pdf".into()))
                .await
        );
        assert!(!cache.update("missing", |_| {}).await);
        assert_eq!(
            cache.get("a").await.unwrap().pdf_file_path.as_deref(),
            Some("generated-stories/a.pdf")
        );
        assert!(cache.remove("a").await.is_some());
        assert!(cache.get("a").await.is_none());
    }
}
