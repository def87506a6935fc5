use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cache::LinkCache;
use crate::extractor;
use crate::fetch::Fetcher;

/// Single authoritative source for "links of a title" (§4.4): composes the
/// cache, the fetcher, and the extractor behind one call.
pub struct LinkProvider {
    cache: Arc<dyn LinkCache>,
    fetcher: Arc<Fetcher>,
}

impl LinkProvider {
    pub fn new(cache: Arc<dyn LinkCache>, fetcher: Arc<Fetcher>) -> Self {
        Self { cache, fetcher }
    }

    /// §4.4 steps 1-7. `destination_hint`, when given, enables the
    /// early-exit optimization: if the destination shows up in this page's
    /// own links, cancellation fires immediately and the cache write is
    /// skipped.
    pub async fn links_of(
        &self,
        title: &str,
        cancel: &CancellationToken,
        destination_hint: Option<&str>,
    ) -> Vec<String> {
        if let Some(cached) = self.cache.get(title).await {
            return cached;
        }

        if cancel.is_cancelled() {
            return Vec::new();
        }

        let Some(html) = self.fetcher.fetch(title, cancel).await else {
            return Vec::new();
        };

        if cancel.is_cancelled() {
            return Vec::new();
        }

        let links = extractor::extract(&html, title);

        if let Some(dest) = destination_hint {
            if links.iter().any(|l| l == dest) {
                cancel.cancel();
                return links;
            }
        }

        self.cache.put(title, links.clone()).await;
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::fetch::FetchOptions;
    use async_trait::async_trait;
    use httpmock::MockServer;
    use std::sync::Mutex;

    /// A cache wrapper that records every `put` call, to assert the
    /// early-exit path skips writing to the cache (§4.4 step 6).
    struct RecordingCache {
        inner: MemoryCache,
        puts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LinkCache for RecordingCache {
        async fn get(&self, title: &str) -> Option<Vec<String>> {
            self.inner.get(title).await
        }
        async fn put(&self, title: &str, links: Vec<String>) {
            self.puts.lock().unwrap().push(title.to_string());
            self.inner.put(title, links).await;
        }
    }

    fn fetcher_for(server: &MockServer) -> Fetcher {
        Fetcher::new(FetchOptions {
            base_url: format!("{}/wiki/", server.base_url()),
            ..FetchOptions::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_cached_value_without_fetching() {
        let cache: Arc<dyn LinkCache> = Arc::new(MemoryCache::new());
        cache.put("A", vec!["B".to_string()]).await;
        let server = MockServer::start();
        let provider = LinkProvider::new(cache, Arc::new(fetcher_for(&server)));
        let cancel = CancellationToken::new();

        let links = provider.links_of("A", &cancel, None).await;
        assert_eq!(links, vec!["B".to_string()]);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn returns_empty_when_already_cancelled_on_miss() {
        let cache: Arc<dyn LinkCache> = Arc::new(MemoryCache::new());
        let server = MockServer::start();
        let provider = LinkProvider::new(cache, Arc::new(fetcher_for(&server)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let links = provider.links_of("NotCached", &cancel, None).await;
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn early_exit_cancels_and_skips_cache_write() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/wiki/A");
            then.status(200)
                .body(r#"<html><body><a href="/wiki/D">dest</a></body></html>"#);
        });

        let recording = Arc::new(RecordingCache {
            inner: MemoryCache::new(),
            puts: Mutex::new(Vec::new()),
        });
        let cache: Arc<dyn LinkCache> = recording.clone();
        let provider = LinkProvider::new(cache, Arc::new(fetcher_for(&server)));
        let cancel = CancellationToken::new();

        let links = provider.links_of("A", &cancel, Some("D")).await;

        assert_eq!(links, vec!["D".to_string()]);
        assert!(cancel.is_cancelled());
        assert!(recording.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_cache_on_ordinary_miss() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/wiki/A");
            then.status(200)
                .body(r#"<html><body><a href="/wiki/B">other</a></body></html>"#);
        });

        let recording = Arc::new(RecordingCache {
            inner: MemoryCache::new(),
            puts: Mutex::new(Vec::new()),
        });
        let cache: Arc<dyn LinkCache> = recording.clone();
        let provider = LinkProvider::new(cache, Arc::new(fetcher_for(&server)));
        let cancel = CancellationToken::new();

        let links = provider.links_of("A", &cancel, Some("Z")).await;

        assert_eq!(links, vec!["B".to_string()]);
        assert!(!cancel.is_cancelled());
        assert_eq!(recording.puts.lock().unwrap().as_slice(), ["A".to_string()]);
    }
}
