use std::sync::Arc;

use httpmock::MockServer;
use wikiracer::cache::MemoryCache;
use wikiracer::engine::Engine;
use wikiracer::fetch::{FetchOptions, Fetcher};
use wikiracer::provider::LinkProvider;

fn page(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="/wiki/{l}">{l}</a>"#))
        .collect();
    format!("<html><body>{anchors}</body></html>")
}

fn engine_for(server: &MockServer) -> Engine {
    let opts = FetchOptions {
        base_url: format!("{}/wiki/", server.base_url()),
        ..FetchOptions::default()
    };
    let fetcher = Arc::new(Fetcher::new(opts).unwrap());
    let cache = Arc::new(MemoryCache::new());
    let provider = Arc::new(LinkProvider::new(cache, fetcher.clone()));
    Engine::new(fetcher, provider)
}

fn mock_page(server: &MockServer, title: &str, links: &[&str]) {
    let body = page(links);
    server.mock(|when, then| {
        when.method(httpmock::Method::GET).path(format!("/wiki/{title}"));
        then.status(200).body(body.clone());
    });
}

/// §8 scenario 1: direct link.
#[tokio::test]
async fn direct_link() {
    let server = MockServer::start();
    mock_page(&server, "A", &["B"]);
    mock_page(&server, "B", &[]);

    let engine = engine_for(&server);
    let path = engine.race("A", "B").await.unwrap();
    assert_eq!(path, Some(vec!["A".to_string(), "B".to_string()]));
}

/// §8 scenario 2: two hops, greedy path through X before Y.
#[tokio::test]
async fn two_hops() {
    let server = MockServer::start();
    mock_page(&server, "A", &["X", "Y"]);
    mock_page(&server, "X", &["B"]);
    mock_page(&server, "Y", &["Z"]);
    mock_page(&server, "B", &[]);

    let engine = engine_for(&server);
    let path = engine.race("A", "B").await.unwrap();
    assert_eq!(
        path,
        Some(vec!["A".to_string(), "X".to_string(), "B".to_string()])
    );
}

/// §8 scenario 3: destination bias prioritizes pages also linked from D.
#[tokio::test]
async fn destination_bias() {
    let server = MockServer::start();
    mock_page(&server, "A", &["U", "V"]);
    mock_page(&server, "U", &[]);
    mock_page(&server, "V", &["B"]);
    mock_page(&server, "B", &["V"]);

    let engine = engine_for(&server);
    let path = engine.race("A", "B").await.unwrap();
    assert_eq!(
        path,
        Some(vec!["A".to_string(), "V".to_string(), "B".to_string()])
    );
}

/// §8 scenario 4: orphan destination yields no path.
#[tokio::test]
async fn orphan_destination() {
    let server = MockServer::start();
    mock_page(&server, "A", &["B", "C"]);
    mock_page(&server, "B", &[]);
    mock_page(&server, "C", &[]);
    mock_page(&server, "Z", &[]);

    let engine = engine_for(&server);
    let path = engine.race("A", "Z").await.unwrap();
    assert_eq!(path, None);
}

/// §8 scenario 5: exhausted search, destination unreachable but not an orphan.
#[tokio::test]
async fn no_path_found() {
    let server = MockServer::start();
    mock_page(&server, "A", &["B"]);
    mock_page(&server, "B", &["A"]);
    mock_page(&server, "Z", &["Q"]);
    mock_page(&server, "Q", &[]);

    let engine = engine_for(&server);
    let path = engine.race("A", "Z").await.unwrap();
    assert_eq!(path, None);
}

/// §8 scenario 6: self-loop stripped from the cached link set.
#[tokio::test]
async fn self_loop_stripped_from_cache() {
    let server = MockServer::start();
    mock_page(&server, "A", &["A", "B"]);
    mock_page(&server, "B", &[]);

    let fetcher = Arc::new(
        Fetcher::new(FetchOptions {
            base_url: format!("{}/wiki/", server.base_url()),
            ..FetchOptions::default()
        })
        .unwrap(),
    );
    let cache = Arc::new(MemoryCache::new());
    let provider = LinkProvider::new(cache.clone(), fetcher);
    let cancel = tokio_util::sync::CancellationToken::new();

    provider.links_of("A", &cancel, None).await;

    assert_eq!(
        wikiracer::cache::LinkCache::get(cache.as_ref(), "A").await,
        Some(vec!["B".to_string()])
    );
}

/// §8 boundary: `S = D` returns a single-element path without any fetch.
#[tokio::test]
async fn source_equals_destination() {
    let server = MockServer::start();
    let engine = engine_for(&server);
    let path = engine.race("Giraffe", "Giraffe").await.unwrap();
    assert_eq!(path, Some(vec!["Giraffe".to_string()]));
}
