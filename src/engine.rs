use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::fetch::Fetcher;
use crate::provider::LinkProvider;

/// Global cap on concurrently active expansion tasks (§4.5.2, §5): keeps the
/// fan-out tree from spawning faster than the fetcher's own gate can drain.
const GLOBAL_INFLIGHT_PERMITS: usize = 500;

/// A one-shot latch paired with a semaphore whose initial count is the
/// sibling count of a frontier level. The last sibling to drain the
/// semaphore fires the latch, releasing children to begin deep work
/// (§3 "Parent-complete signal", §9).
struct ParentGate {
    remaining: Semaphore,
    fired: AtomicBool,
    notify: Notify,
}

impl ParentGate {
    fn new(sibling_count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: Semaphore::new(sibling_count.max(1)),
            fired: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    /// Root gate: a single synthetic "sibling" (the request itself), already
    /// effectively drained once the root task runs.
    fn root() -> Arc<Self> {
        Self::new(1)
    }

    /// Acquire one slot, do `work`, and check drain while still holding the
    /// permit — checking after `drop` would always see the permit we just
    /// gave back and never observe zero.
    async fn guard<F, Fut, T>(self: &Arc<Self>, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let permit = self.remaining.acquire().await.expect("gate never closed");
        let result = work().await;
        if self.remaining.available_permits() == 0 {
            self.fire();
        }
        drop(permit);
        result
    }

    fn fire(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Returns once the latch fires, or immediately on cancellation — a
    /// level that never drains (because the search was cancelled first)
    /// must not strand its waiter (§5).
    async fn wait(&self, cancel: &CancellationToken) {
        if self.fired.load(Ordering::SeqCst) || cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = cancel.cancelled() => {}
        }
    }
}

/// Per-request shared state threaded through every `expand` task.
struct SearchState {
    destination: String,
    destination_links: tokio::sync::OnceCell<Vec<String>>,
    traversed: DashSet<String>,
    cancel: CancellationToken,
    inflight: Arc<Semaphore>,
    provider: Arc<LinkProvider>,
    /// Count of `expand` invocations alive anywhere in this request's tree.
    outstanding: std::sync::atomic::AtomicUsize,
    /// Count of those invocations currently parked in the terminal
    /// dead-end wait (no further work possible on that branch). When this
    /// reaches `outstanding`, the whole tree is quiescent with no winner:
    /// cancellation is fired so every waiter unwinds with `None` instead of
    /// hanging forever (§8 "no path" scenario).
    blocked: std::sync::atomic::AtomicUsize,
}

/// RAII bookkeeping for `outstanding`, so every return path out of `expand`
/// (success, dead end, or cancellation) decrements it exactly once.
struct TaskGuard<'a>(&'a Arc<SearchState>);

impl<'a> TaskGuard<'a> {
    fn enter(state: &'a Arc<SearchState>) -> Self {
        state.outstanding.fetch_add(1, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        self.0.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parks until cancellation, first checking whether every currently-alive
/// task has reached this same terminal state (§8 termination on exhaustion).
async fn dead_end_wait(state: &Arc<SearchState>) {
    state.blocked.fetch_add(1, Ordering::SeqCst);
    if state.blocked.load(Ordering::SeqCst) >= state.outstanding.load(Ordering::SeqCst) {
        state.cancel.cancel();
    }
    state.cancel.cancelled().await;
}

/// Waits for the first child to complete, counting this wait itself as
/// "blocked" for quiescence detection: a task parked here is just as stuck
/// as one in `dead_end_wait` if every child beneath it also dead-ends.
///
/// Also drains any other children that finished in the same scheduling
/// tick (§4.5.2 step 5g-h): `JoinSet::join_next` only surfaces one
/// completion at a time, but two siblings can race to a result together,
/// and a dead-end's `None` must not shadow a sibling's real path.
async fn join_next_blocking(
    state: &Arc<SearchState>,
    tasks: &mut JoinSet<Option<Vec<String>>>,
) -> Vec<Result<Option<Vec<String>>, tokio::task::JoinError>> {
    state.blocked.fetch_add(1, Ordering::SeqCst);
    if state.blocked.load(Ordering::SeqCst) >= state.outstanding.load(Ordering::SeqCst) {
        state.cancel.cancel();
    }
    let mut done = Vec::new();
    tokio::select! {
        r = tasks.join_next() => {
            if let Some(r) = r {
                done.push(r);
            }
        }
        _ = state.cancel.cancelled() => {}
    }
    while let Some(r) = tasks.try_join_next() {
        done.push(r);
    }
    state.blocked.fetch_sub(1, Ordering::SeqCst);
    done
}

impl SearchState {
    /// Computes (and memoizes) the destination-hint set, per request (§4.5.2
    /// step 5d). Returns `None` if the destination is an orphan page.
    async fn destination_links(&self) -> Option<&Vec<String>> {
        let links = self
            .destination_links
            .get_or_init(|| async {
                self.provider
                    .links_of(&self.destination, &self.cancel, None)
                    .await
            })
            .await;
        if links.is_empty() {
            None
        } else {
            Some(links)
        }
    }
}

/// The concurrent bidirectional-biased search engine (§4.5). `exists` is
/// supplied by the caller (the ingress adapter) via the fetcher so this
/// module stays free of HTTP-status concerns.
pub struct Engine {
    fetcher: Arc<Fetcher>,
    provider: Arc<LinkProvider>,
}

impl Engine {
    pub fn new(fetcher: Arc<Fetcher>, provider: Arc<LinkProvider>) -> Self {
        Self { fetcher, provider }
    }

    /// §4.5.1. Verifies S and D exist, then races the expansion tree.
    /// Returns `Ok(None)` for every "no path" outcome (orphan destination,
    /// search exhaustion, upstream refusal) — those are not client errors.
    pub async fn race(
        &self,
        source: &str,
        destination: &str,
    ) -> Result<Option<Vec<String>>, crate::error::Error> {
        if source == destination {
            return Ok(Some(vec![source.to_string()]));
        }

        if !self.fetcher.exists(source).await {
            return Err(crate::error::Error::InvalidSource(source.to_string()));
        }
        if !self.fetcher.exists(destination).await {
            return Err(crate::error::Error::InvalidDestination(
                destination.to_string(),
            ));
        }

        let state = Arc::new(SearchState {
            destination: destination.to_string(),
            destination_links: tokio::sync::OnceCell::new(),
            traversed: DashSet::new(),
            cancel: CancellationToken::new(),
            inflight: Arc::new(Semaphore::new(GLOBAL_INFLIGHT_PERMITS)),
            provider: self.provider.clone(),
            outstanding: std::sync::atomic::AtomicUsize::new(0),
            blocked: std::sync::atomic::AtomicUsize::new(0),
        });

        let root_gate = ParentGate::root();
        let path = expand(state, source.to_string(), root_gate).await;
        Ok(path)
    }
}

/// §4.5.2: `expand(T, G_p)`. Boxed because it recurses through an `async fn`.
fn expand(
    state: Arc<SearchState>,
    title: String,
    parent_gate: Arc<ParentGate>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<Vec<String>>> + Send>> {
    Box::pin(async move {
        let _guard = TaskGuard::enter(&state);

        let Ok(_permit) = state.inflight.acquire().await else {
            return None;
        };

        if state.cancel.is_cancelled() {
            return None;
        }

        let dest = state.destination.clone();
        let child_links = {
            let state = state.clone();
            let title = title.clone();
            parent_gate
                .guard(|| async move { sorted_links(&state, &title).await })
                .await
        };

        if child_links.iter().any(|l| l == &dest) {
            info!(%title, destination = %dest, "found destination as direct child");
            state.cancel.cancel();
            return Some(vec![title, dest]);
        }

        if !child_links.is_empty() && !state.cancel.is_cancelled() {
            // Release the in-flight slot before doing the (potentially
            // long) wait for siblings, so it doesn't starve other frontiers.
            drop(_permit);

            parent_gate.wait(&state.cancel).await;

            let remaining: Vec<String> = child_links
                .into_iter()
                .filter(|l| !state.traversed.contains(l))
                .collect();

            if state.destination_links().await.is_none() {
                debug!(destination = %dest, "destination is an orphan page");
                return None;
            }

            let child_gate = ParentGate::new(remaining.len());
            let mut tasks: JoinSet<Option<Vec<String>>> = JoinSet::new();
            for child in remaining {
                let state = state.clone();
                let gate = child_gate.clone();
                tasks.spawn(async move { expand(state, child, gate).await });
            }

            let done = join_next_blocking(&state, &mut tasks).await;
            tasks.abort_all();
            let winner = done.into_iter().find_map(|r| r.ok().flatten());

            if let Some(path) = winner {
                let mut out = vec![title];
                out.extend(path);
                return Some(out);
            }

            dead_end_wait(&state).await;
            return None;
        }

        // Dead end: don't report completion to the parent's JoinSet early,
        // or it would be mistaken for the winner of that race and cause
        // still-useful siblings to be aborted.
        dead_end_wait(&state).await;
        None
    })
}

/// §4.5.3: `sorted_links(T)`.
async fn sorted_links(state: &Arc<SearchState>, title: &str) -> Vec<String> {
    if state.traversed.contains(title) {
        return Vec::new();
    }

    let links = state
        .provider
        .links_of(title, &state.cancel, Some(&state.destination))
        .await;

    if !links.is_empty() {
        state.traversed.insert(title.to_string());
    }

    if let Some(hint) = state.destination_links.get() {
        if !hint.is_empty() {
            let hint_set: std::collections::HashSet<&str> =
                hint.iter().map(String::as_str).collect();
            let (front, rest): (Vec<String>, Vec<String>) =
                links.into_iter().partition(|l| hint_set.contains(l.as_str()));
            let mut ordered = front;
            ordered.extend(rest);
            return ordered;
        }
    }

    links
}
