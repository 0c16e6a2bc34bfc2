//! Bounded-concurrency batch execution.

use std::future::Future;

use futures_util::future::join_all;

/// Run `jobs` with at most `concurrency` in flight at once.
///
/// Jobs are taken in consecutive chunks; every job in a chunk starts before
/// any of them is awaited, and the whole chunk completes before the next one
/// begins. The result order always mirrors the input order, no matter which
/// job inside a chunk finishes first.
///
/// A failing job must resolve to a value describing its failure; nothing at
/// this level short-circuits the rest of the batch.
pub async fn run_bounded<F, T>(jobs: Vec<F>, concurrency: usize) -> Vec<T>
where
    F: Future<Output = T>,
{
    let concurrency = concurrency.max(1);
    let mut results = Vec::with_capacity(jobs.len());
    let mut jobs = jobs.into_iter();
    loop {
        let chunk: Vec<F> = jobs.by_ref().take(concurrency).collect();
        if chunk.is_empty() {
            break;
        }
        results.extend(join_all(chunk).await);
    }
    results
}
