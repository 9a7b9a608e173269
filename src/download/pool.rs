//! 页面并发抓取调度。
//!
//! All work runs on the calling task: jobs are futures polled together in a
//! `FuturesUnordered`, so "concurrent" means interleaved at await points,
//! never parallel on threads.

use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::warn;

use super::error::ScrapeError;

/// Runs `job(0..total)` with at most `limit` jobs in flight.
///
/// `on_done` is called on this task for each success, in completion order.
/// After the first failure no new job is started, jobs already in flight are
/// still driven to completion (so they release their tabs), and then the
/// first error is returned.
pub async fn run_bounded<T, F, Fut, D>(
    total: usize,
    limit: usize,
    mut job: F,
    mut on_done: D,
) -> Result<(), ScrapeError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, ScrapeError>>,
    D: FnMut(usize, T),
{
    let limit = limit.max(1);
    let mut next = 0usize;
    let mut in_flight = FuturesUnordered::new();
    let mut first_err: Option<ScrapeError> = None;

    loop {
        while first_err.is_none() && next < total && in_flight.len() < limit {
            let idx = next;
            let fut = job(idx);
            in_flight.push(async move { (idx, fut.await) });
            next += 1;
        }

        let Some((idx, outcome)) = in_flight.next().await else {
            break;
        };
        match outcome {
            Ok(value) => on_done(idx, value),
            Err(err) => {
                warn!(target: "download", idx, "page job failed: {err}");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
