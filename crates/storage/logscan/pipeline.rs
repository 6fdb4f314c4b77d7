//! Three-stage fetch/filter pipeline.
//!
//! The feeder walks the scan plan and hands every candidate both to the
//! ordered output queue and to the work queue. Processors fetch, filter and
//! shape candidates in parallel and answer on the candidate's own reply
//! channel. The collector reads the output queue in scan order and waits
//! for each reply, so results come out in position order.

use std::{thread, time::Duration};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use relayer_common::{Log, LogKey};
use tracing::warn;

use super::{
    LogFilter,
    source::{LogFetch, ScanPlan},
};
use crate::{
    api::keys,
    config::LogScanConfig,
    context::{Interruption, QueryContext},
    error::StoreError,
    reader::Reader,
    response::{LogResponse, make_log_response},
};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

type Reply = Result<Option<LogResponse>, StoreError>;

struct Job {
    fetch: LogFetch,
    reply: Sender<Reply>,
}

enum Queued {
    Candidate { key: LogKey, reply: Receiver<Reply> },
    Failed(StoreError),
}

#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub items: Vec<LogResponse>,
    /// Last candidate whose evaluation was consumed, matching or not.
    pub last_processed: Option<LogKey>,
    pub interruption: Option<Interruption>,
}

pub(crate) fn run(
    reader: &Reader<'_>,
    chain: u64,
    filter: &LogFilter,
    plan: &ScanPlan,
    ctx: &QueryContext,
    limit: usize,
    settings: &LogScanConfig,
) -> Result<Outcome, StoreError> {
    let (job_tx, job_rx) = bounded::<Job>(settings.queue_depth);
    let (queue_tx, queue_rx) = bounded::<Queued>(settings.queue_depth);
    // Never sent on; dropping the sender stops every stage.
    let (stop_tx, stop_rx) = bounded::<()>(0);

    thread::scope(|scope| -> Result<Outcome, StoreError> {
        let stop = stop_rx.clone();
        thread::Builder::new()
            .name("log_scan_feeder".to_string())
            .spawn_scoped(scope, move || {
                feed(reader, chain, plan, &job_tx, &queue_tx, &stop)
            })?;
        for worker_id in 0..settings.processors {
            let jobs = job_rx.clone();
            let stop = stop_rx.clone();
            thread::Builder::new()
                .name(format!("log_scan_processor_{worker_id}"))
                .spawn_scoped(scope, move || process(reader, chain, filter, &jobs, &stop))?;
        }
        drop(job_rx);
        let outcome = collect(&queue_rx, ctx, limit);
        drop(stop_tx);
        outcome
    })
}

fn send_or_stop<T>(tx: &Sender<T>, value: T, stop: &Receiver<()>) -> bool {
    crossbeam::select! {
        send(tx, value) -> sent => sent.is_ok(),
        recv(stop) -> _ => false,
    }
}

fn feed(
    reader: &Reader<'_>,
    chain: u64,
    plan: &ScanPlan,
    jobs: &Sender<Job>,
    queue: &Sender<Queued>,
    stop: &Receiver<()>,
) {
    let source = match plan.open(reader.view(), chain) {
        Ok(source) => source,
        Err(err) => {
            send_or_stop(queue, Queued::Failed(err), stop);
            return;
        }
    };
    for item in source {
        let fetch = match item {
            Ok(fetch) => fetch,
            Err(err) => {
                send_or_stop(queue, Queued::Failed(err), stop);
                return;
            }
        };
        let (reply_tx, reply_rx) = bounded(1);
        let key = fetch.key;
        if !send_or_stop(queue, Queued::Candidate { key, reply: reply_rx }, stop) {
            return;
        }
        if !send_or_stop(jobs, Job { fetch, reply: reply_tx }, stop) {
            return;
        }
    }
}

fn process(
    reader: &Reader<'_>,
    chain: u64,
    filter: &LogFilter,
    jobs: &Receiver<Job>,
    stop: &Receiver<()>,
) {
    loop {
        let job = crossbeam::select! {
            recv(jobs) -> job => match job {
                Ok(job) => job,
                Err(_) => return,
            },
            recv(stop) -> _ => return,
        };
        // The reply slot holds exactly one message, so this never blocks.
        let _ = job.reply.send(evaluate(reader, chain, filter, job.fetch));
    }
}

fn evaluate(reader: &Reader<'_>, chain: u64, filter: &LogFilter, fetch: LogFetch) -> Reply {
    let LogFetch { key, data } = fetch;
    let data = match data {
        Some(data) => data.into_vec(),
        None => match reader.view().get(&keys::log(chain, &key)?)? {
            Some(data) => data,
            None => {
                warn!(?key, "Index entry points at a missing log");
                return Ok(None);
            }
        },
    };
    let log: Log = match reader.codec().unmarshal(&data) {
        Ok(log) => log,
        Err(err) => {
            warn!(?key, "Skipping corrupted log: {err}");
            return Ok(None);
        }
    };
    if !filter.matches(&log) {
        return Ok(None);
    }
    let Some(block_hash) = reader.block_hash_in_range(chain, key.height)? else {
        warn!(?key, "Skipping log without a readable block hash");
        return Ok(None);
    };
    let Some(tx_hash) = reader.tx_hash_in_range(chain, key.height, key.tx_index)? else {
        warn!(?key, "Skipping log without a readable transaction hash");
        return Ok(None);
    };
    Ok(Some(make_log_response(key, block_hash, tx_hash, log)))
}

enum Wait<T> {
    Ready(T),
    Closed,
    Interrupted(Interruption),
}

fn wait<T>(rx: &Receiver<T>, ctx: &QueryContext) -> Wait<T> {
    loop {
        if let Some(interruption) = ctx.check() {
            return Wait::Interrupted(interruption);
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(value) => return Wait::Ready(value),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Wait::Closed,
        }
    }
}

fn collect(queue: &Receiver<Queued>, ctx: &QueryContext, limit: usize) -> Result<Outcome, StoreError> {
    let mut outcome = Outcome::default();
    loop {
        let (key, reply) = match wait(queue, ctx) {
            Wait::Ready(Queued::Candidate { key, reply }) => (key, reply),
            Wait::Ready(Queued::Failed(err)) => return Err(err),
            Wait::Closed => return Ok(outcome),
            Wait::Interrupted(interruption) => {
                outcome.interruption = Some(interruption);
                return Ok(outcome);
            }
        };
        let response = match wait(&reply, ctx) {
            Wait::Ready(reply) => reply?,
            Wait::Closed => {
                return Err(StoreError::Custom(format!(
                    "log processor exited before evaluating {key:?}"
                )));
            }
            Wait::Interrupted(interruption) => {
                outcome.interruption = Some(interruption);
                return Ok(outcome);
            }
        };
        outcome.last_processed = Some(key);
        if let Some(response) = response {
            outcome.items.push(response);
            if outcome.items.len() >= limit {
                outcome.interruption = Some(Interruption::Limited);
                return Ok(outcome);
            }
        }
    }
}
