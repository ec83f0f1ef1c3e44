use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;

/// Bounded-concurrency map over keyed work with per-item failure isolation.
///
/// A fixed pool of worker threads drains the work set and runs `op` for each
/// chapter number; completed results are sent over a channel and applied by
/// `sink` on the calling thread, one at a time in completion order, so the
/// destination store never sees concurrent writers. `op` returning `Ok(None)`
/// marks a skip, `Err` a per-chapter failure; neither aborts the stage. A
/// `sink` error is fatal.
///
/// Returns the number of units written.
pub fn run_stage<T, Op, Sink>(
    stage: &str,
    work: &BTreeSet<u32>,
    workers: usize,
    op: Op,
    mut sink: Sink,
) -> anyhow::Result<usize>
where
    T: Send,
    Op: Fn(u32) -> anyhow::Result<Option<T>> + Sync,
    Sink: FnMut(u32, T) -> anyhow::Result<()>,
{
    let total = work.len();
    if total == 0 {
        return Ok(0);
    }

    let workers = workers.clamp(1, total);
    let queue: Mutex<VecDeque<u32>> = Mutex::new(work.iter().copied().collect());
    let (tx, rx) = mpsc::channel::<(u32, anyhow::Result<Option<T>>)>();

    thread::scope(|scope| {
        let queue = &queue;
        let op = &op;
        for _ in 0..workers {
            let tx = tx.clone();
            scope.spawn(move || {
                loop {
                    let next = match queue.lock() {
                        Ok(mut pending) => pending.pop_front(),
                        // A poisoned queue means another worker panicked;
                        // stop pulling and let the scope propagate it.
                        Err(_) => None,
                    };
                    let Some(number) = next else { break };
                    if tx.send((number, op(number))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut completed = 0_usize;
        let mut written = 0_usize;
        for (number, outcome) in rx {
            completed += 1;
            match outcome {
                Ok(Some(item)) => {
                    sink(number, item)?;
                    written += 1;
                    tracing::info!("{stage} {completed:05}/{total:05}: chapter {number}");
                }
                Ok(None) => {
                    tracing::info!("{stage} {completed:05}/{total:05}: chapter {number} skipped");
                }
                Err(err) => {
                    tracing::warn!("{stage} failed for chapter {number}: {err:#}");
                }
            }
        }
        Ok(written)
    })
}
