//! Bounded scatter/gather over a lazily produced work queue.

use std::{future::Future, net::IpAddr};

use futures::future::join_all;
use parking_lot::Mutex;

use super::probe::{PortProber, ProbeOutcome};

/// Fixed number of workers pulling items from one shared queue.
///
/// Each worker finishes its current item before taking the next one, so no
/// more than `workers` items are in flight regardless of how many the queue
/// yields. Workers are polled on the caller's task; nothing is spawned and
/// the call returns once the queue is drained and every worker is idle.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over every item and collect the outputs in completion order.
    pub async fn scatter_gather<I, F, Fut, T>(&self, items: I, work: F) -> Vec<T>
    where
        I: Iterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = T>,
    {
        let queue = Mutex::new(items);
        let output = Mutex::new(Vec::new());

        {
            let (queue, output, work) = (&queue, &output, &work);
            let workers = (0..self.workers).map(|_| async move {
                loop {
                    let next = queue.lock().next();
                    let Some(item) = next else {
                        break;
                    };
                    let value = work(item).await;
                    output.lock().push(value);
                }
            });
            join_all(workers).await;
        }

        output.into_inner()
    }
}

/// Probe every port of one address at once. Outcomes follow `ports` order.
pub async fn probe_ports(
    prober: &dyn PortProber,
    address: IpAddr,
    ports: &[u16],
) -> Vec<ProbeOutcome> {
    join_all(ports.iter().map(move |&port| prober.probe(address, port))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use portwatch_model::PortStatus;

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_worker_bound() {
        let pool = WorkerPool::new(20);
        let active = &AtomicUsize::new(0);
        let peak = &AtomicUsize::new(0);

        let done = pool
            .scatter_gather(0..500u32, move |n| async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                n
            })
            .await;

        assert_eq!(done.len(), 500);
        assert_eq!(peak.load(Ordering::SeqCst), 20);
        let unique: HashSet<u32> = done.into_iter().collect();
        assert_eq!(unique.len(), 500);
    }

    #[tokio::test]
    async fn empty_queue_returns_immediately() {
        let pool = WorkerPool::new(4);
        let out: Vec<u8> = pool
            .scatter_gather(std::iter::empty::<u8>(), |n| async move { n })
            .await;
        assert!(out.is_empty());
    }

    #[test]
    fn zero_workers_still_make_progress() {
        assert_eq!(WorkerPool::new(0).workers(), 1);
    }

    struct SlowProber;

    #[async_trait]
    impl PortProber for SlowProber {
        async fn probe(&self, address: IpAddr, port: u16) -> ProbeOutcome {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if port == 22 {
                ProbeOutcome::open(address, port, 1)
            } else {
                ProbeOutcome::closed(address, port)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ports_of_one_address_are_probed_concurrently() {
        let address: IpAddr = "10.0.0.1".parse().unwrap();
        let started = tokio::time::Instant::now();

        let outcomes = probe_ports(&SlowProber, address, &[21, 22, 80, 443]).await;

        // Four sequential probes would take 8s.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        let ports: Vec<u16> = outcomes.iter().map(|o| o.port).collect();
        assert_eq!(ports, vec![21, 22, 80, 443]);
        assert_eq!(outcomes[1].status, PortStatus::Open);
    }
}
