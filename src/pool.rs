//! Pool state: the typed queues every proxy address lives in.
//!
//! Each queue is a FIFO behind its own lock. Popping an address hands out a
//! [`Lease`] that owns it until the caller settles it into another queue, so
//! an address can only ever be in one place. A lease that is dropped without
//! being settled puts the address back where it came from.

use crate::proxy::{ProxyAddress, Schema};

use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The six disjoint queues of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    Unprocessed,
    Http,
    Https,
    Ftp,
    Unknown,
    Broken,
}

impl Queue {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        match self {
            Queue::Unprocessed => 0,
            Queue::Http => 1,
            Queue::Https => 2,
            Queue::Ftp => 3,
            Queue::Unknown => 4,
            Queue::Broken => 5,
        }
    }
}

impl From<Schema> for Queue {
    fn from(schema: Schema) -> Self {
        match schema {
            Schema::Http => Queue::Http,
            Schema::Https => Queue::Https,
            Schema::Ftp => Queue::Ftp,
            Schema::Unknown => Queue::Unknown,
        }
    }
}

/// Ready proxies per schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadyCounts {
    pub http: usize,
    pub https: usize,
    pub ftp: usize,
    pub unknown: usize,
}

impl ReadyCounts {
    pub fn total(&self) -> usize {
        self.http + self.https + self.ftp + self.unknown
    }

    pub fn get(&self, schema: Schema) -> usize {
        match schema {
            Schema::Http => self.http,
            Schema::Https => self.https,
            Schema::Ftp => self.ftp,
            Schema::Unknown => self.unknown,
        }
    }
}

impl fmt::Display for ReadyCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} http, {} https, {} ftp, {} unknown",
            self.http, self.https, self.ftp, self.unknown
        )
    }
}

/// Full accounting of the pool at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounts {
    pub unprocessed: usize,
    pub ready: ReadyCounts,
    pub broken: usize,
    /// Leased out to a worker or router and not settled yet.
    pub in_flight: usize,
    /// Consumed by a successful single-use request.
    pub spent: usize,
}

impl PoolCounts {
    /// Addresses sitting in a queue.
    pub fn queued(&self) -> usize {
        self.unprocessed + self.ready.total() + self.broken
    }

    /// Every address the pool has ever been given.
    pub fn total(&self) -> usize {
        self.queued() + self.in_flight + self.spent
    }
}

/// Store of proxy addresses partitioned into lifecycle queues.
pub struct ProxyPool {
    queues: [Mutex<VecDeque<ProxyAddress>>; Queue::COUNT],
    in_flight: AtomicUsize,
    spent: AtomicUsize,
}

impl ProxyPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            queues: Default::default(),
            in_flight: AtomicUsize::new(0),
            spent: AtomicUsize::new(0),
        }
    }

    fn queue(&self, queue: Queue) -> &Mutex<VecDeque<ProxyAddress>> {
        &self.queues[queue.index()]
    }

    fn push(&self, queue: Queue, address: ProxyAddress) {
        self.queue(queue).lock().push_back(address);
    }

    fn lease(&self, from: Queue) -> Option<Lease<'_>> {
        let mut guard = self.queue(from).lock();
        let address = guard.pop_front()?;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        drop(guard);
        Some(Lease {
            pool: self,
            address,
            origin: from,
            settled: false,
        })
    }

    /// Add a freshly loaded address, dropping any schema it carried.
    pub fn enqueue_unprocessed(&self, address: ProxyAddress) {
        self.push(Queue::Unprocessed, address.without_schema());
    }

    /// Take the next address waiting for a health check.
    pub fn dequeue_unprocessed(&self) -> Option<Lease<'_>> {
        self.lease(Queue::Unprocessed)
    }

    /// Take the next ready address of the given schema.
    pub fn dequeue_ready(&self, schema: Schema) -> Option<Lease<'_>> {
        self.lease(Queue::from(schema))
    }

    /// Ready proxies per schema.
    pub fn count_ready(&self) -> ReadyCounts {
        ReadyCounts {
            http: self.len(Queue::Http),
            https: self.len(Queue::Https),
            ftp: self.len(Queue::Ftp),
            unknown: self.len(Queue::Unknown),
        }
    }

    pub fn count_broken(&self) -> usize {
        self.len(Queue::Broken)
    }

    pub fn len(&self, queue: Queue) -> usize {
        self.queue(queue).lock().len()
    }

    /// Copy of the broken queue in FIFO order. The queue is left intact.
    pub fn snapshot_broken(&self) -> Vec<ProxyAddress> {
        self.snapshot(Queue::Broken)
    }

    /// Copy of any queue in FIFO order.
    pub fn snapshot(&self, queue: Queue) -> Vec<ProxyAddress> {
        self.queue(queue).lock().iter().cloned().collect()
    }

    /// Move every broken address back to `unprocessed` for another sweep.
    pub fn requeue_broken(&self) -> usize {
        // Lock order: unprocessed before broken, same as `counts`.
        let mut unprocessed = self.queue(Queue::Unprocessed).lock();
        let mut broken = self.queue(Queue::Broken).lock();
        let moved = broken.len();
        unprocessed.extend(broken.drain(..).map(ProxyAddress::without_schema));
        moved
    }

    /// Consistent counts across all queues.
    pub fn counts(&self) -> PoolCounts {
        let guards: Vec<_> = self.queues.iter().map(|q| q.lock()).collect();
        let len = |queue: Queue| guards[queue.index()].len();
        PoolCounts {
            unprocessed: len(Queue::Unprocessed),
            ready: ReadyCounts {
                http: len(Queue::Http),
                https: len(Queue::Https),
                ftp: len(Queue::Ftp),
                unknown: len(Queue::Unknown),
            },
            broken: len(Queue::Broken),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            spent: self.spent.load(Ordering::SeqCst),
        }
    }
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold on an address taken out of a queue.
///
/// Settle it with [`promote`](Lease::promote), [`demote`](Lease::demote),
/// [`release`](Lease::release) or [`retire`](Lease::retire). Dropping it
/// unsettled returns the address to the queue it came from.
#[must_use = "an unsettled lease returns its address to the origin queue"]
pub struct Lease<'a> {
    pool: &'a ProxyPool,
    address: ProxyAddress,
    origin: Queue,
    settled: bool,
}

impl<'a> Lease<'a> {
    pub fn address(&self) -> &ProxyAddress {
        &self.address
    }

    /// Queue the address was taken from.
    pub fn origin(&self) -> Queue {
        self.origin
    }

    /// Place the address into the ready queue for `schema`.
    pub fn promote(self, schema: Schema) {
        self.settle(Some(Queue::from(schema)), Some(schema));
    }

    /// Place the address into `broken`.
    pub fn demote(self) {
        self.settle(Some(Queue::Broken), None);
    }

    /// Put the address back at the tail of the queue it came from.
    pub fn release(self) {
        let origin = self.origin;
        self.settle(Some(origin), None);
    }

    /// Take the address out of circulation after a single use.
    pub fn retire(self) {
        self.settle(None, None);
    }

    fn settle(mut self, to: Option<Queue>, schema: Option<Schema>) {
        self.settled = true;
        self.finish(self.address.clone(), to, schema);
    }

    fn finish(&self, address: ProxyAddress, to: Option<Queue>, schema: Option<Schema>) {
        let address = match schema {
            Some(schema) => address.with_schema(schema),
            None => address,
        };
        match to {
            Some(queue) => {
                let mut guard = self.pool.queue(queue).lock();
                guard.push_back(address);
                self.pool.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            None => {
                // Hold a queue lock so `counts` never sees the address twice.
                let _guard = self.pool.queue(self.origin).lock();
                self.pool.spent.fetch_add(1, Ordering::SeqCst);
                self.pool.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Returning unsettled proxy {} to {:?}", self.address, self.origin);
            self.finish(self.address.clone(), Some(self.origin), None);
        }
    }
}

impl fmt::Debug for Lease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("address", &self.address)
            .field("origin", &self.origin)
            .field("settled", &self.settled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn pool_with(entries: &[&str]) -> ProxyPool {
        let pool = ProxyPool::new();
        for entry in entries {
            pool.enqueue_unprocessed(ProxyAddress::new(*entry));
        }
        pool
    }

    #[test]
    fn test_promote_and_demote_keep_queues_disjoint() {
        let pool = pool_with(&["http://1.1.1.1:80", "2.2.2.2:8080", "3.3.3.3:3128"]);

        pool.dequeue_unprocessed().unwrap().promote(Schema::Http);
        pool.dequeue_unprocessed().unwrap().promote(Schema::Unknown);
        pool.dequeue_unprocessed().unwrap().demote();

        let counts = pool.counts();
        assert_eq!(counts.unprocessed, 0);
        assert_eq!(counts.ready, ReadyCounts { http: 1, https: 0, ftp: 0, unknown: 1 });
        assert_eq!(counts.broken, 1);
        assert_eq!(counts.total(), 3);

        let mut seen = HashSet::new();
        for queue in [Queue::Unprocessed, Queue::Http, Queue::Https, Queue::Ftp, Queue::Unknown, Queue::Broken] {
            for address in pool.snapshot(queue) {
                assert!(seen.insert(address.as_str().to_string()));
            }
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_promote_sets_schema() {
        let pool = pool_with(&["https://1.1.1.1:443"]);
        pool.dequeue_unprocessed().unwrap().promote(Schema::Https);
        let lease = pool.dequeue_ready(Schema::Https).unwrap();
        assert_eq!(lease.address().schema(), Some(Schema::Https));
        assert_eq!(lease.origin(), Queue::Https);
        lease.release();
    }

    #[test]
    fn test_dropped_lease_returns_to_origin() {
        let pool = pool_with(&["1.1.1.1:80"]);
        {
            let lease = pool.dequeue_unprocessed().unwrap();
            assert_eq!(pool.counts().in_flight, 1);
            drop(lease);
        }
        let counts = pool.counts();
        assert_eq!(counts.unprocessed, 1);
        assert_eq!(counts.in_flight, 0);
    }

    #[test]
    fn test_settled_lease_is_not_returned_again() {
        let pool = pool_with(&["http://1.1.1.1:80", "http://2.2.2.2:80"]);
        let first = pool.dequeue_unprocessed().unwrap();
        let second = pool.dequeue_unprocessed().unwrap();
        first.demote();
        second.promote(Schema::Http);

        let counts = pool.counts();
        assert_eq!(counts.unprocessed, 0);
        assert_eq!(counts.broken, 1);
        assert_eq!(counts.ready.http, 1);
        assert_eq!(counts.in_flight, 0);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_retire_counts_as_spent() {
        let pool = pool_with(&["http://1.1.1.1:80"]);
        pool.dequeue_unprocessed().unwrap().promote(Schema::Http);
        pool.dequeue_ready(Schema::Http).unwrap().retire();
        let counts = pool.counts();
        assert_eq!(counts.queued(), 0);
        assert_eq!(counts.spent, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_snapshot_broken_is_non_destructive() {
        let pool = pool_with(&["1.1.1.1:80", "2.2.2.2:80"]);
        pool.dequeue_unprocessed().unwrap().demote();
        pool.dequeue_unprocessed().unwrap().demote();

        let first: Vec<_> = pool.snapshot_broken().iter().map(|a| a.to_string()).collect();
        let second: Vec<_> = pool.snapshot_broken().iter().map(|a| a.to_string()).collect();
        assert_eq!(first, vec!["1.1.1.1:80", "2.2.2.2:80"]);
        assert_eq!(first, second);
        assert_eq!(pool.count_broken(), 2);
    }

    #[test]
    fn test_requeue_broken_clears_schema() {
        let pool = pool_with(&["http://1.1.1.1:80"]);
        pool.dequeue_unprocessed().unwrap().promote(Schema::Http);
        pool.dequeue_ready(Schema::Http).unwrap().demote();

        assert_eq!(pool.requeue_broken(), 1);
        assert_eq!(pool.count_broken(), 0);
        let lease = pool.dequeue_unprocessed().unwrap();
        assert_eq!(lease.address().schema(), None);
        lease.demote();
    }

    #[test]
    fn test_concurrent_push_pop_loses_nothing() {
        let pool = Arc::new(ProxyPool::new());
        let per_producer = 500;
        let producers = 4;

        std::thread::scope(|scope| {
            for p in 0..producers {
                let pool = Arc::clone(&pool);
                scope.spawn(move || {
                    for i in 0..per_producer {
                        pool.enqueue_unprocessed(ProxyAddress::new(format!("10.0.{p}.{}:80", i % 250 + 1)));
                    }
                });
            }
            for _ in 0..4 {
                let pool = Arc::clone(&pool);
                scope.spawn(move || {
                    for _ in 0..per_producer {
                        if let Some(lease) = pool.dequeue_unprocessed() {
                            lease.promote(Schema::Unknown);
                        }
                    }
                });
            }
        });

        let counts = pool.counts();
        assert_eq!(counts.in_flight, 0);
        assert_eq!(counts.total(), producers * per_producer);
        assert_eq!(counts.unprocessed + counts.ready.unknown, producers * per_producer);
    }
}
