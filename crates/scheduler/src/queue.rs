//! Three-tier in-process job queue.
//!
//! Tasks are routed to a tier by priority. Consumers always drain the highest
//! non-empty tier; inside a tier higher priorities go first, then FIFO.

use parking_lot::Mutex;
use qgjob_core::types::{JobId, Priority, QueueTier};
use qgjob_core::{QgError, QgResult};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tokio::sync::Notify;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub job_id: JobId,
    pub priority: Priority,
    seq: u64,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Tiers {
    heaps: [BinaryHeap<QueuedTask>; 3],
    seq: u64,
    closed: bool,
}

impl Tiers {
    fn pop_highest(&mut self) -> Option<QueuedTask> {
        self.heaps.iter_mut().find_map(|heap| heap.pop())
    }
}

/// Queue routing table served by `GET /queues/priority-info`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriorityInfo {
    pub priority_mapping: BTreeMap<String, QueueTier>,
    pub queue_order: Vec<QueueTier>,
    pub description: BTreeMap<QueueTier, String>,
}

pub struct PriorityQueues {
    tiers: Mutex<Tiers>,
    notify: Notify,
}

impl PriorityQueues {
    pub fn new() -> Self {
        Self {
            tiers: Mutex::new(Tiers::default()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a job. Returns the tier it was routed to.
    pub fn push(&self, job_id: JobId, priority: Priority) -> QgResult<QueueTier> {
        let tier = priority.tier();
        {
            let mut tiers = self.tiers.lock();
            if tiers.closed {
                return Err(QgError::Queue("queue is closed".to_string()));
            }
            tiers.seq += 1;
            let seq = tiers.seq;
            tiers.heaps[tier.slot()].push(QueuedTask {
                job_id,
                priority,
                seq,
            });
        }
        metrics::counter!("queue.pushed", "tier" => tier.as_str()).increment(1);
        self.notify.notify_one();
        Ok(tier)
    }

    /// Wait for the next task. Returns `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<QueuedTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut tiers = self.tiers.lock();
                if let Some(task) = tiers.pop_highest() {
                    return Some(task);
                }
                if tiers.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Reject further pushes and wake every waiting consumer.
    pub fn close(&self) {
        self.tiers.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.tiers.lock().closed
    }

    /// Pending tasks per tier.
    pub fn depth(&self) -> BTreeMap<QueueTier, usize> {
        let tiers = self.tiers.lock();
        QueueTier::ALL
            .iter()
            .map(|t| (*t, tiers.heaps[t.slot()].len()))
            .collect()
    }

    pub fn priority_info() -> PriorityInfo {
        PriorityInfo {
            priority_mapping: Priority::all_desc()
                .map(|p| (p.to_string(), p.tier()))
                .collect(),
            queue_order: QueueTier::ALL.to_vec(),
            description: QueueTier::ALL
                .iter()
                .map(|t| (*t, t.description().to_string()))
                .collect(),
        }
    }
}

impl Default for PriorityQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn p(value: i64) -> Priority {
        Priority::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_highest_tier_first_then_fifo() {
        let queues = PriorityQueues::new();
        assert_eq!(queues.push(1, p(1)).unwrap(), QueueTier::Low);
        assert_eq!(queues.push(2, p(2)).unwrap(), QueueTier::Normal);
        assert_eq!(queues.push(3, p(3)).unwrap(), QueueTier::Normal);
        assert_eq!(queues.push(4, p(4)).unwrap(), QueueTier::High);
        queues.push(5, p(3)).unwrap();

        let mut order = Vec::new();
        for _ in 0..5 {
            order.push(queues.pop().await.unwrap().job_id);
        }
        assert_eq!(order, vec![4, 3, 5, 2, 1]);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queues = Arc::new(PriorityQueues::new());
        let consumer = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queues.push(9, p(5)).unwrap();
        let task = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.map(|t| t.job_id), Some(9));
    }

    #[tokio::test]
    async fn test_close_drains_then_stops() {
        let queues = Arc::new(PriorityQueues::new());
        queues.push(1, p(1)).unwrap();
        queues.close();
        assert!(queues.push(2, p(1)).is_err());
        assert_eq!(queues.pop().await.map(|t| t.job_id), Some(1));
        assert!(queues.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumers() {
        let queues = Arc::new(PriorityQueues::new());
        let waiter = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queues.close();
        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(popped.is_none());
    }

    #[test]
    fn test_depth_and_priority_info() {
        let queues = PriorityQueues::new();
        queues.push(1, p(5)).unwrap();
        queues.push(2, p(4)).unwrap();
        assert_eq!(queues.depth()[&QueueTier::High], 2);
        assert_eq!(queues.depth()[&QueueTier::Low], 0);

        let info = PriorityQueues::priority_info();
        assert_eq!(info.priority_mapping["3"], QueueTier::Normal);
        assert_eq!(info.queue_order.first(), Some(&QueueTier::High));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json["description"]["low_priority"],
            "Background jobs (priority 1) - processed when idle"
        );
    }
}
