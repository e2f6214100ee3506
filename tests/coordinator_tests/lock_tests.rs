//! Tests for resource locks and session queues
//!
//! These tests verify:
//! - Exclusive locks exclude everyone, shared locks coexist
//! - Locks are released when the guard drops
//! - Overlapping plans acquired from many threads never deadlock
//! - Session queues run items strictly in push order

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use mpdb::coordinator::{CommandQueue, LockTable, QueueRegistry};
use mpdb::protocol::{lock_plan, Access, Resource, ResourceId};

// =============================================================================
// Helper Functions
// =============================================================================

fn exclusive(id: ResourceId) -> Vec<Resource> {
    lock_plan([Resource::exclusive(id)])
}

fn shared(id: ResourceId) -> Vec<Resource> {
    lock_plan([Resource::shared(id)])
}

// =============================================================================
// Lock Table Tests
// =============================================================================

#[test]
fn test_guard_reports_sorted_plan() {
    let table = LockTable::new();

    let guard = table.acquire(vec![
        Resource::exclusive(ResourceId::database("zeta")),
        Resource::shared(ResourceId::root()),
        Resource::shared(ResourceId::database("alpha")),
        Resource::exclusive(ResourceId::database("alpha")),
    ]);

    let held: Vec<(String, Access)> = guard
        .resources()
        .into_iter()
        .map(|r| (r.id.as_str().to_string(), r.access))
        .collect();
    assert_eq!(
        held,
        vec![
            (String::new(), Access::Shared),
            ("alpha".to_string(), Access::Exclusive),
            ("zeta".to_string(), Access::Exclusive),
        ]
    );
    assert_eq!(table.len(), 3);
}

#[test]
fn test_exclusive_blocks_until_released() {
    let table = Arc::new(LockTable::new());
    let guard = table.acquire(exclusive(ResourceId::collection("users", "admins")));
    let (tx, rx) = channel::unbounded();

    let waiter = {
        let table = Arc::clone(&table);
        thread::spawn(move || {
            let _guard = table.acquire(shared(ResourceId::document("users", "admins", "d1")));
            tx.send(()).unwrap();
        })
    };

    // The reader needs users/admins shared, which the writer holds
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    drop(guard);
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    waiter.join().unwrap();
}

#[test]
fn test_waiting_writer_goes_before_later_readers() {
    let table = Arc::new(LockTable::new());
    let first_reader = table.acquire(shared(ResourceId::database("users")));
    let (tx, rx) = channel::unbounded();

    let writer = {
        let table = Arc::clone(&table);
        let tx = tx.clone();
        thread::spawn(move || {
            let _guard = table.acquire(exclusive(ResourceId::database("users")));
            tx.send("writer").unwrap();
            thread::sleep(Duration::from_millis(50));
        })
    };
    thread::sleep(Duration::from_millis(100));

    let reader = {
        let table = Arc::clone(&table);
        thread::spawn(move || {
            let _guard = table.acquire(shared(ResourceId::database("users")));
            tx.send("reader").unwrap();
        })
    };

    // Neither gets in while the first reader holds users
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    drop(first_reader);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "writer");
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "reader");
    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_shared_locks_coexist() {
    let table = Arc::new(LockTable::new());
    let _first = table.acquire(shared(ResourceId::collection("users", "admins")));

    let (tx, rx) = channel::unbounded();
    let table2 = Arc::clone(&table);
    let reader = thread::spawn(move || {
        let _second = table2.acquire(shared(ResourceId::collection("users", "admins")));
        tx.send(()).unwrap();
    });

    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    reader.join().unwrap();
}

#[test]
fn test_disjoint_writers_do_not_block() {
    let table = Arc::new(LockTable::new());
    let _users = table.acquire(exclusive(ResourceId::database("users")));

    let (tx, rx) = channel::unbounded();
    let table2 = Arc::clone(&table);
    let writer = thread::spawn(move || {
        let _shop = table2.acquire(exclusive(ResourceId::database("shop")));
        tx.send(()).unwrap();
    });

    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    writer.join().unwrap();
}

#[test]
fn test_exclusive_is_mutually_exclusive() {
    let table = Arc::new(LockTable::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let table = Arc::clone(&table);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            thread::spawn(move || {
                for _ in 0..50 {
                    let _guard = table.acquire(exclusive(ResourceId::collection("users", "admins")));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
}

#[test]
fn test_overlapping_plans_never_deadlock() {
    let table = Arc::new(LockTable::new());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let completed = Arc::new(AtomicUsize::new(0));

    // Each thread requests the same resources in a different order and mode
    let ids = [
        ResourceId::database("a"),
        ResourceId::collection("a", "x"),
        ResourceId::document("a", "x", "1"),
        ResourceId::database("b"),
        ResourceId::collection("b", "y"),
        ResourceId::root(),
    ];

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            let completed = Arc::clone(&completed);
            let ids = ids.clone();
            thread::spawn(move || {
                barrier.wait();
                for round in 0..200 {
                    let mut requests: Vec<Resource> = ids
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| (i + t + round) % 3 != 0)
                        .map(|(i, id)| {
                            if (i + round) % 2 == t % 2 {
                                Resource::exclusive(id.clone())
                            } else {
                                Resource::shared(id.clone())
                            }
                        })
                        .collect();
                    if t % 2 == 1 {
                        requests.reverse();
                    }
                    let _guard = table.acquire(lock_plan(requests));
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(60);
    for handle in handles {
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "lock acquisition deadlocked");
            thread::sleep(Duration::from_millis(10));
        }
        handle.join().unwrap();
    }
    assert_eq!(completed.load(Ordering::SeqCst), threads * 200);
}

// =============================================================================
// Queue Tests
// =============================================================================

#[test]
fn test_queue_drains_in_push_order() {
    let queue = CommandQueue::new();
    for i in 0..5 {
        queue.push(i);
    }
    assert_eq!(queue.len(), 5);

    let mut seen = Vec::new();
    queue.drain(|item| seen.push(item));

    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert!(queue.is_empty());
}

#[test]
fn test_concurrent_drainers_keep_order() {
    let queue = Arc::new(CommandQueue::new());
    let processed = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let queue = Arc::clone(&queue);
            let processed = Arc::clone(&processed);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            thread::spawn(move || {
                for i in 0..25 {
                    queue.push((t, i));
                    queue.drain(|item| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        processed.lock().push(item);
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    let processed = processed.lock();
    assert_eq!(processed.len(), 100);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    for t in 0..4 {
        let order: Vec<i32> = processed.iter().filter(|(p, _)| *p == t).map(|(_, i)| *i).collect();
        assert_eq!(order, (0..25).collect::<Vec<_>>());
    }
    assert!(queue.is_empty());
}

#[test]
fn test_registry_per_session() {
    let registry: QueueRegistry<u32> = QueueRegistry::new();

    let a = registry.get(1);
    let again = registry.get(1);
    let b = registry.get(2);
    a.push(7);

    assert!(Arc::ptr_eq(&a, &again));
    assert!(b.is_empty());
    assert_eq!(registry.len(), 2);
    assert!(registry.remove(1));
    assert!(!registry.remove(1));
    assert_eq!(registry.len(), 1);
}
