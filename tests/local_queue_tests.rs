//! Tests for the in-memory task queue's lease semantics.

use std::time::Duration;

use taskmill::local_queue::LocalTaskQueue;
use taskmill::queue::{QueueError, Task, TaskQueue};
use tokio::time::sleep;

fn queue_with_lease(ms: u64) -> LocalTaskQueue {
    LocalTaskQueue::new("test-queue", Duration::from_millis(ms))
}

// ============================================================================
// Basic Flow Tests
// ============================================================================

#[tokio::test]
async fn test_put_take_delete() {
    let queue = queue_with_lease(60_000);
    queue.put(Task::new("copy:alpha:images:p:content-000001"))
        .await
        .unwrap();
    assert_eq!(queue.size().await.unwrap(), 1);

    let task = queue.take().await.unwrap();
    assert_eq!(task.payload, "copy:alpha:images:p:content-000001");
    assert_eq!(task.attempts, 0);
    assert!(!task.visibility_timeout.is_zero());
    assert_eq!(queue.size().await.unwrap(), 0);

    queue.delete_task(&task).await.unwrap();
    assert_eq!(queue.completed_count().await, 1);
    assert_eq!(queue.in_flight_count().await, 0);
}

#[tokio::test]
async fn test_take_empty_times_out() {
    let queue = queue_with_lease(60_000);
    match queue.take().await {
        Err(QueueError::Timeout(_)) => {}
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_put_many_preserves_order() {
    let queue = queue_with_lease(60_000);
    queue
        .put_many(vec![Task::new("a"), Task::new("b"), Task::new("c")])
        .await
        .unwrap();
    assert_eq!(queue.size().await.unwrap(), 3);
    assert_eq!(queue.take().await.unwrap().payload, "a");
    assert_eq!(queue.take().await.unwrap().payload, "b");
    assert_eq!(queue.take().await.unwrap().payload, "c");
}

// ============================================================================
// Lease Tests
// ============================================================================

#[tokio::test]
async fn test_no_double_delivery_while_leased() {
    let queue = queue_with_lease(60_000);
    queue.put(Task::new("only")).await.unwrap();
    let _held = queue.take().await.unwrap();
    // the task is invisible until its lease lapses
    assert!(matches!(queue.take().await, Err(QueueError::Timeout(_))));
}

#[tokio::test]
async fn test_redelivery_after_lease_expiry_bumps_attempts() {
    let queue = queue_with_lease(50);
    queue.put(Task::new("flaky")).await.unwrap();
    let first = queue.take().await.unwrap();
    assert_eq!(first.attempts, 0);

    sleep(Duration::from_millis(120)).await;

    let second = queue.take().await.unwrap();
    assert_eq!(second.payload, "flaky");
    assert_eq!(second.attempts, 1);
}

#[tokio::test]
async fn test_extend_visibility_defers_redelivery() {
    let queue = queue_with_lease(80);
    queue.put(Task::new("slow")).await.unwrap();
    let task = queue.take().await.unwrap();

    // keep renewing past several lease windows
    for _ in 0..4 {
        sleep(Duration::from_millis(40)).await;
        let granted = queue
            .extend_visibility(&task, Duration::from_millis(80))
            .await
            .unwrap();
        assert_eq!(granted, Duration::from_millis(80));
    }
    assert!(matches!(queue.take().await, Err(QueueError::Timeout(_))));

    queue.delete_task(&task).await.unwrap();
    assert_eq!(queue.completed_count().await, 1);
}

#[tokio::test]
async fn test_extend_after_delete_is_not_found() {
    let queue = queue_with_lease(60_000);
    queue.put(Task::new("done")).await.unwrap();
    let task = queue.take().await.unwrap();
    queue.delete_task(&task).await.unwrap();

    match queue
        .extend_visibility(&task, Duration::from_secs(60))
        .await
    {
        Err(QueueError::TaskNotFound(payload)) => assert_eq!(payload, "done"),
        other => panic!("expected TaskNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_extend_after_expiry_is_not_found() {
    let queue = queue_with_lease(40);
    queue.put(Task::new("lapsed")).await.unwrap();
    let task = queue.take().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(matches!(
        queue.extend_visibility(&task, Duration::from_secs(60)).await,
        Err(QueueError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let queue = queue_with_lease(60_000);
    queue.put(Task::new("once")).await.unwrap();
    let task = queue.take().await.unwrap();
    queue.delete_task(&task).await.unwrap();
    queue.delete_task(&task).await.unwrap();
    assert_eq!(queue.completed_count().await, 1);
}

// ============================================================================
// Lease Ownership Tests
// ============================================================================

#[tokio::test]
async fn test_stale_extend_after_redelivery_is_not_found() {
    let queue = queue_with_lease(50);
    queue.put(Task::new("contested")).await.unwrap();
    let first_owner = queue.take().await.unwrap();

    sleep(Duration::from_millis(120)).await;
    let second_owner = queue.take().await.unwrap();
    assert_eq!(second_owner.attempts, 1);

    // the lapsed lease holder must not be able to extend the new owner's
    // lease
    match queue
        .extend_visibility(&first_owner, Duration::from_secs(60))
        .await
    {
        Err(QueueError::TaskNotFound(payload)) => assert_eq!(payload, "contested"),
        other => panic!("expected TaskNotFound, got {other:?}"),
    }
    // the current owner still can
    queue
        .extend_visibility(&second_owner, Duration::from_secs(60))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stale_delete_leaves_new_owners_lease_intact() {
    let queue = queue_with_lease(50);
    queue.put(Task::new("contested")).await.unwrap();
    let first_owner = queue.take().await.unwrap();

    sleep(Duration::from_millis(120)).await;
    let second_owner = queue.take().await.unwrap();

    // a stale delete succeeds quietly but must not count a completion or
    // release the lease now held by the second owner
    queue.delete_task(&first_owner).await.unwrap();
    assert_eq!(queue.completed_count().await, 0);
    assert_eq!(queue.in_flight_count().await, 1);

    queue.delete_task(&second_owner).await.unwrap();
    assert_eq!(queue.completed_count().await, 1);
    assert_eq!(queue.in_flight_count().await, 0);
}

#[tokio::test]
async fn test_size_counts_reclaimed_tasks() {
    let queue = queue_with_lease(40);
    queue.put(Task::new("x")).await.unwrap();
    let _taken = queue.take().await.unwrap();
    assert_eq!(queue.size().await.unwrap(), 0);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.size().await.unwrap(), 1);
}
