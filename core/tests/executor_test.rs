use std::time::Duration;

use crossbeam::channel::unbounded;
use engramic_core::executor::{BoxFuture, Executor};
use engramic_core::EngramError;

fn new_executor() -> (Executor, crossbeam::channel::Receiver<EngramError>) {
    let (tx, rx) = unbounded();
    (Executor::new(tx).unwrap(), rx)
}

#[tokio::test]
async fn run_task_returns_the_result() {
    let (executor, _errors) = new_executor();

    let handle = executor.run_task(async { Ok(21 * 2) });
    assert_eq!(handle.join().await.unwrap(), 42);

    executor.stop();
}

#[tokio::test]
async fn run_tasks_gathers_by_name_and_keeps_order() {
    let (executor, _errors) = new_executor();

    let tasks: Vec<(String, BoxFuture<u64>)> = (0..4)
        .map(|n| {
            let fut: BoxFuture<u64> = Box::pin(async move { Ok(n * 10) });
            ("batch".to_string(), fut)
        })
        .collect();

    let mut gathered = executor.run_tasks(tasks).join().await.unwrap();
    let results: Vec<u64> = gathered
        .take("batch")
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(results, vec![0, 10, 20, 30]);

    executor.stop();
}

#[tokio::test]
async fn a_failing_task_does_not_kill_its_siblings() {
    let (executor, _errors) = new_executor();

    let ok: BoxFuture<&'static str> = Box::pin(async { Ok("fine") });
    let bad: BoxFuture<&'static str> =
        Box::pin(async { Err(EngramError::Backend("boom".to_string())) });

    let mut gathered = executor
        .run_tasks(vec![("ok".to_string(), ok), ("bad".to_string(), bad)])
        .join()
        .await
        .unwrap();

    assert_eq!(gathered.take_one("ok").unwrap(), "fine");
    assert!(gathered.take_one("bad").is_err());

    executor.stop();
}

#[tokio::test]
async fn background_failures_land_on_the_exception_queue() {
    let (executor, errors) = new_executor();

    executor.run_background(async { Err(EngramError::Invariant("logic bug".to_string())) });

    let err = errors
        .recv_timeout(Duration::from_secs(5))
        .expect("background error reported");
    assert!(matches!(err, EngramError::Invariant(_)));

    executor.stop();
}

#[tokio::test]
async fn blocking_runs_off_the_cooperative_loop() {
    let (executor, _errors) = new_executor();

    let value = executor
        .blocking(|| {
            std::thread::sleep(Duration::from_millis(10));
            Ok("done")
        })
        .await
        .unwrap();
    assert_eq!(value, "done");

    executor.stop();
}

#[test]
fn stop_joins_the_worker_thread() {
    let (executor, _errors) = new_executor();
    executor.run_background(async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    });
    // Outstanding work is cancelled, not waited for.
    executor.stop();
}
