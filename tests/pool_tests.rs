use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use jobpool::{
    CancellationToken, ExecutionPool, Job, JobError, JobSettings, Progress, Status, StatusKind,
};

const WAIT: Duration = Duration::from_secs(10);

fn terminal_channel<T: Clone + Send + 'static>(
    tx: &mpsc::Sender<Status<T>>,
) -> impl Fn(&Status<T>) + Send + Sync + 'static {
    let tx = Mutex::new(tx.clone());
    move |status: &Status<T>| {
        if status.is_done() {
            let _ = tx.lock().unwrap().send(status.clone());
        }
    }
}

#[tokio::test]
async fn mixed_jobs_all_reach_a_result() {
    let pool = ExecutionPool::new(2);
    pool.start().unwrap();

    let (tx, rx) = mpsc::channel::<Status<String>>();
    let j1 = pool.execute_with_callback(
        JobSettings::named("J1"),
        |_| {
            thread::sleep(Duration::from_millis(100));
            Ok("A".to_string())
        },
        terminal_channel(&tx),
    );
    let j2 = pool.execute_with_callback(
        JobSettings::named("J2"),
        |_| {
            thread::sleep(Duration::from_millis(50));
            Ok("B".to_string())
        },
        terminal_channel(&tx),
    );
    let j3: Arc<Job<String>> = pool.execute_with_callback(
        JobSettings::named("J3"),
        |_| anyhow::bail!("E"),
        terminal_channel(&tx),
    );

    // J2 and J3 share a slot and finish well before J1; stop while J1 runs.
    for _ in 0..2 {
        rx.recv_timeout(WAIT).unwrap();
    }
    pool.stop_and_wait().await;
    assert!(j1.status().is_done());
    assert!(j3.status().is_done());

    match j1.status() {
        Status::DoneWithResult { result, duration } => {
            assert_eq!(result.unwrap(), "A");
            assert!(duration >= Duration::from_millis(100));
        }
        other => panic!("J1 ended as {other:?}"),
    }
    assert_eq!(j2.status().result().unwrap().as_ref().unwrap(), "B");
    match j3.status().result() {
        Some(Err(err @ JobError::Failed(_))) => assert_eq!(err.to_string(), "E"),
        other => panic!("J3 ended with {other:?}"),
    }
}

#[tokio::test]
async fn stop_and_wait_lets_running_jobs_finish() {
    let pool = ExecutionPool::new(1);
    pool.start().unwrap();

    let (running_tx, running_rx) = mpsc::channel();
    let running_tx = Mutex::new(running_tx);
    let job = pool.execute_with_callback(
        JobSettings::default(),
        |_| {
            thread::sleep(Duration::from_millis(80));
            Ok(())
        },
        move |status: &Status<()>| {
            if status.kind() == StatusKind::Running {
                let _ = running_tx.lock().unwrap().send(());
            }
        },
    );
    running_rx.recv_timeout(WAIT).unwrap();

    pool.stop_and_wait().await;
    assert!(job.status().is_done());
    assert!(!pool.is_running());
}

#[test]
fn stopped_pool_leaves_queued_jobs_queued() {
    let pool = ExecutionPool::new(1);
    pool.start().unwrap();
    pool.shutdown();

    let job = pool.execute(JobSettings::default(), |_| Ok(1));
    assert_eq!(pool.queued(), 1);
    assert_eq!(job.status(), Status::ReadyToRun);

    pool.start().unwrap();
    assert!(job.wait_timeout(WAIT).is_some());
    pool.shutdown();
}

#[test]
fn observed_statuses_never_regress() {
    let pool = ExecutionPool::new(4);
    pool.start().unwrap();

    let tracked: Vec<_> = (0..20)
        .map(|i| {
            let seen = Arc::new(Mutex::new(vec![StatusKind::ReadyToRun]));
            let sink = Arc::clone(&seen);
            let job = pool.execute_with_callback(
                JobSettings::default(),
                move |ctx| {
                    for pct in [10, 40, 40, 90, 100] {
                        ctx.report(Some(Duration::from_millis(5)), pct);
                    }
                    if i % 3 == 0 {
                        anyhow::bail!("job {i} failed");
                    }
                    Ok(i)
                },
                move |status: &Status<i32>| sink.lock().unwrap().push(status.kind()),
            );
            (job, seen)
        })
        .collect();

    for (job, _) in &tracked {
        assert!(job.wait_timeout(WAIT).is_some());
    }
    // Joining the workers guarantees every callback has returned.
    pool.shutdown();

    for (_, history) in tracked {
        let history = history.lock().unwrap();
        assert!(
            history.windows(2).all(|w| w[0].rank() <= w[1].rank()),
            "regression in {history:?}"
        );
        assert_eq!(history.iter().filter(|k| k.is_terminal()).count(), 1);
        assert!(history.last().unwrap().is_terminal());
    }
}

#[test]
fn a_job_queued_twice_runs_once() {
    let pool = ExecutionPool::new(4);
    let runs = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&runs);
    let job = Arc::new(Job::new(JobSettings::default(), move |_| {
        *counter.lock().unwrap() += 1;
        thread::sleep(Duration::from_millis(20));
        Ok(())
    }));
    let rx = job.subscribe_channel();

    pool.submit(Arc::clone(&job));
    pool.submit(Arc::clone(&job));
    pool.submit(Arc::clone(&job));
    pool.start().unwrap();

    job.wait_timeout(WAIT).unwrap();
    while pool.queued() > 0 {
        thread::sleep(Duration::from_millis(5));
    }
    pool.shutdown();

    assert_eq!(*runs.lock().unwrap(), 1);
    let running = rx
        .try_iter()
        .filter(|status| status.kind() == StatusKind::Running)
        .count();
    assert_eq!(running, 1);
}

#[test]
fn idle_pool_picks_up_late_submissions() {
    let pool = ExecutionPool::new(3);
    pool.start().unwrap();

    let mut jobs = Vec::new();
    for round in 0..5 {
        // Let every worker reach its paused phase.
        thread::sleep(Duration::from_millis(20));
        for i in 0..4 {
            jobs.push(pool.execute(JobSettings::default(), move |_| Ok(round * 10 + i)));
        }
    }

    for job in &jobs {
        assert!(job.wait_timeout(WAIT).is_some(), "job {} never finished", job.id());
    }
    pool.shutdown();
}

#[test]
fn failing_and_panicking_jobs_do_not_stop_the_pool() {
    let pool = ExecutionPool::new(1);
    pool.start().unwrap();

    let failing: Arc<Job<u8>> = pool.execute(JobSettings::default(), |_| anyhow::bail!("nope"));
    let panicking: Arc<Job<u8>> =
        pool.execute(JobSettings::default(), |_| panic!("worker must survive this"));
    let healthy = pool.execute(JobSettings::default(), |_| Ok(9_u8));

    assert!(matches!(
        failing.wait_timeout(WAIT).unwrap().result(),
        Some(Err(JobError::Failed(_)))
    ));
    assert!(matches!(
        panicking.wait_timeout(WAIT).unwrap().result(),
        Some(Err(JobError::Panicked(_)))
    ));
    assert!(matches!(
        healthy.wait_timeout(WAIT).unwrap().result(),
        Some(Ok(9))
    ));
    pool.shutdown();
}

#[test]
fn create_new_consumes_jobs_from_the_original() {
    let original = ExecutionPool::new(1);
    let queued: Vec<_> = (0..6)
        .map(|i| original.execute(JobSettings::default(), move |_| Ok(i)))
        .collect();

    let resized = original.create_new(3);
    resized.start().unwrap();
    for job in &queued {
        assert!(job.wait_timeout(WAIT).is_some());
    }
    resized.shutdown();

    // And the other way round.
    let back = resized.execute(JobSettings::default(), |_| Ok(100));
    original.start().unwrap();
    assert!(back.wait_timeout(WAIT).is_some());
    original.shutdown();
}

#[test]
fn sibling_pool_wakes_for_jobs_submitted_to_the_original() {
    let original = ExecutionPool::new(1);
    let resized = original.create_new(2);
    let idle = resized.subscribe_channel();
    resized.start().unwrap();

    // Let the resized pool's workers drain the empty queue and pause.
    thread::sleep(Duration::from_millis(100));
    assert!(idle.try_recv().is_err());

    let job = original.execute(JobSettings::named("late"), |_| Ok("picked up"));
    let status = job.wait_timeout(WAIT).expect("sibling workers never woke");
    assert!(matches!(status.result(), Some(Ok("picked up"))));
    assert_eq!(original.queued(), 0);

    let picked = idle.recv_timeout(WAIT).unwrap();
    assert_eq!(picked.job.map(|j| j.id), Some(job.id()));
    resized.shutdown();
}

#[test]
fn panicking_status_callback_does_not_starve_the_pool() {
    let pool = ExecutionPool::new(1);
    pool.start().unwrap();

    let bad = pool.execute_with_callback(
        JobSettings::default(),
        |_| Ok(1),
        |status: &Status<i32>| {
            if status.kind() == StatusKind::Running {
                panic!("callback bug");
            }
        },
    );
    let next = pool.execute(JobSettings::default(), |_| Ok(2));

    assert!(matches!(bad.wait_timeout(WAIT).unwrap().result(), Some(Ok(1))));
    assert!(matches!(next.wait_timeout(WAIT).unwrap().result(), Some(Ok(2))));
    assert_eq!(pool.queued(), 0);
    pool.shutdown();
}

#[test]
fn progress_source_reports_alongside_status() {
    let pool = ExecutionPool::new(1);
    pool.start().unwrap();

    let progress = Progress::new(3);
    let snapshots = progress.subscribe_channel();
    let job = pool.execute(
        JobSettings::default().with_progress(progress.source()),
        |ctx| {
            for i in 0..5 {
                ctx.progress().step(Some(format!("chunk {i}").as_str()), None);
            }
            Ok(())
        },
    );
    job.wait_timeout(WAIT).unwrap();
    pool.shutdown();

    let steps: Vec<u32> = snapshots.try_iter().map(|s| s.steps).collect();
    assert_eq!(steps, vec![1, 2, 3, 3, 3]);
    assert_eq!(progress.steps(), 3);
    assert_eq!(progress.snapshot().status.as_deref(), Some("chunk 4"));
    // The coarse status never saw a progress report.
    assert!(!job.history().contains(&StatusKind::RunningWithProgress));
}

#[test]
fn cancellation_is_left_to_the_job() {
    let pool = ExecutionPool::new(1);
    pool.start().unwrap();

    let token = CancellationToken::new();
    let (started_tx, started_rx) = mpsc::channel();
    let job = pool.execute(
        JobSettings::default().with_cancellation(token.clone()),
        move |ctx| {
            let _ = started_tx.send(());
            let mut polls = 0;
            while !ctx.is_cancelled() {
                polls += 1;
                thread::sleep(Duration::from_millis(2));
            }
            Ok(polls)
        },
    );

    started_rx.recv_timeout(WAIT).unwrap();
    assert!(job.status().is_running());
    token.cancel();

    let status = job.wait_timeout(WAIT).unwrap();
    assert!(matches!(status.result(), Some(Ok(_))));
    pool.shutdown();
}
