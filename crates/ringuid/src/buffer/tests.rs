use core::time::Duration;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    thread,
    time::Instant,
};

use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::{
    BufferPaddingExecutor, Error, PutRejection, Result, RingBuffer, WaitingTake,
    buffer::ring::padding_threshold_for,
};

/// Four consecutive ids per second: `second * 4 + sequence`.
fn four_per_second(second: u64) -> Result<Vec<u64>> {
    Ok((0..4).map(|sequence| second * 4 + sequence).collect())
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn rejects_invalid_construction() {
    assert!(matches!(
        RingBuffer::new(0, 50),
        Err(Error::InvalidConfig { .. })
    ));
    assert!(matches!(
        RingBuffer::new(12, 50),
        Err(Error::InvalidConfig { .. })
    ));
    assert!(matches!(
        RingBuffer::new(RingBuffer::MAX_BUFFER_SIZE << 1, 50),
        Err(Error::InvalidConfig { .. })
    ));
    assert!(matches!(
        RingBuffer::new(8, 0),
        Err(Error::InvalidConfig { .. })
    ));
    assert!(matches!(
        RingBuffer::new(8, 100),
        Err(Error::InvalidConfig { .. })
    ));
}

#[test]
fn padding_threshold_is_a_percentage_of_size() {
    assert_eq!(RingBuffer::new(8, 50).unwrap().padding_threshold(), 4);
    assert_eq!(RingBuffer::new(1024, 25).unwrap().padding_threshold(), 256);
    // Rounds down, but never to zero.
    assert_eq!(RingBuffer::new(2, 10).unwrap().padding_threshold(), 1);
}

#[test]
fn holds_at_most_buffer_size_ids() {
    let buffer = RingBuffer::new(4, 50).unwrap();
    assert!(buffer.is_empty());

    for uid in 0..4 {
        assert!(buffer.put(uid));
    }
    assert!(buffer.is_full());
    assert_eq!(buffer.len(), 4);

    assert!(!buffer.put(99));
    assert_eq!(buffer.len(), 4);
    assert_eq!(buffer.tail(), 4);
}

#[test]
fn take_on_empty_buffer_fails_fast() {
    let buffer = RingBuffer::new(4, 50).unwrap();

    let start = Instant::now();
    assert!(matches!(buffer.take(), Err(Error::BufferExhausted)));
    assert!(start.elapsed() < Duration::from_millis(100));
    assert!(buffer.try_take().unwrap().is_none());
    assert_eq!(buffer.cursor(), 0);
}

#[test]
fn takes_in_put_order_across_wraparound() {
    let buffer = RingBuffer::new(4, 50).unwrap();

    let mut next_put = 0;
    let mut next_take = 0;
    for _ in 0..5 {
        while buffer.put(next_put) {
            next_put += 1;
        }
        while let Some(uid) = buffer.try_take().unwrap() {
            assert_eq!(uid, next_take);
            next_take += 1;
        }
    }

    assert_eq!(next_take, 20);
    assert_eq!(buffer.tail(), 20);
    assert_eq!(buffer.cursor(), 20);
}

#[test]
fn put_batch_stops_at_first_rejected_id() {
    let rejected = Arc::new(Mutex::new(Vec::new()));
    let buffer = RingBuffer::with_handlers(
        4,
        50,
        Box::new({
            let rejected = Arc::clone(&rejected);
            move |_: &RingBuffer, uid: u64, reason: PutRejection| {
                rejected.lock().unwrap().push((uid, reason));
            }
        }),
        Box::new(crate::FailFastTake),
    )
    .unwrap();

    assert_eq!(buffer.put_batch(10..20), 4);
    assert!(!buffer.put(30));
    assert_eq!(
        *rejected.lock().unwrap(),
        [(14, PutRejection::Full), (30, PutRejection::Full)]
    );
    assert_eq!(buffer.take().unwrap(), 10);
    assert_eq!(PutRejection::Full.to_string(), "ring buffer is full");
}

#[test]
fn padding_threshold_of_largest_buffer_does_not_overflow() {
    assert_eq!(
        padding_threshold_for(RingBuffer::MAX_BUFFER_SIZE, 99),
        265_751_101
    );
    assert_eq!(padding_threshold_for(RingBuffer::MAX_BUFFER_SIZE, 1), 2_684_354);
    assert_eq!(padding_threshold_for(4, 1), 1);
}

#[test]
fn custom_take_handler_supplies_the_result() {
    let buffer = RingBuffer::with_handlers(
        4,
        50,
        Box::new(crate::DiscardPut),
        Box::new(|_: &RingBuffer| -> Result<u64> { Ok(42) }),
    )
    .unwrap();

    assert_eq!(buffer.take().unwrap(), 42);
}

#[test]
fn padding_trigger_fires_under_threshold() {
    let fired = Arc::new(AtomicUsize::new(0));
    let buffer = RingBuffer::new(8, 50).unwrap();
    assert!(buffer.set_padding_trigger({
        let fired = Arc::clone(&fired);
        move || {
            fired.fetch_add(1, Ordering::Relaxed);
        }
    }));
    assert!(!buffer.set_padding_trigger(|| {}));

    assert_eq!(buffer.put_batch(0..8), 8);

    // 7, 6, 5, 4 remaining: at or above the threshold of 4.
    for _ in 0..4 {
        buffer.take().unwrap();
    }
    assert_eq!(fired.load(Ordering::Relaxed), 0);

    buffer.take().unwrap();
    assert_eq!(fired.load(Ordering::Relaxed), 1);

    for _ in 0..3 {
        buffer.take().unwrap();
    }
    assert_eq!(fired.load(Ordering::Relaxed), 4);

    // Empty takes also ask for padding.
    assert!(buffer.take().is_err());
    assert_eq!(fired.load(Ordering::Relaxed), 5);
}

#[test]
fn concurrent_takes_hand_out_each_id_once() {
    const SIZE: usize = 1024;
    const THREADS: usize = 8;

    let buffer = RingBuffer::new(SIZE, 50).unwrap();
    assert_eq!(buffer.put_batch(0..SIZE as u64), SIZE);

    let taken: Vec<Vec<u64>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    let mut ids = Vec::new();
                    while let Some(uid) = buffer.try_take().unwrap() {
                        ids.push(uid);
                    }
                    ids
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let all: HashSet<u64> = taken.iter().flatten().copied().collect();
    assert_eq!(taken.iter().map(Vec::len).sum::<usize>(), SIZE);
    assert_eq!(all.len(), SIZE);
    assert!(buffer.is_empty());
}

#[test]
fn producer_and_consumers_exchange_every_id() {
    const TOTAL: u64 = 50_000;
    const CONSUMERS: usize = 4;

    let buffer = RingBuffer::new(64, 50).unwrap();
    let consumed = AtomicU64::new(0);

    let taken: Vec<Vec<u64>> = thread::scope(|s| {
        s.spawn(|| {
            for uid in 0..TOTAL {
                while !buffer.put(uid) {
                    thread::yield_now();
                }
            }
        });

        let handles: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                s.spawn(|| {
                    let mut ids = Vec::new();
                    while consumed.load(Ordering::Acquire) < TOTAL {
                        match buffer.try_take().unwrap() {
                            Some(uid) => {
                                ids.push(uid);
                                consumed.fetch_add(1, Ordering::AcqRel);
                            }
                            None => thread::yield_now(),
                        }
                    }
                    ids
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let all: HashSet<u64> = taken.iter().flatten().copied().collect();
    assert_eq!(all.len() as u64, TOTAL);
    assert!(buffer.is_empty());
}

#[test]
fn waiting_take_times_out_on_empty_buffer() {
    let buffer = RingBuffer::with_handlers(
        4,
        50,
        Box::new(crate::DiscardPut),
        Box::new(WaitingTake::new(Duration::from_millis(20))),
    )
    .unwrap();

    let start = Instant::now();
    assert!(matches!(buffer.take(), Err(Error::BufferExhausted)));
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[test]
fn waiting_take_returns_late_id() {
    let buffer = RingBuffer::with_handlers(
        4,
        50,
        Box::new(crate::DiscardPut),
        Box::new(WaitingTake::new(Duration::from_secs(5))),
    )
    .unwrap();

    let uid = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            assert!(buffer.put(7));
        });
        buffer.take()
    });
    assert_eq!(uid.unwrap(), 7);
}

#[test]
fn padding_fills_buffer_from_following_seconds() {
    let buffer = Arc::new(RingBuffer::new(16, 50).unwrap());
    let executor = BufferPaddingExecutor::new(Arc::clone(&buffer), four_per_second, 10);

    assert_eq!(executor.padding_buffer().unwrap(), 16);
    assert!(buffer.is_full());
    assert_eq!(executor.last_second(), 14);

    let taken: Vec<u64> = (0..16).map(|_| buffer.take().unwrap()).collect();
    assert_eq!(taken, (44..60).collect::<Vec<_>>());
}

#[test]
fn padding_full_buffer_is_a_no_op() {
    let buffer = Arc::new(RingBuffer::new(8, 50).unwrap());
    let executor = BufferPaddingExecutor::new(Arc::clone(&buffer), four_per_second, 0);

    assert_eq!(executor.padding_buffer().unwrap(), 8);
    assert_eq!(executor.padding_buffer().unwrap(), 0);
    assert_eq!(executor.last_second(), 2);
}

#[test]
fn padding_stops_on_partially_stored_second() {
    let buffer = Arc::new(RingBuffer::new(8, 50).unwrap());
    let executor = BufferPaddingExecutor::new(
        Arc::clone(&buffer),
        |second: u64| -> Result<Vec<u64>> { Ok((0..3).map(|s| second * 3 + s).collect()) },
        0,
    );

    assert_eq!(executor.padding_buffer().unwrap(), 8);
    assert_eq!(executor.last_second(), 3);
    assert!(buffer.is_full());
}

#[test]
fn padding_propagates_provider_errors() {
    let buffer = Arc::new(RingBuffer::new(16, 50).unwrap());
    let executor = BufferPaddingExecutor::new(
        Arc::clone(&buffer),
        |second: u64| {
            if second > 2 {
                return Err(Error::TimestampExhausted {
                    delta_seconds: second,
                    max_delta_seconds: 2,
                });
            }
            four_per_second(second)
        },
        0,
    );

    assert!(matches!(
        executor.padding_buffer(),
        Err(Error::TimestampExhausted { delta_seconds: 3, .. })
    ));
    assert_eq!(buffer.len(), 8);
    assert!(!executor.is_running());
    assert!(matches!(
        executor.fatal_error(),
        Some(Error::TimestampExhausted { delta_seconds: 3, .. })
    ));

    // Later passes repeat the fatal error without asking for more seconds.
    buffer.take().unwrap();
    assert!(matches!(
        executor.padding_buffer(),
        Err(Error::TimestampExhausted { delta_seconds: 3, .. })
    ));
    assert_eq!(executor.last_second(), 3);
    assert_eq!(buffer.len(), 7);
}

#[test]
fn transient_provider_errors_do_not_stop_padding() {
    let fail_once = AtomicBool::new(true);
    let buffer = Arc::new(RingBuffer::new(8, 50).unwrap());
    let executor = BufferPaddingExecutor::new(
        Arc::clone(&buffer),
        move |second: u64| {
            if fail_once.swap(false, Ordering::AcqRel) {
                return Err(Error::SequenceExhausted { second });
            }
            four_per_second(second)
        },
        0,
    );

    assert!(matches!(
        executor.padding_buffer(),
        Err(Error::SequenceExhausted { second: 1 })
    ));
    assert!(executor.fatal_error().is_none());
    assert_eq!(executor.padding_buffer().unwrap(), 8);
    assert!(buffer.is_full());
}

#[test]
fn concurrent_padding_passes_collapse_into_one() {
    let release = Arc::new(AtomicBool::new(false));
    let buffer = Arc::new(RingBuffer::new(2, 50).unwrap());
    let executor = BufferPaddingExecutor::new(
        Arc::clone(&buffer),
        {
            let release = Arc::clone(&release);
            move |second: u64| -> Result<Vec<u64>> {
                while !release.load(Ordering::Acquire) {
                    thread::yield_now();
                }
                Ok(vec![second])
            }
        },
        0,
    );

    let padded = thread::scope(|s| {
        let first = s.spawn(|| executor.padding_buffer());
        assert!(wait_until(Duration::from_secs(5), || executor.is_running()));

        assert_eq!(executor.padding_buffer().unwrap(), 0);

        release.store(true, Ordering::Release);
        first.join().unwrap()
    });

    assert_eq!(padded.unwrap(), 2);
    assert!(!executor.is_running());
}

#[test]
fn worker_refills_after_threshold_is_crossed() {
    let buffer = Arc::new(RingBuffer::new(8, 50).unwrap());
    let executor = BufferPaddingExecutor::new(Arc::clone(&buffer), four_per_second, 0);
    executor.padding_buffer().unwrap();
    executor.start(None).unwrap();

    let mut seen: HashSet<u64> = (0..5).map(|_| buffer.take().unwrap()).collect();
    assert!(wait_until(Duration::from_secs(5), || buffer.is_full()));
    assert!(executor.last_second() > 2);

    executor.shutdown();
    while let Some(uid) = buffer.try_take().unwrap() {
        assert!(seen.insert(uid));
    }
    assert_eq!(seen.len(), 13);
}

#[test]
fn scheduler_pads_without_takes() {
    let buffer = Arc::new(RingBuffer::new(8, 50).unwrap());
    let executor = BufferPaddingExecutor::new(Arc::clone(&buffer), four_per_second, 0);
    executor.start(Some(Duration::from_millis(10))).unwrap();

    assert!(wait_until(Duration::from_secs(5), || buffer.is_full()));
    executor.shutdown();
}

#[test]
fn shutdown_stops_background_padding() {
    let buffer = Arc::new(RingBuffer::new(8, 50).unwrap());
    let executor = BufferPaddingExecutor::new(Arc::clone(&buffer), four_per_second, 0);
    executor.padding_buffer().unwrap();
    executor.start(Some(Duration::from_millis(5))).unwrap();

    executor.shutdown();
    executor.shutdown();
    // Restarting a stopped executor does nothing.
    executor.start(None).unwrap();

    while buffer.try_take().unwrap().is_some() {}
    thread::sleep(Duration::from_millis(50));
    assert!(buffer.is_empty());
    assert_eq!(executor.padding_buffer().unwrap(), 0);
}
