// Playback scheduling tests
//
// The queue chains decoded fragments back-to-back on the output clock with
// no gap and no overlap, clamped so nothing is scheduled in the past.

use janmitra_voice::audio::{ManualClock, NullSink, PlaybackBuffer, PlaybackQueue};

/// A silent buffer of the given duration at the 24kHz output rate
fn buffer_ms(ms: u32) -> PlaybackBuffer {
    PlaybackBuffer {
        samples: vec![0.0; (24_000 * ms / 1000) as usize],
        sample_rate: 24_000,
    }
}

#[test]
fn test_fragments_chain_back_to_back() {
    let clock = ManualClock::new();
    let mut queue = PlaybackQueue::new(Box::new(NullSink::new(clock)));

    // Three 100ms fragments arriving instantly: each starts exactly where
    // the previous one ends
    let first = queue.schedule(buffer_ms(100)).unwrap();
    let second = queue.schedule(buffer_ms(100)).unwrap();
    let third = queue.schedule(buffer_ms(100)).unwrap();

    assert_eq!(first, 0.0);
    assert!((second - 0.1).abs() < 1e-9);
    assert!((third - 0.2).abs() < 1e-9);
    assert!((queue.cursor() - 0.3).abs() < 1e-9);
}

#[test]
fn test_late_fragment_clamps_to_now() {
    let clock = ManualClock::new();
    let mut queue = PlaybackQueue::new(Box::new(NullSink::new(clock.clone())));

    queue.schedule(buffer_ms(100)).unwrap();

    // The stream stalls and the clock runs past the queued audio; the gap is
    // audible by design, but the next fragment must not start in the past
    clock.set(0.5);

    let start = queue.schedule(buffer_ms(100)).unwrap();
    assert!((start - 0.5).abs() < 1e-9);
    assert!((queue.cursor() - 0.6).abs() < 1e-9);
}

#[test]
fn test_start_times_never_precede_the_clock() {
    let clock = ManualClock::new();
    let mut queue = PlaybackQueue::new(Box::new(NullSink::new(clock.clone())));

    let mut previous_end = 0.0;
    for (i, now) in [0.0, 0.05, 0.4, 0.41].into_iter().enumerate() {
        clock.set(now);
        let start = queue.schedule(buffer_ms(100)).unwrap();

        assert!(start >= now, "fragment {} scheduled in the past", i);
        assert!(start >= previous_end, "fragment {} overlaps its predecessor", i);
        previous_end = start + 0.1;
    }
}

#[test]
fn test_finished_sources_leave_the_active_set() {
    let clock = ManualClock::new();
    let mut queue = PlaybackQueue::new(Box::new(NullSink::new(clock.clone())));

    queue.schedule(buffer_ms(100)).unwrap();
    queue.schedule(buffer_ms(100)).unwrap();
    assert_eq!(queue.active_count(), 2);

    // The first buffer plays out at 0.1, the second at 0.2
    clock.set(0.15);
    assert_eq!(queue.active_count(), 1);

    clock.set(0.25);
    assert_eq!(queue.active_count(), 0);
}

#[test]
fn test_clear_empties_set_and_resets_cursor() {
    let clock = ManualClock::new();
    let mut queue = PlaybackQueue::new(Box::new(NullSink::new(clock.clone())));

    queue.schedule(buffer_ms(100)).unwrap();
    queue.schedule(buffer_ms(100)).unwrap();
    assert!(queue.cursor() > 0.0);
    assert_eq!(queue.active_count(), 2);

    // Barge-in: everything queued or playing is discarded immediately
    queue.clear();

    assert_eq!(queue.active_count(), 0);
    assert_eq!(queue.cursor(), 0.0);
}

#[test]
fn test_schedule_resumes_cleanly_after_clear() {
    let clock = ManualClock::new();
    let mut queue = PlaybackQueue::new(Box::new(NullSink::new(clock.clone())));

    queue.schedule(buffer_ms(100)).unwrap();
    queue.clear();

    clock.set(1.0);
    let start = queue.schedule(buffer_ms(100)).unwrap();

    assert!((start - 1.0).abs() < 1e-9);
    assert_eq!(queue.active_count(), 1);
}

#[test]
fn test_clear_on_empty_queue_is_harmless() {
    let clock = ManualClock::new();
    let mut queue = PlaybackQueue::new(Box::new(NullSink::new(clock)));

    queue.clear();
    queue.clear();

    assert_eq!(queue.active_count(), 0);
    assert_eq!(queue.cursor(), 0.0);
}
