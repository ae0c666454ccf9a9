//! Weighted fair dispatch, admission caps, coalescing and stale drops.

use std::sync::atomic::AtomicBool;

use betterspotlight_indexer::{PipelineLane, PipelineScheduler, SchedulerConfig};
use rstest::rstest;

fn flags() -> (AtomicBool, AtomicBool) {
    (AtomicBool::new(false), AtomicBool::new(false))
}

#[test]
fn fairness_over_100_dispatches_with_both_lanes_saturated() {
    let scheduler = PipelineScheduler::new(SchedulerConfig {
        live_lane_cap: 200,
        rebuild_lane_cap: 200,
        live_dispatch_ratio_pct: 70,
    });
    for i in 0..100 {
        assert!(scheduler.enqueue(&format!("/live/{i}"), PipelineLane::Live));
        assert!(scheduler.enqueue(&format!("/rebuild/{i}"), PipelineLane::Rebuild));
    }

    let (stopping, paused) = flags();
    let mut live = 0;
    for _ in 0..100 {
        let item = scheduler.dequeue_blocking(&stopping, &paused).unwrap();
        if item.lane == PipelineLane::Live {
            live += 1;
        }
    }
    assert!((65..=75).contains(&live), "live share was {live}");
}

#[rstest]
#[case(30)]
#[case(50)]
#[case(90)]
fn fairness_tracks_configured_ratio(#[case] ratio: u64) {
    let scheduler = PipelineScheduler::new(SchedulerConfig {
        live_lane_cap: 300,
        rebuild_lane_cap: 300,
        live_dispatch_ratio_pct: ratio,
    });
    for i in 0..200 {
        scheduler.enqueue(&format!("/live/{i}"), PipelineLane::Live);
        scheduler.enqueue(&format!("/rebuild/{i}"), PipelineLane::Rebuild);
    }
    let (stopping, paused) = flags();
    let mut live: u64 = 0;
    for _ in 0..100 {
        if scheduler
            .dequeue_blocking(&stopping, &paused)
            .unwrap()
            .lane
            == PipelineLane::Live
        {
            live += 1;
        }
    }
    assert!(
        live.abs_diff(ratio) <= 5,
        "ratio {ratio}: live share was {live}"
    );
}

#[test]
fn empty_lane_drains_the_other_without_cycle_consumption() {
    let scheduler = PipelineScheduler::new(SchedulerConfig::default());
    for i in 0..10 {
        scheduler.enqueue(&format!("/rebuild/{i}"), PipelineLane::Rebuild);
    }
    let (stopping, paused) = flags();
    for _ in 0..10 {
        let item = scheduler.dequeue_blocking(&stopping, &paused).unwrap();
        assert_eq!(item.lane, PipelineLane::Rebuild);
    }
    let stats = scheduler.stats();
    assert_eq!(stats.dispatched_rebuild, 10);
    assert_eq!(stats.dispatched_live, 0);
}

#[test]
fn queue_full_drops_are_accounted_per_lane_and_reason() {
    let scheduler = PipelineScheduler::new(SchedulerConfig {
        live_lane_cap: 2,
        rebuild_lane_cap: 2,
        live_dispatch_ratio_pct: 70,
    });
    assert!(scheduler.enqueue("/a", PipelineLane::Live));
    assert!(scheduler.enqueue("/b", PipelineLane::Live));
    assert!(!scheduler.enqueue("/c", PipelineLane::Live));
    assert!(!scheduler.enqueue("/d", PipelineLane::Live));

    let stats = scheduler.stats();
    assert_eq!(stats.dropped_live, 2);
    assert_eq!(stats.dropped_queue_full, 2);
    assert_eq!(stats.live_depth, 2);
}

#[test]
fn out_of_band_drop_reasons_are_totaled() {
    let scheduler = PipelineScheduler::new(SchedulerConfig::default());
    scheduler.record_drop(PipelineLane::Live, "memory_soft");
    scheduler.record_drop(PipelineLane::Rebuild, "memory_hard");
    scheduler.record_drop(PipelineLane::Rebuild, "writer_lag");

    let stats = scheduler.stats();
    assert_eq!(stats.dropped_memory_soft, 1);
    assert_eq!(stats.dropped_memory_hard, 1);
    assert_eq!(stats.dropped_writer_lag, 1);
    assert_eq!(stats.dropped_live, 1);
    assert_eq!(stats.dropped_rebuild, 2);
}

#[test]
fn duplicate_paths_coalesce() {
    let scheduler = PipelineScheduler::new(SchedulerConfig::default());
    assert!(scheduler.enqueue("/same", PipelineLane::Live));
    assert!(scheduler.enqueue("/same", PipelineLane::Live));
    assert!(scheduler.enqueue("/same", PipelineLane::Live));

    let stats = scheduler.stats();
    assert_eq!(stats.live_depth, 1);
    assert_eq!(stats.coalesced, 2);
}

#[test]
fn invalidated_items_are_dropped_at_dispatch() {
    let scheduler = PipelineScheduler::new(SchedulerConfig::default());
    scheduler.enqueue("/stale", PipelineLane::Live);
    scheduler.enqueue("/fresh", PipelineLane::Live);
    scheduler.invalidate("/stale");

    let (stopping, paused) = flags();
    let item = scheduler.dequeue_blocking(&stopping, &paused).unwrap();
    assert_eq!(item.item.path, "/fresh");
    assert_eq!(scheduler.stats().stale_dropped, 1);
}

#[test]
fn shutdown_wakes_blocked_dequeuers() {
    let scheduler = std::sync::Arc::new(PipelineScheduler::new(SchedulerConfig::default()));
    let waiter = {
        let scheduler = std::sync::Arc::clone(&scheduler);
        std::thread::spawn(move || {
            let (stopping, paused) = flags();
            scheduler.dequeue_blocking(&stopping, &paused)
        })
    };
    std::thread::sleep(std::time::Duration::from_millis(50));
    scheduler.shutdown();
    assert!(waiter.join().unwrap().is_none());

    // Post-shutdown admission is rejected.
    assert!(!scheduler.enqueue("/late", PipelineLane::Live));
}
