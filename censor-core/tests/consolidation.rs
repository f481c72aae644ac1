mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use censor_core::consolidation::nms;
use censor_core::{Consolidator, ConsolidatorConfig, LazyDetector, Region, StaticDetector};

use common::{assert_contained, fixture, BrokenDetector, ScriptedDetector};

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

#[tokio::test]
async fn overlapping_detections_merge_to_the_most_confident() {
    let detector = StaticDetector::new(vec![
        Region::new(200.0, 100.0, 160.0, 240.0, 0.85),
        Region::new(210.0, 105.0, 150.0, 230.0, 0.6),
    ]);
    let config = ConsolidatorConfig {
        merge_threshold: 0.35,
        ..ConsolidatorConfig::default()
    };
    let consolidator = Consolidator::new(detector, config);

    let out = consolidator.consolidate(&fixture(800, 600)).await;
    assert!(!out.synthetic);
    assert_eq!(out.regions.len(), 1);
    let kept = &out.regions[0];
    assert_eq!(kept.confidence, 0.85);
    assert_eq!((kept.x, kept.y, kept.width, kept.height), (200.0, 100.0, 160.0, 240.0));
    assert!(kept.has_landmarks());
}

#[tokio::test]
async fn broken_detector_yields_two_synthetic_regions() {
    let consolidator = Consolidator::new(BrokenDetector, ConsolidatorConfig::default());
    let out = consolidator.consolidate(&fixture(800, 600)).await;

    assert!(out.synthetic);
    assert_eq!(out.regions.len(), 2);
    let corners: Vec<(f32, f32)> = out.regions.iter().map(|r| (r.x, r.y)).collect();
    assert!(approx(corners[0].0, 160.0) && approx(corners[0].1, 150.0));
    assert!(approx(corners[1].0, 480.0) && approx(corners[1].1, 150.0));
    for r in &out.regions {
        assert!(approx(r.width, 160.0) && approx(r.height, 150.0));
        assert!(r.has_landmarks());
    }
    assert_contained(&out.regions, 800, 600);
}

#[tokio::test]
async fn zero_faces_is_not_a_failure() {
    let detector = ScriptedDetector::new(|_, _| Vec::new());
    let consolidator = Consolidator::new(detector, ConsolidatorConfig::default());
    let out = consolidator.consolidate(&fixture(800, 600)).await;

    assert!(out.regions.is_empty());
    assert!(!out.synthetic);
    assert!(!out.used_downscaled);
    // 800 wide: tiles at x 0 and 288; 600 high: tiles at y 0 and 88.
    assert_eq!(out.tiles_scanned, 4);
    let calls = consolidator.detector().calls();
    assert_eq!(calls[0], (800, 600));
    assert_eq!(calls[1], (640, 480));
    assert_eq!(calls.len(), 2 + 4);
}

#[tokio::test]
async fn downscaled_pass_is_adopted_when_it_finds_more() {
    let detector = ScriptedDetector::new(|w, h| match (w, h) {
        (640, 480) => vec![
            Region::new(50.0, 50.0, 60.0, 60.0, 0.9),
            Region::new(300.0, 50.0, 60.0, 60.0, 0.8),
        ],
        _ => Vec::new(),
    });
    let consolidator = Consolidator::new(detector, ConsolidatorConfig::default());
    let out = consolidator.consolidate(&fixture(1280, 960)).await;

    assert!(out.used_downscaled);
    assert_eq!(out.tiles_scanned, 0);
    assert_eq!(out.regions.len(), 2);
    let first = &out.regions[0];
    assert!(approx(first.x, 100.0) && approx(first.y, 100.0));
    assert!(approx(first.width, 120.0) && approx(first.height, 120.0));
    let second = &out.regions[1];
    assert!(approx(second.x, 600.0) && approx(second.y, 100.0));
    assert_eq!(consolidator.detector().calls(), vec![(1280, 960), (640, 480)]);
}

#[tokio::test]
async fn downscaled_pass_with_equal_count_is_ignored() {
    let detector = ScriptedDetector::new(|w, h| match (w, h) {
        (1280, 960) => vec![Region::new(400.0, 300.0, 200.0, 200.0, 0.9)],
        (640, 480) => vec![Region::new(10.0, 10.0, 40.0, 40.0, 0.99)],
        _ => Vec::new(),
    });
    let consolidator = Consolidator::new(detector, ConsolidatorConfig::default());
    let out = consolidator.consolidate(&fixture(1280, 960)).await;

    assert!(!out.used_downscaled);
    // Still one face, so the tiles run: 3 × 3 tiles of 512 px.
    assert_eq!(out.tiles_scanned, 9);
    assert_eq!(out.regions.len(), 1);
    assert_eq!(out.regions[0].x, 400.0);
}

#[tokio::test]
async fn tiled_hits_are_translated_and_filtered() {
    let detector = ScriptedDetector::new(|w, _| {
        if w == 512 {
            vec![
                Region::new(100.0, 100.0, 50.0, 50.0, 0.9),
                // Below the tile artifact minimum.
                Region::new(5.0, 5.0, 12.0, 12.0, 0.95),
            ]
        } else {
            Vec::new()
        }
    });
    let consolidator = Consolidator::new(detector, ConsolidatorConfig::default());
    let out = consolidator.consolidate(&fixture(1000, 400)).await;

    assert_eq!(out.tiles_scanned, 3);
    let xs: Vec<f32> = out.regions.iter().map(|r| r.x).collect();
    assert_eq!(xs, vec![100.0, 484.0, 588.0]);
    assert!(out.regions.iter().all(|r| r.y == 100.0 && r.width == 50.0));
    assert!(out.regions.iter().all(|r| r.has_landmarks()));
}

#[tokio::test]
async fn emitted_regions_stay_inside_the_image() {
    let detector = StaticDetector::new(vec![
        Region::new(-20.0, -20.0, 60.0, 60.0, 0.9),
        Region::new(280.0, 180.0, 50.0, 50.0, 0.8),
        Region::new(100.0, 50.0, 1000.0, 1000.0, 1.7),
        Region::new(f32::NAN, 10.0, 30.0, 30.0, 0.9),
        Region::new(400.0, 400.0, 30.0, 30.0, 0.9),
    ]);
    let consolidator = Consolidator::new(detector, ConsolidatorConfig::default());
    let out = consolidator.consolidate(&fixture(300, 200)).await;

    assert_eq!(out.regions.len(), 3);
    assert_eq!(out.regions[0].confidence, 1.0);
    assert_contained(&out.regions, 300, 200);
    for r in &out.regions {
        for p in &r.landmarks {
            assert!(p.x >= r.x && p.x <= r.right() && p.y >= r.y && p.y <= r.bottom());
        }
    }
}

#[tokio::test]
async fn confidence_and_size_filters_apply_to_detector_output() {
    let detector = StaticDetector::new(vec![
        Region::new(10.0, 10.0, 80.0, 80.0, 0.3),
        Region::new(120.0, 10.0, 15.0, 80.0, 0.9),
        Region::new(200.0, 10.0, 60.0, 60.0, 0.7),
        Region::new(10.0, 120.0, 60.0, 60.0, 0.6),
    ]);
    let consolidator = Consolidator::new(detector, ConsolidatorConfig::default());
    let out = consolidator.consolidate(&fixture(300, 200)).await;

    let confidences: Vec<f32> = out.regions.iter().map(|r| r.confidence).collect();
    assert_eq!(confidences, vec![0.7, 0.6]);
}

#[tokio::test]
async fn consolidated_output_is_an_nms_fixed_point() {
    let detector = StaticDetector::new(vec![
        Region::new(10.0, 10.0, 100.0, 100.0, 0.9),
        Region::new(30.0, 30.0, 100.0, 100.0, 0.8),
        Region::new(60.0, 60.0, 100.0, 100.0, 0.7),
        Region::new(200.0, 20.0, 80.0, 80.0, 0.75),
    ]);
    let config = ConsolidatorConfig::default();
    let consolidator = Consolidator::new(detector, config);
    let out = consolidator.consolidate(&fixture(320, 240)).await;

    let again = nms(out.regions.clone(), config.merge_threshold);
    assert_eq!(again, out.regions);
    for (i, a) in out.regions.iter().enumerate() {
        for b in &out.regions[i + 1..] {
            assert!(a.iou(b) <= config.merge_threshold);
        }
    }
}

#[tokio::test]
async fn lazy_detector_is_built_once_and_disposable_through_the_consolidator() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);
    let lazy = LazyDetector::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(StaticDetector::new(vec![
            Region::new(10.0, 10.0, 40.0, 40.0, 0.9),
            Region::new(100.0, 10.0, 40.0, 40.0, 0.9),
        ]))
    });
    let mut consolidator = Consolidator::new(lazy, ConsolidatorConfig::default());
    let image = fixture(200, 100);

    consolidator.consolidate(&image).await;
    consolidator.consolidate(&image).await;
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    consolidator.detector_mut().dispose();
    assert!(!consolidator.detector().is_loaded());
    let out = consolidator.consolidate(&image).await;
    assert_eq!(out.regions.len(), 2);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unavailable_lazy_detector_falls_back_to_synthetic_regions() {
    let lazy: LazyDetector<StaticDetector> = LazyDetector::new(|| {
        Err(censor_core::CensorError::DetectionUnavailable(
            "no model configured".into(),
        ))
    });
    let consolidator = Consolidator::new(lazy, ConsolidatorConfig::default());
    let out = consolidator.consolidate(&fixture(400, 300)).await;
    assert!(out.synthetic);
    assert_eq!(out.regions.len(), 2);
}
