use std::sync::Arc;
use std::time::Duration;

use markcut_decoder::{
    FrameResult, MemoryIndex, PictureGenerator, RecordingProgress, SyntheticDecoder,
};
use markcut_logo::discovery::crop;
use markcut_logo::{
    DiscoveryConfig, DiscoveryOutcome, EdgePlane, LogoDiscoverer, LogoError, LogoMask, MaskRepository,
    NotFoundReason, SobelTransform, StorageKind,
};
use markcut_types::{AspectRatio, CancelToken, Corner, Picture, Plane, Region};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
// Default corner region for 320x240.
const REGION_WIDTH: u32 = 84;
const REGION_HEIGHT: u32 = 40;

/// Bright box `[x0, x1) x [y0, y1)` in corner region coordinates.
type Bright = (u32, u32, u32, u32);

/// The top-right logo every single-corner scenario uses.
const LOGO: Bright = (44, 70, 12, 24);
/// Spans nearly the whole region width once cropped.
const TICKER: Bright = (12, 78, 12, 24);
const RIGHT_TICKER: Bright = (6, 72, 12, 24);
const LOW_TICKER: Bright = (12, 78, 16, 28);
/// Narrow pattern for a left corner.
const BADGE: Bright = (14, 30, 12, 24);
/// Crops to 60 of 84 columns in a right corner.
const WIDE_LOGO: Bright = (30, 72, 12, 24);

/// Seeded noise everywhere, with each listed corner region painted flat and
/// carrying its bright box.
fn scene(frame: u64, corners: &[(Corner, Bright)]) -> FrameResult<Picture> {
    let mut rng = StdRng::seed_from_u64(frame);
    let mut luma = vec![0u8; (WIDTH * HEIGHT) as usize];
    rng.fill(luma.as_mut_slice());
    for &(corner, (x0, x1, y0, y1)) in corners {
        let left = if corner.is_left() { 0 } else { WIDTH - REGION_WIDTH };
        let top = if corner.is_top() { 0 } else { HEIGHT - REGION_HEIGHT };
        for y in 0..REGION_HEIGHT {
            for x in 0..REGION_WIDTH {
                let inside = (x0..x1).contains(&x) && (y0..y1).contains(&y);
                luma[((top + y) * WIDTH + left + x) as usize] = if inside { 235 } else { 16 };
            }
        }
    }
    let luma = Plane::from_owned(WIDTH, HEIGHT, WIDTH as usize, luma)?;
    let (cw, ch) = (WIDTH / 2, HEIGHT / 2);
    Picture::new(luma, frame).with_chroma(Plane::filled(cw, ch, 128), Plane::filled(cw, ch, 128))
}

fn picture(frame: u64, with_logo: bool) -> FrameResult<Picture> {
    if with_logo {
        scene(frame, &[(Corner::TopRight, LOGO)])
    } else {
        scene(frame, &[])
    }
}

fn scene_source(
    progress: RecordingProgress,
    corners: impl Fn(u64) -> Vec<(Corner, Bright)> + Send + Sync + 'static,
) -> (SyntheticDecoder, Arc<MemoryIndex>) {
    let index = Arc::new(MemoryIndex::new(25.0, 1, progress));
    let generator: PictureGenerator = Arc::new(move |frame| scene(frame, &corners(frame)));
    (SyntheticDecoder::new(Arc::clone(&index), generator), index)
}

fn source(
    progress: RecordingProgress,
    logo: impl Fn(u64) -> bool + Send + Sync + 'static,
) -> (SyntheticDecoder, Arc<MemoryIndex>) {
    scene_source(progress, move |frame| {
        if logo(frame) {
            vec![(Corner::TopRight, LOGO)]
        } else {
            Vec::new()
        }
    })
}

fn discover(decoder: &mut SyntheticDecoder, index: &MemoryIndex) -> DiscoveryOutcome {
    LogoDiscoverer::new(config(StorageKind::Packed), SobelTransform::default())
        .run(decoder, index, &CancelToken::new())
        .unwrap()
}

fn config(storage: StorageKind) -> DiscoveryConfig {
    DiscoveryConfig {
        storage,
        stall_retries: 2,
        stall_sleep_ms: 1,
        ..DiscoveryConfig::default()
    }
}

fn expected_mask(frame: u64) -> LogoMask {
    let sobel = SobelTransform::default();
    let region = Region::new(Corner::TopRight, REGION_WIDTH, REGION_HEIGHT).unwrap();
    let map = sobel
        .transform(&picture(frame, true).unwrap(), region, true)
        .unwrap();
    let planes = crop(
        map.into_planes(),
        Corner::TopRight,
        sobel.config().boundary,
        DiscoveryConfig::default().crop_tolerance_divisor,
    )
    .unwrap();
    LogoMask::new(Corner::TopRight, AspectRatio::default(), planes).unwrap()
}

fn mask_planes(mask: &LogoMask) -> Vec<EdgePlane> {
    mask.planes().map(|(_, plane)| plane.clone()).collect()
}

#[test]
fn recurring_top_right_pattern_is_discovered() {
    let (mut decoder, index) = source(RecordingProgress::finished(1000), |frame| {
        (50..=950).contains(&frame)
    });
    let discoverer = LogoDiscoverer::new(config(StorageKind::Packed), SobelTransform::default());
    let outcome = discoverer
        .run(&mut decoder, index.as_ref(), &CancelToken::new())
        .unwrap();

    let DiscoveryOutcome::Found(found) = outcome else {
        panic!("expected a logo, got {outcome:?}");
    };
    assert_eq!(found.mask.corner(), Corner::TopRight);
    assert!(found.hits >= 50, "hits {}", found.hits);
    assert_eq!(found.frame_number, 50);
    // The other corners never hold a plausible candidate, so the whole
    // recording is read.
    assert_eq!(found.samples, 901);
    assert_eq!(found.key_frames, 1000);
    assert!(found.partial);
    assert!(found.mask.width() < REGION_WIDTH);
    assert!(found.mask.has_chroma());

    let dir = tempfile::tempdir().unwrap();
    let repo = MaskRepository::new(dir.path());
    repo.save("Test HD", &found.mask).unwrap();
    let loaded = repo
        .load("Test HD", AspectRatio::default())
        .unwrap()
        .unwrap();
    assert_eq!(loaded, expected_mask(50));
}

#[test]
fn crop_is_stable_against_a_fresh_edge_map_of_the_cropped_region() {
    let mask = expected_mask(300);
    let again = crop(
        mask_planes(&mask),
        Corner::TopRight,
        SobelTransform::default().config().boundary,
        DiscoveryConfig::default().crop_tolerance_divisor,
    )
    .unwrap();
    assert_eq!(again, mask_planes(&mask));

    let fresh = SobelTransform::default()
        .transform(&picture(300, true).unwrap(), mask.region(), true)
        .unwrap();
    let recropped = crop(
        fresh.into_planes(),
        Corner::TopRight,
        SobelTransform::default().config().boundary,
        DiscoveryConfig::default().crop_tolerance_divisor,
    )
    .unwrap();
    assert_eq!(recropped, mask_planes(&mask));
}

#[test]
fn storage_strategies_select_the_same_mask() {
    let logo = |frame: u64| (10..70).contains(&frame);
    let run = |storage| {
        let (mut decoder, index) = source(RecordingProgress::finished(80), logo);
        LogoDiscoverer::new(config(storage), SobelTransform::default())
            .run(&mut decoder, index.as_ref(), &CancelToken::new())
            .unwrap()
    };
    let packed = run(StorageKind::Packed);
    let unpacked = run(StorageKind::Unpacked);
    assert_eq!(packed, unpacked);
    assert_eq!(packed.mask(), Some(&expected_mask(10)));
}

#[test]
fn noise_only_yields_no_candidates() {
    let (mut decoder, index) = source(RecordingProgress::finished(60), |_| false);
    let outcome = LogoDiscoverer::new(config(StorageKind::Packed), SobelTransform::default())
        .run(&mut decoder, index.as_ref(), &CancelToken::new())
        .unwrap();
    assert_eq!(
        outcome,
        DiscoveryOutcome::NotFound(NotFoundReason::NoCandidates)
    );
}

#[test]
fn short_recording_is_accepted_on_the_partial_bar() {
    let (mut decoder, index) = source(RecordingProgress::finished(20), |_| true);
    let outcome = LogoDiscoverer::new(config(StorageKind::Packed), SobelTransform::default())
        .run(&mut decoder, index.as_ref(), &CancelToken::new())
        .unwrap();
    let DiscoveryOutcome::Found(found) = outcome else {
        panic!("expected a partial logo, got {outcome:?}");
    };
    assert!(found.partial);
    assert_eq!(found.hits, 19);
}

#[test]
fn read_cap_without_enough_votes_is_below_threshold() {
    let (mut decoder, index) = source(RecordingProgress::finished(100), |_| true);
    let config = DiscoveryConfig {
        max_read_frames: 20,
        ..config(StorageKind::Packed)
    };
    let outcome = LogoDiscoverer::new(config, SobelTransform::default())
        .run(&mut decoder, index.as_ref(), &CancelToken::new())
        .unwrap();
    assert_eq!(
        outcome,
        DiscoveryOutcome::NotFound(NotFoundReason::BelowThreshold {
            corner: Corner::TopRight,
            hits: 19
        })
    );
}

#[test]
fn stalled_recording_is_an_error() {
    let (mut decoder, index) = source(RecordingProgress::live(5), |_| true);
    let err = LogoDiscoverer::new(config(StorageKind::Packed), SobelTransform::default())
        .run(&mut decoder, index.as_ref(), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, LogoError::Stalled { frame: 5 }), "{err:?}");
}

#[test]
fn growing_recording_is_read_to_the_end() {
    let progress = RecordingProgress::live(10);
    let (mut decoder, index) = source(progress.clone(), |_| true);
    let producer = std::thread::spawn(move || {
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(5));
            progress.grow(10);
        }
        progress.finish();
    });
    let config = DiscoveryConfig {
        stall_retries: 10_000,
        ..config(StorageKind::Packed)
    };
    let outcome = LogoDiscoverer::new(config, SobelTransform::default())
        .run(&mut decoder, index.as_ref(), &CancelToken::new())
        .unwrap();
    producer.join().unwrap();
    let DiscoveryOutcome::Found(found) = outcome else {
        panic!("expected a logo, got {outcome:?}");
    };
    assert_eq!(found.samples, 40);
    assert_eq!(found.key_frames, 40);
    assert!(found.partial);
}

#[test]
fn cancellation_aborts_discovery() {
    let (mut decoder, index) = source(RecordingProgress::finished(50), |_| true);
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = LogoDiscoverer::new(config(StorageKind::Packed), SobelTransform::default())
        .run(&mut decoder, index.as_ref(), &cancel)
        .unwrap_err();
    assert!(matches!(err, LogoError::Cancelled(_)));
}

#[test]
fn sampling_continues_until_every_corner_is_full() {
    // Top-left only passes the plausibility checks on even frames, each time
    // with a different pattern.
    let (mut decoder, index) = scene_source(RecordingProgress::finished(400), |frame| {
        let mut corners = vec![(Corner::TopRight, LOGO)];
        if frame % 2 == 0 {
            let k = (frame / 2) as u32;
            let x0 = 12 + (k % 10) * 6;
            let y1 = 16 + (k / 10 % 6) * 2;
            corners.push((Corner::TopLeft, (x0, x0 + 5, 12, y1)));
        }
        corners
    });
    // Bottom corners are noise on every frame, so a quota of 60 per corner
    // can only end through the read cap.
    let config = DiscoveryConfig {
        max_samples: 60,
        max_read_frames: 200,
        ..config(StorageKind::Packed)
    };
    let outcome = LogoDiscoverer::new(config, SobelTransform::default())
        .run(&mut decoder, index.as_ref(), &CancelToken::new())
        .unwrap();

    let DiscoveryOutcome::Found(found) = outcome else {
        panic!("expected a logo, got {outcome:?}");
    };
    assert_eq!(found.mask.corner(), Corner::TopRight);
    assert_eq!(found.key_frames, 200);
    // Top-right stopped collecting once full.
    assert_eq!(found.samples, 60);
    assert_eq!(found.hits, 59);
    assert!(!found.partial);
}

#[test]
fn top_right_ticker_falls_back_to_the_next_corner() {
    let (mut decoder, index) = scene_source(RecordingProgress::finished(300), |frame| {
        let mut corners = vec![(Corner::TopRight, RIGHT_TICKER)];
        if frame < 180 {
            corners.push((Corner::TopLeft, BADGE));
        }
        corners
    });
    let outcome = discover(&mut decoder, index.as_ref());

    // 179 hits is below 70% of the ticker's 299 but clears the acceptance bar.
    let DiscoveryOutcome::Found(found) = outcome else {
        panic!("expected the top-left badge, got {outcome:?}");
    };
    assert_eq!(found.mask.corner(), Corner::TopLeft);
    assert_eq!(found.hits, 179);
    assert_eq!(found.frame_number, 0);
    assert_eq!(found.mask.width(), 36);
}

#[test]
fn tickers_in_both_top_corners_are_rejected() {
    let (mut decoder, index) = scene_source(RecordingProgress::finished(300), |frame| {
        let mut corners = vec![(Corner::TopRight, RIGHT_TICKER)];
        if frame < 180 {
            corners.push((Corner::TopLeft, TICKER));
        }
        corners
    });
    assert_eq!(
        discover(&mut decoder, index.as_ref()),
        DiscoveryOutcome::NotFound(NotFoundReason::CropRejected)
    );
}

#[test]
fn fallback_corner_must_clear_the_acceptance_bar() {
    let (mut decoder, index) = scene_source(RecordingProgress::finished(300), |frame| {
        let mut corners = vec![(Corner::TopRight, RIGHT_TICKER)];
        if frame < 30 {
            corners.push((Corner::TopLeft, BADGE));
        }
        corners
    });
    assert_eq!(
        discover(&mut decoder, index.as_ref()),
        DiscoveryOutcome::NotFound(NotFoundReason::CropRejected)
    );
}

#[test]
fn bottom_left_ticker_is_accepted() {
    let (mut decoder, index) = scene_source(RecordingProgress::finished(120), |_| {
        vec![(Corner::BottomLeft, LOW_TICKER)]
    });
    let DiscoveryOutcome::Found(found) = discover(&mut decoder, index.as_ref()) else {
        panic!("expected the bottom-left ticker");
    };
    assert_eq!(found.mask.corner(), Corner::BottomLeft);
    assert_eq!(found.mask.width(), REGION_WIDTH);
}

#[test]
fn narrower_runner_up_is_preferred_within_its_share() {
    let run = |badge_frames: u64| {
        let (mut decoder, index) = scene_source(RecordingProgress::finished(300), move |frame| {
            let mut corners = vec![(Corner::TopRight, WIDE_LOGO)];
            if frame < badge_frames {
                corners.push((Corner::TopLeft, BADGE));
            }
            corners
        });
        match discover(&mut decoder, index.as_ref()) {
            DiscoveryOutcome::Found(found) => found,
            outcome => panic!("expected a logo, got {outcome:?}"),
        }
    };

    // 239 hits against 299 is above the 70% share.
    let preferred = run(240);
    assert_eq!(preferred.mask.corner(), Corner::TopLeft);
    assert_eq!(preferred.mask.width(), 36);

    let kept = run(180);
    assert_eq!(kept.mask.corner(), Corner::TopRight);
    assert_eq!(kept.mask.width(), 60);
    assert_eq!(kept.hits, 299);
}
