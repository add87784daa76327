use geotiff_hmm_smooth::{
    HmmConfig, HmmError, HmmModel, MemoryRaster, RasterShape, RunSummary, Tile, TileMarkers,
    TransitionSpec,
};
use ndarray::{s, Array3};
use std::fs;

const STEPS: usize = 3;
const LABELS: usize = 3;

/// Deterministic stack of `STEPS` images, `LABELS x rows x cols`, with
/// per-pixel probability vectors that sum to one.
fn synthetic_stack(rows: usize, cols: usize) -> Vec<MemoryRaster> {
    let mut lcg: u64 = 12345;
    (0..STEPS)
        .map(|step| {
            let mut data = Array3::<f32>::zeros((LABELS, rows, cols));
            for r in 0..rows {
                for c in 0..cols {
                    let mut weights = [0.0_f32; LABELS];
                    for w in weights.iter_mut() {
                        lcg = lcg.wrapping_mul(6364136223846793005).wrapping_add(1);
                        *w = ((lcg >> 40) as f32) / ((1u64 << 24) as f32) + 0.01;
                    }
                    let total: f32 = weights.iter().sum();
                    for (l, w) in weights.iter().enumerate() {
                        data[[l, r, c]] = w / total;
                    }
                }
            }
            MemoryRaster::new(format!("step{}", step), data)
        })
        .collect()
}

fn empty_outputs(bands: usize, rows: usize, cols: usize) -> Vec<MemoryRaster> {
    (0..STEPS)
        .map(|step| MemoryRaster::zeros(format!("step{}_hmm", step), RasterShape::new(bands, rows, cols)))
        .collect()
}

fn model(tile_size: usize) -> HmmModel {
    HmmModel::new(
        HmmConfig::new()
            .with_transition(TransitionSpec::Prior(0.1))
            .with_tile_size(tile_size)
            .with_n_jobs(2),
    )
}

#[test]
fn tiled_run_matches_single_tile_run() {
    let images = synthetic_stack(4, 4);

    let tiled_dir = tempfile::tempdir().unwrap();
    let mut tiled = empty_outputs(LABELS, 4, 4);
    let summary = model(2)
        .fit_stack(&images, &mut tiled, tiled_dir.path())
        .unwrap();
    assert_eq!(summary.tiles_total, 4);
    assert_eq!(summary.tiles_processed, 4);
    assert_eq!(TileMarkers::new(tiled_dir.path()).count().unwrap(), 4);

    let whole_dir = tempfile::tempdir().unwrap();
    let mut whole = empty_outputs(LABELS, 4, 4);
    let summary = model(256)
        .fit_stack(&images, &mut whole, whole_dir.path())
        .unwrap();
    assert_eq!(summary.tiles_total, 1);
    assert_eq!(TileMarkers::new(whole_dir.path()).count().unwrap(), 1);

    for (a, b) in tiled.iter().zip(&whole) {
        assert_eq!(a.data(), b.data());
    }
}

#[test]
fn smoothed_pixels_are_distributions() {
    let images = synthetic_stack(5, 3);
    let dir = tempfile::tempdir().unwrap();
    let mut outputs = empty_outputs(LABELS, 5, 3);
    model(2).fit_stack(&images, &mut outputs, dir.path()).unwrap();

    for out in &outputs {
        for r in 0..5 {
            for c in 0..3 {
                let sum: f32 = out.data().slice(s![.., r, c]).sum();
                assert!((sum - 1.0).abs() < 1e-5, "pixel ({}, {}) sums to {}", r, c, sum);
            }
        }
    }
}

#[test]
fn second_run_recomputes_nothing() {
    let images = synthetic_stack(4, 6);
    let dir = tempfile::tempdir().unwrap();
    let mut outputs = empty_outputs(LABELS, 4, 6);

    let first = model(3).fit_stack(&images, &mut outputs, dir.path()).unwrap();
    let snapshot: Vec<_> = outputs.iter().map(|o| o.data().clone()).collect();
    let flushes: Vec<_> = outputs.iter().map(|o| o.flushes()).collect();

    let second = model(3).fit_stack(&images, &mut outputs, dir.path()).unwrap();
    assert_eq!(first.tiles_processed, 4);
    assert_eq!(
        second,
        RunSummary {
            tiles_total: 4,
            tiles_skipped: 4,
            tiles_empty: 0,
            tiles_processed: 0,
        }
    );
    for ((out, before), n) in outputs.iter().zip(&snapshot).zip(&flushes) {
        assert_eq!(out.data(), before);
        assert_eq!(out.flushes(), *n);
    }
}

#[test]
fn interrupted_run_resumes_to_same_result() {
    let images = synthetic_stack(4, 4);

    let full_dir = tempfile::tempdir().unwrap();
    let mut full = empty_outputs(LABELS, 4, 4);
    model(2).fit_stack(&images, &mut full, full_dir.path()).unwrap();

    // Pretend the run stopped after the first two tiles (the top row band)
    let dir = tempfile::tempdir().unwrap();
    let mut partial = empty_outputs(LABELS, 4, 4);
    model(2).fit_stack(&images, &mut partial, dir.path()).unwrap();
    let markers = TileMarkers::new(dir.path());
    for (row, col) in [(2, 0), (2, 2)] {
        fs::remove_file(markers.path(&Tile::new(row, col, 2, 2))).unwrap();
    }
    let mut resumed: Vec<MemoryRaster> = partial
        .iter()
        .enumerate()
        .map(|(step, out)| {
            let mut data = out.data().clone();
            data.slice_mut(s![.., 2.., ..]).fill(0.0);
            MemoryRaster::new(format!("step{}_hmm", step), data)
        })
        .collect();

    let summary = model(2).fit_stack(&images, &mut resumed, dir.path()).unwrap();
    assert_eq!(summary.tiles_skipped, 2);
    assert_eq!(summary.tiles_processed, 2);
    assert_eq!(markers.count().unwrap(), 4);
    for (a, b) in resumed.iter().zip(&full) {
        assert_eq!(a.data(), b.data());
    }
}

#[test]
fn resume_with_other_tile_size_is_rejected() {
    let images = synthetic_stack(4, 4);
    let dir = tempfile::tempdir().unwrap();
    let mut partial = empty_outputs(LABELS, 4, 4);
    model(2).fit_stack(&images, &mut partial, dir.path()).unwrap();

    // Stop after the top row band, then resume with a 4-pixel grid whose
    // single tile shares the (0, 0) marker with the old grid
    let markers = TileMarkers::new(dir.path());
    for (row, col) in [(2, 0), (2, 2)] {
        fs::remove_file(markers.path(&Tile::new(row, col, 2, 2))).unwrap();
    }
    let mut resumed: Vec<MemoryRaster> = partial
        .iter()
        .enumerate()
        .map(|(step, out)| {
            let mut data = out.data().clone();
            data.slice_mut(s![.., 2.., ..]).fill(0.0);
            MemoryRaster::new(format!("step{}_hmm", step), data)
        })
        .collect();

    let err = model(4)
        .fit_stack(&images, &mut resumed, dir.path())
        .unwrap_err();
    assert!(matches!(err, HmmError::MarkerMismatch { .. }));
    for out in &resumed {
        assert_eq!(out.data().slice(s![.., 2.., ..]).sum(), 0.0);
    }
}

#[test]
fn other_stack_in_same_marker_dir_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let images = synthetic_stack(4, 4);
    let mut outputs = empty_outputs(LABELS, 4, 4);
    model(2).fit_stack(&images, &mut outputs, dir.path()).unwrap();

    let other: Vec<MemoryRaster> = images
        .iter()
        .enumerate()
        .map(|(step, image)| MemoryRaster::new(format!("ndvi{}", step), image.data().clone()))
        .collect();
    let mut other_outputs = empty_outputs(LABELS, 4, 4);
    let err = model(2)
        .fit_stack(&other, &mut other_outputs, dir.path())
        .unwrap_err();
    assert!(matches!(err, HmmError::MarkerMismatch { .. }));
    assert!(other_outputs.iter().all(|out| out.data().sum() == 0.0));
}

#[test]
fn no_data_block_passes_through() {
    let mut images = synthetic_stack(4, 4);
    images = images
        .into_iter()
        .enumerate()
        .map(|(step, img)| {
            let mut data = img.data().clone();
            data.slice_mut(s![.., 0..2, 2..4]).fill(0.0);
            MemoryRaster::new(format!("step{}", step), data)
        })
        .collect();

    let dir = tempfile::tempdir().unwrap();
    // Pre-fill outputs so a skipped write would be visible
    let mut outputs: Vec<MemoryRaster> = (0..STEPS)
        .map(|step| MemoryRaster::new(format!("step{}_hmm", step), Array3::from_elem((LABELS, 4, 4), -1.0)))
        .collect();
    model(4).fit_stack(&images, &mut outputs, dir.path()).unwrap();

    for out in &outputs {
        assert!(out.data().slice(s![.., 0..2, 2..4]).iter().all(|&v| v == 0.0));
        for r in 0..4 {
            for c in 0..4 {
                if r < 2 && c >= 2 {
                    continue;
                }
                let sum: f32 = out.data().slice(s![.., r, c]).sum();
                assert!((sum - 1.0).abs() < 1e-5);
            }
        }
    }
}

#[test]
fn class_assignment_uses_class_list() {
    let images = synthetic_stack(3, 3);
    let dir = tempfile::tempdir().unwrap();

    let mut probs = empty_outputs(LABELS, 3, 3);
    model(2).fit_stack(&images, &mut probs, dir.path()).unwrap();

    let class_dir = tempfile::tempdir().unwrap();
    let mut classes = empty_outputs(1, 3, 3);
    HmmModel::new(
        HmmConfig::new()
            .with_tile_size(2)
            .with_assign_class(true)
            .with_class_list(Some(vec![10, 20, 30])),
    )
    .fit_stack(&images, &mut classes, class_dir.path())
    .unwrap();

    for (p, k) in probs.iter().zip(&classes) {
        for r in 0..3 {
            for c in 0..3 {
                let pixel = p.data().slice(s![.., r, c]);
                let mut best = 0;
                for l in 1..LABELS {
                    if pixel[l] > pixel[best] {
                        best = l;
                    }
                }
                assert_eq!(k.data()[[0, r, c]], [10.0, 20.0, 30.0][best]);
            }
        }
    }
}

#[test]
fn class_list_length_must_match_labels() {
    let images = synthetic_stack(2, 2);
    let dir = tempfile::tempdir().unwrap();
    let mut outputs = empty_outputs(1, 2, 2);
    let result = HmmModel::new(
        HmmConfig::new()
            .with_assign_class(true)
            .with_class_list(Some(vec![1, 2])),
    )
    .fit_stack(&images, &mut outputs, dir.path());
    assert!(result.is_err());
    assert_eq!(TileMarkers::new(dir.path()).count().unwrap(), 0);
}
