use pitchvis::composite::Pixel;
use pitchvis::raster::SharedRaster;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn uniform(height: usize, blue: f32) -> Vec<Pixel> {
    vec![Pixel::new(0.0, 0.0, blue); height]
}

#[test]
fn unsized_raster_reads_nothing() {
    let r = SharedRaster::new();
    assert_eq!(r.dimensions(), None);
    assert_eq!(r.read_cell(0, 0), None);
    assert!(r.read_snapshot().is_none());
    assert!(!r.publish_column(0, &uniform(4, 1.0)));
    assert!(!r.poll_more_available());
}

#[test]
fn allocate_only_once() {
    let r = SharedRaster::new();
    assert!(r.allocate(3, 8));
    assert!(!r.allocate(5, 8));
    assert_eq!(r.dimensions(), Some((3, 8)));
    let snap = r.read_snapshot().unwrap();
    assert_eq!((snap.width, snap.height), (3, 8));
    assert!((0..3).all(|x| !snap.is_column_written(x)));
}

#[test]
fn publish_writes_the_whole_column() {
    let r = SharedRaster::new();
    r.allocate(3, 8);
    let mut col = uniform(8, 0.0);
    col[5] = Pixel::new(0.0, 1.0, 0.0);
    assert!(r.publish_column(1, &col));

    assert_eq!(r.read_cell(1, 5), Some(0xFF00_FF00));
    assert_eq!(r.read_cell(1, 0), Some(0xFF00_0000));
    assert_eq!(r.read_cell(0, 5), Some(0));
    assert_eq!(r.read_cell(3, 0), None);
    assert_eq!(r.read_cell(0, 8), None);
    assert_eq!(r.columns_published(), 1);

    let snap = r.read_snapshot().unwrap();
    assert!(snap.is_column_written(1));
    assert!(!snap.is_column_written(0));
    assert_eq!(snap.cell(1, 5), 0xFF00_FF00);
    assert_eq!(snap.column(1).len(), 8);
}

#[test]
fn mismatched_columns_are_rejected() {
    let r = SharedRaster::new();
    r.allocate(2, 4);
    assert!(!r.publish_column(2, &uniform(4, 1.0)));
    assert!(!r.publish_column(0, &uniform(3, 1.0)));
    assert_eq!(r.columns_published(), 0);
    assert!(!r.poll_more_available());
}

#[test]
fn ranged_reads_keep_full_raster_indices() {
    let r = SharedRaster::new();
    r.allocate(6, 4);
    for x in 0..6 {
        assert!(r.publish_column(x, &uniform(4, x as f32 / 5.0)));
    }
    let full = r.read_snapshot().unwrap();

    let part = r.read_columns(2..4).unwrap();
    assert_eq!(part.columns(), 2..4);
    assert_eq!(part.first_column, 2);
    assert_eq!((part.width, part.height), (6, 4));
    assert_eq!(part.column(3), full.column(3));
    assert_eq!(part.to_rgba().len(), 2 * 4 * 4);

    // Clamped to the raster.
    assert_eq!(r.read_columns(4..50).unwrap().columns(), 4..6);
    assert!(r.read_columns(9..12).unwrap().columns().is_empty());
}

#[test]
fn tail_follows_the_newest_published_column() {
    let r = SharedRaster::new();
    r.allocate(10, 2);
    assert_eq!(r.read_tail(4).unwrap().columns(), 0..4);

    for x in 0..7 {
        r.publish_column(x, &uniform(2, 1.0));
    }
    let tail = r.read_tail(4).unwrap();
    assert_eq!(tail.columns(), 3..7);
    assert_eq!(tail.columns_published, 7);
    assert!(tail.is_column_written(6));

    for x in 7..10 {
        r.publish_column(x, &uniform(2, 1.0));
    }
    assert_eq!(r.read_tail(4).unwrap().columns(), 6..10);
    // Wider than the raster: everything.
    assert_eq!(r.read_tail(40).unwrap().columns(), 0..10);
    assert!(r.read_tail(0).unwrap().columns().is_empty());
}

#[test]
fn more_available_is_a_coalescing_hint() {
    let r = SharedRaster::new();
    r.allocate(4, 4);
    r.publish_column(0, &uniform(4, 0.5));
    r.publish_column(1, &uniform(4, 0.5));
    assert!(r.poll_more_available());
    assert!(!r.poll_more_available());
    r.publish_column(2, &uniform(4, 0.5));
    assert!(r.poll_more_available());
}

#[test]
fn wait_for_update_times_out_without_news() {
    let r = SharedRaster::new();
    r.allocate(1, 4);
    let t0 = Instant::now();
    assert!(!r.wait_for_update(Duration::from_millis(30)));
    assert!(t0.elapsed() >= Duration::from_millis(25));
}

#[test]
fn wait_for_update_wakes_on_publish_and_close() {
    let r = Arc::new(SharedRaster::new());
    r.allocate(2, 4);

    let producer = {
        let r = Arc::clone(&r);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            r.publish_column(0, &uniform(4, 1.0));
        })
    };
    assert!(r.wait_for_update(Duration::from_secs(5)));
    producer.join().unwrap();

    r.close();
    assert!(r.is_closed());
    let t0 = Instant::now();
    assert!(!r.wait_for_update(Duration::from_secs(5)));
    assert!(t0.elapsed() < Duration::from_secs(1));
}

#[test]
fn snapshot_converts_to_row_major_rgba() {
    let r = SharedRaster::new();
    r.allocate(2, 3);
    let mut col = uniform(3, 0.0);
    col[2] = Pixel::new(1.0, 0.0, 0.0);
    r.publish_column(1, &col);

    let rgba = r.read_snapshot().unwrap().to_rgba();
    assert_eq!(rgba.len(), 2 * 3 * 4);
    // (x=1, y=2)
    let i = (2 * 2 + 1) * 4;
    assert_eq!(&rgba[i..i + 4], &[255, 0, 0, 255]);
    // Unwritten cells stay fully transparent.
    assert_eq!(&rgba[0..4], &[0, 0, 0, 0]);
}

#[test]
fn readers_never_see_a_partially_written_column() {
    const W: usize = 4;
    const H: usize = 256;
    let r = Arc::new(SharedRaster::new());
    r.allocate(W, H);
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let r = Arc::clone(&r);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..3000usize {
                let v = ((i % 250) + 1) as f32 / 255.0;
                r.publish_column(i % W, &uniform(H, v));
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let r = Arc::clone(&r);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut checked = 0usize;
                while !done.load(Ordering::Acquire) || checked == 0 {
                    let snap = r.read_snapshot().unwrap();
                    for x in 0..W {
                        let col = snap.column(x);
                        assert!(
                            col.iter().all(|&c| c == col[0]),
                            "column {x} mixes two publishes"
                        );
                    }
                    checked += 1;
                }
            })
        })
        .collect();

    producer.join().unwrap();
    for h in readers {
        h.join().unwrap();
    }
    assert_eq!(r.columns_published(), 3000);
}
