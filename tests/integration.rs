use std::path::{Path, PathBuf};

use batch_watermark::{
    run, spawn, BatchState, CancelToken, Error, ErrorKind, JobDescription, JobStatus,
    OpacityPercent, Placement, ProcessOptions, SizePercent, TextContent, TextStyle,
    TextWatermark, WatermarkSpec, CORNER_PADDING,
};
use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    input: PathBuf,
    output: PathBuf,
    logo: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();

    let logo = dir.path().join("logo.png");
    RgbaImage::from_pixel(20, 10, Rgba([255, 0, 0, 255]))
        .save(&logo)
        .unwrap();

    Fixture {
        _dir: dir,
        input,
        output,
        logo,
    }
}

fn job(fx: &Fixture) -> JobDescription {
    JobDescription {
        input_dir: fx.input.clone(),
        output_dir: fx.output.clone(),
        watermark: WatermarkSpec::Image {
            path: fx.logo.clone(),
        },
        size: SizePercent::new(25.0).unwrap(),
        opacity: OpacityPercent(60),
        options: ProcessOptions::default(),
    }
}

fn write_rgb(dir: &Path, name: &str) {
    RgbImage::from_pixel(64, 48, Rgb([240, 240, 240]))
        .save(dir.join(name))
        .unwrap();
}

fn output_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn corrupt_file_does_not_stop_the_batch() {
    let fx = fixture();
    for name in ["1.png", "2.png", "4.png", "5.png"] {
        write_rgb(&fx.input, name);
    }
    std::fs::write(fx.input.join("3.png"), b"this is not an image").unwrap();

    let report = run(&job(&fx), &CancelToken::new(), &mut |_| {}).unwrap();

    assert_eq!(report.state, BatchState::Completed);
    assert_eq!(report.total, 5);
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed(), 1);

    let failed = &report.results[2];
    assert_eq!(failed.file_name(), "3.png");
    assert!(matches!(
        failed.status,
        JobStatus::Failed {
            kind: ErrorKind::ImageDecode,
            ..
        }
    ));
    assert_eq!(report.failures()[0].0, "3.png");

    assert_eq!(
        output_names(&fx.output),
        ["1.png", "2.png", "4.png", "5.png"]
    );
}

#[test]
fn cancellation_stops_after_current_file() {
    let fx = fixture();
    for i in 1..=5 {
        write_rgb(&fx.input, &format!("{i}.png"));
    }

    let cancel = CancelToken::new();
    let mut seen = Vec::new();
    let report = run(&job(&fx), &cancel, &mut |p| {
        seen.push(p.current);
        if p.current == 2 {
            cancel.cancel();
        }
    })
    .unwrap();

    assert_eq!(report.state, BatchState::Cancelled);
    assert_eq!(report.total, 5);
    assert_eq!(report.results.len(), 2);
    assert_eq!(seen, [1, 2]);
    assert_eq!(output_names(&fx.output), ["1.png", "2.png"]);
}

#[test]
fn watermark_is_visible_and_tiled_in_output() {
    let fx = fixture();
    write_rgb(&fx.input, "photo.png");

    run(&job(&fx), &CancelToken::new(), &mut |_| {}).unwrap();

    let out = image::open(fx.output.join("photo.png")).unwrap();
    let out = out.as_rgb8().expect("RGB stays RGB");
    assert_eq!(out.dimensions(), (64, 48));
    // a 12x6 tile repeated: every tile origin is reddened
    for (x, y) in [(0, 0), (12, 6), (60, 42), (63, 47)] {
        let px = out.get_pixel(x, y);
        assert!(px[0] > px[1], "pixel ({x},{y}) = {px:?}");
    }
}

#[test]
fn single_placement_marks_only_the_corner() {
    let fx = fixture();
    RgbImage::from_pixel(200, 160, Rgb([240, 240, 240]))
        .save(fx.input.join("photo.png"))
        .unwrap();
    let mut job = job(&fx);
    job.options.placement = Placement::Single;

    run(&job, &CancelToken::new(), &mut |_| {}).unwrap();

    let out = image::open(fx.output.join("photo.png")).unwrap().to_rgb8();
    // 40x20 tile inset from the bottom-right corner
    let (x, y) = (200 - 40 - CORNER_PADDING, 160 - 20 - CORNER_PADDING);
    let marked = out.get_pixel(x + 5, y + 5);
    assert!(marked[0] > marked[1], "corner pixel {marked:?}");
    for (px, py) in [(0, 0), (10, 10), (100, 80), (199, 159), (x - 1, y)] {
        assert_eq!(out.get_pixel(px, py), &Rgb([240, 240, 240]), "({px},{py})");
    }
}

#[test]
fn channel_modes_are_preserved() {
    let fx = fixture();
    GrayImage::from_pixel(40, 40, Luma([200]))
        .save(fx.input.join("gray.png"))
        .unwrap();
    let rgba = RgbaImage::from_fn(40, 40, |x, _| {
        Rgba([50, 60, 70, u8::try_from(x * 6).unwrap()])
    });
    rgba.save(fx.input.join("alpha.png")).unwrap();

    let report = run(&job(&fx), &CancelToken::new(), &mut |_| {}).unwrap();
    assert_eq!(report.succeeded, 2);

    let gray = image::open(fx.output.join("gray.png")).unwrap();
    assert!(gray.as_luma8().is_some());

    let alpha = image::open(fx.output.join("alpha.png")).unwrap();
    let alpha = alpha.as_rgba8().expect("RGBA stays RGBA");
    for (a, b) in alpha.pixels().zip(rgba.pixels()) {
        assert_eq!(a[3], b[3]);
    }
}

#[test]
fn missing_watermark_image_is_fatal() {
    let fx = fixture();
    write_rgb(&fx.input, "a.png");
    let mut job = job(&fx);
    job.watermark = WatermarkSpec::Image {
        path: fx.input.join("missing-logo.png"),
    };

    let err = run(&job, &CancelToken::new(), &mut |_| {}).unwrap_err();
    assert!(matches!(err, Error::WatermarkLoad { .. }));
    assert!(!fx.output.exists());
}

#[test]
fn unknown_font_without_fallback_is_fatal() {
    let fx = fixture();
    write_rgb(&fx.input, "a.png");
    let mut text = TextWatermark::new(TextContent::Plain("secret".into()));
    text.font = "No Such Font Family 0xDEADBEEF".into();
    let mut job = job(&fx);
    job.watermark = WatermarkSpec::Text(text);

    let err = run(&job, &CancelToken::new(), &mut |_| {}).unwrap_err();
    assert!(matches!(err, Error::FontLoad(_)));
}

#[test]
fn missing_input_folder_is_fatal() {
    let fx = fixture();
    let mut job = job(&fx);
    job.input_dir = fx.input.join("nope");

    let err = run(&job, &CancelToken::new(), &mut |_| {}).unwrap_err();
    assert!(matches!(err, Error::Directory { .. }));
}

#[test]
fn empty_folder_completes_with_nothing_to_do() {
    let fx = fixture();
    std::fs::write(fx.input.join("readme.txt"), b"not an image").unwrap();

    let report = run(&job(&fx), &CancelToken::new(), &mut |_| {}).unwrap();
    assert_eq!(report.state, BatchState::Completed);
    assert_eq!(report.total, 0);
    assert!(report.results.is_empty());
}

#[test]
fn spawned_batch_reports_progress() {
    let fx = fixture();
    for name in ["a.png", "b.jpg", "c.bmp"] {
        write_rgb(&fx.input, name);
    }

    let handle = spawn(job(&fx)).unwrap();
    let updates: Vec<_> = handle.progress().iter().collect();
    let state = handle.state();
    let report = handle.join().unwrap();

    assert_eq!(state, BatchState::Completed);
    assert_eq!(report.state, BatchState::Completed);
    assert_eq!(report.succeeded, 3);
    assert_eq!(
        updates.iter().map(|p| p.current).collect::<Vec<_>>(),
        [1, 2, 3]
    );
    assert!(updates.iter().all(|p| p.total == 3));
    assert_eq!(output_names(&fx.output), ["a.png", "b.jpg", "c.bmp"]);
}

#[test]
fn text_watermark_batch() {
    let fx = fixture();
    write_rgb(&fx.input, "a.png");

    let mut text = TextWatermark::new(TextContent::SenderReceiver {
        sender: "Alice".into(),
        receiver: "Bob".into(),
    });
    text.font = "DejaVu Sans".into();
    text.style = TextStyle::Outlined;
    text.color = [0, 0, 200];
    let mut job = job(&fx);
    job.watermark = WatermarkSpec::Text(text);
    job.options.allow_font_fallback = true;

    let report = match run(&job, &CancelToken::new(), &mut |_| {}) {
        Ok(report) => report,
        // no fonts installed on this machine
        Err(Error::FontLoad(_)) => return,
        Err(e) => panic!("unexpected error: {e}"),
    };
    assert_eq!(report.succeeded, 1);

    let out = image::open(fx.output.join("a.png")).unwrap().to_rgb8();
    assert!(out.pixels().any(|p| *p != Rgb([240, 240, 240])));
}
