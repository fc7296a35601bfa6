//! End-to-end pipeline scenarios: full decode -> resize -> watermark ->
//! normalize -> encode runs against real files on disk.

use image::{DynamicImage, Rgba, RgbaImage};
use std::path::Path;
use sukashi::config::{OutputFormat, ProcessingConfig, WatermarkMode, WatermarkPosition};
use sukashi::pipeline::{BatchReport, Job, Pipeline};

fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
    }))
}

fn write_bmp(path: &Path, image: &DynamicImage) {
    image.to_rgb8().save(path).unwrap();
}

fn base_config() -> ProcessingConfig {
    ProcessingConfig {
        output_format: OutputFormat::Jpeg,
        parallel: false,
        ..ProcessingConfig::default()
    }
}

fn decode_file(path: &Path) -> DynamicImage {
    image::open(path).unwrap()
}

// Scenario A: 4000x3000 RGB, long_edge 1200, tiled text watermark, JPEG
// ceiling 300KB => 1200x900 JPEG within the ceiling, pattern visible.
#[test]
fn test_scenario_a_large_image_tiled_text() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("large.bmp");
    write_bmp(&input, &gradient_image(4000, 3000));

    let mut config = base_config();
    config.long_edge = 1200;
    config.size_ceiling_bytes = 300_000;
    config.watermark = WatermarkMode::TextTiled {
        text: "ACME Media".to_string(),
        color: "#FFFFFF".to_string(),
        opacity: 0.6,
        font_size_ratio: 0.04,
        rotation_degrees: 30.0,
        tile_spacing_ratio: 0.5,
        opacity_reduction: 0.8,
        outline_width: 0,
        outline_color: "#000000".to_string(),
        font: None,
    };

    let watermarked_out = dir.path().join("large_web.jpg");
    let pipeline = Pipeline::new(config.clone()).unwrap();
    pipeline.process_file(&input, &watermarked_out).unwrap();

    let bytes = std::fs::read(&watermarked_out).unwrap();
    assert_eq!(&bytes[0..2], &[0xFF, 0xD8], "output must be JPEG");
    assert!(
        bytes.len() as u64 <= 300_000,
        "ceiling missed: {} bytes",
        bytes.len()
    );

    let decoded = decode_file(&watermarked_out);
    assert_eq!((decoded.width(), decoded.height()), (1200, 900));

    // Same run without the watermark: the repeated pattern must be the
    // only difference, and it must touch a large share of the canvas
    config.watermark = WatermarkMode::None;
    let plain_out = dir.path().join("plain_web.jpg");
    Pipeline::new(config)
        .unwrap()
        .process_file(&input, &plain_out)
        .unwrap();

    let marked = decoded.to_rgba8();
    let plain = decode_file(&plain_out).to_rgba8();
    let differing = marked
        .pixels()
        .zip(plain.pixels())
        .filter(|(a, b)| (a[0] as i16 - b[0] as i16).abs() > 8)
        .count();
    assert!(
        differing > 10_000,
        "tiled watermark barely visible: {} differing pixels",
        differing
    );
}

// Scenario B: 500x500 with long_edge 1200 => dimensions unchanged.
#[test]
fn test_scenario_b_no_upscaling() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("small.bmp");
    write_bmp(&input, &gradient_image(500, 500));

    let mut config = base_config();
    config.long_edge = 1200;

    let output = dir.path().join("small_web.jpg");
    Pipeline::new(config)
        .unwrap()
        .process_file(&input, &output)
        .unwrap();

    let decoded = decode_file(&output);
    assert_eq!((decoded.width(), decoded.height()), (500, 500));
}

// Scenario C: single image watermark, bottom-right, opacity 0.3, scale 0.2
// on a 1000x1000 canvas => 200px-wide mark 20px off the corner.
#[test]
fn test_scenario_c_single_watermark_bottom_right() {
    let dir = tempfile::tempdir().unwrap();

    let asset_path = dir.path().join("mark.png");
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        100,
        100,
        Rgba([255, 255, 255, 255]),
    ))
    .save(&asset_path)
    .unwrap();

    let input = dir.path().join("canvas.bmp");
    write_bmp(
        &input,
        &DynamicImage::ImageRgba8(RgbaImage::from_pixel(1000, 1000, Rgba([20, 20, 20, 255]))),
    );

    let mut config = base_config();
    config.long_edge = 2000;
    config.watermark = WatermarkMode::ImageSingle {
        asset: asset_path,
        opacity: 0.3,
        position: WatermarkPosition::BottomRight,
        scale_ratio: 0.2,
    };

    let output = dir.path().join("canvas_web.jpg");
    Pipeline::new(config)
        .unwrap()
        .process_file(&input, &output)
        .unwrap();

    let decoded = decode_file(&output).to_rgba8();
    assert_eq!(decoded.dimensions(), (1000, 1000));

    // Mark occupies x,y in [780, 980): 1000 - 200 - 20
    let inside = decoded.get_pixel(880, 880);
    assert!(
        inside[0] > 30,
        "watermark not visible inside anchor region: {:?}",
        inside
    );

    let outside = decoded.get_pixel(100, 100);
    assert!(
        (outside[0] as i16 - 20).abs() <= 8,
        "canvas outside the mark should stay untouched: {:?}",
        outside
    );

    // The 20px margin strip stays unmarked
    let margin = decoded.get_pixel(995, 995);
    assert!((margin[0] as i16 - 20).abs() <= 8);
}

fn batch_jobs(dir: &Path, count: usize, corrupt_index: Option<usize>) -> Vec<Job> {
    let mut jobs = Vec::new();
    for i in 1..=count {
        let input = dir.join(format!("file{}.png", i));
        if corrupt_index == Some(i) {
            std::fs::write(&input, b"garbage bytes, not a PNG").unwrap();
        } else {
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                64,
                64,
                Rgba([10 * i as u8, 40, 90, 255]),
            ))
            .save(&input)
            .unwrap();
        }
        let output = dir.join(format!("file{}_web.jpg", i));
        jobs.push((input, output));
    }
    jobs
}

// Scenario D: batch of 5 where file 3 is corrupt => {4, 1, 5, false}.
#[test]
fn test_scenario_d_corrupt_file_does_not_abort_batch() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = batch_jobs(dir.path(), 5, Some(3));

    let pipeline = Pipeline::new(base_config()).unwrap();
    let report = pipeline.process_batch(&jobs, |_, _| true);

    assert_eq!(
        report,
        BatchReport {
            processed: 4,
            failed: 1,
            total: 5,
            stopped: false
        }
    );

    assert!(!dir.path().join("file3_web.jpg").exists());
    assert!(dir.path().join("file5_web.jpg").exists());
}

// Scenario E: progress returns stop after file 2 of 5 => {2, 0, 5, true},
// no further files processed.
#[test]
fn test_scenario_e_cooperative_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = batch_jobs(dir.path(), 5, None);

    let pipeline = Pipeline::new(base_config()).unwrap();
    let report = pipeline.process_batch(&jobs, |current, _| current < 2);

    assert_eq!(
        report,
        BatchReport {
            processed: 2,
            failed: 0,
            total: 5,
            stopped: true
        }
    );

    assert!(dir.path().join("file1_web.jpg").exists());
    assert!(dir.path().join("file2_web.jpg").exists());
    for i in 3..=5 {
        assert!(
            !dir.path().join(format!("file{}_web.jpg", i)).exists(),
            "file {} should not have been processed",
            i
        );
    }
}

// Re-running a batch overwrites outputs in place: same inputs, same paths.
#[test]
fn test_rerun_is_idempotent_at_the_path_level() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = batch_jobs(dir.path(), 2, None);

    let pipeline = Pipeline::new(base_config()).unwrap();
    let first = pipeline.process_batch(&jobs, |_, _| true);
    let second = pipeline.process_batch(&jobs, |_, _| true);

    assert_eq!(first.processed, 2);
    assert_eq!(second.processed, 2);

    let first_bytes = std::fs::read(dir.path().join("file1_web.jpg")).unwrap();
    assert_eq!(&first_bytes[0..2], &[0xFF, 0xD8]);
}

// WebP output path: single-shot encode, correct container.
#[test]
fn test_webp_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(80, 60, Rgba([5, 100, 200, 255])))
        .save(&input)
        .unwrap();

    let mut config = base_config();
    config.output_format = OutputFormat::WebP;

    let output = dir.path().join("in_web.webp");
    Pipeline::new(config)
        .unwrap()
        .process_file(&input, &output)
        .unwrap();

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WEBP");
}

// PNG output keeps dimensions and decodes cleanly.
#[test]
fn test_png_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bmp");
    write_bmp(&input, &gradient_image(120, 90));

    let mut config = base_config();
    config.output_format = OutputFormat::Png;

    let output = dir.path().join("in_web.png");
    Pipeline::new(config)
        .unwrap()
        .process_file(&input, &output)
        .unwrap();

    let decoded = decode_file(&output);
    assert_eq!((decoded.width(), decoded.height()), (120, 90));
}
