//! Pipeline orchestration: per-file stage sequencing and batch fan-out.
//!
//! Each file runs `Decode -> Resize -> Watermark -> ColorNormalize ->
//! Encode` start to finish on one worker, with no shared mutable state
//! between files. Multi-page sources fan out into one run per page under
//! the same configuration. Batch execution is sequential or spread over a
//! bounded rayon pool; after every completed file a progress callback may
//! request a cooperative stop, in which case in-flight files finish and
//! the report carries partial counts with `stopped = true`.

use image::DynamicImage;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::color::normalize_to_srgb;
use crate::config::ProcessingConfig;
use crate::decode::{decode_bytes, DecodedImage, ImageContext};
use crate::encoder::encode_image;
use crate::error::PipelineError;
use crate::resize::resize_long_edge;
use crate::watermark::{apply_watermark, WatermarkRenderer};

/// External collaborator that turns a PDF into already-rasterized pages.
///
/// Rasterization internals are out of scope for the pipeline; without an
/// installed implementation, PDF inputs fail like any unsupported file.
pub trait PdfRasterizer: Send + Sync {
    fn rasterize(&self, path: &Path, dpi: u32) -> Result<Vec<DynamicImage>, PipelineError>;
}

/// Batch-level tally returned by [`Pipeline::process_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
    pub stopped: bool,
}

/// One unit of work: input path and target output path.
pub type Job = (PathBuf, PathBuf);

/// Per-run pipeline with preloaded watermark state.
pub struct Pipeline {
    config: ProcessingConfig,
    watermark: WatermarkRenderer,
    pdf: Option<Box<dyn PdfRasterizer>>,
}

impl Pipeline {
    /// Validate the configuration and load watermark assets.
    pub fn new(config: ProcessingConfig) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::Config)?;
        let watermark = WatermarkRenderer::from_config(&config.watermark);
        Ok(Self {
            config,
            watermark,
            pdf: None,
        })
    }

    /// Install the PDF rasterization collaborator.
    pub fn with_pdf_rasterizer(mut self, rasterizer: Box<dyn PdfRasterizer>) -> Self {
        self.pdf = Some(rasterizer);
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Process one input file to its output path.
    pub fn process_file(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        if is_pdf(input) {
            self.process_pdf(input, output)
        } else {
            self.process_raster(input, output)
        }
    }

    fn process_raster(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let data = std::fs::read(input).map_err(|e| PipelineError::io(input, e))?;
        let DecodedImage { image, context } = decode_bytes(&data, self.config.auto_orient)?;
        self.run_stages(image, &context, output)
    }

    /// Fan a PDF out into one pipeline run per rasterized page. A page
    /// failure does not abort sibling pages; the file counts as processed
    /// when at least one page lands.
    fn process_pdf(&self, input: &Path, output: &Path) -> Result<(), PipelineError> {
        let rasterizer = self
            .pdf
            .as_deref()
            .ok_or_else(|| PipelineError::Pdf("no PDF rasterizer installed".to_string()))?;

        let pages = rasterizer.rasterize(input, self.config.pdf_dpi)?;
        if pages.is_empty() {
            return Err(PipelineError::Pdf(format!(
                "{}: rasterizer produced no pages",
                input.display()
            )));
        }

        let total = pages.len();
        let mut succeeded = 0usize;

        for (index, page) in pages.into_iter().enumerate() {
            let page_output = page_output_path(output, index + 1);
            match self.run_stages(page, &ImageContext::default(), &page_output) {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    tracing::error!(
                        input = %input.display(),
                        page = index + 1,
                        error = %e,
                        "PDF page failed"
                    );
                }
            }
        }

        tracing::info!(
            input = %input.display(),
            pages = total,
            succeeded = succeeded,
            "Processed PDF pages"
        );

        if succeeded == 0 {
            Err(PipelineError::Pdf(format!(
                "{}: all {} pages failed",
                input.display(),
                total
            )))
        } else {
            Ok(())
        }
    }

    /// The per-image stage chain shared by raster files and PDF pages.
    fn run_stages(
        &self,
        image: DynamicImage,
        context: &ImageContext,
        output: &Path,
    ) -> Result<(), PipelineError> {
        // Resize first so the watermark tile scales against final geometry
        let image = resize_long_edge(image, self.config.long_edge)?;
        let image = apply_watermark(image, &self.watermark);

        let image = if self.config.normalize_color {
            match context.icc_profile.as_deref() {
                Some(icc) => normalize_to_srgb(image, icc),
                None => image,
            }
        } else {
            image
        };

        let encoded = encode_image(&image, context, &self.config)?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
            }
        }
        std::fs::write(output, &encoded.bytes).map_err(|e| PipelineError::io(output, e))?;

        tracing::info!(
            output = %output.display(),
            bytes = encoded.bytes.len(),
            quality = ?encoded.quality,
            "Wrote output"
        );
        Ok(())
    }

    /// Run a batch of jobs, invoking `progress(current, total)` after each
    /// completed file. A `false` return requests a cooperative stop.
    pub fn process_batch<F>(&self, jobs: &[Job], progress: F) -> BatchReport
    where
        F: Fn(usize, usize) -> bool + Sync,
    {
        let report = if self.config.parallel && jobs.len() > 1 {
            self.process_batch_parallel(jobs, &progress)
        } else {
            self.process_batch_sequential(jobs, &progress)
        };

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            total = report.total,
            stopped = report.stopped,
            "Batch complete"
        );
        report
    }

    fn process_batch_sequential<F>(&self, jobs: &[Job], progress: &F) -> BatchReport
    where
        F: Fn(usize, usize) -> bool,
    {
        let total = jobs.len();
        let mut report = BatchReport {
            total,
            ..Default::default()
        };

        for (done, (input, output)) in jobs.iter().enumerate() {
            match self.process_file(input, output) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(input = %input.display(), error = %e, "File failed");
                }
            }

            if !progress(done + 1, total) {
                report.stopped = true;
                tracing::info!("Cancellation requested, stopping batch");
                break;
            }
        }

        report
    }

    fn process_batch_parallel<F>(&self, jobs: &[Job], progress: &F) -> BatchReport
    where
        F: Fn(usize, usize) -> bool + Sync,
    {
        let total = jobs.len();
        let workers = self.config.workers.unwrap_or_else(default_workers).max(1);

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "Worker pool unavailable, falling back to sequential");
                return self.process_batch_sequential(jobs, progress);
            }
        };

        tracing::debug!(workers = workers, files = total, "Dispatching batch to worker pool");

        let stop = AtomicBool::new(false);
        // processed, failed, completed — updated and reported under one lock
        // so progress callbacks observe a consistent, monotonic count
        let state = Mutex::new((0usize, 0usize, 0usize));

        pool.install(|| {
            jobs.par_iter().for_each(|(input, output)| {
                // Not yet started when the stop landed: skip. In-flight
                // files run to completion.
                if stop.load(Ordering::SeqCst) {
                    return;
                }

                let result = self.process_file(input, output);

                let mut guard = state.lock().unwrap_or_else(|p| p.into_inner());
                match result {
                    Ok(()) => guard.0 += 1,
                    Err(e) => {
                        guard.1 += 1;
                        tracing::error!(input = %input.display(), error = %e, "File failed");
                    }
                }
                guard.2 += 1;
                if !progress(guard.2, total) {
                    stop.store(true, Ordering::SeqCst);
                }
            });
        });

        let guard = state.into_inner().unwrap_or_else(|p| p.into_inner());
        BatchReport {
            processed: guard.0,
            failed: guard.1,
            total,
            stopped: stop.load(Ordering::SeqCst),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Deterministic output path `{stem}{suffix}.{ext}` inside `output_dir`.
pub fn derive_output_path(input: &Path, output_dir: &Path, config: &ProcessingConfig) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    output_dir.join(format!(
        "{}{}.{}",
        stem,
        config.output_suffix,
        config.output_format.extension()
    ))
}

/// Output path for one PDF page: `_page_NNN` appended to the file stem.
fn page_output_path(output: &Path, page: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = if extension.is_empty() {
        format!("{}_page_{:03}", stem, page)
    } else {
        format!("{}_page_{:03}.{}", stem, page, extension)
    };

    match output.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use image::{Rgba, RgbaImage};

    fn write_test_image(path: &Path, width: u32, height: u32) {
        let img = RgbaImage::from_pixel(width, height, Rgba([90, 120, 60, 255]));
        DynamicImage::ImageRgba8(img).save(path).unwrap();
    }

    fn quiet_config() -> ProcessingConfig {
        ProcessingConfig {
            parallel: false,
            ..ProcessingConfig::default()
        }
    }

    #[test]
    fn test_derive_output_path() {
        let config = quiet_config();
        let out = derive_output_path(
            Path::new("/in/photos/IMG_1234.tiff"),
            Path::new("/out"),
            &config,
        );
        assert_eq!(out, PathBuf::from("/out/IMG_1234_web.jpg"));
    }

    #[test]
    fn test_derive_output_path_respects_format() {
        let mut config = quiet_config();
        config.output_format = OutputFormat::WebP;
        config.output_suffix = String::new();

        let out = derive_output_path(Path::new("a.png"), Path::new("out"), &config);
        assert_eq!(out, PathBuf::from("out/a.webp"));
    }

    #[test]
    fn test_page_output_path() {
        let out = page_output_path(Path::new("/out/scan_web.jpg"), 3);
        assert_eq!(out, PathBuf::from("/out/scan_web_page_003.jpg"));
    }

    #[test]
    fn test_process_file_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out/in_web.jpg");
        write_test_image(&input, 32, 24);

        let pipeline = Pipeline::new(quiet_config()).unwrap();
        pipeline.process_file(&input, &output).unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_pdf_without_rasterizer_fails() {
        let pipeline = Pipeline::new(quiet_config()).unwrap();
        let err = pipeline
            .process_file(Path::new("doc.pdf"), Path::new("doc_web.jpg"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Pdf(_)));
    }

    struct StubRasterizer {
        pages: usize,
    }

    impl PdfRasterizer for StubRasterizer {
        fn rasterize(&self, _path: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, PipelineError> {
            Ok((0..self.pages)
                .map(|_| {
                    DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                        20,
                        30,
                        Rgba([200, 10, 10, 255]),
                    ))
                })
                .collect())
        }
    }

    #[test]
    fn test_pdf_pages_fan_out() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("doc_web.jpg");

        let pipeline = Pipeline::new(quiet_config())
            .unwrap()
            .with_pdf_rasterizer(Box::new(StubRasterizer { pages: 3 }));

        pipeline
            .process_file(Path::new("doc.pdf"), &output)
            .unwrap();

        for page in 1..=3 {
            let page_path = dir.path().join(format!("doc_web_page_{:03}.jpg", page));
            assert!(page_path.exists(), "missing page {}", page);
        }
        assert!(!output.exists());
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = quiet_config();
        config.jpeg_quality = 0;
        assert!(matches!(
            Pipeline::new(config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_batch_counts_failures_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        let corrupt = dir.path().join("corrupt.jpg");
        write_test_image(&good, 16, 16);
        std::fs::write(&corrupt, b"not an image at all").unwrap();

        let jobs: Vec<Job> = vec![
            (good.clone(), dir.path().join("good_web.jpg")),
            (corrupt, dir.path().join("corrupt_web.jpg")),
            (good, dir.path().join("good2_web.jpg")),
        ];

        let pipeline = Pipeline::new(quiet_config()).unwrap();
        let report = pipeline.process_batch(&jobs, |_, _| true);

        assert_eq!(
            report,
            BatchReport {
                processed: 2,
                failed: 1,
                total: 3,
                stopped: false
            }
        );
    }

    #[test]
    fn test_batch_parallel_matches_sequential_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut jobs = Vec::new();
        for i in 0..6 {
            let input = dir.path().join(format!("in{}.png", i));
            write_test_image(&input, 16, 16);
            jobs.push((input, dir.path().join(format!("in{}_web.jpg", i))));
        }

        let mut config = quiet_config();
        config.parallel = true;
        config.workers = Some(3);

        let pipeline = Pipeline::new(config).unwrap();
        let report = pipeline.process_batch(&jobs, |_, _| true);

        assert_eq!(
            report,
            BatchReport {
                processed: 6,
                failed: 0,
                total: 6,
                stopped: false
            }
        );
    }
}
