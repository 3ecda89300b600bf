use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stamp_eraser::{
    default_output_path, directory_jobs, ExecutionProvider, InpaintPipeline, MaskPolicy,
    OcrMaskOptions, OcrZone, OrtSession, PipelineOptions, ProcessOptions, ProcessResult,
    RectFraction, RollingAverage, SessionConfig, TesseractCli,
};

#[derive(Parser)]
#[command(
    name = "stamp-eraser",
    about = "Erase stamps, watermarks and text blocks with an inpainting model",
    version,
    after_help = "Simple usage: stamp-eraser -m lama.onnx <image>  (erases the top-right corner)\n\n\
                  With --ocr, words found by tesseract inside the zone are erased instead;\n\
                  if none are found the rectangle is used."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_cleaned.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Inpainting model (ONNX) taking an image and a mask input
    #[arg(short, long)]
    model: PathBuf,

    /// Execution providers in order of preference (cpu, cuda, directml, coreml, webgpu)
    #[arg(short, long, value_delimiter = ',', default_value = "cpu")]
    provider: Vec<ExecutionProvider>,

    /// Rectangle width as a fraction of the image width
    #[arg(long, default_value = "0.28")]
    rect_width: f64,

    /// Rectangle height as a fraction of the image height
    #[arg(long, default_value = "0.24")]
    rect_height: f64,

    /// Detect text with tesseract and erase words inside the zone
    #[arg(long)]
    ocr: bool,

    /// OCR zone as normalized x0,y0,x1,y1
    #[arg(long, value_delimiter = ',', default_values_t = [0.60, 0.00, 1.00, 0.40])]
    zone: Vec<f64>,

    /// Dilation radius in pixels around OCR words
    #[arg(long, default_value = "10")]
    dilate: u32,

    /// Tesseract language list
    #[arg(long, default_value = "eng")]
    lang: String,

    /// Feed the image to the model in BGR channel order
    #[arg(long)]
    bgr: bool,

    /// Working resolution when the model does not declare one
    #[arg(long, default_value = "512")]
    target_size: u32,

    /// Copy original pixels back outside the erased region
    #[arg(long)]
    preserve_unmasked: bool,

    /// Also write the mask used for each image
    #[arg(long)]
    save_mask: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let fraction = RectFraction {
        w: cli.rect_width,
        h: cli.rect_height,
    };
    if !(0.0..=1.0).contains(&fraction.w) || !(0.0..=1.0).contains(&fraction.h) {
        eprintln!("Error: Rectangle fractions must be between 0.0 and 1.0");
        process::exit(1);
    }

    let &[x0, y0, x1, y1] = cli.zone.as_slice() else {
        eprintln!("Error: --zone takes exactly four values");
        process::exit(1);
    };
    if x0 > x1 || y0 > y1 {
        eprintln!("Error: --zone must be ordered as x0,y0,x1,y1");
        process::exit(1);
    }

    let policy = if cli.ocr {
        MaskPolicy::Ocr(OcrMaskOptions {
            zone: OcrZone { x0, y0, x1, y1 },
            dilation: cli.dilate,
            fallback: fraction,
            ..OcrMaskOptions::default()
        })
    } else {
        MaskPolicy::Rectangle(fraction)
    };

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    let session_config = SessionConfig {
        providers: cli.provider.clone(),
    };
    let session = match OrtSession::from_file(&cli.model, &session_config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Fatal: Failed to load model {}: {e}", cli.model.display());
            process::exit(1);
        }
    };

    let mut pipeline = InpaintPipeline::new(PipelineOptions {
        default_target_size: cli.target_size,
        assume_bgr: cli.bgr,
        preserve_unmasked: cli.preserve_unmasked,
    });
    if cli.ocr {
        let tesseract = TesseractCli::default().with_languages(&cli.lang);
        pipeline = pipeline.with_detector(Box::new(tesseract));
    }
    match pipeline.load_model(Box::new(session)) {
        Ok(binding) => {
            if !cli.quiet {
                eprintln!(
                    "Model: image='{}' mask='{}' output='{}' size={}",
                    binding.image_input, binding.mask_input, binding.output, binding.target_size
                );
            }
        }
        Err(e) => {
            eprintln!("Fatal: {e}");
            process::exit(1);
        }
    }

    let jobs = if input_path.is_dir() {
        let Some(output_dir) = cli.output.as_ref().map(PathBuf::from) else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: stamp-eraser -m <model> <input_dir> -o <output_dir>");
            process::exit(1);
        };
        match directory_jobs(input_path, &output_dir) {
            Ok(jobs) => jobs,
            Err(e) => {
                eprintln!("Error: Failed to read directory: {e}");
                process::exit(1);
            }
        }
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![(input_path.to_path_buf(), output_path)]
    };

    let opts = ProcessOptions {
        policy,
        save_mask: cli.save_mask,
    };

    let total = jobs.len();
    let mut average = RollingAverage::new(5);
    let mut success_count = 0u32;
    let mut fail_count = 0u32;

    for (idx, r) in pipeline.process_files(jobs, &opts).enumerate() {
        average.record(r.elapsed());
        print_result(&r, cli.verbose, cli.quiet);
        if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }

        let remaining = u32::try_from(total - idx - 1).unwrap_or(u32::MAX);
        if remaining > 0 && !cli.quiet {
            if let Some(eta) = average.estimate(remaining) {
                eprintln!("  [{}/{total}] ~{} remaining", idx + 1, format_duration(eta));
            }
        }
    }

    if total > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {total})");
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

fn print_result(result: &ProcessResult, verbose: bool, quiet: bool) {
    if quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.success {
        match result.timings {
            Some(t) if verbose => eprintln!(
                "[OK] {filename}: {} (pre {}ms, infer {}ms, post {}ms)",
                result.message,
                t.pre.as_millis(),
                t.infer.as_millis(),
                t.post.as_millis()
            ),
            _ => eprintln!("[OK] {filename}: {}", result.message),
        }
        if verbose {
            eprintln!("  -> {}", result.output.display());
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }
}
