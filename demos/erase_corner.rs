//! Erase the top-right corner of a single image.
//!
//! Usage:
//! ```sh
//! cargo run --example erase_corner -- lama.onnx input.jpg output.jpg
//! ```

use std::env;
use std::process;

use stamp_eraser::{InpaintPipeline, OrtSession, PipelineOptions, ProcessOptions, SessionConfig};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <model> <input> <output>", args[0]);
        process::exit(1);
    }

    let session = OrtSession::from_file(args[1].as_ref(), &SessionConfig::default())
        .expect("failed to load model");
    let mut pipeline = InpaintPipeline::new(PipelineOptions::default());
    pipeline
        .load_model(Box::new(session))
        .expect("failed to bind model");

    let result = pipeline.process_file(args[2].as_ref(), args[3].as_ref(), &ProcessOptions::default());
    if result.success {
        println!("Done: {}", result.message);
    } else {
        eprintln!("Error: {}", result.message);
        process::exit(1);
    }
}
