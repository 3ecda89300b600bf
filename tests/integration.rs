use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use stamp_eraser::mask::{rectangle_mask, HOLE};
use stamp_eraser::{
    Error, Feeds, InferenceSession, InpaintPipeline, MaskOrigin, MaskPolicy, ModelMetadata,
    OcrMaskOptions, Outputs, PipelineOptions, ProcessOptions, RectFraction, Result, Tensor,
    TensorSpec, WordBox,
};

/// Session that answers with the image feed, or a constant plane, under a chosen name.
struct FakeSession {
    metadata: ModelMetadata,
    reply_as: String,
    fill: Option<f32>,
    fail_on_call: Option<usize>,
    calls: usize,
    delay: Duration,
    extra_output: bool,
    images: Rc<RefCell<Vec<Tensor>>>,
    masks: Rc<RefCell<Vec<Tensor>>>,
}

impl FakeSession {
    fn new(size: i64) -> Self {
        Self {
            metadata: ModelMetadata {
                inputs: vec![
                    TensorSpec::new("image", &[1, 3, size, size]),
                    TensorSpec::new("mask", &[1, 1, size, size]),
                ],
                outputs: vec!["output".to_string()],
            },
            reply_as: "output".to_string(),
            fill: None,
            fail_on_call: None,
            calls: 0,
            delay: Duration::ZERO,
            extra_output: false,
            images: Rc::default(),
            masks: Rc::default(),
        }
    }
}

impl InferenceSession for FakeSession {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn run(&mut self, feeds: &Feeds) -> Result<Outputs> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(Error::Inference("device lost".to_string()));
        }
        if let Some(mask) = feeds.get("mask") {
            self.masks.borrow_mut().push(mask.clone());
        }
        let image = feeds
            .get("image")
            .ok_or_else(|| Error::Inference("missing image feed".to_string()))?;
        self.images.borrow_mut().push(image.clone());
        std::thread::sleep(self.delay);
        let reply = match self.fill {
            Some(v) => Tensor::new(image.shape().to_vec(), vec![v; image.data().len()])?,
            None => image.clone(),
        };
        let mut outputs = Outputs::new();
        outputs.insert(self.reply_as.clone(), reply);
        if self.extra_output {
            outputs.insert("scores".to_string(), Tensor::new(vec![1, 2], vec![0.1, 0.9])?);
        }
        Ok(outputs)
    }
}

fn pipeline_with(session: FakeSession) -> InpaintPipeline {
    let mut pipeline = InpaintPipeline::new(PipelineOptions::default());
    pipeline.load_model(Box::new(session)).unwrap();
    pipeline
}

fn close(a: Rgba<u8>, b: Rgba<u8>, tolerance: u8) -> bool {
    a.0.iter().zip(b.0.iter()).all(|(x, y)| x.abs_diff(*y) <= tolerance)
}

#[test]
fn run_before_load_is_not_ready() {
    let mut pipeline = InpaintPipeline::new(PipelineOptions::default());
    let err = pipeline
        .run(&RgbaImage::new(10, 10), &MaskPolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::NotReady));
}

#[test]
fn load_model_takes_declared_square_size() {
    let mut pipeline = InpaintPipeline::new(PipelineOptions::default());
    let binding = pipeline.load_model(Box::new(FakeSession::new(32))).unwrap();
    assert_eq!(binding.image_input, "image");
    assert_eq!(binding.mask_input, "mask");
    assert_eq!(binding.output, "output");
    assert_eq!(binding.target_size, 32);
}

#[test]
fn load_model_assigns_roles_by_channel_count() {
    let mut session = FakeSession::new(0);
    session.metadata = ModelMetadata {
        inputs: vec![
            TensorSpec::new("a", &[1, 1, -1, -1]),
            TensorSpec::new("b", &[1, 3, -1, -1]),
        ],
        outputs: vec!["out".to_string()],
    };
    let mut pipeline = InpaintPipeline::new(PipelineOptions::default());
    let binding = pipeline.load_model(Box::new(session)).unwrap();
    assert_eq!(binding.image_input, "b");
    assert_eq!(binding.mask_input, "a");
    assert_eq!(binding.output, "out");
    assert_eq!(binding.target_size, 512);
}

#[test]
fn loading_another_model_recomputes_binding() {
    let mut pipeline = pipeline_with(FakeSession::new(32));
    assert_eq!(pipeline.binding().unwrap().target_size, 32);

    pipeline.load_model(Box::new(FakeSession::new(64))).unwrap();
    assert_eq!(pipeline.binding().unwrap().target_size, 64);

    let out = pipeline
        .run(&RgbaImage::new(50, 20), &MaskPolicy::default())
        .unwrap();
    assert_eq!(out.image.dimensions(), (50, 20));
}

#[test]
fn failed_load_leaves_pipeline_unloaded() {
    let mut pipeline = pipeline_with(FakeSession::new(32));
    let mut broken = FakeSession::new(32);
    broken.metadata.outputs.clear();

    let err = pipeline.load_model(Box::new(broken)).unwrap_err();
    assert!(matches!(err, Error::InvalidModel(_)));
    assert!(!pipeline.is_ready());

    pipeline.load_model(Box::new(FakeSession::new(32))).unwrap();
    pipeline.unload();
    assert!(pipeline.binding().is_none());
}

#[test]
fn echo_model_returns_source_geometry_and_color() {
    let mut pipeline = pipeline_with(FakeSession::new(32));
    let color = Rgba([200, 100, 50, 255]);
    let source = RgbaImage::from_pixel(64, 32, color);

    let out = pipeline.run(&source, &MaskPolicy::default()).unwrap();

    assert_eq!(out.image.dimensions(), (64, 32));
    assert_eq!(out.mask.dimensions(), (64, 32));
    assert_eq!(out.origin, MaskOrigin::Rectangle);
    for px in out.image.pixels() {
        assert!(close(*px, color, 2), "got {px:?}");
    }
}

#[test]
fn mask_feed_is_letterboxed_with_empty_padding() {
    let session = FakeSession::new(32);
    let masks = Rc::clone(&session.masks);
    let mut pipeline = pipeline_with(session);

    // 64x32 into 32: pasted 32x16 at y offset 8.
    pipeline
        .run(&RgbaImage::new(64, 32), &MaskPolicy::default())
        .unwrap();

    let masks = masks.borrow();
    assert_eq!(masks.len(), 1);
    let mask = &masks[0];
    assert_eq!(mask.shape(), &[1, 1, 32, 32]);
    let at = |x: usize, y: usize| mask.data()[y * 32 + x];
    assert!(at(31, 0) < 0.5, "padding above the image is not a hole");
    assert!(at(31, 8) > 0.5, "top-right corner of the image is a hole");
    assert!(at(0, 8) < 0.5);
    assert!(at(31, 28) < 0.5, "padding below the image is not a hole");
}

#[test]
fn ocr_without_matches_falls_back_to_rectangle() {
    let detector = |_: &RgbaImage| -> Result<Vec<WordBox>> { Ok(Vec::new()) };
    let mut pipeline = pipeline_with(FakeSession::new(32)).with_detector(Box::new(detector));
    let source = RgbaImage::from_pixel(100, 80, Rgba([9, 9, 9, 255]));

    let out = pipeline
        .run(&source, &MaskPolicy::Ocr(OcrMaskOptions::default()))
        .unwrap();

    assert_eq!(out.origin, MaskOrigin::Fallback);
    assert_eq!(out.mask, rectangle_mask(100, 80, RectFraction::default()));
}

#[test]
fn ocr_failure_falls_back_to_rectangle() {
    let detector =
        |_: &RgbaImage| -> Result<Vec<WordBox>> { Err(Error::Ocr("engine missing".to_string())) };
    let mut pipeline = pipeline_with(FakeSession::new(32)).with_detector(Box::new(detector));

    let out = pipeline
        .run(
            &RgbaImage::new(100, 80),
            &MaskPolicy::Ocr(OcrMaskOptions::default()),
        )
        .unwrap();
    assert_eq!(out.origin, MaskOrigin::Fallback);
}

#[test]
fn ocr_without_detector_falls_back_to_rectangle() {
    let mut pipeline = pipeline_with(FakeSession::new(32));
    let out = pipeline
        .run(
            &RgbaImage::new(100, 80),
            &MaskPolicy::Ocr(OcrMaskOptions::default()),
        )
        .unwrap();
    assert_eq!(out.origin, MaskOrigin::Fallback);
}

#[test]
fn ocr_words_in_zone_are_dilated_into_mask() {
    let detector = |_: &RgbaImage| -> Result<Vec<WordBox>> {
        Ok(vec![
            // Center (160, 15) of 200x100 is inside the top-right zone.
            WordBox::new(150.0, 10.0, 170.0, 20.0),
            // Center (30, 80) is outside.
            WordBox::new(20.0, 75.0, 40.0, 85.0),
        ])
    };
    let mut pipeline = pipeline_with(FakeSession::new(32)).with_detector(Box::new(detector));

    let out = pipeline
        .run(
            &RgbaImage::new(200, 100),
            &MaskPolicy::Ocr(OcrMaskOptions::default()),
        )
        .unwrap();

    assert_eq!(out.origin, MaskOrigin::Ocr { words: 1 });
    assert_eq!(*out.mask.get_pixel(160, 15), HOLE);
    assert_eq!(*out.mask.get_pixel(141, 15), HOLE);
    assert_ne!(*out.mask.get_pixel(30, 80), HOLE);
    assert_ne!(*out.mask.get_pixel(100, 50), HOLE);
}

#[test]
fn batch_continues_after_failed_item() {
    let mut session = FakeSession::new(32);
    session.fail_on_call = Some(2);
    let mut pipeline = pipeline_with(session);

    let sources = vec![
        RgbaImage::new(40, 30),
        RgbaImage::new(40, 30),
        RgbaImage::new(30, 40),
    ];
    let results: Vec<_> = pipeline
        .run_batch(sources, MaskPolicy::default())
        .collect();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(Error::Inference(_))));
    assert_eq!(results[2].as_ref().unwrap().image.dimensions(), (30, 40));
}

#[test]
fn missing_output_is_reported() {
    let mut session = FakeSession::new(32);
    session.reply_as = "something_else".to_string();
    let mut pipeline = pipeline_with(session);

    let err = pipeline
        .run(&RgbaImage::new(16, 16), &MaskPolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::MissingOutput(name) if name == "output"));
}

#[test]
fn extra_model_outputs_are_ignored() {
    let mut session = FakeSession::new(32);
    session.extra_output = true;
    let mut pipeline = pipeline_with(session);

    let out = pipeline
        .run(&RgbaImage::new(40, 20), &MaskPolicy::default())
        .unwrap();
    assert_eq!(out.image.dimensions(), (40, 20));
}

#[test]
fn run_reports_stage_timings() {
    let mut session = FakeSession::new(32);
    session.delay = Duration::from_millis(40);
    let mut pipeline = pipeline_with(session);

    let out = pipeline
        .run(&RgbaImage::new(64, 48), &MaskPolicy::default())
        .unwrap();
    let t = out.timings;

    assert!(t.infer >= Duration::from_millis(40), "{t:?}");
    assert!(t.pre > Duration::ZERO, "{t:?}");
    assert!(t.post > Duration::ZERO, "{t:?}");
    assert!(t.infer > t.pre && t.infer > t.post, "{t:?}");
    assert_eq!(t.total(), t.pre + t.infer + t.post);
}

#[test]
fn assume_bgr_swaps_planes_of_image_feed() {
    let plane = 32 * 32;
    let red = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));

    for (assume_bgr, first, third) in [(false, 1.0, -1.0), (true, -1.0, 1.0)] {
        let session = FakeSession::new(32);
        let images = Rc::clone(&session.images);
        let mut pipeline = InpaintPipeline::new(PipelineOptions {
            assume_bgr,
            ..PipelineOptions::default()
        });
        let binding = pipeline.load_model(Box::new(session)).unwrap();
        assert_eq!(binding.assume_bgr, assume_bgr);

        let out = pipeline.run(&red, &MaskPolicy::default()).unwrap();

        let images = images.borrow();
        let data = images[0].data();
        assert!((data[0] - first).abs() < 0.01, "bgr={assume_bgr}");
        assert!((data[plane] + 1.0).abs() < 0.01);
        assert!((data[2 * plane] - third).abs() < 0.01, "bgr={assume_bgr}");

        // Output planes are read as RGB, so an echoed BGR feed comes back blue.
        let expected = if assume_bgr {
            Rgba([0, 0, 255, 255])
        } else {
            Rgba([255, 0, 0, 255])
        };
        assert!(close(*out.image.get_pixel(4, 4), expected, 1), "bgr={assume_bgr}");
    }
}

#[test]
fn empty_source_is_degenerate() {
    let mut pipeline = pipeline_with(FakeSession::new(32));
    let err = pipeline
        .run(&RgbaImage::new(0, 10), &MaskPolicy::default())
        .unwrap_err();
    assert!(matches!(err, Error::GeometryDegenerate { .. }));
}

#[test]
fn preserve_unmasked_restores_source_outside_hole() {
    let mut session = FakeSession::new(32);
    session.fill = Some(-1.0);
    let mut pipeline = InpaintPipeline::new(PipelineOptions {
        preserve_unmasked: true,
        ..PipelineOptions::default()
    });
    pipeline.load_model(Box::new(session)).unwrap();

    let color = Rgba([120, 130, 140, 255]);
    let source = RgbaImage::from_pixel(100, 100, color);
    let out = pipeline.run(&source, &MaskPolicy::default()).unwrap();

    assert_eq!(*out.image.get_pixel(0, 99), color);
    assert_eq!(*out.image.get_pixel(99, 0), Rgba([0, 0, 0, 255]));
}

#[test]
fn process_file_writes_image_and_mask() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.png");
    RgbaImage::from_pixel(48, 36, Rgba([10, 20, 30, 255]))
        .save(&input)
        .unwrap();
    let output = dir.path().join("out").join("scan_cleaned.jpg");

    let mut pipeline = pipeline_with(FakeSession::new(32));
    let opts = ProcessOptions {
        save_mask: true,
        ..ProcessOptions::default()
    };
    let result = pipeline.process_file(&input, &output, &opts);

    assert!(result.success, "{}", result.message);
    assert_eq!(result.origin, Some(MaskOrigin::Rectangle));
    let written = image::open(&output).unwrap();
    assert_eq!((written.width(), written.height()), (48, 36));
    assert!(dir.path().join("out").join("scan_cleaned_mask.png").exists());
}

#[test]
fn process_directory_skips_non_images() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("in");
    std::fs::create_dir(&input_dir).unwrap();
    for name in ["a.png", "b.png"] {
        RgbaImage::new(20, 20).save(input_dir.join(name)).unwrap();
    }
    std::fs::write(input_dir.join("readme.txt"), b"not an image").unwrap();
    let output_dir = dir.path().join("out");

    let mut pipeline = pipeline_with(FakeSession::new(32));
    let results = pipeline.process_directory(&input_dir, &output_dir, &ProcessOptions::default());

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.success));
    assert!(Path::new(&output_dir.join("a.png")).exists());
    assert!(Path::new(&output_dir.join("b.png")).exists());
}
