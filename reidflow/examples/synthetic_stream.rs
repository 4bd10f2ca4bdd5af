/// Synthetic Re-identification Stream
///
/// Runs the full pipeline over a generated scene of coloured walkers using
/// the stub detector and descriptor backend. Export commands are printed to
/// stdout as JSON lines; the last annotated frame is saved as an image.
///
/// Usage:
///   cargo run --release --example synthetic_stream [config.json] [output.png]
use reidflow::sinks::SnapshotRenderSink;
use reidflow::{
    FrameSource, JsonLinesPublisher, Pipeline, PipelineConfig, StubBackend, SyntheticScene,
    Walker,
};
use std::env;
use std::thread;
use std::time::{Duration, Instant};

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    reidflow::init()?;

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    let output_path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "output_tracks.png".to_string());

    let mut scene = SyntheticScene::new(640, 360, 300)
        .with_walker(Walker::new([230, 60, 60], (40, 120), (3, 0)))
        .with_walker(Walker::new([60, 200, 90], (600, 220), (-2, 0)))
        .with_walker(Walker::new([70, 110, 240], (320, 40), (0, 1)));

    // Pace the scene like a 30 fps camera
    let mut last = Instant::now();
    let source = move || {
        let elapsed = last.elapsed();
        if elapsed < FRAME_INTERVAL {
            thread::sleep(FRAME_INTERVAL - elapsed);
        }
        last = Instant::now();
        scene.next_frame()
    };

    let backend = StubBackend {
        latency: Some((Duration::from_millis(10), Duration::from_millis(60))),
        ..Default::default()
    };

    let start = Instant::now();
    Pipeline::with_backend(config, backend)?.run(
        Box::new(source),
        Box::new(JsonLinesPublisher::new(std::io::stdout())),
        Box::new(SnapshotRenderSink::new(&output_path)),
    )?;

    eprintln!("✓ Finished in {:.1}s", start.elapsed().as_secs_f32());
    Ok(())
}
