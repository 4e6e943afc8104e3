//! Frame composite benchmarks over the fixed-advance painter.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use subgloss::compositor::{compose_frame, new_surface, VideoFrame};
use subgloss::driver::{ExportDriver, OverlaySession};
use subgloss::overlay_config::OverlayConfig;
use subgloss::subtitle::parse_srt;
use subgloss::text::FixedAdvancePainter;

const SONG: &str = "1\n00:00:00,000 --> 00:00:05,000\n\
(yue)我愛香港 hello 你好我愛香港(en)I love Hong Kong, hello, I love Hong Kong\n\n";

fn bench_compose(c: &mut Criterion) {
    let session = OverlaySession::new(OverlayConfig::default(), parse_srt(SONG));
    let segment = session.segments.first();

    let mut group = c.benchmark_group("compose_frame");
    group.sample_size(30);

    group.bench_function("overlay_only_portrait", |b| {
        let (width, height) = session.config.output_dimensions();
        let mut surface = new_surface(width, height).expect("surface");
        let mut painter = FixedAdvancePainter::default();
        b.iter(|| {
            compose_frame(&mut surface, None, segment, &session.context(), &mut painter)
                .expect("compose");
            black_box(surface.data()[0])
        });
    });

    group.bench_function("export_sample_720p", |b| {
        let sample = VideoFrame {
            rgba: [40, 80, 120, 255].repeat(1280 * 720),
            width: 1280,
            height: 720,
            timestamp: 1.0,
        };
        let mut driver = ExportDriver::new(&session, FixedAdvancePainter::default());
        b.iter(|| black_box(driver.process_sample(&sample).expect("sample").data()[0]));
    });

    group.finish();
}

criterion_group!(benches, bench_compose);
criterion_main!(benches);
