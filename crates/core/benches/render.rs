use chatmark_core::render_html;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

fn generate_transcript(with_references: bool) -> String {
    let mut s = String::with_capacity(100_000);
    s.push_str("# Channel log\n\n");
    for i in 0..5_000 {
        if with_references && i % 3 == 0 {
            s.push_str(&format!(
                "user{i}: nice work <party:{i}> see [clip: replay-{i}.webm]\n"
            ));
        } else {
            s.push_str(&format!(
                "user{i}: plain message number {i} with **bold** text\n"
            ));
        }
    }
    s
}

fn benchmark_render(c: &mut Criterion) {
    let plain = generate_transcript(false);
    let with_references = generate_transcript(true);
    let mut group = c.benchmark_group("render_throughput");

    group.throughput(Throughput::Bytes(plain.len() as u64));
    group.bench_function("plain_markdown", |b| {
        b.iter(|| render_html(black_box(&plain), false).unwrap())
    });

    group.throughput(Throughput::Bytes(with_references.len() as u64));
    group.bench_function("media_references", |b| {
        b.iter(|| render_html(black_box(&with_references), false).unwrap())
    });

    group.finish();
}

criterion_group!(benches, benchmark_render);
criterion_main!(benches);
