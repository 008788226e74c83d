use criterion::{black_box, criterion_group, criterion_main, Criterion};

use iaedu_adapter::stream::{decode_record, translate, ChunkContext, LineDecoder, ResponseStreamer};

const TOKEN_COUNT: usize = 512;
const MAX_LINE_BYTES: usize = 1024 * 1024;

fn ndjson_tokens(count: usize) -> Vec<u8> {
    let mut body = Vec::with_capacity(count * 48);
    for idx in 0..count {
        if idx % 16 == 0 {
            body.extend_from_slice(b"{\"type\":\"status\",\"content\":\"thinking\"}\n");
        }
        body.extend_from_slice(
            format!("{{\"type\":\"token\",\"content\":\"palavra {idx} \"}}\n").as_bytes(),
        );
    }
    body
}

fn bench_line_decoder(c: &mut Criterion) {
    let body = ndjson_tokens(TOKEN_COUNT);

    c.bench_function("line_decoder_single_chunk_512", |b| {
        let mut lines = Vec::with_capacity(TOKEN_COUNT + TOKEN_COUNT / 16);
        b.iter(|| {
            let mut decoder = LineDecoder::new(MAX_LINE_BYTES);
            lines.clear();
            decoder
                .feed_into(black_box(&body), &mut lines)
                .expect("decode");
            black_box(lines.len());
        });
    });

    // Network reads rarely align with line boundaries.
    c.bench_function("line_decoder_17b_chunks_512", |b| {
        let mut lines = Vec::with_capacity(TOKEN_COUNT + TOKEN_COUNT / 16);
        b.iter(|| {
            let mut decoder = LineDecoder::new(MAX_LINE_BYTES);
            lines.clear();
            for chunk in body.chunks(17) {
                decoder
                    .feed_into(black_box(chunk), &mut lines)
                    .expect("decode");
            }
            black_box(lines.len());
        });
    });
}

fn bench_record_to_frame(c: &mut Criterion) {
    let mut decoder = LineDecoder::new(MAX_LINE_BYTES);
    let lines = decoder
        .feed(&ndjson_tokens(TOKEN_COUNT))
        .expect("decode");

    c.bench_function("record_to_sse_frame_512", |b| {
        b.iter(|| {
            let mut streamer =
                ResponseStreamer::new(ChunkContext::new("chatcmpl-bench", "iaedu-custom"));
            streamer.commit().expect("commit");
            let mut bytes = 0usize;
            for line in &lines {
                let Some(record) = decode_record(black_box(line)) else {
                    continue;
                };
                let Some(chunk) = translate(record, streamer.context()) else {
                    continue;
                };
                bytes += streamer.write_chunk(&chunk).expect("write").len();
            }
            black_box(bytes);
        });
    });
}

criterion_group!(benches, bench_line_decoder, bench_record_to_frame);
criterion_main!(benches);
