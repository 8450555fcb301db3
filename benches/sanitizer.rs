use chat_orchestrator::prompt::{PromptCleaner, PromptSanitizer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_clean(c: &mut Criterion) {
    let sanitizer = PromptSanitizer::new();
    let plain = "How much does a 60 square metre brick house cost to build?";
    let noisy = "Привет!!! 😀👍🏽 Сколько стоит café « with crème brûlée?? #$%^ 🇷🇺  ";
    let long = noisy.repeat(50);

    c.bench_function("clean_plain", |b| b.iter(|| sanitizer.clean(black_box(plain))));
    c.bench_function("clean_emoji_and_diacritics", |b| b.iter(|| sanitizer.clean(black_box(noisy))));
    c.bench_function("clean_long", |b| b.iter(|| sanitizer.clean(black_box(&long))));
}

criterion_group!(benches, bench_clean);
criterion_main!(benches);
