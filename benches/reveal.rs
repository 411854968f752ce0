use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parley::core::presenter::{CancelPolicy, Reveal, RevealStep};
use parley::ui::markdown::{HtmlRenderer, MarkdownRenderer};

fn make_reply(paragraphs: usize) -> String {
    let paragraph = "Lorem **ipsum** dolor sit amet, `consectetur` adipiscing elit. \
Emoji 👩‍💻 and accents é keep the grapheme path honest.\n\n";
    let mut reply = paragraph.repeat(paragraphs);
    reply.push_str("```rust\nfn main() {\n    println!(\"hi\");\n}\n```\n");
    reply
}

/// Steps the reveal to the end, re-rendering every `render_every` units.
fn reveal_all(text: &str, renderer: Option<(&HtmlRenderer, usize)>) -> usize {
    let mut reveal = Reveal::new(text, CancelPolicy::FinalizeFull);
    let mut content = String::with_capacity(text.len());
    let mut rendered = 0;
    while let RevealStep::Unit(unit) = reveal.step() {
        content.push_str(&unit);
        if let Some((renderer, every)) = renderer {
            if reveal.revealed_units() % every == 0 {
                rendered += renderer.render(&content).len();
            }
        }
    }
    rendered
}

fn bench_reveal(c: &mut Criterion) {
    let renderer = HtmlRenderer;

    for &paragraphs in &[4usize, 32usize] {
        let reply = make_reply(paragraphs);
        let units = Reveal::new(&reply, CancelPolicy::FinalizeFull).total_units();

        let mut group = c.benchmark_group(format!("reveal_paragraphs{paragraphs}"));
        group.throughput(Throughput::Elements(units as u64));

        group.bench_function("step_only", |b| b.iter(|| reveal_all(&reply, None)));
        for &every in &[1usize, 16usize] {
            group.bench_with_input(BenchmarkId::new("step_and_render", every), &every, |b, &every| {
                b.iter(|| reveal_all(&reply, Some((&renderer, every))))
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_reveal);
criterion_main!(benches);
