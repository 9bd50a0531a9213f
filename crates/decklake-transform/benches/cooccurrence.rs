use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use decklake_model::games::magic::MagicDeck;
use decklake_model::{CardDesc, Collection, CollectionType, Partition};
use decklake_transform::CooccurrenceTransform;

fn bench_add_collection(c: &mut Criterion) {
    let date = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("date");
    let decks: Vec<Collection> = (0..500_u32)
        .map(|i| {
            let main = (0..36_u32)
                .map(|j| CardDesc::new(format!("card-{}", (i * 7 + j * 13) % 2_000), 1 + j % 4))
                .collect();
            let side = (0..15_u32)
                .map(|j| CardDesc::new(format!("card-{}", (i * 3 + j * 31) % 2_000), 1 + j % 3))
                .collect();
            Collection::new(
                i.to_string(),
                format!("https://mtgtop8.test/event?d={i}"),
                "mtgtop8",
                date,
                CollectionType::MagicDeck(MagicDeck::default()),
            )
            .with_partition(Partition::new("Main", main))
            .with_partition(Partition::new("Sideboard", side))
        })
        .collect();

    c.bench_function("cooccurrence_500_decks", |b| {
        b.iter(|| {
            let transform = CooccurrenceTransform::default();
            for deck in &decks {
                transform.add_collection(black_box(deck)).expect("add");
            }
            assert!(!transform.is_empty());
        })
    });
}

criterion_group!(benches, bench_add_collection);
criterion_main!(benches);
