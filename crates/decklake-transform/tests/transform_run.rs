use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use decklake_ingest::{
    iter_items, Dataset, Description, IngestError, ItemCallback, IterItemsOption, IterSummary,
    ResolvedIterOptions, RunContext, RunSummary, UpdateOption,
};
use decklake_fetch::Fetcher;
use decklake_model::games::magic::{MagicSet, SetCard};
use decklake_model::{CardDesc, Collection, CollectionType, Game, Partition};
use decklake_store::{codec, collection_key, BlobStore, LocalFsStore, MemoryStore};
use decklake_transform::{
    CardAttributes, CollectionFilter, CooccurrenceTransform, TransformOptions, EDGES_HEADER,
};
use std::sync::Arc;

/// Replay-only dataset over whatever is already stored.
struct StoredDataset {
    desc: Description,
    store: Arc<dyn BlobStore>,
}

#[async_trait]
impl Dataset for StoredDataset {
    fn description(&self) -> Description {
        self.desc.clone()
    }

    async fn extract(
        &self,
        _ctx: &RunContext,
        _fetcher: Arc<Fetcher>,
        _options: &[UpdateOption],
    ) -> Result<RunSummary, IngestError> {
        Err(IngestError::config("stored dataset cannot extract"))
    }

    async fn iter_items(
        &self,
        ctx: &RunContext,
        callback: ItemCallback,
        options: &[IterItemsOption],
    ) -> Result<IterSummary, IngestError> {
        let options = ResolvedIterOptions::resolve(options)?;
        iter_items(
            Arc::clone(&self.store),
            &self.desc.key_prefix(),
            ctx,
            callback,
            options,
        )
        .await
    }
}

async fn put(store: &dyn BlobStore, game: &str, source: &str, id: &str, tag: &str, cards: &[(&str, u32)]) {
    let c = Collection::new(
        id,
        format!("https://{source}.test/{id}"),
        source,
        Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).single().expect("date"),
        CollectionType::zero(tag).expect("tag"),
    )
    .with_partition(Partition::new(
        "Main",
        cards.iter().map(|(n, c)| CardDesc::new(*n, *c)).collect(),
    ));
    let key = collection_key(game, source, id, true);
    let bytes = codec::encode_for_key(&key, &c.to_json().expect("json")).expect("zstd");
    store.write(&key, &bytes).await.expect("write");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_replays_every_dataset_into_one_graph() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn BlobStore> = Arc::new(LocalFsStore::new(dir.path().join("blobs")));
    put(store.as_ref(), "magic", "mtgtop8", "1", "MagicDeck", &[("A", 2), ("B", 1)]).await;
    put(store.as_ref(), "magic", "mtgtop8", "2", "MagicDeck", &[("A", 1), ("B", 1)]).await;
    put(store.as_ref(), "magic", "goldfish", "3", "MagicDeck", &[("B", 1), ("C", 1)]).await;
    put(store.as_ref(), "magic", "goldfish", "set-1", "MagicSet", &[("A", 1), ("C", 1)]).await;
    store
        .write("magic/goldfish/broken.json", b"{")
        .await
        .expect("write");

    let datasets: Vec<Arc<dyn Dataset>> = ["mtgtop8", "goldfish"]
        .into_iter()
        .map(|source| {
            Arc::new(StoredDataset {
                desc: Description::new(Game::Magic, source),
                store: Arc::clone(&store),
            }) as Arc<dyn Dataset>
        })
        .collect();

    let transform = Arc::new(CooccurrenceTransform::new(CollectionFilter::decks_only()));
    let summary = transform
        .run(&RunContext::new(), &datasets, TransformOptions::default())
        .await
        .expect("run");
    assert_eq!(summary.collections, 3);
    assert_eq!(summary.filtered_out, 1);
    assert_eq!(summary.unreadable, 1);
    assert_eq!(transform.edge("B", "A").map(|e| (e.set, e.multiset)), Some((2, 3)));
    assert_eq!(transform.edge("B", "C").map(|e| (e.set, e.multiset)), Some((1, 1)));
    assert_eq!(transform.edge("A", "C"), None);

    let csv_path = dir.path().join("edges.csv");
    let mut file = std::fs::File::create(&csv_path).expect("create");
    transform.write_csv(&mut file).expect("csv");
    drop(file);
    let text = std::fs::read_to_string(&csv_path).expect("read");
    assert_eq!(
        text.lines().collect::<Vec<_>>(),
        vec![EDGES_HEADER, "A,A,0,1", "A,B,2,3", "B,C,1,1"]
    );
}

#[tokio::test]
async fn limit_is_shared_across_datasets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn BlobStore> = Arc::new(LocalFsStore::new(dir.path().to_path_buf()));
    for source in ["ygoprodeck", "ygoprodeck-tournament"] {
        for i in 0..6 {
            put(store.as_ref(), "yugioh", source, &i.to_string(), "YGODeck", &[("Ash Blossom", 3), ("Maxx C", 2)]).await;
        }
    }
    let datasets: Vec<Arc<dyn Dataset>> = ["ygoprodeck", "ygoprodeck-tournament"]
        .into_iter()
        .map(|source| {
            Arc::new(StoredDataset {
                desc: Description::new(Game::Yugioh, source),
                store: Arc::clone(&store),
            }) as Arc<dyn Dataset>
        })
        .collect();
    let transform = Arc::new(CooccurrenceTransform::default());
    let summary = transform
        .run(
            &RunContext::new(),
            &datasets,
            TransformOptions {
                limit: Some(8),
                parallel: 2,
            },
        )
        .await
        .expect("run");
    assert_eq!(summary.collections, 8);
    assert_eq!(transform.edge("Ash Blossom", "Maxx C").map(|e| e.multiset), Some(48));

    let capped = Arc::new(CooccurrenceTransform::default());
    let summary = capped
        .run(
            &RunContext::new(),
            &datasets,
            TransformOptions {
                limit: Some(4),
                parallel: 2,
            },
        )
        .await
        .expect("run");
    assert_eq!(summary.collections, 4);
}

#[tokio::test]
async fn stored_sets_supply_card_attributes() {
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let mut set = Collection::new(
        "dmu",
        "https://scryfall.test/sets/dmu",
        "scryfall",
        Utc.with_ymd_and_hms(2022, 9, 9, 0, 0, 0).single().expect("date"),
        CollectionType::MagicSet(MagicSet {
            name: "Dominaria United".to_string(),
            code: Some("DMU".to_string()),
            cards: vec![
                SetCard {
                    name: "Counterspell".to_string(),
                    cmc: 2.0,
                    type_line: "Instant".to_string(),
                },
                SetCard {
                    name: "Sheoldred, the Apocalypse".to_string(),
                    cmc: 4.0,
                    type_line: "Legendary Creature".to_string(),
                },
            ],
            ..MagicSet::default()
        }),
    )
    .with_partition(Partition::new(
        "Main",
        vec![
            CardDesc::new("Counterspell", 1),
            CardDesc::new("Sheoldred, the Apocalypse", 1),
        ],
    ));
    set.scraped_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("date"));
    let key = collection_key("magic", "scryfall", "dmu", false);
    store
        .write(&key, &set.to_json().expect("json"))
        .await
        .expect("write");
    put(store.as_ref(), "magic", "scryfall", "deck-1", "MagicDeck", &[("Counterspell", 4)]).await;

    let dataset: Arc<dyn Dataset> = Arc::new(StoredDataset {
        desc: Description::new(Game::Magic, "scryfall"),
        store,
    });
    let transform = Arc::new(CooccurrenceTransform::new(CollectionFilter::decks_only()));
    let summary = transform
        .run(&RunContext::new(), &[dataset], TransformOptions::default())
        .await
        .expect("run");
    assert_eq!(summary.collections, 1);
    assert_eq!(summary.filtered_out, 1);
    assert_eq!(
        transform.attributes().get("Counterspell"),
        Some(CardAttributes {
            cmc: 2.0,
            type_line: "Instant".to_string(),
        })
    );

    let mut out = Vec::new();
    assert_eq!(transform.attributes().write_csv(&mut out).expect("csv"), 2);
    assert_eq!(
        String::from_utf8(out).expect("utf8"),
        "NAME,CMC,TYPE_LINE\nCounterspell,2,Instant\n\"Sheoldred, the Apocalypse\",4,Legendary Creature\n"
    );
}
