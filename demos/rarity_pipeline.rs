//! Rarity pipeline demo
//!
//! Seeds a fresh collection with monsters, trains the rarity model, writes
//! it to disk, restores it and classifies a handful of monsters.
//!
//! Run with: cargo run --example rarity_pipeline
//! Set `RUST_LOG=debug` for driver-level events.

use monster_lab::generator::{MONSTER_FEATURES, RARITY_FIELD};
use monster_lab::model::{DEFAULT_ARTIFACT_PATH, DEFAULT_LABEL};
use monster_lab::store::DEFAULT_SEED_AMOUNT;
use monster_lab::{logging, Database, Model, DEFAULT_COLLECTION};

#[tokio::main]
async fn main() -> monster_lab::Result<()> {
    logging::init_tracing()?;

    println!("=== monster-lab: Rarity Pipeline ===\n");

    let db = Database::builder().build()?;
    let store = db.collection(DEFAULT_COLLECTION)?;

    store.reset().await?;
    store.seed(DEFAULT_SEED_AMOUNT).await?;
    println!("Collection '{}' holds {} monsters", store.collection(), store.count().await?);

    let exported = store.export().await?;
    let preview = exported.select(&["Name", "Type", "Level", "Rarity", "Damage"])?;
    for index in 0..3 {
        println!("{}", preview.row(index)?.render()?);
    }

    let mut columns = MONSTER_FEATURES.to_vec();
    columns.push(RARITY_FIELD);
    let view = exported.select(&columns)?;

    let model = Model::fit(&view, DEFAULT_LABEL)?;
    println!("\n{}", model.describe()?);
    println!("Classes: {:?}", model.classes());

    let record = model.save(DEFAULT_ARTIFACT_PATH)?;
    println!(
        "Saved {} ({} bytes, format v{})",
        record.path().display(),
        record.size_bytes(),
        record.format_version()
    );

    let restored = Model::restore(DEFAULT_ARTIFACT_PATH)?;
    println!("Restored: {}\n", restored.describe()?);

    for index in 0..5 {
        let row = view.row(index)?;
        let actual = row.clone();
        let features = row.drop_columns(&[RARITY_FIELD])?;
        let prediction = restored.predict(&features)?;
        println!(
            "monster {index}: predicted {} ({:.1}% confident)",
            prediction.label,
            prediction.confidence * 100.0
        );
        println!("{}", actual.render()?);
    }

    db.close();
    Ok(())
}
