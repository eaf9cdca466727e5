use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::{info, warn};

use crate::models::{CallParticipant, Room, TranscriptionChunk, TranscriptionSession};

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    create_indexes(
        db,
        Room::COLLECTION,
        vec![
            index_unique(bson::doc! { "room_id": 1 }),
            index(bson::doc! { "creator_id": 1 }),
        ],
    )
    .await?;

    // One durable row per (room, user), reused across re-joins
    create_indexes(
        db,
        CallParticipant::COLLECTION,
        vec![
            index_unique(bson::doc! { "room_id": 1, "user_id": 1 }),
            index(bson::doc! { "room_id": 1, "is_currently_in_call": 1 }),
        ],
    )
    .await?;

    create_indexes(
        db,
        TranscriptionSession::COLLECTION,
        vec![
            index_unique(bson::doc! { "session_id": 1 }),
            index(bson::doc! { "room_id": 1, "active": 1 }),
        ],
    )
    .await?;

    create_indexes(
        db,
        TranscriptionChunk::COLLECTION,
        vec![index(bson::doc! { "session_id": 1, "timestamp": 1 })],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    let err = match coll.create_indexes(indexes.clone()).await {
        Ok(_) => {
            info!(collection, "Indexes created");
            return Ok(());
        }
        Err(e) => e,
    };

    // Code 86 (IndexKeySpecsConflict): same index name, different options.
    let conflict = matches!(
        *err.kind,
        mongodb::error::ErrorKind::Command(ref cmd) if cmd.code == 86
    );
    if !conflict {
        return Err(err);
    }

    warn!(collection, "Index options changed, rebuilding indexes");
    coll.drop_indexes().await?;
    coll.create_indexes(indexes).await?;
    info!(collection, "Indexes rebuilt");
    Ok(())
}
