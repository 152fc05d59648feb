//! End-to-end ordering scenarios against the in-memory store.
//!
//! Every test ends by checking that each touched owner's display orders
//! are exactly `1..=N`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use vitrine_db::{
    FilesystemGateway, MediaFamily, MediaFile, MediaStore, MemoryMediaStore, NewMedia, PoolMedia,
    StorageConfig, StorageGateway, StorageLocation,
};
use vitrine_media::MediaLibrary;

struct Harness {
    _dir: TempDir,
    store: MemoryMediaStore,
    gateway: FilesystemGateway,
    library: MediaLibrary,
}

fn harness() -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let mut disks = BTreeMap::new();
    disks.insert("public".to_string(), dir.path().join("public"));
    let storage = StorageConfig {
        disks: disks.clone(),
        pool: StorageLocation::new("public", "images"),
        attached: StorageLocation::new("public", "pictures"),
    };
    let store = MemoryMediaStore::new();
    let gateway = FilesystemGateway::new(disks);
    let library = MediaLibrary::new(
        Arc::new(store.clone()),
        Arc::new(gateway.clone()),
        storage,
    );
    Harness {
        _dir: dir,
        store,
        gateway,
        library,
    }
}

fn attrs(path: &str) -> NewMedia {
    NewMedia {
        path: path.to_string(),
        original_name: path.to_string(),
        mime_type: "image/jpeg".to_string(),
        size: 3,
        note: None,
    }
}

async fn pool_item(h: &Harness, id: Uuid, path: &str, comment: Option<&str>) -> PoolMedia {
    let now = Utc::now();
    let media = PoolMedia {
        id,
        file: MediaFile {
            path: path.to_string(),
            original_name: path.to_string(),
            mime_type: "image/jpeg".to_string(),
            size: 3,
        },
        comment: comment.map(str::to_string),
        created_at: now,
        updated_at: now,
    };
    h.store.insert_pooled(&media).await.expect("insert pool item");
    h.gateway
        .write("public", &format!("images/{}", path), b"jpg")
        .await
        .expect("write pool file");
    media
}

async fn orders(h: &Harness, family: MediaFamily, owner: Uuid) -> Vec<(Uuid, i32)> {
    h.library
        .collection(family)
        .list(owner)
        .await
        .expect("list")
        .into_iter()
        .map(|m| (m.id, m.display_order))
        .collect()
}

async fn assert_contiguous(h: &Harness, family: MediaFamily, owner: Uuid) {
    let got: Vec<i32> = orders(h, family, owner).await.iter().map(|r| r.1).collect();
    let expected: Vec<i32> = (1..=got.len() as i32).collect();
    assert_eq!(got, expected, "{} owner {} is not contiguous", family, owner);
}

#[tokio::test]
async fn test_move_down_then_destroy_retightens() {
    let h = harness();
    let images = h.library.collection(MediaFamily::CollectionImage);
    let owner = Uuid::new_v4();
    let a = images.store(owner, attrs("a.jpg")).await.unwrap();
    let b = images.store(owner, attrs("b.jpg")).await.unwrap();
    let c = images.store(owner, attrs("c.jpg")).await.unwrap();

    assert!(images.move_down(a.id).await.unwrap());
    assert_eq!(
        orders(&h, MediaFamily::CollectionImage, owner).await,
        vec![(b.id, 1), (a.id, 2), (c.id, 3)]
    );

    assert!(images.destroy(b.id).await.unwrap());
    assert_eq!(
        orders(&h, MediaFamily::CollectionImage, owner).await,
        vec![(a.id, 1), (c.id, 2)]
    );

    // Destroying again is a no-op.
    assert!(!images.destroy(b.id).await.unwrap());
}

#[tokio::test]
async fn test_attach_to_empty_owner_gets_first_position() {
    let h = harness();
    let id = Uuid::from_u128(42);
    pool_item(&h, id, "img.jpg", None).await;
    let owner = Uuid::new_v4();

    let attached = h
        .library
        .collection(MediaFamily::ItemImage)
        .attach_from_pool(owner, id, None)
        .await
        .unwrap();

    assert_eq!(attached.id, id);
    assert_eq!(attached.display_order, 1);
    assert_eq!(attached.file.path, "img.jpg");
    assert!(h.store.find_pooled(id).await.unwrap().is_none());
    assert_eq!(h.store.pooled_count().await, 0);
}

#[tokio::test]
async fn test_attach_then_detach_round_trips() {
    let h = harness();
    let owner = Uuid::new_v4();
    let images = h.library.collection(MediaFamily::PartnerImage);
    images.store(owner, attrs("first.jpg")).await.unwrap();
    images.store(owner, attrs("second.jpg")).await.unwrap();

    let original = pool_item(&h, Uuid::now_v7(), "x.jpg", Some("caption")).await;
    let attached = images
        .attach_from_pool(owner, original.id, None)
        .await
        .unwrap();
    assert_eq!(attached.display_order, 3);

    let back = images.detach_to_pool(attached.id).await.unwrap();
    assert_eq!(back.id, original.id);
    assert_eq!(back.file, original.file);
    assert_eq!(back.comment, original.comment);
    assert!(h.store.find_attached(MediaFamily::PartnerImage, original.id).await.unwrap().is_none());

    assert_eq!(orders(&h, MediaFamily::PartnerImage, owner).await.len(), 2);
    assert_contiguous(&h, MediaFamily::PartnerImage, owner).await;
}

#[tokio::test]
async fn test_detach_from_middle_keeps_owner_contiguous() {
    let h = harness();
    let owner = Uuid::new_v4();
    let logos = h.library.collection(MediaFamily::PartnerLogo);
    let ids: Vec<Uuid> = {
        let mut ids = Vec::new();
        for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
            ids.push(logos.store(owner, attrs(name)).await.unwrap().id);
        }
        ids
    };

    logos.detach_to_pool(ids[1]).await.unwrap();
    assert_eq!(
        orders(&h, MediaFamily::PartnerLogo, owner).await,
        vec![(ids[0], 1), (ids[2], 2), (ids[3], 3)]
    );
}

#[tokio::test]
async fn test_mixed_operations_preserve_contiguity() {
    let h = harness();
    let family = MediaFamily::PartnerTranslationImage;
    let collection = h.library.collection(family);
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();

    let mut ids = Vec::new();
    for i in 0..6 {
        let item = pool_item(&h, Uuid::now_v7(), &format!("p{}.jpg", i), None).await;
        let target = if i % 2 == 0 { owner } else { other };
        ids.push(
            collection
                .attach_from_pool(target, item.id, None)
                .await
                .unwrap()
                .id,
        );
    }
    collection.store(owner, attrs("direct.jpg")).await.unwrap();

    collection.move_down(ids[0]).await.unwrap();
    collection.move_up(ids[4]).await.unwrap();
    collection.move_to_position(ids[1], 3).await.unwrap();
    collection.destroy(ids[2]).await.unwrap();
    collection.detach_to_pool(ids[3]).await.unwrap();
    collection.move_to_position(ids[0], 1).await.unwrap();

    assert_contiguous(&h, family, owner).await;
    assert_contiguous(&h, family, other).await;

    // Every id sits in exactly one representation.
    for id in &ids {
        let attached = h.store.find_attached(family, *id).await.unwrap().is_some();
        let pooled = h.store.find_pooled(*id).await.unwrap().is_some();
        assert!(!(attached && pooled), "{} is in both representations", id);
    }
}

#[tokio::test]
async fn test_tighten_ordering_anchored_on_member() {
    let h = harness();
    let owner = Uuid::new_v4();
    let items = h.library.collection(MediaFamily::ItemImage);
    let a = items.store(owner, attrs("a.jpg")).await.unwrap();
    items.store(owner, attrs("b.jpg")).await.unwrap();

    // Already tight.
    assert_eq!(items.tighten_ordering(a.id).await.unwrap(), 0);
    assert_eq!(items.retighten(owner).await.unwrap(), 0);
    assert_contiguous(&h, MediaFamily::ItemImage, owner).await;
}

#[tokio::test]
async fn test_concurrent_stores_get_distinct_positions() {
    let h = harness();
    let items = h.library.collection(MediaFamily::ItemImage);
    let owners = [Uuid::new_v4(), Uuid::new_v4()];

    let tasks = (0..20).map(|i| {
        let items = items.clone();
        let owner = owners[i % 2];
        tokio::spawn(async move { items.store(owner, attrs(&format!("{}.jpg", i))).await })
    });
    for result in futures::future::join_all(tasks).await {
        result.expect("task panicked").expect("store failed");
    }

    for owner in owners {
        assert_eq!(orders(&h, MediaFamily::ItemImage, owner).await.len(), 10);
        assert_contiguous(&h, MediaFamily::ItemImage, owner).await;
    }
}

#[tokio::test]
async fn test_concurrent_moves_on_one_owner_stay_contiguous() {
    let h = harness();
    let images = h.library.collection(MediaFamily::CollectionImage);
    let owner = Uuid::new_v4();
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(images.store(owner, attrs(&format!("{}.jpg", i))).await.unwrap().id);
    }

    let tasks = ids.iter().enumerate().map(|(i, id)| {
        let images = images.clone();
        let id = *id;
        tokio::spawn(async move {
            if i % 2 == 0 {
                images.move_down(id).await
            } else {
                images.move_up(id).await
            }
        })
    });
    for result in futures::future::join_all(tasks).await {
        result.expect("task panicked").expect("move failed");
    }

    assert_contiguous(&h, MediaFamily::CollectionImage, owner).await;
}
