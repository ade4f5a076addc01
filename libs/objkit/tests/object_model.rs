//! Object lifecycle, property resolution, and registry behavior.

mod common;

use std::sync::Arc;

use catalog::Step;
use common::{boot, insert, tagged_category, CountingStore};
use objkit::{kernel, Catalog, Edit, ObjectId, SystemBuilder, Value};

#[tokio::test]
async fn concurrent_loads_hit_the_store_once() {
    let store = CountingStore::new(kernel::demo_store());
    let system = SystemBuilder::new(store.clone())
        .with_site(kernel::SITE)
        .boot()
        .await
        .unwrap();

    let id = insert(&system, Catalog::new().with("name", "popular")).await;
    // The insert registered the record; drop it so loads go to the store.
    system.registry().remove(id);

    let loads = (0..10).map(|_| {
        let system = system.clone();
        async move { system.registry().get_loaded(&system, id).await }
    });
    let objects = futures::future::try_join_all(loads).await.unwrap();

    assert_eq!(store.selects_of(id), 1);
    // All callers resolved to the same instance.
    let first = &objects[0];
    assert!(objects.iter().all(|o| Arc::ptr_eq(o, first)));
}

#[tokio::test]
async fn property_reads_are_referentially_stable() {
    let system = boot().await;
    let id = insert(&system, Catalog::new().with("name", "stable")).await;
    let obj = system.registry().get_loaded(&system, id).await.unwrap();

    let a = obj.get("name");
    let b = obj.get("name");
    assert_eq!(a, b);
    assert_eq!(a.unwrap().as_str(), Some("stable"));
}

#[tokio::test]
async fn plural_and_singular_reads_agree() {
    let system = boot().await;
    let cat = insert(&system, tagged_category()).await;
    let id = insert(
        &system,
        Catalog::new()
            .with("__category", Value::Ref(cat))
            .with("tags", "x")
            .with("tags", "y"),
    )
    .await;
    let obj = system.registry().get_loaded(&system, id).await.unwrap();

    let all = obj.get_all("tags");
    assert_eq!(obj.get("tags"), all.first().cloned());
    match obj.get("tags$") {
        Some(Value::List(items)) => assert_eq!(items, all),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn inheritance_merges_self_ancestors_then_defaults() {
    let system = boot().await;
    let cat = insert(&system, tagged_category()).await;
    let b = insert(
        &system,
        Catalog::new()
            .with("__category", Value::Ref(cat))
            .with("name", "B")
            .with("tags", "b1")
            .with("tags", "b2"),
    )
    .await;
    let a = insert(
        &system,
        Catalog::new()
            .with("__category", Value::Ref(cat))
            .with("name", "A")
            .with("extends", Value::Ref(b))
            .with("tags", "a1"),
    )
    .await;

    let obj = system.registry().get_loaded(&system, a).await.unwrap();
    let tags: Vec<String> = obj
        .get_all("tags")
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    assert_eq!(tags, vec!["a1", "b1", "b2", "d"]);
    assert_eq!(obj.get("tags").unwrap().as_str(), Some("a1"));
}

#[tokio::test]
async fn diamond_prototypes_linearize_without_duplicates() {
    let system = boot().await;
    let cat = insert(&system, tagged_category()).await;
    let d = insert(
        &system,
        Catalog::new().with("__category", Value::Ref(cat)).with("tags", "d-own"),
    )
    .await;
    let b = insert(
        &system,
        Catalog::new()
            .with("__category", Value::Ref(cat))
            .with("extends", Value::Ref(d))
            .with("tags", "b-own"),
    )
    .await;
    let c = insert(
        &system,
        Catalog::new()
            .with("__category", Value::Ref(cat))
            .with("extends", Value::Ref(d))
            .with("tags", "c-own"),
    )
    .await;
    let a = insert(
        &system,
        Catalog::new()
            .with("__category", Value::Ref(cat))
            .with("extends", Value::Ref(b))
            .with("extends", Value::Ref(c)),
    )
    .await;

    let obj = system.registry().get_loaded(&system, a).await.unwrap();
    let tags: Vec<String> = obj
        .get_all("tags")
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
    // The shared ancestor contributes exactly once, after both branches.
    assert_eq!(tags, vec!["b-own", "c-own", "d-own", "d"]);
}

#[tokio::test]
async fn imputed_title_derives_from_name() {
    let system = boot().await;
    let id = insert(&system, Catalog::new().with("name", "widget")).await;
    let obj = system.registry().get_loaded(&system, id).await.unwrap();
    assert_eq!(obj.get_str("title").as_deref(), Some("Widget"));
}

#[tokio::test]
async fn eviction_drops_expired_entries_and_reensures_root() {
    let system = boot().await;
    let id = insert(&system, Catalog::new().with("name", "ephemeral")).await;
    let obj = system.registry().get_loaded(&system, id).await.unwrap();

    obj.set_expiry(0);
    system
        .registry()
        .cached(ObjectId::ROOT_CATEGORY)
        .unwrap()
        .set_expiry(0);

    system.purge().await.unwrap();

    assert!(system.registry().cached(id).is_none());
    // The root category was purged too, then re-loaded.
    let root = system.registry().cached(ObjectId::ROOT_CATEGORY).unwrap();
    assert!(root.is_loaded());

    // The next access re-loads a fresh instance of the evicted object.
    let again = system.registry().get_loaded(&system, id).await.unwrap();
    assert!(!Arc::ptr_eq(&obj, &again));
    assert_eq!(again.get_str("name").as_deref(), Some("ephemeral"));
}

#[tokio::test]
async fn newborns_with_cross_references_commit_in_one_batch() {
    let system = boot().await;
    let a = system.create(None, Catalog::new().with("name", "a")).await.unwrap();
    let b = system.create(None, Catalog::new().with("name", "b")).await.unwrap();
    a.set("peer", Value::Ref(b.provisional_id().unwrap())).unwrap();
    b.set("peer", Value::Ref(a.provisional_id().unwrap())).unwrap();

    let loaded = system.insert(&[a.clone(), b.clone()]).await.unwrap();

    let (la, lb) = (&loaded[0], &loaded[1]);
    assert!(la.id().unwrap().is_persistent());
    assert_eq!(a.id(), la.id());
    assert_eq!(la.get_ref("peer"), lb.id());
    assert_eq!(lb.get_ref("peer"), la.id());
}

#[tokio::test]
async fn validation_rejects_unknown_and_repeated_fields() {
    let system = boot().await;
    let cat = insert(&system, tagged_category()).await;
    let category = system.registry().get_loaded(&system, cat).await.unwrap();

    let stray = system
        .create(
            Some(category.clone()),
            Catalog::new().with("mystery", "value"),
        )
        .await
        .unwrap();
    assert!(system.insert(&[stray]).await.is_err());

    let doubled = system
        .create(Some(category), Catalog::new().with("name", "x").with("name", "y"))
        .await
        .unwrap();
    assert!(system.insert(&[doubled]).await.is_err());
}

#[tokio::test]
async fn edits_flow_through_store_and_refresh_the_registry() {
    let system = boot().await;
    let id = insert(&system, Catalog::new().with("x", 1i64)).await;

    let record = system
        .submit_edits(
            id,
            &[Edit::Insert {
                path: vec![],
                pos: 1,
                key: "y".into(),
                value: Value::Int(2),
            }],
        )
        .await
        .unwrap();
    assert_eq!(record.data.get("y").unwrap().as_int(), Some(2));

    // The registry serves the refreshed record.
    let obj = system.registry().get_loaded(&system, id).await.unwrap();
    assert_eq!(obj.get_int("y"), Some(2));

    // And idempotence of an add/remove pair at the same path.
    let record = system
        .submit_edits(
            id,
            &[Edit::Delete {
                path: vec![Step::Key("y".into())],
            }],
        )
        .await
        .unwrap();
    assert_eq!(record.data, Catalog::new().with("x", 1i64));
}

#[tokio::test]
async fn delete_removes_object_and_registry_entry() {
    let system = boot().await;
    let id = insert(&system, Catalog::new().with("name", "doomed")).await;
    let obj = system.registry().get_loaded(&system, id).await.unwrap();

    assert!(system.delete_object(&obj).await.unwrap());
    assert!(system.registry().cached(id).is_none());
    assert!(system.registry().get_loaded(&system, id).await.is_err());
}
