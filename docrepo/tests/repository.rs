use bson::doc;
use docrepo::{memory::InMemoryStore, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
struct Product {
    #[serde(skip)]
    header: EntityHeader,
    name: String,
    price: i64,
    sku: Option<String>,
}

impl Product {
    fn new(name: &str, price: i64) -> Self {
        Self { name: name.into(), price, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Entity)]
#[entity(collection = "catalog")]
struct CatalogEntry {
    #[serde(skip)]
    header: EntityHeader,
    title: String,
}

fn store() -> DocumentStore<InMemoryStore> {
    DocumentStore::new(InMemoryStore::new())
}

#[tokio::test]
async fn insert_assigns_identity_and_initial_revision() {
    let products = store().repository::<Product>();

    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();

    assert!(!inserted.id().is_empty());
    assert_eq!(inserted.version(), 0);
    assert!(inserted.header().created_at().is_some());
    assert_eq!(inserted.header().created_at(), inserted.header().updated_at());

    let fetched = products.get(inserted.id()).await.unwrap().unwrap();
    assert_eq!(fetched.header(), inserted.header());
    assert_eq!(fetched.name, "lamp");
    assert_eq!(products.collection(), "Products");
}

#[tokio::test]
async fn insert_keeps_caller_assigned_id() {
    let products = store().repository::<Product>();
    let product = Product { header: EntityHeader::with_id("lamp-1"), ..Product::new("lamp", 30) };

    let inserted = products.insert(product).await.unwrap();

    assert_eq!(inserted.id(), "lamp-1");
}

#[tokio::test]
async fn duplicate_insert_is_rejected_with_the_entity() {
    let products = store().repository::<Product>();
    let first = products.insert(Product::new("lamp", 30)).await.unwrap();

    let duplicate = Product { header: EntityHeader::with_id(first.id()), ..Product::new("desk", 90) };
    let err = products.insert(duplicate).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    assert!(err.is_conflict());
    assert_eq!(err.entity().unwrap().name, "desk");

    let stored = products.get(first.id()).await.unwrap().unwrap();
    assert_eq!(stored.name, "lamp");
}

#[tokio::test]
async fn update_bumps_version_and_keeps_creation_time() {
    let products = store().repository::<Product>();
    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();

    let mut current = inserted.clone();
    for expected in 1..=3 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let previous_updated_at = current.header().updated_at();

        current.price += 5;
        current = products.update(current).await.unwrap();
        assert_eq!(current.version(), expected);
        assert!(current.header().updated_at() > previous_updated_at);
    }

    let stored = products.get(inserted.id()).await.unwrap().unwrap();
    assert_eq!(stored.version(), 3);
    assert_eq!(stored.price, 45);
    assert_eq!(stored.header().created_at(), inserted.header().created_at());
    assert_eq!(stored.header().updated_at(), current.header().updated_at());
    assert!(stored.header().updated_at() > inserted.header().updated_at());
}

#[tokio::test]
async fn stale_update_is_a_version_conflict() {
    let products = store().repository::<Product>();
    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();

    let mut winner = inserted.clone();
    winner.price = 35;
    products.update(winner).await.unwrap();

    let mut stale = inserted.clone();
    stale.price = 20;
    let err = products.update(stale).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::VersionConflict);
    let rejected = err.into_entity().unwrap();
    assert_eq!(rejected.version(), 0);
    assert_eq!(rejected.header().updated_at(), inserted.header().updated_at());
    assert_eq!(rejected.price, 20);

    let stored = products.get(inserted.id()).await.unwrap().unwrap();
    assert_eq!(stored.price, 35);
    assert_eq!(stored.version(), 1);
}

#[tokio::test]
async fn retry_after_reread_succeeds() {
    let products = store().repository::<Product>();
    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();
    products.update(inserted.clone()).await.unwrap();

    let err = products.update(inserted.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionConflict);

    let mut fresh = products.get(inserted.id()).await.unwrap().unwrap();
    fresh.name = "desk lamp".into();
    let updated = products.update(fresh).await.unwrap();

    assert_eq!(updated.version(), 2);
}

#[tokio::test]
async fn update_of_deleted_entity_is_not_found() {
    let products = store().repository::<Product>();
    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();
    products.delete(inserted.id()).await.unwrap();

    let err = products.update(inserted).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn update_of_unknown_id_is_not_found() {
    let products = store().repository::<Product>();
    let ghost = Product { header: EntityHeader::with_id("missing"), ..Product::new("ghost", 0) };

    let err = products.update(ghost).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(products.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn update_without_id_is_a_validation_error() {
    let products = store().repository::<Product>();

    let err = products.update(Product::new("lamp", 30)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(products.count().await.unwrap(), 0);
}

#[tokio::test]
async fn delete_returns_removed_revision() {
    let products = store().repository::<Product>();
    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();
    let updated = products.update(inserted.clone()).await.unwrap();

    let removed = products.delete(inserted.id()).await.unwrap().unwrap();
    assert_eq!(removed.version(), updated.version());

    assert!(products.delete(inserted.id()).await.unwrap().is_none());
    assert!(products.get(inserted.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_stored_fields_survive_read_then_write() {
    let store = store();
    store
        .backend()
        .insert_document(
            doc! { "_id": "p-1", "name": "lamp", "price": 30_i64, "version": 0_i64, "legacy_code": "L-7" },
            "Products",
        )
        .await
        .unwrap();
    let products = store.repository::<Product>();

    let mut product = products.get("p-1").await.unwrap().unwrap();
    assert_eq!(product.header().metadata().get_str("legacy_code").unwrap(), "L-7");

    product.price = 40;
    product.header_mut().metadata_mut().insert("reviewed", true);
    products.update(product).await.unwrap();

    let raw = store.backend().find_document("p-1", "Products").await.unwrap().unwrap();
    assert_eq!(raw.get_str("legacy_code").unwrap(), "L-7");
    assert!(raw.get_bool("reviewed").unwrap());
    assert_eq!(raw.get_i64("price").unwrap(), 40);
    assert_eq!(raw.get_i64("version").unwrap(), 1);
}

#[tokio::test]
async fn documents_without_version_read_as_initial_revision() {
    let store = store();
    store
        .backend()
        .insert_document(doc! { "_id": "p-1", "name": "lamp", "price": 30_i64 }, "Products")
        .await
        .unwrap();
    let products = store.repository::<Product>();

    let product = products.get("p-1").await.unwrap().unwrap();
    assert_eq!(product.version(), 0);

    let updated = products.update(product).await.unwrap();
    assert_eq!(updated.version(), 1);
}

#[tokio::test]
async fn null_fields_are_not_stored() {
    let store = store();
    let products = store.repository::<Product>();

    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();
    let raw = store.backend().find_document(inserted.id(), "Products").await.unwrap().unwrap();

    assert!(!raw.contains_key("sku"));
    assert!(raw.get_datetime("created_at").is_ok());
    assert_eq!(raw.get_i64("version").unwrap(), 0);
}

#[tokio::test]
async fn ignoring_version_check_lets_stale_writes_through() {
    let store = store();
    let products = store.repository_with::<Product, _>(RepositoryOptions::new().with_ignore_version_check(true));
    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();
    products.update(inserted.clone()).await.unwrap();

    let mut stale = inserted.clone();
    stale.price = 10;
    let written = products.update(stale).await.unwrap();

    assert_eq!(written.price, 10);
    assert_eq!(products.get(inserted.id()).await.unwrap().unwrap().price, 10);

    let ghost = Product { header: EntityHeader::with_id("missing"), ..Product::new("ghost", 0) };
    assert_eq!(products.update(ghost).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn unchecked_resubmission_of_one_revision_keeps_succeeding() {
    let products = store().repository_with::<Product, _>(RepositoryOptions::new().with_ignore_version_check(true));
    let base = products.insert(Product::new("lamp", 30)).await.unwrap();

    for _ in 0..5 {
        let written = products.update(base.clone()).await.unwrap();
        assert_eq!(written.version(), 1);
    }

    assert_eq!(products.get(base.id()).await.unwrap().unwrap().version(), 1);
}

#[tokio::test]
async fn collection_names_follow_attribute_and_options() {
    let store = store();
    let entries = store.repository::<CatalogEntry>();
    let archived = store.repository_with::<Product, _>(RepositoryOptions::new().with_collection("archive"));

    entries.insert(CatalogEntry { title: "spring".into(), ..Default::default() }).await.unwrap();
    archived.insert(Product::new("lamp", 30)).await.unwrap();

    assert_eq!(entries.collection(), "catalog");
    assert_eq!(store.list_collections().await.unwrap(), vec!["archive", "catalog"]);

    store.drop_collection("archive").await.unwrap();
    assert_eq!(archived.count().await.unwrap(), 0);
}

#[tokio::test]
async fn listing_is_ordered_and_windowed() {
    let products = store().repository::<Product>();
    for (name, price) in [("e", 50), ("b", 20), ("d", 40), ("a", 10), ("c", 30)] {
        products.insert(Product::new(name, price)).await.unwrap();
    }

    let names = |items: Vec<Product>| items.into_iter().map(|p| p.name).collect::<Vec<_>>();

    assert_eq!(names(products.paginate(2, 0, "price", true).await.unwrap()), vec!["a", "b"]);
    assert_eq!(names(products.paginate(2, 2, "price", true).await.unwrap()), vec!["c", "d"]);
    assert_eq!(names(products.paginate(2, 4, "price", true).await.unwrap()), vec!["e"]);
    assert_eq!(names(products.paginate(3, 0, "name", false).await.unwrap()), vec!["e", "d", "c"]);
    assert!(products.paginate(2, 10, "price", true).await.unwrap().is_empty());

    assert_eq!(products.get_all().await.unwrap().len(), 5);
    assert_eq!(products.count().await.unwrap(), 5);
}

#[tokio::test]
async fn windows_over_ties_are_stable_and_disjoint() {
    let products = store().repository::<Product>();
    for index in 0..7 {
        let product = Product {
            header: EntityHeader::with_id(format!("p-{index}")),
            ..Product::new("same", 10)
        };
        products.insert(product).await.unwrap();
    }

    let mut seen = Vec::new();
    for skip in (0..7).step_by(3) {
        let window = products.paginate(3, skip, "price", true).await.unwrap();
        let again = products.paginate(3, skip, "price", true).await.unwrap();

        let ids = window.iter().map(|p| p.id().to_string()).collect::<Vec<_>>();
        assert_eq!(ids, again.iter().map(|p| p.id().to_string()).collect::<Vec<_>>());
        seen.extend(ids);
    }

    let expected = (0..7).map(|index| format!("p-{index}")).collect::<Vec<_>>();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn id_order_key_sorts_by_primary_key() {
    let products = store().repository::<Product>();
    for id in ["b", "c", "a"] {
        let product = Product { header: EntityHeader::with_id(id), ..Product::new(id, 1) };
        products.insert(product).await.unwrap();
    }

    let descending = products.paginate(10, 0, "id", false).await.unwrap();

    assert_eq!(descending.iter().map(|p| p.id()).collect::<Vec<_>>(), vec!["c", "b", "a"]);
}

#[tokio::test]
async fn pages_carry_count_and_navigation() {
    let products = store().repository::<Product>();
    for price in 1..=12 {
        products.insert(Product::new("item", price)).await.unwrap();
    }

    let page = products
        .page(PaginationParams::new(2, 5), "price", SortDirection::Asc)
        .await
        .unwrap();

    assert_eq!(page.count, 12);
    assert_eq!(page.items.iter().map(|p| p.price).collect::<Vec<_>>(), vec![6, 7, 8, 9, 10]);
    assert_eq!(page.previous_page, Some(1));
    assert_eq!(page.next_page, Some(3));

    let last = products
        .page(PaginationParams::new(3, 5), "price", SortDirection::Asc)
        .await
        .unwrap();
    assert_eq!(last.items.len(), 2);
    assert_eq!(last.next_page, None);
}

#[tokio::test]
async fn connect_resolves_memory_scheme() {
    let store = docrepo::connect("memory://app").await.unwrap();
    let products = store.repository::<Product>();

    let inserted = products.insert(Product::new("lamp", 30)).await.unwrap();
    assert!(products.get(inserted.id()).await.unwrap().is_some());

    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn connect_rejects_unknown_schemes() {
    for dsn in ["ftp://host/db", "not a dsn"] {
        let err = docrepo::connect(dsn).await.unwrap_err();
        assert!(matches!(err, StoreError::Initialization(_)), "{dsn}: {err}");
    }
}

#[cfg(not(feature = "mongodb"))]
#[tokio::test]
async fn connect_requires_feature_for_mongodb() {
    let err = docrepo::connect("mongodb://localhost:27017/app").await.unwrap_err();

    assert!(matches!(err, StoreError::Initialization(_)));
}
