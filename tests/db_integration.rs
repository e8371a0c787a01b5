//! Database integration tests.
//!
//! All tests require TEST_DATABASE_URL to be set.
//! Run with: TEST_DATABASE_URL=postgres://... cargo test --test db_integration
//!
//! Tests should be run single-threaded to avoid conflicts:
//!   cargo test --test db_integration -- --test-threads=1

mod common;

use chrono::Utc;
use estudio::anon_cart::{AnonCartStore, GuestCart, GuestLine};
use estudio::cart::{self, CartMutation, ItemKind};
use estudio::db::{ClientFilter, Database};
use estudio::functions::{DirectEdgeFunctions, EdgeFunctions};
use estudio::order::{self, CreateOrderOutcome, OrderStatus};
use estudio::project::{self, CreateProjectOutcome, MarkReadOutcome, ProjectStatus};

/// Skip the test if TEST_DATABASE_URL is not set.
macro_rules! require_db {
    () => {
        if !common::has_test_db() {
            eprintln!("Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

async fn setup() -> Database {
    common::setup_test_db().await
}

/// Seed the user's cart with a pack (and optionally a service), then turn it
/// into a paid order. Returns the order id.
async fn paid_order(
    db: &Database,
    user_id: &str,
    pack_slug: &str,
    service_slug: Option<&str>,
) -> i64 {
    let pack = common::pack_id(db.pool(), pack_slug).await;
    match cart::add_pack_to_cart(db, user_id, pack).await.unwrap() {
        CartMutation::Applied(_) => {}
        other => panic!("pack add rejected: {:?}", other),
    }
    if let Some(slug) = service_slug {
        let service = common::service_id(db.pool(), slug).await;
        match cart::add_service_to_cart(db, user_id, service).await.unwrap() {
            CartMutation::Applied(_) => {}
            other => panic!("service add rejected: {:?}", other),
        }
    }
    match order::create_order_from_cart(db, user_id, Some("card"), None)
        .await
        .unwrap()
    {
        CreateOrderOutcome::Created { order_id } => order_id,
        other => panic!("order not created: {:?}", other),
    }
}

// --- Catalog ---

#[tokio::test]
async fn connect_to_test_db() {
    require_db!();
    let _db = setup().await;
    // If we get here without panic, connection succeeded
}

#[tokio::test]
async fn seeded_catalog_is_active() {
    require_db!();
    let db = setup().await;

    let packs = db.get_active_packs().await.unwrap();
    assert_eq!(packs.len(), 3);
    assert!(packs.iter().all(|p| p.is_active));

    let services = db.get_active_services().await.unwrap();
    assert_eq!(services.len(), 3);
}

#[tokio::test]
async fn deactivated_pack_leaves_active_list_only() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    assert!(db.deactivate_pack(base).await.unwrap());

    assert_eq!(db.get_active_packs().await.unwrap().len(), 2);
    assert_eq!(db.get_all_packs().await.unwrap().len(), 3);
    assert!(!db.deactivate_pack(999_999).await.unwrap());
}

#[tokio::test]
async fn pack_lookup_by_slug() {
    require_db!();
    let db = setup().await;

    let pack = db.get_pack_by_slug("pack-base").await.unwrap().unwrap();
    assert_eq!(pack.name, "Pack Base");
    assert_eq!(pack.price, 890.0);
    assert!(db.get_pack_by_slug("pack-enterprise").await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_pack_by_slug_updates_in_place() {
    require_db!();
    let db = setup().await;

    let before = common::pack_id(db.pool(), "pack-base").await;
    let after = db
        .upsert_pack(
            "pack-base",
            "Pack Base",
            "Nueva descripción",
            990.0,
            &serde_json::json!(["Diseño responsive"]),
            true,
        )
        .await
        .unwrap();
    assert_eq!(before, after);

    let pack = db.get_pack(after).await.unwrap().unwrap();
    assert_eq!(pack.price, 990.0);
    assert_eq!(pack.description, "Nueva descripción");
    assert_eq!(db.get_all_packs().await.unwrap().len(), 3);
}

// --- Cart CRUD ---

#[tokio::test]
async fn add_pack_creates_cart_with_line() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let outcome = cart::add_pack_to_cart(&db, common::CLIENT_ID, base)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::Applied(_)));

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.item_count, 1);
    assert_eq!(view.total, 890.0);
    assert_eq!(view.items[0].item_type, "pack");
}

#[tokio::test]
async fn repeated_add_grows_quantity_not_lines() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap();
    cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap();

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 2);
    assert_eq!(view.total, 1780.0);
}

#[tokio::test]
async fn service_without_pack_is_rejected() {
    require_db!();
    let db = setup().await;

    let seo = common::service_id(db.pool(), "seo-local").await;
    let outcome = cart::add_service_to_cart(&db, common::CLIENT_ID, seo)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::NoPackInCart));

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn service_with_pack_is_accepted() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let seo = common::service_id(db.pool(), "seo-local").await;
    cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap();
    let outcome = cart::add_service_to_cart(&db, common::CLIENT_ID, seo)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::Applied(_)));

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total, 1240.0);
}

#[tokio::test]
async fn unknown_and_inactive_items_are_rejected() {
    require_db!();
    let db = setup().await;

    let outcome = cart::add_pack_to_cart(&db, common::CLIENT_ID, 999_999)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::UnknownItem));

    let base = common::pack_id(db.pool(), "pack-base").await;
    db.deactivate_pack(base).await.unwrap();
    let outcome = cart::add_pack_to_cart(&db, common::CLIENT_ID, base)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::UnknownItem));
}

#[tokio::test]
async fn quantity_update_sets_value() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let line = match cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap() {
        CartMutation::Applied(line) => line,
        other => panic!("unexpected: {:?}", other),
    };

    let outcome = cart::update_cart_item_quantity(&db, common::CLIENT_ID, line.id, 3, false)
        .await
        .unwrap();
    match outcome {
        CartMutation::Applied(updated) => assert_eq!(updated.quantity, 3),
        other => panic!("unexpected: {:?}", other),
    }

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.total, 2670.0);
}

#[tokio::test]
async fn quantity_zero_removes_the_line() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let line = match cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap() {
        CartMutation::Applied(line) => line,
        other => panic!("unexpected: {:?}", other),
    };

    let outcome = cart::update_cart_item_quantity(&db, common::CLIENT_ID, line.id, 0, false)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::Removed { cascaded: 0 }));

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn quantity_update_for_missing_line_not_found() {
    require_db!();
    let db = setup().await;

    let outcome = cart::update_cart_item_quantity(&db, common::CLIENT_ID, 424_242, 2, false)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::NotFound));
}

#[tokio::test]
async fn carts_are_scoped_per_user() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let line = match cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap() {
        CartMutation::Applied(line) => line,
        other => panic!("unexpected: {:?}", other),
    };

    // Another user cannot touch the line through their own cart.
    let outcome = cart::remove_cart_item(&db, common::OTHER_CLIENT_ID, line.id, false)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::NotFound));

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 1);
}

// --- Last-pack cascade ---

#[tokio::test]
async fn removing_last_pack_with_services_needs_confirmation() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let seo = common::service_id(db.pool(), "seo-local").await;
    let redes = common::service_id(db.pool(), "redes-sociales").await;
    let pack_line = match cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap() {
        CartMutation::Applied(line) => line,
        other => panic!("unexpected: {:?}", other),
    };
    cart::add_service_to_cart(&db, common::CLIENT_ID, seo).await.unwrap();
    cart::add_service_to_cart(&db, common::CLIENT_ID, redes).await.unwrap();

    let outcome = cart::remove_cart_item(&db, common::CLIENT_ID, pack_line.id, false)
        .await
        .unwrap();
    match outcome {
        CartMutation::NeedsConfirmation(impact) => {
            assert!(impact.last_pack);
            assert_eq!(impact.cascaded_service_ids.len(), 2);
        }
        other => panic!("unexpected: {:?}", other),
    }

    // Declined confirmation mutates nothing.
    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 3);
}

#[tokio::test]
async fn confirmed_last_pack_removal_cascades_services() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let seo = common::service_id(db.pool(), "seo-local").await;
    let redes = common::service_id(db.pool(), "redes-sociales").await;
    let pack_line = match cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap() {
        CartMutation::Applied(line) => line,
        other => panic!("unexpected: {:?}", other),
    };
    cart::add_service_to_cart(&db, common::CLIENT_ID, seo).await.unwrap();
    cart::add_service_to_cart(&db, common::CLIENT_ID, redes).await.unwrap();

    let outcome = cart::remove_cart_item(&db, common::CLIENT_ID, pack_line.id, true)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::Removed { cascaded: 2 }));

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn second_pack_removal_skips_the_gate() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let pro = common::pack_id(db.pool(), "pack-pro").await;
    let seo = common::service_id(db.pool(), "seo-local").await;
    let base_line = match cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap() {
        CartMutation::Applied(line) => line,
        other => panic!("unexpected: {:?}", other),
    };
    cart::add_pack_to_cart(&db, common::CLIENT_ID, pro).await.unwrap();
    cart::add_service_to_cart(&db, common::CLIENT_ID, seo).await.unwrap();

    let outcome = cart::remove_cart_item(&db, common::CLIENT_ID, base_line.id, false)
        .await
        .unwrap();
    assert!(matches!(outcome, CartMutation::Removed { cascaded: 0 }));

    // The service survives because another pack remains.
    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 2);
}

#[tokio::test]
async fn removal_impact_preview_does_not_mutate() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let seo = common::service_id(db.pool(), "seo-local").await;
    let pack_line = match cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap() {
        CartMutation::Applied(line) => line,
        other => panic!("unexpected: {:?}", other),
    };
    cart::add_service_to_cart(&db, common::CLIENT_ID, seo).await.unwrap();

    let impact = cart::removal_impact(&db, common::CLIENT_ID, pack_line.id)
        .await
        .unwrap()
        .unwrap();
    assert!(impact.requires_confirmation());

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 2);

    assert!(cart::removal_impact(&db, common::CLIENT_ID, 424_242)
        .await
        .unwrap()
        .is_none());
}

// --- Duplicate cart merge ---

#[tokio::test]
async fn duplicate_carts_merge_on_read() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let stale = db.create_cart(common::CLIENT_ID).await.unwrap();
    let kept = db.create_cart(common::CLIENT_ID).await.unwrap();
    db.upsert_cart_item(stale, "pack", base, 1).await.unwrap();
    db.upsert_cart_item(kept, "pack", base, 2).await.unwrap();
    assert_eq!(db.count_users_with_duplicate_carts().await.unwrap(), 1);

    // The read path folds the stale cart into the newest one.
    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.id, kept);
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);

    assert_eq!(db.get_carts_for_user(common::CLIENT_ID).await.unwrap().len(), 1);
    assert_eq!(db.count_users_with_duplicate_carts().await.unwrap(), 0);
}

#[tokio::test]
async fn merge_keeps_distinct_lines_from_both_carts() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let seo = common::service_id(db.pool(), "seo-local").await;
    let stale = db.create_cart(common::CLIENT_ID).await.unwrap();
    let kept = db.create_cart(common::CLIENT_ID).await.unwrap();
    db.upsert_cart_item(stale, "service", seo, 1).await.unwrap();
    db.upsert_cart_item(kept, "pack", base, 1).await.unwrap();

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.id, kept);
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total, 1240.0);
}

// --- Guest cart migration ---

#[tokio::test]
async fn guest_cart_migrates_into_db_cart() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let seo = common::service_id(db.pool(), "seo-local").await;

    let dir = tempfile::tempdir().unwrap();
    let mut store = AnonCartStore::open(dir.path().join("carts.json"));
    store.add_line("tok", ItemKind::Pack, base).unwrap();
    store.add_line("tok", ItemKind::Pack, base).unwrap();
    store.add_line("tok", ItemKind::Service, seo).unwrap();
    let guest = store.take("tok").unwrap().unwrap();

    let report = cart::migrate_guest_cart(&db, &guest, common::CLIENT_ID)
        .await
        .unwrap();
    assert!(report.migrated);
    assert_eq!(report.lines, 2);
    assert_eq!(report.skipped, 0);

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total, 2.0 * 890.0 + 350.0);
}

#[tokio::test]
async fn migration_merges_into_existing_lines() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap();

    let guest = GuestCart {
        id: "guest".into(),
        lines: vec![GuestLine {
            kind: ItemKind::Pack,
            item_id: base,
            quantity: 2,
        }],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    cart::migrate_guest_cart(&db, &guest, common::CLIENT_ID).await.unwrap();

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 3);
}

#[tokio::test]
async fn migration_skips_unsatisfiable_lines() {
    require_db!();
    let db = setup().await;

    let seo = common::service_id(db.pool(), "seo-local").await;
    // The guest's pack line points at a catalog row that no longer exists,
    // so the service line has no pack to stand on either.
    let guest = GuestCart {
        id: "guest".into(),
        lines: vec![
            GuestLine {
                kind: ItemKind::Pack,
                item_id: 999_999,
                quantity: 1,
            },
            GuestLine {
                kind: ItemKind::Service,
                item_id: seo,
                quantity: 1,
            },
        ],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let report = cart::migrate_guest_cart(&db, &guest, common::CLIENT_ID)
        .await
        .unwrap();
    assert!(!report.migrated);
    assert_eq!(report.lines, 0);
    assert_eq!(report.skipped, 2);

    let view = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn migrating_empty_guest_cart_is_a_noop() {
    require_db!();
    let db = setup().await;

    let guest = GuestCart {
        id: "guest".into(),
        lines: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let report = cart::migrate_guest_cart(&db, &guest, common::CLIENT_ID)
        .await
        .unwrap();
    assert!(!report.migrated);
    assert_eq!(report.lines, 0);
}

// --- Order saga ---

#[tokio::test]
async fn order_snapshots_cart_and_clears_it() {
    require_db!();
    let db = setup().await;

    let base = common::pack_id(db.pool(), "pack-base").await;
    let seo = common::service_id(db.pool(), "seo-local").await;
    cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap();
    cart::add_service_to_cart(&db, common::CLIENT_ID, seo).await.unwrap();

    let outcome = order::create_order_from_cart(&db, common::CLIENT_ID, Some("card"), Some(3))
        .await
        .unwrap();
    let order_id = match outcome {
        CreateOrderOutcome::Created { order_id } => order_id,
        other => panic!("unexpected: {:?}", other),
    };

    let view = order::get_order_with_items(&db, order_id).await.unwrap().unwrap();
    assert_eq!(view.order.status, "paid");
    assert_eq!(view.order.total_amount, 1240.0);
    assert_eq!(view.order.payment_method.as_deref(), Some("card"));
    assert_eq!(view.order.installment_plan, Some(3));
    assert_eq!(view.items.len(), 2);
    assert!(view.items.iter().any(|i| i.price_at_purchase == 890.0));
    assert!(view.items.iter().any(|i| i.price_at_purchase == 350.0));

    // The final saga stage drains the cart.
    let cart = cart::get_cart_with_items(&db, common::CLIENT_ID).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn order_from_empty_cart_is_refused() {
    require_db!();
    let db = setup().await;

    let outcome = order::create_order_from_cart(&db, common::CLIENT_ID, None, None)
        .await
        .unwrap();
    assert!(matches!(outcome, CreateOrderOutcome::EmptyCart));
}

#[tokio::test]
async fn order_requires_a_live_pack_line() {
    require_db!();
    let db = setup().await;

    // A service-only cart can exist when the pack was removed out-of-band.
    let seo = common::service_id(db.pool(), "seo-local").await;
    let cart_id = db.create_cart(common::CLIENT_ID).await.unwrap();
    db.upsert_cart_item(cart_id, "service", seo, 1).await.unwrap();

    let outcome = order::create_order_from_cart(&db, common::CLIENT_ID, None, None)
        .await
        .unwrap();
    assert!(matches!(outcome, CreateOrderOutcome::NoPackInCart));

    // The precondition failed before any write.
    assert!(db.get_orders_for_user(common::CLIENT_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn order_snapshot_survives_price_change() {
    require_db!();
    let db = setup().await;

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    db.upsert_pack("pack-base", "Pack Base", "", 1190.0, &serde_json::json!([]), true)
        .await
        .unwrap();

    let view = order::get_order_with_items(&db, order_id).await.unwrap().unwrap();
    assert_eq!(view.order.total_amount, 890.0);
    assert_eq!(view.items[0].price_at_purchase, 890.0);
    // Display details follow the live catalog; the snapshot does not.
    assert_eq!(view.items[0].item_details.as_ref().unwrap().price, 1190.0);
}

#[tokio::test]
async fn order_snapshot_survives_catalog_deactivation() {
    require_db!();
    let db = setup().await;

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let base = common::pack_id(db.pool(), "pack-base").await;
    db.deactivate_pack(base).await.unwrap();

    let view = order::get_order_with_items(&db, order_id).await.unwrap().unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].price_at_purchase, 890.0);
    assert!(view.items[0].item_details.is_some());
}

#[tokio::test]
async fn orders_list_newest_first_per_user() {
    require_db!();
    let db = setup().await;

    let first = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let second = paid_order(&db, common::CLIENT_ID, "pack-pro", None).await;
    paid_order(&db, common::OTHER_CLIENT_ID, "pack-base", None).await;

    let orders = order::get_user_orders(&db, common::CLIENT_ID).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id, second);
    assert_eq!(orders[1].id, first);
}

#[tokio::test]
async fn order_status_update_and_missing_order() {
    require_db!();
    let db = setup().await;

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    assert!(order::update_order_status(&db, order_id, OrderStatus::Completed, Some("stripe_123"))
        .await
        .unwrap());

    let row = db.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(row.status, "completed");
    assert_eq!(row.payment_id.as_deref(), Some("stripe_123"));

    assert!(!order::update_order_status(&db, 999_999, OrderStatus::Cancelled, None)
        .await
        .unwrap());
}

#[tokio::test]
async fn orphaned_paid_orders_are_counted() {
    require_db!();
    let db = setup().await;

    // Header without lines, the saga's half-failed shape.
    db.insert_order(common::CLIENT_ID, "paid", None, None, 890.0)
        .await
        .unwrap();
    paid_order(&db, common::OTHER_CLIENT_ID, "pack-base", None).await;

    assert_eq!(db.count_orphaned_paid_orders().await.unwrap(), 1);
}

// --- Project creation ---

#[tokio::test]
async fn base_pack_order_yields_ten_day_project() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let outcome = project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap();
    let project_id = match outcome {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };

    let details = project::get_project_details(&db, project_id).await.unwrap().unwrap();
    assert_eq!(details.project.estimated_completion_days, 10);
    assert_eq!(details.project.status, "pending");
    assert_eq!(details.project.name, format!("Proyecto #{}", order_id));
    assert_eq!(details.project.order_id, order_id);

    // Short schedule: no review milestone below twenty days.
    assert_eq!(details.milestones.len(), 4);
    assert_eq!(details.milestones[0].title, "Inicio del proyecto");
    assert!(details.milestones[0].is_completed);
    assert_eq!(details.milestones.last().unwrap().title, "Entrega final");

    // Welcome update and blank questionnaire are seeded alongside.
    assert_eq!(details.updates.len(), 1);
    assert!(!details.updates[0].is_read);
    assert!(details.updates[0].admin_id.is_none());
    let form = details.form.unwrap();
    assert!(!form.is_completed);
}

#[tokio::test]
async fn premium_order_yields_thirty_day_project() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-premium", None).await;
    let outcome = project::create_project_from_order(&db, &functions, order_id, Some("Tienda Online"))
        .await
        .unwrap();
    let project_id = match outcome {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };

    let details = project::get_project_details(&db, project_id).await.unwrap().unwrap();
    assert_eq!(details.project.name, "Tienda Online");
    assert_eq!(details.project.estimated_completion_days, 30);
    assert_eq!(details.milestones.len(), 5);

    let start = details.project.start_date.unwrap();
    let end = details.project.expected_end_date.unwrap();
    assert_eq!((end - start).num_days(), 30);
    assert_eq!(details.milestones.last().unwrap().due_date, end);
}

#[tokio::test]
async fn mid_tier_order_yields_twenty_day_project() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    // Pack Pro: 1890 < 2000 and no "base" in the name.
    let order_id = paid_order(&db, common::CLIENT_ID, "pack-pro", Some("seo-local")).await;
    let outcome = project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap();
    let project_id = match outcome {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };

    let details = project::get_project_details(&db, project_id).await.unwrap().unwrap();
    // Services never count toward the duration estimate.
    assert_eq!(details.project.estimated_completion_days, 20);
    assert_eq!(details.milestones.len(), 5);
    assert_eq!(details.milestones[3].title, "Pruebas y revisión");
}

#[tokio::test]
async fn project_creation_edge_outcomes() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let outcome = project::create_project_from_order(&db, &functions, 999_999, None)
        .await
        .unwrap();
    assert_eq!(outcome, CreateProjectOutcome::OrderNotFound);

    // An order that somehow holds only service lines cannot seed a project.
    let order_id = db
        .insert_order(common::CLIENT_ID, "paid", None, None, 350.0)
        .await
        .unwrap();
    let seo = common::service_id(db.pool(), "seo-local").await;
    db.insert_order_item(order_id, "service", seo, 1, 350.0).await.unwrap();
    let outcome = project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap();
    assert_eq!(outcome, CreateProjectOutcome::NoPackInOrder);
}

#[tokio::test]
async fn second_project_for_same_order_already_exists() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let first = project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap();
    let project_id = match first {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };

    let second = project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap();
    assert_eq!(second, CreateProjectOutcome::AlreadyExists { project_id });

    // Still exactly one project row for the order.
    assert_eq!(db.get_projects_for_user(common::CLIENT_ID).await.unwrap().len(), 1);
}

// --- Project status and milestones ---

#[tokio::test]
async fn terminal_status_stamps_actual_end() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let project_id = match project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap()
    {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };

    assert!(project::set_project_status(&db, project_id, ProjectStatus::InProgress)
        .await
        .unwrap());
    let row = db.get_project(project_id).await.unwrap().unwrap();
    assert_eq!(row.status, "in_progress");
    assert!(row.actual_end_date.is_none());

    project::set_project_status(&db, project_id, ProjectStatus::Completed)
        .await
        .unwrap();
    let row = db.get_project(project_id).await.unwrap().unwrap();
    assert_eq!(row.status, "completed");
    let stamped = row.actual_end_date.unwrap();

    // Reopening keeps the first stamp rather than clearing it.
    project::set_project_status(&db, project_id, ProjectStatus::InProgress)
        .await
        .unwrap();
    let row = db.get_project(project_id).await.unwrap().unwrap();
    assert_eq!(row.actual_end_date.unwrap(), stamped);

    assert!(!project::set_project_status(&db, 999_999, ProjectStatus::Completed)
        .await
        .unwrap());
}

#[tokio::test]
async fn milestone_toggle_is_scoped_to_its_project() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let project_id = match project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap()
    {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };

    let milestones = db.get_project_milestones(project_id).await.unwrap();
    let design = &milestones[1];
    assert!(!design.is_completed);

    assert!(db
        .set_milestone_completed(project_id, design.id, true)
        .await
        .unwrap());
    let milestones = db.get_project_milestones(project_id).await.unwrap();
    assert!(milestones[1].is_completed);

    // Wrong project id: no cross-project writes.
    assert!(!db
        .set_milestone_completed(project_id + 1, design.id, false)
        .await
        .unwrap());
}

// --- Update thread ---

#[tokio::test]
async fn mark_update_read_reports_each_state() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let project_id = match project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap()
    {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };
    let update_id = db.get_project_updates(project_id).await.unwrap()[0].id;

    assert_eq!(
        project::mark_update_read(&db, project_id, update_id).await.unwrap(),
        MarkReadOutcome::Marked
    );
    assert_eq!(
        project::mark_update_read(&db, project_id, update_id).await.unwrap(),
        MarkReadOutcome::AlreadyRead
    );
    assert_eq!(
        project::mark_update_read(&db, project_id, 424_242).await.unwrap(),
        MarkReadOutcome::NotFound
    );
}

#[tokio::test]
async fn unread_badge_counts_across_projects() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let project_id = match project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap()
    {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };

    // The welcome update starts unread.
    assert_eq!(db.count_unread_updates_for_user(common::CLIENT_ID).await.unwrap(), 1);

    project::post_project_update(&db, project_id, "Diseño listo", "Revisa la propuesta", Some(common::ADMIN_ID))
        .await
        .unwrap();
    assert_eq!(db.count_unread_updates_for_user(common::CLIENT_ID).await.unwrap(), 2);

    let update_id = db.get_project_updates(project_id).await.unwrap()[0].id;
    project::mark_update_read(&db, project_id, update_id).await.unwrap();
    assert_eq!(db.count_unread_updates_for_user(common::CLIENT_ID).await.unwrap(), 1);

    // Another user's badge is unaffected.
    assert_eq!(db.count_unread_updates_for_user(common::OTHER_CLIENT_ID).await.unwrap(), 0);
}

#[tokio::test]
async fn posting_to_missing_project_returns_none() {
    require_db!();
    let db = setup().await;

    let posted = project::post_project_update(&db, 999_999, "t", "c", None)
        .await
        .unwrap();
    assert!(posted.is_none());
}

#[tokio::test]
async fn broadcast_reaches_matching_projects_only() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let first_order = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let second_order = paid_order(&db, common::OTHER_CLIENT_ID, "pack-pro", None).await;
    let first = match project::create_project_from_order(&db, &functions, first_order, None)
        .await
        .unwrap()
    {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };
    let second = match project::create_project_from_order(&db, &functions, second_order, None)
        .await
        .unwrap()
    {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };
    project::set_project_status(&db, first, ProjectStatus::InProgress).await.unwrap();

    let report = project::broadcast_update(
        &db,
        Some(ProjectStatus::InProgress),
        "Mantenimiento programado",
        "El panel estará fuera de servicio el sábado.",
    )
    .await
    .unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.posted, 1);
    assert_eq!(report.failed, 0);

    // Welcome update plus the broadcast on the matching project only.
    assert_eq!(db.get_project_updates(first).await.unwrap().len(), 2);
    assert_eq!(db.get_project_updates(second).await.unwrap().len(), 1);

    let all = project::broadcast_update(&db, None, "Aviso", "Para todos").await.unwrap();
    assert_eq!(all.matched, 2);
    assert_eq!(all.posted, 2);
}

// --- Questionnaire form ---

#[tokio::test]
async fn questionnaire_answers_roundtrip() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let project_id = match project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap()
    {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };

    let answers = serde_json::json!({
        "business_name": "Panadería Sol",
        "business_description": "Obrador artesanal en el centro",
        "target_audience": "Vecinos del barrio",
    });
    assert!(db.save_project_form(project_id, &answers, true).await.unwrap());

    let row = db.get_project_form(project_id).await.unwrap().unwrap();
    assert!(row.is_completed);
    assert_eq!(row.form_data["business_name"], "Panadería Sol");

    assert!(!db.save_project_form(999_999, &answers, false).await.unwrap());
}

// --- Profiles and roles ---

#[tokio::test]
async fn user_role_defaults_to_client() {
    require_db!();
    let db = setup().await;

    assert_eq!(db.get_user_role(common::CLIENT_ID).await.unwrap(), "client");
    assert!(db.get_user_profile(common::CLIENT_ID).await.unwrap().is_none());
}

#[tokio::test]
async fn role_changes_roundtrip() {
    require_db!();
    let db = setup().await;

    common::seed_profile(db.pool(), common::ADMIN_ID, "admin").await;
    assert_eq!(db.get_user_role(common::ADMIN_ID).await.unwrap(), "admin");

    assert!(db.set_user_role(common::ADMIN_ID, "client").await.unwrap());
    assert_eq!(db.get_user_role(common::ADMIN_ID).await.unwrap(), "client");
    assert!(!db.set_user_role(common::OTHER_CLIENT_ID, "admin").await.unwrap());
}

#[tokio::test]
async fn profile_upsert_keeps_unspecified_fields() {
    require_db!();
    let db = setup().await;

    db.upsert_user_profile(common::CLIENT_ID, Some("Ada López"), Some("Panadería Sol"), None)
        .await
        .unwrap();
    db.upsert_user_profile(common::CLIENT_ID, None, None, Some("+34 600 000 000"))
        .await
        .unwrap();

    let profile = db.get_user_profile(common::CLIENT_ID).await.unwrap().unwrap();
    assert_eq!(profile.full_name.as_deref(), Some("Ada López"));
    assert_eq!(profile.company.as_deref(), Some("Panadería Sol"));
    assert_eq!(profile.phone.as_deref(), Some("+34 600 000 000"));
    assert_eq!(profile.role, "client");
}

#[tokio::test]
async fn client_list_search_and_counts() {
    require_db!();
    let db = setup().await;

    db.upsert_user_profile(common::CLIENT_ID, Some("Ada López"), Some("Panadería Sol"), None)
        .await
        .unwrap();
    db.upsert_user_profile(common::OTHER_CLIENT_ID, Some("Bruno Díaz"), None, None)
        .await
        .unwrap();
    paid_order(&db, common::CLIENT_ID, "pack-base", None).await;

    let filter = ClientFilter {
        search: Some("Ada".into()),
        ..Default::default()
    };
    let rows = db.get_clients(&filter, 50).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].full_name.as_deref(), Some("Ada López"));
    assert_eq!(rows[0].orders_count, 1);
    assert_eq!(rows[0].projects_count, 0);

    // Unknown sort fields fall back to created_at instead of reaching SQL.
    let filter = ClientFilter {
        sort_by: Some("; DROP TABLE user_profiles".into()),
        sort_dir: Some("sideways".into()),
        ..Default::default()
    };
    assert_eq!(db.get_clients(&filter, 50).await.unwrap().len(), 2);

    let filter = ClientFilter {
        sort_by: Some("full_name".into()),
        sort_dir: Some("asc".into()),
        ..Default::default()
    };
    let rows = db.get_clients(&filter, 50).await.unwrap();
    assert_eq!(rows[0].full_name.as_deref(), Some("Ada López"));
}

#[tokio::test]
async fn account_deletion_drops_carts_and_profile_keeps_orders() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    common::seed_profile(db.pool(), common::CLIENT_ID, "client").await;
    let order_id = paid_order(&db, common::CLIENT_ID, "pack-base", None).await;
    let base = common::pack_id(db.pool(), "pack-base").await;
    cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap();

    functions.delete_account(common::CLIENT_ID).await.unwrap();

    assert!(db.get_carts_for_user(common::CLIENT_ID).await.unwrap().is_empty());
    assert!(db.get_user_profile(common::CLIENT_ID).await.unwrap().is_none());
    // Orders stay as business records.
    assert!(db.get_order(order_id).await.unwrap().is_some());
}

// --- Store gauges ---

#[tokio::test]
async fn housekeeping_counters_reflect_store_state() {
    require_db!();
    let db = setup().await;
    let functions = DirectEdgeFunctions::new(db.clone());

    assert_eq!(db.count_active_carts().await.unwrap(), 0);
    assert_eq!(db.count_projects_in_progress().await.unwrap(), 0);

    let base = common::pack_id(db.pool(), "pack-base").await;
    cart::add_pack_to_cart(&db, common::CLIENT_ID, base).await.unwrap();
    assert_eq!(db.count_active_carts().await.unwrap(), 1);

    let order_id = paid_order(&db, common::OTHER_CLIENT_ID, "pack-pro", None).await;
    let project_id = match project::create_project_from_order(&db, &functions, order_id, None)
        .await
        .unwrap()
    {
        CreateProjectOutcome::Created { project_id } => project_id,
        other => panic!("unexpected: {:?}", other),
    };
    project::set_project_status(&db, project_id, ProjectStatus::InProgress).await.unwrap();
    assert_eq!(db.count_projects_in_progress().await.unwrap(), 1);

    let by_status = db.count_orders_by_status().await.unwrap();
    let paid = by_status.iter().find(|s| s.status == "paid").unwrap();
    assert_eq!(paid.count, 1);
}
