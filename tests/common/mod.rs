//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Once;

/// Fixed auth user ids for seeded test identities. Real deployments get
/// these from Supabase auth; tests mint matching JWTs with [`mint_jwt`].
pub const CLIENT_ID: &str = "11111111-1111-4111-8111-111111111111";
pub const OTHER_CLIENT_ID: &str = "22222222-2222-4222-8222-222222222222";
pub const ADMIN_ID: &str = "99999999-9999-4999-8999-999999999999";

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// One-time schema initialization.
static SCHEMA_INIT: Once = Once::new();

/// Ensure the test database schema is set up (runs migrations once per test suite).
pub fn ensure_schema() {
    SCHEMA_INIT.call_once(|| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let pool = sqlx::PgPool::connect(&test_db_url()).await.unwrap();
            run_migrations(&pool).await;
        });
    });
}

/// Connect to the test database (also ensures schema is set up).
pub async fn setup_test_db() -> estudio::db::Database {
    ensure_schema();
    let db = estudio::db::Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    truncate_all_tables(db.pool()).await;
    db
}

/// Build an Axum test app router connected to the test database.
///
/// The guest-cart store uses a fixed path under /tmp and is wiped per app so
/// carts never leak between tests. Edge functions run in direct mode, so the
/// privileged writes hit the same test database without an HTTP hop.
pub async fn build_test_app() -> axum::Router {
    let db = setup_test_db().await;
    let cart_path = PathBuf::from("/tmp/estudio-test-carts.json");
    estudio::anon_cart::AnonCartStore::clear_files(&cart_path);
    let anon_carts = estudio::anon_cart::AnonCartStore::open(cart_path);
    let functions = Box::new(estudio::functions::DirectEdgeFunctions::new(db.clone()));
    let state = estudio::dashboard::AppState::new(db, anon_carts, functions);
    estudio::dashboard::build_router(state, None)
}

/// Mint a JWT for the given auth user id.
///
/// Tests leave `SUPABASE_JWT_SECRET` unset, so the server parses tokens
/// without verifying the signature; any well-formed HS256 token works.
pub fn mint_jwt(user_id: &str) -> String {
    #[derive(serde::Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        role: &'a str,
        aud: &'a str,
        exp: i64,
    }
    let claims = Claims {
        sub: user_id,
        role: "authenticated",
        aud: "authenticated",
        // 2100-01-01, far enough out that expiry never trips.
        exp: 4_102_444_800,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
    )
    .expect("JWT encoding failed")
}

/// Insert (or update) a `user_profiles` row so role lookups resolve.
pub async fn seed_profile(pool: &sqlx::PgPool, user_id: &str, role: &str) {
    sqlx::query(
        "INSERT INTO user_profiles (id, role, full_name)
         VALUES ($1::uuid, $2, $3)
         ON CONFLICT (id) DO UPDATE SET role = EXCLUDED.role",
    )
    .bind(user_id)
    .bind(role)
    .bind(format!("Test {role}"))
    .execute(pool)
    .await
    .unwrap();
}

/// Look up the id of a seeded pack by slug.
pub async fn pack_id(pool: &sqlx::PgPool, slug: &str) -> i64 {
    sqlx::query_scalar("SELECT id FROM packs WHERE slug = $1")
        .bind(slug)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Look up the id of a seeded service by slug.
pub async fn service_id(pool: &sqlx::PgPool, slug: &str) -> i64 {
    sqlx::query_scalar("SELECT id FROM services WHERE slug = $1")
        .bind(slug)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE project_forms, project_updates, project_milestones,
                        projects, order_items, orders, cart_items, carts,
                        user_profiles, services, packs
         CASCADE",
    )
    .execute(pool)
    .await
    .unwrap();

    // Re-seed the catalog
    sqlx::raw_sql(
        "INSERT INTO packs (slug, name, description, price, features) VALUES
          ('pack-base', 'Pack Base', 'Presencia web esencial', 890.00,
           '[\"Diseño responsive\", \"SEO básico\", \"Formulario de contacto\"]'),
          ('pack-pro', 'Pack Pro', 'Web corporativa con blog', 1890.00,
           '[\"CMS\", \"Blog\", \"Analítica\", \"Copywriting\"]'),
          ('pack-premium', 'Pack Premium', 'Desarrollo a medida', 2490.00,
           '[\"E-commerce\", \"Integraciones\", \"Soporte prioritario\"]')",
    )
    .execute(pool)
    .await
    .unwrap();

    sqlx::raw_sql(
        "INSERT INTO services (slug, name, description, price, category) VALUES
          ('seo-local', 'SEO Local', 'Posicionamiento en búsquedas locales', 350.00, 'marketing'),
          ('mantenimiento', 'Mantenimiento', 'Actualizaciones y copias de seguridad', 45.00, 'soporte'),
          ('redes-sociales', 'Redes Sociales', 'Gestión mensual de redes', 290.00, 'marketing')",
    )
    .execute(pool)
    .await
    .unwrap();
}

/// Run all migrations against the test database, skipping Supabase-specific commands.
async fn run_migrations(pool: &sqlx::PgPool) {
    let migration_files = [
        "supabase/migrations/001_catalog.sql",
        "supabase/migrations/002_carts.sql",
        "supabase/migrations/003_orders.sql",
        "supabase/migrations/004_projects.sql",
        "supabase/migrations/005_updates_forms.sql",
        "supabase/migrations/006_user_profiles.sql",
    ];

    for file in &migration_files {
        let path = Path::new(file);
        if !path.exists() {
            panic!("Migration file not found: {}", file);
        }
        let sql = std::fs::read_to_string(path).unwrap();
        let cleaned = clean_migration_sql(&sql);
        if !cleaned.trim().is_empty() {
            sqlx::raw_sql(&cleaned).execute(pool).await.unwrap_or_else(|e| {
                panic!("Migration {} failed: {}", file, e);
            });
        }
    }
}

/// Remove Supabase-specific SQL (ALTER PUBLICATION, RLS, policies).
fn clean_migration_sql(sql: &str) -> String {
    sql.lines()
        .filter(|line| {
            let t = line.trim();
            !t.starts_with("ALTER PUBLICATION")
                && !t.contains("ENABLE ROW LEVEL SECURITY")
                && !t.starts_with("CREATE POLICY")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
