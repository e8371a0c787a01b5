//! Catalog definition files, parsing, and database sync.
//!
//! Packs and services are authored in a TOML file and pushed into the
//! database with `estudio catalog sync`. Slugs are the stable keys: sync
//! upserts by slug and deactivates rows whose slug disappeared from the
//! file, so carts and order snapshots referencing old ids keep working.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::db::Database;

// ── TOML catalog structs ────────────────────────────────────────

/// Top-level catalog parsed from TOML files.
///
/// Maps directly to repeated `[[packs]]` and `[[services]]` tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub packs: Vec<PackDef>,
    #[serde(default)]
    pub services: Vec<ServiceDef>,
}

/// One `[[packs]]` entry: a complete website offering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackDef {
    pub name: String,
    /// Stable key; derived from the name when omitted.
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// One `[[services]]` entry: an add-on sold alongside a pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDef {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl PackDef {
    pub fn effective_slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }
}

impl ServiceDef {
    pub fn effective_slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }
}

// ── Parsing ─────────────────────────────────────────────────────

/// Parse a catalog from a TOML string.
pub fn parse_toml(content: &str) -> Result<CatalogFile> {
    let catalog: CatalogFile = toml::from_str(content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

/// Parse a catalog from a TOML file path.
pub fn parse_toml_file(path: &std::path::Path) -> Result<CatalogFile> {
    let content = std::fs::read_to_string(path)?;
    parse_toml(&content)
}

/// Validate a catalog for logical consistency.
fn validate_catalog(catalog: &CatalogFile) -> Result<()> {
    if catalog.packs.is_empty() && catalog.services.is_empty() {
        anyhow::bail!("Catalog defines no packs and no services");
    }

    let mut slugs: HashSet<String> = HashSet::new();
    for pack in &catalog.packs {
        if pack.name.trim().is_empty() {
            anyhow::bail!("Pack with empty name");
        }
        if pack.price < 0.0 {
            anyhow::bail!("Pack '{}' has a negative price", pack.name);
        }
        let slug = pack.effective_slug();
        if slug.is_empty() {
            anyhow::bail!("Pack '{}' produces an empty slug", pack.name);
        }
        if !slugs.insert(slug.clone()) {
            anyhow::bail!("Duplicate pack slug '{}'", slug);
        }
    }

    let mut slugs: HashSet<String> = HashSet::new();
    for service in &catalog.services {
        if service.name.trim().is_empty() {
            anyhow::bail!("Service with empty name");
        }
        if service.price < 0.0 {
            anyhow::bail!("Service '{}' has a negative price", service.name);
        }
        let slug = service.effective_slug();
        if slug.is_empty() {
            anyhow::bail!("Service '{}' produces an empty slug", service.name);
        }
        if !slugs.insert(slug.clone()) {
            anyhow::bail!("Duplicate service slug '{}'", slug);
        }
    }

    Ok(())
}

/// Generate a URL-safe slug from a catalog entry name.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ── Sync ────────────────────────────────────────────────────────

/// What a sync run touched.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub packs_upserted: usize,
    pub services_upserted: usize,
    pub packs_deactivated: usize,
    pub services_deactivated: usize,
}

/// Push a catalog file into the database.
///
/// Every entry is upserted by slug; rows whose slug is absent from the file
/// are deactivated, never deleted, because order snapshots may still point
/// at them.
pub async fn sync_catalog(db: &Database, catalog: &CatalogFile) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    let mut live_pack_slugs: HashSet<String> = HashSet::new();
    for pack in &catalog.packs {
        let slug = pack.effective_slug();
        let features = serde_json::to_value(&pack.features)?;
        db.upsert_pack(
            &slug,
            &pack.name,
            &pack.description,
            pack.price,
            &features,
            pack.is_active,
        )
        .await?;
        live_pack_slugs.insert(slug);
        report.packs_upserted += 1;
    }

    let mut live_service_slugs: HashSet<String> = HashSet::new();
    for service in &catalog.services {
        let slug = service.effective_slug();
        db.upsert_service(
            &slug,
            &service.name,
            &service.description,
            service.price,
            &service.category,
            service.is_active,
        )
        .await?;
        live_service_slugs.insert(slug);
        report.services_upserted += 1;
    }

    for row in db.get_all_packs().await? {
        if row.is_active && !live_pack_slugs.contains(&row.slug) {
            if db.deactivate_pack(row.id).await? {
                tracing::info!(slug = %row.slug, "pack left the catalog, deactivated");
                report.packs_deactivated += 1;
            }
        }
    }
    for row in db.get_all_services().await? {
        if row.is_active && !live_service_slugs.contains(&row.slug) {
            if db.deactivate_service(row.id).await? {
                tracing::info!(slug = %row.slug, "service left the catalog, deactivated");
                report.services_deactivated += 1;
            }
        }
    }

    tracing::info!(
        packs = report.packs_upserted,
        services = report.services_upserted,
        deactivated = report.packs_deactivated + report.services_deactivated,
        "catalog sync finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_handles_accents_and_spaces() {
        assert_eq!(slugify("Pack Básico"), "pack-b-sico");
        assert_eq!(slugify("Mantenimiento Mensual"), "mantenimiento-mensual");
        assert_eq!(slugify("SEO --- Local"), "seo-local");
    }

    #[test]
    fn parses_a_full_catalog() {
        let catalog = parse_toml(
            r#"
[[packs]]
name = "Pack Base"
slug = "pack-base"
description = "Web de presentación"
price = 890.0
features = ["Diseño a medida", "Hasta 5 páginas"]

[[packs]]
name = "Pack Premium"
price = 2490.0

[[services]]
name = "SEO Local"
price = 350.0
category = "marketing"
"#,
        )
        .unwrap();

        assert_eq!(catalog.packs.len(), 2);
        assert_eq!(catalog.services.len(), 1);
        assert_eq!(catalog.packs[0].effective_slug(), "pack-base");
        assert_eq!(catalog.packs[1].effective_slug(), "pack-premium");
        assert!(catalog.packs[1].is_active);
        assert_eq!(catalog.services[0].category, "marketing");
    }

    #[test]
    fn rejects_duplicate_slugs() {
        let err = parse_toml(
            r#"
[[packs]]
name = "Pack Base"
slug = "pack-base"
price = 890.0

[[packs]]
name = "Pack base"
price = 990.0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate pack slug"));
    }

    #[test]
    fn pack_and_service_slugs_may_collide() {
        // Separate tables, separate namespaces.
        let catalog = parse_toml(
            r#"
[[packs]]
name = "Mantenimiento"
price = 890.0

[[services]]
name = "Mantenimiento"
price = 45.0
"#,
        )
        .unwrap();
        assert_eq!(catalog.packs[0].effective_slug(), "mantenimiento");
        assert_eq!(catalog.services[0].effective_slug(), "mantenimiento");
    }

    #[test]
    fn rejects_negative_prices() {
        let err = parse_toml(
            r#"
[[services]]
name = "SEO Local"
price = -1.0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("negative price"));
    }

    #[test]
    fn rejects_empty_catalog() {
        assert!(parse_toml("").is_err());
    }
}
