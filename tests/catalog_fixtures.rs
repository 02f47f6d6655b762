// The catalog tree shipped under data/catalog must load for every game.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use buildboard_backend::catalog::{CatalogKind, CatalogProvider, CatalogSource, FileCatalogSource};
use buildboard_backend::model::Game;

fn catalog_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join("catalog")
}

#[test]
fn test_shipped_catalogs_parse() {
    let source = FileCatalogSource::new(catalog_root());
    for game in [Game::Genshin, Game::Starrail] {
        for kind in CatalogKind::ALL {
            let entries = source
                .load(game, kind, "en")
                .unwrap_or_else(|e| panic!("{game}/{}: {e}", kind.file_stem(game)));
            assert!(!entries.is_empty());
            assert!(entries.iter().all(|e| !e.id.is_empty() && !e.name.is_empty()));
        }
    }
}

#[tokio::test]
async fn test_provider_over_shipped_catalogs() {
    let provider = CatalogProvider::new(
        Arc::new(FileCatalogSource::new(catalog_root())),
        Duration::from_secs(60),
    );
    let genshin = provider.get(Game::Genshin, "en").await.unwrap();
    assert_eq!(
        genshin.characters.get("10000002").map(|c| c.name.as_str()),
        Some("Kamisato Ayaka")
    );
    let hsr = provider.get(Game::Starrail, "en").await.unwrap();
    assert_eq!(hsr.weapons.get("23001").map(|c| c.rarity), Some(5));
    assert!(provider.get(Game::Starrail, "xx").await.is_err());
}
