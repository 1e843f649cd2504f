use std::fs;
use tempfile::TempDir;

use partsage_core::catalog::CatalogLoader;
use partsage_core::config::Config;
use partsage_core::types::{ContextItem, EntityKey, SourceKind};

fn write_fixture_catalog(dir: &std::path::Path) {
    fs::write(
        dir.join("all_partselect_parts.json"),
        r#"[
            {"part_number": "ps11752778", "name": "Refrigerator Door Shelf Bin", "price": "$44.95",
             "manufacturer": "Whirlpool", "product_types": "Refrigerator", "availability": "In Stock",
             "video_url": "https://www.youtube.com/watch?v=zSCNN6KpDE8",
             "product_url": "https://www.partselect.com/PS11752778.htm",
             "symptoms": "Door won't open or close | Leaking",
             "compatibility_models": ["wdt780saem1", " ", "WRF555SDFZ"]},
            {"part_number": "PS3406971", "name": "Dishwasher Lower Spray Arm", "price": 32.1,
             "brand": "Whirlpool", "category": "Dishwasher", "availability": "Special Order"}
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.join("all_repairs.json"),
        r#"[{"product": "Refrigerator", "symptom": "Ice maker not making ice", "description": "Check the water inlet valve.",
             "difficulty": "EASY", "percentage": "29%", "parts": "Water Inlet Valve, Ice Maker Assembly",
             "repair_video_url": "https://www.youtube.com/watch?v=abc"}]"#,
    )
    .unwrap();
    fs::write(
        dir.join("partselect_blogs.json"),
        r#"[{"title": "How to clean a dishwasher filter", "url": "https://www.partselect.com/blog/clean-filter/",
             "excerpt": "A short guide", "tags": ["dishwasher", "maintenance"]}]"#,
    )
    .unwrap();
}

#[test]
fn load_directory_normalizes_all_record_kinds() {
    let tmp = TempDir::new().unwrap();
    write_fixture_catalog(tmp.path());

    let catalog = CatalogLoader::new().load_directory(tmp.path()).expect("load catalog");

    assert_eq!(catalog.parts.len(), 2);
    let bin = catalog.parts.iter().find(|p| p.part_number == "PS11752778").expect("part number upper-cased");
    assert_eq!(bin.price, Some(44.95));
    assert_eq!(bin.category.as_deref(), Some("refrigerator"));
    assert!(bin.in_stock);
    assert_eq!(bin.brand.as_deref(), Some("Whirlpool"));
    assert_eq!(bin.symptoms, vec!["Door won't open or close".to_string(), "Leaking".to_string()]);

    let arm = catalog.parts.iter().find(|p| p.part_number == "PS3406971").unwrap();
    assert!(!arm.in_stock, "special order is not in stock");

    // blank model skipped, models upper-cased
    assert_eq!(catalog.compatibility.len(), 2);
    assert!(catalog.compatibility.iter().any(|e| e.model_number == "WDT780SAEM1"));

    assert_eq!(catalog.repairs.len(), 1);
    assert_eq!(catalog.repairs[0].id, "refrigerator:ice-maker-not-making-ice");
    assert_eq!(catalog.repairs[0].parts_needed.len(), 2);
    assert_eq!(catalog.repairs[0].percentage_reported, Some(29.0));

    assert_eq!(catalog.blogs.len(), 1);
    assert_eq!(catalog.blogs[0].tags, vec!["dishwasher".to_string(), "maintenance".to_string()]);
}

#[test]
fn chunks_carry_entity_identity_and_source() {
    let tmp = TempDir::new().unwrap();
    write_fixture_catalog(tmp.path());
    let loader = CatalogLoader::new();
    let catalog = loader.load_directory(tmp.path()).unwrap();

    let chunks = loader.chunk_catalog(&catalog);

    let part_chunk = chunks.iter().find(|c| c.source == SourceKind::Part && c.doc_id == "PS11752778").expect("part chunk");
    assert!(part_chunk.content.contains("Refrigerator Door Shelf Bin"));
    assert_eq!(part_chunk.id, "part:PS11752778#0");
    assert!(chunks.iter().any(|c| c.source == SourceKind::Repair));
    let blog_chunk = chunks.iter().find(|c| c.source == SourceKind::Blog).unwrap();
    assert_eq!(blog_chunk.url.as_deref(), Some("https://www.partselect.com/blog/clean-filter/"));
}

#[test]
fn empty_directory_yields_empty_catalog() {
    let tmp = TempDir::new().unwrap();
    let catalog = CatalogLoader::new().load_directory(tmp.path()).expect("load");
    assert!(catalog.is_empty());
}

#[test]
fn ambiguous_file_names_are_routed_by_their_rows() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("repair_parts.json"),
        r#"[{"product": "Dishwasher", "symptom": "Not draining", "parts": "Drain Pump"}]"#,
    )
    .unwrap();
    fs::write(tmp.path().join("notes.json"), "not json at all").unwrap();

    let catalog = CatalogLoader::new().load_directory(tmp.path()).expect("load");
    assert!(catalog.parts.is_empty());
    assert_eq!(catalog.repairs.len(), 1);
    assert_eq!(catalog.repairs[0].id, "dishwasher:not-draining");
}

#[test]
fn canonical_keys_match_across_record_and_hit() {
    let hit = partsage_core::types::SemanticHit {
        doc_id: "ps11752778".into(),
        chunk: "bin".into(),
        score: 0.8,
        source: SourceKind::Part,
        title: None,
        url: None,
    };
    assert_eq!(ContextItem::Semantic(hit).canonical_key(), EntityKey::part("PS11752778"));
    assert_eq!(EntityKey::blog("https://x.test/a/"), EntityKey::blog("https://x.test/a"));
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.toml"), "[retrieval]\nmax_context_items = 4\n\n[llm]\nmodel = \"test-model\"\n").unwrap();
    fs::write(tmp.path().join("config.test.toml"), "[retrieval]\nsemantic_k = 7\n").unwrap();

    let config = Config::load_from(tmp.path(), "test").expect("load config");
    let settings = config.settings().expect("settings");

    assert_eq!(settings.retrieval.max_context_items, 4);
    assert_eq!(settings.retrieval.semantic_k, 7);
    assert_eq!(settings.llm.model, "test-model");
    assert_eq!(settings.retrieval.structured_limit, 5, "untouched keys keep defaults");
    let k: usize = config.get("retrieval.semantic_k").unwrap();
    assert_eq!(k, 7);
}
