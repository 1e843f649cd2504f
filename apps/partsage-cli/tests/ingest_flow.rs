use std::fs;
use std::path::Path;

use serde_json::json;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use partsage_agent::Assistant;
use partsage_cli::bootstrap::{build_assistant, catalog_summary, index_stats, ingest, Paths};
use partsage_cli::{repl, ConversationStore};
use partsage_core::config::Settings;
use partsage_core::types::{AnswerOutcome, IntentKind};

const GUIDE_URL: &str = "https://www.partselect.com/PS11752778-Whirlpool-W10321304-Refrigerator-Door-Shelf-Bin.htm#install";

fn write_catalog(dir: &Path) {
    fs::create_dir_all(dir.join("exports")).unwrap();
    let parts = json!([
        {
            "part_number": "PS11752778",
            "name": "Refrigerator Door Shelf Bin",
            "description": "Clear door bin that holds condiments and bottles.",
            "price": "$44.95",
            "brand": "Whirlpool",
            "product_types": "Refrigerator",
            "availability": "In Stock",
            "installation_difficulty": "Really Easy",
            "installation_guide": GUIDE_URL,
            "product_url": "https://www.partselect.com/PS11752778-Whirlpool-W10321304-Refrigerator-Door-Shelf-Bin.htm",
            "compatible_models": ["WRF555SDFZ", "wrs325sdhz"]
        },
        {
            "part_number": "ps3406971",
            "name": "Dishwasher Lower Dishrack Wheel",
            "price": 32.10,
            "brand": "Whirlpool",
            "product_types": "Dishwasher",
            "compatible_models": ["WDT780SAEM1", " "]
        }
    ]);
    let repairs = json!([{
        "product": "Refrigerator",
        "symptom": "Ice maker not making ice",
        "description": "Check the water inlet valve, then the ice maker assembly.",
        "percentage": "29%",
        "parts": "Water Inlet Valve | Ice Maker Assembly",
        "symptom_detail_url": "https://www.partselect.com/Repair/Refrigerator/Ice-Maker-Not-Making-Ice/"
    }]);
    let blogs = json!([{
        "title": "How to Clean a Dishwasher Filter",
        "url": "https://www.partselect.com/blog/how-to-clean-dishwasher-filter/",
        "excerpt": "A clogged filter leaves dishes dirty and the tub smelling.",
        "tags": ["dishwasher", "maintenance"]
    }]);
    fs::write(dir.join("exports/parts.json"), parts.to_string()).unwrap();
    fs::write(dir.join("repairs.json"), repairs.to_string()).unwrap();
    fs::write(dir.join("blogs.json"), blogs.to_string()).unwrap();
}

fn settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.data.catalog_dir = root.join("catalog").to_string_lossy().into_owned();
    settings.data.text_index_dir = root.join("indexes/tantivy").to_string_lossy().into_owned();
    settings.data.vector_db_dir = root.join("indexes/lancedb").to_string_lossy().into_owned();
    settings.embedding.use_fake = true;
    settings.embedding.dimension = 64;
    // no key: both model calls fail fast and the pipeline degrades
    settings.llm.api_key = String::new();
    settings
}

#[tokio::test]
async fn ingest_then_answer_without_a_model() {
    let tmp = tempfile::tempdir().unwrap();
    write_catalog(&tmp.path().join("catalog"));
    let settings = settings(tmp.path());
    let paths = Paths::resolve_with(tmp.path(), &settings);

    let report = ingest(&settings, &paths, None, false).await.expect("ingest");
    assert_eq!((report.parts, report.compatibility, report.repairs, report.blogs), (2, 3, 1, 1));
    assert!(report.chunks >= 4);
    assert_eq!(report.vectors_written, report.chunks);
    assert_eq!(index_stats(&paths).unwrap().iter().map(|(_, n)| n).sum::<usize>(), 7);

    let assistant = build_assistant(&settings, &paths).await.expect("assistant");

    let install = assistant.answer("How can I install part number PS11752778?", "e2e", &[]).await;
    assert_eq!(install.intent, Some(IntentKind::PartLookup));
    assert_eq!(install.outcome, AnswerOutcome::Degraded);
    assert!(install.cites_url(GUIDE_URL));

    let compat = assistant.answer("Is this part compatible with my WDT780SAEM1 model?", "e2e", &[]).await;
    assert_eq!(compat.intent, Some(IntentKind::CompatibilityCheck));
    assert!(compat.text.contains("PS3406971"));

    let refused = assistant.answer("what's your favorite movie?", "e2e", &[]).await;
    assert_eq!(refused.outcome, AnswerOutcome::Refused);
}

#[tokio::test]
async fn empty_catalog_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("catalog")).unwrap();
    let settings = settings(tmp.path());
    let paths = Paths::resolve_with(tmp.path(), &settings);

    let err = ingest(&settings, &paths, None, true).await.unwrap_err();
    assert!(err.to_string().contains("no catalog records"));
}

async fn ingested_assistant(root: &Path) -> (Assistant, Paths) {
    write_catalog(&root.join("catalog"));
    let settings = settings(root);
    let paths = Paths::resolve_with(root, &settings);
    ingest(&settings, &paths, None, false).await.expect("ingest");
    (build_assistant(&settings, &paths).await.expect("assistant"), paths)
}

#[tokio::test]
async fn catalog_summary_lists_brands_and_prices() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, paths) = ingested_assistant(tmp.path()).await;

    let all = catalog_summary(&paths, None).unwrap();
    assert_eq!(all.brands, vec!["Whirlpool".to_string()]);
    let range = all.price_range.expect("priced parts");
    assert_eq!((range.min, range.max), (32.10, 44.95));

    let dishwasher = catalog_summary(&paths, Some("dishwasher")).unwrap();
    assert_eq!(dishwasher.price_range.map(|r| r.max), Some(32.10));
}

#[tokio::test]
async fn chat_commands_report_thread_stats() {
    let tmp = tempfile::tempdir().unwrap();
    let (assistant, _) = ingested_assistant(tmp.path()).await;
    let mut store = ConversationStore::new(24);
    let (_tx, mut interrupts) = mpsc::unbounded_channel();
    let input = "How can I install part number PS11752778?\n/stats\n/threads\n/new\n/threads\n/quit\nnever asked\n";
    let mut output = Vec::new();

    repl::run(&assistant, &mut store, BufReader::new(input.as_bytes()), &mut output, &mut interrupts).await.unwrap();

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains("2 messages (1 from you)"), "{printed}");
    assert!(printed.contains("1 active thread(s)"));
    assert!(printed.contains("2 active thread(s)"));
    assert!(printed.contains("[part_lookup |"));
    assert_eq!(store.len(), 2);
    assert!(store.threads().iter().all(|t| t.user_messages <= 1));
}

#[tokio::test]
async fn interrupt_at_the_prompt_ends_the_chat() {
    let tmp = tempfile::tempdir().unwrap();
    let (assistant, _) = ingested_assistant(tmp.path()).await;
    let mut store = ConversationStore::new(24);
    let (tx, mut interrupts) = mpsc::unbounded_channel();
    // input stays open and idle, as a terminal waiting on the user would
    let (_keyboard, terminal) = tokio::io::duplex(64);
    let mut output = Vec::new();

    tx.send(()).unwrap();
    let finished = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        repl::run(&assistant, &mut store, BufReader::new(terminal), &mut output, &mut interrupts),
    )
    .await;

    assert!(matches!(finished, Ok(Ok(()))));
    assert!(String::from_utf8(output).unwrap().starts_with(repl::BANNER));
}
