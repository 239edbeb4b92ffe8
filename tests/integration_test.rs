//! End-to-end tests for the import pipeline.
//!
//! Every test imports the same small bz2-compressed dump through the public
//! [`run_import`] entry point:
//!
//! - **Q1** -- item with labels in two languages, a description, an alias, a
//!   claim with a time qualifier, a quantity claim and two sitelinks
//! - **Q2** -- a Wikimedia category page, filtered out by the class exclusion list
//! - **P17** -- a property, whose claim edges go to the property split
//! - **Q3** -- item with one deprecated and one normal claim
//!
//! Row order across workers and collectors is not deterministic, so outputs
//! are compared as sorted line sets. Identifiers must not depend on the
//! collector mode.

use anyhow::Result;
use ariadne::config::{CollectorMode, ImportOptions};
use ariadne::dispatch::{run_import, ImportSummary};
use ariadne::error::ImportError;
use ariadne::ids::digest8;
use ariadne::relations::Relation;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use flate2::read::GzDecoder;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

const Q1: &str = r#"{"type":"item","id":"Q1","labels":{"en":{"language":"en","value":"Universe"},"fr":{"language":"fr","value":"Univers"}},"descriptions":{"en":{"language":"en","value":"totality of space"}},"aliases":{"en":[{"language":"en","value":"Cosmos"}]},"claims":{"P31":[{"id":"Q1$a","type":"statement","rank":"normal","mainsnak":{"snaktype":"value","property":"P31","hash":"h1","datatype":"wikibase-item","datavalue":{"type":"wikibase-entityid","value":{"entity-type":"item","id":"Q36906466"}}},"qualifiers":{"P580":[{"snaktype":"value","property":"P580","hash":"q1","datatype":"time","datavalue":{"type":"time","value":{"time":"+2001-01-01T00:00:00Z","precision":11,"calendarmodel":"http://www.wikidata.org/entity/Q1985727"}}}]}}],"P2067":[{"id":"Q1$b","type":"statement","rank":"normal","mainsnak":{"snaktype":"value","property":"P2067","datatype":"quantity","datavalue":{"type":"quantity","value":{"amount":"+12","unit":"http://www.wikidata.org/entity/Q11570","lowerBound":"+10","upperBound":"+15"}}}}]},"sitelinks":{"enwiki":{"site":"enwiki","title":"The Universe","badges":[]},"commonswiki":{"site":"commonswiki","title":"Category:Universe","badges":[]}}}"#;

const Q2: &str = r#"{"type":"item","id":"Q2","labels":{"en":{"language":"en","value":"Category:Stars"}},"descriptions":{},"aliases":{},"claims":{"P31":[{"id":"Q2$a","type":"statement","rank":"normal","mainsnak":{"snaktype":"value","property":"P31","datatype":"wikibase-item","datavalue":{"type":"wikibase-entityid","value":{"entity-type":"item","id":"Q4167836"}}}}]}}"#;

const P17: &str = r#"{"type":"property","id":"P17","datatype":"wikibase-item","labels":{"en":{"language":"en","value":"country"}},"descriptions":{},"aliases":{},"claims":{"P1629":[{"id":"P17$c","type":"statement","rank":"normal","mainsnak":{"snaktype":"value","property":"P1629","datatype":"wikibase-item","datavalue":{"type":"wikibase-entityid","value":{"entity-type":"item","id":"Q6256"}}}}]}}"#;

const Q3: &str = r#"{"type":"item","id":"Q3","labels":{"en":{"language":"en","value":"Ada"}},"descriptions":[],"aliases":[],"claims":{"P31":[{"id":"Q3$a","type":"statement","rank":"deprecated","mainsnak":{"snaktype":"value","property":"P31","datatype":"wikibase-item","datavalue":{"type":"wikibase-entityid","value":{"entity-type":"item","id":"Q5"}}}}],"P21":[{"id":"Q3$b","type":"statement","rank":"preferred","mainsnak":{"snaktype":"value","property":"P21","datatype":"wikibase-item","datavalue":{"type":"wikibase-entityid","value":{"entity-type":"item","id":"Q6581072"}}}}]}}"#;

/// Helper: bz2-compressed dump in Wikidata's array-per-line layout
fn create_bz2_dump(records: &[&str]) -> Result<NamedTempFile> {
    let mut text = String::from("[\n");
    text.push_str(&records.join(",\n"));
    text.push_str("\n]\n");

    let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(text.as_bytes())?;
    let compressed = encoder.finish()?;

    let mut tmp = tempfile::Builder::new().suffix(".json.bz2").tempfile()?;
    tmp.write_all(&compressed)?;
    tmp.flush()?;
    Ok(tmp)
}

fn sample_dump() -> Result<NamedTempFile> {
    create_bz2_dump(&[Q1, Q2, P17, Q3])
}

const RELATIONS: [(Relation, &str); 6] = [
    (Relation::Node, "nodes.tsv"),
    (Relation::DetailedEdge, "edges.tsv"),
    (Relation::PropertyEdge, "property_edges.tsv"),
    (Relation::MinimalQualifier, "qualifiers.tsv"),
    (Relation::EnLabel, "labels_en.tsv"),
    (Relation::EnDescription, "descriptions_en.tsv"),
];

fn sample_options(dir: &Path, mode: CollectorMode) -> ImportOptions {
    let mut options = ImportOptions::default();
    for (relation, name) in RELATIONS {
        options = options.with_output(relation, dir.join(name));
    }
    options.collector_mode = mode;
    options.workers = 3;
    options.mapper_batch_size = 1;
    options.collector_batch_size = 1;
    options.edges.label = true;
    options.edges.description = true;
    options.edges.sitelink = true;
    options
}

/// Header plus sorted data lines
fn read_table(path: &Path) -> Result<(String, Vec<String>)> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().map(str::to_string);
    let header = lines.next().unwrap_or_default();
    let mut rows: Vec<String> = lines.collect();
    rows.sort();
    Ok((header, rows))
}

fn run_mode(mode: CollectorMode) -> Result<(TempDir, ImportSummary)> {
    let dump = sample_dump()?;
    let dir = TempDir::new()?;
    let summary = run_import(dump.path(), &sample_options(dir.path(), mode))?;
    Ok((dir, summary))
}

fn column(row: &str, header: &str, name: &str) -> String {
    let index = header.split('\t').position(|c| c == name).unwrap();
    row.split('\t').nth(index).unwrap().to_string()
}

// ============================================================================
// Output content
// ============================================================================

#[test]
fn test_row_counts_and_stats() -> Result<()> {
    let (_dir, summary) = run_mode(CollectorMode::None)?;

    assert_eq!(summary.stats.lines_read, 6);
    assert_eq!(summary.stats.records_processed, 4);
    assert_eq!(summary.stats.records_filtered, 1);

    let rows = &summary.rows;
    assert_eq!(rows[&Relation::Node], 4);
    // Q1: two claims and two sitelinks, P17: one claim, Q3: one non-deprecated claim
    assert_eq!(rows[&Relation::DetailedEdge], 6);
    assert_eq!(rows[&Relation::PropertyEdge], 1);
    assert_eq!(rows[&Relation::MinimalQualifier], 1);
    assert_eq!(rows[&Relation::EnLabel], 4);
    assert_eq!(rows[&Relation::EnDescription], 1);
    Ok(())
}

#[test]
fn test_node_rows() -> Result<()> {
    let (dir, _) = run_mode(CollectorMode::Shared)?;
    let (header, rows) = read_table(&dir.path().join("nodes.tsv"))?;

    assert_eq!(header, "id\tlabel\ttype\tdescription\talias\tdatatype");
    assert_eq!(
        rows[1],
        "Q1\t'Universe'@en\titem\t'totality of space'@en\t'Cosmos'@en\t"
    );
    assert!(rows.contains(&"P17\t'country'@en\tproperty\t\t\twikibase-item".to_string()));
    // Filtered entities still get their node row.
    assert!(rows.iter().any(|row| row.starts_with("Q2\t")));
    Ok(())
}

#[test]
fn test_claim_edges_and_identifiers() -> Result<()> {
    let (dir, _) = run_mode(CollectorMode::PerRelation)?;
    let (header, rows) = read_table(&dir.path().join("edges.tsv"))?;

    let p31 = format!("Q1-P31-{}-0", digest8("Q36906466"));
    let edge = rows
        .iter()
        .find(|row| row.starts_with(&format!("{}\t", p31)))
        .expect("Q1 P31 edge");
    assert_eq!(column(edge, &header, "node2"), "Q36906466");
    assert_eq!(column(edge, &header, "rank"), "normal");
    assert_eq!(column(edge, &header, "claim_id"), "Q1$a");
    assert_eq!(column(edge, &header, "node2;wikidatatype"), "wikibase-item");

    let quantity = rows
        .iter()
        .find(|row| row.starts_with("Q1-P2067-"))
        .expect("Q1 quantity edge");
    assert_eq!(column(quantity, &header, "node2"), "+12[+10,+15]Q11570");
    assert_eq!(column(quantity, &header, "node2;unit"), "Q11570");

    // Deprecated claims are dropped; preferred ones keep their rank.
    assert!(!rows.iter().any(|row| row.starts_with("Q3-P31-")));
    let q3 = rows.iter().find(|row| row.starts_with("Q3-P21-")).expect("Q3 P21 edge");
    assert_eq!(column(q3, &header, "rank"), "preferred");

    // Filtered entities get no claim edges.
    assert!(!rows.iter().any(|row| row.starts_with("Q2-")));
    Ok(())
}

#[test]
fn test_qualifiers_hang_off_their_claim() -> Result<()> {
    let (dir, _) = run_mode(CollectorMode::None)?;
    let (header, rows) = read_table(&dir.path().join("qualifiers.tsv"))?;

    assert_eq!(header, "id\tnode1\tlabel\tnode2\tnode2;wikidatatype");
    let claim = format!("Q1-P31-{}-0", digest8("Q36906466"));
    let value = "^2001-01-01T00:00:00Z/11";
    let expected = format!(
        "{claim}-P580-{}-0\t{claim}\tP580\t{value}\ttime",
        digest8(value)
    );
    assert_eq!(rows, vec![expected]);
    Ok(())
}

#[test]
fn test_property_subjects_and_splits() -> Result<()> {
    let (dir, _) = run_mode(CollectorMode::Shared)?;

    let (_, property) = read_table(&dir.path().join("property_edges.tsv"))?;
    assert_eq!(property.len(), 1);
    assert!(property[0].starts_with("P17-P1629-"));
    assert!(property[0].ends_with("\tQ6256\tnormal\twikibase-item"));

    let (header, labels) = read_table(&dir.path().join("labels_en.tsv"))?;
    assert_eq!(header, "id\tnode1\tlabel\tnode2");
    assert_eq!(labels[0], "P17-label-en\tP17\tlabel\t'country'@en");

    let (_, descriptions) = read_table(&dir.path().join("descriptions_en.tsv"))?;
    assert_eq!(
        descriptions,
        vec!["Q1-description-en\tQ1\tdescription\t'totality of space'@en"]
    );

    let (header, edges) = read_table(&dir.path().join("edges.tsv"))?;
    let primary = edges
        .iter()
        .find(|row| row.starts_with("Q1-wikipedia_sitelink-"))
        .expect("primary sitelink");
    assert_eq!(
        column(primary, &header, "node2"),
        "http://en.wikipedia.org/wiki/The_Universe"
    );
    assert_eq!(column(primary, &header, "lang"), "en");
    let secondary = edges
        .iter()
        .find(|row| row.starts_with("Q1-addl_wikipedia_sitelink-"))
        .expect("secondary sitelink");
    assert_eq!(
        column(secondary, &header, "node2"),
        "http://commonswiki.org/wiki/Category:Universe"
    );
    Ok(())
}

// ============================================================================
// Collector modes
// ============================================================================

#[test]
fn test_collector_modes_write_identical_tables() -> Result<()> {
    let mut tables: Vec<BTreeMap<&str, (String, Vec<String>)>> = Vec::new();
    for mode in [
        CollectorMode::None,
        CollectorMode::Shared,
        CollectorMode::PerRelation,
    ] {
        let (dir, _) = run_mode(mode)?;
        let mut files = BTreeMap::new();
        for (_, name) in RELATIONS {
            files.insert(name, read_table(&dir.path().join(name))?);
        }
        tables.push(files);
    }
    assert_eq!(tables[0], tables[1]);
    assert_eq!(tables[0], tables[2]);
    Ok(())
}

#[test]
fn test_single_queue_and_compressed_output() -> Result<()> {
    let dump = sample_dump()?;
    let dir = TempDir::new()?;
    let edges: PathBuf = dir.path().join("edges.tsv.gz");
    let mut options = ImportOptions::default().with_output(Relation::MinimalEdge, &edges);
    options.single_mapper_queue = true;
    options.collector_mode = CollectorMode::Shared;

    let summary = run_import(dump.path(), &options)?;
    // Without a property split, P17's claim lands in the minimal edge file.
    assert_eq!(summary.rows[&Relation::MinimalEdge], 4);

    let mut text = String::new();
    GzDecoder::new(File::open(&edges)?).read_to_string(&mut text)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "id\tnode1\tlabel\tnode2\trank\tnode2;wikidatatype");
    assert_eq!(lines.len(), 5);
    Ok(())
}

#[test]
fn test_fragments_kept_for_later_merge() -> Result<()> {
    let dump = sample_dump()?;
    let dir = TempDir::new()?;
    let nodes = dir.path().join("nodes.tsv");
    let mut options = ImportOptions::default().with_output(Relation::Node, &nodes);
    options.workers = 2;
    options.skip_merging = true;
    run_import(dump.path(), &options)?;
    assert!(!nodes.exists());

    let workers = ariadne::merge::detect_fragment_count(&nodes)?;
    assert_eq!(workers, 2);
    let rows = ariadne::merge::merge_fragments(&nodes, workers, true)?;
    assert_eq!(rows, 4);
    assert_eq!(fs::read_to_string(&nodes)?.lines().count(), 5);
    Ok(())
}

// ============================================================================
// Failure handling
// ============================================================================

const NO_CLAIMS: &str = r#"{"type":"item","id":"Q404","labels":{},"descriptions":{},"aliases":{}}"#;

#[test]
fn test_missing_claims_fail_the_run() -> Result<()> {
    let dump = create_bz2_dump(&[Q1, NO_CLAIMS, Q3])?;
    for mode in [CollectorMode::None, CollectorMode::PerRelation] {
        let dir = TempDir::new()?;
        let options = sample_options(dir.path(), mode);
        let err = run_import(dump.path(), &options).unwrap_err();
        match err.downcast_ref::<ImportError>() {
            Some(ImportError::WorkerFailed { cause, .. }) => {
                assert!(cause.contains("Q404"), "{}", cause);
                assert!(cause.contains("claims"), "{}", cause);
            }
            other => panic!("expected a worker failure, got {:?}", other),
        }
    }
    Ok(())
}

#[test]
fn test_missing_claims_can_be_tolerated() -> Result<()> {
    let dump = create_bz2_dump(&[Q1, NO_CLAIMS, Q3])?;
    let dir = TempDir::new()?;
    let mut options = sample_options(dir.path(), CollectorMode::Shared);
    options.missing.fail = false;

    let summary = run_import(dump.path(), &options)?;
    assert_eq!(summary.stats.missing_fields, 1);
    assert_eq!(summary.rows[&Relation::Node], 3);
    let (_, edges) = read_table(&dir.path().join("edges.tsv"))?;
    assert!(!edges.iter().any(|row| row.starts_with("Q404")));
    Ok(())
}

#[test]
fn test_malformed_record_names_the_line() -> Result<()> {
    let dump = create_bz2_dump(&[Q1, r#"{"type":"item","id":"Q7","claims":{"P31":[{"rank":"unknown"}]}}"#])?;
    let dir = TempDir::new()?;
    let err = run_import(dump.path(), &sample_options(dir.path(), CollectorMode::None)).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("\"Q7\""), "{}", message);
    Ok(())
}

#[test]
fn test_limit_stops_early() -> Result<()> {
    let dump = sample_dump()?;
    let dir = TempDir::new()?;
    let mut options = sample_options(dir.path(), CollectorMode::PerRelation);
    options.limit = Some(2);

    let summary = run_import(dump.path(), &options)?;
    assert_eq!(summary.stats.lines_read, 2);
    assert_eq!(summary.stats.records_processed, 1);
    assert_eq!(summary.rows[&Relation::Node], 1);
    Ok(())
}

#[test]
fn test_missing_input_file() {
    let dir = TempDir::new().unwrap();
    let options = sample_options(dir.path(), CollectorMode::None);
    let err = run_import(Path::new("/nonexistent/latest-all.json.bz2"), &options).unwrap_err();
    assert!(format!("{:#}", err).contains("latest-all.json.bz2"));
}
