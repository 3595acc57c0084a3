use std::collections::BTreeSet;

use mineral_catalog::catalog::{Catalog, PersistenceMode};
use mineral_catalog::ingest::Batch;
use rusqlite::Connection;

fn catalog() -> Catalog {
    let catalog = Catalog::in_memory().expect("catalog");
    let batch = Batch::from_json(include_str!("data/catalog.json")).expect("fixture");
    catalog.ingest(&batch).expect("ingest");
    catalog
}

fn set(ids: Vec<String>) -> BTreeSet<String> {
    ids.into_iter().collect()
}

fn expected(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[test]
fn indexed_terms_are_found_regardless_of_case() {
    let catalog = catalog();
    let corundum_like = expected(&["corundum", "corundum-barrel", "corundum-tabular", "ruby"]);
    assert_eq!(set(catalog.search("Al2O3").unwrap()), corundum_like);
    assert_eq!(set(catalog.search("al2o3").unwrap()), corundum_like);
    assert_eq!(set(catalog.search("Myanmar").unwrap()), corundum_like);
    assert_eq!(catalog.search("hematite").unwrap(), vec!["hematite"]);
}

#[test]
fn provenance_fields_are_searchable() {
    let catalog = catalog();
    assert_eq!(catalog.search("verneuil").unwrap(), vec!["synthetic-ruby-verneuil"]);
    assert_eq!(catalog.search("skull").unwrap(), vec!["cubic-zirconia"]);
}

#[test]
fn word_fragments_fall_back_to_substring_matching() {
    let catalog = catalog();
    // no indexed word starts with "orundu"; the scan also reads descriptions
    assert_eq!(
        catalog.search("orundu").unwrap(),
        vec!["corundum", "corundum-barrel", "corundum-tabular", "ruby"]
    );
}

#[test]
fn results_are_unique() {
    let catalog = catalog();
    let found = catalog.search("ruby").unwrap();
    assert_eq!(found.len(), set(found.clone()).len());
    assert!(found.contains(&"ruby".to_string()));
    assert!(found.contains(&"synthetic-ruby-flux".to_string()));
}

#[test]
fn blank_and_unmatched_queries_return_nothing() {
    let catalog = catalog();
    assert!(catalog.search("").unwrap().is_empty());
    assert!(catalog.search("   ").unwrap().is_empty());
    assert!(catalog.search("unobtainium").unwrap().is_empty());
    assert!(catalog.search("***").unwrap().is_empty());
}

#[test]
fn query_syntax_is_not_passed_through() {
    let catalog = catalog();
    // FTS operators and quotes are reduced to plain terms
    assert_eq!(catalog.search("\"hematite\"").unwrap(), vec!["hematite"]);
    assert_eq!(catalog.search("hematite*").unwrap(), vec!["hematite"]);
    assert_eq!(catalog.search("(hematite").unwrap(), vec!["hematite"]);
}

const TOPAZ: &str = r#"{"id": "topaz", "name": "Topaz", "crystal_system": "orthorhombic",
    "chemistry": "Al2SiO4(F,OH)2", "localities": ["Ouro Prêto", "Pakistan"],
    "expressions": [{"cdl": "orthorhombic[mmm]:{110}"}]}"#;

#[test]
fn accented_words_match_only_as_written() {
    let catalog = catalog();
    catalog.ingest(&Batch::from_json(TOPAZ).unwrap()).unwrap();
    assert_eq!(catalog.search("prêto").unwrap(), vec!["topaz"]);
    assert_eq!(catalog.search("Ouro Prêto").unwrap(), vec!["topaz"]);
    assert!(catalog.search("preto").unwrap().is_empty());
}

#[test]
fn scanning_finds_what_the_index_finds() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("minerals.db");
    let catalog = Catalog::open(PersistenceMode::File(path.clone())).expect("catalog");
    catalog.ingest(&Batch::from_json(include_str!("data/catalog.json")).unwrap()).unwrap();
    catalog.ingest(&Batch::from_json(TOPAZ).unwrap()).unwrap();

    let words = ["hematite", "Myanmar", "verneuil", "skull", "al2o3", "Prêto", "prêto", "preto", "orundu"];
    let indexed: Vec<BTreeSet<String>> = words.iter().map(|w| set(catalog.search(w).unwrap())).collect();
    assert_eq!(indexed[5], expected(&["topaz"]));
    assert!(indexed[7].is_empty());

    Connection::open(&path)
        .unwrap()
        .execute_batch(
            "drop trigger Mineral_Search_insert;
             drop trigger Mineral_Search_delete;
             drop trigger Mineral_Search_update;
             drop table Mineral_Search;",
        )
        .unwrap();
    let scanned: Vec<BTreeSet<String>> = words.iter().map(|w| set(catalog.search(w).unwrap())).collect();
    assert_eq!(scanned, indexed);

    // the store stays writable and searchable without the index
    catalog
        .ingest(&Batch::from_json(r#"{"id": "peridot", "name": "Peridot", "crystal_system": "orthorhombic",
            "localities": ["Arizona"], "expressions": [{"cdl": "orthorhombic[mmm]:{010}"}]}"#).unwrap())
        .unwrap();
    assert_eq!(catalog.search("arizona").unwrap(), vec!["peridot"]);
}
