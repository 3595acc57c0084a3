use mineral_catalog::catalog::Catalog;
use mineral_catalog::error::CatalogError;
use mineral_catalog::ingest::{Batch, IngestReport};

const FIXTURE: &str = include_str!("data/catalog.json");

#[test]
fn fixture_batch_is_counted() {
    let catalog = Catalog::in_memory().unwrap();
    let report = catalog.ingest(&Batch::from_json(FIXTURE).unwrap()).unwrap();
    assert_eq!(
        report,
        IngestReport {
            families: 10,
            expressions: 14,
            legacy_records: 2,
            categories: 2
        }
    );
    assert_eq!(catalog.families().unwrap().len(), 10);
    assert_eq!(catalog.count().unwrap(), 16);
}

#[test]
fn expressions_are_ordered_primary_first() {
    let catalog = Catalog::in_memory().unwrap();
    catalog.ingest(&Batch::from_json(FIXTURE).unwrap()).unwrap();
    let ids: Vec<String> = catalog
        .expressions_of("corundum")
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["corundum", "corundum-tabular", "corundum-barrel"]);
    assert_eq!(catalog.primary_expression("diamond").unwrap().unwrap().slug, "default");
    let octahedron = catalog.expressions_of("fluorite").unwrap().pop().unwrap();
    assert_eq!(octahedron.name, "Octahedron");
    assert_eq!(octahedron.family_id, "fluorite");
}

#[test]
fn array_and_single_document_forms_are_accepted() {
    let catalog = Catalog::in_memory().unwrap();
    let single = r#"{"id": "Spinel", "name": "Spinel", "crystal_system": "Cubic", "sg": 3.6,
        "expressions": [{"cdl": "cubic[m3m]:{111}"}]}"#;
    let report = catalog.ingest(&Batch::from_json(single).unwrap()).unwrap();
    assert_eq!((report.families, report.expressions), (1, 1));
    let spinel = catalog.get("spinel").unwrap().unwrap();
    assert_eq!(spinel.system, "cubic");
    assert_eq!(spinel.sg.as_deref(), Some("3.6"));

    let array = r#"[{"id": "topaz", "name": "Topaz", "crystal_system": "orthorhombic", "expressions": [{"cdl": "orthorhombic[mmm]:{110}"}]},
                    {"id": "peridot", "name": "Peridot", "crystal_system": "orthorhombic", "expressions": [{"cdl": "orthorhombic[mmm]:{010}"}]}]"#;
    assert_eq!(catalog.ingest(&Batch::from_json(array).unwrap()).unwrap().families, 2);
    assert_eq!(catalog.list(Some("orthorhombic")).unwrap(), vec!["peridot", "topaz"]);
}

#[test]
fn reingesting_updates_in_place() {
    let catalog = Catalog::in_memory().unwrap();
    catalog.ingest(&Batch::from_json(FIXTURE).unwrap()).unwrap();
    let update = r#"{"families": [
        {"id": "opal", "name": "Precious Opal", "crystal_system": "amorphous", "hardness": "5.5-6.5",
         "expressions": [{"cdl": ""}]}
    ], "categories": [{"name": "Gems", "ids": ["opal"]}]}"#;
    catalog.ingest(&Batch::from_json(update).unwrap()).unwrap();
    assert_eq!(catalog.get("opal").unwrap().unwrap().name, "Precious Opal");
    assert_eq!(catalog.list(Some("gems")).unwrap(), vec!["opal"]);
    assert_eq!(catalog.count().unwrap(), 16);
    assert_eq!(catalog.search("precious").unwrap(), vec!["opal"]);
}

#[test]
fn reingesting_a_family_replaces_its_expressions() {
    let catalog = Catalog::in_memory().unwrap();
    catalog.ingest(&Batch::from_json(FIXTURE).unwrap()).unwrap();
    assert!(catalog.get("diamond-macle").unwrap().is_some());

    let fewer = r#"{"id": "diamond", "name": "Diamond", "crystal_system": "cubic",
        "expressions": [{"cdl": "cubic[m3m]:{111}", "is_primary": true}]}"#;
    catalog.ingest(&Batch::from_json(fewer).unwrap()).unwrap();
    let ids: Vec<String> = catalog
        .expressions_of("diamond")
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["diamond"]);
    assert!(catalog.get("diamond-macle").unwrap().is_none());
    assert!(!catalog.list(None).unwrap().contains(&"diamond-macle".to_string()));
    assert!(catalog.search("macle").unwrap().is_empty());
    assert_eq!(catalog.count().unwrap(), 15);
    // other families and legacy rows are untouched
    assert!(catalog.get("corundum-barrel").unwrap().is_some());
    assert!(catalog.get("pyrite").unwrap().is_some());
}

fn rejected(catalog: &Catalog, text: &str) -> String {
    match catalog.ingest(&Batch::from_json(text).unwrap()) {
        Err(CatalogError::Ingestion { id, .. }) => id,
        other => panic!("expected an ingestion error, got {other:?}"),
    }
}

#[test]
fn invalid_documents_are_rejected_with_their_id() {
    let catalog = Catalog::in_memory().unwrap();
    let two_primaries = r#"{"id": "beryl", "name": "Beryl", "crystal_system": "hexagonal", "expressions": [
        {"cdl": "hexagonal[6/mmm]:{10-10}", "is_primary": true},
        {"slug": "tabular", "cdl": "hexagonal[6/mmm]:{0001}", "is_primary": true}]}"#;
    assert_eq!(rejected(&catalog, two_primaries), "beryl");

    let counterpart = r#"{"id": "ruby", "name": "Ruby", "crystal_system": "trigonal", "natural_counterpart_id": "corundum"}"#;
    assert_eq!(rejected(&catalog, counterpart), "ruby");

    let no_cdl = r#"{"id": "quartz", "name": "Quartz", "crystal_system": "trigonal", "expressions": [{"slug": "prism"}]}"#;
    assert_eq!(rejected(&catalog, no_cdl), "quartz-prism");

    let duplicated = r#"[{"id": "jade", "name": "Jade", "crystal_system": "monoclinic"},
                         {"id": "JADE", "name": "Jade", "crystal_system": "monoclinic"}]"#;
    assert_eq!(rejected(&catalog, duplicated), "jade");

    assert_eq!(catalog.count().unwrap(), 0);
    assert!(catalog.families().unwrap().is_empty());
}

#[test]
fn malformed_json_never_reaches_the_store() {
    assert!(matches!(Batch::from_json("[{\"id\": 1"), Err(CatalogError::Ingestion { .. })));
    assert!(matches!(
        Batch::from_json(r#"{"id": "x", "name": "X"}"#),
        Err(CatalogError::Ingestion { .. })
    ));
}
