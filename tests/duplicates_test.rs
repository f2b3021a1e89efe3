mod common;

use attio_tools::app::duplicates::{DuplicateFinder, DuplicateKey, ObjectFilter};
use attio_tools::app::merge_use_case::{MergeOptions, MergeUseCase};
use attio_tools::infra::in_memory::InMemoryCrm;
use common::{company, person, ScriptedPrompter};

fn seeded_crm() -> InMemoryCrm {
    let crm = InMemoryCrm::new();
    crm.insert(company("c1", "Acme", 100, &["acme.com"]));
    crm.insert(company("c2", "ACME ", 200, &["acme.io"]));
    crm.insert(company("c3", "Globex", 150, &["globex.com", "acme.io"]));
    crm.insert(company("c4", "Initech", 50, &[]));
    crm.insert(person("p1", "Ada Lovelace", 10, "ada@example.com"));
    crm.insert(person("p2", "Ada  Lovelace", 20, "ADA@example.com"));
    crm.insert(person("p3", "Grace Hopper", 30, "grace@example.com"));
    crm
}

#[tokio::test]
async fn test_finder_pages_through_every_record() {
    let crm = seeded_crm();
    // Page size 2 forces several query calls
    let report = DuplicateFinder::new(&crm, 2).find(ObjectFilter::All).await.unwrap();

    assert_eq!(report.scanned["companies"], 4);
    assert_eq!(report.scanned["people"], 3);
    // companies: 4 records -> pages of 2, 2, 0; people: 3 -> pages of 2, 1
    assert_eq!(crm.calls().queries, 5);

    let names = report.groups(DuplicateKey::CompanyName);
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].oldest().id.as_str(), "c1");

    let domains = report.groups(DuplicateKey::CompanyDomain);
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0].key, "acme.io");
    assert_eq!(domains[0].oldest().id.as_str(), "c3");

    assert_eq!(report.groups(DuplicateKey::PersonName).len(), 1);
    assert_eq!(report.groups(DuplicateKey::PersonEmail)[0].key, "ada@example.com");
    assert_eq!(crm.calls().mutating(), 0);
}

#[tokio::test]
async fn test_every_group_has_two_members_oldest_first() {
    let crm = seeded_crm();
    let report = DuplicateFinder::new(&crm, 1000).find(ObjectFilter::All).await.unwrap();
    for (_, groups) in &report.sections {
        for group in groups {
            assert!(group.members.len() >= 2);
            let oldest = group.oldest().created_at.unwrap();
            assert!(group.newer().iter().all(|r| r.created_at.unwrap() >= oldest));
        }
    }
}

#[tokio::test]
async fn test_report_file_lists_groups() {
    let crm = seeded_crm();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("duplicates_report.txt");
    let report = DuplicateFinder::new(&crm, 1000)
        .find(ObjectFilter::Companies)
        .await
        .unwrap();
    report.write_to(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("COMPANIES (BY NAME): Found 1 names"));
    assert!(text.contains("Domain: acme.io (2 records)"));
    assert!(!text.contains("PEOPLE"));
}

#[tokio::test]
async fn test_rescan_after_merge_never_shows_deleted_ids() {
    let crm = seeded_crm();
    let prompter = ScriptedPrompter::new(&[]);
    let options = MergeOptions {
        assume_yes: true,
        ..MergeOptions::default().without_pauses()
    };
    let summary = MergeUseCase::new(&crm, &prompter, options)
        .run(ObjectFilter::All)
        .await
        .unwrap();
    let deleted: Vec<_> = summary
        .results
        .iter()
        .flat_map(|r| r.removed.iter().cloned())
        .collect();
    assert_eq!(deleted.len(), 2);

    let after = DuplicateFinder::new(&crm, 1000).find(ObjectFilter::All).await.unwrap();
    let flagged = after.flagged_ids();
    assert!(deleted.iter().all(|id| !flagged.contains(id)));
    assert!(after.groups(DuplicateKey::CompanyName).is_empty());
    assert!(after.groups(DuplicateKey::PersonName).is_empty());
}
