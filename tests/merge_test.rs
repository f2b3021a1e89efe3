mod common;

use attio_tools::app::duplicates::{group_records, DuplicateKey, ObjectFilter};
use attio_tools::app::merge_use_case::{MergeOptions, MergeOutcome, MergeUseCase};
use attio_tools::infra::in_memory::InMemoryCrm;
use attio_tools::infra::retrying::RetryingCrm;
use attio_tools::retry::RetryPolicy;
use attio_tools::types::{Record, RecordId};
use common::{company, person, ScriptedPrompter};
use std::time::Duration;

fn no_pauses() -> MergeOptions {
    MergeOptions::default().without_pauses()
}

fn acme_trio() -> Vec<Record> {
    vec![
        company("a", "Acme", 1, &["acme.com"]),
        company("b", "Acme", 2, &["acme.io"]),
        company("c", "Acme", 3, &["acme.dev"]),
    ]
}

#[tokio::test]
async fn test_merge_keeps_one_record_with_union_of_domains() {
    for n in 2..=5usize {
        let crm = InMemoryCrm::new();
        let records: Vec<_> = (0..n)
            .map(|i| {
                let domain = format!("acme-{i}.com");
                company(&format!("c{i}"), "Acme", 100 + i as i64, &[domain.as_str()])
            })
            .collect();
        for r in &records {
            crm.insert(r.clone());
        }
        let group = group_records(&records, DuplicateKey::CompanyName).remove(0);
        let prompter = ScriptedPrompter::new(&["y"]);

        let result = MergeUseCase::new(&crm, &prompter, no_pauses())
            .merge_group(&group)
            .await
            .unwrap();

        assert_eq!(result.outcome, MergeOutcome::Merged { deleted: n - 1 });
        assert_eq!(crm.calls().deletes, n - 1);
        let remaining = crm.records("companies");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id.as_str(), "c0");
        let expected: Vec<String> = (0..n).map(|i| format!("acme-{i}.com")).collect();
        assert_eq!(remaining[0].list("domains"), expected);
    }
}

#[tokio::test]
async fn test_failed_delete_stops_group_before_patch() {
    let crm = InMemoryCrm::new();
    let records = acme_trio();
    for r in &records {
        crm.insert(r.clone());
    }
    crm.fail_delete(&RecordId::new("b"));
    let group = group_records(&records, DuplicateKey::CompanyName).remove(0);
    let prompter = ScriptedPrompter::new(&["y"]);

    let result = MergeUseCase::new(&crm, &prompter, no_pauses())
        .merge_group(&group)
        .await
        .unwrap();

    match &result.outcome {
        MergeOutcome::DeleteFailed { deleted, failed, .. } => {
            assert_eq!(*deleted, 0);
            assert_eq!(failed.as_str(), "b");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(crm.calls().deletes, 1);
    assert_eq!(crm.calls().updates, 0);
    assert_eq!(crm.records("companies").len(), 3);
    let kept = crm.record("companies", &RecordId::new("a")).unwrap();
    assert_eq!(kept.list("domains"), vec!["acme.com"]);
}

#[tokio::test]
async fn test_delete_retried_after_a_lost_response_still_folds_domains() {
    let crm = RetryingCrm::new(
        InMemoryCrm::new(),
        RetryPolicy::new(3).with_base_delay(Duration::ZERO),
    );
    let records = acme_trio();
    for r in &records {
        crm.inner().insert(r.clone());
    }
    crm.inner().lose_delete_response(&RecordId::new("b"));
    let group = group_records(&records, DuplicateKey::CompanyName).remove(0);
    let prompter = ScriptedPrompter::new(&["y"]);

    let result = MergeUseCase::new(&crm, &prompter, no_pauses())
        .merge_group(&group)
        .await
        .unwrap();

    assert_eq!(result.outcome, MergeOutcome::Merged { deleted: 2 });
    // b: timed-out attempt, then a 404 on the retry; c: one attempt
    assert_eq!(crm.inner().calls().deletes, 3);
    let remaining = crm.inner().records("companies");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].list("domains"), vec!["acme.com", "acme.io", "acme.dev"]);
}

#[tokio::test]
async fn test_failed_patch_is_reported_after_the_deletes() {
    let crm = InMemoryCrm::new();
    let records = acme_trio();
    for r in &records {
        crm.insert(r.clone());
    }
    crm.fail_update(&RecordId::new("a"));
    let group = group_records(&records, DuplicateKey::CompanyName).remove(0);
    let prompter = ScriptedPrompter::new(&["y"]);

    let result = MergeUseCase::new(&crm, &prompter, no_pauses())
        .merge_group(&group)
        .await
        .unwrap();

    match &result.outcome {
        MergeOutcome::PatchFailed { deleted, error } => {
            assert_eq!(*deleted, 2);
            assert!(error.contains("400"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(result.outcome.is_failure());
    assert_eq!(result.consolidated, vec!["acme.com", "acme.io", "acme.dev"]);
    assert_eq!(crm.calls().updates, 1);
    let kept = crm.record("companies", &RecordId::new("a")).unwrap();
    assert_eq!(kept.list("domains"), vec!["acme.com"]);
    assert_eq!(crm.records("companies").len(), 1);
}

#[tokio::test]
async fn test_revoked_credentials_abort_the_merge_run() {
    let crm = InMemoryCrm::new();
    for r in [
        company("a1", "Acme", 1, &["acme.com"]),
        company("a2", "Acme", 2, &["acme.io"]),
        company("g1", "Globex", 3, &["globex.com"]),
        company("g2", "Globex", 4, &["globex.io"]),
    ] {
        crm.insert(r);
    }
    crm.revoke_credentials();
    let prompter = ScriptedPrompter::new(&[]);
    let options = MergeOptions {
        assume_yes: true,
        ..no_pauses()
    };

    let err = MergeUseCase::new(&crm, &prompter, options)
        .run(ObjectFilter::Companies)
        .await
        .unwrap_err();

    assert!(err.is_auth());
    assert_eq!(crm.calls().deletes, 1);
    assert_eq!(crm.calls().updates, 0);
    assert_eq!(crm.records("companies").len(), 4);
}

#[tokio::test]
async fn test_each_group_is_confirmed_separately() {
    let crm = InMemoryCrm::new();
    let records = vec![
        company("a1", "Acme", 1, &["acme.com"]),
        company("a2", "Acme", 2, &["acme.io"]),
        company("g1", "Globex", 3, &["globex.com"]),
        company("g2", "Globex", 4, &["globex.io"]),
    ];
    for r in &records {
        crm.insert(r.clone());
    }
    let groups = group_records(&records, DuplicateKey::CompanyName);
    let prompter = ScriptedPrompter::new(&["n", "y"]);

    let summary = MergeUseCase::new(&crm, &prompter, no_pauses())
        .merge_groups(&groups)
        .await
        .unwrap();

    assert_eq!(summary.results[0].outcome, MergeOutcome::Declined);
    assert_eq!(summary.results[1].outcome, MergeOutcome::Merged { deleted: 1 });
    assert_eq!(summary.merged(), 1);
    assert_eq!(summary.deleted(), 1);
    assert_eq!(prompter.remaining(), 0);
    assert!(crm.record("companies", &RecordId::new("a2")).is_some());
    assert!(crm.record("companies", &RecordId::new("g2")).is_none());
}

#[tokio::test]
async fn test_people_merge_consolidates_email_addresses() {
    let crm = InMemoryCrm::new();
    let records = vec![
        person("p1", "Ada Lovelace", 1, "ada@example.com"),
        person("p2", "Ada Lovelace", 2, "ada@work.example"),
    ];
    for r in &records {
        crm.insert(r.clone());
    }
    let group = group_records(&records, DuplicateKey::PersonName).remove(0);
    let prompter = ScriptedPrompter::new(&[]);
    let options = MergeOptions {
        assume_yes: true,
        ..no_pauses()
    };

    MergeUseCase::new(&crm, &prompter, options)
        .merge_group(&group)
        .await
        .unwrap();

    let kept = crm.record("people", &RecordId::new("p1")).unwrap();
    assert_eq!(
        kept.list("email_addresses"),
        vec!["ada@example.com", "ada@work.example"]
    );
    assert_eq!(crm.records("people").len(), 1);
}
