//! Duplicate detection over Attio People and Company records.
//!
//! Records are paged in oldest-first, bucketed by a normalized key (name,
//! email address or domain) and every bucket with two or more members
//! becomes a [`DuplicateGroup`]. The first member of a group is always the
//! oldest record, which the merger keeps.

use crate::app::ports::CrmApi;
use crate::constants::{ATTR_DOMAINS, ATTR_EMAIL_ADDRESSES, COMPANIES, PEOPLE};
use crate::error::Result;
use crate::types::{Record, RecordId, RecordQuery};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

/// Criterion a duplicate group was formed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DuplicateKey {
    PersonEmail,
    PersonName,
    CompanyDomain,
    CompanyName,
}

impl DuplicateKey {
    pub fn object(self) -> &'static str {
        match self {
            DuplicateKey::PersonEmail | DuplicateKey::PersonName => PEOPLE,
            DuplicateKey::CompanyDomain | DuplicateKey::CompanyName => COMPANIES,
        }
    }

    pub fn section_title(self) -> &'static str {
        match self {
            DuplicateKey::PersonEmail => "PEOPLE (BY EMAIL)",
            DuplicateKey::PersonName => "PEOPLE (BY NAME)",
            DuplicateKey::CompanyDomain => "COMPANIES (BY DOMAIN)",
            DuplicateKey::CompanyName => "COMPANIES (BY NAME)",
        }
    }

    fn key_label(self) -> &'static str {
        match self {
            DuplicateKey::PersonEmail => "Email",
            DuplicateKey::CompanyDomain => "Domain",
            DuplicateKey::PersonName | DuplicateKey::CompanyName => "Name",
        }
    }

    fn key_noun(self) -> &'static str {
        match self {
            DuplicateKey::PersonEmail => "email addresses",
            DuplicateKey::CompanyDomain => "domains",
            DuplicateKey::PersonName | DuplicateKey::CompanyName => "names",
        }
    }

    /// Normalized keys a record contributes under this criterion
    pub fn keys_for(self, record: &Record) -> Vec<String> {
        let mut keys: Vec<String> = match self {
            DuplicateKey::PersonName | DuplicateKey::CompanyName => {
                let name = record.display_name();
                if name == "Unknown" {
                    Vec::new()
                } else {
                    vec![normalize_key(name)]
                }
            }
            DuplicateKey::PersonEmail => record
                .list(ATTR_EMAIL_ADDRESSES)
                .iter()
                .map(|e| e.trim().to_lowercase())
                .collect(),
            DuplicateKey::CompanyDomain => record
                .list(ATTR_DOMAINS)
                .iter()
                .map(|d| d.trim().to_lowercase())
                .collect(),
        };
        keys.retain(|k| !k.is_empty());
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Which objects a command looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ObjectFilter {
    People,
    Companies,
    All,
}

impl ObjectFilter {
    pub fn objects(self) -> Vec<&'static str> {
        match self {
            ObjectFilter::People => vec![PEOPLE],
            ObjectFilter::Companies => vec![COMPANIES],
            ObjectFilter::All => vec![PEOPLE, COMPANIES],
        }
    }

    pub fn criteria(self) -> Vec<DuplicateKey> {
        let mut criteria = Vec::new();
        if matches!(self, ObjectFilter::People | ObjectFilter::All) {
            criteria.extend([DuplicateKey::PersonEmail, DuplicateKey::PersonName]);
        }
        if matches!(self, ObjectFilter::Companies | ObjectFilter::All) {
            criteria.extend([DuplicateKey::CompanyDomain, DuplicateKey::CompanyName]);
        }
        criteria
    }
}

/// Trim, lowercase and collapse inner whitespace
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Records sharing one normalized key; members are ordered oldest first
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub criterion: DuplicateKey,
    pub key: String,
    pub members: Vec<Record>,
}

impl DuplicateGroup {
    /// The merge target
    pub fn oldest(&self) -> &Record {
        &self.members[0]
    }

    pub fn newer(&self) -> &[Record] {
        &self.members[1..]
    }

    pub fn record_ids(&self) -> Vec<RecordId> {
        self.members.iter().map(|r| r.id.clone()).collect()
    }
}

/// Oldest first; records without a timestamp last; ties by id
fn age_order(a: &Record, b: &Record) -> std::cmp::Ordering {
    let key = |r: &Record| (r.created_at.is_none(), r.created_at, r.id.clone());
    key(a).cmp(&key(b))
}

/// Bucket records under `criterion` and keep buckets with two or more members.
pub fn group_records(records: &[Record], criterion: DuplicateKey) -> Vec<DuplicateGroup> {
    let mut buckets: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for record in records {
        for key in criterion.keys_for(record) {
            buckets.entry(key).or_default().push(record.clone());
        }
    }
    buckets
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(key, mut members)| {
            members.sort_by(age_order);
            DuplicateGroup {
                criterion,
                key,
                members,
            }
        })
        .collect()
}

/// Page through every record of `object`, oldest first.
///
/// Any error aborts the scan; pages fetched so far are dropped with it.
#[instrument(skip(api))]
pub async fn fetch_all_records(api: &dyn CrmApi, object: &str, page_size: usize) -> Result<Vec<Record>> {
    println!("Fetching all {object}...");
    let mut records = Vec::new();
    let mut offset = 0;
    loop {
        let page = api
            .query_records(object, &RecordQuery::page(page_size, offset))
            .await?;
        let fetched = page.len();
        records.extend(page);
        println!("  Fetched {} records (Total: {})", fetched, records.len());
        if fetched < page_size {
            break;
        }
        offset += page_size;
    }
    info!("Fetched {} {} records", records.len(), object);
    Ok(records)
}

/// Everything one `find-duplicates` run found
#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    pub scanned: BTreeMap<String, usize>,
    pub sections: Vec<(DuplicateKey, Vec<DuplicateGroup>)>,
}

impl DuplicateReport {
    pub fn groups(&self, criterion: DuplicateKey) -> &[DuplicateGroup] {
        self.sections
            .iter()
            .find(|(c, _)| *c == criterion)
            .map(|(_, groups)| groups.as_slice())
            .unwrap_or(&[])
    }

    pub fn total_groups(&self) -> usize {
        self.sections.iter().map(|(_, groups)| groups.len()).sum()
    }

    /// Every record id that appears in some group
    pub fn flagged_ids(&self) -> HashSet<RecordId> {
        self.sections
            .iter()
            .flat_map(|(_, groups)| groups.iter())
            .flat_map(|g| g.members.iter().map(|r| r.id.clone()))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "DUPLICATE REPORT");
        let _ = writeln!(out, "================");
        for (object, count) in &self.scanned {
            let _ = writeln!(out, "Scanned {count} {object} records");
        }
        for (criterion, groups) in &self.sections {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "{}: Found {} {} with duplicate {} records.",
                criterion.section_title(),
                groups.len(),
                criterion.key_noun(),
                criterion.object()
            );
            if groups.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{}", "-".repeat(40));
            for group in groups {
                let _ = writeln!(out);
                let _ = writeln!(
                    out,
                    "{}: {} ({} records)",
                    criterion.key_label(),
                    group.key,
                    group.members.len()
                );
                for (i, record) in group.members.iter().enumerate() {
                    let _ = writeln!(out, "{}", member_line(*criterion, record, i == 0));
                }
            }
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        Ok(())
    }
}

fn member_line(criterion: DuplicateKey, record: &Record, oldest: bool) -> String {
    let created = record
        .created_at
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    let detail = match criterion {
        DuplicateKey::CompanyName | DuplicateKey::CompanyDomain => {
            format!("Domains: [{}]", record.list(ATTR_DOMAINS).join(", "))
        }
        DuplicateKey::PersonName | DuplicateKey::PersonEmail => {
            format!("Emails: [{}]", record.list(ATTR_EMAIL_ADDRESSES).join(", "))
        }
    };
    let keep = if oldest { " [oldest]" } else { "" };
    format!(
        "  - ID: {} | Name: {} | {} | Created: {}{}",
        record.id,
        record.display_name(),
        detail,
        created,
        keep
    )
}

/// Read-only duplicate scan
pub struct DuplicateFinder<'a> {
    api: &'a dyn CrmApi,
    page_size: usize,
}

impl<'a> DuplicateFinder<'a> {
    pub fn new(api: &'a dyn CrmApi, page_size: usize) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
        }
    }

    #[instrument(skip(self))]
    pub async fn find(&self, filter: ObjectFilter) -> Result<DuplicateReport> {
        let mut report = DuplicateReport::default();
        let mut fetched: BTreeMap<&str, Vec<Record>> = BTreeMap::new();
        for object in filter.objects() {
            let records = fetch_all_records(self.api, object, self.page_size).await?;
            report.scanned.insert(object.to_string(), records.len());
            fetched.insert(object, records);
        }
        for criterion in filter.criteria() {
            let records = fetched
                .get(criterion.object())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let groups = group_records(records, criterion);
            info!(
                criterion = criterion.section_title(),
                groups = groups.len(),
                "Duplicate scan complete"
            );
            report.sections.push((criterion, groups));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;
    use chrono::{TimeZone, Utc};

    fn company(id: &str, name: &str, secs: i64, domains: &[&str]) -> Record {
        Record::new(id, COMPANIES)
            .created(Utc.timestamp_opt(secs, 0).unwrap())
            .with_value("name", FieldValue::Text(name.into()))
            .with_value(
                ATTR_DOMAINS,
                FieldValue::List(domains.iter().map(|d| d.to_string()).collect()),
            )
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Acme   Corp "), "acme corp");
        assert_eq!(normalize_key("ACME"), "acme");
    }

    #[test]
    fn test_groups_by_normalized_name_oldest_first() {
        let records = vec![
            company("b", "Acme Corp", 20, &[]),
            company("a", "acme  corp", 10, &[]),
            company("c", "Other", 5, &[]),
        ];
        let groups = group_records(&records, DuplicateKey::CompanyName);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "acme corp");
        assert_eq!(groups[0].oldest().id.as_str(), "a");
        assert_eq!(groups[0].newer().len(), 1);
    }

    #[test]
    fn test_unknown_names_are_not_grouped() {
        let records = vec![Record::new("x", COMPANIES), Record::new("y", COMPANIES)];
        assert!(group_records(&records, DuplicateKey::CompanyName).is_empty());
    }

    #[test]
    fn test_groups_by_domain_case_insensitive() {
        let records = vec![
            company("a", "Acme", 1, &["Acme.com"]),
            company("b", "Acme Inc", 2, &["acme.com", "acme.io"]),
        ];
        let groups = group_records(&records, DuplicateKey::CompanyDomain);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "acme.com");
    }

    #[test]
    fn test_missing_timestamp_sorts_last() {
        let undated = Record::new("z", COMPANIES).with_value("name", FieldValue::Text("Acme".into()));
        let records = vec![undated, company("y", "Acme", 100, &[])];
        let groups = group_records(&records, DuplicateKey::CompanyName);
        assert_eq!(groups[0].oldest().id.as_str(), "y");
    }

    #[test]
    fn test_filter_criteria() {
        assert_eq!(ObjectFilter::People.criteria().len(), 2);
        assert_eq!(ObjectFilter::All.criteria().len(), 4);
        assert_eq!(ObjectFilter::Companies.objects(), vec!["companies"]);
    }

    #[test]
    fn test_render_lists_groups() {
        let records = vec![
            company("a", "Acme", 1, &["acme.com"]),
            company("b", "Acme", 2, &["acme.io"]),
        ];
        let report = DuplicateReport {
            scanned: BTreeMap::from([("companies".to_string(), 2)]),
            sections: vec![
                (DuplicateKey::CompanyDomain, group_records(&records, DuplicateKey::CompanyDomain)),
                (DuplicateKey::CompanyName, group_records(&records, DuplicateKey::CompanyName)),
            ],
        };
        let text = report.render();
        assert!(text.contains("COMPANIES (BY DOMAIN): Found 0 domains"));
        assert!(text.contains("COMPANIES (BY NAME): Found 1 names"));
        assert!(text.contains("Name: acme (2 records)"));
        assert!(text.contains("  - ID: a | Name: Acme | Domains: [acme.com]"));
        assert!(text.contains("[oldest]"));
        assert_eq!(report.total_groups(), 1);
    }
}
