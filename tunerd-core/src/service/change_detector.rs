//! Catalog change detection
//!
//! Diffs a freshly fetched provider catalog against the stored source
//! table for one account. Pure function of the two catalogs — it performs
//! no writes, which keeps it independently testable.

use std::collections::HashMap;

use crate::models::{AccountId, ChangeSet, ScannedSource, Source, SourceChange};

/// Diff the stored sources of one account against a fresh scan.
///
/// Keyed on the provider-assigned stream id:
/// - keys only in the fresh list become `new_sources`
/// - keys only in the stored table become `removed_source_ids`
/// - keys in both with differing name/icon/qualities become
///   `changed_sources`; identical entries are ignored
#[must_use]
pub fn detect_changes(
    account_id: AccountId,
    stored: &[Source],
    fresh: &[ScannedSource],
) -> ChangeSet {
    let stored_by_stream: HashMap<i64, &Source> = stored
        .iter()
        .map(|source| (source.provider_stream_id, source))
        .collect();
    let fresh_by_stream: HashMap<i64, &ScannedSource> = fresh
        .iter()
        .map(|scanned| (scanned.provider_stream_id, scanned))
        .collect();

    let mut changeset = ChangeSet::empty(account_id);

    for (stream_id, scanned) in &fresh_by_stream {
        match stored_by_stream.get(stream_id) {
            None => changeset.new_sources.push((*scanned).clone()),
            Some(source) if source.metadata_differs(scanned) => {
                changeset.changed_sources.push(SourceChange {
                    before: (*source).clone(),
                    after: (*scanned).clone(),
                });
            }
            Some(_) => {}
        }
    }

    for (stream_id, source) in &stored_by_stream {
        if !fresh_by_stream.contains_key(stream_id) {
            changeset.removed_source_ids.push(source.id.clone());
        }
    }

    changeset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountId;

    fn stored(account_id: &AccountId, stream_id: i64, name: &str) -> Source {
        Source::from_scan(account_id.clone(), &ScannedSource::new(stream_id, name))
    }

    #[test]
    fn test_detects_additions() {
        let account_id = AccountId::new();
        let stored = vec![stored(&account_id, 1, "ESPN")];
        let fresh = vec![ScannedSource::new(1, "ESPN"), ScannedSource::new(2, "CNN")];

        let changeset = detect_changes(account_id, &stored, &fresh);
        assert_eq!(changeset.new_sources.len(), 1);
        assert_eq!(changeset.new_sources[0].provider_stream_id, 2);
        assert!(changeset.removed_source_ids.is_empty());
        assert!(changeset.changed_sources.is_empty());
    }

    #[test]
    fn test_detects_removals() {
        let account_id = AccountId::new();
        let kept = stored(&account_id, 1, "ESPN");
        let gone = stored(&account_id, 2, "CNN");
        let fresh = vec![ScannedSource::new(1, "ESPN")];

        let changeset = detect_changes(account_id, &[kept, gone.clone()], &fresh);
        assert_eq!(changeset.removed_source_ids, vec![gone.id]);
        assert!(changeset.new_sources.is_empty());
    }

    #[test]
    fn test_detects_metadata_changes() {
        let account_id = AccountId::new();
        let before = stored(&account_id, 1, "ESPN");
        let fresh = vec![ScannedSource::new(1, "ESPN US")];

        let changeset = detect_changes(account_id, &[before.clone()], &fresh);
        assert_eq!(changeset.changed_sources.len(), 1);
        assert_eq!(changeset.changed_sources[0].before.id, before.id);
        assert_eq!(changeset.changed_sources[0].after.name, "ESPN US");
    }

    #[test]
    fn test_unchanged_catalog_is_empty_changeset() {
        let account_id = AccountId::new();
        let mut scanned = ScannedSource::new(1, "ESPN");
        scanned.qualities = vec!["HD".to_string()];
        let row = Source::from_scan(account_id.clone(), &scanned);

        let changeset = detect_changes(account_id, &[row], &[scanned]);
        assert!(changeset.is_empty());
    }
}
