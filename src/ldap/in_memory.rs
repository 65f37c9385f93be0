//! In-process [`DirectoryClient`] implementation.
//!
//! Backs the crate's tests and examples with a directory that honors search
//! scopes, filters, server-side sorting, modification semantics, and
//! cancellation, without a network in sight. Entries live under normalized
//! DNs in a `tokio::sync::RwLock`, so the client is safe for the concurrent
//! secondary lookups derived attributes may issue.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::resource::{Clock, RequestContext, SystemClock};
use crate::transform::format_generalized_time;

use super::filter::LdapFilter;
use super::{
    DirectoryClient, DirectoryError, Entry, Modification, ModificationType, ResultCode,
    SearchScope, SortKey,
};

/// An in-memory LDAP directory.
///
/// Maintains the operational attributes a real directory would:
/// `entryUUID` on add, `createTimestamp` and `modifyTimestamp` from the
/// injected [`Clock`].
pub struct InMemoryDirectory {
    entries: RwLock<BTreeMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            clock: Arc::new(SystemClock),
        }
    }
}

fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
        .to_lowercase()
}

fn parent_dn(dn: &str) -> Option<&str> {
    dn.split_once(',').map(|(_, parent)| parent)
}

fn in_scope(base: &str, scope: SearchScope, dn: &str) -> bool {
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::One => parent_dn(dn).map(normalize_dn).as_deref() == Some(base),
        SearchScope::Sub => dn == base || dn.ends_with(&format!(",{base}")),
    }
}

fn check_cancelled(ctx: &RequestContext) -> Result<(), DirectoryError> {
    if ctx.is_cancelled() {
        Err(DirectoryError::Cancelled)
    } else {
        Ok(())
    }
}

impl InMemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory pre-populated with entries.
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| (normalize_dn(&e.dn), e))
            .collect();
        Self {
            entries: RwLock::new(entries),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the directory's time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of entries currently stored.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the directory holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// A snapshot of the entry stored under `dn`, unprojected.
    pub async fn entry(&self, dn: &str) -> Option<Entry> {
        self.entries.read().await.get(&normalize_dn(dn)).cloned()
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn search(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
        sort: Option<&SortKey>,
        ctx: &RequestContext,
    ) -> Result<Vec<Entry>, DirectoryError> {
        check_cancelled(ctx)?;
        let filter = LdapFilter::parse(filter).map_err(|e| {
            DirectoryError::operation(ResultCode::Other(87), format!("bad filter: {e}"))
        })?;
        let base = normalize_dn(base_dn);
        let entries = self.entries.read().await;
        let mut results: Vec<Entry> = entries
            .iter()
            .filter(|(dn, _)| in_scope(&base, scope, dn))
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(_, entry)| entry.project(attributes))
            .collect();
        if let Some(sort) = sort {
            results.sort_by(|a, b| {
                let left = a.first_value_str(&sort.attribute).map(|v| v.to_lowercase());
                let right = b.first_value_str(&sort.attribute).map(|v| v.to_lowercase());
                // Entries without the sort attribute order last, per the
                // server-side sort control.
                let ordering = match (left, right) {
                    (Some(l), Some(r)) => l.cmp(&r),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                };
                if sort.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        Ok(results)
    }

    async fn read(
        &self,
        dn: &str,
        attributes: &[String],
        ctx: &RequestContext,
    ) -> Result<Option<Entry>, DirectoryError> {
        check_cancelled(ctx)?;
        Ok(self
            .entries
            .read()
            .await
            .get(&normalize_dn(dn))
            .map(|entry| entry.project(attributes)))
    }

    async fn add(&self, entry: &Entry, ctx: &RequestContext) -> Result<(), DirectoryError> {
        check_cancelled(ctx)?;
        let key = normalize_dn(&entry.dn);
        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Err(DirectoryError::operation(
                ResultCode::EntryAlreadyExists,
                format!("entry already exists: {}", entry.dn),
            ));
        }
        let mut stored = entry.clone();
        let now = format_generalized_time(self.clock.now());
        if !stored.has_attribute("entryUUID") {
            stored.add_str_value("entryUUID", &Uuid::new_v4().to_string());
        }
        stored.set_values("createTimestamp", vec![now.clone().into_bytes()]);
        stored.set_values("modifyTimestamp", vec![now.into_bytes()]);
        entries.insert(key, stored);
        Ok(())
    }

    async fn modify(
        &self,
        dn: &str,
        modifications: &[Modification],
        ctx: &RequestContext,
    ) -> Result<(), DirectoryError> {
        check_cancelled(ctx)?;
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&normalize_dn(dn))
            .ok_or_else(|| DirectoryError::no_such_object(dn))?;
        for modification in modifications {
            apply_modification(entry, modification);
        }
        let now = format_generalized_time(self.clock.now());
        entry.set_values("modifyTimestamp", vec![now.into_bytes()]);
        Ok(())
    }

    async fn delete(&self, dn: &str, ctx: &RequestContext) -> Result<(), DirectoryError> {
        check_cancelled(ctx)?;
        let mut entries = self.entries.write().await;
        entries
            .remove(&normalize_dn(dn))
            .map(|_| ())
            .ok_or_else(|| DirectoryError::no_such_object(dn))
    }
}

fn apply_modification(entry: &mut Entry, modification: &Modification) {
    match modification.kind {
        ModificationType::Add => {
            let existing = entry.values(&modification.attribute).to_vec();
            for value in &modification.values {
                if !existing.contains(value) {
                    entry.add_value(&modification.attribute, value.clone());
                }
            }
        }
        ModificationType::Delete => {
            if modification.values.is_empty() {
                entry.remove_attribute(&modification.attribute);
            } else {
                let remaining: Vec<Vec<u8>> = entry
                    .values(&modification.attribute)
                    .iter()
                    .filter(|v| !modification.values.contains(v))
                    .cloned()
                    .collect();
                entry.set_values(&modification.attribute, remaining);
            }
        }
        ModificationType::Replace => {
            entry.set_values(&modification.attribute, modification.values.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str, sn: &str) -> Entry {
        let mut entry = Entry::new(format!("uid={uid},ou=People,dc=example,dc=com"));
        entry.add_str_value("objectClass", "inetOrgPerson");
        entry.add_str_value("uid", uid);
        entry.add_str_value("sn", sn);
        entry
    }

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::with_entries([
            user("bjensen", "Jensen"),
            user("adoe", "Doe"),
            user("czhang", "Zhang"),
        ])
    }

    #[tokio::test]
    async fn subtree_search_applies_filter_and_projection() {
        let dir = directory();
        let ctx = RequestContext::with_generated_id();
        let results = dir
            .search(
                "dc=example, dc=com",
                SearchScope::Sub,
                "(uid=bjensen)",
                &["uid".to_string()],
                None,
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].has_attribute("uid"));
        assert!(!results[0].has_attribute("sn"));
    }

    #[tokio::test]
    async fn one_level_scope_excludes_the_base_and_grandchildren() {
        let dir = directory();
        let ctx = RequestContext::with_generated_id();
        let results = dir
            .search(
                "ou=People,dc=example,dc=com",
                SearchScope::One,
                "(objectClass=*)",
                &[],
                None,
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        let none = dir
            .search(
                "dc=example,dc=com",
                SearchScope::One,
                "(uid=bjensen)",
                &[],
                None,
                &ctx,
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn sort_key_orders_results_server_side() {
        let dir = directory();
        let ctx = RequestContext::with_generated_id();
        let sort = SortKey {
            attribute: "sn".to_string(),
            ascending: true,
        };
        let results = dir
            .search(
                "dc=example,dc=com",
                SearchScope::Sub,
                "(objectClass=inetOrgPerson)",
                &[],
                Some(&sort),
                &ctx,
            )
            .await
            .unwrap();
        let surnames: Vec<String> = results
            .iter()
            .filter_map(|e| e.first_value_str("sn"))
            .collect();
        assert_eq!(surnames, vec!["Doe", "Jensen", "Zhang"]);
    }

    #[tokio::test]
    async fn duplicate_add_reports_entry_already_exists() {
        let dir = directory();
        let ctx = RequestContext::with_generated_id();
        let err = dir.add(&user("bjensen", "Jensen"), &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::Operation {
                code: ResultCode::EntryAlreadyExists,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn modifications_apply_in_order() {
        let dir = directory();
        let ctx = RequestContext::with_generated_id();
        let dn = "uid=bjensen,ou=People,dc=example,dc=com";
        dir.modify(
            dn,
            &[
                Modification::new(
                    ModificationType::Replace,
                    "mail",
                    vec![b"new@x.com".to_vec()],
                ),
                Modification::new(ModificationType::Add, "mail", vec![b"alias@x.com".to_vec()]),
                Modification::new(ModificationType::Delete, "sn", vec![]),
            ],
            &ctx,
        )
        .await
        .unwrap();
        let entry = dir.entry(dn).await.unwrap();
        assert_eq!(entry.string_values("mail"), vec!["new@x.com", "alias@x.com"]);
        assert!(!entry.has_attribute("sn"));
    }

    #[tokio::test]
    async fn cancelled_contexts_abort_operations() {
        let dir = directory();
        let ctx = RequestContext::with_generated_id();
        ctx.cancel();
        let err = dir
            .read("uid=bjensen,ou=People,dc=example,dc=com", &[], &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, DirectoryError::Cancelled);
    }
}
