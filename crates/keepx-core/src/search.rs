//! Entry search: substring, regex, and fuzzy ranking.

use crate::document::Document;
use crate::id::NodeId;
use crate::models::{Entry, PASSWORD_FIELD};
use crate::path::display_path;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::RegexBuilder;

/// Queries wrapped in `//…//` are regular expressions.
const REGEX_DELIMITER: &str = "//";

/// A fuzzy search match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub entry: NodeId,
    /// Display path of the entry's group.
    pub path: String,
    pub score: i64,
}

/// True when entries of `group` take part in searches.
///
/// The nearest explicit `enable_searching` on the way up wins; the recycle
/// bin is never searched.
pub fn is_searchable(doc: &Document, group: NodeId) -> bool {
    let Some(chain) = doc.tree.ancestry(group) else {
        return false;
    };
    let bin = doc.meta.recycle_bin_id;
    if !bin.is_zero() && bin != doc.tree.root_id() && chain.contains(&bin) {
        return false;
    }
    chain
        .iter()
        .rev()
        .find_map(|id| doc.tree.group(*id).and_then(|g| g.enable_searching))
        .unwrap_or(true)
}

/// Entries of `scope` and its searchable subgroups, in pre-order.
fn candidates(doc: &Document, scope: NodeId) -> Vec<&Entry> {
    if doc.tree.group(scope).is_none() {
        return Vec::new();
    }
    let mut groups = vec![scope];
    groups.extend(doc.tree.flatten_groups(scope));
    groups.retain(|g| is_searchable(doc, *g));
    doc.tree
        .flatten_entries(&groups)
        .into_iter()
        .filter_map(|id| doc.tree.entry(id))
        .collect()
}

/// Search entries below `scope`.
///
/// An empty query lists every entry, most recently modified first. A query
/// of the form `//pattern//` is a case-insensitive regex; anything else is a
/// case-insensitive substring. Passwords are never matched.
pub fn search_entries(doc: &Document, query: &str, scope: NodeId) -> Vec<NodeId> {
    let mut entries = candidates(doc, scope);

    if query.is_empty() {
        entries.sort_by(|a, b| b.times.last_modification.cmp(&a.times.last_modification));
        return entries.into_iter().map(|e| e.id).collect();
    }

    let matches: Box<dyn Fn(&str) -> bool> = match regex_pattern(query) {
        Some(pattern) => match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => Box::new(move |text| re.is_match(text)),
            Err(err) => {
                tracing::warn!("Invalid search pattern {:?}: {}", pattern, err);
                return Vec::new();
            }
        },
        None => {
            let needle = query.to_lowercase();
            Box::new(move |text| text.to_lowercase().contains(&needle))
        }
    };

    let found: Vec<NodeId> = entries
        .into_iter()
        .filter(|e| entry_matches(doc, e, &matches))
        .map(|e| e.id)
        .collect();
    tracing::debug!("Search {:?} matched {} entries", query, found.len());
    found
}

fn regex_pattern(query: &str) -> Option<&str> {
    if query.len() <= 2 * REGEX_DELIMITER.len() {
        return None;
    }
    query
        .strip_prefix(REGEX_DELIMITER)?
        .strip_suffix(REGEX_DELIMITER)
}

/// Checks unprotected field values, the id, and the parent group name.
fn entry_matches(doc: &Document, entry: &Entry, matches: &dyn Fn(&str) -> bool) -> bool {
    let field_hit = entry
        .fields
        .iter()
        .filter(|(name, field)| name.as_str() != PASSWORD_FIELD && !field.protected)
        .any(|(_, field)| matches(&field.value));
    if field_hit || matches(&entry.id.to_string()) {
        return true;
    }
    entry
        .parent
        .and_then(|p| doc.tree.group(p))
        .is_some_and(|g| matches(&g.name))
}

/// Rank entries by fuzzy match of "title username path" against `query`,
/// best first, keeping at most `limit`.
pub fn fuzzy_search(doc: &Document, query: &str, limit: usize) -> Vec<SearchHit> {
    if query.trim().is_empty() {
        return Vec::new();
    }
    let matcher = SkimMatcherV2::default();

    let mut scored: Vec<SearchHit> = candidates(doc, doc.tree.root_id())
        .into_iter()
        .filter_map(|entry| {
            let path = entry
                .parent
                .and_then(|p| display_path(&doc.tree, p))
                .unwrap_or_default();
            let search_text = format!("{} {} {}", entry.title(), entry.username(), path);
            matcher
                .fuzzy_match(&search_text, query)
                .map(|score| SearchHit {
                    entry: entry.id,
                    path,
                    score,
                })
        })
        .collect();

    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(limit);
    scored
}
