// SPDX-License-Identifier: AGPL-3.0-or-later
// SochDB - LLM-Optimized Embedded Database
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Imported attributes
//!
//! An imported attribute exposes a column owned by another document type.
//! Searches over it are expensive, so results are cached per query term in
//! a [`BitVectorSearchCache`]. The cache is only valid for the target state
//! it was computed against and is cleared whenever the writer commits.

use dashmap::DashMap;
use std::sync::Arc;

use crate::attribute::AttributeVector;
use crate::DocId;

/// Matching lids of one cached search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResult {
    pub hits: Vec<DocId>,
    /// Doc id limit the hits were computed against
    pub doc_id_limit: DocId,
}

#[derive(Debug, Default)]
pub struct BitVectorSearchCache {
    entries: DashMap<String, Arc<CachedResult>>,
}

impl BitVectorSearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, term: impl Into<String>, result: Arc<CachedResult>) {
        self.entries.insert(term.into(), result);
    }

    pub fn find(&self, term: &str) -> Option<Arc<CachedResult>> {
        self.entries.get(term).map(|entry| Arc::clone(entry.value()))
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[derive(Debug)]
pub struct ImportedAttribute {
    name: String,
    target: Option<Arc<dyn AttributeVector>>,
    search_cache: Arc<BitVectorSearchCache>,
}

impl ImportedAttribute {
    pub fn new(name: impl Into<String>, target: Option<Arc<dyn AttributeVector>>) -> Self {
        Self {
            name: name.into(),
            target,
            search_cache: Arc::new(BitVectorSearchCache::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> Option<&Arc<dyn AttributeVector>> {
        self.target.as_ref()
    }

    pub fn search_cache(&self) -> &Arc<BitVectorSearchCache> {
        &self.search_cache
    }

    pub fn clear_search_cache(&self) {
        let cleared = self.search_cache.size();
        self.search_cache.clear();
        if cleared > 0 {
            tracing::debug!(attribute = %self.name, cleared, "cleared imported search cache");
        }
    }
}

#[derive(Debug, Default)]
pub struct ImportedAttributesRepo {
    attributes: DashMap<String, Arc<ImportedAttribute>>,
}

impl ImportedAttributesRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, attribute: Arc<ImportedAttribute>) {
        self.attributes
            .insert(attribute.name().to_string(), attribute);
    }

    pub fn get(&self, name: &str) -> Option<Arc<ImportedAttribute>> {
        self.attributes.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn get_all(&self) -> Vec<Arc<ImportedAttribute>> {
        let mut all: Vec<_> = self
            .attributes
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn size(&self) -> usize {
        self.attributes.len()
    }

    pub fn clear_search_caches(&self) {
        for entry in self.attributes.iter() {
            entry.value().clear_search_cache();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imported(name: &str) -> Arc<ImportedAttribute> {
        let attribute = Arc::new(ImportedAttribute::new(name, None));
        attribute.search_cache().insert(
            "foo",
            Arc::new(CachedResult {
                hits: vec![1, 3],
                doc_id_limit: 4,
            }),
        );
        attribute
    }

    #[test]
    fn test_repo_clears_all_caches() {
        let repo = ImportedAttributesRepo::new();
        repo.add(imported("imported_b"));
        repo.add(imported("imported_a"));
        assert_eq!(repo.size(), 2);
        assert_eq!(repo.get("imported_a").unwrap().search_cache().size(), 1);
        let names: Vec<_> = repo.get_all().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["imported_a", "imported_b"]);

        repo.clear_search_caches();
        assert_eq!(repo.get("imported_a").unwrap().search_cache().size(), 0);
        assert_eq!(repo.get("imported_b").unwrap().search_cache().size(), 0);
    }

    #[test]
    fn test_cache_find() {
        let attribute = imported("x");
        let hit = attribute.search_cache().find("foo").unwrap();
        assert_eq!(hit.hits, vec![1, 3]);
        assert!(attribute.search_cache().find("bar").is_none());
    }
}
