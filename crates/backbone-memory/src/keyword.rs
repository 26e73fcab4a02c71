use std::collections::{HashMap, HashSet};

use backbone_core::types::Id;

use crate::types::DedupGroup;

/// Keyword-overlap disjoint-set grouping (spec.md §4.4, grounded on
/// `original_source/services/brain/app/memories/dedup.py
/// ::deduplicate_memories_keyword`): for every unordered pair sharing more
/// than `min_shared_keywords` (lowercased) keywords, union them into a
/// group — a pair touching an existing group is absorbed into it. Groups
/// are then ranked by the maximum shared-keyword count of any internal
/// pair, descending.
pub fn group_by_shared_keywords(mem_keywords: &HashMap<Id, HashSet<String>>, min_shared_keywords: usize) -> Vec<DedupGroup> {
    let ids: Vec<&Id> = mem_keywords.keys().collect();
    let mut groups: Vec<HashSet<Id>> = Vec::new();

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (id1, id2) = (ids[i], ids[j]);
            let shared = mem_keywords[id1].intersection(&mem_keywords[id2]).count();
            if shared > min_shared_keywords {
                let existing = groups.iter_mut().find(|g| g.contains(id1) || g.contains(id2));
                match existing {
                    Some(group) => {
                        group.insert(id1.clone());
                        group.insert(id2.clone());
                    }
                    None => {
                        let mut group = HashSet::new();
                        group.insert(id1.clone());
                        group.insert(id2.clone());
                        groups.push(group);
                    }
                }
            }
        }
    }

    let mut ranked: Vec<DedupGroup> = groups
        .into_iter()
        .filter(|g| g.len() > 1)
        .map(|group| {
            let memory_ids: Vec<Id> = group.into_iter().collect();
            let rank_score = max_shared_count(&memory_ids, mem_keywords);
            DedupGroup { memory_ids, rank_score }
        })
        .collect();

    ranked.sort_by(|a, b| b.rank_score.partial_cmp(&a.rank_score).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

fn max_shared_count(memory_ids: &[Id], mem_keywords: &HashMap<Id, HashSet<String>>) -> f64 {
    let mut max_shared = 0usize;
    for i in 0..memory_ids.len() {
        for j in (i + 1)..memory_ids.len() {
            let shared = mem_keywords[&memory_ids[i]].intersection(&mem_keywords[&memory_ids[j]]).count();
            max_shared = max_shared.max(shared);
        }
    }
    max_shared as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(words: &[&str]) -> HashSet<String> {
        words.iter().map(|s| s.to_lowercase()).collect()
    }

    #[test]
    fn pairs_sharing_enough_keywords_are_grouped_and_absorbed() {
        let a = Id::new();
        let b = Id::new();
        let c = Id::new();
        let mut map = HashMap::new();
        map.insert(a.clone(), kw(&["rust", "async", "tokio"]));
        map.insert(b.clone(), kw(&["rust", "async", "axum"]));
        map.insert(c.clone(), kw(&["rust", "async", "tokio"]));

        let groups = group_by_shared_keywords(&map, 2);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].memory_ids.len(), 3);
    }

    #[test]
    fn groups_rank_by_max_shared_keyword_count_descending() {
        let a = Id::new();
        let b = Id::new();
        let c = Id::new();
        let d = Id::new();
        let mut map = HashMap::new();
        // a/b share 3, c/d share exactly min_shared+1=3 too but fewer overlap elsewhere
        map.insert(a.clone(), kw(&["x", "y", "z", "w"]));
        map.insert(b.clone(), kw(&["x", "y", "z", "q"]));
        map.insert(c.clone(), kw(&["p", "q", "r"]));
        map.insert(d.clone(), kw(&["p", "q", "s"]));

        let groups = group_by_shared_keywords(&map, 1);
        assert!(groups[0].rank_score >= groups.last().unwrap().rank_score);
    }

    #[test]
    fn pairs_below_threshold_are_not_grouped() {
        let a = Id::new();
        let b = Id::new();
        let mut map = HashMap::new();
        map.insert(a.clone(), kw(&["rust"]));
        map.insert(b.clone(), kw(&["rust", "async"]));

        let groups = group_by_shared_keywords(&map, 2);
        assert!(groups.is_empty());
    }
}
