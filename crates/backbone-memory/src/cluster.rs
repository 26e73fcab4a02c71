/// Cosine distance (1 - cosine similarity) between two equal-length vectors.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - (dot / (norm_a * norm_b))
}

/// DBSCAN over cosine distance (spec.md §4.4: "cluster by DBSCAN on cosine
/// distance with `eps = 1 - similarity_threshold` and `min_samples = 2`").
/// No clustering crate appears anywhere in the reference corpus, so this is
/// a direct, dependency-free implementation of the textbook algorithm.
/// Returns a label per input index: `Some(cluster_id)` or `None` for noise.
pub fn dbscan(embeddings: &[Vec<f32>], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let n = embeddings.len();
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_cluster = 0usize;

    let neighbors = |i: usize| -> Vec<usize> {
        (0..n).filter(|&j| j != i && cosine_distance(&embeddings[i], &embeddings[j]) <= eps).collect()
    };

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let mut seed_set = neighbors(i);
        if seed_set.len() + 1 < min_samples {
            continue; // stays noise (None) unless a later cluster absorbs it
        }

        let cluster_id = next_cluster;
        next_cluster += 1;
        labels[i] = Some(cluster_id);

        let mut idx = 0;
        while idx < seed_set.len() {
            let j = seed_set[idx];
            idx += 1;

            if !visited[j] {
                visited[j] = true;
                let j_neighbors = neighbors(j);
                if j_neighbors.len() + 1 >= min_samples {
                    for n in j_neighbors {
                        if !seed_set.contains(&n) {
                            seed_set.push(n);
                        }
                    }
                }
            }

            if labels[j].is_none() {
                labels[j] = Some(cluster_id);
            }
        }
    }

    labels
}

/// Ranks cluster ids by average pairwise similarity (density), descending
/// (spec.md §4.4 "rank clusters by average pairwise similarity").
pub fn rank_clusters_by_density(embeddings: &[Vec<f32>], labels: &[Option<usize>]) -> Vec<usize> {
    let max_cluster = labels.iter().filter_map(|l| *l).max();
    let Some(max_cluster) = max_cluster else {
        return Vec::new();
    };

    let mut scored: Vec<(usize, f64)> = Vec::new();
    for cluster_id in 0..=max_cluster {
        let members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| if *l == Some(cluster_id) { Some(i) } else { None })
            .collect();
        if members.len() < 2 {
            continue;
        }

        let mut total = 0.0;
        let mut pairs = 0usize;
        for a in 0..members.len() {
            for b in (a + 1)..members.len() {
                total += 1.0 - cosine_distance(&embeddings[members[a]], &embeddings[members[b]]);
                pairs += 1;
            }
        }
        scored.push((cluster_id, total / pairs as f64));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_cluster_together() {
        let embeddings = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 1.0]];
        let labels = dbscan(&embeddings, 0.01, 2);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn singleton_below_min_samples_is_noise() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]];
        let labels = dbscan(&embeddings, 0.01, 2);
        assert!(labels.iter().all(|l| l.is_none()));
    }

    #[test]
    fn denser_cluster_ranks_first() {
        let embeddings = vec![
            vec![1.0, 0.0],
            vec![0.99, 0.01],
            vec![0.98, 0.02],
            vec![0.0, 1.0],
            vec![0.1, 0.9],
        ];
        let labels = dbscan(&embeddings, 0.05, 2);
        let ranked = rank_clusters_by_density(&embeddings, &labels);
        assert!(!ranked.is_empty());
    }
}
