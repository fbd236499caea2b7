//! TF-IDF vectorisation, cosine similarity, and single-linkage clustering.
//!
//! Pure CPU-bound code, kept free of I/O so the engine can run it on a
//! blocking worker thread. Vectors are sparse maps from term index to
//! weight, L2-normalised so cosine similarity is a plain dot product.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://\S+").expect("valid url regex"))
}

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@\w+").expect("valid mention regex"))
}

/// Prepare tweet text for vectorisation: strip URLs and @mentions,
/// collapse whitespace, lowercase.
pub fn preprocess(text: &str) -> String {
    let without_urls = url_pattern().replace_all(text, " ");
    let without_mentions = mention_pattern().replace_all(&without_urls, " ");
    without_mentions
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_string()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Compute L2-normalised TF-IDF vectors for the given documents.
///
/// Documents that tokenize to nothing yield empty vectors. IDF uses the
/// smoothed form `ln((1 + n) / (1 + df)) + 1` so a term present in every
/// document still carries weight.
pub fn tfidf_vectors(documents: &[String]) -> Vec<HashMap<usize, f64>> {
    let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

    // Build the vocabulary and document frequencies.
    let mut vocab: HashMap<String, usize> = HashMap::new();
    let mut doc_freq: Vec<usize> = Vec::new();
    for tokens in &tokenized {
        let mut seen: Vec<usize> = Vec::new();
        for token in tokens {
            let index = *vocab.entry(token.clone()).or_insert_with(|| {
                doc_freq.push(0);
                doc_freq.len() - 1
            });
            if !seen.contains(&index) {
                seen.push(index);
                doc_freq[index] += 1;
            }
        }
    }

    let n = documents.len() as f64;
    let idf: Vec<f64> = doc_freq
        .iter()
        .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
        .collect();

    tokenized
        .into_iter()
        .map(|tokens| {
            let mut counts: HashMap<usize, f64> = HashMap::new();
            for token in &tokens {
                if let Some(&index) = vocab.get(token) {
                    *counts.entry(index).or_insert(0.0) += 1.0;
                }
            }
            for (index, value) in counts.iter_mut() {
                *value *= idf[*index];
            }
            let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                for value in counts.values_mut() {
                    *value /= norm;
                }
            }
            counts
        })
        .collect()
}

/// Cosine similarity between two L2-normalised sparse vectors.
pub fn cosine(a: &HashMap<usize, f64>, b: &HashMap<usize, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(index, value)| large.get(index).map(|other| value * other))
        .sum()
}

/// Pairwise cosine similarity matrix for the given documents.
pub fn similarity_matrix(documents: &[String]) -> Vec<Vec<f64>> {
    let vectors = tfidf_vectors(documents);
    let n = vectors.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let sim = cosine(&vectors[i], &vectors[j]);
            matrix[i][j] = sim;
            matrix[j][i] = sim;
        }
    }
    matrix
}

/// Single-linkage clustering: union any pair at or above the threshold.
///
/// Returns clusters of size >= 2, each as sorted indices into the input.
pub fn single_linkage_clusters(matrix: &[Vec<f64>], threshold: f64) -> Vec<Vec<usize>> {
    let n = matrix.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut Vec<usize>, x: usize) -> usize {
        if parent[x] != x {
            let root = find(parent, parent[x]);
            parent[x] = root;
        }
        parent[x]
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if matrix[i][j] >= threshold {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }

    let mut result: Vec<Vec<usize>> = clusters
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|mut members| {
            members.sort_unstable();
            members
        })
        .collect();
    result.sort();
    result
}

/// Minimum pairwise similarity within a cluster.
///
/// Conservative: transitively linked members may sit below the threshold,
/// and the stored score must not overstate the weakest link.
pub fn min_pairwise_similarity(cluster: &[usize], matrix: &[Vec<f64>]) -> f64 {
    let mut min = 1.0_f64;
    for (pos, &i) in cluster.iter().enumerate() {
        for &j in &cluster[pos + 1..] {
            min = min.min(matrix[i][j]);
        }
    }
    min
}
