//! Sparse TF-IDF vectors with smoothed idf and L2-normalised rows.
//!
//! `idf(t) = ln((1 + n) / (1 + df(t))) + 1`, term weights are raw counts times
//! idf, and every document row and query vector has unit length, so a dot
//! product is a cosine similarity in `[0, 1]`.

use std::collections::HashMap;

use docsearch_core::types::{Method, SearchHit};

use crate::tantivy_utils::{build_analyzer, tokenize};

type SparseVec = Vec<(usize, f32)>;

pub struct TfIdfModel {
	vocabulary: HashMap<String, usize>,
	idf: Vec<f32>,
	rows: Vec<SparseVec>,
}

impl TfIdfModel {
	pub fn fit<'a, I>(texts: I) -> Self
	where
		I: IntoIterator<Item = &'a str>,
	{
		let mut analyzer = build_analyzer();
		let mut vocabulary: HashMap<String, usize> = HashMap::new();
		let mut doc_freq: Vec<u32> = Vec::new();
		let mut counts: Vec<HashMap<usize, u32>> = Vec::new();

		for text in texts {
			let mut tf: HashMap<usize, u32> = HashMap::new();
			for token in tokenize(&mut analyzer, text) {
				let next = vocabulary.len();
				let id = *vocabulary.entry(token).or_insert(next);
				if id == doc_freq.len() {
					doc_freq.push(0);
				}
				*tf.entry(id).or_insert(0) += 1;
			}
			for id in tf.keys() {
				doc_freq[*id] += 1;
			}
			counts.push(tf);
		}

		let n = counts.len() as f32;
		let idf: Vec<f32> = doc_freq.iter().map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0).collect();
		let rows = counts.into_iter().map(|tf| weigh(tf, &idf)).collect();
		Self { vocabulary, idf, rows }
	}

	pub fn num_docs(&self) -> usize {
		self.rows.len()
	}

	pub fn vocabulary_len(&self) -> usize {
		self.vocabulary.len()
	}

	/// Query vector; terms outside the fitted vocabulary are ignored.
	pub fn transform(&self, text: &str) -> SparseVec {
		let mut analyzer = build_analyzer();
		let mut tf: HashMap<usize, u32> = HashMap::new();
		for token in tokenize(&mut analyzer, text) {
			if let Some(&id) = self.vocabulary.get(&token) {
				*tf.entry(id).or_insert(0) += 1;
			}
		}
		weigh(tf, &self.idf)
	}

	/// Similarity of `query` against every document, in corpus order.
	pub fn scores(&self, query: &str) -> Vec<f32> {
		let q = self.transform(query);
		self.rows.iter().map(|row| dot(row, &q)).collect()
	}

	/// The `k` best documents, highest score first; ties keep corpus order.
	///
	/// Documents sharing no term with the query still fill the list with a
	/// score of zero.
	pub fn top_k(&self, query: &str, k: usize) -> Vec<SearchHit> {
		let scores = self.scores(query);
		let mut order: Vec<usize> = (0..scores.len()).collect();
		order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
		order.truncate(k);
		order.into_iter().map(|index| SearchHit { index, score: scores[index], method: Method::Keyword }).collect()
	}
}

fn weigh(tf: HashMap<usize, u32>, idf: &[f32]) -> SparseVec {
	let mut v: SparseVec = tf.into_iter().map(|(id, c)| (id, c as f32 * idf[id])).collect();
	v.sort_by_key(|(id, _)| *id);
	let norm = v.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
	if norm > 0.0 {
		for (_, w) in &mut v {
			*w /= norm;
		}
	}
	v
}

fn dot(a: &[(usize, f32)], b: &[(usize, f32)]) -> f32 {
	let (mut i, mut j, mut sum) = (0, 0, 0.0);
	while i < a.len() && j < b.len() {
		match a[i].0.cmp(&b[j].0) {
			std::cmp::Ordering::Less => i += 1,
			std::cmp::Ordering::Greater => j += 1,
			std::cmp::Ordering::Equal => {
				sum += a[i].1 * b[j].1;
				i += 1;
				j += 1;
			}
		}
	}
	sum
}
