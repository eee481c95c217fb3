use docsearch_core::traits::VectorIndex;
use docsearch_vector::FlatIndex;
use proptest::prelude::*;

fn rows(dim: usize) -> impl Strategy<Value = Vec<Vec<f32>>> {
	prop::collection::vec(prop::collection::vec(-10.0f32..10.0, dim), 0..20)
}

fn index_and_query() -> impl Strategy<Value = (FlatIndex, Vec<f32>)> {
	(1usize..8).prop_flat_map(|dim| {
		(rows(dim), prop::collection::vec(-10.0f32..10.0, dim)).prop_map(move |(rows, q)| {
			let mut idx = FlatIndex::new(dim);
			idx.add(&rows).unwrap();
			(idx, q)
		})
	})
}

proptest! {
	#[test]
	fn search_is_bounded_and_descending((idx, q) in index_and_query(), k in 0usize..25) {
		let hits = idx.search_vec(&q, k).unwrap();
		prop_assert_eq!(hits.len(), k.min(idx.len()));
		for w in hits.windows(2) {
			prop_assert!(w[0].score >= w[1].score);
		}
		for h in &hits {
			prop_assert!(h.index < idx.len());
		}
	}

	#[test]
	fn blob_survives_storage((idx, _q) in index_and_query()) {
		let bytes = idx.to_bytes();
		prop_assert_eq!(FlatIndex::from_bytes(&bytes).unwrap(), idx.clone());
		if idx.len() > 0 {
			prop_assert!(FlatIndex::from_bytes(&bytes[..bytes.len() - 1]).is_err());
		}
	}
}
