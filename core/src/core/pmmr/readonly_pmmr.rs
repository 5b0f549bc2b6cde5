// Copyright 2021 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Readonly view of a PMMR.

use std::marker;

use crate::core::hash::Hash;
use crate::core::pmmr::pmmr::{bintree_postorder_height, ReadablePMMR};
use crate::core::pmmr::{insertion_to_pmmr_index, is_leaf, n_leaves, Backend};
use crate::ser::{PMMRIndexHashable, PMMRable};

/// Readonly view of a PMMR.
pub struct ReadonlyPMMR<'a, T, B>
where
	T: PMMRable,
	B: Backend<T>,
{
	/// Size of this PMMR
	size: u64,
	/// The backend for this readonly PMMR
	backend: &'a B,
	// only needed to parameterise Backend
	_marker: marker::PhantomData<T>,
}

impl<'a, T, B> ReadonlyPMMR<'a, T, B>
where
	T: PMMRable,
	B: 'a + Backend<T>,
{
	/// Build a new readonly PMMR.
	pub fn new(backend: &'a B) -> ReadonlyPMMR<'_, T, B> {
		ReadonlyPMMR {
			backend,
			size: 0,
			_marker: marker::PhantomData,
		}
	}

	/// Build a new readonly PMMR pre-initialized to
	/// size with the provided backend.
	pub fn at(backend: &'a B, size: u64) -> ReadonlyPMMR<'_, T, B> {
		ReadonlyPMMR {
			backend,
			size,
			_marker: marker::PhantomData,
		}
	}

	/// Walks all parent nodes in the MMR and revalidates their hashes
	/// against the hashes of their children.
	pub fn validate(&self) -> Result<(), String> {
		for n in 0..self.size {
			let height = bintree_postorder_height(n);
			if height > 0 {
				if let Some(hash) = self.get_hash(n) {
					let left_pos = n - (1 << height);
					let right_pos = n - 1;
					// using get_from_file here for the children (they may have been "removed")
					let left = self.get_from_file(left_pos);
					let right = self.get_from_file(right_pos);
					match (left, right) {
						(Some(left_child_hs), Some(right_child_hs)) => {
							// hash the two child nodes together with parent_pos and compare
							if (left_child_hs, right_child_hs).hash_with_index(n) != hash {
								return Err(format!(
									"Invalid MMR, hash of parent at {} does \
									 not match children.",
									n + 1
								));
							}
						}
						_ => return Err(format!("Invalid MMR, missing children of {}", n + 1)),
					}
				}
			}
		}
		Ok(())
	}

	/// Rehashes the data of every leaf that still has some and compares it
	/// with the leaf hash in the hash file. Unspent leaves must have data.
	/// Returns the number of leaves checked.
	pub fn validate_leaves(&self) -> Result<u64, String>
	where
		T::E: PMMRIndexHashable,
	{
		let mut checked = 0;
		for idx in 0..n_leaves(self.size) {
			let pos0 = insertion_to_pmmr_index(idx);
			match self.get_data_from_file(pos0) {
				Some(elmt) => {
					if self.get_from_file(pos0) != Some(elmt.hash_with_index(pos0)) {
						return Err(format!(
							"Invalid MMR, data of leaf at {} does not match its hash.",
							pos0 + 1
						));
					}
					checked += 1;
				}
				None if self.get_hash(pos0).is_some() => {
					return Err(format!("Invalid MMR, missing data of leaf at {}", pos0 + 1));
				}
				None => {}
			}
		}
		Ok(checked)
	}

	/// Returns the leaves with insertion index (0-based) from `from_idx`
	/// onwards, up to `max_count` of them, together with their positions.
	/// Leaves are returned whether removed from the leaf set or not, leaves
	/// with no data left (compacted) are skipped.
	/// The second part of the result is the number of leaves examined, so
	/// `from_idx + examined` is where the next page starts.
	pub fn leaves_from_insertion_index(
		&self,
		from_idx: u64,
		max_count: u64,
	) -> (Vec<(u64, T::E)>, u64) {
		let n = n_leaves(self.size);
		let mut res = vec![];
		let mut idx = from_idx;
		while (res.len() as u64) < max_count && idx < n {
			let pos0 = insertion_to_pmmr_index(idx);
			if let Some(t) = self.get_data_from_file(pos0) {
				res.push((pos0, t));
			}
			idx += 1;
		}
		(res, idx.saturating_sub(from_idx))
	}
}

impl<'a, T, B> ReadablePMMR for ReadonlyPMMR<'a, T, B>
where
	T: PMMRable,
	B: 'a + Backend<T>,
{
	type Item = T::E;

	fn get_hash(&self, pos0: u64) -> Option<Hash> {
		if pos0 >= self.size {
			None
		} else if is_leaf(pos0) {
			// If we are a leaf then get hash from the backend.
			self.backend.get_hash(pos0)
		} else {
			// If we are not a leaf get hash ignoring the remove log.
			self.backend.get_from_file(pos0)
		}
	}

	fn get_data(&self, pos0: u64) -> Option<Self::Item> {
		if pos0 >= self.size {
			// If we are beyond the rhs of the MMR return None.
			None
		} else if is_leaf(pos0) {
			// If we are a leaf then get data from the backend.
			self.backend.get_data(pos0)
		} else {
			// If we are not a leaf then return None as only leaves have data.
			None
		}
	}

	fn get_from_file(&self, pos0: u64) -> Option<Hash> {
		if pos0 >= self.size {
			None
		} else {
			self.backend.get_from_file(pos0)
		}
	}

	fn get_peak_from_file(&self, pos0: u64) -> Option<Hash> {
		if pos0 >= self.size {
			None
		} else {
			self.backend.get_peak_from_file(pos0)
		}
	}

	fn get_data_from_file(&self, pos0: u64) -> Option<Self::Item> {
		if pos0 >= self.size {
			None
		} else {
			self.backend.get_data_from_file(pos0)
		}
	}

	fn unpruned_size(&self) -> u64 {
		self.size
	}

	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
		let size = self.size;
		Box::new(self.backend.leaf_pos_iter().take_while(move |x| *x < size))
	}

	fn leaf_idx_iter(&self, from_idx: u64) -> Box<dyn Iterator<Item = u64> + '_> {
		let n = n_leaves(self.size);
		Box::new(self.backend.leaf_idx_iter(from_idx).take_while(move |x| *x < n))
	}

	fn n_unpruned_leaves(&self) -> u64 {
		self.leaf_pos_iter().count() as u64
	}
}
