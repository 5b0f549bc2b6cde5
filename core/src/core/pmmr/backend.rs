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

use croaring::Bitmap;

use crate::core::hash::Hash;
use crate::ser::PMMRable;

/// Storage backend for the MMR, just needs to be indexed by order of insertion.
/// The PMMR itself does not need the Backend to be accurate on the existence
/// of an element (i.e. remove could be a no-op) but layers above can
/// depend on an accurate Backend to check existence.
/// All positions are 0-based.
pub trait Backend<T: PMMRable> {
	/// Append the provided leaf and the hashes it produced (the leaf hash
	/// followed by any parent hashes) to the backend storage.
	fn append(&mut self, data: &T, hashes: &[Hash]) -> Result<(), String>;

	/// Rewind the backend state to a previous size, as if all append
	/// operations after that had been canceled. Leaf positions in
	/// `rewind_rm_pos` were removed since the rewind point and are restored.
	fn rewind(&mut self, size: u64, rewind_rm_pos: &Bitmap) -> Result<(), String>;

	/// Get a Hash by insertion position. Returns None for removed leaves.
	fn get_hash(&self, pos0: u64) -> Option<Hash>;

	/// Get underlying data by insertion position. Returns None for removed leaves.
	fn get_data(&self, pos0: u64) -> Option<T::E>;

	/// Get a Hash by original insertion position
	/// (ignoring the remove log).
	fn get_from_file(&self, pos0: u64) -> Option<Hash>;

	/// Get hash for peak pos.
	/// Optimized for reading peak hashes rather than arbitrary pos hashes.
	/// Peaks can be assumed to not be compacted.
	fn get_peak_from_file(&self, pos0: u64) -> Option<Hash>;

	/// Get a Data Element by original insertion position
	/// (ignoring the remove log).
	fn get_data_from_file(&self, pos0: u64) -> Option<T::E>;

	/// Remove leaf from leaf set
	fn remove(&mut self, pos0: u64) -> Result<(), String>;

	/// Number of leaves still in the leaf set.
	fn n_unpruned_leaves(&self) -> u64;

	/// Iterator over current (unpruned, unremoved) leaf positions.
	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_>;

	/// Iterator over current (unpruned, unremoved) leaf insertion index.
	/// Note: This differs from underlying MMR pos - [0, 1, 2, 3, 4] vs. [0, 1, 3, 4, 7]
	fn leaf_idx_iter(&self, from_idx: u64) -> Box<dyn Iterator<Item = u64> + '_>;

	/// Is the leaf at this pos still in the leaf set.
	fn is_leaf(&self, pos0: u64) -> bool;
}
