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

use std::marker;

use croaring::Bitmap;

use crate::core::hash::{Hash, ZERO_HASH};
use crate::core::merkle_proof::MerkleProof;
use crate::core::pmmr::{Backend, ReadonlyPMMR};
use crate::ser::{PMMRIndexHashable, PMMRable};

/// Read access to an MMR. Positions are 0-based postorder indices, a MMR of
/// size n holds nodes 0 to n-1.
pub trait ReadablePMMR {
	/// Leaf type
	type Item;

	/// Hash at the provided position. None for spent leaves.
	fn get_hash(&self, pos0: u64) -> Option<Hash>;

	/// Data of the unspent leaf at the provided position.
	fn get_data(&self, pos0: u64) -> Option<Self::Item>;

	/// Hash at the provided position, spent or not.
	fn get_from_file(&self, pos0: u64) -> Option<Hash>;

	/// Hash of the peak at the provided position.
	fn get_peak_from_file(&self, pos0: u64) -> Option<Hash>;

	/// Data of the leaf at the provided position, spent or not. None once
	/// compacted.
	fn get_data_from_file(&self, pos0: u64) -> Option<Self::Item>;

	/// Number of nodes, pruning ignored.
	fn unpruned_size(&self) -> u64;

	/// Positions of the unspent leaves.
	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_>;

	/// Insertion indices of the unspent leaves, from `from_idx` on.
	fn leaf_idx_iter(&self, from_idx: u64) -> Box<dyn Iterator<Item = u64> + '_>;

	/// Number of unspent leaves.
	fn n_unpruned_leaves(&self) -> u64;

	/// Total number of leaves ever appended, spent or not.
	fn leaf_count(&self) -> u64 {
		n_leaves(self.unpruned_size())
	}

	/// Is the MMR empty?
	fn is_empty(&self) -> bool {
		self.unpruned_size() == 0
	}

	/// Peak hashes, highest (leftmost) first.
	fn peaks(&self) -> Vec<Hash> {
		peaks(self.unpruned_size())
			.into_iter()
			.filter_map(|pos0| self.get_peak_from_file(pos0))
			.collect()
	}

	/// Root of the MMR: the peaks bagged right to left. The empty MMR has
	/// the zero hash as root.
	fn root(&self) -> Result<Hash, String> {
		if self.is_empty() {
			return Ok(ZERO_HASH);
		}
		bag(self.peaks(), self.unpruned_size()).ok_or_else(|| "no root, invalid tree".to_owned())
	}

	/// Merkle proof of the unspent leaf at the provided position. The path
	/// holds the siblings up to the leaf's peak, the bagged peaks on its
	/// right, then the peaks on its left from nearest to farthest.
	fn merkle_proof(&self, pos0: u64) -> Result<MerkleProof, String> {
		if !is_leaf(pos0) {
			return Err(format!("not a leaf at pos {}", pos0));
		}
		self.get_hash(pos0)
			.ok_or_else(|| format!("no element at pos {}", pos0))?;

		let size = self.unpruned_size();
		let branch = family_branch(pos0, size);
		let peak_pos0 = branch.last().map(|(parent, _)| *parent).unwrap_or(pos0);
		let mut path: Vec<Hash> = branch
			.iter()
			.filter_map(|(_, sibling)| self.get_from_file(*sibling))
			.collect();

		let all_peaks = peaks(size);
		let right = all_peaks
			.iter()
			.filter(|p| **p > peak_pos0)
			.filter_map(|p| self.get_peak_from_file(*p))
			.collect();
		if let Some(rhs) = bag(right, size) {
			path.push(rhs);
		}
		path.extend(
			all_peaks
				.iter()
				.rev()
				.filter(|p| **p < peak_pos0)
				.filter_map(|p| self.get_peak_from_file(*p)),
		);

		Ok(MerkleProof {
			mmr_size: size,
			path,
		})
	}
}

// Folds peak hashes from the right, each pair hashed with the MMR size.
fn bag(peaks: Vec<Hash>, size: u64) -> Option<Hash> {
	peaks.into_iter().rev().fold(None, |acc, peak| match acc {
		None => Some(peak),
		Some(right) => Some((peak, right).hash_with_index(size)),
	})
}

/// Prunable Merkle Mountain Range, writing through a `Backend`. Only the
/// size is kept here, the backend holds hashes, leaf data and the set of
/// unspent leaves.
pub struct PMMR<'a, T, B>
where
	T: PMMRable,
	B: Backend<T>,
{
	/// Number of nodes in the PMMR
	pub size: u64,
	backend: &'a mut B,
	_marker: marker::PhantomData<T>,
}

impl<'a, T, B> PMMR<'a, T, B>
where
	T: PMMRable,
	B: 'a + Backend<T>,
{
	/// Empty PMMR over the provided backend.
	pub fn new(backend: &'a mut B) -> PMMR<'_, T, B> {
		PMMR::at(backend, 0)
	}

	/// PMMR of the provided size over a backend already holding that many
	/// nodes.
	pub fn at(backend: &'a mut B, size: u64) -> PMMR<'_, T, B> {
		PMMR {
			backend,
			size,
			_marker: marker::PhantomData,
		}
	}

	/// Readonly view at the current size.
	pub fn readonly_pmmr(&self) -> ReadonlyPMMR<'_, T, B> {
		ReadonlyPMMR::at(&self.backend, self.size)
	}

	/// Appends a leaf along with every parent it completes. Returns the
	/// position of the new leaf.
	pub fn push(&mut self, leaf: &T) -> Result<u64, String> {
		let leaf_pos0 = self.size;
		if !is_leaf(leaf_pos0) {
			return Err(format!("bad mmr size {}", leaf_pos0));
		}

		let mut current = leaf.hash_with_index(leaf_pos0);
		let mut hashes = vec![current];
		let mut pos0 = leaf_pos0;
		loop {
			let (parent, sibling) = family(pos0);
			if parent != pos0 + 1 {
				break;
			}
			let left = self
				.backend
				.get_peak_from_file(sibling)
				.ok_or("missing left sibling in tree, should not have been pruned")?;
			current = (left, current).hash_with_index(parent);
			hashes.push(current);
			pos0 = parent;
		}

		self.backend.append(leaf, &hashes)?;
		self.size = pos0 + 1;
		Ok(leaf_pos0)
	}

	/// Rewinds to `position`, rounded up to the next leaf position, dropping
	/// everything pushed after it. Leaves in `rewind_rm_pos` are unspent
	/// again.
	pub fn rewind(&mut self, position: u64, rewind_rm_pos: &Bitmap) -> Result<(), String> {
		let size = round_up_to_leaf_pos(position);
		if size > self.size {
			return Err(format!(
				"invalid argument: cannot rewind to {}, mmr size is {}",
				size, self.size
			));
		}
		self.backend.rewind(size, rewind_rm_pos)?;
		self.size = size;
		Ok(())
	}

	/// Rewinds so the PMMR holds exactly `n_leaves` leaves. Rewinding
	/// forward is an invalid argument.
	pub fn rewind_to_leaf_count(&mut self, n_leaves: u64) -> Result<(), String> {
		let current = self.leaf_count();
		if n_leaves > current {
			return Err(format!(
				"invalid argument: cannot rewind to {} leaves, mmr has {}",
				n_leaves, current
			));
		}
		self.rewind(insertion_to_pmmr_index(n_leaves), &Bitmap::create())
	}

	/// Spends the leaf at the provided position. False if it was spent
	/// already, an error if the position is not a leaf.
	pub fn prune(&mut self, pos0: u64) -> Result<bool, String> {
		if !is_leaf(pos0) {
			return Err(format!("Node at {} is not a leaf, can't prune.", pos0));
		}
		if self.backend.get_hash(pos0).is_none() {
			return Ok(false);
		}
		self.backend.remove(pos0)?;
		Ok(true)
	}

	/// Checks every parent hash against its children.
	pub fn validate(&self) -> Result<(), String> {
		self.readonly_pmmr().validate()
	}
}

impl<'a, T, B> ReadablePMMR for PMMR<'a, T, B>
where
	T: PMMRable,
	B: 'a + Backend<T>,
{
	type Item = T::E;

	fn get_hash(&self, pos0: u64) -> Option<Hash> {
		self.readonly_pmmr().get_hash(pos0)
	}

	fn get_data(&self, pos0: u64) -> Option<Self::Item> {
		self.readonly_pmmr().get_data(pos0)
	}

	fn get_from_file(&self, pos0: u64) -> Option<Hash> {
		self.readonly_pmmr().get_from_file(pos0)
	}

	fn get_peak_from_file(&self, pos0: u64) -> Option<Hash> {
		self.readonly_pmmr().get_peak_from_file(pos0)
	}

	fn get_data_from_file(&self, pos0: u64) -> Option<Self::Item> {
		self.readonly_pmmr().get_data_from_file(pos0)
	}

	fn unpruned_size(&self) -> u64 {
		self.size
	}

	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
		let size = self.size;
		Box::new(self.backend.leaf_pos_iter().take_while(move |x| *x < size))
	}

	fn leaf_idx_iter(&self, from_idx: u64) -> Box<dyn Iterator<Item = u64> + '_> {
		let n = self.leaf_count();
		Box::new(self.backend.leaf_idx_iter(from_idx).take_while(move |x| *x < n))
	}

	fn n_unpruned_leaves(&self) -> u64 {
		self.backend.n_unpruned_leaves()
	}
}

/// Peak map and height of the next node for a MMR of the provided size.
/// Bit i of the peak map is set when the MMR has a peak of height i. The
/// size 4 MMR below has peaks of height 1 and 0 and its next node (4) is a
/// leaf, so this returns (0b11, 0):
///
/// ```text
///    2
///   / \
///  0   1   3
/// ```
pub fn peak_map_height(size: u64) -> (u64, u64) {
	if size == 0 {
		return (0, 0);
	}
	let mut rest = size;
	let mut peak_map = 0;
	// size of the largest perfect tree fitting in `size`, then halving
	let mut tree_size = u64::MAX >> size.leading_zeros();
	while tree_size > 0 {
		peak_map <<= 1;
		if rest >= tree_size {
			rest -= tree_size;
			peak_map |= 1;
		}
		tree_size >>= 1;
	}
	(peak_map, rest)
}

/// Like `peak_map_height` but with the node count of each peak's tree, the
/// highest peak first.
pub fn peak_sizes_height(size: u64) -> (Vec<u64>, u64) {
	let (peak_map, height) = peak_map_height(size);
	let sizes = (0..64u32)
		.rev()
		.filter(|h| peak_map & (1 << h) != 0)
		.map(|h| (2u64 << h).wrapping_sub(1))
		.collect();
	(sizes, height)
}

/// Positions of the peaks of a MMR of the provided size, leftmost first.
/// Empty when the size is not a valid MMR size.
pub fn peaks(size: u64) -> Vec<u64> {
	let (sizes, height) = peak_sizes_height(size);
	if height != 0 {
		return vec![];
	}
	let mut end = 0;
	sizes
		.into_iter()
		.map(|s| {
			end += s;
			end - 1
		})
		.collect()
}

/// The number of leaves in a MMR of the provided size.
pub fn n_leaves(size: u64) -> u64 {
	let (peak_map, height) = peak_map_height(size);
	if height == 0 {
		peak_map
	} else {
		peak_map + 1
	}
}

/// Whether a MMR can have that many nodes: every peak complete.
pub fn is_valid_size(size: u64) -> bool {
	peak_map_height(size).1 == 0
}

/// First leaf position at or after `pos0`.
pub fn round_up_to_leaf_pos(pos0: u64) -> u64 {
	insertion_to_pmmr_index(n_leaves(pos0))
}

/// Position of the leaf with the provided insertion index.
pub fn insertion_to_pmmr_index(nleaf0: u64) -> u64 {
	2 * nleaf0 - nleaf0.count_ones() as u64
}

/// Height of the node at the provided position, leaves being at 0.
pub fn bintree_postorder_height(pos0: u64) -> u64 {
	peak_map_height(pos0).1
}

/// Is this position a leaf in the MMR?
pub fn is_leaf(pos0: u64) -> bool {
	bintree_postorder_height(pos0) == 0
}

/// Whether the node is the left child of its parent.
pub fn is_left_sibling(pos0: u64) -> bool {
	let (peak_map, height) = peak_map_height(pos0);
	peak_map & (1 << height) == 0
}

/// Positions of the parent and the sibling of a node.
pub fn family(pos0: u64) -> (u64, u64) {
	let height = bintree_postorder_height(pos0);
	let subtree = 2 << height;
	if is_left_sibling(pos0) {
		(pos0 + subtree, pos0 + subtree - 1)
	} else {
		(pos0 + 1, pos0 + 1 - subtree)
	}
}

/// (parent, sibling) positions from the node up to its peak in a MMR of
/// the provided size.
pub fn family_branch(pos0: u64, size: u64) -> Vec<(u64, u64)> {
	let mut branch = vec![];
	let mut current = pos0;
	loop {
		let (parent, sibling) = family(current);
		if parent >= size {
			break;
		}
		branch.push((parent, sibling));
		current = parent;
	}
	branch
}
