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

//! Height indexed views of the chain. The candidate view follows headers as
//! they arrive, the confirmed view only advances once full block data (or a
//! full txhashset) has been validated.

use crate::core::core::hash::Hash;
use crate::error::Error;
use crate::store::Batch;
use crate::util::RwLock;
use std::sync::Arc;

/// Which of the two chain views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainType {
	/// Extended optimistically as headers are received.
	Candidate,
	/// Extended once blocks or a txhashset are fully validated.
	Confirmed,
}

impl ChainType {
	/// Key prefix for the entries of this view in the db.
	pub fn prefix(self) -> u8 {
		match self {
			ChainType::Candidate => b'c',
			ChainType::Confirmed => b'C',
		}
	}
}

/// A (height, hash) entry of a chain view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndex {
	/// Height of the block
	pub height: u64,
	/// Hash of the block
	pub hash: Hash,
}

/// An ordered, height indexed sequence of block hashes, from genesis up.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainIndex {
	chain_type: ChainType,
	hashes: Vec<Hash>,
}

impl ChainIndex {
	/// New empty chain of the provided type.
	pub fn new(chain_type: ChainType) -> ChainIndex {
		ChainIndex {
			chain_type,
			hashes: vec![],
		}
	}

	/// Chain built from an ordered list of hashes, genesis first.
	pub fn from_hashes(chain_type: ChainType, hashes: Vec<Hash>) -> ChainIndex {
		ChainIndex { chain_type, hashes }
	}

	/// Type of this chain.
	pub fn chain_type(&self) -> ChainType {
		self.chain_type
	}

	/// Number of entries, the tip is at len - 1.
	pub fn len(&self) -> u64 {
		self.hashes.len() as u64
	}

	/// Whether the chain has no entries (not even genesis).
	pub fn is_empty(&self) -> bool {
		self.hashes.is_empty()
	}

	/// Entry at the tip of the chain.
	pub fn tip(&self) -> Option<BlockIndex> {
		self.hashes.last().map(|hash| BlockIndex {
			height: self.len() - 1,
			hash: *hash,
		})
	}

	/// Hash at the provided height.
	pub fn get_hash(&self, height: u64) -> Option<Hash> {
		self.hashes.get(height as usize).cloned()
	}

	/// Entry at the provided height.
	pub fn get(&self, height: u64) -> Option<BlockIndex> {
		self.get_hash(height).map(|hash| BlockIndex { height, hash })
	}

	/// Whether the chain holds this exact entry.
	pub fn contains(&self, index: &BlockIndex) -> bool {
		self.get_hash(index.height) == Some(index.hash)
	}

	/// Truncates all entries above the provided height.
	/// A no-op when the height is at or beyond the tip.
	pub fn rewind(&mut self, height: u64) {
		if height + 1 >= self.len() {
			return;
		}
		self.hashes.truncate(height as usize + 1);
	}

	/// Appends an entry, which has to sit right above the current tip.
	pub fn add_block(&mut self, hash: Hash, height: u64) -> Result<(), Error> {
		if height != self.len() {
			return Err(Error::NonSequentialAppend {
				height,
				len: self.len(),
			});
		}
		self.hashes.push(hash);
		Ok(())
	}

	/// Iterator over all entries, from genesis up.
	pub fn iter(&self) -> impl Iterator<Item = BlockIndex> + '_ {
		self.hashes
			.iter()
			.enumerate()
			.map(|(height, hash)| BlockIndex {
				height: height as u64,
				hash: *hash,
			})
	}

	/// Writes the entries that differ from `prev` (the persisted state of
	/// the same view) to the batch, deleting the ones that went away.
	pub fn save_diff(&self, prev: &ChainIndex, batch: &Batch<'_>) -> Result<(), Error> {
		let prefix = self.chain_type.prefix();
		let shared = self
			.hashes
			.iter()
			.zip(prev.hashes.iter())
			.take_while(|(a, b)| a == b)
			.count() as u64;
		for height in shared..prev.len() {
			batch.delete_chain_entry(prefix, height)?;
		}
		for height in shared..self.len() {
			if let Some(hash) = self.get_hash(height) {
				batch.save_chain_entry(prefix, height, &hash)?;
			}
		}
		Ok(())
	}
}

/// Finds the highest height at which both chains agree on the hash.
/// Walks back from the tip of the shorter chain.
pub fn find_common_index(a: &ChainIndex, b: &ChainIndex) -> Result<BlockIndex, Error> {
	let len = a.len().min(b.len());
	if len == 0 {
		return Err(Error::NoCommonAncestor);
	}
	let mut height = len - 1;
	loop {
		match (a.get(height), b.get_hash(height)) {
			(Some(index), Some(hash)) if index.hash == hash => return Ok(index),
			_ => {}
		}
		if height == 0 {
			return Err(Error::NoCommonAncestor);
		}
		height -= 1;
	}
}

/// Finds the lowest height of the chain whose MMR size (as given by
/// `size_at` for the block hash at that height) covers `pos0`. Sizes never
/// decrease with height, so this is a binary search.
pub fn find_height_for_pos<F>(chain: &ChainIndex, pos0: u64, size_at: F) -> Result<u64, Error>
where
	F: Fn(&Hash) -> Result<u64, Error>,
{
	let tip = chain
		.tip()
		.ok_or_else(|| Error::Other("empty chain".to_owned()))?;
	if size_at(&tip.hash)? <= pos0 {
		return Err(Error::Other(format!(
			"mmr index {} beyond chain tip at {}",
			pos0 + 1,
			tip.height
		)));
	}
	let (mut low, mut high) = (0, tip.height);
	while low < high {
		let mid = low + (high - low) / 2;
		let hash = chain
			.get_hash(mid)
			.ok_or_else(|| Error::Other(format!("no chain entry at {}", mid)))?;
		if size_at(&hash)? > pos0 {
			high = mid;
		} else {
			low = mid + 1;
		}
	}
	Ok(low)
}

/// The candidate and confirmed views, shared between readers and the single
/// writer. Readers clone the current `Arc`, writers swap in a new value once
/// the corresponding db batch has been committed.
pub struct ChainViews {
	candidate: RwLock<Arc<ChainIndex>>,
	confirmed: RwLock<Arc<ChainIndex>>,
}

impl ChainViews {
	/// Views initialized from their persisted state.
	pub fn new(candidate: ChainIndex, confirmed: ChainIndex) -> ChainViews {
		ChainViews {
			candidate: RwLock::new(Arc::new(candidate)),
			confirmed: RwLock::new(Arc::new(confirmed)),
		}
	}

	/// Current state of the requested view.
	pub fn get(&self, chain_type: ChainType) -> Arc<ChainIndex> {
		match chain_type {
			ChainType::Candidate => self.candidate.read().clone(),
			ChainType::Confirmed => self.confirmed.read().clone(),
		}
	}

	/// Current candidate view.
	pub fn candidate(&self) -> Arc<ChainIndex> {
		self.get(ChainType::Candidate)
	}

	/// Current confirmed view.
	pub fn confirmed(&self) -> Arc<ChainIndex> {
		self.get(ChainType::Confirmed)
	}

	/// Replaces a view. Only call once the batch persisting it committed.
	pub fn replace(&self, chain: ChainIndex) {
		let chain = Arc::new(chain);
		match chain.chain_type() {
			ChainType::Candidate => *self.candidate.write() = chain,
			ChainType::Confirmed => *self.confirmed.write() = chain,
		}
	}
}

/// Fast-forwards the confirmed chain to the candidate chain up to (and
/// including) `target`. The confirmed chain is first rewound to the common
/// ancestor of both chains, then the candidate entries above it are appended.
pub fn reconcile(
	candidate: &ChainIndex,
	confirmed: &ChainIndex,
	target: &BlockIndex,
) -> Result<ChainIndex, Error> {
	if !candidate.contains(target) {
		return Err(Error::CandidateMoved(target.height));
	}
	let common = find_common_index(candidate, confirmed)?;
	let mut res = confirmed.clone();
	res.rewind(common.height);
	if common.height >= target.height {
		// target is already on the confirmed chain, it becomes the tip
		res.rewind(target.height);
		return Ok(res);
	}
	for height in (common.height + 1)..=target.height {
		let hash = candidate
			.get_hash(height)
			.ok_or_else(|| Error::CandidateMoved(height))?;
		res.add_block(hash, height)?;
	}
	Ok(res)
}
