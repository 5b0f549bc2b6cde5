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

//! Implementation of the persistent Backend for the prunable MMR tree.

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use croaring::Bitmap;

use crate::core::core::hash::Hash;
use crate::core::core::pmmr::{self, Backend};
use crate::core::ser::PMMRable;
use crate::leaf_set::LeafSet;
use crate::types::{recover_compacted, DataFile};
use crate::{read_bitmap, save_via_temp_file};

/// File holding every hash of the MMR, in insertion order.
pub const PMMR_HASH_FILE: &str = "pmmr_hash.bin";
/// File holding the leaf data, minus compacted leaves.
pub const PMMR_DATA_FILE: &str = "pmmr_data.bin";
/// Bitmap of unspent leaf positions.
pub const PMMR_LEAF_FILE: &str = "pmmr_leaf.bin";
/// Bitmap of leaf positions whose data was compacted away.
pub const PMMR_PRUN_FILE: &str = "pmmr_prun.bin";

/// PMMR persistent backend implementation. Relies on multiple facilities to
/// handle writing, reading and pruning.
///
/// * A main storage file appends Hash instances as they come.
/// This AppendOnlyFile is also backed by a mmap for reads.
/// * An in-memory backend buffers the latest batch of writes to ensure the
/// PMMR can always read recent values even if they haven't been flushed to
/// disk yet.
/// * A leaf_set tracks unspent leaves (non-prunable MMRs have none).
/// * A bitmap of compacted leaves tracks which leaf data has been dropped
/// from the data file, so reads can shift indices accordingly.
pub struct PMMRBackend<T: PMMRable> {
	data_dir: PathBuf,
	prunable: bool,
	hash_file: DataFile<Hash>,
	data_file: DataFile<T::E>,
	leaf_set: LeafSet,
	compacted: Bitmap,
}

impl<T: PMMRable> Backend<T> for PMMRBackend<T> {
	/// Append the provided data and hashes to the backend storage.
	/// Add the new leaf pos to our leaf_set if this is a prunable MMR.
	fn append(&mut self, data: &T, hashes: &[Hash]) -> Result<(), String> {
		let pos0 = self.hash_file.size_unsync();
		self.data_file
			.append(&data.as_elmt())
			.map_err(|e| format!("Failed to append data to file. {}", e))?;
		self.hash_file
			.extend_from_slice(hashes)
			.map_err(|e| format!("Failed to append hash to file. {}", e))?;
		if self.prunable {
			self.leaf_set.add(pos0);
		}
		Ok(())
	}

	fn rewind(&mut self, size: u64, rewind_rm_pos: &Bitmap) -> Result<(), String> {
		if let Some(max) = self.compacted.maximum() {
			if u64::from(max) >= size {
				return Err(format!(
					"cannot rewind to {}, leaf data up to {} was compacted",
					size, max
				));
			}
		}
		if rewind_rm_pos.iter().any(|p| self.compacted.contains(p)) {
			return Err("cannot restore compacted leaves".to_string());
		}

		if self.prunable {
			self.leaf_set.rewind(size, rewind_rm_pos);
		}
		self.hash_file.rewind(size);

		let leaf_count = pmmr::n_leaves(size);
		let data_count = leaf_count.saturating_sub(self.compacted.cardinality());
		self.data_file.rewind(data_count);
		Ok(())
	}

	fn get_hash(&self, pos0: u64) -> Option<Hash> {
		if self.prunable && pmmr::is_leaf(pos0) && !self.leaf_set.includes(pos0) {
			return None;
		}
		self.get_from_file(pos0)
	}

	fn get_data(&self, pos0: u64) -> Option<T::E> {
		if !pmmr::is_leaf(pos0) {
			return None;
		}
		if self.prunable && !self.leaf_set.includes(pos0) {
			return None;
		}
		self.get_data_from_file(pos0)
	}

	fn get_from_file(&self, pos0: u64) -> Option<Hash> {
		self.hash_file.read(pos0)
	}

	fn get_peak_from_file(&self, pos0: u64) -> Option<Hash> {
		self.hash_file.read(pos0)
	}

	fn get_data_from_file(&self, pos0: u64) -> Option<T::E> {
		let idx = self.data_index(pos0)?;
		self.data_file.read(idx)
	}

	/// Remove leaf from leaf set.
	fn remove(&mut self, pos0: u64) -> Result<(), String> {
		if !self.prunable {
			return Err(format!("cannot remove {} from a non-prunable mmr", pos0));
		}
		self.leaf_set.remove(pos0);
		Ok(())
	}

	fn n_unpruned_leaves(&self) -> u64 {
		if self.prunable {
			self.leaf_set.len() as u64
		} else {
			pmmr::n_leaves(self.unpruned_size())
		}
	}

	fn leaf_pos_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
		if self.prunable {
			Box::new(self.leaf_set.iter())
		} else {
			Box::new((0..self.unpruned_size()).filter(|x| pmmr::is_leaf(*x)))
		}
	}

	fn leaf_idx_iter(&self, from_idx: u64) -> Box<dyn Iterator<Item = u64> + '_> {
		let from_pos = pmmr::insertion_to_pmmr_index(from_idx);
		Box::new(
			self.leaf_pos_iter()
				.skip_while(move |x| *x < from_pos)
				.map(|x| pmmr::n_leaves(x + 1) - 1),
		)
	}

	fn is_leaf(&self, pos0: u64) -> bool {
		if self.prunable {
			self.leaf_set.includes(pos0)
		} else {
			pmmr::is_leaf(pos0) && pos0 < self.unpruned_size()
		}
	}
}

impl<T: PMMRable> PMMRBackend<T> {
	/// Instantiates a new PMMR backend.
	/// If optional size is provided then treat as "fixed" size otherwise "variable" size backend.
	/// Use the provided dir to store its files.
	pub fn new<P: AsRef<Path>>(data_dir: P, prunable: bool) -> io::Result<PMMRBackend<T>> {
		let elmt_size = T::elmt_size().ok_or_else(|| {
			io::Error::new(
				io::ErrorKind::InvalidInput,
				"mmr elements must have a fixed size",
			)
		})?;
		let data_dir = data_dir.as_ref();

		let hash_file = DataFile::open(&data_dir.join(PMMR_HASH_FILE), Hash::LEN as u16)?;

		let prun_path = data_dir.join(PMMR_PRUN_FILE);
		let compacted = if prun_path.exists() {
			read_bitmap(&prun_path)?
		} else {
			Bitmap::create()
		};

		// the bitmap is saved before the compacted data file gets swapped in
		let data_path = data_dir.join(PMMR_DATA_FILE);
		let expected = pmmr::n_leaves(hash_file.size()).saturating_sub(compacted.cardinality());
		if recover_compacted(&data_path, elmt_size, expected)? {
			info!("{:?}: completed an interrupted compaction", data_dir);
		}
		let data_file = DataFile::open(&data_path, elmt_size)?;

		let leaf_set = LeafSet::open(&data_dir.join(PMMR_LEAF_FILE))?;

		Ok(PMMRBackend {
			data_dir: data_dir.to_path_buf(),
			prunable,
			hash_file,
			data_file,
			leaf_set,
			compacted,
		})
	}

	/// Index of the leaf data in the data file, shifted by the number of
	/// compacted leaves before it. None if not a leaf or compacted.
	fn data_index(&self, pos0: u64) -> Option<u64> {
		if !pmmr::is_leaf(pos0) || self.compacted.contains(pos0 as u32) {
			return None;
		}
		let leaf_idx = pmmr::n_leaves(pos0 + 1) - 1;
		let shift = self.compacted.rank(pos0 as u32);
		Some(leaf_idx - shift)
	}

	/// Checks the files on disk describe a well formed MMR: whole records
	/// only, a valid MMR size, one data record per leaf not compacted away,
	/// and leaf_set/compacted positions pointing at leaves within the MMR.
	pub fn check_consistency(&self) -> Result<(), String> {
		self.hash_file.check_len().map_err(|e| e.to_string())?;
		self.data_file.check_len().map_err(|e| e.to_string())?;

		let size = self.unpruned_size();
		if !pmmr::is_valid_size(size) {
			return Err(format!("{} hashes is not a valid mmr size", size));
		}
		let n_leaves = pmmr::n_leaves(size);
		let compacted = self.compacted.cardinality();
		if self.data_size() + compacted != n_leaves {
			return Err(format!(
				"{} data records and {} compacted, expected {} leaves",
				self.data_size(),
				compacted,
				n_leaves
			));
		}
		if self.prunable {
			if let Some(pos0) = self.leaf_set.iter().find(|p| *p >= size || !pmmr::is_leaf(*p)) {
				return Err(format!("leaf_set holds invalid position {}", pos0));
			}
		} else if !self.leaf_set.is_empty() {
			return Err("leaf_set on a non-prunable mmr".to_string());
		}
		for p in self.compacted.iter() {
			let pos0 = u64::from(p);
			if pos0 >= size || !pmmr::is_leaf(pos0) || self.leaf_set.includes(pos0) {
				return Err(format!("compacted invalid position {}", pos0));
			}
		}
		Ok(())
	}

	/// Number of hashes in the PMMR stored by this backend. Only produces the
	/// fully sync'd size.
	pub fn unpruned_size(&self) -> u64 {
		self.hash_size()
	}

	/// Number of elements in the underlying stored data. Extremely dependent on
	/// pruning and compaction.
	pub fn data_size(&self) -> u64 {
		self.data_file.size()
	}

	/// Size of the underlying hashed data. Extremely dependent on pruning
	/// and compaction.
	pub fn hash_size(&self) -> u64 {
		self.hash_file.size()
	}

	/// Number of leaves whose data was compacted away.
	pub fn compacted_count(&self) -> u64 {
		self.compacted.cardinality()
	}

	/// Syncs all files to disk. A call to sync is required to ensure all the
	/// data has been successfully written to disk.
	pub fn sync(&mut self) -> io::Result<()> {
		self.hash_file
			.flush()
			.and(self.data_file.flush())
			.and(self.sync_leaf_set())
			.map_err(|e| {
				io::Error::new(
					io::ErrorKind::Interrupted,
					format!("Could not sync pmmr to disk: {:?}", e),
				)
			})
	}

	fn sync_leaf_set(&mut self) -> io::Result<()> {
		if self.prunable {
			self.leaf_set.flush()
		} else {
			Ok(())
		}
	}

	/// Discard the current, non synced state of the backend.
	pub fn discard(&mut self) {
		self.hash_file.discard();
		self.leaf_set.discard();
		self.data_file.discard();
	}

	/// Directory holding the backend files.
	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	/// Drops the data of spent leaves below `cutoff_size` from the data file.
	/// Hashes are all kept so roots and proofs are unaffected. Must be called
	/// on a synced backend. Returns whether anything was compacted.
	pub fn compact(&mut self, cutoff_size: u64) -> io::Result<bool> {
		if !self.prunable {
			return Ok(false);
		}
		if self.data_file.size_unsync() != self.data_file.size()
			|| self.hash_file.size_unsync() != self.hash_file.size()
		{
			return Err(io::Error::new(
				io::ErrorKind::Other,
				"cannot compact with unsynced changes",
			));
		}

		let cutoff = cutoff_size.min(self.unpruned_size());
		let mut to_compact = vec![];
		let mut drop_idx = HashSet::new();
		for pos0 in (0..cutoff).filter(|x| pmmr::is_leaf(*x)) {
			if self.leaf_set.includes(pos0) {
				continue;
			}
			if let Some(idx) = self.data_index(pos0) {
				to_compact.push(pos0 as u32);
				drop_idx.insert(idx);
			}
		}
		if to_compact.is_empty() {
			return Ok(false);
		}

		// New data first, then the bitmap, then the swap. The data file can
		// always be rebuilt from its copy once the bitmap is saved.
		self.data_file.write_compacted(&drop_idx)?;
		let mut compacted = self.compacted.clone();
		for pos0 in &to_compact {
			compacted.add(*pos0);
		}
		compacted.run_optimize();
		save_via_temp_file(self.data_dir.join(PMMR_PRUN_FILE), |w| {
			w.write_all(&compacted.serialize())
		})?;
		self.compacted = compacted;
		self.data_file.swap_compacted()?;

		debug!(
			"compact: {:?} dropped {} leaves below {}",
			self.data_dir,
			to_compact.len(),
			cutoff
		);
		Ok(true)
	}
}
