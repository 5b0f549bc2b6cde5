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

//! Compact (roaring) bitmap representing the set of leaf positions
//! that exist and are not currently removed (spent) in the MMR.

use croaring::Bitmap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::core::core::pmmr;
use crate::{read_bitmap, save_via_temp_file};

/// Compact (roaring) bitmap representing the set of positions of
/// leaves that are currently unspent in the MMR.
pub struct LeafSet {
	path: PathBuf,
	bitmap: Bitmap,
	bitmap_bak: Bitmap,
}

impl LeafSet {
	/// Open the remove log file.
	/// The content of the file will be read in memory for fast checking.
	pub fn open<P: AsRef<Path>>(path: P) -> io::Result<LeafSet> {
		let file_path = path.as_ref();
		let bitmap = if file_path.exists() {
			read_bitmap(&file_path)?
		} else {
			Bitmap::create()
		};

		if !bitmap.is_empty() {
			debug!(
				"bitmap {} pos ({} bytes)",
				bitmap.cardinality(),
				bitmap.get_serialized_size_in_bytes(),
			);
		}

		Ok(LeafSet {
			path: file_path.to_path_buf(),
			bitmap_bak: bitmap.clone(),
			bitmap,
		})
	}

	/// Calculate the set of unspent positions that would have been present
	/// once the MMR is rewound to `cutoff_size`.
	pub fn rewound(&self, cutoff_size: u64, rewind_rm_pos: &Bitmap) -> Bitmap {
		let mut bitmap = self.bitmap.clone();
		let to_remove: Vec<u32> = bitmap
			.iter()
			.filter(|x| u64::from(*x) >= cutoff_size)
			.collect();
		for pos in to_remove {
			bitmap.remove(pos);
		}
		for pos in rewind_rm_pos.iter() {
			if u64::from(pos) < cutoff_size && pmmr::is_leaf(u64::from(pos)) {
				bitmap.add(pos);
			}
		}
		bitmap
	}

	/// Rewinds the leaf set back to a previous state.
	/// Removes all pos after the cutoff.
	/// Adds back all pos in rewind_rm_pos.
	pub fn rewind(&mut self, cutoff_size: u64, rewind_rm_pos: &Bitmap) {
		self.bitmap = self.rewound(cutoff_size, rewind_rm_pos);
	}

	/// Append a new position to the leaf_set.
	pub fn add(&mut self, pos0: u64) {
		self.bitmap.add(pos0 as u32);
	}

	/// Remove the provided position from the leaf_set.
	pub fn remove(&mut self, pos0: u64) {
		self.bitmap.remove(pos0 as u32);
	}

	/// Flush the leaf_set to file.
	pub fn flush(&mut self) -> io::Result<()> {
		// First run the optimization step on the bitmap.
		self.bitmap.run_optimize();

		// Write the updated bitmap file to disk.
		let bitmap = &self.bitmap;
		save_via_temp_file(&self.path, |w| w.write_all(&bitmap.serialize()))?;

		// Make sure our backup in memory is up to date.
		self.bitmap_bak = self.bitmap.clone();

		Ok(())
	}

	/// Discard any pending changes.
	pub fn discard(&mut self) {
		self.bitmap = self.bitmap_bak.clone();
	}

	/// Whether the leaf_set includes the provided position.
	pub fn includes(&self, pos0: u64) -> bool {
		self.bitmap.contains(pos0 as u32)
	}

	/// Number of positions stored in the leaf_set.
	pub fn len(&self) -> usize {
		self.bitmap.cardinality() as usize
	}

	/// Is the leaf_set empty.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Largest position in the leaf_set, if any.
	pub fn maximum(&self) -> Option<u64> {
		self.bitmap.maximum().map(u64::from)
	}

	/// Iterator over positions in the leaf_set (all leaf positions).
	pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
		self.bitmap.iter().map(u64::from)
	}

	/// A copy of the underlying bitmap.
	pub fn bitmap(&self) -> Bitmap {
		self.bitmap.clone()
	}
}
