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

//! Holds the single live txhashset and handles the loading of new ones
//! from snapshot archives.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::BlockHeader;
use crate::error::Error;
use crate::store::ChainStore;
use crate::txhashset::{snapshot_files, TxHashSet};
use crate::util::{file, zip, RwLock};

const TXHASHSET_SUBDIR: &str = "txhashset";

/// Builds a unique directory name for a txhashset built for the provided
/// header.
pub fn txhashset_name(h: &Hash) -> String {
	format!("{}.{}", h.to_hex(), Utc::now().timestamp_nanos())
}

/// Owner of the live txhashset. Readers get a handle for the duration of
/// their call, swapping the live set requires the previous one to be closed
/// first.
pub struct TxHashSetManager {
	root_dir: PathBuf,
	current: RwLock<Option<Arc<TxHashSet>>>,
}

impl TxHashSetManager {
	/// Manager for the txhashsets held under `<db_root>/txhashset`.
	pub fn new<P: AsRef<Path>>(db_root: P) -> Result<TxHashSetManager, Error> {
		let root_dir = db_root.as_ref().join(TXHASHSET_SUBDIR);
		fs::create_dir_all(&root_dir)?;
		Ok(TxHashSetManager {
			root_dir,
			current: RwLock::new(None),
		})
	}

	/// Directory holding all txhashsets.
	pub fn root_dir(&self) -> &Path {
		&self.root_dir
	}

	/// Handle to the live txhashset.
	pub fn read(&self) -> Result<Arc<TxHashSet>, Error> {
		self.current
			.read()
			.as_ref()
			.cloned()
			.ok_or(Error::TxHashSetUnavailable)
	}

	/// Whether a txhashset is currently live.
	pub fn is_open(&self) -> bool {
		self.current.read().is_some()
	}

	/// Takes the live txhashset out, leaving the manager without one.
	/// Readers still holding a handle keep using it, its files are released
	/// once the last one is gone. Returns the name of the closed set.
	pub fn close(&self) -> Option<String> {
		let closed = self.current.write().take();
		closed.map(|ths| {
			info!("txhashset: closed {}", ths.name());
			ths.name().to_owned()
		})
	}

	/// Installs a new txhashset as the live one. The previous one has to be
	/// closed already.
	pub fn set_txhashset(&self, ths: TxHashSet) -> Result<(), Error> {
		let mut current = self.current.write();
		if let Some(live) = current.as_ref() {
			error!(
				"txhashset: cannot install {}, {} still open",
				ths.name(),
				live.name()
			);
			return Err(Error::TxHashSetStillOpen);
		}
		info!("txhashset: {} is now live", ths.name());
		*current = Some(Arc::new(ths));
		Ok(())
	}

	/// Re-opens the txhashset recorded as live in the db.
	pub fn reopen(&self, store: &ChainStore) -> Result<(), Error> {
		let name = store
			.get_txhashset_name()?
			.ok_or(Error::TxHashSetUnavailable)?;
		let ths = TxHashSet::open(&self.root_dir, &name)?;
		ths.check_files()?;
		self.set_txhashset(ths)
	}

	/// Creates a new, empty txhashset for the provided header. Not live
	/// until installed.
	pub fn create(&self, h: &Hash) -> Result<TxHashSet, Error> {
		let ths = TxHashSet::open(&self.root_dir, &txhashset_name(h))?;
		ths.sync()?;
		Ok(ths)
	}

	/// Extracts a snapshot archive into a fresh directory and opens the
	/// txhashset it holds. Rejects archives with missing or malformed files
	/// and archives whose MMR sizes disagree with the header. Nothing is
	/// validated beyond that.
	pub fn load_from_zip(&self, zip_path: &Path, header: &BlockHeader) -> Result<TxHashSet, Error> {
		let name = txhashset_name(&header.hash());
		let dir = self.root_dir.join(&name);
		let res = self.extract_and_open(zip_path, &dir, &name, header);
		if let Err(ref e) = res {
			warn!("txhashset: rejected archive {:?}: {}", zip_path, e);
			if let Err(e) = file::delete(dir) {
				warn!("txhashset: failed to clean up {}: {}", name, e);
			}
		}
		res
	}

	fn extract_and_open(
		&self,
		zip_path: &Path,
		dir: &Path,
		name: &str,
		header: &BlockHeader,
	) -> Result<TxHashSet, Error> {
		let files = snapshot_files();
		{
			let archive = File::open(zip_path)?;
			let expected = |p: &Path| files.iter().any(|(f, _)| f.as_path() == p);
			let extracted = zip::extract_files(archive, dir, expected)
				.map_err(|e| Error::CorruptArchive(format!("{}", e)))?;
			debug!("txhashset: extracted {} files into {}", extracted, name);
		}
		for (f, required) in &files {
			if *required && !dir.join(f).exists() {
				return Err(Error::CorruptArchive(format!("missing {:?}", f)));
			}
		}

		let ths = TxHashSet::open(&self.root_dir, name)
			.map_err(|e| Error::CorruptArchive(format!("{}", e)))?;
		ths.check_files()?;

		let (output_size, rproof_size, kernel_size) = ths.sizes();
		if output_size != header.output_mmr_size
			|| rproof_size != header.output_mmr_size
			|| kernel_size != header.kernel_mmr_size
		{
			return Err(Error::HeaderMismatch(format!(
				"sizes {}/{}/{} vs header {} at {}: {}/{}",
				output_size,
				rproof_size,
				kernel_size,
				header.hash(),
				header.height,
				header.output_mmr_size,
				header.kernel_mmr_size,
			)));
		}
		Ok(ths)
	}

	/// Deletes the directory of a txhashset that is not live.
	pub fn discard(&self, name: &str) {
		if self.current.read().as_ref().map(|t| t.name()) == Some(name) {
			warn!("txhashset: not discarding live {}", name);
			return;
		}
		match file::delete(self.root_dir.join(name)) {
			Ok(_) => debug!("txhashset: discarded {}", name),
			Err(e) => warn!("txhashset: failed to discard {}: {}", name, e),
		}
	}

	/// Deletes all txhashset directories but the live one, left over by an
	/// interrupted attempt.
	pub fn remove_stale(&self) -> Result<(), Error> {
		let live = self.read()?.name().to_owned();
		for entry in fs::read_dir(&self.root_dir)? {
			let entry = entry?;
			let name = entry.file_name().to_string_lossy().into_owned();
			if name != live && entry.file_type()?.is_dir() {
				info!("txhashset: removing stale {}", name);
				file::delete(entry.path())?;
			}
		}
		Ok(())
	}
}
