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

//! Utility structs to handle the 3 MMRs (output, rangeproof,
//! kernel) conveniently and transactionally.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use croaring::Bitmap;

use crate::chain_view::{find_height_for_pos, ChainIndex};
use crate::core::core::committed::{self, Committed};
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::merkle_proof::MerkleProof;
use crate::core::core::pmmr::{self, ReadablePMMR, ReadonlyPMMR, PMMR};
use crate::core::core::{
	Block, BlockHeader, BlockSums, Input, Output, OutputFeatures, OutputIdentifier, TxKernel,
};
use crate::core::global;
use crate::core::ser::PMMRable;
use crate::error::Error;
use crate::store::Batch;
use crate::types::{CommitPos, OutputEntry, TxHashSetRoots, TxHashsetWriteStatus};
use crate::util::secp::pedersen::{Commitment, RangeProof};
use crate::util::{zip, RwLock};
use mwsync_store as store;
use mwsync_store::pmmr::{
	PMMRBackend, PMMR_DATA_FILE, PMMR_HASH_FILE, PMMR_LEAF_FILE, PMMR_PRUN_FILE,
};

const OUTPUT_SUBDIR: &str = "output";
const RANGE_PROOF_SUBDIR: &str = "rangeproof";
const KERNEL_SUBDIR: &str = "kernel";

/// Relative paths of the files making up a txhashset snapshot, with whether
/// each one is required.
pub fn snapshot_files() -> Vec<(PathBuf, bool)> {
	let mut files = vec![];
	for subdir in &[OUTPUT_SUBDIR, RANGE_PROOF_SUBDIR] {
		let dir = Path::new(subdir);
		files.push((dir.join(PMMR_HASH_FILE), true));
		files.push((dir.join(PMMR_DATA_FILE), true));
		files.push((dir.join(PMMR_LEAF_FILE), true));
		files.push((dir.join(PMMR_PRUN_FILE), false));
	}
	let dir = Path::new(KERNEL_SUBDIR);
	files.push((dir.join(PMMR_HASH_FILE), true));
	files.push((dir.join(PMMR_DATA_FILE), true));
	files
}

struct PMMRHandle<T: PMMRable> {
	backend: PMMRBackend<T>,
	size: u64,
}

impl<T: PMMRable> PMMRHandle<T> {
	fn new<P: AsRef<Path>>(path: P, prunable: bool) -> Result<PMMRHandle<T>, Error> {
		fs::create_dir_all(&path)?;
		let backend = PMMRBackend::new(path, prunable)?;
		let size = backend.unpruned_size();
		Ok(PMMRHandle { backend, size })
	}

	fn readonly_pmmr(&self) -> ReadonlyPMMR<'_, T, PMMRBackend<T>> {
		ReadonlyPMMR::at(&self.backend, self.size)
	}
}

struct Trees {
	output_pmmr_h: PMMRHandle<OutputIdentifier>,
	rproof_pmmr_h: PMMRHandle<RangeProof>,
	kernel_pmmr_h: PMMRHandle<TxKernel>,
}

impl Trees {
	fn sizes(&self) -> (u64, u64, u64) {
		(
			self.output_pmmr_h.size,
			self.rproof_pmmr_h.size,
			self.kernel_pmmr_h.size,
		)
	}

	fn roots(&self) -> Result<TxHashSetRoots, Error> {
		Ok(TxHashSetRoots {
			output_root: root_of("output", &self.output_pmmr_h.readonly_pmmr())?,
			rproof_root: root_of("rangeproof", &self.rproof_pmmr_h.readonly_pmmr())?,
			kernel_root: root_of("kernel", &self.kernel_pmmr_h.readonly_pmmr())?,
		})
	}

	fn discard(&mut self) {
		self.output_pmmr_h.backend.discard();
		self.rproof_pmmr_h.backend.discard();
		self.kernel_pmmr_h.backend.discard();
	}

	fn sync(&mut self) -> Result<(), Error> {
		self.output_pmmr_h.backend.sync()?;
		self.rproof_pmmr_h.backend.sync()?;
		self.kernel_pmmr_h.backend.sync()?;
		Ok(())
	}

	fn validate_mmrs(&self) -> Result<(), Error> {
		let invalid = |mmr: &str| {
			let mmr = mmr.to_owned();
			move |msg| Error::InvalidMmr { mmr, msg }
		};
		self.output_pmmr_h
			.readonly_pmmr()
			.validate()
			.map_err(invalid("output"))?;
		self.rproof_pmmr_h
			.readonly_pmmr()
			.validate()
			.map_err(invalid("rangeproof"))?;
		self.kernel_pmmr_h
			.readonly_pmmr()
			.validate()
			.map_err(invalid("kernel"))?;
		Ok(())
	}

	// Leaf data has to hash to the leaf hashes the roots commit to.
	fn validate_leaf_data(&self) -> Result<(), Error> {
		let invalid = |mmr: &str| {
			let mmr = mmr.to_owned();
			move |msg| Error::InvalidMmr { mmr, msg }
		};
		let outputs = self
			.output_pmmr_h
			.readonly_pmmr()
			.validate_leaves()
			.map_err(invalid("output"))?;
		let rproofs = self
			.rproof_pmmr_h
			.readonly_pmmr()
			.validate_leaves()
			.map_err(invalid("rangeproof"))?;
		let kernels = self
			.kernel_pmmr_h
			.readonly_pmmr()
			.validate_leaves()
			.map_err(invalid("kernel"))?;
		debug!(
			"txhashset: leaf data matches for {} outputs, {} rangeproofs, {} kernels",
			outputs, rproofs, kernels,
		);
		Ok(())
	}

	fn validate_kernel_sums(
		&self,
		header: &BlockHeader,
		genesis_had_reward: bool,
	) -> Result<(Commitment, Commitment), Error> {
		let overage = header.total_overage(genesis_had_reward);
		Committed::verify_kernel_sums(self, overage, header.total_kernel_offset())
			.map_err(|e| match e {
				committed::Error::KernelSumMismatch => Error::SumMismatch(header.height),
				e => Error::Committed(e),
			})
	}

	fn verify_rangeproofs(&self, status: &dyn TxHashsetWriteStatus) -> Result<u64, Error> {
		let now = Instant::now();
		let output_pmmr = self.output_pmmr_h.readonly_pmmr();
		let rproof_pmmr = self.rproof_pmmr_h.readonly_pmmr();

		let mut commits: Vec<Commitment> = vec![];
		let mut proofs: Vec<RangeProof> = vec![];
		let mut positions: Vec<u64> = vec![];

		let mut proof_count = 0;
		let total_rproofs = self.output_pmmr_h.backend.data_size();
		for idx in 0..pmmr::n_leaves(self.output_pmmr_h.size) {
			let pos0 = pmmr::insertion_to_pmmr_index(idx);
			// compacted outputs have no data left to verify
			let out = match output_pmmr.get_data_from_file(pos0) {
				Some(out) => out,
				None => continue,
			};
			let proof = rproof_pmmr.get_data_from_file(pos0).ok_or_else(|| {
				Error::InvalidRangeProof(format!("missing range proof at mmr index {}", pos0 + 1))
			})?;
			commits.push(out.commit);
			proofs.push(proof);
			positions.push(pos0);

			if proofs.len() >= global::RANGEPROOF_BATCH_SIZE {
				verify_rangeproof_batch(&commits, &proofs, &positions)?;
				proof_count += proofs.len() as u64;
				commits.clear();
				proofs.clear();
				positions.clear();
				debug!(
					"txhashset: verify_rangeproofs: verified {} rangeproofs",
					proof_count,
				);
				status.on_validation(0, 0, proof_count, total_rproofs);
			}
		}

		if !proofs.is_empty() {
			verify_rangeproof_batch(&commits, &proofs, &positions)?;
			proof_count += proofs.len() as u64;
			status.on_validation(0, 0, proof_count, total_rproofs);
		}

		debug!(
			"txhashset: verified {} rangeproofs, pmmr size {}, took {}s",
			proof_count,
			self.rproof_pmmr_h.size,
			now.elapsed().as_secs(),
		);
		Ok(proof_count)
	}

	fn verify_kernel_signatures(&self, status: &dyn TxHashsetWriteStatus) -> Result<u64, Error> {
		let now = Instant::now();
		let kernel_pmmr = self.kernel_pmmr_h.readonly_pmmr();

		let mut kern_count = 0;
		let total_kernels = pmmr::n_leaves(self.kernel_pmmr_h.size);
		for idx in 0..total_kernels {
			let pos0 = pmmr::insertion_to_pmmr_index(idx);
			let kernel = kernel_pmmr.get_data(pos0).ok_or_else(|| Error::InvalidMmr {
				mmr: "kernel".to_owned(),
				msg: format!("missing kernel at mmr index {}", pos0 + 1),
			})?;
			kernel
				.verify()
				.map_err(|_| Error::InvalidKernelSignature(pos0 + 1))?;
			kern_count += 1;
			if kern_count % global::RANGEPROOF_BATCH_SIZE as u64 == 0 {
				status.on_validation(kern_count, total_kernels, 0, 0);
			}
		}
		status.on_validation(kern_count, total_kernels, 0, 0);

		debug!(
			"txhashset: verified {} kernel signatures, pmmr size {}, took {}s",
			kern_count,
			self.kernel_pmmr_h.size,
			now.elapsed().as_secs(),
		);
		Ok(kern_count)
	}
}

/// The whole unspent set sums up against all the kernels.
impl Committed for Trees {
	fn inputs_committed(&self) -> Vec<Commitment> {
		vec![]
	}

	fn outputs_committed(&self) -> Vec<Commitment> {
		let output_pmmr = self.output_pmmr_h.readonly_pmmr();
		output_pmmr
			.leaf_pos_iter()
			.filter_map(|pos0| output_pmmr.get_data(pos0))
			.map(|out| out.commit)
			.collect()
	}

	fn kernels_committed(&self) -> Vec<Commitment> {
		let kernel_pmmr = self.kernel_pmmr_h.readonly_pmmr();
		(0..pmmr::n_leaves(self.kernel_pmmr_h.size))
			.filter_map(|idx| kernel_pmmr.get_data(pmmr::insertion_to_pmmr_index(idx)))
			.map(|kernel| kernel.excess())
			.collect()
	}
}

fn root_of<R: ReadablePMMR>(mmr: &str, pmmr: &R) -> Result<Hash, Error> {
	pmmr.root().map_err(|msg| Error::InvalidMmr {
		mmr: mmr.to_owned(),
		msg,
	})
}

/// Verifies a batch of range proofs, falling back to one by one
/// verification to report the offending position.
fn verify_rangeproof_batch(
	commits: &[Commitment],
	proofs: &[RangeProof],
	positions: &[u64],
) -> Result<(), Error> {
	if Output::batch_verify_proofs(commits, proofs).is_ok() {
		return Ok(());
	}
	for ((commit, proof), pos0) in commits.iter().zip(proofs).zip(positions) {
		let out = Output::new(OutputFeatures::Plain, *commit, *proof);
		if out.verify_proof().is_err() {
			return Err(Error::InvalidRangeProof(format!(
				"proof at mmr index {} does not verify",
				pos0 + 1
			)));
		}
	}
	Err(Error::InvalidRangeProof("batch failed to verify".to_owned()))
}

/// Checks the roots of the 3 MMRs against the ones committed to in the
/// header.
fn check_roots(roots: &TxHashSetRoots, header: &BlockHeader) -> Result<(), Error> {
	let mismatch = |mmr: &str| Error::RootMismatch {
		mmr: mmr.to_owned(),
		height: header.height,
	};
	if roots.output_root != header.output_root {
		return Err(mismatch("output"));
	}
	if roots.rproof_root != header.range_proof_root {
		return Err(mismatch("rangeproof"));
	}
	if roots.kernel_root != header.kernel_root {
		return Err(mismatch("kernel"));
	}
	Ok(())
}

/// Checks the sizes of the 3 MMRs against the ones recorded in the header.
fn check_sizes(sizes: (u64, u64, u64), header: &BlockHeader) -> Result<(), Error> {
	let (output_size, rproof_size, kernel_size) = sizes;
	let mismatch = |mmr: &str, expected: u64, actual: u64| Error::SizeMismatch {
		mmr: mmr.to_owned(),
		height: header.height,
		expected,
		actual,
	};
	if output_size != header.output_mmr_size {
		return Err(mismatch("output", header.output_mmr_size, output_size));
	}
	if rproof_size != header.output_mmr_size {
		return Err(mismatch("rangeproof", header.output_mmr_size, rproof_size));
	}
	if kernel_size != header.kernel_mmr_size {
		return Err(mismatch("kernel", header.kernel_mmr_size, kernel_size));
	}
	Ok(())
}

/// An easy to manipulate structure holding the 3 MMRs necessary to
/// validate blocks and capturing the output set, associated rangeproofs and
/// the kernels. Lives in its own directory, named after the header it was
/// created for.
pub struct TxHashSet {
	name: String,
	path: PathBuf,
	trees: RwLock<Trees>,
}

impl TxHashSet {
	/// Open (or create) the txhashset held in `<root_dir>/<name>`.
	pub fn open<P: AsRef<Path>>(root_dir: P, name: &str) -> Result<TxHashSet, Error> {
		let path = root_dir.as_ref().join(name);
		let trees = Trees {
			output_pmmr_h: PMMRHandle::new(path.join(OUTPUT_SUBDIR), true)?,
			rproof_pmmr_h: PMMRHandle::new(path.join(RANGE_PROOF_SUBDIR), true)?,
			kernel_pmmr_h: PMMRHandle::new(path.join(KERNEL_SUBDIR), false)?,
		};
		Ok(TxHashSet {
			name: name.to_owned(),
			path,
			trees: RwLock::new(trees),
		})
	}

	/// Name of the directory holding this txhashset.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Full path of the directory holding this txhashset.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Checks the MMR files are well formed.
	pub fn check_files(&self) -> Result<(), Error> {
		let trees = self.trees.read();
		let corrupt = |mmr: &str| {
			let mmr = mmr.to_owned();
			move |e| Error::CorruptArchive(format!("{}: {}", mmr, e))
		};
		trees
			.output_pmmr_h
			.backend
			.check_consistency()
			.map_err(corrupt(OUTPUT_SUBDIR))?;
		trees
			.rproof_pmmr_h
			.backend
			.check_consistency()
			.map_err(corrupt(RANGE_PROOF_SUBDIR))?;
		trees
			.kernel_pmmr_h
			.backend
			.check_consistency()
			.map_err(corrupt(KERNEL_SUBDIR))?;
		Ok(())
	}

	/// Sizes of the output, rangeproof and kernel MMRs.
	pub fn sizes(&self) -> (u64, u64, u64) {
		self.trees.read().sizes()
	}

	/// Roots of the output, rangeproof and kernel MMRs.
	pub fn roots(&self) -> Result<TxHashSetRoots, Error> {
		self.trees.read().roots()
	}

	/// Validates the full txhashset against the provided header, which has
	/// to be part of `headers`. Checks the MMR structures, leaf data against
	/// leaf hashes, sizes and roots, the kernel sums and (unless `fast`)
	/// every range proof and kernel signature. Returns the resulting block
	/// sums.
	pub fn validate(
		&self,
		header: &BlockHeader,
		headers: &ChainIndex,
		genesis: &BlockHeader,
		fast: bool,
		status: &dyn TxHashsetWriteStatus,
	) -> Result<BlockSums, Error> {
		let now = Instant::now();

		// The genesis block itself carries nothing to validate.
		if header.height == 0 {
			return Ok(BlockSums::default());
		}

		let trees = self.trees.read();
		trees.validate_mmrs()?;
		trees.validate_leaf_data()?;
		check_sizes(trees.sizes(), header)?;
		check_roots(&trees.roots()?, header)?;

		if headers.get_hash(header.height) != Some(header.hash()) {
			return Err(Error::CandidateMoved(header.height));
		}

		let genesis_had_reward = genesis.output_mmr_size > 0;
		let (utxo_sum, kernel_sum) = trees.validate_kernel_sums(header, genesis_had_reward)?;

		if !fast {
			trees.verify_rangeproofs(status)?;
			trees.verify_kernel_signatures(status)?;
		}

		debug!(
			"txhashset: validated {} at {} (fast: {}), took {}s",
			self.name,
			header.height,
			fast,
			now.elapsed().as_secs(),
		);
		Ok(BlockSums {
			utxo_sum,
			kernel_sum,
		})
	}

	/// Outputs by insertion index (0-based), starting at `from_idx`, up to
	/// `max_count` of them. Spent outputs are included (and flagged),
	/// compacted ones are skipped. Also returns the number of leaves
	/// examined and the total number of leaves.
	pub fn outputs_by_leaf_index(
		&self,
		from_idx: u64,
		max_count: u64,
	) -> (Vec<OutputEntry>, u64, u64) {
		let trees = self.trees.read();
		let output_pmmr = trees.output_pmmr_h.readonly_pmmr();
		let rproof_pmmr = trees.rproof_pmmr_h.readonly_pmmr();
		let (leaves, examined) = output_pmmr.leaves_from_insertion_index(from_idx, max_count);
		let entries = leaves
			.into_iter()
			.map(|(pos0, identifier)| OutputEntry {
				pos0,
				identifier,
				proof: rproof_pmmr.get_data_from_file(pos0),
				spent: output_pmmr.get_data(pos0).is_none(),
			})
			.collect();
		(entries, examined, output_pmmr.leaf_count())
	}

	/// Looks for a kernel with the provided excess, walking the kernel MMR
	/// back from `max_size` down to `min_pos0`. Returns the kernel and its
	/// position.
	pub fn find_kernel(
		&self,
		excess: &Commitment,
		min_pos0: u64,
		max_size: u64,
	) -> Option<(TxKernel, u64)> {
		let trees = self.trees.read();
		let kernel_pmmr = trees.kernel_pmmr_h.readonly_pmmr();
		let max_size = max_size.min(trees.kernel_pmmr_h.size);
		let mut pos0 = max_size;
		while pos0 > min_pos0 {
			pos0 -= 1;
			if let Some(kernel) = kernel_pmmr.get_data(pos0) {
				if kernel.excess == *excess {
					return Some((kernel, pos0));
				}
			}
		}
		None
	}

	/// The unspent output at the provided position, if it matches the
	/// provided commitment.
	pub fn get_unspent(&self, commit: &Commitment, pos0: u64) -> Option<OutputIdentifier> {
		let trees = self.trees.read();
		trees
			.output_pmmr_h
			.readonly_pmmr()
			.get_data(pos0)
			.filter(|out| out.commit == *commit)
	}

	/// Merkle proof of the output at the provided position.
	pub fn merkle_proof(&self, pos0: u64) -> Result<MerkleProof, Error> {
		let trees = self.trees.read();
		trees
			.output_pmmr_h
			.readonly_pmmr()
			.merkle_proof(pos0)
			.map_err(|e| Error::TxHashSetErr(format!("merkle proof at {}: {}", pos0 + 1, e)))
	}

	/// Rebuilds the commitment to (position, height) index from the unspent
	/// outputs. Heights are found by searching the headers of `headers` by
	/// output MMR size.
	pub fn save_output_positions(
		&self,
		batch: &Batch<'_>,
		headers: &ChainIndex,
	) -> Result<u64, Error> {
		let now = Instant::now();
		let trees = self.trees.read();
		let output_pmmr = trees.output_pmmr_h.readonly_pmmr();

		batch.clear_output_pos_height()?;

		let mut count = 0;
		for pos0 in output_pmmr.leaf_pos_iter() {
			if pos0 >= trees.output_pmmr_h.size {
				continue;
			}
			let out = match output_pmmr.get_data(pos0) {
				Some(out) => out,
				None => continue,
			};
			let height = find_height_for_pos(headers, pos0, |h| {
				Ok(batch.get_block_header(h)?.output_mmr_size)
			})?;
			batch.save_output_pos_height(&out.commit, CommitPos { pos0, height })?;
			count += 1;
		}
		debug!(
			"txhashset: saved {} output positions, took {}s",
			count,
			now.elapsed().as_secs()
		);
		Ok(count)
	}

	/// Drops the data of outputs (and their range proofs) spent at or
	/// before the horizon header. Hashes are kept, so roots and proofs are
	/// unchanged.
	pub fn compact(&self, horizon_header: &BlockHeader) -> Result<bool, Error> {
		let mut trees = self.trees.write();
		let cutoff = horizon_header.output_mmr_size;
		let outputs = trees.output_pmmr_h.backend.compact(cutoff)?;
		let rproofs = trees.rproof_pmmr_h.backend.compact(cutoff)?;
		debug!(
			"txhashset: compacted {} below {} (outputs: {}, rproofs: {})",
			self.name, cutoff, outputs, rproofs
		);
		Ok(outputs || rproofs)
	}

	/// Writes a snapshot of this txhashset to a zip file.
	pub fn zip_write(&self, dest: &Path) -> Result<(), Error> {
		// hold the lock so no extension modifies the files underneath us
		let _trees = self.trees.read();
		let files = snapshot_files()
			.into_iter()
			.map(|(f, _)| f)
			.filter(|f| self.path.join(f).exists())
			.collect();
		let zip_file = File::create(dest)?;
		zip::create_zip(&zip_file, &self.path, files)?;
		debug!("txhashset: zip written to {:?}", dest);
		Ok(())
	}

	/// Flushes all MMRs to disk.
	pub fn sync(&self) -> Result<(), Error> {
		self.trees.write().sync()
	}

	/// Starts a new unit of work to extend the txhashset with additional
	/// data. Any changes are applied as a whole (MMR files synced and the
	/// child batch committed) or discarded if the inner closure errors or
	/// requests a rollback.
	pub fn extending<F, T>(&self, batch: &mut Batch<'_>, inner: F) -> Result<T, Error>
	where
		F: FnOnce(&mut Extension<'_>) -> Result<T, Error>,
	{
		let sizes: (u64, u64, u64);
		let res: Result<T, Error>;
		let rollback: bool;

		let mut guard = self.trees.write();
		let trees: &mut Trees = &mut *guard;

		// create a child transaction so if the state is rolled back by itself, all
		// index saving can be undone
		let child_batch = batch.child()?;
		{
			trace!("Starting new txhashset extension.");
			let mut extension = Extension::new(trees, &child_batch);
			res = inner(&mut extension);

			rollback = extension.rollback;
			sizes = extension.sizes();
		}

		match res {
			Err(e) => {
				debug!("Error returned, discarding txhashset extension: {}", e);
				trees.discard();
				Err(e)
			}
			Ok(r) => {
				if rollback {
					trace!("Rollbacking txhashset extension. sizes {:?}", sizes);
					trees.discard();
				} else {
					trace!("Committing txhashset extension. sizes {:?}", sizes);
					child_batch.commit()?;
					trees.sync()?;
					trees.output_pmmr_h.size = sizes.0;
					trees.rproof_pmmr_h.size = sizes.1;
					trees.kernel_pmmr_h.size = sizes.2;
				}

				trace!("TxHashSet extension done.");
				Ok(r)
			}
		}
	}
}

// Files and maps are released with the trees, after the last reader.
impl Drop for TxHashSet {
	fn drop(&mut self) {
		debug!("txhashset: released {}", self.name);
	}
}

/// Allows the application of new blocks on top of the txhashset in a
/// reversible manner within a unit of work provided by `extending`.
pub struct Extension<'a> {
	output_pmmr: PMMR<'a, OutputIdentifier, PMMRBackend<OutputIdentifier>>,
	rproof_pmmr: PMMR<'a, RangeProof, PMMRBackend<RangeProof>>,
	kernel_pmmr: PMMR<'a, TxKernel, PMMRBackend<TxKernel>>,

	/// Rollback flag.
	rollback: bool,

	/// Batch in which the extension occurs, public so it can be used within
	/// an `extending` closure. Just be careful using it that way as it will
	/// get rolled back with the extension.
	pub batch: &'a Batch<'a>,
}

impl<'a> Extension<'a> {
	fn new(trees: &'a mut Trees, batch: &'a Batch<'_>) -> Extension<'a> {
		Extension {
			output_pmmr: PMMR::at(&mut trees.output_pmmr_h.backend, trees.output_pmmr_h.size),
			rproof_pmmr: PMMR::at(&mut trees.rproof_pmmr_h.backend, trees.rproof_pmmr_h.size),
			kernel_pmmr: PMMR::at(&mut trees.kernel_pmmr_h.backend, trees.kernel_pmmr_h.size),
			rollback: false,
			batch,
		}
	}

	/// Apply a new block to the current txhashet extension (output, rangeproof, kernel MMRs).
	/// Inputs are spent first, then outputs and kernels are pushed.
	/// Returns the positions spent by the block.
	pub fn apply_block(&mut self, b: &Block) -> Result<Bitmap, Error> {
		let mut spent = Bitmap::create();
		for input in b.inputs() {
			let pos0 = self.apply_input(input)?;
			spent.add(pos0 as u32);
		}
		for out in b.outputs() {
			self.apply_output(out, b.header.height)?;
		}
		for kernel in b.kernels() {
			self.apply_kernel(kernel)?;
		}
		Ok(spent)
	}

	/// Rewinds the MMRs to their state at `header`, undoing the blocks in
	/// `undone` (all blocks above it). Outputs they spent come back from
	/// their spent bitmaps. The position index follows, with heights found
	/// on `chain`.
	pub fn rewind(
		&mut self,
		header: &BlockHeader,
		undone: &[Hash],
		chain: &ChainIndex,
	) -> Result<(), Error> {
		let mut restored = Bitmap::create();
		for h in undone {
			restored.or_inplace(&self.batch.get_spent_bitmap(h)?);
		}

		let first_undone = pmmr::n_leaves(header.output_mmr_size);
		for idx in first_undone..pmmr::n_leaves(self.output_pmmr.size) {
			let pos0 = pmmr::insertion_to_pmmr_index(idx);
			if let Some(out) = self.output_pmmr.get_data(pos0) {
				self.batch.delete_output_pos_height(&out.commit)?;
			}
		}

		self.output_pmmr
			.rewind(header.output_mmr_size, &restored)
			.map_err(Error::TxHashSetErr)?;
		self.rproof_pmmr
			.rewind(header.output_mmr_size, &restored)
			.map_err(Error::TxHashSetErr)?;
		self.kernel_pmmr
			.rewind(header.kernel_mmr_size, &Bitmap::create())
			.map_err(Error::TxHashSetErr)?;

		let batch = self.batch;
		for pos0 in restored.iter().map(u64::from) {
			if pos0 >= header.output_mmr_size {
				continue;
			}
			if let Some(out) = self.output_pmmr.get_data(pos0) {
				let height = find_height_for_pos(chain, pos0, |h| {
					Ok(batch.get_block_header(h)?.output_mmr_size)
				})?;
				batch.save_output_pos_height(&out.commit, CommitPos { pos0, height })?;
			}
		}
		debug!(
			"txhashset: rewound {} blocks to {} at {}, {} outputs restored",
			undone.len(),
			header.hash(),
			header.height,
			restored.cardinality()
		);
		Ok(())
	}

	fn apply_input(&mut self, input: &Input) -> Result<u64, Error> {
		let commit = input.commitment();
		let pos = match self.batch.get_output_pos_height(&commit) {
			Ok(pos) => pos,
			Err(store::Error::NotFoundErr(_)) => return Err(Error::AlreadySpent(commit)),
			Err(e) => return Err(e.into()),
		};
		match self.output_pmmr.get_data(pos.pos0) {
			Some(out) if out == OutputIdentifier::from_input(input) => {}
			_ => return Err(Error::AlreadySpent(commit)),
		}
		self.output_pmmr
			.prune(pos.pos0)
			.map_err(Error::TxHashSetErr)?;
		self.rproof_pmmr
			.prune(pos.pos0)
			.map_err(Error::TxHashSetErr)?;
		self.batch.delete_output_pos_height(&commit)?;
		Ok(pos.pos0)
	}

	fn apply_output(&mut self, out: &Output, height: u64) -> Result<u64, Error> {
		let commit = out.commitment();
		if let Ok(pos) = self.batch.get_output_pos_height(&commit) {
			if let Some(existing) = self.output_pmmr.get_data(pos.pos0) {
				if existing.commit == commit {
					return Err(Error::DuplicateCommitment(commit));
				}
			}
		}
		let output_pos = self
			.output_pmmr
			.push(&out.identifier())
			.map_err(Error::TxHashSetErr)?;
		let rproof_pos = self
			.rproof_pmmr
			.push(&out.proof())
			.map_err(Error::TxHashSetErr)?;
		if output_pos != rproof_pos {
			return Err(Error::Other(format!(
				"output vs rproof MMRs different positions {} vs {}",
				output_pos, rproof_pos
			)));
		}
		self.batch.save_output_pos_height(
			&commit,
			CommitPos {
				pos0: output_pos,
				height,
			},
		)?;
		Ok(output_pos)
	}

	fn apply_kernel(&mut self, kernel: &TxKernel) -> Result<u64, Error> {
		self.kernel_pmmr.push(kernel).map_err(Error::TxHashSetErr)
	}

	/// Current roots of the extension MMRs.
	pub fn roots(&self) -> Result<TxHashSetRoots, Error> {
		Ok(TxHashSetRoots {
			output_root: root_of("output", &self.output_pmmr)?,
			rproof_root: root_of("rangeproof", &self.rproof_pmmr)?,
			kernel_root: root_of("kernel", &self.kernel_pmmr)?,
		})
	}

	/// Validate the extension roots against the provided header.
	pub fn validate_roots(&self, header: &BlockHeader) -> Result<(), Error> {
		check_roots(&self.roots()?, header)
	}

	/// Validate the extension MMR sizes against the provided header.
	pub fn validate_sizes(&self, header: &BlockHeader) -> Result<(), Error> {
		check_sizes(self.sizes(), header)
	}

	/// Force the rollback of this extension, no matter the result
	pub fn force_rollback(&mut self) {
		self.rollback = true;
	}

	/// Sizes of each of the MMRs
	pub fn sizes(&self) -> (u64, u64, u64) {
		(
			self.output_pmmr.size,
			self.rproof_pmmr.size,
			self.kernel_pmmr.size,
		)
	}
}
