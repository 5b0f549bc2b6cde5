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

//! Facade and handler for the rest of the txhashset sync and validation
//! engine. Owns the chain db, the live txhashset and the two chain views.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::chain_view::{find_height_for_pos, BlockIndex, ChainIndex, ChainType, ChainViews};
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::merkle_proof::MerkleProof;
use crate::core::core::{Block, BlockHeader, BlockSums};
use crate::core::global;
use crate::error::Error;
use crate::store::ChainStore;
use crate::sync::{SyncHooks, TxHashSetSync};
use crate::txhashset::{TxHashSet, TxHashSetManager};
use crate::types::{
	LocatedTxKernel, NoStatus, OutputListing, OutputPrintable, Tip, TxHashSetRoots,
	TxHashsetWriteStatus,
};
use crate::util::secp::pedersen::Commitment;
use crate::util::Mutex;
use mwsync_store as store;

/// Outputs returned by a listing when no maximum is requested.
pub const DEFAULT_OUTPUT_PAGE: u64 = 100;

/// Hard limit on the number of outputs returned by a single listing.
pub const MAX_OUTPUT_PAGE: u64 = 1000;

/// Facade to the blockchain txhashset state. Block and header processing,
/// snapshot import and compaction are serialized through a single writer
/// lock; lookups only take the (cheap) read side of the live txhashset.
pub struct Chain {
	db_root: String,
	store: Arc<ChainStore>,
	txhashset: Arc<TxHashSetManager>,
	views: Arc<ChainViews>,
	genesis: BlockHeader,
	archive_mode: bool,
	writer_lock: Mutex<()>,
}

impl Chain {
	/// Initializes the chain. If the db is empty the genesis block is applied
	/// to a fresh txhashset, otherwise the chain views are loaded and the
	/// live txhashset reopened.
	pub fn init(db_root: String, genesis: Block, archive_mode: bool) -> Result<Chain, Error> {
		let store = Arc::new(ChainStore::new(&db_root)?);
		let txhashset = Arc::new(TxHashSetManager::new(&db_root)?);

		let candidate = store.load_chain(ChainType::Candidate)?;
		let confirmed = store.load_chain(ChainType::Confirmed)?;

		let (candidate, confirmed) = if confirmed.is_empty() {
			setup_genesis(&store, &txhashset, &genesis)?
		} else {
			if confirmed.get_hash(0) != Some(genesis.hash()) {
				return Err(Error::Other(format!(
					"chain db at {} was built on a different genesis",
					db_root
				)));
			}
			txhashset.reopen(&store)?;
			(candidate, confirmed)
		};
		txhashset.remove_stale()?;

		let chain = Chain {
			db_root,
			store,
			txhashset,
			views: Arc::new(ChainViews::new(candidate, confirmed)),
			genesis: genesis.header,
			archive_mode,
			writer_lock: Mutex::new(()),
		};

		let head = chain.head()?;
		let header_head = chain.header_head()?;
		info!(
			"init: head: {} @ {}, header head: {} @ {}",
			head.hash(),
			head.height,
			header_head.hash(),
			header_head.height,
		);
		Ok(chain)
	}

	/// Root directory of the chain db and txhashsets.
	pub fn db_root(&self) -> &str {
		&self.db_root
	}

	/// Shared handle to the chain store.
	pub fn store(&self) -> Arc<ChainStore> {
		self.store.clone()
	}

	/// Genesis header this chain was built on.
	pub fn genesis(&self) -> &BlockHeader {
		&self.genesis
	}

	/// The live txhashset.
	pub fn txhashset(&self) -> Result<Arc<TxHashSet>, Error> {
		self.txhashset.read()
	}

	/// Current candidate chain view.
	pub fn candidate_chain(&self) -> Arc<ChainIndex> {
		self.views.candidate()
	}

	/// Current confirmed chain view.
	pub fn confirmed_chain(&self) -> Arc<ChainIndex> {
		self.views.confirmed()
	}

	/// Tip of the confirmed chain.
	pub fn head(&self) -> Result<Tip, Error> {
		self.tip_of(&self.views.confirmed())
	}

	/// Header of the confirmed chain tip.
	pub fn head_header(&self) -> Result<BlockHeader, Error> {
		let head = self.head()?;
		self.get_block_header(&head.hash())
	}

	/// Tip of the candidate chain.
	pub fn header_head(&self) -> Result<Tip, Error> {
		self.tip_of(&self.views.candidate())
	}

	fn tip_of(&self, chain: &ChainIndex) -> Result<Tip, Error> {
		let tip = chain
			.tip()
			.ok_or_else(|| Error::Other(format!("empty {:?} chain", chain.chain_type())))?;
		let header = self.get_block_header(&tip.hash)?;
		Ok(Tip::from_header(&header))
	}

	/// Gets a block header by hash.
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		self.store
			.get_block_header(h)
			.map_err(|e| Error::StoreErr(e, "chain get header".to_owned()))
	}

	/// Gets the header at the provided height on the confirmed chain.
	pub fn get_header_by_height(&self, height: u64) -> Result<BlockHeader, Error> {
		self.header_at(&self.views.confirmed(), height)
	}

	fn header_at(&self, chain: &ChainIndex, height: u64) -> Result<BlockHeader, Error> {
		let hash = chain.get_hash(height).ok_or_else(|| {
			Error::InvalidArgument(format!(
				"no {:?} block at height {}, chain length {}",
				chain.chain_type(),
				height,
				chain.len()
			))
		})?;
		self.get_block_header(&hash)
	}

	/// Gets the block sums for the block with the provided hash.
	pub fn get_block_sums(&self, h: &Hash) -> Result<BlockSums, Error> {
		self.store
			.get_block_sums(h)
			.map_err(|e| Error::StoreErr(e, "chain get block sums".to_owned()))
	}

	/// Roots of the live txhashset.
	pub fn get_txhashset_roots(&self) -> Result<TxHashSetRoots, Error> {
		self.txhashset.read()?.roots()
	}

	/// Processes a batch of headers, extending (or reorganizing) the
	/// candidate chain. Each header has to build on a header already on the
	/// candidate chain, either a previous header of the batch or one already
	/// known. Returns the new candidate tip.
	pub fn process_headers(&self, headers: &[BlockHeader]) -> Result<Tip, Error> {
		let _lock = self.writer_lock.lock();

		let prev = self.views.candidate();
		let mut candidate = (*prev).clone();
		let batch = self.store.batch()?;
		let mut last = None;

		for header in headers {
			let h = header.hash();
			if candidate.get_hash(header.height) == Some(h) {
				last = Some(header);
				continue;
			}
			let parent_height = match header.height.checked_sub(1) {
				Some(height) => height,
				None => return Err(Error::Unfit(format!("header {} claims height 0", h))),
			};
			if candidate.get_hash(parent_height) != Some(header.prev_hash) {
				return Err(Error::Unfit(format!(
					"header {} at {} does not build on the candidate chain",
					h, header.height
				)));
			}
			batch.save_block_header(header)?;
			candidate.rewind(parent_height);
			candidate.add_block(h, header.height)?;
			last = Some(header);
		}

		let last = match last {
			Some(header) => header,
			None => return self.header_head(),
		};
		if candidate.tip() != prev.tip() || candidate.len() != prev.len() {
			debug!(
				"process_headers: candidate chain now {} @ {} (was {} long)",
				last.hash(),
				candidate.len() - 1,
				prev.len()
			);
		}
		candidate.save_diff(&prev, &batch)?;
		batch.commit()?;
		let tip = candidate
			.tip()
			.ok_or_else(|| Error::Other("empty candidate chain".to_owned()))?;
		self.views.replace(candidate);
		let header = self.get_block_header(&tip.hash)?;
		Ok(Tip::from_header(&header))
	}

	/// Applies a full block on top of the confirmed chain. The block has to
	/// be valid in isolation, its kernel sums have to balance against the
	/// parent block sums and the resulting txhashset roots and sizes have to
	/// match its header. Returns the new confirmed tip.
	pub fn process_block(&self, b: &Block) -> Result<Tip, Error> {
		let _lock = self.writer_lock.lock();
		let now = Instant::now();

		let confirmed = self.views.confirmed();
		let head = confirmed
			.tip()
			.ok_or_else(|| Error::Other("empty confirmed chain".to_owned()))?;
		if b.header.prev_hash != head.hash || b.header.height != head.height + 1 {
			return Err(Error::Unfit(format!(
				"block {} at {} does not build on head {} at {}",
				b.hash(),
				b.header.height,
				head.hash,
				head.height
			)));
		}

		b.validate()?;
		let prev_sums = self.get_block_sums(&head.hash)?;
		let sums = prev_sums.next(b, b.header.overage(), b.header.total_kernel_offset())?;

		let ths = self.txhashset.read()?;
		let mut batch = self.store.batch()?;
		let spent = ths.extending(&mut batch, |ext| {
			let spent = ext.apply_block(b)?;
			ext.validate_roots(&b.header)?;
			ext.validate_sizes(&b.header)?;
			Ok(spent)
		})?;

		let h = b.hash();
		batch.save_block_header(&b.header)?;
		batch.save_block_sums(&h, &sums)?;
		batch.save_spent_bitmap(&h, &spent)?;

		let mut new_confirmed = (*confirmed).clone();
		new_confirmed.add_block(h, b.header.height)?;

		// The candidate chain follows along, unless it already holds the
		// block (headers first) or has moved to a fork the block isn't on.
		let prev_candidate = self.views.candidate();
		let index = BlockIndex {
			height: b.header.height,
			hash: h,
		};
		let new_candidate = if prev_candidate.contains(&index) {
			None
		} else if prev_candidate.len() <= b.header.height && prev_candidate.contains(&head) {
			let mut candidate = (*prev_candidate).clone();
			candidate.add_block(h, b.header.height)?;
			Some(candidate)
		} else if prev_candidate.len() <= b.header.height {
			Some(ChainIndex::from_hashes(
				ChainType::Candidate,
				new_confirmed.iter().map(|x| x.hash).collect(),
			))
		} else {
			None
		};

		new_confirmed.save_diff(&confirmed, &batch)?;
		if let Some(ref candidate) = new_candidate {
			candidate.save_diff(&prev_candidate, &batch)?;
		}
		batch.commit()?;

		self.views.replace(new_confirmed);
		if let Some(candidate) = new_candidate {
			self.views.replace(candidate);
		}

		debug!(
			"process_block: {} at {} accepted, {} inputs, {} outputs, {} kernels, took {}ms",
			h,
			b.header.height,
			b.inputs().len(),
			b.outputs().len(),
			b.kernels().len(),
			now.elapsed().as_millis(),
		);
		Ok(Tip::from_header(&b.header))
	}

	/// Sets the txhashset roots and MMR sizes on a brand new block by
	/// applying it to the live txhashset in a throwaway extension. The block
	/// may build on any block of the confirmed chain, the blocks above its
	/// parent are undone first.
	pub fn set_txhashset_roots(&self, b: &mut Block) -> Result<(), Error> {
		let _lock = self.writer_lock.lock();

		let confirmed = self.views.confirmed();
		let parent_height = match b.header.height.checked_sub(1) {
			Some(height) if confirmed.get_hash(height) == Some(b.header.prev_hash) => height,
			_ => {
				return Err(Error::Unfit(format!(
					"block at {} does not build on the confirmed chain",
					b.header.height
				)))
			}
		};
		let parent = self.get_block_header(&b.header.prev_hash)?;
		let undone: Vec<Hash> = (parent_height + 1..confirmed.len())
			.filter_map(|height| confirmed.get_hash(height))
			.collect();
		let mut fork = (*confirmed).clone();
		fork.rewind(parent_height);

		let ths = self.txhashset.read()?;
		let mut batch = self.store.batch()?;
		let (roots, sizes) = {
			let b: &Block = b;
			ths.extending(&mut batch, |ext| {
				if !undone.is_empty() {
					ext.rewind(&parent, &undone, &fork)?;
				}
				ext.apply_block(b)?;
				ext.force_rollback();
				Ok((ext.roots()?, ext.sizes()))
			})?
		};

		b.header.output_root = roots.output_root;
		b.header.range_proof_root = roots.rproof_root;
		b.header.kernel_root = roots.kernel_root;
		b.header.output_mmr_size = sizes.0;
		b.header.kernel_mmr_size = sizes.2;
		Ok(())
	}

	/// Imports a txhashset snapshot for the header with the provided hash,
	/// which must be on the candidate chain. On success the confirmed chain
	/// is fast-forwarded to that header and the resulting block sums are
	/// returned. On failure the prior txhashset and chain state are kept.
	pub fn txhashset_write(
		&self,
		h: Hash,
		zip_path: &Path,
		status: &dyn TxHashsetWriteStatus,
		hooks: &dyn SyncHooks,
	) -> Result<BlockSums, Error> {
		let _lock = self.writer_lock.lock();
		let mut sync = TxHashSetSync::new(
			&self.store,
			&self.txhashset,
			&self.views,
			&self.genesis,
			hooks,
			status,
		);
		sync.run(&h, zip_path)
	}

	/// Exports the live txhashset as a snapshot archive written under the
	/// db root. Returns the header the snapshot matches and the archive path.
	pub fn txhashset_read(&self) -> Result<(BlockHeader, PathBuf), Error> {
		let _lock = self.writer_lock.lock();

		let header = self.head_header()?;
		let ths = self.txhashset.read()?;
		let path = Path::new(&self.db_root)
			.join(format!("txhashset_snapshot_{}.zip", header.hash().to_hex()));
		ths.zip_write(&path)?;
		info!(
			"txhashset_read: snapshot of {} at {} written to {}",
			header.hash(),
			header.height,
			path.display()
		);
		Ok((header, path))
	}

	/// Validates the live txhashset against the confirmed head. With `fast`
	/// range proofs and kernel signatures are skipped. Validation is read
	/// only, running it twice yields the same result.
	pub fn validate(&self, fast: bool) -> Result<BlockSums, Error> {
		self.validate_with_status(fast, &NoStatus)
	}

	/// Same as `validate`, reporting progress to the provided status.
	pub fn validate_with_status(
		&self,
		fast: bool,
		status: &dyn TxHashsetWriteStatus,
	) -> Result<BlockSums, Error> {
		let _lock = self.writer_lock.lock();

		let header = self.head_header()?;
		let ths = self.txhashset.read()?;
		let sums = ths.validate(&header, &self.views.confirmed(), &self.genesis, fast, status)?;

		if header.height > 0 {
			let stored = self.get_block_sums(&header.hash())?;
			if stored != sums {
				return Err(Error::SumMismatch(header.height));
			}
		}
		Ok(sums)
	}

	/// Compacts the live txhashset, removing the data of outputs spent
	/// before the cut-through horizon. Does nothing in archive mode or while
	/// the chain is shorter than the horizon.
	pub fn compact(&self) -> Result<(), Error> {
		let _lock = self.writer_lock.lock();

		if self.archive_mode {
			debug!("compact: archive mode, skipping");
			return Ok(());
		}

		let confirmed = self.views.confirmed();
		let head = confirmed
			.tip()
			.ok_or_else(|| Error::Other("empty confirmed chain".to_owned()))?;
		let horizon = global::cut_through_horizon() as u64;
		if head.height < horizon {
			debug!(
				"compact: head at {} below horizon of {}, skipping",
				head.height, horizon
			);
			return Ok(());
		}

		let horizon_header = self.header_at(&confirmed, head.height - horizon)?;
		let ths = self.txhashset.read()?;
		let compacted = ths.compact(&horizon_header)?;
		info!(
			"compact: horizon at {}, compacted: {}",
			horizon_header.height, compacted
		);
		Ok(())
	}

	/// Lists outputs by leaf insertion index (1-based, defaults to 1), up to
	/// `max` of them (defaults to 100, capped at 1000).
	pub fn get_outputs_by_leaf_index(
		&self,
		start_index: Option<u64>,
		max: Option<u64>,
	) -> Result<OutputListing, Error> {
		let start_index = start_index.unwrap_or(1).max(1);
		let max = max.unwrap_or(DEFAULT_OUTPUT_PAGE).min(MAX_OUTPUT_PAGE);

		let ths = self.txhashset.read()?;
		let (entries, examined, total) = ths.outputs_by_leaf_index(start_index - 1, max);

		let confirmed = self.views.confirmed();
		let outputs = entries
			.iter()
			.map(|entry| {
				let height = find_height_for_pos(&confirmed, entry.pos0, |h| {
					Ok(self.get_block_header(h)?.output_mmr_size)
				})
				.ok();
				OutputPrintable::from_entry(entry, height)
			})
			.collect();

		Ok(OutputListing {
			highest_index: total,
			last_retrieved_index: (start_index - 1 + examined).min(total),
			outputs,
		})
	}

	/// Looks for a kernel by excess on the confirmed chain, optionally
	/// restricted to the blocks between `min_height` and `max_height`
	/// (inclusive, clamped to the head).
	pub fn get_kernel(
		&self,
		excess: &Commitment,
		min_height: Option<u64>,
		max_height: Option<u64>,
	) -> Result<Option<LocatedTxKernel>, Error> {
		let confirmed = self.views.confirmed();
		let head = confirmed
			.tip()
			.ok_or_else(|| Error::Other("empty confirmed chain".to_owned()))?;
		let min_height = min_height.unwrap_or(0);
		let max_height = max_height.unwrap_or(head.height).min(head.height);
		if min_height > max_height {
			return Err(Error::InvalidArgument(format!(
				"kernel search range {}..={} outside of chain at {}",
				min_height, max_height, head.height
			)));
		}

		let min_pos0 = match min_height {
			0 => 0,
			height => self.header_at(&confirmed, height - 1)?.kernel_mmr_size,
		};
		let max_size = self.header_at(&confirmed, max_height)?.kernel_mmr_size;

		let ths = self.txhashset.read()?;
		let (tx_kernel, pos0) = match ths.find_kernel(excess, min_pos0, max_size) {
			Some(found) => found,
			None => return Ok(None),
		};
		let height = find_height_for_pos(&confirmed, pos0, |h| {
			Ok(self.get_block_header(h)?.kernel_mmr_size)
		})?;
		Ok(Some(LocatedTxKernel {
			tx_kernel,
			height,
			mmr_index: pos0 + 1,
		}))
	}

	/// Merkle proof of an unspent output against the current output root.
	pub fn get_merkle_proof(&self, commit: &Commitment) -> Result<MerkleProof, Error> {
		let pos = match self.store.get_output_pos_height(commit) {
			Ok(pos) => pos,
			Err(store::Error::NotFoundErr(_)) => return Err(Error::OutputNotFound),
			Err(e) => return Err(Error::StoreErr(e, "chain get output pos".to_owned())),
		};
		let ths = self.txhashset.read()?;
		if ths.get_unspent(commit, pos.pos0).is_none() {
			return Err(Error::OutputNotFound);
		}
		ths.merkle_proof(pos.pos0)
	}
}

/// Applies the genesis block to a fresh txhashset and persists its header,
/// sums and chain entries. Returns the initial candidate and confirmed views.
fn setup_genesis(
	store: &ChainStore,
	manager: &TxHashSetManager,
	genesis: &Block,
) -> Result<(ChainIndex, ChainIndex), Error> {
	let h = genesis.hash();
	let ths = manager.create(&h)?;

	let mut batch = store.batch()?;
	let sums = if genesis.outputs().is_empty() && genesis.kernels().is_empty() {
		BlockSums::default()
	} else {
		genesis.validate()?;
		ths.extending(&mut batch, |ext| {
			ext.apply_block(genesis)?;
			ext.validate_roots(&genesis.header)?;
			ext.validate_sizes(&genesis.header)?;
			Ok(())
		})?;
		BlockSums::default().next(
			genesis,
			genesis.header.overage(),
			genesis.header.total_kernel_offset(),
		)?
	};

	batch.save_block_header(&genesis.header)?;
	batch.save_block_sums(&h, &sums)?;
	batch.save_txhashset_name(ths.name())?;

	let candidate = ChainIndex::from_hashes(ChainType::Candidate, vec![h]);
	let confirmed = ChainIndex::from_hashes(ChainType::Confirmed, vec![h]);
	candidate.save_diff(&ChainIndex::new(ChainType::Candidate), &batch)?;
	confirmed.save_diff(&ChainIndex::new(ChainType::Confirmed), &batch)?;
	batch.commit()?;

	manager.set_txhashset(ths)?;
	info!("init: chain initialized with genesis {}", h);
	Ok((candidate, confirmed))
}
