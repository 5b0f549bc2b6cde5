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

//! Fast sync of a full txhashset from a snapshot archive. Loading,
//! validation, persistence of the resulting state and the fast-forward of
//! the confirmed chain are run as a single attempt, either fully applied or
//! fully rolled back.

use std::fmt;
use std::path::Path;

use crate::chain_view::{reconcile, BlockIndex, ChainViews};
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::{BlockHeader, BlockSums};
use crate::error::Error;
use crate::store::ChainStore;
use crate::txhashset::TxHashSetManager;
use crate::types::TxHashsetWriteStatus;

/// States of a sync attempt. Transitions are strictly sequential, any
/// non-terminal state may fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
	/// Nothing started yet.
	Idle,
	/// Releasing the live txhashset.
	ClosingPriorSet,
	/// Extracting and opening the snapshot.
	LoadingSnapshot,
	/// Full validation of the snapshot against the target header.
	Validating,
	/// Staging block sums, output positions and the live set pointer.
	PersistingState,
	/// Fast-forwarding the confirmed chain to the target header, then
	/// committing everything and installing the new set.
	ReconcilingChain,
	/// Everything committed.
	Committed,
	/// The attempt failed and was rolled back.
	Failed(String),
}

impl SyncState {
	/// Whether the attempt is over.
	pub fn is_terminal(&self) -> bool {
		match self {
			SyncState::Committed | SyncState::Failed(_) => true,
			_ => false,
		}
	}
}

impl fmt::Display for SyncState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncState::Failed(reason) => write!(f, "Failed({})", reason),
			s => write!(f, "{:?}", s),
		}
	}
}

/// Observer of a sync attempt. An error returned on a transition into a
/// non-terminal state aborts the attempt.
pub trait SyncHooks {
	/// Called before entering the `to` state.
	fn on_transition(&self, _from: &SyncState, _to: &SyncState) -> Result<(), Error> {
		Ok(())
	}
}

/// No-op hooks.
pub struct NoHooks;

impl SyncHooks for NoHooks {}

/// A single sync attempt towards a target header.
pub struct TxHashSetSync<'a> {
	store: &'a ChainStore,
	manager: &'a TxHashSetManager,
	views: &'a ChainViews,
	genesis: &'a BlockHeader,
	hooks: &'a dyn SyncHooks,
	status: &'a dyn TxHashsetWriteStatus,
	state: SyncState,
	prior: Option<String>,
	candidate_name: Option<String>,
}

impl<'a> TxHashSetSync<'a> {
	/// New attempt, in the `Idle` state.
	pub fn new(
		store: &'a ChainStore,
		manager: &'a TxHashSetManager,
		views: &'a ChainViews,
		genesis: &'a BlockHeader,
		hooks: &'a dyn SyncHooks,
		status: &'a dyn TxHashsetWriteStatus,
	) -> TxHashSetSync<'a> {
		TxHashSetSync {
			store,
			manager,
			views,
			genesis,
			hooks,
			status,
			state: SyncState::Idle,
			prior: None,
			candidate_name: None,
		}
	}

	/// Current state of the attempt.
	pub fn state(&self) -> &SyncState {
		&self.state
	}

	/// Runs the attempt to completion. On failure the prior live txhashset
	/// is reopened, the snapshot directory deleted and the error returned.
	pub fn run(&mut self, h: &Hash, zip_path: &Path) -> Result<BlockSums, Error> {
		if self.state != SyncState::Idle {
			return Err(Error::InvalidArgument(format!(
				"sync attempt already ran, now {}",
				self.state
			)));
		}
		match self.attempt(h, zip_path) {
			Ok(sums) => {
				self.enter(SyncState::Committed);
				if let Some(prior) = self.prior.take() {
					self.manager.discard(&prior);
				}
				self.status.on_done();
				info!("txhashset sync: {} committed", h);
				Ok(sums)
			}
			Err(e) => {
				error!("txhashset sync: failed in {}: {}", self.state, e);
				self.rollback();
				self.enter(SyncState::Failed(e.to_string()));
				Err(e)
			}
		}
	}

	fn attempt(&mut self, h: &Hash, zip_path: &Path) -> Result<BlockSums, Error> {
		let header = self.store.get_block_header(h)?;

		self.transition(SyncState::ClosingPriorSet)?;
		self.prior = self.manager.close();

		self.transition(SyncState::LoadingSnapshot)?;
		self.status.on_setup();
		let ths = self.manager.load_from_zip(zip_path, &header)?;
		self.candidate_name = Some(ths.name().to_owned());

		self.transition(SyncState::Validating)?;
		let candidate = self.views.candidate();
		let sums = ths.validate(&header, &candidate, self.genesis, false, self.status)?;

		self.transition(SyncState::PersistingState)?;
		self.status.on_save();
		let batch = self.store.batch()?;
		batch.save_block_sums(h, &sums)?;
		ths.save_output_positions(&batch, &candidate)?;
		batch.save_txhashset_name(ths.name())?;

		self.transition(SyncState::ReconcilingChain)?;
		let confirmed = self.views.confirmed();
		let target = BlockIndex {
			height: header.height,
			hash: header.hash(),
		};
		let reconciled = reconcile(&self.views.candidate(), &confirmed, &target)?;
		reconciled.save_diff(&confirmed, &batch)?;
		batch.commit()?;

		// the db now points at the new set, it is not ours to discard anymore
		self.candidate_name = None;
		self.manager.set_txhashset(ths)?;
		self.views.replace(reconciled);

		Ok(sums)
	}

	fn transition(&mut self, to: SyncState) -> Result<(), Error> {
		self.hooks.on_transition(&self.state, &to)?;
		debug!("txhashset sync: {} -> {}", self.state, to);
		self.state = to;
		Ok(())
	}

	// Terminal states can't be aborted anymore, hook errors are only logged.
	fn enter(&mut self, to: SyncState) {
		if let Err(e) = self.hooks.on_transition(&self.state, &to) {
			warn!("txhashset sync: hook error entering {}: {}", to, e);
		}
		debug!("txhashset sync: {} -> {}", self.state, to);
		self.state = to;
	}

	fn rollback(&mut self) {
		if let Some(name) = self.candidate_name.take() {
			self.manager.discard(&name);
		}
		self.prior = None;
		if !self.manager.is_open() {
			if let Err(e) = self.manager.reopen(self.store) {
				error!("txhashset sync: failed to reopen prior txhashset: {}", e);
			}
		}
	}
}
