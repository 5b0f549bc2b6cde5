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

mod common;

use self::chain::txhashset::{snapshot_files, TxHashSetManager};
use self::chain::types::{NoStatus, Tip, TxHashSetRoots};
use self::chain::{Chain, ChainIndex, Error, ErrorCategory, SyncHooks, SyncState};
use self::core::consensus::REWARD;
use self::core::core::hash::{Hash, Hashed};
use self::core::core::{
	BlindingFactor, Block, KernelFeatures, Output, OutputFeatures, OutputIdentifier, TxKernel,
};
use self::core::ser::PMMRable;
use self::store::pmmr::{PMMR_DATA_FILE, PMMR_HASH_FILE};
use self::util::secp::pedersen::RangeProof;
use self::util::zip;
use crate::common::{
	blind_sum, clean_output_dir, coinbase, force_block, headers, import, init_chain, kernel,
	mine_blocks, output, output_with_key, random_key, replay, setup, snapshot, swap_records,
	tampered_snapshot, Keyed,
};
use mwsync_chain as chain;
use mwsync_core as core;
use mwsync_store as store;
use mwsync_util as util;
use pretty_assertions::assert_eq;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fails the attempt when about to enter the provided state.
struct FailAt(SyncState);

impl SyncHooks for FailAt {
	fn on_transition(&self, _from: &SyncState, to: &SyncState) -> Result<(), Error> {
		if *to == self.0 {
			return Err(Error::Other(format!("injected fault entering {}", to)));
		}
		Ok(())
	}
}

/// Records every state entered.
#[derive(Default)]
struct Recorder(Mutex<Vec<SyncState>>);

impl SyncHooks for Recorder {
	fn on_transition(&self, _from: &SyncState, to: &SyncState) -> Result<(), Error> {
		self.0.lock().unwrap().push(to.clone());
		Ok(())
	}
}

fn txhashset_dirs(chain_dir: &str) -> usize {
	fs::read_dir(Path::new(chain_dir).join("txhashset"))
		.unwrap()
		.count()
}

#[test]
fn import_snapshot() {
	let producer_dir = "target/tmp/sync_import_producer";
	let consumer_dir = "target/tmp/sync_import_consumer";
	let zip_dir = "target/tmp/sync_import_zips";
	clean_output_dir(zip_dir);
	let producer = setup(producer_dir);
	let consumer = setup(consumer_dir);

	let (mut blocks, coinbases) = mine_blocks(&producer, 4);
	let (spend, _) = common::add_block(&producer, &coinbases[0..2], 3);
	blocks.push(spend);
	let (header, zip) = snapshot(&producer, Path::new(zip_dir));
	assert_eq!(header.height, 5);

	consumer.process_headers(&headers(&blocks)).unwrap();
	assert_eq!(consumer.head().unwrap().height, 0);

	let recorder = Recorder::default();
	let sums = consumer
		.txhashset_write(header.hash(), &zip, &NoStatus, &recorder)
		.unwrap();
	assert_eq!(
		*recorder.0.lock().unwrap(),
		vec![
			SyncState::ClosingPriorSet,
			SyncState::LoadingSnapshot,
			SyncState::Validating,
			SyncState::PersistingState,
			SyncState::ReconcilingChain,
			SyncState::Committed,
		]
	);

	assert_eq!(consumer.head().unwrap().hash(), header.hash());
	assert_eq!(
		consumer.get_txhashset_roots().unwrap(),
		producer.get_txhashset_roots().unwrap()
	);
	assert_eq!(sums, producer.get_block_sums(&header.hash()).unwrap());
	assert_eq!(consumer.get_block_sums(&header.hash()).unwrap(), sums);

	// same positions and heights as built incrementally
	for b in &blocks {
		for out in b.outputs() {
			let commit = out.commitment();
			match producer.store().get_output_pos_height(&commit) {
				Ok(pos) => {
					assert_eq!(consumer.store().get_output_pos_height(&commit).unwrap(), pos);
					assert_eq!(pos.height, b.header.height);
				}
				Err(_) => assert!(consumer.store().get_output_pos_height(&commit).is_err()),
			}
		}
	}

	// validating twice gives the same sums
	let first = consumer.validate(false).unwrap();
	let second = consumer.validate(false).unwrap();
	assert_eq!(first, second);
	assert_eq!(first, sums);

	// the prior set was removed
	assert_eq!(txhashset_dirs(consumer_dir), 1);

	drop(consumer);
	let consumer = init_chain(consumer_dir);
	assert_eq!(consumer.head().unwrap().hash(), header.hash());
	consumer.validate(true).unwrap();

	// and carries on with regular blocks
	let (next, _) = common::add_block(&consumer, &coinbases[2..3], 1);
	assert_eq!(consumer.head().unwrap().hash(), next.hash());
	consumer.validate(false).unwrap();

	clean_output_dir(producer_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

#[test]
fn unbalanced_snapshot() {
	let producer_dir = "target/tmp/sync_unbalanced_producer";
	let consumer_dir = "target/tmp/sync_unbalanced_consumer";
	let zip_dir = "target/tmp/sync_unbalanced_zips";
	clean_output_dir(zip_dir);
	let producer = setup(producer_dir);
	let consumer = setup(consumer_dir);

	let (mut blocks, _) = mine_blocks(&producer, 2);
	let prev = producer.head_header().unwrap();

	// coinbase output blinded by the kernel key plus some delta
	let kernel_key = random_key();
	let out_key = blind_sum(vec![kernel_key.clone(), random_key()], vec![]);
	let out: Keyed = output_with_key(OutputFeatures::Coinbase, REWARD, out_key);
	let mut bad = Block::new(
		&prev,
		vec![],
		vec![out.output.clone()],
		vec![kernel(KernelFeatures::Coinbase, &kernel_key)],
		BlindingFactor::zero(),
	);
	producer.set_txhashset_roots(&mut bad).unwrap();
	match producer.process_block(&bad) {
		Err(Error::Committed(_)) => {}
		other => panic!("expected sum failure, got {:?}", other),
	}

	// force it in, bypassing the block checks
	let zip = force_block(&producer, &mut bad, Path::new(zip_dir), "unbalanced");
	blocks.push(bad.clone());

	consumer.process_headers(&headers(&blocks)).unwrap();
	let err = import(&consumer, bad.hash(), &zip).unwrap_err();
	match err {
		Error::SumMismatch(height) => assert_eq!(height, 3),
		ref e => panic!("expected sum mismatch, got {:?}", e),
	}
	assert_eq!(err.category(), ErrorCategory::Accounting);
	assert!(!err.is_retryable());

	// nothing changed
	assert_eq!(consumer.head().unwrap().height, 0);
	assert!(consumer.get_block_sums(&bad.hash()).is_err());
	assert!(consumer.store().get_output_pos_height(&out.commit()).is_err());
	assert_eq!(txhashset_dirs(consumer_dir), 1);
	consumer.validate(false).unwrap();

	clean_output_dir(producer_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

#[test]
fn failed_attempt_rolls_back() {
	let producer_dir = "target/tmp/sync_rollback_producer";
	let consumer_dir = "target/tmp/sync_rollback_consumer";
	let zip_dir = "target/tmp/sync_rollback_zips";
	clean_output_dir(zip_dir);
	let producer = setup(producer_dir);
	let consumer = setup(consumer_dir);

	let (blocks, coinbases) = mine_blocks(&producer, 6);
	replay(&consumer, &blocks[..3]);
	consumer.process_headers(&headers(&blocks[3..])).unwrap();
	let (header, zip) = snapshot(&producer, Path::new(zip_dir));

	let name = consumer.txhashset().unwrap().name().to_owned();
	let roots = consumer.get_txhashset_roots().unwrap();
	let head = consumer.head().unwrap();
	let confirmed = consumer.confirmed_chain();

	for state in vec![
		SyncState::LoadingSnapshot,
		SyncState::Validating,
		SyncState::PersistingState,
		SyncState::ReconcilingChain,
	] {
		let err = consumer
			.txhashset_write(header.hash(), &zip, &NoStatus, &FailAt(state.clone()))
			.unwrap_err();
		assert_eq!(err.category(), ErrorCategory::Internal, "{}", state);

		assert_eq!(consumer.txhashset().unwrap().name(), name.as_str());
		assert_eq!(consumer.get_txhashset_roots().unwrap(), roots);
		assert_eq!(consumer.head().unwrap(), head);
		assert_eq!(*consumer.confirmed_chain(), *confirmed);
		assert_eq!(consumer.store().get_txhashset_name().unwrap(), Some(name.clone()));
		assert!(consumer.get_block_sums(&header.hash()).is_err());
		for out in &coinbases[3..] {
			assert!(consumer.store().get_output_pos_height(&out.commit()).is_err());
		}
		for out in &coinbases[..3] {
			assert!(consumer.store().get_output_pos_height(&out.commit()).is_ok());
		}
		assert_eq!(txhashset_dirs(consumer_dir), 1);
	}
	consumer.validate(false).unwrap();

	// the same snapshot goes through without the fault
	import(&consumer, header.hash(), &zip).unwrap();
	assert_eq!(consumer.head().unwrap().hash(), header.hash());
	for out in &coinbases {
		assert!(consumer.store().get_output_pos_height(&out.commit()).is_ok());
	}

	clean_output_dir(producer_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

#[test]
fn corrupt_archives() {
	let producer_dir = "target/tmp/sync_corrupt_producer";
	let consumer_dir = "target/tmp/sync_corrupt_consumer";
	let zip_dir = "target/tmp/sync_corrupt_zips";
	clean_output_dir(zip_dir);
	let producer = setup(producer_dir);
	let consumer = setup(consumer_dir);

	let (blocks, _) = mine_blocks(&producer, 3);
	consumer.process_headers(&headers(&blocks)).unwrap();
	let (header, zip) = snapshot(&producer, Path::new(zip_dir));

	// not even a zip
	let garbage = Path::new(zip_dir).join("garbage.zip");
	fs::write(&garbage, b"definitely not a zip archive").unwrap();
	let err = import(&consumer, header.hash(), &garbage).unwrap_err();
	assert!(matches!(err, Error::CorruptArchive(_)), "{:?}", err);

	// no kernel MMR
	let partial = Path::new(zip_dir).join("partial.zip");
	let files: Vec<PathBuf> = snapshot_files()
		.into_iter()
		.map(|(f, _)| f)
		.filter(|f| !f.starts_with("kernel"))
		.collect();
	let src = producer.txhashset().unwrap().path().to_path_buf();
	zip::create_zip(&File::create(&partial).unwrap(), &src, files).unwrap();
	let err = import(&consumer, header.hash(), &partial).unwrap_err();
	assert!(matches!(err, Error::CorruptArchive(_)), "{:?}", err);
	assert_eq!(err.category(), ErrorCategory::Structural);

	// a good archive, for the wrong header
	let err = import(&consumer, blocks[1].hash(), &zip).unwrap_err();
	assert!(matches!(err, Error::HeaderMismatch(_)), "{:?}", err);

	// for a header we never saw
	let unknown = Hash::from_vec(&[7; 32]);
	let err = import(&consumer, unknown, &zip).unwrap_err();
	assert_eq!(err.category(), ErrorCategory::Internal);

	assert_eq!(consumer.head().unwrap().height, 0);
	assert_eq!(txhashset_dirs(consumer_dir), 1);

	import(&consumer, header.hash(), &zip).unwrap();
	assert_eq!(consumer.head().unwrap().hash(), header.hash());

	clean_output_dir(producer_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

#[test]
fn fork_reconciliation() {
	let main_dir = "target/tmp/sync_fork_main";
	let fork_dir = "target/tmp/sync_fork_fork";
	let consumer_dir = "target/tmp/sync_fork_consumer";
	let zip_dir = "target/tmp/sync_fork_zips";
	clean_output_dir(zip_dir);

	let main: Chain = setup(main_dir);
	let (main_blocks, _) = mine_blocks(&main, 10);

	// shares 0 to 7 with main, then diverges up to 12
	let fork = setup(fork_dir);
	replay(&fork, &main_blocks[..7]);
	let (fork_blocks, _) = mine_blocks(&fork, 5);
	let (header, zip) = snapshot(&fork, Path::new(zip_dir));
	assert_eq!(header.height, 12);

	let consumer = setup(consumer_dir);
	replay(&consumer, &main_blocks);
	let before = consumer.confirmed_chain();
	assert_eq!(before.len(), 11);

	consumer.process_headers(&headers(&fork_blocks)).unwrap();
	let candidate = consumer.candidate_chain();
	assert_eq!(candidate.len(), 13);
	for height in 0..8 {
		assert_eq!(candidate.get_hash(height), before.get_hash(height));
	}
	assert_ne!(candidate.get_hash(8), before.get_hash(8));

	import(&consumer, header.hash(), &zip).unwrap();

	let confirmed = consumer.confirmed_chain();
	assert_eq!(confirmed.len(), 13);
	for height in 0..8 {
		assert_eq!(confirmed.get_hash(height), before.get_hash(height));
	}
	for height in 8..=12 {
		assert_eq!(confirmed.get_hash(height), candidate.get_hash(height));
	}
	assert_eq!(
		consumer.get_txhashset_roots().unwrap(),
		fork.get_txhashset_roots().unwrap()
	);

	drop(consumer);
	let consumer = init_chain(consumer_dir);
	assert_eq!(*consumer.confirmed_chain(), *confirmed);
	assert_eq!(consumer.head().unwrap().hash(), header.hash());
	consumer.validate(false).unwrap();

	clean_output_dir(main_dir);
	clean_output_dir(fork_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

/// What a rejected snapshot must leave as it was.
#[derive(Debug, PartialEq)]
struct Observed {
	name: String,
	stored_name: Option<String>,
	roots: TxHashSetRoots,
	head: Tip,
	confirmed: ChainIndex,
}

fn observe(chain: &Chain) -> Observed {
	Observed {
		name: chain.txhashset().unwrap().name().to_owned(),
		stored_name: chain.store().get_txhashset_name().unwrap(),
		roots: chain.get_txhashset_roots().unwrap(),
		head: chain.head().unwrap(),
		confirmed: (*chain.confirmed_chain()).clone(),
	}
}

/// Imports a snapshot expected to fail, checks the chain did not change
/// and returns the error.
fn rejected(chain: &Chain, chain_dir: &str, h: Hash, zip: &Path) -> Error {
	let before = observe(chain);
	let err = import(chain, h, zip).unwrap_err();
	assert_eq!(observe(chain), before);
	assert!(chain.get_block_sums(&h).is_err());
	assert_eq!(txhashset_dirs(chain_dir), 1);
	chain.validate(false).unwrap();
	err
}

/// Checks on every transition what readers of the chain get to see while
/// an import runs.
struct Observer<'a> {
	chain: &'a Chain,
	prior: String,
	head: Tip,
	target: Hash,
	fail_at: Option<SyncState>,
	seen: Mutex<Vec<SyncState>>,
}

impl<'a> SyncHooks for Observer<'a> {
	fn on_transition(&self, _from: &SyncState, to: &SyncState) -> Result<(), Error> {
		self.seen.lock().unwrap().push(to.clone());
		if *to == SyncState::Committed {
			assert_eq!(self.chain.head().unwrap().hash(), self.target);
			assert_ne!(self.chain.txhashset().unwrap().name(), self.prior.as_str());
			return Ok(());
		}
		match self.chain.txhashset() {
			Ok(ths) => assert_eq!(ths.name(), self.prior.as_str(), "{}", to),
			Err(Error::TxHashSetUnavailable) => {}
			Err(e) => panic!("unexpected {:?} entering {}", e, to),
		}
		assert_eq!(self.chain.head().unwrap(), self.head, "{}", to);
		assert!(self.chain.get_block_sums(&self.target).is_err(), "{}", to);
		assert_eq!(
			self.chain.store().get_txhashset_name().unwrap(),
			Some(self.prior.clone()),
			"{}",
			to
		);
		if self.fail_at.as_ref() == Some(to) {
			return Err(Error::Other(format!("injected fault entering {}", to)));
		}
		Ok(())
	}
}

#[test]
fn tampered_mmr_files() {
	let producer_dir = "target/tmp/sync_tampered_producer";
	let consumer_dir = "target/tmp/sync_tampered_consumer";
	let zip_dir = "target/tmp/sync_tampered_zips";
	clean_output_dir(zip_dir);
	fs::create_dir_all(zip_dir).unwrap();
	let producer = setup(producer_dir);
	let consumer = setup(consumer_dir);

	let (blocks, _) = mine_blocks(&producer, 3);
	consumer.process_headers(&headers(&blocks)).unwrap();
	let h = blocks[2].hash();
	let dest = Path::new(zip_dir);

	// reordered kernels: same sums, every signature still good
	let kernel_size = TxKernel::elmt_size().unwrap() as usize;
	let zip = tampered_snapshot(&producer, dest, "kernels", |dir| {
		swap_records(&dir.join("kernel").join(PMMR_DATA_FILE), kernel_size, 0, 1);
	});
	let err = rejected(&consumer, consumer_dir, h, &zip);
	match err {
		Error::InvalidMmr { ref mmr, .. } => assert_eq!(mmr, "kernel"),
		ref e => panic!("expected invalid kernel mmr, got {:?}", e),
	}
	assert_eq!(err.category(), ErrorCategory::Structural);
	assert!(err.is_bad_data());

	// outputs reordered along with their proofs
	let output_size = OutputIdentifier::elmt_size().unwrap() as usize;
	let rproof_size = RangeProof::elmt_size().unwrap() as usize;
	let zip = tampered_snapshot(&producer, dest, "outputs", |dir| {
		swap_records(&dir.join("output").join(PMMR_DATA_FILE), output_size, 0, 1);
		swap_records(&dir.join("rangeproof").join(PMMR_DATA_FILE), rproof_size, 0, 1);
	});
	match rejected(&consumer, consumer_dir, h, &zip) {
		Error::InvalidMmr { ref mmr, .. } => assert_eq!(mmr, "output"),
		ref e => panic!("expected invalid output mmr, got {:?}", e),
	}

	// parent of the first two kernels no longer matches them
	let zip = tampered_snapshot(&producer, dest, "parent", |dir| {
		let path = dir.join("kernel").join(PMMR_HASH_FILE);
		let mut data = fs::read(&path).unwrap();
		data[64] ^= 0xff;
		fs::write(&path, data).unwrap();
	});
	match rejected(&consumer, consumer_dir, h, &zip) {
		Error::InvalidMmr { ref mmr, ref msg } => {
			assert_eq!(mmr, "kernel");
			assert!(msg.contains("parent"), "{}", msg);
		}
		ref e => panic!("expected invalid kernel mmr, got {:?}", e),
	}

	// untouched files go through
	let zip = tampered_snapshot(&producer, dest, "intact", |_| {});
	import(&consumer, h, &zip).unwrap();
	assert_eq!(consumer.head().unwrap().hash(), h);

	clean_output_dir(producer_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

#[test]
fn size_mismatch() {
	let chain_dir = "target/tmp/sync_size_mismatch";
	let chain = setup(chain_dir);
	let (blocks, _) = mine_blocks(&chain, 3);

	let ths = chain.txhashset().unwrap();
	let candidate = chain.candidate_chain();
	let err = ths
		.validate(&blocks[1].header, &candidate, chain.genesis(), true, &NoStatus)
		.unwrap_err();
	match err {
		Error::SizeMismatch {
			ref mmr,
			height,
			expected,
			actual,
		} => {
			assert_eq!(mmr, "output");
			assert_eq!(height, 2);
			assert_eq!(expected, blocks[1].header.output_mmr_size);
			assert_eq!(actual, blocks[2].header.output_mmr_size);
		}
		ref e => panic!("expected size mismatch, got {:?}", e),
	}
	assert_eq!(err.category(), ErrorCategory::Structural);

	ths.validate(&blocks[2].header, &candidate, chain.genesis(), true, &NoStatus)
		.unwrap();

	clean_output_dir(chain_dir);
}

#[test]
fn invalid_proofs_and_signatures() {
	let proof_dir = "target/tmp/sync_invalid_proof_producer";
	let sig_dir = "target/tmp/sync_invalid_sig_producer";
	let consumer_dir = "target/tmp/sync_invalid_consumer";
	let zip_dir = "target/tmp/sync_invalid_zips";
	clean_output_dir(zip_dir);
	let producer = setup(proof_dir);
	let consumer = setup(consumer_dir);

	let (blocks, _) = mine_blocks(&producer, 2);
	let prev = producer.head_header().unwrap();
	consumer.process_headers(&headers(&blocks)).unwrap();

	// coinbase carrying the proof of another output
	let (cb, cb_kernel) = coinbase();
	let other = output(OutputFeatures::Plain, REWARD);
	let stolen = Output::new(OutputFeatures::Coinbase, cb.commit(), other.output.proof());
	let mut bad_proof = Block::new(
		&prev,
		vec![],
		vec![stolen],
		vec![cb_kernel],
		BlindingFactor::zero(),
	);
	let zip = force_block(&producer, &mut bad_proof, Path::new(zip_dir), "bad_proof");
	consumer.process_headers(&[bad_proof.header.clone()]).unwrap();
	let err = rejected(&consumer, consumer_dir, bad_proof.hash(), &zip);
	assert!(matches!(err, Error::InvalidRangeProof(_)), "{:?}", err);
	assert_eq!(err.category(), ErrorCategory::Accounting);

	// balanced coinbase, kernel signed by some other key
	let signer = setup(sig_dir);
	replay(&signer, &blocks);
	let (cb, mut cb_kernel) = coinbase();
	cb_kernel.excess_sig = kernel(KernelFeatures::Coinbase, &random_key()).excess_sig;
	let mut bad_sig = Block::new(
		&prev,
		vec![],
		vec![cb.output.clone()],
		vec![cb_kernel],
		BlindingFactor::zero(),
	);
	let zip = force_block(&signer, &mut bad_sig, Path::new(zip_dir), "bad_sig");
	consumer.process_headers(&[bad_sig.header.clone()]).unwrap();
	let err = rejected(&consumer, consumer_dir, bad_sig.hash(), &zip);
	assert!(matches!(err, Error::InvalidKernelSignature(_)), "{:?}", err);
	assert_eq!(err.category(), ErrorCategory::Accounting);
	assert!(consumer.store().get_output_pos_height(&cb.commit()).is_err());

	clean_output_dir(proof_dir);
	clean_output_dir(sig_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

#[test]
fn competing_chains() {
	let a_dir = "target/tmp/sync_competing_a";
	let b_dir = "target/tmp/sync_competing_b";
	let consumer_dir = "target/tmp/sync_competing_consumer";
	let zip_dir = Path::new("target/tmp/sync_competing_zips");
	clean_output_dir(zip_dir.to_str().unwrap());
	let a = setup(a_dir);
	let b = setup(b_dir);
	let consumer = setup(consumer_dir);

	let (a_blocks, _) = mine_blocks(&a, 3);
	let (b_blocks, _) = mine_blocks(&b, 3);
	let (a_header, a_zip) = snapshot(&a, &zip_dir.join("a"));
	let (_, b_zip) = snapshot(&b, &zip_dir.join("b"));
	consumer.process_headers(&headers(&a_blocks)).unwrap();

	// same sizes, other content
	let err = rejected(&consumer, consumer_dir, a_header.hash(), &b_zip);
	match err {
		Error::RootMismatch { ref mmr, height } => {
			assert_eq!(mmr, "output");
			assert_eq!(height, 3);
		}
		ref e => panic!("expected root mismatch, got {:?}", e),
	}
	assert_eq!(err.category(), ErrorCategory::Structural);

	// the candidate chain moves over to b before a's snapshot comes in
	consumer.process_headers(&headers(&b_blocks)).unwrap();
	assert_eq!(consumer.candidate_chain().get_hash(3), Some(b_blocks[2].hash()));
	let err = rejected(&consumer, consumer_dir, a_header.hash(), &a_zip);
	assert!(matches!(err, Error::CandidateMoved(3)), "{:?}", err);
	assert_eq!(err.category(), ErrorCategory::Consistency);
	assert!(err.is_retryable());

	// and back to a, the retry goes through
	consumer.process_headers(&headers(&a_blocks)).unwrap();
	import(&consumer, a_header.hash(), &a_zip).unwrap();
	assert_eq!(consumer.head().unwrap().hash(), a_header.hash());

	clean_output_dir(a_dir);
	clean_output_dir(b_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir.to_str().unwrap());
}

#[test]
fn readers_during_import() {
	let producer_dir = "target/tmp/sync_readers_producer";
	let consumer_dir = "target/tmp/sync_readers_consumer";
	let zip_dir = "target/tmp/sync_readers_zips";
	clean_output_dir(zip_dir);
	let producer = setup(producer_dir);
	let consumer = setup(consumer_dir);

	let (blocks, _) = mine_blocks(&producer, 5);
	replay(&consumer, &blocks[..2]);
	consumer.process_headers(&headers(&blocks[2..])).unwrap();
	let (header, zip) = snapshot(&producer, Path::new(zip_dir));

	let observer = |fail_at: Option<SyncState>| Observer {
		chain: &consumer,
		prior: consumer.txhashset().unwrap().name().to_owned(),
		head: consumer.head().unwrap(),
		target: header.hash(),
		fail_at,
		seen: Mutex::new(vec![]),
	};

	// failing after the new set was persisted, readers never saw it
	let failing = observer(Some(SyncState::ReconcilingChain));
	consumer
		.txhashset_write(header.hash(), &zip, &NoStatus, &failing)
		.unwrap_err();
	let seen = failing.seen.lock().unwrap().clone();
	assert_eq!(seen.len(), 6);
	assert!(matches!(seen.last(), Some(SyncState::Failed(_))), "{:?}", seen);

	let passing = observer(None);
	consumer
		.txhashset_write(header.hash(), &zip, &NoStatus, &passing)
		.unwrap();
	let seen = passing.seen.lock().unwrap().clone();
	assert_eq!(seen.len(), 6);
	assert_eq!(seen.last(), Some(&SyncState::Committed));

	clean_output_dir(producer_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

#[test]
fn held_txhashset_outlives_import() {
	let producer_dir = "target/tmp/sync_held_producer";
	let consumer_dir = "target/tmp/sync_held_consumer";
	let zip_dir = "target/tmp/sync_held_zips";
	clean_output_dir(zip_dir);
	let producer = setup(producer_dir);
	let consumer = setup(consumer_dir);

	let (blocks, _) = mine_blocks(&producer, 4);
	replay(&consumer, &blocks[..2]);
	consumer.process_headers(&headers(&blocks[2..])).unwrap();
	let (header, zip) = snapshot(&producer, Path::new(zip_dir));

	let held = consumer.txhashset().unwrap();
	let roots = held.roots().unwrap();
	let (entries, examined, total) = held.outputs_by_leaf_index(0, 100);
	assert_eq!(entries.len(), 2);

	import(&consumer, header.hash(), &zip).unwrap();
	assert_ne!(consumer.txhashset().unwrap().name(), held.name());
	assert_eq!(txhashset_dirs(consumer_dir), 1);

	// the replaced set still reads as it did
	assert_eq!(held.roots().unwrap(), roots);
	let (after, examined_after, total_after) = held.outputs_by_leaf_index(0, 100);
	assert_eq!((examined_after, total_after), (examined, total));
	let positions: Vec<u64> = entries.iter().map(|e| e.pos0).collect();
	let positions_after: Vec<u64> = after.iter().map(|e| e.pos0).collect();
	assert_eq!(positions_after, positions);
	drop(held);

	assert_eq!(
		consumer.get_txhashset_roots().unwrap(),
		producer.get_txhashset_roots().unwrap()
	);

	clean_output_dir(producer_dir);
	clean_output_dir(consumer_dir);
	clean_output_dir(zip_dir);
}

#[test]
fn single_live_txhashset() {
	let dir = "target/tmp/sync_single_live";
	clean_output_dir(dir);
	util::init_test_logger();
	let manager = TxHashSetManager::new(dir).unwrap();
	assert!(matches!(manager.read(), Err(Error::TxHashSetUnavailable)));

	let first = manager.create(&Hash::from_vec(&[1; 32])).unwrap();
	let first_name = first.name().to_owned();
	manager.set_txhashset(first).unwrap();
	assert!(manager.is_open());

	let second = manager.create(&Hash::from_vec(&[2; 32])).unwrap();
	let err = manager.set_txhashset(second).unwrap_err();
	assert!(matches!(err, Error::TxHashSetStillOpen), "{:?}", err);
	assert_eq!(manager.read().unwrap().name(), first_name.as_str());

	assert_eq!(manager.close(), Some(first_name));
	assert!(!manager.is_open());
	assert!(matches!(manager.read(), Err(Error::TxHashSetUnavailable)));
	assert_eq!(manager.close(), None);

	clean_output_dir(dir);
}

#[test]
fn error_categories() {
	assert_eq!(
		Error::HeaderMismatch("sizes".to_owned()).category(),
		ErrorCategory::Structural
	);
	assert_eq!(Error::InvalidKernelSignature(3).category(), ErrorCategory::Accounting);
	assert!(Error::CandidateMoved(4).is_retryable());
	assert_eq!(Error::NoCommonAncestor.category(), ErrorCategory::Consistency);
	assert!(!Error::NoCommonAncestor.is_retryable());
	assert_eq!(
		Error::TxHashSetUnavailable.category(),
		ErrorCategory::ResourceUnavailable
	);
	assert!(!Error::TxHashSetUnavailable.is_retryable());
}
