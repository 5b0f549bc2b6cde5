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

//! Test chain builder: real keys, commitments, bulletproofs and kernel
//! signatures, assembled into blocks on top of a chain.

#![allow(dead_code)]

use mwsync_chain::txhashset::snapshot_files;
use mwsync_chain::types::NoStatus;
use mwsync_chain::{Chain, NoHooks};
use mwsync_core::consensus::REWARD;
use mwsync_core::core::hash::{Hash, Hashed};
use mwsync_core::core::{
	kernel_sig_msg, BlindingFactor, Block, BlockHeader, Input, KernelFeatures, Output,
	OutputFeatures, TxKernel,
};
use mwsync_core::genesis;
use mwsync_core::global::{self, ChainTypes};
use mwsync_util as util;
use mwsync_util::secp::key::{PublicKey, SecretKey};
use mwsync_util::secp::pedersen::Commitment;
use mwsync_util::secp::{aggsig, Message, Signature};
use mwsync_util::static_secp_instance;
use mwsync_util::zip;
use rand::{thread_rng, Rng};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// An output along with what it takes to spend it.
#[derive(Clone)]
pub struct Keyed {
	pub output: Output,
	pub key: SecretKey,
	pub value: u64,
}

impl Keyed {
	pub fn commit(&self) -> Commitment {
		self.output.commitment()
	}

	pub fn input(&self) -> Input {
		Input::new(self.output.features(), self.output.commitment())
	}
}

pub fn clean_output_dir(dir_name: &str) {
	let _ = fs::remove_dir_all(dir_name);
}

/// Fresh chain on the dev genesis, under automated testing parameters.
pub fn setup(dir_name: &str) -> Chain {
	util::init_test_logger();
	global::set_chain_type(ChainTypes::AutomatedTesting);
	clean_output_dir(dir_name);
	init_chain(dir_name)
}

/// Opens (or reopens) the chain in the provided dir.
pub fn init_chain(dir_name: &str) -> Chain {
	Chain::init(dir_name.to_string(), genesis::genesis_dev(), false).unwrap()
}

pub fn random_key() -> SecretKey {
	let secp = static_secp_instance();
	let secp = secp.lock();
	loop {
		let bytes: [u8; 32] = thread_rng().gen();
		if let Ok(key) = SecretKey::from_slice(&secp, &bytes) {
			return key;
		}
	}
}

pub fn commit(value: u64, key: &SecretKey) -> Commitment {
	let secp = static_secp_instance();
	let secp = secp.lock();
	secp.commit(value, key.clone()).unwrap()
}

/// Sum of the positive keys minus the negative ones.
pub fn blind_sum(positive: Vec<SecretKey>, negative: Vec<SecretKey>) -> SecretKey {
	let secp = static_secp_instance();
	let secp = secp.lock();
	secp.blind_sum(positive, negative).unwrap()
}

pub fn sign(msg: &Message, key: &SecretKey) -> Signature {
	let secp = static_secp_instance();
	let secp = secp.lock();
	let pubkey = PublicKey::from_secret_key(&secp, key).unwrap();
	aggsig::sign_single(&secp, msg, key, None, None, None, Some(&pubkey), None).unwrap()
}

/// Output of the provided value, with a valid bulletproof.
pub fn output(features: OutputFeatures, value: u64) -> Keyed {
	output_with_key(features, value, random_key())
}

/// Output of the provided value blinded with the provided key.
pub fn output_with_key(features: OutputFeatures, value: u64, key: SecretKey) -> Keyed {
	let proof = {
		let secp = static_secp_instance();
		let secp = secp.lock();
		secp.bullet_proof(value, key.clone(), random_key(), random_key(), None, None)
	};
	Keyed {
		output: Output::new(features, commit(value, &key), proof),
		key,
		value,
	}
}

/// Kernel with the provided excess key, signed.
pub fn kernel(features: KernelFeatures, excess_key: &SecretKey) -> TxKernel {
	let msg = kernel_sig_msg(features, 0, 0).unwrap();
	TxKernel {
		features,
		fee: 0,
		lock_height: 0,
		excess: commit(0, excess_key),
		excess_sig: sign(&msg, excess_key),
	}
}

pub fn coinbase() -> (Keyed, TxKernel) {
	let out = output(OutputFeatures::Coinbase, REWARD);
	let kern = kernel(KernelFeatures::Coinbase, &out.key);
	(out, kern)
}

/// Transaction spending `spend` into `n_outputs` plain outputs, zero fee.
/// Without anything to spend the outputs are all worth 0.
pub fn transaction(spend: &[Keyed], n_outputs: usize) -> (Vec<Input>, Vec<Keyed>, TxKernel) {
	let total: u64 = spend.iter().map(|x| x.value).sum();
	let n = n_outputs.max(1) as u64;
	let outputs: Vec<Keyed> = (0..n)
		.map(|i| {
			let value = if i == n - 1 {
				total - (total / n) * (n - 1)
			} else {
				total / n
			};
			output(OutputFeatures::Plain, value)
		})
		.collect();
	let excess_key = blind_sum(
		outputs.iter().map(|x| x.key.clone()).collect(),
		spend.iter().map(|x| x.key.clone()).collect(),
	);
	let inputs = spend.iter().map(|x| x.input()).collect();
	(inputs, outputs, kernel(KernelFeatures::Plain, &excess_key))
}

/// Next block on top of `prev`: a fresh coinbase plus, when asked for, a
/// transaction spending `spend` into `n_outputs` outputs. Roots and sizes
/// are not set. Returns the block and its new outputs (coinbase first).
pub fn build_block(prev: &BlockHeader, spend: &[Keyed], n_outputs: usize) -> (Block, Vec<Keyed>) {
	let (cb, cb_kernel) = coinbase();
	let mut new_outputs = vec![cb];
	let mut inputs = vec![];
	let mut kernels = vec![cb_kernel];
	if !spend.is_empty() || n_outputs > 0 {
		let (tx_inputs, tx_outputs, tx_kernel) = transaction(spend, n_outputs);
		inputs = tx_inputs;
		new_outputs.extend(tx_outputs);
		kernels.push(tx_kernel);
	}
	let outputs = new_outputs.iter().map(|x| x.output.clone()).collect();
	let block = Block::new(prev, inputs, outputs, kernels, BlindingFactor::zero());
	(block, new_outputs)
}

/// Builds the next block on the chain head, sets its roots and processes
/// it (header first, then the full block).
pub fn add_block(chain: &Chain, spend: &[Keyed], n_outputs: usize) -> (Block, Vec<Keyed>) {
	let prev = chain.head_header().unwrap();
	let (mut block, outputs) = build_block(&prev, spend, n_outputs);
	chain.set_txhashset_roots(&mut block).unwrap();
	chain.process_headers(&[block.header.clone()]).unwrap();
	chain.process_block(&block).unwrap();
	(block, outputs)
}

/// Mines `n` coinbase only blocks on top of the chain head. Returns the
/// blocks and their coinbase outputs.
pub fn mine_blocks(chain: &Chain, n: u64) -> (Vec<Block>, Vec<Keyed>) {
	let mut blocks = vec![];
	let mut coinbases = vec![];
	for _ in 0..n {
		let (block, mut outputs) = add_block(chain, &[], 0);
		blocks.push(block);
		coinbases.append(&mut outputs);
	}
	(blocks, coinbases)
}

/// Replays already built blocks on another chain.
pub fn replay(chain: &Chain, blocks: &[Block]) {
	for b in blocks {
		chain.process_headers(&[b.header.clone()]).unwrap();
		chain.process_block(b).unwrap();
	}
}

/// Headers of the blocks.
pub fn headers(blocks: &[Block]) -> Vec<BlockHeader> {
	blocks.iter().map(|b| b.header.clone()).collect()
}

/// Snapshot of the producer's live txhashset, copied out of its db root so
/// it outlives it.
pub fn snapshot(producer: &Chain, dest: &Path) -> (BlockHeader, PathBuf) {
	let (header, path) = producer.txhashset_read().unwrap();
	fs::create_dir_all(dest).unwrap();
	let zip = dest.join(format!("snapshot_{}.zip", header.height));
	fs::copy(&path, &zip).unwrap();
	(header, zip)
}

/// Imports a snapshot, no hooks, no status.
pub fn import(chain: &Chain, h: Hash, zip: &Path) -> Result<(), mwsync_chain::Error> {
	chain.txhashset_write(h, zip, &NoStatus, &NoHooks).map(|_| ())
}

/// Hash of the header on the confirmed chain at the provided height.
pub fn confirmed_hash(chain: &Chain, height: u64) -> Hash {
	chain.get_header_by_height(height).unwrap().hash()
}

/// Snapshot of the producer's live txhashset, with its files altered by
/// `tamper` (called with the directory holding them) before zipping.
pub fn tampered_snapshot<F>(producer: &Chain, dest: &Path, name: &str, tamper: F) -> PathBuf
where
	F: FnOnce(&Path),
{
	let src = producer.txhashset().unwrap().path().to_path_buf();
	let work = dest.join(format!("{}_files", name));
	let _ = fs::remove_dir_all(&work);
	let files: Vec<PathBuf> = snapshot_files()
		.into_iter()
		.map(|(f, _)| f)
		.filter(|f| src.join(f).exists())
		.collect();
	for f in &files {
		let to = work.join(f);
		fs::create_dir_all(to.parent().unwrap()).unwrap();
		fs::copy(src.join(f), to).unwrap();
	}
	tamper(&work);

	let zip_path = dest.join(format!("{}.zip", name));
	zip::create_zip(&File::create(&zip_path).unwrap(), &work, files).unwrap();
	zip_path
}

/// Swaps records `a` and `b` of a file made of `size` bytes records.
pub fn swap_records(path: &Path, size: usize, a: usize, b: usize) {
	let mut data = fs::read(path).unwrap();
	let (lo, hi) = (a.min(b), a.max(b));
	let (head, tail) = data.split_at_mut(hi * size);
	head[lo * size..(lo + 1) * size].swap_with_slice(&mut tail[..size]);
	fs::write(path, data).unwrap();
}

/// Sets the roots of `block` and applies it to the producer's live
/// txhashset without any block check, leaving its chain as it was. Returns
/// a snapshot of the resulting txhashset.
pub fn force_block(producer: &Chain, block: &mut Block, dest: &Path, name: &str) -> PathBuf {
	producer.set_txhashset_roots(block).unwrap();
	let ths = producer.txhashset().unwrap();
	{
		let store = producer.store();
		let mut batch = store.batch().unwrap();
		let block: &Block = block;
		ths.extending(&mut batch, |ext| {
			ext.apply_block(block)?;
			Ok(())
		})
		.unwrap();
	}
	fs::create_dir_all(dest).unwrap();
	let zip_path = dest.join(format!("{}.zip", name));
	ths.zip_write(&zip_path).unwrap();
	zip_path
}
