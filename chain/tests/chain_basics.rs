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

use self::chain::{Error, ErrorCategory};
use self::core::core::hash::{Hashed, ZERO_HASH};
use self::core::core::{BlockHeader, KernelFeatures};
use crate::common::{
	add_block, build_block, clean_output_dir, init_chain, kernel, mine_blocks, random_key, replay,
	setup,
};
use chrono::Duration;
use mwsync_chain as chain;
use mwsync_core as core;

/// Headers only chain of `n` headers on top of `prev`. The tag keeps
/// competing chains apart.
fn header_chain(prev: &BlockHeader, n: usize, tag: u64) -> Vec<BlockHeader> {
	let mut res = vec![];
	let mut prev = prev.clone();
	for _ in 0..n {
		let header = BlockHeader {
			height: prev.height + 1,
			prev_hash: prev.hash(),
			timestamp: prev.timestamp + Duration::seconds(60),
			kernel_mmr_size: tag,
			..Default::default()
		};
		res.push(header.clone());
		prev = header;
	}
	res
}

#[test]
fn init_and_reopen() {
	let chain_dir = "target/tmp/chain_init_reopen";
	let chain = setup(chain_dir);
	assert_eq!(chain.head().unwrap().height, 0);
	assert_eq!(chain.header_head().unwrap().height, 0);
	assert_eq!(chain.validate(false).unwrap(), Default::default());

	let (blocks, _) = mine_blocks(&chain, 3);
	let roots = chain.get_txhashset_roots().unwrap();
	let name = chain.txhashset().unwrap().name().to_owned();
	let sums = chain.validate(false).unwrap();
	drop(chain);

	let chain = init_chain(chain_dir);
	let head = chain.head().unwrap();
	assert_eq!(head.height, 3);
	assert_eq!(head.hash(), blocks[2].hash());
	assert_eq!(chain.header_head().unwrap(), head);
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);
	assert_eq!(chain.txhashset().unwrap().name(), name);
	assert_eq!(chain.validate(false).unwrap(), sums);
	assert_eq!(chain.get_block_sums(&head.hash()).unwrap(), sums);

	clean_output_dir(chain_dir);
}

#[test]
fn spend_outputs() {
	let chain_dir = "target/tmp/chain_spend_outputs";
	let chain = setup(chain_dir);
	let (_, coinbases) = mine_blocks(&chain, 2);

	let (block, outputs) = add_block(&chain, &coinbases[0..1], 2);
	assert_eq!(outputs.len(), 3);

	// spent output leaves the index, the new ones get the block height
	let store = chain.store();
	assert!(store.get_output_pos_height(&coinbases[0].commit()).is_err());
	for out in &outputs {
		let pos = store.get_output_pos_height(&out.commit()).unwrap();
		assert_eq!(pos.height, 3);
	}
	let spent = store.get_spent_bitmap(&block.hash()).unwrap();
	assert_eq!(spent.cardinality(), 1);
	assert!(spent.contains(0));

	// spending it again is refused before anything gets applied
	let prev = chain.head_header().unwrap();
	let roots = chain.get_txhashset_roots().unwrap();
	let (mut again, _) = build_block(&prev, &coinbases[0..1], 1);
	match chain.set_txhashset_roots(&mut again) {
		Err(Error::AlreadySpent(commit)) => assert_eq!(commit, coinbases[0].commit()),
		other => panic!("expected already spent, got {:?}", other.map(|_| ())),
	}
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);
	assert_eq!(chain.head().unwrap().hash(), block.hash());

	chain.validate(false).unwrap();
	clean_output_dir(chain_dir);
}

#[test]
fn reject_bad_blocks() {
	let chain_dir = "target/tmp/chain_reject_bad_blocks";
	let chain = setup(chain_dir);
	mine_blocks(&chain, 1);
	let prev = chain.head_header().unwrap();
	let roots = chain.get_txhashset_roots().unwrap();

	// not building on the head
	let genesis = chain.get_header_by_height(0).unwrap();
	let (orphan, _) = build_block(&genesis, &[], 0);
	match chain.process_block(&orphan) {
		Err(Error::Unfit(_)) => {}
		other => panic!("expected unfit, got {:?}", other),
	}

	// roots not matching what the txhashset ends up with
	let (mut block, _) = build_block(&prev, &[], 0);
	chain.set_txhashset_roots(&mut block).unwrap();
	block.header.output_root = ZERO_HASH;
	let err = chain.process_block(&block).unwrap_err();
	match err {
		Error::RootMismatch { ref mmr, height } => {
			assert_eq!(mmr, "output");
			assert_eq!(height, 2);
		}
		ref e => panic!("expected root mismatch, got {:?}", e),
	}
	assert_eq!(err.category(), ErrorCategory::Structural);
	assert!(err.is_bad_data());
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);

	// coinbase output and kernel with unrelated keys
	let (mut block, _) = build_block(&prev, &[], 0);
	block.kernels[0] = kernel(KernelFeatures::Coinbase, &random_key());
	chain.set_txhashset_roots(&mut block).unwrap();
	match chain.process_block(&block) {
		Err(Error::Committed(_)) => {}
		other => panic!("expected sum failure, got {:?}", other),
	}

	assert_eq!(chain.head().unwrap().height, 1);
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);

	// a valid block still goes through
	let (mut block, _) = build_block(&prev, &[], 0);
	chain.set_txhashset_roots(&mut block).unwrap();
	let tip = chain.process_block(&block).unwrap();
	assert_eq!(tip.hash(), block.hash());
	assert_eq!(chain.header_head().unwrap(), tip);

	chain.validate(false).unwrap();
	clean_output_dir(chain_dir);
}

#[test]
fn fork_block_roots() {
	let chain_dir = "target/tmp/chain_fork_block_roots";
	let other_dir = "target/tmp/chain_fork_block_roots_other";
	let chain = setup(chain_dir);
	let (blocks, coinbases) = mine_blocks(&chain, 2);
	let (spending, _) = add_block(&chain, &coinbases[0..1], 1);
	let roots = chain.get_txhashset_roots().unwrap();

	// competing block 3, spending the same coinbase differently
	let (mut fork, fork_outputs) = build_block(&blocks[1].header, &coinbases[0..1], 2);
	chain.set_txhashset_roots(&mut fork).unwrap();

	// the live set and the position index are untouched
	assert_eq!(chain.get_txhashset_roots().unwrap(), roots);
	assert_eq!(chain.head().unwrap().hash(), spending.hash());
	assert!(chain.store().get_output_pos_height(&coinbases[0].commit()).is_err());
	assert!(chain.store().get_output_pos_height(&fork_outputs[1].commit()).is_err());
	chain.validate(false).unwrap();

	// a chain that never saw block 3 accepts the fork as is
	let other = setup(other_dir);
	replay(&other, &blocks);
	other.process_headers(&[fork.header.clone()]).unwrap();
	let tip = other.process_block(&fork).unwrap();
	assert_eq!(tip.hash(), fork.hash());
	other.validate(false).unwrap();

	// parent off the confirmed chain
	let (mut orphan, _) = build_block(&fork.header, &[], 0);
	match chain.set_txhashset_roots(&mut orphan) {
		Err(Error::Unfit(_)) => {}
		res => panic!("expected unfit, got {:?}", res),
	}

	clean_output_dir(chain_dir);
	clean_output_dir(other_dir);
}

#[test]
fn header_reorg() {
	let chain_dir = "target/tmp/chain_header_reorg";
	let chain = setup(chain_dir);
	let genesis = chain.head_header().unwrap();

	let a = header_chain(&genesis, 3, 1);
	let b = header_chain(&a[0], 4, 2);

	let tip = chain.process_headers(&a).unwrap();
	assert_eq!(tip.height, 3);
	assert_eq!(tip.hash(), a[2].hash());

	// b forks off after a[0] and is longer
	let tip = chain.process_headers(&b).unwrap();
	assert_eq!(tip.height, 5);
	let candidate = chain.candidate_chain();
	assert_eq!(candidate.len(), 6);
	assert_eq!(candidate.get_hash(1), Some(a[0].hash()));
	assert_eq!(candidate.get_hash(2), Some(b[0].hash()));
	assert_eq!(candidate.get_hash(5), Some(b[3].hash()));

	// the confirmed chain only moves with full blocks
	assert_eq!(chain.head().unwrap().height, 0);

	// known headers are fine, orphans aren't
	chain.process_headers(&b[1..2]).unwrap();
	let orphan = header_chain(&a[2], 1, 1);
	match chain.process_headers(&orphan) {
		Err(Error::Unfit(_)) => {}
		other => panic!("expected unfit, got {:?}", other),
	}
	assert_eq!(chain.header_head().unwrap().hash(), b[3].hash());

	drop(chain);
	let chain = init_chain(chain_dir);
	assert_eq!(*chain.candidate_chain(), *candidate);
	assert_eq!(chain.header_head().unwrap().hash(), b[3].hash());

	clean_output_dir(chain_dir);
}

#[test]
fn merkle_proof_of_unspent_output() {
	let chain_dir = "target/tmp/chain_merkle_proof";
	let chain = setup(chain_dir);
	let (_, coinbases) = mine_blocks(&chain, 3);

	let header = chain.head_header().unwrap();
	let out = &coinbases[1];
	let pos = chain.store().get_output_pos_height(&out.commit()).unwrap();
	let proof = chain.get_merkle_proof(&out.commit()).unwrap();
	assert!(proof
		.verify(header.output_root, &out.output.identifier(), pos.pos0)
		.is_ok());

	// once spent there's nothing left to prove
	add_block(&chain, &coinbases[1..2], 1);
	match chain.get_merkle_proof(&out.commit()) {
		Err(Error::OutputNotFound) => {}
		other => panic!("expected output not found, got {:?}", other),
	}

	clean_output_dir(chain_dir);
}
