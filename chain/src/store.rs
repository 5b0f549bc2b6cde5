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

//! Implements storage primitives required by the chain

use crate::chain_view::{ChainIndex, ChainType};
use crate::core::core::hash::{Hash, Hashed};
use crate::core::core::{BlockHeader, BlockSums};
use crate::core::ser;
use crate::types::CommitPos;
use crate::util::secp::pedersen::Commitment;
use crate::util::RwLock;
use byteorder::{BigEndian, ByteOrder};
use croaring::Bitmap;
use lru_cache::LruCache;
use mwsync_store as store;
use mwsync_store::{option_to_not_found, prefix_key, to_key, u64_to_key, Error};
use std::sync::Arc;

const STORE_SUBPATH: &str = "chain";

const BLOCK_HEADER_PREFIX: u8 = b'h';
const BLOCK_SUMS_PREFIX: u8 = b'M';
const OUTPUT_POS_PREFIX: u8 = b'p';
const BLOCK_SPENT_PREFIX: u8 = b'B';
const TXHASHSET_NAME_PREFIX: u8 = b'T';

/// All chain-related database operations
pub struct ChainStore {
	db: store::Store,
	header_cache: Arc<RwLock<LruCache<Hash, BlockHeader>>>,
}

impl ChainStore {
	/// Create new chain store
	pub fn new(db_root: &str) -> Result<ChainStore, Error> {
		let db = store::Store::open(db_root, STORE_SUBPATH)?;
		Ok(ChainStore {
			db,
			header_cache: Arc::new(RwLock::new(LruCache::new(1_000))),
		})
	}

	/// Builds a new batch to be used with this store.
	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			db: self.db.batch()?,
			header_cache: self.header_cache.clone(),
		})
	}
}

#[allow(missing_docs)]
impl ChainStore {
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		{
			let mut header_cache = self.header_cache.write();

			// cache hit - return the value from the cache
			if let Some(header) = header_cache.get_mut(h) {
				return Ok(header.clone());
			}
		}

		let header: BlockHeader = option_to_not_found(
			self.db.get_ser(&to_key(BLOCK_HEADER_PREFIX, h)),
			|| format!("BLOCK HEADER: {}", h),
		)?;

		// cache miss - so adding to the cache for next time
		self.header_cache.write().insert(*h, header.clone());
		Ok(header)
	}

	pub fn get_block_sums(&self, h: &Hash) -> Result<BlockSums, Error> {
		option_to_not_found(self.db.get_ser(&to_key(BLOCK_SUMS_PREFIX, h)), || {
			format!("Block sums for block: {}", h)
		})
	}

	pub fn get_output_pos_height(&self, commit: &Commitment) -> Result<CommitPos, Error> {
		option_to_not_found(
			self.db.get_ser(&to_key(OUTPUT_POS_PREFIX, &commit.0[..])),
			|| format!("Output position for: {:?}", commit),
		)
	}

	pub fn get_spent_bitmap(&self, h: &Hash) -> Result<Bitmap, Error> {
		option_to_not_found(
			self.db
				.get_with(&to_key(BLOCK_SPENT_PREFIX, h), |_, data| {
					Ok(Bitmap::deserialize(data))
				}),
			|| format!("Spent bitmap for block: {}", h),
		)
	}

	/// Name of the live txhashset directory, if one was ever recorded.
	pub fn get_txhashset_name(&self) -> Result<Option<String>, Error> {
		self.db.get_with(&[TXHASHSET_NAME_PREFIX], |_, data| {
			String::from_utf8(data.to_vec()).map_err(|e| Error::OtherErr(e.to_string()))
		})
	}

	/// Loads the persisted entries of a chain view. Entries have to be
	/// contiguous from genesis.
	pub fn load_chain(&self, chain_type: ChainType) -> Result<ChainIndex, Error> {
		let iter = self.db.iter(&prefix_key(chain_type.prefix()), |k, mut v| {
			if k.len() != 10 {
				return Err(Error::OtherErr(format!("bad chain key {:?}", k)));
			}
			let height = BigEndian::read_u64(&k[2..]);
			let hash: Hash = ser::deserialize(&mut v)?;
			Ok((height, hash))
		})?;

		let mut chain = ChainIndex::new(chain_type);
		for entry in iter {
			let (height, hash) = entry?;
			chain.add_block(hash, height).map_err(|e| {
				Error::OtherErr(format!("{:?} chain entries not contiguous: {}", chain_type, e))
			})?;
		}
		Ok(chain)
	}
}

/// An atomic batch in which all changes can be committed all at once or
/// discarded on error.
pub struct Batch<'a> {
	db: store::Batch<'a>,
	header_cache: Arc<RwLock<LruCache<Hash, BlockHeader>>>,
}

#[allow(missing_docs)]
impl<'a> Batch<'a> {
	pub fn get_block_header(&self, h: &Hash) -> Result<BlockHeader, Error> {
		if let Some(header) = self.header_cache.write().get_mut(h) {
			return Ok(header.clone());
		}
		option_to_not_found(
			self.db.get_ser(&to_key(BLOCK_HEADER_PREFIX, h)),
			|| format!("BLOCK HEADER: {}", h),
		)
	}

	/// Not cached here, the header only reaches the cache once read back
	/// after commit.
	pub fn save_block_header(&self, header: &BlockHeader) -> Result<(), Error> {
		let hash = header.hash();
		self.db.put_ser(&to_key(BLOCK_HEADER_PREFIX, hash), header)?;
		Ok(())
	}

	pub fn save_block_sums(&self, h: &Hash, sums: &BlockSums) -> Result<(), Error> {
		self.db.put_ser(&to_key(BLOCK_SUMS_PREFIX, h), sums)
	}

	pub fn get_block_sums(&self, h: &Hash) -> Result<BlockSums, Error> {
		option_to_not_found(self.db.get_ser(&to_key(BLOCK_SUMS_PREFIX, h)), || {
			format!("Block sums for block: {}", h)
		})
	}

	pub fn save_output_pos_height(&self, commit: &Commitment, pos: CommitPos) -> Result<(), Error> {
		self.db
			.put_ser(&to_key(OUTPUT_POS_PREFIX, &commit.0[..]), &pos)
	}

	pub fn get_output_pos_height(&self, commit: &Commitment) -> Result<CommitPos, Error> {
		option_to_not_found(
			self.db.get_ser(&to_key(OUTPUT_POS_PREFIX, &commit.0[..])),
			|| format!("Output position for: {:?}", commit),
		)
	}

	pub fn delete_output_pos_height(&self, commit: &Commitment) -> Result<(), Error> {
		self.db.delete(&to_key(OUTPUT_POS_PREFIX, &commit.0[..]))
	}

	/// Deletes all (committed) entries of the output position index.
	pub fn clear_output_pos_height(&self) -> Result<(), Error> {
		let keys: Vec<Vec<u8>> = self
			.db
			.iter(&prefix_key(OUTPUT_POS_PREFIX), |k, _| Ok(k.to_vec()))?
			.collect::<Result<_, _>>()?;
		for key in keys {
			self.db.delete(&key)?;
		}
		Ok(())
	}

	pub fn save_spent_bitmap(&self, h: &Hash, bitmap: &Bitmap) -> Result<(), Error> {
		self.db
			.put(&to_key(BLOCK_SPENT_PREFIX, h), &bitmap.serialize())
	}

	pub fn get_spent_bitmap(&self, h: &Hash) -> Result<Bitmap, Error> {
		option_to_not_found(
			self.db
				.get_with(&to_key(BLOCK_SPENT_PREFIX, h), |_, data| {
					Ok(Bitmap::deserialize(data))
				}),
			|| format!("Spent bitmap for block: {}", h),
		)
	}

	pub fn save_chain_entry(&self, prefix: u8, height: u64, h: &Hash) -> Result<(), Error> {
		self.db.put_ser(&u64_to_key(prefix, height), h)
	}

	pub fn delete_chain_entry(&self, prefix: u8, height: u64) -> Result<(), Error> {
		self.db.delete(&u64_to_key(prefix, height))
	}

	/// Records the name of the live txhashset directory.
	pub fn save_txhashset_name(&self, name: &str) -> Result<(), Error> {
		self.db.put(&[TXHASHSET_NAME_PREFIX], name.as_bytes())
	}

	pub fn get_txhashset_name(&self) -> Result<Option<String>, Error> {
		self.db.get_with(&[TXHASHSET_NAME_PREFIX], |_, data| {
			String::from_utf8(data.to_vec()).map_err(|e| Error::OtherErr(e.to_string()))
		})
	}

	/// Commits this batch. If it's a child batch, it will be merged with the
	/// parent, otherwise the batch is written to db.
	pub fn commit(self) -> Result<(), Error> {
		self.db.commit()
	}

	/// Creates a child of this batch. It will be merged with its parent on
	/// commit, abandoned otherwise.
	pub fn child(&mut self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			db: self.db.child()?,
			header_cache: self.header_cache.clone(),
		})
	}
}
