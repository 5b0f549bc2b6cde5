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

//! Key/value storage of serialized core types in a single LMDB database.
//! Reads each get their own short read transaction, writes go through a
//! `Batch` and only become visible to readers once committed.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use lmdb_zero as lmdb;
use lmdb_zero::traits::CreateCursor;
use lmdb_zero::LmdbResultExt;

use crate::core::ser;

/// Upper bound of the memory map. Pages are only backed by disk once
/// written so a generous bound costs nothing until used.
#[cfg(target_pointer_width = "64")]
const MAP_SIZE: usize = 64 << 30;
#[cfg(not(target_pointer_width = "64"))]
const MAP_SIZE: usize = 1 << 30;

const DB_NAME: &str = "lmdb";

/// Main error type for this lmdb
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum Error {
	/// Couldn't find what we were looking for
	#[error("DB Not Found Error: {0}")]
	NotFoundErr(String),
	/// Wraps an error originating from LMDB
	#[error("LMDB error: {0}")]
	LmdbErr(lmdb::error::Error),
	/// Wraps a serialization error for Writeable or Readable
	#[error("Serialization Error: {0}")]
	SerErr(ser::Error),
	/// File handling error
	#[error("File handling Error: {0}")]
	FileErr(String),
	/// Other error
	#[error("Other Error: {0}")]
	OtherErr(String),
}

impl From<lmdb::error::Error> for Error {
	fn from(e: lmdb::error::Error) -> Error {
		Error::LmdbErr(e)
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::SerErr(e)
	}
}

/// unwraps the inner option by converting the none case to a not found error
pub fn option_to_not_found<T, F>(res: Result<Option<T>, Error>, field_name: F) -> Result<T, Error>
where
	F: Fn() -> String,
{
	match res {
		Ok(None) => Err(Error::NotFoundErr(field_name())),
		Ok(Some(o)) => Ok(o),
		Err(e) => Err(e),
	}
}

fn deserialize_value<T: ser::Readable>(mut data: &[u8]) -> Result<T, Error> {
	ser::deserialize(&mut data).map_err(From::from)
}

/// LMDB-backed store. All writes are done through a Batch providing
/// atomicity.
pub struct Store {
	env: Arc<lmdb::Environment>,
	db: Arc<lmdb::Database<'static>>,
}

impl Store {
	/// Opens (creating if needed) the environment `env_name` under
	/// `root_path`. Transactions are per environment.
	pub fn open(root_path: &str, env_name: &str) -> Result<Store, Error> {
		let full_path = Path::new(root_path).join(env_name);
		fs::create_dir_all(&full_path).map_err(|e| {
			Error::FileErr(format!("unable to create db dir {:?}: {}", full_path, e))
		})?;
		let path_str = full_path
			.to_str()
			.ok_or_else(|| Error::FileErr(format!("db path not utf-8: {:?}", full_path)))?;

		let mut env_builder = lmdb::EnvBuilder::new()?;
		env_builder.set_maxdbs(1)?;
		env_builder.set_mapsize(MAP_SIZE)?;

		// NOTLS so a thread holding the write txn may still open readers
		let env = unsafe { env_builder.open(path_str, lmdb::open::NOTLS, 0o600)? };
		let env = Arc::new(env);
		let db = lmdb::Database::open(
			env.clone(),
			Some(DB_NAME),
			&lmdb::DatabaseOptions::new(lmdb::db::CREATE),
		)?;
		debug!("db: opened {}, map size {}", path_str, env.info()?.mapsize);

		Ok(Store {
			env,
			db: Arc::new(db),
		})
	}

	fn get_with_access<F, T>(
		&self,
		key: &[u8],
		access: &lmdb::ConstAccessor<'_>,
		deserialize: F,
	) -> Result<Option<T>, Error>
	where
		F: Fn(&[u8], &[u8]) -> Result<T, Error>,
	{
		let res: Option<&[u8]> = access.get(&self.db, key).to_opt()?;
		res.map(|data| deserialize(key, data)).transpose()
	}

	/// Gets a value from the db in a new read transaction, deserialized
	/// with the provided function.
	pub fn get_with<F, T>(&self, key: &[u8], deserialize: F) -> Result<Option<T>, Error>
	where
		F: Fn(&[u8], &[u8]) -> Result<T, Error>,
	{
		let txn = lmdb::ReadTransaction::new(self.env.clone())?;
		let access = txn.access();
		self.get_with_access(key, &access, deserialize)
	}

	/// Gets a `Readable` value from the db, provided its key.
	/// Will *not* see data a batch has not committed yet.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		self.get_with(key, |_, data| deserialize_value(data))
	}

	/// Iterates over all entries whose key starts with `prefix`, in key
	/// order. Reads a snapshot taken when called.
	pub fn iter<F, T>(&self, prefix: &[u8], deserialize: F) -> Result<PrefixIterator<F, T>, Error>
	where
		F: Fn(&[u8], &[u8]) -> Result<T, Error>,
	{
		let tx = Arc::new(lmdb::ReadTransaction::new(self.env.clone())?);
		let cursor = tx.cursor(self.db.clone())?;
		Ok(PrefixIterator {
			tx,
			cursor,
			started: false,
			done: false,
			prefix: prefix.to_vec(),
			deserialize,
		})
	}

	/// Starts a new write transaction. LMDB allows a single one at a time,
	/// this blocks until any other batch is done.
	pub fn batch(&self) -> Result<Batch<'_>, Error> {
		let tx = lmdb::WriteTransaction::new(self.env.clone())?;
		Ok(Batch { store: self, tx })
	}
}

/// Batch to write multiple Writeables to db in an atomic manner.
pub struct Batch<'a> {
	store: &'a Store,
	tx: lmdb::WriteTransaction<'a>,
}

impl<'a> Batch<'a> {
	/// Writes a single key/value pair to the db
	pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
		self.tx
			.access()
			.put(&self.store.db, key, value, lmdb::put::Flags::empty())?;
		Ok(())
	}

	/// Writes a single key and its `Writeable` value to the db.
	pub fn put_ser<W: ser::Writeable>(&self, key: &[u8], value: &W) -> Result<(), Error> {
		let data = ser::ser_vec(value)?;
		self.put(key, &data)
	}

	/// Gets a value, uncommitted writes of this batch included.
	pub fn get_with<F, T>(&self, key: &[u8], deserialize: F) -> Result<Option<T>, Error>
	where
		F: Fn(&[u8], &[u8]) -> Result<T, Error>,
	{
		let access = self.tx.access();
		self.store.get_with_access(key, &access, deserialize)
	}

	/// Gets a `Readable` value, uncommitted writes of this batch included.
	pub fn get_ser<T: ser::Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		self.get_with(key, |_, data| deserialize_value(data))
	}

	/// Prefix iteration over the committed state. Writes of this batch are
	/// not seen.
	pub fn iter<F, T>(&self, prefix: &[u8], deserialize: F) -> Result<PrefixIterator<F, T>, Error>
	where
		F: Fn(&[u8], &[u8]) -> Result<T, Error>,
	{
		self.store.iter(prefix, deserialize)
	}

	/// Deletes a key/value pair from the db, a missing key is not an error.
	pub fn delete(&self, key: &[u8]) -> Result<(), Error> {
		self.tx.access().del_key(&self.store.db, key).to_opt()?;
		Ok(())
	}

	/// Writes the batch to db
	pub fn commit(self) -> Result<(), Error> {
		self.tx.commit()?;
		Ok(())
	}

	/// Creates a child of this batch. It is merged into its parent on
	/// commit, abandoned otherwise.
	pub fn child(&mut self) -> Result<Batch<'_>, Error> {
		Ok(Batch {
			store: self.store,
			tx: self.tx.child_tx()?,
		})
	}
}

/// Iterator over the entries sharing a key prefix, ending at the first key
/// past the prefix. Values that fail to deserialize come out as errors in
/// place, a cursor error ends the iteration.
pub struct PrefixIterator<F, T>
where
	F: Fn(&[u8], &[u8]) -> Result<T, Error>,
{
	tx: Arc<lmdb::ReadTransaction<'static>>,
	cursor: lmdb::Cursor<'static, 'static>,
	started: bool,
	done: bool,
	prefix: Vec<u8>,
	deserialize: F,
}

impl<F, T> Iterator for PrefixIterator<F, T>
where
	F: Fn(&[u8], &[u8]) -> Result<T, Error>,
{
	type Item = Result<T, Error>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}
		let access = self.tx.access();
		let kv: Result<(&[u8], &[u8]), lmdb::error::Error> = if self.started {
			self.cursor.next(&access)
		} else {
			self.started = true;
			self.cursor.seek_range_k(&access, &self.prefix[..])
		};
		match kv.to_opt() {
			Ok(Some((k, v))) if k.starts_with(&self.prefix) => Some((self.deserialize)(k, v)),
			Ok(_) => {
				self.done = true;
				None
			}
			Err(e) => {
				self.done = true;
				Some(Err(e.into()))
			}
		}
	}
}
