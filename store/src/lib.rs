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

//! Storage of core types using LMDB, and of MMRs using flat files.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;
extern crate mwsync_core as core;

pub mod leaf_set;
pub mod lmdb;
pub mod pmmr;
pub mod types;

const SEP: u8 = b':';

use byteorder::{BigEndian, WriteBytesExt};
use croaring::Bitmap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub use crate::lmdb::*;

/// Build a db key from a prefix and a byte vector identifier.
pub fn to_key<K: AsRef<[u8]>>(prefix: u8, k: K) -> Vec<u8> {
	let k = k.as_ref();
	let mut res = Vec::with_capacity(k.len() + 2);
	res.push(prefix);
	res.push(SEP);
	res.extend_from_slice(k);
	res
}

/// Build a db key from a prefix and a numeric identifier.
pub fn u64_to_key(prefix: u8, val: u64) -> Vec<u8> {
	let mut res = Vec::with_capacity(10);
	res.push(prefix);
	res.push(SEP);
	// writing to a vec cannot fail
	let _ = res.write_u64::<BigEndian>(val);
	res
}

/// Build the key prefix used to iterate over all entries of a given prefix.
pub fn prefix_key(prefix: u8) -> Vec<u8> {
	vec![prefix, SEP]
}

/// Writes a file atomically: `writer` fills `<path>.tmp`, which is synced
/// to disk and then renamed over `path`.
pub fn save_via_temp_file<F, P>(path: P, writer: F) -> io::Result<()>
where
	F: FnOnce(&mut File) -> io::Result<()>,
	P: AsRef<Path>,
{
	let path = path.as_ref();
	let mut tmp_name = path.as_os_str().to_os_string();
	tmp_name.push(".tmp");
	let tmp_path = PathBuf::from(tmp_name);

	let mut file = File::create(&tmp_path)?;
	writer(&mut file)?;
	file.sync_all()?;
	fs::rename(&tmp_path, path)
}

/// Read Bitmap from a file
pub fn read_bitmap<P: AsRef<Path>>(file_path: P) -> io::Result<Bitmap> {
	let mut bitmap_file = File::open(file_path)?;
	let f_md = bitmap_file.metadata()?;
	let mut buffer = Vec::with_capacity(f_md.len() as usize);
	bitmap_file.read_to_end(&mut buffer)?;
	if buffer.is_empty() {
		return Ok(Bitmap::create());
	}
	Ok(Bitmap::deserialize(&buffer))
}
