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

//! Common storage-related types: append-only files of fixed size records,
//! read through a memory map.

use crate::core::ser::{self, Readable, Writeable};
use std::collections::HashSet;
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::marker;
use std::path::{Path, PathBuf};

/// Data file (MMR) wrapper around an append-only file.
pub struct DataFile<T> {
	file: AppendOnlyFile<T>,
}

impl<T> DataFile<T>
where
	T: Readable + Writeable + Debug,
{
	/// Open (or create) a file at the provided path on disk.
	pub fn open<P>(path: P, elmt_size: u16) -> io::Result<DataFile<T>>
	where
		P: AsRef<Path> + Debug,
	{
		Ok(DataFile {
			file: AppendOnlyFile::open(path, elmt_size)?,
		})
	}

	/// Append an element to the file.
	/// Will not be written to disk until flush() is subsequently called.
	/// Alternatively discard() may be called to discard any pending changes.
	pub fn append(&mut self, data: &T) -> io::Result<u64> {
		self.file.append_elmt(data)?;
		Ok(self.size_unsync())
	}

	/// Append a slice of multiple elements to the file.
	pub fn extend_from_slice(&mut self, data: &[T]) -> io::Result<u64> {
		for x in data {
			self.file.append_elmt(x)?;
		}
		Ok(self.size_unsync())
	}

	/// Read an element from the file by its 0-based index in the file.
	/// Assumes we have already "shifted" the index to account for
	/// compacted data.
	pub fn read(&self, idx: u64) -> Option<T> {
		self.file.read_as_elmt(idx).ok()
	}

	/// Rewind the backend file to the specified number of elements.
	pub fn rewind(&mut self, size: u64) {
		self.file.rewind(size)
	}

	/// Flush unsynced changes to the file to disk.
	pub fn flush(&mut self) -> io::Result<()> {
		self.file.flush()
	}

	/// Discard any unsynced changes to the file.
	pub fn discard(&mut self) {
		self.file.discard()
	}

	/// Size of the file in number of elements (not bytes).
	pub fn size(&self) -> u64 {
		self.file.size_in_elmts().unwrap_or(0)
	}

	/// Size of the unsync'd file, in elements (not bytes).
	pub fn size_unsync(&self) -> u64 {
		self.file.size_unsync_in_elmts()
	}

	/// Path of the underlying file
	pub fn path(&self) -> &Path {
		self.file.path()
	}

	/// Checks the file holds a whole number of records.
	pub fn check_len(&self) -> io::Result<()> {
		self.file.check_len()
	}

	/// Writes a copy of the file skipping the elements at the provided
	/// indices, next to it. The current file is left untouched until
	/// `swap_compacted`.
	pub fn write_compacted(&self, drop_idx: &HashSet<u64>) -> io::Result<()> {
		self.file.write_tmp_pruned(drop_idx)
	}

	/// Swaps the copy written by `write_compacted` in place of the file.
	pub fn swap_compacted(&mut self) -> io::Result<()> {
		self.file.replace_with_tmp()
	}
}

/// Deals with a compacted copy left next to the file at `path` by an
/// interrupted compaction. The copy is swapped in if it holds exactly
/// `expected` records of `elmt_size` bytes, deleted otherwise. Returns
/// whether it was swapped in.
pub fn recover_compacted(path: &Path, elmt_size: u16, expected: u64) -> io::Result<bool> {
	let tmp_path = path.with_extension("tmp");
	let len = match fs::metadata(&tmp_path) {
		Ok(md) => md.len(),
		Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
		Err(e) => return Err(e),
	};
	let elmt_size = elmt_size as u64;
	if len % elmt_size == 0 && len / elmt_size == expected {
		fs::rename(&tmp_path, path)?;
		Ok(true)
	} else {
		fs::remove_file(&tmp_path)?;
		Ok(false)
	}
}

/// Wrapper for a file that can be read at any position (random read) but for
/// which writes are append only. Reads are backed by a memory map (mmap(2)),
/// relying on the operating system for fast access and caching. The memory
/// map is reallocated to expand it when new writes are flushed.
///
/// Despite being append-only, the file can still be compacted and truncated.
/// The former simply happens by rewriting it, ignoring some of the data. The
/// latter by truncating the underlying file and re-creating the mmap.
pub struct AppendOnlyFile<T> {
	path: PathBuf,
	file: Option<File>,
	elmt_size: u16,
	mmap: Option<memmap::Mmap>,

	// Buffer of unsync'd bytes. These bytes will be appended to the file when flushed.
	buffer: Vec<u8>,
	buffer_start_pos: u64,
	buffer_start_pos_bak: Option<u64>,
	_marker: marker::PhantomData<T>,
}

impl<T> AppendOnlyFile<T>
where
	T: Debug + Readable + Writeable,
{
	/// Open a file (existing or not) as append-only, backed by a mmap.
	pub fn open<P>(path: P, elmt_size: u16) -> io::Result<AppendOnlyFile<T>>
	where
		P: AsRef<Path> + Debug,
	{
		let mut aof = AppendOnlyFile {
			file: None,
			path: path.as_ref().to_path_buf(),
			elmt_size,
			mmap: None,
			buffer: vec![],
			buffer_start_pos: 0,
			buffer_start_pos_bak: None,
			_marker: marker::PhantomData,
		};
		aof.init()?;
		Ok(aof)
	}

	/// (Re)init an underlying file and its associated memmap.
	pub fn init(&mut self) -> io::Result<()> {
		let file = OpenOptions::new()
			.read(true)
			.append(true)
			.create(true)
			.open(self.path.clone())?;

		// If we have a non-empty file then mmap it.
		if file.metadata()?.len() == 0 {
			self.mmap = None;
			self.buffer_start_pos = 0;
		} else {
			self.mmap = Some(unsafe { memmap::Mmap::map(&file)? });
			self.buffer_start_pos = self.size_in_elmts()?;
		}
		self.file = Some(file);

		Ok(())
	}

	fn size_in_elmts(&self) -> io::Result<u64> {
		Ok(self.size()? / self.elmt_size as u64)
	}

	fn size_unsync_in_elmts(&self) -> u64 {
		self.buffer_start_pos + (self.buffer.len() as u64 / self.elmt_size as u64)
	}

	/// Checks the file length is a whole number of records.
	pub fn check_len(&self) -> io::Result<()> {
		let size = self.size()?;
		if size % self.elmt_size as u64 != 0 {
			return Err(io::Error::new(
				io::ErrorKind::InvalidData,
				format!(
					"{:?}: {} bytes is not a multiple of the record size {}",
					self.path, size, self.elmt_size
				),
			));
		}
		Ok(())
	}

	/// Append element to append-only file by serializing it to a fixed size
	/// record and appending the bytes.
	fn append_elmt(&mut self, data: &T) -> io::Result<()> {
		let bytes = ser::ser_fixed(data, self.elmt_size as usize)
			.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
		self.buffer.extend_from_slice(&bytes);
		Ok(())
	}

	/// Rewinds the data file back to a previous size (in elements).
	/// Rewinding within the unsync'd buffer truncates the buffer, rewinding
	/// further back moves the buffer start and the file gets truncated on
	/// the next flush.
	pub fn rewind(&mut self, pos: u64) {
		if pos >= self.buffer_start_pos {
			let keep = ((pos - self.buffer_start_pos) * self.elmt_size as u64) as usize;
			self.buffer.truncate(keep);
		} else {
			if self.buffer_start_pos_bak.is_none() {
				self.buffer_start_pos_bak = Some(self.buffer_start_pos);
			}
			self.buffer.clear();
			self.buffer_start_pos = pos;
		}
	}

	/// Syncs all writes (fsync), reallocating the memory map to make the newly
	/// written data accessible.
	pub fn flush(&mut self) -> io::Result<()> {
		if self.buffer_start_pos_bak.is_some() {
			// Flushing a rewound state, we need to truncate via set_len() before applying.
			// Drop and recreate, or windows throws an access error
			self.mmap = None;
			self.file = None;
			{
				let file = OpenOptions::new()
					.read(true)
					.create(true)
					.write(true)
					.open(&self.path)?;
				file.set_len(self.buffer_start_pos * self.elmt_size as u64)?;
			}
		}

		let mut file = OpenOptions::new()
			.read(true)
			.create(true)
			.append(true)
			.open(&self.path)?;
		self.buffer_start_pos_bak = None;

		file.write_all(&self.buffer[..])?;
		file.sync_all()?;

		self.buffer.clear();

		// Note: file must be non-empty to memory map it
		if file.metadata()?.len() == 0 {
			self.mmap = None;
		} else {
			self.mmap = Some(unsafe { memmap::Mmap::map(&file)? });
		}
		self.file = Some(file);
		self.buffer_start_pos = self.size_in_elmts()?;

		Ok(())
	}

	/// Discard the current non-flushed data.
	pub fn discard(&mut self) {
		if let Some(pos) = self.buffer_start_pos_bak.take() {
			// discarding a rewound state, restore the buffer start
			self.buffer_start_pos = pos;
		}
		self.buffer = vec![];
	}

	/// Read the bytes representing the element at the given position (0-indexed).
	/// Leverages the memory map.
	pub fn read(&self, pos: u64) -> &[u8] {
		if pos >= self.size_unsync_in_elmts() {
			return <&[u8]>::default();
		}
		let length = self.elmt_size as usize;
		if pos < self.buffer_start_pos {
			let offset = (pos * self.elmt_size as u64) as usize;
			match &self.mmap {
				Some(mmap) if mmap.len() >= offset + length => &mmap[offset..(offset + length)],
				_ => <&[u8]>::default(),
			}
		} else {
			let offset = ((pos - self.buffer_start_pos) * self.elmt_size as u64) as usize;
			&self.buffer[offset..(offset + length)]
		}
	}

	fn read_as_elmt(&self, pos: u64) -> io::Result<T> {
		let data = self.read(pos);
		if data.is_empty() {
			return Err(io::Error::new(
				io::ErrorKind::NotFound,
				format!("no element at {} in {:?}", pos, self.path),
			));
		}
		ser::deserialize(&mut &data[..]).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
	}

	fn tmp_path(&self) -> PathBuf {
		self.path.with_extension("tmp")
	}

	/// Saves a copy of the current (flushed) file content, skipping the
	/// records at the provided indices.
	pub fn write_tmp_pruned(&self, drop_idx: &HashSet<u64>) -> io::Result<()> {
		let mut buf_writer = BufWriter::new(File::create(&self.tmp_path())?);
		for idx in 0..self.buffer_start_pos {
			if drop_idx.contains(&idx) {
				continue;
			}
			let data = self.read(idx);
			if data.is_empty() {
				return Err(io::Error::new(
					io::ErrorKind::UnexpectedEof,
					format!("short read at {} in {:?}", idx, self.path),
				));
			}
			buf_writer.write_all(data)?;
		}
		buf_writer.flush()?;
		buf_writer.get_ref().sync_all()
	}

	/// Replace the underlying file with the file at tmp path.
	/// Rebuild and initialize from the new file.
	pub fn replace_with_tmp(&mut self) -> io::Result<()> {
		let tmp_path = self.tmp_path();
		self.release();
		fs::rename(&tmp_path, &self.path)?;
		self.buffer.clear();
		self.buffer_start_pos_bak = None;
		self.init()
	}

	/// Release underlying file handles.
	pub fn release(&mut self) {
		self.mmap = None;
		self.file = None;
	}

	/// Current size of the file in bytes. Goes through the open handle when
	/// there is one, the file may have been unlinked since.
	pub fn size(&self) -> io::Result<u64> {
		match self.file {
			Some(ref file) => file.metadata().map(|md| md.len()),
			None => fs::metadata(&self.path).map(|md| md.len()),
		}
	}

	/// Path of the underlying file
	pub fn path(&self) -> &Path {
		&self.path
	}
}
