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

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use croaring::Bitmap;

use mwsync_core::core::hash::{DefaultHashable, Hash};
use mwsync_core::core::pmmr::{self, Backend, ReadablePMMR, ReadonlyPMMR, VecBackend, PMMR};
use mwsync_core::ser::{self, PMMRIndexHashable, PMMRable, Readable, Reader, Writeable, Writer};
use mwsync_store::pmmr::{PMMRBackend, PMMR_DATA_FILE, PMMR_HASH_FILE, PMMR_PRUN_FILE};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct TestElem(u32);

impl DefaultHashable for TestElem {}

impl PMMRable for TestElem {
	type E = Self;

	fn as_elmt(&self) -> Self::E {
		*self
	}

	fn elmt_size() -> Option<u16> {
		Some(4)
	}
}

impl Writeable for TestElem {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.0)
	}
}

impl Readable for TestElem {
	fn read<R: Reader>(reader: &mut R) -> Result<TestElem, ser::Error> {
		Ok(TestElem(reader.read_u32()?))
	}
}

fn setup(tag: &str) -> (String, Vec<TestElem>) {
	mwsync_util::init_test_logger();
	let data_dir = format!("./target/tmp/pmmr_{}", tag);
	let _ = fs::remove_dir_all(&data_dir);
	fs::create_dir_all(&data_dir).unwrap();
	let elems = (1..=19).map(TestElem).collect();
	(data_dir, elems)
}

fn teardown(data_dir: String) {
	fs::remove_dir_all(data_dir).unwrap();
}

fn load(elems: &[TestElem], backend: &mut PMMRBackend<TestElem>) -> u64 {
	let size = backend.unpruned_size();
	let mut pmmr = PMMR::at(backend, size);
	for elem in elems {
		pmmr.push(elem).unwrap();
	}
	pmmr.size
}

fn vec_root(elems: &[TestElem]) -> Hash {
	let mut ba = VecBackend::new();
	let mut pmmr = PMMR::new(&mut ba);
	for elem in elems {
		pmmr.push(elem).unwrap();
	}
	pmmr.root().unwrap()
}

#[test]
fn pmmr_append() {
	let (data_dir, elems) = setup("append");
	{
		let mut backend = PMMRBackend::new(&data_dir, true).unwrap();

		// adding first set of 4 elements and sync
		load(&elems[0..4], &mut backend);
		backend.sync().unwrap();

		// adding the rest and sync again
		let mmr_size = load(&elems[4..9], &mut backend);
		backend.sync().unwrap();
		assert_eq!(mmr_size, 16);
		assert_eq!(backend.unpruned_size(), 16);
		assert_eq!(backend.data_size(), 9);

		assert_eq!(backend.get_hash(0).unwrap(), elems[0].hash_with_index(0));
		assert_eq!(backend.get_data(7), Some(elems[4]));
		assert_eq!(backend.get_data(2), None);

		let pos_0 = elems[0].hash_with_index(0);
		let pos_1 = elems[1].hash_with_index(1);
		let pos_2 = (pos_0, pos_1).hash_with_index(2);
		assert_eq!(backend.get_from_file(2), Some(pos_2));

		let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, mmr_size);
		assert_eq!(pmmr.root().unwrap(), vec_root(&elems[0..9]));
	}
	teardown(data_dir);
}

#[test]
fn pmmr_reopen_keeps_positions() {
	let (data_dir, elems) = setup("reopen");
	let (size, root) = {
		let mut backend = PMMRBackend::new(&data_dir, true).unwrap();
		let size = load(&elems[..], &mut backend);
		backend.sync().unwrap();
		let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
		(size, pmmr.root().unwrap())
	};
	{
		let mut backend: PMMRBackend<TestElem> = PMMRBackend::new(&data_dir, true).unwrap();
		backend.check_consistency().unwrap();
		assert_eq!(backend.unpruned_size(), size);
		for (idx, elem) in elems.iter().enumerate() {
			let pos0 = pmmr::insertion_to_pmmr_index(idx as u64);
			assert_eq!(backend.get_data(pos0), Some(*elem));
		}
		let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
		assert_eq!(pmmr.root().unwrap(), root);
	}
	teardown(data_dir);
}

#[test]
fn pmmr_discard_unsynced() {
	let (data_dir, elems) = setup("discard");
	{
		let mut backend = PMMRBackend::new(&data_dir, true).unwrap();
		let size = load(&elems[0..4], &mut backend);
		backend.sync().unwrap();

		load(&elems[4..8], &mut backend);
		{
			let mut pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
			pmmr.prune(0).unwrap();
		}
		backend.discard();

		assert_eq!(backend.unpruned_size(), size);
		assert_eq!(backend.data_size(), 4);
		assert_eq!(backend.get_data(0), Some(elems[0]));
		assert_eq!(backend.n_unpruned_leaves(), 4);
	}
	teardown(data_dir);
}

#[test]
fn pmmr_rewind() {
	let (data_dir, elems) = setup("rewind");
	{
		let mut backend = PMMRBackend::new(&data_dir, true).unwrap();
		let size1 = load(&elems[0..4], &mut backend);
		backend.sync().unwrap();
		let root1 = vec_root(&elems[0..4]);

		let size2 = load(&elems[4..9], &mut backend);
		{
			let mut pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size2);
			// spend the first leaf after the rewind point was taken
			pmmr.prune(0).unwrap();
		}
		backend.sync().unwrap();
		assert_eq!(backend.get_data(0), None);
		assert_eq!(backend.unpruned_size(), 16);

		let mut rm_pos = Bitmap::create();
		rm_pos.add(0);
		{
			let mut pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size2);
			pmmr.rewind(size1, &rm_pos).unwrap();
			assert_eq!(pmmr.root().unwrap(), root1);
		}
		backend.sync().unwrap();

		assert_eq!(backend.unpruned_size(), size1);
		assert_eq!(backend.data_size(), 4);
		assert_eq!(backend.get_data(0), Some(elems[0]));

		// rewinding forward is refused
		let mut pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size1);
		assert!(pmmr.rewind(size2, &Bitmap::create()).is_err());
	}
	teardown(data_dir);
}

#[test]
fn pmmr_compact_keeps_root() {
	let (data_dir, elems) = setup("compact");
	let spent = [0u64, 1, 3, 10];
	{
		let mut backend = PMMRBackend::new(&data_dir, true).unwrap();
		let size = load(&elems[..], &mut backend);
		{
			let mut pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
			for idx in spent.iter() {
				pmmr.prune(pmmr::insertion_to_pmmr_index(*idx)).unwrap();
			}
		}
		backend.sync().unwrap();
		let root = {
			let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
			pmmr.root().unwrap()
		};

		// nothing spent below the first leaf
		assert!(!backend.compact(0).unwrap());

		// compact everything spent below leaf index 8
		let cutoff = pmmr::insertion_to_pmmr_index(8);
		assert!(backend.compact(cutoff).unwrap());
		assert_eq!(backend.compacted_count(), 3);
		assert_eq!(backend.data_size(), elems.len() as u64 - 3);
		backend.check_consistency().unwrap();

		{
			let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
			assert_eq!(pmmr.root().unwrap(), root);
			pmmr.validate().unwrap();
		}
		assert_eq!(backend.get_data_from_file(0), None);
		assert_eq!(backend.get_data_from_file(pmmr::insertion_to_pmmr_index(2)), Some(elems[2]));
		// spent above the cutoff, data still there
		assert_eq!(
			backend.get_data_from_file(pmmr::insertion_to_pmmr_index(10)),
			Some(elems[10])
		);

		// compacted leaves are skipped when listing, spent ones are not
		let ro: ReadonlyPMMR<'_, TestElem, _> = ReadonlyPMMR::at(&backend, size);
		let (leaves, examined) = ro.leaves_from_insertion_index(0, 5);
		assert_eq!(examined, 8);
		let data: Vec<TestElem> = leaves.into_iter().map(|(_, e)| e).collect();
		assert_eq!(data, vec![elems[2], elems[4], elems[5], elems[6], elems[7]]);

		// cannot rewind below compacted data
		assert!(backend.rewind(2, &Bitmap::create()).is_err());
	}
	{
		// compaction survives a reopen
		let mut backend: PMMRBackend<TestElem> = PMMRBackend::new(&data_dir, true).unwrap();
		backend.check_consistency().unwrap();
		assert_eq!(backend.compacted_count(), 3);
		assert_eq!(
			backend.get_data(pmmr::insertion_to_pmmr_index(18)),
			Some(elems[18])
		);
		let size = backend.unpruned_size();
		let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
		assert_eq!(pmmr.root().unwrap(), vec_root(&elems[..]));
	}
	teardown(data_dir);
}

// Loads all elements, spends the provided leaf indices and syncs.
fn load_spent(dir: &Path, elems: &[TestElem], spent: &[u64]) {
	fs::create_dir_all(dir).unwrap();
	let mut backend = PMMRBackend::new(dir, true).unwrap();
	let size = load(elems, &mut backend);
	{
		let mut pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
		for idx in spent {
			pmmr.prune(pmmr::insertion_to_pmmr_index(*idx)).unwrap();
		}
	}
	backend.sync().unwrap();
}

#[test]
fn pmmr_interrupted_compaction() {
	let (data_dir, elems) = setup("interrupted");
	let spent = [0u64, 1, 3, 10];
	let cutoff = pmmr::insertion_to_pmmr_index(8);
	let compacted = Path::new(&data_dir).join("compacted");
	let saved = Path::new(&data_dir).join("saved");
	let unsaved = Path::new(&data_dir).join("unsaved");
	for dir in &[&compacted, &saved, &unsaved] {
		load_spent(dir, &elems, &spent);
	}
	{
		let mut backend: PMMRBackend<TestElem> = PMMRBackend::new(&compacted, true).unwrap();
		assert!(backend.compact(cutoff).unwrap());
	}
	let tmp_data = Path::new(PMMR_DATA_FILE).with_extension("tmp");

	// stopped after saving the bitmap, before swapping the data file in
	fs::copy(compacted.join(PMMR_DATA_FILE), saved.join(&tmp_data)).unwrap();
	fs::copy(compacted.join(PMMR_PRUN_FILE), saved.join(PMMR_PRUN_FILE)).unwrap();
	{
		let mut backend: PMMRBackend<TestElem> = PMMRBackend::new(&saved, true).unwrap();
		assert!(!saved.join(&tmp_data).exists());
		backend.check_consistency().unwrap();
		assert_eq!(backend.compacted_count(), 3);
		assert_eq!(backend.data_size(), elems.len() as u64 - 3);
		assert_eq!(
			fs::read(saved.join(PMMR_DATA_FILE)).unwrap(),
			fs::read(compacted.join(PMMR_DATA_FILE)).unwrap()
		);
		let size = backend.unpruned_size();
		let pmmr: PMMR<'_, TestElem, _> = PMMR::at(&mut backend, size);
		assert_eq!(pmmr.root().unwrap(), vec_root(&elems[..]));
		assert_eq!(pmmr.get_data(pmmr::insertion_to_pmmr_index(9)), Some(elems[9]));
	}

	// stopped before saving the bitmap, the copy is dropped
	fs::copy(compacted.join(PMMR_DATA_FILE), unsaved.join(&tmp_data)).unwrap();
	{
		let backend: PMMRBackend<TestElem> = PMMRBackend::new(&unsaved, true).unwrap();
		assert!(!unsaved.join(&tmp_data).exists());
		backend.check_consistency().unwrap();
		assert_eq!(backend.compacted_count(), 0);
		assert_eq!(backend.data_size(), elems.len() as u64);
		assert_eq!(backend.get_data_from_file(0), Some(elems[0]));
	}
	teardown(data_dir);
}

#[test]
fn pmmr_non_prunable() {
	let (data_dir, elems) = setup("non_prunable");
	{
		let mut backend = PMMRBackend::new(&data_dir, false).unwrap();
		let size = load(&elems[0..5], &mut backend);
		backend.sync().unwrap();
		assert_eq!(backend.n_unpruned_leaves(), 5);
		assert!(backend.remove(0).is_err());
		assert!(!backend.compact(size).unwrap());
		assert_eq!(backend.leaf_idx_iter(2).collect::<Vec<_>>(), vec![2, 3, 4]);
		backend.check_consistency().unwrap();
	}
	teardown(data_dir);
}

#[test]
fn pmmr_corrupt_files_detected() {
	let (data_dir, elems) = setup("corrupt");
	{
		let mut backend = PMMRBackend::new(&data_dir, true).unwrap();
		load(&elems[0..6], &mut backend);
		backend.sync().unwrap();
	}
	{
		// a partial data record
		let mut file = OpenOptions::new()
			.append(true)
			.open(format!("{}/{}", data_dir, PMMR_DATA_FILE))
			.unwrap();
		file.write_all(&[1, 2]).unwrap();
		let backend: PMMRBackend<TestElem> = PMMRBackend::new(&data_dir, true).unwrap();
		assert!(backend.check_consistency().is_err());
	}
	{
		// 6 leaves need 10 hashes, 9 is not a valid mmr size
		let path = format!("{}/{}", data_dir, PMMR_DATA_FILE);
		let file = OpenOptions::new().write(true).open(&path).unwrap();
		file.set_len(6 * 4).unwrap();
		let path = format!("{}/{}", data_dir, PMMR_HASH_FILE);
		let file = OpenOptions::new().write(true).open(&path).unwrap();
		file.set_len(9 * 32).unwrap();
		let backend: PMMRBackend<TestElem> = PMMRBackend::new(&data_dir, true).unwrap();
		assert!(backend.check_consistency().is_err());
	}
	teardown(data_dir);
}
