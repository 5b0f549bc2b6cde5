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

use mwsync_util as util;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use util::zip;

#[test]
fn zip_unzip() {
	let root = Path::new("target/tmp/zip_unzip");
	let zip_path = root.join("zipped.zip");
	let _ = fs::remove_dir_all(root);

	fs::create_dir_all(root.join("to_zip/sub")).unwrap();
	write_files(&root.join("to_zip")).unwrap();

	let files = vec![
		PathBuf::from("foo.txt"),
		PathBuf::from("bar.txt"),
		PathBuf::from("sub/lorem"),
	];
	{
		let zip_file = File::create(&zip_path).unwrap();
		zip::create_zip(&zip_file, &root.join("to_zip"), files).unwrap();
	}

	assert!(zip_path.exists());
	assert!(zip_path.is_file());
	assert!(zip_path.metadata().unwrap().len() > 300);

	let zip_file = File::open(&zip_path).unwrap();
	let expected = |p: &Path| p != Path::new("bar.txt");
	let extracted = zip::extract_files(zip_file, &root.join("dezipped"), expected).unwrap();

	// bar.txt is filtered out by the expected closure
	assert_eq!(extracted, 2);
	assert!(root.join("dezipped/foo.txt").is_file());
	assert!(!root.join("dezipped/bar.txt").exists());
	let lorem = root.join("dezipped/sub/lorem");
	assert!(lorem.is_file());
	assert_eq!(lorem.metadata().unwrap().len(), 55);

	fs::remove_dir_all(root).unwrap();
}

fn write_files(root: &Path) -> io::Result<()> {
	let mut file = File::create(root.join("foo.txt"))?;
	file.write_all(b"Hello, world!")?;
	let mut file = File::create(root.join("bar.txt"))?;
	file.write_all(b"Goodbye, world!")?;
	let mut file = File::create(root.join("sub/lorem"))?;
	file.write_all(b"Lorem ipsum dolor sit amet, consectetur adipiscing elit")?;
	Ok(())
}
