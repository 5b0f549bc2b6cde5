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

/// Wrappers around the `zip-rs` library to compress and decompress zip archives.
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use self::zip_rs::result::{ZipError, ZipResult};
use self::zip_rs::write::FileOptions;
use zip as zip_rs;

/// Create a zip archive from source dir and list of relative file paths.
/// Permissions are set to 644 by default.
pub fn create_zip(dst_file: &File, src_dir: &Path, files: Vec<PathBuf>) -> io::Result<()> {
	let mut writer = {
		let zip = zip_rs::ZipWriter::new(dst_file);
		io::BufWriter::new(zip)
	};

	let options = FileOptions::default()
		.compression_method(zip_rs::CompressionMethod::Stored)
		.unix_permissions(0o644);

	for x in &files {
		let file_path = src_dir.join(x);
		if let Ok(file) = File::open(file_path.clone()) {
			info!("compress: {:?} -> {:?}", file_path, x);
			writer.get_mut().start_file(path_to_name(x)?, options)?;
			io::copy(&mut io::BufReader::new(file), &mut writer)?;
			// Flush the BufWriter after each file so we start then next one correctly.
			io::Write::flush(&mut writer)?;
		}
	}

	writer.get_mut().finish()?;
	dst_file.sync_all()?;
	Ok(())
}

/// Extract a set of files from the provided zip archive.
/// Only entries accepted by the `expected` filter are written to `dest`.
pub fn extract_files<R, F>(from_archive: R, dest: &Path, expected: F) -> ZipResult<usize>
where
	R: io::Read + io::Seek,
	F: Fn(&Path) -> bool,
{
	let mut extracted = 0;
	let mut archive = zip_rs::ZipArchive::new(from_archive)?;

	for i in 0..archive.len() {
		let mut file = archive.by_index(i)?;
		let san_name = file.sanitized_name();
		if san_name.to_str().unwrap_or("") != file.name() || !expected(&san_name) {
			info!("ignoring a suspicious file: {}", file.name());
			continue;
		}
		let file_path = dest.join(san_name);

		if file.name().ends_with('/') {
			fs::create_dir_all(&file_path)?;
		} else {
			if let Some(p) = file_path.parent() {
				if !p.exists() {
					fs::create_dir_all(&p)?;
				}
			}
			let mut outfile = fs::File::create(&file_path).map_err(|e| {
				error!("extract: failed to create {:?}: {:?}", file_path, e);
				ZipError::Io(e)
			})?;
			io::copy(&mut file, &mut outfile)?;
			outfile.sync_all()?;
			extracted += 1;
		}
	}
	Ok(extracted)
}

fn path_to_name(path: &Path) -> io::Result<String> {
	path.to_str()
		.map(|x| x.replace("\\", "/"))
		.ok_or_else(|| {
			io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("non-utf8 path: {:?}", path),
			)
		})
}
