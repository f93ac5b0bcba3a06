// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Chart archive writer
//!
//! Produces the same layout as `helm package`: a gzipped tar whose entries
//! live under `<chart-name>/`. Entries are sorted and carry zeroed mtime and
//! ownership, so two runs over the same tree produce identical bytes.

use crate::domain::packaging::PackagingError;
use flate2::{write::GzEncoder, Compression};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::{EntryType, Header};
use tracing::debug;
use uuid::Uuid;

/// Archive `source` as `<destination>/<file_name>` with entries under `<chart_name>/`.
///
/// The archive is written under a temporary name and renamed into place.
pub fn write_chart_archive(
    source: &Path,
    chart_name: &str,
    destination: &Path,
    file_name: &str,
) -> Result<PathBuf, PackagingError> {
    if !source.is_dir() {
        return Err(PackagingError::SourceMissing(source.to_path_buf()));
    }
    fs::create_dir_all(destination)?;

    let target = destination.join(file_name);
    let partial = destination.join(format!(".{}.{}.partial", file_name, Uuid::new_v4().simple()));

    let result = write_archive(source, chart_name, &partial).and_then(|()| {
        fs::rename(&partial, &target)?;
        Ok(())
    });
    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    debug!(archive = %target.display(), "Chart archive written");
    Ok(target)
}

fn write_archive(source: &Path, chart_name: &str, output: &Path) -> Result<(), PackagingError> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let prefix = Path::new(chart_name);
    for entry in walkdir::WalkDir::new(source).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        let entry = entry.map_err(|e| PackagingError::Archive(e.to_string()))?;
        let path = entry.path();
        let relative = path
            .strip_prefix(source)
            .map_err(|e| PackagingError::Archive(e.to_string()))?;
        let archive_path = prefix.join(relative);

        let file_type = entry.file_type();
        let mut header = Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if file_type.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder.append_data(&mut header, &archive_path, std::io::empty())?;
        } else if file_type.is_file() {
            let metadata = entry.metadata().map_err(|e| PackagingError::Archive(e.to_string()))?;
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(metadata.len());
            builder.append_data(&mut header, &archive_path, File::open(path)?)?;
        } else {
            debug!(path = %path.display(), "Skipping non-regular file while archiving chart");
        }
    }

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    Ok(())
}
