use filetime::{set_file_mtime, FileTime};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use time::{Date, Month, PrimitiveDateTime, Time as TimeOfDay};
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("not a ZIP archive: {0}")]
    NotZip(#[source] zip::result::ZipError),
    #[error("entry escapes the target folder: {0}")]
    UnsafeEntry(String),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("read entry #{index}: {source}")]
    Entry {
        index: usize,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files: usize,
    pub dirs: usize,
}

fn open(path: &Path) -> Result<ZipArchive<fs::File>, ArchiveError> {
    let file = fs::File::open(path).map_err(|source| ArchiveError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    ZipArchive::new(file).map_err(ArchiveError::NotZip)
}

/// Checks the ZIP structure and that every entry stays inside the target.
/// Returns the number of entries.
pub fn validate(path: &Path) -> Result<usize, ArchiveError> {
    let mut archive = open(path)?;
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(ArchiveError::NotZip)?;
        if entry.enclosed_name().is_none() {
            return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
        }
    }
    Ok(archive.len())
}

pub fn entry_count(path: &Path) -> Result<usize, ArchiveError> {
    Ok(open(path)?.len())
}

pub fn extract(path: &Path, dest: &Path) -> Result<ExtractStats, ExtractError> {
    let mut archive = open(path)?;
    let mut stats = ExtractStats::default();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|source| ExtractError::Entry { index, source })?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ArchiveError::UnsafeEntry(entry.name().to_string()).into());
        };

        let out_path = dest.join(relative);
        if entry.is_dir() {
            create_dir(&out_path)?;
            stats.dirs += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }

        let write_err = |source| ExtractError::Write {
            path: out_path.clone(),
            source,
        };
        let mut out_file = fs::File::create(&out_path).map_err(write_err)?;
        io::copy(&mut entry, &mut out_file).map_err(write_err)?;
        drop(out_file);
        stats.files += 1;

        if let Some(mtime) = entry.last_modified().and_then(zip_time_to_unix) {
            let _ = set_file_mtime(&out_path, FileTime::from_unix_time(mtime, 0));
        }
    }

    Ok(stats)
}

fn create_dir(path: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(path).map_err(|source| ExtractError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}
