// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-temp-then-rename persistence, generalized from the teacher's
//! snapshot `.bak` rotation (`oj-daemon`'s `storage/snapshot.rs`) to every
//! write in this crate: readers never observe a torn file (§4.4).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out. Keeps
/// up to [`MAX_BAK_FILES`] backups; the oldest is dropped when at capacity.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

/// Serialize `value` to the destination path via write-temp, fsync, rename.
/// If the destination already exists, the previous contents are rotated
/// into a `.bak` file first so a reader can recover from a corrupt write.
pub(crate) fn write_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    if path.exists() {
        let bak = rotate_bak_path(path);
        let _ = fs::copy(path, bak);
    }

    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    {
        let file = fs::File::create(&tmp_path)?;
        use std::io::Write;
        let mut file = file;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Payload {
        value: u32,
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("file.json");
        write_atomic(&path, &Payload { value: 1 }).expect("write");
        let read: Payload = read_json(&path).expect("read");
        assert_eq!(read, Payload { value: 1 });
    }

    #[test]
    fn overwrite_rotates_previous_contents_into_bak() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("file.json");
        write_atomic(&path, &Payload { value: 1 }).expect("write 1");
        write_atomic(&path, &Payload { value: 2 }).expect("write 2");

        let bak: Payload = read_json(&path.with_extension("bak")).expect("read bak");
        assert_eq!(bak, Payload { value: 1 });
        let current: Payload = read_json(&path).expect("read current");
        assert_eq!(current, Payload { value: 2 });
    }

    #[test]
    fn bak_rotation_caps_at_max_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("file.json");
        for n in 0..6 {
            write_atomic(&path, &Payload { value: n }).expect("write");
        }
        assert!(path.with_extension("bak").exists());
        assert!(path.with_extension("bak.2").exists());
        assert!(path.with_extension("bak.3").exists());
        assert!(!path.with_extension("bak.4").exists());
    }
}
