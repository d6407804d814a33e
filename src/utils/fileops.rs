//! Filesystem actions with staging, verification and cancellation
//!
//! Copies never expose a torn destination: bytes land in a `.part`
//! file next to the final path and an atomic rename makes them
//! visible. The `.part` is unlinked on every failure path.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use sha1::{Digest, Sha1};

use crate::error::SweepError;
use crate::utils::retry::{
    self, mkdir_all_with_retry, remove_with_retry, rename_with_retry, stat_with_retry, RetryPolicy,
};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Staging path for a destination: `<dest>.part`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) {}

/// Create the destination's parent directories (mode 0755)
pub fn ensure_parent(policy: &RetryPolicy, dest: &Path) -> Result<(), SweepError> {
    if let Some(parent) = dest.parent() {
        if !parent.exists() {
            mkdir_all_with_retry(policy, parent)?;
            set_mode(parent, 0o755);
        }
    }
    Ok(())
}

/// Copy `src` to `dest` through a `.part` staging file
///
/// Bytes move in `buffer_size` chunks with a cancellation poll between
/// chunks. On success the staging file is atomically renamed onto the
/// destination; on any error (or cancellation) it is removed. Returns
/// the number of bytes written.
pub fn copy_with_staging(
    src: &Path,
    dest: &Path,
    buffer_size: usize,
    policy: &RetryPolicy,
    cancel: &AtomicBool,
) -> Result<u64, SweepError> {
    ensure_parent(policy, dest)?;

    let part = part_path(dest);
    let result = copy_to_part(src, &part, dest, buffer_size, policy, cancel);

    if result.is_err() {
        // best effort; the next run re-stages from scratch
        let _ = fs::remove_file(&part);
    }

    result
}

fn copy_to_part(
    src: &Path,
    part: &Path,
    dest: &Path,
    buffer_size: usize,
    policy: &RetryPolicy,
    cancel: &AtomicBool,
) -> Result<u64, SweepError> {
    let mut reader = retry::open_with_retry(policy, src)?;
    let mut writer = retry::create_with_retry(policy, part)?;

    let mut buffer = vec![0u8; buffer_size.max(4096)];
    let mut written: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(SweepError::Canceled);
        }

        let n = reader
            .read(&mut buffer)
            .map_err(|e| SweepError::from_io(src, e))?;
        if n == 0 {
            break;
        }

        writer
            .write_all(&buffer[..n])
            .map_err(|e| SweepError::from_io(part, e))?;
        written += n as u64;
    }

    writer
        .sync_all()
        .map_err(|e| SweepError::from_io(part, e))?;
    drop(writer);

    rename_with_retry(policy, part, dest)?;
    set_mode(dest, 0o644);

    Ok(written)
}

/// Attempt a same-filesystem rename; false means the caller must fall
/// back to copy + verify + remove-source
pub fn try_rename(src: &Path, dest: &Path, policy: &RetryPolicy) -> Result<bool, SweepError> {
    ensure_parent(policy, dest)?;

    match fs::rename(src, dest) {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Remove a source file after a verified move-by-copy
pub fn remove_source(policy: &RetryPolicy, src: &Path) -> Result<(), SweepError> {
    remove_with_retry(policy, src)
}

/// Create a hard link at `dest` pointing at `src`
pub fn hardlink(src: &Path, dest: &Path, policy: &RetryPolicy) -> Result<(), SweepError> {
    ensure_parent(policy, dest)?;

    fs::hard_link(src, dest).map_err(|e| SweepError::from_io(dest, e))
}

/// Create a symlink at `dest`; the target is absolutized first so the
/// link survives a relocated destination tree
pub fn symlink(src: &Path, dest: &Path, policy: &RetryPolicy) -> Result<(), SweepError> {
    ensure_parent(policy, dest)?;

    let target = fs::canonicalize(src).map_err(|e| SweepError::from_io(src, e))?;

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, dest).map_err(|e| SweepError::from_io(dest, e))
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(&target, dest).map_err(|e| SweepError::from_io(dest, e))
    }
}

/// Streaming SHA-1 of a file's contents, hex-encoded
pub fn sha1_file(path: &Path) -> Result<String, SweepError> {
    let mut file = fs::File::open(path).map_err(|e| SweepError::from_io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| SweepError::from_io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Destination size must equal the recorded source size
pub fn verify_size(dest: &Path, expected: i64, policy: &RetryPolicy) -> Result<(), SweepError> {
    let meta = stat_with_retry(policy, dest)?;

    if meta.len() as i64 != expected {
        return Err(SweepError::VerificationFailed(format!(
            "size mismatch at {}: expected {} got {}",
            dest.display(),
            expected,
            meta.len()
        )));
    }

    Ok(())
}

/// Source and destination content hashes must match
///
/// Returns the source hash so callers can persist it.
pub fn verify_hash(src: &Path, dest: &Path) -> Result<String, SweepError> {
    let src_hash = sha1_file(src)?;
    let dest_hash = sha1_file(dest)?;

    if src_hash != dest_hash {
        return Err(SweepError::VerificationFailed(format!(
            "sha1 mismatch at {}: {} != {}",
            dest.display(),
            src_hash,
            dest_hash
        )));
    }

    Ok(src_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/dest/album/01 - Song.mp3")),
            PathBuf::from("/dest/album/01 - Song.mp3.part")
        );
    }

    #[test]
    fn test_copy_with_staging_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.mp3");
        let dest = dir.path().join("out/dest.mp3");
        fs::write(&src, b"some audio bytes").unwrap();

        let cancel = AtomicBool::new(false);
        let written = copy_with_staging(&src, &dest, 4, &policy(), &cancel).unwrap();

        assert_eq!(written, 16);
        assert_eq!(fs::read(&dest).unwrap(), b"some audio bytes");
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn test_copy_canceled_removes_part() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.mp3");
        let dest = dir.path().join("dest.mp3");
        fs::write(&src, vec![0u8; 1024]).unwrap();

        let cancel = AtomicBool::new(true);
        let result = copy_with_staging(&src, &dest, 64, &policy(), &cancel);

        assert!(matches!(result, Err(SweepError::Canceled)));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn test_sha1_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"abc").unwrap();

        // well-known SHA-1 of "abc"
        assert_eq!(
            sha1_file(&path).unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_verify_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        fs::write(&path, b"1234").unwrap();

        assert!(verify_size(&path, 4, &policy()).is_ok());
        assert!(matches!(
            verify_size(&path, 5, &policy()),
            Err(SweepError::VerificationFailed(_))
        ));
    }

    #[test]
    fn test_verify_hash_matches() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"same").unwrap();
        fs::write(&b, b"same").unwrap();

        assert!(verify_hash(&a, &b).is_ok());

        fs::write(&b, b"diff").unwrap();
        assert!(verify_hash(&a, &b).is_err());
    }

    #[test]
    fn test_hardlink_shares_content() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.flac");
        let dest = dir.path().join("linked/dest.flac");
        fs::write(&src, b"flac bytes").unwrap();

        hardlink(&src, &dest, &policy()).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"flac bytes");
    }
}
