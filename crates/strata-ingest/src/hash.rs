//! Content digests for copy detection.

use std::{
  fs::File,
  io::{self, Read as _},
  path::{Path, PathBuf},
};

use sha2::{Digest as _, Sha256};

const BLOCK_SIZE: usize = 64 * 1024;

fn digest(path: &Path) -> io::Result<String> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = vec![0u8; BLOCK_SIZE];

  loop {
    let n = file.read(&mut buffer)?;
    if n == 0 {
      break;
    }
    hasher.update(&buffer[..n]);
  }

  Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of the file content, read on a blocking thread.
///
/// A file that cannot be read has no digest; it is logged and never treated
/// as a copy.
pub async fn hash_file(path: PathBuf) -> Option<String> {
  let result = tokio::task::spawn_blocking(move || {
    let out = digest(&path);
    (path, out)
  })
  .await;

  match result {
    Ok((_, Ok(hash))) => Some(hash),
    Ok((path, Err(e))) => {
      tracing::warn!(path = %path.display(), error = %e, "cannot hash file");
      None
    }
    Err(e) => {
      tracing::warn!(error = %e, "hashing task failed");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  #[tokio::test]
  async fn digest_matches_one_shot_sha256() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.bin");
    // Spans several blocks.
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&path, &content).unwrap();

    let hash = hash_file(path).await.unwrap();
    assert_eq!(hash, hex::encode(Sha256::digest(&content)));
  }

  #[tokio::test]
  async fn unreadable_file_has_no_digest() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(hash_file(dir.path().join("missing")).await, None);
  }
}
