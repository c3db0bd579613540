//! File classification by content signature.

use std::{
  fs::File,
  io::Read as _,
  path::Path,
};

use strata_core::file::FileType;

use crate::Result;

/// Assigns a [`FileType`] to a path, or `None` for entries that are not
/// recorded at all.
pub trait Classifier: Send + Sync {
  fn classify(&self, path: &Path) -> Result<Option<FileType>>;
}

/// Magic-byte classifier.
///
/// - DICOM: `DICM` after the 128-byte preamble.
/// - NIfTI-1: `n+1\0` or `ni1\0` at offset 344.
/// - NIfTI-2: `n+2\0` or `ni2\0` at offset 4.
/// - Gzipped NIfTI is recognised by its `.nii.gz` name.
///
/// Directories and other non-regular entries yield `None`; every other
/// regular file is `Other`, including one whose content cannot be read. A
/// path that no longer exists is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagicClassifier;

const DICOM_MAGIC_AT: usize = 128;
const NIFTI1_MAGIC_AT: usize = 344;
const NIFTI2_MAGIC_AT: usize = 4;
const HEADER_LEN: u64 = 348;

fn magic_at(buf: &[u8], offset: usize, magics: &[&[u8; 4]]) -> bool {
  buf
    .get(offset..offset + 4)
    .is_some_and(|window| magics.iter().any(|m| window == m.as_slice()))
}

impl Classifier for MagicClassifier {
  fn classify(&self, path: &Path) -> Result<Option<FileType>> {
    if !path.metadata()?.is_file() {
      return Ok(None);
    }

    let mut buf = Vec::with_capacity(HEADER_LEN as usize);
    if let Err(e) = File::open(path).and_then(|f| f.take(HEADER_LEN).read_to_end(&mut buf)) {
      tracing::warn!(path = %path.display(), error = %e, "cannot read signature; recording as other");
      return Ok(Some(FileType::Other));
    }

    let file_type = if magic_at(&buf, DICOM_MAGIC_AT, &[b"DICM"]) {
      FileType::Dicom
    } else if magic_at(&buf, NIFTI1_MAGIC_AT, &[b"n+1\0", b"ni1\0"])
      || magic_at(&buf, NIFTI2_MAGIC_AT, &[b"n+2\0", b"ni2\0"])
      || path.to_string_lossy().ends_with(".nii.gz")
    {
      FileType::Nifti
    } else {
      FileType::Other
    };

    Ok(Some(file_type))
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  fn write_with_magic(path: &Path, offset: usize, magic: &[u8], len: usize) {
    let mut bytes = vec![0u8; len];
    bytes[offset..offset + magic.len()].copy_from_slice(magic);
    fs::write(path, bytes).unwrap();
  }

  #[test]
  fn recognises_signatures() {
    let dir = tempfile::tempdir().unwrap();
    let c = MagicClassifier;

    let dcm = dir.path().join("IM0001");
    write_with_magic(&dcm, 128, b"DICM", 256);
    assert_eq!(c.classify(&dcm).unwrap(), Some(FileType::Dicom));

    let nii = dir.path().join("brain.nii");
    write_with_magic(&nii, 344, b"n+1\0", 352);
    assert_eq!(c.classify(&nii).unwrap(), Some(FileType::Nifti));

    let nii2 = dir.path().join("brain2.nii");
    write_with_magic(&nii2, 4, b"n+2\0", 540);
    assert_eq!(c.classify(&nii2).unwrap(), Some(FileType::Nifti));

    let gz = dir.path().join("brain.nii.gz");
    fs::write(&gz, [0x1f, 0x8b, 0x08]).unwrap();
    assert_eq!(c.classify(&gz).unwrap(), Some(FileType::Nifti));

    let txt = dir.path().join("notes.txt");
    fs::write(&txt, "hello").unwrap();
    assert_eq!(c.classify(&txt).unwrap(), Some(FileType::Other));

    assert_eq!(c.classify(dir.path()).unwrap(), None);
  }

  #[cfg(unix)]
  #[test]
  fn unreadable_file_is_other() {
    use std::os::unix::fs::PermissionsExt as _;

    let dir = tempfile::tempdir().unwrap();
    let locked = dir.path().join("IM0001");
    write_with_magic(&locked, 128, b"DICM", 256);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&locked).is_ok() {
      // Permissions are not enforced for this user.
      return;
    }
    assert_eq!(MagicClassifier.classify(&locked).unwrap(), Some(FileType::Other));
  }

  #[test]
  fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(MagicClassifier.classify(&dir.path().join("gone")).is_err());
  }
}
