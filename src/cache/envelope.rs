use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::index::SourceRecord;

/// Persisted index format version. Bump when `SourceRecord` or `Dependency` layout
/// changes: bincode is not self-describing.
pub const INDEX_VERSION: u32 = 2;

/// State directory name (created in the workspace root).
pub const INDEX_DIR: &str = ".depgraph";
/// Index file name within INDEX_DIR.
pub const INDEX_FILE: &str = "reverse-index.bin";

/// Serialized form of the reverse index: the forward record of every indexed source.
/// The target → sources map is rebuilt from these on restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexEnvelope {
    pub root: PathBuf,
    pub sources: Vec<(PathBuf, SourceRecord)>,
}

/// `<root>/.depgraph/reverse-index.bin`
pub fn index_path(root: &Path) -> PathBuf {
    root.join(INDEX_DIR).join(INDEX_FILE)
}

/// Encode as a `u32` version header followed by the envelope.
pub fn encode(envelope: &IndexEnvelope) -> Result<Vec<u8>, PersistError> {
    let config = bincode::config::standard();
    let mut bytes = bincode::serde::encode_to_vec(INDEX_VERSION, config)?;
    bytes.extend(bincode::serde::encode_to_vec(envelope, config)?);
    Ok(bytes)
}

/// Decode bytes produced by [`encode`]. The header is checked before the body is
/// touched, so an older layout reports `Version` rather than a decode error.
pub fn decode(bytes: &[u8]) -> Result<IndexEnvelope, PersistError> {
    let config = bincode::config::standard();
    let (version, read) = bincode::serde::decode_from_slice::<u32, _>(bytes, config)?;
    if version != INDEX_VERSION {
        return Err(PersistError::Version {
            found: version,
            expected: INDEX_VERSION,
        });
    }
    let (envelope, _) = bincode::serde::decode_from_slice::<IndexEnvelope, _>(&bytes[read..], config)?;
    Ok(envelope)
}

/// Write `bytes` to the index file atomically.
///
/// Writes to a temp file first, then renames to the final path.
/// Creates the `.depgraph/` directory if it doesn't exist.
pub fn save(root: &Path, bytes: &[u8]) -> Result<PathBuf, PersistError> {
    let dir = root.join(INDEX_DIR);
    std::fs::create_dir_all(&dir)?;

    let target = index_path(root);
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().flush()?;
    tmp.persist(&target)?;

    Ok(target)
}

/// Read the index file. `Ok(None)` when none has been written yet.
pub fn load(root: &Path) -> Result<Option<Vec<u8>>, PersistError> {
    match std::fs::read(index_path(root)) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dependency, DependencyKind};

    fn sample() -> IndexEnvelope {
        IndexEnvelope {
            root: PathBuf::from("/proj"),
            sources: vec![(
                PathBuf::from("/proj/a.ts"),
                SourceRecord {
                    hash: "00000000deadbeef".to_owned(),
                    dependencies: vec![Dependency {
                        path: PathBuf::from("/proj/b.ts"),
                        kind: DependencyKind::StaticImport,
                        line: 3,
                        module: "./b".to_owned(),
                        is_external: false,
                        is_used: true,
                        unused_names: Vec::new(),
                    }],
                },
            )],
        }
    }

    #[test]
    fn test_save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let bytes = encode(&sample()).unwrap();
        let path = save(tmp.path(), &bytes).unwrap();
        assert_eq!(path, tmp.path().join(".depgraph/reverse-index.bin"));

        let loaded = load(tmp.path()).unwrap().expect("index file should exist");
        assert_eq!(decode(&loaded).unwrap(), sample());
    }

    #[test]
    fn test_load_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let config = bincode::config::standard();
        let mut bytes = bincode::serde::encode_to_vec(INDEX_VERSION + 1, config).unwrap();
        bytes.extend(bincode::serde::encode_to_vec(sample(), config).unwrap());
        match decode(&bytes) {
            Err(PersistError::Version { found, expected }) => {
                assert_eq!(found, INDEX_VERSION + 1);
                assert_eq!(expected, INDEX_VERSION);
            }
            other => panic!("expected version error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_body_is_decode_error() {
        let bytes = encode(&sample()).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() / 2]),
            Err(PersistError::Decode(_))
        ));
    }
}
