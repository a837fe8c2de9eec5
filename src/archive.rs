//! Archive builder: packs stored variants into one zip and stores it.

use crate::constants::ARCHIVE_CONTENT_TYPE;
use crate::error::Result;
use crate::store::{ObjectSink, UploadResult};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// Entry name for a stored key: its final path segment, never containing a
/// separator. Falls back to `fallback` for keys with no usable segment.
pub fn archive_entry_name(key: &str, fallback: &str) -> String {
    let normalized = key.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or(fallback)
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Stored {
        result: UploadResult,
        entries: usize,
        skipped: Vec<String>,
    },
    Skipped {
        reason: String,
    },
}

impl ArchiveOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        ArchiveOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, ArchiveOutcome::Stored { result, .. } if result.success)
    }

    pub fn upload_result(&self) -> Option<&UploadResult> {
        match self {
            ArchiveOutcome::Stored { result, .. } => Some(result),
            ArchiveOutcome::Skipped { .. } => None,
        }
    }
}

/// Zip bytes plus the bookkeeping the caller reports on.
#[derive(Debug)]
pub struct PackedArchive {
    pub bytes: Vec<u8>,
    pub entries: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct ArchiveBuilder<'a> {
    sink: &'a dyn ObjectSink,
    archive_key: String,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(sink: &'a dyn ObjectSink, archive_key: impl Into<String>) -> Self {
        Self {
            sink,
            archive_key: archive_key.into(),
        }
    }

    pub fn archive_key(&self) -> &str {
        &self.archive_key
    }

    /// Fetches every key and packs whatever could be read. Keys that fail to
    /// fetch, or whose entry name was already used, end up in `skipped`.
    pub fn pack(&self, keys: &[String]) -> Result<PackedArchive> {
        let mut buffer = Vec::new();
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644);

            for (index, key) in keys.iter().enumerate() {
                let name = archive_entry_name(key, &format!("unnamed_{}", index));
                if seen.contains(&name) {
                    tracing::warn!(key = %key, entry = %name, "Duplicate archive entry name, skipping");
                    skipped.push(key.clone());
                    continue;
                }

                let data = match self.sink.fetch(key) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Failed to fetch object for archive");
                        skipped.push(key.clone());
                        continue;
                    }
                };

                zip.start_file(name.as_str(), options)?;
                zip.write_all(&data)?;
                seen.insert(name.clone());
                entries.push(name);
            }

            zip.finish()?;
        }

        Ok(PackedArchive {
            bytes: buffer,
            entries,
            skipped,
        })
    }

    /// Builds the archive from `keys` and stores it under the archive key.
    /// Never fails: an empty key list, zero successful fetches, or a zip
    /// writer error all yield [`ArchiveOutcome::Skipped`].
    pub fn build(&self, keys: &[String]) -> ArchiveOutcome {
        if keys.is_empty() {
            tracing::info!("No stored objects, archive not built");
            return ArchiveOutcome::skipped("no stored objects");
        }

        let packed = match self.pack(keys) {
            Ok(packed) => packed,
            Err(e) => {
                tracing::error!(error = %e, archive_key = %self.archive_key, "Failed to build archive");
                return ArchiveOutcome::skipped(format!("archive could not be written: {}", e));
            }
        };

        if packed.entries.is_empty() {
            tracing::warn!(
                requested = keys.len(),
                "None of the stored objects could be fetched, archive not built"
            );
            return ArchiveOutcome::skipped("no objects could be fetched");
        }

        tracing::info!(
            archive_key = %self.archive_key,
            entries = packed.entries.len(),
            skipped = packed.skipped.len(),
            size_bytes = packed.bytes.len(),
            "Archive packed"
        );

        let entries = packed.entries.len();
        let result = self
            .sink
            .store(packed.bytes, &self.archive_key, ARCHIVE_CONTENT_TYPE);

        ArchiveOutcome::Stored {
            result,
            entries,
            skipped: packed.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectStoreSink;
    use std::io::Read;

    fn read_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn test_archive_entry_name_strips_prefix() {
        assert_eq!(
            archive_entry_name("processed-images/web_photo1.jpg", "x"),
            "web_photo1.jpg"
        );
        assert_eq!(archive_entry_name("a/b/c/print_d.png", "x"), "print_d.png");
        assert_eq!(archive_entry_name("flat.jpg", "x"), "flat.jpg");
        assert_eq!(archive_entry_name("dir\\win.jpg", "x"), "win.jpg");
    }

    #[test]
    fn test_archive_entry_name_fallback() {
        assert_eq!(archive_entry_name("", "unnamed_0"), "unnamed_0");
        assert_eq!(archive_entry_name("..", "unnamed_1"), "unnamed_1");
        assert_eq!(archive_entry_name("../../etc/passwd", "x"), "passwd");
    }

    #[test]
    fn test_build_stores_archive_with_flat_entries() {
        let sink = ObjectStoreSink::in_memory().unwrap();
        sink.store(b"one".to_vec(), "processed-images/web_a.jpg", "image/jpeg");
        sink.store(b"two".to_vec(), "processed-images/print_a.png", "image/png");

        let builder = ArchiveBuilder::new(&sink, "zipped-files/processed_images.zip");
        let keys = vec![
            "processed-images/web_a.jpg".to_string(),
            "processed-images/print_a.png".to_string(),
        ];

        let outcome = builder.build(&keys);
        assert!(outcome.is_stored());
        match &outcome {
            ArchiveOutcome::Stored { entries, skipped, .. } => {
                assert_eq!(*entries, 2);
                assert!(skipped.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let bytes = sink.fetch("zipped-files/processed_images.zip").unwrap();
        let entries = read_entries(&bytes);
        assert_eq!(
            entries,
            vec![
                ("web_a.jpg".to_string(), b"one".to_vec()),
                ("print_a.png".to_string(), b"two".to_vec()),
            ]
        );
    }

    #[test]
    fn test_missing_keys_are_skipped() {
        let sink = ObjectStoreSink::in_memory().unwrap();
        sink.store(b"present".to_vec(), "p/web_a.jpg", "image/jpeg");

        let builder = ArchiveBuilder::new(&sink, "z/out.zip");
        let keys = vec!["p/web_a.jpg".to_string(), "p/web_gone.jpg".to_string()];

        match builder.build(&keys) {
            ArchiveOutcome::Stored { entries, skipped, result } => {
                assert!(result.success);
                assert_eq!(entries, 1);
                assert_eq!(skipped, vec!["p/web_gone.jpg".to_string()]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_empty_key_list_is_skipped() {
        let sink = ObjectStoreSink::in_memory().unwrap();
        let builder = ArchiveBuilder::new(&sink, "z/out.zip");
        assert!(matches!(builder.build(&[]), ArchiveOutcome::Skipped { .. }));
        assert!(sink.fetch("z/out.zip").is_err());
    }

    #[test]
    fn test_all_fetches_failing_is_skipped() {
        let sink = ObjectStoreSink::in_memory().unwrap();
        let builder = ArchiveBuilder::new(&sink, "z/out.zip");
        let outcome = builder.build(&["p/missing.jpg".to_string()]);
        assert!(matches!(outcome, ArchiveOutcome::Skipped { .. }));
        assert!(outcome.upload_result().is_none());
        assert!(sink.fetch("z/out.zip").is_err());
    }

    #[test]
    fn test_duplicate_entry_names_keep_first() {
        let sink = ObjectStoreSink::in_memory().unwrap();
        sink.store(b"first".to_vec(), "a/web_x.jpg", "image/jpeg");
        sink.store(b"second".to_vec(), "b/web_x.jpg", "image/jpeg");

        let builder = ArchiveBuilder::new(&sink, "z/out.zip");
        let packed = builder
            .pack(&["a/web_x.jpg".to_string(), "b/web_x.jpg".to_string()])
            .unwrap();

        assert_eq!(packed.entries, vec!["web_x.jpg".to_string()]);
        assert_eq!(packed.skipped, vec!["b/web_x.jpg".to_string()]);
        assert_eq!(read_entries(&packed.bytes)[0].1, b"first".to_vec());
    }
}
