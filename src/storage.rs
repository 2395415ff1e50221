use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Local blob store for attachment bytes. Metadata lives in the database;
/// this type only ever writes new files, so an existing upload can never be
/// overwritten.
#[derive(Clone, Debug)]
pub struct AttachmentStore {
    root: PathBuf,
}

/// What `save` produced: the on-disk name (random-prefixed) plus the
/// metadata the attachment row needs.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub stored_name: String,
    pub mime: String,
    pub size: i64,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the bytes under a fresh random-prefixed name derived from the
    /// sanitized filename. Distinct uploads of the same filename land in
    /// distinct files.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<StoredBlob> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .context("Failed to create upload directory")?;

        let safe = sanitize_filename(filename);
        let stored_name = format!("{}_{}", uuid::Uuid::new_v4().simple(), safe);
        let path = self.root.join(&stored_name);

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write attachment {}", path.display()))?;

        let mime = mime_guess::from_path(&safe)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(StoredBlob {
            stored_name,
            mime,
            size: bytes.len() as i64,
        })
    }
}

/// Reduce an uploaded filename to a safe single path component. Anything
/// outside [A-Za-z0-9._-] becomes '_'; leading dots are stripped so the
/// result can never be a hidden file or traversal fragment.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim_start_matches('.');

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// File extension in lowercase, if the name has one.
#[must_use]
pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("/var/log/app.log"), "app.log");
        assert_eq!(sanitize_filename("C:\\Users\\x\\report.pdf"), "report.pdf");
    }

    #[test]
    fn sanitize_replaces_odd_characters() {
        assert_eq!(sanitize_filename("my report (final).pdf"), "my_report__final_.pdf");
        assert_eq!(sanitize_filename("képernyő.png"), "k_perny_.png");
    }

    #[test]
    fn sanitize_never_returns_empty_or_hidden() {
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename("..."), "file");
        assert_eq!(sanitize_filename(".bashrc"), "bashrc");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(file_extension("shot.PNG").as_deref(), Some("png"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[tokio::test]
    async fn save_disambiguates_identical_filenames() {
        let dir = std::env::temp_dir().join(format!("deskd-test-{}", uuid::Uuid::new_v4()));
        let store = AttachmentStore::new(&dir);

        let first = store.save("log.txt", b"one").await.unwrap();
        let second = store.save("log.txt", b"two").await.unwrap();

        assert_ne!(first.stored_name, second.stored_name);
        assert!(first.stored_name.ends_with("_log.txt"));

        let first_bytes = tokio::fs::read(dir.join(&first.stored_name)).await.unwrap();
        let second_bytes = tokio::fs::read(dir.join(&second.stored_name)).await.unwrap();
        assert_eq!(first_bytes, b"one");
        assert_eq!(second_bytes, b"two");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn save_detects_mime_from_extension() {
        let dir = std::env::temp_dir().join(format!("deskd-test-{}", uuid::Uuid::new_v4()));
        let store = AttachmentStore::new(&dir);

        let blob = store.save("screen.png", &[0u8; 4]).await.unwrap();
        assert_eq!(blob.mime, "image/png");
        assert_eq!(blob.size, 4);

        let blob = store.save("dump.weird", &[0u8; 4]).await.unwrap();
        assert_eq!(blob.mime, "application/octet-stream");

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
