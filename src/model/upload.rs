use crate::error::ViewerError;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// DICOM Part 10 files carry a 128 byte preamble followed by `DICM`.
const DICOM_PREAMBLE_LEN: usize = 128;
const DICOM_MAGIC: &[u8; 4] = b"DICM";

/// Enough leading bytes for every matcher `infer` ships with.
const SNIFF_LEN: u64 = 8192;

pub const DICOM_MIME_TYPE: &str = "application/dicom";

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u64);

impl FileId {
    fn next() -> Self {
        Self(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// A file picked or dropped by the user. Never mutated after creation;
/// selecting the same path twice yields two distinct identities.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    id: FileId,
    path: PathBuf,
    name: String,
    mime_type: String,
    size: u64,
}

impl UploadedFile {
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: FileId::next(),
            path: path.into(),
            name: name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }

    /// Reads size and sniffs the declared type of the file at `path`.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = sniff_mime_type(path)?;
        Ok(Self::new(path, name, mime_type, size))
    }

    /// Same as [`UploadedFile::from_path`], off the UI thread.
    pub async fn open(path: PathBuf) -> Result<Self, ViewerError> {
        let display = path.display().to_string();
        tokio::task::spawn_blocking(move || Self::from_path(&path))
            .await
            .map_err(|err| ViewerError::Io(format!("{display}: {err}")))?
            .map_err(|err| {
                log::error!("{display}: failed to read file ({err})");
                ViewerError::Io(format!("{display}: {err}"))
            })
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sniffed MIME type, empty when nothing matched.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

fn sniff_mime_type(path: &Path) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;
    Ok(mime_type_of(&head))
}

pub(crate) fn mime_type_of(head: &[u8]) -> String {
    let mut info = infer::Infer::new();
    info.add(DICOM_MIME_TYPE, "dcm", is_dicom_part10);
    info.get(head)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_default()
}

fn is_dicom_part10(buf: &[u8]) -> bool {
    buf.len() >= DICOM_PREAMBLE_LEN + DICOM_MAGIC.len()
        && &buf[DICOM_PREAMBLE_LEN..DICOM_PREAMBLE_LEN + DICOM_MAGIC.len()] == DICOM_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn every_upload_gets_a_fresh_identity() {
        let first = UploadedFile::new("a.png", "a.png", "", 1);
        let second = UploadedFile::new("a.png", "a.png", "", 1);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn dicom_preamble_is_sniffed() {
        let mut bytes = vec![0u8; DICOM_PREAMBLE_LEN];
        bytes.extend_from_slice(DICOM_MAGIC);
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(mime_type_of(&bytes), DICOM_MIME_TYPE);
    }

    #[test]
    fn png_signature_is_sniffed() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(mime_type_of(&png), "image/png");
    }

    #[test]
    fn unrecognized_bytes_leave_mime_empty() {
        assert_eq!(mime_type_of(b"just some text"), "");
        assert_eq!(mime_type_of(&[]), "");
    }

    #[test]
    fn from_path_reads_name_and_size() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("notes.xyz");
        let mut file = File::create(&path).expect("create file");
        file.write_all(b"0123456789").expect("write file");

        let upload = UploadedFile::from_path(&path).expect("read upload");
        assert_eq!(upload.name(), "notes.xyz");
        assert_eq!(upload.size(), 10);
        assert_eq!(upload.mime_type(), "");
        assert_eq!(upload.path(), path.as_path());
    }

    #[tokio::test]
    async fn open_reports_missing_files() {
        let dir = tempdir().expect("temp dir");
        let result = UploadedFile::open(dir.path().join("missing.dcm")).await;
        assert!(matches!(result, Err(ViewerError::Io(_))));
    }
}
