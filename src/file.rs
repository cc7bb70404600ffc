use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::mimetype::{MimeDetector, OCTET_STREAM};

type Reader = Box<dyn AsyncRead + Send + Unpin>;

enum Origin {
    Path(PathBuf),
    Bytes(Bytes),
    Reader(Mutex<Option<Reader>>),
}

/// A named byte payload with a MIME type
///
/// Built from exactly one source kind: a filesystem path, an in-memory
/// buffer, or an async reader. Bytes are materialized on first access and
/// cached; a path is never re-read and a reader is consumed once and then
/// dropped. The MIME type is inferred only when none was declared.
///
/// # Examples
///
/// ```rust
/// use httputils::file::FileSource;
///
/// let avatar = FileSource::from_bytes("avatar.png", vec![0x89, b'P', b'N', b'G'])
///     .with_mime_type("image/png");
/// assert_eq!(avatar.file_name(), "avatar.png");
/// ```
pub struct FileSource {
    file_name: String,
    declared_mime: Option<String>,
    origin: Origin,
    bytes: OnceCell<Bytes>,
    mime: OnceCell<String>,
}

impl FileSource {
    /// Create a source backed by a file on disk
    ///
    /// The file name is the last path component. Nothing is read until
    /// [`bytes`](Self::bytes) is called.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self::new(file_name, Origin::Path(path), OnceCell::new())
    }

    /// Create a source from an in-memory buffer
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::new(
            file_name.into(),
            Origin::Bytes(bytes.clone()),
            OnceCell::new_with(Some(bytes)),
        )
    }

    /// Create a source from an async reader, drained on first access
    pub fn from_reader<R>(file_name: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::new(
            file_name.into(),
            Origin::Reader(Mutex::new(Some(Box::new(reader)))),
            OnceCell::new(),
        )
    }

    fn new(file_name: String, origin: Origin, bytes: OnceCell<Bytes>) -> Self {
        Self {
            file_name,
            declared_mime: None,
            origin,
            bytes,
            mime: OnceCell::new(),
        }
    }

    /// Declare the MIME type, skipping detection
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.declared_mime = Some(mime_type.into());
        self
    }

    /// Get the file name sent in the multipart `filename` parameter
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Get the declared MIME type, if any
    pub fn declared_mime(&self) -> Option<&str> {
        self.declared_mime.as_deref()
    }

    /// Get the payload, reading it on first call
    pub async fn bytes(&self) -> Result<&Bytes> {
        self.bytes.get_or_try_init(|| self.materialize()).await
    }

    async fn materialize(&self) -> Result<Bytes> {
        match &self.origin {
            Origin::Bytes(bytes) => Ok(bytes.clone()),
            Origin::Path(path) => {
                let data = tokio::fs::read(path).await.map_err(|e| {
                    std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
                })?;
                Ok(Bytes::from(data))
            }
            Origin::Reader(slot) => {
                let reader = slot
                    .lock()
                    .map_err(|_| Error::Io(std::io::Error::other("reader lock poisoned")))?
                    .take();
                let mut reader = reader.ok_or_else(|| {
                    Error::Io(std::io::Error::other(format!(
                        "stream for {} was already consumed",
                        self.file_name
                    )))
                })?;
                let mut data = Vec::new();
                reader.read_to_end(&mut data).await?;
                Ok(Bytes::from(data))
            }
        }
    }

    /// Get the MIME type, detecting it on first call when none was declared
    ///
    /// Path sources are detected by name first and by content when the name
    /// says nothing. Buffer and reader sources are detected by content.
    pub async fn resolve_mime(&self, detector: &dyn MimeDetector) -> Result<&str> {
        let mime = self.mime.get_or_try_init(|| self.detect_mime(detector)).await?;
        Ok(mime.as_str())
    }

    async fn detect_mime(&self, detector: &dyn MimeDetector) -> Result<String> {
        if let Some(declared) = &self.declared_mime {
            return Ok(declared.clone());
        }
        if matches!(self.origin, Origin::Path(_)) {
            let by_name = detector.detect_name(&self.file_name)?;
            if by_name != OCTET_STREAM {
                return Ok(by_name);
            }
        }
        let bytes = self.bytes().await?;
        Ok(detector.detect_bytes(bytes)?)
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match &self.origin {
            Origin::Path(path) => format!("Path({})", path.display()),
            Origin::Bytes(bytes) => format!("Bytes({} bytes)", bytes.len()),
            Origin::Reader(_) => "Reader".to_string(),
        };
        f.debug_struct("FileSource")
            .field("file_name", &self.file_name)
            .field("declared_mime", &self.declared_mime)
            .field("origin", &origin)
            .field("materialized", &self.bytes.initialized())
            .finish()
    }
}

/// A single file submitted under its own form field name
#[derive(Debug)]
pub struct KeyedFile {
    pub key: String,
    pub file: FileSource,
}

impl KeyedFile {
    pub fn new(key: impl Into<String>, file: FileSource) -> Self {
        Self {
            key: key.into(),
            file,
        }
    }
}

/// Several files submitted under one form field name, in order
#[derive(Debug)]
pub struct KeyedFileGroup {
    pub key: String,
    pub files: Vec<FileSource>,
}

impl KeyedFileGroup {
    pub fn new(key: impl Into<String>, files: Vec<FileSource>) -> Self {
        Self {
            key: key.into(),
            files,
        }
    }

    /// Append a file to the group
    pub fn push(mut self, file: FileSource) -> Self {
        self.files.push(file);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectionError;
    use crate::mimetype::SniffingDetector;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    struct FailingDetector;

    impl MimeDetector for FailingDetector {
        fn detect_bytes(&self, _bytes: &[u8]) -> std::result::Result<String, DetectionError> {
            Err(DetectionError::new("content", "no signature database"))
        }

        fn detect_name(&self, name: &str) -> std::result::Result<String, DetectionError> {
            Err(DetectionError::new(name, "no extension table"))
        }
    }

    /// Counts how many times it is polled for data
    struct CountingReader {
        data: &'static [u8],
        reads: std::sync::Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let n = self.data.len().min(buf.remaining());
            buf.put_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Poll::Ready(Ok(()))
        }
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer went away",
            )))
        }
    }

    #[tokio::test]
    async fn test_bytes_source_detects_by_content() {
        let file = FileSource::from_bytes("blob", &b"%PDF-1.4 ..."[..]);
        let mime = file.resolve_mime(&SniffingDetector).await.unwrap();
        assert_eq!(mime, "application/pdf");
        assert_eq!(file.bytes().await.unwrap().as_ref(), b"%PDF-1.4 ...");
    }

    #[test]
    fn test_bytes_source_is_materialized_up_front() {
        let file = FileSource::from_bytes("note.txt", "ready");
        assert!(file.bytes.initialized());
        assert_eq!(file.bytes.get().map(|b| b.as_ref()), Some(&b"ready"[..]));
        assert!(format!("{:?}", file).contains("materialized: true"));

        let lazy = FileSource::from_path("/tmp/not-read-yet.txt");
        assert!(!lazy.bytes.initialized());
    }

    #[tokio::test]
    async fn test_declared_mime_skips_detection() {
        let file = FileSource::from_bytes("blob", vec![1, 2, 3]).with_mime_type("image/x-custom");
        let mime = file.resolve_mime(&FailingDetector).await.unwrap();
        assert_eq!(mime, "image/x-custom");
    }

    #[tokio::test]
    async fn test_detection_failure_is_io_error() {
        let file = FileSource::from_bytes("blob", vec![1, 2, 3]);
        let err = file.resolve_mime(&FailingDetector).await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_path_source_reads_once() {
        let path = std::env::temp_dir().join("httputils_file_source_once.txt");
        std::fs::write(&path, "first").unwrap();

        let file = FileSource::from_path(&path);
        assert_eq!(file.file_name(), "httputils_file_source_once.txt");
        assert_eq!(file.bytes().await.unwrap().as_ref(), b"first");

        std::fs::write(&path, "second").unwrap();
        assert_eq!(file.bytes().await.unwrap().as_ref(), b"first");
        assert_eq!(file.resolve_mime(&SniffingDetector).await.unwrap(), "text/plain");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_path_is_io_error() {
        let file = FileSource::from_path("/definitely/not/here/upload.bin");
        let err = file.bytes().await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_reader_consumed_once() {
        let reads = std::sync::Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            data: b"streamed payload",
            reads: reads.clone(),
        };
        let file = FileSource::from_reader("stream.txt", reader);

        assert_eq!(file.bytes().await.unwrap().as_ref(), b"streamed payload");
        let after_first = reads.load(Ordering::SeqCst);
        assert_eq!(file.bytes().await.unwrap().as_ref(), b"streamed payload");
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test]
    async fn test_reader_failure_is_io_error() {
        let file = FileSource::from_reader("broken.bin", BrokenReader);
        let err = file.bytes().await.unwrap_err();
        assert!(err.is_io());
        // The reader is gone; a retry reports it instead of hanging.
        assert!(file.bytes().await.unwrap_err().is_io());
    }

    #[test]
    fn test_group_preserves_order() {
        let group = KeyedFileGroup::new("attachments", Vec::new())
            .push(FileSource::from_bytes("a.txt", "a"))
            .push(FileSource::from_bytes("b.txt", "b"));
        let names: Vec<_> = group.files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
