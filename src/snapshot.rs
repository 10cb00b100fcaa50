//! Snapshot data model: file records keyed by portable relative path

use crate::crypto::{EncryptedBlob, Encryptor};
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Extensions stored as base64 binary rather than UTF-8 text
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "ico", "tiff", "svgz", "zip", "tar", "gz", "tgz",
    "bz2", "xz", "7z", "rar", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods",
    "odp",
];

/// How plaintext content is encoded in the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Binary,
    Text,
}

impl FileKind {
    /// Classify by extension only; content never changes the processing path
    pub fn for_path(path: &Path) -> Self {
        let binary = extension_of(path)
            .map(|ext| BINARY_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false);
        if binary {
            Self::Binary
        } else {
            Self::Text
        }
    }
}

/// Guess a MIME type from the file extension
pub fn mime_type_for(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("csv") => "text/csv",
        Some("js") | Some("mjs") => "text/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("yaml") | Some("yml") => "application/yaml",
        Some("toml") => "application/toml",
        Some("rs") => "text/x-rust",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("tiff") => "image/tiff",
        Some("zip") => "application/zip",
        Some("tar") => "application/x-tar",
        Some("gz") | Some("tgz") => "application/gzip",
        Some("bz2") => "application/x-bzip2",
        Some("xz") => "application/x-xz",
        Some("7z") => "application/x-7z-compressed",
        Some("rar") => "application/vnd.rar",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("odt") => "application/vnd.oasis.opendocument.text",
        Some("ods") => "application/vnd.oasis.opendocument.spreadsheet",
        Some("odp") => "application/vnd.oasis.opendocument.presentation",
        _ if FileKind::for_path(path) == FileKind::Binary => "application/octet-stream",
        _ => "text/plain",
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Join the normal components of a relative path with `/`
pub fn portable_key(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            Component::CurDir => continue,
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Resolve a snapshot key below `root`, rejecting keys that would escape it
pub fn resolve_key(root: &Path, key: &str) -> Result<PathBuf> {
    if key.starts_with('/') {
        return Err(Error::validation(format!("absolute snapshot path: {key}")));
    }
    let mut target = root.to_path_buf();
    let mut depth = 0usize;
    for part in key.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(Error::validation(format!("path escapes restore root: {key}"))),
            part if !is_single_normal(part) => {
                return Err(Error::validation(format!("unsafe path component in {key}")))
            }
            part => {
                target.push(part);
                depth += 1;
            }
        }
    }
    if depth == 0 {
        return Err(Error::validation(format!("empty snapshot path: {key:?}")));
    }
    Ok(target)
}

fn is_single_normal(part: &str) -> bool {
    let mut components = Path::new(part).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Stored content of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    Plain { kind: FileKind, content: Vec<u8> },
    Encrypted(EncryptedBlob),
}

/// The stored representation of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord", into = "WireRecord")]
pub struct FileRecord {
    mime_type: String,
    body: RecordBody,
}

impl FileRecord {
    /// Plaintext record. Text that is not valid UTF-8 is kept as binary so no bytes are lost.
    pub fn plain(kind: FileKind, content: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let kind = match kind {
            FileKind::Text if std::str::from_utf8(&content).is_err() => FileKind::Binary,
            kind => kind,
        };
        Self {
            mime_type: mime_type.into(),
            body: RecordBody::Plain { kind, content },
        }
    }

    pub fn encrypted(blob: EncryptedBlob, mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            body: RecordBody::Encrypted(blob),
        }
    }

    /// Classify and wrap the raw bytes found at `path`
    pub fn from_content(path: &Path, content: Vec<u8>) -> Self {
        Self::plain(FileKind::for_path(path), content, mime_type_for(path))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn body(&self) -> &RecordBody {
        &self.body
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.body, RecordBody::Encrypted(_))
    }

    /// Decoded content length, or ciphertext length for encrypted records
    pub fn size(&self) -> u64 {
        match &self.body {
            RecordBody::Plain { content, .. } => content.len() as u64,
            RecordBody::Encrypted(blob) => blob.ciphertext.len() as u64,
        }
    }

    /// Raw bytes of a plaintext record
    pub fn plain_content(&self) -> Option<&[u8]> {
        match &self.body {
            RecordBody::Plain { content, .. } => Some(content),
            RecordBody::Encrypted(_) => None,
        }
    }

    /// Bytes to write on restore: decrypted when encrypted, as stored otherwise
    pub fn open(&self, encryptor: Option<&Encryptor>, key: &str) -> Result<Vec<u8>> {
        match &self.body {
            RecordBody::Plain { content, .. } => Ok(content.clone()),
            RecordBody::Encrypted(blob) => {
                let encryptor = encryptor.ok_or_else(|| {
                    Error::validation(format!(
                        "{key} is encrypted but no encryption key was supplied"
                    ))
                })?;
                encryptor
                    .decrypt(&blob.ciphertext, &blob.iv, blob.auth_tag.as_deref())
                    .map_err(|e| match e {
                        Error::Integrity { reason } => Error::integrity(format!("{key}: {reason}")),
                        other => other,
                    })
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireRecord {
    Encrypted {
        #[serde(rename = "isEncrypted")]
        is_encrypted: bool,
        encrypted: String,
        iv: String,
        #[serde(rename = "authTag", default, skip_serializing_if = "Option::is_none")]
        auth_tag: Option<String>,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Plain {
        #[serde(rename = "type")]
        kind: FileKind,
        content: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl From<FileRecord> for WireRecord {
    fn from(record: FileRecord) -> Self {
        match record.body {
            RecordBody::Plain { kind, content } => WireRecord::Plain {
                kind,
                content: match kind {
                    FileKind::Binary => BASE64.encode(&content),
                    // FileRecord::plain guarantees text content is UTF-8
                    FileKind::Text => String::from_utf8_lossy(&content).into_owned(),
                },
                mime_type: record.mime_type,
            },
            RecordBody::Encrypted(blob) => WireRecord::Encrypted {
                is_encrypted: true,
                encrypted: BASE64.encode(&blob.ciphertext),
                iv: BASE64.encode(&blob.iv),
                auth_tag: blob.auth_tag.map(|tag| BASE64.encode(tag)),
                mime_type: record.mime_type,
            },
        }
    }
}

impl TryFrom<WireRecord> for FileRecord {
    type Error = Error;

    fn try_from(wire: WireRecord) -> Result<Self> {
        let decode = |field: &str, value: &str| {
            BASE64
                .decode(value)
                .map_err(|e| Error::validation(format!("{field} is not valid base64: {e}")))
        };

        match wire {
            WireRecord::Plain {
                kind,
                content,
                mime_type,
            } => {
                let content = match kind {
                    FileKind::Binary => decode("content", &content)?,
                    FileKind::Text => content.into_bytes(),
                };
                Ok(FileRecord {
                    mime_type,
                    body: RecordBody::Plain { kind, content },
                })
            }
            WireRecord::Encrypted {
                is_encrypted,
                encrypted,
                iv,
                auth_tag,
                mime_type,
            } => {
                if !is_encrypted {
                    return Err(Error::validation("record has isEncrypted=false but no content"));
                }
                Ok(FileRecord {
                    mime_type,
                    body: RecordBody::Encrypted(EncryptedBlob {
                        ciphertext: decode("encrypted", &encrypted)?,
                        iv: decode("iv", &iv)?,
                        auth_tag: auth_tag.map(|tag| decode("authTag", &tag)).transpose()?,
                    }),
                })
            }
        }
    }
}

/// Complete mapping of relative paths to file records for one backup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    files: BTreeMap<String, FileRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning any record previously stored at `path`
    pub fn insert(&mut self, path: impl Into<String>, record: FileRecord) -> Option<FileRecord> {
        self.files.insert(path.into(), record)
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Records in path order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.files.iter()
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(FileRecord::size).sum()
    }

    pub fn has_encrypted_records(&self) -> bool {
        self.files.values().any(FileRecord::is_encrypted)
    }

    /// Serialized bytes; path keys are sorted so equal snapshots give equal bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Replace encrypted records with their decrypted, reclassified plaintext form
    pub fn decrypted(&self, encryptor: &Encryptor) -> Result<Snapshot> {
        let mut out = Snapshot::new();
        for (path, record) in &self.files {
            let record = if record.is_encrypted() {
                let content = record.open(Some(encryptor), path)?;
                let kind = FileKind::for_path(Path::new(path));
                FileRecord::plain(kind, content, record.mime_type.clone())
            } else {
                record.clone()
            };
            out.insert(path.clone(), record);
        }
        Ok(out)
    }
}

impl FromIterator<(String, FileRecord)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, FileRecord)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Algorithm;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_classification() {
        assert_eq!(FileKind::for_path(Path::new("photo.JPG")), FileKind::Binary);
        assert_eq!(FileKind::for_path(Path::new("docs/report.pdf")), FileKind::Binary);
        assert_eq!(FileKind::for_path(Path::new("notes.txt")), FileKind::Text);
        assert_eq!(FileKind::for_path(Path::new("Makefile")), FileKind::Text);
        assert_eq!(mime_type_for(Path::new("a.png")), "image/png");
        assert_eq!(mime_type_for(Path::new("a.unknown")), "text/plain");
    }

    #[test]
    fn test_text_record_wire_shape() -> Result<()> {
        let record = FileRecord::from_content(Path::new("a.txt"), b"hello".to_vec());
        assert_eq!(
            serde_json::to_value(&record)?,
            json!({"type": "text", "content": "hello", "mimeType": "text/plain"})
        );
        Ok(())
    }

    #[test]
    fn test_binary_record_is_base64() -> Result<()> {
        let record = FileRecord::from_content(Path::new("a.png"), vec![0x89, 0x50, 0x4e, 0x47]);
        let value = serde_json::to_value(&record)?;
        assert_eq!(value["type"], "binary");
        assert_eq!(value["content"], "iVBORw==");

        let back: FileRecord = serde_json::from_value(value)?;
        assert_eq!(back.plain_content(), Some(&[0x89, 0x50, 0x4e, 0x47][..]));
        Ok(())
    }

    #[test]
    fn test_invalid_utf8_text_falls_back_to_binary() -> Result<()> {
        let record = FileRecord::from_content(Path::new("latin1.txt"), vec![0xff, 0xfe, 0x41]);
        let value = serde_json::to_value(&record)?;
        assert_eq!(value["type"], "binary");
        let back: FileRecord = serde_json::from_value(value)?;
        assert_eq!(back.plain_content(), Some(&[0xff, 0xfe, 0x41][..]));
        Ok(())
    }

    #[test]
    fn test_encrypted_record_wire_shape() -> Result<()> {
        let encryptor = Encryptor::new("pw", Algorithm::Aes256Gcm);
        let record = FileRecord::encrypted(encryptor.encrypt(b"secret")?, "text/plain");
        let value = serde_json::to_value(&record)?;
        assert_eq!(value["isEncrypted"], true);
        assert!(value["encrypted"].is_string());
        assert!(value["authTag"].is_string());
        assert!(value.get("content").is_none());

        let back: FileRecord = serde_json::from_value(value)?;
        assert_eq!(back.open(Some(&encryptor), "a.txt")?, b"secret");
        Ok(())
    }

    #[test]
    fn test_cbc_record_omits_auth_tag() -> Result<()> {
        let encryptor = Encryptor::new("pw", Algorithm::Aes256Cbc);
        let record = FileRecord::encrypted(encryptor.encrypt(b"secret")?, "text/plain");
        let value = serde_json::to_value(&record)?;
        assert!(value.get("authTag").is_none());
        Ok(())
    }

    #[test]
    fn test_malformed_record_rejected() {
        let result: std::result::Result<FileRecord, _> =
            serde_json::from_value(json!({"mimeType": "text/plain"}));
        assert!(result.is_err());

        let result: std::result::Result<FileRecord, _> = serde_json::from_value(
            json!({"type": "binary", "content": "not base64!!", "mimeType": "x"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_open_encrypted_without_key() -> Result<()> {
        let encryptor = Encryptor::new("pw", Algorithm::Aes256Gcm);
        let record = FileRecord::encrypted(encryptor.encrypt(b"secret")?, "text/plain");
        assert!(matches!(record.open(None, "a.txt"), Err(Error::Validation { .. })));
        Ok(())
    }

    #[test]
    fn test_portable_key() {
        assert_eq!(portable_key(Path::new("a/b/c.txt")).as_deref(), Some("a/b/c.txt"));
        assert_eq!(portable_key(Path::new("./a.txt")).as_deref(), Some("a.txt"));
        assert_eq!(portable_key(Path::new("../a.txt")), None);
        assert_eq!(portable_key(Path::new("")), None);
    }

    #[test]
    fn test_resolve_key_rejects_escape() -> Result<()> {
        let root = Path::new("/restore");
        assert_eq!(resolve_key(root, "a/b.txt")?, PathBuf::from("/restore/a/b.txt"));
        assert!(resolve_key(root, "../etc/passwd").is_err());
        assert!(resolve_key(root, "a/../../x").is_err());
        assert!(resolve_key(root, "").is_err());
        assert!(resolve_key(root, "/etc/passwd").is_err());
        Ok(())
    }

    #[test]
    fn test_snapshot_bytes_are_order_independent() -> Result<()> {
        let mut first = Snapshot::new();
        first.insert("b.txt", FileRecord::from_content(Path::new("b.txt"), b"b".to_vec()));
        first.insert("a.txt", FileRecord::from_content(Path::new("a.txt"), b"a".to_vec()));

        let mut second = Snapshot::new();
        second.insert("a.txt", FileRecord::from_content(Path::new("a.txt"), b"a".to_vec()));
        second.insert("b.txt", FileRecord::from_content(Path::new("b.txt"), b"b".to_vec()));

        assert_eq!(first.to_bytes()?, second.to_bytes()?);
        assert_eq!(first.total_size(), 2);
        Ok(())
    }

    #[test]
    fn test_decrypted_snapshot() -> Result<()> {
        let encryptor = Encryptor::new("pw", Algorithm::ChaCha20Poly1305);
        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "a.txt",
            FileRecord::encrypted(encryptor.encrypt(b"hello")?, "text/plain"),
        );
        let plain = snapshot.decrypted(&encryptor)?;
        assert_eq!(
            plain.get("a.txt"),
            Some(&FileRecord::from_content(Path::new("a.txt"), b"hello".to_vec()))
        );
        Ok(())
    }
}
