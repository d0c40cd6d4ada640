//! `multipart/form-data` bodies.
//!
//! Text parts become ordinary body fields. Parts carrying a file name are
//! kept as [`UploadedFile`]s and bound by parameters of that type, under the
//! part's field name.

use crate::bind::{Bindable, Binder, ParamDescriptor, ParamKind};
use crate::error::WebError;
use crate::input::{InputMap, insert_text};
use bytes::Bytes;
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::warn;

/// A file part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, bytes: impl Into<Bytes>) -> Self {
        Self { filename: filename.into(), content_type, bytes: bytes.into() }
    }

    /// The file name the client sent, possibly empty.
    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Uploaded files by field name, repeated fields keep every file in body order.
pub type FileMap = HashMap<String, Vec<UploadedFile>>;

/// Splits a multipart body into text fields and files.
///
/// A malformed body keeps the parts read before the error.
pub(crate) async fn parse_multipart(body: Bytes, boundary: String) -> (InputMap, FileMap) {
    let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut fields = InputMap::new();
    let mut files = FileMap::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(cause = %e, "ignore malformed multipart body");
                break;
            }
        };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(ToString::to_string);

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(field = %name, cause = %e, "ignore truncated multipart part");
                break;
            }
        };

        match filename {
            Some(filename) => files.entry(name).or_default().push(UploadedFile::new(filename, content_type, bytes)),
            None => insert_text(&mut fields, name, String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    (fields, files)
}

impl Bindable for UploadedFile {
    fn kind() -> ParamKind {
        ParamKind::File
    }

    fn bind(binder: &mut Binder<'_>, desc: &ParamDescriptor) -> Result<Self, WebError> {
        binder
            .context()
            .lookup_files(desc.name(), desc.query_name())
            .and_then(|files| files.last())
            .cloned()
            .ok_or_else(|| WebError::missing(desc.query_name()))
    }
}

impl Bindable for Option<UploadedFile> {
    fn kind() -> ParamKind {
        ParamKind::Optional(Box::new(ParamKind::File))
    }

    fn bind(binder: &mut Binder<'_>, desc: &ParamDescriptor) -> Result<Self, WebError> {
        Ok(binder.context().lookup_files(desc.name(), desc.query_name()).and_then(|files| files.last()).cloned())
    }
}

impl Bindable for Vec<UploadedFile> {
    fn kind() -> ParamKind {
        ParamKind::Sequence(Box::new(ParamKind::File))
    }

    fn bind(binder: &mut Binder<'_>, desc: &ParamDescriptor) -> Result<Self, WebError> {
        Ok(binder.context().lookup_files(desc.name(), desc.query_name()).map(<[_]>::to_vec).unwrap_or_default())
    }
}
