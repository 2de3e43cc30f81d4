use std::fmt;
use std::sync::Arc;

/// A file handed to the pipeline: its path and full content.
///
/// Content is reference counted so that fanning one file out to many
/// analyzers never copies the file body.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: Arc<str>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl AsRef<str>) -> Self {
        Self {
            path: path.into(),
            content: Arc::from(content.as_ref()),
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("path", &self.path)
            .field("bytes", &self.content.len())
            .finish()
    }
}
