//! Error values surfaced by the resolver, the open path and the descriptor table.

use std::error::Error as StdError;

pub type VfsResult<T> = Result<T, VfsError>;

/// Classification of a failure. Every public operation reports one of these.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum VfsErrorKind {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("permission denied")]
    PermissionDenied,
    #[error("file exists")]
    AlreadyExists,
    #[error("read-only file system")]
    ReadOnlyFilesystem,
    #[error("text file busy")]
    TextBusy,
    /// Per-process descriptor exhaustion.
    #[error("too many open files")]
    TooManyOpenFiles,
    /// Symbolic link nesting exceeded the configured bound.
    #[error("too many levels of symbolic links")]
    TooManyLinks,
    #[error("bad file descriptor")]
    BadFileDescriptor,
    #[error("invalid argument")]
    InvalidArgument,
    /// System-wide open-file-object exhaustion.
    #[error("file table overflow")]
    NoFileTableSpace,
    #[error("operation not supported")]
    NotSupported,
    #[error("file name too long")]
    NameTooLong,
    #[error("i/o error")]
    Io,
}

impl VfsErrorKind {
    /// Linux errno value for this kind.
    pub fn errno(self) -> i32 {
        match self {
            VfsErrorKind::NotFound => 2,
            VfsErrorKind::Io => 5,
            VfsErrorKind::BadFileDescriptor => 9,
            VfsErrorKind::PermissionDenied => 13,
            VfsErrorKind::AlreadyExists => 17,
            VfsErrorKind::NotADirectory => 20,
            VfsErrorKind::IsADirectory => 21,
            VfsErrorKind::InvalidArgument => 22,
            VfsErrorKind::NoFileTableSpace => 23,
            VfsErrorKind::TooManyOpenFiles => 24,
            VfsErrorKind::TextBusy => 26,
            VfsErrorKind::ReadOnlyFilesystem => 30,
            VfsErrorKind::NameTooLong => 36,
            VfsErrorKind::TooManyLinks => 40,
            VfsErrorKind::NotSupported => 95,
        }
    }

    /// Stable string name (logging only).
    pub fn as_str(self) -> &'static str {
        match self {
            VfsErrorKind::NotFound => "not_found",
            VfsErrorKind::NotADirectory => "not_a_directory",
            VfsErrorKind::IsADirectory => "is_a_directory",
            VfsErrorKind::PermissionDenied => "permission_denied",
            VfsErrorKind::AlreadyExists => "already_exists",
            VfsErrorKind::ReadOnlyFilesystem => "read_only_filesystem",
            VfsErrorKind::TextBusy => "text_busy",
            VfsErrorKind::TooManyOpenFiles => "too_many_open_files",
            VfsErrorKind::TooManyLinks => "too_many_links",
            VfsErrorKind::BadFileDescriptor => "bad_file_descriptor",
            VfsErrorKind::InvalidArgument => "invalid_argument",
            VfsErrorKind::NoFileTableSpace => "no_file_table_space",
            VfsErrorKind::NotSupported => "not_supported",
            VfsErrorKind::NameTooLong => "name_too_long",
            VfsErrorKind::Io => "io",
        }
    }
}

/// A failure together with the static name of the operation that produced it.
#[derive(thiserror::Error, Debug)]
#[error("{context}: {kind}")]
pub struct VfsError {
    kind: VfsErrorKind,
    context: &'static str,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl VfsError {
    pub fn new(kind: VfsErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context,
            source: None,
        }
    }

    pub fn with_source(
        kind: VfsErrorKind,
        context: &'static str,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            context,
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> VfsErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }

    pub fn errno(&self) -> i32 {
        self.kind.errno()
    }
}

impl From<VfsErrorKind> for VfsError {
    fn from(kind: VfsErrorKind) -> Self {
        VfsError::new(kind, "vfs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_and_kind() {
        let err = VfsError::new(VfsErrorKind::TextBusy, "open.text_busy");
        assert_eq!(err.to_string(), "open.text_busy: text file busy");
        assert_eq!(err.errno(), 26);
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::other("disk on fire");
        let err = VfsError::with_source(VfsErrorKind::Io, "memfs.read", io);
        assert_eq!(err.kind(), VfsErrorKind::Io);
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(VfsErrorKind::AlreadyExists.as_str(), "already_exists");
        assert_eq!(VfsErrorKind::TooManyLinks.as_str(), "too_many_links");
        let err = VfsError::new(VfsErrorKind::NotFound, "path.resolve.empty");
        assert_eq!(err.kind().as_str(), "not_found");
    }

    #[test]
    fn per_process_and_system_wide_exhaustion_differ() {
        assert_ne!(
            VfsErrorKind::TooManyOpenFiles.errno(),
            VfsErrorKind::NoFileTableSpace.errno()
        );
    }
}
