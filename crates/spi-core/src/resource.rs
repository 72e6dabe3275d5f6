//! Resource enumeration.
//!
//! Configuration is scattered across independently packaged modules. A
//! [`ResourceEnumerator`] answers "every resource visible at this relative
//! path", in module order, so the engine never depends on a concrete module
//! system.
//!
//! Two enumerators are provided:
//!
//! - [`DirectoryEnumerator`]: each module is a directory on disk.
//! - [`EmbeddedEnumerator`]: each module is an in-memory table, typically
//!   filled with `include_str!` or built in tests.

use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::trace;

/// Shared display identifier of a resource.
///
/// Cloning is cheap; every definition parsed from a resource keeps one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef(Arc<str>);

impl ResourceRef {
    /// Creates a reference from a display identifier.
    pub fn new(location: impl Into<Arc<str>>) -> Self {
        Self(location.into())
    }

    /// Returns the display identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier up to and including the last `/`.
    ///
    /// Resources sharing this prefix belong to the same logical group.
    pub fn group_prefix(&self) -> &str {
        match self.0.rfind('/') {
            Some(i) => &self.0[..=i],
            None => "",
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One matching resource: a stable display identifier plus its bytes.
#[derive(Debug, Clone)]
pub struct Resource {
    location: ResourceRef,
    content: Arc<[u8]>,
}

impl Resource {
    /// Creates a resource.
    pub fn new(location: impl Into<Arc<str>>, content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            location: ResourceRef::new(location),
            content: content.into(),
        }
    }

    /// Returns the display identifier.
    pub fn location(&self) -> &ResourceRef {
        &self.location
    }

    /// Returns the raw content.
    pub fn bytes(&self) -> &[u8] {
        &self.content
    }

    /// Returns a reader over the content.
    pub fn reader(&self) -> impl io::Read + '_ {
        Cursor::new(self.bytes())
    }

    /// Returns the content fingerprint used by file exclusion.
    pub fn fingerprint(&self) -> String {
        fingerprint(self.bytes())
    }
}

/// Lower-case hex SHA-256 digest of `bytes`.
///
/// File exclusion compares against this digest only. MD5 digests from older
/// exclusion lists never match and must be recomputed.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Enumerates configuration resources visible to one module-resolution context.
pub trait ResourceEnumerator: Send + Sync {
    /// Identity of the module-resolution context, used as half of the loader
    /// cache key.
    fn context_id(&self) -> &str;

    /// Returns every resource matching the relative `path`.
    ///
    /// Order across modules is unspecified but must be stable for a given
    /// enumerator.
    fn enumerate(&self, path: &str) -> io::Result<Vec<Resource>>;
}

// =============================================================================
// DirectoryEnumerator
// =============================================================================

/// Enumerates resources from module root directories on disk.
///
/// A path matches in a module when `<root>/<path>` is a regular file. Modules
/// are searched in the order they were added.
#[derive(Debug, Clone)]
pub struct DirectoryEnumerator {
    context_id: String,
    roots: Vec<PathBuf>,
}

impl DirectoryEnumerator {
    /// Creates an enumerator over the given module roots.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots: Vec<PathBuf> = roots.into_iter().map(Into::into).collect();
        let context_id = format!(
            "dir:{}",
            roots
                .iter()
                .map(|r| r.display().to_string())
                .collect::<Vec<_>>()
                .join(";")
        );
        Self { context_id, roots }
    }

    /// Treats every sub-directory of `parent` as a module, sorted by name.
    pub fn discover(parent: impl AsRef<Path>) -> io::Result<Self> {
        let mut roots = Vec::new();
        for entry in fs::read_dir(parent.as_ref())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                roots.push(entry.path());
            }
        }
        roots.sort();
        Ok(Self::new(roots))
    }

    /// Overrides the context identity.
    pub fn with_context_id(mut self, id: impl Into<String>) -> Self {
        self.context_id = id.into();
        self
    }

    /// Returns the module roots.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl ResourceEnumerator for DirectoryEnumerator {
    fn context_id(&self) -> &str {
        &self.context_id
    }

    fn enumerate(&self, path: &str) -> io::Result<Vec<Resource>> {
        let mut found = Vec::new();
        for root in &self.roots {
            let candidate = root.join(path);
            if !candidate.is_file() {
                continue;
            }
            let content = fs::read(&candidate)?;
            let location = candidate.display().to_string().replace('\\', "/");
            trace!(location = %location, "Found resource");
            found.push(Resource::new(location, content));
        }
        Ok(found)
    }
}

// =============================================================================
// EmbeddedEnumerator
// =============================================================================

/// Enumerates resources from an in-memory table.
///
/// Locations are rendered as `embedded:<module>/<path>`.
#[derive(Debug, Clone)]
pub struct EmbeddedEnumerator {
    context_id: String,
    entries: Vec<EmbeddedEntry>,
}

#[derive(Debug, Clone)]
struct EmbeddedEntry {
    module: String,
    path: String,
    content: Arc<[u8]>,
}

impl EmbeddedEnumerator {
    /// Creates an empty table with the given context identity.
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
            entries: Vec::new(),
        }
    }

    /// Adds a resource at `path` inside `module`.
    pub fn with(
        mut self,
        module: impl Into<String>,
        path: impl Into<String>,
        content: impl AsRef<[u8]>,
    ) -> Self {
        self.insert(module, path, content);
        self
    }

    /// Adds a resource at `path` inside `module`.
    pub fn insert(
        &mut self,
        module: impl Into<String>,
        path: impl Into<String>,
        content: impl AsRef<[u8]>,
    ) {
        self.entries.push(EmbeddedEntry {
            module: module.into(),
            path: path.into(),
            content: Arc::from(content.as_ref()),
        });
    }
}

impl ResourceEnumerator for EmbeddedEnumerator {
    fn context_id(&self) -> &str {
        &self.context_id
    }

    fn enumerate(&self, path: &str) -> io::Result<Vec<Resource>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.path == path)
            .map(|e| Resource {
                location: ResourceRef::new(format!("embedded:{}/{}", e.module, e.path)),
                content: Arc::clone(&e.content),
            })
            .collect())
    }
}
