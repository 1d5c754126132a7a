use crate::config::Config;
use crate::error::GalleryError;
use crate::services::access;
use std::path::{Component, Path, PathBuf};

/// The two storage roots plus the directories symlinks may resolve into.
/// All roots are held in canonical form.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    public_root: PathBuf,
    private_root: PathBuf,
    marker: String,
    linked_roots: Vec<PathBuf>,
}

/// A logical path mapped onto the filesystem.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Canonical absolute location.
    pub path: PathBuf,
    /// Canonical root the location must stay inside: the public root, or the
    /// granted private folder.
    pub root: PathBuf,
}

/// True when `segment` is a single plain file or directory name.
pub fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == segment
    )
}

impl StorageLayout {
    /// Create the storage roots if needed and canonicalize them. Linked roots
    /// that do not exist are dropped.
    pub fn new(
        public_dir: &Path,
        private_dir: &Path,
        marker: impl Into<String>,
        linked_roots: &[PathBuf],
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(public_dir)?;
        std::fs::create_dir_all(private_dir)?;

        let linked_roots = linked_roots
            .iter()
            .filter_map(|root| match root.canonicalize() {
                Ok(real) => Some(real),
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "ignoring linked root");
                    None
                }
            })
            .collect();

        Ok(Self {
            public_root: public_dir.canonicalize()?,
            private_root: private_dir.canonicalize()?,
            marker: marker.into(),
            linked_roots,
        })
    }

    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        Self::new(
            &config.public_dir,
            &config.private_dir,
            config.private_marker.clone(),
            &config.linked_roots,
        )
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn public_root(&self) -> &Path {
        &self.public_root
    }

    pub fn private_root(&self) -> &Path {
        &self.private_root
    }

    /// Whether the canonical path `real` lies inside `root` or a linked root.
    pub fn within(&self, root: &Path, real: &Path) -> bool {
        real.starts_with(root) || self.linked_roots.iter().any(|linked| real.starts_with(linked))
    }

    /// Canonical directory backing the private folder `name`, if it exists and
    /// stays inside the private root or a linked root.
    pub fn private_folder(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_segment(name) {
            return None;
        }
        let real = self.private_root.join(name).canonicalize().ok()?;
        if real.is_dir() && self.within(&self.private_root, &real) {
            Some(real)
        } else {
            None
        }
    }

    /// Map a client-supplied logical path to a canonical location.
    ///
    /// Anything that is not a plain sequence of names, does not exist, or
    /// escapes its root resolves to `NotFound`, so traversal attempts look no
    /// different from missing files.
    pub fn resolve(&self, logical_path: &str) -> Result<Resolved, GalleryError> {
        let parts = access::segments(logical_path);
        if !parts.iter().all(|segment| is_plain_segment(segment)) {
            return Err(GalleryError::NotFound);
        }

        let (root, rest) = if parts[0] == self.marker {
            let folder = parts.get(1).ok_or(GalleryError::NotFound)?;
            let root = self.private_folder(folder).ok_or(GalleryError::NotFound)?;
            (root, &parts[2..])
        } else {
            (self.public_root.clone(), &parts[..])
        };

        let candidate = rest.iter().fold(root.clone(), |path, segment| path.join(segment));
        let real = candidate.canonicalize().map_err(|_| GalleryError::NotFound)?;
        if !self.within(&root, &real) {
            tracing::warn!(path = logical_path, "resolved path escapes its storage root");
            return Err(GalleryError::NotFound);
        }

        Ok(Resolved { path: real, root })
    }
}
