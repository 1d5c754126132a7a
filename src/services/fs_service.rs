use crate::models::fs_types::FolderNode;
use crate::models::principal::Principal;
use crate::services::layout::StorageLayout;
use crate::services::media;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const CREATED_FORMAT: &str = "%d. %m. %Y %H:%M";

pub fn format_created(modified: SystemTime) -> String {
    DateTime::<Local>::from(modified).format(CREATED_FORMAT).to_string()
}

/// Walks one subtree on behalf of one principal.
struct TreeBuilder<'a> {
    layout: &'a StorageLayout,
    principal: &'a Principal,
    /// Canonical root the walk may not leave (linked roots aside).
    root: PathBuf,
    /// Canonical directories on the current descent path.
    ancestors: HashSet<PathBuf>,
}

impl TreeBuilder<'_> {
    fn visible(&self, name: &str) -> bool {
        !media::is_hidden(name) || self.principal.sees_hidden()
    }

    fn walk(&mut self, dir: &Path, logical: &str) -> Vec<FolderNode> {
        let real_dir = match dir.canonicalize() {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };
        if !self.layout.within(&self.root, &real_dir) {
            tracing::debug!(dir = %dir.display(), "not descending outside storage roots");
            return Vec::new();
        }
        if !self.ancestors.insert(real_dir.clone()) {
            tracing::debug!(dir = %dir.display(), "symlink cycle");
            return Vec::new();
        }
        let structure = self.list(dir, logical);
        self.ancestors.remove(&real_dir);
        structure
    }

    fn list(&mut self, dir: &Path, logical: &str) -> Vec<FolderNode> {
        // A directory that vanished or cannot be read is simply empty.
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "cannot read directory");
                return Vec::new();
            }
        };

        let mut entries: Vec<(String, bool)> = read_dir
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let is_link = entry.file_type().map(|ft| ft.is_symlink()).unwrap_or(false);
                entry.file_name().into_string().ok().map(|name| (name, is_link))
            })
            .collect();
        entries.sort();

        let mut structure = Vec::new();
        for (name, is_link) in entries {
            if !self.visible(&name) {
                continue;
            }
            let full = dir.join(&name);
            let path = if logical.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", logical, name)
            };

            // Follows symlinks; dangling links fail here and are skipped.
            let meta = match std::fs::metadata(&full) {
                Ok(m) => m,
                Err(_) => continue,
            };

            if meta.is_dir() {
                let children = self.walk(&full, &path);
                if !children.is_empty() {
                    structure.push(FolderNode::Folder { name, path, children });
                }
            } else if meta.is_file() {
                let Some(kind) = media::classify(&name) else {
                    continue;
                };
                if is_link && !self.link_target_allowed(&full) {
                    continue;
                }
                let modified = meta.modified().unwrap_or(UNIX_EPOCH);
                structure.push(FolderNode::media(kind, name, path, format_created(modified)));
            }
        }

        structure
    }

    fn link_target_allowed(&self, path: &Path) -> bool {
        path.canonicalize()
            .map(|real| self.layout.within(&self.root, &real))
            .unwrap_or(false)
    }
}

/// Build the ordered, pruned tree under `dir` as seen by `principal`.
///
/// Logical paths are relative to `base`; under the private tree they are
/// prefixed with the private marker so they round-trip through the file
/// endpoints. Unreadable or missing directories yield an empty tree.
pub fn build_tree(
    layout: &StorageLayout,
    base: &Path,
    dir: &Path,
    is_private: bool,
    principal: &Principal,
) -> Vec<FolderNode> {
    let root = match dir.canonicalize() {
        Ok(root) => root,
        Err(_) => return Vec::new(),
    };

    let relative = dir
        .strip_prefix(base)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();
    let logical = match (is_private, relative.is_empty()) {
        (true, true) => layout.marker().to_string(),
        (true, false) => format!("{}/{}", layout.marker(), relative),
        (false, _) => relative,
    };

    let mut builder = TreeBuilder {
        layout,
        principal,
        root,
        ancestors: HashSet::new(),
    };
    builder.walk(dir, &logical)
}

/// The full gallery for one principal: the public tree followed by one folder
/// per granted private folder, each included only when non-empty.
pub fn gallery_structure(layout: &StorageLayout, principal: &Principal) -> Vec<FolderNode> {
    let mut structure = build_tree(
        layout,
        layout.public_root(),
        layout.public_root(),
        false,
        principal,
    );

    for folder in &principal.folders {
        if media::is_hidden(folder) && !principal.sees_hidden() {
            continue;
        }
        if layout.private_folder(folder).is_none() {
            tracing::debug!(folder = %folder, user = %principal.identity, "granted folder is missing");
            continue;
        }
        let dir = layout.private_root().join(folder);
        let children = build_tree(layout, layout.private_root(), &dir, true, principal);
        if !children.is_empty() {
            structure.push(FolderNode::Folder {
                name: folder.clone(),
                path: format!("{}/{}", layout.marker(), folder),
                children,
            });
        }
    }

    structure
}
