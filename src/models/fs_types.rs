use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
    /// Modification time rendered as `DD. MM. YYYY HH:MM` in local time.
    pub created: String,
}

/// One node of the gallery tree as sent to clients.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FolderNode {
    Folder {
        name: String,
        path: String,
        children: Vec<FolderNode>,
    },
    Image {
        name: String,
        path: String,
        metadata: MediaMetadata,
    },
    Video {
        name: String,
        path: String,
        metadata: MediaMetadata,
    },
}

impl FolderNode {
    pub fn media(kind: MediaKind, name: String, path: String, created: String) -> Self {
        let metadata = MediaMetadata { created };
        match kind {
            MediaKind::Image => FolderNode::Image { name, path, metadata },
            MediaKind::Video => FolderNode::Video { name, path, metadata },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FolderNode::Folder { name, .. }
            | FolderNode::Image { name, .. }
            | FolderNode::Video { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FolderNode::Folder { path, .. }
            | FolderNode::Image { path, .. }
            | FolderNode::Video { path, .. } => path,
        }
    }

    pub fn children(&self) -> &[FolderNode] {
        match self {
            FolderNode::Folder { children, .. } => children,
            _ => &[],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GalleryData {
    pub structure: Vec<FolderNode>,
}
