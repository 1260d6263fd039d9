//! Mapping between the public output root and the URLs it is served under.

use std::path::{Component, Path, PathBuf};

/// The public-serving output area, organized per owner:
/// `<root>/leads/<leadId>/<attachmentId>.<ext>`.
#[derive(Debug, Clone)]
pub struct PublicFiles {
    root: PathBuf,
    url_prefix: String,
}

impl PublicFiles {
    pub fn new<P: AsRef<Path>>(root: P, url_prefix: &str) -> Self {
        let trimmed = url_prefix.trim_end_matches('/');
        let url_prefix = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self {
            root: root.as_ref().to_path_buf(),
            url_prefix,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Directory holding every file of one lead.
    pub fn lead_directory(&self, lead_id: &str) -> PathBuf {
        self.root.join("leads").join(lead_id)
    }

    /// Filesystem path of an attachment file.
    pub fn attachment_path(&self, lead_id: &str, file_name: &str) -> PathBuf {
        self.lead_directory(lead_id).join(file_name)
    }

    /// Public URL of an attachment file.
    pub fn attachment_url(&self, lead_id: &str, file_name: &str) -> String {
        format!("{}/leads/{}/{}", self.url_prefix, lead_id, file_name)
    }

    /// Resolves a public URL path (with or without the prefix) to a file
    /// under the root.
    ///
    /// Returns `None` when the path would escape the root: parent
    /// components, absolute segments, or a symlink pointing outside.
    pub fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let path = url_path.split('?').next().unwrap_or("");
        let relative = path
            .strip_prefix(self.url_prefix.as_str())
            .unwrap_or(path)
            .trim_start_matches('/');

        if relative.is_empty() {
            return None;
        }

        let mut resolved = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }

        // Symlinks inside the root may still point elsewhere.
        if let (Ok(canonical), Ok(canonical_root)) =
            (resolved.canonicalize(), self.root.canonicalize())
        {
            if !canonical.starts_with(&canonical_root) {
                return None;
            }
        }

        Some(resolved)
    }
}

/// Returns true if `id` is safe to use as a single path segment.
pub fn is_safe_segment(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_url_prefix_normalized() {
        assert_eq!(PublicFiles::new("/srv", "uploads/").url_prefix(), "/uploads");
        assert_eq!(PublicFiles::new("/srv", "/media").url_prefix(), "/media");
    }

    #[test]
    fn test_attachment_path_and_url() {
        let files = PublicFiles::new("/srv/public", "/uploads");
        assert_eq!(
            files.attachment_path("lead-1", "att.jpg"),
            PathBuf::from("/srv/public/leads/lead-1/att.jpg")
        );
        assert_eq!(
            files.attachment_url("lead-1", "att.jpg"),
            "/uploads/leads/lead-1/att.jpg"
        );
    }

    #[test]
    fn test_resolve_inside_root() {
        let files = PublicFiles::new("/srv/public", "/uploads");
        assert_eq!(
            files.resolve("/uploads/leads/l1/a.mp4"),
            Some(PathBuf::from("/srv/public/leads/l1/a.mp4"))
        );
        assert_eq!(
            files.resolve("leads/l1/a.mp4?v=2"),
            Some(PathBuf::from("/srv/public/leads/l1/a.mp4"))
        );
    }

    #[test]
    fn test_resolve_drops_query_without_prefix() {
        let files = PublicFiles::new("/srv/public", "/uploads");
        assert_eq!(
            files.resolve("leads/l1/a.jpg?next=../../etc"),
            Some(PathBuf::from("/srv/public/leads/l1/a.jpg"))
        );
        assert!(files.resolve("?v=1").is_none());
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let files = PublicFiles::new("/srv/public", "/uploads");
        assert!(files.resolve("/uploads/../etc/passwd").is_none());
        assert!(files.resolve("/uploads/leads/../../secret").is_none());
        assert!(files.resolve("/uploads/").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("public");
        let outside = temp_dir.path().join("outside");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let files = PublicFiles::new(&root, "/uploads");
        assert!(files.resolve("/uploads/link/secret.txt").is_none());
    }

    #[test]
    fn test_is_safe_segment() {
        assert!(is_safe_segment("clx9abc-123_x"));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment("a\\b"));
    }
}
