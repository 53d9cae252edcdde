use crate::Status;

/// A repository addressed as `owner/folder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryPath {
    pub owner: String,
    pub folder_name: String,
}

impl RepositoryPath {
    pub fn new(owner: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            folder_name: folder_name.into(),
        }
    }

    /// Parse a repository URL.
    ///
    /// Accepts `{base_url}owner/folder`, any `scheme://host/owner/folder`, or
    /// a bare `owner/folder` path. A trailing `/` is ignored.
    pub fn parse(base_url: &str, raw: &str) -> Result<Self, Status> {
        let trimmed = raw.trim();
        let rest = strip_base(base_url, trimmed);

        let segments: Vec<&str> = rest.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            [owner, folder] if is_plain_segment(owner) && is_plain_segment(folder) => {
                Ok(Self::new(*owner, *folder))
            }
            _ => Err(Status::invalid_argument(format!(
                "invalid repository path: {}",
                raw
            ))),
        }
    }

    /// Render the public URL of this repository.
    pub fn to_url(&self, base_url: &str) -> String {
        if base_url.is_empty() || base_url.ends_with('/') {
            format!("{}{}/{}", base_url, self.owner, self.folder_name)
        } else {
            format!("{}/{}/{}", base_url, self.owner, self.folder_name)
        }
    }
}

fn strip_base<'a>(base_url: &str, raw: &'a str) -> &'a str {
    if !base_url.is_empty() {
        if let Some(rest) = raw.strip_prefix(base_url) {
            return rest;
        }
    }
    match raw.find("://") {
        Some(idx) => {
            let after_scheme = &raw[idx + 3..];
            match after_scheme.find('/') {
                Some(slash) => &after_scheme[slash..],
                None => "",
            }
        }
        None => raw,
    }
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\')
}
