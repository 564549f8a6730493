use std::path::PathBuf;

/// Where a catalog is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    File(PathBuf),
}

impl Source {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if raw.starts_with("http://") || raw.starts_with("https://") {
            Source::Url(raw.to_string())
        } else {
            Source::File(PathBuf::from(raw))
        }
    }
}

/// Catalog entry rejected before import.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub imported: usize,
    pub skipped: usize,
}
