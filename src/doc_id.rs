use std::path::{Component, Path};

/// The key a document is stored under: `"<index name>:<relative path>"`,
/// with `/` as the path separator on every platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(index_name: &str, relative_path: &Path) -> Self {
        let mut key = format!("{index_name}:");
        let mut first = true;
        for component in relative_path.components() {
            let Component::Normal(part) = component else {
                continue;
            };
            if !first {
                key.push('/');
            }
            key.push_str(&part.to_string_lossy());
            first = false;
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path part of the key.
    pub fn relative_path(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, path)| path)
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DocumentKey> for String {
    fn from(key: DocumentKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn deterministic() {
        let a = DocumentKey::new("lib", Path::new("a/b.xml"));
        let b = DocumentKey::new("lib", Path::new("a/b.xml"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "lib:a/b.xml");
    }

    #[test]
    fn separators_are_normalized() {
        let path: PathBuf = ["books", "vol1", "ch1.xml"].iter().collect();
        let key = DocumentKey::new("lib", &path);
        assert_eq!(key.to_string(), "lib:books/vol1/ch1.xml");
    }

    #[test]
    fn dot_components_are_dropped() {
        let key = DocumentKey::new("lib", Path::new("./x/./y.xml"));
        assert_eq!(key.as_str(), "lib:x/y.xml");
    }

    #[test]
    fn relative_path_strips_index_name() {
        let key = DocumentKey::new("lib", Path::new("x.xml"));
        assert_eq!(key.relative_path(), "x.xml");
    }

    #[test]
    fn different_indexes_differ() {
        let a = DocumentKey::new("one", Path::new("x.xml"));
        let b = DocumentKey::new("two", Path::new("x.xml"));
        assert_ne!(a, b);
    }
}
