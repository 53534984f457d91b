// Byte access by URI, independent of how the filing is packaged
use crate::cache::TaxonomyCache;
use crate::path::FilingSource;
use crate::{Error, Result};
use std::sync::Arc;
use url::Url;

pub struct FileRepository {
    source: FilingSource,
    cache: Option<Arc<dyn TaxonomyCache>>,
}

impl FileRepository {
    pub fn new(source: FilingSource, cache: Option<Arc<dyn TaxonomyCache>>) -> Self {
        Self { source, cache }
    }

    pub fn source(&self) -> &FilingSource {
        &self.source
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    pub fn members(&self) -> Result<Vec<Url>> {
        self.source.members()
    }

    /// Standard relative-reference resolution against `base`.
    pub fn resolve(&self, base: &Url, reference: &str) -> Result<Url> {
        Ok(base.join(reference.trim())?)
    }

    /// Nothing is cached at this layer.
    pub fn read(&self, uri: &Url) -> Result<Vec<u8>> {
        match uri.scheme() {
            "http" | "https" => match &self.cache {
                Some(cache) => cache.get(uri),
                None => Err(Error::ResourceNotFound(uri.to_string())),
            },
            _ => self.source.read(uri),
        }
    }
}

pub fn is_remote(uri: &Url) -> bool {
    matches!(uri.scheme(), "http" | "https")
}

/// The URI without its fragment, used as the document key.
pub fn document_uri(uri: &Url) -> Url {
    let mut doc = uri.clone();
    doc.set_fragment(None);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::path::resolve_source;

    #[test]
    fn resolves_relative_references() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("schemas")).unwrap();
        std::fs::write(dir.path().join("schemas/base.xsd"), b"<schema/>").unwrap();
        std::fs::write(dir.path().join("instance.xml"), b"<xbrl/>").unwrap();

        let source = resolve_source(dir.path().to_str().unwrap()).unwrap();
        let files = FileRepository::new(source, None);
        let members = files.members().unwrap();
        let instance = members
            .iter()
            .find(|u| u.path().ends_with("instance.xml"))
            .unwrap();

        let schema = files.resolve(instance, "schemas/base.xsd").unwrap();
        assert_eq!(files.read(&schema).unwrap(), b"<schema/>".to_vec());

        let up = files.resolve(&schema, "../instance.xml").unwrap();
        assert_eq!(&up, instance);

        let missing = files.resolve(instance, "nope.xsd").unwrap();
        assert!(matches!(files.read(&missing), Err(Error::ResourceNotFound(_))));
    }

    #[test]
    fn remote_reads_go_through_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("instance.xml"), b"<xbrl/>").unwrap();
        let remote = Url::parse("http://example.com/base.xsd#frag").unwrap();

        let source = resolve_source(dir.path().to_str().unwrap()).unwrap();
        let files = FileRepository::new(source, None);
        assert!(files.read(&remote).is_err());

        let cache = MemoryCache::new();
        cache.insert("http://example.com/base.xsd", b"<schema/>".to_vec());
        let source = resolve_source(dir.path().to_str().unwrap()).unwrap();
        let files = FileRepository::new(source, Some(Arc::new(cache)));
        assert!(is_remote(&remote));
        assert_eq!(files.read(&document_uri(&remote)).unwrap(), b"<schema/>".to_vec());
    }
}
