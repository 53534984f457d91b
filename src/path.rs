// Path resolution: pick the packaging strategy and enumerate its members
use crate::{Error, Result};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use url::Url;
use zip::ZipArchive;

pub const ARCHIVE_SCHEME: &str = "archive";

const ZIP_MAGIC: [&[u8]; 2] = [b"PK\x03\x04", b"PK\x05\x06"];

/// Packaging strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Archive,
    Folder,
    SingleFile,
}

pub const STRATEGIES: [Strategy; 3] = [Strategy::Archive, Strategy::Folder, Strategy::SingleFile];

impl Strategy {
    pub fn accepts(&self, path: &Path) -> bool {
        match self {
            Strategy::Archive => path.is_file() && has_zip_magic(path),
            Strategy::Folder => path.is_dir(),
            Strategy::SingleFile => path.is_file(),
        }
    }

    fn open(&self, path: PathBuf) -> FilingSource {
        match self {
            Strategy::Archive => FilingSource::Archive(ArchiveSource::new(path)),
            Strategy::Folder => FilingSource::Folder(path),
            Strategy::SingleFile => FilingSource::SingleFile(path),
        }
    }
}

fn has_zip_magic(path: &Path) -> bool {
    let mut head = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut head))
        .map(|_| ZIP_MAGIC.iter().any(|m| head == **m))
        .unwrap_or(false)
}

/// Accepts a filesystem path or a `file:` URI.
pub fn resolve_source(location: &str) -> Result<FilingSource> {
    let path = match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|_| Error::UnsupportedPath(location.to_string()))?,
        _ => PathBuf::from(location),
    };
    let path = std::fs::canonicalize(&path).map_err(|_| Error::UnsupportedPath(location.to_string()))?;

    STRATEGIES
        .iter()
        .find(|s| s.accepts(&path))
        .map(|s| {
            tracing::debug!(strategy = ?s, path = %path.display(), "Selected filing source");
            s.open(path.clone())
        })
        .ok_or_else(|| Error::UnsupportedPath(location.to_string()))
}

pub enum FilingSource {
    SingleFile(PathBuf),
    Folder(PathBuf),
    Archive(ArchiveSource),
}

impl FilingSource {
    pub fn strategy(&self) -> Strategy {
        match self {
            FilingSource::SingleFile(_) => Strategy::SingleFile,
            FilingSource::Folder(_) => Strategy::Folder,
            FilingSource::Archive(_) => Strategy::Archive,
        }
    }

    /// Member URIs in sorted order.
    pub fn members(&self) -> Result<Vec<Url>> {
        match self {
            FilingSource::SingleFile(path) => Ok(vec![file_url(path)?]),
            FilingSource::Folder(root) => {
                let mut files = Vec::new();
                walk(root, &mut files)?;
                files.sort();
                files.iter().map(|p| file_url(p)).collect()
            }
            FilingSource::Archive(archive) => archive.members(),
        }
    }

    /// Reads a member or a sibling file; `http(s)` is not handled here.
    pub fn read(&self, uri: &Url) -> Result<Vec<u8>> {
        match uri.scheme() {
            "file" => {
                let path = uri
                    .to_file_path()
                    .map_err(|_| Error::ResourceNotFound(uri.to_string()))?;
                std::fs::read(&path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => Error::ResourceNotFound(uri.to_string()),
                    _ => Error::Io(e),
                })
            }
            ARCHIVE_SCHEME => match self {
                FilingSource::Archive(archive) => archive.read(uri),
                _ => Err(Error::ResourceNotFound(uri.to_string())),
            },
            _ => Err(Error::ResourceNotFound(uri.to_string())),
        }
    }
}

fn file_url(path: &Path) -> Result<Url> {
    Url::from_file_path(path).map_err(|_| Error::UnsupportedPath(path.display().to_string()))
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

struct OpenArchive {
    zip: ZipArchive<File>,
    // URL path -> entry name
    entries: AHashMap<String, String>,
    members: Vec<Url>,
}

/// A zip archive, opened on first access and closed when dropped.
pub struct ArchiveSource {
    path: PathBuf,
    state: Mutex<Option<OpenArchive>>,
}

impl ArchiveSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_archive<T>(&self, f: impl FnOnce(&mut OpenArchive) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        if state.is_none() {
            tracing::debug!(path = %self.path.display(), "Opening archive");
            *state = Some(Self::open(&self.path)?);
        }
        match state.as_mut() {
            Some(open) => f(open),
            None => Err(Error::ResourceNotFound(self.path.display().to_string())),
        }
    }

    fn open(path: &Path) -> Result<OpenArchive> {
        let mut zip = ZipArchive::new(File::open(path)?)?;
        let mut names = Vec::new();
        for i in 0..zip.len() {
            let file = zip.by_index(i)?;
            if !file.is_dir() {
                names.push(file.name().to_string());
            }
        }
        names.sort();

        let mut entries = AHashMap::with_capacity(names.len());
        let mut members = Vec::with_capacity(names.len());
        for name in names {
            let url = entry_url(&name)?;
            entries.insert(url.path().to_string(), name);
            members.push(url);
        }
        Ok(OpenArchive {
            zip,
            entries,
            members,
        })
    }

    pub fn members(&self) -> Result<Vec<Url>> {
        self.with_archive(|open| Ok(open.members.clone()))
    }

    pub fn read(&self, uri: &Url) -> Result<Vec<u8>> {
        self.with_archive(|open| {
            let name = open
                .entries
                .get(uri.path())
                .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))?;
            let mut file = open.zip.by_name(name)?;
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes)?;
            Ok(bytes)
        })
    }
}

fn entry_url(name: &str) -> Result<Url> {
    let name = name.trim_start_matches("./").trim_start_matches('/');
    Ok(Url::parse(&format!("{}:///{}", ARCHIVE_SCHEME, name))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    #[test]
    fn selects_strategy_by_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("instance.xml");
        std::fs::write(&plain, b"<xbrl/>").unwrap();

        let zipped = dir.path().join("filing.zip");
        let mut writer = zip::ZipWriter::new(File::create(&zipped).unwrap());
        writer
            .start_file("sub/instance.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<xbrl/>").unwrap();
        writer.finish().unwrap();

        let folder = resolve_source(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(folder.strategy(), Strategy::Folder);
        assert_eq!(folder.members().unwrap().len(), 2);

        let single = resolve_source(plain.to_str().unwrap()).unwrap();
        assert_eq!(single.strategy(), Strategy::SingleFile);

        let archive = resolve_source(zipped.to_str().unwrap()).unwrap();
        assert_eq!(archive.strategy(), Strategy::Archive);
        let members = archive.members().unwrap();
        assert_eq!(members[0].as_str(), "archive:///sub/instance.xml");
        assert_eq!(archive.read(&members[0]).unwrap(), b"<xbrl/>".to_vec());

        let sibling = members[0].join("missing.xsd").unwrap();
        assert!(matches!(archive.read(&sibling), Err(Error::ResourceNotFound(_))));
    }

    #[test]
    fn unsupported_path() {
        let result = resolve_source("/definitely/not/here.xml");
        assert!(matches!(result, Err(Error::UnsupportedPath(_))));
    }
}
