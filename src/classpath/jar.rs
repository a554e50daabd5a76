use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::compile::semantic::TypeDef;
use crate::compile::CompiledModules;

use super::{ClassBytesProvider, TypeProvider};

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

#[derive(Debug, Error)]
pub enum JarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("class parse error in {entry}: {source}")]
    ClassParse { entry: String, source: binrw::Error },
}

pub type JarResult<T> = Result<T, JarError>;

/// Class-path entries read from a jar archive.
///
/// Every `.class` entry is read eagerly so lookups need no archive handle.
#[derive(Clone, Debug, Default)]
pub struct JarProvider {
    classes: ClassBytesProvider,
}

impl JarProvider {
    pub fn read<R: Read + Seek>(reader: R) -> JarResult<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut classes = ClassBytesProvider::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() || !file.name().ends_with(".class") {
                continue;
            }
            let entry = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            classes
                .add(data)
                .map_err(|source| JarError::ClassParse { entry, source })?;
        }
        debug!(classes = classes.len(), "jar indexed");
        Ok(JarProvider { classes })
    }

    pub fn from_bytes(bytes: &[u8]) -> JarResult<Self> {
        Self::read(Cursor::new(bytes))
    }

    pub fn open(path: impl AsRef<Path>) -> JarResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::read(std::io::BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TypeProvider for JarProvider {
    fn load(&self, internal_name: &str) -> Option<TypeDef> {
        self.classes.load(internal_name)
    }
}

impl CompiledModules {
    /// Package every class as `a/b/C.class` in a deflated jar with a minimal
    /// manifest.
    pub fn to_jar_bytes(&self) -> JarResult<Vec<u8>> {
        let mut entries = BTreeMap::new();
        entries.insert(MANIFEST_PATH.to_string(), b"Manifest-Version: 1.0\r\n\r\n".to_vec());
        for (name, bytes) in self.iter() {
            entries.insert(format!("{}.class", name.replace('.', "/")), bytes.to_vec());
        }

        let mut buf = Cursor::new(Vec::new());
        write_entries(&mut buf, &entries)?;
        Ok(buf.into_inner())
    }
}

fn write_entries<W: Write + Seek>(writer: W, entries: &BTreeMap<String, Vec<u8>>) -> JarResult<()> {
    let mut zip_writer = zip::ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in entries {
        zip_writer.start_file(name.as_str(), options)?;
        zip_writer.write_all(data)?;
    }
    zip_writer.finish()?;
    Ok(())
}
