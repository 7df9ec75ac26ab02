//! Lookup helpers over OOXML zip packages.
//! Part names are matched case-insensitively with either path separator, since
//! producers disagree on both.

use crate::error::BoqSheetError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

/// Upper bound on the buffer reserved from a part's declared size; larger parts grow as they are read.
const MAX_RESERVED_BYTES: u64 = 64 << 20;

pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a part by name, `None` when the package does not contain it.
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, BoqSheetError>;

    /// Opens a part as XML.
    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, BoqSheetError>;

    /// Reads a part fully into memory.
    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, BoqSheetError>;

    /// Part names under `prefix` (case-insensitive), in archive order.
    fn names_under(&self, prefix: &str) -> Vec<String>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, BoqSheetError> {
        let pattern = name.replace('\\', "/");
        let path = self
            .file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(&file_name.replace('\\', "/")))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, BoqSheetError> {
        let reader = self
            .file(name)?
            .map(|file| XmlReader::new(BufReader::new(file)));
        Ok(reader)
    }

    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, BoqSheetError> {
        match self.file(name)? {
            Some(mut file) => {
                let mut bytes = Vec::with_capacity(reserved_capacity(file.size()));
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    fn names_under(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_ascii_lowercase();
        self.file_names()
            .filter(|name| name.replace('\\', "/").to_ascii_lowercase().starts_with(&prefix))
            .map(|name| name.to_owned())
            .collect()
    }
}

fn reserved_capacity(declared_size: u64) -> usize {
    declared_size.min(MAX_RESERVED_BYTES) as usize
}
