//! OLE Compound File Binary (CFB) reader
//! Legacy `.xls` workbooks store their BIFF8 stream inside a compound file; encrypted
//! `.xlsx` packages use the same container with an `EncryptedPackage` stream.

use crate::error::BoqSheetError;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use crate::helpers::bytes::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use thiserror::Error;

/// Largest regular sector id; anything above is a chain marker (end, free, FAT, DIFAT).
const MAX_REG_SECT: usize = 0xFFFF_FFFA;

/// Streams smaller than this live in the mini stream.
const MINI_STREAM_CUTOFF: usize = 4096;

const MINI_SECTOR_SIZE: usize = 64;

const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;

/// Errors specific to Compound File Binary parsing
#[derive(Error, Debug)]
pub(crate) enum CfbError {
    #[error("The file is corrupted or has an invalid CFB structure")]
    FileFormatError,

    #[error("Invalid OLE signature (not an office document?)")]
    OleSignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector {0} is outside of the file, the file is corrupted")]
    SectorOutOfRangeError(usize),

    #[error("Sector chain starting at {0} loops, the file is corrupted")]
    SectorChainError(usize),

    #[error("The number of file allocation table sectors is invalid: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Empty root directory")]
    RootDirectoryError,
}

/// In-memory view of a compound file: directory entries plus both allocation tables.
pub(crate) struct Cfb {
    entries: HashMap<String, Entry>,
    fat: Vec<usize>,
    sectors: Sectors,
    mini_fat: Vec<usize>,
    mini_sectors: Sectors,
}

impl Cfb {
    /// Loads and indexes the whole compound file.
    pub(crate) fn new<RS: Read + Seek>(reader: &mut RS) -> Result<Cfb, BoqSheetError> {
        let size = reader.seek(SeekFrom::End(0))? as usize;
        if size < 512 {
            Err(CfbError::FileFormatError)?;
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut data = vec![0u8; size];
        reader.read_exact(&mut data)?;

        let header = Header::new(&data[..512])?;
        let sectors = Sectors { data, size: header.sector_size()? };
        let fat = load_fat(&sectors, &header)?;
        let entries = load_entries(&fat, &sectors, header.directory_start)?;
        let mini_fat = if header.mini_fat_count > 0 {
            let bytes = read_chain(&fat, &sectors, header.mini_fat_start)?;
            to_usize_iter(&bytes).collect()
        } else {
            Vec::new()
        };
        let mini_sectors = match entries.get("Root Entry") {
            Some(root) => {
                let mut data = read_chain(&fat, &sectors, root.start)?;
                data.truncate(root.size);
                Sectors { data, size: MINI_SECTOR_SIZE }
            }
            None => Sectors { data: Vec::new(), size: MINI_SECTOR_SIZE },
        };

        Ok(Cfb {
            entries,
            fat,
            sectors,
            mini_fat,
            mini_sectors,
        })
    }

    pub(crate) fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Reads a stream by name, `None` when the directory has no such entry.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, BoqSheetError> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        let mut bytes = if entry.size < MINI_STREAM_CUTOFF {
            // The mini stream sectors are not preceded by a header sector.
            read_mini_chain(&self.mini_fat, &self.mini_sectors, entry.start)?
        } else {
            read_chain(&self.fat, &self.sectors, entry.start)?
        };
        bytes.truncate(entry.size);
        Ok(Some(bytes))
    }
}

fn load_fat(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, BoqSheetError> {
    let mut difat: Vec<usize> = to_usize_iter(&sectors.data[76..512]).collect();
    let mut next = header.difat_start;
    let mut visited = 0usize;
    while next <= MAX_REG_SECT {
        if visited > header.difat_count {
            Err(CfbError::SectorChainError(header.difat_start))?;
        }
        difat.extend(to_usize_iter(sectors.get(next)?));
        // The last id of every DIFAT sector points at the next one.
        next = difat.pop().unwrap_or(usize::MAX);
        visited += 1;
    }

    let mut fat = Vec::new();
    let mut count = 0usize;
    for id in difat.into_iter().filter(|id| *id <= MAX_REG_SECT) {
        fat.extend(to_usize_iter(sectors.get(id)?));
        count += 1;
    }
    if count != header.fat_count {
        Err(CfbError::FileAllocationTableError(header.fat_count, count))?
    }
    Ok(fat)
}

fn load_entries(fat: &[usize], sectors: &Sectors, start: usize) -> Result<HashMap<String, Entry>, BoqSheetError> {
    let bytes = read_chain(fat, sectors, start)?;
    let entries: HashMap<String, Entry> = bytes
        .chunks_exact(128)
        .filter_map(Entry::new)
        .collect();
    if entries.is_empty() {
        Err(CfbError::RootDirectoryError)?
    }
    Ok(entries)
}

/// Follows a regular sector chain to the end-of-chain marker.
fn read_chain(fat: &[usize], sectors: &Sectors, start: usize) -> Result<Vec<u8>, BoqSheetError> {
    let mut content = Vec::new();
    let mut index = start;
    let mut steps = 0usize;
    while index <= MAX_REG_SECT {
        if steps > fat.len() {
            Err(CfbError::SectorChainError(start))?
        }
        content.extend_from_slice(sectors.get(index)?);
        index = *fat.get(index).ok_or(CfbError::SectorOutOfRangeError(index))?;
        steps += 1;
    }
    Ok(content)
}

fn read_mini_chain(mini_fat: &[usize], mini_sectors: &Sectors, start: usize) -> Result<Vec<u8>, BoqSheetError> {
    let mut content = Vec::new();
    let mut index = start;
    let mut steps = 0usize;
    while index <= MAX_REG_SECT {
        if steps > mini_fat.len() {
            Err(CfbError::SectorChainError(start))?
        }
        let lower = index * mini_sectors.size;
        let upper = mini_sectors.data.len().min(lower + mini_sectors.size);
        if lower >= upper {
            Err(CfbError::SectorOutOfRangeError(index))?
        }
        content.extend_from_slice(&mini_sectors.data[lower..upper]);
        index = *mini_fat.get(index).ok_or(CfbError::SectorOutOfRangeError(index))?;
        steps += 1;
    }
    Ok(content)
}

struct Sectors {
    data: Vec<u8>,
    size: usize,
}

impl Sectors {
    /// Regular sector `index`; sector 0 starts right after the header sector.
    fn get(&self, index: usize) -> Result<&[u8], CfbError> {
        let lower = (index + 1) * self.size;
        let upper = self.data.len().min(lower + self.size);
        if lower >= upper {
            return Err(CfbError::SectorOutOfRangeError(index));
        }
        Ok(&self.data[lower..upper])
    }
}

struct Header {
    major_version: u16,
    sector_shift: u16,
    fat_count: usize,
    directory_start: usize,
    mini_fat_start: usize,
    mini_fat_count: usize,
    difat_start: usize,
    difat_count: usize,
}

impl Header {
    fn new(data: &[u8]) -> Result<Self, CfbError> {
        if to_u64(&data[0..8]) != SIGNATURE {
            return Err(CfbError::OleSignatureError);
        }
        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            fat_count: to_usize(&data[44..48]),
            directory_start: to_usize(&data[48..52]),
            mini_fat_start: to_usize(&data[60..64]),
            mini_fat_count: to_usize(&data[64..68]),
            difat_start: to_usize(&data[68..72]),
            difat_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, CfbError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) => Ok(512),
            // Version 4 pads the 512 byte header out to a full 4096 byte sector.
            (4, 12) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift)),
        }
    }
}

struct Entry {
    start: usize,
    size: usize,
}

impl Entry {
    /// Decodes a 128 byte directory entry; unused slots yield `None`.
    fn new(bytes: &[u8]) -> Option<(String, Entry)> {
        let object_type = bytes[66];
        if object_type == 0 {
            return None;
        }
        let name_size = (to_u16(&bytes[64..66]) as usize).min(64);
        let (name, _, _) = UTF_16LE.decode(&bytes[..name_size]);
        let name = name.trim_end_matches('\0').to_owned();
        let start = to_usize(&bytes[116..120]);
        let size = to_u64(&bytes[120..128]) as usize;
        Some((name, Entry { start, size }))
    }
}
