//! BIFF8 record reader for the `Workbook` stream of legacy `.xls` files.
//! Records are `(type, size, payload)` triples; payloads longer than 8224 bytes
//! spill into CONTINUE records which this reader stitches back together.

use crate::error::BoqSheetError;
use crate::helpers::bytes::to_f64;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u32;
use crate::helpers::bytes::to_u64;
use encoding_rs::Encoding;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub(crate) enum Biff8Error {
    #[error("Fewer than {0} bytes remaining")]
    NoEnoughDataError(usize),

    #[error("Record at offset {0} runs past the end of the stream")]
    TruncatedRecordError(usize),
}

/// Cursor over the records of one BIFF8 stream.
pub(crate) struct Biff8Reader {
    /// Encoding of compressed 8-bit strings, set from the CODEPAGE record
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    /// Offset of the next record header
    pointer: usize,
    /// Payload spans of the current record and its CONTINUE records
    chunks: Vec<(usize, usize)>,
    index: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: encoding_rs::WINDOWS_1252,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Advances to the next record and returns its type, or `None` at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, BoqSheetError> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();

        let kind = self.get_u16_at(self.pointer)?;
        let span = self.take_span()?;
        self.chunks.push(span);
        while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
            let span = self.take_span()?;
            self.chunks.push(span);
        }
        Ok(Some(kind))
    }

    /// Consumes the record header at `pointer` and returns its payload span.
    fn take_span(&mut self) -> Result<(usize, usize), BoqSheetError> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = lower + size;
        if upper > self.buffer.len() {
            Err(Biff8Error::TruncatedRecordError(self.pointer))?
        }
        self.pointer = upper;
        Ok((lower, upper))
    }

    /// Jumps to an absolute stream offset, e.g. a BOUNDSHEET8 substream position.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    fn read_exact(&mut self, length: usize) -> Result<&[u8], BoqSheetError> {
        let (data, size) = self.read(length);
        if size == length {
            Ok(data)
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    /// Reads up to `length` bytes without crossing into the next CONTINUE chunk.
    fn read(&mut self, length: usize) -> (&[u8], usize) {
        if let Some((lower, upper)) = self.chunks.get(self.index).copied() {
            let source = upper.min(lower + self.offset);
            let target = upper.min(source + length);
            if source < upper {
                if target == upper {
                    self.index += 1;
                    self.offset = 0;
                } else {
                    self.offset += target - source;
                }
                return (&self.buffer[source..target], target - source);
            }
        }
        (&[], 0)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), BoqSheetError> {
        self.read_exact(length).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, BoqSheetError> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, BoqSheetError> {
        self.read_exact(2).map(to_u16)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, BoqSheetError> {
        self.read_exact(4).map(to_u32)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, BoqSheetError> {
        self.read_u32().map(|value| value as usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, BoqSheetError> {
        self.read_exact(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, BoqSheetError> {
        self.read_exact(8).map(to_f64)
    }

    /// Reads the u16 that sits `offset` bytes before the end of the current record.
    /// MULRK stores its last column there.
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, BoqSheetError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if lower + offset <= *upper {
                return self.get_u16_at(upper - offset);
            }
            offset -= upper - lower;
        }
        Err(Biff8Error::NoEnoughDataError(2))?
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, BoqSheetError> {
        match self.buffer.get(index..index + 2) {
            Some(bytes) => Ok(to_u16(bytes)),
            None => Err(Biff8Error::NoEnoughDataError(2))?,
        }
    }

    /// Decodes an RK value: a 30-bit integer or the high bits of an f64, optionally divided by 100.
    pub(crate) fn read_rk_number(&mut self) -> Result<String, BoqSheetError> {
        let raw = self.read_u32()?;
        let is_percentage = raw & 0x01 != 0;
        let is_integer = raw & 0x02 != 0;
        let mut value = if is_integer {
            ((raw as i32) >> 2) as f64
        } else {
            f64::from_bits(((raw >> 2) as u64) << 34)
        };
        if is_percentage {
            value /= 100.0;
        }
        Ok(format_number(value))
    }

    /// ShortXLUnicodeString: 1-byte character count.
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, BoqSheetError> {
        let chars = self.read_u8()? as usize;
        let mut string = String::new();
        self.read_string_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// XLUnicodeString: 2-byte character count.
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, BoqSheetError> {
        let chars = self.read_u16()? as usize;
        let mut string = String::new();
        self.read_string_into(chars, false, &mut string)?;
        Ok(string)
    }

    /// XLUnicodeRichExtendedString as stored in the SST, which may be split across CONTINUE records.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, BoqSheetError> {
        let mut string = String::new();
        let mut remaining = self.read_u16()? as usize;
        let mut actual = self.read_string_into(remaining, true, &mut string)?;
        while actual < remaining {
            remaining -= actual;
            // Each continuation restates the compression flag.
            actual = self.read_string_into(remaining, false, &mut string)?;
        }
        Ok(string)
    }

    fn read_string_into(&mut self, chars: usize, is_extended: bool, content: &mut String) -> Result<usize, BoqSheetError> {
        let flag = self.read_u8()?;
        let is_wide = flag & 0x1 != 0;
        let run_count = if is_extended && flag & 0x8 != 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if is_extended && flag & 0x4 != 0 {
            self.read_usize()?
        } else {
            0
        };

        let expected = if is_wide { chars * 2 } else { chars };
        let encoding = self.encoding;
        let (bytes, actual) = self.read(expected);
        if is_wide {
            let (string, _, _) = encoding_rs::UTF_16LE.decode(bytes);
            content.push_str(&string);
        } else {
            let (string, _, _) = encoding.decode(bytes);
            content.push_str(&string);
        }

        self.skip(4 * run_count)?;
        self.skip(phonetic_size)?;
        Ok(if is_wide { actual / 2 } else { actual })
    }
}

/// Formats a float the way a sheet shows it: whole numbers without a fraction.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}
