// MIT License
//
// Copyright (c) 2026 Raja Lehtihet & Wael El Oraiby
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
//
//! Binary persistence format.
//!
//! Every container starts with a 4-byte magic and a little-endian `u32`
//! format version, followed by a one-byte kind tag, a config record, the
//! `n_added`/`n_records` counters, and the counter/register data itself.
//! There is no serde/bincode layer here deliberately: the byte layout is a
//! cross-language wire contract (§6.2), so every field is hand-written at
//! an exact, documented offset rather than left to a derive macro's
//! encoding choices.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::cms::{Cms, CmsKind};
use crate::error::SketchError;
use crate::heavy_hitters::HeavyHitters;
use crate::hyperloglog::HyperLogLog;

const MAGIC: [u8; 4] = *b"SKS1";
const FORMAT_VERSION: u32 = 1;

const KIND_HLL: u8 = 0;
const KIND_CMS_LINEAR: u8 = 1;
const KIND_CMS_LOG8: u8 = 2;
const KIND_CMS_LOG16: u8 = 3;
const KIND_HH: u8 = 4;

fn write_u8(w: &mut impl Write, v: u8) -> std::io::Result<()> {
    w.write_all(&[v])
}

fn write_u16(w: &mut impl Write, v: u16) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64(w: &mut impl Write, v: u64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f64(w: &mut impl Write, v: f64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u8(r: &mut impl Read) -> std::io::Result<u8> {
    let mut buf = [0_u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16(r: &mut impl Read) -> std::io::Result<u16> {
    let mut buf = [0_u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0_u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> std::io::Result<u64> {
    let mut buf = [0_u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> std::io::Result<f64> {
    let mut buf = [0_u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn write_header(w: &mut impl Write, kind: u8) -> Result<(), SketchError> {
    w.write_all(&MAGIC)?;
    write_u32(w, FORMAT_VERSION)?;
    write_u8(w, kind)?;
    Ok(())
}

fn read_header(r: &mut impl Read, expected_kind: u8) -> Result<(), SketchError> {
    let mut magic = [0_u8; 4];
    r.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(SketchError::FormatError(format!(
            "bad magic: expected {:?}, found {:?}",
            MAGIC, magic
        )));
    }
    let version = read_u32(r)?;
    if version == 0 || version > FORMAT_VERSION {
        return Err(SketchError::FormatError(format!(
            "unsupported format version {version}"
        )));
    }
    let kind = read_u8(r)?;
    if kind != expected_kind {
        return Err(SketchError::FormatError(format!(
            "kind mismatch: expected {expected_kind}, found {kind}"
        )));
    }
    Ok(())
}

impl HyperLogLog {
    /// Writes this sketch to `writer` in the crate's binary container
    /// format.
    pub fn save_to<W: Write>(&self, writer: &mut W) -> Result<(), SketchError> {
        write_header(writer, KIND_HLL)?;
        write_u8(writer, self.precision())?;
        write_u64(writer, self.seed())?;
        write_u64(writer, self.n_added())?;
        write_u64(writer, self.n_records())?;
        write_u32(writer, self.register_count() as u32)?;
        writer.write_all(self.registers())?;
        Ok(())
    }

    /// Reads a sketch previously written by [`Self::save_to`].
    ///
    /// # Errors
    /// Returns [`SketchError::FormatError`] on a bad magic, unsupported
    /// version, kind mismatch, or a register count that disagrees with the
    /// declared precision.
    pub fn load_from<R: Read>(reader: &mut R) -> Result<Self, SketchError> {
        read_header(reader, KIND_HLL)?;
        let precision = read_u8(reader)?;
        let seed = read_u64(reader)?;
        let n_added = read_u64(reader)?;
        let n_records = read_u64(reader)?;
        let register_count = read_u32(reader)? as usize;

        let expected = 1_usize << precision;
        if register_count != expected {
            return Err(SketchError::FormatError(format!(
                "register count {register_count} does not match precision {precision} (expected {expected})"
            )));
        }

        let mut registers = vec![0_u8; register_count];
        reader.read_exact(&mut registers)?;

        let mut hll = HyperLogLog::from_parts(precision, seed, registers);
        hll.update_records(n_records);
        hll.set_n_added(n_added);
        Ok(hll)
    }

    /// Saves this sketch to the file at `path`, overwriting any existing
    /// contents.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SketchError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_to(&mut writer)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), "hll sketch saved");
        Ok(())
    }

    /// Loads a sketch from the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SketchError> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let hll = Self::load_from(&mut reader)?;
        tracing::debug!(path = %path.display(), "hll sketch loaded");
        Ok(hll)
    }
}

impl Cms {
    fn kind_tag(&self) -> u8 {
        match self.kind() {
            CmsKind::Linear => KIND_CMS_LINEAR,
            CmsKind::Log8 => KIND_CMS_LOG8,
            CmsKind::Log16 => KIND_CMS_LOG16,
        }
    }

    /// Writes this sketch to `writer` in the crate's binary container
    /// format.
    pub fn save_to<W: Write>(&self, writer: &mut W) -> Result<(), SketchError> {
        write_header(writer, self.kind_tag())?;
        write_u64(writer, self.width() as u64)?;
        write_u64(writer, self.depth() as u64)?;
        write_u64(writer, self.seed())?;
        write_u64(writer, self.num_reserved())?;
        write_u64(writer, self.max_count())?;
        write_u64(writer, self.n_added())?;
        write_u64(writer, self.n_records())?;

        let table = self.raw_table_u64();
        write_u64(writer, table.len() as u64)?;
        match self.kind() {
            CmsKind::Linear => {
                for v in table {
                    write_u32(writer, v as u32)?;
                }
            }
            CmsKind::Log8 => {
                for v in table {
                    write_u8(writer, v as u8)?;
                }
            }
            CmsKind::Log16 => {
                for v in table {
                    write_u16(writer, v as u16)?;
                }
            }
        }
        Ok(())
    }

    /// Reads a sketch previously written by [`Self::save_to`].
    ///
    /// # Errors
    /// Returns [`SketchError::FormatError`] on a bad magic, unsupported
    /// version, unrecognized kind tag, or a cell count that disagrees with
    /// `width * depth`.
    pub fn load_from<R: Read>(reader: &mut R) -> Result<Self, SketchError> {
        let mut magic = [0_u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(SketchError::FormatError(format!(
                "bad magic: expected {:?}, found {:?}",
                MAGIC, magic
            )));
        }
        let version = read_u32(reader)?;
        if version == 0 || version > FORMAT_VERSION {
            return Err(SketchError::FormatError(format!(
                "unsupported format version {version}"
            )));
        }
        let kind_tag = read_u8(reader)?;
        let kind = match kind_tag {
            KIND_CMS_LINEAR => CmsKind::Linear,
            KIND_CMS_LOG8 => CmsKind::Log8,
            KIND_CMS_LOG16 => CmsKind::Log16,
            other => {
                return Err(SketchError::FormatError(format!(
                    "unrecognized cms kind tag {other}"
                )))
            }
        };

        let width = read_u64(reader)? as usize;
        let depth = read_u64(reader)? as usize;
        let seed = read_u64(reader)?;
        let num_reserved = read_u64(reader)?;
        let max_count = read_u64(reader)?;
        let n_added = read_u64(reader)?;
        let n_records = read_u64(reader)?;
        let cell_count = read_u64(reader)? as usize;

        if cell_count != width * depth {
            return Err(SketchError::FormatError(format!(
                "cell count {cell_count} does not match width*depth {}",
                width * depth
            )));
        }

        let mut cms = match kind {
            CmsKind::Linear => Cms::new(kind, width, depth, seed)?,
            CmsKind::Log8 | CmsKind::Log16 => {
                Cms::with_log_params(kind, width, depth, seed, max_count, num_reserved)?
            }
        };

        for idx in 0..cell_count {
            let raw = match kind {
                CmsKind::Linear => read_u32(reader)? as u64,
                CmsKind::Log8 => read_u8(reader)? as u64,
                CmsKind::Log16 => read_u16(reader)? as u64,
            };
            cms.set_raw(idx, raw);
        }

        cms.update_records(n_records);
        cms.set_n_added(n_added);
        Ok(cms)
    }

    /// Saves this sketch to the file at `path`, overwriting any existing
    /// contents.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SketchError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_to(&mut writer)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), kind = ?self.kind(), "cms sketch saved");
        Ok(())
    }

    /// Loads a sketch from the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SketchError> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let cms = Self::load_from(&mut reader)?;
        tracing::debug!(path = %path.display(), kind = ?cms.kind(), "cms sketch loaded");
        Ok(cms)
    }
}

impl HeavyHitters {
    /// Writes this sketch to `writer` in the crate's binary container
    /// format.
    pub fn save_to<W: Write>(&self, writer: &mut W) -> Result<(), SketchError> {
        write_header(writer, KIND_HH)?;
        write_u64(writer, self.width() as u64)?;
        write_u64(writer, self.depth() as u64)?;
        write_u64(writer, self.max_key_len() as u64)?;
        write_f64(writer, self.phi())?;
        write_u64(writer, self.seed())?;
        write_u64(writer, self.n_added())?;
        write_u64(writer, self.n_records())?;

        let cell_count = self.cell_count();
        write_u64(writer, cell_count as u64)?;
        for idx in 0..cell_count {
            let (key, len, counter) = self.cell_raw(idx);
            write_u8(writer, len)?;
            write_u32(writer, counter)?;
            writer.write_all(key)?;
            let padding = self.max_key_len() - key.len();
            if padding > 0 {
                writer.write_all(&vec![0_u8; padding])?;
            }
        }
        Ok(())
    }

    /// Reads a sketch previously written by [`Self::save_to`].
    ///
    /// # Errors
    /// Returns [`SketchError::FormatError`] on a bad magic, unsupported
    /// version, kind mismatch, or a cell count that disagrees with
    /// `width * depth`.
    pub fn load_from<R: Read>(reader: &mut R) -> Result<Self, SketchError> {
        read_header(reader, KIND_HH)?;
        let width = read_u64(reader)? as usize;
        let depth = read_u64(reader)? as usize;
        let max_key_len = read_u64(reader)? as usize;
        let phi = read_f64(reader)?;
        let seed = read_u64(reader)?;
        let n_added = read_u64(reader)?;
        let n_records = read_u64(reader)?;
        let cell_count = read_u64(reader)? as usize;

        if cell_count != width * depth {
            return Err(SketchError::FormatError(format!(
                "cell count {cell_count} does not match width*depth {}",
                width * depth
            )));
        }

        let mut raw_cells = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            let len = read_u8(reader)?;
            let counter = read_u32(reader)?;
            let mut key = vec![0_u8; max_key_len];
            reader.read_exact(&mut key)?;
            key.truncate(len as usize);
            raw_cells.push((key, len, counter));
        }

        let mut hh = HeavyHitters::from_parts(width, depth, max_key_len, phi, seed, raw_cells);
        hh.update_records(n_records);
        hh.set_n_added(n_added);
        Ok(hh)
    }

    /// Saves this sketch to the file at `path`, overwriting any existing
    /// contents.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SketchError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.save_to(&mut writer)?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), "heavy-hitters sketch saved");
        Ok(())
    }

    /// Loads a sketch from the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SketchError> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let hh = Self::load_from(&mut reader)?;
        tracing::debug!(path = %path.display(), "heavy-hitters sketch loaded");
        Ok(hh)
    }
}
