//! Go runtime symbol table (`.gopclntab`)
//!
//! Go binaries are routinely stripped of their native symtab but always
//! carry the runtime's pclntab. Only the pieces needed for name resolution
//! are parsed: the function table (entry address per function) and the
//! function name blob. Line tables are ignored.
//!
//! Layout differs per Go release and is identified by the leading magic:
//! go1.2, go1.16, and go1.18 (go1.20 shares the 1.18 layout with a new
//! magic).

use crate::domain::SymbolError;

use super::resolver::SymbolResolver;

const GO12_MAGIC: u32 = 0xffff_fffb;
const GO116_MAGIC: u32 = 0xffff_fffa;
const GO118_MAGIC: u32 = 0xffff_fff0;
const GO120_MAGIC: u32 = 0xffff_fff1;

struct GoFunc {
    entry: u64,
    name: String,
}

/// Sorted Go function table: entry virtual address → function name.
pub struct GoTable {
    funcs: Vec<GoFunc>,
    /// One past the last byte of the final function, from the functab
    /// end sentinel.
    end_pc: u64,
}

impl GoTable {
    /// Parse a `.gopclntab` section.
    ///
    /// # Errors
    /// Fails on unknown magics and on truncated or implausible tables.
    pub fn parse(data: &[u8]) -> Result<Self, SymbolError> {
        let reader = Reader::new(data)?;
        let magic = reader.u32(0)?;
        let mut table = match magic {
            GO118_MAGIC | GO120_MAGIC => Self::parse_v118(&reader)?,
            GO116_MAGIC => Self::parse_v116(&reader)?,
            GO12_MAGIC => Self::parse_v12(&reader)?,
            other => return Err(SymbolError::UnsupportedGoMagic(other)),
        };
        table.funcs.sort_by_key(|f| f.entry);
        Ok(table)
    }

    /// go1.18/go1.20: functab holds u32 offsets from the text start, and
    /// func records live relative to the funcdata region.
    fn parse_v118(reader: &Reader<'_>) -> Result<Self, SymbolError> {
        let nfunc = reader.count(reader.header_word(0)?)?;
        let text_start = reader.header_word(2)?;
        let funcname_off = reader.header_offset(3)?;
        let funcdata_off = reader.header_offset(7)?;

        let mut funcs = Vec::with_capacity(nfunc);
        for i in 0..nfunc {
            let entry_off = reader.u32(funcdata_off + i * 8)?;
            let func_off = reader.offset32(funcdata_off + i * 8 + 4)?;
            let name_off = reader.offset32(funcdata_off + func_off + 4)?;
            funcs.push(GoFunc {
                entry: text_start + u64::from(entry_off),
                name: reader.cstr(funcname_off + name_off)?,
            });
        }
        let end_pc = text_start + u64::from(reader.u32(funcdata_off + nfunc * 8)?);
        Ok(Self { funcs, end_pc })
    }

    /// go1.16: functab holds absolute entry addresses in pointer-sized
    /// words; func records live relative to the funcdata region.
    fn parse_v116(reader: &Reader<'_>) -> Result<Self, SymbolError> {
        let nfunc = reader.count(reader.header_word(0)?)?;
        let funcname_off = reader.header_offset(2)?;
        let funcdata_off = reader.header_offset(6)?;
        let pair = 2 * reader.ptr_size;

        let mut funcs = Vec::with_capacity(nfunc);
        for i in 0..nfunc {
            let entry = reader.word(funcdata_off + i * pair)?;
            let func_off = reader.offset(funcdata_off + i * pair + reader.ptr_size)?;
            let name_off = reader.offset32(funcdata_off + func_off + reader.ptr_size)?;
            funcs.push(GoFunc {
                entry,
                name: reader.cstr(funcname_off + name_off)?,
            });
        }
        let end_pc = reader.word(funcdata_off + nfunc * pair)?;
        Ok(Self { funcs, end_pc })
    }

    /// go1.2: functab follows the header directly and every offset is
    /// relative to the start of the section.
    fn parse_v12(reader: &Reader<'_>) -> Result<Self, SymbolError> {
        let nfunc = reader.count(reader.word(8)?)?;
        let functab = 8 + reader.ptr_size;
        let pair = 2 * reader.ptr_size;

        let mut funcs = Vec::with_capacity(nfunc);
        for i in 0..nfunc {
            let entry = reader.word(functab + i * pair)?;
            let func_off = reader.offset(functab + i * pair + reader.ptr_size)?;
            let name_off = reader.offset32(func_off + reader.ptr_size)?;
            funcs.push(GoFunc {
                entry,
                name: reader.cstr(name_off)?,
            });
        }
        let end_pc = reader.word(functab + nfunc * pair)?;
        Ok(Self { funcs, end_pc })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    fn find(&self, addr: u64) -> Option<&GoFunc> {
        let first = self.funcs.first()?;
        if addr < first.entry || addr >= self.end_pc {
            return None;
        }
        let idx = self.funcs.partition_point(|f| f.entry <= addr);
        Some(&self.funcs[idx - 1])
    }
}

impl SymbolResolver for GoTable {
    fn resolve(&self, addr: u64) -> Option<String> {
        self.find(addr).map(|f| f.name.clone())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    ptr_size: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Result<Self, SymbolError> {
        let ptr_size = *data
            .get(7)
            .ok_or(SymbolError::MalformedGoTable("truncated header"))?
            as usize;
        if ptr_size != 4 && ptr_size != 8 {
            return Err(SymbolError::MalformedGoTable("pointer size"));
        }
        Ok(Self { data, ptr_size })
    }

    fn u32(&self, off: usize) -> Result<u32, SymbolError> {
        let bytes = self
            .data
            .get(off..off + 4)
            .ok_or(SymbolError::MalformedGoTable("truncated"))?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn word(&self, off: usize) -> Result<u64, SymbolError> {
        if self.ptr_size == 4 {
            return Ok(u64::from(self.u32(off)?));
        }
        let bytes = self
            .data
            .get(off..off + 8)
            .ok_or(SymbolError::MalformedGoTable("truncated"))?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// A pointer-sized word used as an in-section offset.
    fn offset(&self, off: usize) -> Result<usize, SymbolError> {
        usize::try_from(self.word(off)?)
            .map_err(|_| SymbolError::MalformedGoTable("offset overflow"))
    }

    /// A u32 used as an in-section offset.
    fn offset32(&self, off: usize) -> Result<usize, SymbolError> {
        Ok(self.u32(off)? as usize)
    }

    /// Header word `slot`, counting from the end of the 8-byte fixed header.
    fn header_word(&self, slot: usize) -> Result<u64, SymbolError> {
        self.word(8 + slot * self.ptr_size)
    }

    fn header_offset(&self, slot: usize) -> Result<usize, SymbolError> {
        usize::try_from(self.header_word(slot)?)
            .map_err(|_| SymbolError::MalformedGoTable("offset overflow"))
    }

    /// A function count, sanity-bounded by the section size.
    fn count(&self, raw: u64) -> Result<usize, SymbolError> {
        let count = usize::try_from(raw)
            .map_err(|_| SymbolError::MalformedGoTable("function count"))?;
        if count > self.data.len() {
            return Err(SymbolError::MalformedGoTable("function count"));
        }
        Ok(count)
    }

    fn cstr(&self, off: usize) -> Result<String, SymbolError> {
        let tail = self
            .data
            .get(off..)
            .ok_or(SymbolError::MalformedGoTable("truncated"))?;
        let len = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..len]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_u32(data: &mut [u8], off: usize, value: u32) {
        data[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u64(data: &mut [u8], off: usize, value: u64) {
        data[off..off + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Two functions ("alpha" at 0x1010, "beta" at 0x1020, text ends at
    /// 0x1030) in the go1.18 layout.
    fn synthetic_v118() -> Vec<u8> {
        let mut data = vec![0u8; 128];
        put_u32(&mut data, 0, GO118_MAGIC);
        data[6] = 1; // instruction size quantum
        data[7] = 8; // pointer size
        put_u64(&mut data, 8, 2); // nfunc
        put_u64(&mut data, 16, 0); // nfiles
        put_u64(&mut data, 24, 0x1000); // text start
        put_u64(&mut data, 32, 72); // funcname table offset
        put_u64(&mut data, 40, 0); // cutab offset
        put_u64(&mut data, 48, 0); // filetab offset
        put_u64(&mut data, 56, 0); // pctab offset
        put_u64(&mut data, 64, 88); // funcdata offset

        // Function name blob at 72: "alpha\0beta\0".
        data[72..83].copy_from_slice(b"alpha\0beta\0");

        // functab at 88: (entry_off, func_off) pairs plus the end sentinel.
        put_u32(&mut data, 88, 0x10);
        put_u32(&mut data, 92, 24);
        put_u32(&mut data, 96, 0x20);
        put_u32(&mut data, 100, 32);
        put_u32(&mut data, 104, 0x30); // end-of-text sentinel

        // func records relative to the funcdata region (88).
        put_u32(&mut data, 88 + 24, 0x10); // entry_off
        put_u32(&mut data, 88 + 28, 0); // name_off -> "alpha"
        put_u32(&mut data, 88 + 32, 0x20);
        put_u32(&mut data, 88 + 36, 6); // name_off -> "beta"

        data
    }

    #[test]
    fn test_parse_and_resolve_v118() {
        let table = GoTable::parse(&synthetic_v118()).expect("parse");
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(0x1010).as_deref(), Some("alpha"));
        assert_eq!(table.resolve(0x101f).as_deref(), Some("alpha"));
        assert_eq!(table.resolve(0x1020).as_deref(), Some("beta"));
        assert_eq!(table.resolve(0x102f).as_deref(), Some("beta"));
    }

    #[test]
    fn test_resolve_out_of_range() {
        let table = GoTable::parse(&synthetic_v118()).expect("parse");
        assert_eq!(table.resolve(0xfff), None);
        assert_eq!(table.resolve(0x1030), None);
        assert_eq!(table.resolve(u64::MAX), None);
    }

    #[test]
    fn test_unknown_magic() {
        let mut data = synthetic_v118();
        put_u32(&mut data, 0, 0x1234_5678);
        let err = GoTable::parse(&data).err().expect("parse must fail");
        match err {
            SymbolError::UnsupportedGoMagic(magic) => assert_eq!(magic, 0x1234_5678),
            other => panic!("expected UnsupportedGoMagic, got {other}"),
        }
    }

    #[test]
    fn test_truncated_table() {
        let data = synthetic_v118();
        assert!(GoTable::parse(&data[..16]).is_err());
    }
}
