//! Hive access and the key/value tree façade.
//!
//! A [`Hive`] owns one immutable buffer (memory-mapped or read up front).
//! [`RegistryKey`] and [`RegistryValue`] are cheap views that borrow the hive
//! and re-resolve their children from the buffer on every call.

use crate::bigdata::{reassemble, BigDataBlock};
use crate::cell::{Cell, CellType, Record, ValueType};
use crate::diagnostics::Diagnostics;
use crate::error::{RegistryError, Result};
use crate::hbin::{HbinBlock, HbinIterator};
use crate::header::{BaseBlock, HiveType, BASE_BLOCK_SIZE};
use crate::key::KeyNode;
use crate::options::HiveOptions;
use crate::security::SecurityDescriptor;
use crate::subkey_list::SubkeyList;
use crate::utils::{cell_offset_to_absolute, decode_utf16le, read_i32_le, HBIN_START_OFFSET};
use crate::value::{DataStorage, ValueData, ValueKey, ValueList};
use memmap2::Mmap;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info, instrument};

/// Separator between key names in paths.
pub const PATH_SEPARATOR: &str = "\\";

/// A loaded registry hive.
///
/// # Caching
///
/// Parsed key nodes are kept in an offset-keyed cache unless
/// [`HiveOptions::cache_keys`] is off. The buffer never changes, so cached
/// and freshly parsed nodes are identical.
pub struct Hive {
    data: HiveData,
    base_block: BaseBlock,
    options: HiveOptions,
    diagnostics: Diagnostics,
    key_cache: RwLock<HashMap<u32, KeyNode>>,
}

/// Represents hive data storage.
enum HiveData {
    /// Memory-mapped file data.
    Mapped(Mmap),
    /// Owned data read up front.
    Owned(Vec<u8>),
}

impl HiveData {
    fn as_slice(&self) -> &[u8] {
        match self {
            HiveData::Mapped(mmap) => &mmap[..],
            HiveData::Owned(data) => data.as_slice(),
        }
    }
}

impl Hive {
    /// Opens a registry hive file by memory-mapping it read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is smaller than a base
    /// block, or does not start with a valid base block.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hive_reader::Hive;
    ///
    /// let hive = Hive::open("SYSTEM").unwrap();
    /// ```
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening registry hive");
        let file = File::open(&path)?;

        let file_size = file.metadata()?.len() as usize;
        if file_size < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: file_size,
                minimum: BASE_BLOCK_SIZE,
            });
        }

        // SAFETY: the file is opened read-only, the mapping is never written
        // through, it lives exactly as long as the Hive, and every access
        // goes through bounds-checked slicing.
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(size = mmap.len(), "Memory mapped hive file");

        Self::from_data(HiveData::Mapped(mmap), HiveOptions::default(), Diagnostics::new())
    }

    /// Reads a hive file into memory in one pass.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Reading registry hive");
        let data = std::fs::read(path)?;
        Self::from_vec(data)
    }

    /// Creates a hive from a memory-mapped region.
    pub fn from_mmap(mmap: Mmap) -> Result<Self> {
        Self::from_data(HiveData::Mapped(mmap), HiveOptions::default(), Diagnostics::new())
    }

    /// Creates a hive from owned data.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::from_vec_with_options(data, HiveOptions::default(), Diagnostics::new())
    }

    /// Creates a hive from owned data with explicit options and warning sink.
    pub fn from_vec_with_options(
        data: Vec<u8>,
        options: HiveOptions,
        diagnostics: Diagnostics,
    ) -> Result<Self> {
        Self::from_data(HiveData::Owned(data), options, diagnostics)
    }

    fn from_data(data: HiveData, options: HiveOptions, diagnostics: Diagnostics) -> Result<Self> {
        let base_block = BaseBlock::parse(data.as_slice())?;

        if !base_block.is_consistent() {
            diagnostics.warn_once(format!(
                "sequence numbers differ ({} != {}); hive was not cleanly written",
                base_block.primary_sequence, base_block.secondary_sequence
            ));
        }
        if !base_block.is_known_version() {
            diagnostics.warn_once(format!(
                "unexpected format version {}.{}",
                base_block.major_version, base_block.minor_version
            ));
        }
        if base_block.hbins_end() > data.as_slice().len() {
            diagnostics.warn_once(format!(
                "header claims {:#x} bytes of hive bins but the file ends at {:#x}",
                base_block.hive_length,
                data.as_slice().len()
            ));
        }

        Ok(Self {
            data,
            base_block,
            options,
            diagnostics,
            key_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Returns a reference to the base block header.
    pub fn base_block(&self) -> &BaseBlock {
        &self.base_block
    }

    /// Hive name embedded in the header.
    pub fn hive_name(&self) -> &str {
        &self.base_block.file_name
    }

    /// Kind of hive, inferred from its embedded name.
    pub fn hive_type(&self) -> HiveType {
        self.base_block.hive_type()
    }

    /// Options this hive was opened with.
    pub fn options(&self) -> &HiveOptions {
        &self.options
    }

    /// Warnings recorded while reading this hive.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The whole backing buffer.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Returns the root key of the hive.
    #[instrument(skip(self))]
    pub fn root_key(&self) -> Result<RegistryKey<'_>> {
        let offset = self.base_block.root_cell_offset;
        debug!(offset = %format!("{:#x}", offset), "Accessing root key");
        self.get_key(offset)
    }

    /// Opens a key by backslash-separated path, relative to the root key.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hive_reader::Hive;
    ///
    /// let hive = Hive::open("SYSTEM").unwrap();
    /// let select = hive.open_key("Select").unwrap();
    /// println!("{}", select.path().unwrap());
    /// ```
    pub fn open_key(&self, path: &str) -> Result<RegistryKey<'_>> {
        self.root_key()?.find_key(path)
    }

    /// Gets a key by its cell offset.
    pub fn get_key(&self, offset: u32) -> Result<RegistryKey<'_>> {
        Ok(RegistryKey {
            hive: self,
            offset,
            key_node: self.key_node(offset)?,
        })
    }

    /// Parses (or fetches from cache) the key node at `offset`.
    pub fn key_node(&self, offset: u32) -> Result<KeyNode> {
        if self.options.cache_keys {
            let cache = self.key_cache.read().unwrap_or_else(|p| p.into_inner());
            if let Some(key_node) = cache.get(&offset) {
                return Ok(key_node.clone());
            }
        }

        let key_node = KeyNode::parse(self.read_cell(offset)?, offset)?;
        if key_node.name_misflagged {
            debug!(offset = %format!("{:#x}", offset), "compressed key name stored as UTF-16");
            self.diagnostics
                .warn_once("key names flagged single-byte but stored as UTF-16");
        }

        if self.options.cache_keys {
            self.key_cache
                .write()
                .unwrap_or_else(|p| p.into_inner())
                .insert(offset, key_node.clone());
        }
        Ok(key_node)
    }

    /// Opens the cell at a relative offset.
    ///
    /// # Errors
    ///
    /// Fails if the offset or the cell's extent falls outside the buffer.
    pub fn cell(&self, offset: u32) -> Result<Cell<'_>> {
        let data = self.data.as_slice();
        let abs_offset = cell_offset_to_absolute(offset)? as usize;

        if abs_offset >= data.len() {
            return Err(RegistryError::invalid_offset(offset, data.len()));
        }

        let size = read_i32_le(data, abs_offset).map_err(|_| RegistryError::TruncatedData {
            offset,
            expected: 4,
            actual: data.len() - abs_offset,
        })?;
        let abs_size = size.unsigned_abs() as usize;
        if abs_size < 4 {
            return Err(RegistryError::invalid_cell_size(size, offset));
        }

        let payload = data.get(abs_offset + 4..abs_offset + abs_size).ok_or(
            RegistryError::TruncatedData {
                offset,
                expected: abs_size,
                actual: data.len() - abs_offset,
            },
        )?;
        Ok(Cell::new(offset, size, payload))
    }

    /// Returns the payload of the cell at `offset` (without its size field).
    pub fn read_cell(&self, offset: u32) -> Result<&[u8]> {
        Ok(self.cell(offset)?.data())
    }

    /// Opens the cell at `offset` and decodes it by tag.
    pub fn record(&self, offset: u32) -> Result<Record<'_>> {
        self.cell(offset)?.child()
    }

    /// Parses a subkey list at the given offset.
    pub fn subkey_list(&self, offset: u32) -> Result<SubkeyList> {
        SubkeyList::parse(self.read_cell(offset)?, offset)
    }

    /// Key offsets reachable from a subkey list, following one `ri` level.
    pub fn subkey_offsets(&self, list_offset: u32) -> Result<Vec<u32>> {
        let list = self.subkey_list(list_offset)?;
        if !list.is_index_root() {
            return Ok(list.offsets().collect());
        }

        let mut offsets = Vec::new();
        for sublist_offset in list.offsets() {
            let sublist = self.subkey_list(sublist_offset)?;
            if sublist.is_index_root() {
                return Err(RegistryError::format_error(format!(
                    "index root at {:#x} references another index root at {:#x}",
                    list_offset, sublist_offset
                )));
            }
            offsets.extend(sublist.offsets());
        }
        Ok(offsets)
    }

    /// Parses the value-pointer list of a key.
    pub fn value_list(&self, key_node: &KeyNode) -> Result<ValueList> {
        let offset = key_node.value_list_cell()?;
        ValueList::parse(self.read_cell(offset)?, key_node.value_count, offset)
    }

    /// Parses a value key at the given offset.
    pub fn value_key(&self, offset: u32) -> Result<ValueKey> {
        let value_key = ValueKey::parse(self.read_cell(offset)?, offset)?;
        if value_key.name_misflagged {
            self.diagnostics
                .warn_once("value names flagged single-byte but stored as UTF-16");
        }
        Ok(value_key)
    }

    /// Parses a security key at the given offset.
    pub fn security_descriptor(&self, offset: u32) -> Result<SecurityDescriptor> {
        SecurityDescriptor::parse(self.read_cell(offset)?, offset)
    }

    /// Resolves a value's bytes, wherever they are stored.
    ///
    /// Inline data comes from the record itself. Data longer than one chunk
    /// whose cell is tagged `db` is reassembled from its chunks. Anything else
    /// is read from the data cell and cut to the declared length.
    pub fn value_data(&self, value: &ValueKey) -> Result<Vec<u8>> {
        match value.storage() {
            DataStorage::Empty => Ok(Vec::new()),
            DataStorage::Inline => {
                if value.data_length > 4 {
                    self.diagnostics
                        .warn_once("inline value data declared longer than 4 bytes");
                }
                Ok(value.inline_data())
            }
            DataStorage::Cell => {
                let cell = self.cell(value.data_offset)?;
                let length = value.data_length as usize;

                if value.may_use_big_data() && cell.cell_type() == Some(CellType::DataBlock) {
                    return self.read_big_data(&cell, length);
                }

                let payload = cell.data();
                if payload.len() < length {
                    debug!(
                        value = %format!("{:#x}", value.offset),
                        declared = length,
                        available = payload.len(),
                        "value data cell shorter than declared length"
                    );
                    self.diagnostics
                        .warn_once("value data cells shorter than their declared length");
                    return Ok(payload.to_vec());
                }
                Ok(payload[..length].to_vec())
            }
        }
    }

    /// Reassembles a big data value from its `db` header cell.
    fn read_big_data(&self, header: &Cell<'_>, length: usize) -> Result<Vec<u8>> {
        let db = BigDataBlock::parse(header.data(), header.offset())?;
        let needed = BigDataBlock::chunk_count(length);
        debug!(
            offset = %format!("{:#x}", db.offset),
            segments = db.segment_count,
            length,
            "Reading big data block"
        );

        if db.segment_count as usize != needed {
            self.diagnostics.warn_once(format!(
                "big data header at {:#x} lists {} segments, length needs {}",
                db.offset, db.segment_count, needed
            ));
        }

        let list = self.read_cell(db.segment_list_offset)?;
        let segments = db.segment_offsets(list, needed)?;
        reassemble(&segments, length, |segment| self.read_cell(segment))
    }

    /// Iterates over the hbin chain.
    pub fn hbins(&self) -> HbinIterator<'_> {
        HbinIterator::new(self.data.as_slice(), self.base_block.hbins_end())
    }

    /// Opens the first hbin.
    pub fn first_hbin(&self) -> Result<HbinBlock<'_>> {
        HbinBlock::parse(
            self.data.as_slice(),
            HBIN_START_OFFSET as usize,
            self.base_block.hbins_end(),
        )
    }
}

/// Case-insensitive name comparison used for key and value lookups.
fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

/// A registry key with access to its hive.
#[derive(Clone)]
pub struct RegistryKey<'a> {
    hive: &'a Hive,
    offset: u32,
    key_node: KeyNode,
}

impl<'a> RegistryKey<'a> {
    /// Cell offset of this key (relative to first hbin).
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Returns the decoded key node.
    pub fn key_node(&self) -> &KeyNode {
        &self.key_node
    }

    /// Returns the key name.
    pub fn name(&self) -> &str {
        &self.key_node.name
    }

    /// True for the hive's root key.
    pub fn is_root(&self) -> bool {
        self.key_node.is_root()
    }

    /// Raw last-written FILETIME.
    pub fn last_written(&self) -> u64 {
        self.key_node.last_written
    }

    /// Last-written time as a UTC timestamp.
    pub fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.key_node.timestamp()
    }

    /// Returns the number of subkeys.
    pub fn subkey_count(&self) -> u32 {
        self.key_node.subkey_count
    }

    /// Returns the number of values.
    pub fn value_count(&self) -> u32 {
        self.key_node.value_count
    }

    /// The key's class name, if it has one.
    pub fn class_name(&self) -> Result<Option<String>> {
        let offset = match self.key_node.class_name_cell() {
            Ok(offset) => offset,
            Err(e) if e.is_missing_structure() => return Ok(None),
            Err(e) => return Err(e),
        };
        let data = self.hive.read_cell(offset)?;
        let len = (self.key_node.class_name_length as usize).min(data.len());
        Ok(Some(decode_utf16le(&data[..len])))
    }

    /// The parent key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StructureDoesNotExist`] for the root key.
    pub fn parent(&self) -> Result<RegistryKey<'a>> {
        self.hive.get_key(self.key_node.parent_cell()?)
    }

    /// Full path from the root key, names joined by a backslash.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::InvalidFormat`] if the parent chain loops
    /// or is longer than [`HiveOptions::max_depth`].
    pub fn path(&self) -> Result<String> {
        let mut names = vec![self.key_node.name.clone()];
        let mut visited = HashSet::from([self.offset]);
        let mut current = self.key_node.clone();

        loop {
            let parent_offset = match current.parent_cell() {
                Ok(offset) => offset,
                Err(e) if e.is_missing_structure() => break,
                Err(e) => return Err(e),
            };
            if !visited.insert(parent_offset) || visited.len() > self.hive.options.max_depth {
                return Err(RegistryError::format_error(format!(
                    "parent chain of key at {:#x} loops or exceeds {} levels",
                    self.offset, self.hive.options.max_depth
                )));
            }
            current = self.hive.key_node(parent_offset)?;
            names.push(current.name.clone());
        }

        names.reverse();
        Ok(names.join(PATH_SEPARATOR))
    }

    /// The subkey-index record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StructureDoesNotExist`] when the key has no subkeys.
    pub fn subkey_list(&self) -> Result<SubkeyList> {
        self.hive.subkey_list(self.key_node.subkey_list_cell()?)
    }

    /// Returns the subkeys; empty when the key has none.
    pub fn subkeys(&self) -> Result<Vec<RegistryKey<'a>>> {
        if !self.key_node.has_subkeys() {
            return Ok(Vec::new());
        }

        let offsets = self.hive.subkey_offsets(self.key_node.subkey_list_cell()?)?;
        if offsets.len() != self.key_node.subkey_count as usize {
            self.hive.diagnostics.warn_once(format!(
                "key at {:#x} declares {} subkeys, index lists {}",
                self.offset,
                self.key_node.subkey_count,
                offsets.len()
            ));
        }

        offsets
            .into_iter()
            .map(|offset| self.hive.get_key(offset))
            .collect()
    }

    /// Finds a direct subkey by name, ignoring case.
    pub fn subkey(&self, name: &str) -> Result<RegistryKey<'a>> {
        self.subkeys()?
            .into_iter()
            .find(|key| names_match(key.name(), name))
            .ok_or_else(|| {
                let base = self.path().unwrap_or_else(|_| self.name().to_string());
                RegistryError::not_found("key", &format!("{}{}{}", base, PATH_SEPARATOR, name))
            })
    }

    /// Descends through a backslash-separated path, one subkey at a time.
    ///
    /// Empty segments are skipped, so leading or doubled separators are
    /// harmless. The first missing segment fails with
    /// [`RegistryError::KeyNotFound`].
    pub fn find_key(&self, path: &str) -> Result<RegistryKey<'a>> {
        path.split(PATH_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .try_fold(self.clone(), |key, segment| key.subkey(segment))
    }

    /// The value-pointer list.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StructureDoesNotExist`] when the key has no values.
    pub fn value_list(&self) -> Result<ValueList> {
        self.hive.value_list(&self.key_node)
    }

    /// Returns the values; empty when the key has none.
    pub fn values(&self) -> Result<Vec<RegistryValue<'a>>> {
        if !self.key_node.has_values() {
            return Ok(Vec::new());
        }

        self.value_list()?
            .offsets
            .into_iter()
            .map(|offset| {
                Ok(RegistryValue {
                    hive: self.hive,
                    value_key: self.hive.value_key(offset)?,
                })
            })
            .collect()
    }

    /// Gets a value by name, ignoring case.
    ///
    /// `""` and `"(default)"` both select the unnamed value.
    pub fn value(&self, name: &str) -> Result<RegistryValue<'a>> {
        let wants_default = name.is_empty() || name.eq_ignore_ascii_case("(default)");

        self.values()?
            .into_iter()
            .find(|value| {
                if value.is_default() {
                    wants_default
                } else {
                    names_match(value.name(), name)
                }
            })
            .ok_or_else(|| RegistryError::not_found("value", name))
    }

    /// The key's security record.
    pub fn security(&self) -> Result<SecurityDescriptor> {
        self.hive.security_descriptor(self.key_node.security_cell()?)
    }
}

impl std::fmt::Debug for RegistryKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryKey")
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("name", &self.key_node.name)
            .field("subkeys", &self.key_node.subkey_count)
            .field("values", &self.key_node.value_count)
            .finish()
    }
}

/// A registry value.
#[derive(Clone)]
pub struct RegistryValue<'a> {
    hive: &'a Hive,
    value_key: ValueKey,
}

impl<'a> RegistryValue<'a> {
    /// Returns the value name; "(default)" for the unnamed value.
    pub fn name(&self) -> &str {
        &self.value_key.name
    }

    /// True for the unnamed default value.
    pub fn is_default(&self) -> bool {
        self.value_key.is_default()
    }

    /// Cell offset of the value record.
    pub fn offset(&self) -> u32 {
        self.value_key.offset
    }

    /// Returns the decoded value record.
    pub fn value_key(&self) -> &ValueKey {
        &self.value_key
    }

    /// Returns the value data type.
    pub fn data_type(&self) -> ValueType {
        self.value_key.data_type
    }

    /// Name of the value type, e.g. "REG_SZ".
    pub fn data_type_name(&self) -> String {
        self.value_key.data_type.name()
    }

    /// Declared data length.
    pub fn data_length(&self) -> u32 {
        self.value_key.data_length
    }

    /// Returns the raw value bytes, exactly as long as declared when the
    /// storage allows it.
    pub fn raw_data(&self) -> Result<Vec<u8>> {
        self.hive.value_data(&self.value_key)
    }

    /// Returns the typed value data.
    pub fn data(&self) -> Result<ValueData> {
        let raw = self.raw_data()?;
        ValueData::parse(&raw, self.value_key.data_type, self.value_key.offset)
    }
}

impl std::fmt::Debug for RegistryValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryValue")
            .field("offset", &format_args!("{:#x}", self.value_key.offset))
            .field("name", &self.value_key.name)
            .field("type", &self.value_key.data_type)
            .field("length", &self.value_key.data_length)
            .finish()
    }
}
