//! Synthetic hive builder for tests and benches.
//!
//! Produces byte-exact `regf` images: base block, 4KB-aligned hive bins,
//! 8-byte aligned cells, and every record kind the reader decodes.

#![allow(dead_code)]

use hive_reader::Hive;

pub const REG_NONE: u32 = 0;
pub const REG_SZ: u32 = 1;
pub const REG_EXPAND_SZ: u32 = 2;
pub const REG_BINARY: u32 = 3;
pub const REG_DWORD: u32 = 4;
pub const REG_DWORD_BIG_ENDIAN: u32 = 5;
pub const REG_MULTI_SZ: u32 = 7;
pub const REG_QWORD: u32 = 11;
pub const REG_FILETIME: u32 = 16;

pub const NO_CELL: u32 = 0xFFFF_FFFF;
pub const CHUNK: usize = 0x3FD8;

/// 2021-06-01T00:00:00Z
pub const TIMESTAMP: u64 = 132_669_792_000_000_000;

const KEY_COMP_NAME: u16 = 0x0020;
const ROOT_FLAGS: u16 = 0x002C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Li,
    Lf,
    Lh,
    /// Index root over `lh` leaves of at most two entries each.
    Ri,
}

#[derive(Debug, Clone)]
pub struct ValueDef {
    pub name: String,
    pub value_type: u32,
    pub data: Vec<u8>,
    /// Length written to the record instead of `data.len()`.
    pub declared_length: Option<u32>,
    /// Store in one data cell even when inline or big-data storage would apply.
    pub single_cell: bool,
    pub misflag_name: bool,
}

#[derive(Debug, Clone)]
struct KeyDef {
    name: String,
    parent: Option<usize>,
    children: Vec<usize>,
    values: Vec<ValueDef>,
    index: IndexKind,
    class_name: Option<String>,
    misflag_name: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ValueRef {
    pub key: usize,
    pub index: usize,
}

pub struct HiveBuilder {
    hive_name: String,
    keys: Vec<KeyDef>,
    primary_sequence: u32,
    secondary_sequence: u32,
    major_version: u32,
    minor_version: u32,
}

/// A built image plus the cell offsets of what was placed in it.
pub struct BuiltHive {
    pub bytes: Vec<u8>,
    pub key_offsets: Vec<u32>,
    pub value_offsets: Vec<Vec<u32>>,
}

impl BuiltHive {
    pub fn key_offset(&self, key: usize) -> u32 {
        self.key_offsets[key]
    }

    /// Overwrites a u32 field of a key node.
    pub fn patch_key_u32(&mut self, key: usize, field: usize, value: u32) {
        let at = 0x1000 + self.key_offsets[key] as usize + 4 + field;
        self.patch_u32(at, value);
    }

    pub fn patch_key_u16(&mut self, key: usize, field: usize, value: u16) {
        let at = 0x1000 + self.key_offsets[key] as usize + 4 + field;
        self.bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_u32(&mut self, absolute: usize, value: u32) {
        self.bytes[absolute..absolute + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn open(self) -> Hive {
        Hive::from_vec(self.bytes).expect("built hive should parse")
    }
}

impl HiveBuilder {
    pub const ROOT: usize = 0;

    pub fn new(hive_name: &str) -> Self {
        Self {
            hive_name: hive_name.to_string(),
            keys: vec![KeyDef::new("ROOT", None)],
            primary_sequence: 7,
            secondary_sequence: 7,
            major_version: 1,
            minor_version: 5,
        }
    }

    pub fn add_key(&mut self, parent: usize, name: &str) -> usize {
        let id = self.keys.len();
        self.keys.push(KeyDef::new(name, Some(parent)));
        self.keys[parent].children.push(id);
        id
    }

    /// Creates (or reuses) every key along a backslash-separated path.
    pub fn key_path(&mut self, path: &str) -> usize {
        let mut current = Self::ROOT;
        for segment in path.split('\\').filter(|s| !s.is_empty()) {
            let existing = self.keys[current]
                .children
                .iter()
                .copied()
                .find(|&child| self.keys[child].name == segment);
            current = match existing {
                Some(child) => child,
                None => self.add_key(current, segment),
            };
        }
        current
    }

    pub fn set_index(&mut self, key: usize, kind: IndexKind) {
        self.keys[key].index = kind;
    }

    pub fn set_class_name(&mut self, key: usize, class_name: &str) {
        self.keys[key].class_name = Some(class_name.to_string());
    }

    pub fn misflag_name(&mut self, key: usize) {
        self.keys[key].misflag_name = true;
    }

    pub fn sequences(&mut self, primary: u32, secondary: u32) {
        self.primary_sequence = primary;
        self.secondary_sequence = secondary;
    }

    pub fn version(&mut self, major: u32, minor: u32) {
        self.major_version = major;
        self.minor_version = minor;
    }

    pub fn add_value(&mut self, key: usize, name: &str, value_type: u32, data: impl Into<Vec<u8>>) -> ValueRef {
        let values = &mut self.keys[key].values;
        values.push(ValueDef {
            name: name.to_string(),
            value_type,
            data: data.into(),
            declared_length: None,
            single_cell: false,
            misflag_name: false,
        });
        ValueRef {
            key,
            index: values.len() - 1,
        }
    }

    pub fn value_mut(&mut self, value: ValueRef) -> &mut ValueDef {
        &mut self.keys[value.key].values[value.index]
    }

    pub fn dword(&mut self, key: usize, name: &str, value: u32) -> ValueRef {
        self.add_value(key, name, REG_DWORD, value.to_le_bytes().to_vec())
    }

    pub fn qword(&mut self, key: usize, name: &str, value: u64) -> ValueRef {
        self.add_value(key, name, REG_QWORD, value.to_le_bytes().to_vec())
    }

    pub fn string(&mut self, key: usize, name: &str, value: &str) -> ValueRef {
        self.add_value(key, name, REG_SZ, utf16z(value))
    }

    pub fn expand_string(&mut self, key: usize, name: &str, value: &str) -> ValueRef {
        self.add_value(key, name, REG_EXPAND_SZ, utf16z(value))
    }

    pub fn multi_string(&mut self, key: usize, name: &str, values: &[&str]) -> ValueRef {
        let mut data = Vec::new();
        for value in values {
            data.extend(utf16z(value));
        }
        data.extend_from_slice(&[0, 0]);
        self.add_value(key, name, REG_MULTI_SZ, data)
    }

    pub fn binary(&mut self, key: usize, name: &str, data: Vec<u8>) -> ValueRef {
        self.add_value(key, name, REG_BINARY, data)
    }

    pub fn build(&self) -> BuiltHive {
        let mut bins = Bins::new();

        let key_offsets: Vec<u32> = self
            .keys
            .iter()
            .map(|key| {
                let (name, _) = encode_name(&key.name, key.misflag_name);
                bins.alloc(&vec![0u8; 0x4C + name.len()])
            })
            .collect();

        let descriptor = [1u8, 0, 0x04, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut sk = Vec::new();
        sk.extend_from_slice(b"sk");
        sk.extend_from_slice(&0u16.to_le_bytes());
        sk.extend_from_slice(&[0u8; 8]);
        sk.extend_from_slice(&(self.keys.len() as u32).to_le_bytes());
        sk.extend_from_slice(&(descriptor.len() as u32).to_le_bytes());
        sk.extend_from_slice(&descriptor);
        let sk_offset = bins.alloc(&sk);
        bins.patch(sk_offset, 0x04, &sk_offset.to_le_bytes());
        bins.patch(sk_offset, 0x08, &sk_offset.to_le_bytes());

        let mut value_offsets = Vec::with_capacity(self.keys.len());
        for (id, key) in self.keys.iter().enumerate() {
            let class_offset = key
                .class_name
                .as_ref()
                .map(|class| bins.alloc(&utf16(class)))
                .unwrap_or(NO_CELL);

            let subkey_list = if key.children.is_empty() {
                NO_CELL
            } else {
                let entries: Vec<(u32, &str)> = key
                    .children
                    .iter()
                    .map(|&child| (key_offsets[child], self.keys[child].name.as_str()))
                    .collect();
                build_index(&mut bins, key.index, &entries)
            };

            let vk_offsets: Vec<u32> = key
                .values
                .iter()
                .map(|value| {
                    let (raw_length, data_offset) = store_value(&mut bins, value);
                    let (name, compressed) = if value.name.is_empty() {
                        (Vec::new(), false)
                    } else {
                        encode_name(&value.name, value.misflag_name)
                    };
                    let mut vk = vec![0u8; 0x14];
                    vk[0..2].copy_from_slice(b"vk");
                    vk[0x02..0x04].copy_from_slice(&(name.len() as u16).to_le_bytes());
                    vk[0x04..0x08].copy_from_slice(&raw_length.to_le_bytes());
                    vk[0x08..0x0C].copy_from_slice(&data_offset.to_le_bytes());
                    vk[0x0C..0x10].copy_from_slice(&value.value_type.to_le_bytes());
                    vk[0x10..0x12].copy_from_slice(&(compressed as u16).to_le_bytes());
                    vk.extend_from_slice(&name);
                    bins.alloc(&vk)
                })
                .collect();

            let value_list = if vk_offsets.is_empty() {
                NO_CELL
            } else {
                let list: Vec<u8> = vk_offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
                bins.alloc(&list)
            };

            let (name, compressed) = encode_name(&key.name, key.misflag_name);
            let mut flags = if compressed { KEY_COMP_NAME } else { 0 };
            if id == Self::ROOT {
                flags |= ROOT_FLAGS;
            }
            let parent = key.parent.map(|p| key_offsets[p]).unwrap_or(key_offsets[id]);
            let max_subkey_name = key
                .children
                .iter()
                .map(|&c| self.keys[c].name.len() * 2)
                .max()
                .unwrap_or(0);
            let max_value_data = key.values.iter().map(|v| v.data.len()).max().unwrap_or(0);

            let mut nk = vec![0u8; 0x4C];
            nk[0..2].copy_from_slice(b"nk");
            nk[0x02..0x04].copy_from_slice(&flags.to_le_bytes());
            nk[0x04..0x0C].copy_from_slice(&TIMESTAMP.to_le_bytes());
            nk[0x10..0x14].copy_from_slice(&parent.to_le_bytes());
            nk[0x14..0x18].copy_from_slice(&(key.children.len() as u32).to_le_bytes());
            nk[0x1C..0x20].copy_from_slice(&subkey_list.to_le_bytes());
            nk[0x20..0x24].copy_from_slice(&NO_CELL.to_le_bytes());
            nk[0x24..0x28].copy_from_slice(&(key.values.len() as u32).to_le_bytes());
            nk[0x28..0x2C].copy_from_slice(&value_list.to_le_bytes());
            nk[0x2C..0x30].copy_from_slice(&sk_offset.to_le_bytes());
            nk[0x30..0x34].copy_from_slice(&class_offset.to_le_bytes());
            nk[0x34..0x38].copy_from_slice(&(max_subkey_name as u32).to_le_bytes());
            nk[0x40..0x44].copy_from_slice(&(max_value_data as u32).to_le_bytes());
            nk[0x48..0x4A].copy_from_slice(&(name.len() as u16).to_le_bytes());
            let class_len = key.class_name.as_ref().map(|c| utf16(c).len()).unwrap_or(0);
            nk[0x4A..0x4C].copy_from_slice(&(class_len as u16).to_le_bytes());
            nk.extend_from_slice(&name);
            bins.patch(key_offsets[id], 0, &nk);

            value_offsets.push(vk_offsets);
        }

        bins.close_bin();
        let bytes = self.base_block(key_offsets[Self::ROOT], bins.data);

        BuiltHive {
            bytes,
            key_offsets,
            value_offsets,
        }
    }

    fn base_block(&self, root: u32, bins: Vec<u8>) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x1000];
        bytes[0..4].copy_from_slice(b"regf");
        put_u32(&mut bytes, 0x04, self.primary_sequence);
        put_u32(&mut bytes, 0x08, self.secondary_sequence);
        bytes[0x0C..0x14].copy_from_slice(&TIMESTAMP.to_le_bytes());
        put_u32(&mut bytes, 0x14, self.major_version);
        put_u32(&mut bytes, 0x18, self.minor_version);
        put_u32(&mut bytes, 0x1C, 0);
        put_u32(&mut bytes, 0x20, 1);
        put_u32(&mut bytes, 0x24, root);
        put_u32(&mut bytes, 0x28, bins.len() as u32);
        put_u32(&mut bytes, 0x2C, 1);

        let mut name = utf16(&self.hive_name);
        name.truncate(64);
        bytes[0x30..0x30 + name.len()].copy_from_slice(&name);

        let checksum = bytes[..0x1FC]
            .chunks_exact(4)
            .fold(0u32, |acc, word| acc ^ u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        put_u32(&mut bytes, 0x1FC, checksum);

        bytes.extend_from_slice(&bins);
        bytes
    }
}

impl KeyDef {
    fn new(name: &str, parent: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            values: Vec::new(),
            index: IndexKind::Lh,
            class_name: None,
            misflag_name: false,
        }
    }
}

/// Cell allocator over the bin area; offsets are relative to the first bin.
struct Bins {
    data: Vec<u8>,
    cursor: usize,
    bin_end: usize,
}

impl Bins {
    fn new() -> Self {
        let mut bins = Self {
            data: Vec::new(),
            cursor: 0,
            bin_end: 0,
        };
        bins.open_bin(0);
        bins
    }

    fn open_bin(&mut self, cell_size: usize) {
        self.close_bin();
        let start = self.data.len();
        let size = round_up(0x20 + cell_size, 0x1000);
        self.data.resize(start + size, 0);
        self.data[start..start + 4].copy_from_slice(b"hbin");
        put_u32(&mut self.data, start + 4, start as u32);
        put_u32(&mut self.data, start + 8, size as u32);
        if start == 0 {
            self.data[0x14..0x1C].copy_from_slice(&TIMESTAMP.to_le_bytes());
        }
        self.cursor = start + 0x20;
        self.bin_end = start + size;
    }

    /// Marks the rest of the current bin as one free cell.
    fn close_bin(&mut self) {
        let remaining = self.bin_end - self.cursor;
        if remaining > 0 {
            put_u32(&mut self.data, self.cursor, remaining as u32);
            self.cursor = self.bin_end;
        }
    }

    fn alloc(&mut self, payload: &[u8]) -> u32 {
        let size = round_up(payload.len() + 4, 8);
        if self.cursor + size > self.bin_end {
            self.open_bin(size);
        }
        let offset = self.cursor;
        put_u32(&mut self.data, offset, (-(size as i32)) as u32);
        self.data[offset + 4..offset + 4 + payload.len()].copy_from_slice(payload);
        self.cursor += size;
        offset as u32
    }

    fn patch(&mut self, cell: u32, field: usize, bytes: &[u8]) {
        let at = cell as usize + 4 + field;
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }
}

fn build_index(bins: &mut Bins, kind: IndexKind, entries: &[(u32, &str)]) -> u32 {
    match kind {
        IndexKind::Ri => {
            let leaves: Vec<u32> = entries
                .chunks(2)
                .map(|chunk| bins.alloc(&leaf(b"lh", chunk)))
                .collect();
            let mut ri = Vec::new();
            ri.extend_from_slice(b"ri");
            ri.extend_from_slice(&(leaves.len() as u16).to_le_bytes());
            for leaf in leaves {
                ri.extend_from_slice(&leaf.to_le_bytes());
            }
            bins.alloc(&ri)
        }
        IndexKind::Li => bins.alloc(&leaf(b"li", entries)),
        IndexKind::Lf => bins.alloc(&leaf(b"lf", entries)),
        IndexKind::Lh => bins.alloc(&leaf(b"lh", entries)),
    }
}

fn leaf(tag: &[u8; 2], entries: &[(u32, &str)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(tag);
    data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (offset, name) in entries {
        data.extend_from_slice(&offset.to_le_bytes());
        match tag {
            b"lf" => data.extend_from_slice(&lf_hint(name).to_le_bytes()),
            b"lh" => data.extend_from_slice(&lh_hash(name).to_le_bytes()),
            _ => {}
        }
    }
    data
}

fn lf_hint(name: &str) -> u32 {
    let mut hint = [0u8; 4];
    for (slot, byte) in hint.iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
    u32::from_le_bytes(hint)
}

fn lh_hash(name: &str) -> u32 {
    name.to_uppercase()
        .encode_utf16()
        .fold(0u32, |hash, unit| hash.wrapping_mul(37).wrapping_add(unit as u32))
}

/// Returns (raw length field, data offset field) after placing any cells.
fn store_value(bins: &mut Bins, value: &ValueDef) -> (u32, u32) {
    let len = value.data.len();
    let declared = value.declared_length.unwrap_or(len as u32);

    if len == 0 {
        return (declared, NO_CELL);
    }
    if len <= 4 && !value.single_cell {
        let mut inline = [0u8; 4];
        inline[..len].copy_from_slice(&value.data);
        return (declared | 0x8000_0000, u32::from_le_bytes(inline));
    }
    if len > CHUNK && !value.single_cell {
        let chunks: Vec<u32> = value.data.chunks(CHUNK).map(|chunk| bins.alloc(chunk)).collect();
        let list: Vec<u8> = chunks.iter().flat_map(|o| o.to_le_bytes()).collect();
        let list_offset = bins.alloc(&list);
        let mut db = Vec::new();
        db.extend_from_slice(b"db");
        db.extend_from_slice(&(chunks.len() as u16).to_le_bytes());
        db.extend_from_slice(&list_offset.to_le_bytes());
        return (declared, bins.alloc(&db));
    }
    (declared, bins.alloc(&value.data))
}

/// Single-byte when the name is plain ASCII, UTF-16LE otherwise.
fn encode_name(name: &str, misflag: bool) -> (Vec<u8>, bool) {
    if misflag {
        (utf16(name), true)
    } else if name.is_ascii() {
        (name.as_bytes().to_vec(), true)
    } else {
        (utf16(name), false)
    }
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

fn put_u32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

pub fn utf16z(s: &str) -> Vec<u8> {
    let mut data = utf16(s);
    data.extend_from_slice(&[0, 0]);
    data
}

/// Deterministic filler that never starts with a cell tag.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub const BLOB_LENGTH: usize = 3 * CHUNK + 17;
pub const SERVICE_COUNT: usize = 9;

/// Index of keys created by [`sample`].
pub struct Sample {
    pub builder: HiveBuilder,
    pub select: usize,
    pub services: usize,
    pub tcpip_parameters: usize,
    pub session_manager: usize,
    pub computer_name: usize,
}

/// A small SYSTEM-like hive exercising every storage and index form.
pub fn sample() -> Sample {
    let mut b = HiveBuilder::new("\\REGISTRY\\MACHINE\\SYSTEM");

    let select = b.key_path("Select");
    b.dword(select, "Current", 1);
    b.dword(select, "Default", 1);
    b.dword(select, "LastKnownGood", 1);

    let computer_name = b.key_path("ControlSet001\\Control\\ComputerName\\ComputerName");
    b.string(computer_name, "ComputerName", "WORKSTATION-01");
    b.string(computer_name, "", "mnmsrvc");

    let session_manager = b.key_path("ControlSet001\\Control\\Session Manager");
    b.multi_string(session_manager, "BootExecute", &["autocheck autochk *", "sfcscan"]);
    b.set_class_name(session_manager, "GenericClass");

    let services = b.key_path("ControlSet001\\Services");
    b.set_index(services, IndexKind::Ri);
    for i in 0..SERVICE_COUNT - 1 {
        let service = b.add_key(services, &format!("Svc{:02}", i));
        b.dword(service, "Start", 3);
        b.expand_string(service, "ImagePath", &format!("%SystemRoot%\\System32\\svc{:02}.sys", i));
        b.qword(service, "InstallTime", TIMESTAMP);
    }
    let tcpip = b.add_key(services, "Tcpip");
    let tcpip_parameters = b.add_key(tcpip, "Parameters");
    b.set_index(tcpip, IndexKind::Li);
    b.dword(tcpip_parameters, "DefaultTTL", 0x2A);
    b.binary(tcpip_parameters, "Blob", pattern(BLOB_LENGTH));
    b.add_value(tcpip_parameters, "Empty", REG_BINARY, Vec::new());

    let mounted = b.key_path("MountedDevices");
    b.set_index(HiveBuilder::ROOT, IndexKind::Lf);
    b.binary(mounted, "\\DosDevices\\C:", vec![0x4D, 0x42, 0x52, 0x20, 0x00, 0x7E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    Sample {
        builder: b,
        select,
        services,
        tcpip_parameters,
        session_manager,
        computer_name,
    }
}

pub fn sample_hive() -> Hive {
    sample().builder.build().open()
}
