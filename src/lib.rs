//! # Windows Registry Hive Reader
//!
//! A read-only decoder and tree navigator for Windows NT registry hive files
//! (`regf`), working over a memory-mapped or in-memory buffer.
//!
//! ## Architecture
//!
//! The reader is built on several layers:
//!
//! 1. **Base Block (Header)**: hive metadata and the root key offset
//! 2. **Hive Bins (hbin)**: 4KB-aligned blocks containing cells
//! 3. **Cells**: signed-size slots dispatched on a 2-byte tag
//! 4. **Key Nodes (nk)**: registry keys with subkeys and values
//! 5. **Value Keys (vk)**: registry values with typed data
//! 6. **Subkey Lists (li/lf/lh/ri)** and **Big Data (db)** indirections
//!
//! ## Binary Layout
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Sequence numbers, version, root offset, bin-area length
//!
//! [Hive Bins - variable size, 4KB aligned]
//!   [Hbin Header - 32 bytes]
//!     - Signature: "hbin"
//!     - Offset, size
//!
//!   [Cells - variable size]
//!     [Cell Size - 4 bytes, negative if allocated]
//!     [Cell Data]
//! ```
//!
//! Every offset stored inside a cell is relative to the first hive bin at
//! absolute offset 0x1000.
//!
//! ## Examples
//!
//! ```no_run
//! use hive_reader::{Hive, ValueData};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open("SYSTEM")?;
//!
//! let root = hive.root_key()?;
//! println!("Root key: {}", root.name());
//! for subkey in root.subkeys()? {
//!     println!("  Subkey: {}", subkey.name());
//! }
//!
//! let select = hive.open_key("Select")?;
//! match select.value("Current")?.data()? {
//!     ValueData::Dword(current) => println!("ControlSet{:03}", current),
//!     other => println!("unexpected data: {}", other),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigdata;
pub mod cell;
pub mod diagnostics;
pub mod error;
pub mod hbin;
pub mod header;
pub mod hive;
pub mod key;
pub mod options;
pub mod security;
pub mod subkey_list;
pub mod utils;
pub mod value;

// Re-export main types for convenience
pub use bigdata::BigDataBlock;
pub use cell::{Cell, CellType, KeyNodeFlags, Record, ValueType};
pub use diagnostics::Diagnostics;
pub use error::{RegistryError, Result};
pub use hbin::{HbinBlock, HbinIterator};
pub use header::{BaseBlock, HiveType};
pub use hive::{Hive, RegistryKey, RegistryValue};
pub use key::KeyNode;
pub use options::HiveOptions;
pub use security::SecurityDescriptor;
pub use subkey_list::{SubkeyList, SubkeyListEntry, SubkeyListType};
pub use value::{DataStorage, ValueData, ValueKey, ValueList};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
