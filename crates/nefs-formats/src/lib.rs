//! Reader, writer and tooling for NeFS game archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::cast_precision_loss)] // Progress fractions
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! This crate reads and writes NeFS archives in every known header version
//! (0.1.0, 1.3.0, 1.5.0, 1.5.1, 1.6.0 and 2.0.0), in either byte order, and
//! locates headless headers embedded in game executables.
//!
//! # Components
//!
//! - **ToC codec**: endian-aware fixed-size records ([`toc`])
//! - **Header**: intro, ToC blocks, per-version layouts and the generic table
//!   engine; plain, XOR and RSA + AES header decoding ([`header`])
//! - **Transforms**: chunked deflate, LZSS and AES-256 item data ([`transform`])
//! - **Items**: the editable item list ([`item`])
//! - **Reader / writer**: archives in standard, headless and NefsInject form
//!   ([`reader`], [`writer`], [`archive`])
//! - **Scanner**: headers embedded in PE/ELF/Mach-O executables ([`scanner`])
//! - **Volumes**: split volume files as one stream ([`volume`])
//!
//! # Examples
//!
//! ```no_run
//! use nefs_formats::{NefsArchive, NefsProgress};
//!
//! let archive = NefsArchive::open("game.nefs")?;
//! for item in archive.items().iter() {
//!     println!("{} ({} bytes)", archive.items().path(item.id)?, item.extracted_size);
//! }
//!
//! let saved = archive.save("copy.nefs", &NefsProgress::none())?;
//! assert_eq!(saved.items().len(), archive.items().len());
//! # Ok::<(), nefs_formats::NefsError>(())
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod config;
pub mod error;
pub mod fs;
pub mod header;
pub mod item;
pub mod progress;
pub mod reader;
pub mod scanner;
pub mod toc;
pub mod transform;
pub mod volume;
pub mod writer;

pub use archive::{NefsArchive, NefsArchiveSource};
pub use config::NefsConfig;
pub use error::{NefsError, NefsResult};
pub use fs::{FileSystem, StdFileSystem, VolumeFile};
pub use header::{NefsHeader, NefsVersion};
pub use item::{NefsDataSource, NefsItem, NefsItemList, NefsItemState, NefsItemType};
pub use progress::{CancellationToken, NefsProgress, ProgressSink};
pub use reader::NefsReader;
pub use scanner::discover_headers;
pub use transform::{NefsDataChunk, NefsDataTransform};
pub use writer::{HeadlessOutput, NefsWriter};
