//! Metadata ingestion: decompression, synthesis/hdlist/files.xml parsing,
//! and the differential import algorithm that turns a freshly fetched blob
//! into a minimal set of catalog writes (spec §4.1).

pub mod decompress;
pub mod diff_import;
pub mod files_xml;
pub mod hdlist;
pub mod synthesis;

pub use decompress::{decode_any, Codec};
pub use diff_import::{import_files, import_hdlist, import_synthesis, ImportOutcome};
