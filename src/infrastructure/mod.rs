pub mod agent;
pub mod certificate;
pub mod in_memory;
pub mod json_file;
pub mod mtls;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
