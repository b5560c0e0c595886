//! Container access, volume decoding and legacy binary encoding

pub mod container;
pub mod odim;
pub mod uf;

// Re-export main types
pub use container::{AttrValue, MemoryContainer, VolumeContainer};
pub use odim::decode_volume;
pub use uf::{encode_record, record_words, write_volume, UfConfig};

#[cfg(feature = "parallel")]
pub use odim::decode_volume_parallel;
#[cfg(feature = "parallel")]
pub use uf::write_volume_parallel;
