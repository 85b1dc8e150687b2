pub mod extent_writer;
pub mod hash_stream;
pub mod verify_sig;

#[allow(clippy::all)]
pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/protos/mod.rs"));
    pub use update_metadata::*;
}
