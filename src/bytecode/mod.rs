mod auxdata;
mod compare;

pub use auxdata::{locate_metadata_reference, strip_auxdata, MetadataPointer, NoReferenceFound};
pub use compare::{compare, ByteRange, MatchTier};
