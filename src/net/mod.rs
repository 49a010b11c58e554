//! Wire formats, translation between client revisions, and transport

pub mod framing;
pub mod packet;
pub mod subcmd;
pub mod translate;
pub mod transport;
