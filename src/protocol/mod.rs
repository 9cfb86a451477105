//! In-band tagging protocol for remote shell streams.
//!
//! Outbound commands are wrapped so the remote shell prefixes every output
//! line with a class marker; inbound bytes are reassembled into lines and
//! classified by that marker.
//!
//! - `tag`: markers, [`encode`](tag::encode) and [`decode`](tag::decode).
//! - `codec`: [`TaggedLineCodec`](codec::TaggedLineCodec) line reassembly
//!   for [`FramedRead`](tokio_util::codec::FramedRead).

pub mod codec;
pub mod tag;

pub use tag::{decode, encode, LineTag, Probe, Tag, TaggedLine};
