//! # RMG op-stream
//!
//! The tagged binary record stream used at both ends of the bake compiler. The declaration front-end writes an
//! *input* stream (magic `RMGI`), the compiler reads it and writes an *output* stream (magic `RMGO`) that is handed
//! to an execution backend.
//!
//! Every stream starts with a [StreamHeader] and is a sequence of records:
//!
//! ```text
//! tag: u32 | payload_len: u32 | payload | tail_len: u32 | tail (padded to 4 bytes) | RECORD_SENTINEL: u32
//! ```
//!
//! The payload is one fixed-size [Pod](bytemuck::Pod) struct per [Tag], the tail carries variable-length data like
//! names or index arrays, sized by count fields in the payload. The stream ends with a [Tag::End] record.
//!
//! Both sides check the schema: payload sizes must match the tag, the sentinel must follow every record and tails
//! must be consumed completely.

mod error;
pub use error::StreamError;

mod tags;
pub use tags::Tag;

pub mod payload;

mod reader;
pub use reader::{Record, StreamReader, TailReader};

mod writer;
pub use writer::{StreamWriter, TailWriter};

use bytemuck::{Pod, Zeroable};

///Magic of streams produced by the declaration front-end.
pub const INPUT_MAGIC: [u8; 4] = *b"RMGI";
///Magic of streams produced by the compiler for backends.
pub const OUTPUT_MAGIC: [u8; 4] = *b"RMGO";
///Current version of the format. Readers reject everything else.
pub const VERSION: u32 = 1;

///Terminates every single record.
pub const RECORD_SENTINEL: u32 = 0xE0D0_5E17;

///Bytes every record occupies besides its payload and tail: tag, payload length, tail length and sentinel.
pub const RECORD_OVERHEAD: usize = 16;

///Marks an absent id in any `u32` id field.
pub const NONE: u32 = u32::MAX;

///Leading header of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct StreamHeader {
    pub magic: [u8; 4],
    pub version: u32,
}

///Converts an optional id into its wire form.
#[inline]
pub fn opt_id(id: Option<u32>) -> u32 {
    id.unwrap_or(NONE)
}

///Converts a wire id into an optional id.
#[inline]
pub fn id_opt(raw: u32) -> Option<u32> {
    if raw == NONE { None } else { Some(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{BriefPayload, InteractionPayload, PassPayload};

    fn brief() -> BriefPayload {
        BriefPayload {
            buffer_count: 2,
            image_count: 1,
            pass_count: 1,
            present_image: NONE,
            ..Zeroable::zeroed()
        }
    }

    #[test]
    fn write_then_read_records() {
        let mut writer = StreamWriter::new(INPUT_MAGIC);
        writer.push(Tag::SetBrief, &brief(), TailWriter::new());

        let read = InteractionPayload {
            resource: 1,
            output: NONE,
            binding: 0,
            ..Zeroable::zeroed()
        };
        let pass = PassPayload {
            id: 0,
            read_count: 1,
            name_len: 5,
            program: NONE,
            bindless: NONE,
            ..Zeroable::zeroed()
        };
        let mut tail = TailWriter::new();
        tail.items(&[read]);
        tail.string("gbuf!");
        writer.push(Tag::RegisterPass, &pass, tail);
        let bytes = writer.finish();

        let mut reader = StreamReader::new(&bytes, INPUT_MAGIC).unwrap();
        let first = reader.next_record().unwrap();
        assert_eq!(first.tag, Tag::SetBrief);
        assert_eq!(first.payload::<BriefPayload>().unwrap().buffer_count, 2);

        let second = reader.next_record().unwrap();
        assert_eq!(second.tag, Tag::RegisterPass);
        let payload: PassPayload = second.payload().unwrap();
        let mut tail = second.tail();
        let reads: Vec<InteractionPayload> = tail.items(payload.read_count as usize).unwrap();
        assert_eq!(reads[0].resource, 1);
        assert_eq!(tail.string(payload.name_len as usize).unwrap(), "gbuf!");
        tail.finish().unwrap();

        assert_eq!(reader.next_record().unwrap().tag, Tag::End);
        assert!(reader.is_finished());
    }

    #[test]
    fn rejects_foreign_magic() {
        let bytes = StreamWriter::new(OUTPUT_MAGIC).finish();
        assert!(matches!(
            StreamReader::new(&bytes, INPUT_MAGIC),
            Err(StreamError::BadMagic { .. })
        ));
    }

    #[test]
    fn rejects_other_version() {
        let mut bytes = StreamWriter::new(INPUT_MAGIC).finish();
        bytes[4..8].copy_from_slice(&(VERSION + 1).to_le_bytes());
        let err = StreamReader::new(&bytes, INPUT_MAGIC).err().unwrap();
        assert!(matches!(err, StreamError::UnsupportedVersion(_)));
        assert_eq!(
            err.to_string(),
            format!("Unsupported stream version {}, expected {}", VERSION + 1, VERSION)
        );
    }

    #[test]
    fn empty_record_is_pure_overhead() {
        let bytes = StreamWriter::new(INPUT_MAGIC).finish();
        assert_eq!(bytes.len(), core::mem::size_of::<StreamHeader>() + RECORD_OVERHEAD);
    }

    #[test]
    fn detects_broken_sentinel() {
        let mut writer = StreamWriter::new(INPUT_MAGIC);
        writer.push(Tag::SetBrief, &brief(), TailWriter::new());
        let mut bytes = writer.finish();
        //header(8) + tag(4) + len(4) + payload + tail_len(4) -> sentinel
        let sentinel_at = 8 + 4 + 4 + core::mem::size_of::<BriefPayload>() + 4;
        bytes[sentinel_at] ^= 0xff;

        let mut reader = StreamReader::new(&bytes, INPUT_MAGIC).unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(StreamError::MissingSentinel { .. })
        ));
    }

    #[test]
    fn detects_unknown_tag_and_truncation() {
        let mut writer = StreamWriter::new(INPUT_MAGIC);
        writer.push(Tag::SetBrief, &brief(), TailWriter::new());
        let bytes = writer.finish();

        let mut unknown = bytes.clone();
        unknown[8..12].copy_from_slice(&0x7777u32.to_le_bytes());
        let mut reader = StreamReader::new(&unknown, INPUT_MAGIC).unwrap();
        assert!(matches!(reader.next_record(), Err(StreamError::UnknownTag(0x7777))));

        let truncated = &bytes[..20];
        let mut reader = StreamReader::new(truncated, INPUT_MAGIC).unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(StreamError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn unread_tail_is_an_error() {
        let mut writer = StreamWriter::new(INPUT_MAGIC);
        let mut tail = TailWriter::new();
        tail.string("left over");
        writer.push(Tag::SetBrief, &brief(), tail);
        let bytes = writer.finish();

        let mut reader = StreamReader::new(&bytes, INPUT_MAGIC).unwrap();
        let record = reader.next_record().unwrap();
        assert!(matches!(
            record.tail().finish(),
            Err(StreamError::TailNotConsumed { .. })
        ));
    }

    #[test]
    fn assure_send_sync() {
        static_assertions::assert_impl_all!(StreamError: Send, Sync);
    }
}
