use core::mem::size_of;

use bytemuck::Pod;

use crate::{RECORD_SENTINEL, StreamError, StreamHeader, Tag, VERSION};

///Single record borrowed from a stream.
#[derive(Clone, Copy, Debug)]
pub struct Record<'a> {
    pub tag: Tag,
    payload: &'a [u8],
    tail: &'a [u8],
}

impl<'a> Record<'a> {
    ///Reads the fixed payload. Fails if `T` is not the payload of this record's tag.
    pub fn payload<T: Pod>(&self) -> Result<T, StreamError> {
        if self.payload.len() != size_of::<T>() {
            return Err(StreamError::PayloadSize {
                tag: self.tag,
                expected: size_of::<T>(),
                found: self.payload.len(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(self.payload))
    }

    pub fn tail(&self) -> TailReader<'a> {
        TailReader {
            tag: self.tag,
            bytes: self.tail,
            head: 0,
        }
    }
}

///Cursor over the variable-length tail of a record.
pub struct TailReader<'a> {
    tag: Tag,
    bytes: &'a [u8],
    head: usize,
}

impl<'a> TailReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], StreamError> {
        let end = self
            .head
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(StreamError::UnexpectedEof {
                at: self.head,
                needed: len.saturating_sub(self.bytes.len() - self.head),
            })?;
        let slice = &self.bytes[self.head..end];
        self.head = end;
        Ok(slice)
    }

    ///Reads `count` consecutive `T`s.
    pub fn items<T: Pod>(&mut self, count: usize) -> Result<Vec<T>, StreamError> {
        let bytes = self.take(count.saturating_mul(size_of::<T>()))?;
        Ok(bytes
            .chunks_exact(size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    pub fn string(&mut self, len: usize) -> Result<&'a str, StreamError> {
        let bytes = self.take(len)?;
        Ok(core::str::from_utf8(bytes)?)
    }

    ///Checks that the whole tail was read.
    pub fn finish(self) -> Result<(), StreamError> {
        let remaining = self.bytes.len() - self.head;
        if remaining != 0 {
            Err(StreamError::TailNotConsumed {
                tag: self.tag,
                remaining,
            })
        } else {
            Ok(())
        }
    }
}

///Reads records from a byte stream. Validates the header on creation and the record framing on every
/// [next_record](Self::next_record) call.
pub struct StreamReader<'a> {
    bytes: &'a [u8],
    head: usize,
    ended: bool,
}

impl<'a> StreamReader<'a> {
    pub fn new(bytes: &'a [u8], magic: [u8; 4]) -> Result<Self, StreamError> {
        let mut reader = StreamReader {
            bytes,
            head: 0,
            ended: false,
        };
        let header: StreamHeader = bytemuck::pod_read_unaligned(reader.take(size_of::<StreamHeader>())?);
        if header.magic != magic {
            return Err(StreamError::BadMagic {
                expected: magic,
                found: header.magic,
            });
        }
        if header.version != VERSION {
            return Err(StreamError::UnsupportedVersion(header.version));
        }

        Ok(reader)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], StreamError> {
        if self.bytes.len() - self.head < len {
            return Err(StreamError::UnexpectedEof {
                at: self.head,
                needed: len - (self.bytes.len() - self.head),
            });
        }
        let slice = &self.bytes[self.head..self.head + len];
        self.head += len;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, StreamError> {
        Ok(bytemuck::pod_read_unaligned(self.take(4)?))
    }

    ///Reads the next record. Reading past [Tag::End] fails.
    pub fn next_record(&mut self) -> Result<Record<'a>, StreamError> {
        if self.ended {
            return Err(StreamError::UnexpectedTag { found: Tag::End });
        }

        let tag = Tag::try_from(self.take_u32()?)?;
        let payload_len = self.take_u32()? as usize;
        if payload_len != tag.payload_size() {
            return Err(StreamError::PayloadSize {
                tag,
                expected: tag.payload_size(),
                found: payload_len,
            });
        }
        let payload = self.take(payload_len)?;
        let tail_len = self.take_u32()? as usize;
        let tail = self.take(tail_len)?;
        //skip padding
        self.take(padding(tail_len))?;

        let sentinel = self.take_u32()?;
        if sentinel != RECORD_SENTINEL {
            return Err(StreamError::MissingSentinel {
                tag,
                found: sentinel,
            });
        }

        if tag == Tag::End {
            self.ended = true;
            if self.head != self.bytes.len() {
                return Err(StreamError::TrailingBytes(self.bytes.len() - self.head));
            }
        }

        Ok(Record { tag, payload, tail })
    }

    ///True once the end record was read.
    pub fn is_finished(&self) -> bool {
        self.ended
    }
}

///Bytes needed to pad `len` to the next multiple of four.
pub(crate) const fn padding(len: usize) -> usize {
    (4 - (len % 4)) % 4
}
