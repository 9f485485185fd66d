//! Wire codec and client for a player's database server: the TCP service
//! a CDJ exposes on a per-device port for browsing its attached media
//! and resolving track metadata.

use std::{convert::TryInto, io::Write};

use anyhow::anyhow;
use byteorder::{BigEndian, WriteBytesExt};
use nom::{
    branch::alt,
    bytes::streaming::{tag, take},
    number::streaming::{be_u16, be_u32, be_u8},
    IResult,
};

use crate::Result;

pub(crate) mod connection;
pub(crate) mod menu;
pub(crate) mod query;

pub(crate) use menu::MenuItemType;

#[derive(Debug)]
#[repr(u8)]
enum FieldType {
    U8 = 0x0f,
    U16 = 0x10,
    U32 = 0x11,
    Blob = 0x14,
    String = 0x26,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Field {
    U8(u8),
    U16(u16),
    U32(u32),
    Blob(Vec<u8>),
    String(String),
}

impl Field {
    pub(crate) fn encode(&self, mut w: impl Write) -> Result<()> {
        match self {
            Self::U8(val) => {
                w.write_u8(FieldType::U8 as u8)?;
                w.write_u8(*val)?;
            }
            Self::U16(val) => {
                w.write_u8(FieldType::U16 as u8)?;
                w.write_u16::<BigEndian>(*val)?;
            }
            Self::U32(val) => {
                w.write_u8(FieldType::U32 as u8)?;
                w.write_u32::<BigEndian>(*val)?;
            }
            Self::Blob(val) => {
                w.write_u8(FieldType::Blob as u8)?;
                w.write_u32::<BigEndian>(val.len() as u32)?;
                w.write_all(val)?;
            }
            Self::String(val) => {
                let utf: Vec<u16> = val.encode_utf16().collect();
                w.write_u8(FieldType::String as u8)?;
                w.write_u32::<BigEndian>(utf.len() as u32)?;
                for point in utf {
                    w.write_u16::<BigEndian>(point)?;
                }
            }
        }
        Ok(())
    }

    /// Composes the four-part `device:menu:slot:type` argument used to
    /// scope almost every request to a specific deck and media slot.
    pub(crate) fn dmst(d: u8, m: u8, s: u8, t: u8) -> Field {
        Field::U32(((d as u32) << 24) | ((m as u32) << 16) | ((s as u32) << 8) | (t as u32))
    }

    pub(crate) fn parse(i: &[u8]) -> IResult<&[u8], Field> {
        alt((
            Self::parse_u8,
            Self::parse_u16,
            Self::parse_u32,
            Self::parse_blob,
            Self::parse_string,
        ))(i)
    }

    fn parse_u8(i: &[u8]) -> IResult<&[u8], Field> {
        let (i, val) = Self::parse_u8_val(i)?;
        Ok((i, Field::U8(val)))
    }

    fn parse_u8_val(i: &[u8]) -> IResult<&[u8], u8> {
        let (i, _) = tag(&[FieldType::U8 as u8])(i)?;
        let (i, val) = be_u8(i)?;
        Ok((i, val))
    }

    fn parse_u16(i: &[u8]) -> IResult<&[u8], Field> {
        let (i, val) = Self::parse_u16_val(i)?;
        Ok((i, Field::U16(val)))
    }

    fn parse_u16_val(i: &[u8]) -> IResult<&[u8], u16> {
        let (i, _) = tag(&[FieldType::U16 as u8])(i)?;
        let (i, val) = be_u16(i)?;
        Ok((i, val))
    }

    fn parse_u32(i: &[u8]) -> IResult<&[u8], Field> {
        let (i, val) = Self::parse_u32_val(i)?;
        Ok((i, Field::U32(val)))
    }

    fn parse_u32_val(i: &[u8]) -> IResult<&[u8], u32> {
        let (i, _) = tag(&[FieldType::U32 as u8])(i)?;
        let (i, val) = be_u32(i)?;
        Ok((i, val))
    }

    fn parse_blob(i: &[u8]) -> IResult<&[u8], Field> {
        let (i, val) = Self::parse_blob_val(i)?;
        Ok((i, Field::Blob(val)))
    }

    fn parse_blob_val(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
        let (i, _) = tag(&[FieldType::Blob as u8])(i)?;
        let (i, len) = be_u32(i)?;
        let (i, data) = take(len as usize)(i)?;
        Ok((i, data.to_vec()))
    }

    fn parse_string(i: &[u8]) -> IResult<&[u8], Field> {
        let (i, val) = Self::parse_string_val(i)?;
        Ok((i, Field::String(val)))
    }

    fn parse_string_val(i: &[u8]) -> IResult<&[u8], String> {
        let (i, _) = tag(&[FieldType::String as u8])(i)?;
        let (i, num_points) = be_u32(i)?;
        let mut data = Vec::with_capacity(num_points as usize);
        let data_i = i;
        let mut i = i;
        for _ in 0..num_points {
            let (i1, val) = be_u16(i)?;
            data.push(val);
            i = i1;
        }

        match String::from_utf16(&data) {
            Ok(s) => Ok((i, s.trim_end_matches('\0').into())),
            Err(_) => Err(nom::Err::Error(nom::error::Error::new(
                data_i,
                nom::error::ErrorKind::Tag,
            ))),
        }
    }

    fn tag_u32(tag_val: u32) -> impl Fn(&[u8]) -> IResult<&[u8], ()> {
        move |i: &[u8]| -> IResult<&[u8], ()> {
            let (i, _) = tag(&[
                FieldType::U32 as u8,
                ((tag_val >> 24) & 0xff) as u8,
                ((tag_val >> 16) & 0xff) as u8,
                ((tag_val >> 8) & 0xff) as u8,
                (tag_val & 0xff) as u8,
            ])(i)?;
            Ok((i, ()))
        }
    }
}

/// A handshake packet: just a list of fields, no message framing.
#[derive(Debug)]
pub(crate) struct Packet {
    fields: Vec<Field>,
}

impl Packet {
    pub(crate) fn new() -> Packet {
        Packet { fields: Vec::new() }
    }

    pub(crate) fn with_field(mut self, field: Field) -> Packet {
        self.fields.push(field);
        self
    }

    pub(crate) fn to_bytes(self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        for field in self.fields {
            field.encode(&mut data)?
        }
        Ok(data)
    }
}

const MESSAGE_MAGIC: u32 = 0x872349ae;

/// A full request/response message: magic, transaction id, message type,
/// an argument-type vector, and up to twelve typed arguments.
#[derive(Debug)]
pub(crate) struct Message {
    pub tx_id: u32,
    pub ty: u16,
    pub num_args: u8,
    pub arg_tags: Vec<u8>,
    pub args: Vec<Field>,
}

impl Message {
    pub(crate) fn new(tx_id: u32, ty: u16, args: Vec<Field>) -> Result<Message> {
        if args.len() > 12 {
            return Err(anyhow!("too many args").into());
        }

        let mut arg_tags = Vec::new();
        for arg in &args {
            let tag = match arg {
                Field::U32(_) => 0x06,
                Field::Blob(_) => 0x03,
                Field::String(_) => 0x02,
                _ => return Err(anyhow!("no known tag for field {:?}", arg).into()),
            };

            arg_tags.push(tag);
        }

        Ok(Message {
            tx_id,
            ty,
            num_args: args.len() as u8,
            arg_tags,
            args,
        })
    }

    pub(crate) fn arg_u32(&self, idx: usize) -> Result<u32> {
        match self.args.get(idx) {
            Some(Field::U32(val)) => Ok(*val),
            Some(_) => Err(anyhow!("wrong arg type at index {}", idx).into()),
            None => Err(anyhow!("index out of range").into()),
        }
    }

    pub(crate) fn arg_string(&self, idx: usize) -> Result<&String> {
        match self.args.get(idx) {
            Some(Field::String(val)) => Ok(val),
            Some(_) => Err(anyhow!("wrong arg type at index {}", idx).into()),
            None => Err(anyhow!("index out of range").into()),
        }
    }

    pub(crate) fn arg_blob(&self, idx: usize) -> Result<&Vec<u8>> {
        match self.args.get(idx) {
            Some(Field::Blob(val)) => Ok(val),
            Some(_) => Err(anyhow!("wrong arg type at index {}", idx).into()),
            None => Err(anyhow!("index out of range").into()),
        }
    }

    pub(crate) fn encode(&self, mut w: impl Write) -> Result<()> {
        Field::U32(MESSAGE_MAGIC).encode(&mut w)?;
        Field::U32(self.tx_id).encode(&mut w)?;
        Field::U16(self.ty).encode(&mut w)?;
        Field::U8(self.num_args).encode(&mut w)?;
        Field::Blob(self.arg_tags.clone()).encode(&mut w)?;

        for arg in &self.args {
            arg.encode(&mut w)?;
        }

        Ok(())
    }

    pub(crate) fn parse(i: &[u8]) -> IResult<&[u8], Message> {
        let (i, _) = Field::tag_u32(MESSAGE_MAGIC)(i)?;
        let (i, tx_id) = Field::parse_u32_val(i)?;
        let (i, ty) = Field::parse_u16_val(i)?;
        let (i, num_args) = Field::parse_u8_val(i)?;
        let (i, tags) = Field::parse_blob_val(i)?;

        if num_args > 12 {
            return Err(nom::Err::Failure(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Verify,
            )));
        }

        let mut args = Vec::new();
        let mut i = i;
        for n in 0..num_args as usize {
            let slot_tag = tags.get(n).copied().unwrap_or(0);

            // A zero-length binary argument is wire-encoded as a bare
            // Number(0) rather than a Blob with a zero-length prefix: no
            // blob tag or length byte follows, and nothing further is
            // consumed for this argument.
            if slot_tag == 0x03 {
                if let Ok((i1, 0)) = Field::parse_u32_val(i) {
                    args.push(Field::Blob(Vec::new()));
                    i = i1;
                    continue;
                }
            }

            let (i1, field) = Field::parse(i)?;
            if !slot_tag_matches(slot_tag, &field) {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    i,
                    nom::error::ErrorKind::Verify,
                )));
            }
            args.push(field);
            i = i1;
        }

        Ok((
            i,
            Message {
                tx_id,
                ty,
                num_args,
                arg_tags: tags,
                args,
            },
        ))
    }
}

/// Whether a parsed argument's kind agrees with the slot tag that
/// announced it: 0x06 for a number, 0x03 for binary data, 0x02 for text.
fn slot_tag_matches(slot_tag: u8, field: &Field) -> bool {
    match slot_tag {
        0x06 => matches!(field, Field::U8(_) | Field::U16(_) | Field::U32(_)),
        0x03 => matches!(field, Field::Blob(_)),
        0x02 => matches!(field, Field::String(_)),
        _ => false,
    }
}

// Menu/slot/track-type constants used to compose `dmst` arguments.
pub(crate) const MENU_SLOT_USB: u8 = 0x02;
pub(crate) const MENU_SLOT_SD: u8 = 0x03;
pub(crate) const MENU_SLOT_RB_CD: u8 = 0x01;

pub(crate) const TRACK_TYPE_RB: u8 = 0x01;
pub(crate) const TRACK_TYPE_UNANALYZED: u8 = 0x05;

/// Message types exchanged once a connection is set up, named for what
/// they request or carry rather than their raw numeric value.
pub(crate) mod message_type {
    pub(crate) const SETUP: u16 = 0x0000;
    pub(crate) const MEDIA_REQUEST: u16 = 0x2002;
    pub(crate) const MEDIA_RESPONSE: u16 = 0x4000;
    pub(crate) const ARTWORK_REQUEST: u16 = 0x2003;
    pub(crate) const ARTWORK_RESPONSE: u16 = 0x4002;
    pub(crate) const RENDER_MENU_REQUEST: u16 = 0x3000;
    pub(crate) const MENU_HEADER: u16 = 0x4001;
    pub(crate) const MENU_ITEM: u16 = 0x4101;
    pub(crate) const MENU_FOOTER: u16 = 0x4201;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_round_trip() {
        let cases = vec![
            Field::U8(7),
            Field::U16(4096),
            Field::U32(0xdead_beef),
            Field::Blob(vec![1, 2, 3, 4]),
            Field::String("CDJ-3000".to_string()),
        ];

        for field in cases {
            let mut buf = Vec::new();
            field.encode(&mut buf).unwrap();
            let (rest, parsed) = Field::parse(&buf).unwrap();
            assert!(rest.is_empty());
            assert_eq!(parsed, field);
        }
    }

    #[test]
    fn message_round_trip() {
        let msg = Message::new(
            42,
            message_type::MEDIA_REQUEST,
            vec![Field::dmst(1, 0x1, MENU_SLOT_USB, TRACK_TYPE_RB), Field::U32(17)],
        )
        .unwrap();

        let mut buf = Vec::new();
        msg.encode(&mut buf).unwrap();

        let (rest, parsed) = Message::parse(&buf).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.tx_id, 42);
        assert_eq!(parsed.ty, message_type::MEDIA_REQUEST);
        assert_eq!(parsed.arg_u32(1).unwrap(), 17);
    }

    #[test]
    fn too_many_args_is_rejected() {
        let args = std::iter::repeat(Field::U32(0)).take(13).collect();
        assert!(Message::new(1, 0, args).is_err());
    }
}
