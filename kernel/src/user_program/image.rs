//! The flat paged program-image format.
//!
//! An image is a small header followed by `page_count` page-sized payloads,
//! one per virtual page of the program's address space. The loader stages
//! every payload into the backing store before the program runs; nothing is
//! mapped eagerly.

use core::error::Error;
use core::fmt::{Debug, Display, Formatter};
use nom::bytes::complete::{tag, take};
use nom::number::complete::{le_u16, le_u32};
use nom::IResult;
use osmos_shared::mem::PAGE_FRAME_SIZE;
use zerocopy::little_endian::{U16, U32};
use zerocopy::AsBytes;

/// Magic bytes at the start of every program image.
pub const IMAGE_MAGIC: &[u8; 4] = b"OSMI";
pub const IMAGE_VERSION: u16 = 1;

// Image header, as stored on disk. All fields little-endian.
#[repr(C)]
#[derive(AsBytes)]
struct RawImageHeader {
    magic: [u8; 4],
    version: U16,
    page_count: U16,
    entry_vpn: U32,
}

/// Error type for image parsing
pub enum ImageError {
    /// The input does not start with [`IMAGE_MAGIC`]
    BadMagic,
    /// The header declares a version this kernel does not understand
    UnsupportedVersion(u16),
    /// The input ends before the declared page payloads do
    Truncated,
}

impl Debug for ImageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            ImageError::BadMagic => write!(f, "BadMagic"),
            ImageError::UnsupportedVersion(v) => write!(f, "UnsupportedVersion({})", v),
            ImageError::Truncated => write!(f, "Truncated"),
        }
    }
}

impl Display for ImageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl Error for ImageError {}

/// A parsed program image.
pub struct Image {
    /// Virtual page the program starts executing at.
    pub entry_vpn: u32,
    /// Initial contents of each virtual page, in vpn order.
    pub pages: Vec<Vec<u8>>,
}

fn header(input: &[u8]) -> IResult<&[u8], (u16, u16, u32)> {
    let (input, _) = tag(&IMAGE_MAGIC[..])(input)?;
    let (input, version) = le_u16(input)?;
    let (input, page_count) = le_u16(input)?;
    let (input, entry_vpn) = le_u32(input)?;
    Ok((input, (version, page_count, entry_vpn)))
}

fn page(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take(PAGE_FRAME_SIZE)(input)
}

pub fn parse_image(input: &[u8]) -> Result<Image, ImageError> {
    if input.len() < IMAGE_MAGIC.len() || &input[..IMAGE_MAGIC.len()] != IMAGE_MAGIC {
        return Err(ImageError::BadMagic);
    }
    let (mut rest, (version, page_count, entry_vpn)) =
        header(input).map_err(|_| ImageError::Truncated)?;
    if version != IMAGE_VERSION {
        return Err(ImageError::UnsupportedVersion(version));
    }

    let mut pages = Vec::with_capacity(page_count as usize);
    for _ in 0..page_count {
        let (next, payload) = page(rest).map_err(|_| ImageError::Truncated)?;
        pages.push(payload.to_vec());
        rest = next;
    }

    Ok(Image { entry_vpn, pages })
}

/// Serialize an image. Every page must be exactly one frame of bytes.
pub fn build_image(entry_vpn: u32, pages: &[&[u8]]) -> Vec<u8> {
    assert!(pages.len() <= u16::MAX as usize, "too many pages for one image");
    let header = RawImageHeader {
        magic: *IMAGE_MAGIC,
        version: U16::new(IMAGE_VERSION),
        page_count: U16::new(pages.len() as u16),
        entry_vpn: U32::new(entry_vpn),
    };

    let mut out = Vec::with_capacity(header.as_bytes().len() + pages.len() * PAGE_FRAME_SIZE);
    out.extend_from_slice(header.as_bytes());
    for page in pages {
        assert_eq!(
            page.len(),
            PAGE_FRAME_SIZE,
            "image pages must be exactly one frame"
        );
        out.extend_from_slice(page);
    }
    out
}
