use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{LacunaError, Result};

/// A solved patch: where its pixels come from, where they land, and how
/// confident the solver was.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Patch {
    pub src_left: i32,
    pub src_top: i32,
    pub dest_left: i32,
    pub dest_top: i32,
    pub priority: f32,
}

/// Stream layout: a little-endian u32 count, then count records of four
/// little-endian i32 coordinates and one f32 priority. Writing then reading
/// the stream reproduces the patch list bit for bit.
pub fn write_patches<W: Write + ?Sized>(writer: &mut W, patches: &[Patch]) -> Result<()> {
    writer.write_u32::<LittleEndian>(patches.len() as u32)?;
    for patch in patches {
        writer.write_i32::<LittleEndian>(patch.src_left)?;
        writer.write_i32::<LittleEndian>(patch.src_top)?;
        writer.write_i32::<LittleEndian>(patch.dest_left)?;
        writer.write_i32::<LittleEndian>(patch.dest_top)?;
        writer.write_f32::<LittleEndian>(patch.priority)?;
    }
    Ok(())
}

pub fn read_patches<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<Patch>> {
    let truncated = |_| LacunaError::InvalidPatchesStream("stream is truncated".into());

    let count = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let mut patches = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        patches.push(Patch {
            src_left: reader.read_i32::<LittleEndian>().map_err(truncated)?,
            src_top: reader.read_i32::<LittleEndian>().map_err(truncated)?,
            dest_left: reader.read_i32::<LittleEndian>().map_err(truncated)?,
            dest_top: reader.read_i32::<LittleEndian>().map_err(truncated)?,
            priority: reader.read_f32::<LittleEndian>().map_err(truncated)?,
        });
    }
    Ok(patches)
}
