//! Decoding of the geometry section: material table, node coordinates,
//! element connectivities, the numbering block and the part names.
//!
//! The stages run in file order and each advances the word cursor by
//! exactly the number of words it consumed. Order matters, do not swap
//! stages.

use log::debug;

use super::buffer::WordBuffer;
use super::control::Control;
use super::error::{D3plotError, Result};

/// External-id arrays from the numbering block, in entity-index order.
#[derive(Debug, Default)]
pub struct Numbering {
    pub node_ids: Vec<i32>,
    pub solid_ids: Vec<i32>,
    pub beam_ids: Vec<i32>,
    pub shell_ids: Vec<i32>,
}

/// Whether the word at `word` holds the end-of-section marker -999999.0.
pub fn is_file_end(buffer: &dyn WordBuffer, word: usize) -> Result<bool> {
    Ok(buffer.read_f32(word)? + 999_999.0 == 0.0)
}

/// Assert the end-of-section marker at `word`.
pub fn expect_section_end(buffer: &dyn WordBuffer, word: usize, section: &str) -> Result<()> {
    if !is_file_end(buffer, word)? {
        return Err(D3plotError::InvalidFormat(format!(
            "anticipated file ending wrong in {} section",
            section
        )));
    }
    Ok(())
}

/// Read the material-index section that follows the header when the
/// connectivity material columns are indirect (`mattyp`).
///
/// Fills `numrbe` (rigid-shell count) and the `irbtyp` table on the
/// control record. Does nothing when `mattyp` is unset.
pub fn read_material_section(
    buffer: &dyn WordBuffer,
    control: &mut Control,
    word_position: &mut usize,
) -> Result<()> {
    if !control.mattyp {
        control.numrbe = 0;
        return Ok(());
    }

    control.numrbe = buffer.read_i32(*word_position)?.max(0) as usize;
    let nummat = buffer.read_i32(*word_position + 1)? as usize;
    if nummat != control.nmmat {
        return Err(D3plotError::CountMismatch {
            what: "materials in material section",
            expected: control.nmmat as i64,
            found: nummat as i64,
        });
    }

    control.irbtyp.reserve(nummat);
    for position in *word_position + 2..*word_position + 2 + nummat {
        control.irbtyp.push(buffer.read_i32(position)?);
    }

    *word_position += 2 + nummat;
    Ok(())
}

/// Read the node coordinate block: `numnp` groups of `ndim` floats.
pub fn read_nodes(
    buffer: &dyn WordBuffer,
    control: &Control,
    word_position: &mut usize,
) -> Result<Vec<[f32; 3]>> {
    let mut nodes = vec![[0.0f32; 3]; control.numnp];
    let mut position = *word_position;
    for coords in nodes.iter_mut() {
        buffer.read_f32_range(position, coords)?;
        position += control.ndim;
    }
    *word_position += control.numnp * control.ndim;
    Ok(nodes)
}

/// Read the 8-node solid connectivity: 8 node indices + 1 material word.
pub fn read_solids(
    buffer: &dyn WordBuffer,
    control: &Control,
    word_position: &mut usize,
) -> Result<Vec<[i32; 9]>> {
    if control.nel8 == 0 {
        return Ok(Vec::new());
    }

    let mut elements = vec![[0i32; 9]; control.nel8];
    let mut position = *word_position;
    for element in elements.iter_mut() {
        for value in element.iter_mut() {
            *value = buffer.read_i32(position)?;
            position += 1;
        }
    }

    *word_position += 9 * control.nel8;
    // Ten-node solids carry two extra connectivity words per element.
    if control.own_nel10 {
        *word_position += 2 * control.nel8;
    }
    Ok(elements)
}

/// Read the 2-node beam connectivity. Each entry is 6 words in the file;
/// only the two node indices and the material word are meaningful.
pub fn read_beams(
    buffer: &dyn WordBuffer,
    control: &Control,
    word_position: &mut usize,
) -> Result<Vec<[i32; 3]>> {
    if control.nel2 == 0 {
        return Ok(Vec::new());
    }

    let mut elements = vec![[0i32; 3]; control.nel2];
    let mut position = *word_position;
    for element in elements.iter_mut() {
        element[0] = buffer.read_i32(position)?;
        element[1] = buffer.read_i32(position + 1)?;
        element[2] = buffer.read_i32(position + 5)?;
        position += 6;
    }

    *word_position += 6 * control.nel2;
    Ok(elements)
}

/// Read the 4-node shell connectivity: 4 node indices + 1 material word.
pub fn read_shells(
    buffer: &dyn WordBuffer,
    control: &Control,
    word_position: &mut usize,
) -> Result<Vec<[i32; 5]>> {
    if control.nel4 == 0 {
        return Ok(Vec::new());
    }

    let mut elements = vec![[0i32; 5]; control.nel4];
    let mut position = *word_position;
    for element in elements.iter_mut() {
        for value in element.iter_mut() {
            *value = buffer.read_i32(position)?;
            position += 1;
        }
    }

    *word_position += 5 * control.nel4;
    Ok(elements)
}

/// Read the numbering block: external ids for nodes and every element
/// family, plus the part-id arrays.
pub fn read_numbering(
    buffer: &dyn WordBuffer,
    control: &Control,
    word_position: &mut usize,
) -> Result<Numbering> {
    if control.narbs == 0 {
        return Ok(Numbering::default());
    }

    let head = *word_position;
    let nsort = buffer.read_i32(head)?;
    let nsrh = buffer.read_i32(head + 1)?;
    if nsrh != control.numnp as i32 + nsort.abs() {
        return Err(D3plotError::InvalidFormat(
            "nsrh != nsort + numnp is inconsistent in the numbering block".to_string(),
        ));
    }
    let nsrb = buffer.read_i32(head + 2)?;
    if nsrb != nsrh + control.nel8 as i32 {
        return Err(D3plotError::InvalidFormat(
            "nsrb != nsrh + nel8 is inconsistent in the numbering block".to_string(),
        ));
    }
    let nsrs = buffer.read_i32(head + 3)?;
    if nsrs != nsrb + control.nel2 as i32 {
        return Err(D3plotError::InvalidFormat(
            "nsrs != nsrb + nel2 is inconsistent in the numbering block".to_string(),
        ));
    }
    let nsrt = buffer.read_i32(head + 4)?;
    if nsrt != nsrs + control.nel4 as i32 {
        return Err(D3plotError::InvalidFormat(
            "nsrt != nsrs + nel4 is inconsistent in the numbering block".to_string(),
        ));
    }
    let node_count = buffer.read_i32(head + 5)?;
    if node_count != control.numnp as i32 {
        return Err(D3plotError::CountMismatch {
            what: "nodes in the numbering block",
            expected: control.numnp as i64,
            found: node_count as i64,
        });
    }

    // The long header variant carries the part-id pointers as well.
    *word_position += if nsort < 0 { 16 } else { 10 };

    let mut read_ids = |count: usize, position: &mut usize| -> Result<Vec<i32>> {
        let mut ids = Vec::with_capacity(count);
        for word in *position..*position + count {
            ids.push(buffer.read_i32(word)?);
        }
        *position += count;
        Ok(ids)
    };

    let node_ids = read_ids(control.numnp, word_position)?;
    let solid_ids = read_ids(control.nel8, word_position)?;
    let beam_ids = read_ids(control.nel2, word_position)?;
    let shell_ids = read_ids(control.nel4, word_position)?;
    *word_position += control.nelth;

    // Three arrays of nmmat words follow (material types, external and
    // internal part ids); the trailing entries beyond the input
    // materials are ghost materials appended by the solver. The part
    // names come from their own section, so the arrays are skipped.
    *word_position += 3 * control.nmmat;

    // Connectivity extensions for higher-order elements.
    if control.own_nel10 {
        *word_position += 2 * control.nel8;
    }
    if control.nel48 > 0 {
        *word_position += 5 * control.nel48;
    }
    if control.extra > 0 && control.nel20 > 0 {
        *word_position += 13 * control.nel20;
    }

    debug!(
        "numbering block: {} node ids, {}/{}/{} element ids",
        node_ids.len(),
        beam_ids.len(),
        shell_ids.len(),
        solid_ids.len()
    );
    Ok(Numbering {
        node_ids,
        solid_ids,
        beam_ids,
        shell_ids,
    })
}

/// Read the part-name section: `ntype` marker, part count, then 19-word
/// records of one id word and 18 name words each.
///
/// Returns the `(id, name)` pairs and the part count; the count is
/// revalidated at every compressed state segment later.
pub fn read_parts(
    buffer: &dyn WordBuffer,
    word_position: &mut usize,
) -> Result<(Vec<(i32, String)>, usize)> {
    let ntype = buffer.read_i32(*word_position)?;
    if ntype != 90001 {
        return Err(D3plotError::InvalidFormat(format!(
            "ntype must be 90001 in part section, found {}",
            ntype
        )));
    }

    let numprop = buffer.read_i32(*word_position + 1)?;
    if numprop < 0 {
        return Err(D3plotError::InvalidFormat(
            "negative number of parts in part section".to_string(),
        ));
    }
    let numprop = numprop as usize;

    let mut parts = Vec::with_capacity(numprop);
    for index in 0..numprop {
        let start = *word_position + 1 + index * 19 + 1;
        let id = buffer.read_i32(start)?;
        let name = buffer.read_str(start + 1, 18)?.trim().to_string();
        parts.push((id, name));
    }

    *word_position += 1 + (numprop + 1) * 19 + 1;
    expect_section_end(buffer, *word_position, "part")?;
    *word_position += 1;

    debug!("part section: {} part(s)", numprop);
    Ok((parts, numprop))
}
