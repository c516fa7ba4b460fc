//! Decoding of the fixed 64/128-word control block at the head of a
//! d3plot stream.
//!
//! Every offset in the geometry and state sections downstream is a pure
//! function of the scalars decoded here, so the bit-packed header fields
//! (the `maxint` sign/bias, the `1000 => 1` shell flags, the `istrn`
//! derivation) are unpacked once into explicit typed fields.

use log::debug;

use super::buffer::WordBuffer;
use super::error::{D3plotError, Result};

/// How per-entity deletion data is encoded in each state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionTable {
    /// No deletion block.
    None,
    /// One word per node.
    Nodes,
    /// One word per element (beams + shells + solids + thick shells).
    Elements,
}

/// The decoded control block.
///
/// Counts are stored unpacked: `maxint` is always positive here, the
/// shell presence words are plain booleans, and `ndim` is normalized
/// to 3.
#[derive(Debug, Clone)]
pub struct Control {
    pub title: String,
    pub ndim: usize,
    /// Whether the material-index section (and rigid-shell table) follows
    /// the header.
    pub mattyp: bool,

    pub numnp: usize,
    pub nglbv: usize,

    /// Presence flags for the per-node state vectors.
    pub iu: bool,
    pub iv: bool,
    pub ia: bool,
    pub it: bool,

    pub nel2: usize,
    pub nel4: usize,
    pub nel8: usize,
    pub nelth: usize,
    pub nel48: usize,
    pub nel20: usize,

    pub nummat2: usize,
    pub nummat4: usize,
    pub nummat8: usize,
    pub nummatth: usize,
    pub nmmat: usize,

    pub nv1d: usize,
    pub nv2d: usize,
    pub nv3d: usize,
    pub nv3dt: usize,

    /// Extra history words per solid / per shell layer.
    pub neiph: usize,
    pub neips: usize,

    /// Number of shell through-thickness integration layers.
    pub maxint: usize,
    pub mdlopt: DeletionTable,

    pub narbs: usize,
    pub idtdt: i32,
    pub extra: i32,

    /// Shell strain tensors present in the state records.
    pub istrn: bool,

    /// Shell stress / plastic strain / forces / extra presence.
    pub ioshl1: bool,
    pub ioshl2: bool,
    pub ioshl3: bool,
    pub ioshl4: bool,

    /// Ten-node solids: two extra connectivity words per solid element
    /// (encoded as a negative `nel8` in the raw header).
    pub own_nel10: bool,

    /// Rigid-shell count; filled from the material section when
    /// `mattyp` is set, zero otherwise.
    pub numrbe: usize,
    /// Material-index indirection table (`mattyp` only); value 20 marks
    /// a rigid material.
    pub irbtyp: Vec<i32>,
}

impl Control {
    /// Decode the control block from words 0..63 (and 64..127 when the
    /// `extra` word announces the long header).
    pub fn from_buffer(buffer: &dyn WordBuffer) -> Result<Self> {
        let mut filetype = buffer.read_i32(11)?;
        let mut own_external_numbers_i8 = false;
        if filetype > 1000 {
            filetype -= 1000;
            own_external_numbers_i8 = true;
        }
        if filetype != 1 && filetype != 5 {
            return Err(D3plotError::UnsupportedFeature(format!(
                "wrong filetype {} != 1 (or 5) in header; the file might be \
                 in double precision or its endian is not the machine endian",
                buffer.read_i32(11)?
            )));
        }

        let title = buffer.read_str(0, 10)?;

        let raw_ndim = buffer.read_i32(15)?;
        let (ndim, mattyp) = match raw_ndim {
            5 | 7 => (3, true),
            4 => (3, false),
            n if n > 5 => {
                return Err(D3plotError::UnsupportedFeature(
                    "state data contains a rigid road surface".to_string(),
                ))
            }
            n => {
                return Err(D3plotError::InvalidFormat(format!(
                    "invalid header parameter ndim={}",
                    n
                )))
            }
        };

        let numnp = buffer.read_i32(16)? as usize;
        let nglbv = buffer.read_i32(18)? as usize;

        let it = buffer.read_i32(19)? != 0;
        let iu = buffer.read_i32(20)? != 0;
        let iv = buffer.read_i32(21)? != 0;
        let ia = buffer.read_i32(22)? != 0;

        let mut nel8 = buffer.read_i32(23)?;
        let nel2 = buffer.read_i32(28)? as usize;
        let nel4 = buffer.read_i32(31)? as usize;
        let nelth = buffer.read_i32(40)? as usize;
        let nel48 = buffer.read_i32(55)? as usize;
        let mut own_nel10 = false;
        if nel8 < 0 {
            nel8 = nel8.abs();
            own_nel10 = true;
        }

        let nmmat = buffer.read_i32(51)? as usize;
        let nummat2 = buffer.read_i32(29)? as usize;
        let nummat4 = buffer.read_i32(32)? as usize;
        let nummat8 = buffer.read_i32(24)? as usize;
        let nummatth = buffer.read_i32(41)? as usize;

        let nv1d = buffer.read_i32(30)? as usize;
        let nv2d = buffer.read_i32(33)? as usize;
        let nv3d = buffer.read_i32(27)? as usize;
        let nv3dt = buffer.read_i32(42)? as usize;

        let neiph = buffer.read_i32(34)? as usize;
        let neips = buffer.read_i32(35)? as usize;

        // maxint packs the deletion-table flavour into its sign and a
        // +10000 bias.
        let raw_maxint = buffer.read_i32(36)?;
        let mut mdlopt = DeletionTable::None;
        let mut maxint = raw_maxint;
        if maxint < 0 {
            mdlopt = DeletionTable::Nodes;
            maxint = maxint.abs();
        }
        if maxint > 10000 {
            mdlopt = DeletionTable::Elements;
            maxint -= 10000;
        }
        let maxint = maxint as usize;

        let narbs = buffer.read_i32(39)? as usize;

        let ioshl1 = buffer.read_i32(43)? == 1000;
        let ioshl2 = buffer.read_i32(44)? == 1000;
        let ioshl3 = buffer.read_i32(45)? == 1000;
        let ioshl4 = buffer.read_i32(46)? == 1000;

        let idtdt = buffer.read_i32(56)?;
        let extra = buffer.read_i32(57)?;

        let nmsph = buffer.read_i32(37)?;
        let ngpsph = buffer.read_i32(38)?;
        let ialemat = buffer.read_i32(47)?;

        let nel20 = if extra > 0 {
            buffer.read_i32(64)? as usize
        } else {
            0
        };

        // istrn lives in idtdt for newer files; older ones leave it to be
        // derived from the shell record length.
        let istrn = if idtdt > 100 {
            idtdt % 10000 == 1
        } else {
            let io1 = ioshl1 as i64;
            let io2 = ioshl2 as i64;
            let io3 = ioshl3 as i64;
            let io4 = ioshl4 as i64;
            nv2d as i64 - maxint as i64 * (6 * io1 + io2 + neips as i64) + 8 * io3 + 4 * io4 > 1
        };

        if nmsph != 0 || ngpsph != 0 {
            return Err(D3plotError::UnsupportedFeature(
                "SPH materials and elements can not be handled".to_string(),
            ));
        }
        if ialemat != 0 {
            return Err(D3plotError::UnsupportedFeature(
                "ALE can not be handled".to_string(),
            ));
        }
        if nelth > 0 {
            return Err(D3plotError::UnsupportedFeature(
                "thick shell elements can not be handled".to_string(),
            ));
        }
        if it {
            return Err(D3plotError::UnsupportedFeature(
                "temperatures can not be handled".to_string(),
            ));
        }
        if own_external_numbers_i8 {
            return Err(D3plotError::UnsupportedFeature(
                "external ids with double length can not be handled".to_string(),
            ));
        }

        let control = Self {
            title,
            ndim,
            mattyp,
            numnp,
            nglbv,
            iu,
            iv,
            ia,
            it,
            nel2,
            nel4,
            nel8: nel8 as usize,
            nelth,
            nel48,
            nel20,
            nummat2,
            nummat4,
            nummat8,
            nummatth,
            nmmat,
            nv1d,
            nv2d,
            nv3d,
            nv3dt,
            neiph,
            neips,
            maxint,
            mdlopt,
            narbs,
            idtdt,
            extra,
            istrn,
            ioshl1,
            ioshl2,
            ioshl3,
            ioshl4,
            own_nel10,
            numrbe: 0,
            irbtyp: Vec::new(),
        };
        debug!(
            "control block: {} nodes, {}/{}/{} beams/shells/solids, maxint {}",
            control.numnp, control.nel2, control.nel4, control.nel8, control.maxint
        );
        Ok(control)
    }

    /// The header length in words; geometry decoding starts here.
    pub fn header_words(&self) -> usize {
        if self.extra > 0 {
            128
        } else {
            64
        }
    }

    /// Words per shell integration layer.
    pub fn shell_layer_size(&self) -> usize {
        6 * self.ioshl1 as usize + self.ioshl2 as usize + self.neips
    }

    /// Total count of input (non-ghost) materials.
    pub fn n_input_materials(&self) -> usize {
        self.nummat2 + self.nummat4 + self.nummat8 + self.nummatth
    }

    /// Node-vector words per state record.
    pub fn n_state_node_vars(&self) -> usize {
        (self.iu as usize + self.iv as usize + self.ia as usize) * self.numnp * self.ndim
    }

    /// Element words per state record; rigid shells are absent from the
    /// state stream.
    pub fn n_state_elem_vars(&self) -> usize {
        self.nel2 * self.nv1d + (self.nel4 - self.numrbe) * self.nv2d + self.nel8 * self.nv3d
    }

    /// Deletion-table words per state record.
    pub fn n_deletion_vars(&self) -> usize {
        match self.mdlopt {
            DeletionTable::None => 0,
            DeletionTable::Nodes => self.numnp,
            DeletionTable::Elements => self.nel2 + self.nel4 + self.nel8 + self.nelth,
        }
    }

    /// Full state record length in words (time word included).
    pub fn state_record_len(&self) -> usize {
        1 + self.nglbv + self.n_state_node_vars() + self.n_state_elem_vars()
            + self.n_deletion_vars()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};

    /// In-memory word buffer over a fixed byte vector.
    struct MemBuffer(Vec<u8>);

    impl WordBuffer for MemBuffer {
        fn read_i32(&self, word: usize) -> Result<i32> {
            Ok(LittleEndian::read_i32(&self.0[word * 4..word * 4 + 4]))
        }
        fn read_f32(&self, word: usize) -> Result<f32> {
            Ok(LittleEndian::read_f32(&self.0[word * 4..word * 4 + 4]))
        }
        fn read_f32_range(&self, word: usize, out: &mut [f32]) -> Result<()> {
            LittleEndian::read_f32_into(&self.0[word * 4..(word + out.len()) * 4], out);
            Ok(())
        }
        fn read_str(&self, word: usize, n_words: usize) -> Result<String> {
            let bytes = &self.0[word * 4..(word + n_words) * 4];
            Ok(String::from_utf8_lossy(bytes).trim_end().to_string())
        }
        fn load_geometry(&mut self) -> Result<()> {
            Ok(())
        }
        fn free_geometry(&mut self) {}
        fn load_parts(&mut self) -> Result<()> {
            Ok(())
        }
        fn free_parts(&mut self) {}
        fn init_first_state_segment(&mut self) -> Result<()> {
            Ok(())
        }
        fn has_next_state_segment(&self) -> bool {
            false
        }
        fn read_next_state_segment(&mut self) -> Result<()> {
            Ok(())
        }
        fn rewind_state_segments(&mut self) -> Result<()> {
            Ok(())
        }
        fn end_states(&mut self) {}
    }

    fn header(set: impl Fn(&mut dyn FnMut(usize, i32))) -> MemBuffer {
        let mut bytes = vec![0u8; 64 * 4];
        bytes[..8].copy_from_slice(b"test mod");
        // Minimal valid defaults.
        let mut put = |word: usize, value: i32| {
            LittleEndian::write_i32(&mut bytes[word * 4..word * 4 + 4], value);
        };
        put(11, 1); // filetype
        put(15, 4); // ndim, packed
        set(&mut put);
        MemBuffer(bytes)
    }

    #[test]
    fn decodes_packed_maxint_and_mdlopt() {
        let buf = header(|put| put(36, -10003));
        let control = Control::from_buffer(&buf).unwrap();
        assert_eq!(control.maxint, 3);
        assert_eq!(control.mdlopt, DeletionTable::Elements);

        let buf = header(|put| put(36, -3));
        let control = Control::from_buffer(&buf).unwrap();
        assert_eq!(control.maxint, 3);
        assert_eq!(control.mdlopt, DeletionTable::Nodes);

        let buf = header(|put| put(36, 3));
        let control = Control::from_buffer(&buf).unwrap();
        assert_eq!(control.maxint, 3);
        assert_eq!(control.mdlopt, DeletionTable::None);
    }

    #[test]
    fn shell_presence_words_map_1000_to_true() {
        let buf = header(|put| {
            put(43, 1000);
            put(44, 999);
            put(45, 0);
            put(46, 1000);
        });
        let control = Control::from_buffer(&buf).unwrap();
        assert!(control.ioshl1);
        assert!(!control.ioshl2);
        assert!(!control.ioshl3);
        assert!(control.ioshl4);
    }

    #[test]
    fn istrn_derives_from_shell_record_length() {
        // nv2d = maxint * (6*ioshl1 + ioshl2) + 12 strain words.
        let buf = header(|put| {
            put(36, 3);
            put(33, 33);
            put(43, 1000);
            put(44, 1000);
        });
        assert!(Control::from_buffer(&buf).unwrap().istrn);

        // Bare layered record, no strain.
        let buf = header(|put| {
            put(36, 3);
            put(33, 21);
            put(43, 1000);
            put(44, 1000);
        });
        assert!(!Control::from_buffer(&buf).unwrap().istrn);
    }

    #[test]
    fn istrn_comes_from_idtdt_when_large() {
        let buf = header(|put| put(56, 10001));
        assert!(Control::from_buffer(&buf).unwrap().istrn);
        let buf = header(|put| put(56, 10000));
        assert!(!Control::from_buffer(&buf).unwrap().istrn);
    }

    #[test]
    fn rejects_unsupported_features() {
        let buf = header(|put| put(11, 2));
        assert!(matches!(
            Control::from_buffer(&buf),
            Err(D3plotError::UnsupportedFeature(_))
        ));

        let buf = header(|put| put(11, 1001));
        assert!(matches!(
            Control::from_buffer(&buf),
            Err(D3plotError::UnsupportedFeature(_))
        ));

        let buf = header(|put| put(15, 6));
        assert!(matches!(
            Control::from_buffer(&buf),
            Err(D3plotError::UnsupportedFeature(_))
        ));

        let buf = header(|put| put(15, 3));
        assert!(matches!(
            Control::from_buffer(&buf),
            Err(D3plotError::InvalidFormat(_))
        ));

        let buf = header(|put| put(37, 2));
        assert!(matches!(
            Control::from_buffer(&buf),
            Err(D3plotError::UnsupportedFeature(_))
        ));

        let buf = header(|put| put(19, 1));
        assert!(matches!(
            Control::from_buffer(&buf),
            Err(D3plotError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn negative_nel8_flags_ten_node_solids() {
        let buf = header(|put| put(23, -12));
        let control = Control::from_buffer(&buf).unwrap();
        assert_eq!(control.nel8, 12);
        assert!(control.own_nel10);
    }

    #[test]
    fn mattyp_follows_ndim_packing() {
        for (raw, mattyp) in [(4, false), (5, true), (7, true)] {
            let buf = header(|put| put(15, raw));
            let control = Control::from_buffer(&buf).unwrap();
            assert_eq!(control.ndim, 3);
            assert_eq!(control.mattyp, mattyp);
        }
    }
}
