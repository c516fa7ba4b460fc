//! Parsing of textual state-variable requests into a read plan.
//!
//! Requests are substring-matched (`"stress_mises mean"`, `"history
//! shell 1 2 max"`). Classification order matters: `stress_mises` must
//! be tested before `stress` and `plastic_strain` before `strain`.

use log::{debug, warn};

use super::control::Control;
use super::error::{D3plotError, Result};
use super::utils::extract_integers;

/// How the per-layer samples of a shell variable are folded into one
/// value per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Max,
    Min,
    /// Outermost integration layer.
    Outer,
    /// Layer `maxint / 2`.
    Mid,
    /// Innermost integration layer.
    Inner,
    Mean,
}

impl Reduction {
    /// Extract the reduction keyword from a request string; `mean` is
    /// the default.
    pub fn from_request(request: &str) -> Self {
        if request.contains("max") {
            Self::Max
        } else if request.contains("min") {
            Self::Min
        } else if request.contains("outer") {
            Self::Outer
        } else if request.contains("mid") {
            Self::Mid
        } else if request.contains("inner") {
            Self::Inner
        } else {
            Self::Mean
        }
    }

    /// Fold the sample of one layer into the running accumulator.
    ///
    /// Layer 0 always initializes the accumulator; the mean divides on
    /// the last layer, so the accumulator holds the finished value once
    /// every layer has been folded in.
    pub fn accumulate(self, acc: &mut f32, value: f32, layer: usize, n_layers: usize) {
        if layer == 0 {
            *acc = value;
            return;
        }
        match self {
            Self::Max => {
                if value > *acc {
                    *acc = value;
                }
            }
            Self::Min => {
                if value < *acc {
                    *acc = value;
                }
            }
            Self::Outer => {
                if layer == n_layers - 1 {
                    *acc = value;
                }
            }
            Self::Mid => {
                if layer == n_layers / 2 {
                    *acc = value;
                }
            }
            Self::Inner => {}
            Self::Mean => {
                *acc += value;
                if layer == n_layers - 1 {
                    *acc /= n_layers as f32;
                }
            }
        }
    }

    /// Component-wise fold for a 6-component tensor sample.
    pub fn accumulate6(self, acc: &mut [f32; 6], value: &[f32; 6], layer: usize, n_layers: usize) {
        match self {
            Self::Max | Self::Min | Self::Mean => {
                for (a, v) in acc.iter_mut().zip(value.iter()) {
                    self.accumulate(a, *v, layer, n_layers);
                }
            }
            // Whole-tensor replacement modes.
            Self::Outer | Self::Mid | Self::Inner => {
                if layer == 0
                    || (self == Self::Outer && layer == n_layers - 1)
                    || (self == Self::Mid && layer == n_layers / 2)
                {
                    *acc = *value;
                }
            }
        }
    }

    /// Fold the two shell strain samples (inner surface, outer surface)
    /// into one value.
    pub fn reduce_samples(self, inner: f32, outer: f32) -> f32 {
        match self {
            Self::Max => inner.max(outer),
            Self::Min => inner.min(outer),
            Self::Outer => outer,
            Self::Inner => inner,
            Self::Mid | Self::Mean => 0.5 * (inner + outer),
        }
    }
}

/// The decoded read plan: which variables the state decoder loads, and
/// with which layer reduction.
#[derive(Debug, Default)]
pub struct ReadPlan {
    pub disp: Option<Reduction>,
    pub vel: Option<Reduction>,
    pub accel: Option<Reduction>,
    pub stress: Option<Reduction>,
    pub stress_mises: Option<Reduction>,
    pub plastic_strain: Option<Reduction>,
    pub strain: Option<Reduction>,
    pub energy: Option<Reduction>,
    /// One-based history indices plus reduction, for shells.
    pub history_shell: Vec<(usize, Reduction)>,
    /// One-based history indices plus reduction, for solids.
    pub history_solid: Vec<(usize, Reduction)>,
}

impl ReadPlan {
    /// Whether the plan loads nothing at all.
    pub fn is_empty(&self) -> bool {
        self.disp.is_none()
            && self.vel.is_none()
            && self.accel.is_none()
            && !self.wants_element_data()
    }

    /// Whether any element block must be decoded.
    pub fn wants_element_data(&self) -> bool {
        self.stress.is_some()
            || self.stress_mises.is_some()
            || self.plastic_strain.is_some()
            || self.strain.is_some()
            || self.energy.is_some()
            || !self.history_shell.is_empty()
            || !self.history_solid.is_empty()
    }
}

/// Which variables have already been materialized into the store.
///
/// Used to make `read_states` idempotent: a request for an
/// already-loaded variable is dropped from the plan, and `clear`
/// resets the flags so the variable can be read again.
#[derive(Debug, Default)]
pub struct LoadedVars {
    pub disp: bool,
    pub vel: bool,
    pub accel: bool,
    pub stress: bool,
    pub stress_mises: bool,
    pub plastic_strain: bool,
    pub strain: bool,
    pub energy: bool,
    pub history_shell: Vec<usize>,
    pub history_solid: Vec<usize>,
}

impl LoadedVars {
    /// Mark everything a finished plan has loaded.
    pub fn absorb(&mut self, plan: &ReadPlan) {
        self.disp |= plan.disp.is_some();
        self.vel |= plan.vel.is_some();
        self.accel |= plan.accel.is_some();
        self.stress |= plan.stress.is_some();
        self.stress_mises |= plan.stress_mises.is_some();
        self.plastic_strain |= plan.plastic_strain.is_some();
        self.strain |= plan.strain.is_some();
        self.energy |= plan.energy.is_some();
        self.history_shell
            .extend(plan.history_shell.iter().map(|(index, _)| *index));
        self.history_solid
            .extend(plan.history_solid.iter().map(|(index, _)| *index));
    }
}

/// Translate a list of request strings into a [`ReadPlan`].
///
/// Hard errors: requesting a vector the file does not carry (`disp`
/// with `iu=0`, `strain` with `istrn=0`, ...), an unknown keyword, or a
/// malformed history request. Missing shell stress / plastic strain
/// flags only warn; the read loop skips them.
pub fn parse_requests<S: AsRef<str>>(
    requests: &[S],
    control: &Control,
    loaded: &LoadedVars,
) -> Result<ReadPlan> {
    let mut plan = ReadPlan::default();

    for request in requests {
        let request = request.as_ref();
        let mode = Reduction::from_request(request);

        if request.contains("disp") {
            if !control.iu {
                return Err(D3plotError::VariableUnavailable("displacements".to_string()));
            }
            if loaded.disp {
                debug!("disp already loaded");
            } else {
                plan.disp = Some(mode);
            }
        } else if request.contains("vel") {
            if !control.iv {
                return Err(D3plotError::VariableUnavailable("velocities".to_string()));
            }
            if loaded.vel {
                debug!("vel already loaded");
            } else {
                plan.vel = Some(mode);
            }
        } else if request.contains("accel") {
            if !control.ia {
                return Err(D3plotError::VariableUnavailable("accelerations".to_string()));
            }
            if loaded.accel {
                debug!("accel already loaded");
            } else {
                plan.accel = Some(mode);
            }
        } else if request.contains("stress_mises") {
            if !control.ioshl1 {
                warn!("there are no shell stresses in the file");
            }
            if loaded.stress_mises {
                debug!("stress_mises already loaded");
            } else {
                plan.stress_mises = Some(mode);
            }
        } else if request.contains("stress") {
            if !control.ioshl1 {
                warn!("there are no shell stresses in the file");
            }
            if loaded.stress {
                debug!("stress already loaded");
            } else {
                plan.stress = Some(mode);
            }
        } else if request.contains("plastic_strain") {
            if !control.ioshl2 {
                warn!("there are no shell plastic strains in the file");
            }
            if loaded.plastic_strain {
                debug!("plastic_strain already loaded");
            } else {
                plan.plastic_strain = Some(mode);
            }
        } else if request.contains("strain") {
            if !control.istrn {
                return Err(D3plotError::VariableUnavailable("strains".to_string()));
            }
            if loaded.strain {
                debug!("strain already loaded");
            } else {
                plan.strain = Some(mode);
            }
        } else if request.contains("energy") {
            if !control.ioshl4 {
                return Err(D3plotError::VariableUnavailable("energies".to_string()));
            }
            if loaded.energy {
                debug!("energy already loaded");
            } else {
                plan.energy = Some(mode);
            }
        } else if request.contains("history") {
            parse_history_request(request, mode, control, loaded, &mut plan)?;
        } else {
            return Err(D3plotError::UnknownVariable(request.to_string()));
        }
    }

    Ok(plan)
}

fn parse_history_request(
    request: &str,
    mode: Reduction,
    control: &Control,
    loaded: &LoadedVars,
    plan: &mut ReadPlan,
) -> Result<()> {
    let indices = extract_integers(request);
    if indices.is_empty() {
        return Err(D3plotError::UnknownVariable(
            "no history variable index specified, input at least one number".to_string(),
        ));
    }

    let (family, family_limit, already_loaded, target) = if request.contains("shell") {
        (
            "shells",
            control.neips,
            &loaded.history_shell,
            &mut plan.history_shell,
        )
    } else if request.contains("solid") {
        (
            "solids",
            control.neiph,
            &loaded.history_solid,
            &mut plan.history_solid,
        )
    } else {
        return Err(D3plotError::UnknownVariable(
            "specify the element type for history variables as either shell or solid".to_string(),
        ));
    };

    for index in indices {
        if index < 1 {
            return Err(D3plotError::UnknownVariable(
                "history variable index must be at least 1".to_string(),
            ));
        }
        let index = index as usize;

        if already_loaded.contains(&index) {
            debug!("history variable {} already loaded for {}", index, family);
            continue;
        }
        if target.iter().any(|(existing, _)| *existing == index) {
            warn!(
                "trying to read history variable {} twice for {}, using only first occurrence",
                index, family
            );
            continue;
        }
        if index > family_limit {
            warn!(
                "history variable {} exceeds the limit for {} of {}",
                index, family, family_limit
            );
        }
        target.push((index, mode));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d3plot::control::DeletionTable;

    fn control() -> Control {
        Control {
            title: String::new(),
            ndim: 3,
            mattyp: false,
            numnp: 8,
            nglbv: 6,
            iu: true,
            iv: false,
            ia: false,
            it: false,
            nel2: 0,
            nel4: 4,
            nel8: 1,
            nelth: 0,
            nel48: 0,
            nel20: 0,
            nummat2: 0,
            nummat4: 1,
            nummat8: 1,
            nummatth: 0,
            nmmat: 2,
            nv1d: 0,
            nv2d: 21,
            nv3d: 7,
            nv3dt: 0,
            neiph: 2,
            neips: 3,
            maxint: 3,
            mdlopt: DeletionTable::None,
            narbs: 1,
            idtdt: 0,
            extra: 0,
            istrn: false,
            ioshl1: true,
            ioshl2: true,
            ioshl3: false,
            ioshl4: false,
            own_nel10: false,
            numrbe: 0,
            irbtyp: Vec::new(),
        }
    }

    #[test]
    fn classification_order_disambiguates_substrings() {
        let plan =
            parse_requests(&["stress_mises max"], &control(), &LoadedVars::default()).unwrap();
        assert_eq!(plan.stress_mises, Some(Reduction::Max));
        assert!(plan.stress.is_none());

        let plan =
            parse_requests(&["plastic_strain"], &control(), &LoadedVars::default()).unwrap();
        assert_eq!(plan.plastic_strain, Some(Reduction::Mean));
        assert!(plan.strain.is_none());
    }

    #[test]
    fn reduction_keyword_defaults_to_mean() {
        assert_eq!(Reduction::from_request("stress"), Reduction::Mean);
        assert_eq!(Reduction::from_request("stress outer"), Reduction::Outer);
        assert_eq!(Reduction::from_request("inner stress"), Reduction::Inner);
        assert_eq!(Reduction::from_request("stress mid"), Reduction::Mid);
        assert_eq!(Reduction::from_request("stress min"), Reduction::Min);
    }

    #[test]
    fn missing_vectors_are_hard_errors() {
        let c = control();
        assert!(matches!(
            parse_requests(&["vel"], &c, &LoadedVars::default()),
            Err(D3plotError::VariableUnavailable(_))
        ));
        assert!(matches!(
            parse_requests(&["strain"], &c, &LoadedVars::default()),
            Err(D3plotError::VariableUnavailable(_))
        ));
        assert!(matches!(
            parse_requests(&["energy"], &c, &LoadedVars::default()),
            Err(D3plotError::VariableUnavailable(_))
        ));
        assert!(matches!(
            parse_requests(&["torsion"], &c, &LoadedVars::default()),
            Err(D3plotError::UnknownVariable(_))
        ));
    }

    #[test]
    fn history_requests_carry_indices_and_family() {
        let plan = parse_requests(
            &["history shell 1 2 max", "history solid 1"],
            &control(),
            &LoadedVars::default(),
        )
        .unwrap();
        assert_eq!(
            plan.history_shell,
            vec![(1, Reduction::Max), (2, Reduction::Max)]
        );
        assert_eq!(plan.history_solid, vec![(1, Reduction::Mean)]);
    }

    #[test]
    fn history_requests_validate_indices() {
        let c = control();
        assert!(matches!(
            parse_requests(&["history shell"], &c, &LoadedVars::default()),
            Err(D3plotError::UnknownVariable(_))
        ));
        assert!(matches!(
            parse_requests(&["history 1 2"], &c, &LoadedVars::default()),
            Err(D3plotError::UnknownVariable(_))
        ));
        assert!(matches!(
            parse_requests(&["history shell 0"], &c, &LoadedVars::default()),
            Err(D3plotError::UnknownVariable(_))
        ));

        // Duplicates collapse to the first occurrence.
        let plan = parse_requests(
            &["history shell 1", "history shell 1 2"],
            &c,
            &LoadedVars::default(),
        )
        .unwrap();
        assert_eq!(
            plan.history_shell,
            vec![(1, Reduction::Mean), (2, Reduction::Mean)]
        );

        // Out-of-range indices are kept (skipped at read time).
        let plan =
            parse_requests(&["history shell 9"], &c, &LoadedVars::default()).unwrap();
        assert_eq!(plan.history_shell, vec![(9, Reduction::Mean)]);
    }

    #[test]
    fn loaded_variables_are_dropped_from_the_plan() {
        let mut loaded = LoadedVars::default();
        loaded.disp = true;
        loaded.history_shell.push(1);

        let plan = parse_requests(&["disp", "history shell 1"], &control(), &loaded).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn mean_reduction_accumulates_across_layers() {
        let mode = Reduction::Mean;
        let mut acc = 0.0;
        for (layer, value) in [3.0f32, 6.0, 9.0].into_iter().enumerate() {
            mode.accumulate(&mut acc, value, layer, 3);
        }
        assert!((acc - 6.0).abs() < 1e-6);

        // A single layer is its own mean.
        let mut acc = 0.0;
        mode.accumulate(&mut acc, 4.5, 0, 1);
        assert!((acc - 4.5).abs() < 1e-6);
    }

    #[test]
    fn positional_reductions_pick_the_right_layer() {
        let layers = [1.0f32, 2.0, 3.0];
        for (mode, expected) in [
            (Reduction::Inner, 1.0),
            (Reduction::Mid, 2.0),
            (Reduction::Outer, 3.0),
            (Reduction::Max, 3.0),
            (Reduction::Min, 1.0),
        ] {
            let mut acc = 0.0;
            for (layer, value) in layers.into_iter().enumerate() {
                mode.accumulate(&mut acc, value, layer, layers.len());
            }
            assert_eq!(acc, expected, "mode {:?}", mode);
        }
    }

    #[test]
    fn strain_sample_reduction_follows_mode() {
        assert_eq!(Reduction::Inner.reduce_samples(1.0, 5.0), 1.0);
        assert_eq!(Reduction::Outer.reduce_samples(1.0, 5.0), 5.0);
        assert_eq!(Reduction::Max.reduce_samples(1.0, 5.0), 5.0);
        assert_eq!(Reduction::Min.reduce_samples(1.0, 5.0), 1.0);
        assert_eq!(Reduction::Mean.reduce_samples(1.0, 5.0), 3.0);
        assert_eq!(Reduction::Mid.reduce_samples(1.0, 5.0), 3.0);
    }
}
