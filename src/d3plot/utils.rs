//! Small numeric helpers shared by the decoders.

use regex::Regex;

/// Von-Mises stress of a symmetric tensor in d3plot component order
/// (xx, yy, zz, xy, yz, xz).
pub fn mises_stress(s: &[f32; 6]) -> f32 {
    let (sxx, syy, szz, sxy, syz, sxz) = (s[0], s[1], s[2], s[3], s[4], s[5]);
    (0.5 * ((sxx - syy).powi(2) + (syy - szz).powi(2) + (szz - sxx).powi(2))
        + 3.0 * (sxy * sxy + syz * syz + sxz * sxz))
        .sqrt()
}

/// Extract every (possibly signed) integer embedded in a request string.
///
/// Used for the index list in `history shell 1 2 3` style requests.
pub fn extract_integers(text: &str) -> Vec<i64> {
    // The pattern is a literal, compilation cannot fail.
    let re = Regex::new(r"-?\d+").expect("valid literal regex");
    re.find_iter(text)
        .filter_map(|m| m.as_str().parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mises_of_hydrostatic_tensor_is_zero() {
        let s = [5.0, 5.0, 5.0, 0.0, 0.0, 0.0];
        assert!(mises_stress(&s).abs() < 1e-6);
    }

    #[test]
    fn mises_matches_closed_form() {
        // A handful of fixed "random" symmetric tensors.
        let tensors: [[f32; 6]; 4] = [
            [1.0, -2.0, 3.0, 0.5, -0.25, 0.75],
            [100.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            [-3.5, 7.25, 0.125, 2.0, 1.0, -1.0],
            [0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        ];
        for s in tensors {
            let expected = (0.5
                * ((s[0] - s[1]).powi(2) + (s[1] - s[2]).powi(2) + (s[2] - s[0]).powi(2))
                + 3.0 * (s[3] * s[3] + s[4] * s[4] + s[5] * s[5]))
                .sqrt();
            let got = mises_stress(&s);
            let rel = (got - expected).abs() / expected.max(1e-12);
            assert!(rel < 1e-5, "mises mismatch for {:?}: {} vs {}", s, got, expected);
        }
    }

    #[test]
    fn uniaxial_mises_equals_magnitude() {
        let s = [42.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert!((mises_stress(&s) - 42.0).abs() < 1e-3);
    }

    #[test]
    fn extracts_integer_lists() {
        assert_eq!(extract_integers("history shell 1 2 10"), vec![1, 2, 10]);
        assert_eq!(extract_integers("history solid 3 max"), vec![3]);
        assert_eq!(extract_integers("history shell -1"), vec![-1]);
        assert!(extract_integers("stress mean").is_empty());
    }
}
