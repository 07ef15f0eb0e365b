//! Mask dilation.
//!
//! Grows cloud regions so that their fuzzy edges are also replaced. Each
//! output pixel takes the maximum class inside a square window around it,
//! clipped at the mask edges. The window is separable, so the filter runs as
//! a row pass followed by a column pass.
//!
//! Window offsets for aperture `n`:
//!
//! ```text
//! Legacy     -(n/2) ..  n/2      n = 10 → -5..=4,  n = 3 → -1..=0
//! Symmetric  -(n/2) ..= n/2      n = 10 → -5..=5,  n = 3 → -1..=1
//! ```
//!
//! Both windows always include the centre pixel, so apertures 0 and 1 leave
//! the mask unchanged and dilation never lowers a class.

use std::ops::RangeInclusive;

use super::ClassMask;

/// Shape of the dilation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DilationKernel {
    /// Half-open window `-(n/2)..n/2`, shifted up-left for even and odd
    /// apertures alike. Matches masks produced by earlier tooling.
    #[default]
    Legacy,
    /// Closed window `-(n/2)..=n/2`, centred for odd apertures.
    Symmetric,
}

impl DilationKernel {
    /// Offsets covered by the window for `aperture`.
    pub fn offsets(&self, aperture: u32) -> RangeInclusive<i64> {
        let half = (aperture / 2) as i64;
        let (lo, hi) = match self {
            DilationKernel::Legacy => (-half, half - 1),
            DilationKernel::Symmetric => (-half, half),
        };
        lo.min(0)..=hi.max(0)
    }
}

impl std::str::FromStr for DilationKernel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(DilationKernel::Legacy),
            "symmetric" => Ok(DilationKernel::Symmetric),
            other => Err(format!("unknown dilation kernel: {}", other)),
        }
    }
}

/// Max-filters `mask` over the window of `aperture` and `kernel`.
pub fn dilate(mask: &ClassMask, aperture: u32, kernel: DilationKernel) -> ClassMask {
    let offsets = kernel.offsets(aperture);
    if offsets == (0..=0) {
        return mask.clone();
    }

    let size = mask.size() as i64;
    let src = mask.classes();
    let mut horizontal = vec![0u8; src.len()];
    let mut out = vec![0u8; src.len()];

    // Row pass
    for row in 0..size {
        let base = (row * size) as usize;
        for col in 0..size {
            let lo = (col + offsets.start()).max(0);
            let hi = (col + offsets.end()).min(size - 1);
            horizontal[base + col as usize] = (lo..=hi)
                .map(|c| src[base + c as usize])
                .max()
                .unwrap_or(0);
        }
    }

    // Column pass
    for row in 0..size {
        let lo = (row + offsets.start()).max(0);
        let hi = (row + offsets.end()).min(size - 1);
        for col in 0..size {
            out[(row * size + col) as usize] = (lo..=hi)
                .map(|r| horizontal[(r * size + col) as usize])
                .max()
                .unwrap_or(0);
        }
    }

    mask.with_classes(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with(size: u32, hot: &[(u32, u32, u8)]) -> ClassMask {
        let mut mask = ClassMask::clear(size);
        for &(col, row, class) in hot {
            mask.set(col, row, class);
        }
        mask
    }

    fn raised(mask: &ClassMask) -> Vec<(u32, u32)> {
        let mut cells = Vec::new();
        for row in 0..mask.size() {
            for col in 0..mask.size() {
                if mask.get(col, row) > 1 {
                    cells.push((col, row));
                }
            }
        }
        cells
    }

    /// Direct 2-D window max, for comparison with the separable filter.
    fn dilate_direct(mask: &ClassMask, aperture: u32, kernel: DilationKernel) -> ClassMask {
        let offsets = kernel.offsets(aperture);
        let size = mask.size() as i64;
        let mut out = ClassMask::clear(mask.size());
        for row in 0..size {
            for col in 0..size {
                let mut value = 0u8;
                for dy in offsets.clone() {
                    for dx in offsets.clone() {
                        let (r, c) = (row + dy, col + dx);
                        if r >= 0 && r < size && c >= 0 && c < size {
                            value = value.max(mask.get(c as u32, r as u32));
                        }
                    }
                }
                out.set(col as u32, row as u32, value);
            }
        }
        out
    }

    #[test]
    fn test_offsets() {
        assert_eq!(DilationKernel::Legacy.offsets(10), -5..=4);
        assert_eq!(DilationKernel::Legacy.offsets(3), -1..=0);
        assert_eq!(DilationKernel::Symmetric.offsets(3), -1..=1);
        assert_eq!(DilationKernel::Legacy.offsets(1), 0..=0);
        assert_eq!(DilationKernel::Symmetric.offsets(0), 0..=0);
    }

    #[test]
    fn test_legacy_aperture_three_raises_lower_right_block() {
        let mask = mask_with(5, &[(2, 2, 4)]);

        let dilated = dilate(&mask, 3, DilationKernel::Legacy);

        assert_eq!(raised(&dilated), vec![(2, 2), (3, 2), (2, 3), (3, 3)]);
        for (col, row) in raised(&dilated) {
            assert_eq!(dilated.get(col, row), 4);
        }
    }

    #[test]
    fn test_symmetric_aperture_three_raises_full_block() {
        let mask = mask_with(5, &[(2, 2, 3)]);

        let dilated = dilate(&mask, 3, DilationKernel::Symmetric);

        assert_eq!(raised(&dilated).len(), 9);
        assert_eq!(dilated.get(1, 1), 3);
        assert_eq!(dilated.get(3, 3), 3);
        assert_eq!(dilated.get(0, 0), 1);
    }

    #[test]
    fn test_small_apertures_are_identity() {
        let mask = mask_with(4, &[(0, 0, 2), (3, 1, 4)]);
        assert_eq!(dilate(&mask, 0, DilationKernel::Legacy), mask);
        assert_eq!(dilate(&mask, 1, DilationKernel::Legacy), mask);
        assert_eq!(dilate(&mask, 1, DilationKernel::Symmetric), mask);
    }

    #[test]
    fn test_edges_are_clipped() {
        let mask = mask_with(4, &[(0, 0, 4)]);
        let dilated = dilate(&mask, 10, DilationKernel::Legacy);
        // Legacy window looks up to 4 pixels down-right, so everything
        // within reach of (0, 0) is raised.
        assert_eq!(raised(&dilated).len(), 16);
    }

    #[test]
    fn test_higher_class_wins() {
        let mask = mask_with(3, &[(0, 1, 2), (1, 1, 4)]);
        let dilated = dilate(&mask, 3, DilationKernel::Symmetric);
        assert_eq!(dilated.get(0, 1), 4);
        assert_eq!(dilated.get(1, 1), 4);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_mask() -> impl Strategy<Value = ClassMask> {
            (1u32..8).prop_flat_map(|size| {
                prop::collection::vec(1u8..=4, (size * size) as usize)
                    .prop_map(move |classes| ClassMask::from_classes(size, classes).unwrap())
            })
        }

        fn arb_kernel() -> impl Strategy<Value = DilationKernel> {
            prop_oneof![Just(DilationKernel::Legacy), Just(DilationKernel::Symmetric)]
        }

        proptest! {
            #[test]
            fn test_dilation_never_lowers_a_class(
                mask in arb_mask(),
                aperture in 0u32..12,
                kernel in arb_kernel(),
            ) {
                let dilated = dilate(&mask, aperture, kernel);
                for i in 0..mask.len() {
                    prop_assert!(dilated.at(i) >= mask.at(i));
                }
            }

            #[test]
            fn test_separable_matches_direct_window(
                mask in arb_mask(),
                aperture in 0u32..12,
                kernel in arb_kernel(),
            ) {
                prop_assert_eq!(
                    dilate(&mask, aperture, kernel),
                    dilate_direct(&mask, aperture, kernel)
                );
            }
        }
    }
}
