// SPDX-License-Identifier: GPL-3.0-only

//! Negotiated geometry tests across crop and scale combinations

use mediacap::constants::{HEIGHT_ALIGN, WIDTH_ALIGN};
use mediacap::encoder::negotiate::compute_dimensions;
use mediacap::CropRect;

#[test]
fn test_identity_layout_for_common_resolutions() {
    for (w, h) in [(1920, 1080), (1280, 720), (640, 480), (3840, 2160)] {
        let (fw, fh, ew, eh) = compute_dimensions(w, h, &CropRect::default(), 1.0);
        assert_eq!((fw, fh), (w, h), "{}x{} frame dims changed", w, h);
        assert_eq!((ew, eh), (w, h), "{}x{} encode dims changed", w, h);
    }
}

#[test]
fn test_alignment_holds_for_awkward_inputs() {
    let crops = [
        CropRect::default(),
        CropRect {
            left: 0.1,
            top: 0.2,
            right: 0.9,
            bottom: 0.8,
        },
        CropRect {
            left: 0.33,
            top: 0.17,
            right: 0.68,
            bottom: 0.77,
        },
    ];
    for crop in &crops {
        for scale in [0.25, 0.5, 0.77, 1.0, 1.5] {
            let (fw, fh, ew, eh) = compute_dimensions(1917, 1077, crop, scale);
            assert_eq!(fw % WIDTH_ALIGN, 0);
            assert_eq!(fh % HEIGHT_ALIGN, 0);
            assert_eq!(ew % WIDTH_ALIGN, 0);
            assert_eq!(eh % HEIGHT_ALIGN, 0);
            assert!(fw > 0 && fh > 0 && ew > 0 && eh > 0);
        }
    }
}

#[test]
fn test_scale_shrinks_encode_dimensions_only() {
    let (fw, fh, ew, eh) = compute_dimensions(1920, 1080, &CropRect::default(), 0.5);
    assert_eq!((fw, fh), (1920, 1080));
    assert_eq!((ew, eh), (960, 540));
}

#[test]
fn test_determinism() {
    let crop = CropRect {
        left: 0.2,
        top: 0.1,
        right: 0.8,
        bottom: 0.95,
    };
    let first = compute_dimensions(1366, 768, &crop, 0.66);
    for _ in 0..10 {
        assert_eq!(compute_dimensions(1366, 768, &crop, 0.66), first);
    }
}
