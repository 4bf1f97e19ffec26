// SPDX-License-Identifier: GPL-3.0-only

//! Settings serialization tests

use mediacap::constants::MPEG_TIME_BASE;
use mediacap::EncoderSettings;

#[test]
fn test_defaults_match_documented_values() {
    let settings = EncoderSettings::default();
    assert_eq!(settings.time_base, MPEG_TIME_BASE);
    assert_eq!(settings.crop, (0.0, 0.0, 1.0, 1.0));
    assert_eq!(settings.scale_ratio, 1.0);
}

#[test]
fn test_json_roundtrip_preserves_settings() {
    let settings = EncoderSettings {
        time_base: 1_000_000,
        crop: (0.25, 0.0, 0.75, 1.0),
        scale_ratio: 0.5,
    };
    let json = serde_json::to_string(&settings).unwrap();
    let back: EncoderSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(back, settings);
}

#[test]
fn test_unknown_fields_rejected_gracefully() {
    // Older files with extra fields must still load
    let json = r#"{"time_base":90000,"crop":[0.0,0.0,1.0,1.0],"scale_ratio":1.0,"legacy":true}"#;
    let settings: EncoderSettings = serde_json::from_str(json).unwrap();
    assert_eq!(settings.time_base, 90000);
}
