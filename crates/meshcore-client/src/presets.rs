//! Regional LoRa radio presets.

use meshcore_protocol::RadioParams;

/// A named radio configuration.
#[derive(Debug, Clone, Copy)]
pub struct RadioPreset {
    /// Lookup key, e.g. `"usa_canada_narrow"`.
    pub key: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Parameters sent to the device.
    pub params: RadioParams,
}

/// Built-in regional presets.
pub const RADIO_PRESETS: &[RadioPreset] = &[
    RadioPreset {
        key: "eu_uk_narrow",
        label: "EU/UK (Narrow)",
        params: RadioParams {
            freq_khz: 869_618,
            bandwidth_hz: 62_500,
            spreading_factor: 8,
            coding_rate: 8,
        },
    },
    RadioPreset {
        key: "eu_uk_wide",
        label: "EU/UK (Wide)",
        params: RadioParams {
            freq_khz: 868_000,
            bandwidth_hz: 125_000,
            spreading_factor: 11,
            coding_rate: 8,
        },
    },
    RadioPreset {
        key: "usa_canada_narrow",
        label: "USA/Canada (Narrow)",
        params: RadioParams {
            freq_khz: 910_525,
            bandwidth_hz: 62_500,
            spreading_factor: 7,
            coding_rate: 8,
        },
    },
    RadioPreset {
        key: "usa_canada_wide",
        label: "USA/Canada (Wide)",
        params: RadioParams {
            freq_khz: 915_000,
            bandwidth_hz: 125_000,
            spreading_factor: 11,
            coding_rate: 8,
        },
    },
    RadioPreset {
        key: "australia_nz_narrow",
        label: "Australia/NZ (Narrow)",
        params: RadioParams {
            freq_khz: 915_800,
            bandwidth_hz: 62_500,
            spreading_factor: 8,
            coding_rate: 8,
        },
    },
    RadioPreset {
        key: "asia_433",
        label: "Asia 433MHz",
        params: RadioParams {
            freq_khz: 433_000,
            bandwidth_hz: 62_500,
            spreading_factor: 9,
            coding_rate: 8,
        },
    },
];

/// Look up a preset by key.
pub fn find_preset(key: &str) -> Option<&'static RadioPreset> {
    RADIO_PRESETS.iter().find(|p| p.key == key)
}
