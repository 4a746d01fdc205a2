//! Position translation between the legacy and modern device enumerations
//!
//! The legacy API addresses devices with raw integer codes (including a few
//! aggregate codes such as "all" or "left side" that have no device of their
//! own). The transport uses a compact enumeration with one value per physical
//! device. Translation is total in both directions: anything the modern side
//! cannot represent collapses onto the vest.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Modern positions
// ============================================================================

/// Physical haptic device position as understood by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DevicePosition {
    Vest,
    ForearmLeft,
    ForearmRight,
    Head,
    HandLeft,
    HandRight,
    FootLeft,
    FootRight,
    GloveLeft,
    GloveRight,
}

impl DevicePosition {
    /// Every position, in transport order
    pub const ALL: [DevicePosition; 10] = [
        DevicePosition::Vest,
        DevicePosition::ForearmLeft,
        DevicePosition::ForearmRight,
        DevicePosition::Head,
        DevicePosition::HandLeft,
        DevicePosition::HandRight,
        DevicePosition::FootLeft,
        DevicePosition::FootRight,
        DevicePosition::GloveLeft,
        DevicePosition::GloveRight,
    ];

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            DevicePosition::Vest => "vest",
            DevicePosition::ForearmLeft => "forearm_left",
            DevicePosition::ForearmRight => "forearm_right",
            DevicePosition::Head => "head",
            DevicePosition::HandLeft => "hand_left",
            DevicePosition::HandRight => "hand_right",
            DevicePosition::FootLeft => "foot_left",
            DevicePosition::FootRight => "foot_right",
            DevicePosition::GloveLeft => "glove_left",
            DevicePosition::GloveRight => "glove_right",
        }
    }

    /// Host initializer family for this position
    pub fn family(self) -> PositionFamily {
        match self {
            DevicePosition::Vest => PositionFamily::Vest,
            DevicePosition::Head => PositionFamily::Head,
            DevicePosition::ForearmLeft => PositionFamily::Forearm { is_left: true },
            DevicePosition::ForearmRight => PositionFamily::Forearm { is_left: false },
            DevicePosition::HandLeft => PositionFamily::Hand { is_left: true },
            DevicePosition::HandRight => PositionFamily::Hand { is_left: false },
            DevicePosition::FootLeft => PositionFamily::Foot { is_left: true },
            DevicePosition::FootRight => PositionFamily::Foot { is_left: false },
            DevicePosition::GloveLeft => PositionFamily::Glove { is_left: true },
            DevicePosition::GloveRight => PositionFamily::Glove { is_left: false },
        }
    }
}

impl fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Group of positions sharing one host initialization entry point
///
/// Four of the six families are sided and carry a left/right flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionFamily {
    Head,
    Vest,
    Forearm { is_left: bool },
    Foot { is_left: bool },
    Hand { is_left: bool },
    Glove { is_left: bool },
}

// ============================================================================
// Legacy positions
// ============================================================================

/// Device position as addressed by the legacy per-frame API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyPosition {
    All,
    Left,
    Right,
    Vest,
    Head,
    Racket,
    HandL,
    HandR,
    FootL,
    FootR,
    ForearmL,
    ForearmR,
    VestFront,
    VestBack,
    GloveLeft,
    GloveRight,
}

impl LegacyPosition {
    /// Position used for any legacy code without a device of its own
    pub const FALLBACK: LegacyPosition = LegacyPosition::Vest;

    /// Decode a raw legacy code. Unknown codes resolve to [`Self::FALLBACK`].
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => LegacyPosition::All,
            1 => LegacyPosition::Left,
            2 => LegacyPosition::Right,
            3 => LegacyPosition::Vest,
            4 => LegacyPosition::Head,
            5 => LegacyPosition::Racket,
            6 => LegacyPosition::HandL,
            7 => LegacyPosition::HandR,
            8 => LegacyPosition::FootL,
            9 => LegacyPosition::FootR,
            10 => LegacyPosition::ForearmL,
            11 => LegacyPosition::ForearmR,
            201 => LegacyPosition::VestFront,
            202 => LegacyPosition::VestBack,
            203 => LegacyPosition::GloveLeft,
            204 => LegacyPosition::GloveRight,
            other => {
                tracing::trace!(raw = other, "Unknown legacy position, using vest");
                Self::FALLBACK
            }
        }
    }

    /// Raw legacy code
    pub fn to_raw(self) -> i32 {
        match self {
            LegacyPosition::All => 0,
            LegacyPosition::Left => 1,
            LegacyPosition::Right => 2,
            LegacyPosition::Vest => 3,
            LegacyPosition::Head => 4,
            LegacyPosition::Racket => 5,
            LegacyPosition::HandL => 6,
            LegacyPosition::HandR => 7,
            LegacyPosition::FootL => 8,
            LegacyPosition::FootR => 9,
            LegacyPosition::ForearmL => 10,
            LegacyPosition::ForearmR => 11,
            LegacyPosition::VestFront => 201,
            LegacyPosition::VestBack => 202,
            LegacyPosition::GloveLeft => 203,
            LegacyPosition::GloveRight => 204,
        }
    }
}

impl From<i32> for LegacyPosition {
    fn from(raw: i32) -> Self {
        LegacyPosition::from_raw(raw)
    }
}

// ============================================================================
// Translation
// ============================================================================

/// Map a legacy position to the transport position.
///
/// Aggregate codes (`All`, `Left`, `Right`), the racket and the split vest
/// halves all land on [`DevicePosition::Vest`].
pub fn to_modern(legacy: LegacyPosition) -> DevicePosition {
    match legacy {
        LegacyPosition::Head => DevicePosition::Head,
        LegacyPosition::HandL => DevicePosition::HandLeft,
        LegacyPosition::HandR => DevicePosition::HandRight,
        LegacyPosition::FootL => DevicePosition::FootLeft,
        LegacyPosition::FootR => DevicePosition::FootRight,
        LegacyPosition::ForearmL => DevicePosition::ForearmLeft,
        LegacyPosition::ForearmR => DevicePosition::ForearmRight,
        LegacyPosition::GloveLeft => DevicePosition::GloveLeft,
        LegacyPosition::GloveRight => DevicePosition::GloveRight,
        LegacyPosition::Vest
        | LegacyPosition::VestFront
        | LegacyPosition::VestBack
        | LegacyPosition::All
        | LegacyPosition::Left
        | LegacyPosition::Right
        | LegacyPosition::Racket => DevicePosition::Vest,
    }
}

/// Map a transport position back to its canonical legacy position
pub fn to_legacy(position: DevicePosition) -> LegacyPosition {
    match position {
        DevicePosition::Vest => LegacyPosition::Vest,
        DevicePosition::Head => LegacyPosition::Head,
        DevicePosition::HandLeft => LegacyPosition::HandL,
        DevicePosition::HandRight => LegacyPosition::HandR,
        DevicePosition::FootLeft => LegacyPosition::FootL,
        DevicePosition::FootRight => LegacyPosition::FootR,
        DevicePosition::ForearmLeft => LegacyPosition::ForearmL,
        DevicePosition::ForearmRight => LegacyPosition::ForearmR,
        DevicePosition::GloveLeft => LegacyPosition::GloveLeft,
        DevicePosition::GloveRight => LegacyPosition::GloveRight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_for_mapped_positions() {
        for position in DevicePosition::ALL {
            let legacy = to_legacy(position);
            assert_eq!(to_modern(legacy), position);
            assert_eq!(to_legacy(to_modern(legacy)), legacy);
        }
    }

    #[test]
    fn test_aggregate_codes_collapse_to_vest() {
        for legacy in [
            LegacyPosition::All,
            LegacyPosition::Left,
            LegacyPosition::Right,
            LegacyPosition::Racket,
            LegacyPosition::VestFront,
            LegacyPosition::VestBack,
        ] {
            assert_eq!(to_modern(legacy), DevicePosition::Vest);
        }
    }

    #[test]
    fn test_unknown_raw_code_uses_fallback() {
        assert_eq!(LegacyPosition::from_raw(-1), LegacyPosition::Vest);
        assert_eq!(LegacyPosition::from_raw(999), LegacyPosition::Vest);
        assert_eq!(to_modern(12345.into()), DevicePosition::Vest);
    }

    #[test]
    fn test_raw_codes_round_trip() {
        for raw in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 201, 202, 203, 204] {
            assert_eq!(LegacyPosition::from_raw(raw).to_raw(), raw);
        }
    }

    #[test]
    fn test_families() {
        assert_eq!(DevicePosition::Head.family(), PositionFamily::Head);
        assert_eq!(
            DevicePosition::ForearmLeft.family(),
            PositionFamily::Forearm { is_left: true }
        );
        assert_eq!(
            DevicePosition::FootRight.family(),
            PositionFamily::Foot { is_left: false }
        );
    }
}
