/// Privilege mode of the hart.
///
/// The discriminants are the model's internal numbering (`Machine = 2`), which
/// differs from the architectural encoding (`Machine = 3`) used by `mstatus.MPP`
/// and by reference simulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Privilege {
    /// User mode.
    User = 0,
    /// Supervisor mode.
    Supervisor = 1,
    /// Machine mode.
    #[default]
    Machine = 2,
}

impl Privilege {
    /// Returns the model-internal level value.
    #[must_use]
    pub const fn internal_level(self) -> u8 {
        self as u8
    }

    /// Returns the architectural two-bit encoding.
    #[must_use]
    pub const fn encoding(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Supervisor => 1,
            Self::Machine => 3,
        }
    }

    /// Decodes an architectural two-bit encoding; `2` is reserved.
    #[must_use]
    pub const fn from_encoding(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::User),
            1 => Some(Self::Supervisor),
            3 => Some(Self::Machine),
            _ => None,
        }
    }

    /// Translates an internal level value into the architectural encoding.
    #[must_use]
    pub const fn remap_internal(level: u8) -> u8 {
        if level == 2 {
            3
        } else {
            level
        }
    }
}
