#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumIs, EnumIter, IntoStaticStr};

/// Built-in scalar and root types.
///
/// `Object` is the root of every reference type: any non-value type is
/// assignable to it. Every other primary type except `Str` is a value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIs, EnumIter, IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[strum(serialize_all = "lowercase")]
pub enum PrimaryType {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    Object,
}

impl PrimaryType {
    /// Returns `true` if values of this type are copied rather than referenced.
    #[inline]
    pub const fn is_value(&self) -> bool {
        !matches!(self, PrimaryType::Str | PrimaryType::Object)
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for PrimaryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
