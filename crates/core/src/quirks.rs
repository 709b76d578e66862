//! Hardware-revision quirks and the bring-up search order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Named flag altering command selection for specific hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quirk {
    /// Effects use the mouse extended matrix command (class 0x0D) addressed per LED.
    MouseMatrix,
    /// Brightness uses the extended matrix get/set pair (class 0x0F).
    MatrixBrightness,
}

impl Quirk {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MouseMatrix => "mouse_matrix",
            Self::MatrixBrightness => "matrix_brightness",
        }
    }
}

impl std::fmt::Display for Quirk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Set of quirks, fixed for the lifetime of a device instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuirkSet(BTreeSet<Quirk>);

impl QuirkSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, quirk: Quirk) -> bool {
        self.0.contains(&quirk)
    }

    pub fn iter(&self) -> impl Iterator<Item = Quirk> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[Quirk; N]> for QuirkSet {
    fn from(quirks: [Quirk; N]) -> Self {
        Self(quirks.into_iter().collect())
    }
}

impl FromIterator<Quirk> for QuirkSet {
    fn from_iter<I: IntoIterator<Item = Quirk>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for QuirkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "{{}}");
        }
        let names: Vec<_> = self.iter().map(|q| q.name()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Stock bring-up search order, least to most invasive.
pub fn default_quirk_combinations() -> Vec<QuirkSet> {
    vec![
        QuirkSet::empty(),
        QuirkSet::from([Quirk::MouseMatrix]),
        QuirkSet::from([Quirk::MouseMatrix, Quirk::MatrixBrightness]),
        QuirkSet::from([Quirk::MatrixBrightness]),
    ]
}
