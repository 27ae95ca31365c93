//! Market regions and their hypothesis templates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::request::ValidationError;

/// Placeholder substituted with the candidate label.
pub const LABEL_SLOT: &str = "{}";

/// Fills the label slot of a raw hypothesis template.
pub fn fill_slot(template: &str, label: &str) -> String {
    template.replacen(LABEL_SLOT, label, 1)
}

/// Market a search term is classified for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// Portugal.
    #[default]
    Pt,
    /// Spain.
    Es,
    /// Latin America.
    Latam,
}

impl Region {
    /// Returns all supported regions.
    pub fn all() -> &'static [Region] {
        &[Region::Pt, Region::Es, Region::Latam]
    }

    /// Returns the wire code for this region.
    pub fn code(&self) -> &'static str {
        match self {
            Region::Pt => "pt",
            Region::Es => "es",
            Region::Latam => "latam",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Region {
    type Err = ValidationError;

    /// Exact, case-sensitive match against the region codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::all()
            .iter()
            .copied()
            .find(|r| r.code() == s)
            .ok_or_else(|| ValidationError::UnknownRegion(s.to_string()))
    }
}

/// A natural-language hypothesis with a single label slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HypothesisTemplate(&'static str);

impl HypothesisTemplate {
    /// Returns the raw template, slot included.
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Fills the slot with `label`.
    pub fn render(&self, label: &str) -> String {
        fill_slot(self.0, label)
    }
}

impl fmt::Display for HypothesisTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

const PT_TEMPLATE: &str =
    "Este termo de pesquisa é {} para o software de manutenção GP da Cegid para Portugal.";
const ES_TEMPLATE: &str =
    "Este término de búsqueda es {} para el software de mantenimiento GP de Cegid para España.";
const LATAM_TEMPLATE: &str = "Este término de búsqueda es {} para el software de mantenimiento GP de Cegid para América Latina.";

/// Immutable region to template mapping.
#[derive(Debug, Clone)]
pub struct HypothesisTemplateTable {
    pt: HypothesisTemplate,
    es: HypothesisTemplate,
    latam: HypothesisTemplate,
}

impl HypothesisTemplateTable {
    /// Builds the table with the built-in market templates.
    pub fn standard() -> Self {
        Self {
            pt: HypothesisTemplate(PT_TEMPLATE),
            es: HypothesisTemplate(ES_TEMPLATE),
            latam: HypothesisTemplate(LATAM_TEMPLATE),
        }
    }

    /// Returns the template for `region`.
    pub fn get(&self, region: Region) -> HypothesisTemplate {
        match region {
            Region::Pt => self.pt,
            Region::Es => self.es,
            Region::Latam => self.latam,
        }
    }
}

impl Default for HypothesisTemplateTable {
    fn default() -> Self {
        Self::standard()
    }
}
