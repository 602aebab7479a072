//! Semantic chart labels and their target ratio fields
//!
//! Profile files name labels with the short keys used by the report
//! parsers (`use`, `prod`, `transp`, `EOL`, `board`, ...). The long forms
//! (`manufacturing`, `transport`, `end-of-life`) are accepted as aliases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A category that can appear in a footprint chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "use")]
    Use,
    #[serde(rename = "prod", alias = "manufacturing", alias = "production")]
    Manufacturing,
    #[serde(rename = "transp", alias = "transport")]
    Transport,
    #[serde(rename = "EOL", alias = "end-of-life", alias = "eol")]
    EndOfLife,
    #[serde(rename = "board")]
    Mainboard,
    #[serde(rename = "SSD")]
    Ssd,
    #[serde(rename = "HDD")]
    Hdd,
    #[serde(rename = "disp")]
    Display,
    #[serde(rename = "power")]
    PowerSupply,
    #[serde(rename = "box")]
    Chassis,
    #[serde(rename = "battery")]
    Battery,
    #[serde(rename = "packaging")]
    Packaging,
    #[serde(rename = "optical_drive")]
    OpticalDrive,
    #[serde(rename = "electronics")]
    Electronics,
    #[serde(rename = "housing")]
    Housing,
    #[serde(rename = "panel")]
    Panel,
    #[serde(rename = "materials")]
    Materials,
    #[serde(rename = "assembly")]
    Assembly,
    #[serde(rename = "IC")]
    IntegratedCircuits,
    #[serde(rename = "PWBs")]
    PrintedWiringBoards,
    #[serde(rename = "lcd_assembly")]
    LcdAssembly,
}

impl Label {
    /// The four lifecycle phases that must add up to 100%
    pub const CORE: [Label; 4] = [
        Label::Use,
        Label::Manufacturing,
        Label::Transport,
        Label::EndOfLife,
    ];

    pub fn is_core(self) -> bool {
        Self::CORE.contains(&self)
    }

    /// Sub-components break the manufacturing share down
    pub fn is_component(self) -> bool {
        !self.is_core()
    }

    /// Short key used in profile files and logs
    pub fn key(self) -> &'static str {
        match self {
            Label::Use => "use",
            Label::Manufacturing => "prod",
            Label::Transport => "transp",
            Label::EndOfLife => "EOL",
            Label::Mainboard => "board",
            Label::Ssd => "SSD",
            Label::Hdd => "HDD",
            Label::Display => "disp",
            Label::PowerSupply => "power",
            Label::Chassis => "box",
            Label::Battery => "battery",
            Label::Packaging => "packaging",
            Label::OpticalDrive => "optical_drive",
            Label::Electronics => "electronics",
            Label::Housing => "housing",
            Label::Panel => "panel",
            Label::Materials => "materials",
            Label::Assembly => "assembly",
            Label::IntegratedCircuits => "IC",
            Label::PrintedWiringBoards => "PWBs",
            Label::LcdAssembly => "lcd_assembly",
        }
    }

    /// Field of the device footprint record receiving this label's share
    ///
    /// Several labels share a field (housing and box both feed the chassis
    /// ratio); their shares accumulate.
    pub fn ratio_field(self) -> RatioField {
        match self {
            Label::Use => RatioField::Use,
            Label::Manufacturing => RatioField::Manufacturing,
            Label::Transport => RatioField::Transport,
            Label::EndOfLife => RatioField::EndOfLife,
            Label::Mainboard => RatioField::Mainboard,
            Label::Ssd => RatioField::Ssd,
            Label::Hdd => RatioField::Hdd,
            Label::Display | Label::Panel | Label::LcdAssembly => RatioField::Display,
            Label::PowerSupply => RatioField::PowerSupply,
            Label::Chassis | Label::Housing => RatioField::Chassis,
            Label::Battery => RatioField::Battery,
            Label::Packaging => RatioField::Packaging,
            Label::OpticalDrive => RatioField::OpticalDrive,
            Label::Electronics => RatioField::Electronics,
            Label::Materials
            | Label::Assembly
            | Label::IntegratedCircuits
            | Label::PrintedWiringBoards => RatioField::OtherComponents,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ratio fields of the device carbon-footprint record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RatioField {
    Use,
    Manufacturing,
    Transport,
    EndOfLife,
    Mainboard,
    Ssd,
    Hdd,
    Display,
    PowerSupply,
    Chassis,
    Battery,
    Packaging,
    OpticalDrive,
    Electronics,
    OtherComponents,
}
