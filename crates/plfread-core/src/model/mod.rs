//! The reconstructed project model.
//!
//! Everything here is plain owned data, built once per read and immutable
//! afterwards. Unknown leaf values (device subtypes, block kinds, language
//! codes) are preserved as raw strings instead of failing, so the model
//! stays usable against hardware catalogs newer than this reader.

mod builder;

pub use builder::build_model;

use crate::reconcile::IncompleteSession;
use std::fmt::Write as _;

/// Vendor programming-language table.
///
/// Unknown codes render as `?N` so they stay visible in output rather than
/// disappearing.
pub fn language_name(code: u64) -> String {
    match code {
        1 => "LAD".to_owned(),
        2 => "FBD".to_owned(),
        3 => "STL".to_owned(),
        4 => "SCL".to_owned(),
        5 => "CFC".to_owned(),
        6 => "GRAPH".to_owned(),
        other => format!("?{other}"),
    }
}

/// Device subtype from the hardware catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSubtype {
    /// A programmable controller
    Cpu,
    /// Any subtype string this reader does not recognize, kept verbatim
    Unknown(String),
}

impl DeviceSubtype {
    /// Maps a raw catalog subtype string.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "CPU" => DeviceSubtype::Cpu,
            other => DeviceSubtype::Unknown(other.to_owned()),
        }
    }
}

impl std::fmt::Display for DeviceSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceSubtype::Cpu => f.write_str("CPU"),
            DeviceSubtype::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Kind of a program organization unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramBlockKind {
    /// Organization block
    Ob,
    /// Function block
    Fb,
    /// Function
    Fc,
    /// Data block
    Db,
    /// User-defined type
    Udt,
    /// Unrecognized kind string, kept verbatim
    Unknown(String),
}

impl ProgramBlockKind {
    /// Maps a raw catalog kind string.
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "OB" => ProgramBlockKind::Ob,
            "FB" => ProgramBlockKind::Fb,
            "FC" => ProgramBlockKind::Fc,
            "DB" => ProgramBlockKind::Db,
            "UDT" => ProgramBlockKind::Udt,
            other => ProgramBlockKind::Unknown(other.to_owned()),
        }
    }
}

/// One program organization unit: identity and kind only, never logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    /// Block name, e.g. `Main`
    pub name: String,
    /// Block kind
    pub kind: ProgramBlockKind,
}

/// The station's program organization units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockCatalog {
    /// Catalog entries in container order
    pub entries: Vec<BlockEntry>,
}

/// A hardware device attached to a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Device name, e.g. `PLC_1`
    pub name: String,
    /// Vendor order number (MLFB), when present
    pub order_number: Option<String>,
    /// Firmware version string, when present
    pub firmware: Option<String>,
    /// Catalog subtype
    pub subtype: DeviceSubtype,
    /// Capability limit: maximum number of program blocks
    pub max_blocks: Option<u64>,
    /// Supported programming languages, decoded per the vendor table
    pub languages: Vec<String>,
    /// False when the device's source block failed signature verification
    pub trusted: bool,
}

/// One hardware station and its devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    /// Station identifier
    pub id: String,
    /// Devices in container order
    pub devices: Vec<Device>,
    /// Program organization units attached to this station
    pub blocks: BlockCatalog,
}

/// A versioned library referenced by the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRef {
    /// Library GUID in canonical text form
    pub guid: String,
    /// Human-readable version, e.g. `V1.2`
    pub display_version: String,
    /// Whether minor-version switching is enabled for this reference
    pub switch_minor: bool,
}

/// Non-fatal findings collected during the read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Sessions excluded from the model for lacking a commit
    pub incomplete_sessions: Vec<IncompleteSession>,
    /// Informational notes: unknown subtypes, unresolved schemas, skipped blocks
    pub notes: Vec<String>,
}

/// The fully reconstructed project, root of the query surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectModel {
    /// Project name, from the companion wrapper or the directory stem
    pub name: String,
    /// Authoring-tool version string
    pub version: String,
    /// Stations in container order
    pub stations: Vec<Station>,
    /// Library version references, in container order
    pub libraries: Vec<LibraryRef>,
    /// Authoring-tool package names recorded in the container
    pub meta_packages: Vec<String>,
    /// Modification timestamps found in the container, in container order
    pub timestamps: Vec<String>,
    /// Non-fatal findings from the read
    pub diagnostics: Diagnostics,
}

const RULE: &str = "============================================================";

fn field(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("unknown")
}

impl ProjectModel {
    /// Renders the fixed human-readable report.
    ///
    /// The layout is stable for scripting: absent fields render as
    /// `unknown`, never get omitted.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "  TIA Project: {}", field(Some(self.name.as_str())));
        let _ = writeln!(
            out,
            "  TIA Portal Version: {}",
            field(Some(self.version.as_str()))
        );
        let _ = writeln!(out, "{RULE}");
        for station in &self.stations {
            let _ = writeln!(out, "  Station: {}", field(Some(station.id.as_str())));
            for device in &station.devices {
                let _ = writeln!(out, "  CPU: {}", field(Some(device.name.as_str())));
                let _ = writeln!(
                    out,
                    "    Order Number: {}",
                    field(device.order_number.as_deref())
                );
                let _ = writeln!(out, "    Firmware: {}", field(device.firmware.as_deref()));
                let _ = writeln!(out, "    Subtype: {}", device.subtype);
                let max_blocks = device.max_blocks.map(|n| n.to_string());
                let _ = writeln!(out, "    Max Blocks: {}", field(max_blocks.as_deref()));
                let languages = device.languages.join(", ");
                let _ = writeln!(out, "    Languages: {}", field(Some(languages.as_str())));
            }
        }
        // Trailing sections appear only when populated, so the core report
        // keeps its shape for projects without them.
        if !self.libraries.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "  Libraries ({}):", self.libraries.len());
            for lib in &self.libraries {
                let _ = writeln!(out, "    - {}  {}", lib.guid, lib.display_version);
            }
        }
        if !self.meta_packages.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "  MetaInfo Packages ({}):", self.meta_packages.len());
            for pkg in &self.meta_packages {
                let _ = writeln!(out, "    - {pkg}");
            }
        }
        if let (Some(first), Some(last)) = (self.timestamps.first(), self.timestamps.last()) {
            let _ = writeln!(out);
            let _ = writeln!(out, "  Timestamps: {first} ... {last}");
        }
        out
    }
}
