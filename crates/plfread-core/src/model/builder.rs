//! Assembles reconciled blocks into a [`ProjectModel`].
//!
//! Semantics are bound by schema name: `Station` records define stations,
//! `DeviceCatalog` records define devices, `BlockCatalog` records define
//! program organization units, and `LibraryVersions`, `MetaPackages`, and
//! `Timestamps` records fill the project-level collections. Blocks governed
//! by any other schema, or by no resolvable schema, are skipped with a
//! diagnostic note, never an error.

use crate::container::{inflate_block, BlockKind, BlockRecord, TrustLevel};
use crate::error::Result;
use crate::model::{
    language_name, BlockCatalog, BlockEntry, Device, DeviceSubtype, Diagnostics, LibraryRef,
    ProgramBlockKind, ProjectModel, Station,
};
use crate::reconcile::Reconciliation;
use crate::schema::{decode_records, DecodedRecord, Schema, SchemaSet};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

const STATION_SCHEMA: &str = "Station";
const DEVICE_SCHEMA: &str = "DeviceCatalog";
const BLOCK_SCHEMA: &str = "BlockCatalog";
const LIBRARY_SCHEMA: &str = "LibraryVersions";
const PACKAGE_SCHEMA: &str = "MetaPackages";
const TIMESTAMP_SCHEMA: &str = "Timestamps";

/// Decodes a packed language-set field: one code per byte, low byte first,
/// zero-terminated.
fn languages_from_packed(packed: u64) -> Vec<String> {
    packed
        .to_le_bytes()
        .iter()
        .take_while(|&&code| code != 0)
        .map(|&code| language_name(code as u64))
        .collect()
}

/// Per-read model assembly state.
struct ModelBuilder<'a> {
    trust: &'a HashMap<usize, TrustLevel>,
    stations: Vec<Station>,
    station_index: HashMap<String, usize>,
    libraries: Vec<LibraryRef>,
    meta_packages: Vec<String>,
    timestamps: Vec<String>,
    notes: Vec<String>,
}

impl<'a> ModelBuilder<'a> {
    fn new(trust: &'a HashMap<usize, TrustLevel>) -> Self {
        ModelBuilder {
            trust,
            stations: Vec::new(),
            station_index: HashMap::new(),
            libraries: Vec::new(),
            meta_packages: Vec::new(),
            timestamps: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Returns the slot for `id`, creating an empty station on first sight.
    fn station_slot(&mut self, id: &str) -> usize {
        match self.station_index.get(id) {
            Some(&slot) => slot,
            None => {
                let slot = self.stations.len();
                self.station_index.insert(id.to_owned(), slot);
                self.stations.push(Station {
                    id: id.to_owned(),
                    devices: Vec::new(),
                    blocks: BlockCatalog::default(),
                });
                slot
            }
        }
    }

    fn trusted(&self, block_index: usize) -> bool {
        !matches!(self.trust.get(&block_index), Some(TrustLevel::Failed))
    }

    fn apply_station(&mut self, record: &DecodedRecord) {
        match record.get_str("Id") {
            Some(id) => {
                self.station_slot(id);
            }
            None => self
                .notes
                .push("station record without an Id field".to_owned()),
        }
    }

    fn apply_device(&mut self, record: &DecodedRecord, block_index: usize) {
        let Some(name) = record.get_str("Name") else {
            self.notes.push(format!(
                "device record in block {block_index} without a Name field"
            ));
            return;
        };
        let subtype = match record.get_str("Subtype") {
            Some(raw) => DeviceSubtype::from_raw(raw),
            None => DeviceSubtype::Unknown(String::new()),
        };
        if let DeviceSubtype::Unknown(raw) = &subtype {
            trace!(device = name, subtype = %raw, "unrecognized device subtype");
        }
        let device = Device {
            name: name.to_owned(),
            order_number: record.get_str("OrderNumber").map(str::to_owned),
            firmware: record.get_str("Firmware").map(str::to_owned),
            subtype,
            max_blocks: record.get_u64("MaxBlocks"),
            languages: record
                .get_u64("Languages")
                .map(languages_from_packed)
                .unwrap_or_default(),
            trusted: self.trusted(block_index),
        };
        let station_id = record.get_str("Station").unwrap_or("").to_owned();
        if station_id.is_empty() {
            self.notes
                .push(format!("device {name} is not attached to a station"));
        }
        let slot = self.station_slot(&station_id);
        self.stations[slot].devices.push(device);
    }

    fn apply_block(&mut self, record: &DecodedRecord, block_index: usize) {
        let Some(name) = record.get_str("Name") else {
            self.notes.push(format!(
                "block catalog record in block {block_index} without a Name field"
            ));
            return;
        };
        let kind = match record.get_str("Kind") {
            Some(raw) => ProgramBlockKind::from_raw(raw),
            None => ProgramBlockKind::Unknown(String::new()),
        };
        let station_id = record.get_str("Station").unwrap_or("").to_owned();
        let slot = self.station_slot(&station_id);
        self.stations[slot].blocks.entries.push(BlockEntry {
            name: name.to_owned(),
            kind,
        });
    }

    fn apply_library(&mut self, record: &DecodedRecord, block_index: usize) {
        let (Some(guid), Some(display_version)) =
            (record.get_str("LibGuid"), record.get_str("DisplayVersion"))
        else {
            self.notes.push(format!(
                "library record in block {block_index} without a guid or version"
            ));
            return;
        };
        self.libraries.push(LibraryRef {
            guid: guid.to_owned(),
            display_version: display_version.to_owned(),
            switch_minor: record.get_u64("SwitchMinor").is_some_and(|v| v != 0),
        });
    }

    fn apply_package(&mut self, record: &DecodedRecord, block_index: usize) {
        match record.get_str("Package") {
            Some(name) if !name.is_empty() => self.meta_packages.push(name.to_owned()),
            _ => self.notes.push(format!(
                "package record in block {block_index} without a Package field"
            )),
        }
    }

    fn apply_timestamp(&mut self, record: &DecodedRecord) {
        if let Some(stamp) = record.get_str("Stamp") {
            // Duplicates across device pages collapse to one entry.
            if !stamp.is_empty() && !self.timestamps.iter().any(|t| t == stamp) {
                self.timestamps.push(stamp.to_owned());
            }
        }
    }

    fn apply_entity(&mut self, schema: &Schema, block: &BlockRecord, data: &[u8]) {
        let records = decode_records(schema, data);
        trace!(
            block = block.index,
            schema = %schema.name,
            records = records.len(),
            "decoded entity"
        );
        match schema.name.as_str() {
            STATION_SCHEMA => {
                for record in &records {
                    self.apply_station(record);
                }
            }
            DEVICE_SCHEMA => {
                for record in &records {
                    self.apply_device(record, block.index);
                }
            }
            BLOCK_SCHEMA => {
                for record in &records {
                    self.apply_block(record, block.index);
                }
            }
            LIBRARY_SCHEMA => {
                for record in &records {
                    self.apply_library(record, block.index);
                }
            }
            PACKAGE_SCHEMA => {
                for record in &records {
                    self.apply_package(record, block.index);
                }
            }
            TIMESTAMP_SCHEMA => {
                for record in &records {
                    self.apply_timestamp(record);
                }
            }
            other => {
                self.notes.push(format!(
                    "block {} governed by unhandled schema {other:?}; skipped",
                    block.index
                ));
            }
        }
    }
}

/// Builds the project model from the reconciled block set.
///
/// Schema blocks are resolved first (a later schema with the same id
/// supersedes an earlier one via reconciliation), then data blocks are
/// decoded against their governing schemas. Decompression failures abort;
/// semantic gaps become diagnostic notes.
pub fn build_model(
    name: String,
    version: String,
    reconciliation: Reconciliation,
    trust: &HashMap<usize, TrustLevel>,
) -> Result<ProjectModel> {
    let mut schemas = SchemaSet::new();
    let mut builder = ModelBuilder::new(trust);

    // First pass: resolve every schema before interpreting any data page.
    for block in &reconciliation.entities {
        if block.kind != BlockKind::Schema {
            continue;
        }
        let inflated = inflate_block(block)?;
        match Schema::parse(block.object_id, &inflated.data) {
            Ok(schema) => {
                trace!(id = schema.id, name = %schema.name, "schema resolved");
                schemas.insert(schema);
            }
            Err(err) => {
                warn!(block = block.index, %err, "unparseable schema block");
                builder
                    .notes
                    .push(format!("schema block {} rejected: {err}", block.index));
            }
        }
    }

    for block in &reconciliation.entities {
        match block.kind {
            BlockKind::Schema => {}
            BlockKind::Data => {
                if block.schema_id == 0 {
                    builder
                        .notes
                        .push(format!("data block {} has no governing schema", block.index));
                    continue;
                }
                let Some(schema) = schemas.resolve(u64::from(block.schema_id)) else {
                    builder.notes.push(format!(
                        "data block {} references unresolved schema {}",
                        block.index, block.schema_id
                    ));
                    continue;
                };
                let inflated = inflate_block(block)?;
                builder.apply_entity(schema, block, &inflated.data);
            }
            BlockKind::Opaque(kind) => {
                trace!(block = block.index, kind, "skipping opaque block");
                builder.notes.push(format!(
                    "block {} has unrecognized kind {kind}; skipped",
                    block.index
                ));
            }
        }
    }

    debug!(
        stations = builder.stations.len(),
        notes = builder.notes.len(),
        incomplete = reconciliation.incomplete.len(),
        "model assembled"
    );

    Ok(ProjectModel {
        name,
        version,
        stations: builder.stations,
        libraries: builder.libraries,
        meta_packages: builder.meta_packages,
        timestamps: builder.timestamps,
        diagnostics: Diagnostics {
            incomplete_sessions: reconciliation.incomplete,
            notes: builder.notes,
        },
    })
}
