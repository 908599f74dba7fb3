//! The technology-mapped design: cells, pins, nets and macro declarations.

use hiplace_common::{CellId, NetId, PinId, Point};
use hiplace_device::SiteType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Primitive type of a design cell.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CellType {
    /// Look-up table.
    Lut,
    /// Flip-flop.
    Ff,
    /// Carry-chain segment (one per slice).
    Carry,
    /// 2:1 mux combining two LUT outputs.
    MuxF7,
    /// 2:1 mux combining two MUXF7 outputs.
    MuxF8,
    /// LUT used as distributed RAM, SLICEM only.
    Lutram,
    /// DSP block.
    Dsp,
    /// 36Kb block RAM, two BRAM rows.
    Bram36,
    /// 18Kb block RAM, one BRAM row.
    Bram18,
    /// I/O buffer.
    Io,
    /// Anything the placer does not model.
    Other,
}

impl CellType {
    /// Site types a cell of this type can be legalized onto.
    pub fn site_types(self) -> &'static [SiteType] {
        match self {
            CellType::Lut | CellType::Ff | CellType::Carry | CellType::MuxF7 | CellType::MuxF8 => {
                &[SiteType::SliceL, SiteType::SliceM]
            }
            CellType::Lutram => &[SiteType::SliceM],
            CellType::Dsp => &[SiteType::Dsp],
            CellType::Bram36 | CellType::Bram18 => &[SiteType::Bram],
            CellType::Io => &[SiteType::Io],
            CellType::Other => &[],
        }
    }

    /// Number of consecutive site rows a cell of this type covers.
    pub fn site_span(self) -> usize {
        match self {
            CellType::Bram36 => 2,
            _ => 1,
        }
    }

    /// Returns `true` for both block RAM sizes.
    pub fn is_bram(self) -> bool {
        matches!(self, CellType::Bram36 | CellType::Bram18)
    }
}

/// One design cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// Position in the cell arena.
    pub id: CellId,
    /// Instance name.
    pub name: String,
    /// Primitive type.
    pub cell_type: CellType,
    /// Location of a pre-placed cell.
    pub fixed_at: Option<Point>,
    /// Clock region `(col, row)` the cell is constrained to.
    pub clock_region: Option<(u32, u32)>,
    /// Pins of this cell.
    pub pins: Vec<PinId>,
}

/// A connection between a cell and a net.
#[derive(Clone, Debug, PartialEq)]
pub struct Pin {
    /// Position in the pin arena.
    pub id: PinId,
    /// Owning cell.
    pub cell: CellId,
    /// Connected net.
    pub net: NetId,
    /// Pin location relative to the cell origin.
    pub offset: Point,
    /// Whether this pin drives the net.
    pub is_driver: bool,
}

/// A net connecting two or more pins.
#[derive(Clone, Debug, PartialEq)]
pub struct Net {
    /// Position in the net arena.
    pub id: NetId,
    /// Net name.
    pub name: String,
    /// Connected pins, driver first when known.
    pub pins: Vec<PinId>,
    /// Power and ground nets span the device and are ignored by the placer.
    pub is_power: bool,
    /// Multiplier on the wirelength weight of this net.
    pub weight: f64,
}

/// Kind of a multi-cell macro, which decides how it is legalized.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MacroKind {
    /// A carry chain with its LUTs and FFs.
    Carry,
    /// Cascaded block RAMs.
    Bram,
    /// Cascaded DSP blocks.
    Dsp,
    /// Distributed RAM occupying one SLICEM.
    Lutram,
    /// Any other rigid group.
    Generic,
}

/// A rigid group of cells with fixed relative offsets.
#[derive(Clone, Debug, PartialEq)]
pub struct MacroSpec {
    /// Macro name.
    pub name: String,
    /// Declared kind; derived from member types when absent.
    pub kind: Option<MacroKind>,
    /// Member cells and their offsets from the macro origin.
    pub members: Vec<(CellId, Point)>,
    /// Location of a pre-placed macro.
    pub fixed_at: Option<Point>,
}

/// Errors in a design description.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DesignError {
    /// Two cells share a name.
    #[error("duplicate cell name '{0}'")]
    DuplicateCell(String),
    /// A net or macro refers to a cell that does not exist.
    #[error("{context} refers to unknown cell '{name}'")]
    UnknownCell {
        /// Where the reference appeared.
        context: String,
        /// The unresolved cell name.
        name: String,
    },
}

/// A flat technology-mapped netlist.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "DesignData", into = "DesignData")]
pub struct Design {
    /// Design name.
    pub name: String,
    cells: Vec<Cell>,
    pins: Vec<Pin>,
    nets: Vec<Net>,
    macros: Vec<MacroSpec>,
    cell_by_name: HashMap<String, CellId>,
}

impl Design {
    /// Creates an empty design.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a cell and returns its id.
    pub fn add_cell(&mut self, name: impl Into<String>, cell_type: CellType) -> CellId {
        let id = CellId::from_index(self.cells.len());
        let name = name.into();
        self.cell_by_name.insert(name.clone(), id);
        self.cells.push(Cell {
            id,
            name,
            cell_type,
            fixed_at: None,
            clock_region: None,
            pins: Vec::new(),
        });
        id
    }

    /// Pins a cell to a location.
    pub fn fix_cell(&mut self, cell: CellId, at: Point) {
        self.cells[cell.index()].fixed_at = Some(at);
    }

    /// Constrains a cell to a clock region.
    pub fn constrain_to_clock_region(&mut self, cell: CellId, col: u32, row: u32) {
        self.cells[cell.index()].clock_region = Some((col, row));
    }

    /// Adds an empty net and returns its id.
    pub fn add_net(&mut self, name: impl Into<String>) -> NetId {
        let id = NetId::from_index(self.nets.len());
        self.nets.push(Net {
            id,
            name: name.into(),
            pins: Vec::new(),
            is_power: false,
            weight: 1.0,
        });
        id
    }

    /// Marks a net as a power or ground net.
    pub fn set_power(&mut self, net: NetId, is_power: bool) {
        self.nets[net.index()].is_power = is_power;
    }

    /// Sets the wirelength weight multiplier of a net.
    pub fn set_net_weight(&mut self, net: NetId, weight: f64) {
        self.nets[net.index()].weight = weight;
    }

    /// Connects a cell to a net through a new pin.
    pub fn connect(&mut self, net: NetId, cell: CellId, offset: Point, is_driver: bool) -> PinId {
        let id = PinId::from_index(self.pins.len());
        self.pins.push(Pin {
            id,
            cell,
            net,
            offset,
            is_driver,
        });
        self.cells[cell.index()].pins.push(id);
        self.nets[net.index()].pins.push(id);
        id
    }

    /// Declares a macro and returns its position in [`macros`](Self::macros).
    pub fn add_macro(
        &mut self,
        name: impl Into<String>,
        kind: Option<MacroKind>,
        members: Vec<(CellId, Point)>,
    ) -> usize {
        self.macros.push(MacroSpec {
            name: name.into(),
            kind,
            members,
            fixed_at: None,
        });
        self.macros.len() - 1
    }

    /// Pins a macro to a location.
    pub fn fix_macro(&mut self, index: usize, at: Point) {
        self.macros[index].fixed_at = Some(at);
    }

    /// Returns the cell with the given id.
    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.index()]
    }

    /// Returns the pin with the given id.
    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.index()]
    }

    /// Returns the net with the given id.
    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.index()]
    }

    /// All cells.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// All nets.
    pub fn nets(&self) -> &[Net] {
        &self.nets
    }

    /// All macro declarations.
    pub fn macros(&self) -> &[MacroSpec] {
        &self.macros
    }

    /// Looks a cell up by name.
    pub fn cell_by_name(&self, name: &str) -> Option<CellId> {
        self.cell_by_name.get(name).copied()
    }

    /// Returns the number of cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the number of nets.
    pub fn net_count(&self) -> usize {
        self.nets.len()
    }
}

fn unit_weight() -> f64 {
    1.0
}

/// Name-based serialized form of a [`Design`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DesignData {
    /// Design name.
    pub name: String,
    /// Cells.
    pub cells: Vec<CellData>,
    /// Nets.
    #[serde(default)]
    pub nets: Vec<NetData>,
    /// Macros.
    #[serde(default)]
    pub macros: Vec<MacroData>,
}

/// Serialized cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellData {
    /// Instance name.
    pub name: String,
    /// Primitive type.
    pub cell_type: CellType,
    /// Location of a pre-placed cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_at: Option<Point>,
    /// Clock region constraint `[col, row]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_region: Option<[u32; 2]>,
}

/// Serialized net.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetData {
    /// Net name.
    pub name: String,
    /// Power or ground net.
    #[serde(default)]
    pub is_power: bool,
    /// Wirelength weight multiplier.
    #[serde(default = "unit_weight")]
    pub weight: f64,
    /// Connected pins.
    pub pins: Vec<PinData>,
}

/// Serialized pin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PinData {
    /// Owning cell name.
    pub cell: String,
    /// Offset from the cell origin.
    #[serde(default)]
    pub offset: Point,
    /// Whether the pin drives the net.
    #[serde(default)]
    pub driver: bool,
}

/// Serialized macro.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MacroData {
    /// Macro name.
    pub name: String,
    /// Declared kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MacroKind>,
    /// Members with offsets.
    pub members: Vec<MemberData>,
    /// Location of a pre-placed macro.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_at: Option<Point>,
}

/// Serialized macro member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberData {
    /// Cell name.
    pub cell: String,
    /// Offset from the macro origin.
    #[serde(default)]
    pub offset: Point,
}

impl TryFrom<DesignData> for Design {
    type Error = DesignError;

    fn try_from(data: DesignData) -> Result<Self, Self::Error> {
        let mut design = Design::new(data.name);
        for cell in data.cells {
            if design.cell_by_name.contains_key(&cell.name) {
                return Err(DesignError::DuplicateCell(cell.name));
            }
            let id = design.add_cell(cell.name, cell.cell_type);
            if let Some(at) = cell.fixed_at {
                design.fix_cell(id, at);
            }
            if let Some([col, row]) = cell.clock_region {
                design.constrain_to_clock_region(id, col, row);
            }
        }
        let resolve = |design: &Design, context: &str, name: &str| {
            design.cell_by_name(name).ok_or_else(|| DesignError::UnknownCell {
                context: context.to_string(),
                name: name.to_string(),
            })
        };
        for net in data.nets {
            let context = format!("net '{}'", net.name);
            let id = design.add_net(net.name);
            design.set_power(id, net.is_power);
            design.set_net_weight(id, net.weight);
            for pin in net.pins {
                let cell = resolve(&design, &context, &pin.cell)?;
                design.connect(id, cell, pin.offset, pin.driver);
            }
        }
        for spec in data.macros {
            let context = format!("macro '{}'", spec.name);
            let mut members = Vec::with_capacity(spec.members.len());
            for member in &spec.members {
                members.push((resolve(&design, &context, &member.cell)?, member.offset));
            }
            let index = design.add_macro(spec.name, spec.kind, members);
            if let Some(at) = spec.fixed_at {
                design.fix_macro(index, at);
            }
        }
        Ok(design)
    }
}

impl From<Design> for DesignData {
    fn from(design: Design) -> Self {
        let name_of = |id: CellId| design.cells[id.index()].name.clone();
        DesignData {
            name: design.name.clone(),
            cells: design
                .cells
                .iter()
                .map(|c| CellData {
                    name: c.name.clone(),
                    cell_type: c.cell_type,
                    fixed_at: c.fixed_at,
                    clock_region: c.clock_region.map(|(col, row)| [col, row]),
                })
                .collect(),
            nets: design
                .nets
                .iter()
                .map(|n| NetData {
                    name: n.name.clone(),
                    is_power: n.is_power,
                    weight: n.weight,
                    pins: n
                        .pins
                        .iter()
                        .map(|&p| {
                            let pin = &design.pins[p.index()];
                            PinData {
                                cell: name_of(pin.cell),
                                offset: pin.offset,
                                driver: pin.is_driver,
                            }
                        })
                        .collect(),
                })
                .collect(),
            macros: design
                .macros
                .iter()
                .map(|m| MacroData {
                    name: m.name.clone(),
                    kind: m.kind,
                    members: m
                        .members
                        .iter()
                        .map(|&(cell, offset)| MemberData {
                            cell: name_of(cell),
                            offset,
                        })
                        .collect(),
                    fixed_at: m.fixed_at,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cell_design() -> Design {
        let mut design = Design::new("pair");
        let a = design.add_cell("a", CellType::Lut);
        let b = design.add_cell("b", CellType::Ff);
        let net = design.add_net("a_to_b");
        design.connect(net, a, Point::default(), true);
        design.connect(net, b, Point::new(0.5, 0.0), false);
        design
    }

    #[test]
    fn connect_links_both_sides() {
        let design = two_cell_design();
        let net = design.net(NetId::from_raw(0));
        assert_eq!(net.pins.len(), 2);
        let sink = design.pin(net.pins[1]);
        assert_eq!(sink.cell, CellId::from_raw(1));
        assert_eq!(sink.offset, Point::new(0.5, 0.0));
        assert_eq!(design.cell(sink.cell).pins, vec![sink.id]);
        assert_eq!(design.cell_by_name("a"), Some(CellId::from_raw(0)));
    }

    #[test]
    fn json_uses_cell_names() {
        let json = serde_json::to_string(&two_cell_design()).unwrap();
        assert!(json.contains("\"cell\":\"b\""));
        let back: Design = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cell_count(), 2);
        assert_eq!(back.net_count(), 1);
        assert!(back.pin(PinId::from_raw(0)).is_driver);
    }

    #[test]
    fn unknown_cell_reference_fails() {
        let json = r#"{"name": "bad", "cells": [{"name": "a", "cell_type": "LUT"}],
            "nets": [{"name": "n", "pins": [{"cell": "a"}, {"cell": "ghost"}]}]}"#;
        let err = serde_json::from_str::<Design>(json).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn duplicate_cells_fail() {
        let json = r#"{"name": "dup", "cells": [
            {"name": "a", "cell_type": "LUT"}, {"name": "a", "cell_type": "FF"}]}"#;
        assert!(serde_json::from_str::<Design>(json).is_err());
    }

    #[test]
    fn site_compatibility() {
        assert_eq!(CellType::Lutram.site_types(), &[SiteType::SliceM]);
        assert_eq!(CellType::Bram36.site_span(), 2);
        assert_eq!(CellType::Dsp.site_span(), 1);
        assert!(CellType::Other.site_types().is_empty());
    }
}
