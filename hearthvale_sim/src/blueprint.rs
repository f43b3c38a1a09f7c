// Blueprint templates and the blueprint library.
//
// A `Blueprint` is an immutable structure template: a list of blocks at
// offsets relative to the placement origin, the materials they need, work
// slots and entry points, and a build-order key per block. Blueprints are
// compiled once from declarative `BlueprintDef`s and never mutated;
// `rotated()` and `mirrored()` return new instances.
//
// ## Definition format
//
// `BlueprintDef` is the JSON form. `layers` lists Z levels bottom-up, each a
// list of rows (row index = Y, front row first), each row a string whose
// characters are X cells. `.` and space are empty. Every other character
// must appear in `legend`, which maps it to a block name, optionally with a
// rotation in degrees: `"wood"`, `"door@90"`.
//
// ## Build order
//
// Each block carries an order key. The default is Z-major, then Y, then X,
// so lower layers are always built first. A definition may pin explicit keys
// for individual offsets; pinned keys survive rotation and mirroring while
// default keys are recomputed for the new footprint.
//
// See also: `site.rs` which instantiates a blueprint at a world position,
// `construction.rs` which owns the `BlueprintLibrary`, `block.rs` for
// `BlockType::material()`.
//
// **Critical constraint: determinism.** Block lists are kept sorted by
// `(order, offset)` and the library is a `BTreeMap`.

use crate::block::{BlockType, Material};
use crate::error::SimError;
use crate::types::{BlueprintId, Priority, Rotation, WorldPos};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Broad grouping for UI menus and unlock tiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Housing,
    Defense,
    Storage,
    Infrastructure,
}

/// Named spot inside a structure where an agent works once it is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSlot {
    pub name: String,
    pub offset: WorldPos,
}

/// Pins the build-order key of one offset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderOverride {
    pub offset: WorldPos,
    pub order: u32,
}

/// Declarative blueprint, as loaded from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlueprintDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub tier: u8,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_requires_foundation")]
    pub requires_foundation: bool,
    pub layers: Vec<Vec<String>>,
    pub legend: BTreeMap<String, String>,
    #[serde(default)]
    pub work_slots: Vec<WorkSlot>,
    #[serde(default)]
    pub entry_points: Vec<WorldPos>,
    #[serde(default)]
    pub build_order: Vec<OrderOverride>,
}

fn default_requires_foundation() -> bool {
    true
}

/// One block of a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintBlock {
    /// Offset from the placement origin. Always inside the footprint.
    pub offset: WorldPos,
    pub block: BlockType,
    pub rotation: Rotation,
    pub order: u32,
    /// `order` was pinned by the definition rather than derived.
    pub order_pinned: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: BlueprintId,
    pub name: String,
    pub category: Category,
    pub tier: u8,
    pub priority: Priority,
    pub requires_foundation: bool,
    width: i32,
    depth: i32,
    height: i32,
    blocks: Vec<BlueprintBlock>,
    materials: BTreeMap<Material, u32>,
    work_slots: Vec<WorkSlot>,
    entry_points: Vec<WorldPos>,
}

impl Blueprint {
    /// Compile a definition. Fails on empty layouts, unknown legend
    /// characters, and legend entries that do not name a buildable block.
    pub fn from_def(def: &BlueprintDef) -> Result<Self, SimError> {
        let legend = parse_legend(def)?;
        let pins: BTreeMap<WorldPos, u32> =
            def.build_order.iter().map(|o| (o.offset, o.order)).collect();

        let mut blocks = Vec::new();
        for (z, layer) in def.layers.iter().enumerate() {
            for (y, row) in layer.iter().enumerate() {
                for (x, ch) in row.chars().enumerate() {
                    if ch == '.' || ch == ' ' {
                        continue;
                    }
                    let &(block, rotation) = legend.get(&ch).ok_or_else(|| {
                        SimError::Config(format!(
                            "blueprint '{}': character '{ch}' is not in the legend",
                            def.id
                        ))
                    })?;
                    let offset = WorldPos::new(x as i32, y as i32, z as i32);
                    let pinned = pins.get(&offset).copied();
                    blocks.push(BlueprintBlock {
                        offset,
                        block,
                        rotation,
                        order: pinned.unwrap_or(0),
                        order_pinned: pinned.is_some(),
                    });
                }
            }
        }
        if blocks.is_empty() {
            return Err(SimError::Config(format!("blueprint '{}' has no blocks", def.id)));
        }

        let width = def
            .layers
            .iter()
            .flat_map(|layer| layer.iter().map(|row| row.chars().count()))
            .max()
            .unwrap_or(0) as i32;
        let depth = def.layers.iter().map(Vec::len).max().unwrap_or(0) as i32;
        let height = def.layers.len() as i32;

        let mut bp = Self {
            id: BlueprintId::new(def.id.clone()),
            name: def.name.clone(),
            category: def.category,
            tier: def.tier,
            priority: def.priority,
            requires_foundation: def.requires_foundation,
            width,
            depth,
            height,
            materials: BTreeMap::new(),
            blocks,
            work_slots: def.work_slots.clone(),
            entry_points: def.entry_points.clone(),
        };
        bp.finish();
        Ok(bp)
    }

    /// Recompute derived fields after the block list changes.
    fn finish(&mut self) {
        let (w, d) = (self.width, self.depth);
        for b in &mut self.blocks {
            if !b.order_pinned {
                b.order = default_order(b.offset, w, d);
            }
        }
        self.blocks.sort_by_key(|b| (b.order, b.offset.z, b.offset.y, b.offset.x));
        self.materials.clear();
        for b in &self.blocks {
            if let Some(m) = b.block.material() {
                *self.materials.entry(m).or_insert(0) += 1;
            }
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Blocks in build order.
    pub fn blocks(&self) -> &[BlueprintBlock] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn materials(&self) -> &BTreeMap<Material, u32> {
        &self.materials
    }

    /// Units of `material` the whole structure needs. Zero if none.
    pub fn material_requirement(&self, material: Material) -> u32 {
        self.materials.get(&material).copied().unwrap_or(0)
    }

    pub fn work_slots(&self) -> &[WorkSlot] {
        &self.work_slots
    }

    pub fn entry_points(&self) -> &[WorldPos] {
        &self.entry_points
    }

    /// The block at an offset, if the template has one there.
    pub fn block_at(&self, offset: WorldPos) -> Option<&BlueprintBlock> {
        self.blocks.iter().find(|b| b.offset == offset)
    }

    /// A copy turned about the vertical axis. Offsets are remapped into the
    /// rotated footprint and each block's own rotation is advanced by the
    /// same amount.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        if rotation == Rotation::R0 {
            return self.clone();
        }
        let (w, d) = (self.width, self.depth);
        let remap = |p: WorldPos| {
            let (x, y) = rotation.apply(p.x, p.y, w, d);
            WorldPos::new(x, y, p.z)
        };
        let (rw, rd) = rotation.rotated_dims(w, d);
        let mut bp = self.clone();
        bp.width = rw;
        bp.depth = rd;
        for b in &mut bp.blocks {
            b.offset = remap(b.offset);
            b.rotation = b.rotation.then(rotation);
        }
        for slot in &mut bp.work_slots {
            slot.offset = remap(slot.offset);
        }
        for entry in &mut bp.entry_points {
            *entry = remap(*entry);
        }
        bp.finish();
        bp
    }

    /// A copy reflected across the X axis (`x -> width - 1 - x`). Quarter
    /// turns of individual blocks swap direction.
    pub fn mirrored(&self) -> Self {
        let w = self.width;
        let flip = |p: WorldPos| WorldPos::new(w - 1 - p.x, p.y, p.z);
        let mut bp = self.clone();
        for b in &mut bp.blocks {
            b.offset = flip(b.offset);
            b.rotation = Rotation::from_quarter_turns(4 - b.rotation.quarter_turns());
        }
        for slot in &mut bp.work_slots {
            slot.offset = flip(slot.offset);
        }
        for entry in &mut bp.entry_points {
            *entry = flip(*entry);
        }
        bp.finish();
        bp
    }
}

fn default_order(offset: WorldPos, width: i32, depth: i32) -> u32 {
    (offset.z * width * depth + offset.y * width + offset.x) as u32
}

fn parse_legend(def: &BlueprintDef) -> Result<BTreeMap<char, (BlockType, Rotation)>, SimError> {
    let bad = |msg: String| SimError::Config(format!("blueprint '{}': {msg}", def.id));
    let mut legend = BTreeMap::new();
    for (key, value) in &def.legend {
        let mut chars = key.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return Err(bad(format!("legend key '{key}' must be a single character")));
        };
        let (name, rotation) = match value.split_once('@') {
            Some((name, deg)) => {
                let rotation = deg
                    .parse::<i32>()
                    .ok()
                    .and_then(Rotation::from_degrees)
                    .ok_or_else(|| bad(format!("bad rotation in '{value}'")))?;
                (name, rotation)
            }
            None => (value.as_str(), Rotation::R0),
        };
        let block = BlockType::from_name(name)
            .ok_or_else(|| bad(format!("unknown block '{name}'")))?;
        if block.material().is_none() {
            return Err(bad(format!("'{name}' cannot be built")));
        }
        legend.insert(ch, (block, rotation));
    }
    Ok(legend)
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

/// Every blueprint the game knows, keyed by id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BlueprintLibrary {
    blueprints: BTreeMap<BlueprintId, Blueprint>,
}

impl BlueprintLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library preloaded with the built-in structures.
    pub fn with_builtins() -> Self {
        let mut lib = Self::new();
        for def in builtin_defs() {
            match Blueprint::from_def(&def) {
                Ok(bp) => lib.insert(bp),
                Err(e) => log::warn!("built-in blueprint '{}' skipped: {e}", def.id),
            }
        }
        lib
    }

    /// Add or replace a blueprint.
    pub fn insert(&mut self, blueprint: Blueprint) {
        self.blueprints.insert(blueprint.id.clone(), blueprint);
    }

    pub fn get(&self, id: &BlueprintId) -> Option<&Blueprint> {
        self.blueprints.get(id)
    }

    pub fn contains(&self, id: &BlueprintId) -> bool {
        self.blueprints.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &BlueprintId> {
        self.blueprints.keys()
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    /// Load a JSON array of `BlueprintDef`s. Nothing is inserted unless
    /// every definition compiles. Returns the ids added.
    pub fn load_json(&mut self, json: &str) -> Result<Vec<BlueprintId>, SimError> {
        let defs: Vec<BlueprintDef> =
            serde_json::from_str(json).map_err(|e| SimError::Config(e.to_string()))?;
        let compiled = defs
            .iter()
            .map(Blueprint::from_def)
            .collect::<Result<Vec<_>, _>>()?;
        let ids = compiled.iter().map(|bp| bp.id.clone()).collect();
        for bp in compiled {
            log::debug!("loaded blueprint '{}' ({} blocks)", bp.id, bp.block_count());
            self.insert(bp);
        }
        Ok(ids)
    }
}

fn rows(rows: &[&str]) -> Vec<String> {
    rows.iter().map(|r| (*r).to_owned()).collect()
}

fn legend(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

/// Definitions for the structures every new game starts with.
pub fn builtin_defs() -> Vec<BlueprintDef> {
    vec![
        BlueprintDef {
            id: "wooden_house".into(),
            name: "Wooden House".into(),
            category: Category::Housing,
            tier: 1,
            priority: Priority::Normal,
            requires_foundation: true,
            layers: vec![
                rows(&["WWDWW", "W...W", "W...W", "W...W", "WWWWW"]),
                rows(&["WWWWW", "W...W", "W...W", "W...W", "WWWWW"]),
                rows(&["P.P.P", ".....", "P...P", ".....", "P.P.P"]),
            ],
            legend: legend(&[("W", "wood"), ("D", "door"), ("P", "plank")]),
            work_slots: vec![WorkSlot {
                name: "hearth".into(),
                offset: WorldPos::new(2, 3, 0),
            }],
            entry_points: vec![WorldPos::new(2, -1, 0)],
            build_order: Vec::new(),
        },
        BlueprintDef {
            id: "stone_wall".into(),
            name: "Stone Wall".into(),
            category: Category::Defense,
            tier: 1,
            priority: Priority::Normal,
            requires_foundation: true,
            layers: vec![rows(&["CCCCC"]), rows(&["CCCCC"])],
            legend: legend(&[("C", "cobblestone")]),
            work_slots: Vec::new(),
            entry_points: Vec::new(),
            build_order: Vec::new(),
        },
        BlueprintDef {
            id: "watchtower".into(),
            name: "Watchtower".into(),
            category: Category::Defense,
            tier: 2,
            priority: Priority::High,
            requires_foundation: true,
            layers: vec![
                rows(&["SLS", "S.S", "SSS"]),
                rows(&["SLS", "S.S", "SSS"]),
                rows(&["PLP", "PPP", "PPP"]),
                rows(&["W.W", "...", "W.W"]),
            ],
            legend: legend(&[("S", "stone"), ("P", "plank"), ("W", "wood"), ("L", "ladder")]),
            work_slots: vec![WorkSlot {
                name: "lookout".into(),
                offset: WorldPos::new(1, 1, 3),
            }],
            entry_points: vec![WorldPos::new(1, -1, 0)],
            build_order: Vec::new(),
        },
        BlueprintDef {
            id: "storage_shed".into(),
            name: "Storage Shed".into(),
            category: Category::Storage,
            tier: 1,
            priority: Priority::Low,
            requires_foundation: true,
            layers: vec![
                rows(&["PPDP", "P..P", "PPPP"]),
                rows(&["TTTT", "TTTT", "TTTT"]),
            ],
            legend: legend(&[("P", "plank"), ("D", "door"), ("T", "thatch")]),
            work_slots: vec![WorkSlot {
                name: "shelves".into(),
                offset: WorldPos::new(1, 1, 0),
            }],
            entry_points: vec![WorldPos::new(2, -1, 0)],
            build_order: Vec::new(),
        },
    ]
}
