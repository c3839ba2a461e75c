//! Shared fixtures: synthetic Gadget and Tipsy files, in-memory FLASH and
//! ARTIO sources, and selectors that record how often they are consulted.

#![allow(dead_code)]

pub mod tracing_capture;

use simio_index::{OctMask, OctreeContainer, RegionSelector, Selector};
use simio_io::dtype::Endian;
use simio_io::formats::artio::OctreeSource;
use simio_io::formats::flash::{GridSource, ParticleTable};
use simio_io::formats::gadget::{GadgetHeader, HEADER_SIZE};
use simio_io::formats::tipsy::TipsyHeader;
use simio_io::{DataError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// =============================================================================
// Byte helpers
// =============================================================================

fn put_u32(buf: &mut Vec<u8>, v: u32, endian: Endian) {
    if endian.is_little() {
        buf.extend_from_slice(&v.to_le_bytes());
    } else {
        buf.extend_from_slice(&v.to_be_bytes());
    }
}

fn put_f32(buf: &mut Vec<u8>, v: f32, endian: Endian) {
    if endian.is_little() {
        buf.extend_from_slice(&v.to_le_bytes());
    } else {
        buf.extend_from_slice(&v.to_be_bytes());
    }
}

fn put_block(buf: &mut Vec<u8>, payload: &[u8], endian: Endian) {
    put_u32(buf, payload.len() as u32, endian);
    buf.extend_from_slice(payload);
    put_u32(buf, payload.len() as u32, endian);
}

// =============================================================================
// Gadget
// =============================================================================

/// Per-type particle data of one Gadget snapshot file.
#[derive(Debug, Clone)]
pub struct GadgetSnapshot {
    pub header: GadgetHeader,
    pub positions: [Vec<[f32; 3]>; 6],
    pub velocities: [Vec<[f32; 3]>; 6],
    pub ids: [Vec<u32>; 6],
    /// Only for types whose mass-table entry is zero.
    pub masses: [Vec<f32>; 6],
    pub internal_energy: Vec<f32>,
    pub density: Vec<f32>,
    pub smoothing_length: Vec<f32>,
}

impl GadgetSnapshot {
    /// 10 gas particles with a header mass of 0.5 and 5 halo particles with
    /// per-particle masses 1..=5, in a unit box.
    ///
    /// Gas `i` sits at `((i + 0.5) / 10, 0.25, 0.25)`, halo `j` at
    /// `((j + 0.5) / 5, 0.75, 0.75)`.
    pub fn two_type() -> Self {
        let header = GadgetHeader::new([10, 5, 0, 0, 0, 0], [0.5, 0.0, 0.0, 0.0, 0.0, 0.0], 1.0);
        let mut snap = Self::empty(header);
        snap.positions[0] = (0..10).map(|i| [(i as f32 + 0.5) / 10.0, 0.25, 0.25]).collect();
        snap.positions[1] = (0..5).map(|j| [(j as f32 + 0.5) / 5.0, 0.75, 0.75]).collect();
        for t in 0..2 {
            snap.velocities[t] = snap.positions[t]
                .iter()
                .map(|p| [-p[0], 2.0 * p[1], 3.0 * p[2]])
                .collect();
        }
        snap.ids[0] = (1..=10).collect();
        snap.ids[1] = (11..=15).collect();
        snap.masses[1] = (1..=5).map(|m| m as f32).collect();
        snap.internal_energy = (0..10).map(|i| i as f32).collect();
        snap.density = (0..10).map(|i| 10.0 + i as f32).collect();
        snap.smoothing_length = vec![0.1; 10];
        snap
    }

    /// Halo-only snapshot at the given positions (header mass 1.0).
    pub fn halo_only(positions: Vec<[f32; 3]>, box_size: f64) -> Self {
        let n = positions.len() as u32;
        let header = GadgetHeader::new(
            [0, n, 0, 0, 0, 0],
            [0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            box_size,
        );
        let mut snap = Self::empty(header);
        snap.velocities[1] = vec![[0.0; 3]; positions.len()];
        snap.ids[1] = (0..n).collect();
        snap.positions[1] = positions;
        snap
    }

    fn empty(header: GadgetHeader) -> Self {
        Self {
            header,
            positions: Default::default(),
            velocities: Default::default(),
            ids: Default::default(),
            masses: Default::default(),
            internal_energy: Vec::new(),
            density: Vec::new(),
            smoothing_length: Vec::new(),
        }
    }

    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        let mut out = Vec::new();
        put_block(&mut out, &self.header.to_bytes(endian), endian);
        debug_assert_eq!(out.len(), HEADER_SIZE + 8);

        let vectors = |rows: &[Vec<[f32; 3]>; 6]| {
            let mut payload = Vec::new();
            for t in rows {
                for v in t.iter().flatten() {
                    put_f32(&mut payload, *v, endian);
                }
            }
            payload
        };
        put_block(&mut out, &vectors(&self.positions), endian);
        put_block(&mut out, &vectors(&self.velocities), endian);

        let mut ids = Vec::new();
        for id in self.ids.iter().flatten() {
            put_u32(&mut ids, *id, endian);
        }
        put_block(&mut out, &ids, endian);

        let mut masses = Vec::new();
        for m in self.masses.iter().flatten() {
            put_f32(&mut masses, *m, endian);
        }
        if !masses.is_empty() {
            put_block(&mut out, &masses, endian);
        }

        if self.header.npart[0] > 0 {
            for block in [&self.internal_energy, &self.density, &self.smoothing_length] {
                let mut payload = Vec::new();
                for v in block {
                    put_f32(&mut payload, *v, endian);
                }
                put_block(&mut out, &payload, endian);
            }
        }
        out
    }

    pub fn write(&self, path: &Path, endian: Endian) {
        fs::write(path, self.to_bytes(endian)).unwrap();
    }

    /// Write with `extra` junk bytes after the last block.
    pub fn write_with_trailer(&self, path: &Path, endian: Endian, extra: usize) {
        let mut bytes = self.to_bytes(endian);
        bytes.extend(std::iter::repeat(0u8).take(extra));
        fs::write(path, bytes).unwrap();
    }
}

// =============================================================================
// Tipsy
// =============================================================================

/// Write a single-precision Tipsy file.
///
/// Records are `mass, pos[3], vel[3], rho, temp, eps, metals, phi` (gas),
/// `mass, pos[3], vel[3], eps, phi` (dark) and
/// `mass, pos[3], vel[3], metals, tform, eps, phi` (stars).
pub fn write_tipsy(
    path: &Path,
    endian: Endian,
    gas: &[[f32; 12]],
    dark: &[[f32; 9]],
    star: &[[f32; 11]],
) {
    let header = TipsyHeader {
        time: 0.5,
        nbodies: (gas.len() + dark.len() + star.len()) as i32,
        ndim: 3,
        nsph: gas.len() as i32,
        ndark: dark.len() as i32,
        nstar: star.len() as i32,
    };
    let mut out = header.to_bytes(endian);
    for v in gas.iter().flatten().chain(dark.iter().flatten()).chain(star.iter().flatten()) {
        put_f32(&mut out, *v, endian);
    }
    fs::write(path, out).unwrap();
}

/// Dark-matter record with the given position; mass and potential encode the index.
pub fn dark_record(i: usize, pos: [f32; 3]) -> [f32; 9] {
    [
        i as f32 + 1.0,
        pos[0],
        pos[1],
        pos[2],
        -pos[0],
        2.0 * pos[1],
        3.0 * pos[2],
        0.01,
        -(i as f32),
    ]
}

// =============================================================================
// FLASH
// =============================================================================

/// In-memory FLASH mesh, recording every block-range read.
pub struct MemGrid {
    pub dims: [usize; 3],
    pub boxes: Vec<([f64; 3], [f64; 3])>,
    pub levels: Vec<u8>,
    pub node_types: Vec<i32>,
    /// Stored `(block, z, y, x)` values per field.
    pub fields: BTreeMap<String, Vec<f64>>,
    pub reads: Mutex<Vec<(String, usize, usize)>>,
}

/// Stored value of cell `(i, j, k)` of block `b`.
pub fn dens_value(block: usize, i: usize, j: usize, k: usize) -> f64 {
    (block * 1000 + i * 100 + j * 10 + k) as f64
}

impl MemGrid {
    /// 101 blocks of 2x2x2 cells. Blocks 0..=3 and 100 are leaves; with an
    /// id offset of 100 they become grids 100..=103 and 200. Leaf `s`
    /// (in that order) covers `[s, s + 1] x [0, 1] x [0, 1]`.
    pub fn runs() -> Self {
        let n = 101;
        let dims = [2, 2, 2];
        let mut boxes = vec![([0.0, 0.0, 0.0], [5.0, 1.0, 1.0]); n];
        let mut levels = vec![0u8; n];
        let mut node_types = vec![2i32; n];
        for (slot, block) in [0usize, 1, 2, 3, 100].into_iter().enumerate() {
            let x = slot as f64;
            boxes[block] = ([x, 0.0, 0.0], [x + 1.0, 1.0, 1.0]);
            levels[block] = 1;
            node_types[block] = 1;
        }
        let mut dens = vec![0.0; n * 8];
        for b in 0..n {
            for k in 0..2 {
                for j in 0..2 {
                    for i in 0..2 {
                        dens[b * 8 + (k * 2 + j) * 2 + i] = dens_value(b, i, j, k);
                    }
                }
            }
        }
        let mut fields = BTreeMap::new();
        fields.insert("dens".to_string(), dens);
        Self {
            dims,
            boxes,
            levels,
            node_types,
            fields,
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn reads(&self) -> Vec<(String, usize, usize)> {
        self.reads.lock().unwrap().clone()
    }
}

fn block_check(n: usize, block: usize) -> Result<()> {
    if block < n {
        Ok(())
    } else {
        Err(DataError::Source(format!("block {} of {}", block, n)))
    }
}

impl GridSource for MemGrid {
    fn block_count(&self) -> usize {
        self.boxes.len()
    }

    fn block_dims(&self) -> [usize; 3] {
        self.dims
    }

    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn bounding_box(&self, block: usize) -> Result<([f64; 3], [f64; 3])> {
        block_check(self.boxes.len(), block)?;
        Ok(self.boxes[block])
    }

    fn refine_level(&self, block: usize) -> Result<u8> {
        block_check(self.levels.len(), block)?;
        Ok(self.levels[block])
    }

    fn node_type(&self, block: usize) -> Result<i32> {
        block_check(self.node_types.len(), block)?;
        Ok(self.node_types[block])
    }

    fn read_blocks(&self, field: &str, start: usize, end: usize) -> Result<Vec<f64>> {
        let values = self
            .fields
            .get(field)
            .ok_or_else(|| DataError::Source(format!("no dataset /{}", field)))?;
        let per = self.dims.iter().product::<usize>();
        self.reads
            .lock()
            .unwrap()
            .push((field.to_string(), start, end));
        Ok(values[start * per..end * per].to_vec())
    }
}

/// In-memory `/tracer particles` table.
pub struct MemParticles {
    pub names: Option<Vec<String>>,
    pub columns: Vec<Vec<f64>>,
    pub local: Vec<u64>,
}

impl MemParticles {
    /// Columns `posx, posy, posz, tag` from `(x, y, z)` rows; `tag` is the
    /// record index.
    pub fn from_positions(rows: &[[f64; 3]]) -> Self {
        let mut columns = vec![Vec::new(); 4];
        for (i, p) in rows.iter().enumerate() {
            columns[0].push(p[0]);
            columns[1].push(p[1]);
            columns[2].push(p[2]);
            columns[3].push(i as f64);
        }
        Self {
            names: Some(
                ["posx", "posy", "posz", "tag"]
                    .iter()
                    .map(|s| format!("{:<24}", s))
                    .collect(),
            ),
            columns,
            local: vec![rows.len() as u64],
        }
    }
}

impl ParticleTable for MemParticles {
    fn particle_names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }

    fn local_counts(&self) -> Vec<u64> {
        self.local.clone()
    }

    fn read_column(&self, column: usize, start: u64, end: u64) -> Result<Vec<f64>> {
        let col = self
            .columns
            .get(column)
            .ok_or_else(|| DataError::Source(format!("no column {}", column)))?;
        col.get(start as usize..end as usize)
            .map(<[f64]>::to_vec)
            .ok_or_else(|| DataError::Source(format!("records {}..{} out of range", start, end)))
    }
}

// =============================================================================
// ARTIO
// =============================================================================

/// Two-domain fileset on a 4^3 root grid (2^3 root octs over `[0, 4]^3`).
///
/// Domain 0 owns the root octs with `x < 2` and refines the one centered at
/// `(1, 1, 1)` once; domain 1 owns the rest. Cell `c` of oct `o` in domain
/// `d` stores `1000 d + 10 o + c`.
pub struct MemFileset {
    pub octs: Vec<Vec<(u8, [f64; 3])>>,
    pub fills: AtomicUsize,
    /// Per domain, per species: `(position, mass)`.
    pub particles: Vec<Vec<Vec<([f64; 3], f64)>>>,
}

pub const SPECIES: [&str; 3] = ["N-BODY", "STAR", "SINK"];

impl MemFileset {
    pub fn two_domains() -> Self {
        let mut d0 = Vec::new();
        let mut d1 = Vec::new();
        for x in [1.0, 3.0] {
            for y in [1.0, 3.0] {
                for z in [1.0, 3.0] {
                    if x < 2.0 {
                        d0.push((0, [x, y, z]));
                    } else {
                        d1.push((0, [x, y, z]));
                    }
                }
            }
        }
        d0.push((1, [0.5, 0.5, 0.5]));
        let particles = vec![
            vec![
                vec![([0.5, 0.5, 0.5], 1.0), ([1.5, 3.0, 3.0], 2.0)],
                Vec::new(),
                Vec::new(),
            ],
            vec![
                vec![([3.5, 0.5, 0.5], 3.0)],
                vec![([2.5, 2.5, 2.5], 4.0)],
                vec![([3.5, 3.5, 3.5], 5.0)],
            ],
        ];
        Self {
            octs: vec![d0, d1],
            fills: AtomicUsize::new(0),
            particles,
        }
    }
}

pub fn oct_value(domain: usize, oct: usize, cell: usize) -> f64 {
    (1000 * domain + 10 * oct + cell) as f64
}

impl OctreeSource for MemFileset {
    fn domain_count(&self) -> usize {
        self.octs.len()
    }

    fn num_grid(&self) -> usize {
        4
    }

    fn max_level(&self) -> u8 {
        1
    }

    fn local_oct_count(&self, domain: u32) -> usize {
        self.octs.get(domain as usize).map_or(0, Vec::len)
    }

    fn grid_pos_fill(
        &self,
        domain: u32,
        sink: &mut dyn FnMut(u8, [f64; 3]) -> Result<()>,
    ) -> Result<()> {
        for &(level, pos) in &self.octs[domain as usize] {
            sink(level, pos)?;
        }
        Ok(())
    }

    fn field_names(&self) -> Vec<String> {
        vec!["HVAR_GAS_DENSITY".to_string()]
    }

    fn grid_var_fill(&self, domain: u32, fields: &[&str]) -> Result<Vec<Vec<f64>>> {
        self.fills.fetch_add(1, Ordering::SeqCst);
        let d = domain as usize;
        let n = self.local_oct_count(domain);
        Ok(fields
            .iter()
            .map(|_| {
                (0..8 * n)
                    .map(|i| oct_value(d, i / 8, i % 8))
                    .collect()
            })
            .collect())
    }

    fn particle_species(&self) -> Vec<String> {
        SPECIES.iter().map(|s| s.to_string()).collect()
    }

    fn particle_field_names(&self, species: usize) -> Vec<String> {
        let mut names = vec!["POSITION_X", "POSITION_Y", "POSITION_Z", "MASS"];
        if SPECIES[species] == "STAR" {
            names.push("CREATION_TIME");
        }
        names.into_iter().map(String::from).collect()
    }

    fn particle_var_fill(
        &self,
        domain: u32,
        species: usize,
        fields: &[&str],
    ) -> Result<Vec<Vec<f64>>> {
        let parts = &self.particles[domain as usize][species];
        fields
            .iter()
            .map(|&f| {
                let column = parts.iter().map(|(pos, mass)| match f {
                    "POSITION_X" => Ok(pos[0]),
                    "POSITION_Y" => Ok(pos[1]),
                    "POSITION_Z" => Ok(pos[2]),
                    "MASS" => Ok(*mass),
                    "CREATION_TIME" if SPECIES[species] == "STAR" => Ok(10.0 * mass),
                    other => Err(DataError::Source(format!("no particle variable {}", other))),
                });
                column.collect::<Result<Vec<f64>>>()
            })
            .collect()
    }
}

// =============================================================================
// Selectors
// =============================================================================

/// Region selector that counts calls to `select_octs`, `select_bbox` and
/// `select_cell`.
pub struct CountingSelector {
    pub inner: RegionSelector,
    pub oct_calls: AtomicUsize,
    pub bbox_calls: AtomicUsize,
    pub cell_calls: AtomicUsize,
}

impl CountingSelector {
    pub fn new(left: [f64; 3], right: [f64; 3]) -> Self {
        Self {
            inner: RegionSelector::new(left, right),
            oct_calls: AtomicUsize::new(0),
            bbox_calls: AtomicUsize::new(0),
            cell_calls: AtomicUsize::new(0),
        }
    }

    pub fn oct_calls(&self) -> usize {
        self.oct_calls.load(Ordering::SeqCst)
    }

    pub fn bbox_calls(&self) -> usize {
        self.bbox_calls.load(Ordering::SeqCst)
    }

    pub fn cell_calls(&self) -> usize {
        self.cell_calls.load(Ordering::SeqCst)
    }
}

impl Selector for CountingSelector {
    fn select_points(&self, x: &[f64], y: &[f64], z: &[f64], radius: f64) -> Option<Vec<bool>> {
        self.inner.select_points(x, y, z, radius)
    }

    fn select_bbox(&self, left: [f64; 3], right: [f64; 3]) -> bool {
        self.bbox_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.select_bbox(left, right)
    }

    fn select_cell(&self, center: [f64; 3], width: [f64; 3]) -> bool {
        self.cell_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.select_cell(center, width)
    }

    fn select_octs(&self, octree: &dyn OctreeContainer) -> OctMask {
        self.oct_calls.fetch_add(1, Ordering::SeqCst);
        octree.select_octs(&|center, width| self.inner.select_cell(center, width))
    }
}
