//! ARTIO-style octree datasets over an in-memory fileset.

mod support;

use simio_io::{
    AlwaysSelector, ChunkMode, ChunkState, DataError, Dataset, FieldKey, FieldName, Layout,
    ParticleType, Query, Selector,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use support::{oct_value, CountingSelector, MemFileset};

fn density() -> FieldKey {
    FieldKey::fluid("HVAR_GAS_DENSITY")
}

fn particle(ptype: ParticleType, name: &str) -> FieldKey {
    FieldKey::new(ptype, FieldName::named(name))
}

fn open() -> (Arc<MemFileset>, Dataset) {
    let fileset = Arc::new(MemFileset::two_domains());
    let ds = Dataset::octree("artio", fileset.clone(), None).unwrap();
    (fileset, ds)
}

#[test]
fn test_octree_dataset_defaults() {
    let (_, ds) = open();
    assert_eq!(ds.bounds().left, [0.0; 3]);
    assert_eq!(ds.bounds().right, [4.0; 3]);
    let fields = ds.field_list();
    assert!(fields.contains(&density()));
    assert!(fields.contains(&FieldKey::new(ParticleType::DarkMatter, FieldName::Coordinates)));
    assert!(fields.contains(&particle(ParticleType::Stars, "CREATION_TIME")));
    assert!(!fields.contains(&particle(ParticleType::DarkMatter, "CREATION_TIME")));
    let Layout::Octree(layout) = ds.layout() else {
        panic!("expected octree layout");
    };
    assert_eq!(layout.octree().domain_count(), 2);
    assert_eq!(layout.octree().domain_oct_count(0), 5);
    assert_eq!(layout.max_level(), 1);
    // SINK has no particle type and is not served.
    assert_eq!(
        layout.species(),
        &[(ParticleType::DarkMatter, 0), (ParticleType::Stars, 1)]
    );
}

#[test]
fn test_every_leaf_cell_read_once() {
    let (_, ds) = open();
    let mut query = Query::new(&ds);
    let sel: Arc<dyn Selector> = Arc::new(AlwaysSelector);

    let out = query.read(&sel, &[density()]).unwrap();
    let values = out[&density()].values();
    // 31 root cells plus 8 refined cells in domain 0, 32 root cells in domain 1.
    assert_eq!(values.len(), 71);
    assert_eq!(query.size(&sel).unwrap(), 71);

    // Level 0 first within a domain; cell 0 of oct 0 is refined.
    assert_eq!(values[0], oct_value(0, 0, 1));
    assert_eq!(values[31], oct_value(0, 4, 0));
    assert_eq!(values[39], oct_value(1, 0, 0));
}

#[test]
fn test_io_chunks_are_domains() {
    let (_, ds) = open();
    let mut query = Query::new(&ds);
    let sel: Arc<dyn Selector> = Arc::new(AlwaysSelector);

    let sizes: Vec<usize> = query
        .chunks(&sel, ChunkMode::Io)
        .unwrap()
        .map(|c| c.unwrap().size())
        .collect();
    assert_eq!(sizes, vec![39, 32]);
}

#[test]
fn test_refined_region_selection() {
    let (fileset, ds) = open();
    let mut query = Query::new(&ds);
    let counting = Arc::new(CountingSelector::new([0.0; 3], [1.0; 3]));
    let sel: Arc<dyn Selector> = counting.clone();
    assert_eq!(query.state(&sel), ChunkState::Unresolved);

    let first = query.read(&sel, &[density()]).unwrap();
    let expected: Vec<f64> = (0..8).map(|c| oct_value(0, 4, c)).collect();
    assert_eq!(first[&density()].values(), expected.as_slice());
    assert_eq!(query.state(&sel), ChunkState::BaseChunkBuilt);

    let second = query.read(&sel, &[density()]).unwrap();
    assert_eq!(first, second);
    assert_eq!(query.size(&sel).unwrap(), 8);
    let chunks = query.chunks(&sel, ChunkMode::All).unwrap().count();
    assert_eq!(chunks, 1);

    // Masking ran once; the fileset was read once per read.
    assert_eq!(counting.oct_calls(), 1);
    assert_eq!(fileset.fills.load(Ordering::SeqCst), 2);
}

#[test]
fn test_subset_geometry() {
    let (_, ds) = open();
    let Layout::Octree(layout) = ds.layout() else {
        panic!("expected octree layout");
    };
    let mut query = Query::new(&ds);
    let sel: Arc<dyn Selector> = Arc::new(CountingSelector::new([0.0; 3], [1.0; 3]));
    let chunk = query
        .chunks(&sel, ChunkMode::All)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();

    let subsets: Vec<_> = chunk.subsets().collect();
    assert_eq!(subsets.len(), 1);
    let subset = subsets[0];
    assert_eq!(subset.domain_id(), 0);
    assert_eq!(subset.level_offsets(), &[0, 0]);

    let octree = layout.octree();
    assert_eq!(subset.ires(octree), vec![1; 8]);
    assert_eq!(subset.fwidth(octree), vec![[0.5; 3]; 8]);
    let fcoords = subset.fcoords(octree);
    assert_eq!(fcoords[0], [0.25, 0.25, 0.25]);
    assert_eq!(fcoords[1], [0.75, 0.25, 0.25]);
    assert_eq!(subset.icoords(octree)[7], [1, 1, 1]);
}

#[test]
fn test_spatial_chunking_unsupported() {
    let (_, ds) = open();
    let sel: Arc<dyn Selector> = Arc::new(AlwaysSelector);
    let err = Query::new(&ds).chunks(&sel, ChunkMode::Spatial).err();
    assert!(matches!(err, Some(DataError::Unsupported(_))));
}

#[test]
fn test_chunk_data_unsupported() {
    let (_, ds) = open();
    let mut query = Query::new(&ds);
    let sel: Arc<dyn Selector> = Arc::new(AlwaysSelector);
    let chunk = query
        .chunks(&sel, ChunkMode::All)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    let err = query.read_chunk_data(&chunk, &[density()]).unwrap_err();
    assert!(matches!(err, DataError::Unsupported(_)));
}

#[test]
fn test_particle_keys_rejected() {
    let (_, ds) = open();
    let sel: Arc<dyn Selector> = Arc::new(AlwaysSelector);
    for key in [
        FieldKey::new(ParticleType::Halo, FieldName::Mass),
        particle(ParticleType::DarkMatter, "CREATION_TIME"),
    ] {
        let err = Query::new(&ds).read(&sel, &[key]).unwrap_err();
        assert!(matches!(err, DataError::UnknownField(_)));
    }
}

// =============================================================================
// Particles
// =============================================================================

#[test]
fn test_every_particle_read_once() {
    let (_, ds) = open();
    let sel: Arc<dyn Selector> = Arc::new(AlwaysSelector);
    let fields = [
        particle(ParticleType::DarkMatter, "MASS"),
        particle(ParticleType::Stars, "CREATION_TIME"),
        FieldKey::new(ParticleType::Stars, FieldName::Coordinates),
    ];
    let out = Query::new(&ds).read(&sel, &fields).unwrap();
    assert_eq!(out[&fields[0]].values(), &[1.0, 2.0, 3.0]);
    assert_eq!(out[&fields[1]].values(), &[40.0]);
    assert_eq!(out[&fields[2]].width(), 3);
    assert_eq!(out[&fields[2]].row(0), &[2.5, 2.5, 2.5]);
}

#[test]
fn test_particles_follow_domain_selection() {
    let (_, ds) = open();
    let mut query = Query::new(&ds);
    let counting = Arc::new(CountingSelector::new([0.0; 3], [1.0; 3]));
    let sel: Arc<dyn Selector> = counting.clone();
    let fields = [
        density(),
        particle(ParticleType::DarkMatter, "MASS"),
        FieldKey::new(ParticleType::DarkMatter, FieldName::Coordinates),
        particle(ParticleType::Stars, "MASS"),
    ];

    let first = query.read(&sel, &fields).unwrap();
    assert_eq!(first[&fields[0]].len(), 8);
    // (1.5, 3, 3) shares domain 0 but lies outside the region.
    assert_eq!(first[&fields[1]].values(), &[1.0]);
    assert_eq!(first[&fields[2]].row(0), &[0.5, 0.5, 0.5]);
    assert!(first[&fields[3]].is_empty());

    let second = query.read(&sel, &fields).unwrap();
    assert_eq!(first, second);
    assert_eq!(counting.oct_calls(), 1);
}
