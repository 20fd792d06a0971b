//! Layered archives: prune, replace, metadata union and time sampling remap.

use std::path::{Path, PathBuf};

use alembic_core::prelude::*;
use tempfile::{tempdir, TempDir};

fn md(pairs: &[(&str, &str)]) -> MetaData {
    pairs.iter().copied().collect()
}

fn write(dir: &TempDir, name: &str, engine: Engine, build: impl FnOnce(&OArchive)) -> PathBuf {
    let path = dir.path().join(name);
    let archive = OArchive::create(&path, engine).unwrap();
    build(&archive);
    archive.close().unwrap();
    path
}

fn layered(paths: &[PathBuf]) -> IArchive {
    IArchive::open_layered(paths, &ReadOptions::default(), LayerOptions::default()).unwrap()
}

fn int_scalar(props: &OCompoundProperty, name: &str, value: i32) {
    let mut p = props
        .create_scalar(name, DataType::INT32, MetaData::new(), 0)
        .unwrap();
    p.set(value).unwrap();
}

fn child_names(obj: &IObject) -> Vec<String> {
    obj.children().map(|c| c.unwrap().name().to_string()).collect()
}

#[test]
fn test_prune_precedence() {
    let dir = tempdir().unwrap();
    let base = write(&dir, "base.abc", Engine::Ogawa, |a| {
        a.top().create_child("other", MetaData::new()).unwrap();
    });
    let defines = write(&dir, "defines.abc", Engine::Legacy, |a| {
        a.top().create_child("A", MetaData::new()).unwrap();
        a.top().create_child("B", MetaData::new()).unwrap();
    });
    let prunes = write(&dir, "prunes.abc", Engine::Ogawa, |a| {
        a.top().create_child("A", md(&[("prune", "1")])).unwrap();
    });

    let archive = layered(&[base.clone(), defines.clone(), prunes.clone()]);
    let top = archive.top().unwrap();
    assert!(top.child_by_name("A").is_none());
    assert_eq!(child_names(&top), vec!["other", "B"]);

    // a later input may re-add the pruned name as a fresh slot
    let readds = write(&dir, "readds.abc", Engine::Ogawa, |a| {
        a.top().create_child("A", md(&[("fresh", "1")])).unwrap();
    });
    let archive = layered(&[base, defines, prunes, readds]);
    let top = archive.top().unwrap();
    assert_eq!(child_names(&top), vec!["other", "B", "A"]);
    assert_eq!(top.child_by_name("A").unwrap().meta_data().get("fresh"), "1");
}

fn compound_names(archive: &IArchive) -> Vec<String> {
    let obj = archive.find_object("/obj").unwrap().unwrap();
    obj.properties()
        .unwrap()
        .compound("P")
        .unwrap()
        .property_names()
}

#[test]
fn test_replace_scoping() {
    let dir = tempdir().unwrap();
    let first = write(&dir, "i1.abc", Engine::Ogawa, |a| {
        let obj = a.top().create_child("obj", MetaData::new()).unwrap();
        let p = obj.properties().create_compound("P", MetaData::new()).unwrap();
        int_scalar(&p, "x", 1);
    });
    let second = write(&dir, "i2.abc", Engine::Ogawa, |a| {
        let obj = a.top().create_child("obj", MetaData::new()).unwrap();
        let p = obj
            .properties()
            .create_compound("P", md(&[("replace", "1")]))
            .unwrap();
        int_scalar(&p, "y", 2);
    });
    let third = write(&dir, "i3.abc", Engine::Legacy, |a| {
        let obj = a.top().create_child("obj", MetaData::new()).unwrap();
        let p = obj.properties().create_compound("P", MetaData::new()).unwrap();
        int_scalar(&p, "z", 3);
    });

    assert_eq!(compound_names(&layered(&[first.clone(), second.clone()])), vec!["y"]);
    assert_eq!(compound_names(&layered(&[first, second, third])), vec!["y", "z"]);
}

#[test]
fn test_sparse_overlay_merges_properties() {
    let dir = tempdir().unwrap();
    let base = write(&dir, "base.abc", Engine::Ogawa, |a| {
        let obj = a
            .top()
            .create_child("mesh", md(&[("schema", "Mesh_v1"), ("owner", "base")]))
            .unwrap();
        let geo = obj
            .properties()
            .create_compound("geo", md(&[("schema", "Geo_v1")]))
            .unwrap();
        int_scalar(&geo, "count", 3);
        int_scalar(&geo, "kept", 7);
    });
    let overlay = write(&dir, "overlay.abc", Engine::Ogawa, |a| {
        let obj = a
            .top()
            .create_child("mesh", md(&[("owner", "overlay"), ("extra", "1")]))
            .unwrap();
        let geo = obj.properties().create_compound("geo", MetaData::new()).unwrap();
        int_scalar(&geo, "count", 4);
        int_scalar(&geo, "added", 9);
    });

    let archive = layered(&[base, overlay]);
    let mesh = archive.find_object("/mesh").unwrap().unwrap();
    // additive union: existing keys keep the first value
    assert_eq!(mesh.meta_data().get("owner"), "base");
    assert_eq!(mesh.meta_data().get("extra"), "1");
    assert!(mesh.matches_schema("Mesh_v1"));

    let props = mesh.properties().unwrap();
    assert_eq!(props.name(), "");
    assert_eq!(props.meta_data().get("owner"), "base");
    let geo = props.compound("geo").unwrap();
    assert_eq!(geo.meta_data().schema(), "Geo_v1");
    assert_eq!(geo.property_names(), vec!["count", "kept", "added"]);
    assert_eq!(geo.scalar("count").unwrap().get::<i32>(0usize).unwrap(), 4);
    assert_eq!(geo.scalar("kept").unwrap().get::<i32>(0usize).unwrap(), 7);

    // several contributors: no meaningful hash
    assert!(mesh.properties_hash().is_none());
    assert!(mesh.children_hash().is_none());
}

#[test]
fn test_object_replace_resets_metadata() {
    let dir = tempdir().unwrap();
    let base = write(&dir, "base.abc", Engine::Ogawa, |a| {
        let obj = a.top().create_child("obj", md(&[("old", "1")])).unwrap();
        obj.create_child("gone", MetaData::new()).unwrap();
    });
    let replacing = write(&dir, "replace.abc", Engine::Ogawa, |a| {
        let obj = a
            .top()
            .create_child("obj", md(&[("replace", "1"), ("new", "1")]))
            .unwrap();
        obj.create_child("fresh", MetaData::new()).unwrap();
    });
    let archive = layered(&[base, replacing]);
    let obj = archive.find_object("/obj").unwrap().unwrap();
    assert!(!obj.meta_data().contains("old"));
    assert_eq!(obj.meta_data().get("new"), "1");
    assert_eq!(child_names(&obj), vec!["fresh"]);
    // single contributor again
    assert!(obj.properties_hash().is_some());
}

#[test]
fn test_time_sampling_remap() {
    let dir = tempdir().unwrap();
    let fps24 = TimeSampling::uniform(1.0 / 24.0, 0.0).unwrap();
    let fps30 = TimeSampling::uniform(1.0 / 30.0, 0.0).unwrap();
    let first = write(&dir, "a.abc", Engine::Ogawa, |a| {
        let ts = a.add_time_sampling(fps24.clone());
        let mut p = a
            .top()
            .properties()
            .create_scalar("a", DataType::FLOAT32, MetaData::new(), ts)
            .unwrap();
        p.set(1.0f32).unwrap();
    });
    let second = write(&dir, "b.abc", Engine::Legacy, |a| {
        a.add_time_sampling(fps30.clone());
        let ts = a.add_time_sampling(fps24.clone());
        assert_eq!(ts, 2);
        let mut p = a
            .top()
            .properties()
            .create_scalar("b", DataType::FLOAT32, MetaData::new(), ts)
            .unwrap();
        for i in 0..6 {
            p.set(i as f32).unwrap();
        }
    });

    let archive = layered(&[first, second]);
    assert_eq!(archive.engine(), "layered");
    assert_eq!(archive.num_time_samplings(), 3);
    assert_eq!(*archive.time_sampling(1).unwrap(), fps24);
    assert_eq!(*archive.time_sampling(2).unwrap(), fps30);
    assert_eq!(archive.max_num_samples_for_time_sampling(1), Some(6));

    let props = archive.top().unwrap().properties().unwrap();
    let b = props.scalar("b").unwrap();
    assert_eq!(b.header().time_sampling_index, 1);
    assert_eq!(*b.time_sampling(), fps24);
    assert_eq!(b.num_samples(), 6);
    assert_eq!(props.scalar("a").unwrap().header().time_sampling_index, 1);
}

#[test]
fn test_type_override_and_strict_mode() {
    let dir = tempdir().unwrap();
    let scalar = write(&dir, "scalar.abc", Engine::Ogawa, |a| {
        int_scalar(&a.top().properties(), "x", 1);
    });
    let array = write(&dir, "array.abc", Engine::Ogawa, |a| {
        let mut p = a
            .top()
            .properties()
            .create_array("x", DataType::INT32, MetaData::new(), 0)
            .unwrap();
        p.set_typed(&[5i32, 6]).unwrap();
    });
    let paths = [scalar, array];

    let archive = layered(&paths);
    let x = archive.top().unwrap().properties().unwrap().array("x").unwrap();
    assert_eq!(x.get_typed::<i32>(0usize).unwrap(), vec![5, 6]);

    let strict =
        IArchive::open_layered(&paths, &ReadOptions::default(), LayerOptions::strict()).unwrap();
    assert!(matches!(
        strict.top().unwrap().properties(),
        Err(Error::LayerConflict { .. })
    ));
}

#[test]
fn test_archive_metadata_union() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.abc");
    let second = dir.path().join("second.abc");
    {
        let mut a = OArchive::create(&first, Engine::Ogawa).unwrap();
        a.set_app_name("first");
        a.close().unwrap();
        let mut b = OArchive::create(&second, Engine::Ogawa).unwrap();
        b.set_app_name("second");
        b.set_description("from second");
        b.close().unwrap();
    }
    let archive = layered(&[first, second]);
    assert_eq!(archive.app_name(), Some("first"));
    assert_eq!(archive.user_description(), Some("from second"));
}

#[test]
fn test_flatten_layered_archive() {
    let dir = tempdir().unwrap();
    let base = write(&dir, "base.abc", Engine::Ogawa, |a| {
        let keep = a.top().create_child("keep", MetaData::new()).unwrap();
        int_scalar(&keep.properties(), "v", 1);
        a.top().create_child("drop", MetaData::new()).unwrap();
    });
    let overlay = write(&dir, "overlay.abc", Engine::Ogawa, |a| {
        let keep = a.top().create_child("keep", MetaData::new()).unwrap();
        int_scalar(&keep.properties(), "v", 2);
        a.top().create_child("drop", md(&[("prune", "1")])).unwrap();
    });

    let flat: &Path = &dir.path().join("flat.abc");
    {
        let src = layered(&[base, overlay]);
        let mut dst = OArchive::create(flat, Engine::Legacy).unwrap();
        copy_archive(&src, &mut dst).unwrap();
        dst.close().unwrap();
    }
    let archive = IArchive::open(flat).unwrap();
    let top = archive.top().unwrap();
    assert_eq!(child_names(&top), vec!["keep"]);
    let v = top.child(0).unwrap().properties().unwrap().scalar("v").unwrap();
    assert_eq!(v.get::<i32>(0usize).unwrap(), 2);
    // flattened objects have one writer again
    assert!(top.child(0).unwrap().properties_hash().is_some());
}
