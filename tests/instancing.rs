//! Instance creation, resolution and cycle rejection.

use alembic_core::abc::INSTANCE_SOURCE;
use alembic_core::prelude::*;
use tempfile::tempdir;

const ENGINES: [Engine; 2] = [Engine::Ogawa, Engine::Legacy];

#[test]
fn test_instance_resolves_to_target() {
    for engine in ENGINES {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inst.abc");
        {
            let archive = OArchive::create(&path, engine).unwrap();
            let top = archive.top();
            let source = top.create_child("source", MetaData::new()).unwrap();
            let mut p = source
                .properties()
                .create_scalar("value", DataType::INT32, MetaData::new(), 0)
                .unwrap();
            p.set(42i32).unwrap();
            source.create_child("part", MetaData::new()).unwrap();

            let group = top.create_child("group", MetaData::new()).unwrap();
            group.add_child_instance(&source, "copy").unwrap();
            assert!(matches!(
                group.add_child_instance_at("/nowhere", "dangling"),
                Err(Error::ObjectNotFound(_))
            ));
            assert!(matches!(
                group.add_child_instance(&source, "copy"),
                Err(Error::DuplicateName { .. })
            ));
            archive.close().unwrap();
        }

        let archive = IArchive::open(&path).unwrap();
        let group = archive.find_object("/group").unwrap().unwrap();
        assert!(group.is_child_instance(0));
        let copy = group.child_by_name("copy").unwrap();
        assert!(copy.is_instance_root());
        assert!(copy.is_instance_descendant());
        assert_eq!(copy.instance_source_path(), Some("/source"));
        assert_eq!(copy.full_name(), "/group/copy");
        let value = copy.properties().unwrap().scalar("value").unwrap();
        assert_eq!(value.get::<i32>(0usize).unwrap(), 42);

        let part = copy.child_by_name("part").unwrap();
        assert_eq!(part.full_name(), "/group/copy/part");
        assert!(part.is_instance_descendant());
        assert!(!part.is_instance_root());

        let source = archive.find_object("/source").unwrap().unwrap();
        assert!(!source.is_instance_descendant());
        let via_path = archive.find_object("/group/copy/part").unwrap().unwrap();
        assert!(via_path.is_instance_descendant());
    }
}

#[test]
fn test_cyclic_instances_rejected() {
    for engine in ENGINES {
        let dir = tempdir().unwrap();
        let archive = OArchive::create(dir.path().join("cycle.abc"), engine).unwrap();
        let top = archive.top();
        let a = top.create_child("a", MetaData::new()).unwrap();
        let b = a.create_child("b", MetaData::new()).unwrap();
        let c = top.create_child("c", MetaData::new()).unwrap();

        // self
        assert!(matches!(
            a.add_child_instance(&a, "loop"),
            Err(Error::CyclicInstance { .. })
        ));
        // ancestor
        assert!(matches!(
            b.add_child_instance(&a, "loop"),
            Err(Error::CyclicInstance { .. })
        ));
        assert!(matches!(
            b.add_child_instance(&top, "loop"),
            Err(Error::CyclicInstance { .. })
        ));

        // chain: /c/to_a -> /a, then /a/b/to_c -> /c would reach /a/b again
        c.add_child_instance(&a, "to_a").unwrap();
        assert!(matches!(
            b.add_child_instance(&c, "to_c"),
            Err(Error::CyclicInstance { .. })
        ));
        // an unrelated sibling target is fine
        let d = top.create_child("d", MetaData::new()).unwrap();
        b.add_child_instance(&d, "to_d").unwrap();
        archive.close().unwrap();
    }
}

#[test]
fn test_hand_written_cycle_fails_on_read() {
    for engine in ENGINES {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manual.abc");
        {
            let archive = OArchive::create(&path, engine).unwrap();
            let a = archive.top().create_child("a", MetaData::new()).unwrap();
            let fake = a.create_child("loop", MetaData::new()).unwrap();
            let mut src = fake
                .properties()
                .create_scalar(INSTANCE_SOURCE, DataType::STRING, MetaData::new(), 0)
                .unwrap();
            src.set_string("/a").unwrap();
            archive.close().unwrap();
        }
        let archive = IArchive::open(&path).unwrap();
        let a = archive.find_object("/a").unwrap().unwrap();
        assert!(matches!(a.child(0), Err(Error::CyclicInstance { .. })));
        assert!(a.child_by_name("loop").is_none());
    }
}

/// Hand-write an `.instanceSource` on a fresh child of `parent`.
fn write_link(parent: &OObject, name: &str, target: &str) {
    let link = parent.create_child(name, MetaData::new()).unwrap();
    let mut src = link
        .properties()
        .create_scalar(INSTANCE_SOURCE, DataType::STRING, MetaData::new(), 0)
        .unwrap();
    src.set_string(target).unwrap();
}

#[test]
fn test_instance_of_instance_resolves_to_final_target() {
    for engine in ENGINES {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.abc");
        {
            let archive = OArchive::create(&path, engine).unwrap();
            let top = archive.top();
            let src = top.create_child("src", MetaData::new()).unwrap();
            let mut p = src
                .properties()
                .create_scalar("value", DataType::INT32, MetaData::new(), 0)
                .unwrap();
            p.set(42i32).unwrap();
            src.create_child("kid", MetaData::new()).unwrap();
            top.add_child_instance(&src, "a").unwrap();
            top.add_child_instance_at("/a", "b").unwrap();
            archive.close().unwrap();
        }

        let archive = IArchive::open(&path).unwrap();
        let b = archive.find_object("/b").unwrap().unwrap();
        assert_eq!(b.instance_source_path(), Some("/a"));
        assert_eq!(b.reader().header().full_name, "/src");
        let value = b.properties().unwrap().scalar("value").unwrap();
        assert_eq!(value.get::<i32>(0usize).unwrap(), 42);
        assert_eq!(b.num_children(), 1);
        let kid = archive.find_object("/b/kid").unwrap().unwrap();
        assert_eq!(kid.full_name(), "/b/kid");
        assert!(kid.is_instance_descendant());
    }
}

#[test]
fn test_multi_hop_cycle_fails_on_read() {
    for engine in ENGINES {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hops.abc");
        {
            let archive = OArchive::create(&path, engine).unwrap();
            let top = archive.top();
            let a = top.create_child("a", MetaData::new()).unwrap();
            let b = top.create_child("b", MetaData::new()).unwrap();
            write_link(&a, "x", "/b");
            write_link(&b, "y", "/a");
            write_link(&top, "p", "/q");
            write_link(&top, "q", "/p");
            archive.close().unwrap();
        }

        let archive = IArchive::open(&path).unwrap();
        let x = archive.find_object("/a/x").unwrap().unwrap();
        assert_eq!(x.instance_source_path(), Some("/b"));
        assert!(matches!(x.child(0), Err(Error::CyclicInstance { .. })));
        let y = archive.find_object("/b/y").unwrap().unwrap();
        assert!(matches!(y.child(0), Err(Error::CyclicInstance { .. })));

        let top = archive.top().unwrap();
        assert!(matches!(
            top.try_child_by_name("p"),
            Err(Error::CyclicInstance { .. })
        ));
        assert!(archive.find_object("/q").is_err());
    }
}

#[test]
fn test_copy_preserves_instances() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("src.abc");
    let dst_path = dir.path().join("dst.abc");
    {
        let archive = OArchive::create(&src_path, Engine::Ogawa).unwrap();
        let source = archive.top().create_child("source", MetaData::new()).unwrap();
        archive.top().add_child_instance(&source, "inst").unwrap();
        archive.close().unwrap();
    }
    {
        let src = IArchive::open(&src_path).unwrap();
        let mut dst = OArchive::create(&dst_path, Engine::Legacy).unwrap();
        copy_archive(&src, &mut dst).unwrap();
        dst.close().unwrap();
    }
    let archive = IArchive::open(&dst_path).unwrap();
    let inst = archive.find_object("/inst").unwrap().unwrap();
    assert_eq!(inst.instance_source_path(), Some("/source"));
}
