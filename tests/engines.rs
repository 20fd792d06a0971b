//! Engine sniffing, open failures and cross-engine conversion.

use std::io::Write;

use alembic_core::legacy::LEGACY_MAGIC;
use alembic_core::ogawa::OGAWA_MAGIC;
use alembic_core::prelude::*;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_sniff_both_engines() {
    let dir = tempdir().unwrap();
    for engine in [Engine::Ogawa, Engine::Legacy] {
        let path = dir.path().join(format!("{engine}.abc"));
        OArchive::create(&path, engine).unwrap().close().unwrap();
        assert_eq!(Engine::sniff(&path).unwrap(), engine);
        let head = std::fs::read(&path).unwrap();
        let magic: &[u8] = match engine {
            Engine::Ogawa => OGAWA_MAGIC,
            Engine::Legacy => LEGACY_MAGIC,
        };
        assert!(head.starts_with(magic));
    }
}

#[test]
fn test_open_garbage_fails() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"definitely not an archive").unwrap();
    file.flush().unwrap();
    match IArchive::open(file.path()) {
        Err(Error::ArchiveOpenFailed { engine, path, .. }) => {
            assert_eq!(engine, "auto");
            assert_eq!(path, file.path());
        }
        other => panic!("expected ArchiveOpenFailed, got {:?}", other.err()),
    }
}

#[test]
fn test_open_missing_file_fails() {
    let dir = tempdir().unwrap();
    let err = IArchive::open(dir.path().join("missing.abc")).unwrap_err();
    assert!(matches!(err, Error::ArchiveOpenFailed { .. }));
}

#[test]
fn test_open_corrupt_legacy_fails() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(LEGACY_MAGIC).unwrap();
    file.write_all(b"{ not json").unwrap();
    file.flush().unwrap();
    match IArchive::open(file.path()) {
        Err(Error::ArchiveOpenFailed { engine, .. }) => assert_eq!(engine, "legacy"),
        other => panic!("expected ArchiveOpenFailed, got {:?}", other.err()),
    }
}

#[test]
fn test_unclosed_ogawa_archive_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("open.abc");
    let archive = OArchive::create(&path, Engine::Ogawa).unwrap();
    match IArchive::open(&path) {
        Err(Error::ArchiveOpenFailed { engine, .. }) => assert_eq!(engine, "ogawa"),
        other => panic!("expected ArchiveOpenFailed, got {:?}", other.err()),
    }
    archive.close().unwrap();
    assert!(IArchive::open(&path).is_ok());
}

fn read_u64_at(bytes: &[u8], pos: usize) -> u64 {
    u64::from_le_bytes(bytes[pos..pos + 8].try_into().unwrap())
}

#[test]
fn test_corrupt_block_size_fails_cleanly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.abc");
    let mut archive = OArchive::create(&path, Engine::Ogawa).unwrap();
    archive.set_app_name("corrupt-size");
    archive.close().unwrap();

    // root group -> child 3 (archive metadata) -> its size word
    let mut bytes = std::fs::read(&path).unwrap();
    let root = read_u64_at(&bytes, 8) as usize;
    let metadata = read_u64_at(&bytes, root + 8 + 3 * 8) & !(1u64 << 63);
    assert_ne!(metadata, 0);
    let at = metadata as usize;
    bytes[at..at + 8].copy_from_slice(&(u64::MAX - 64).to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    for mmap in [true, false] {
        let options = ReadOptions {
            mmap,
            ..ReadOptions::default()
        };
        assert!(IArchive::open_with(&path, &options).is_err());
    }
}

#[test]
fn test_buffered_reads_match_mmap() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("buffered.abc");
    {
        let archive = OArchive::create(&path, Engine::Ogawa).unwrap();
        let mut p = archive
            .top()
            .properties()
            .create_array("P", DataType::VEC3F, MetaData::new(), 0)
            .unwrap();
        p.set_typed(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        archive.close().unwrap();
    }
    for mmap in [false, true] {
        let options = ReadOptions {
            mmap,
            cache_bytes: 0,
        };
        let archive = IArchive::open_with(&path, &options).unwrap();
        let p = archive.top().unwrap().properties().unwrap().array("P").unwrap();
        assert_eq!(
            p.get_typed::<f32>(0usize).unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }
}

#[test]
fn test_convert_between_engines() {
    let dir = tempdir().unwrap();
    let src_path = dir.path().join("src.abc");
    let ts = TimeSampling::cyclic(1.0, vec![0.0, 0.25]).unwrap();
    {
        let mut archive = OArchive::create(&src_path, Engine::Ogawa).unwrap();
        archive.set_app_name("converter test");
        let index = archive.add_time_sampling(ts.clone());
        let obj = archive
            .top()
            .create_child("obj", [("schema", "Thing_v1")].into_iter().collect())
            .unwrap();
        let props = obj.properties();
        let mut constant = props
            .create_array("P", DataType::VEC3F, MetaData::new(), index)
            .unwrap();
        let mut animated = props
            .create_scalar("t", DataType::FLOAT64, MetaData::new(), index)
            .unwrap();
        for i in 0..4 {
            constant.set_typed(&[0.0f32, 1.0, 2.0]).unwrap();
            animated.set(i as f64).unwrap();
        }
        let nested = props.create_compound("user", MetaData::new()).unwrap();
        let mut label = nested
            .create_scalar("label", DataType::STRING, MetaData::new(), 0)
            .unwrap();
        label.set_string("hello").unwrap();
        obj.create_child("child", MetaData::new()).unwrap();
        archive.close().unwrap();
    }

    for engine in [Engine::Legacy, Engine::Ogawa] {
        let dst_path = dir.path().join(format!("dst-{engine}.abc"));
        {
            let src = IArchive::open(&src_path).unwrap();
            let mut dst = OArchive::create(&dst_path, engine).unwrap();
            copy_archive(&src, &mut dst).unwrap();
            dst.close().unwrap();
        }

        let archive = IArchive::open(&dst_path).unwrap();
        assert_eq!(archive.engine(), engine.name());
        assert_eq!(archive.app_name(), Some("converter test"));
        assert_eq!(*archive.time_sampling(1).unwrap(), ts);

        let obj = archive.find_object("/obj").unwrap().unwrap();
        assert!(obj.matches_schema("Thing_v1"));
        assert!(obj.child_by_name("child").is_some());
        let props = obj.properties().unwrap();
        assert_eq!(props.property_names(), vec!["P", "t", "user"]);

        let p = props.array("P").unwrap();
        assert_eq!(p.num_samples(), 4);
        assert!(p.is_constant());
        assert_eq!(p.header().time_sampling_index, 1);

        let t = props.scalar("t").unwrap();
        assert!(!t.is_constant());
        assert_eq!(t.get::<f64>(3usize).unwrap(), 3.0);
        // cyclic: index 3 sits at 1.25
        assert_eq!(t.get::<f64>(SampleSelector::TimeFloor(1.3)).unwrap(), 3.0);

        let label = props.compound("user").unwrap().scalar("label").unwrap();
        assert_eq!(label.get_string(0usize).unwrap(), "hello");
    }
}
