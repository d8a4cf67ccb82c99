//! Loading from directories and packed archives on disk

mod common;

use assetry::populate::{Asset, Schema};
use assetry::vfs::{self, packed};
use assetry::{AssetContext, LoadError, Loader};
use pretty_assertions::assert_eq;

#[derive(Debug, Default, PartialEq)]
struct Unit {
    hp: i32,
    speed: f32,
    armor: u32,
}

impl Asset for Unit {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new("Unit")
            .field("hp", |u| &u.hp, |u| &mut u.hp)
            .field("speed", |u| &u.speed, |u| &mut u.speed)
            .field("armor", |u| &u.armor, |u| &mut u.armor)
    }
}

async fn open(dir: &tempfile::TempDir) -> Loader {
    let cx = AssetContext::new().unwrap();
    Loader::open(cx, dir.path().to_string_lossy()).await.unwrap()
}

#[tokio::test]
async fn base_values_are_overridden() {
    common::init_tracing();
    let dir = common::assets();
    let loader = open(&dir).await;

    let unit = loader.resolve("unit").await.unwrap();
    assert!(unit.issues.is_empty(), "{:?}", unit.issues);
    insta::assert_json_snapshot!(unit.document, @r###"
    {
      "hp": 80,
      "speed": 5
    }
    "###);
}

#[tokio::test]
async fn bases_are_found_anywhere_in_the_tree() {
    common::init_tracing();
    let dir = common::assets();
    let loader = open(&dir).await;

    let mammoth = loader.resolve("units\\heavy\\mammoth").await.unwrap();
    assert!(mammoth.issues.is_empty(), "{:?}", mammoth.issues);
    insta::assert_json_snapshot!(mammoth.document, @r###"
    {
      "hp": 400,
      "speed": 5,
      "armor": 3
    }
    "###);

    let (tank, issues) = loader.load_asset::<Unit>("tank.hcl").await.unwrap();
    assert!(issues.is_empty(), "{issues:?}");
    assert_eq!(
        tank,
        Unit {
            hp: 80,
            speed: 5.0,
            armor: 3
        }
    );
}

#[tokio::test]
async fn search_is_depth_first() {
    common::init_tracing();
    let dir = common::assets();
    let loader = open(&dir).await;

    let names: Vec<_> = loader
        .files()
        .await
        .unwrap()
        .iter()
        .map(|file| file.name().to_string())
        .collect();
    assert_eq!(
        names,
        [
            "unit-base.hcl",
            "unit.hcl",
            "grass.png",
            "tank.hcl",
            "mammoth.hcl"
        ]
    );

    let folders: Vec<_> = loader
        .folders()
        .await
        .unwrap()
        .iter()
        .map(|folder| folder.name().to_string())
        .collect();
    assert_eq!(folders, ["textures", "units", "heavy"]);

    assert_eq!(loader.find_files("*.hcl").await.unwrap().len(), 4);
    assert!(matches!(
        loader.find_files("[").await,
        Err(LoadError::Pattern(_))
    ));

    let slash = loader
        .absolute_file("units/heavy/mammoth.hcl")
        .await
        .unwrap()
        .unwrap();
    let backslash = loader
        .absolute_file("units\\heavy\\mammoth.hcl")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slash.full_name(), backslash.full_name());

    // the full os path works as well
    let full = loader
        .absolute_folder(&dir.path().join("units").to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(full.name(), "units");
    assert!(loader.absolute_file("units/mammoth.hcl").await.unwrap().is_none());
}

#[tokio::test]
async fn writes_are_seen_by_the_next_resolve() {
    common::init_tracing();
    let dir = common::assets();
    let loader = open(&dir).await;

    let base = loader.find_file("unit-base.hcl").await.unwrap().unwrap();
    assert!(vfs::write_text(base.as_ref(), "hp = 100\nspeed = 1\nregen = 2\n").await);

    let unit = loader.resolve("unit").await.unwrap();
    insta::assert_json_snapshot!(unit.document, @r###"
    {
      "hp": 80,
      "speed": 5,
      "regen": 2
    }
    "###);
}

#[tokio::test]
async fn unusable_locations() {
    common::init_tracing();
    let dir = common::assets();
    let cx = AssetContext::new().unwrap();

    assert!(matches!(
        Loader::new(cx.clone(), "  "),
        Err(LoadError::BlankLocation)
    ));
    assert!(matches!(
        Loader::open(cx.clone(), "definitely/not/here").await,
        Err(LoadError::UnsupportedLocation(_))
    ));
    assert!(matches!(
        Loader::open(cx.clone(), "netcode").await,
        Err(LoadError::NoMessenger(_))
    ));
    assert!(matches!(
        Loader::open(cx.clone(), "missing.bin").await,
        Err(LoadError::Pack { .. })
    ));

    let loader = Loader::new(cx, dir.path().to_string_lossy()).unwrap();
    assert!(!loader.is_loaded());
    assert!(matches!(loader.files().await, Err(LoadError::NotLoaded(_))));
    assert!(matches!(loader.resolve("unit").await, Err(LoadError::NotLoaded(_))));

    loader.load_async().await.unwrap();
    assert!(loader.is_loaded());
    assert!(matches!(
        loader.resolve("nothing").await,
        Err(LoadError::DocumentNotFound(name)) if name == "nothing.hcl"
    ));
}

#[tokio::test]
async fn broken_documents_are_errors_broken_bases_are_issues() {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    common::write_tree(
        dir.path(),
        &[
            ("broken.hcl", "hp = = 1"),
            ("orphan.hcl", "Base = \"gone\"\nhp = 1"),
        ],
    );
    let loader = open(&dir).await;

    assert!(matches!(
        loader.resolve("broken").await,
        Err(LoadError::Document(_))
    ));

    let orphan = loader.resolve("orphan").await.unwrap();
    assert_eq!(orphan.issues.len(), 1);
    assert_eq!(orphan.document.get("Base").and_then(|b| b.as_str()), Some("gone"));
}

#[tokio::test]
async fn packed_archive_on_disk() {
    common::init_tracing();
    let dir = common::assets();
    let loader = open(&dir).await;
    let archive = packed::pack(loader.root().unwrap().as_ref()).await.unwrap();

    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("assets.bin");
    std::fs::write(&path, archive).unwrap();

    let cx = AssetContext::new().unwrap();
    let packed = Loader::open(cx, path.to_string_lossy()).await.unwrap();
    assert_eq!(packed.files().await.unwrap().len(), 5);

    let unit = packed.resolve("unit").await.unwrap();
    assert_eq!(unit.document, loader.resolve("unit").await.unwrap().document);

    // archives are read-only
    let file = packed.find_file("unit.hcl").await.unwrap().unwrap();
    assert!(!vfs::write_text(file.as_ref(), "hp = 1").await);
}

/// Runs on a plain thread, the context starts its own runtime
#[test]
fn blocking_api() {
    common::init_tracing();
    let dir = common::assets();
    let cx = AssetContext::new().unwrap();
    let loader = Loader::new(cx, dir.path().to_string_lossy()).unwrap();
    let blocking = loader.blocking();

    assert!(matches!(blocking.files(), Err(LoadError::NotLoaded(_))));
    blocking.load().unwrap();
    assert!(loader.is_loaded());

    let walked: Vec<_> = blocking
        .walk_files()
        .unwrap()
        .map(|file| file.name().to_string())
        .collect();
    assert_eq!(walked.len(), 5);
    assert_eq!(walked[0], "unit-base.hcl");

    // walks are lazy, stopping early is fine
    let first = blocking.walk_files().unwrap().next().unwrap();
    assert_eq!(first.name(), "unit-base.hcl");

    let grass = blocking.find_file("grass.png").unwrap().unwrap();
    assert_eq!(
        blocking.bytes(grass).unwrap(),
        bytes::Bytes::from("not really a png")
    );
    assert_eq!(blocking.find_files("*.png").unwrap().len(), 1);
    assert!(blocking.absolute_folder("units/heavy").unwrap().is_some());

    let unit = blocking.resolve("unit").unwrap();
    assert_eq!(unit.document.get("hp"), Some(&assetry::value::Value::from(80i64)));

    let (unit, issues) = blocking.load_asset::<Unit>("unit").unwrap();
    assert!(issues.is_empty(), "{issues:?}");
    assert_eq!(unit.speed, 5.0);
}

/// The test runtime is the context runtime, waiting on it could never finish
#[tokio::test]
async fn blocking_inside_the_context_runtime_fails_fast() {
    common::init_tracing();
    let dir = common::assets();
    let cx = AssetContext::new().unwrap();
    let loader = Loader::new(cx, dir.path().to_string_lossy()).unwrap();

    assert!(matches!(loader.load(), Err(LoadError::NotSupported(_))));
    loader.load_async().await.unwrap();
    assert!(matches!(
        loader.blocking().files(),
        Err(LoadError::NotSupported(_))
    ));
    assert_eq!(loader.files().await.unwrap().len(), 5);
}
