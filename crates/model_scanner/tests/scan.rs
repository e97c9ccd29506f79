//! Integration tests for scanning model folders into a catalog.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::Utc;
use database::Catalog;
use filetime::FileTime;
use model_structs::{CivitaiMerge, CivitaiMetadata, ModelType};
use model_scanner::{ScanConfig, ScanStats, scan};
use tempfile::TempDir;

const FILES: [(&str, &str); 6] = [
    ("checkpoints", "base.safetensors"),
    ("checkpoints", "sub/refiner.ckpt"),
    ("loras", "style.safetensors"),
    ("loras", "detail.pt"),
    ("embeddings", "negative.pt"),
    ("diffusion_models", "flux.bin"),
];

struct Fixture {
    models: TempDir,
    _db: TempDir,
    catalog: Catalog,
}

impl Fixture {
    async fn new() -> Self {
        let models = TempDir::new().expect("Failed to create models dir");
        for (folder, name) in FILES {
            write_model(&models.path().join(folder).join(name), name.as_bytes());
        }

        let db = TempDir::new().expect("Failed to create db dir");
        let catalog = Catalog::open(&db.path().join("catalog.sqlite"))
            .await
            .expect("Failed to open catalog");
        catalog.run_migrations().await.expect("Failed to migrate");

        Self {
            models,
            _db: db,
            catalog,
        }
    }

    fn config(&self, force: bool) -> ScanConfig {
        let extensions: BTreeSet<String> = ["ckpt", "safetensors", "pt", "bin"]
            .into_iter()
            .map(str::to_owned)
            .collect();

        ScanConfig {
            roots: ModelType::all()
                .map(|model_type| {
                    (
                        model_type,
                        vec![self.models.path().join(model_type.as_folder_name())],
                    )
                })
                .collect(),
            extensions: ModelType::all()
                .map(|model_type| (model_type, extensions.clone()))
                .collect(),
            force,
        }
    }

    async fn scan(&self) -> ScanStats {
        scan(&self.catalog, &self.config(false)).await.unwrap()
    }

    fn path(&self, folder: &str, name: &str) -> std::path::PathBuf {
        self.models.path().join(folder).join(name)
    }
}

fn write_model(path: &Path, contents: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
}

fn civitai_found() -> CivitaiMerge {
    CivitaiMerge::Found(CivitaiMetadata {
        name: Some("Civitai Style".to_owned()),
        trigger_words: Some("civstyle".to_owned()),
        model_id: Some(42),
        version_id: Some(4242),
        ..CivitaiMetadata::default()
    })
}

#[tokio::test]
async fn test_first_scan_groups_six_files_by_type() {
    let fixture = Fixture::new().await;
    let stats = fixture.scan().await;

    assert_eq!(stats.files_seen, 6);
    assert_eq!(stats.hashed, 6);
    assert_eq!(stats.errors, 0);

    let records = fixture.catalog.list_all().await.unwrap();
    assert_eq!(records.len(), 6);

    let mut per_type: BTreeMap<ModelType, usize> = BTreeMap::new();
    for record in &records {
        *per_type.entry(record.model_type).or_default() += 1;
        assert!(record.full_hash.is_none());
        assert!(record.civitai_checked_at.is_none());
    }
    assert_eq!(per_type[&ModelType::Checkpoint], 2);
    assert_eq!(per_type[&ModelType::Lora], 2);
    assert_eq!(per_type[&ModelType::Embedding], 1);
    assert_eq!(per_type[&ModelType::DiffusionModel], 1);

    let names: BTreeSet<&str> = records.iter().map(|record| record.name_local.as_str()).collect();
    assert!(names.contains("refiner"));
    assert!(names.contains("flux"));
}

#[tokio::test]
async fn test_rescan_without_changes_hashes_nothing() {
    let fixture = Fixture::new().await;
    fixture.scan().await;
    let before = fixture.catalog.list_all().await.unwrap();

    let stats = fixture.scan().await;
    assert_eq!(stats.hashed, 0);
    assert_eq!(stats.unchanged, 6);
    assert_eq!(stats.removed, 0);

    let after = fixture.catalog.list_all().await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_forced_rescan_hashes_everything() {
    let fixture = Fixture::new().await;
    fixture.scan().await;

    let stats = scan(&fixture.catalog, &fixture.config(true)).await.unwrap();
    assert_eq!(stats.hashed, 6);
    assert_eq!(stats.unchanged, 0);
}

#[tokio::test]
async fn test_civitai_fields_survive_rescans() {
    let fixture = Fixture::new().await;
    fixture.scan().await;

    let style = fixture
        .catalog
        .list_by_type(ModelType::Lora)
        .await
        .unwrap()
        .into_iter()
        .find(|record| record.name_local == "style")
        .unwrap();
    fixture
        .catalog
        .merge_civitai(&style.id, &civitai_found(), Utc::now())
        .await
        .unwrap();

    // Unchanged file.
    fixture.scan().await;
    let record = fixture.catalog.get(&style.id).await.unwrap().unwrap();
    assert_eq!(record.name_civitai.as_deref(), Some("Civitai Style"));

    // Modified file: rehashed, same identity, civitai data kept.
    let path = fixture.path("loras", "style.safetensors");
    fs::write(&path, b"retrained weights").unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(1_800_000_000, 0)).unwrap();

    let stats = fixture.scan().await;
    assert_eq!(stats.hashed, 1);
    let record = fixture.catalog.get(&style.id).await.unwrap().unwrap();
    assert_ne!(record.identification_hash, style.identification_hash);
    assert_eq!(record.trigger_civitai.as_deref(), Some("civstyle"));
    assert_eq!(record.civitai_model_id, Some(42));
}

#[tokio::test]
async fn test_deleted_and_renamed_files_are_reconciled() {
    let fixture = Fixture::new().await;
    fixture.scan().await;

    let detail = fixture
        .catalog
        .list_by_type(ModelType::Lora)
        .await
        .unwrap()
        .into_iter()
        .find(|record| record.name_local == "detail")
        .unwrap();
    fixture
        .catalog
        .merge_civitai(&detail.id, &civitai_found(), Utc::now())
        .await
        .unwrap();

    fs::remove_file(fixture.path("embeddings", "negative.pt")).unwrap();
    fs::rename(
        fixture.path("loras", "detail.pt"),
        fixture.path("loras", "detail_v2.pt"),
    )
    .unwrap();

    let stats = fixture.scan().await;
    assert_eq!(stats.removed, 2);
    assert_eq!(stats.hashed, 1);

    assert!(fixture.catalog.list_by_type(ModelType::Embedding).await.unwrap().is_empty());
    assert!(fixture.catalog.get(&detail.id).await.unwrap().is_none());

    let renamed = fixture
        .catalog
        .list_by_type(ModelType::Lora)
        .await
        .unwrap()
        .into_iter()
        .find(|record| record.name_local == "detail_v2")
        .unwrap();
    assert_ne!(renamed.id, detail.id);
    assert!(renamed.name_civitai.is_none());
}

#[tokio::test]
async fn test_missing_folder_yields_no_records() {
    let fixture = Fixture::new().await;
    fs::remove_dir_all(fixture.models.path().join("diffusion_models")).unwrap();

    let stats = fixture.scan().await;
    assert_eq!(stats.files_seen, 5);
    assert_eq!(stats.errors, 0);
    assert!(
        fixture
            .catalog
            .list_by_type(ModelType::DiffusionModel)
            .await
            .unwrap()
            .is_empty()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_loop_terminates() {
    let fixture = Fixture::new().await;
    let loras = fixture.models.path().join("loras");
    std::os::unix::fs::symlink(&loras, loras.join("loop")).unwrap();

    let stats = fixture.scan().await;
    assert_eq!(stats.files_seen, 6);
    assert_eq!(fixture.catalog.list_by_type(ModelType::Lora).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_second_root_cannot_claim_the_same_relative_path() {
    let fixture = Fixture::new().await;
    let first = fixture.models.path().join("loras_a");
    let second = fixture.models.path().join("loras_b");
    write_model(&first.join("x.safetensors"), b"first copy");
    write_model(&second.join("x.safetensors"), b"second copy");

    let config = ScanConfig {
        roots: BTreeMap::from([(ModelType::Lora, vec![first.clone(), second])]),
        extensions: BTreeMap::from([(
            ModelType::Lora,
            BTreeSet::from(["safetensors".to_owned()]),
        )]),
        force: false,
    };

    let stats = scan(&fixture.catalog, &config).await.unwrap();
    assert_eq!(stats.hashed, 1);
    assert_eq!(stats.errors, 1);
    let catalogued = fixture.catalog.list_by_type(ModelType::Lora).await.unwrap();

    for _ in 0..2 {
        let stats = scan(&fixture.catalog, &config).await.unwrap();
        assert_eq!(stats.hashed, 0);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.removed, 0);
        assert_eq!(
            fixture.catalog.list_by_type(ModelType::Lora).await.unwrap(),
            catalogued
        );
    }

    assert_eq!(catalogued.len(), 1);
    assert!(Path::new(&catalogued[0].path).starts_with(&first));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_folder_keeps_its_records_and_siblings_scan() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new().await;
    fixture.scan().await;

    let locked = fixture.models.path().join("checkpoints").join("sub");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Permission bits do not apply to this user (root).
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let sibling = fixture.path("checkpoints", "base.safetensors");
    write_model(&sibling, b"base, retrained");
    filetime::set_file_mtime(&sibling, FileTime::from_unix_time(1_800_000_000, 0)).unwrap();

    let stats = fixture.scan().await;
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(stats.errors > 0);
    assert_eq!(stats.files_seen, 5);
    assert_eq!(stats.hashed, 1);
    assert_eq!(stats.removed, 0);

    let checkpoints = fixture.catalog.list_by_type(ModelType::Checkpoint).await.unwrap();
    assert_eq!(checkpoints.len(), 2);
    assert!(checkpoints.iter().any(|record| record.name_local == "refiner"));
}
