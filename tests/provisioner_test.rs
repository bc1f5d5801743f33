use std::fs;
use std::time::Duration;

use tempfile::TempDir;
use woundsight::{ModelProvisioner, ModelSource, ProvisionError, ProvisionState};

fn unreachable_source(min_bytes: u64) -> ModelSource {
    ModelSource {
        name: "network.onnx".to_string(),
        url: "http://127.0.0.1:1/model.onnx".to_string(),
        tokenizer_url: None,
        min_bytes,
    }
}

#[tokio::test]
async fn test_truncated_download_is_deleted_and_surfaced() {
    let dir = TempDir::new().unwrap();
    let provisioner = ModelProvisioner::new(dir.path(), Duration::from_millis(200)).unwrap();
    let source = unreachable_source(1024);

    // Simulate a prior run that left a 500-byte artifact behind.
    let model_path = provisioner.model_path(&source);
    fs::write(&model_path, vec![0u8; 500]).unwrap();

    // The provisioner must treat it as corrupt, delete it, and (with the
    // remote unreachable) raise a download error rather than proceed with a
    // truncated model.
    let result = provisioner.ensure(&source).await;
    assert!(result.is_err());
    assert!(!model_path.exists());
    assert_eq!(provisioner.state(), ProvisionState::Uninitialized);
}

#[tokio::test]
async fn test_valid_artifact_short_circuits_network() {
    let dir = TempDir::new().unwrap();
    let provisioner = ModelProvisioner::new(dir.path(), Duration::from_millis(200)).unwrap();
    let source = unreachable_source(64);

    fs::write(provisioner.model_path(&source), vec![0u8; 4096]).unwrap();

    // The URL is unreachable, so success proves no fetch was attempted.
    let path = provisioner.ensure(&source).await.unwrap();
    assert!(path.exists());
    assert_eq!(provisioner.state(), ProvisionState::Ready);

    // Repeat calls are a Ready -> Ready no-op.
    provisioner.ensure(&source).await.unwrap();
    assert_eq!(provisioner.state(), ProvisionState::Ready);
}

#[tokio::test]
async fn test_failed_fetch_leaves_clean_directory() {
    let dir = TempDir::new().unwrap();
    let provisioner = ModelProvisioner::new(dir.path(), Duration::from_millis(200)).unwrap();
    let source = unreachable_source(1024);

    let err = provisioner.ensure(&source).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Download(_) | ProvisionError::HttpStatus(_)));

    let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert!(entries.is_empty(), "no partial files may remain: {:?}", entries);
}

#[test]
fn test_remove_resets_the_machine() {
    let dir = TempDir::new().unwrap();
    let provisioner = ModelProvisioner::new(dir.path(), Duration::from_millis(200)).unwrap();
    let source = unreachable_source(64);

    fs::write(provisioner.model_path(&source), vec![0u8; 256]).unwrap();
    assert!(provisioner.is_provisioned(&source));

    provisioner.remove(&source).unwrap();
    assert!(!provisioner.is_provisioned(&source));
    assert_eq!(provisioner.state(), ProvisionState::Uninitialized);
}

#[tokio::test]
async fn test_encoder_pair_requires_tokenizer() {
    let dir = TempDir::new().unwrap();
    let provisioner = ModelProvisioner::new(dir.path(), Duration::from_millis(200)).unwrap();
    let source = ModelSource {
        name: "encoder.onnx".to_string(),
        url: "http://127.0.0.1:1/encoder.onnx".to_string(),
        tokenizer_url: Some("http://127.0.0.1:1/tokenizer.json".to_string()),
        min_bytes: 64,
    };

    // Model present but tokenizer missing: not provisioned, and the fetch of
    // the tokenizer fails against the unreachable remote.
    fs::write(provisioner.model_path(&source), vec![0u8; 256]).unwrap();
    assert!(!provisioner.is_provisioned(&source));
    assert!(provisioner.ensure(&source).await.is_err());
}
