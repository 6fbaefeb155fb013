//! Unit tests for artefact download and unpacking.

use super::*;
use crate::archive::MockArchiveCodec;
use crate::dependency::SourceIdentity;
use crate::error::ErrorKind;
use crate::transport::MockTransport;
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn scratch() -> TempDir {
    TempDir::new().expect("temp dir creation succeeds")
}

fn asset(name: &str) -> ResolvedAsset {
    ResolvedAsset {
        download_url: format!("https://dl.example.test/{name}"),
        display_name: name.to_owned(),
        source: SourceIdentity::repository("XorTroll/emuiibo").expect("repo"),
    }
}

fn downloading(payload: &'static [u8]) -> MockTransport {
    let mut transport = MockTransport::new();
    transport.expect_download().times(1).returning(move |_, dest| {
        std::fs::write(dest, payload).map_err(|e| BundleError::io("write", e))?;
        Ok(payload.len() as u64)
    });
    transport
}

/// A codec whose extraction writes the given files into the destination.
fn unpacking(files: &'static [(&'static str, &'static [u8])]) -> MockArchiveCodec {
    let mut codec = MockArchiveCodec::new();
    codec.expect_extract_all().times(1).returning(move |_, dest| {
        let mut written = Vec::new();
        for (name, contents) in files {
            let path = dest.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| BundleError::io("mkdir", e))?;
            }
            std::fs::write(&path, contents).map_err(|e| BundleError::io("write", e))?;
            written.push(PathBuf::from(name));
        }
        Ok(written)
    });
    codec
}

#[rstest]
fn plain_download_is_the_artefact(scratch: TempDir) {
    let transport = downloading(b"nro payload");
    let mut codec = MockArchiveCodec::new();
    codec.expect_extract_all().never();
    let fetcher = ArtifactFetcher::new(&transport, &codec);

    let artefact = fetcher
        .fetch(&asset("emuiibo.nro"), &Extraction::None, scratch.path())
        .expect("fetch succeeds");

    assert!(!artefact.is_archive);
    assert_eq!(artefact.local_path, scratch.path().join("emuiibo.nro"));
    assert_eq!(
        std::fs::read(&artefact.local_path).expect("read"),
        b"nro payload"
    );
}

#[rstest]
fn find_extraction_returns_nested_match(scratch: TempDir) {
    let transport = downloading(b"zip bytes");
    let codec = unpacking(&[
        ("README.md", b"docs"),
        ("SdOut/switch/emuiibo/companion.nro", b"embedded"),
    ]);
    let fetcher = ArtifactFetcher::new(&transport, &codec);

    let artefact = fetcher
        .fetch(
            &asset("companion.zip"),
            &Extraction::Find(NameRule::suffix(".nro")),
            scratch.path(),
        )
        .expect("fetch succeeds");

    assert!(artefact.is_archive);
    assert!(artefact.local_path.ends_with("SdOut/switch/emuiibo/companion.nro"));
    assert!(artefact.local_path.starts_with(scratch.path()));
}

#[rstest]
fn tree_extraction_returns_unpack_root(scratch: TempDir) {
    let transport = downloading(b"zip bytes");
    let codec = unpacking(&[("atmosphere/exefs_patches/es_patches/a.ips", b"ips")]);
    let fetcher = ArtifactFetcher::new(&transport, &codec);

    let artefact = fetcher
        .fetch(&asset("patches.zip"), &Extraction::Tree, scratch.path())
        .expect("fetch succeeds");

    assert!(artefact.is_archive);
    assert!(artefact.local_path.is_dir());
    assert!(
        artefact
            .local_path
            .join("atmosphere/exefs_patches/es_patches/a.ips")
            .is_file()
    );
}

#[rstest]
fn missing_target_after_unpacking_is_reported(scratch: TempDir) {
    let transport = downloading(b"zip bytes");
    let codec = unpacking(&[("README.md", b"docs")]);
    let fetcher = ArtifactFetcher::new(&transport, &codec);

    let err = fetcher
        .fetch(
            &asset("atmosphere.zip"),
            &Extraction::Find(NameRule::exact("fusee.bin")),
            scratch.path(),
        )
        .expect_err("no fusee.bin");

    assert_eq!(err.kind(), ErrorKind::AssetNotFoundInArchive);
    assert!(err.to_string().contains("atmosphere.zip"));
}

#[rstest]
fn download_failure_is_propagated(scratch: TempDir) {
    let mut transport = MockTransport::new();
    transport.expect_download().returning(|url, _| {
        Err(BundleError::Transport {
            url: url.to_string(),
            reason: "connection reset".to_owned(),
        })
    });
    let codec = MockArchiveCodec::new();
    let fetcher = ArtifactFetcher::new(&transport, &codec);

    let err = fetcher
        .fetch(&asset("emuiibo.nro"), &Extraction::None, scratch.path())
        .expect_err("transport fails");

    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[rstest]
#[case::traversal("../evil.nro")]
#[case::nested("dir/evil.nro")]
#[case::windows("dir\\evil.nro")]
#[case::dot_dot("..")]
#[case::empty("")]
fn unsafe_asset_names_are_rejected(scratch: TempDir, #[case] name: &str) {
    let mut transport = MockTransport::new();
    transport.expect_download().never();
    let codec = MockArchiveCodec::new();
    let fetcher = ArtifactFetcher::new(&transport, &codec);

    let err = fetcher
        .fetch(&asset(name), &Extraction::None, scratch.path())
        .expect_err("unsafe name");

    assert!(matches!(err, BundleError::InvalidAssetName { .. }));
}

#[rstest]
fn find_file_walks_in_name_order(scratch: TempDir) {
    let root = scratch.path();
    std::fs::create_dir_all(root.join("b")).expect("mkdir");
    std::fs::create_dir_all(root.join("a")).expect("mkdir");
    std::fs::write(root.join("b/menu.ovl"), b"b").expect("write");
    std::fs::write(root.join("a/ovlmenu.ovl"), b"a").expect("write");

    let found = find_file(root, &NameRule::contains("menu"))
        .expect("walk succeeds")
        .expect("match found");

    assert_eq!(found, root.join("a/ovlmenu.ovl"));
}
