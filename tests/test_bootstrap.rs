//! Bootstrap pipeline against fake host collaborators.

use std::{cell::RefCell, fs, path::Path};

use casd_provision::{
    bootstrap::{self, Host, Outcome},
    cli::Credentials,
    config::Config,
    error::AppError,
    identity::{Ed25519KeyRing, KeyRing},
    server_config::ServerConfig,
    system::{ModuleLoader, OwnershipChanger, ServiceAction, ServiceController},
};
use tempfile::TempDir;

/// Records every host call in order; optionally fails one of them.
#[derive(Default)]
struct FakeHost {
    log: RefCell<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl FakeHost {
    fn record(&self, line: String) -> Result<(), AppError> {
        let fail = self.fail_on.is_some_and(|needle| line.contains(needle));
        self.log.borrow_mut().push(line.clone());
        if fail {
            return Err(AppError::Command {
                program: "fake".into(),
                args: vec![line],
                status: "exit status: 1".into(),
                output: "simulated failure".into(),
            });
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl OwnershipChanger for FakeHost {
    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<(), AppError> {
        self.record(format!("chown -R {user}:{group} {}", path.display()))
    }

    fn chown(&self, path: &Path, user: &str, group: &str) -> Result<(), AppError> {
        self.record(format!("chown {user}:{group} {}", path.display()))
    }

    fn chgrp(&self, path: &Path, group: &str) -> Result<(), AppError> {
        self.record(format!("chgrp {group} {}", path.display()))
    }
}

impl ServiceController for FakeHost {
    fn apply(&self, action: ServiceAction, unit: &str) -> Result<(), AppError> {
        self.record(format!("systemctl {action} {unit}"))
    }
}

impl ModuleLoader for FakeHost {
    fn load(&self, module: &str) -> Result<(), AppError> {
        self.record(format!("modprobe {module}"))
    }
}

/// Key ring that counts generations and can refuse to generate.
#[derive(Default)]
struct CountingRing {
    generated: RefCell<usize>,
    refuse: bool,
}

impl KeyRing for CountingRing {
    fn key_id_from_ring(&self, ring: &Path) -> Result<String, AppError> {
        Ed25519KeyRing.key_id_from_ring(ring)
    }

    fn generate_ring(&self, ring: &Path) -> Result<String, AppError> {
        if self.refuse {
            return Err(AppError::Identity("entropy source unavailable".into()));
        }
        *self.generated.borrow_mut() += 1;
        Ed25519KeyRing.generate_ring(ring)
    }
}

fn host<'a>(ring: &'a dyn KeyRing, fake: &'a FakeHost) -> Host<'a> {
    Host {
        key_ring: ring,
        owner: fake,
        services: fake,
        modules: fake,
    }
}

fn alice() -> Credentials {
    Credentials::new(Some("alice".into()), Some("s3cret".into())).unwrap()
}

fn full_config(root: &Path) -> Config {
    let mut cfg = Config::sandboxed(root);
    cfg.account.enabled = true;
    cfg.services.enabled = true;
    cfg.fuse.enabled = true;
    cfg
}

#[test]
fn fresh_host_is_provisioned() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::sandboxed(tmp.path());
    let ring = CountingRing::default();
    let fake = FakeHost::default();

    let outcome = bootstrap::run(&cfg, &alice(), host(&ring, &fake)).unwrap();

    let (key_id, secret_ring, reused_identity) = match outcome {
        Outcome::Provisioned { key_id, secret_ring, reused_identity } => {
            (key_id, secret_ring, reused_identity)
        }
        other => panic!("expected provisioning, got {other:?}"),
    };
    assert!(!reused_identity);
    assert_eq!(*ring.generated.borrow(), 1);
    assert_eq!(secret_ring, cfg.paths.secret_ring);
    assert!(cfg.paths.blob_dir.is_dir());

    let doc = ServerConfig::read(&cfg.paths.server_config).unwrap();
    assert_eq!(doc.identity, key_id);
    assert_eq!(doc.identity, Ed25519KeyRing.key_id_from_ring(&secret_ring).unwrap());
    assert_eq!(doc.identity_secret_ring, cfg.paths.secret_ring);
    assert_eq!(doc.blob_path, cfg.paths.blob_dir);
    assert_eq!(doc.auth, "userpass:alice:s3cret");

    // All optional stages are off in the sandbox.
    assert!(fake.calls().is_empty());
}

#[test]
fn exactly_one_ring_is_created() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::sandboxed(tmp.path());
    let fake = FakeHost::default();
    bootstrap::run(&cfg, &alice(), host(&Ed25519KeyRing, &fake)).unwrap();

    let mut names: Vec<String> = fs::read_dir(cfg.config_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, ["identity-secring.ed25519", "server-config.json"]);
}

#[test]
fn second_run_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let cfg = full_config(tmp.path());
    let ring = CountingRing::default();
    let fake = FakeHost::default();

    bootstrap::run(&cfg, &alice(), host(&ring, &fake)).unwrap();
    let config_bytes = fs::read(&cfg.paths.server_config).unwrap();
    let ring_bytes = fs::read(&cfg.paths.secret_ring).unwrap();
    let first_calls = fake.calls().len();

    let other = Credentials::new(Some("bob".into()), Some("hunter2".into())).unwrap();
    let outcome = bootstrap::run(&cfg, &other, host(&ring, &fake)).unwrap();

    assert_eq!(
        outcome,
        Outcome::AlreadyConfigured {
            path: cfg.paths.server_config.clone()
        }
    );
    assert_eq!(*ring.generated.borrow(), 1);
    assert_eq!(fs::read(&cfg.paths.server_config).unwrap(), config_bytes);
    assert_eq!(fs::read(&cfg.paths.secret_ring).unwrap(), ring_bytes);
    assert_eq!(fake.calls().len(), first_calls);
}

#[test]
fn existing_ring_is_reused() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::sandboxed(tmp.path());
    fs::create_dir_all(cfg.config_dir()).unwrap();
    let existing_id = Ed25519KeyRing.generate_ring(&cfg.paths.secret_ring).unwrap();
    let ring_bytes = fs::read(&cfg.paths.secret_ring).unwrap();

    let ring = CountingRing::default();
    let fake = FakeHost::default();
    let outcome = bootstrap::run(&cfg, &alice(), host(&ring, &fake)).unwrap();

    assert!(matches!(outcome, Outcome::Provisioned { reused_identity: true, .. }));
    assert_eq!(*ring.generated.borrow(), 0);
    assert_eq!(ServerConfig::read(&cfg.paths.server_config).unwrap().identity, existing_id);
    assert_eq!(fs::read(&cfg.paths.secret_ring).unwrap(), ring_bytes);
}

#[test]
fn corrupt_ring_aborts_before_config_is_written() {
    let tmp = TempDir::new().unwrap();
    let cfg = full_config(tmp.path());
    fs::create_dir_all(cfg.config_dir()).unwrap();
    fs::write(&cfg.paths.secret_ring, "not a key ring\n").unwrap();

    let ring = CountingRing::default();
    let fake = FakeHost::default();
    let err = bootstrap::run(&cfg, &alice(), host(&ring, &fake)).unwrap_err();

    assert!(matches!(err, AppError::Identity(_)));
    assert_eq!(*ring.generated.borrow(), 0);
    assert!(!cfg.paths.server_config.exists());
    assert_eq!(fs::read_to_string(&cfg.paths.secret_ring).unwrap(), "not a key ring\n");
    assert!(fake.calls().is_empty());
}

#[test]
fn generation_failure_leaves_no_config() {
    let tmp = TempDir::new().unwrap();
    let cfg = Config::sandboxed(tmp.path());
    let ring = CountingRing {
        refuse: true,
        ..Default::default()
    };
    let fake = FakeHost::default();

    let err = bootstrap::run(&cfg, &alice(), host(&ring, &fake)).unwrap_err();
    assert!(err.to_string().contains("could not generate new secret ring"));
    assert!(!cfg.paths.server_config.exists());
}

#[test]
fn ownership_services_and_fuse_run_in_order() {
    let tmp = TempDir::new().unwrap();
    let cfg = full_config(tmp.path());
    let fake = FakeHost::default();

    bootstrap::run(&cfg, &alice(), host(&Ed25519KeyRing, &fake)).unwrap();

    let expected = vec![
        format!("chown -R casd:casd {}", cfg.paths.blob_dir.display()),
        format!("chown -R casd:casd {}", cfg.config_dir().display()),
        format!("chown casd:casd {}", tmp.path().join("var").display()),
        "systemctl stop mysql".to_string(),
        "systemctl disable mysql".to_string(),
        "systemctl enable casd-mysql".to_string(),
        "systemctl enable casd".to_string(),
        "systemctl restart casd-mysql".to_string(),
        "systemctl restart casd".to_string(),
        "modprobe fuse".to_string(),
        format!("chgrp fuse {}", cfg.fuse.device.display()),
    ];
    assert_eq!(fake.calls(), expected);
}

#[test]
fn service_failure_stops_the_pipeline() {
    let tmp = TempDir::new().unwrap();
    let cfg = full_config(tmp.path());
    let fake = FakeHost {
        fail_on: Some("enable casd-mysql"),
        ..Default::default()
    };

    let err = bootstrap::run(&cfg, &alice(), host(&Ed25519KeyRing, &fake)).unwrap_err();

    assert!(err.to_string().contains("simulated failure"));
    let calls = fake.calls();
    assert_eq!(calls.last().unwrap(), "systemctl enable casd-mysql");
    assert!(!calls.iter().any(|c| c.starts_with("modprobe")));
    // The config is the last filesystem step and stays as the provisioned marker.
    assert!(cfg.paths.server_config.exists());
}

#[test]
fn ownership_failure_skips_services() {
    let tmp = TempDir::new().unwrap();
    let cfg = full_config(tmp.path());
    let fake = FakeHost {
        fail_on: Some("chown"),
        ..Default::default()
    };

    assert!(bootstrap::run(&cfg, &alice(), host(&Ed25519KeyRing, &fake)).is_err());
    assert_eq!(fake.calls().len(), 1);
}

/// Every directory a run creates is either handed to the service account or
/// already reachable by it, so the account can walk down to its trees.
#[test]
fn created_parent_dirs_go_to_the_service_account() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = Config::sandboxed(tmp.path());
    cfg.account.enabled = true;
    cfg.paths.blob_dir = tmp.path().join("home/casd/var/casd/blobs");
    cfg.paths.server_config = tmp.path().join("home/casd/.config/casd/server-config.json");
    cfg.paths.secret_ring = tmp.path().join("home/casd/.config/casd/identity-secring.ed25519");
    let fake = FakeHost::default();

    bootstrap::run(&cfg, &alice(), host(&Ed25519KeyRing, &fake)).unwrap();

    let calls = fake.calls();
    let recursive: Vec<String> = calls
        .iter()
        .filter_map(|c| c.strip_prefix("chown -R casd:casd "))
        .map(str::to_string)
        .collect();
    let single: Vec<String> = calls
        .iter()
        .filter_map(|c| c.strip_prefix("chown casd:casd "))
        .map(str::to_string)
        .collect();

    let mut dirs = Vec::new();
    collect_dirs(tmp.path(), &mut dirs);
    assert!(dirs.len() >= 7, "{dirs:?}");
    for dir in dirs {
        let covered = single.iter().any(|p| Path::new(p) == dir)
            || recursive.iter().any(|p| dir.starts_with(p));
        assert!(covered, "{} is not owned by the service account: {calls:?}", dir.display());
    }
    assert_eq!(single[0], tmp.path().join("home").display().to_string());
}

#[test]
fn existing_parent_dirs_keep_their_owner() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = Config::sandboxed(tmp.path());
    cfg.account.enabled = true;
    fs::create_dir_all(tmp.path().join("var")).unwrap();
    let fake = FakeHost::default();

    bootstrap::run(&cfg, &alice(), host(&Ed25519KeyRing, &fake)).unwrap();

    assert!(!fake.calls().iter().any(|c| c.starts_with("chown casd:casd")));
}

fn collect_dirs(root: &Path, out: &mut Vec<std::path::PathBuf>) {
    for entry in fs::read_dir(root).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            out.push(path.clone());
            collect_dirs(&path, out);
        }
    }
}

#[cfg(unix)]
#[test]
fn secrets_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let cfg = Config::sandboxed(tmp.path());
    let fake = FakeHost::default();
    bootstrap::run(&cfg, &alice(), host(&Ed25519KeyRing, &fake)).unwrap();

    for path in [&cfg.paths.server_config, &cfg.paths.secret_ring] {
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "{} is mode {:o}", path.display(), mode & 0o777);
    }
    let mode = fs::metadata(cfg.config_dir()).unwrap().permissions().mode();
    assert_eq!(mode & 0o077, 0);
}
