//! Resolution across module directories on disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use spi::core::{InstantiationError, SyntaxError, fingerprint};
use spi::prelude::*;
use tempfile::TempDir;

pub trait Store: Send + Sync {
    fn describe(&self) -> String;
}

impl Contract for dyn Store {
    const NAME: &'static str = "demo.Store";
}

struct Memory {
    capacity: usize,
}

impl Store for Memory {
    fn describe(&self) -> String {
        format!("memory:{}", self.capacity)
    }
}

#[implementation(name = "demo.Memory", provides = dyn Store)]
fn memory(parameters: Parameters) -> Memory {
    Memory {
        capacity: parameters
            .get("capacity")
            .and_then(|c| c.parse().ok())
            .unwrap_or(16),
    }
}

struct Disk(String);

impl Store for Disk {
    fn describe(&self) -> String {
        format!("disk:{}", self.0)
    }
}

#[implementation(name = "demo.Disk", provides = dyn Store)]
fn disk(path: Option<&str>) -> Disk {
    Disk(path.unwrap_or("/tmp").to_string())
}

fn write(root: &Path, module: &str, relative: &str, text: &str) {
    let path = root.join(module).join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

/// `a-lib` ships a library default, `b-app` an application choice.
fn modules() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a-lib",
        "META-INF/spi/service.properties",
        "demo.Store>memory>library=demo.Memory\n",
    );
    write(
        dir.path(),
        "b-app",
        "META-INF/spi/service.properties",
        "# chosen by the application\ndemo.Store>disk>application=demo.Disk(/var/data)\n",
    );
    dir
}

fn registry(dir: &TempDir, settings: SpiSettings) -> SpiRegistry {
    SpiRegistry::builder()
        .enumerator(DirectoryEnumerator::discover(dir.path()).unwrap())
        .settings(settings)
        .build()
}

fn describe(registry: &SpiRegistry) -> String {
    registry
        .get_loader(DEFAULT_CONFIG_ROOT)
        .unwrap()
        .load_service::<dyn Store>()
        .unwrap()
        .unwrap()
        .describe()
}

#[test]
fn test_highest_level_across_modules() {
    let dir = modules();
    assert_eq!(describe(&registry(&dir, SpiSettings::default())), "disk:/var/data");
}

#[test]
fn test_excluded_resource_is_skipped() {
    let dir = modules();
    let bytes = fs::read(dir.path().join("b-app/META-INF/spi/service.properties")).unwrap();
    let settings = SpiSettings {
        file_exclusion: [fingerprint(&bytes).to_uppercase()].into_iter().collect(),
        ..Default::default()
    };
    assert_eq!(describe(&registry(&dir, settings)), "memory:16");
}

#[test]
fn test_apply_file_pins_service() {
    let dir = modules();
    write(
        dir.path(),
        "c-ops",
        "META-INF/spi/service-apply.properties",
        "demo.Store=memory\n",
    );
    let registry = registry(&dir, SpiSettings::default());
    assert_eq!(describe(&registry), "memory:16");

    let loader = registry.get_loader("").unwrap();
    let resolution = loader.service_resolution("demo.Store").unwrap();
    assert_eq!(resolution.applied.id, "memory");
    assert!(resolution.reason.to_string().contains("service-apply.properties"));
}

#[test]
fn test_override_variable_beats_apply_file() {
    let dir = modules();
    write(
        dir.path(),
        "c-ops",
        "META-INF/spi/service-apply.properties",
        "demo.Store=memory\n",
    );
    let settings = SpiSettings {
        apply: [("demo.Store".to_string(), "disk".to_string())]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    assert_eq!(describe(&registry(&dir, settings)), "disk:/var/data");
}

#[test]
fn test_parameters_loaded_from_declaring_module() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a-lib",
        "META-INF/spi/service.properties",
        "demo.Store>memory>library=demo.Memory(capacity.properties)\n",
    );
    write(
        dir.path(),
        "a-lib",
        "META-INF/spi/parameter/capacity.properties",
        "capacity = 42\n",
    );
    write(
        dir.path(),
        "b-app",
        "META-INF/spi/parameter/capacity.properties",
        "capacity = 7\n",
    );

    let registry = registry(&dir, SpiSettings::default());
    assert_eq!(describe(&registry), "memory:42");
}

#[test]
fn test_plugin_parameters_and_direct_calls() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a-lib",
        "META-INF/spi/plugin.properties",
        "demo.Store>1=demo.Memory(capacity.properties)\n",
    );
    write(
        dir.path(),
        "a-lib",
        "META-INF/spi/parameter/capacity.properties",
        "capacity=3\n",
    );
    let loader = registry(&dir, SpiSettings::default()).get_loader("").unwrap();
    let stores = loader.load_plugins::<dyn Store>().unwrap();
    assert_eq!(stores[0].describe(), "memory:3");

    // Registration leaves the constructor an ordinary function.
    let direct = memory(Parameters::from_iter([("capacity", "9")]));
    assert_eq!(direct.capacity, 9);
}

#[test]
fn test_missing_parameters_fail() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a-lib",
        "META-INF/spi/service.properties",
        "demo.Store>memory>library=demo.Memory(absent.properties)\n",
    );
    let loader = registry(&dir, SpiSettings::default()).get_loader("").unwrap();
    match loader.load_service::<dyn Store>() {
        Err(SpiError::Instantiation(InstantiationError::MissingParameters { expected, .. })) => {
            assert!(expected.ends_with("a-lib/META-INF/spi/parameter/absent.properties"));
        }
        other => panic!("unexpected result: {:?}", other.map(|s| s.map(|s| s.describe()))),
    }
}

#[test]
fn test_syntax_error_names_resource() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a-lib",
        "META-INF/spi/service.properties",
        "demo.Store>memory>vendor=demo.Memory\n",
    );
    match registry(&dir, SpiSettings::default()).get_loader("") {
        Err(SpiError::Syntax(err @ SyntaxError::UndefinedLevel { .. })) => {
            assert!(err.to_string().contains("a-lib/META-INF/spi/service.properties"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_custom_config_root() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "a-lib",
        "custom/root/service.properties",
        "demo.Store>disk>default=demo.Disk\n",
    );
    let registry = registry(&dir, SpiSettings::default());

    let loader = registry.get_loader("/custom/root").unwrap();
    assert_eq!(loader.config_root(), "custom/root/");
    assert_eq!(
        loader.load_service::<dyn Store>().unwrap().unwrap().describe(),
        "disk:/tmp"
    );
    assert!(
        registry
            .get_loader(DEFAULT_CONFIG_ROOT)
            .unwrap()
            .load_service::<dyn Store>()
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_cache_identity_and_disabled_cache() {
    let dir = modules();

    let cached = registry(&dir, SpiSettings::default());
    let a = cached.get_loader("META-INF/spi").unwrap();
    let b = cached.get_loader(DEFAULT_CONFIG_ROOT).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let uncached = registry(
        &dir,
        SpiSettings {
            cache: false,
            ..Default::default()
        },
    );
    let c = uncached.get_loader(DEFAULT_CONFIG_ROOT).unwrap();
    let d = uncached.get_loader(DEFAULT_CONFIG_ROOT).unwrap();
    assert!(!Arc::ptr_eq(&c, &d));
    assert_eq!(*c, *d);
}

#[test]
fn test_services_are_fresh_per_call() {
    let dir = modules();
    let loader = registry(&dir, SpiSettings::default()).get_loader("").unwrap();
    let first = loader.load_service::<dyn Store>().unwrap().unwrap();
    let second = loader.load_service::<dyn Store>().unwrap().unwrap();
    assert_ne!(
        first.as_ref() as *const dyn Store as *const (),
        second.as_ref() as *const dyn Store as *const ()
    );
}
