//! Incremental cache behaviour across consecutive builds

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use entity_cache::{
    CacheError, CacheLayout, DebugLevel, EntityCache, EntityFileIndex, EntityStore, FileTimeIndex,
    Propagation, Scope, SourceFile, XmlMerger,
};
use tempfile::TempDir;

struct Fixture {
    src: TempDir,
    cache: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            src: tempfile::tempdir().unwrap(),
            cache: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.src.path().join(name)
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.path(name), content).unwrap();
    }

    /// Rewrite a file and move its mtime past anything recorded so far
    fn modify(&self, name: &str, content: &str, secs_ahead: u64) {
        self.write(name, content);
        set_mtime(&self.path(name), SystemTime::now() + Duration::from_secs(secs_ahead));
    }

    fn files(&self, names: &[&str]) -> Vec<SourceFile> {
        names.iter().map(|n| SourceFile::read(self.path(n)).unwrap()).collect()
    }

    fn engine(&self) -> EntityCache<XmlMerger> {
        EntityCache::new(self.cache.path(), XmlMerger::new(Scope::Data).unwrap())
    }

    fn layout(&self) -> CacheLayout {
        CacheLayout::new(self.cache.path(), Scope::Data)
    }

    fn key(&self, name: &str) -> String {
        self.path(name).to_string_lossy().into_owned()
    }

    fn artifact(&self, entity: &str) -> Vec<u8> {
        fs::read(EntityStore::new(&self.layout()).artifact_path(entity)).unwrap()
    }
}

fn set_mtime(path: &Path, time: SystemTime) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

fn data_attr<'a>(record: &'a entity_cache::EntityRecord, key: &str) -> Option<&'a str> {
    record
        .element
        .children
        .iter()
        .find(|c| c.attribute("key") == Some(key))
        .and_then(|c| c.text.as_deref())
}

const FILE_A: &str = r#"<entities>
    <entity name="E1"><data key="sku">a-1</data></entity>
    <entity name="E3"><data key="price">10</data></entity>
</entities>"#;

const FILE_B: &str = r#"<entities>
    <entity name="E2"><data key="sku">b-2</data></entity>
    <entity name="E3"><data key="qty">5</data></entity>
</entities>"#;

#[test]
fn test_fresh_cache_parses_everything() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    fx.write("b.xml", FILE_B);

    let report = fx.engine().build(&fx.files(&["a.xml", "b.xml"])).unwrap();
    assert!(report.cache_invalidated);
    assert_eq!(report.parsed_files, vec![fx.key("a.xml"), fx.key("b.xml")]);
    assert_eq!(report.output.len(), 3);

    let layout = fx.layout();
    assert!(layout.file_to_time_path().is_file());
    assert!(layout.entity_to_files_path().is_file());
    for entity in ["E1", "E2", "E3"] {
        assert!(!fx.artifact(entity).is_empty());
    }

    let index = EntityFileIndex::load(&layout.entity_to_files_path());
    assert_eq!(index.files_for("E3"), [fx.key("a.xml"), fx.key("b.xml")]);
    assert_eq!(FileTimeIndex::load(&layout.file_to_time_path()).len(), 2);
}

#[test]
fn test_second_run_is_a_pure_read() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    fx.write("b.xml", FILE_B);
    let files = fx.files(&["a.xml", "b.xml"]);

    let first = fx.engine().build(&files).unwrap();
    let layout = fx.layout();
    let times_before = fs::read(layout.file_to_time_path()).unwrap();
    let index_before = fs::read(layout.entity_to_files_path()).unwrap();
    let e3_before = fx.artifact("E3");

    let second = fx.engine().build(&files).unwrap();
    assert!(!second.cache_invalidated);
    assert!(second.parsed_files.is_empty());
    assert!(second.rebuild.is_none());
    assert_eq!(second.output, first.output);

    assert_eq!(fs::read(layout.file_to_time_path()).unwrap(), times_before);
    assert_eq!(fs::read(layout.entity_to_files_path()).unwrap(), index_before);
    assert_eq!(fx.artifact("E3"), e3_before);
}

#[test]
fn test_change_isolation() {
    let fx = Fixture::new();
    let only_a = r#"<entities><entity name="E1"><data key="sku">a-1</data></entity></entities>"#;
    let only_b = r#"<entities><entity name="E2"><data key="sku">b-2</data></entity></entities>"#;
    fx.write("a.xml", only_a);
    fx.write("b.xml", only_b);
    fx.engine().build(&fx.files(&["a.xml", "b.xml"])).unwrap();
    let e2_before = fx.artifact("E2");

    fx.modify(
        "a.xml",
        r#"<entities><entity name="E1"><data key="sku">a-9</data></entity></entities>"#,
        3_600,
    );
    let report = fx.engine().build(&fx.files(&["a.xml", "b.xml"])).unwrap();

    assert_eq!(report.parsed_files, vec![fx.key("a.xml")]);
    assert!(report.pulled_in.is_empty());
    assert_eq!(data_attr(report.output.get("E1").unwrap(), "sku"), Some("a-9"));
    assert_eq!(data_attr(report.output.get("E2").unwrap(), "sku"), Some("b-2"));
    assert_eq!(fx.artifact("E2"), e2_before);

    let stats = report.rebuild.unwrap();
    assert_eq!(stats.artifacts.written, 1);
    assert_eq!(stats.artifacts.unchanged, 1);
}

#[test]
fn test_cross_file_propagation() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    fx.write("b.xml", FILE_B);
    fx.engine().build(&fx.files(&["a.xml", "b.xml"])).unwrap();

    fx.modify(
        "a.xml",
        r#"<entities>
            <entity name="E1"><data key="sku">a-1</data></entity>
            <entity name="E3"><data key="price">12</data></entity>
        </entities>"#,
        3_600,
    );
    let report = fx.engine().build(&fx.files(&["a.xml", "b.xml"])).unwrap();

    assert!(report.pulled_in.contains(&fx.key("b.xml")));
    assert_eq!(report.parsed_files, vec![fx.key("a.xml"), fx.key("b.xml")]);

    let e3 = report.output.get("E3").unwrap();
    assert_eq!(data_attr(e3, "price"), Some("12"));
    assert_eq!(data_attr(e3, "qty"), Some("5"));
    assert_eq!(e3.filenames, vec![fx.key("a.xml"), fx.key("b.xml")]);

    // The rebuilt value is what the next run reads back from disk
    let cached = fx.engine().build(&fx.files(&["a.xml", "b.xml"])).unwrap();
    assert!(!cached.cache_invalidated);
    assert_eq!(cached.output.get("E3"), Some(e3));
}

#[test]
fn test_unchanged_mtime_is_skipped_even_if_content_differs() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    set_mtime(&fx.path("a.xml"), SystemTime::now() - Duration::from_secs(3_600));
    fx.engine().build(&fx.files(&["a.xml"])).unwrap();

    fx.write("a.xml", r#"<entities><entity name="Other"/></entities>"#);
    set_mtime(&fx.path("a.xml"), SystemTime::now() - Duration::from_secs(3_600));
    let report = fx.engine().build(&fx.files(&["a.xml"])).unwrap();

    assert!(!report.cache_invalidated);
    assert!(report.output.get("E1").is_some());
    assert!(report.output.get("Other").is_none());
}

const CHAIN_A: &str = r#"<entities><entity name="X"><data key="from">a</data></entity></entities>"#;
const CHAIN_B: &str = r#"<entities>
    <entity name="X"><data key="b">1</data></entity>
    <entity name="Y"><data key="b">1</data></entity>
</entities>"#;
const CHAIN_C: &str = r#"<entities><entity name="Y"><data key="c">1</data></entity></entities>"#;

fn chain_fixture() -> Fixture {
    let fx = Fixture::new();
    fx.write("a.xml", CHAIN_A);
    fx.write("b.xml", CHAIN_B);
    fx.write("c.xml", CHAIN_C);
    fx.engine().build(&fx.files(&["a.xml", "b.xml", "c.xml"])).unwrap();
    fx.modify(
        "a.xml",
        r#"<entities><entity name="X"><data key="from">a2</data></entity></entities>"#,
        3_600,
    );
    fx
}

#[test]
fn test_transitive_propagation_keeps_multi_file_entities_whole() {
    let fx = chain_fixture();
    let report = fx.engine().build(&fx.files(&["a.xml", "b.xml", "c.xml"])).unwrap();

    assert_eq!(report.parsed_files.len(), 3);
    let y = report.output.get("Y").unwrap();
    assert_eq!(data_attr(y, "b"), Some("1"));
    assert_eq!(data_attr(y, "c"), Some("1"));
    assert_eq!(data_attr(report.output.get("X").unwrap(), "from"), Some("a2"));
}

#[test]
fn test_single_hop_propagation_stops_after_one_level() {
    let fx = chain_fixture();
    let engine = fx.engine().with_propagation(Propagation::SingleHop);
    let report = engine.build(&fx.files(&["a.xml", "b.xml", "c.xml"])).unwrap();

    assert_eq!(report.parsed_files, vec![fx.key("a.xml"), fx.key("b.xml")]);
    assert!(!report.pulled_in.contains(&fx.key("c.xml")));
    assert_eq!(data_attr(report.output.get("X").unwrap(), "from"), Some("a2"));

    // Y is rebuilt from b.xml alone and c.xml's part is gone
    let y = report.output.get("Y").unwrap();
    assert_eq!(data_attr(y, "b"), Some("1"));
    assert_eq!(data_attr(y, "c"), None);
    assert_eq!(y.filenames, vec![fx.key("b.xml")]);
    let index = EntityFileIndex::load(&fx.layout().entity_to_files_path());
    assert_eq!(index.files_for("Y"), [fx.key("b.xml")]);
}

#[test]
fn test_save_after_read_is_not_lost() {
    let fx = Fixture::new();
    let old = r#"<entities><entity name="E"><data key="v">old</data></entity></entities>"#;
    fx.write("a.xml", old);
    set_mtime(&fx.path("a.xml"), SystemTime::now() - Duration::from_secs(60));
    let snapshot = fx.files(&["a.xml"]);

    // Saved after the snapshot was read but before the build ran
    fx.write(
        "a.xml",
        r#"<entities><entity name="E"><data key="v">new</data></entity></entities>"#,
    );
    set_mtime(&fx.path("a.xml"), SystemTime::now() + Duration::from_secs(1));

    let first = fx.engine().build(&snapshot).unwrap();
    assert_eq!(data_attr(first.output.get("E").unwrap(), "v"), Some("old"));

    let second = fx.engine().build(&fx.files(&["a.xml"])).unwrap();
    assert!(second.cache_invalidated);
    assert_eq!(data_attr(second.output.get("E").unwrap(), "v"), Some("new"));
}

#[test]
fn test_missing_entity_index_and_artifacts_force_full_rebuild() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    let files = fx.files(&["a.xml"]);
    fx.engine().build(&files).unwrap();

    let layout = fx.layout();
    fs::remove_dir_all(layout.data_dir()).unwrap();
    fs::remove_file(layout.entity_to_files_path()).unwrap();
    assert!(layout.file_to_time_path().is_file());

    let report = fx.engine().build(&files).unwrap();
    assert!(report.cache_invalidated);
    assert_eq!(report.parsed_files, vec![fx.key("a.xml")]);
    assert_eq!(report.output.len(), 2);
    assert!(layout.entity_to_files_path().is_file());
    assert!(!fx.artifact("E1").is_empty());
}

#[test]
fn test_scope_without_entities_stays_cached() {
    let fx = Fixture::new();
    fx.write("a.xml", "<entities/>");
    let files = fx.files(&["a.xml"]);

    let first = fx.engine().build(&files).unwrap();
    assert!(first.cache_invalidated);
    assert!(first.output.is_empty());

    let second = fx.engine().build(&files).unwrap();
    assert!(!second.cache_invalidated);
}

#[test]
fn test_removed_file_prunes_its_entities() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    fx.write("b.xml", FILE_B);
    fx.engine().build(&fx.files(&["a.xml", "b.xml"])).unwrap();

    fs::remove_file(fx.path("b.xml")).unwrap();
    let report = fx.engine().build(&fx.files(&["a.xml"])).unwrap();

    assert!(report.removed.contains(&fx.key("b.xml")));
    assert!(report.output.get("E2").is_none());
    let e3 = report.output.get("E3").unwrap();
    assert_eq!(e3.filenames, vec![fx.key("a.xml")]);
    assert_eq!(data_attr(e3, "qty"), None);

    let layout = fx.layout();
    assert!(!EntityStore::new(&layout).artifact_path("E2").exists());
    let index = EntityFileIndex::load(&layout.entity_to_files_path());
    assert!(index.files_for("E2").is_empty());
    let times = FileTimeIndex::load(&layout.file_to_time_path());
    assert_eq!(times.get(&fx.key("b.xml")), None);
}

#[test]
fn test_malformed_file_aborts_without_writing() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    fx.engine().build(&fx.files(&["a.xml"])).unwrap();
    let times_before = fs::read(fx.layout().file_to_time_path()).unwrap();

    fx.modify("a.xml", "<entities><entity name=\"E1\"></entities>", 3_600);
    let err = fx.engine().build(&fx.files(&["a.xml"])).unwrap_err();
    match err {
        CacheError::InvalidXml { file, .. } => assert_eq!(file, fx.key("a.xml")),
        other => panic!("Expected InvalidXml, got {:?}", other),
    }
    assert_eq!(fs::read(fx.layout().file_to_time_path()).unwrap(), times_before);
}

#[test]
fn test_validation_errors_are_aggregated() {
    let fx = Fixture::new();
    fx.write("a.xml", r#"<entities><entity/></entities>"#);
    fx.write(
        "b.xml",
        r#"<entities><entity name="Dup"/><entity name="Dup"/></entities>"#,
    );

    let err = fx.engine().build(&fx.files(&["a.xml", "b.xml"])).unwrap_err();
    match err {
        CacheError::Validation(errors) => {
            assert_eq!(errors.issues.len(), 2);
            let files: Vec<_> = errors.issues.iter().flat_map(|i| i.files.clone()).collect();
            assert!(files.contains(&fx.key("a.xml")));
            assert!(files.contains(&fx.key("b.xml")));
        }
        other => panic!("Expected Validation, got {:?}", other),
    }
    assert!(!fx.layout().file_to_time_path().exists());
}

#[test]
fn test_debug_level_none_skips_schema_validation() {
    let fx = Fixture::new();
    fx.write("a.xml", r#"<entities><entity/><entity name="Ok"/></entities>"#);

    let engine = fx.engine().with_debug_level(DebugLevel::None);
    let output = engine.read_files(&fx.files(&["a.xml"])).unwrap();
    assert_eq!(output.entities.keys().collect::<Vec<_>>(), vec!["Ok"]);
}

#[test]
fn test_developer_level_validates_each_file() {
    let fx = Fixture::new();
    fx.write("a.xml", r#"<entities><entity name="A"/></entities>"#);
    fx.write("b.xml", r#"<entities><entity/></entities>"#);

    let engine = fx.engine().with_debug_level(DebugLevel::Developer);
    let err = engine.build(&fx.files(&["a.xml", "b.xml"])).unwrap_err();
    match err {
        CacheError::Validation(errors) => {
            assert_eq!(errors.issues.len(), 1);
            assert_eq!(errors.issues[0].files, vec![fx.key("b.xml")]);
        }
        other => panic!("Expected Validation, got {:?}", other),
    }
}

#[test]
fn test_empty_files_are_skipped() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    fx.write("empty.xml", "   \n");

    let report = fx.engine().build(&fx.files(&["empty.xml", "a.xml"])).unwrap();
    assert_eq!(report.parsed_files, vec![fx.key("a.xml")]);
    assert_eq!(report.output.len(), 2);
}

#[test]
fn test_corrupt_artifact_forces_full_rebuild() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    fx.write("b.xml", FILE_B);
    let files = fx.files(&["a.xml", "b.xml"]);
    let first = fx.engine().build(&files).unwrap();

    let artifact = EntityStore::new(&fx.layout()).artifact_path("E2");
    fs::write(&artifact, "{ truncated").unwrap();

    let report = fx.engine().build(&files).unwrap();
    assert!(report.cache_invalidated);
    assert_eq!(report.parsed_files.len(), 2);
    assert_eq!(report.output, first.output);
    assert!(serde_json::from_slice::<serde_json::Value>(&fs::read(&artifact).unwrap()).is_ok());
}

#[test]
fn test_scopes_do_not_share_cache() {
    let fx = Fixture::new();
    fx.write("a.xml", FILE_A);
    fx.write("pages.xml", r#"<pages><page name="E1" url="/e1"/></pages>"#);

    fx.engine().build(&fx.files(&["a.xml"])).unwrap();
    let pages = EntityCache::new(fx.cache.path(), XmlMerger::new(Scope::Page).unwrap());
    let output = pages.read_files(&fx.files(&["pages.xml"])).unwrap();

    assert_eq!(output.len(), 1);
    assert_eq!(output.get("E1").unwrap().element.name, "page");
    assert!(CacheLayout::new(fx.cache.path(), Scope::Page).data_dir().join("E1.json").is_file());
    assert_eq!(fx.engine().read_files(&fx.files(&["a.xml"])).unwrap().len(), 2);
}
