use crate::{
    compile::{compile, Compiler},
    config::{Builder, Config},
};
use std::{
    cell::Cell,
    collections::BTreeMap,
    fs,
    path::PathBuf,
    rc::Rc,
    time::{Duration, UNIX_EPOCH},
};
use tempfile::{tempdir, TempDir};

/// A [`Compiler`] that counts its invocations.
pub fn counting(count: &Rc<Cell<usize>>) -> impl Compiler + 'static {
    let count = Rc::clone(count);
    move |source: &str, partials: &BTreeMap<String, String>| {
        count.set(count.get() + 1);
        compile(source, partials)
    }
}

/// A templates directory holding `hello` and `shared/name`, and an empty
/// cache directory.
pub struct Fixture {
    templates: TempDir,
    cache: TempDir,
    use_cache: bool,
    use_mem_cache: bool,
}

impl Fixture {
    pub fn new(use_cache: bool, use_mem_cache: bool) -> Self {
        let fixture = Self {
            templates: tempdir().unwrap(),
            cache: tempdir().unwrap(),
            use_cache,
            use_mem_cache,
        };
        fixture.write("hello", "<b>Hello {{> shared/name}}!</b>");
        fixture.write("shared/name", "<i>{{name}}</i>");

        fixture
    }

    pub fn builder(&self) -> Builder {
        Builder::new()
            .with_templates_dir(self.templates.path())
            .with_cache_dir(self.cache.path())
            .with_cache(self.use_cache)
            .with_mem_cache(self.use_mem_cache)
    }

    pub fn config(&self) -> Config {
        self.builder().build().unwrap()
    }

    pub fn template_path(&self, name: &str) -> PathBuf {
        self.templates.path().join(format!("{name}.hbs"))
    }

    pub fn write(&self, name: &str, text: &str) {
        let path = self.template_path(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    /// Give the template a fixed modification time, `offset` seconds after
    /// a point in the past.
    pub fn set_modified(&self, name: &str, offset: u64) {
        let time = UNIX_EPOCH + Duration::from_secs(1_600_000_000 + offset);
        fs::File::options()
            .write(true)
            .open(self.template_path(name))
            .unwrap()
            .set_modified(time)
            .unwrap();
    }
}
