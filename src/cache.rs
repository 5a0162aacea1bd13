mod map;

pub use map::{modified_nanos, CacheMap};

use crate::{
    compile::{Compiler, Program},
    config::Config,
    error::{Error, Result},
    normalize::normalize,
    partial::PartialRegistry,
    render::Renderer,
    template::TemplateStore,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io, iter,
    path::{Path, PathBuf},
    rc::Rc,
};

/// Extension of compiled renderer files in the cache directory.
pub const ARTIFACT_EXT: &str = "renderer";

/// Format version of compiled renderer files. Files of any other version
/// are discarded.
pub const ARTIFACT_VERSION: u32 = 1;

/// Contents of a compiled renderer file.
///
/// `stamps` holds the cache map entry of the template and of every partial
/// compiled into the program, as they were when the program was compiled.
#[derive(Debug, Serialize, Deserialize)]
struct Artifact<T> {
    version: u32,
    name: String,
    stamps: BTreeMap<String, u64>,
    program: T,
}

/// Finds the [`Renderer`] of a template, in memory, on disk, or by
/// compiling it.
///
/// The memory tier is unbounded and lives as long as the cache.
#[derive(Debug)]
pub struct RenderCache {
    directory: PathBuf,
    map_path: PathBuf,
    use_cache: bool,
    use_mem_cache: bool,
    map: CacheMap,
    hot: BTreeMap<String, Rc<Renderer>>,
}

impl RenderCache {
    /// Create a new, empty [`RenderCache`] for the given configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            directory: config.cache_dir().to_path_buf(),
            map_path: config.map_path(),
            use_cache: config.use_cache(),
            use_mem_cache: config.use_mem_cache(),
            map: CacheMap::new(),
            hot: BTreeMap::new(),
        }
    }

    /// Path of the compiled renderer file of the template.
    #[inline]
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.directory.join(format!("{name}.{ARTIFACT_EXT}"))
    }

    /// Return true if the template has a renderer in memory.
    #[inline]
    pub fn is_hot(&self, name: &str) -> bool {
        self.hot.contains_key(name)
    }

    /// Compare every template on disk against the cache map, discard stale
    /// compiled renderers and write the map again.
    ///
    /// A renderer is stale when its own template changed, or when any
    /// partial compiled into it changed; the second case is caught when the
    /// renderer is loaded. Renderers of templates that no longer exist are
    /// removed.
    ///
    /// With the file cache enabled, the text of each unchanged template is
    /// read into the [`TemplateStore`], and with the memory cache enabled
    /// its compiled renderer is loaded as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a template, a stale renderer or the map
    /// cannot be accessed.
    pub fn invalidate(&mut self, templates: &mut TemplateStore) -> Result<()> {
        let previous = CacheMap::load(&self.map_path);
        let mut current = CacheMap::new();
        let mut unchanged = vec![];

        for (name, path) in templates.discover(templates.root()) {
            let modified = modified_nanos(&path)?;

            if previous.get(&name) == Some(modified) {
                unchanged.push((name.clone(), path));
            } else {
                self.discard(&name)?;
            }

            current.insert(name, modified);
        }

        let removed = previous
            .names()
            .filter(|name| !current.contains(name))
            .collect::<Vec<_>>();
        for name in removed {
            self.discard(name)?;
        }

        current.save(&self.map_path)?;
        self.map = current;

        if !self.use_cache {
            return Ok(());
        }

        for (name, path) in unchanged {
            let text = fs::read_to_string(&path).map_err(Error::io(&path))?;
            templates.preload(name.clone(), text);

            if self.use_mem_cache && !self.is_hot(&name) {
                if let Some(renderer) = self.load(&name) {
                    self.hot.insert(name, Rc::new(renderer));
                }
            }
        }

        Ok(())
    }

    /// Return the renderer of the template.
    ///
    /// The memory tier is tried first, then the file tier when enabled. When
    /// neither holds a usable renderer, the template is normalized and
    /// compiled with the registered partials, and the result is written to
    /// the file tier when enabled. The renderer is kept in memory when the
    /// memory cache is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be read or normalized,
    /// [`Error::Compile`] if the compiler rejects it and
    /// [`Error::InvalidRenderer`] if the compiled program cannot be bound.
    pub fn renderer(
        &mut self,
        name: &str,
        templates: &mut TemplateStore,
        partials: &PartialRegistry,
        compiler: &dyn Compiler,
    ) -> Result<Rc<Renderer>> {
        if let Some(renderer) = self.hot.get(name) {
            tracing::debug!(template = name, "renderer found in memory");
            return Ok(Rc::clone(renderer));
        }

        let renderer = match self.load(name) {
            Some(renderer) => renderer,
            None => self.compile(name, templates, partials, compiler)?,
        };
        let renderer = Rc::new(renderer);

        if self.use_mem_cache {
            self.hot.insert(name.to_string(), Rc::clone(&renderer));
        }

        Ok(renderer)
    }

    /// Load the compiled renderer of the template from disk.
    ///
    /// A file that cannot be read, decoded or bound is deleted so the
    /// template gets compiled again.
    fn load(&self, name: &str) -> Option<Renderer> {
        if !self.use_cache {
            return None;
        }

        let path = self.artifact_path(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::warn!(template = name, %error, "cannot read compiled renderer");
                self.remove(&path);
                return None;
            }
        };

        match decode(name, &text, &self.map).and_then(Renderer::bind) {
            Ok(renderer) => {
                tracing::debug!(template = name, "renderer loaded from disk");
                Some(renderer)
            }
            Err(reason) => {
                tracing::warn!(template = name, %reason, "discarding compiled renderer");
                self.remove(&path);
                None
            }
        }
    }

    /// Normalize and compile the template, then write the program to disk
    /// when the file cache is enabled.
    fn compile(
        &self,
        name: &str,
        templates: &mut TemplateStore,
        partials: &PartialRegistry,
        compiler: &dyn Compiler,
    ) -> Result<Renderer> {
        let normalized = normalize(name, templates.get(name)?)?;
        let program = compiler
            .compile(&normalized, partials.partials())
            .map_err(|source| Error::Compile {
                name: name.to_string(),
                source,
            })?;
        let renderer = Renderer::bind(program).map_err(|reason| Error::InvalidRenderer {
            name: name.to_string(),
            reason,
        })?;
        tracing::debug!(template = name, "compiled template");

        if self.use_cache {
            match self.stamps(name, renderer.program()) {
                Some(stamps) => self.store(name, stamps, renderer.program())?,
                None => tracing::debug!(
                    template = name,
                    "template or partial missing from cache map, renderer not written"
                ),
            }
        }

        Ok(renderer)
    }

    /// Return the cache map entry of the template and of every partial in
    /// the program, or `None` if one of them has no entry.
    fn stamps(&self, name: &str, program: &Program) -> Option<BTreeMap<String, u64>> {
        iter::once(name)
            .chain(program.partials.keys().map(String::as_str))
            .map(|dependency| {
                self.map
                    .get(dependency)
                    .map(|modified| (dependency.to_string(), modified))
            })
            .collect()
    }

    /// Write the program of the template to its renderer file.
    fn store(&self, name: &str, stamps: BTreeMap<String, u64>, program: &Program) -> Result<()> {
        let artifact = Artifact {
            version: ARTIFACT_VERSION,
            name: name.to_string(),
            stamps,
            program,
        };
        let json = serde_json::to_vec(&artifact).map_err(|source| Error::Json {
            context: format!("compiled renderer of `{name}`"),
            source,
        })?;

        map::write_atomic(&self.artifact_path(name), &json)
    }

    /// Delete the renderer file of the template, if there is one.
    fn discard(&mut self, name: &str) -> Result<()> {
        self.hot.remove(name);

        let path = self.artifact_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(template = name, "invalidated compiled renderer");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(Error::io(path)(error)),
        }
    }

    fn remove(&self, path: &Path) {
        if let Err(error) = fs::remove_file(path) {
            if error.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %error, "cannot delete compiled renderer");
            }
        }
    }
}

/// Decode the contents of a renderer file written for the template.
///
/// The file is rejected when the template or any partial in it has a
/// different entry in the cache map than when it was compiled.
fn decode(name: &str, text: &str, map: &CacheMap) -> Result<Program, String> {
    let artifact = serde_json::from_str::<Artifact<Program>>(text)
        .map_err(|error| format!("the file is not a compiled renderer: {error}"))?;

    if artifact.version != ARTIFACT_VERSION {
        return Err(format!(
            "format version {} is not {ARTIFACT_VERSION}",
            artifact.version
        ));
    }
    if artifact.name != name {
        return Err(format!("the file belongs to template `{}`", artifact.name));
    }

    let stale = |dependency: &str| match (artifact.stamps.get(dependency), map.get(dependency)) {
        (Some(compiled), Some(current)) => *compiled != current,
        _ => true,
    };
    if let Some(dependency) = iter::once(name)
        .chain(artifact.program.partials.keys().map(String::as_str))
        .find(|&dependency| stale(dependency))
    {
        return Err(format!("`{dependency}` changed since it was compiled"));
    }

    Ok(artifact.program)
}
