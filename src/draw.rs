use crate::{
    cache::RenderCache,
    compile::{Compiler, Handlebars},
    config::Config,
    error::{Error, Result},
    hydrate::{Payload, ID_FIELD, NAME_FIELD},
    instance::{InstanceId, InstanceStore},
    partial::PartialRegistry,
    store::Store,
    template::TemplateStore,
};
use std::{collections::BTreeMap, time::Duration, time::Instant};

/// Renders named templates and records each identified render so the view
/// can be hydrated on the client.
///
/// Construction checks every template against the cache map and discards
/// stale compiled renderers, so a `Draw` should be created once per process
/// and reused.
pub struct Draw {
    config: Config,
    compiler: Box<dyn Compiler>,
    templates: TemplateStore,
    partials: PartialRegistry,
    cache: RenderCache,
    instances: InstanceStore,
}

impl Draw {
    /// Create a new [`Draw`] that compiles with [`Handlebars`].
    ///
    /// # Errors
    ///
    /// Returns an error if the templates or the cache directory cannot be
    /// read or written.
    #[inline]
    pub fn new(config: Config) -> Result<Self> {
        Self::with_compiler(config, Handlebars)
    }

    /// Create a new [`Draw`] that compiles with the given [`Compiler`].
    ///
    /// # Errors
    ///
    /// Returns an error if the templates or the cache directory cannot be
    /// read or written.
    pub fn with_compiler<C>(config: Config, compiler: C) -> Result<Self>
    where
        C: Compiler + 'static,
    {
        let mut templates = TemplateStore::new(config.templates_dir(), config.ext());
        let mut cache = RenderCache::new(&config);
        cache.invalidate(&mut templates)?;

        Ok(Self {
            instances: InstanceStore::new(config.use_benchmark()),
            compiler: Box::new(compiler),
            partials: PartialRegistry::new(),
            templates,
            cache,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Render the template with the given name.
    ///
    /// The template name and id are added to the data under
    /// `_kx_draw_template_name` and `_kx_draw_unique_id`, which the root
    /// element exposes as `data-kx-draw-name` and `data-kx-draw-id`. Unless
    /// the id is [`InstanceId::Static`], the data is recorded for
    /// [`Draw::export_hydration_payload`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingUniqueId`] if the id is blank, or any error
    /// met while reading, normalizing, compiling or rendering the template.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kx_draw::{Builder, Draw, Store};
    ///
    /// let config = Builder::new()
    ///     .with_templates_dir("templates")
    ///     .with_cache_dir("cache")
    ///     .build()
    ///     .unwrap();
    /// let mut draw = Draw::new(config).unwrap();
    ///
    /// let html = draw.render("hello", 100, Store::new().with_must("name", "world"));
    /// assert!(html.is_ok());
    /// ```
    pub fn render<T>(&mut self, name: &str, id: T, data: Store) -> Result<String>
    where
        T: Into<InstanceId>,
    {
        let started = self.config.use_benchmark().then(Instant::now);
        let name = self.templates.normalize_name(name);
        let id = id.into();
        if id.is_blank() {
            return Err(Error::MissingUniqueId(name));
        }

        let mut data = data;
        data.insert(NAME_FIELD, &name)?;
        data.insert(ID_FIELD, id.key().unwrap_or_default())?;

        let renderer = self.cache.renderer(
            &name,
            &mut self.templates,
            &self.partials,
            self.compiler.as_ref(),
        )?;
        let output = renderer
            .render(&data.clone().into_value())
            .map_err(|source| Error::Render {
                name: name.clone(),
                source,
            })?;

        if let Some(key) = id.key() {
            self.instances.save(&name, key, data);
        }
        if let Some(started) = started {
            let elapsed = started.elapsed();
            tracing::trace!(template = %name, ?elapsed, "rendered");
            self.instances.add_draw_time(&name, elapsed);
        }

        Ok(output)
    }

    /// Render the template with the given name.
    ///
    /// # Panics
    ///
    /// Panics when rendering fails, see [`Draw::render`].
    #[inline]
    pub fn render_must<T>(&mut self, name: &str, id: T, data: Store) -> String
    where
        T: Into<InstanceId>,
    {
        self.render(name, id, data).unwrap()
    }

    /// Register the template with the given name as a partial.
    ///
    /// Templates compiled before the partial was registered do not see it
    /// until they are compiled again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartialName`] if the name is empty, or an
    /// error if the template cannot be read.
    #[inline]
    pub fn add_partial(&mut self, name: &str) -> Result<()> {
        self.partials.register(name, &mut self.templates)
    }

    /// Register every template beneath the given directory as a partial,
    /// returning how many were registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPartialName`] if the directory name is empty,
    /// [`Error::DirectoryNotFound`] if it does not exist, or an error if a
    /// template cannot be read.
    #[inline]
    pub fn add_partials_directory(&mut self, directory: &str) -> Result<usize> {
        self.partials.register_directory(directory, &mut self.templates)
    }

    /// Return the raw text of the template with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateNotFound`] if there is no such template.
    #[inline]
    pub fn get_template(&mut self, name: &str) -> Result<&str> {
        self.templates.get(name)
    }

    /// Return the total render time of each rendered template, or `None`
    /// if benchmarking is disabled.
    #[inline]
    pub fn get_draw_time(&self) -> Option<&BTreeMap<String, Duration>> {
        self.instances.draw_times()
    }

    /// Return the record of identified renders.
    #[inline]
    pub fn instances(&self) -> &InstanceStore {
        &self.instances
    }

    /// Collect the raw text of every template with a recorded render, the
    /// recorded data and every registered partial.
    ///
    /// # Errors
    ///
    /// Returns an error if the text of a rendered template cannot be read.
    pub fn hydration_payload(&mut self) -> Result<Payload> {
        let mut payload = Payload {
            data: self.instances.all_data().clone(),
            partials: self.partials.partials().clone(),
            ..Default::default()
        };

        for name in self.instances.used_template_names() {
            let text = self.templates.get(name)?;
            payload.templates.insert(name.to_string(), text.to_string());
        }

        Ok(payload)
    }

    /// Return a script element that hands the hydration payload to the
    /// client runtime. Place it before the closing `body` tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be collected or encoded.
    pub fn export_hydration_payload(&mut self) -> Result<String> {
        self.hydration_payload()?.to_script()
    }
}

#[cfg(test)]
mod tests {
    use super::Draw;
    use crate::{
        error::Error,
        fixture::{counting, Fixture},
        instance::InstanceId,
        store::Store,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::{cell::Cell, rc::Rc};

    const HELLO: &str =
        r#"<b data-kx-draw-name="hello" data-kx-draw-id="100">Hello <i>world</i>!</b>"#;

    fn world() -> Store {
        Store::new().with_must("name", "world")
    }

    fn draw(fixture: &Fixture) -> Draw {
        let mut draw = Draw::new(fixture.config()).unwrap();
        draw.add_partials_directory("shared").unwrap();
        draw
    }

    #[test]
    fn test_render() {
        let fixture = Fixture::new(true, true);
        let mut draw = Draw::new(fixture.config()).unwrap();

        assert_eq!(draw.add_partials_directory("shared").unwrap(), 1);
        assert_eq!(draw.render("hello", 100, world()).unwrap(), HELLO);
    }

    #[test]
    fn test_render_same_output_on_every_route() {
        let fixture = Fixture::new(true, true);
        let mut cached = draw(&fixture);

        let first = cached.render("hello", 100, world()).unwrap();
        let second = cached.render("hello", 100, world()).unwrap();
        assert_eq!(first, second);

        let config = fixture
            .builder()
            .with_mem_cache(false)
            .with_cache(false)
            .build()
            .unwrap();
        let mut uncached = Draw::new(config).unwrap();
        uncached.add_partials_directory("shared").unwrap();
        assert_eq!(uncached.render("hello", 100, world()).unwrap(), first);
    }

    #[test]
    fn test_cache_survives_restart() {
        let fixture = Fixture::new(true, true);
        let count = Rc::new(Cell::new(0));

        let mut first = Draw::with_compiler(fixture.config(), counting(&count)).unwrap();
        first.add_partials_directory("shared").unwrap();
        let before = first.render("hello", 100, world()).unwrap();
        assert_eq!(count.get(), 1);

        let mut second = Draw::with_compiler(fixture.config(), counting(&count)).unwrap();
        second.add_partials_directory("shared").unwrap();
        let after = second.render("hello", 100, world()).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(before, after);
    }

    #[test]
    fn test_changed_template_is_compiled_again() {
        let fixture = Fixture::new(true, true);
        let count = Rc::new(Cell::new(0));

        let mut first = Draw::with_compiler(fixture.config(), counting(&count)).unwrap();
        first.add_partials_directory("shared").unwrap();
        first.render("hello", 100, world()).unwrap();

        fixture.write("hello", "<b>Goodbye {{> shared/name}}!</b>");
        fixture.set_modified("hello", 60);

        let mut second = Draw::with_compiler(fixture.config(), counting(&count)).unwrap();
        second.add_partials_directory("shared").unwrap();
        assert_eq!(
            second.render("hello", 100, world()).unwrap(),
            r#"<b data-kx-draw-name="hello" data-kx-draw-id="100">Goodbye <i>world</i>!</b>"#
        );
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_changed_partial_is_compiled_again() {
        let fixture = Fixture::new(true, true);
        let count = Rc::new(Cell::new(0));

        let mut first = Draw::with_compiler(fixture.config(), counting(&count)).unwrap();
        first.add_partials_directory("shared").unwrap();
        assert_eq!(first.render("hello", 1, world()).unwrap().matches("<i>").count(), 1);

        fixture.write("shared/name", "<u>{{name}}</u>");
        fixture.set_modified("shared/name", 30);

        let mut second = Draw::with_compiler(fixture.config(), counting(&count)).unwrap();
        second.add_partials_directory("shared").unwrap();
        assert_eq!(
            second.render("hello", 1, world()).unwrap(),
            r#"<b data-kx-draw-name="hello" data-kx-draw-id="1">Hello <u>world</u>!</b>"#
        );
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_change_seen_while_cache_was_off() {
        let fixture = Fixture::new(true, true);
        draw(&fixture).render("hello", 1, world()).unwrap();

        fixture.write("hello", "<b>Bye {{name}}</b>");
        fixture.set_modified("hello", 50);
        let config = fixture
            .builder()
            .with_mem_cache(false)
            .with_cache(false)
            .build()
            .unwrap();
        Draw::new(config).unwrap();

        assert_eq!(
            draw(&fixture).render("hello", 1, world()).unwrap(),
            r#"<b data-kx-draw-name="hello" data-kx-draw-id="1">Bye world</b>"#
        );
    }

    #[test]
    fn test_root_errors_skip_compiler() {
        let fixture = Fixture::new(true, true);
        fixture.write("empty", " \n");
        fixture.write("many", "<p></p><p></p>");
        fixture.write("text", "Hello {{name}}");
        let count = Rc::new(Cell::new(0));
        let mut draw = Draw::with_compiler(fixture.config(), counting(&count)).unwrap();

        assert!(matches!(
            draw.render("empty", 1, Store::new()),
            Err(Error::EmptyTemplate(name)) if name == "empty"
        ));
        assert!(matches!(
            draw.render("many", 1, Store::new()),
            Err(Error::MultipleRootNodes { name, count: 2 }) if name == "many"
        ));
        assert!(matches!(
            draw.render("text", 1, Store::new()),
            Err(Error::InvalidRootNode(name)) if name == "text"
        ));
        assert_eq!(count.get(), 0);
        assert!(draw.instances().used_template_names().is_empty());
    }

    #[test]
    fn test_hydration_fields() {
        let fixture = Fixture::new(false, false);
        let mut draw = draw(&fixture);
        draw.render("/hello.hbs", "card-1", world()).unwrap();

        let stored = draw.instances().get("hello", "card-1").unwrap();
        assert_eq!(
            stored.clone().into_value(),
            json!({
                "name": "world",
                "_kx_draw_template_name": "hello",
                "_kx_draw_unique_id": "card-1",
            })
        );
        assert_eq!(draw.instances().usage("hello"), 1);
    }

    #[test]
    fn test_missing_unique_id() {
        let fixture = Fixture::new(false, false);
        let mut draw = draw(&fixture);

        for id in ["", "   "] {
            assert!(matches!(
                draw.render("hello", id, world()),
                Err(Error::MissingUniqueId(name)) if name == "hello"
            ));
        }
    }

    #[test]
    fn test_static_render_is_not_recorded() {
        let fixture = Fixture::new(false, false);
        let mut draw = draw(&fixture);

        assert_eq!(
            draw.render("hello", InstanceId::Static, world()).unwrap(),
            r#"<b data-kx-draw-name="hello" data-kx-draw-id="">Hello <i>world</i>!</b>"#
        );
        assert!(draw.instances().used_template_names().is_empty());
        assert!(!draw.export_hydration_payload().unwrap().contains("hello\""));
    }

    #[test]
    fn test_draw_time() {
        let fixture = Fixture::new(false, false);
        let mut disabled = draw(&fixture);
        disabled.render("hello", 1, world()).unwrap();
        assert!(disabled.get_draw_time().is_none());

        let config = fixture.builder().with_benchmark(true).build().unwrap();
        let mut enabled = Draw::new(config).unwrap();
        enabled.add_partials_directory("shared").unwrap();
        enabled.render("hello", 1, world()).unwrap();
        enabled.render("hello", InstanceId::Static, world()).unwrap();

        let times = enabled.get_draw_time().unwrap();
        assert_eq!(times.keys().collect::<Vec<_>>(), vec!["hello"]);
    }

    #[test]
    fn test_partials_directory() {
        let fixture = Fixture::new(false, false);
        fixture.write("shared/icons/star", "<svg></svg>");
        fixture.write("shared/icons/moon", "<svg></svg>");
        fixture.write("other/page", "<main></main>");
        let mut draw = Draw::new(fixture.config()).unwrap();

        assert_eq!(draw.add_partials_directory("shared").unwrap(), 3);
        assert!(matches!(
            draw.add_partials_directory(""),
            Err(Error::InvalidPartialName(_))
        ));
        assert!(matches!(
            draw.add_partials_directory("nothing"),
            Err(Error::DirectoryNotFound { .. })
        ));
        assert!(matches!(draw.add_partial(""), Err(Error::InvalidPartialName(_))));
        draw.add_partial("other/page").unwrap();

        let payload = draw.hydration_payload().unwrap();
        assert_eq!(
            payload.partials.keys().collect::<Vec<_>>(),
            vec!["other/page", "shared/icons/moon", "shared/icons/star", "shared/name"]
        );
    }

    #[test]
    fn test_unregistered_partial() {
        let fixture = Fixture::new(true, true);
        let mut draw = Draw::new(fixture.config()).unwrap();

        let error = draw.render("hello", 1, world()).unwrap_err();
        assert!(matches!(&error, Error::Compile { name, .. } if name == "hello"));
        assert!(error.to_string().contains("shared/name"));
    }

    #[test]
    fn test_get_template() {
        let fixture = Fixture::new(false, false);
        let mut draw = draw(&fixture);

        assert_eq!(draw.get_template("shared/name").unwrap(), "<i>{{name}}</i>");
        assert!(matches!(
            draw.get_template("missing"),
            Err(Error::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn test_export_hydration_payload() {
        let fixture = Fixture::new(true, true);
        fixture.write("card", "<div>{{title}}</div>");
        let mut draw = draw(&fixture);
        draw.render("hello", 100, world()).unwrap();
        draw.render("hello", 200, Store::new().with_must("name", "moon")).unwrap();
        draw.render("card", InstanceId::Static, Store::new()).unwrap();

        let payload = draw.hydration_payload().unwrap();
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "templates": { "hello": "<b>Hello {{> shared/name}}!</b>" },
                "data": {
                    "hello": {
                        "100": {
                            "name": "world",
                            "_kx_draw_template_name": "hello",
                            "_kx_draw_unique_id": "100",
                        },
                        "200": {
                            "name": "moon",
                            "_kx_draw_template_name": "hello",
                            "_kx_draw_unique_id": "200",
                        },
                    },
                },
                "partials": { "shared/name": "<i>{{name}}</i>" },
            })
        );

        let script = draw.export_hydration_payload().unwrap();
        let json = script
            .lines()
            .find_map(|line| line.trim().strip_prefix("window.KXDraw = new KXDrawRender("))
            .and_then(|line| line.strip_suffix(");"))
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(json).unwrap(),
            serde_json::to_value(&payload).unwrap()
        );
    }
}
